//! Pre-versioning `.pixi` support.
//!
//! Before the magic-plus-version header existed, files carried a length
//! prefix, a metadata blob, and one length-prefixed raw block per layer.
//! The current reader only detects that generation and reports
//! [`PixiError::LegacyFormatDetected`]; callers that still need the data
//! can run [`decode_legacy`] explicitly.
//!
//! An even older generation (binary-formatter era) embeds a fixed 8-byte
//! identifier at a fixed offset; [`matches_legacy`] covers both, since the
//! length-prefixed generation starts with that same identifier window.

use std::io::Read;

use pixi_document::ColorCollection;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::error::{ensure_not_cancelled, PixiError, PixiResult};
use crate::io::read_up_to;
use crate::metadata;

/// Identifier of the pre-versioning layout, little-endian at [`LEGACY_IDENTIFIER_OFFSET`].
pub(crate) const LEGACY_IDENTIFIER: u64 = 0x4150697869456469;

pub(crate) const LEGACY_IDENTIFIER_OFFSET: usize = 22;

/// Minimum byte count before the identifier check is meaningful.
pub(crate) const LEGACY_SNIFF_LEN: usize = 45;

/// True when the buffer matches the pre-versioning layout. Buffers shorter
/// than [`LEGACY_SNIFF_LEN`] never match.
pub(crate) fn matches_legacy(bytes: &[u8]) -> bool {
    if bytes.len() < LEGACY_SNIFF_LEN {
        return false;
    }
    let window: [u8; 8] = bytes[LEGACY_IDENTIFIER_OFFSET..LEGACY_IDENTIFIER_OFFSET + 8]
        .try_into()
        .unwrap_or([0; 8]);
    u64::from_le_bytes(window) == LEGACY_IDENTIFIER
}

/// A document decoded from the pre-versioning layout: a flat layer list with
/// no folders, masks, or animation.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct LegacyDocument {
    pub width: i32,
    pub height: i32,
    pub swatches: ColorCollection,
    pub layers: Vec<LegacyLayer>,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct LegacyLayer {
    pub name: String,
    pub width: i32,
    pub height: i32,
    pub offset_x: i32,
    pub offset_y: i32,
    pub opacity: f32,
    pub is_visible: bool,
    pub bytes: Vec<u8>,
}

#[derive(Serialize, Deserialize)]
struct LegacyWireDocument {
    width: i32,
    height: i32,
    swatches: ColorCollection,
    layers: Vec<LegacyWireLayer>,
}

#[derive(Serialize, Deserialize)]
struct LegacyWireLayer {
    name: String,
    width: i32,
    height: i32,
    offset_x: i32,
    offset_y: i32,
    opacity: f32,
    is_visible: bool,
}

/// Decode the pre-versioning layout: `[i32 metadata_len][metadata]` followed
/// by one `[i32 len][bytes]` block per layer, in layer order.
pub fn decode_legacy<R: Read>(
    source: &mut R,
    cancel: &CancellationToken,
) -> PixiResult<LegacyDocument> {
    ensure_not_cancelled(cancel)?;

    let metadata_len = read_block_len(source, "metadata")?;
    let mut blob = vec![0u8; metadata_len];
    let read = read_up_to(source, &mut blob)?;
    if read != metadata_len {
        return Err(PixiError::invalid_format(format!(
            "truncated metadata: expected {metadata_len} bytes, got {read}"
        )));
    }
    ensure_not_cancelled(cancel)?;

    let wire: LegacyWireDocument =
        metadata::decode_metadata(&mut blob.as_slice()).map_err(|e| {
            PixiError::invalid_format(format!("failed to decode document metadata: {e}"))
        })?;

    let mut document = LegacyDocument {
        width: wire.width,
        height: wire.height,
        swatches: wire.swatches,
        layers: Vec::with_capacity(wire.layers.len()),
    };

    for layer in wire.layers {
        ensure_not_cancelled(cancel)?;
        let len = read_block_len(source, &layer.name)?;
        let mut bytes = vec![0u8; len];
        let read = read_up_to(source, &mut bytes)?;
        if read != len {
            return Err(PixiError::invalid_format(format!(
                "truncated layer block '{}': expected {len} bytes, got {read}",
                layer.name
            )));
        }
        document.layers.push(LegacyLayer {
            name: layer.name,
            width: layer.width,
            height: layer.height,
            offset_x: layer.offset_x,
            offset_y: layer.offset_y,
            opacity: layer.opacity,
            is_visible: layer.is_visible,
            bytes,
        });
    }

    Ok(document)
}

pub fn decode_legacy_bytes(bytes: &[u8], cancel: &CancellationToken) -> PixiResult<LegacyDocument> {
    if bytes.is_empty() {
        return Err(PixiError::InvalidInput("empty input buffer".into()));
    }
    decode_legacy(&mut &bytes[..], cancel)
}

/// Encode counterpart used by the round-trip tests; the layout is only ever
/// written by long-retired producers, so this stays test-facing.
#[cfg(test)]
fn encode_legacy(document: &LegacyDocument) -> PixiResult<Vec<u8>> {
    let wire = LegacyWireDocument {
        width: document.width,
        height: document.height,
        swatches: document.swatches.clone(),
        layers: document
            .layers
            .iter()
            .map(|layer| LegacyWireLayer {
                name: layer.name.clone(),
                width: layer.width,
                height: layer.height,
                offset_x: layer.offset_x,
                offset_y: layer.offset_y,
                opacity: layer.opacity,
                is_visible: layer.is_visible,
            })
            .collect(),
    };
    let blob = metadata::encode_metadata(&wire)?;

    let mut out = Vec::new();
    out.extend_from_slice(&(blob.len() as i32).to_le_bytes());
    out.extend_from_slice(&blob);
    for layer in &document.layers {
        out.extend_from_slice(&(layer.bytes.len() as i32).to_le_bytes());
        out.extend_from_slice(&layer.bytes);
    }
    Ok(out)
}

fn read_block_len<R: Read>(source: &mut R, what: &str) -> PixiResult<usize> {
    let mut len_buf = [0u8; 4];
    let read = read_up_to(source, &mut len_buf)?;
    if read != 4 {
        return Err(PixiError::invalid_format(format!(
            "truncated length prefix for {what}"
        )));
    }
    let len = i32::from_le_bytes(len_buf);
    usize::try_from(len).map_err(|_| {
        PixiError::invalid_format(format!("negative length prefix {len} for {what}"))
    })
}
