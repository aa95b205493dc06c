//! Container encoder: one engine, two I/O surfaces.
//!
//! Write order is strict: header, preview block, metadata blob, resource
//! pool. The async twin follows the identical order and error semantics,
//! suspending where the blocking form blocks.

use std::io::Write;

use pixi_document::Document;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::error::{ensure_not_cancelled, PixiError, PixiResult};
use crate::header::{write_header, HEADER_LEN};
use crate::index::{collect_image_refs, index_document};
use crate::metadata::encode_metadata;
use crate::versions::VersionFormat;

pub(crate) fn encode_container<F, W>(
    document: &Document,
    sink: &mut W,
    cancel: &CancellationToken,
) -> PixiResult<u64>
where
    F: VersionFormat,
    W: Write + ?Sized,
{
    ensure_not_cancelled(cancel)?;
    F::check_representable(document)?;

    let header = write_header(F::VERSION, F::MIN_VERSION);
    sink.write_all(&header)?;
    let mut written = HEADER_LEN as u64;

    let preview = preview_block(document)?;
    sink.write_all(&preview)?;
    written += preview.len() as u64;

    ensure_not_cancelled(cancel)?;

    let plan = index_document(document, F::ORDER);
    let mut cursor = plan.cursor();
    let wire = F::to_wire(document, &mut cursor)?;
    let blob = encode_metadata(&wire)?;
    sink.write_all(&blob)?;
    written += blob.len() as u64;

    for image in collect_image_refs(document, F::ORDER) {
        ensure_not_cancelled(cancel)?;
        sink.write_all(&image.bytes)?;
        written += image.len() as u64;
    }

    debug!(version = %F::VERSION, bytes = written, "container written");
    Ok(written)
}

pub(crate) async fn encode_container_async<F, W>(
    document: &Document,
    sink: &mut W,
    cancel: &CancellationToken,
) -> PixiResult<u64>
where
    F: VersionFormat,
    W: AsyncWrite + Unpin + ?Sized,
{
    ensure_not_cancelled(cancel)?;
    F::check_representable(document)?;

    let header = write_header(F::VERSION, F::MIN_VERSION);
    sink.write_all(&header).await?;
    let mut written = HEADER_LEN as u64;

    let preview = preview_block(document)?;
    sink.write_all(&preview).await?;
    written += preview.len() as u64;

    ensure_not_cancelled(cancel)?;

    let plan = index_document(document, F::ORDER);
    let mut cursor = plan.cursor();
    let wire = F::to_wire(document, &mut cursor)?;
    let blob = encode_metadata(&wire)?;
    sink.write_all(&blob).await?;
    written += blob.len() as u64;

    for image in collect_image_refs(document, F::ORDER) {
        ensure_not_cancelled(cancel)?;
        sink.write_all(&image.bytes).await?;
        written += image.len() as u64;
    }

    debug!(version = %F::VERSION, bytes = written, "container written");
    Ok(written)
}

/// The preview block: a 4-byte little-endian length, then the bytes. No
/// preview is written as the 4-byte zero.
fn preview_block(document: &Document) -> PixiResult<Vec<u8>> {
    match document.preview.as_deref() {
        Some(preview) if !preview.is_empty() => {
            let len = i32::try_from(preview.len()).map_err(|_| {
                PixiError::InvalidInput(format!("preview of {} bytes is too large", preview.len()))
            })?;
            let mut block = Vec::with_capacity(4 + preview.len());
            block.extend_from_slice(&len.to_le_bytes());
            block.extend_from_slice(preview);
            Ok(block)
        }
        _ => Ok(vec![0u8; 4]),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_preview_is_a_zero_length_block() {
        let document = Document::new(1, 1);
        assert_eq!(preview_block(&document).unwrap(), vec![0u8; 4]);
    }

    #[test]
    fn preview_block_is_length_prefixed() {
        let mut document = Document::new(1, 1);
        document.preview = Some(vec![0xAB; 3]);
        let block = preview_block(&document).unwrap();
        assert_eq!(&block[..4], &3i32.to_le_bytes());
        assert_eq!(&block[4..], &[0xAB; 3]);
    }
}
