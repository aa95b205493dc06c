//! Container decoder engine.
//!
//! Step order is strict: validate header (with a legacy-layout sniff on
//! magic mismatch), gate the minimum version, read the preview block,
//! decode the metadata blob, then refill every image container from the
//! trailing resource pool by replaying the indexer's traversal.
//!
//! Cancellation is checked before and after every blocking read and at the
//! start of every per-resource iteration; a cancelled decode returns no
//! partial document.

use std::io::Read;

use pixi_document::{Document, FormatVersion};
use tokio::io::AsyncRead;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::error::{ensure_not_cancelled, PixiError, PixiResult};
use crate::header::{validate_header, HEADER_LEN};
use crate::index::{for_each_image_mut, ResourcePlan, TraversalOrder};
use crate::io::{read_up_to, AsyncSource, CountingReader};
use crate::legacy::{matches_legacy, LEGACY_SNIFF_LEN};
use crate::metadata::{decode_metadata, decode_metadata_async, metadata_invalid};
use crate::versions::{PoolLayout, VersionFormat};

/// Read and validate the fixed-length header. On a magic mismatch the
/// stream is sniffed a little further to tell the pre-versioning layout
/// apart from plain garbage.
pub(crate) fn read_validated_header<R>(
    reader: &mut R,
) -> PixiResult<(FormatVersion, FormatVersion)>
where
    R: Read + ?Sized,
{
    let mut buf = [0u8; HEADER_LEN];
    let read = read_up_to(reader, &mut buf)?;
    match validate_header(&buf[..read]) {
        Ok(pair) => Ok(pair),
        Err(original) => {
            let mut sniff = [0u8; LEGACY_SNIFF_LEN];
            sniff[..read].copy_from_slice(&buf[..read]);
            let extra = read_up_to(reader, &mut sniff[read..])?;
            if matches_legacy(&sniff[..read + extra]) {
                return Err(PixiError::LegacyFormatDetected);
            }
            Err(original)
        }
    }
}

pub(crate) async fn read_validated_header_async<R>(
    source: &mut AsyncSource<R>,
) -> PixiResult<(FormatVersion, FormatVersion)>
where
    R: AsyncRead + Unpin,
{
    let mut buf = [0u8; HEADER_LEN];
    let read = source.read_up_to(&mut buf).await?;
    match validate_header(&buf[..read]) {
        Ok(pair) => Ok(pair),
        Err(original) => {
            let mut sniff = [0u8; LEGACY_SNIFF_LEN];
            sniff[..read].copy_from_slice(&buf[..read]);
            let extra = source.read_up_to(&mut sniff[read..]).await?;
            if matches_legacy(&sniff[..read + extra]) {
                return Err(PixiError::LegacyFormatDetected);
            }
            Err(original)
        }
    }
}

/// Fail with [`PixiError::UnsupportedVersion`] when the file demands a newer
/// parser than the selected codec.
pub(crate) fn gate_min_version(
    parser: FormatVersion,
    file: FormatVersion,
    min_required: FormatVersion,
) -> PixiResult<()> {
    if parser < min_required {
        return Err(PixiError::UnsupportedVersion {
            file,
            min_required,
            parser,
        });
    }
    Ok(())
}

/// Decode everything after the header with the given version's layout.
pub(crate) fn decode_container<F, R>(
    reader: &mut CountingReader<R>,
    version: FormatVersion,
    min_version: FormatVersion,
    cancel: &CancellationToken,
) -> PixiResult<Document>
where
    F: VersionFormat,
    R: Read,
{
    gate_min_version(F::VERSION, version, min_version)?;

    ensure_not_cancelled(cancel)?;
    let preview = read_preview(reader)?;
    ensure_not_cancelled(cancel)?;

    let wire = decode_metadata::<F::Wire, _>(reader)
        .map_err(|e| metadata_invalid(e, version, min_version))?;
    ensure_not_cancelled(cancel)?;

    let layout = F::pool_layout(&wire);
    let (mut document, plan) = F::from_wire(wire)?;
    document.stamp_versions(version, min_version);
    document.preview = preview;

    match layout {
        PoolLayout::ResourcePool => {
            let buffers =
                read_pool(reader, &plan, cancel).map_err(|e| attach_partial(e, &document))?;
            install_pool(&mut document, F::ORDER, buffers)?;
        }
        PoolLayout::PerLayerBlocks => read_layer_blocks(reader, &mut document, cancel)?,
    }

    ensure_not_cancelled(cancel)?;
    debug!(version = %version, position = reader.position(), "container read");
    Ok(document)
}

pub(crate) async fn decode_container_async<F, R>(
    source: &mut AsyncSource<R>,
    version: FormatVersion,
    min_version: FormatVersion,
    cancel: &CancellationToken,
) -> PixiResult<Document>
where
    F: VersionFormat,
    R: AsyncRead + Unpin,
{
    gate_min_version(F::VERSION, version, min_version)?;

    ensure_not_cancelled(cancel)?;
    let preview = read_preview_async(source).await?;
    ensure_not_cancelled(cancel)?;

    let wire = decode_metadata_async::<F::Wire, _>(source)
        .await
        .map_err(|e| metadata_invalid(e, version, min_version))?;
    ensure_not_cancelled(cancel)?;

    let layout = F::pool_layout(&wire);
    let (mut document, plan) = F::from_wire(wire)?;
    document.stamp_versions(version, min_version);
    document.preview = preview;

    match layout {
        PoolLayout::ResourcePool => {
            let buffers = read_pool_async(source, &plan, cancel)
                .await
                .map_err(|e| attach_partial(e, &document))?;
            install_pool(&mut document, F::ORDER, buffers)?;
        }
        PoolLayout::PerLayerBlocks => read_layer_blocks_async(source, &mut document, cancel).await?,
    }

    ensure_not_cancelled(cancel)?;
    debug!(version = %version, position = source.position(), "container read");
    Ok(document)
}

fn read_preview<R: Read>(reader: &mut CountingReader<R>) -> PixiResult<Option<Vec<u8>>> {
    let len = read_len_prefix(reader, "preview")?;
    if len == 0 {
        return Ok(None);
    }
    let mut preview = vec![0u8; len];
    let read = read_up_to(reader, &mut preview)?;
    if read != len {
        return Err(PixiError::invalid_format(format!(
            "truncated preview: expected {len} bytes, got {read}"
        )));
    }
    Ok(Some(preview))
}

async fn read_preview_async<R>(source: &mut AsyncSource<R>) -> PixiResult<Option<Vec<u8>>>
where
    R: AsyncRead + Unpin,
{
    let len = read_len_prefix_async(source, "preview").await?;
    if len == 0 {
        return Ok(None);
    }
    let mut preview = vec![0u8; len];
    let read = source.read_up_to(&mut preview).await?;
    if read != len {
        return Err(PixiError::invalid_format(format!(
            "truncated preview: expected {len} bytes, got {read}"
        )));
    }
    Ok(Some(preview))
}

/// Read the whole resource pool into per-entry buffers, in plan order.
///
/// Each entry is read with the tolerant fill loop: short reads are retried
/// until the buffer fills or the stream ends, and only then is a shortfall
/// an error, named after the entry's descriptor.
fn read_pool<R: Read>(
    reader: &mut CountingReader<R>,
    plan: &ResourcePlan,
    cancel: &CancellationToken,
) -> PixiResult<Vec<Vec<u8>>> {
    let mut buffers = Vec::with_capacity(plan.entries.len());
    for entry in &plan.entries {
        ensure_not_cancelled(cancel)?;
        let size = entry_size(entry.size)?;
        let mut buf = vec![0u8; size];
        let read = read_up_to(reader, &mut buf)?;
        ensure_not_cancelled(cancel)?;
        if read != size {
            return Err(resource_shortfall(&entry.descriptor, size, read, reader.position()));
        }
        buffers.push(buf);
    }
    Ok(buffers)
}

async fn read_pool_async<R>(
    source: &mut AsyncSource<R>,
    plan: &ResourcePlan,
    cancel: &CancellationToken,
) -> PixiResult<Vec<Vec<u8>>>
where
    R: AsyncRead + Unpin,
{
    let mut buffers = Vec::with_capacity(plan.entries.len());
    for entry in &plan.entries {
        ensure_not_cancelled(cancel)?;
        let size = entry_size(entry.size)?;
        let mut buf = vec![0u8; size];
        let read = source.read_up_to(&mut buf).await?;
        ensure_not_cancelled(cancel)?;
        if read != size {
            return Err(resource_shortfall(&entry.descriptor, size, read, source.position()));
        }
        buffers.push(buf);
    }
    Ok(buffers)
}

/// Plug the pool buffers back into the document by replaying the indexer's
/// traversal; the pairing is positional.
fn install_pool(
    document: &mut Document,
    order: TraversalOrder,
    buffers: Vec<Vec<u8>>,
) -> PixiResult<()> {
    let mut buffers = buffers.into_iter();
    for_each_image_mut(document, order, &mut |image| {
        match buffers.next() {
            Some(bytes) => {
                image.bytes = bytes;
                Ok(())
            }
            None => Err(PixiError::invalid_format(
                "resource pool ran out before the document tree was filled",
            )),
        }
    })
}

/// The early-4.x sub-protocol: one length-prefixed raw block per image
/// layer, in layer order. Masks and reference layers stay empty.
fn read_layer_blocks<R: Read>(
    reader: &mut CountingReader<R>,
    document: &mut Document,
    cancel: &CancellationToken,
) -> PixiResult<()> {
    document.root.try_for_each_member_mut(&mut |member| {
        let name = member.name().to_string();
        if let Some(image) = member.as_image_container_mut() {
            ensure_not_cancelled(cancel)?;
            let len = read_len_prefix(reader, &name)?;
            let mut buf = vec![0u8; len];
            let read = read_up_to(reader, &mut buf)?;
            if read != len {
                return Err(resource_shortfall(&name, len, read, reader.position()));
            }
            image.bytes = buf;
        }
        Ok(())
    })
}

async fn read_layer_blocks_async<R>(
    source: &mut AsyncSource<R>,
    document: &mut Document,
    cancel: &CancellationToken,
) -> PixiResult<()>
where
    R: AsyncRead + Unpin,
{
    // The mutable tree walk cannot suspend, so the blocks are read into a
    // flat list first and installed in a second, synchronous pass. The name
    // list keeps the diagnostics as precise as the blocking path's.
    let mut layer_names = Vec::new();
    document.root.try_for_each_member_mut(&mut |member| {
        if member.as_image_container_mut().is_some() {
            layer_names.push(member.name().to_string());
        }
        Ok::<(), PixiError>(())
    })?;

    let mut blocks = Vec::with_capacity(layer_names.len());
    for name in &layer_names {
        ensure_not_cancelled(cancel)?;
        let len = read_len_prefix_async(source, name).await?;
        let mut buf = vec![0u8; len];
        let read = source.read_up_to(&mut buf).await?;
        if read != len {
            return Err(resource_shortfall(name, len, read, source.position()));
        }
        blocks.push(buf);
    }

    let mut blocks = blocks.into_iter();
    document.root.try_for_each_member_mut(&mut |member| {
        if let Some(image) = member.as_image_container_mut() {
            if let Some(bytes) = blocks.next() {
                image.bytes = bytes;
            }
        }
        Ok::<(), PixiError>(())
    })
}

fn read_len_prefix<R: Read>(reader: &mut R, what: &str) -> PixiResult<usize> {
    let mut len_buf = [0u8; 4];
    let read = read_up_to(reader, &mut len_buf)?;
    if read != 4 {
        return Err(PixiError::invalid_format(format!(
            "truncated length prefix for {what}"
        )));
    }
    checked_len(i32::from_le_bytes(len_buf), what)
}

async fn read_len_prefix_async<R>(source: &mut AsyncSource<R>, what: &str) -> PixiResult<usize>
where
    R: AsyncRead + Unpin,
{
    let mut len_buf = [0u8; 4];
    let read = source.read_up_to(&mut len_buf).await?;
    if read != 4 {
        return Err(PixiError::invalid_format(format!(
            "truncated length prefix for {what}"
        )));
    }
    checked_len(i32::from_le_bytes(len_buf), what)
}

fn checked_len(len: i32, what: &str) -> PixiResult<usize> {
    usize::try_from(len)
        .map_err(|_| PixiError::invalid_format(format!("negative length prefix {len} for {what}")))
}

fn entry_size(size: u64) -> PixiResult<usize> {
    usize::try_from(size)
        .map_err(|_| PixiError::invalid_format(format!("resource size {size} overflows memory")))
}

fn resource_shortfall(descriptor: &str, expected: usize, read: usize, position: u64) -> PixiError {
    PixiError::invalid_format(format!(
        "expected {expected} resource bytes for {descriptor}, read {read} \
         (stream position {position})"
    ))
}

/// Promote a bare `InvalidFormat` raised mid-pool into one carrying the
/// partially decoded document for caller diagnostics.
fn attach_partial(err: PixiError, document: &Document) -> PixiError {
    match err {
        PixiError::InvalidFormat {
            reason,
            partial: None,
        } => PixiError::invalid_format_with(reason, document.clone()),
        other => other,
    }
}
