//! Format version 4.
//!
//! No animation, resources, or node graph; the reference layer still
//! carries a name, opacity, and floating-point placement. The metadata
//! declares an internal revision: files written before the resource pool
//! existed store their layer bytes as per-layer length-prefixed blocks
//! instead, and the decoder branches on that.

use std::io::{Read, Write};

use pixi_document::{ColorCollection, Corners, Document, FormatVersion, ReferenceLayer};
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_util::sync::CancellationToken;

use crate::decode::{
    decode_container, decode_container_async, read_validated_header, read_validated_header_async,
};
use crate::encode::{encode_container, encode_container_async};
use crate::error::{ensure_not_cancelled, PixiError, PixiResult};
use crate::index::{PlanCursor, ResourcePlan, TraversalOrder, REFERENCE_DESCRIPTOR};
use crate::io::{AsyncSource, CountingReader};
use crate::versions::{PixiCodec, PoolLayout, VersionFormat};
use crate::wire::{root_from_wire, root_to_wire, PlanBuilder, WireFolder, WireResourceRef};

pub const VERSION: FormatVersion = FormatVersion::new(4, 0);
pub const MIN_SUPPORTED: FormatVersion = FormatVersion::new(4, 0);

/// Metadata revision at which the trailing resource pool replaced the
/// per-layer blocks.
pub(crate) const RESOURCE_POOL_REVISION: i32 = 4;

pub(crate) struct V4;

#[derive(Serialize, Deserialize)]
pub(crate) struct WireDocumentV4 {
    revision: i32,
    width: i32,
    height: i32,
    swatches: ColorCollection,
    palette: ColorCollection,
    root: WireFolder,
    reference_layer: Option<WireReference>,
}

#[derive(Serialize, Deserialize)]
struct WireReference {
    name: Option<String>,
    enabled: bool,
    topmost: bool,
    opacity: f32,
    corners: Corners,
    width: f32,
    height: f32,
    offset_x: f32,
    offset_y: f32,
    resource: WireResourceRef,
}

impl VersionFormat for V4 {
    type Wire = WireDocumentV4;

    const VERSION: FormatVersion = VERSION;
    const MIN_VERSION: FormatVersion = MIN_SUPPORTED;
    const ORDER: TraversalOrder = TraversalOrder::V4;

    fn check_representable(document: &Document) -> PixiResult<()> {
        if document.animation_data.is_some() {
            return Err(not_representable("animation data"));
        }
        if document.graph.is_some() {
            return Err(not_representable("a node graph"));
        }
        if document.resources.is_some() {
            return Err(not_representable("embedded resources"));
        }
        if document.image_encoder.is_some() {
            return Err(not_representable("an image encoder key"));
        }
        Ok(())
    }

    fn to_wire(document: &Document, cursor: &mut PlanCursor<'_>) -> PixiResult<Self::Wire> {
        let root = root_to_wire(&document.root, cursor)?;
        let reference_layer = document
            .reference_layer
            .as_ref()
            .map(|reference| reference_to_wire(reference, cursor))
            .transpose()?;

        Ok(WireDocumentV4 {
            revision: RESOURCE_POOL_REVISION,
            width: i32::try_from(document.width)
                .map_err(|_| PixiError::InvalidInput("document width too large".into()))?,
            height: i32::try_from(document.height)
                .map_err(|_| PixiError::InvalidInput("document height too large".into()))?,
            swatches: document.swatches.clone(),
            palette: document.palette.clone(),
            root,
            reference_layer,
        })
    }

    fn from_wire(wire: Self::Wire) -> PixiResult<(Document, ResourcePlan)> {
        let mut builder = PlanBuilder::new();
        let root = root_from_wire(wire.root, &mut builder)?;
        let reference_layer = wire
            .reference_layer
            .map(|reference| reference_from_wire(reference, &mut builder))
            .transpose()?;

        let width = u32::try_from(wire.width)
            .map_err(|_| PixiError::invalid_format(format!("negative width {}", wire.width)))?;
        let height = u32::try_from(wire.height)
            .map_err(|_| PixiError::invalid_format(format!("negative height {}", wire.height)))?;

        let mut document = Document::new(width, height);
        document.swatches = wire.swatches;
        document.palette = wire.palette;
        document.root = root;
        document.reference_layer = reference_layer;

        Ok((document, builder.finish()))
    }

    fn pool_layout(wire: &Self::Wire) -> PoolLayout {
        if wire.revision < RESOURCE_POOL_REVISION {
            PoolLayout::PerLayerBlocks
        } else {
            PoolLayout::ResourcePool
        }
    }
}

fn not_representable(what: &str) -> PixiError {
    PixiError::InvalidInput(format!("{what} cannot be written by format version 4"))
}

fn reference_to_wire(
    reference: &ReferenceLayer,
    cursor: &mut PlanCursor<'_>,
) -> PixiResult<WireReference> {
    let entry = cursor.take()?;
    Ok(WireReference {
        name: reference.name.clone(),
        enabled: reference.enabled,
        topmost: reference.topmost,
        opacity: reference.opacity(),
        corners: reference.corners,
        width: reference.width,
        height: reference.height,
        offset_x: reference.offset_x,
        offset_y: reference.offset_y,
        resource: WireResourceRef {
            offset: entry.offset,
            size: entry.size,
        },
    })
}

fn reference_from_wire(
    wire: WireReference,
    builder: &mut PlanBuilder,
) -> PixiResult<ReferenceLayer> {
    builder.push(wire.resource, REFERENCE_DESCRIPTOR.to_string());
    let mut reference = ReferenceLayer::default();
    reference.name = wire.name;
    reference.enabled = wire.enabled;
    reference.topmost = wire.topmost;
    reference.corners = wire.corners;
    reference.width = wire.width;
    reference.height = wire.height;
    reference.offset_x = wire.offset_x;
    reference.offset_y = wire.offset_y;
    reference.set_opacity(wire.opacity).map_err(|e| {
        PixiError::invalid_format(format!("{REFERENCE_DESCRIPTOR}: {e}"))
    })?;
    Ok(reference)
}

/// The 4.x codec, reachable through [`crate::parser_for`].
pub struct CodecV4;

impl PixiCodec for CodecV4 {
    fn version(&self) -> FormatVersion {
        VERSION
    }

    fn min_supported(&self) -> FormatVersion {
        MIN_SUPPORTED
    }

    fn serialize(
        &self,
        document: &Document,
        sink: &mut dyn Write,
        cancel: &CancellationToken,
    ) -> PixiResult<u64> {
        encode_container::<V4, _>(document, sink, cancel)
    }

    fn deserialize(
        &self,
        source: &mut dyn Read,
        cancel: &CancellationToken,
    ) -> PixiResult<Document> {
        ensure_not_cancelled(cancel)?;
        let mut reader = CountingReader::new(source);
        let (version, min_version) = read_validated_header(&mut reader)?;
        decode_container::<V4, _>(&mut reader, version, min_version, cancel)
    }
}

/// Async twin of [`CodecV4::serialize`].
pub async fn serialize_async<W>(
    document: &Document,
    sink: &mut W,
    cancel: &CancellationToken,
) -> PixiResult<u64>
where
    W: AsyncWrite + Unpin,
{
    encode_container_async::<V4, _>(document, sink, cancel).await
}

/// Async twin of [`CodecV4::deserialize`].
pub async fn deserialize_async<R>(
    source: &mut R,
    cancel: &CancellationToken,
) -> PixiResult<Document>
where
    R: AsyncRead + Unpin,
{
    ensure_not_cancelled(cancel)?;
    let mut source = AsyncSource::new(source);
    let (version, min_version) = read_validated_header_async(&mut source).await?;
    decode_container_async::<V4, _>(&mut source, version, min_version, cancel).await
}

#[cfg(test)]
mod tests {
    use pixi_document::{AnimationData, ImageContainer, ImageLayer, StructureMember};

    use crate::metadata::encode_metadata;

    use super::*;

    #[test]
    fn rejects_features_the_format_cannot_carry() {
        let mut document = Document::new(4, 4);
        document.animation_data = Some(AnimationData::default());

        let mut sink = Vec::new();
        let err = CodecV4
            .serialize(&document, &mut sink, &CancellationToken::new())
            .unwrap_err();
        assert!(matches!(err, PixiError::InvalidInput(_)));
        assert!(sink.is_empty());
    }

    #[test]
    fn pre_pool_revision_reads_per_layer_blocks() {
        let mut document = Document::new(6, 6);
        let mut layer = ImageLayer::new("old", 6, 6);
        layer.image = ImageContainer::new(vec![5, 6, 7]);
        document.root.children.push(StructureMember::ImageLayer(layer));

        // Build the container by hand the way an early 4.x writer would:
        // revision below the pool threshold, then one length-prefixed
        // block per layer after the metadata.
        let plan = crate::index::index_document(&document, TraversalOrder::V4);
        let mut cursor = plan.cursor();
        let mut wire = V4::to_wire(&document, &mut cursor).unwrap();
        wire.revision = RESOURCE_POOL_REVISION - 1;

        let mut bytes = crate::header::write_header(VERSION, MIN_SUPPORTED).to_vec();
        bytes.extend_from_slice(&[0u8; 4]);
        bytes.extend_from_slice(&encode_metadata(&wire).unwrap());
        bytes.extend_from_slice(&3i32.to_le_bytes());
        bytes.extend_from_slice(&[5, 6, 7]);

        let decoded = CodecV4
            .deserialize(&mut bytes.as_slice(), &CancellationToken::new())
            .unwrap();
        assert_eq!(decoded, document);
    }

    #[tokio::test]
    async fn async_pre_pool_truncation_names_the_layer() {
        let mut document = Document::new(6, 6);
        let mut layer = ImageLayer::new("old", 6, 6);
        layer.image = ImageContainer::new(vec![5, 6, 7]);
        document.root.children.push(StructureMember::ImageLayer(layer));

        let plan = crate::index::index_document(&document, TraversalOrder::V4);
        let mut cursor = plan.cursor();
        let mut wire = V4::to_wire(&document, &mut cursor).unwrap();
        wire.revision = RESOURCE_POOL_REVISION - 1;

        let mut bytes = crate::header::write_header(VERSION, MIN_SUPPORTED).to_vec();
        bytes.extend_from_slice(&[0u8; 4]);
        bytes.extend_from_slice(&encode_metadata(&wire).unwrap());
        bytes.extend_from_slice(&3i32.to_le_bytes());
        bytes.extend_from_slice(&[5, 6]);

        let mut source = std::io::Cursor::new(bytes);
        let err = deserialize_async(&mut source, &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            PixiError::InvalidFormat { ref reason, .. } if reason.contains("old")
        ));
    }

    #[test]
    fn current_revision_roundtrip() {
        let mut document = Document::new(6, 6);
        let mut layer = ImageLayer::new("l", 6, 6);
        layer.image = ImageContainer::new(vec![1, 2, 3, 4]);
        document.root.children.push(StructureMember::ImageLayer(layer));
        let mut reference = ReferenceLayer::default();
        reference.name = Some("ref".into());
        reference.width = 6.5;
        reference.height = 3.25;
        reference.image = ImageContainer::new(vec![9]);
        document.reference_layer = Some(reference);

        let mut bytes = Vec::new();
        CodecV4
            .serialize(&document, &mut bytes, &CancellationToken::new())
            .unwrap();
        let decoded = CodecV4
            .deserialize(&mut bytes.as_slice(), &CancellationToken::new())
            .unwrap();
        assert_eq!(decoded, document);
        assert_eq!(decoded.version(), Some(VERSION));
    }
}
