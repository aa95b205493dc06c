//! Format version 5, the current generation.
//!
//! Adds animation keyframes, embedded resources, and the node graph on top
//! of the 4.x layout. Keyframe images join the resource pool in a separate
//! pass after the structure tree and reference layer.

use std::io::{Read, Write};

use pixi_document::{
    AnimationData, ColorCollection, Corners, Document, ElementKeyFrame, FormatVersion,
    KeyFrameGroup, NodeGraph, RasterKeyFrame, ReferenceLayer, ResourceStorage,
};
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_util::sync::CancellationToken;

use crate::decode::{
    decode_container, decode_container_async, read_validated_header, read_validated_header_async,
};
use crate::encode::{encode_container, encode_container_async};
use crate::error::{ensure_not_cancelled, PixiResult};
use crate::index::{keyframe_descriptor, PlanCursor, ResourcePlan, TraversalOrder, REFERENCE_DESCRIPTOR};
use crate::io::{AsyncSource, CountingReader};
use crate::versions::{PixiCodec, VersionFormat};
use crate::wire::{root_from_wire, root_to_wire, PlanBuilder, WireFolder, WireResourceRef};

pub const VERSION: FormatVersion = FormatVersion::new(5, 0);
pub const MIN_SUPPORTED: FormatVersion = FormatVersion::new(5, 0);

pub(crate) struct V5;

#[derive(Serialize, Deserialize)]
pub(crate) struct WireDocumentV5 {
    width: u32,
    height: u32,
    swatches: ColorCollection,
    palette: ColorCollection,
    root: WireFolder,
    reference_layer: Option<WireReference>,
    animation: Option<WireAnimation>,
    resources: Option<ResourceStorage>,
    graph: Option<NodeGraph>,
    image_encoder: Option<String>,
}

/// The 5.x reference layer keeps only the transform and dimensions; the
/// name, opacity, and offsets of older generations are gone from the wire.
#[derive(Serialize, Deserialize)]
struct WireReference {
    enabled: bool,
    topmost: bool,
    corners: Corners,
    width: f32,
    height: f32,
    resource: WireResourceRef,
}

#[derive(Serialize, Deserialize)]
struct WireAnimation {
    key_frame_groups: Vec<WireKeyFrameGroup>,
    frame_rate: i32,
    onion_frames: i32,
    onion_opacity: f64,
    default_end_frame: i32,
}

#[derive(Serialize, Deserialize)]
struct WireKeyFrameGroup {
    enabled: bool,
    node_id: i32,
    children: Vec<WireRasterKeyFrame>,
    element_key_frames: Vec<ElementKeyFrame>,
}

#[derive(Serialize, Deserialize)]
struct WireRasterKeyFrame {
    start_frame: i32,
    duration: i32,
    guid: u128,
    layer_guid: u128,
    resource: WireResourceRef,
}

impl VersionFormat for V5 {
    type Wire = WireDocumentV5;

    const VERSION: FormatVersion = VERSION;
    const MIN_VERSION: FormatVersion = MIN_SUPPORTED;
    const ORDER: TraversalOrder = TraversalOrder::V5;

    fn to_wire(document: &Document, cursor: &mut PlanCursor<'_>) -> PixiResult<Self::Wire> {
        let root = root_to_wire(&document.root, cursor)?;
        let reference_layer = document
            .reference_layer
            .as_ref()
            .map(|reference| reference_to_wire(reference, cursor))
            .transpose()?;
        let animation = document
            .animation_data
            .as_ref()
            .map(|animation| animation_to_wire(animation, cursor))
            .transpose()?;

        Ok(WireDocumentV5 {
            width: document.width,
            height: document.height,
            swatches: document.swatches.clone(),
            palette: document.palette.clone(),
            root,
            reference_layer,
            animation,
            resources: document.resources.clone(),
            graph: document.graph.clone(),
            image_encoder: document.image_encoder.clone(),
        })
    }

    fn from_wire(wire: Self::Wire) -> PixiResult<(Document, ResourcePlan)> {
        let mut builder = PlanBuilder::new();
        let root = root_from_wire(wire.root, &mut builder)?;
        let reference_layer = wire
            .reference_layer
            .map(|reference| reference_from_wire(reference, &mut builder));
        let animation_data = wire
            .animation
            .map(|animation| animation_from_wire(animation, &mut builder));

        let mut document = Document::new(wire.width, wire.height);
        document.swatches = wire.swatches;
        document.palette = wire.palette;
        document.root = root;
        document.reference_layer = reference_layer;
        document.animation_data = animation_data;
        document.resources = wire.resources;
        document.graph = wire.graph;
        document.image_encoder = wire.image_encoder;

        Ok((document, builder.finish()))
    }
}

fn reference_to_wire(
    reference: &ReferenceLayer,
    cursor: &mut PlanCursor<'_>,
) -> PixiResult<WireReference> {
    let entry = cursor.take()?;
    Ok(WireReference {
        enabled: reference.enabled,
        topmost: reference.topmost,
        corners: reference.corners,
        width: reference.width,
        height: reference.height,
        resource: WireResourceRef {
            offset: entry.offset,
            size: entry.size,
        },
    })
}

fn reference_from_wire(wire: WireReference, builder: &mut PlanBuilder) -> ReferenceLayer {
    builder.push(wire.resource, REFERENCE_DESCRIPTOR.to_string());
    let mut reference = ReferenceLayer::default();
    reference.enabled = wire.enabled;
    reference.topmost = wire.topmost;
    reference.corners = wire.corners;
    reference.width = wire.width;
    reference.height = wire.height;
    reference
}

fn animation_to_wire(
    animation: &AnimationData,
    cursor: &mut PlanCursor<'_>,
) -> PixiResult<WireAnimation> {
    let mut key_frame_groups = Vec::with_capacity(animation.key_frame_groups.len());
    for group in &animation.key_frame_groups {
        let mut children = Vec::with_capacity(group.children.len());
        for keyframe in &group.children {
            let entry = cursor.take()?;
            children.push(WireRasterKeyFrame {
                start_frame: keyframe.start_frame,
                duration: keyframe.duration,
                guid: keyframe.guid,
                layer_guid: keyframe.layer_guid,
                resource: WireResourceRef {
                    offset: entry.offset,
                    size: entry.size,
                },
            });
        }
        key_frame_groups.push(WireKeyFrameGroup {
            enabled: group.enabled,
            node_id: group.node_id,
            children,
            element_key_frames: group.element_key_frames.clone(),
        });
    }

    Ok(WireAnimation {
        key_frame_groups,
        frame_rate: animation.frame_rate,
        onion_frames: animation.onion_frames,
        onion_opacity: animation.onion_opacity,
        default_end_frame: animation.default_end_frame,
    })
}

fn animation_from_wire(wire: WireAnimation, builder: &mut PlanBuilder) -> AnimationData {
    let mut key_frame_groups = Vec::with_capacity(wire.key_frame_groups.len());
    for (g, group) in wire.key_frame_groups.into_iter().enumerate() {
        let mut children = Vec::with_capacity(group.children.len());
        for (k, keyframe) in group.children.into_iter().enumerate() {
            builder.push(keyframe.resource, keyframe_descriptor(g, k));
            children.push(RasterKeyFrame {
                start_frame: keyframe.start_frame,
                duration: keyframe.duration,
                guid: keyframe.guid,
                layer_guid: keyframe.layer_guid,
                image: Default::default(),
            });
        }
        key_frame_groups.push(KeyFrameGroup {
            enabled: group.enabled,
            node_id: group.node_id,
            children,
            element_key_frames: group.element_key_frames,
        });
    }

    AnimationData {
        key_frame_groups,
        frame_rate: wire.frame_rate,
        onion_frames: wire.onion_frames,
        onion_opacity: wire.onion_opacity,
        default_end_frame: wire.default_end_frame,
    }
}

/// The 5.x codec, reachable through [`crate::parser_for`].
pub struct CodecV5;

impl PixiCodec for CodecV5 {
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
        encode_container::<V5, _>(document, sink, cancel)
    }

    fn deserialize(
        &self,
        source: &mut dyn Read,
        cancel: &CancellationToken,
    ) -> PixiResult<Document> {
        ensure_not_cancelled(cancel)?;
        let mut reader = CountingReader::new(source);
        let (version, min_version) = read_validated_header(&mut reader)?;
        decode_container::<V5, _>(&mut reader, version, min_version, cancel)
    }
}

/// Async twin of [`CodecV5::serialize`].
pub async fn serialize_async<W>(
    document: &Document,
    sink: &mut W,
    cancel: &CancellationToken,
) -> PixiResult<u64>
where
    W: AsyncWrite + Unpin,
{
    encode_container_async::<V5, _>(document, sink, cancel).await
}

/// Async twin of [`CodecV5::deserialize`].
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
    decode_container_async::<V5, _>(&mut source, version, min_version, cancel).await
}
