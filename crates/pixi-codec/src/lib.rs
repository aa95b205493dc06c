//! Container codec for the `.pixi` layered-image format.
//!
//! A `.pixi` file is a versioned binary container: a fixed magic-and-version
//! header, a length-prefixed preview thumbnail, a structured metadata blob
//! describing the document graph, and a trailing resource pool holding the
//! raw bytes of every embedded image. This crate implements the container
//! protocol end to end:
//!
//! - [`serialize`] / [`deserialize`] and their `_async` twins, writing the
//!   current format version and reading any supported one
//! - [`detect_version`] / [`parser_for`] for explicit version dispatch
//! - [`legacy`] for the pre-versioning layout, which the main decoder only
//!   detects ([`PixiError::LegacyFormatDetected`])
//!
//! Both API surfaces share one engine and identical step ordering and error
//! semantics; the async form suspends where the blocking form blocks.
//! Cancellation is cooperative via a [`CancellationToken`] checked at every
//! I/O boundary. A cancelled operation returns [`PixiError::Cancelled`] and
//! leaves any partially written sink for the caller to clean up.
//!
//! ```no_run
//! use pixi_codec::CancellationToken;
//! use pixi_document::Document;
//!
//! # fn main() -> pixi_codec::PixiResult<()> {
//! let document = Document::new(64, 64);
//! let bytes = pixi_codec::serialize_to_vec(&document, &CancellationToken::new())?;
//! let back = pixi_codec::deserialize_bytes(&bytes, &CancellationToken::new())?;
//! assert_eq!(back, document);
//! # Ok(())
//! # }
//! ```

use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;

use pixi_document::{Document, FormatVersion};
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};

mod decode;
mod encode;
mod error;
mod header;
mod index;
mod io;
mod metadata;
mod wire;

pub mod legacy;
pub mod versions;

pub use error::{PixiError, PixiResult};
pub use header::{HEADER_LEN, MAGIC};
pub use index::{index_document, ResourceEntry, ResourcePlan, TraversalOrder};
pub use legacy::{decode_legacy, decode_legacy_bytes, LegacyDocument, LegacyLayer};
pub use versions::{detect_version, detect_version_bytes, parser_for, PixiCodec};

pub use tokio_util::sync::CancellationToken;

use crate::decode::{decode_container, decode_container_async};
use crate::encode::encode_container;
use crate::error::ensure_not_cancelled;
use crate::io::{AsyncSource, CountingReader};
use crate::versions::{v4, v5};

/// The format version this crate writes.
pub const CURRENT_VERSION: FormatVersion = v5::VERSION;

/// The oldest parser able to read files this crate writes.
pub const MIN_SUPPORTED_VERSION: FormatVersion = v5::MIN_SUPPORTED;

/// Write `document` as a current-version container. Returns the number of
/// bytes written.
pub fn serialize<W: Write>(
    document: &Document,
    sink: &mut W,
    cancel: &CancellationToken,
) -> PixiResult<u64> {
    encode_container::<v5::V5, _>(document, sink, cancel)
}

/// [`serialize`] into a fresh in-memory buffer.
pub fn serialize_to_vec(document: &Document, cancel: &CancellationToken) -> PixiResult<Vec<u8>> {
    let mut buffer = Vec::new();
    serialize(document, &mut buffer, cancel)?;
    Ok(buffer)
}

/// [`serialize`] into a file, creating or truncating it.
pub fn serialize_to_file<P: AsRef<Path>>(
    document: &Document,
    path: P,
    cancel: &CancellationToken,
) -> PixiResult<u64> {
    let mut writer = BufWriter::new(File::create(path)?);
    let written = serialize(document, &mut writer, cancel)?;
    writer.flush()?;
    Ok(written)
}

/// Async twin of [`serialize`].
pub async fn serialize_async<W>(
    document: &Document,
    sink: &mut W,
    cancel: &CancellationToken,
) -> PixiResult<u64>
where
    W: AsyncWrite + Unpin,
{
    v5::serialize_async(document, sink, cancel).await
}

/// Async twin of [`serialize_to_file`].
pub async fn serialize_to_file_async<P: AsRef<Path>>(
    document: &Document,
    path: P,
    cancel: &CancellationToken,
) -> PixiResult<u64> {
    let mut file = tokio::fs::File::create(path).await?;
    let written = serialize_async(document, &mut file, cancel).await?;
    file.flush().await?;
    Ok(written)
}

/// Read a container of any supported version into a [`Document`].
///
/// The document's version fields are stamped from the header. Unsupported
/// majors and files demanding a newer parser fail with
/// [`PixiError::UnsupportedVersion`]; the pre-versioning layout fails with
/// [`PixiError::LegacyFormatDetected`].
pub fn deserialize<R: Read>(source: &mut R, cancel: &CancellationToken) -> PixiResult<Document> {
    ensure_not_cancelled(cancel)?;
    let mut reader = CountingReader::new(source);
    let (version, min_version) = decode::read_validated_header(&mut reader)?;
    match version.major {
        4 => decode_container::<v4::V4, _>(&mut reader, version, min_version, cancel),
        5 => decode_container::<v5::V5, _>(&mut reader, version, min_version, cancel),
        _ => Err(no_parser(version, min_version)),
    }
}

/// [`deserialize`] from an in-memory buffer. An empty buffer is an input
/// error, raised before any decoding starts.
pub fn deserialize_bytes(bytes: &[u8], cancel: &CancellationToken) -> PixiResult<Document> {
    if bytes.is_empty() {
        return Err(PixiError::InvalidInput("empty input buffer".into()));
    }
    deserialize(&mut &bytes[..], cancel)
}

/// [`deserialize`] from a file.
pub fn deserialize_file<P: AsRef<Path>>(
    path: P,
    cancel: &CancellationToken,
) -> PixiResult<Document> {
    let mut reader = BufReader::new(File::open(path)?);
    deserialize(&mut reader, cancel)
}

/// Async twin of [`deserialize`].
pub async fn deserialize_async<R>(
    source: &mut R,
    cancel: &CancellationToken,
) -> PixiResult<Document>
where
    R: AsyncRead + Unpin,
{
    ensure_not_cancelled(cancel)?;
    let mut source = AsyncSource::new(source);
    let (version, min_version) = decode::read_validated_header_async(&mut source).await?;
    match version.major {
        4 => decode_container_async::<v4::V4, _>(&mut source, version, min_version, cancel).await,
        5 => decode_container_async::<v5::V5, _>(&mut source, version, min_version, cancel).await,
        _ => Err(no_parser(version, min_version)),
    }
}

/// Async twin of [`deserialize_file`].
pub async fn deserialize_file_async<P: AsRef<Path>>(
    path: P,
    cancel: &CancellationToken,
) -> PixiResult<Document> {
    let mut reader = tokio::io::BufReader::new(tokio::fs::File::open(path).await?);
    deserialize_async(&mut reader, cancel).await
}

fn no_parser(version: FormatVersion, min_version: FormatVersion) -> PixiError {
    PixiError::UnsupportedVersion {
        file: version,
        min_required: min_version,
        parser: CURRENT_VERSION,
    }
}

#[cfg(test)]
mod tests {
    use pixi_document::{
        AnimationData, Color, Corners, ElementKeyFrame, Folder, ImageContainer, ImageLayer,
        KeyFrameGroup, Mask, Node, NodeGraph, NodeProperty, RasterKeyFrame, ReferenceLayer,
        ResourceStorage, StructureMember, Vec2,
    };

    use crate::header::write_header;
    use crate::legacy::{LEGACY_IDENTIFIER, LEGACY_IDENTIFIER_OFFSET, LEGACY_SNIFF_LEN};

    use super::*;

    fn token() -> CancellationToken {
        CancellationToken::new()
    }

    fn layer_with_bytes(name: &str, width: i32, height: i32, bytes: &[u8]) -> ImageLayer {
        let mut layer = ImageLayer::new(name, width, height);
        layer.image = ImageContainer::new(bytes.to_vec());
        layer
    }

    /// 40x32, one swatch, an empty folder and a "Layer1" image layer
    /// holding four arbitrary bytes.
    fn small_document() -> Document {
        let mut document = Document::new(40, 32);
        document.swatches.add_rgba(234, 254, 153, 255);
        document
            .root
            .children
            .push(StructureMember::Folder(Folder::new("folder")));
        document
            .root
            .children
            .push(StructureMember::ImageLayer(layer_with_bytes(
                "Layer1",
                40,
                32,
                &[1, 2, 3, 4],
            )));
        document
    }

    /// A document exercising every structural feature the current version
    /// carries: nesting, masks, a reference layer, animation keyframes,
    /// embedded resources, and the node graph.
    fn full_document() -> Document {
        let mut document = Document::new(128, 96);
        document.swatches.add_rgb(10, 20, 30);
        document.swatches.add_rgba(40, 50, 60, 70);
        document.palette.add_rgb(1, 1, 1);
        document.preview = Some(vec![0xDE, 0xAD, 0xBE, 0xEF]);
        document.image_encoder = Some("png".into());

        let mut masked = layer_with_bytes("masked", 16, 16, &[11; 9]);
        masked.mask = Some(Mask {
            enabled: true,
            width: 16,
            height: 16,
            image: ImageContainer::new(vec![12; 5]),
            ..Mask::default()
        });

        let mut inner = Folder::new("inner");
        inner.mask = Some(Mask {
            image: ImageContainer::new(vec![13; 3]),
            ..Mask::default()
        });
        inner
            .children
            .push(StructureMember::ImageLayer(layer_with_bytes(
                "deep",
                8,
                8,
                &[14; 2],
            )));

        document.root.children.push(StructureMember::ImageLayer(masked));
        document.root.children.push(StructureMember::Folder(inner));
        document
            .root
            .children
            .push(StructureMember::ImageLayer(layer_with_bytes(
                "empty", 4, 4, &[],
            )));

        let mut reference = ReferenceLayer::default();
        reference.enabled = true;
        reference.topmost = true;
        reference.corners = Corners {
            top_left: Vec2::new(0.0, 0.0),
            top_right: Vec2::new(1.0, 0.0),
            bottom_left: Vec2::new(0.0, 1.0),
            bottom_right: Vec2::new(1.0, 1.0),
        };
        reference.width = 128.0;
        reference.height = 96.0;
        reference.image = ImageContainer::new(vec![15; 7]);
        document.reference_layer = Some(reference);

        let mut group = KeyFrameGroup {
            enabled: true,
            node_id: 3,
            ..KeyFrameGroup::default()
        };
        group.children.push(RasterKeyFrame {
            start_frame: 0,
            duration: 12,
            guid: 0x1111,
            layer_guid: 0x2222,
            image: ImageContainer::new(vec![16; 6]),
        });
        group.children.push(RasterKeyFrame {
            start_frame: 12,
            duration: 4,
            guid: 0x3333,
            layer_guid: 0x2222,
            image: ImageContainer::new(vec![17; 2]),
        });
        group.element_key_frames.push(ElementKeyFrame {
            key_frame_id: 1,
            node_id: 3,
        });
        document.animation_data = Some(AnimationData {
            key_frame_groups: vec![group],
            frame_rate: 30,
            ..AnimationData::default()
        });

        let mut resources = ResourceStorage::default();
        resources.add_from_bytes("brush.png", vec![18, 19]);
        document.resources = Some(resources);

        document.graph = Some(NodeGraph {
            nodes: vec![Node {
                id: 3,
                name: "output".into(),
                unique_node_name: "output#3".into(),
                position_x: 4.5,
                position_y: -2.0,
                properties: vec![NodeProperty {
                    name: "in".into(),
                    is_input: true,
                    value: None,
                }],
            }],
            connections: Vec::new(),
        });

        document
    }

    #[test]
    fn small_document_roundtrip() {
        let document = small_document();
        let bytes = serialize_to_vec(&document, &token()).unwrap();
        let decoded = deserialize_bytes(&bytes, &token()).unwrap();

        assert_eq!(decoded, document);
        assert_eq!(decoded.width, 40);
        assert_eq!(decoded.height, 32);
        assert_eq!(decoded.swatches.len(), 1);
        assert_eq!(decoded.swatches.0[0], Color::rgba(234, 254, 153, 255));
        let layer = match &decoded.root.children[1] {
            StructureMember::ImageLayer(layer) => layer,
            other => panic!("expected image layer, got {other:?}"),
        };
        assert_eq!(layer.image.bytes, vec![1, 2, 3, 4]);
        assert_eq!(decoded.version(), Some(CURRENT_VERSION));
        assert_eq!(decoded.min_version(), Some(MIN_SUPPORTED_VERSION));
    }

    #[test]
    fn full_document_roundtrip() {
        let document = full_document();
        let bytes = serialize_to_vec(&document, &token()).unwrap();
        let decoded = deserialize_bytes(&bytes, &token()).unwrap();
        assert_eq!(decoded, document);
    }

    #[test]
    fn reported_length_matches_output() {
        let document = full_document();
        let mut bytes = Vec::new();
        let written = serialize(&document, &mut bytes, &token()).unwrap();
        assert_eq!(written, bytes.len() as u64);
    }

    #[test]
    fn garbage_magic_is_invalid_format() {
        let mut bytes = serialize_to_vec(&small_document(), &token()).unwrap();
        bytes[0] ^= 0xFF;
        let err = deserialize_bytes(&bytes, &token()).unwrap_err();
        assert!(matches!(err, PixiError::InvalidFormat { .. }));
    }

    #[test]
    fn short_input_is_invalid_format() {
        let err = deserialize_bytes(&[20, 50, 49], &token()).unwrap_err();
        assert!(matches!(
            err,
            PixiError::InvalidFormat { ref reason, .. } if reason.contains("truncated")
        ));
    }

    #[test]
    fn empty_input_is_rejected_before_io() {
        let err = deserialize_bytes(&[], &token()).unwrap_err();
        assert!(matches!(err, PixiError::InvalidInput(_)));
    }

    #[test]
    fn legacy_identifier_beats_magic_mismatch() {
        let mut bytes = vec![0u8; LEGACY_SNIFF_LEN + 20];
        bytes[LEGACY_IDENTIFIER_OFFSET..LEGACY_IDENTIFIER_OFFSET + 8]
            .copy_from_slice(&LEGACY_IDENTIFIER.to_le_bytes());
        let err = deserialize_bytes(&bytes, &token()).unwrap_err();
        assert!(matches!(err, PixiError::LegacyFormatDetected));
    }

    #[test]
    fn unsupported_major_names_the_parser() {
        let mut bytes = write_header(FormatVersion::new(9, 0), FormatVersion::new(9, 0)).to_vec();
        bytes.extend_from_slice(&[0u8; 16]);
        let err = deserialize_bytes(&bytes, &token()).unwrap_err();
        match err {
            PixiError::UnsupportedVersion { file, parser, .. } => {
                assert_eq!(file, FormatVersion::new(9, 0));
                assert_eq!(parser, CURRENT_VERSION);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn newer_minor_min_version_is_gated() {
        let mut bytes = write_header(FormatVersion::new(5, 7), FormatVersion::new(5, 7)).to_vec();
        bytes.extend_from_slice(&[0u8; 16]);
        let err = deserialize_bytes(&bytes, &token()).unwrap_err();
        assert!(matches!(
            err,
            PixiError::UnsupportedVersion { min_required, .. } if min_required == FormatVersion::new(5, 7)
        ));
    }

    #[test]
    fn truncated_pool_names_the_member_and_keeps_a_partial() {
        let document = small_document();
        let mut bytes = serialize_to_vec(&document, &token()).unwrap();
        bytes.truncate(bytes.len() - 2);

        let err = deserialize_bytes(&bytes, &token()).unwrap_err();
        match err {
            PixiError::InvalidFormat { reason, partial } => {
                assert!(reason.contains("Image 'Layer1' [1]"), "reason: {reason}");
                assert!(reason.contains("stream position"), "reason: {reason}");
                let partial = partial.expect("partial document");
                assert_eq!(partial.width, 40);
                assert_eq!(partial.version(), Some(CURRENT_VERSION));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn zero_length_image_roundtrips_without_hanging() {
        let mut document = Document::new(4, 4);
        document
            .root
            .children
            .push(StructureMember::ImageLayer(layer_with_bytes(
                "void", 4, 4, &[],
            )));

        let bytes = serialize_to_vec(&document, &token()).unwrap();
        let decoded = deserialize_bytes(&bytes, &token()).unwrap();
        assert_eq!(decoded, document);
    }

    #[test]
    fn preview_roundtrips_and_zero_means_none() {
        let mut document = small_document();
        document.preview = Some(vec![7; 10]);
        let bytes = serialize_to_vec(&document, &token()).unwrap();
        let decoded = deserialize_bytes(&bytes, &token()).unwrap();
        assert_eq!(decoded.preview.as_deref(), Some(&[7u8; 10][..]));

        let plain = serialize_to_vec(&small_document(), &token()).unwrap();
        assert_eq!(&plain[HEADER_LEN..HEADER_LEN + 4], &[0u8; 4]);
        let decoded = deserialize_bytes(&plain, &token()).unwrap();
        assert!(decoded.preview.is_none());
    }

    #[test]
    fn cancellation_before_io_writes_nothing() {
        let cancel = token();
        cancel.cancel();

        let mut sink = Vec::new();
        let err = serialize(&small_document(), &mut sink, &cancel).unwrap_err();
        assert!(matches!(err, PixiError::Cancelled));
        assert!(sink.is_empty());

        let bytes = serialize_to_vec(&small_document(), &token()).unwrap();
        let err = deserialize_bytes(&bytes, &cancel).unwrap_err();
        assert!(matches!(err, PixiError::Cancelled));
    }

    #[test]
    fn dispatch_through_parser_for_roundtrips() {
        let document = small_document();
        let bytes = serialize_to_vec(&document, &token()).unwrap();

        let (version, _) = detect_version_bytes(&bytes).unwrap();
        let codec = parser_for(version).expect("compatible parser");
        let decoded = codec.deserialize(&mut &bytes[..], &token()).unwrap();
        assert_eq!(decoded, document);
    }

    #[test]
    fn file_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("doc.pixi");

        let document = full_document();
        serialize_to_file(&document, &path, &token()).unwrap();
        let decoded = deserialize_file(&path, &token()).unwrap();
        assert_eq!(decoded, document);
    }

    #[tokio::test]
    async fn async_output_matches_sync() {
        let document = full_document();
        let sync_bytes = serialize_to_vec(&document, &token()).unwrap();

        let mut async_bytes = Vec::new();
        serialize_async(&document, &mut async_bytes, &token())
            .await
            .unwrap();
        assert_eq!(async_bytes, sync_bytes);
    }

    #[tokio::test]
    async fn async_decode_matches_sync() {
        let document = full_document();
        let bytes = serialize_to_vec(&document, &token()).unwrap();

        let mut cursor = std::io::Cursor::new(bytes);
        let decoded = deserialize_async(&mut cursor, &token()).await.unwrap();
        assert_eq!(decoded, document);
    }

    #[tokio::test]
    async fn async_file_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("doc.pixi");

        let document = small_document();
        serialize_to_file_async(&document, &path, &token())
            .await
            .unwrap();
        let decoded = deserialize_file_async(&path, &token()).await.unwrap();
        assert_eq!(decoded, document);
    }

    #[tokio::test]
    async fn async_cancellation_before_io() {
        let cancel = token();
        cancel.cancel();

        let mut sink = Vec::new();
        let err = serialize_async(&small_document(), &mut sink, &cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, PixiError::Cancelled));
        assert!(sink.is_empty());
    }
}
