//! Version dispatcher.
//!
//! The container layout and metadata object model differ across format
//! major versions, so each supported major gets its own codec. Dispatch
//! peeks the header, picks the codec, and hands the stream over.

use std::io::{Read, Seek, SeekFrom, Write};

use pixi_document::{Document, FormatVersion};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio_util::sync::CancellationToken;

use crate::error::{PixiError, PixiResult};
use crate::header::validate_header;
use crate::index::{PlanCursor, ResourcePlan, TraversalOrder};
use crate::io::read_up_to;
use crate::legacy::{matches_legacy, LEGACY_SNIFF_LEN};

pub mod v4;
pub mod v5;

/// How the bytes after the metadata blob are laid out.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum PoolLayout {
    /// The trailing resource pool addressed by the plan.
    ResourcePool,
    /// One `[i32 len][bytes]` block per image layer, in layer order. Only
    /// produced by early 4.x writers, before the resource pool existed.
    PerLayerBlocks,
}

/// Everything the shared encode/decode engine needs to know about one
/// format major version.
pub(crate) trait VersionFormat {
    type Wire: Serialize + DeserializeOwned;

    const VERSION: FormatVersion;
    const MIN_VERSION: FormatVersion;
    const ORDER: TraversalOrder;

    /// Reject documents this version cannot express. Runs before any byte
    /// is written.
    fn check_representable(_document: &Document) -> PixiResult<()> {
        Ok(())
    }

    fn to_wire(document: &Document, cursor: &mut PlanCursor<'_>) -> PixiResult<Self::Wire>;

    fn from_wire(wire: Self::Wire) -> PixiResult<(Document, ResourcePlan)>;

    fn pool_layout(_wire: &Self::Wire) -> PoolLayout {
        PoolLayout::ResourcePool
    }
}

/// A version-specific container codec, selected by [`parser_for`].
///
/// The trait covers the blocking surface only; the async twins live as free
/// functions in the per-version modules ([`v4`], [`v5`]) since async methods
/// would cost this trait its object safety.
pub trait PixiCodec: Send + Sync {
    /// The version this codec writes into headers.
    fn version(&self) -> FormatVersion;

    /// The oldest parser able to read files this codec writes.
    fn min_supported(&self) -> FormatVersion;

    fn serialize(
        &self,
        document: &Document,
        sink: &mut dyn Write,
        cancel: &CancellationToken,
    ) -> PixiResult<u64>;

    fn deserialize(
        &self,
        source: &mut dyn Read,
        cancel: &CancellationToken,
    ) -> PixiResult<Document>;
}

/// The codec for a format major version, or `None` when no compatible
/// parser exists.
pub fn parser_for(version: FormatVersion) -> Option<&'static dyn PixiCodec> {
    match version.major {
        4 => Some(&v4::CodecV4),
        5 => Some(&v5::CodecV5),
        _ => None,
    }
}

/// Read the version pair from a buffer without consuming anything.
///
/// A buffer matching the pre-versioning layout reports
/// [`PixiError::LegacyFormatDetected`] before any header validation.
pub fn detect_version_bytes(bytes: &[u8]) -> PixiResult<(FormatVersion, FormatVersion)> {
    if matches_legacy(bytes) {
        return Err(PixiError::LegacyFormatDetected);
    }
    validate_header(bytes)
}

/// Peek the header of a seekable stream and rewind to where it was, so the
/// stream can be handed to the selected codec's full deserialize routine.
pub fn detect_version<R: Read + Seek>(
    source: &mut R,
) -> PixiResult<(FormatVersion, FormatVersion)> {
    let mut buf = [0u8; LEGACY_SNIFF_LEN];
    let read = read_up_to(source, &mut buf)?;
    source.seek(SeekFrom::Current(-(read as i64)))?;
    detect_version_bytes(&buf[..read])
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use crate::header::write_header;
    use crate::legacy::{LEGACY_IDENTIFIER, LEGACY_IDENTIFIER_OFFSET};

    use super::*;

    #[test]
    fn dispatch_covers_supported_majors() {
        assert_eq!(
            parser_for(FormatVersion::new(4, 0)).map(|p| p.version()),
            Some(FormatVersion::new(4, 0))
        );
        assert_eq!(
            parser_for(FormatVersion::new(5, 0)).map(|p| p.version()),
            Some(FormatVersion::new(5, 0))
        );
        assert!(parser_for(FormatVersion::new(3, 0)).is_none());
        assert!(parser_for(FormatVersion::new(6, 1)).is_none());
    }

    #[test]
    fn detect_rewinds_the_stream() {
        let mut bytes = write_header(FormatVersion::new(5, 0), FormatVersion::new(5, 0)).to_vec();
        bytes.extend_from_slice(&[1, 2, 3]);

        let mut cursor = Cursor::new(bytes);
        let (version, _) = detect_version(&mut cursor).unwrap();
        assert_eq!(version, FormatVersion::new(5, 0));
        assert_eq!(cursor.position(), 0);
    }

    #[test]
    fn detect_prefers_legacy_signal_over_magic_mismatch() {
        let mut bytes = vec![0u8; LEGACY_SNIFF_LEN + 10];
        bytes[LEGACY_IDENTIFIER_OFFSET..LEGACY_IDENTIFIER_OFFSET + 8]
            .copy_from_slice(&LEGACY_IDENTIFIER.to_le_bytes());

        let err = detect_version_bytes(&bytes).unwrap_err();
        assert!(matches!(err, PixiError::LegacyFormatDetected));
    }

    #[test]
    fn short_input_is_truncated_header() {
        let err = detect_version_bytes(&[20, 50]).unwrap_err();
        assert!(matches!(err, PixiError::InvalidFormat { .. }));
    }

    #[test]
    fn pre_cancelled_dispatch_reads_nothing() {
        let cancel = CancellationToken::new();
        cancel.cancel();

        let bytes = write_header(FormatVersion::new(5, 0), FormatVersion::new(5, 0)).to_vec();
        let mut cursor = Cursor::new(bytes);
        let codec = parser_for(FormatVersion::new(5, 0)).unwrap();
        let err = codec.deserialize(&mut cursor, &cancel).unwrap_err();
        assert!(matches!(err, PixiError::Cancelled));
        assert_eq!(cursor.position(), 0);
    }

    #[tokio::test]
    async fn pre_cancelled_async_decode_reads_nothing() {
        let cancel = CancellationToken::new();
        cancel.cancel();

        let bytes = write_header(FormatVersion::new(5, 0), FormatVersion::new(5, 0)).to_vec();
        let mut cursor = Cursor::new(bytes);
        let err = v5::deserialize_async(&mut cursor, &cancel).await.unwrap_err();
        assert!(matches!(err, PixiError::Cancelled));
        assert_eq!(cursor.position(), 0);
    }
}
