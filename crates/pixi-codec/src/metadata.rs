//! Metadata codec adapter.
//!
//! The container treats the structured-metadata encoding as a black box: a
//! generic object-graph serializer producing a self-delimited blob. This
//! module is the only place that names the underlying codec, so the rest of
//! the crate stays agnostic about it.

use std::io::{Cursor, Read};

use pixi_document::{Document, FormatVersion};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::io::AsyncRead;

use crate::error::{PixiError, PixiResult};
use crate::io::AsyncSource;

const CHUNK: usize = 8 * 1024;

pub(crate) fn encode_metadata<T: Serialize>(value: &T) -> PixiResult<Vec<u8>> {
    bincode::serialize(value)
        .map_err(|e| PixiError::invalid_format(format!("failed to encode document metadata: {e}")))
}

/// Decode a metadata blob straight off a blocking stream. The codec framing
/// is self-delimiting, so this consumes exactly the blob's bytes and leaves
/// the cursor at the start of the resource pool.
pub(crate) fn decode_metadata<T, R>(reader: &mut R) -> Result<T, bincode::Error>
where
    T: DeserializeOwned,
    R: Read,
{
    bincode::deserialize_from(reader)
}

/// Async decode of the self-delimited blob.
///
/// With no length prefix to go on, the decoder buffers chunks and retries
/// until the codec stops reporting a premature end of input. Bytes read past
/// the blob's end are handed back to the source for the resource pool reads.
pub(crate) async fn decode_metadata_async<T, R>(
    source: &mut AsyncSource<R>,
) -> Result<T, bincode::Error>
where
    T: DeserializeOwned,
    R: AsyncRead + Unpin,
{
    let mut accum: Vec<u8> = Vec::new();
    loop {
        if !accum.is_empty() {
            let mut cursor = Cursor::new(accum.as_slice());
            match bincode::deserialize_from::<_, T>(&mut cursor) {
                Ok(value) => {
                    let consumed = cursor.position() as usize;
                    source.unread(&accum[consumed..]);
                    return Ok(value);
                }
                Err(err) if !is_eof(&err) => return Err(err),
                Err(_) => {}
            }
        }

        let mut chunk = vec![0u8; CHUNK];
        let read = source.read(&mut chunk).await?;
        if read == 0 {
            // Stream ended mid-blob; surface the codec's own verdict.
            let mut cursor = Cursor::new(accum.as_slice());
            return bincode::deserialize_from::<_, T>(&mut cursor);
        }
        accum.extend_from_slice(&chunk[..read]);
    }
}

fn is_eof(err: &bincode::Error) -> bool {
    matches!(
        &**err,
        bincode::ErrorKind::Io(e) if e.kind() == std::io::ErrorKind::UnexpectedEof
    )
}

/// Wrap a metadata decode failure, preserving the header's version info in a
/// partial document for caller diagnostics.
pub(crate) fn metadata_invalid(
    err: bincode::Error,
    version: FormatVersion,
    min_version: FormatVersion,
) -> PixiError {
    let mut partial = Document::default();
    partial.stamp_versions(version, min_version);
    PixiError::invalid_format_with(format!("failed to decode document metadata: {err}"), partial)
}

#[cfg(test)]
mod tests {
    use serde::Deserialize;

    use super::*;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Sample {
        id: u32,
        name: String,
        payload: Vec<u8>,
    }

    fn sample() -> Sample {
        Sample {
            id: 7,
            name: "meta".into(),
            payload: vec![1, 2, 3],
        }
    }

    #[test]
    fn blob_is_self_delimited() {
        let mut bytes = encode_metadata(&sample()).unwrap();
        bytes.extend_from_slice(&[0xAA, 0xBB]);

        let mut cursor = Cursor::new(bytes.as_slice());
        let decoded: Sample = decode_metadata(&mut cursor).unwrap();
        assert_eq!(decoded, sample());

        let mut rest = Vec::new();
        cursor.read_to_end(&mut rest).unwrap();
        assert_eq!(rest, [0xAA, 0xBB]);
    }

    #[tokio::test]
    async fn async_decode_returns_surplus_to_source() {
        let mut bytes = encode_metadata(&sample()).unwrap();
        bytes.extend_from_slice(&[9, 8, 7]);

        let mut source = AsyncSource::new(Cursor::new(bytes));
        let decoded: Sample = decode_metadata_async(&mut source).await.unwrap();
        assert_eq!(decoded, sample());

        let mut rest = [0u8; 3];
        assert_eq!(source.read_up_to(&mut rest).await.unwrap(), 3);
        assert_eq!(rest, [9, 8, 7]);
    }

    #[tokio::test]
    async fn async_decode_rejects_truncated_blob() {
        let bytes = encode_metadata(&sample()).unwrap();
        let truncated = &bytes[..bytes.len() - 2];

        let mut source = AsyncSource::new(Cursor::new(truncated.to_vec()));
        let err = decode_metadata_async::<Sample, _>(&mut source).await.unwrap_err();
        assert!(is_eof(&err));
    }

    #[test]
    fn metadata_failure_carries_stamped_partial() {
        let err = decode_metadata::<Sample, _>(&mut Cursor::new(&[][..])).unwrap_err();
        let wrapped = metadata_invalid(err, FormatVersion::new(5, 0), FormatVersion::new(5, 0));
        match wrapped {
            PixiError::InvalidFormat { partial, .. } => {
                let partial = partial.expect("partial document");
                assert_eq!(partial.version(), Some(FormatVersion::new(5, 0)));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
