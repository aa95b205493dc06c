use pixi_document::FormatVersion;

use crate::error::{PixiError, PixiResult};

/// The five magic bytes every versioned `.pixi` file starts with.
pub const MAGIC: [u8; 5] = [20, 50, 49, 58, 49];

pub const MAGIC_LEN: usize = 5;

/// Fixed header length: magic + two little-endian (major, minor) i32 pairs.
pub const HEADER_LEN: usize = MAGIC_LEN + 4 * 4;

/// Build the fixed-length container header.
pub fn write_header(version: FormatVersion, min_version: FormatVersion) -> [u8; HEADER_LEN] {
    let mut header = [0u8; HEADER_LEN];
    header[..MAGIC_LEN].copy_from_slice(&MAGIC);
    write_version(&mut header, version, MAGIC_LEN);
    write_version(&mut header, min_version, MAGIC_LEN + 8);
    header
}

/// Validate a header prefix and extract (version, min_version).
///
/// A buffer shorter than [`HEADER_LEN`] is a truncated header; a wrong magic
/// is a format mismatch. Both are `InvalidFormat`, with distinct reasons.
pub fn validate_header(bytes: &[u8]) -> PixiResult<(FormatVersion, FormatVersion)> {
    if bytes.len() < HEADER_LEN {
        return Err(PixiError::invalid_format(format!(
            "truncated header: expected {HEADER_LEN} bytes, got {}",
            bytes.len()
        )));
    }
    if bytes[..MAGIC_LEN] != MAGIC {
        return Err(PixiError::invalid_format("magic did not match"));
    }

    let version = read_version(bytes, MAGIC_LEN);
    let min_version = read_version(bytes, MAGIC_LEN + 8);
    Ok((version, min_version))
}

fn write_version(header: &mut [u8], version: FormatVersion, at: usize) {
    header[at..at + 4].copy_from_slice(&version.major.to_le_bytes());
    header[at + 4..at + 8].copy_from_slice(&version.minor.to_le_bytes());
}

fn read_version(bytes: &[u8], at: usize) -> FormatVersion {
    let major = i32::from_le_bytes(bytes[at..at + 4].try_into().unwrap());
    let minor = i32::from_le_bytes(bytes[at + 4..at + 8].try_into().unwrap());
    FormatVersion::new(major, minor)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_roundtrip() {
        let header = write_header(FormatVersion::new(5, 0), FormatVersion::new(4, 2));
        let (version, min_version) = validate_header(&header).unwrap();
        assert_eq!(version, FormatVersion::new(5, 0));
        assert_eq!(min_version, FormatVersion::new(4, 2));
    }

    #[test]
    fn header_is_fixed_length() {
        let header = write_header(FormatVersion::new(5, 0), FormatVersion::new(5, 0));
        assert_eq!(header.len(), 21);
        assert_eq!(&header[..5], &MAGIC);
    }

    #[test]
    fn versions_are_little_endian_pairs() {
        let header = write_header(FormatVersion::new(4, 1), FormatVersion::new(2, 3));
        assert_eq!(&header[5..13], &[4, 0, 0, 0, 1, 0, 0, 0]);
        assert_eq!(&header[13..21], &[2, 0, 0, 0, 3, 0, 0, 0]);
    }

    #[test]
    fn short_buffer_is_truncated_header() {
        let err = validate_header(&[20, 50, 49]).unwrap_err();
        assert!(matches!(
            err,
            crate::PixiError::InvalidFormat { ref reason, .. } if reason.contains("truncated")
        ));
    }

    #[test]
    fn wrong_magic_rejected() {
        let mut header = write_header(FormatVersion::new(5, 0), FormatVersion::new(5, 0));
        header[0] = 0xFF;
        let err = validate_header(&header).unwrap_err();
        assert!(matches!(
            err,
            crate::PixiError::InvalidFormat { ref reason, .. } if reason.contains("magic")
        ));
    }
}
