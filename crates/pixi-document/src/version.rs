use std::fmt;

use serde::{Deserialize, Serialize};

/// A `.pixi` format version as a (major, minor) pair.
///
/// Versions order lexicographically: major first, then minor. The container
/// header stores both the file's version and the minimum version a reader
/// must implement to parse it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct FormatVersion {
    pub major: i32,
    pub minor: i32,
}

impl FormatVersion {
    pub const fn new(major: i32, minor: i32) -> Self {
        Self { major, minor }
    }
}

impl fmt::Display for FormatVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}
