use thiserror::Error;

/// Errors produced by document model operations.
#[derive(Debug, Error, PartialEq)]
pub enum DocumentError {
    #[error("opacity must lie in [0, 1], got {0}")]
    OpacityOutOfRange(f32),

    #[error("packed color data length must be a multiple of 4, got {0}")]
    InvalidPackedColorLength(usize),
}
