use pixi_document::{Document, FormatVersion};
use thiserror::Error;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Error)]
pub enum PixiError {
    /// The bytes are not a readable `.pixi` container: bad magic, truncated
    /// header or preview, undecodable metadata, or a resource byte-count
    /// mismatch. Where the header was already parsed, `partial` carries a
    /// version-stamped document skeleton for caller diagnostics.
    #[error("invalid .pixi file: {reason}")]
    InvalidFormat {
        reason: String,
        partial: Option<Box<Document>>,
    },

    /// The stream matches the pre-versioning `.pixi` layout. The file is
    /// recognized, just not supported by the current reader; see
    /// [`crate::legacy`] for the separate legacy-only decode path.
    #[error("file uses the pre-versioning legacy .pixi layout")]
    LegacyFormatDetected,

    /// The header parsed, but the file demands a newer parser than this one.
    #[error(
        ".pixi version {file} is not supported: minimum required parser is \
         {min_required}, this codec implements {parser}"
    )]
    UnsupportedVersion {
        file: FormatVersion,
        min_required: FormatVersion,
        parser: FormatVersion,
    },

    /// Cooperative cancellation was requested; the operation stopped with no
    /// partial result. A half-written sink is the caller's to clean up.
    #[error("operation cancelled")]
    Cancelled,

    /// A local precondition failed before any I/O was attempted.
    #[error("{0}")]
    InvalidInput(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type PixiResult<T> = Result<T, PixiError>;

impl PixiError {
    pub(crate) fn invalid_format(reason: impl Into<String>) -> Self {
        Self::InvalidFormat {
            reason: reason.into(),
            partial: None,
        }
    }

    pub(crate) fn invalid_format_with(reason: impl Into<String>, partial: Document) -> Self {
        Self::InvalidFormat {
            reason: reason.into(),
            partial: Some(Box::new(partial)),
        }
    }
}

/// Cooperative cancellation check, called at every I/O boundary.
pub(crate) fn ensure_not_cancelled(cancel: &CancellationToken) -> PixiResult<()> {
    if cancel.is_cancelled() {
        return Err(PixiError::Cancelled);
    }
    Ok(())
}
