//! Fallback pipeline error types

use std::fmt;

use crate::protocol::SessionId;

/// Error in the server-relayed fallback pipeline.
#[derive(Debug)]
pub enum FallbackError {
    /// The uploaded segment's content type is not an accepted media
    /// container. Maps to a 400 on the upload endpoint.
    InvalidSegmentFormat(String),

    /// The persisted segment is smaller than the plausibility floor.
    /// Maps to a 400 on the upload endpoint.
    SegmentTooSmall { size: u64, min: u64 },

    /// Upload for a session whose media has already been cleaned up
    /// (a retried segment racing the disconnect). Maps to a 500; the
    /// directory is never recreated.
    SessionClosed(SessionId),

    /// The upload endpoint answered 400; the reason string is the
    /// endpoint's. Client-side counterpart of the two rejection
    /// variants above.
    UploadRejected(String),

    /// Filesystem failure while persisting a segment or publishing a
    /// manifest. Maps to a 500 on the upload endpoint.
    Io(std::io::Error),

    /// The consuming side's bounded manifest poll elapsed with no
    /// manifest appearing.
    ManifestUnavailable { attempts: u32 },

    /// The per-session transcode worker failed or exited unexpectedly.
    WorkerFailure(String),
}

impl fmt::Display for FallbackError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FallbackError::InvalidSegmentFormat(content_type) => {
                write!(f, "Unsupported segment content type: {}", content_type)
            }
            FallbackError::SegmentTooSmall { size, min } => {
                write!(f, "Segment too small: {} bytes (minimum {})", size, min)
            }
            FallbackError::SessionClosed(id) => {
                write!(f, "Session {} is closed, upload discarded", id)
            }
            FallbackError::UploadRejected(reason) => {
                write!(f, "Upload rejected: {}", reason)
            }
            FallbackError::Io(e) => write!(f, "Media storage I/O error: {}", e),
            FallbackError::ManifestUnavailable { attempts } => {
                write!(f, "No manifest after {} probes", attempts)
            }
            FallbackError::WorkerFailure(reason) => {
                write!(f, "Transcode worker failure: {}", reason)
            }
        }
    }
}

impl std::error::Error for FallbackError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            FallbackError::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for FallbackError {
    fn from(e: std::io::Error) -> Self {
        FallbackError::Io(e)
    }
}

impl FallbackError {
    /// Whether the error is the uploader's fault (a rejection) rather
    /// than the server's. Rejections are not retried.
    pub fn is_rejection(&self) -> bool {
        matches!(
            self,
            FallbackError::InvalidSegmentFormat(_)
                | FallbackError::SegmentTooSmall { .. }
                | FallbackError::UploadRejected(_)
        )
    }
}
