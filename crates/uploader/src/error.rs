//! Upload error types.

use std::time::Duration;

use capystore_transfer::TransferError;

/// Errors produced by the upload pipeline.
#[derive(Debug, thiserror::Error)]
pub enum UploadError {
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("session error: {0}")]
    Session(String),

    #[error("chunk {} of {total} failed after {attempts} attempt(s): {reason}", .index + 1)]
    Chunk {
        index: u32,
        total: u32,
        attempts: u32,
        reason: String,
    },

    #[error("status polling failed after {errors} consecutive error(s): {reason}")]
    Poll { errors: u32, reason: String },

    #[error("service did not finish storing the upload within {:.0}s", .elapsed.as_secs_f64())]
    PollTimeout { elapsed: Duration },

    #[error("service reported failure: {0}")]
    ServerFailure(String),

    #[error("request timed out during {0}")]
    RequestTimeout(&'static str),

    #[error("packaging failed: {0}")]
    Packaging(String),

    #[error("identity unavailable: {0}")]
    Identity(String),

    #[error("cancelled")]
    Cancelled,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("transfer error: {0}")]
    Transfer(#[from] TransferError),
}

impl UploadError {
    /// Maps rejections of the local source (size limits, empty directories,
    /// unusable file names) to `Validation`, everything else to `Transfer`.
    pub(crate) fn from_source(err: TransferError) -> Self {
        match err {
            TransferError::LimitExceeded { .. }
            | TransferError::EmptyDirectory(_)
            | TransferError::InvalidFileName(_) => Self::Validation(err.to_string()),
            other => Self::Transfer(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chunk_error_is_one_based() {
        let err = UploadError::Chunk {
            index: 1,
            total: 3,
            attempts: 3,
            reason: "server error 500: boom".into(),
        };
        assert_eq!(
            err.to_string(),
            "chunk 2 of 3 failed after 3 attempt(s): server error 500: boom"
        );
    }

    #[test]
    fn poll_timeout_message() {
        let err = UploadError::PollTimeout {
            elapsed: Duration::from_secs(300),
        };
        assert!(err.to_string().contains("300s"));
    }

    #[test]
    fn limit_errors_become_validation() {
        let err = UploadError::from_source(TransferError::LimitExceeded {
            what: "file a.bin".into(),
            size: 2,
            limit: 1,
        });
        assert!(matches!(err, UploadError::Validation(_)));

        let err = UploadError::from_source(TransferError::InvalidGeometry("x".into()));
        assert!(matches!(err, UploadError::Transfer(_)));
    }
}
