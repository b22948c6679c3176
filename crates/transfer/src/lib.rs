//! Chunk geometry, payload preparation and session bookkeeping for
//! chunked uploads to the storage service.

mod archive;
mod chunked;
mod progress;
mod scanner;
mod types;
mod validation;

pub use archive::{TempArchive, package_directory};
pub use chunked::{ChunkPlan, ChunkReader, calculate_file_checksum, checksum_bytes};
pub use progress::{
    FINALIZE_CEILING, ProgressEstimator, ProgressPhase, ProgressState, TRANSFER_CEILING,
    finalize_ramp, time_constant, transfer_curve,
};
pub use scanner::{FileEntry, ScanSummary, scan_directory};
pub use types::{Chunk, ChunkStatus, SessionPhase, UploadResult, UploadSession};
pub use validation::SizeLimits;

/// Default single-item limit: 200 MiB.
pub const DEFAULT_MAX_FILE_BYTES: u64 = 200 * 1024 * 1024;

/// Default aggregate limit for a directory: 1 GiB.
pub const DEFAULT_MAX_TOTAL_BYTES: u64 = 1024 * 1024 * 1024;

/// Errors produced by the transfer crate.
#[derive(Debug, thiserror::Error)]
pub enum TransferError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("archive error: {0}")]
    Archive(#[from] zip::result::ZipError),

    #[error("invalid chunk geometry: {0}")]
    InvalidGeometry(String),

    #[error("chunk {index} not acknowledged ({status:?})")]
    ChunkNotAcked { index: u32, status: ChunkStatus },

    #[error("chunk index {index} out of range (total {total})")]
    ChunkOutOfRange { index: u32, total: u32 },

    #[error("{what} is {size} bytes, limit is {limit} bytes")]
    LimitExceeded { what: String, size: u64, limit: u64 },

    #[error("file name is not valid UTF-8: {0}")]
    InvalidFileName(String),

    #[error("directory contains no files: {0}")]
    EmptyDirectory(String),

    #[error("invalid session transition: {current:?} -> {requested:?}")]
    InvalidTransition {
        current: SessionPhase,
        requested: SessionPhase,
    },

    #[error("result already recorded for session {0}")]
    ResultAlreadySet(String),
}
