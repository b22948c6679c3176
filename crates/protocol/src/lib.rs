//! Wire types for the chunked upload protocol of the storage service.

pub mod envelope;
pub mod messages;

// Re-export primary types for convenience.
pub use envelope::{Envelope, SUCCESS_CODE};
pub use messages::{
    ChunkAck, CompleteSessionRequest, CompleteSessionResponse, InitSessionRequest,
    InitSessionResponse, StatusQuery, StatusResponse, StatusResult, UploadChunkQuery,
};
