//! Storage connection trait.
//!
//! `StorageConnection` abstracts the four calls of the chunked upload
//! protocol. [`HttpStorageClient`](crate::client::HttpStorageClient) is the
//! production implementation; tests script the calls with mocks.

use std::future::Future;
use std::pin::Pin;

use bytes::Bytes;
use capystore_protocol::{
    ChunkAck, CompleteSessionRequest, CompleteSessionResponse, InitSessionRequest,
    InitSessionResponse, StatusQuery, StatusResponse, UploadChunkQuery,
};

/// Boxed future returned by [`StorageConnection`] methods.
pub type ConnFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, ClientError>> + Send + 'a>>;

/// Errors from a storage connection.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("HTTP error: {0}")]
    Http(reqwest::Error),

    #[error("request timed out")]
    Timeout,

    #[error("API error {status}: {body}")]
    Api { status: u16, body: String },

    #[error("server error {code}: {msg}")]
    Server { code: i32, msg: String },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("response carried no data")]
    EmptyData,
}

impl From<reqwest::Error> for ClientError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout
        } else {
            Self::Http(err)
        }
    }
}

impl ClientError {
    /// Returns `true` if the per-request transport timeout was exceeded.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout)
    }
}

/// Abstract connection to the storage service.
pub trait StorageConnection: Send + Sync {
    /// Opens a transfer session and returns the chunk geometry.
    fn init_session(&self, req: &InitSessionRequest) -> ConnFuture<'_, InitSessionResponse>;

    /// Uploads the bytes of one chunk. Retries pass the same buffer again.
    fn upload_chunk(&self, query: &UploadChunkQuery, data: Bytes) -> ConnFuture<'_, ChunkAck>;

    /// Requests finalization once every chunk is acknowledged.
    fn complete_session(
        &self,
        req: &CompleteSessionRequest,
    ) -> ConnFuture<'_, CompleteSessionResponse>;

    /// Reads the state of the finalize job.
    fn session_status(&self, query: &StatusQuery) -> ConnFuture<'_, StatusResponse>;
}
