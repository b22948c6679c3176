//! Client-side chunked upload pipeline for the capystore storage service.
//!
//! This crate holds the upload business logic. It has no UI; hosts supply
//! an identity, optionally a history recorder, and consume
//! [`PipelineEvent`]s for display.
//!
//! # Pipeline
//!
//! 1. **Validate**: size limits, checked before any network call
//! 2. **Package**: directories are zipped into a temporary archive
//! 3. **Init**: open a session and receive the chunk geometry
//! 4. **Upload**: send chunks concurrently with per-chunk retry
//! 5. **Complete**: request finalization, receive a trace id
//! 6. **Poll**: wait for the content hash

pub mod chunks;
pub mod client;
pub mod connection;
pub mod error;
pub mod identity;
pub mod pipeline;
pub mod poller;
pub mod session;
pub mod types;

#[cfg(test)]
mod mock;

pub use chunks::ChunkUploader;
pub use client::HttpStorageClient;
pub use connection::{ClientError, ConnFuture, StorageConnection};
pub use error::UploadError;
pub use identity::{HistoryRecorder, IdentityProvider, StaticIdentity};
pub use pipeline::UploadPipeline;
pub use poller::{PollOutcome, StatusPoller};
pub use session::{complete_session, init_session};
pub use types::{HistoryRecord, Payload, PipelineEvent, PipelineStage, UploadConfig};

// Re-exported so hosts need not depend on the transfer crate directly.
pub use capystore_transfer::{ProgressPhase, ProgressState, SizeLimits, UploadResult};
