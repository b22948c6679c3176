//! Bounded-concurrency chunk upload with per-chunk retry.
//!
//! Workers pull chunk indices from a shared counter, so at most
//! `concurrency` chunks are in flight. The first chunk to exhaust its retry
//! budget cancels the remaining workers; its error is the one reported.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Mutex, PoisonError};

use bytes::Bytes;
use capystore_protocol::UploadChunkQuery;
use capystore_transfer::{ChunkReader, UploadSession};
use futures_util::future::join_all;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::connection::StorageConnection;
use crate::error::UploadError;
use crate::types::UploadConfig;

/// Uploads every chunk of a session.
pub struct ChunkUploader<'a> {
    conn: &'a dyn StorageConnection,
    config: &'a UploadConfig,
    cancel: CancellationToken,
}

/// Shared state of one `upload_all` call.
struct Batch<'a> {
    session: &'a UploadSession,
    reader: &'a ChunkReader,
    uid: &'a str,
    next: AtomicU32,
    failure: Mutex<Option<UploadError>>,
}

impl<'a> ChunkUploader<'a> {
    /// `cancel` should be a child of the pipeline token: a chunk failure
    /// cancels it to stop sibling workers without cancelling the caller.
    pub fn new(
        conn: &'a dyn StorageConnection,
        config: &'a UploadConfig,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            conn,
            config,
            cancel,
        }
    }

    /// Uploads all chunks and returns once each one is acknowledged.
    pub async fn upload_all(
        &self,
        session: &UploadSession,
        reader: &ChunkReader,
        uid: &str,
    ) -> Result<(), UploadError> {
        let total = session.total_chunks();
        if total == 0 {
            return Ok(());
        }

        let batch = Batch {
            session,
            reader,
            uid,
            next: AtomicU32::new(0),
            failure: Mutex::new(None),
        };

        let workers = self.config.concurrency.clamp(1, total as usize);
        debug!(session = %session.id(), chunks = total, workers, "uploading chunks");
        join_all((0..workers).map(|_| self.worker(&batch))).await;

        if let Some(err) = batch
            .failure
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            return Err(err);
        }
        if self.cancel.is_cancelled() {
            return Err(UploadError::Cancelled);
        }
        Ok(())
    }

    async fn worker(&self, batch: &Batch<'_>) {
        let total = batch.session.total_chunks();
        loop {
            if self.cancel.is_cancelled() {
                return;
            }
            let index = batch.next.fetch_add(1, Ordering::SeqCst);
            if index >= total {
                return;
            }

            match self.upload_chunk(batch, index).await {
                Ok(()) => {}
                Err(UploadError::Cancelled) => return,
                Err(err) => {
                    batch.session.fail_chunk(index);
                    let mut slot = batch
                        .failure
                        .lock()
                        .unwrap_or_else(PoisonError::into_inner);
                    if slot.is_none() {
                        *slot = Some(err);
                    }
                    drop(slot);
                    self.cancel.cancel();
                    return;
                }
            }
        }
    }

    async fn upload_chunk(&self, batch: &Batch<'_>, index: u32) -> Result<(), UploadError> {
        let total = batch.session.total_chunks();
        let data = read_chunk(batch.reader, index).await?;
        let max_attempts = self.config.max_retries.saturating_add(1);
        let query = UploadChunkQuery {
            session_id: batch.session.id(),
            chunk_index: index,
            uid: batch.uid.to_string(),
        };

        loop {
            self.check_cancelled()?;
            let attempt = batch.session.begin_attempt(index)?;

            let result = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => {
                    batch.session.release(index);
                    return Err(UploadError::Cancelled);
                }
                r = self.conn.upload_chunk(&query, data.clone()) => r,
            };

            let reason = match result {
                Ok(ack) if ack.chunk_index == index => {
                    batch.session.ack(index);
                    debug!(chunk = index, attempt, bytes = data.len(), "chunk acknowledged");
                    return Ok(());
                }
                Ok(ack) => format!(
                    "service acknowledged chunk {} instead of {index}",
                    ack.chunk_index
                ),
                Err(e) if e.is_timeout() => {
                    return Err(UploadError::Chunk {
                        index,
                        total,
                        attempts: attempt,
                        reason: e.to_string(),
                    });
                }
                Err(e) => e.to_string(),
            };

            if attempt >= max_attempts {
                return Err(UploadError::Chunk {
                    index,
                    total,
                    attempts: attempt,
                    reason,
                });
            }

            warn!(chunk = index, attempt, error = %reason, "chunk upload failed, retrying");
            batch.session.release(index);

            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return Err(UploadError::Cancelled),
                _ = tokio::time::sleep(self.config.retry_delay) => {}
            }
        }
    }

    fn check_cancelled(&self) -> Result<(), UploadError> {
        if self.cancel.is_cancelled() {
            return Err(UploadError::Cancelled);
        }
        Ok(())
    }
}

async fn read_chunk(reader: &ChunkReader, index: u32) -> Result<Bytes, UploadError> {
    let reader = reader.clone();
    let data = tokio::task::spawn_blocking(move || reader.read_chunk(index))
        .await
        .map_err(|e| UploadError::Io(std::io::Error::other(format!("task join error: {e}"))))??;
    Ok(Bytes::from(data))
}
