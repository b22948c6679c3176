//! Status polling for the finalize job.

use std::time::Duration;

use capystore_protocol::StatusQuery;
use capystore_transfer::UploadResult;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::connection::StorageConnection;
use crate::error::UploadError;
use crate::types::UploadConfig;

/// Terminal outcome of polling.
#[derive(Debug, Clone, PartialEq)]
pub enum PollOutcome {
    Ready(UploadResult),
    /// The service reported the finalize job as failed.
    Failed(String),
    TimedOut { elapsed: Duration },
}

/// Polls the finalize job at a fixed interval until a terminal outcome.
pub struct StatusPoller<'a> {
    conn: &'a dyn StorageConnection,
    config: &'a UploadConfig,
    cancel: CancellationToken,
}

impl<'a> StatusPoller<'a> {
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

    /// Polls `trace_id` until ready, failed, or `max_poll_duration` elapses.
    ///
    /// Up to `max_poll_errors` consecutive request errors are tolerated; a
    /// successful response resets the count. A transport timeout is fatal.
    pub async fn poll(&self, trace_id: &str, uid: &str) -> Result<PollOutcome, UploadError> {
        let started = Instant::now();
        let deadline = started + self.config.max_poll_duration;
        let query = StatusQuery {
            trace_id: trace_id.to_string(),
            uid: uid.to_string(),
        };
        let mut consecutive_errors: u32 = 0;
        let mut polls: u32 = 0;

        loop {
            if self.cancel.is_cancelled() {
                return Err(UploadError::Cancelled);
            }
            if Instant::now() >= deadline {
                return Ok(self.timed_out(started, polls));
            }

            polls += 1;
            let response = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return Err(UploadError::Cancelled),
                _ = tokio::time::sleep_until(deadline) => return Ok(self.timed_out(started, polls)),
                r = self.conn.session_status(&query) => r,
            };

            match response {
                Ok(status) => {
                    consecutive_errors = 0;
                    if status.failed {
                        let reason = status
                            .error
                            .filter(|e| !e.is_empty())
                            .unwrap_or_else(|| "unknown error".into());
                        return Ok(PollOutcome::Failed(reason));
                    }
                    if status.is_ready {
                        return Ok(match status.result {
                            Some(r) if !r.hash.is_empty() => PollOutcome::Ready(UploadResult {
                                content_hash: r.hash,
                                short_url: r.short_url.filter(|u| !u.is_empty()),
                            }),
                            _ => PollOutcome::Failed(
                                "service reported ready without a content hash".into(),
                            ),
                        });
                    }
                    debug!(trace = %trace_id, polls, "finalize job pending");
                }
                Err(e) if e.is_timeout() => return Err(UploadError::RequestTimeout("status poll")),
                Err(e) => {
                    consecutive_errors += 1;
                    if consecutive_errors > self.config.max_poll_errors {
                        return Err(UploadError::Poll {
                            errors: consecutive_errors,
                            reason: e.to_string(),
                        });
                    }
                    warn!(
                        trace = %trace_id,
                        errors = consecutive_errors,
                        error = %e,
                        "status request failed"
                    );
                }
            }

            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return Err(UploadError::Cancelled),
                _ = tokio::time::sleep_until(deadline) => return Ok(self.timed_out(started, polls)),
                _ = tokio::time::sleep(self.config.poll_interval) => {}
            }
        }
    }

    fn timed_out(&self, started: Instant, polls: u32) -> PollOutcome {
        let elapsed = started.elapsed();
        warn!(polls, elapsed_ms = elapsed.as_millis() as u64, "finalize job timed out");
        PollOutcome::TimedOut { elapsed }
    }
}
