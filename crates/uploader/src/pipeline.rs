//! Upload pipeline orchestrator.
//!
//! Runs validate → package → init → chunks → complete → poll for one local
//! path, reports stages and estimated progress over an event channel, and
//! supports cancellation.

use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use capystore_transfer::{
    ChunkReader, FileEntry, ProgressEstimator, TempArchive, TransferError, UploadResult,
    UploadSession, calculate_file_checksum, package_directory, scan_directory,
};
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::{CancellationToken, DropGuard};
use tracing::{debug, info, warn};

use crate::chunks::ChunkUploader;
use crate::connection::StorageConnection;
use crate::error::UploadError;
use crate::identity::{HistoryRecorder, IdentityProvider};
use crate::poller::{PollOutcome, StatusPoller};
use crate::session::{complete_session, init_session};
use crate::types::{HistoryRecord, Payload, PipelineEvent, PipelineStage, UploadConfig};

const EVENT_CAPACITY: usize = 256;

/// Channel slots progress samples never take, so stage and terminal events
/// always fit even when the receiver is drained late.
const CONTROL_SLOTS: usize = 16;

const MIN_PROGRESS_INTERVAL: Duration = Duration::from_millis(10);

/// Orchestrates uploads of local files and directories.
pub struct UploadPipeline {
    conn: Arc<dyn StorageConnection>,
    identity: Arc<dyn IdentityProvider>,
    history: Option<Arc<dyn HistoryRecorder>>,
    config: UploadConfig,
    events_tx: mpsc::Sender<PipelineEvent>,
    events_rx: Option<mpsc::Receiver<PipelineEvent>>,
    cancel: CancellationToken,
}

/// The local path, checked against the size limits.
struct Source {
    path: PathBuf,
    size: u64,
    file_count: u64,
    /// Directory contents, `None` for a single file.
    files: Option<Vec<FileEntry>>,
}

/// The bytes that go over the wire.
struct Prepared {
    path: PathBuf,
    size: u64,
    is_directory: bool,
    /// Removes the archive when the run ends, whatever the outcome.
    _archive: Option<TempArchive>,
}

impl UploadPipeline {
    /// Creates a pipeline over a storage connection.
    pub fn new(
        conn: Arc<dyn StorageConnection>,
        identity: Arc<dyn IdentityProvider>,
        config: UploadConfig,
    ) -> Self {
        let (events_tx, events_rx) = mpsc::channel(EVENT_CAPACITY);
        Self {
            conn,
            identity,
            history: None,
            config,
            events_tx,
            events_rx: Some(events_rx),
            cancel: CancellationToken::new(),
        }
    }

    /// Records successful uploads with `history`.
    pub fn with_history(mut self, history: Arc<dyn HistoryRecorder>) -> Self {
        self.history = Some(history);
        self
    }

    /// Takes the event receiver. Can only be called once.
    ///
    /// Stage and terminal events wait for channel space once the receiver
    /// is taken, so it must be drained.
    pub fn take_events(&mut self) -> Option<mpsc::Receiver<PipelineEvent>> {
        self.events_rx.take()
    }

    /// Returns a cancellation token for uploads run by this pipeline.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn config(&self) -> &UploadConfig {
        &self.config
    }

    /// Uploads `path` and returns its content hash, or `None` on failure.
    ///
    /// Failures are reported as [`PipelineEvent::Failed`].
    pub async fn upload(&self, path: &Path, import_as_archive: bool) -> Option<UploadResult> {
        self.try_upload(path, import_as_archive).await.ok()
    }

    /// Like [`upload`](Self::upload) but returns the error.
    pub async fn try_upload(
        &self,
        path: &Path,
        import_as_archive: bool,
    ) -> Result<UploadResult, UploadError> {
        let started = Instant::now();
        let mut stage = PipelineStage::Init;
        self.emit(PipelineEvent::Stage(stage)).await;

        match self.run(path, import_as_archive, started, &mut stage).await {
            Ok(result) => {
                let elapsed = started.elapsed();
                info!(
                    path = %path.display(),
                    hash = %result.content_hash,
                    elapsed_ms = elapsed.as_millis() as u64,
                    "upload completed"
                );
                self.emit(PipelineEvent::Completed {
                    result: result.clone(),
                    elapsed,
                })
                .await;
                Ok(result)
            }
            Err(e) => {
                if !stage.is_terminal() {
                    self.enter(&mut stage, PipelineStage::Failed).await;
                }
                let elapsed = started.elapsed();
                // Observers print the failure; the log only carries detail.
                debug!(
                    path = %path.display(),
                    stage = ?stage,
                    error = %e,
                    elapsed_ms = elapsed.as_millis() as u64,
                    "upload failed"
                );
                self.emit(PipelineEvent::Failed {
                    error: e.to_string(),
                    elapsed,
                })
                .await;
                Err(e)
            }
        }
    }

    async fn run(
        &self,
        path: &Path,
        import_as_archive: bool,
        started: Instant,
        stage: &mut PipelineStage,
    ) -> Result<UploadResult, UploadError> {
        self.check_cancelled()?;
        let uid = self.identity.uid()?;
        let name = display_name(path);

        let source = self.inspect(path, &name).await?;
        let file_count = source.file_count;

        let estimator = Arc::new(Mutex::new(
            ProgressEstimator::new(source.file_count, source.size)
                .with_finalize_window(self.config.finalize_window),
        ));
        emit_progress(&self.events_tx, &estimator, started);
        let _ticker = self.spawn_ticker(Arc::clone(&estimator), started);

        let prepared = self.package(source, stage).await?;

        self.enter(stage, PipelineStage::SessionInit).await;
        let digest_path = prepared.path.clone();
        let digest = blocking(move || calculate_file_checksum(&digest_path)).await?;
        self.check_cancelled()?;

        let payload = Payload {
            path: prepared.path.clone(),
            name,
            size: prepared.size,
            digest,
            is_directory: prepared.is_directory,
        };

        let session = self
            .cancellable(init_session(self.conn.as_ref(), &payload, &uid))
            .await?;

        let result = self
            .drive(&session, &payload, &uid, import_as_archive, &estimator, started, stage)
            .await;
        if let Err(e) = &result {
            session.fail(&e.to_string());
        }
        let result = result?;

        if let Some(history) = &self.history {
            let record = HistoryRecord {
                name: payload.name.clone(),
                source_path: path.display().to_string(),
                content_hash: result.content_hash.clone(),
                short_url: result.short_url.clone(),
                is_directory: payload.is_directory,
                size: payload.size,
                file_count,
            };
            if let Err(e) = history.record(&record) {
                warn!(error = %e, "failed to record upload history");
            }
        }

        Ok(result)
    }

    /// Reads the path and checks it against the size limits. No network
    /// calls happen here.
    async fn inspect(&self, path: &Path, name: &str) -> Result<Source, UploadError> {
        let metadata = tokio::fs::metadata(path)
            .await
            .map_err(|e| UploadError::Validation(format!("cannot read {}: {e}", path.display())))?;

        if !metadata.is_dir() {
            self.config
                .limits
                .check_file(name, metadata.len())
                .map_err(UploadError::from_source)?;
            return Ok(Source {
                path: path.to_path_buf(),
                size: metadata.len(),
                file_count: 1,
                files: None,
            });
        }

        let root = path.to_path_buf();
        let scan = blocking(move || scan_directory(&root))
            .await
            .map_err(|e| match e {
                UploadError::Transfer(t) => UploadError::from_source(t),
                other => other,
            })?;
        self.config
            .limits
            .check_directory(name, &scan)
            .map_err(UploadError::from_source)?;
        debug!(
            path = %path.display(),
            files = scan.file_count(),
            total_bytes = scan.total_size,
            "directory scanned"
        );
        self.check_cancelled()?;

        Ok(Source {
            path: path.to_path_buf(),
            size: scan.total_size,
            file_count: scan.file_count() as u64,
            files: Some(scan.files),
        })
    }

    /// Zips directories into the scratch directory; files pass through.
    async fn package(
        &self,
        source: Source,
        stage: &mut PipelineStage,
    ) -> Result<Prepared, UploadError> {
        let Some(files) = source.files else {
            return Ok(Prepared {
                path: source.path,
                size: source.size,
                is_directory: false,
                _archive: None,
            });
        };

        self.enter(stage, PipelineStage::Packaging).await;
        let root = source.path;
        let scratch = self.config.scratch_dir.clone();
        let archive = blocking(move || package_directory(&root, &files, &scratch))
            .await
            .map_err(|e| UploadError::Packaging(e.to_string()))?;
        self.check_cancelled()?;

        Ok(Prepared {
            path: archive.path().to_path_buf(),
            size: archive.size(),
            is_directory: true,
            _archive: Some(archive),
        })
    }

    /// Uploads chunks, completes the session and polls until a terminal outcome.
    #[allow(clippy::too_many_arguments)]
    async fn drive(
        &self,
        session: &UploadSession,
        payload: &Payload,
        uid: &str,
        import_as_archive: bool,
        estimator: &Mutex<ProgressEstimator>,
        started: Instant,
        stage: &mut PipelineStage,
    ) -> Result<UploadResult, UploadError> {
        session.start()?;
        self.enter(stage, PipelineStage::ChunkUpload).await;

        let reader = ChunkReader::new(&payload.path, session.plan());
        ChunkUploader::new(self.conn.as_ref(), &self.config, self.cancel.child_token())
            .upload_all(session, &reader, uid)
            .await?;

        self.enter(stage, PipelineStage::Completing).await;
        let trace_id = self
            .cancellable(complete_session(
                self.conn.as_ref(),
                session,
                uid,
                import_as_archive,
            ))
            .await?;
        lock(estimator).enter_finalizing(started.elapsed());

        session.begin_polling()?;
        self.enter(stage, PipelineStage::Polling).await;
        let outcome = StatusPoller::new(self.conn.as_ref(), &self.config, self.cancel.child_token())
            .poll(&trace_id, uid)
            .await?;

        match outcome {
            PollOutcome::Ready(result) => {
                session.finish(result.clone())?;
                let done = {
                    let mut est = lock(estimator);
                    est.finish();
                    est.sample(started.elapsed())
                };
                self.emit(PipelineEvent::Progress(done)).await;
                self.enter(stage, PipelineStage::Done).await;
                Ok(result)
            }
            PollOutcome::Failed(reason) => Err(UploadError::ServerFailure(reason)),
            PollOutcome::TimedOut { elapsed } => {
                session.time_out()?;
                self.enter(stage, PipelineStage::TimedOut).await;
                Err(UploadError::PollTimeout { elapsed })
            }
        }
    }

    /// Samples the estimator on a fixed interval until the guard is dropped.
    fn spawn_ticker(&self, estimator: Arc<Mutex<ProgressEstimator>>, started: Instant) -> DropGuard {
        let stop = self.cancel.child_token();
        let guard = stop.clone().drop_guard();
        let tx = self.events_tx.clone();
        let period = self.config.progress_interval.max(MIN_PROGRESS_INTERVAL);

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    biased;
                    _ = stop.cancelled() => break,
                    _ = ticker.tick() => emit_progress(&tx, &estimator, started),
                }
            }
        });

        guard
    }

    async fn cancellable<T>(
        &self,
        fut: impl Future<Output = Result<T, UploadError>>,
    ) -> Result<T, UploadError> {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(UploadError::Cancelled),
            r = fut => r,
        }
    }

    async fn enter(&self, stage: &mut PipelineStage, next: PipelineStage) {
        debug!(from = ?*stage, to = ?next, "pipeline stage");
        *stage = next;
        self.emit(PipelineEvent::Stage(next)).await;
    }

    /// Sends a stage, terminal or final progress event.
    async fn emit(&self, event: PipelineEvent) {
        // Nobody can drain the channel before the receiver is taken.
        if self.events_rx.is_some() {
            return;
        }
        if self.events_tx.send(event).await.is_err() {
            debug!("event receiver dropped");
        }
    }

    fn check_cancelled(&self) -> Result<(), UploadError> {
        if self.cancel.is_cancelled() {
            return Err(UploadError::Cancelled);
        }
        Ok(())
    }
}

fn lock(estimator: &Mutex<ProgressEstimator>) -> std::sync::MutexGuard<'_, ProgressEstimator> {
    estimator.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Samples and sends under the estimator lock so observers see fractions in
/// order. Samples are dropped rather than take the slots kept for control
/// events.
fn emit_progress(
    tx: &mpsc::Sender<PipelineEvent>,
    estimator: &Mutex<ProgressEstimator>,
    started: Instant,
) {
    let mut est = lock(estimator);
    let state = est.sample(started.elapsed());
    if tx.capacity() > CONTROL_SLOTS {
        let _ = tx.try_send(PipelineEvent::Progress(state));
    }
}

async fn blocking<T, F>(f: F) -> Result<T, UploadError>
where
    F: FnOnce() -> Result<T, TransferError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| UploadError::Io(std::io::Error::other(format!("task join error: {e}"))))?
        .map_err(UploadError::from)
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}
