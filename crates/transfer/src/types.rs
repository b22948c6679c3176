use std::ops::Range;
use std::sync::{Mutex, MutexGuard, PoisonError};

use tracing::debug;

use crate::{ChunkPlan, TransferError};

/// Lifecycle phase of an upload session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    Init,
    Uploading,
    Completing,
    Polling,
    Done,
    Failed,
    TimedOut,
}

impl SessionPhase {
    /// `Done`, `Failed` and `TimedOut` are terminal.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Done | Self::Failed | Self::TimedOut)
    }

    /// Returns `true` if the session may move from `self` to `next`.
    pub fn can_transition_to(self, next: SessionPhase) -> bool {
        use SessionPhase::*;
        match (self, next) {
            (from, _) if from.is_terminal() => false,
            (_, Failed) => true,
            (Init, Uploading) | (Uploading, Completing) | (Completing, Polling) => true,
            (Polling, Done) | (Polling, TimedOut) => true,
            _ => false,
        }
    }
}

/// Transfer state of a single chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChunkStatus {
    Pending,
    InFlight,
    Acked,
    Failed,
}

/// One index-numbered byte range of the payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    pub index: u32,
    pub byte_range: Range<u64>,
    pub attempt_count: u32,
    pub status: ChunkStatus,
}

/// Content hash produced once the service has stored the payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadResult {
    pub content_hash: String,
    pub short_url: Option<String>,
}

/// Tracks one chunked upload session (thread-safe).
///
/// Created from the geometry returned by the service, mutated by the chunk
/// workers and the completer, discarded once the poller reaches a terminal
/// phase.
#[derive(Debug)]
pub struct UploadSession {
    inner: Mutex<SessionInner>,
}

#[derive(Debug)]
struct SessionInner {
    id: String,
    plan: ChunkPlan,
    phase: SessionPhase,
    chunks: Vec<Chunk>,
    result: Option<UploadResult>,
}

impl UploadSession {
    /// Creates a session in the `Init` phase with every chunk pending.
    pub fn new(id: String, plan: ChunkPlan) -> Self {
        let chunks = plan
            .ranges()
            .map(|(index, byte_range)| Chunk {
                index,
                byte_range,
                attempt_count: 0,
                status: ChunkStatus::Pending,
            })
            .collect();
        Self {
            inner: Mutex::new(SessionInner {
                id,
                plan,
                phase: SessionPhase::Init,
                chunks,
                result: None,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, SessionInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn transition(s: &mut SessionInner, next: SessionPhase) -> Result<(), TransferError> {
        if !s.phase.can_transition_to(next) {
            return Err(TransferError::InvalidTransition {
                current: s.phase,
                requested: next,
            });
        }
        s.phase = next;
        Ok(())
    }

    /// Moves the session into `Uploading`.
    pub fn start(&self) -> Result<(), TransferError> {
        let mut s = self.lock();
        Self::transition(&mut s, SessionPhase::Uploading)
    }

    /// Marks a chunk in flight and returns its attempt number (1-based).
    pub fn begin_attempt(&self, index: u32) -> Result<u32, TransferError> {
        let mut s = self.lock();
        let total = s.plan.total_chunks();
        let chunk = s
            .chunks
            .get_mut(index as usize)
            .ok_or(TransferError::ChunkOutOfRange { index, total })?;
        chunk.attempt_count += 1;
        chunk.status = ChunkStatus::InFlight;
        Ok(chunk.attempt_count)
    }

    /// Returns a chunk to `Pending` after a failed attempt that will be retried.
    pub fn release(&self, index: u32) {
        self.set_chunk_status(index, ChunkStatus::Pending);
    }

    /// Marks a chunk acknowledged by the service.
    pub fn ack(&self, index: u32) {
        self.set_chunk_status(index, ChunkStatus::Acked);
    }

    /// Marks a chunk as having exhausted its retry budget.
    pub fn fail_chunk(&self, index: u32) {
        self.set_chunk_status(index, ChunkStatus::Failed);
    }

    fn set_chunk_status(&self, index: u32, status: ChunkStatus) {
        let mut s = self.lock();
        if let Some(chunk) = s.chunks.get_mut(index as usize) {
            chunk.status = status;
        }
    }

    /// Moves into `Completing`. Every chunk must be acknowledged.
    pub fn begin_completing(&self) -> Result<(), TransferError> {
        let mut s = self.lock();
        if let Some(pending) = s.chunks.iter().find(|c| c.status != ChunkStatus::Acked) {
            return Err(TransferError::ChunkNotAcked {
                index: pending.index,
                status: pending.status,
            });
        }
        Self::transition(&mut s, SessionPhase::Completing)
    }

    /// Moves into `Polling` once the finalize job has been accepted.
    pub fn begin_polling(&self) -> Result<(), TransferError> {
        let mut s = self.lock();
        Self::transition(&mut s, SessionPhase::Polling)
    }

    /// Records the result and moves into `Done`. The result is set exactly once.
    pub fn finish(&self, result: UploadResult) -> Result<(), TransferError> {
        let mut s = self.lock();
        if s.result.is_some() {
            return Err(TransferError::ResultAlreadySet(s.id.clone()));
        }
        Self::transition(&mut s, SessionPhase::Done)?;
        s.result = Some(result);
        Ok(())
    }

    /// Moves into `TimedOut`.
    pub fn time_out(&self) -> Result<(), TransferError> {
        let mut s = self.lock();
        Self::transition(&mut s, SessionPhase::TimedOut)
    }

    /// Moves into `Failed`. No-op on terminal sessions.
    pub fn fail(&self, err: &str) {
        let mut s = self.lock();
        if Self::transition(&mut s, SessionPhase::Failed).is_ok() {
            debug!(session = %s.id, error = err, "session failed");
        }
    }

    pub fn id(&self) -> String {
        self.lock().id.clone()
    }

    pub fn plan(&self) -> ChunkPlan {
        self.lock().plan
    }

    pub fn total_chunks(&self) -> u32 {
        self.lock().plan.total_chunks()
    }

    pub fn phase(&self) -> SessionPhase {
        self.lock().phase
    }

    #[cfg(test)]
    fn result(&self) -> Option<UploadResult> {
        self.lock().result.clone()
    }

    /// Snapshot of a single chunk.
    pub fn chunk(&self, index: u32) -> Option<Chunk> {
        self.lock().chunks.get(index as usize).cloned()
    }

    /// Number of acknowledged chunks.
    pub fn acked_count(&self) -> usize {
        self.lock()
            .chunks
            .iter()
            .filter(|c| c.status == ChunkStatus::Acked)
            .count()
    }
}
