//! Scripted storage connection shared by the pipeline tests.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use bytes::Bytes;
use capystore_protocol::{
    ChunkAck, CompleteSessionRequest, CompleteSessionResponse, InitSessionRequest,
    InitSessionResponse, StatusQuery, StatusResponse, UploadChunkQuery,
};

use crate::connection::{ClientError, ConnFuture, StorageConnection};

/// Failure injected into a mocked call.
#[derive(Debug, Clone)]
pub(crate) enum Fault {
    Server(i32, &'static str),
    Timeout,
}

impl Fault {
    fn to_error(&self) -> ClientError {
        match self {
            Fault::Server(code, msg) => ClientError::Server {
                code: *code,
                msg: (*msg).to_string(),
            },
            Fault::Timeout => ClientError::Timeout,
        }
    }
}

pub(crate) struct MockStorage {
    chunk_size: u64,
    geometry: Option<(u32, u64)>,
    init_fault: Option<Fault>,
    /// Remaining scripted failures per chunk index.
    chunk_failures: Mutex<HashMap<u32, (u32, Fault)>>,
    chunk_delay: Duration,
    ack_offset: u32,
    complete_fault: Option<Fault>,
    statuses: Mutex<VecDeque<Result<StatusResponse, Fault>>>,

    pub init_requests: Mutex<Vec<InitSessionRequest>>,
    pub received: Mutex<BTreeMap<u32, Vec<u8>>>,
    pub attempts: Mutex<HashMap<u32, u32>>,
    /// Address of the buffer handed over on each attempt, per chunk.
    pub buffers: Mutex<HashMap<u32, Vec<usize>>>,
    pub complete_requests: Mutex<Vec<CompleteSessionRequest>>,
    pub status_calls: AtomicUsize,
    in_flight: AtomicUsize,
    pub max_in_flight: AtomicUsize,
}

impl MockStorage {
    pub fn new(chunk_size: u64) -> Self {
        Self {
            chunk_size,
            geometry: None,
            init_fault: None,
            chunk_failures: Mutex::new(HashMap::new()),
            chunk_delay: Duration::ZERO,
            ack_offset: 0,
            complete_fault: None,
            statuses: Mutex::new(VecDeque::new()),
            init_requests: Mutex::new(Vec::new()),
            received: Mutex::new(BTreeMap::new()),
            attempts: Mutex::new(HashMap::new()),
            buffers: Mutex::new(HashMap::new()),
            complete_requests: Mutex::new(Vec::new()),
            status_calls: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        }
    }

    /// Reports this geometry instead of deriving it from the file size.
    pub fn with_geometry(mut self, total_chunks: u32, chunk_size: u64) -> Self {
        self.geometry = Some((total_chunks, chunk_size));
        self
    }

    pub fn with_init_fault(mut self, fault: Fault) -> Self {
        self.init_fault = Some(fault);
        self
    }

    /// Fails the first `times` attempts of chunk `index`.
    pub fn fail_chunk(self, index: u32, times: u32, fault: Fault) -> Self {
        self.chunk_failures
            .lock()
            .unwrap()
            .insert(index, (times, fault));
        self
    }

    pub fn with_chunk_delay(mut self, delay: Duration) -> Self {
        self.chunk_delay = delay;
        self
    }

    /// Acknowledges chunk `i` as `i + offset`.
    pub fn with_ack_offset(mut self, offset: u32) -> Self {
        self.ack_offset = offset;
        self
    }

    pub fn with_complete_fault(mut self, fault: Fault) -> Self {
        self.complete_fault = Some(fault);
        self
    }

    /// Queues status responses; once drained every poll reports "pending".
    pub fn with_statuses(self, statuses: Vec<Result<StatusResponse, Fault>>) -> Self {
        self.statuses.lock().unwrap().extend(statuses);
        self
    }

    pub fn reassembled(&self) -> Vec<u8> {
        self.received
            .lock()
            .unwrap()
            .values()
            .flat_map(|c| c.iter().copied())
            .collect()
    }

    pub fn attempts_for(&self, index: u32) -> u32 {
        self.attempts
            .lock()
            .unwrap()
            .get(&index)
            .copied()
            .unwrap_or(0)
    }

    pub fn complete_calls(&self) -> usize {
        self.complete_requests.lock().unwrap().len()
    }
}

impl StorageConnection for MockStorage {
    fn init_session(&self, req: &InitSessionRequest) -> ConnFuture<'_, InitSessionResponse> {
        let req = req.clone();
        Box::pin(async move {
            self.init_requests.lock().unwrap().push(req.clone());
            if let Some(fault) = &self.init_fault {
                return Err(fault.to_error());
            }
            let (total_chunks, chunk_size) = self
                .geometry
                .unwrap_or((req.file_size.div_ceil(self.chunk_size) as u32, self.chunk_size));
            Ok(InitSessionResponse {
                session_id: "session-1".into(),
                total_chunks,
                chunk_size,
            })
        })
    }

    fn upload_chunk(&self, query: &UploadChunkQuery, data: Bytes) -> ConnFuture<'_, ChunkAck> {
        let index = query.chunk_index;
        Box::pin(async move {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(now, Ordering::SeqCst);
            *self.attempts.lock().unwrap().entry(index).or_insert(0) += 1;
            self.buffers
                .lock()
                .unwrap()
                .entry(index)
                .or_default()
                .push(data.as_ptr() as usize);

            if !self.chunk_delay.is_zero() {
                tokio::time::sleep(self.chunk_delay).await;
            }
            self.in_flight.fetch_sub(1, Ordering::SeqCst);

            let fault = {
                let mut failures = self.chunk_failures.lock().unwrap();
                match failures.get_mut(&index) {
                    Some((remaining, fault)) if *remaining > 0 => {
                        *remaining -= 1;
                        Some(fault.clone())
                    }
                    _ => None,
                }
            };
            if let Some(fault) = fault {
                return Err(fault.to_error());
            }

            let chunk_size = data.len() as u64;
            self.received.lock().unwrap().insert(index, data.to_vec());
            Ok(ChunkAck {
                chunk_index: index + self.ack_offset,
                chunk_size,
            })
        })
    }

    fn complete_session(
        &self,
        req: &CompleteSessionRequest,
    ) -> ConnFuture<'_, CompleteSessionResponse> {
        let req = req.clone();
        Box::pin(async move {
            self.complete_requests.lock().unwrap().push(req);
            if let Some(fault) = &self.complete_fault {
                return Err(fault.to_error());
            }
            Ok(CompleteSessionResponse {
                trace_id: "trace-1".into(),
            })
        })
    }

    fn session_status(&self, _query: &StatusQuery) -> ConnFuture<'_, StatusResponse> {
        Box::pin(async move {
            self.status_calls.fetch_add(1, Ordering::SeqCst);
            match self.statuses.lock().unwrap().pop_front() {
                Some(Ok(status)) => Ok(status),
                Some(Err(fault)) => Err(fault.to_error()),
                None => Ok(StatusResponse::pending()),
            }
        })
    }
}
