use std::io::{Read, Seek, SeekFrom};
use std::ops::Range;
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};

use crate::TransferError;

// ---------------------------------------------------------------------------
// Checksum helpers
// ---------------------------------------------------------------------------

/// Computes SHA-256 of `data` and returns the hex-encoded digest.
pub fn checksum_bytes(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

/// Computes SHA-256 of an entire file and returns the hex-encoded digest.
pub fn calculate_file_checksum(path: &Path) -> Result<String, TransferError> {
    let mut file = std::fs::File::open(path)?;
    let mut hasher = Sha256::new();
    let mut buf = [0u8; 8192];
    loop {
        let n = file.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hex::encode(hasher.finalize()))
}

// ---------------------------------------------------------------------------
// ChunkPlan
// ---------------------------------------------------------------------------

/// Splits a payload of `total_size` bytes into `chunk_size` ranges.
///
/// The last chunk may be shorter. `total_chunks == ceil(total_size / chunk_size)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkPlan {
    total_size: u64,
    chunk_size: u64,
    total_chunks: u32,
}

impl ChunkPlan {
    /// Computes the plan for a payload.
    pub fn new(total_size: u64, chunk_size: u64) -> Result<Self, TransferError> {
        if chunk_size == 0 {
            return Err(TransferError::InvalidGeometry("chunk size is zero".into()));
        }
        let total_chunks = u32::try_from(total_size.div_ceil(chunk_size)).map_err(|_| {
            TransferError::InvalidGeometry(format!(
                "{total_size} bytes in {chunk_size}-byte chunks exceeds the chunk index range"
            ))
        })?;
        Ok(Self {
            total_size,
            chunk_size,
            total_chunks,
        })
    }

    /// Computes the plan and checks it against a chunk count reported by the service.
    pub fn verify(total_size: u64, chunk_size: u64, reported: u32) -> Result<Self, TransferError> {
        let plan = Self::new(total_size, chunk_size)?;
        if plan.total_chunks != reported {
            return Err(TransferError::InvalidGeometry(format!(
                "service reported {reported} chunks, expected {} for {total_size} bytes at {chunk_size} bytes per chunk",
                plan.total_chunks
            )));
        }
        Ok(plan)
    }

    /// Byte range of chunk `index`, or `None` past the end.
    pub fn range(&self, index: u32) -> Option<Range<u64>> {
        if index >= self.total_chunks {
            return None;
        }
        let start = u64::from(index) * self.chunk_size;
        let end = (start + self.chunk_size).min(self.total_size);
        Some(start..end)
    }

    /// All chunk ranges in index order.
    pub fn ranges(&self) -> impl Iterator<Item = (u32, Range<u64>)> + '_ {
        (0..self.total_chunks).filter_map(move |i| self.range(i).map(|r| (i, r)))
    }

    pub fn total_size(&self) -> u64 {
        self.total_size
    }

    pub fn chunk_size(&self) -> u64 {
        self.chunk_size
    }

    pub fn total_chunks(&self) -> u32 {
        self.total_chunks
    }
}

// ---------------------------------------------------------------------------
// ChunkReader
// ---------------------------------------------------------------------------

/// Reads individual chunks of a payload file by index.
///
/// Every read opens its own handle, so clones can be moved into
/// `spawn_blocking` closures and used from several workers at once.
#[derive(Debug, Clone)]
pub struct ChunkReader {
    path: PathBuf,
    plan: ChunkPlan,
}

impl ChunkReader {
    pub fn new(path: &Path, plan: ChunkPlan) -> Self {
        Self {
            path: path.to_path_buf(),
            plan,
        }
    }

    /// Reads the bytes of chunk `index`.
    pub fn read_chunk(&self, index: u32) -> Result<Vec<u8>, TransferError> {
        let range = self.plan.range(index).ok_or(TransferError::ChunkOutOfRange {
            index,
            total: self.plan.total_chunks(),
        })?;

        let mut file = std::fs::File::open(&self.path)?;
        file.seek(SeekFrom::Start(range.start))?;
        let mut buf = vec![0u8; (range.end - range.start) as usize];
        file.read_exact(&mut buf)?;
        Ok(buf)
    }
}
