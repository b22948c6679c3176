//! Upload history stored as JSON lines, one completed upload per line.

use std::fs::OpenOptions;
use std::io::{self, BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use capystore_uploader::{HistoryRecord, HistoryRecorder, UploadError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

/// One line of the history file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub uploaded_at: DateTime<Utc>,
    #[serde(flatten)]
    pub record: HistoryRecord,
}

/// Append-only history file.
pub struct JsonlHistory {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl JsonlHistory {
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            write_lock: Mutex::new(()),
        }
    }

    #[cfg(test)]
    fn path(&self) -> &Path {
        &self.path
    }

    fn append(&self, entry: &HistoryEntry) -> io::Result<()> {
        let line = serde_json::to_string(entry).map_err(io::Error::other)?;
        let _guard = self.write_lock.lock().unwrap_or_else(|e| e.into_inner());

        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        writeln!(file, "{line}")
    }

    /// Returns up to `limit` entries, newest first. Malformed lines are skipped.
    pub fn read_recent(&self, limit: usize) -> anyhow::Result<Vec<HistoryEntry>> {
        let file = match std::fs::File::open(&self.path) {
            Ok(f) => f,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut entries = Vec::new();
        for (lineno, line) in BufReader::new(file).lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<HistoryEntry>(&line) {
                Ok(entry) => entries.push(entry),
                Err(e) => warn!(line = lineno + 1, error = %e, "skipping malformed history line"),
            }
        }

        entries.reverse();
        entries.truncate(limit);
        Ok(entries)
    }
}

impl HistoryRecorder for JsonlHistory {
    fn record(&self, record: &HistoryRecord) -> Result<(), UploadError> {
        let entry = HistoryEntry {
            uploaded_at: Utc::now(),
            record: record.clone(),
        };
        self.append(&entry)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(hash: &str) -> HistoryRecord {
        HistoryRecord {
            name: "notes.txt".into(),
            source_path: "/home/u/notes.txt".into(),
            content_hash: hash.into(),
            short_url: None,
            is_directory: false,
            size: 10,
            file_count: 1,
        }
    }

    #[test]
    fn missing_file_is_empty() {
        let tmp = tempfile::tempdir().unwrap();
        let history = JsonlHistory::new(tmp.path().join("history.jsonl"));
        assert!(history.read_recent(10).unwrap().is_empty());
    }

    #[test]
    fn records_newest_first() {
        let tmp = tempfile::tempdir().unwrap();
        let history = JsonlHistory::new(tmp.path().join("sub").join("history.jsonl"));

        for hash in ["h1", "h2", "h3"] {
            history.record(&record(hash)).unwrap();
        }

        let entries = history.read_recent(2).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].record.content_hash, "h3");
        assert_eq!(entries[1].record.content_hash, "h2");
    }

    #[test]
    fn lines_are_flat_json() {
        let tmp = tempfile::tempdir().unwrap();
        let history = JsonlHistory::new(tmp.path().join("history.jsonl"));
        history.record(&record("h1")).unwrap();

        let content = std::fs::read_to_string(history.path()).unwrap();
        let value: serde_json::Value = serde_json::from_str(content.trim()).unwrap();
        assert_eq!(value["content_hash"], "h1");
        assert!(value["uploaded_at"].as_str().unwrap().contains('T'));
    }

    #[test]
    fn malformed_lines_skipped() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("history.jsonl");
        let history = JsonlHistory::new(path.clone());
        history.record(&record("h1")).unwrap();

        let mut file = OpenOptions::new().append(true).open(&path).unwrap();
        writeln!(file, "not json").unwrap();
        drop(file);
        history.record(&record("h2")).unwrap();

        let entries = history.read_recent(10).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].record.content_hash, "h2");
    }
}
