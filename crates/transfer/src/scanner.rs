//! Directory scanning for upload.
//!
//! Recursively walks a directory and produces a list of file entries
//! with relative paths normalized to forward slashes.

use std::path::Path;

use crate::TransferError;

/// A file found under the scanned root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileEntry {
    pub relative_path: String,
    pub size: u64,
}

/// Result of scanning a directory.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanSummary {
    pub files: Vec<FileEntry>,
    pub total_size: u64,
}

impl ScanSummary {
    pub fn file_count(&self) -> usize {
        self.files.len()
    }

    /// The largest file, if any.
    pub fn largest(&self) -> Option<&FileEntry> {
        self.files.iter().max_by_key(|f| f.size)
    }
}

/// Scans a directory recursively.
///
/// Relative paths use `/` as separator (even on Windows). Entries are sorted
/// so archives built from the same tree are laid out identically.
pub fn scan_directory(root_path: &Path) -> Result<ScanSummary, TransferError> {
    let mut summary = ScanSummary::default();
    walk_dir(root_path, root_path, &mut summary)?;
    summary
        .files
        .sort_by(|a, b| a.relative_path.cmp(&b.relative_path));
    Ok(summary)
}

fn walk_dir(root: &Path, current: &Path, summary: &mut ScanSummary) -> Result<(), TransferError> {
    let entries = std::fs::read_dir(current)?;

    for entry in entries {
        let entry = entry?;
        let path = entry.path();
        let metadata = entry.metadata()?;

        if metadata.is_dir() {
            walk_dir(root, &path, summary)?;
        } else if metadata.is_file() {
            let rel_path = path.strip_prefix(root).map_err(std::io::Error::other)?;
            let rel_str = rel_path
                .to_str()
                .ok_or_else(|| TransferError::InvalidFileName(rel_path.display().to_string()))?
                // Normalize to forward slashes.
                .replace('\\', "/");
            let size = metadata.len();

            summary.files.push(FileEntry {
                relative_path: rel_str,
                size,
            });
            summary.total_size += size;
        }
    }

    Ok(())
}
