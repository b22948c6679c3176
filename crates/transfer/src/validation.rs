use crate::{DEFAULT_MAX_FILE_BYTES, DEFAULT_MAX_TOTAL_BYTES, ScanSummary, TransferError};

/// Size limits enforced before any network call is made.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SizeLimits {
    /// Limit for a single file, uploaded alone or inside a directory.
    pub max_file_bytes: u64,
    /// Limit for the sum of all files in a directory.
    pub max_total_bytes: u64,
}

impl Default for SizeLimits {
    fn default() -> Self {
        Self {
            max_file_bytes: DEFAULT_MAX_FILE_BYTES,
            max_total_bytes: DEFAULT_MAX_TOTAL_BYTES,
        }
    }
}

impl SizeLimits {
    /// Checks a single file upload.
    pub fn check_file(&self, name: &str, size: u64) -> Result<(), TransferError> {
        if size > self.max_file_bytes {
            return Err(TransferError::LimitExceeded {
                what: format!("file {name}"),
                size,
                limit: self.max_file_bytes,
            });
        }
        Ok(())
    }

    /// Checks a scanned directory: every file and the aggregate.
    pub fn check_directory(&self, name: &str, scan: &ScanSummary) -> Result<(), TransferError> {
        if scan.files.is_empty() {
            return Err(TransferError::EmptyDirectory(name.to_string()));
        }
        if let Some(largest) = scan.largest() {
            self.check_file(&largest.relative_path, largest.size)?;
        }
        if scan.total_size > self.max_total_bytes {
            return Err(TransferError::LimitExceeded {
                what: format!("directory {name}"),
                size: scan.total_size,
                limit: self.max_total_bytes,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::FileEntry;

    fn limits() -> SizeLimits {
        SizeLimits {
            max_file_bytes: 100,
            max_total_bytes: 250,
        }
    }

    fn scan(sizes: &[u64]) -> ScanSummary {
        let files: Vec<FileEntry> = sizes
            .iter()
            .enumerate()
            .map(|(i, &size)| FileEntry {
                relative_path: format!("f{i}"),
                size,
            })
            .collect();
        let total_size = sizes.iter().sum();
        ScanSummary { files, total_size }
    }

    #[test]
    fn default_limits() {
        let l = SizeLimits::default();
        assert_eq!(l.max_file_bytes, 200 * 1024 * 1024);
        assert_eq!(l.max_total_bytes, 1024 * 1024 * 1024);
    }

    #[test]
    fn file_at_limit_accepted() {
        assert!(limits().check_file("a.bin", 100).is_ok());
    }

    #[test]
    fn file_over_limit_rejected() {
        let err = limits().check_file("a.bin", 101).unwrap_err();
        assert!(matches!(
            err,
            TransferError::LimitExceeded {
                size: 101,
                limit: 100,
                ..
            }
        ));
        assert!(err.to_string().contains("a.bin"));
    }

    #[test]
    fn directory_within_limits() {
        assert!(limits().check_directory("site", &scan(&[100, 100, 50])).is_ok());
    }

    #[test]
    fn directory_with_oversized_file_rejected() {
        let err = limits().check_directory("site", &scan(&[10, 150])).unwrap_err();
        assert!(err.to_string().contains("f1"));
    }

    #[test]
    fn directory_over_aggregate_rejected() {
        let err = limits()
            .check_directory("site", &scan(&[100, 100, 100]))
            .unwrap_err();
        assert!(matches!(
            err,
            TransferError::LimitExceeded {
                size: 300,
                limit: 250,
                ..
            }
        ));
    }

    #[test]
    fn empty_directory_rejected() {
        assert!(matches!(
            limits().check_directory("site", &scan(&[])),
            Err(TransferError::EmptyDirectory(_))
        ));
    }
}
