//! Directory packaging.
//!
//! A directory is uploaded as one zip archive written to a scratch directory
//! (the system temp directory by default), outside the tree being packaged.

use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};
use uuid::Uuid;
use zip::CompressionMethod;
use zip::write::FileOptions;

use crate::{FileEntry, TransferError};

/// A temporary archive that is deleted when dropped.
#[derive(Debug)]
pub struct TempArchive {
    path: PathBuf,
    size: u64,
}

impl TempArchive {
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Size of the archive on disk in bytes.
    pub fn size(&self) -> u64 {
        self.size
    }
}

impl Drop for TempArchive {
    fn drop(&mut self) {
        match std::fs::remove_file(&self.path) {
            Ok(()) => debug!(path = %self.path.display(), "removed temp archive"),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "failed to remove temp archive")
            }
        }
    }
}

/// Compresses `files` (relative to `root`) into a new archive under `out_dir`.
///
/// A partially written archive is removed if packaging fails.
pub fn package_directory(
    root: &Path,
    files: &[FileEntry],
    out_dir: &Path,
) -> Result<TempArchive, TransferError> {
    let path = out_dir.join(format!("capystore-{}.zip", Uuid::new_v4()));
    let mut archive = TempArchive { path, size: 0 };

    write_zip_archive(&archive.path, root, files)?;
    archive.size = std::fs::metadata(&archive.path)?.len();

    debug!(
        path = %archive.path.display(),
        files = files.len(),
        bytes = archive.size,
        "directory packaged"
    );
    Ok(archive)
}

fn write_zip_archive(
    archive_path: &Path,
    root: &Path,
    entries: &[FileEntry],
) -> Result<(), TransferError> {
    let file = File::create(archive_path)?;
    let mut writer = zip::ZipWriter::new(file);
    let options = FileOptions::default()
        .compression_method(CompressionMethod::Deflated)
        .large_file(true);

    for entry in entries {
        let mut source = File::open(root.join(&entry.relative_path))?;
        writer.start_file(entry.relative_path.as_str(), options)?;
        io::copy(&mut source, &mut writer)?;
    }

    writer.finish()?;
    Ok(())
}
