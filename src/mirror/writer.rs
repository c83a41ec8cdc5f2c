use crate::mirror::MirrorPath;
use crate::MirrorError;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tempfile::NamedTempFile;

/// Result of a successful write
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    /// New or changed content was persisted
    Written,

    /// The file already held exactly these bytes
    Unchanged,
}

/// Persists mirror entries under an output root
///
/// Each write lands in a temporary file in the destination directory and is
/// renamed into place, so readers never observe a partially written file.
#[derive(Debug, Clone)]
pub struct MirrorWriter {
    root: PathBuf,
    max_attempts: u32,
}

impl MirrorWriter {
    /// Creates a writer rooted at `root`
    ///
    /// # Arguments
    ///
    /// * `root` - Output directory (created lazily)
    /// * `max_attempts` - Attempts per write before giving up (at least 1)
    pub fn new(root: impl Into<PathBuf>, max_attempts: u32) -> Self {
        Self {
            root: root.into(),
            max_attempts: max_attempts.max(1),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Absolute location of a mirror path
    pub fn full_path(&self, path: &MirrorPath) -> PathBuf {
        self.root.join(path.as_path())
    }

    /// Writes `bytes` to `path`, skipping identical content
    ///
    /// # Returns
    ///
    /// * `Ok(WriteOutcome)` - The file now holds `bytes`
    /// * `Err(MirrorError::WriteFailure)` - Every attempt failed
    pub fn write(&self, path: &MirrorPath, bytes: &[u8]) -> Result<WriteOutcome, MirrorError> {
        let full = self.full_path(path);
        let mut attempt = 1;
        loop {
            match write_atomic(&full, bytes) {
                Ok(outcome) => return Ok(outcome),
                Err(e) if attempt < self.max_attempts => {
                    tracing::debug!(
                        "Write of {} failed (attempt {}/{}): {}",
                        full.display(),
                        attempt,
                        self.max_attempts,
                        e
                    );
                    std::thread::sleep(Duration::from_millis(25 * u64::from(attempt)));
                    attempt += 1;
                }
                Err(source) => {
                    return Err(MirrorError::WriteFailure {
                        path: full,
                        attempts: attempt,
                        source,
                    })
                }
            }
        }
    }
}

fn write_atomic(full: &Path, bytes: &[u8]) -> io::Result<WriteOutcome> {
    if full.is_file() && fs::read(full)? == bytes {
        return Ok(WriteOutcome::Unchanged);
    }

    let dir = full
        .parent()
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "path has no parent"))?;
    fs::create_dir_all(dir)?;

    let mut tmp = NamedTempFile::new_in(dir)?;
    tmp.write_all(bytes)?;
    tmp.as_file().sync_all()?;
    tmp.persist(full).map_err(|e| e.error)?;

    Ok(WriteOutcome::Written)
}
