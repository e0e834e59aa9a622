use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::os::unix::fs::OpenOptionsExt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::Local;

const SOURCE_FILE_PERMISSIONS: u32 = 0o644;

static SEQUENCE: AtomicU64 = AtomicU64::new(0);

/// A directory owned by exactly one request
///
/// The source file, compiler output and compiled artifacts of a request all live
/// here, so concurrent requests never see each other's files. The directory is
/// removed on drop unless it was created with `keep` set.
#[derive(Debug)]
pub struct Workspace {
    id: String,
    dir: PathBuf,
    keep: bool,
}

impl Workspace {
    pub fn create(root: &Path, keep: bool) -> io::Result<Self> {
        fs::create_dir_all(root)?;

        let id = format!(
            "{}-{}-{}",
            Local::now().format("%y%m%d-%H%M%S"),
            std::process::id(),
            SEQUENCE.fetch_add(1, Ordering::Relaxed)
        );
        let dir = root.join(&id);
        // Fails if the directory already exists
        fs::create_dir(&dir)?;

        log::debug!("Created workspace {}", dir.display());
        Ok(Self { id, dir, keep })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Writes `code` verbatim as `file_name` and returns the full path
    pub fn stage(&self, file_name: &str, code: &str) -> io::Result<PathBuf> {
        let path = self.dir.join(file_name);
        let mut file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .mode(SOURCE_FILE_PERMISSIONS)
            .open(&path)?;
        file.write_all(code.as_bytes())?;
        file.flush()?;

        Ok(path)
    }
}

impl Drop for Workspace {
    fn drop(&mut self) {
        if self.keep {
            log::debug!("Keeping workspace {}", self.dir.display());
            return;
        }
        if let Err(e) = fs::remove_dir_all(&self.dir) {
            log::warn!("unable to remove workspace {}: {e}", self.dir.display());
        }
    }
}
