// scratch.rs — Private directory that holds captured images for the life of
// a camera. It is created on first capture and deleted with everything in it
// when the camera is dropped.

use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{SystemTime, UNIX_EPOCH};
use tempfile::TempDir;

use super::{CaptureError, ImageRef};

pub struct CaptureDir {
    parent: PathBuf,
    dir: Mutex<Option<TempDir>>,
    counter: AtomicU64,
}

impl CaptureDir {
    /// The directory itself is created inside `parent` on first use.
    pub fn new(parent: impl Into<PathBuf>) -> Self {
        Self {
            parent: parent.into(),
            dir: Mutex::new(None),
            counter: AtomicU64::new(0),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Option<TempDir>> {
        self.dir.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn create(&self) -> Result<TempDir, CaptureError> {
        std::fs::create_dir_all(&self.parent).and_then(|()| {
            tempfile::Builder::new()
                .prefix("plate-reader-")
                .tempdir_in(&self.parent)
        })
        .map_err(|e| {
            CaptureError::Device(format!(
                "cannot create capture directory in {}: {e}",
                self.parent.display()
            ))
        })
    }

    /// Current directory, if anything has been captured yet.
    pub fn path(&self) -> Option<PathBuf> {
        self.lock().as_ref().map(|d| d.path().to_path_buf())
    }

    /// A fresh file path for the next capture.
    pub fn next_path(&self, prefix: &str) -> Result<PathBuf, CaptureError> {
        let mut dir = self.lock();
        if dir.is_none() {
            let created = self.create()?;
            log::debug!("Capture directory {}", created.path().display());
            *dir = Some(created);
        }
        let base = dir
            .as_ref()
            .map(|d| d.path().to_path_buf())
            .ok_or_else(|| CaptureError::Device("capture directory unavailable".into()))?;

        let millis = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis();
        let n = self.counter.fetch_add(1, Ordering::SeqCst);
        Ok(base.join(format!("{prefix}-{millis}-{n}.jpg")))
    }

    /// Delete `image` if it lives in this directory. Files elsewhere are
    /// never touched.
    pub fn remove(&self, image: &ImageRef) {
        let dir = self.lock();
        let Some(dir) = dir.as_ref() else {
            return;
        };
        let path = image.to_path();
        if path.parent() != Some(dir.path()) {
            return;
        }
        match std::fs::remove_file(&path) {
            Ok(()) => log::debug!("Removed capture {}", path.display()),
            Err(e) => log::warn!("Failed to remove capture {}: {}", path.display(), e),
        }
    }
}
