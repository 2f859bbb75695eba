// file.rs — A "camera" backed by photos already on disk. The chosen file is
// decoded, optionally cropped (the edit step), and re-saved as a JPEG at the
// capture quality into a private capture directory that is deleted with the
// camera.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use super::scratch::CaptureDir;
use super::{CameraDevice, CaptureError, CaptureOptions, ImageRef, PermissionStatus};
use crate::encode::{apply_transforms, encode_jpeg, Transform};
use crate::settings::jpeg_quality;

/// A photo picked by the user, plus an optional crop for the edit step.
#[derive(Debug, Clone, PartialEq)]
pub struct Selection {
    pub path: PathBuf,
    pub crop: Option<Transform>,
}

/// Handle used to pick the next photo while the camera is owned elsewhere.
#[derive(Clone, Default)]
pub struct FileSelector {
    pending: Arc<Mutex<Option<Selection>>>,
}

impl FileSelector {
    pub fn select(&self, path: impl Into<PathBuf>, crop: Option<Transform>) {
        let mut pending = self.pending.lock().unwrap_or_else(|e| e.into_inner());
        *pending = Some(Selection {
            path: path.into(),
            crop,
        });
    }

    fn take(&self) -> Option<Selection> {
        self.pending.lock().unwrap_or_else(|e| e.into_inner()).take()
    }
}

pub struct FileCamera {
    captures: CaptureDir,
    selector: FileSelector,
}

impl FileCamera {
    /// Captures go into a fresh `plate-reader-*` directory under `parent`.
    pub fn new(parent: impl Into<PathBuf>) -> Self {
        Self {
            captures: CaptureDir::new(parent),
            selector: FileSelector::default(),
        }
    }

    pub fn in_temp_dir() -> Self {
        Self::new(std::env::temp_dir())
    }

    pub fn selector(&self) -> FileSelector {
        self.selector.clone()
    }

    /// Directory holding this camera's captures, once one has been taken.
    pub fn capture_dir(&self) -> Option<PathBuf> {
        self.captures.path()
    }
}

#[async_trait]
impl CameraDevice for FileCamera {
    // Picking a file needs no permission; storage problems surface from
    // `launch` as device errors.
    async fn request_permission(&self) -> PermissionStatus {
        PermissionStatus::Granted
    }

    async fn launch(&self, options: CaptureOptions) -> Result<Option<ImageRef>, CaptureError> {
        let Some(selection) = self.selector.take() else {
            return Ok(None);
        };

        let mut transforms = Vec::new();
        match selection.crop {
            Some(crop) if options.allows_editing => transforms.push(crop),
            Some(_) => log::warn!("Editing disabled, ignoring crop"),
            None => {}
        }

        let target = self.captures.next_path("capture")?;
        let quality = jpeg_quality(options.quality);
        let source = selection.path;
        let out = target.clone();

        tokio::task::spawn_blocking(move || save_capture(&source, &out, &transforms, quality))
            .await
            .map_err(|e| CaptureError::Device(format!("capture task failed: {e}")))??;

        Ok(Some(ImageRef::from_path(&target)))
    }

    fn release(&self, image: &ImageRef) {
        self.captures.remove(image);
    }

    fn name(&self) -> &str {
        "file-camera"
    }
}

fn save_capture(
    source: &Path,
    target: &Path,
    transforms: &[Transform],
    quality: u8,
) -> Result<(), CaptureError> {
    let img = image::open(source)
        .map_err(|e| CaptureError::Device(format!("open {}: {e}", source.display())))?;
    let img = apply_transforms(img, transforms)
        .map_err(|e| CaptureError::Device(e.to_string()))?;
    let jpeg = encode_jpeg(&img, quality)
        .map_err(|e| CaptureError::Device(format!("jpeg encode: {e}")))?;
    std::fs::write(target, jpeg)
        .map_err(|e| CaptureError::Device(format!("write {}: {e}", target.display())))?;
    log::debug!("Saved capture {} (quality {})", target.display(), quality);
    Ok(())
}
