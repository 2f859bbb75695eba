//! The `capture` module turns a camera-like device into an [`ImageRef`].
//! `FileCamera` picks an existing photo; `ScreenCamera` (feature `screen`)
//! grabs the primary monitor.
use async_trait::async_trait;
use std::path::{Path, PathBuf};

pub mod file;
mod scratch;
#[cfg(feature = "screen")]
pub mod screen;

pub use file::FileCamera;
#[cfg(feature = "screen")]
pub use screen::ScreenCamera;

/// Opaque locator of a captured image (a `file://` URI for local captures).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageRef(String);

impl ImageRef {
    pub fn new(uri: impl Into<String>) -> Self {
        Self(uri.into())
    }

    pub fn from_path(path: &Path) -> Self {
        Self(format!("file://{}", path.display()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Local filesystem path, if this reference points at one.
    pub fn to_path(&self) -> PathBuf {
        PathBuf::from(self.0.strip_prefix("file://").unwrap_or(&self.0))
    }
}

impl std::fmt::Display for ImageRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PermissionStatus {
    Granted,
    Denied,
}

/// Options handed to the device when it is launched.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CaptureOptions {
    /// Let the device run its crop/edit step before returning.
    pub allows_editing: bool,
    /// Compression factor in (0, 1] applied at capture time.
    pub quality: f32,
}

impl Default for CaptureOptions {
    fn default() -> Self {
        Self {
            allows_editing: true,
            quality: 0.5,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CaptureOutcome {
    Captured(ImageRef),
    Cancelled,
}

#[derive(Debug, thiserror::Error)]
pub enum CaptureError {
    #[error("Camera permission is required to take a picture.")]
    PermissionDenied,
    #[error("Camera failed: {0}")]
    Device(String),
}

/// A camera-like source of images.
#[async_trait]
pub trait CameraDevice: Send + Sync {
    async fn request_permission(&self) -> PermissionStatus;

    /// Run the capture UI. `Ok(None)` means the user backed out.
    async fn launch(&self, options: CaptureOptions) -> Result<Option<ImageRef>, CaptureError>;

    /// The caller is done with `image`. Devices that own their captures
    /// delete them here.
    fn release(&self, _image: &ImageRef) {}

    /// Device name for logging.
    fn name(&self) -> &str;
}

/// Permission-gated capture on top of a [`CameraDevice`].
pub struct ImageCapture {
    options: CaptureOptions,
    device: Box<dyn CameraDevice>,
}

impl ImageCapture {
    pub fn new(device: Box<dyn CameraDevice>, options: CaptureOptions) -> Self {
        Self { options, device }
    }

    pub fn options(&self) -> CaptureOptions {
        self.options
    }

    pub fn release(&self, image: &ImageRef) {
        self.device.release(image);
    }

    pub async fn capture(&self) -> Result<CaptureOutcome, CaptureError> {
        if self.device.request_permission().await != PermissionStatus::Granted {
            log::warn!("{}: camera permission denied", self.device.name());
            return Err(CaptureError::PermissionDenied);
        }

        match self.device.launch(self.options).await? {
            Some(image) => {
                log::info!("{}: captured {}", self.device.name(), image);
                Ok(CaptureOutcome::Captured(image))
            }
            None => {
                log::debug!("{}: capture cancelled", self.device.name());
                Ok(CaptureOutcome::Cancelled)
            }
        }
    }
}
