// screen.rs — Uses the primary monitor as the camera: grabs a screenshot,
// downscales it to a maximum width, and saves it as a JPEG at capture quality.

use async_trait::async_trait;
use image::DynamicImage;
use std::path::PathBuf;

use super::scratch::CaptureDir;
use super::{CameraDevice, CaptureError, CaptureOptions, ImageRef, PermissionStatus};
use crate::encode::{apply_transforms, encode_jpeg, Transform};
use crate::settings::jpeg_quality;

pub struct ScreenCamera {
    captures: CaptureDir,
    /// Maximum width in pixels; wider screenshots are downscaled.
    max_width: u32,
}

impl ScreenCamera {
    /// Screenshots go into a fresh `plate-reader-*` directory under `parent`.
    pub fn new(parent: impl Into<PathBuf>, max_width: u32) -> Self {
        Self {
            captures: CaptureDir::new(parent),
            max_width,
        }
    }

    pub fn in_temp_dir(max_width: u32) -> Self {
        Self::new(std::env::temp_dir(), max_width)
    }
}

#[async_trait]
impl CameraDevice for ScreenCamera {
    async fn request_permission(&self) -> PermissionStatus {
        // Screen recording is granted by the OS; a failed enumeration is the
        // closest signal of a refusal.
        match xcap::Monitor::all() {
            Ok(monitors) if !monitors.is_empty() => PermissionStatus::Granted,
            Ok(_) => PermissionStatus::Denied,
            Err(e) => {
                log::warn!("enumerate monitors: {e}");
                PermissionStatus::Denied
            }
        }
    }

    async fn launch(&self, options: CaptureOptions) -> Result<Option<ImageRef>, CaptureError> {
        let max_width = self.max_width;
        let quality = jpeg_quality(options.quality);
        let target = self.captures.next_path("screen")?;
        let out = target.clone();

        tokio::task::spawn_blocking(move || -> Result<(), CaptureError> {
            let monitors = xcap::Monitor::all()
                .map_err(|e| CaptureError::Device(format!("enumerate monitors: {e}")))?;
            let monitor = monitors
                .into_iter()
                .find(|m| m.is_primary())
                .or_else(|| xcap::Monitor::all().ok()?.into_iter().next())
                .ok_or_else(|| CaptureError::Device("no monitors found".into()))?;

            let raw = monitor
                .capture_image()
                .map_err(|e| CaptureError::Device(format!("capture_image: {e}")))?;
            let img = apply_transforms(
                DynamicImage::ImageRgba8(raw),
                &[Transform::Resize { max_width }],
            )
            .map_err(|e| CaptureError::Device(e.to_string()))?;

            let jpeg = encode_jpeg(&img, quality)
                .map_err(|e| CaptureError::Device(format!("jpeg encode: {e}")))?;
            std::fs::write(&out, jpeg)
                .map_err(|e| CaptureError::Device(format!("write {}: {e}", out.display())))?;
            Ok(())
        })
        .await
        .map_err(|e| CaptureError::Device(format!("capture task failed: {e}")))??;

        Ok(Some(ImageRef::from_path(&target)))
    }

    fn release(&self, image: &ImageRef) {
        self.captures.remove(image);
    }

    fn name(&self) -> &str {
        "screen-camera"
    }
}
