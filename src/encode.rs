// encode.rs — Re-compresses a captured image into an upload-ready payload:
// optional transforms, JPEG at a fixed quality, base64, data URI.

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use image::codecs::jpeg::JpegEncoder;
use image::{imageops, DynamicImage, GenericImageView};

use crate::capture::ImageRef;

/// Every payload is re-encoded to this type regardless of the capture format.
pub const JPEG_MIME: &str = "image/jpeg";

/// Geometric edits applied before compression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transform {
    Crop {
        x: u32,
        y: u32,
        width: u32,
        height: u32,
    },
    /// Downscale (preserving aspect ratio) when wider than `max_width`.
    Resize { max_width: u32 },
}

#[derive(Debug, thiserror::Error)]
pub enum TransformError {
    #[error("crop {width}x{height}+{x}+{y} is outside the {image_width}x{image_height} image")]
    CropOutOfBounds {
        x: u32,
        y: u32,
        width: u32,
        height: u32,
        image_width: u32,
        image_height: u32,
    },
    #[error("resize to zero width")]
    ZeroWidth,
}

pub fn apply_transforms(
    mut img: DynamicImage,
    transforms: &[Transform],
) -> Result<DynamicImage, TransformError> {
    for transform in transforms {
        img = match *transform {
            Transform::Crop {
                x,
                y,
                width,
                height,
            } => {
                let (w, h) = img.dimensions();
                let fits = width > 0
                    && height > 0
                    && x.checked_add(width).is_some_and(|r| r <= w)
                    && y.checked_add(height).is_some_and(|b| b <= h);
                if !fits {
                    return Err(TransformError::CropOutOfBounds {
                        x,
                        y,
                        width,
                        height,
                        image_width: w,
                        image_height: h,
                    });
                }
                img.crop_imm(x, y, width, height)
            }
            Transform::Resize { max_width } => {
                if max_width == 0 {
                    return Err(TransformError::ZeroWidth);
                }
                if img.width() > max_width {
                    let ratio = max_width as f64 / img.width() as f64;
                    let new_h = ((img.height() as f64 * ratio).round() as u32).max(1);
                    img.resize_exact(max_width, new_h, imageops::FilterType::Triangle)
                } else {
                    img
                }
            }
        };
    }
    Ok(img)
}

/// JPEG-encode at `quality` (1–100). Alpha is dropped.
pub fn encode_jpeg(img: &DynamicImage, quality: u8) -> Result<Vec<u8>, image::ImageError> {
    let (w, h) = img.dimensions();
    let mut jpeg_buf: Vec<u8> = Vec::new();
    let mut encoder = JpegEncoder::new_with_quality(&mut jpeg_buf, quality);
    encoder.encode(img.to_rgb8().as_raw(), w, h, image::ExtendedColorType::Rgb8)?;
    Ok(jpeg_buf)
}

/// Base64 image data plus its declared MIME type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedPayload {
    pub mime_type: String,
    pub base64: String,
}

impl EncodedPayload {
    pub fn data_uri(&self) -> String {
        format!("data:{};base64,{}", self.mime_type, self.base64)
    }
}

#[derive(Debug, thiserror::Error)]
#[error("Failed to encode image to base64 after compression.")]
pub struct EncodingError {
    pub detail: String,
}

impl EncodingError {
    fn new(detail: impl Into<String>) -> Self {
        Self {
            detail: detail.into(),
        }
    }
}

#[async_trait]
pub trait ImageEncoder: Send + Sync {
    async fn encode(&self, image: &ImageRef) -> Result<EncodedPayload, EncodingError>;
}

/// Decodes the image behind an [`ImageRef`], applies `transforms` and
/// re-encodes it as a JPEG.
pub struct JpegImageEncoder {
    quality: u8,
    transforms: Vec<Transform>,
}

impl JpegImageEncoder {
    pub fn new(quality: u8) -> Self {
        Self {
            quality,
            transforms: Vec::new(),
        }
    }

    pub fn with_transforms(mut self, transforms: Vec<Transform>) -> Self {
        self.transforms = transforms;
        self
    }
}

#[async_trait]
impl ImageEncoder for JpegImageEncoder {
    async fn encode(&self, image: &ImageRef) -> Result<EncodedPayload, EncodingError> {
        let path = image.to_path();
        let transforms = self.transforms.clone();
        let quality = self.quality;

        let jpeg = tokio::task::spawn_blocking(move || -> Result<Vec<u8>, EncodingError> {
            let img = image::open(&path)
                .map_err(|e| EncodingError::new(format!("open {}: {e}", path.display())))?;
            let img = apply_transforms(img, &transforms)
                .map_err(|e| EncodingError::new(e.to_string()))?;
            encode_jpeg(&img, quality).map_err(|e| EncodingError::new(format!("jpeg encode: {e}")))
        })
        .await
        .map_err(|e| EncodingError::new(format!("encode task failed: {e}")))??;

        if jpeg.is_empty() {
            return Err(EncodingError::new("encoder produced no data"));
        }

        log::debug!("Encoded {} as {} JPEG bytes (quality {})", image, jpeg.len(), quality);
        Ok(EncodedPayload {
            mime_type: JPEG_MIME.into(),
            base64: BASE64.encode(&jpeg),
        })
    }
}
