//! Image ingestion: validate the uploaded files and turn them into base 64
//! images that can be shown in the page and shipped to the model

use crate::config::{MAX_IMAGES, MAX_IMAGE_BYTES};
use base64::{engine::general_purpose, Engine as _};
use image::ImageFormat;
use sha2::{Digest, Sha256};
use std::fmt::Debug;
use thiserror::Error;
use tracing::debug;

/// An image as uploaded by the user (not base 64)
#[derive(Clone)]
pub struct UploadedImage {
    pub(crate) data: Vec<u8>,
    /// Bytes received for the upload. Larger than `data` when the upload
    /// was too big to keep
    pub(crate) size: usize,
    pub(crate) content_type: Option<String>,
    pub(crate) filename: Option<String>,
}

impl UploadedImage {
    pub fn new(data: Vec<u8>) -> Self {
        UploadedImage {
            size: data.len(),
            data,
            content_type: None,
            filename: None,
        }
    }

    /// An upload of `size` bytes whose content was dropped while reading
    pub fn oversized(size: usize) -> Self {
        UploadedImage {
            size,
            ..UploadedImage::new(vec![])
        }
    }

    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    pub fn with_filename(mut self, filename: impl Into<String>) -> Self {
        self.filename = Some(filename.into());
        self
    }

    /// A name for the upload to show in error messages
    fn display_name(&self, index: usize) -> String {
        self.filename
            .clone()
            .unwrap_or_else(|| format!("upload #{}", index + 1))
    }
}

impl Debug for UploadedImage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "UploadedImage {{ data: <{} bytes>, content_type: {:?}, filename: {:?} }}",
            self.data.len(),
            self.content_type,
            self.filename
        )
    }
}

/// A base 64 image, ready to be embedded in HTML or sent to the model
#[derive(Clone, PartialEq, Eq)]
pub struct EncodedImage {
    data: String,
    media_type: &'static str,
    digest: [u8; 32],
}

impl EncodedImage {
    /// The base 64 text
    pub fn as_base64(&self) -> &str {
        &self.data
    }

    /// Either `image/png` or `image/jpeg`
    pub fn media_type(&self) -> &'static str {
        self.media_type
    }

    /// SHA-256 of the raw image bytes
    pub fn digest(&self) -> &[u8; 32] {
        &self.digest
    }

    pub fn data_uri(&self) -> String {
        format!("data:{};base64,{}", self.media_type, self.data)
    }
}

impl Debug for EncodedImage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "EncodedImage {{ data: <{} chars>, media_type: {}, digest: {} }}",
            self.data.len(),
            self.media_type,
            hex::encode(&self.digest[..8])
        )
    }
}

/// Upload problems that are reported back to the user
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Please upload at most {} images", MAX_IMAGES)]
    TooManyImages { count: usize },

    #[error("{name} is not a PNG or JPEG image")]
    UnsupportedType { name: String },

    #[error("{name} is too large ({size} bytes)")]
    TooLarge { name: String, size: usize },

    #[error("{name} is empty")]
    Empty { name: String },
}

/// Validate and encode a set of uploads, preserving upload order.
///
/// Returns `Ok(None)` when there is nothing to do yet (no uploads).
pub fn ingest(uploads: Vec<UploadedImage>) -> Result<Option<Vec<EncodedImage>>, ValidationError> {
    if uploads.len() > MAX_IMAGES {
        return Err(ValidationError::TooManyImages {
            count: uploads.len(),
        });
    }
    if uploads.is_empty() {
        return Ok(None);
    }

    uploads
        .into_iter()
        .enumerate()
        .map(|(i, upload)| encode(i, upload))
        .collect::<Result<Vec<_>, _>>()
        .map(Some)
}

fn encode(index: usize, upload: UploadedImage) -> Result<EncodedImage, ValidationError> {
    let name = upload.display_name(index);
    if upload.size > MAX_IMAGE_BYTES {
        return Err(ValidationError::TooLarge {
            name,
            size: upload.size,
        });
    }
    if upload.data.is_empty() {
        return Err(ValidationError::Empty { name });
    }

    let media_type = match image::guess_format(&upload.data) {
        Ok(ImageFormat::Png) => "image/png",
        Ok(ImageFormat::Jpeg) => "image/jpeg",
        _ => return Err(ValidationError::UnsupportedType { name }),
    };

    debug!(
        "encoding {name} ({} bytes, declared {:?}, sniffed {media_type})",
        upload.data.len(),
        upload.content_type
    );

    Ok(EncodedImage {
        data: general_purpose::STANDARD.encode(&upload.data),
        media_type,
        digest: Sha256::digest(&upload.data).into(),
    })
}

/// Previews are numbered in reverse upload order: the last upload is "Image 1"
pub fn preview_label(index: usize, count: usize) -> String {
    format!("Image {}", count.saturating_sub(index))
}

#[cfg(test)]
pub(crate) mod test {
    use super::*;
    use image::{ImageBuffer, ImageOutputFormat, Rgb};
    use std::io::Cursor;

    /// Encode a tiny solid-color image so every test image is distinct
    pub(crate) fn image_bytes(shade: u8, format: ImageOutputFormat) -> Vec<u8> {
        let img: ImageBuffer<Rgb<u8>, _> = ImageBuffer::from_pixel(2, 2, Rgb([shade, 0, 255 - shade]));
        let mut data = Vec::new();
        img.write_to(&mut Cursor::new(&mut data), format).unwrap();
        data
    }

    pub(crate) fn png(shade: u8) -> UploadedImage {
        UploadedImage::new(image_bytes(shade, ImageOutputFormat::Png))
            .with_content_type("image/png")
            .with_filename(format!("room{shade}.png"))
    }

    pub(crate) fn jpeg(shade: u8) -> UploadedImage {
        UploadedImage::new(image_bytes(shade, ImageOutputFormat::Jpeg(90)))
            .with_content_type("image/jpeg")
            .with_filename(format!("room{shade}.jpg"))
    }

    pub(crate) fn encoded(shades: &[u8]) -> Vec<EncodedImage> {
        ingest(shades.iter().map(|s| png(*s)).collect())
            .unwrap()
            .unwrap()
    }
}
