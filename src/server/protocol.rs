use super::WebError;
use crate::config::{MAX_IMAGES, MAX_IMAGE_BYTES};
use crate::ingest::UploadedImage;
use actix_multipart::{Field, Multipart};
use actix_web::http::StatusCode;
use anyhow::anyhow;
use serde::Serialize;
use tokio_stream::StreamExt;
use tracing::debug;

/// Longest question accepted from the form
const MAX_QUESTION_BYTES: usize = 64 * 1024;

/// The fields of the `POST /ask` form
#[derive(Debug, Default)]
pub struct AskForm {
    pub uploads: Vec<UploadedImage>,

    /// Image parts past `MAX_IMAGES`, counted but not kept
    pub extra_images: usize,

    pub question: Option<String>,
}

impl AskForm {
    /// Every image part the browser sent
    pub fn image_count(&self) -> usize {
        self.uploads.len() + self.extra_images
    }
}

/// Response of `DELETE /cache`
#[derive(Debug, Serialize)]
pub struct Evicted {
    pub evicted: usize,
}

async fn read_field(field: &mut Field, limit: usize) -> Result<Vec<u8>, WebError> {
    let mut data = Vec::new();
    while let Some(chunk) = field.next().await {
        let chunk = chunk?;
        if data.len() + chunk.len() > limit {
            return Err(WebError::new(
                StatusCode::PAYLOAD_TOO_LARGE,
                anyhow!("form field exceeds {limit} bytes"),
            ));
        }
        data.extend_from_slice(&chunk);
    }
    Ok(data)
}

async fn skip_field(field: &mut Field) -> Result<usize, WebError> {
    let mut size = 0;
    while let Some(chunk) = field.next().await {
        size += chunk?.len();
    }
    Ok(size)
}

/// Read an image part. Past `MAX_IMAGE_BYTES` the rest is drained and only
/// the size is kept, so ingestion can report the upload as too large
async fn read_image(field: &mut Field) -> Result<UploadedImage, WebError> {
    let mut data = Vec::new();
    while let Some(chunk) = field.next().await {
        let chunk = chunk?;
        if data.len() + chunk.len() > MAX_IMAGE_BYTES {
            let size = data.len() + chunk.len() + skip_field(field).await?;
            return Ok(UploadedImage::oversized(size));
        }
        data.extend_from_slice(&chunk);
    }
    Ok(UploadedImage::new(data))
}

/// Read the multipart form. File inputs left empty by the browser are skipped
pub async fn read_form(mut payload: Multipart) -> Result<AskForm, WebError> {
    let mut form = AskForm::default();

    while let Some(field) = payload.next().await {
        let mut field = field?;
        let disposition = field.content_disposition();
        let name = disposition.get_name().unwrap_or_default().to_string();
        let filename = disposition
            .get_filename()
            .filter(|f| !f.is_empty())
            .map(str::to_string);
        let content_type = field.content_type().map(|m| m.to_string());

        match name.as_str() {
            "images" if form.uploads.len() >= MAX_IMAGES => {
                skip_field(&mut field).await?;
                form.extra_images += 1;
            }
            "images" => {
                let mut upload = read_image(&mut field).await?;
                if filename.is_none() && upload.size == 0 {
                    continue;
                }
                upload.content_type = content_type;
                upload.filename = filename;
                form.uploads.push(upload);
            }
            "question" => {
                let data = read_field(&mut field, MAX_QUESTION_BYTES).await?;
                let question = String::from_utf8(data).map_err(|e| {
                    WebError::new(StatusCode::BAD_REQUEST, anyhow!("question is not UTF-8: {e}"))
                })?;
                form.question = Some(question).filter(|q| !q.is_empty());
            }
            other => {
                debug!("ignoring form field {other:?}");
                skip_field(&mut field).await?;
            }
        }
    }

    Ok(form)
}
