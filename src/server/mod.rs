//! The user-facing web server. Renders the assistant page, streams answers to
//! the browser, and exposes the response cache for administration

use crate::assistant::Assistant;
use crate::render::Page;
use actix_web::http::header::ContentType;
use actix_web::http::StatusCode;
use actix_web::{web, HttpResponse};
use anyhow::anyhow;
use std::collections::HashMap;
use tokio_util::sync::CancellationToken;

mod protocol;
pub mod routes;

/// Shared by every worker of the HTTP server
pub struct AppState {
    pub assistant: Assistant,
    pub page: Page,

    /// Cancelled on shutdown to abort in-flight model invocations
    pub shutdown: CancellationToken,
}

impl AppState {
    pub fn new(assistant: Assistant, page: Page) -> Self {
        AppState {
            assistant,
            page,
            shutdown: CancellationToken::new(),
        }
    }
}

/// Register every route of the assistant
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(routes::index)
        .service(routes::ask)
        .service(routes::cache_status)
        .service(routes::clear_cache);
}

#[derive(Debug)]
pub struct WebError {
    err: anyhow::Error,
    status: StatusCode,
}

impl WebError {
    pub fn new(status: StatusCode, err: impl Into<anyhow::Error>) -> Self {
        WebError {
            err: err.into(),
            status,
        }
    }
}

impl std::fmt::Display for WebError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.err)
    }
}

impl actix_web::error::ResponseError for WebError {
    fn error_response(&self) -> HttpResponse {
        let err = HashMap::from([("errors", vec![self.to_string()])]);

        HttpResponse::build(self.status_code())
            .insert_header(ContentType::json())
            .json(err)
    }

    fn status_code(&self) -> StatusCode {
        self.status
    }
}

impl From<anyhow::Error> for WebError {
    fn from(err: anyhow::Error) -> WebError {
        WebError::new(StatusCode::INTERNAL_SERVER_ERROR, err)
    }
}

impl From<actix_multipart::MultipartError> for WebError {
    fn from(err: actix_multipart::MultipartError) -> Self {
        WebError::new(StatusCode::BAD_REQUEST, anyhow!("malformed upload: {err}"))
    }
}
