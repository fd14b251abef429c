//! Routes of the assistant. `POST /ask` streams the page: everything up to
//! the question (and the spinner on a cache miss) is flushed before the model
//! is invoked, and the answer follows when it arrives

use super::protocol::{self, Evicted};
use super::{AppState, WebError};
use crate::ingest::ValidationError;
use actix_multipart::Multipart;
use actix_web::http::header::ContentType;
use actix_web::http::StatusCode;
use actix_web::web::Bytes;
use actix_web::{delete, get, post, web, HttpResponse, Responder};
use std::convert::Infallible;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::*;

type Result<T> = std::result::Result<T, WebError>;

fn html(status: StatusCode, body: String) -> HttpResponse {
    HttpResponse::build(status)
        .insert_header(ContentType::html())
        .body(body)
}

/// The empty assistant page
#[get("/")]
pub async fn index(state: web::Data<AppState>) -> impl Responder {
    html(StatusCode::OK, state.page.landing(None, None))
}

/// Ask a question about the uploaded images
#[post("/ask")]
pub async fn ask(payload: Multipart, state: web::Data<AppState>) -> Result<HttpResponse> {
    let form = protocol::read_form(payload).await?;
    let question = form.question.as_deref();

    let prepared = if form.extra_images > 0 {
        Err(ValidationError::TooManyImages {
            count: form.image_count(),
        })
    } else {
        state.assistant.prepare(form.uploads, question)
    };

    let prepared = match prepared {
        Ok(Some(prepared)) => prepared,
        Ok(None) => {
            debug!("no images uploaded yet");
            return Ok(html(StatusCode::OK, state.page.landing(question, None)));
        }
        Err(e) => {
            warn!("rejected upload: {e}");
            return Ok(html(
                StatusCode::UNPROCESSABLE_ENTITY,
                state.page.landing(question, Some(&e.to_string())),
            ));
        }
    };

    let page = &state.page;
    let mut prefix = [
        page.header(),
        page.form(question, None),
        page.previews(&prepared.images),
        page.question(&prepared.query),
    ]
    .concat();
    if !state.assistant.is_cached(&prepared) {
        prefix.push_str(&page.spinner());
    }

    info!(
        "answering {:?} about {} images",
        prepared.query.as_str(),
        prepared.images.len()
    );

    let (tx, rx) = mpsc::channel::<std::result::Result<Bytes, Infallible>>(2);
    let cancel = state.shutdown.child_token();
    let state = state.clone();
    actix_web::rt::spawn(async move {
        // A closed channel means the browser went away; the answer is still
        // computed so that it lands in the cache
        let _ = tx.send(Ok(Bytes::from(prefix))).await;

        let body = match state.assistant.answer(&prepared, &cancel).await {
            Ok(answer) => state.page.response(&answer.response),
            Err(e) => {
                error!("failed to answer {:?}: {e}", prepared.query.as_str());
                state.page.failure(&e.to_string())
            }
        };
        let _ = tx
            .send(Ok(Bytes::from(body + state.page.footer())))
            .await;
    });

    Ok(HttpResponse::Ok()
        .insert_header(ContentType::html())
        .streaming(ReceiverStream::new(rx)))
}

/// Size of the response cache and its hit/miss counters
#[get("/cache/status")]
pub async fn cache_status(state: web::Data<AppState>) -> impl Responder {
    web::Json(state.assistant.cache().stats())
}

/// Forget every cached response
#[delete("/cache")]
pub async fn clear_cache(state: web::Data<AppState>) -> impl Responder {
    let evicted = state.assistant.cache().clear();
    info!("evicted {evicted} cached responses");
    web::Json(Evicted { evicted })
}
