//! Vault HTTP API
//!
//! Endpoints:
//!   POST /store     multipart form, field `file` → `{"passphrase": "..."}`
//!   POST /retrieve  `{"passphrase": "..."}` → file bytes as an attachment
//!
//! Failures carry only `{"error": "<generic message>"}`; the underlying error
//! is logged server-side.

use std::sync::Arc;
use std::time::Instant;

use axum::{
    extract::{
        multipart::{Multipart, MultipartRejection},
        rejection::JsonRejection,
        DefaultBodyLimit, State,
    },
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::post,
    Json, Router,
};
use bipper_core::{BipperError, Outcome};
use bipper_storage::{OpendalBlobStore, SqliteMetadataStore};
use bipper_vault::VaultService;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tracing::{debug, error};

use crate::metrics::VaultMetrics;

pub type Vault = VaultService<SqliteMetadataStore, OpendalBlobStore>;

#[derive(Clone)]
pub struct AppState {
    pub vault: Arc<Vault>,
    pub metrics: VaultMetrics,
}

pub fn router(state: AppState, max_upload_bytes: usize) -> Router {
    Router::new()
        .route("/store", post(store))
        .route("/retrieve", post(retrieve))
        .layer(DefaultBodyLimit::max(max_upload_bytes))
        .with_state(state)
}

// ── Wire types ────────────────────────────────────────────────────────────

#[derive(Serialize, Deserialize)]
pub struct StoreResponse {
    pub passphrase: String,
}

#[derive(Deserialize)]
pub struct RetrieveRequest {
    pub passphrase: String,
}

#[derive(Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
}

/// A failure as the caller sees it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ApiError(pub Outcome);

impl ApiError {
    fn bad_request() -> Self {
        ApiError(Outcome::InvalidInput)
    }

    fn status(self) -> StatusCode {
        match self.0 {
            Outcome::InvalidPhrase => StatusCode::NOT_FOUND,
            Outcome::InvalidInput => StatusCode::BAD_REQUEST,
            Outcome::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<BipperError> for ApiError {
    fn from(e: BipperError) -> Self {
        let outcome = e.outcome();
        match outcome {
            Outcome::Internal => error!(error = %e, "request failed"),
            _ => debug!(error = %e, "request rejected"),
        }
        ApiError(outcome)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: self.0.message().to_string(),
        };
        (self.status(), Json(body)).into_response()
    }
}

// ── Handlers ──────────────────────────────────────────────────────────────

async fn store(
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<StoreResponse>, ApiError> {
    let started = Instant::now();
    let result = store_inner(&state, multipart).await;
    state.metrics.observe(
        "store",
        result.as_ref().err().map(|e| e.0),
        started.elapsed().as_secs_f64(),
    );
    result
}

async fn store_inner(
    state: &AppState,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<StoreResponse>, ApiError> {
    let mut multipart = multipart.map_err(|e| {
        debug!(error = %e, "rejected store body");
        ApiError::bad_request()
    })?;

    while let Some(field) = multipart.next_field().await.map_err(|e| {
        debug!(error = %e, "unreadable multipart body");
        ApiError::bad_request()
    })? {
        if field.name() != Some("file") {
            continue;
        }
        let filename = match field.file_name() {
            Some(name) if !name.is_empty() => name.to_string(),
            _ => return Err(ApiError::bad_request()),
        };
        let content = field.bytes().await.map_err(|e| {
            debug!(error = %e, "unreadable file part");
            ApiError::bad_request()
        })?;

        let phrase = state.vault.commit(&filename, &content).await?;
        return Ok(Json(StoreResponse {
            passphrase: phrase.expose_secret().to_string(),
        }));
    }

    Err(ApiError::bad_request())
}

async fn retrieve(
    State(state): State<AppState>,
    payload: Result<Json<RetrieveRequest>, JsonRejection>,
) -> Result<Response, ApiError> {
    let started = Instant::now();
    let result = retrieve_inner(&state, payload).await;
    state.metrics.observe(
        "retrieve",
        result.as_ref().err().map(|e| e.0),
        started.elapsed().as_secs_f64(),
    );
    result
}

async fn retrieve_inner(
    state: &AppState,
    payload: Result<Json<RetrieveRequest>, JsonRejection>,
) -> Result<Response, ApiError> {
    let Json(request) = payload.map_err(|e| {
        debug!(error = %e, "rejected retrieve body");
        ApiError::bad_request()
    })?;
    let phrase = SecretString::from(request.passphrase);
    if phrase.expose_secret().is_empty() {
        return Err(ApiError::bad_request());
    }

    let revealed = state.vault.reveal(&phrase).await?;

    let disposition = HeaderValue::from_str(&content_disposition(&revealed.filename))
        .map_err(|e| BipperError::Other(anyhow::anyhow!("content-disposition: {e}")))?;

    Ok((
        StatusCode::OK,
        [
            (
                header::CONTENT_TYPE,
                HeaderValue::from_static("application/octet-stream"),
            ),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        revealed.content,
    )
        .into_response())
}

/// `attachment` disposition carrying an ASCII fallback name and the exact
/// UTF-8 name as an RFC 5987 `filename*` parameter.
pub fn content_disposition(filename: &str) -> String {
    let fallback: String = filename
        .chars()
        .map(|c| match c {
            ' '..='~' if c != '"' && c != '\\' => c,
            _ => '_',
        })
        .collect();

    let mut encoded = String::with_capacity(filename.len() * 3);
    for byte in filename.bytes() {
        match byte {
            b'A'..=b'Z'
            | b'a'..=b'z'
            | b'0'..=b'9'
            | b'!'
            | b'#'
            | b'$'
            | b'&'
            | b'+'
            | b'-'
            | b'.'
            | b'^'
            | b'_'
            | b'`'
            | b'|'
            | b'~' => encoded.push(byte as char),
            _ => encoded.push_str(&format!("%{byte:02X}")),
        }
    }

    format!("attachment; filename=\"{fallback}\"; filename*=UTF-8''{encoded}")
}
