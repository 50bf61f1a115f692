use axum::body::Bytes;
use axum::extract::multipart::MultipartError;
use axum::extract::{Multipart, Path, Query, State};
use axum::http::header::CONTENT_TYPE;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Json, Redirect, Response};
use glacier_store::AppendReceipt;
use glacier_types::generate_identifier;
use serde::Deserialize;
use serde_json::json;

use crate::auth::{Access, TokenQuery};
use crate::error::{ServerError, ServerResult};
use crate::state::AppState;

const OPENMETRICS_CONTENT_TYPE: &str = "application/openmetrics-text; version=1.0.0; charset=utf-8";

/// Run blocking storage work off the async executor.
async fn blocking<T, F>(f: F) -> ServerResult<T>
where
    F: FnOnce() -> ServerResult<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| ServerError::Internal(e.to_string()))?
}

/// Health check handler.
pub async fn health_handler() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

/// Info handler.
pub async fn info_handler(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(json!({
        "name": "glacier",
        "version": env!("CARGO_PKG_VERSION"),
        "data_folder": state.store.root(),
        "extend_life_support": state.store.id_codec().extend_life_support(),
        "disk_usage_allowed": state.disk_usage_allowed,
    }))
}

/// A fresh time-encoded identifier and the container it maps to.
pub async fn uuid_handler(State(state): State<AppState>) -> ServerResult<Json<serde_json::Value>> {
    let id = generate_identifier();
    let resolved = state.store.resolve(&id)?;
    let container = state.store.container_path(&resolved);
    Ok(Json(json!({
        "Uuid": resolved.normalized,
        "ContainerFile": container.display().to_string(),
    })))
}

fn created(receipt: AppendReceipt) -> Response {
    let body = json!({
        "id": receipt.id,
        "container": receipt.container,
        "compressed": receipt.compressed,
    });
    (StatusCode::CREATED, Json(body)).into_response()
}

async fn store_upload(state: AppState, id: String, body: Bytes) -> ServerResult<Response> {
    let store = state.store.clone();
    let receipt = blocking(move || Ok(store.append(&id, &body)?)).await?;
    Ok(created(receipt))
}

/// Store the raw request body under the identifier in the path.
pub async fn raw_upload_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(query): Query<TokenQuery>,
    headers: HeaderMap,
    body: Bytes,
) -> ServerResult<Response> {
    state.tokens.authorize(Access::Write, &headers, &query)?;
    store_upload(state, id, body).await
}

/// Multipart form field carrying the upload.
pub const UPLOAD_FIELD: &str = "myFile";

#[derive(Debug, Deserialize)]
pub struct UploadQuery {
    /// Present (with any value) to ignore the file name and generate an identifier.
    pub newuuid: Option<String>,
}

/// Store the `myFile` form field. The identifier is the field's file name
/// unless `?newuuid` asks for a generated one.
pub async fn upload_handler(
    State(state): State<AppState>,
    Query(query): Query<TokenQuery>,
    Query(upload): Query<UploadQuery>,
    headers: HeaderMap,
    mut multipart: Multipart,
) -> ServerResult<Response> {
    state.tokens.authorize(Access::Write, &headers, &query)?;
    let malformed = |e: MultipartError| ServerError::BadRequest(e.body_text());
    while let Some(field) = multipart.next_field().await.map_err(malformed)? {
        if field.name() != Some(UPLOAD_FIELD) {
            continue;
        }
        let file_name = field.file_name().map(str::to_owned);
        let id = match (upload.newuuid.is_some(), file_name) {
            (true, _) => generate_identifier(),
            (false, Some(name)) if !name.is_empty() => name,
            (false, _) => {
                return Err(ServerError::BadRequest(format!("{UPLOAD_FIELD} has no file name")))
            }
        };
        let body = field.bytes().await.map_err(malformed)?;
        return store_upload(state, id, body).await;
    }
    Err(ServerError::BadRequest(format!("missing form field {UPLOAD_FIELD}")))
}

/// Serve a stored payload with the content type recorded at upload.
pub async fn get_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(query): Query<TokenQuery>,
    headers: HeaderMap,
) -> ServerResult<Response> {
    state.tokens.authorize(Access::Read, &headers, &query)?;
    let store = state.store.clone();
    let blob = blocking(move || Ok(store.read(&id)?)).await?;
    let content_type = blob
        .meta
        .content_type
        .unwrap_or_else(|| "application/octet-stream".to_string());
    Ok(([(CONTENT_TYPE, content_type)], blob.data).into_response())
}

#[derive(Debug, Deserialize)]
pub struct RedirectQuery {
    pub file: Option<String>,
}

/// `/redirect?file=<id>` forwards to `get/<id>`.
pub async fn redirect_handler(Query(query): Query<RedirectQuery>) -> ServerResult<Redirect> {
    match query.file.filter(|f| !f.is_empty()) {
        Some(id) => Ok(Redirect::to(&format!("get/{id}"))),
        None => Err(ServerError::BadRequest("missing file parameter".into())),
    }
}

/// Disk usage and retention window of the storage root.
pub async fn status_handler(State(state): State<AppState>) -> ServerResult<Json<serde_json::Value>> {
    let threshold = state.disk_usage_allowed;
    let monitor = state.monitor.clone();
    let retention = state.retention.clone();
    let (disk, window) = blocking(move || {
        let disk = monitor.sample()?;
        let window = retention.current_retention_window()?;
        Ok((disk, window))
    })
    .await?;
    Ok(Json(json!({
        "disk": disk,
        "disk_usage_allowed": threshold,
        "over_threshold": disk.exceeds(threshold),
        "retention": window,
    })))
}

/// Prometheus text exposition.
pub async fn metrics_handler(State(state): State<AppState>) -> ServerResult<Response> {
    let text = state
        .metrics
        .encode()
        .map_err(|e| ServerError::Internal(e.to_string()))?;
    Ok(([(CONTENT_TYPE, OPENMETRICS_CONTENT_TYPE)], text).into_response())
}
