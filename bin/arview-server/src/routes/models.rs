//! Model registry routes.
//!
//! `POST /uploadResult` registers a model from an uploaded file or a URL,
//! `GET /model/{id}` resolves a model URL subject to its `active` flag,
//! `GET /models` lists every record and `PATCH /model/{id}` toggles access.

use std::sync::Arc;

use arview_registry::{ModelSource, UploadedFile, access};
use axum::extract::rejection::JsonRejection;
use axum::extract::{DefaultBodyLimit, FromRequest, Multipart, Path, Request, State};
use axum::http::header;
use axum::routing::{get, post};
use axum::{Form, Json, Router};
use bytes::BytesMut;
use tracing::{debug, info};
use utoipa::OpenApi;

use crate::error::ServerError;
use crate::schemas::models::{
    ModelListResponse, ModelSummaryResponse, ModelUploadForm, ModelUrlResponse,
    UpdateModelRequest, UpdateModelResponse, UploadResponse, UrlUploadRequest,
};
use crate::state::AppState;

/// Allowance for multipart framing on top of the file size limit.
const MULTIPART_OVERHEAD: usize = 1024 * 1024;

#[derive(OpenApi)]
#[openapi(
    paths(upload_result, get_model, list_models, update_model),
    components(schemas(
        UrlUploadRequest,
        ModelUploadForm,
        UploadResponse,
        ModelUrlResponse,
        ModelSummaryResponse,
        ModelListResponse,
        UpdateModelRequest,
        UpdateModelResponse
    ))
)]
pub struct ModelsApi;

/// Register model routes. `max_upload_bytes` bounds the upload body.
pub fn router(max_upload_bytes: usize) -> Router<Arc<AppState>> {
    Router::new()
        .route(
            "/uploadResult",
            post(upload_result).layer(DefaultBodyLimit::max(
                max_upload_bytes.saturating_add(MULTIPART_OVERHEAD),
            )),
        )
        .route("/models", get(list_models))
        .route("/model/{id}", get(get_model).patch(update_model))
}

/// Register a model (`POST /uploadResult`).
///
/// Accepts `multipart/form-data` with a `model` file part or a `url` text
/// part, or a `{ "url": ... }` body as JSON or urlencoded form. File parts
/// are streamed with the size limit enforced per chunk.
#[utoipa::path(
    post,
    path = "/uploadResult",
    tag = "models",
    request_body(
        content(
            (ModelUploadForm = "multipart/form-data"),
            (UrlUploadRequest = "application/json"),
            (UrlUploadRequest = "application/x-www-form-urlencoded")
        ),
        description = "Model file upload or model URL"
    ),
    responses(
        (status = 200, description = "Model registered", body = UploadResponse),
        (status = 400, description = "Missing input, invalid URL or unsupported file type"),
        (status = 413, description = "File too large"),
        (status = 503, description = "File uploads need the remote storage backend"),
        (status = 500, description = "Backend error"),
    )
)]
pub async fn upload_result(
    State(state): State<Arc<AppState>>,
    req: Request,
) -> Result<Json<UploadResponse>, ServerError> {
    let content_type = req
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_ascii_lowercase();

    let source = if content_type.starts_with("multipart/form-data") {
        let multipart = Multipart::from_request(req, &state)
            .await
            .map_err(|e| ServerError::BadRequest(e.body_text()))?;
        read_multipart(multipart, state.config.max_upload_bytes).await?
    } else if content_type.starts_with("application/json") {
        let Json(body) = Json::<UrlUploadRequest>::from_request(req, &state)
            .await
            .map_err(|e| ServerError::BadRequest(e.body_text()))?;
        url_source(body.url)?
    } else if content_type.starts_with("application/x-www-form-urlencoded") {
        let Form(body) = Form::<UrlUploadRequest>::from_request(req, &state)
            .await
            .map_err(|e| ServerError::BadRequest(e.body_text()))?;
        url_source(body.url)?
    } else {
        return Err(missing_input());
    };

    let record = access::create_record(&state.registry, source, state.upload_policy()).await?;
    info!(id = %record.id, file_name = %record.file_name, "model uploaded");

    Ok(Json(UploadResponse {
        success: true,
        id: record.id,
        url: record.model_url,
        message: "Model uploaded successfully".to_owned(),
    }))
}

/// Resolve a model URL (`GET /model/{id}`).
///
/// 404 when no backend knows the id, 403 when the model is disabled.
#[utoipa::path(
    get,
    path = "/model/{id}",
    tag = "models",
    params(("id" = String, Path, description = "Model id")),
    responses(
        (status = 200, description = "Model is active", body = ModelUrlResponse),
        (status = 403, description = "Access Disabled"),
        (status = 404, description = "Model not found"),
        (status = 500, description = "Backend error"),
    )
)]
pub async fn get_model(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<ModelUrlResponse>, ServerError> {
    let model_url = access::get_record(&state.registry, &id).await?;
    Ok(Json(ModelUrlResponse { model_url }))
}

/// List every registered model (`GET /models`).
#[utoipa::path(
    get,
    path = "/models",
    tag = "models",
    responses(
        (status = 200, description = "All models", body = ModelListResponse),
        (status = 500, description = "Backend error"),
    )
)]
pub async fn list_models(
    State(state): State<Arc<AppState>>,
) -> Result<Json<ModelListResponse>, ServerError> {
    let models = access::list_records(&state.registry).await?;
    Ok(Json(ModelListResponse {
        models: models.into_iter().map(ModelSummaryResponse::from).collect(),
    }))
}

/// Enable or disable a model (`PATCH /model/{id}`).
#[utoipa::path(
    patch,
    path = "/model/{id}",
    tag = "models",
    params(("id" = String, Path, description = "Model id")),
    request_body = UpdateModelRequest,
    responses(
        (status = 200, description = "Flag updated", body = UpdateModelResponse),
        (status = 400, description = "active must be a boolean value"),
        (status = 404, description = "Model not found"),
        (status = 500, description = "Backend error"),
    )
)]
pub async fn update_model(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    body: Result<Json<UpdateModelRequest>, JsonRejection>,
) -> Result<Json<UpdateModelResponse>, ServerError> {
    let Json(req) = body.map_err(|e| ServerError::BadRequest(e.body_text()))?;
    let record = access::set_active(&state.registry, &id, &req.active).await?;

    let verb = if record.active { "enabled" } else { "disabled" };
    Ok(Json(UpdateModelResponse {
        success: true,
        id: record.id,
        active: record.active,
        message: format!("Model {verb} successfully"),
    }))
}

// ── private helpers ──────────────────────────────────────────────────────────

fn missing_input() -> ServerError {
    ServerError::BadRequest("Either a file or URL must be provided".into())
}

fn url_source(url: Option<String>) -> Result<ModelSource, ServerError> {
    url.filter(|u| !u.trim().is_empty())
        .map(ModelSource::Url)
        .ok_or_else(missing_input)
}

/// Pull the model source out of a multipart body. A `model` file part wins
/// over a `url` text part; other fields are ignored.
async fn read_multipart(
    mut multipart: Multipart,
    max_upload_bytes: usize,
) -> Result<ModelSource, ServerError> {
    let mut url = None;

    while let Some(mut field) = multipart
        .next_field()
        .await
        .map_err(|e| ServerError::BadRequest(format!("Failed to read multipart field: {e}")))?
    {
        let name = field.name().unwrap_or_default().to_owned();
        match name.as_str() {
            "model" => {
                let original_name = field.file_name().unwrap_or("upload").to_owned();
                let content_type = field.content_type().map(str::to_owned);

                let mut buf = BytesMut::new();
                while let Some(chunk) = field
                    .chunk()
                    .await
                    .map_err(|e| ServerError::BadRequest(format!("Failed to read file chunk: {e}")))?
                {
                    buf.extend_from_slice(&chunk);
                    if buf.len() > max_upload_bytes {
                        return Err(ServerError::PayloadTooLarge(format!(
                            "file exceeds maximum of {max_upload_bytes} bytes"
                        )));
                    }
                }

                debug!(
                    file_name = %original_name,
                    size_bytes = buf.len(),
                    "received model file"
                );
                return Ok(ModelSource::Upload(UploadedFile {
                    original_name,
                    content_type,
                    bytes: buf.freeze(),
                }));
            }
            "url" => {
                url = Some(field.text().await.map_err(|e| {
                    ServerError::BadRequest(format!("Failed to read url field: {e}"))
                })?);
            }
            other => debug!(field = %other, "ignoring multipart field"),
        }
    }

    url_source(url)
}
