//! QR code for a model's viewer page.

use std::sync::Arc;

use arview_registry::{render_qr, viewer_url};
use axum::extract::{Path, State};
use axum::http::{HeaderMap, header};
use axum::routing::get;
use axum::{Json, Router};
use utoipa::OpenApi;

use crate::error::ServerError;
use crate::schemas::models::QrResponse;
use crate::state::AppState;

#[derive(OpenApi)]
#[openapi(paths(get_qr), components(schemas(QrResponse)))]
pub struct QrApi;

pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/qr/{id}", get(get_qr))
}

/// Viewer URL and QR code for `id` (`GET /qr/{id}`).
///
/// The registry is not consulted: any id yields a code, access control is
/// applied when the viewer resolves the model.
#[utoipa::path(
    get,
    path = "/qr/{id}",
    tag = "qr",
    params(("id" = String, Path, description = "Model id")),
    responses(
        (status = 200, description = "QR code rendered", body = QrResponse),
        (status = 500, description = "QR generation failed"),
    )
)]
pub async fn get_qr(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> Result<Json<QrResponse>, ServerError> {
    let base = match &state.config.public_base_url {
        Some(base) => base.clone(),
        None => request_base_url(&headers, &state.config.bind_address),
    };
    let viewer_url = viewer_url(&base, &id);
    let qr = render_qr(&viewer_url)?.to_data_url();

    Ok(Json(QrResponse { id, viewer_url, qr }))
}

/// `proto://host` as the client addressed us; `X-Forwarded-Proto` is honoured
/// when a proxy sets it.
fn request_base_url(headers: &HeaderMap, fallback_host: &str) -> String {
    let proto = headers
        .get("x-forwarded-proto")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .unwrap_or("http");
    let host = headers
        .get(header::HOST)
        .and_then(|v| v.to_str().ok())
        .unwrap_or(fallback_host);
    format!("{proto}://{host}")
}
