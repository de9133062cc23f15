//! Unified server error type.
//!
//! Every handler returns `Result<T, ServerError>`, which implements
//! [`axum::response::IntoResponse`] so errors become a JSON body with an
//! appropriate status code.
//!
//! Backend faults are logged with full detail but only a generic message is
//! returned, so file paths and remote responses never leak to clients.

use arview_registry::RegistryError;
use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use thiserror::Error;
use tracing::error;

/// All errors that can occur in the arview-server request lifecycle.
#[derive(Debug, Error)]
pub enum ServerError {
    /// Propagated from the registry core.
    #[error(transparent)]
    Registry(#[from] RegistryError),

    /// The request body could not be read or had the wrong shape.
    #[error("bad request: {0}")]
    BadRequest(String),

    /// An uploaded file exceeded the configured limit.
    #[error("payload too large: {0}")]
    PayloadTooLarge(String),
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let (status, body) = match &self {
            ServerError::Registry(RegistryError::NotFound(_)) => {
                (StatusCode::NOT_FOUND, json!({ "error": "Model not found" }))
            }
            ServerError::Registry(RegistryError::AccessDisabled(_)) => {
                (StatusCode::FORBIDDEN, json!({ "error": "Access Disabled" }))
            }
            ServerError::Registry(RegistryError::Validation(m)) | ServerError::BadRequest(m) => (
                StatusCode::BAD_REQUEST,
                json!({ "error": "Invalid request", "message": m }),
            ),
            ServerError::PayloadTooLarge(m) => (
                StatusCode::PAYLOAD_TOO_LARGE,
                json!({ "error": "File too large", "message": m }),
            ),
            ServerError::Registry(RegistryError::BackendRequired) => (
                StatusCode::SERVICE_UNAVAILABLE,
                json!({
                    "error": "File uploads require the remote storage backend",
                    "message": "Configure remote storage to upload files. URL uploads work without it."
                }),
            ),
            ServerError::Registry(RegistryError::Qr(e)) => {
                error!(error = %e, "QR generation failed");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    json!({ "error": "QR generation failed" }),
                )
            }
            ServerError::Registry(RegistryError::Store(e)) => {
                error!(error = %e, "registry backend error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    json!({ "error": "internal server error" }),
                )
            }
        };
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arview_registry::StoreError;
    use http_body_util::BodyExt;
    use tracing_test::traced_test;

    async fn render(err: ServerError) -> (StatusCode, serde_json::Value) {
        let response = err.into_response();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn access_errors_keep_their_contract_bodies() {
        let (status, body) = render(RegistryError::NotFound("x".into()).into()).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body, json!({ "error": "Model not found" }));

        let (status, body) = render(RegistryError::AccessDisabled("x".into()).into()).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body, json!({ "error": "Access Disabled" }));
    }

    #[tokio::test]
    #[traced_test]
    async fn backend_faults_are_generic() {
        let fault = StoreError::Remote {
            status: 500,
            message: "projects/secret/databases".into(),
        };
        let (status, body) = render(RegistryError::Store(fault).into()).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(!body.to_string().contains("secret"));
        assert!(logs_contain("registry backend error"));
    }

    #[tokio::test]
    async fn upload_without_remote_is_unavailable() {
        let (status, _) = render(RegistryError::BackendRequired.into()).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    }
}
