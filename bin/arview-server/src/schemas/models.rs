use arview_registry::ModelSummary;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// URL submission for `POST /uploadResult` (JSON or urlencoded).
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct UrlUploadRequest {
    /// Absolute http(s) URL of an already hosted model.
    #[serde(default)]
    pub url: Option<String>,
}

/// Multipart form for `POST /uploadResult`. Send either `model` or `url`.
#[derive(Debug, ToSchema)]
#[allow(dead_code)]
pub struct ModelUploadForm {
    /// Binary model file (.glb, .gltf, .obj, .fbx, .dae).
    #[schema(value_type = Option<String>, format = Binary)]
    pub model: Option<Vec<u8>>,
    /// Model URL, used when no file is sent.
    pub url: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct UploadResponse {
    pub success: bool,
    pub id: String,
    /// Where the model can be fetched from.
    pub url: String,
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ModelUrlResponse {
    pub model_url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ModelSummaryResponse {
    pub id: String,
    pub model_url: String,
    pub active: bool,
    /// ISO-8601 UTC timestamp, absent for legacy records.
    pub created_at: Option<String>,
}

impl From<ModelSummary> for ModelSummaryResponse {
    fn from(summary: ModelSummary) -> Self {
        Self {
            id: summary.id,
            model_url: summary.model_url,
            active: summary.active,
            created_at: summary
                .created_at
                .map(|ts| ts.to_rfc3339_opts(chrono::SecondsFormat::Millis, true)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ModelListResponse {
    pub models: Vec<ModelSummaryResponse>,
}

/// Body of `PATCH /model/{id}`. `active` must be a JSON boolean; anything
/// else is rejected with 400.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct UpdateModelRequest {
    #[serde(default)]
    #[schema(value_type = bool)]
    pub active: serde_json::Value,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct UpdateModelResponse {
    pub success: bool,
    pub id: String,
    pub active: bool,
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct QrResponse {
    pub id: String,
    pub viewer_url: String,
    /// `data:image/png;base64,...`
    pub qr: String,
}
