//! Caller-facing operations built on the registry facade.
//!
//! These functions are what the HTTP layer calls. They validate input
//! before any backend is touched and translate record state into the
//! access-control answers (`NotFound` vs `AccessDisabled`).

use serde_json::Value;
use tracing::debug;

use crate::error::RegistryError;
use crate::record::{
    DEFAULT_MAX_UPLOAD_BYTES, ModelRecord, ModelSource, ModelSummary, validate_model_url,
    validate_upload,
};
use crate::registry::Registry;

/// Limits applied by [`create_record`].
#[derive(Debug, Clone, Copy)]
pub struct UploadPolicy {
    pub max_upload_bytes: usize,
}

impl Default for UploadPolicy {
    fn default() -> Self {
        Self {
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
        }
    }
}

/// Register a new model from a URL or a binary payload.
///
/// URLs work on either backend and are stored with `fileName = url`.
/// Binary payloads need the remote object store; they are uploaded as
/// `models/<uuid><ext>` and the record points at the public object URL.
pub async fn create_record(
    registry: &Registry,
    source: ModelSource,
    policy: UploadPolicy,
) -> Result<ModelRecord, RegistryError> {
    match source {
        ModelSource::Url(raw) => {
            let url = validate_model_url(&raw)?;
            registry.create(url.clone(), url).await
        }
        ModelSource::Upload(file) => {
            let ext = validate_upload(&file, policy.max_upload_bytes)?;
            if !registry.supports_binary_upload() {
                return Err(RegistryError::BackendRequired);
            }
            let object_name = format!("models/{}{ext}", uuid::Uuid::new_v4());
            let model_url = registry.store_object(&object_name, &file).await?;
            registry.create(model_url, object_name).await
        }
    }
}

/// Resolve the model URL for `id`, enforcing the `active` flag.
pub async fn get_record(registry: &Registry, id: &str) -> Result<String, RegistryError> {
    let record = registry.get(id).await?;
    if !record.active {
        debug!(id = %id, "access to disabled model refused");
        return Err(RegistryError::AccessDisabled(record.id));
    }
    Ok(record.model_url)
}

/// Summaries of every known record.
pub async fn list_records(registry: &Registry) -> Result<Vec<ModelSummary>, RegistryError> {
    registry.list().await
}

/// Toggle the `active` flag. `active` must be a JSON boolean.
pub async fn set_active(
    registry: &Registry,
    id: &str,
    active: &Value,
) -> Result<ModelRecord, RegistryError> {
    let active = parse_active_flag(active)?;
    registry.set_active(id, active).await
}

/// Accept only a real boolean: `"true"`, `1` or `null` are rejected.
pub fn parse_active_flag(value: &Value) -> Result<bool, RegistryError> {
    value
        .as_bool()
        .ok_or_else(|| RegistryError::Validation("active must be a boolean value".into()))
}
