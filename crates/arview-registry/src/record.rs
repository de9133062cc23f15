//! The registry's single entity and the validation shared by both backends.

use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::RegistryError;

/// File extensions accepted for binary model uploads.
pub const ALLOWED_EXTENSIONS: &[&str] = &[".glb", ".gltf", ".obj", ".fbx", ".dae"];

/// Default upper bound for a binary model upload (50 MiB).
pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 50 * 1024 * 1024;

/// One registry entry mapping an identifier to a model URL plus an access flag.
///
/// Serialized in camelCase so the local registry file keeps the layout
/// `{ "id", "modelUrl", "active", "fileName", "createdAt" }`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelRecord {
    pub id: String,
    /// Older registry files stored this field as `url`.
    #[serde(alias = "url")]
    pub model_url: String,
    #[serde(default = "default_active")]
    pub active: bool,
    #[serde(default)]
    pub file_name: String,
    /// `None` while a server-assigned timestamp is still pending.
    #[serde(default, with = "iso8601")]
    pub created_at: Option<DateTime<Utc>>,
}

fn default_active() -> bool {
    true
}

impl ModelRecord {
    /// Build a fresh record: new UUID, `active = true`, stamped with the current time.
    pub fn new(model_url: impl Into<String>, file_name: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            model_url: model_url.into(),
            active: true,
            file_name: file_name.into(),
            created_at: Some(Utc::now()),
        }
    }
}

/// The subset of a record returned by list operations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelSummary {
    pub id: String,
    pub model_url: String,
    pub active: bool,
    #[serde(with = "iso8601")]
    pub created_at: Option<DateTime<Utc>>,
}

impl From<&ModelRecord> for ModelSummary {
    fn from(record: &ModelRecord) -> Self {
        Self {
            id: record.id.clone(),
            model_url: record.model_url.clone(),
            active: record.active,
            created_at: record.created_at,
        }
    }
}

impl From<ModelRecord> for ModelSummary {
    fn from(record: ModelRecord) -> Self {
        Self {
            id: record.id,
            model_url: record.model_url,
            active: record.active,
            created_at: record.created_at,
        }
    }
}

/// A binary model payload received from a client.
#[derive(Debug, Clone)]
pub struct UploadedFile {
    /// File name as sent by the client, used only for its extension.
    pub original_name: String,
    pub content_type: Option<String>,
    pub bytes: Bytes,
}

impl UploadedFile {
    /// Lower-cased extension including the leading dot, e.g. `".glb"`.
    pub fn extension(&self) -> Option<String> {
        std::path::Path::new(&self.original_name)
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| format!(".{}", ext.to_ascii_lowercase()))
    }
}

/// Where a new record's model resource comes from.
#[derive(Debug, Clone)]
pub enum ModelSource {
    Url(String),
    Upload(UploadedFile),
}

/// Check that `raw` is an absolute `http`/`https` URL and return it trimmed.
pub fn validate_model_url(raw: &str) -> Result<String, RegistryError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(RegistryError::Validation("url must not be empty".into()));
    }
    let parsed = reqwest::Url::parse(trimmed)
        .map_err(|e| RegistryError::Validation(format!("url is not an absolute URL: {e}")))?;
    match parsed.scheme() {
        "http" | "https" => Ok(trimmed.to_owned()),
        other => Err(RegistryError::Validation(format!(
            "url scheme must be http or https (got: {other})"
        ))),
    }
}

/// Validate a binary upload and return its normalized extension.
pub fn validate_upload(file: &UploadedFile, max_bytes: usize) -> Result<String, RegistryError> {
    if file.bytes.is_empty() {
        return Err(RegistryError::Validation("uploaded file is empty".into()));
    }
    if file.bytes.len() > max_bytes {
        return Err(RegistryError::Validation(format!(
            "file too large: {} bytes exceeds maximum of {} bytes",
            file.bytes.len(),
            max_bytes
        )));
    }
    let ext = file.extension().unwrap_or_default();
    if !ALLOWED_EXTENSIONS.contains(&ext.as_str()) {
        return Err(RegistryError::Validation(
            "Invalid file type. Only 3D model files are allowed.".into(),
        ));
    }
    Ok(ext)
}

/// Millisecond-precision RFC 3339 (`2024-05-01T12:00:00.000Z`), `null` when absent.
pub(crate) mod iso8601 {
    use chrono::{DateTime, SecondsFormat, Utc};
    use serde::{Deserialize, Deserializer, Serializer};
    use serde_json::Value;

    pub fn format(ts: &DateTime<Utc>) -> String {
        ts.to_rfc3339_opts(SecondsFormat::Millis, true)
    }

    pub fn parse(raw: &str) -> Option<DateTime<Utc>> {
        match DateTime::parse_from_rfc3339(raw) {
            Ok(ts) => Some(ts.with_timezone(&Utc)),
            Err(e) => {
                tracing::warn!(raw = %raw, error = %e, "failed to parse record timestamp; dropping value");
                None
            }
        }
    }

    pub fn serialize<S>(value: &Option<DateTime<Utc>>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match value {
            Some(ts) => serializer.serialize_str(&format(ts)),
            None => serializer.serialize_none(),
        }
    }

    /// Accepts RFC 3339 text or epoch milliseconds; anything else reads as
    /// `None` with a warning instead of failing the whole record.
    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw: Option<Value> = Option::deserialize(deserializer)?;
        Ok(match raw {
            None | Some(Value::Null) => None,
            Some(Value::String(text)) => parse(&text),
            Some(Value::Number(n)) => {
                let ts = n.as_i64().and_then(DateTime::from_timestamp_millis);
                if ts.is_none() {
                    tracing::warn!(raw = %n, "record timestamp out of range; dropping value");
                }
                ts
            }
            Some(other) => {
                tracing::warn!(raw = %other, "record timestamp is not a string; dropping value");
                None
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn new_record_is_active_and_stamped() {
        let record = ModelRecord::new("https://example.com/a.glb", "https://example.com/a.glb");
        assert!(record.active);
        assert!(record.created_at.is_some());
        assert!(uuid::Uuid::parse_str(&record.id).is_ok());
    }

    #[test]
    fn record_serializes_camel_case_with_millis() {
        let record = ModelRecord {
            id: "abc".into(),
            model_url: "https://example.com/a.glb".into(),
            active: true,
            file_name: "a.glb".into(),
            created_at: Some("2024-05-01T12:00:00Z".parse().unwrap()),
        };
        let value = serde_json::to_value(&record).unwrap();
        assert_eq!(value["modelUrl"], "https://example.com/a.glb");
        assert_eq!(value["fileName"], "a.glb");
        assert_eq!(value["createdAt"], "2024-05-01T12:00:00.000Z");
    }

    #[test]
    fn legacy_record_accepts_url_alias_and_defaults_active() {
        let record: ModelRecord = serde_json::from_value(json!({
            "id": "legacy",
            "url": "https://example.com/old.obj"
        }))
        .unwrap();
        assert_eq!(record.model_url, "https://example.com/old.obj");
        assert!(record.active);
        assert_eq!(record.created_at, None);
        assert!(record.file_name.is_empty());
    }

    #[test]
    fn unparseable_timestamp_becomes_none() {
        let record: ModelRecord = serde_json::from_value(json!({
            "id": "x",
            "modelUrl": "https://example.com/x.glb",
            "createdAt": "yesterday"
        }))
        .unwrap();
        assert_eq!(record.created_at, None);
    }

    #[test]
    fn epoch_millis_timestamp_is_accepted() {
        let record: ModelRecord = serde_json::from_value(json!({
            "id": "n",
            "modelUrl": "https://example.com/n.glb",
            "createdAt": 1704164645678i64
        }))
        .unwrap();
        assert_eq!(
            record.created_at.map(|ts| iso8601::format(&ts)).as_deref(),
            Some("2024-01-02T03:04:05.678Z")
        );

        let record: ModelRecord = serde_json::from_value(json!({
            "id": "o",
            "modelUrl": "https://example.com/o.glb",
            "createdAt": { "seconds": 1 }
        }))
        .unwrap();
        assert_eq!(record.created_at, None);
    }

    #[test]
    fn url_validation() {
        assert!(validate_model_url(" https://example.com/m.glb ").is_ok());
        assert!(matches!(validate_model_url(""), Err(RegistryError::Validation(_))));
        assert!(matches!(validate_model_url("model.glb"), Err(RegistryError::Validation(_))));
        assert!(matches!(
            validate_model_url("ftp://example.com/m.glb"),
            Err(RegistryError::Validation(_))
        ));
    }

    fn upload(name: &str, len: usize) -> UploadedFile {
        UploadedFile {
            original_name: name.into(),
            content_type: None,
            bytes: Bytes::from(vec![0u8; len]),
        }
    }

    #[test]
    fn upload_validation_checks_extension_case_insensitively() {
        assert_eq!(validate_upload(&upload("Scan.GLB", 4), 16).unwrap(), ".glb");
        assert!(validate_upload(&upload("scan.png", 4), 16).is_err());
        assert!(validate_upload(&upload("noext", 4), 16).is_err());
    }

    #[test]
    fn upload_validation_checks_size() {
        assert!(validate_upload(&upload("a.obj", 0), 16).is_err());
        assert!(validate_upload(&upload("a.obj", 17), 16).is_err());
        assert!(validate_upload(&upload("a.obj", 16), 16).is_ok());
    }
}
