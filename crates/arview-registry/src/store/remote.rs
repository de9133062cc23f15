//! Firestore + Cloud Storage backend, spoken over the public REST APIs.
//!
//! Records live one per document in the flat `models` collection, keyed by
//! record id. `createdAt` is written through a server-timestamp transform,
//! so it is `null` on a read that races the write. Binary model payloads go
//! to the configured bucket with a public-read ACL.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use gcp_auth::{CustomServiceAccount, TokenProvider};
use reqwest::{StatusCode, Url};
use serde::Deserialize;
use serde_json::{Map, Value, json};
use tracing::{debug, info};

use super::{BackendKind, RecordStore};
use crate::config::{CredentialSource, RemoteConfig};
use crate::error::StoreError;
use crate::record::{ModelRecord, UploadedFile, iso8601};

const FIRESTORE_BASE: &str = "https://firestore.googleapis.com/v1";
const STORAGE_UPLOAD_BASE: &str = "https://storage.googleapis.com/upload/storage/v1";
const STORAGE_PUBLIC_BASE: &str = "https://storage.googleapis.com";
const SCOPES: &[&str] = &["https://www.googleapis.com/auth/cloud-platform"];
const COLLECTION: &str = "models";
const LIST_PAGE_SIZE: &str = "300";

/// Remote [`RecordStore`] backed by Firestore documents and a GCS bucket.
pub struct FirestoreStore {
    client: reqwest::Client,
    auth: Arc<dyn TokenProvider>,
    project_id: String,
    bucket: String,
    request_timeout: Duration,
    upload_timeout: Duration,
}

impl fmt::Debug for FirestoreStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FirestoreStore")
            .field("project_id", &self.project_id)
            .field("bucket", &self.bucket)
            .finish_non_exhaustive()
    }
}

impl FirestoreStore {
    /// Build credentials, resolve the project and probe for a token.
    ///
    /// Any failure here means the remote backend is unusable; the caller
    /// decides what to do about it. Document calls are bounded by
    /// `request_timeout`, object uploads by `upload_timeout`.
    pub async fn connect(
        config: &RemoteConfig,
        request_timeout: Duration,
        upload_timeout: Duration,
    ) -> Result<Self, StoreError> {
        let auth: Arc<dyn TokenProvider> = match &config.credentials {
            CredentialSource::Inline(json) => Arc::new(CustomServiceAccount::from_json(json)?),
            CredentialSource::File(path) => Arc::new(CustomServiceAccount::from_file(path)?),
            CredentialSource::Ambient => gcp_auth::provider().await?,
        };

        let project_id = match &config.project_id {
            Some(id) => id.clone(),
            None => auth.project_id().await?.to_string(),
        };

        auth.token(SCOPES).await?;

        let client = reqwest::Client::builder()
            .user_agent(concat!("arview-registry/", env!("CARGO_PKG_VERSION")))
            .connect_timeout(request_timeout)
            .build()?;

        info!(project_id = %project_id, bucket = %config.bucket, "remote backend credentials verified");
        Ok(Self {
            client,
            auth,
            project_id,
            bucket: config.bucket.clone(),
            request_timeout,
            upload_timeout,
        })
    }

    /// Fetch one document; `Ok(None)` when it does not exist.
    pub async fn get(&self, id: &str) -> Result<Option<ModelRecord>, StoreError> {
        if id.is_empty() {
            return Ok(None);
        }
        let token = self.token().await?;
        let resp = self
            .client
            .get(self.document_url(id)?)
            .bearer_auth(token.as_str())
            .timeout(self.request_timeout)
            .send()
            .await?;
        if resp.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let document: Document = check(resp).await?.json().await?;
        Ok(Some(decode_document(&document)))
    }

    /// Full replace of the document for `record.id`.
    ///
    /// `createdAt` is never sent as a value: the commit asks the server to
    /// stamp it with the request time, and that time is returned.
    pub async fn set(&self, record: &ModelRecord) -> Result<Option<DateTime<Utc>>, StoreError> {
        let token = self.token().await?;
        let body = json!({
            "writes": [{
                "update": {
                    "name": self.document_name(&record.id),
                    "fields": encode_fields(record),
                },
                "updateTransforms": [{
                    "fieldPath": "createdAt",
                    "setToServerValue": "REQUEST_TIME",
                }],
            }],
        });
        let resp = self
            .client
            .post(format!("{}:commit", self.documents_root()))
            .bearer_auth(token.as_str())
            .timeout(self.request_timeout)
            .json(&body)
            .send()
            .await?;
        let commit: CommitResponse = check(resp).await?.json().await?;
        Ok(commit.server_timestamp())
    }

    /// Merge-write of `fields` (already in Firestore value encoding) into an
    /// existing document. Fails if the document does not exist.
    pub async fn update(&self, id: &str, fields: Map<String, Value>) -> Result<(), StoreError> {
        let token = self.token().await?;
        let mut url = self.document_url(id)?;
        {
            let mut query = url.query_pairs_mut();
            for key in fields.keys() {
                query.append_pair("updateMask.fieldPaths", key);
            }
            query.append_pair("currentDocument.exists", "true");
        }
        let resp = self
            .client
            .patch(url)
            .bearer_auth(token.as_str())
            .timeout(self.request_timeout)
            .json(&json!({ "fields": fields }))
            .send()
            .await?;
        check(resp).await?;
        Ok(())
    }

    /// Every document in the collection, following pagination.
    pub async fn list_all(&self) -> Result<Vec<ModelRecord>, StoreError> {
        let token = self.token().await?;
        let mut records = Vec::new();
        let mut page_token: Option<String> = None;
        loop {
            let mut url = self.collection_url()?;
            {
                let mut query = url.query_pairs_mut();
                query.append_pair("pageSize", LIST_PAGE_SIZE);
                if let Some(t) = &page_token {
                    query.append_pair("pageToken", t);
                }
            }
            let resp = self
                .client
                .get(url)
                .bearer_auth(token.as_str())
                .timeout(self.request_timeout)
                .send()
                .await?;
            let page: ListDocumentsResponse = check(resp).await?.json().await?;
            records.extend(page.documents.iter().map(decode_document));
            match page.next_page_token.filter(|t| !t.is_empty()) {
                Some(next) => page_token = Some(next),
                None => break,
            }
        }
        debug!(count = records.len(), "listed remote models");
        Ok(records)
    }

    /// Upload `file` to the bucket as `object_name` with a public-read ACL.
    ///
    /// Bounded by the upload timeout rather than the document one.
    pub async fn upload_object(
        &self,
        object_name: &str,
        file: &UploadedFile,
    ) -> Result<String, StoreError> {
        let token = self.token().await?;
        let mut url = parse_url(&format!("{STORAGE_UPLOAD_BASE}/b/{}/o", self.bucket))?;
        url.query_pairs_mut()
            .append_pair("uploadType", "media")
            .append_pair("name", object_name)
            .append_pair("predefinedAcl", "publicRead");
        let content_type = file
            .content_type
            .clone()
            .unwrap_or_else(|| "application/octet-stream".to_owned());
        let resp = self
            .client
            .post(url)
            .bearer_auth(token.as_str())
            .header(reqwest::header::CONTENT_TYPE, content_type)
            .timeout(self.upload_timeout)
            .body(file.bytes.clone())
            .send()
            .await?;
        check(resp).await?;
        let public_url = public_object_url(&self.bucket, object_name);
        info!(object = %object_name, size_bytes = file.bytes.len(), "uploaded model object");
        Ok(public_url)
    }

    async fn token(&self) -> Result<Arc<gcp_auth::Token>, StoreError> {
        Ok(self.auth.token(SCOPES).await?)
    }

    fn documents_root(&self) -> String {
        format!(
            "{FIRESTORE_BASE}/projects/{}/databases/(default)/documents",
            self.project_id
        )
    }

    fn document_name(&self, id: &str) -> String {
        format!(
            "projects/{}/databases/(default)/documents/{COLLECTION}/{id}",
            self.project_id
        )
    }

    fn collection_url(&self) -> Result<Url, StoreError> {
        let mut url = parse_url(&self.documents_root())?;
        push_segments(&mut url, &[COLLECTION])?;
        Ok(url)
    }

    fn document_url(&self, id: &str) -> Result<Url, StoreError> {
        let mut url = parse_url(&self.documents_root())?;
        push_segments(&mut url, &[COLLECTION, id])?;
        Ok(url)
    }
}

#[async_trait]
impl RecordStore for FirestoreStore {
    fn kind(&self) -> BackendKind {
        BackendKind::Remote
    }

    fn supports_binary_upload(&self) -> bool {
        true
    }

    async fn find(&self, id: &str) -> Result<Option<ModelRecord>, StoreError> {
        self.get(id).await
    }

    async fn list(&self) -> Result<Vec<ModelRecord>, StoreError> {
        self.list_all().await
    }

    async fn create(&self, mut record: ModelRecord) -> Result<ModelRecord, StoreError> {
        record.created_at = self.set(&record).await?;
        Ok(record)
    }

    async fn save_active(&self, record: &ModelRecord) -> Result<(), StoreError> {
        let mut fields = Map::new();
        fields.insert("active".into(), json!({ "booleanValue": record.active }));
        self.update(&record.id, fields).await
    }

    async fn store_object(
        &self,
        object_name: &str,
        file: &UploadedFile,
    ) -> Result<String, StoreError> {
        self.upload_object(object_name, file).await
    }
}

// ── wire types ────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct Document {
    name: String,
    #[serde(default)]
    fields: Map<String, Value>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListDocumentsResponse {
    #[serde(default)]
    documents: Vec<Document>,
    #[serde(default)]
    next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CommitResponse {
    #[serde(default)]
    write_results: Vec<WriteResult>,
    commit_time: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WriteResult {
    #[serde(default)]
    transform_results: Vec<Value>,
}

impl CommitResponse {
    /// The value the server stamped into `createdAt`, falling back to the
    /// commit time (both are the request time).
    fn server_timestamp(&self) -> Option<DateTime<Utc>> {
        self.write_results
            .first()
            .and_then(|w| w.transform_results.first())
            .and_then(|v| v.get("timestampValue"))
            .and_then(Value::as_str)
            .or(self.commit_time.as_deref())
            .and_then(iso8601::parse)
    }
}

// ── encoding ──────────────────────────────────────────────────────────────────

fn encode_fields(record: &ModelRecord) -> Map<String, Value> {
    let mut fields = Map::new();
    fields.insert("id".into(), json!({ "stringValue": record.id }));
    fields.insert("modelUrl".into(), json!({ "stringValue": record.model_url }));
    fields.insert("active".into(), json!({ "booleanValue": record.active }));
    fields.insert("fileName".into(), json!({ "stringValue": record.file_name }));
    fields
}

/// Convert a Firestore document into a record, tolerating older layouts:
/// a missing `id` falls back to the document name, `url` stands in for
/// `modelUrl`, and a missing `active` means active.
fn decode_document(document: &Document) -> ModelRecord {
    let fields = &document.fields;
    let id = string_field(fields, "id")
        .map(str::to_owned)
        .unwrap_or_else(|| document_id(&document.name).to_owned());
    let model_url = string_field(fields, "modelUrl")
        .or_else(|| string_field(fields, "url"))
        .unwrap_or_default()
        .to_owned();
    ModelRecord {
        id,
        model_url,
        active: bool_field(fields, "active").unwrap_or(true),
        file_name: string_field(fields, "fileName").unwrap_or_default().to_owned(),
        created_at: timestamp_field(fields, "createdAt"),
    }
}

fn document_id(name: &str) -> &str {
    name.rsplit('/').next().unwrap_or(name)
}

fn string_field<'a>(fields: &'a Map<String, Value>, key: &str) -> Option<&'a str> {
    fields.get(key)?.get("stringValue")?.as_str()
}

fn bool_field(fields: &Map<String, Value>, key: &str) -> Option<bool> {
    fields.get(key)?.get("booleanValue")?.as_bool()
}

fn timestamp_field(fields: &Map<String, Value>, key: &str) -> Option<DateTime<Utc>> {
    fields
        .get(key)?
        .get("timestampValue")?
        .as_str()
        .and_then(iso8601::parse)
}

fn public_object_url(bucket: &str, object_name: &str) -> String {
    format!("{STORAGE_PUBLIC_BASE}/{bucket}/{object_name}")
}

// ── HTTP helpers ──────────────────────────────────────────────────────────────

fn parse_url(raw: &str) -> Result<Url, StoreError> {
    Url::parse(raw).map_err(|e| StoreError::Remote {
        status: 0,
        message: format!("invalid request URL {raw}: {e}"),
    })
}

fn push_segments(url: &mut Url, segments: &[&str]) -> Result<(), StoreError> {
    url.path_segments_mut()
        .map_err(|_| StoreError::Remote {
            status: 0,
            message: "request URL cannot carry path segments".into(),
        })?
        .extend(segments);
    Ok(())
}

async fn check(resp: reqwest::Response) -> Result<reqwest::Response, StoreError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let message = resp.text().await.unwrap_or_default();
    Err(StoreError::Remote {
        status: status.as_u16(),
        message,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn document(value: Value) -> Document {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn decodes_full_document() {
        let doc = document(json!({
            "name": "projects/p/databases/(default)/documents/models/abc",
            "fields": {
                "id": { "stringValue": "abc" },
                "modelUrl": { "stringValue": "https://cdn/x.glb" },
                "active": { "booleanValue": false },
                "fileName": { "stringValue": "models/abc.glb" },
                "createdAt": { "timestampValue": "2024-03-04T05:06:07.123456Z" }
            }
        }));
        let record = decode_document(&doc);
        assert_eq!(record.id, "abc");
        assert_eq!(record.model_url, "https://cdn/x.glb");
        assert!(!record.active);
        assert_eq!(record.file_name, "models/abc.glb");
        assert_eq!(
            record.created_at.map(|t| iso8601::format(&t)).as_deref(),
            Some("2024-03-04T05:06:07.123Z")
        );
    }

    #[test]
    fn decodes_legacy_document_permissively() {
        let doc = document(json!({
            "name": "projects/p/databases/(default)/documents/models/legacy-1",
            "fields": {
                "url": { "stringValue": "https://cdn/old.obj" },
                "createdAt": { "nullValue": null }
            }
        }));
        let record = decode_document(&doc);
        assert_eq!(record.id, "legacy-1");
        assert_eq!(record.model_url, "https://cdn/old.obj");
        assert!(record.active, "missing active must read as true");
        assert_eq!(record.created_at, None);
    }

    #[test]
    fn encodes_fields_without_created_at() {
        let record = ModelRecord::new("https://cdn/a.glb", "https://cdn/a.glb");
        let fields = encode_fields(&record);
        assert_eq!(fields["active"], json!({ "booleanValue": true }));
        assert_eq!(fields["modelUrl"], json!({ "stringValue": "https://cdn/a.glb" }));
        assert!(!fields.contains_key("createdAt"));
    }

    #[test]
    fn commit_timestamp_prefers_transform_result() {
        let commit: CommitResponse = serde_json::from_value(json!({
            "writeResults": [{
                "updateTime": "2024-01-01T00:00:01Z",
                "transformResults": [{ "timestampValue": "2024-01-01T00:00:00.500Z" }]
            }],
            "commitTime": "2024-01-01T00:00:01Z"
        }))
        .unwrap();
        assert_eq!(
            commit.server_timestamp().map(|t| iso8601::format(&t)).as_deref(),
            Some("2024-01-01T00:00:00.500Z")
        );

        let bare: CommitResponse =
            serde_json::from_value(json!({ "commitTime": "2024-01-01T00:00:01Z" })).unwrap();
        assert!(bare.server_timestamp().is_some());
    }

    #[test]
    fn list_response_without_documents_is_empty() {
        let page: ListDocumentsResponse = serde_json::from_value(json!({})).unwrap();
        assert!(page.documents.is_empty());
        assert!(page.next_page_token.is_none());
    }

    #[test]
    fn document_url_escapes_id() {
        let mut url = parse_url("https://firestore.googleapis.com/v1/projects/p/databases/(default)/documents").unwrap();
        push_segments(&mut url, &[COLLECTION, "a/b"]).unwrap();
        assert!(url.as_str().ends_with("/documents/models/a%2Fb"));
    }

    #[test]
    fn public_url_points_at_bucket_object() {
        assert_eq!(
            public_object_url("my-bucket", "models/x.glb"),
            "https://storage.googleapis.com/my-bucket/models/x.glb"
        );
    }
}
