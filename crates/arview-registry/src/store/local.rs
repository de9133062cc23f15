//! JSON-file registry used when the remote backend is unavailable.
//!
//! The whole registry lives in one document shaped `{ "models": [...] }`.
//! Every mutation reads the document, changes it in memory and replaces the
//! file. A missing file is an empty registry.
//!
//! Entries stay raw JSON between reads and writes. A mutation only touches
//! the fields of the entry it changes, so other entries, unknown fields and
//! timestamps this crate cannot parse are written back as they were read.
//! An entry that does not decode as a record is skipped on read with a
//! warning; a file that is not JSON at all is an error.
//!
//! Concurrent writers are not coordinated: two overlapping mutations both
//! read the same snapshot and the later write wins, dropping the earlier
//! change. This is a known limitation of the local backend.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, warn};

use super::{BackendKind, RecordStore};
use crate::error::StoreError;
use crate::record::ModelRecord;

/// On-disk layout of the local registry.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistryDocument {
    #[serde(default)]
    pub models: Vec<Value>,
    /// Top-level keys other than `models`, kept as found.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl RegistryDocument {
    pub fn from_records(records: &[ModelRecord]) -> Result<Self, StoreError> {
        let models = records
            .iter()
            .map(serde_json::to_value)
            .collect::<Result<_, _>>()?;
        Ok(Self {
            models,
            extra: Map::new(),
        })
    }

    /// Every entry that decodes as a [`ModelRecord`], in file order.
    pub fn records(&self) -> Vec<ModelRecord> {
        self.models
            .iter()
            .enumerate()
            .filter_map(|(index, entry)| decode_entry(index, entry))
            .collect()
    }

    /// Replace the entry whose `id` matches `record.id`, or append one.
    ///
    /// A matching entry keeps its raw content; only the fields whose decoded
    /// value differs from `record` are rewritten.
    pub fn upsert(&mut self, record: &ModelRecord) -> Result<(), StoreError> {
        let value = serde_json::to_value(record)?;

        let position = self
            .models
            .iter()
            .position(|entry| entry_id(entry) == Some(record.id.as_str()));
        let Some(index) = position else {
            self.models.push(value);
            return Ok(());
        };
        let entry = &mut self.models[index];

        let before = decode_entry(index, entry)
            .map(serde_json::to_value)
            .transpose()?;
        match (entry, before, value) {
            (Value::Object(raw), Some(Value::Object(before)), Value::Object(fields)) => {
                for (key, value) in fields {
                    if before.get(&key) == Some(&value) {
                        continue;
                    }
                    // The alias and the field cannot both be present.
                    if key == "modelUrl" {
                        raw.remove("url");
                    }
                    raw.insert(key, value);
                }
            }
            (entry, _, value) => *entry = value,
        }
        Ok(())
    }
}

fn entry_id(entry: &Value) -> Option<&str> {
    entry.get("id").and_then(Value::as_str)
}

fn decode_entry(index: usize, entry: &Value) -> Option<ModelRecord> {
    match ModelRecord::deserialize(entry) {
        Ok(record) => Some(record),
        Err(e) => {
            warn!(index, id = ?entry_id(entry), error = %e, "skipping malformed local registry entry");
            None
        }
    }
}

/// File-backed [`RecordStore`].
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the whole registry; a missing file yields an empty document.
    pub async fn read_all(&self) -> Result<RegistryDocument, StoreError> {
        match tokio::fs::read(&self.path).await {
            Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(RegistryDocument::default()),
            Err(e) => Err(e.into()),
        }
    }

    /// Replace the whole registry document.
    ///
    /// The new content is written to a sibling temp file and renamed over the
    /// target, so readers never observe a half-written document.
    pub async fn write_all(&self, document: &RegistryDocument) -> Result<(), StoreError> {
        let body = serde_json::to_vec_pretty(document)?;

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }

        let file_name = self
            .path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("models-registry.json");
        let tmp = self
            .path
            .with_file_name(format!(".{file_name}.{}.tmp", uuid::Uuid::new_v4().simple()));

        tokio::fs::write(&tmp, &body).await?;
        if let Err(e) = tokio::fs::rename(&tmp, &self.path).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(e.into());
        }
        debug!(path = %self.path.display(), models = document.models.len(), "local registry written");
        Ok(())
    }

    /// Linear scan for `id`.
    pub async fn find_by_id(&self, id: &str) -> Result<Option<ModelRecord>, StoreError> {
        let document = self.read_all().await?;
        Ok(document.records().into_iter().find(|m| m.id == id))
    }

    /// Replace the record with the same id, or append it.
    pub async fn upsert(&self, record: ModelRecord) -> Result<(), StoreError> {
        let mut document = self.read_all().await?;
        document.upsert(&record)?;
        self.write_all(&document).await
    }
}

#[async_trait]
impl RecordStore for JsonFileStore {
    fn kind(&self) -> BackendKind {
        BackendKind::Local
    }

    async fn find(&self, id: &str) -> Result<Option<ModelRecord>, StoreError> {
        self.find_by_id(id).await
    }

    async fn list(&self) -> Result<Vec<ModelRecord>, StoreError> {
        Ok(self.read_all().await?.records())
    }

    async fn create(&self, record: ModelRecord) -> Result<ModelRecord, StoreError> {
        self.upsert(record.clone()).await?;
        Ok(record)
    }

    async fn save_active(&self, record: &ModelRecord) -> Result<(), StoreError> {
        self.upsert(record.clone()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;
    use tracing_test::traced_test;

    fn store_in(dir: &TempDir) -> JsonFileStore {
        JsonFileStore::new(dir.path().join("models-registry.json"))
    }

    fn record(id: &str, url: &str) -> ModelRecord {
        ModelRecord {
            id: id.into(),
            model_url: url.into(),
            active: true,
            file_name: url.into(),
            created_at: Some("2024-01-02T03:04:05.678Z".parse().unwrap()),
        }
    }

    #[tokio::test]
    async fn missing_file_is_empty_registry() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);
        assert_eq!(store.read_all().await.unwrap(), RegistryDocument::default());
        assert_eq!(store.find_by_id("nope").await.unwrap(), None);
        assert!(!store.path().exists());
    }

    #[tokio::test]
    async fn upsert_appends_then_replaces() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);

        store.upsert(record("a", "https://x/a.glb")).await.unwrap();
        store.upsert(record("b", "https://x/b.glb")).await.unwrap();

        let mut changed = record("a", "https://x/a.glb");
        changed.active = false;
        store.upsert(changed.clone()).await.unwrap();

        let records = store.read_all().await.unwrap().records();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0], changed);
        assert_eq!(records[1].id, "b");
    }

    #[tokio::test]
    async fn write_all_replaces_document_and_leaves_no_temp_files() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);
        store.upsert(record("a", "https://x/a.glb")).await.unwrap();

        store
            .write_all(&RegistryDocument::from_records(&[record("z", "https://x/z.glb")]).unwrap())
            .await
            .unwrap();

        let records = store.list().await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].id, "z");

        let entries: Vec<_> = std::fs::read_dir(dir.path()).unwrap().collect();
        assert_eq!(entries.len(), 1, "only the registry file should remain");
    }

    #[tokio::test]
    async fn file_layout_uses_models_key() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);
        store.upsert(record("a", "https://x/a.glb")).await.unwrap();

        let raw: serde_json::Value =
            serde_json::from_slice(&std::fs::read(store.path()).unwrap()).unwrap();
        assert_eq!(raw["models"][0]["modelUrl"], "https://x/a.glb");
        assert_eq!(raw["models"][0]["createdAt"], "2024-01-02T03:04:05.678Z");
    }

    #[tokio::test]
    async fn malformed_file_is_an_error() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);
        std::fs::write(store.path(), b"{ not json").unwrap();
        assert!(matches!(store.read_all().await, Err(StoreError::Json(_))));
    }

    #[tokio::test]
    async fn creates_missing_parent_directory() {
        let dir = TempDir::new().unwrap();
        let store = JsonFileStore::new(dir.path().join("nested/registry.json"));
        store.create(record("a", "https://x/a.glb")).await.unwrap();
        assert_eq!(store.list().await.unwrap().len(), 1);
    }

    fn write_raw(store: &JsonFileStore, doc: serde_json::Value) {
        std::fs::write(store.path(), serde_json::to_vec(&doc).unwrap()).unwrap();
    }

    fn read_raw(store: &JsonFileStore) -> serde_json::Value {
        serde_json::from_slice(&std::fs::read(store.path()).unwrap()).unwrap()
    }

    #[tokio::test]
    async fn toggle_leaves_other_entries_and_unknown_fields_alone() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);
        let b = json!({
            "id": "b",
            "modelUrl": "https://x/b.glb",
            "active": true,
            "createdAt": "Tue Jan 02 2024"
        });
        write_raw(
            &store,
            json!({
                "models": [
                    {
                        "id": "a",
                        "modelUrl": "https://x/a.glb",
                        "active": true,
                        "createdAt": "2024-01-02T03:04:05Z",
                        "sizeBytes": 1234
                    },
                    b.clone()
                ],
                "version": 2
            }),
        );

        let mut a = store.find_by_id("a").await.unwrap().unwrap();
        a.active = false;
        store.save_active(&a).await.unwrap();

        let raw = read_raw(&store);
        assert_eq!(raw["models"][0]["active"], false);
        assert_eq!(raw["models"][0]["sizeBytes"], 1234);
        assert_eq!(raw["models"][0]["createdAt"], "2024-01-02T03:04:05Z");
        assert_eq!(raw["models"][1], b);
        assert_eq!(raw["version"], 2);
    }

    #[tokio::test]
    #[traced_test]
    async fn malformed_entries_are_skipped_not_fatal() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);
        write_raw(
            &store,
            json!({
                "models": [
                    { "id": "n", "modelUrl": "https://x/n.glb", "createdAt": 1704164645678i64 },
                    { "modelUrl": "https://x/no-id.glb" },
                    { "id": "legacy", "url": "https://x/legacy.obj" }
                ]
            }),
        );

        let listed = store.list().await.unwrap();
        let ids: Vec<_> = listed.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, ["n", "legacy"]);
        assert!(listed[0].created_at.is_some());
        assert!(logs_contain("skipping malformed local registry entry"));

        store.upsert(record("c", "https://x/c.glb")).await.unwrap();
        let raw = read_raw(&store);
        assert_eq!(raw["models"].as_array().unwrap().len(), 4);
        assert_eq!(raw["models"][1], json!({ "modelUrl": "https://x/no-id.glb" }));
    }

    #[tokio::test]
    async fn toggling_legacy_entry_keeps_url_key() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);
        write_raw(
            &store,
            json!({ "models": [{ "id": "legacy", "url": "https://x/legacy.obj" }] }),
        );

        let mut legacy = store.find_by_id("legacy").await.unwrap().unwrap();
        legacy.active = false;
        store.save_active(&legacy).await.unwrap();

        let raw = read_raw(&store);
        assert_eq!(
            raw["models"][0],
            json!({ "id": "legacy", "url": "https://x/legacy.obj", "active": false })
        );
        assert!(!store.find_by_id("legacy").await.unwrap().unwrap().active);
    }
}
