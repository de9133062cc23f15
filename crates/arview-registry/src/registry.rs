//! The registry facade: the only component callers talk to.
//!
//! A [`Registry`] is built once at startup. It always owns the local JSON
//! store and, when the remote backend could be reached, a remote store.
//! Every remote call runs inside a failure boundary that sorts the outcome
//! into hit, miss or fault:
//!
//! - hit: answered by the remote store;
//! - miss (`None` / empty list): the local store is consulted as well while
//!   `fallback_on_miss` is on, so remote never shadows local inventory;
//! - fault (error or timeout): logged, then the same operation is retried
//!   once against the local store.
//!
//! The caller only sees an operational error when both backends fail.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, error, info, warn};

use crate::config::RegistryConfig;
use crate::error::{RegistryError, StoreError};
use crate::record::{ModelRecord, ModelSummary, UploadedFile};
use crate::store::local::JsonFileStore;
use crate::store::remote::FirestoreStore;
use crate::store::{BackendKind, RecordStore};

/// Which backend the registry settled on at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "lowercase")]
pub enum BackendMode {
    Remote,
    Local,
}

/// Outcome of one remote call after classification.
enum Lookup<T> {
    Hit(T),
    Miss,
    Fault(StoreError),
}

/// Backend-agnostic CRUD over model records with remote→local fallback.
pub struct Registry {
    local: Arc<dyn RecordStore>,
    remote: Option<Arc<dyn RecordStore>>,
    fallback_on_miss: bool,
    remote_timeout: Duration,
    upload_timeout: Duration,
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry")
            .field("mode", &self.mode())
            .field("fallback_on_miss", &self.fallback_on_miss)
            .field("remote_timeout", &self.remote_timeout)
            .field("upload_timeout", &self.upload_timeout)
            .finish()
    }
}

impl Registry {
    /// Decide the backend mode and build the registry.
    ///
    /// Never fails: any problem with the remote configuration (malformed or
    /// missing credentials, auth or network errors, timeouts) is logged once
    /// and the registry runs in [`BackendMode::Local`].
    pub async fn initialize(config: &RegistryConfig) -> Self {
        let local: Arc<dyn RecordStore> = Arc::new(JsonFileStore::new(&config.registry_file));

        let remote: Option<Arc<dyn RecordStore>> = match &config.remote {
            None => {
                info!(
                    registry_file = %config.registry_file.display(),
                    "no storage bucket configured; using local JSON registry"
                );
                None
            }
            Some(remote_cfg) => {
                let connect = FirestoreStore::connect(remote_cfg, config.remote_timeout, config.upload_timeout);
                match tokio::time::timeout(config.remote_timeout, connect).await {
                    Ok(Ok(store)) => {
                        info!(bucket = %remote_cfg.bucket, "remote backend initialised");
                        Some(Arc::new(store))
                    }
                    Ok(Err(e)) => {
                        warn!(
                            error = %e,
                            registry_file = %config.registry_file.display(),
                            "remote backend initialisation failed; falling back to local JSON registry \
                             (file uploads are unavailable)"
                        );
                        None
                    }
                    Err(_) => {
                        warn!(
                            timeout = ?config.remote_timeout,
                            registry_file = %config.registry_file.display(),
                            "remote backend initialisation timed out; falling back to local JSON registry \
                             (file uploads are unavailable)"
                        );
                        None
                    }
                }
            }
        };

        Self::with_stores(local, remote)
            .with_fallback_on_miss(config.fallback_on_miss)
            .with_remote_timeout(config.remote_timeout)
            .with_upload_timeout(config.upload_timeout)
    }

    /// Assemble a registry from explicit stores.
    pub fn with_stores(local: Arc<dyn RecordStore>, remote: Option<Arc<dyn RecordStore>>) -> Self {
        Self {
            local,
            remote,
            fallback_on_miss: true,
            remote_timeout: RegistryConfig::DEFAULT_REMOTE_TIMEOUT,
            upload_timeout: RegistryConfig::DEFAULT_UPLOAD_TIMEOUT,
        }
    }

    pub fn with_fallback_on_miss(mut self, enabled: bool) -> Self {
        self.fallback_on_miss = enabled;
        self
    }

    pub fn with_remote_timeout(mut self, timeout: Duration) -> Self {
        self.remote_timeout = timeout;
        self
    }

    pub fn with_upload_timeout(mut self, timeout: Duration) -> Self {
        self.upload_timeout = timeout;
        self
    }

    pub fn mode(&self) -> BackendMode {
        if self.remote.is_some() {
            BackendMode::Remote
        } else {
            BackendMode::Local
        }
    }

    /// Binary payloads can only be stored while the remote backend is active.
    pub fn supports_binary_upload(&self) -> bool {
        self.remote
            .as_ref()
            .is_some_and(|remote| remote.supports_binary_upload())
    }

    /// Upload a binary payload through the active backend's object storage.
    ///
    /// Bounded by the upload timeout, not the per-call remote timeout.
    pub async fn store_object(
        &self,
        object_name: &str,
        file: &UploadedFile,
    ) -> Result<String, RegistryError> {
        let remote = match &self.remote {
            Some(remote) if remote.supports_binary_upload() => remote,
            _ => return Err(RegistryError::BackendRequired),
        };
        Ok(bounded(self.upload_timeout, remote.store_object(object_name, file)).await?)
    }

    /// Persist a new record for `model_url` and return it as stored.
    ///
    /// The id and creation time are assigned here. A remote write fault is
    /// recovered by writing the record to the local registry instead.
    pub async fn create(
        &self,
        model_url: impl Into<String>,
        file_name: impl Into<String>,
    ) -> Result<ModelRecord, RegistryError> {
        let record = ModelRecord::new(model_url, file_name);

        if let Some(remote) = &self.remote {
            match self.guard(remote.create(record.clone())).await {
                Ok(stored) => {
                    info!(id = %stored.id, "model registered");
                    return Ok(stored);
                }
                Err(e) => {
                    // A timed-out commit may still land remotely, leaving the
                    // record in both backends under the same id.
                    warn!(id = %record.id, error = %e, "remote create failed; writing to local registry");
                }
            }
        }

        let stored = self.local.create(record).await?;
        info!(id = %stored.id, "model registered");
        Ok(stored)
    }

    /// Fetch a record by id, consulting local after a remote miss or fault.
    pub async fn get(&self, id: &str) -> Result<ModelRecord, RegistryError> {
        self.locate(id).await.map(|(record, _)| record)
    }

    /// All records as summaries.
    pub async fn list(&self) -> Result<Vec<ModelSummary>, RegistryError> {
        let mut remote_fault = None;

        if let Some(remote) = &self.remote {
            match self.classify_list(remote.list()).await {
                Lookup::Hit(records) => return Ok(summaries(records)),
                Lookup::Miss if !self.fallback_on_miss => return Ok(Vec::new()),
                Lookup::Miss => debug!("remote registry is empty; consulting local registry"),
                Lookup::Fault(e) => {
                    warn!(error = %e, "remote list failed; falling back to local registry");
                    remote_fault = Some(e);
                }
            }
        }

        match self.local.list().await {
            Ok(records) => Ok(summaries(records)),
            // Remote answered cleanly with nothing; an unreadable local file
            // does not turn that into a failure.
            Err(e) if self.remote.is_some() && remote_fault.is_none() => {
                warn!(error = %e, "local registry unreadable; returning empty list");
                Ok(Vec::new())
            }
            Err(e) => {
                if let Some(remote_err) = remote_fault {
                    error!(remote_error = %remote_err, local_error = %e, "both backends failed to list models");
                }
                Err(e.into())
            }
        }
    }

    /// Set the `active` flag of a record and return the updated record.
    ///
    /// The flag is written back to the backend the record was found in. If
    /// that is the remote store and the write fails, the updated record is
    /// written to the local registry so the change is not lost.
    pub async fn set_active(&self, id: &str, active: bool) -> Result<ModelRecord, RegistryError> {
        let (mut record, source) = self.locate(id).await?;
        record.active = active;

        match (source, &self.remote) {
            (BackendKind::Remote, Some(remote)) => {
                if let Err(e) = self.guard(remote.save_active(&record)).await {
                    warn!(id = %id, error = %e, "remote update failed; writing to local registry");
                    self.local.save_active(&record).await?;
                }
            }
            _ => self.local.save_active(&record).await?,
        }

        info!(id = %id, active, "model active flag updated");
        Ok(record)
    }

    /// Dual lookup shared by `get` and `set_active`; reports which backend
    /// answered.
    async fn locate(&self, id: &str) -> Result<(ModelRecord, BackendKind), RegistryError> {
        let mut remote_fault = None;

        if let Some(remote) = &self.remote {
            match self.classify_record(remote.find(id)).await {
                Lookup::Hit(record) => return Ok((record, BackendKind::Remote)),
                Lookup::Miss if !self.fallback_on_miss => {
                    return Err(RegistryError::NotFound(id.to_owned()));
                }
                Lookup::Miss => debug!(id = %id, "not in remote registry; consulting local registry"),
                Lookup::Fault(e) => {
                    warn!(id = %id, error = %e, "remote read failed; falling back to local registry");
                    remote_fault = Some(e);
                }
            }
        }

        match self.local.find(id).await {
            Ok(Some(record)) => Ok((record, BackendKind::Local)),
            Ok(None) => Err(RegistryError::NotFound(id.to_owned())),
            Err(e) => {
                if let Some(remote_err) = remote_fault {
                    error!(id = %id, remote_error = %remote_err, local_error = %e, "both backends failed to read model");
                }
                Err(e.into())
            }
        }
    }

    /// Bound a remote call by the configured timeout.
    async fn guard<T, F>(&self, call: F) -> Result<T, StoreError>
    where
        F: Future<Output = Result<T, StoreError>>,
    {
        bounded(self.remote_timeout, call).await
    }

    async fn classify_record<F>(&self, call: F) -> Lookup<ModelRecord>
    where
        F: Future<Output = Result<Option<ModelRecord>, StoreError>>,
    {
        match self.guard(call).await {
            Ok(Some(record)) => Lookup::Hit(record),
            Ok(None) => Lookup::Miss,
            Err(e) => Lookup::Fault(e),
        }
    }

    async fn classify_list<F>(&self, call: F) -> Lookup<Vec<ModelRecord>>
    where
        F: Future<Output = Result<Vec<ModelRecord>, StoreError>>,
    {
        match self.guard(call).await {
            Ok(records) if records.is_empty() => Lookup::Miss,
            Ok(records) => Lookup::Hit(records),
            Err(e) => Lookup::Fault(e),
        }
    }
}

/// Expiry surfaces as [`StoreError::Timeout`].
async fn bounded<T, F>(limit: Duration, call: F) -> Result<T, StoreError>
where
    F: Future<Output = Result<T, StoreError>>,
{
    match tokio::time::timeout(limit, call).await {
        Ok(result) => result,
        Err(_) => Err(StoreError::Timeout(limit)),
    }
}

fn summaries(records: Vec<ModelRecord>) -> Vec<ModelSummary> {
    records.into_iter().map(ModelSummary::from).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use tempfile::TempDir;
    use tracing_test::traced_test;

    /// Remote stand-in whose every call fails.
    struct Unreachable;

    #[async_trait]
    impl RecordStore for Unreachable {
        fn kind(&self) -> BackendKind {
            BackendKind::Remote
        }

        async fn find(&self, _id: &str) -> Result<Option<ModelRecord>, StoreError> {
            Err(StoreError::Remote { status: 503, message: "down".into() })
        }

        async fn list(&self) -> Result<Vec<ModelRecord>, StoreError> {
            Err(StoreError::Remote { status: 503, message: "down".into() })
        }

        async fn create(&self, _record: ModelRecord) -> Result<ModelRecord, StoreError> {
            Err(StoreError::Remote { status: 503, message: "down".into() })
        }

        async fn save_active(&self, _record: &ModelRecord) -> Result<(), StoreError> {
            Err(StoreError::Remote { status: 503, message: "down".into() })
        }
    }

    #[tokio::test]
    async fn initialize_without_bucket_is_local() {
        let dir = TempDir::new().unwrap();
        let registry = Registry::initialize(&RegistryConfig::local(dir.path().join("r.json"))).await;
        assert_eq!(registry.mode(), BackendMode::Local);
        assert!(!registry.supports_binary_upload());
    }

    #[tokio::test]
    async fn initialize_with_malformed_inline_credentials_degrades_to_local() {
        let dir = TempDir::new().unwrap();
        let mut config = RegistryConfig::local(dir.path().join("r.json"));
        config.remote = crate::config::RemoteConfig::resolve(
            Some("{ definitely not a service account".into()),
            None,
            Some("bucket".into()),
            None,
        );
        let registry = Registry::initialize(&config).await;
        assert_eq!(registry.mode(), BackendMode::Local);
    }

    #[tokio::test]
    async fn initialize_with_missing_credential_file_degrades_to_local() {
        let dir = TempDir::new().unwrap();
        let mut config = RegistryConfig::local(dir.path().join("r.json"));
        config.remote = crate::config::RemoteConfig::resolve(
            None,
            Some(dir.path().join("missing.json").display().to_string()),
            Some("bucket".into()),
            None,
        );
        let registry = Registry::initialize(&config).await;
        assert_eq!(registry.mode(), BackendMode::Local);
    }

    #[tokio::test]
    async fn store_object_requires_remote() {
        let dir = TempDir::new().unwrap();
        let registry = Registry::initialize(&RegistryConfig::local(dir.path().join("r.json"))).await;
        let file = UploadedFile {
            original_name: "a.glb".into(),
            content_type: None,
            bytes: bytes::Bytes::from_static(b"glTF"),
        };
        assert!(matches!(
            registry.store_object("models/a.glb", &file).await,
            Err(RegistryError::BackendRequired)
        ));
    }

    #[tokio::test]
    #[traced_test]
    async fn remote_fault_is_logged_and_recovered_locally() {
        let dir = TempDir::new().unwrap();
        let local = Arc::new(JsonFileStore::new(dir.path().join("r.json")));
        let registry = Registry::with_stores(local, Some(Arc::new(Unreachable)));
        assert_eq!(registry.mode(), BackendMode::Remote);

        let record = registry.create("https://x/a.glb", "https://x/a.glb").await.unwrap();
        assert!(logs_contain("remote create failed; writing to local registry"));

        let fetched = registry.get(&record.id).await.unwrap();
        assert_eq!(fetched.model_url, "https://x/a.glb");
        assert!(logs_contain("remote read failed; falling back to local registry"));

        let listed = registry.list().await.unwrap();
        assert_eq!(listed.len(), 1);
        assert!(!registry.supports_binary_upload());
    }
}
