//! Record store abstraction.
//!
//! [`RecordStore`] is the one interface both backends implement:
//! [`local::JsonFileStore`] (a single JSON document on disk) and
//! [`remote::FirestoreStore`] (a Firestore collection plus a Cloud Storage
//! bucket). The registry facade only ever talks to `dyn RecordStore`, so a
//! test double can stand in for either side.

pub mod local;
pub mod remote;

use async_trait::async_trait;

use crate::error::StoreError;
use crate::record::{ModelRecord, UploadedFile};

/// Which kind of backend a store is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display)]
#[strum(serialize_all = "lowercase")]
pub enum BackendKind {
    Local,
    Remote,
}

/// Persistence contract shared by the local and remote backends.
///
/// `Ok(None)` from [`find`](RecordStore::find) and `Ok(vec![])` from
/// [`list`](RecordStore::list) are legitimate answers; `Err` is always an
/// operational fault.
#[async_trait]
pub trait RecordStore: Send + Sync + 'static {
    fn kind(&self) -> BackendKind;

    /// Whether [`store_object`](RecordStore::store_object) is available.
    fn supports_binary_upload(&self) -> bool {
        false
    }

    /// Look up a single record by id.
    async fn find(&self, id: &str) -> Result<Option<ModelRecord>, StoreError>;

    /// All records, in the backend's natural order.
    async fn list(&self) -> Result<Vec<ModelRecord>, StoreError>;

    /// Persist a new record and return it as stored. Backends that assign
    /// their own timestamp report it in `created_at`.
    async fn create(&self, record: ModelRecord) -> Result<ModelRecord, StoreError>;

    /// Write back the `active` flag of `record`.
    async fn save_active(&self, record: &ModelRecord) -> Result<(), StoreError>;

    /// Store a binary model payload under `object_name` and return its
    /// public URL.
    async fn store_object(
        &self,
        _object_name: &str,
        _file: &UploadedFile,
    ) -> Result<String, StoreError> {
        Err(StoreError::Unsupported(self.kind()))
    }
}
