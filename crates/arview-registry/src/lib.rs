//! arview-registry – model registry core.
//!
//! Maps opaque model ids to model URLs with a per-record `active` flag.
//! Records are kept in a remote Firestore collection when one is configured
//! and reachable, or in a local JSON document otherwise; [`Registry`] hides
//! which backend answered and falls back to the local store whenever the
//! remote one fails.
//!
//! ```rust,no_run
//! # async fn demo() -> Result<(), arview_registry::RegistryError> {
//! use arview_registry::{Registry, RegistryConfig, ModelSource, UploadPolicy, access};
//!
//! let registry = Registry::initialize(&RegistryConfig::local("models-registry.json")).await;
//! let record = access::create_record(
//!     &registry,
//!     ModelSource::Url("https://example.com/chair.glb".into()),
//!     UploadPolicy::default(),
//! )
//! .await?;
//! let url = access::get_record(&registry, &record.id).await?;
//! # let _ = url;
//! # Ok(())
//! # }
//! ```

pub mod access;
pub mod config;
pub mod error;
pub mod qr;
pub mod record;
pub mod registry;
pub mod store;

pub use access::UploadPolicy;
pub use config::{CredentialSource, RegistryConfig, RemoteConfig};
pub use error::{RegistryError, StoreError};
pub use qr::{QrImage, render_qr, viewer_url};
pub use record::{ModelRecord, ModelSource, ModelSummary, UploadedFile};
pub use registry::{BackendMode, Registry};
pub use store::local::JsonFileStore;
pub use store::remote::FirestoreStore;
pub use store::{BackendKind, RecordStore};
