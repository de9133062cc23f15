//! Error types for the registry core.
//!
//! [`StoreError`] describes a backend failing to do its job (the
//! "operational fault" class); the registry facade decides whether such a
//! fault is recovered through the local store. [`RegistryError`] is what
//! callers of the facade and the access operations see.

use std::time::Duration;

use thiserror::Error;

use crate::store::BackendKind;

/// A backend call failed for connectivity, auth, I/O or format reasons.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("registry file I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("registry document is malformed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("remote request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("remote authentication failed: {0}")]
    Auth(#[from] gcp_auth::Error),

    #[error("remote returned status {status}: {message}")]
    Remote { status: u16, message: String },

    #[error("remote call timed out after {0:?}")]
    Timeout(Duration),

    #[error("operation not supported by the {0} backend")]
    Unsupported(BackendKind),
}

/// Errors surfaced by the registry facade and the access operations.
#[derive(Debug, Error)]
pub enum RegistryError {
    /// No backend holds a record with this id.
    #[error("model {0} not found")]
    NotFound(String),

    /// The record exists but its `active` flag is off.
    #[error("access disabled for model {0}")]
    AccessDisabled(String),

    /// The request was rejected before any backend was touched.
    #[error("invalid request: {0}")]
    Validation(String),

    /// Binary uploads need the remote object store, which is not active.
    #[error("file uploads require the remote backend")]
    BackendRequired,

    /// Every backend that was tried failed.
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("QR encoding failed: {0}")]
    Qr(String),
}
