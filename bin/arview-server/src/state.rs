//! Shared application state injected into every Axum handler.

use std::sync::Arc;

use arview_registry::{Registry, UploadPolicy};

use crate::config::Config;

/// State shared across all HTTP handlers.
#[derive(Clone, Debug)]
pub struct AppState {
    /// Server configuration (env-derived).
    pub config: Arc<Config>,
    /// Model registry with remote→local fallback.
    pub registry: Arc<Registry>,
}

impl AppState {
    pub fn upload_policy(&self) -> UploadPolicy {
        UploadPolicy {
            max_upload_bytes: self.config.max_upload_bytes,
        }
    }
}
