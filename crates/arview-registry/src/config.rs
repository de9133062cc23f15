//! Registry configuration consumed once at startup.

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

/// How the remote backend authenticates.
///
/// Resolved from the first present source, in this fixed order: inline
/// service-account JSON, service-account file path, ambient credentials.
#[derive(Clone, PartialEq, Eq)]
pub enum CredentialSource {
    /// Service-account JSON passed directly (e.g. through an env var).
    Inline(String),
    /// Path to a service-account JSON file.
    File(PathBuf),
    /// Whatever the environment provides (metadata server, gcloud, ...).
    Ambient,
}

impl fmt::Debug for CredentialSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CredentialSource::Inline(_) => f.write_str("Inline(<redacted>)"),
            CredentialSource::File(path) => f.debug_tuple("File").field(path).finish(),
            CredentialSource::Ambient => f.write_str("Ambient"),
        }
    }
}

/// Everything needed to reach the remote document store and bucket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteConfig {
    pub credentials: CredentialSource,
    /// Cloud Storage bucket for binary uploads.
    pub bucket: String,
    /// Overrides the project id reported by the credentials.
    pub project_id: Option<String>,
}

impl RemoteConfig {
    /// Resolve the remote configuration from raw (possibly unset) values.
    ///
    /// Returns `None` when no bucket is configured: that forces local mode
    /// regardless of any credentials. Blank strings count as unset.
    pub fn resolve(
        inline_credentials: Option<String>,
        credentials_path: Option<String>,
        bucket: Option<String>,
        project_id: Option<String>,
    ) -> Option<Self> {
        let bucket = non_blank(bucket)?;
        let credentials = if let Some(json) = non_blank(inline_credentials) {
            CredentialSource::Inline(json)
        } else if let Some(path) = non_blank(credentials_path) {
            CredentialSource::File(PathBuf::from(path))
        } else {
            CredentialSource::Ambient
        };
        Some(Self {
            credentials,
            bucket,
            project_id: non_blank(project_id),
        })
    }
}

/// Configuration for [`crate::Registry::initialize`].
#[derive(Debug, Clone)]
pub struct RegistryConfig {
    /// Location of the local JSON registry document.
    pub registry_file: PathBuf,
    /// `None` means local mode unconditionally.
    pub remote: Option<RemoteConfig>,
    /// When the remote backend answers "not found" or an empty list, also
    /// consult the local registry before answering.
    pub fallback_on_miss: bool,
    /// Upper bound for every remote document call, including the startup
    /// probe.
    pub remote_timeout: Duration,
    /// Upper bound for one binary object upload.
    pub upload_timeout: Duration,
}

impl RegistryConfig {
    pub const DEFAULT_REMOTE_TIMEOUT: Duration = Duration::from_secs(10);
    pub const DEFAULT_UPLOAD_TIMEOUT: Duration = Duration::from_secs(300);

    /// Local-only configuration with default settings.
    pub fn local(registry_file: impl Into<PathBuf>) -> Self {
        Self {
            registry_file: registry_file.into(),
            remote: None,
            fallback_on_miss: true,
            remote_timeout: Self::DEFAULT_REMOTE_TIMEOUT,
            upload_timeout: Self::DEFAULT_UPLOAD_TIMEOUT,
        }
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_owned())
        .filter(|v| !v.is_empty())
}
