//! Server configuration, loaded from environment variables at startup.

use std::path::PathBuf;
use std::time::Duration;

use arview_registry::{RegistryConfig, RemoteConfig};

/// Runtime configuration for arview-server.
///
/// Every field has a default so the server starts in local mode without
/// any environment variables set.
#[derive(Debug, Clone)]
pub struct Config {
    /// TCP address to bind (default: `"0.0.0.0:$PORT"`, else `"0.0.0.0:3000"`).
    pub bind_address: String,

    /// Local JSON registry document (default: `"models-registry.json"`).
    pub registry_file: PathBuf,

    /// `tracing` filter string, e.g. `"info"` or `"debug,tower_http=warn"`.
    pub log_level: String,

    /// When `true`, emit log records as newline-delimited JSON.
    pub log_json: bool,

    /// Directory for a daily-rolling log file in addition to stdout.
    pub log_dir: Option<PathBuf>,

    /// Comma-separated list of allowed CORS origins; `None` allows any.
    pub cors_allowed_origins: Option<String>,

    /// Serve `/swagger-ui` and `/api-docs/openapi.json`.
    pub enable_swagger: bool,

    /// Directory served for paths no route matches (the viewer page lives here).
    pub static_dir: Option<PathBuf>,

    /// Base URL embedded in QR codes; derived from the request when unset.
    pub public_base_url: Option<String>,

    /// Upper bound for binary uploads, in bytes.
    pub max_upload_bytes: usize,

    /// Upper bound for each remote backend call.
    pub remote_timeout: Duration,

    /// Upper bound for one binary upload to the bucket.
    pub upload_timeout: Duration,

    /// Consult the local registry after a remote "not found" or empty list.
    pub fallback_on_miss: bool,

    /// Remote backend settings; `None` forces local mode.
    pub remote: Option<RemoteConfig>,
}

impl Config {
    /// Build [`Config`] from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build [`Config`] from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let bind_address = lookup("ARVIEW_BIND").unwrap_or_else(|| {
            let port = lookup("PORT")
                .and_then(|p| p.trim().parse::<u16>().ok())
                .unwrap_or(3000);
            format!("0.0.0.0:{port}")
        });

        let max_upload_mb: usize = parse_or(&lookup, "ARVIEW_MAX_UPLOAD_MB", 50);

        Self {
            bind_address,
            registry_file: lookup("ARVIEW_REGISTRY_FILE")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("models-registry.json")),
            log_level: lookup("ARVIEW_LOG").unwrap_or_else(|| "info".to_owned()),
            log_json: flag_or(&lookup, "ARVIEW_LOG_JSON", false),
            log_dir: non_empty(lookup("ARVIEW_LOG_DIR")).map(PathBuf::from),
            cors_allowed_origins: non_empty(lookup("ARVIEW_CORS_ORIGINS")),
            enable_swagger: flag_or(&lookup, "ARVIEW_ENABLE_SWAGGER", true),
            static_dir: non_empty(lookup("ARVIEW_STATIC_DIR")).map(PathBuf::from),
            public_base_url: non_empty(lookup("ARVIEW_PUBLIC_BASE_URL")),
            max_upload_bytes: max_upload_mb.saturating_mul(1024 * 1024),
            remote_timeout: Duration::from_secs(parse_or(&lookup, "ARVIEW_REMOTE_TIMEOUT_SECS", 10)),
            upload_timeout: Duration::from_secs(parse_or(&lookup, "ARVIEW_UPLOAD_TIMEOUT_SECS", 300)),
            fallback_on_miss: flag_or(&lookup, "ARVIEW_FALLBACK_ON_MISS", true),
            remote: RemoteConfig::resolve(
                lookup("FIREBASE_SERVICE_ACCOUNT"),
                lookup("FIREBASE_SERVICE_ACCOUNT_PATH"),
                lookup("FIREBASE_STORAGE_BUCKET"),
                lookup("FIREBASE_PROJECT_ID"),
            ),
        }
    }

    /// The part of the configuration the registry core consumes.
    pub fn registry(&self) -> RegistryConfig {
        RegistryConfig {
            registry_file: self.registry_file.clone(),
            remote: self.remote.clone(),
            fallback_on_miss: self.fallback_on_miss,
            remote_timeout: self.remote_timeout,
            upload_timeout: self.upload_timeout,
        }
    }
}

// ── private helpers ──────────────────────────────────────────────────────────

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

fn flag_or<F>(lookup: &F, key: &str, default: bool) -> bool
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        Some(v) => v == "1" || v.eq_ignore_ascii_case("true"),
        None => default,
    }
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> T
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
{
    lookup(key)
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;
    use arview_registry::CredentialSource;
    use std::collections::HashMap;

    fn config_from(pairs: &[(&str, &str)]) -> Config {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn defaults_are_local_mode() {
        let cfg = config_from(&[]);
        assert_eq!(cfg.bind_address, "0.0.0.0:3000");
        assert_eq!(cfg.registry_file, PathBuf::from("models-registry.json"));
        assert_eq!(cfg.max_upload_bytes, 50 * 1024 * 1024);
        assert_eq!(cfg.remote_timeout, Duration::from_secs(10));
        assert_eq!(cfg.upload_timeout, Duration::from_secs(300));
        assert!(cfg.fallback_on_miss);
        assert!(cfg.enable_swagger);
        assert!(!cfg.log_json);
        assert!(cfg.remote.is_none());
    }

    #[test]
    fn port_is_used_when_bind_is_unset() {
        assert_eq!(config_from(&[("PORT", "8080")]).bind_address, "0.0.0.0:8080");
        assert_eq!(
            config_from(&[("PORT", "8080"), ("ARVIEW_BIND", "127.0.0.1:9000")]).bind_address,
            "127.0.0.1:9000"
        );
    }

    #[test]
    fn bucket_enables_remote_with_inline_credentials_first() {
        let cfg = config_from(&[
            ("FIREBASE_STORAGE_BUCKET", "models-bucket"),
            ("FIREBASE_SERVICE_ACCOUNT", "{\"type\":\"service_account\"}"),
            ("FIREBASE_SERVICE_ACCOUNT_PATH", "/etc/sa.json"),
        ]);
        let remote = cfg.remote.expect("remote configured");
        assert_eq!(remote.bucket, "models-bucket");
        assert!(matches!(remote.credentials, CredentialSource::Inline(_)));
    }

    #[test]
    fn credentials_without_bucket_stay_local() {
        let cfg = config_from(&[("FIREBASE_SERVICE_ACCOUNT_PATH", "/etc/sa.json")]);
        assert!(cfg.remote.is_none());
    }

    #[test]
    fn flags_and_numbers_parse() {
        let cfg = config_from(&[
            ("ARVIEW_LOG_JSON", "TRUE"),
            ("ARVIEW_ENABLE_SWAGGER", "false"),
            ("ARVIEW_FALLBACK_ON_MISS", "0"),
            ("ARVIEW_MAX_UPLOAD_MB", "5"),
            ("ARVIEW_REMOTE_TIMEOUT_SECS", "not-a-number"),
        ]);
        assert!(cfg.log_json);
        assert!(!cfg.enable_swagger);
        assert!(!cfg.fallback_on_miss);
        assert_eq!(cfg.max_upload_bytes, 5 * 1024 * 1024);
        assert_eq!(cfg.remote_timeout, Duration::from_secs(10));
    }

    #[test]
    fn upload_timeout_is_separate_from_call_timeout() {
        let cfg = config_from(&[
            ("ARVIEW_REMOTE_TIMEOUT_SECS", "2"),
            ("ARVIEW_UPLOAD_TIMEOUT_SECS", "900"),
        ]);
        let registry = cfg.registry();
        assert_eq!(registry.remote_timeout, Duration::from_secs(2));
        assert_eq!(registry.upload_timeout, Duration::from_secs(900));
    }
}
