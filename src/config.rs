//! TOML configuration for the provreport service.
//!
//! Layered model: `PROVREPORT_CONFIG` environment override, then the
//! standard system location, then compiled-in defaults. Every section and
//! field is optional in the file; whatever is absent keeps its default.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::tracker::StartPolicy;

/// Root configuration for the service process.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    pub server: ServerConfig,
    pub store: StoreConfig,
    pub logging: LoggingConfig,
}

impl ServiceConfig {
    /// Load configuration from a TOML file at `path`.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file: {}", path.display()))?;
        let config: Self = toml::from_str(&content)
            .with_context(|| format!("failed to parse config file: {}", path.display()))?;
        info!(path = %path.display(), "loaded service configuration");
        Ok(config)
    }

    /// Try to load configuration from, in order:
    /// 1. The path specified by the `PROVREPORT_CONFIG` environment variable.
    /// 2. `/etc/provreport/provreport.toml`.
    /// 3. Fall back to compiled-in defaults.
    pub fn load_or_default() -> Self {
        if let Ok(env_path) = std::env::var("PROVREPORT_CONFIG") {
            let path = Path::new(&env_path);
            match Self::load(path) {
                Ok(cfg) => return cfg,
                Err(e) => {
                    warn!(
                        path = %path.display(),
                        error = %e,
                        "PROVREPORT_CONFIG set but file could not be loaded, trying fallback"
                    );
                }
            }
        }

        let system_path = Path::new("/etc/provreport/provreport.toml");
        if system_path.exists() {
            match Self::load(system_path) {
                Ok(cfg) => return cfg,
                Err(e) => {
                    warn!(
                        path = %system_path.display(),
                        error = %e,
                        "system config file exists but could not be loaded, using defaults"
                    );
                }
            }
        }

        debug!("no config file found, using compiled-in defaults");
        Self::default()
    }
}

/// HTTP listener configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Address and port the API listens on.
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0:5000".to_string(),
        }
    }
}

/// Report store configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Where the collection snapshot lives on disk. `None` keeps the store
    /// purely in memory.
    pub snapshot_path: Option<PathBuf>,
    /// What a start on an already-registered run id does.
    pub on_existing_run: StartPolicy,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            snapshot_path: Some(PathBuf::from("/var/lib/provreport/reports.json")),
            on_existing_run: StartPolicy::Reject,
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default tracing filter; `RUST_LOG` overrides it.
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_sane() {
        let cfg = ServiceConfig::default();

        assert_eq!(cfg.server.bind, "0.0.0.0:5000");
        assert_eq!(
            cfg.store.snapshot_path,
            Some(PathBuf::from("/var/lib/provreport/reports.json"))
        );
        assert_eq!(cfg.store.on_existing_run, StartPolicy::Reject);
        assert_eq!(cfg.logging.level, "info");
    }

    #[test]
    fn test_parse_example_toml() {
        let toml_str = r#"
[server]
bind = "127.0.0.1:9000"

[store]
snapshot_path = "/tmp/reports.json"
on_existing_run = "overwrite"

[logging]
level = "debug"
"#;
        let cfg: ServiceConfig = toml::from_str(toml_str).unwrap();

        assert_eq!(cfg.server.bind, "127.0.0.1:9000");
        assert_eq!(cfg.store.snapshot_path, Some(PathBuf::from("/tmp/reports.json")));
        assert_eq!(cfg.store.on_existing_run, StartPolicy::Overwrite);
        assert_eq!(cfg.logging.level, "debug");
    }

    #[test]
    fn test_partial_toml_keeps_defaults_for_the_rest() {
        let cfg: ServiceConfig = toml::from_str("[server]\nbind = \"0.0.0.0:8080\"\n").unwrap();

        assert_eq!(cfg.server.bind, "0.0.0.0:8080");
        assert_eq!(cfg.store.on_existing_run, StartPolicy::Reject);
        assert_eq!(cfg.logging.level, "info");
    }

    #[test]
    fn test_empty_toml_is_all_defaults() {
        let cfg: ServiceConfig = toml::from_str("").unwrap();
        assert_eq!(cfg.server.bind, ServiceConfig::default().server.bind);
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("provreport.toml");
        std::fs::write(&path, "[logging]\nlevel = \"trace\"\n").unwrap();

        let cfg = ServiceConfig::load(&path).unwrap();
        assert_eq!(cfg.logging.level, "trace");
    }

    #[test]
    fn test_load_missing_file_is_an_error() {
        let err = ServiceConfig::load(Path::new("/nonexistent/provreport.toml")).unwrap_err();
        assert!(err.to_string().contains("failed to read config file"));
    }
}
