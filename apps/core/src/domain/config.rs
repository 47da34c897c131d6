// Copyright (c) 2026 Cozy Cloud
// SPDX-License-Identifier: AGPL-3.0

// Installer Configuration Types
//
// Defines the configuration schema for the application installer:
// - Kubernetes-style manifest format (apiVersion/kind/metadata/spec)
// - Storage backend used by copiers (local directory or Swift)
// - Document store location
// - Application registries and HTTP timeouts

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const API_VERSION: &str = "cozy.io/v1";
pub const KIND: &str = "AppsConfig";

/// Top-level Kubernetes-style installer configuration manifest
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppsConfigManifest {
    /// API version (must be "cozy.io/v1")
    #[serde(rename = "apiVersion")]
    pub api_version: String,

    /// Resource kind (must be "AppsConfig")
    pub kind: String,

    pub metadata: ConfigMetadata,

    pub spec: AppsConfigSpec,
}

/// Manifest metadata (Kubernetes-style)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigMetadata {
    pub name: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub labels: Option<HashMap<String, String>>,
}

/// Installer settings (content under spec:)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppsConfigSpec {
    /// Instance domain, used as database prefix and trigger domain
    #[serde(default = "default_domain")]
    pub domain: String,

    /// Where application files are stored
    #[serde(default)]
    pub fs: FsConfig,

    /// Document store; in-memory when absent
    #[serde(skip_serializing_if = "Option::is_none")]
    pub couchdb: Option<CouchdbConfig>,

    /// Registry base URLs, queried in order
    #[serde(default)]
    pub registries: Vec<String>,

    #[serde(default)]
    pub http: HttpConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "backend", rename_all = "lowercase")]
pub enum FsConfig {
    Local {
        path: PathBuf,
    },
    Swift {
        /// Storage URL of the Swift account
        url: String,
        /// Auth token (supports "env:VAR_NAME")
        token: String,
    },
}

impl Default for FsConfig {
    fn default() -> Self {
        FsConfig::Local {
            path: default_fs_path(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CouchdbConfig {
    pub url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    /// Timeout for manifest downloads
    #[serde(default = "default_manifest_timeout")]
    pub manifest_timeout_secs: u64,

    /// Timeout for archive downloads
    #[serde(default = "default_fetch_timeout")]
    pub fetch_timeout_secs: u64,
}

impl HttpConfig {
    pub fn manifest_timeout(&self) -> Duration {
        Duration::from_secs(self.manifest_timeout_secs)
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            manifest_timeout_secs: default_manifest_timeout(),
            fetch_timeout_secs: default_fetch_timeout(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_domain() -> String {
    "cozy.localhost".to_string()
}

fn default_fs_path() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join("cozy")
        .join("apps")
}

fn default_manifest_timeout() -> u64 {
    20
}

fn default_fetch_timeout() -> u64 {
    60
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for AppsConfigSpec {
    fn default() -> Self {
        Self {
            domain: default_domain(),
            fs: FsConfig::default(),
            couchdb: None,
            registries: Vec::new(),
            http: HttpConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Default for AppsConfigManifest {
    fn default() -> Self {
        let name = hostname::get()
            .ok()
            .and_then(|h| h.into_string().ok())
            .unwrap_or_else(|| "cozy-apps".to_string());
        Self {
            api_version: API_VERSION.to_string(),
            kind: KIND.to_string(),
            metadata: ConfigMetadata { name, labels: None },
            spec: AppsConfigSpec::default(),
        }
    }
}

impl AppsConfigManifest {
    /// Load configuration from YAML file
    pub fn from_yaml_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to YAML file
    pub fn to_yaml_file(&self, path: impl AsRef<Path>) -> anyhow::Result<()> {
        let yaml = serde_yaml::to_string(self)?;
        std::fs::write(path, yaml)?;
        Ok(())
    }

    pub fn from_yaml_str(yaml: &str) -> anyhow::Result<Self> {
        let config = serde_yaml::from_str(yaml)?;
        Ok(config)
    }

    /// Discover configuration file using precedence order
    /// 1. COZY_APPS_CONFIG_PATH environment variable
    /// 2. ./cozy-apps.yaml (working directory)
    /// 3. ~/.cozy/apps.yaml (user home)
    /// 4. /etc/cozy/apps.yaml (system)
    pub fn discover_config() -> Option<PathBuf> {
        if let Ok(path) = std::env::var("COZY_APPS_CONFIG_PATH") {
            let path = PathBuf::from(path);
            if path.exists() {
                return Some(path);
            }
        }

        let cwd = PathBuf::from("./cozy-apps.yaml");
        if cwd.exists() {
            return Some(cwd);
        }

        if let Some(home) = dirs::home_dir() {
            let user_config = home.join(".cozy").join("apps.yaml");
            if user_config.exists() {
                return Some(user_config);
            }
        }

        let system_config = PathBuf::from("/etc/cozy/apps.yaml");
        if system_config.exists() {
            return Some(system_config);
        }

        None
    }

    /// Load configuration with discovery, fallback to default
    pub fn load_or_default(cli_path: Option<PathBuf>) -> anyhow::Result<Self> {
        if let Some(path) = cli_path {
            tracing::info!("Loading configuration from explicit path: {:?}", path);
            let mut config = Self::from_yaml_file(&path)
                .map_err(|e| anyhow::anyhow!("Failed to load config at {:?}: {}", path, e))?;
            config.apply_env_overrides();
            return Ok(config);
        }

        if let Some(config_path) = Self::discover_config() {
            tracing::info!("Loading configuration from discovered path: {:?}", config_path);
            let mut config = Self::from_yaml_file(config_path)?;
            config.apply_env_overrides();
            Ok(config)
        } else {
            tracing::warn!("No configuration file found in standard locations. Using defaults.");
            let mut config = Self::default();
            config.apply_env_overrides();
            Ok(config)
        }
    }

    /// Apply environment variable overrides to configuration
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(path) = lookup("COZY_APPS_FS_PATH") {
            tracing::info!("Environment override: COZY_APPS_FS_PATH={}", path);
            self.spec.fs = FsConfig::Local { path: PathBuf::from(path) };
        }

        if let Some(url) = lookup("COZY_APPS_COUCHDB_URL") {
            tracing::info!("Environment override: COZY_APPS_COUCHDB_URL");
            self.spec.couchdb = Some(CouchdbConfig { url });
        }

        if let Some(list) = lookup("COZY_APPS_REGISTRIES") {
            self.spec.registries = list
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect();
            tracing::info!(
                "Environment override: COZY_APPS_REGISTRIES ({} registries)",
                self.spec.registries.len()
            );
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.api_version != API_VERSION {
            anyhow::bail!("Invalid apiVersion: '{}'. Must be '{}'", self.api_version, API_VERSION);
        }

        if self.kind != KIND {
            anyhow::bail!("Invalid kind: '{}'. Must be '{}'", self.kind, KIND);
        }

        if self.metadata.name.is_empty() {
            anyhow::bail!("metadata.name cannot be empty");
        }

        if self.spec.domain.is_empty() {
            anyhow::bail!("spec.domain cannot be empty");
        }

        if let FsConfig::Swift { url, .. } = &self.spec.fs {
            url::Url::parse(url).map_err(|e| anyhow::anyhow!("Invalid Swift URL '{}': {}", url, e))?;
        }

        if let Some(couchdb) = &self.spec.couchdb {
            url::Url::parse(&couchdb.url)
                .map_err(|e| anyhow::anyhow!("Invalid CouchDB URL '{}': {}", couchdb.url, e))?;
        }

        for registry in &self.spec.registries {
            url::Url::parse(registry).map_err(|e| anyhow::anyhow!("Invalid registry URL '{}': {}", registry, e))?;
        }

        if self.spec.http.manifest_timeout_secs == 0 || self.spec.http.fetch_timeout_secs == 0 {
            anyhow::bail!("spec.http timeouts must be greater than zero");
        }

        Ok(())
    }
}

/// Resolve a secret value, supporting "env:VAR_NAME" indirection
pub fn resolve_secret(value: &str) -> anyhow::Result<String> {
    match value.strip_prefix("env:") {
        Some(var) => std::env::var(var).map_err(|_| anyhow::anyhow!("Environment variable {} is not set", var)),
        None => Ok(value.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_manifest() {
        let manifest = AppsConfigManifest::default();
        assert_eq!(manifest.api_version, "cozy.io/v1");
        assert_eq!(manifest.kind, "AppsConfig");
        assert!(!manifest.metadata.name.is_empty());
        assert!(matches!(manifest.spec.fs, FsConfig::Local { .. }));
        assert_eq!(manifest.spec.http.manifest_timeout(), Duration::from_secs(20));
        assert_eq!(manifest.spec.http.fetch_timeout(), Duration::from_secs(60));
        assert!(manifest.validate().is_ok());
    }

    #[test]
    fn test_parse_swift_config() {
        let yaml = r#"
apiVersion: cozy.io/v1
kind: AppsConfig
metadata:
  name: prod
spec:
  domain: alice.cozy.example
  fs:
    backend: swift
    url: https://swift.example/v1/AUTH_cozy
    token: env:SWIFT_TOKEN
  couchdb:
    url: http://localhost:5984
  registries:
    - https://apps-registry.cozycloud.cc/
  http:
    manifest_timeout_secs: 10
"#;
        let manifest = AppsConfigManifest::from_yaml_str(yaml).unwrap();
        assert_eq!(manifest.spec.domain, "alice.cozy.example");
        assert!(matches!(manifest.spec.fs, FsConfig::Swift { ref token, .. } if token == "env:SWIFT_TOKEN"));
        assert_eq!(manifest.spec.registries.len(), 1);
        assert_eq!(manifest.spec.http.manifest_timeout_secs, 10);
        assert_eq!(manifest.spec.http.fetch_timeout_secs, 60);
        assert_eq!(manifest.spec.logging.level, "info");
        assert!(manifest.validate().is_ok());
    }

    #[test]
    fn test_validation() {
        let mut manifest = AppsConfigManifest::default();

        manifest.api_version = "wrong/v1".to_string();
        assert!(manifest.validate().is_err());
        manifest.api_version = API_VERSION.to_string();

        manifest.kind = "NodeConfig".to_string();
        assert!(manifest.validate().is_err());
        manifest.kind = KIND.to_string();

        manifest.spec.registries.push("not a url".to_string());
        assert!(manifest.validate().is_err());
        manifest.spec.registries.clear();

        manifest.spec.http.fetch_timeout_secs = 0;
        assert!(manifest.validate().is_err());
    }

    #[test]
    fn test_overrides() {
        let mut manifest = AppsConfigManifest::default();
        manifest.apply_overrides(|key| match key {
            "COZY_APPS_FS_PATH" => Some("/srv/apps".to_string()),
            "COZY_APPS_REGISTRIES" => Some("https://a.example/, ,https://b.example/".to_string()),
            _ => None,
        });
        assert_eq!(manifest.spec.fs, FsConfig::Local { path: PathBuf::from("/srv/apps") });
        assert_eq!(manifest.spec.registries, vec!["https://a.example/", "https://b.example/"]);
        assert!(manifest.spec.couchdb.is_none());
    }

    #[test]
    fn test_resolve_secret() {
        assert_eq!(resolve_secret("plain").unwrap(), "plain");
        assert!(resolve_secret("env:COZY_APPS_SURELY_UNSET_VARIABLE").is_err());
    }
}
