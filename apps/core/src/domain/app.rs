// Copyright (c) 2026 Cozy Cloud
// SPDX-License-Identifier: AGPL-3.0

//! Application value objects: type, state, operation and slug.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

use crate::domain::errors::AppError;

/// Doctype of webapp manifests
pub const WEBAPPS_DOCTYPE: &str = "io.cozy.apps";

/// Doctype of konnector manifests
pub const KONNECTORS_DOCTYPE: &str = "io.cozy.konnectors";

/// Name of the single archive object a konnector is stored as
pub const KONNECTOR_ARCHIVE_NAME: &str = "app.tar";

/// Manifests larger than this are rejected
pub const MANIFEST_MAX_SIZE: usize = 2 << 20;

/// Kind of application handled by the installer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AppType {
    Webapp,
    Konnector,
}

impl AppType {
    /// Doctype the manifests of this type are stored under
    pub fn doctype(&self) -> &'static str {
        match self {
            AppType::Webapp => WEBAPPS_DOCTYPE,
            AppType::Konnector => KONNECTORS_DOCTYPE,
        }
    }

    /// Name of the manifest file looked up in the application source
    pub fn manifest_filename(&self) -> &'static str {
        match self {
            AppType::Webapp => "manifest.webapp",
            AppType::Konnector => "manifest.konnector",
        }
    }
}

impl std::fmt::Display for AppType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AppType::Webapp => write!(f, "webapp"),
            AppType::Konnector => write!(f, "konnector"),
        }
    }
}

impl std::str::FromStr for AppType {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "webapp" | "app" | "apps" => Ok(AppType::Webapp),
            "konnector" | "konnectors" => Ok(AppType::Konnector),
            other => Err(AppError::BadManifest(format!("unknown application type: {}", other))),
        }
    }
}

/// Lifecycle state of an installed application
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AppState {
    /// Known to a registry but not installed
    Available,
    Installing,
    Upgrading,
    Uninstalling,
    Errored,
    Ready,
}

impl AppState {
    /// Update and delete are only allowed from a settled state
    pub fn is_settled(&self) -> bool {
        matches!(self, AppState::Ready | AppState::Errored)
    }
}

impl Default for AppState {
    fn default() -> Self {
        AppState::Installing
    }
}

impl std::fmt::Display for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            AppState::Available => "available",
            AppState::Installing => "installing",
            AppState::Upgrading => "upgrading",
            AppState::Uninstalling => "uninstalling",
            AppState::Errored => "errored",
            AppState::Ready => "ready",
        };
        f.write_str(s)
    }
}

/// Operation driven by an installer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Operation {
    Install,
    Update,
    Delete,
}

impl std::fmt::Display for Operation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Operation::Install => write!(f, "install"),
            Operation::Update => write!(f, "update"),
            Operation::Delete => write!(f, "delete"),
        }
    }
}

fn slug_regex() -> &'static Regex {
    static SLUG_RE: OnceLock<Regex> = OnceLock::new();
    SLUG_RE.get_or_init(|| Regex::new(r"^[A-Za-z0-9\-]+$").expect("slug regex is valid"))
}

/// Check that a slug can be used as an application identifier
pub fn validate_slug(slug: &str) -> Result<(), AppError> {
    if slug.is_empty() || !slug_regex().is_match(slug) {
        return Err(AppError::InvalidSlugName);
    }
    Ok(())
}

/// Document id of a manifest: `doctype/slug`
pub fn manifest_id(app_type: AppType, slug: &str) -> String {
    format!("{}/{}", app_type.doctype(), slug)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_slugs() {
        for slug in ["mini", "drive", "my-app-2", "A-Z-09"] {
            assert!(validate_slug(slug).is_ok(), "{} should be valid", slug);
        }
    }

    #[test]
    fn test_invalid_slugs() {
        for slug in ["", "foo/bar", "../etc", "with space", "under_score", "dot.app", "é"] {
            assert!(
                matches!(validate_slug(slug), Err(AppError::InvalidSlugName)),
                "{:?} should be rejected",
                slug
            );
        }
    }

    #[test]
    fn test_manifest_id() {
        assert_eq!(manifest_id(AppType::Webapp, "mini"), "io.cozy.apps/mini");
        assert_eq!(manifest_id(AppType::Konnector, "bank"), "io.cozy.konnectors/bank");
    }

    #[test]
    fn test_state_serialization() {
        let json = serde_json::to_string(&AppState::Errored).unwrap();
        assert_eq!(json, "\"errored\"");
        let state: AppState = serde_json::from_str("\"uninstalling\"").unwrap();
        assert_eq!(state, AppState::Uninstalling);
        assert!(AppState::Ready.is_settled());
        assert!(!AppState::Upgrading.is_settled());
    }

    #[test]
    fn test_app_type_parse() {
        assert_eq!("webapp".parse::<AppType>().unwrap(), AppType::Webapp);
        assert_eq!("konnector".parse::<AppType>().unwrap(), AppType::Konnector);
        assert!("plugin".parse::<AppType>().is_err());
    }
}
