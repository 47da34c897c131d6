// Copyright (c) 2026 Cozy Cloud
// SPDX-License-Identifier: AGPL-3.0
//! cozy-apps CLI library - exposes testable components
//!
//! # Architecture
//!
//! - **Layer:** Interface / Presentation Layer
//! - **Purpose:** Command parsing and the in-process installer services

pub mod commands;
pub mod embedded;

use cozy_apps_core::domain::config::AppsConfigManifest;

/// Log filter used when `RUST_LOG` is not set
///
/// `--log-level` (or `COZY_APPS_LOG_LEVEL`) wins over `spec.logging.level`.
pub fn log_level(flag: Option<String>, config: Option<&AppsConfigManifest>) -> String {
    flag.filter(|level| !level.trim().is_empty())
        .or_else(|| config.map(|c| c.spec.logging.level.clone()))
        .unwrap_or_else(|| "info".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_level_precedence() {
        let mut config = AppsConfigManifest::default();
        config.spec.logging.level = "debug".to_string();

        assert_eq!(log_level(Some("warn".to_string()), Some(&config)), "warn");
        assert_eq!(log_level(None, Some(&config)), "debug");
        assert_eq!(log_level(Some(" ".to_string()), Some(&config)), "debug");
        assert_eq!(log_level(None, None), "info");
    }
}
