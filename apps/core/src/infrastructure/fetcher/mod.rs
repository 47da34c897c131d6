// Copyright (c) 2026 Cozy Cloud
// SPDX-License-Identifier: AGPL-3.0

//! Fetcher Implementations
//!
//! | Scheme | Fetcher |
//! |--------|---------|
//! | `git`, `git+ssh`, `ssh+git`, `git+http`, `git+https`, `git+file` | [`GitFetcher`] |
//! | `registry` | [`RegistryFetcher`] |
//! | `http`, `https` | [`HttpFetcher`] |

pub mod git;
pub mod http;
pub mod registry;

use reqwest::Client;
use std::sync::Arc;
use url::Url;

use crate::domain::app::AppType;
use crate::domain::config::HttpConfig;
use crate::domain::errors::AppError;
use crate::domain::fetcher::Fetcher;
use crate::domain::registry::VersionRegistry;

pub use git::{GitFetcher, CLONE_TIMEOUT, GIT_SCHEMES};
pub use http::HttpFetcher;
pub use registry::RegistryFetcher;

/// HTTP clients shared by the fetchers
///
/// Manifest requests are short; payload downloads get a longer deadline.
#[derive(Clone)]
pub struct HttpClients {
    pub manifest: Client,
    pub fetch: Client,
}

impl HttpClients {
    pub fn new(config: &HttpConfig) -> Result<Self, AppError> {
        let build = |timeout| {
            Client::builder()
                .timeout(timeout)
                .user_agent(concat!("cozy-apps/", env!("CARGO_PKG_VERSION")))
                .build()
                .map_err(|e| AppError::Io(std::io::Error::other(format!("cannot build HTTP client: {}", e))))
        };
        Ok(Self {
            manifest: build(config.manifest_timeout())?,
            fetch: build(config.fetch_timeout())?,
        })
    }
}

impl Default for HttpClients {
    fn default() -> Self {
        Self {
            manifest: Client::new(),
            fetch: Client::new(),
        }
    }
}

/// Pick the fetcher for a source URL
pub fn select_fetcher(
    src: &Url,
    app_type: AppType,
    clients: &HttpClients,
    registry: Arc<dyn VersionRegistry>,
) -> Result<Box<dyn Fetcher>, AppError> {
    let scheme = src.scheme();
    if GIT_SCHEMES.contains(&scheme) {
        return Ok(Box::new(GitFetcher::new(app_type, clients.manifest.clone())));
    }
    match scheme {
        "registry" => Ok(Box::new(RegistryFetcher::new(app_type, clients.fetch.clone(), registry))),
        "http" | "https" => Ok(Box::new(HttpFetcher::new(app_type, clients.fetch.clone()))),
        _ => Err(AppError::NotSupportedSource),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::registry_client::HttpVersionRegistry;

    fn registry() -> Arc<dyn VersionRegistry> {
        Arc::new(HttpVersionRegistry::new(Client::new(), Vec::new()))
    }

    #[test]
    fn test_select_fetcher_by_scheme() {
        let clients = HttpClients::default();
        for src in [
            "git://github.com/cozy/cozy-drive.git",
            "git+ssh://git@example.org/app.git",
            "git+file:///srv/app",
            "registry://drive/beta",
            "https://example.org/app.tar.gz",
        ] {
            let url = Url::parse(src).unwrap();
            assert!(select_fetcher(&url, AppType::Webapp, &clients, registry()).is_ok(), "{}", src);
        }
    }

    #[test]
    fn test_unknown_scheme_not_supported() {
        let clients = HttpClients::default();
        let url = Url::parse("ftp://example.org/app.tar").unwrap();
        assert!(matches!(
            select_fetcher(&url, AppType::Webapp, &clients, registry()),
            Err(AppError::NotSupportedSource)
        ));
    }

    #[test]
    fn test_clients_from_config() {
        assert!(HttpClients::new(&HttpConfig::default()).is_ok());
    }
}
