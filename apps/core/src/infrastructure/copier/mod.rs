// Copyright (c) 2026 Cozy Cloud
// SPDX-License-Identifier: AGPL-3.0

//! Copier Implementations
//!
//! - **LocalCopier** - directory tree on the local filesystem
//! - **SwiftCopier** - objects in an OpenStack Swift container
//! - **TarCopier** - bundles files into one archive for another copier
//! - **MemCopier** - in-memory storage for tests and dry runs
//!
//! [`create_copier`] picks the backend from the `spec.fs` configuration.

pub mod archive;
pub mod local;
pub mod swift;

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use crate::domain::app::AppType;
use crate::domain::config::{resolve_secret, FsConfig};
use crate::domain::storage::{Copier, CopierError};

pub use archive::TarCopier;
pub use local::LocalCopier;
pub use swift::{SwiftCopier, KONNECTORS_CONTAINER, WEBAPPS_CONTAINER};

/// Directory under the local storage root for an application type
pub fn local_dir_name(app_type: AppType) -> &'static str {
    match app_type {
        AppType::Webapp => "webapps",
        AppType::Konnector => "konnectors",
    }
}

/// Build the copier configured for an application type
///
/// Konnector copiers are returned unwrapped; the installer bundles them.
pub fn create_copier(fs: &FsConfig, app_type: AppType, client: reqwest::Client) -> Result<Box<dyn Copier>, CopierError> {
    match fs {
        FsConfig::Local { path } => Ok(Box::new(LocalCopier::new(path.join(local_dir_name(app_type))))),
        FsConfig::Swift { url, token } => {
            let storage_url =
                url::Url::parse(url).map_err(|e| CopierError::Unknown(format!("invalid Swift URL: {}", e)))?;
            let token = resolve_secret(token).map_err(|e| CopierError::Unknown(e.to_string()))?;
            let container = match app_type {
                AppType::Webapp => WEBAPPS_CONTAINER,
                AppType::Konnector => KONNECTORS_CONTAINER,
            };
            Ok(Box::new(SwiftCopier::new(client, storage_url, token, container)))
        }
    }
}

#[derive(Debug, Default)]
struct MemStorage {
    versions: BTreeSet<String>,
    files: BTreeMap<String, Bytes>,
    starts: usize,
    copies: usize,
}

/// In-memory copier; clones share the same storage
#[derive(Clone, Default)]
pub struct MemCopier {
    storage: Arc<Mutex<MemStorage>>,
    current: Option<String>,
}

impl MemCopier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Content stored at `slug/version/name`
    pub fn file(&self, path: &str) -> Option<Bytes> {
        self.storage.lock().files.get(path).cloned()
    }

    pub fn file_names(&self) -> Vec<String> {
        self.storage.lock().files.keys().cloned().collect()
    }

    pub fn has_version(&self, slug: &str, version: &str) -> bool {
        self.storage.lock().versions.contains(&format!("{}/{}", slug, version))
    }

    /// Number of `start` and `copy` calls seen so far
    pub fn counts(&self) -> (usize, usize) {
        let storage = self.storage.lock();
        (storage.starts, storage.copies)
    }
}

#[async_trait]
impl Copier for MemCopier {
    async fn start(&mut self, slug: &str, version: &str) -> Result<bool, CopierError> {
        let prefix = format!("{}/{}", slug, version);
        let mut storage = self.storage.lock();
        storage.starts += 1;
        if storage.versions.contains(&prefix) {
            return Ok(true);
        }
        self.current = Some(prefix);
        Ok(false)
    }

    async fn copy(&mut self, name: &str, content: Bytes) -> Result<(), CopierError> {
        let prefix = self.current.as_ref().ok_or(CopierError::NotStarted)?;
        let path = local::safe_relative_path(name)?;
        let mut storage = self.storage.lock();
        storage.copies += 1;
        storage
            .files
            .insert(format!("{}/{}", prefix, path.to_string_lossy()), content);
        Ok(())
    }

    async fn close(&mut self) -> Result<(), CopierError> {
        if let Some(prefix) = self.current.take() {
            self.storage.lock().versions.insert(prefix);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[tokio::test]
    async fn test_mem_copier_second_start_short_circuits() {
        let mut copier = MemCopier::new();
        assert!(!copier.start("mini", "1.0.0").await.unwrap());
        copier.copy("index.html", Bytes::from_static(b"hi")).await.unwrap();
        copier.close().await.unwrap();

        let mut again = copier.clone();
        assert!(again.start("mini", "1.0.0").await.unwrap());
        assert_eq!(copier.counts(), (2, 1));
        assert_eq!(copier.file("mini/1.0.0/index.html").unwrap(), Bytes::from_static(b"hi"));
    }

    #[test]
    fn test_create_local_copier() {
        let fs = FsConfig::Local {
            path: PathBuf::from("/tmp/cozy-apps"),
        };
        assert!(create_copier(&fs, AppType::Konnector, reqwest::Client::new()).is_ok());

        let bad = FsConfig::Swift {
            url: "not a url".to_string(),
            token: "t".to_string(),
        };
        assert!(create_copier(&bad, AppType::Webapp, reqwest::Client::new()).is_err());
    }
}
