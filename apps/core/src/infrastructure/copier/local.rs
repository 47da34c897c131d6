// Copyright (c) 2026 Cozy Cloud
// SPDX-License-Identifier: AGPL-3.0

//! Local Filesystem Copier
//!
//! Stores every application version as a directory tree
//! `<base>/<slug>/<version>/`. Suitable for development and single-node
//! deployments.
//!
//! Files are written into a hidden sibling directory
//! (`<base>/<slug>/.tmp-<uuid>`) which is renamed into place on `close`, so a
//! version directory is either complete or absent. A failed `copy` removes
//! the temporary directory.

use async_trait::async_trait;
use bytes::Bytes;
use std::path::{Component, Path, PathBuf};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::domain::storage::{Copier, CopierError};

struct Session {
    tmp_dir: PathBuf,
    final_dir: PathBuf,
}

/// Local filesystem copier
pub struct LocalCopier {
    /// Base directory for all applications (e.g., "/var/lib/cozy/apps")
    base_path: PathBuf,

    session: Option<Session>,
}

impl LocalCopier {
    pub fn new(base_path: impl Into<PathBuf>) -> Self {
        Self {
            base_path: base_path.into(),
            session: None,
        }
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    /// Directory holding a stored version
    pub fn version_dir(&self, slug: &str, version: &str) -> PathBuf {
        self.base_path.join(slug).join(version)
    }

    fn abort(&mut self) {
        if let Some(session) = self.session.take() {
            if let Err(e) = std::fs::remove_dir_all(&session.tmp_dir) {
                warn!("Failed to remove {}: {}", session.tmp_dir.display(), e);
            }
        }
    }
}

/// Relative path of a copied file, refusing anything escaping the version root
pub(crate) fn safe_relative_path(name: &str) -> Result<PathBuf, CopierError> {
    let mut path = PathBuf::new();
    for component in Path::new(name).components() {
        match component {
            Component::Normal(part) => path.push(part),
            Component::CurDir => {}
            _ => return Err(CopierError::InvalidName(name.to_string())),
        }
    }
    if path.as_os_str().is_empty() {
        return Err(CopierError::InvalidName(name.to_string()));
    }
    Ok(path)
}

#[async_trait]
impl Copier for LocalCopier {
    async fn start(&mut self, slug: &str, version: &str) -> Result<bool, CopierError> {
        let final_dir = self.version_dir(slug, version);
        if final_dir.exists() {
            debug!("{} already stored at {}", version, final_dir.display());
            return Ok(true);
        }

        let tmp_dir = self.base_path.join(slug).join(format!(".tmp-{}", Uuid::new_v4().simple()));
        std::fs::create_dir_all(&tmp_dir).map_err(|e| {
            CopierError::Io(format!("Failed to create directory {}: {}", tmp_dir.display(), e))
        })?;

        self.session = Some(Session { tmp_dir, final_dir });
        Ok(false)
    }

    async fn copy(&mut self, name: &str, content: Bytes) -> Result<(), CopierError> {
        let tmp_dir = match &self.session {
            Some(session) => session.tmp_dir.clone(),
            None => return Err(CopierError::NotStarted),
        };

        let result = safe_relative_path(name).and_then(|relative| {
            let path = tmp_dir.join(relative);
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::write(&path, &content)?;
            Ok(())
        });

        if result.is_err() {
            self.abort();
        }
        result
    }

    async fn close(&mut self) -> Result<(), CopierError> {
        let Some(session) = self.session.take() else {
            return Ok(());
        };

        if session.final_dir.exists() {
            // Another run stored the same version meanwhile
            std::fs::remove_dir_all(&session.tmp_dir)?;
            return Ok(());
        }
        std::fs::rename(&session.tmp_dir, &session.final_dir).map_err(|e| {
            CopierError::Io(format!(
                "Failed to move {} into place: {}",
                session.final_dir.display(),
                e
            ))
        })?;
        debug!("Stored {}", session.final_dir.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_copy_and_close() {
        let temp_dir = TempDir::new().unwrap();
        let mut copier = LocalCopier::new(temp_dir.path());

        assert!(!copier.start("mini", "1.0.0").await.unwrap());
        copier.copy("index.html", Bytes::from_static(b"<html>")).await.unwrap();
        copier.copy("js/app.js", Bytes::from_static(b"app()")).await.unwrap();

        let version_dir = copier.version_dir("mini", "1.0.0");
        assert!(!version_dir.exists());

        copier.close().await.unwrap();
        assert_eq!(std::fs::read(version_dir.join("js/app.js")).unwrap(), b"app()");

        let leftovers: Vec<_> = std::fs::read_dir(temp_dir.path().join("mini"))
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .collect();
        assert_eq!(leftovers, vec![std::ffi::OsString::from("1.0.0")]);
    }

    #[tokio::test]
    async fn test_existing_version_short_circuits() {
        let temp_dir = TempDir::new().unwrap();
        std::fs::create_dir_all(temp_dir.path().join("mini/1.0.0")).unwrap();

        let mut copier = LocalCopier::new(temp_dir.path());
        assert!(copier.start("mini", "1.0.0").await.unwrap());
        copier.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_copy_before_start_fails() {
        let temp_dir = TempDir::new().unwrap();
        let mut copier = LocalCopier::new(temp_dir.path());
        let result = copier.copy("index.html", Bytes::new()).await;
        assert!(matches!(result, Err(CopierError::NotStarted)));
        assert_eq!(result.unwrap_err().to_string(), "copier should call start() before copy()");
    }

    #[tokio::test]
    async fn test_failed_copy_removes_partial_version() {
        let temp_dir = TempDir::new().unwrap();
        let mut copier = LocalCopier::new(temp_dir.path());
        copier.start("mini", "1.0.0").await.unwrap();
        copier.copy("index.html", Bytes::from_static(b"ok")).await.unwrap();

        let result = copier.copy("../escape.txt", Bytes::from_static(b"no")).await;
        assert!(matches!(result, Err(CopierError::InvalidName(_))));

        let entries = std::fs::read_dir(temp_dir.path().join("mini")).unwrap().count();
        assert_eq!(entries, 0);
        assert!(!temp_dir.path().join("escape.txt").exists());
    }
}
