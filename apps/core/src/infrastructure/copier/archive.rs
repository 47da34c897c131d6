// Copyright (c) 2026 Cozy Cloud
// SPDX-License-Identifier: AGPL-3.0

//! Tar-bundling Copier
//!
//! Konnectors run in a sandbox that expects a single archive. This copier
//! wraps another one: files are appended to an in-memory tar stream and the
//! whole archive is handed to the inner copier as `app.tar` on `close`.

use async_trait::async_trait;
use bytes::Bytes;
use tracing::debug;

use crate::domain::app::KONNECTOR_ARCHIVE_NAME;
use crate::domain::storage::{Copier, CopierError};
use crate::infrastructure::copier::local::safe_relative_path;

pub struct TarCopier {
    inner: Box<dyn Copier>,
    builder: Option<tar::Builder<Vec<u8>>>,
    files: usize,
}

impl TarCopier {
    pub fn new(inner: Box<dyn Copier>) -> Self {
        Self {
            inner,
            builder: None,
            files: 0,
        }
    }
}

#[async_trait]
impl Copier for TarCopier {
    async fn start(&mut self, slug: &str, version: &str) -> Result<bool, CopierError> {
        if self.inner.start(slug, version).await? {
            return Ok(true);
        }
        self.builder = Some(tar::Builder::new(Vec::new()));
        self.files = 0;
        Ok(false)
    }

    async fn copy(&mut self, name: &str, content: Bytes) -> Result<(), CopierError> {
        let builder = self.builder.as_mut().ok_or(CopierError::NotStarted)?;
        let path = safe_relative_path(name)?;

        let mut header = tar::Header::new_gnu();
        header.set_size(content.len() as u64);
        header.set_mode(0o644);
        header.set_mtime(chrono::Utc::now().timestamp().max(0) as u64);
        builder.append_data(&mut header, &path, content.as_ref())?;
        self.files += 1;
        Ok(())
    }

    async fn close(&mut self) -> Result<(), CopierError> {
        let Some(builder) = self.builder.take() else {
            return self.inner.close().await;
        };
        let archive = builder.into_inner()?;
        debug!("Bundled {} files into {} ({} bytes)", self.files, KONNECTOR_ARCHIVE_NAME, archive.len());
        self.inner.copy(KONNECTOR_ARCHIVE_NAME, Bytes::from(archive)).await?;
        self.inner.close().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::copier::local::LocalCopier;
    use std::io::Read;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_bundles_files_into_one_archive() {
        let temp_dir = TempDir::new().unwrap();
        let mut copier = TarCopier::new(Box::new(LocalCopier::new(temp_dir.path())));

        assert!(!copier.start("bank", "1.0.0-abc").await.unwrap());
        copier.copy("index.js", Bytes::from_static(b"run()")).await.unwrap();
        copier.copy("lib/util.js", Bytes::from_static(b"util()")).await.unwrap();
        copier.close().await.unwrap();

        let version_dir = temp_dir.path().join("bank/1.0.0-abc");
        let names: Vec<_> = std::fs::read_dir(&version_dir)
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .collect();
        assert_eq!(names, vec![std::ffi::OsString::from("app.tar")]);

        let data = std::fs::read(version_dir.join("app.tar")).unwrap();
        let mut archive = tar::Archive::new(data.as_slice());
        let mut found = Vec::new();
        for entry in archive.entries().unwrap() {
            let mut entry = entry.unwrap();
            let path = entry.path().unwrap().to_string_lossy().to_string();
            let mut content = String::new();
            entry.read_to_string(&mut content).unwrap();
            found.push((path, content));
        }
        assert_eq!(
            found,
            vec![
                ("index.js".to_string(), "run()".to_string()),
                ("lib/util.js".to_string(), "util()".to_string()),
            ]
        );
    }

    #[tokio::test]
    async fn test_copy_before_start_fails() {
        let temp_dir = TempDir::new().unwrap();
        let mut copier = TarCopier::new(Box::new(LocalCopier::new(temp_dir.path())));
        let result = copier.copy("index.js", Bytes::new()).await;
        assert!(matches!(result, Err(CopierError::NotStarted)));
    }
}
