// Copyright (c) 2026 Cozy Cloud
// SPDX-License-Identifier: AGPL-3.0

//! Copier Trait - where application files are physically stored
//!
//! A copier receives the files of one application version from a fetcher and
//! stores them under `slug/version`. Implementations:
//! - `LocalCopier`: directory tree on the local filesystem
//! - `SwiftCopier`: objects in an OpenStack Swift container
//! - `TarCopier`: wraps another copier and bundles every file into a single
//!   tar archive (konnectors)
//!
//! Protocol: `start` once, then any number of `copy`, then `close`. A `start`
//! reporting `true` means the version is already stored and the caller must
//! skip copying.

use async_trait::async_trait;
use bytes::Bytes;
use thiserror::Error;

#[async_trait]
pub trait Copier: Send + Sync {
    /// Prepare storage for `slug/version`
    ///
    /// # Returns
    /// * `Ok(true)` if this version is already stored
    /// * `Ok(false)` if files can now be copied
    async fn start(&mut self, slug: &str, version: &str) -> Result<bool, CopierError>;

    /// Store one file, `name` being relative to the application root
    async fn copy(&mut self, name: &str, content: Bytes) -> Result<(), CopierError>;

    /// Finish the copy and publish the version
    async fn close(&mut self) -> Result<(), CopierError>;
}

#[derive(Debug, Error)]
pub enum CopierError {
    #[error("copier should call start() before copy()")]
    NotStarted,

    #[error("Invalid file name: {0}")]
    InvalidName(String),

    #[error("I/O error: {0}")]
    Io(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Storage backend error: {0}")]
    Unknown(String),
}

impl From<std::io::Error> for CopierError {
    fn from(err: std::io::Error) -> Self {
        CopierError::Io(err.to_string())
    }
}

impl From<reqwest::Error> for CopierError {
    fn from(err: reqwest::Error) -> Self {
        CopierError::Network(err.to_string())
    }
}
