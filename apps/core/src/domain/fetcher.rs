// Copyright (c) 2026 Cozy Cloud
// SPDX-License-Identifier: AGPL-3.0

//! Fetcher Trait - where application sources come from
//!
//! Implementations (chosen by source URL scheme):
//! - `GitFetcher`: git repositories (`git://`, `git+https://`, `git+file://`, ...)
//! - `RegistryFetcher`: `registry://slug/channel`
//! - `HttpFetcher`: plain (optionally gzipped) tarballs over `http(s)://`

use async_trait::async_trait;
use bytes::Bytes;
use url::Url;

use crate::domain::errors::AppError;
use crate::domain::manifest::AppManifest;
use crate::domain::storage::Copier;

#[async_trait]
pub trait Fetcher: Send + Sync {
    /// Download the raw manifest of the application at `src`
    ///
    /// Any failure to reach it is reported as `ManifestNotReachable`.
    async fn fetch_manifest(&self, src: &Url) -> Result<Bytes, AppError>;

    /// Copy the application payload into `copier`
    ///
    /// May rewrite the manifest version (the git fetcher appends the commit
    /// hash).
    async fn fetch(&self, src: &Url, copier: &mut dyn Copier, man: &mut AppManifest) -> Result<(), AppError>;
}
