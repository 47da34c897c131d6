// Copyright (c) 2026 Cozy Cloud
// SPDX-License-Identifier: AGPL-3.0

//! Registry Fetcher
//!
//! Sources of the form `registry://<slug>/<channel>` (channel defaults to
//! `stable`). The latest version on the channel is looked up once; its
//! published manifest is returned by `fetch_manifest` and its tarball,
//! checked against the published sha256, is copied by `fetch`.

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use reqwest::Client;
use std::sync::Arc;
use tracing::{debug, info, warn};
use url::Url;

use crate::domain::app::AppType;
use crate::domain::errors::AppError;
use crate::domain::fetcher::Fetcher;
use crate::domain::manifest::{AppManifest, Manifest};
use crate::domain::registry::{RegistryError, RegistryVersion, VersionRegistry, DEFAULT_CHANNEL};
use crate::domain::storage::Copier;
use crate::infrastructure::fetcher::http::{fetch_archive, store_archive};

pub struct RegistryFetcher {
    app_type: AppType,
    client: Client,
    registry: Arc<dyn VersionRegistry>,
    version: Mutex<Option<RegistryVersion>>,
}

impl RegistryFetcher {
    pub fn new(app_type: AppType, client: Client, registry: Arc<dyn VersionRegistry>) -> Self {
        Self {
            app_type,
            client,
            registry,
            version: Mutex::new(None),
        }
    }

    /// Slug and channel named by a `registry://` URL
    pub fn parse_source(src: &Url) -> Result<(String, String), AppError> {
        let slug = src.host_str().filter(|h| !h.is_empty()).ok_or(AppError::NotSupportedSource)?;
        let channel = src.path().trim_matches('/');
        let channel = if channel.is_empty() { DEFAULT_CHANNEL } else { channel };
        Ok((slug.to_string(), channel.to_string()))
    }

    async fn latest(&self, src: &Url) -> Result<RegistryVersion, AppError> {
        let cached = self.version.lock().clone();
        if let Some(version) = cached {
            return Ok(version);
        }
        let (slug, channel) = Self::parse_source(src)?;
        let version = self.registry.latest_version(&slug, &channel).await?;
        info!("Latest version of {} on {} is {}", slug, channel, version.version);
        *self.version.lock() = Some(version.clone());
        Ok(version)
    }

    fn prefix(version: &RegistryVersion) -> String {
        let prefix = version.tar_prefix.trim_matches('/');
        if prefix.is_empty() {
            String::new()
        } else {
            format!("{}/", prefix)
        }
    }
}

#[async_trait]
impl Fetcher for RegistryFetcher {
    async fn fetch_manifest(&self, src: &Url) -> Result<Bytes, AppError> {
        let version = match self.latest(src).await {
            Ok(version) => version,
            Err(AppError::Registry(RegistryError::UnknownChannel(channel))) => {
                warn!("Unknown registry channel {}", channel);
                return Err(AppError::NotSupportedSource);
            }
            Err(AppError::NotSupportedSource) => return Err(AppError::NotSupportedSource),
            Err(e) => {
                debug!("Manifest of {} not reachable: {}", src, e);
                return Err(AppError::ManifestNotReachable);
            }
        };

        if !version.manifest.is_null() {
            return serde_json::to_vec(&version.manifest)
                .map(Bytes::from)
                .map_err(|e| AppError::BadManifest(e.to_string()));
        }

        // Older registries do not publish the manifest: read it from the tarball
        let url = Url::parse(&version.url).map_err(|_| AppError::ManifestNotReachable)?;
        let archive = fetch_archive(&self.client, &url, Some(&version.sha256))
            .await
            .map_err(|e| match e {
                AppError::BadChecksum => AppError::BadChecksum,
                e @ AppError::BadManifest(_) => e,
                _ => AppError::ManifestNotReachable,
            })?;
        let filename = self.app_type.manifest_filename();
        let path = format!("{}{}", Self::prefix(&version), filename);
        archive
            .entries
            .iter()
            .find(|entry| entry.path == path)
            .map(|entry| entry.content.clone())
            .or_else(|| archive.find_manifest(filename).map(|(_, content)| content))
            .ok_or(AppError::ManifestNotReachable)
    }

    async fn fetch(&self, src: &Url, copier: &mut dyn Copier, man: &mut AppManifest) -> Result<(), AppError> {
        let version = self.latest(src).await?;
        let url = Url::parse(&version.url).map_err(|_| AppError::SourceNotReachable)?;
        let archive = fetch_archive(&self.client, &url, Some(&version.sha256)).await?;

        if man.version().is_empty() {
            man.set_version(version.version.clone());
        }
        store_archive(&archive, &Self::prefix(&version), copier, man).await
    }
}
