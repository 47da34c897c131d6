// Copyright (c) 2026 Cozy Cloud
// SPDX-License-Identifier: AGPL-3.0

//! Registry HTTP client
//!
//! Queries `GET <registry>/registry/<slug>/<channel>/latest` on each
//! configured registry in order. A 404 moves on to the next registry; any
//! other failure stops the lookup.

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use tracing::debug;
use url::Url;

use crate::domain::registry::{RegistryError, RegistryVersion, VersionRegistry, CHANNELS};

pub struct HttpVersionRegistry {
    client: Client,
    registries: Vec<Url>,
}

impl HttpVersionRegistry {
    pub fn new(client: Client, registries: Vec<Url>) -> Self {
        Self { client, registries }
    }

    /// Parse registry base URLs from configuration
    pub fn from_urls(client: Client, urls: &[String]) -> Result<Self, RegistryError> {
        let registries = urls
            .iter()
            .map(|u| Url::parse(u).map_err(|e| RegistryError::InvalidResponse(format!("invalid registry URL {}: {}", u, e))))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self::new(client, registries))
    }

    fn latest_url(registry: &Url, slug: &str, channel: &str) -> Result<Url, RegistryError> {
        let mut url = registry.clone();
        url.path_segments_mut()
            .map_err(|_| RegistryError::InvalidResponse(format!("{} cannot be a base URL", registry)))?
            .pop_if_empty()
            .extend(["registry", slug, channel, "latest"]);
        Ok(url)
    }
}

#[async_trait]
impl VersionRegistry for HttpVersionRegistry {
    async fn latest_version(&self, slug: &str, channel: &str) -> Result<RegistryVersion, RegistryError> {
        if !CHANNELS.contains(&channel) {
            return Err(RegistryError::UnknownChannel(channel.to_string()));
        }

        for registry in &self.registries {
            let url = Self::latest_url(registry, slug, channel)?;
            debug!("Looking up {} on {}", slug, url);
            let res = self
                .client
                .get(url.clone())
                .send()
                .await
                .map_err(|e| RegistryError::Unreachable(format!("{}: {}", registry, e)))?;
            match res.status() {
                StatusCode::NOT_FOUND => continue,
                s if s.is_success() => {
                    let mut version: RegistryVersion = res
                        .json()
                        .await
                        .map_err(|e| RegistryError::InvalidResponse(e.to_string()))?;
                    if version.slug.is_empty() {
                        version.slug = slug.to_string();
                    }
                    return Ok(version);
                }
                s => return Err(RegistryError::Unreachable(format!("{} returned {}", url, s))),
            }
        }

        Err(RegistryError::NotFound {
            slug: slug.to_string(),
            channel: channel.to_string(),
        })
    }
}
