// Copyright (c) 2026 Cozy Cloud
// SPDX-License-Identifier: AGPL-3.0

//! Swift Object Storage Copier
//!
//! Stores application files as objects `<slug>/<version>/<name>` in a Swift
//! container, using the Swift REST API with a pre-issued auth token.
//!
//! # API Calls
//!
//! - `HEAD /<container>/<slug>/<version>` - Is this version already stored?
//! - `HEAD /<container>` then `PUT /<container>` - Create the container if absent
//! - `PUT /<container>/<slug>/<version>` - Zero-byte version marker
//! - `PUT /<container>/<slug>/<version>/<name>` - One object per file
//! - `DELETE /<container>/<slug>/<version>` - Remove the marker after a failed copy
//!
//! The marker cleanup is attempted once; if it fails the version looks
//! installed while some of its files are missing.

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::{Client, StatusCode};
use tracing::{debug, warn};
use url::Url;

use crate::domain::storage::{Copier, CopierError};
use crate::infrastructure::copier::local::safe_relative_path;

pub const WEBAPPS_CONTAINER: &str = "apps-web";
pub const KONNECTORS_CONTAINER: &str = "apps-konnectors";

const AUTH_HEADER: &str = "X-Auth-Token";

struct Session {
    slug: String,
    version: String,
}

/// Swift copier
pub struct SwiftCopier {
    client: Client,

    /// Storage URL of the account (e.g., "https://swift.example/v1/AUTH_cozy")
    storage_url: Url,

    token: String,

    container: String,

    session: Option<Session>,
}

impl SwiftCopier {
    pub fn new(client: Client, storage_url: Url, token: impl Into<String>, container: impl Into<String>) -> Self {
        Self {
            client,
            storage_url,
            token: token.into(),
            container: container.into(),
            session: None,
        }
    }

    pub fn container(&self) -> &str {
        &self.container
    }

    fn object_url<'a>(&self, parts: impl IntoIterator<Item = &'a str>) -> Result<Url, CopierError> {
        let mut url = self.storage_url.clone();
        {
            let mut segments = url
                .path_segments_mut()
                .map_err(|_| CopierError::Unknown("Swift storage URL cannot be a base".to_string()))?;
            segments.pop_if_empty();
            segments.push(&self.container);
            for part in parts {
                segments.extend(part.split('/').filter(|s| !s.is_empty()));
            }
        }
        Ok(url)
    }

    async fn head(&self, url: Url) -> Result<StatusCode, CopierError> {
        let res = self.client.head(url).header(AUTH_HEADER, &self.token).send().await?;
        Ok(res.status())
    }

    async fn put(&self, url: Url, body: Bytes, content_type: &str) -> Result<(), CopierError> {
        let res = self
            .client
            .put(url.clone())
            .header(AUTH_HEADER, &self.token)
            .header(reqwest::header::CONTENT_TYPE, content_type)
            .body(body)
            .send()
            .await?;
        match res.status() {
            s if s.is_success() => Ok(()),
            status => Err(CopierError::Network(format!("PUT {} returned {}", url.path(), status))),
        }
    }

    async fn ensure_container(&self) -> Result<(), CopierError> {
        let url = self.object_url(std::iter::empty::<&str>())?;
        match self.head(url.clone()).await? {
            s if s.is_success() => Ok(()),
            StatusCode::NOT_FOUND => {
                debug!("Creating Swift container {}", self.container);
                self.put(url, Bytes::new(), "text/plain").await
            }
            status => Err(CopierError::Network(format!(
                "HEAD container {} returned {}",
                self.container, status
            ))),
        }
    }

    /// Best-effort removal of the version marker
    async fn delete_marker(&self, slug: &str, version: &str) {
        let url = match self.object_url([slug, version]) {
            Ok(url) => url,
            Err(e) => {
                warn!("Cannot build marker URL for {}/{}: {}", slug, version, e);
                return;
            }
        };
        match self.client.delete(url).header(AUTH_HEADER, &self.token).send().await {
            Ok(res) if res.status().is_success() || res.status() == StatusCode::NOT_FOUND => {
                debug!("Removed marker {}/{}", slug, version);
            }
            Ok(res) => warn!("Failed to remove marker {}/{}: {}", slug, version, res.status()),
            Err(e) => warn!("Failed to remove marker {}/{}: {}", slug, version, e),
        }
    }
}

#[async_trait]
impl Copier for SwiftCopier {
    async fn start(&mut self, slug: &str, version: &str) -> Result<bool, CopierError> {
        let marker = self.object_url([slug, version])?;
        match self.head(marker.clone()).await? {
            s if s.is_success() => return Ok(true),
            StatusCode::NOT_FOUND => {}
            status => {
                return Err(CopierError::Network(format!(
                    "HEAD {}/{} returned {}",
                    slug, version, status
                )))
            }
        }

        self.ensure_container().await?;
        self.put(marker, Bytes::new(), "text/plain").await?;

        self.session = Some(Session {
            slug: slug.to_string(),
            version: version.to_string(),
        });
        Ok(false)
    }

    async fn copy(&mut self, name: &str, content: Bytes) -> Result<(), CopierError> {
        let (slug, version) = match &self.session {
            Some(session) => (session.slug.clone(), session.version.clone()),
            None => return Err(CopierError::NotStarted),
        };

        let result = match safe_relative_path(name) {
            Ok(relative) => {
                let name = relative.to_string_lossy().replace('\\', "/");
                match self.object_url([slug.as_str(), version.as_str(), name.as_str()]) {
                    Ok(url) => self.put(url, content, "application/octet-stream").await,
                    Err(e) => Err(e),
                }
            }
            Err(e) => Err(e),
        };

        if result.is_err() {
            self.delete_marker(&slug, &version).await;
            self.session = None;
        }
        result
    }

    async fn close(&mut self) -> Result<(), CopierError> {
        if let Some(session) = self.session.take() {
            debug!("Stored {}/{} in {}", session.slug, session.version, self.container);
        }
        Ok(())
    }
}
