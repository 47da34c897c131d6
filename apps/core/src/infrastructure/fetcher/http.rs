// Copyright (c) 2026 Cozy Cloud
// SPDX-License-Identifier: AGPL-3.0

//! HTTP Tarball Fetcher
//!
//! Sources such as `https://example.org/mini-1.0.0.tar.gz#<sha256hex>`. The
//! archive is a tar stream, gzipped or not (detected from `Content-Type`,
//! then by sniffing the payload). The manifest may sit at any depth; its
//! directory becomes the prefix stripped from every copied file.
//!
//! The archive is downloaded once by `fetch_manifest` and kept for `fetch`.

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use flate2::read::GzDecoder;
use parking_lot::Mutex;
use reqwest::Client;
use sha2::{Digest, Sha256};
use std::io::Read;
use tracing::{debug, info, warn};
use url::Url;

use crate::domain::app::AppType;
use crate::domain::errors::AppError;
use crate::domain::fetcher::Fetcher;
use crate::domain::manifest::{AppManifest, Manifest};
use crate::domain::storage::Copier;

const GZIP_CONTENT_TYPES: &[&str] = &[
    "application/gzip",
    "application/x-gzip",
    "application/x-tgz",
    "application/tar+gzip",
];

/// Upper bound for a downloaded archive and for its unpacked content
pub(crate) const MAX_ARCHIVE_SIZE: u64 = 512 * 1024 * 1024;

/// A regular file read from an archive
#[derive(Debug, Clone)]
pub(crate) struct ArchiveEntry {
    pub path: String,
    pub content: Bytes,
}

/// A downloaded and unpacked application archive
#[derive(Debug, Clone)]
pub(crate) struct Archive {
    pub entries: Vec<ArchiveEntry>,
}

impl Archive {
    /// Unpack a tar stream, gunzipping it first when needed
    pub fn unpack(data: &[u8], content_type: Option<&str>) -> Result<Self, AppError> {
        Self::unpack_with_limit(data, content_type, MAX_ARCHIVE_SIZE)
    }

    /// Unpack at most `limit` bytes of file content
    ///
    /// Sizes declared in tar headers are not trusted: an entry announcing
    /// more than what is left of the limit is rejected before it is read.
    pub fn unpack_with_limit(data: &[u8], content_type: Option<&str>, limit: u64) -> Result<Self, AppError> {
        let gzipped = is_gzip(content_type, data);
        let reader: Box<dyn Read + '_> = if gzipped {
            Box::new(GzDecoder::new(data))
        } else {
            Box::new(data)
        };

        let mut archive = tar::Archive::new(reader);
        let mut entries = Vec::new();
        let mut remaining = limit;
        for entry in archive.entries()? {
            let mut entry = entry?;
            if !entry.header().entry_type().is_file() {
                continue;
            }
            let path = entry.path()?.to_string_lossy().to_string();
            let path = path.trim_start_matches("./").to_string();
            if entry.size() > remaining {
                warn!("Archive entry {} declares {} bytes, over the limit", path, entry.size());
                return Err(AppError::BadManifest(format!("archive entry {} is too large", path)));
            }
            let mut content = Vec::new();
            (&mut entry).take(remaining + 1).read_to_end(&mut content)?;
            if content.len() as u64 > remaining {
                return Err(AppError::BadManifest("archive is too large".to_string()));
            }
            remaining -= content.len() as u64;
            entries.push(ArchiveEntry {
                path,
                content: Bytes::from(content),
            });
        }
        debug!("Unpacked {} files (gzip: {})", entries.len(), gzipped);
        Ok(Self { entries })
    }

    /// First entry named `filename`, with the directory prefix it sits in
    pub fn find_manifest(&self, filename: &str) -> Option<(String, Bytes)> {
        self.entries.iter().find_map(|entry| {
            let (dir, name) = match entry.path.rsplit_once('/') {
                Some((dir, name)) => (format!("{}/", dir), name),
                None => (String::new(), entry.path.as_str()),
            };
            (name == filename).then(|| (dir, entry.content.clone()))
        })
    }

    /// Copy every file under `prefix` into the copier, without the prefix
    pub async fn copy_to(&self, prefix: &str, copier: &mut dyn Copier) -> Result<usize, AppError> {
        let mut copied = 0;
        for entry in &self.entries {
            let Some(name) = entry.path.strip_prefix(prefix) else {
                continue;
            };
            if name.is_empty() {
                continue;
            }
            copier.copy(name, entry.content.clone()).await?;
            copied += 1;
        }
        Ok(copied)
    }
}

pub(crate) fn is_gzip(content_type: Option<&str>, data: &[u8]) -> bool {
    if let Some(content_type) = content_type {
        let mime = content_type.split(';').next().unwrap_or("").trim().to_ascii_lowercase();
        if GZIP_CONTENT_TYPES.contains(&mime.as_str()) {
            return true;
        }
        if mime == "application/x-tar" || mime == "application/tar" {
            return false;
        }
    }
    matches!(infer::get(data), Some(kind) if kind.mime_type() == "application/gzip")
}

/// Compare the sha256 of `data` with a hex digest
pub(crate) fn verify_checksum(data: &[u8], expected: &str) -> Result<(), AppError> {
    let digest = hex::encode(Sha256::digest(data));
    if !digest.eq_ignore_ascii_case(expected.trim()) {
        warn!("Checksum mismatch: expected {}, got {}", expected, digest);
        return Err(AppError::BadChecksum);
    }
    Ok(())
}

/// Download a source archive of at most `max_size` bytes
///
/// Returns the body and its `Content-Type`. Transport failures, non success
/// statuses and oversized bodies are reported as `SourceNotReachable`.
pub(crate) async fn download(client: &Client, url: &Url, max_size: u64) -> Result<(Bytes, Option<String>), AppError> {
    let mut url = url.clone();
    url.set_fragment(None);

    let mut res = client.get(url.clone()).send().await.map_err(|e| {
        warn!("Cannot download {}: {}", url, e);
        AppError::SourceNotReachable
    })?;
    if !res.status().is_success() {
        warn!("Cannot download {}: status {}", url, res.status());
        return Err(AppError::SourceNotReachable);
    }
    let content_type = res
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    if res.content_length().is_some_and(|len| len > max_size) {
        warn!("Cannot download {}: body is over {} bytes", url, max_size);
        return Err(AppError::SourceNotReachable);
    }

    let mut body = BytesMut::new();
    while let Some(chunk) = res.chunk().await.map_err(|_| AppError::SourceNotReachable)? {
        if (body.len() + chunk.len()) as u64 > max_size {
            warn!("Cannot download {}: body is over {} bytes", url, max_size);
            return Err(AppError::SourceNotReachable);
        }
        body.extend_from_slice(&chunk);
    }
    let body = body.freeze();
    debug!("Downloaded {} ({} bytes)", url, body.len());
    Ok((body, content_type))
}

/// Download, verify and unpack an archive
pub(crate) async fn fetch_archive(client: &Client, url: &Url, sha256: Option<&str>) -> Result<Archive, AppError> {
    let (body, content_type) = download(client, url, MAX_ARCHIVE_SIZE).await?;
    if let Some(expected) = sha256.filter(|s| !s.is_empty()) {
        verify_checksum(&body, expected)?;
    }
    Archive::unpack(&body, content_type.as_deref())
}

/// Start the copier, copy the archive under `prefix`, close it
pub(crate) async fn store_archive(
    archive: &Archive,
    prefix: &str,
    copier: &mut dyn Copier,
    man: &AppManifest,
) -> Result<(), AppError> {
    if copier.start(man.slug(), man.version()).await? {
        info!("{} {} is already stored, skipping copy", man.slug(), man.version());
        return Ok(());
    }
    let copied = archive.copy_to(prefix, copier).await?;
    copier.close().await?;
    debug!("Copied {} files of {} {}", copied, man.slug(), man.version());
    Ok(())
}

struct Cached {
    url: Url,
    archive: Archive,
    prefix: String,
}

pub struct HttpFetcher {
    app_type: AppType,
    client: Client,
    cached: Mutex<Option<Cached>>,
}

impl HttpFetcher {
    pub fn new(app_type: AppType, client: Client) -> Self {
        Self {
            app_type,
            client,
            cached: Mutex::new(None),
        }
    }

    fn checksum(src: &Url) -> Option<&str> {
        src.fragment().filter(|f| !f.is_empty())
    }

    async fn load(&self, src: &Url) -> Result<(Archive, String), AppError> {
        let cached = self
            .cached
            .lock()
            .as_ref()
            .filter(|c| &c.url == src)
            .map(|c| (c.archive.clone(), c.prefix.clone()));
        if let Some(loaded) = cached {
            return Ok(loaded);
        }

        let archive = fetch_archive(&self.client, src, Self::checksum(src)).await?;
        let prefix = archive
            .find_manifest(self.app_type.manifest_filename())
            .map(|(prefix, _)| prefix)
            .unwrap_or_default();
        *self.cached.lock() = Some(Cached {
            url: src.clone(),
            archive: archive.clone(),
            prefix: prefix.clone(),
        });
        Ok((archive, prefix))
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch_manifest(&self, src: &Url) -> Result<Bytes, AppError> {
        let (archive, _) = match self.load(src).await {
            Ok(loaded) => loaded,
            Err(e @ (AppError::BadChecksum | AppError::BadManifest(_))) => return Err(e),
            Err(e) => {
                debug!("Manifest of {} not reachable: {}", src, e);
                return Err(AppError::ManifestNotReachable);
            }
        };
        archive
            .find_manifest(self.app_type.manifest_filename())
            .map(|(_, content)| content)
            .ok_or(AppError::ManifestNotReachable)
    }

    async fn fetch(&self, src: &Url, copier: &mut dyn Copier, man: &mut AppManifest) -> Result<(), AppError> {
        let (archive, prefix) = self.load(src).await?;
        store_archive(&archive, &prefix, copier, man).await
    }
}
