// Copyright (c) 2026 Cozy Cloud
// SPDX-License-Identifier: AGPL-3.0

//! Git Fetcher
//!
//! Sources: `git://`, `git+ssh://`, `ssh+git://`, `git+http://`,
//! `git+https://` and `git+file://`, with an optional `#branch` fragment
//! (default `HEAD`).
//!
//! # Manifest lookup
//!
//! Known hosts serve raw files over HTTPS:
//! - `github.com`: `https://raw.githubusercontent.com/<user>/<project>/<branch>/<file>`
//! - `gitlab.com`, `framagit.org`: `https://<host>/<user>/<project>/raw/<branch>/<file>`
//!
//! Other hosts get the file name appended to the repository path.
//! `git+file` repositories are read directly.
//!
//! # Payload
//!
//! The repository is cloned (shallow for network transports) into a
//! per-operation temporary directory removed afterwards. Cloning runs on the
//! blocking pool and is abandoned after a fixed timeout. The stored version
//! is `<declared version>-<commit hash>`; when the copier already holds that
//! version nothing is copied.

use async_trait::async_trait;
use bytes::Bytes;
use git2::build::RepoBuilder;
use git2::{FetchOptions, ObjectType, Repository, TreeWalkMode, TreeWalkResult};
use regex::Regex;
use reqwest::Client;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use std::time::Duration;
use tracing::{debug, info, warn};
use url::Url;
use uuid::Uuid;

use crate::domain::app::{AppType, MANIFEST_MAX_SIZE};
use crate::domain::errors::AppError;
use crate::domain::fetcher::Fetcher;
use crate::domain::manifest::{AppManifest, Manifest};
use crate::domain::storage::Copier;

/// Hard limit on the duration of a clone
pub const CLONE_TIMEOUT: Duration = Duration::from_secs(30);

/// URL schemes handled by this fetcher
pub const GIT_SCHEMES: &[&str] = &["git", "git+ssh", "ssh+git", "git+http", "git+https", "git+file"];

const SYMLINK_MODE: i32 = 0o120000;

fn github_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^/([^/]+)/([^/]+?)(?:\.git)?/?$").expect("github regex is valid"))
}

fn gitlab_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^/(.+)/([^/]+?)(?:\.git)?/?$").expect("gitlab regex is valid"))
}

/// Files of one commit
struct Checkout {
    commit: String,
    files: Vec<(String, Bytes)>,
}

pub struct GitFetcher {
    app_type: AppType,
    client: Client,
    clone_timeout: Duration,
}

impl GitFetcher {
    pub fn new(app_type: AppType, client: Client) -> Self {
        Self {
            app_type,
            client,
            clone_timeout: CLONE_TIMEOUT,
        }
    }

    #[cfg(test)]
    pub(crate) fn with_clone_timeout(mut self, timeout: Duration) -> Self {
        self.clone_timeout = timeout;
        self
    }

    /// Branch named by the URL fragment
    fn branch(src: &Url) -> Option<&str> {
        src.fragment().filter(|f| !f.is_empty())
    }

    /// HTTPS URL of a raw file in the repository, for network sources
    pub fn raw_file_url(src: &Url, filename: &str) -> Result<Url, AppError> {
        let host = src.host_str().ok_or(AppError::NotSupportedSource)?;
        let branch = Self::branch(src).unwrap_or("HEAD");
        let path = src.path();

        let raw = match host {
            "github.com" => {
                let caps = github_regex().captures(path).ok_or(AppError::NotSupportedSource)?;
                format!(
                    "https://raw.githubusercontent.com/{}/{}/{}/{}",
                    &caps[1], &caps[2], branch, filename
                )
            }
            "gitlab.com" | "framagit.org" => {
                let caps = gitlab_regex().captures(path).ok_or(AppError::NotSupportedSource)?;
                format!("https://{}/{}/{}/raw/{}/{}", host, &caps[1], &caps[2], branch, filename)
            }
            _ => {
                let scheme = if src.scheme() == "git+http" { "http" } else { "https" };
                let mut url = Url::parse(&format!("{}://{}", scheme, host))?;
                if let Some(port) = src.port() {
                    url.set_port(Some(port)).map_err(|_| AppError::NotSupportedSource)?;
                }
                url.set_path(&format!("{}/{}", path.trim_end_matches('/'), filename));
                return Ok(url);
            }
        };
        Ok(Url::parse(&raw)?)
    }

    /// URL handed to libgit2
    fn clone_url(src: &Url) -> String {
        let mut url = src.clone();
        url.set_fragment(None);
        let s = url.as_str();
        match src.scheme() {
            "git+ssh" | "ssh+git" => s.replacen(src.scheme(), "ssh", 1),
            "git+http" => s.replacen("git+http", "http", 1),
            "git+https" => s.replacen("git+https", "https", 1),
            "git+file" => url.path().to_string(),
            _ => s.to_string(),
        }
    }

    fn is_local(src: &Url) -> bool {
        src.scheme() == "git+file"
    }

    async fn fetch_local_manifest(&self, src: &Url) -> Result<Bytes, AppError> {
        let repo_path = PathBuf::from(src.path());
        let branch = Self::branch(src).map(str::to_string);
        let filename = self.app_type.manifest_filename();

        let read = tokio::task::spawn_blocking(move || -> Result<Vec<u8>, git2::Error> {
            let repo = Repository::open(&repo_path)?;
            let commit = resolve_commit(&repo, branch.as_deref())?;
            let entry = commit.tree()?.get_path(Path::new(filename))?;
            let blob = repo.find_blob(entry.id())?;
            Ok(blob.content().to_vec())
        })
        .await;

        match read {
            Ok(Ok(content)) => Ok(Bytes::from(content)),
            Ok(Err(e)) => {
                debug!("Cannot read {} from {}: {}", filename, src, e);
                Err(AppError::ManifestNotReachable)
            }
            Err(e) => {
                warn!("Manifest reader task failed: {}", e);
                Err(AppError::ManifestNotReachable)
            }
        }
    }

    async fn fetch_remote_manifest(&self, src: &Url) -> Result<Bytes, AppError> {
        let url = Self::raw_file_url(src, self.app_type.manifest_filename())?;
        debug!("Fetching manifest from {}", url);
        let res = self.client.get(url.clone()).send().await.map_err(|e| {
            debug!("Cannot reach {}: {}", url, e);
            AppError::ManifestNotReachable
        })?;
        if !res.status().is_success() {
            debug!("Manifest {} returned {}", url, res.status());
            return Err(AppError::ManifestNotReachable);
        }
        if res.content_length().is_some_and(|len| len as usize > MANIFEST_MAX_SIZE) {
            return Err(AppError::BadManifest("manifest is too large".to_string()));
        }
        res.bytes().await.map_err(|_| AppError::ManifestNotReachable)
    }

    /// Clone into a temporary directory and read the files of the checked out commit
    async fn checkout(&self, src: &Url) -> Result<Checkout, AppError> {
        let tmp_dir = std::env::temp_dir().join(format!("cozy-git-{}", Uuid::new_v4().simple()));
        let cleanup_dir = tmp_dir.clone();
        scopeguard::defer! {
            if cleanup_dir.exists() {
                if let Err(e) = std::fs::remove_dir_all(&cleanup_dir) {
                    warn!("Failed to remove {}: {}", cleanup_dir.display(), e);
                }
            }
        }

        let url = Self::clone_url(src);
        let branch = Self::branch(src).map(str::to_string);
        let shallow = !Self::is_local(src);
        debug!("Cloning {} (shallow: {})", url, shallow);

        let handle = tokio::task::spawn_blocking(move || -> Result<Checkout, git2::Error> {
            let mut fetch_options = FetchOptions::new();
            if shallow {
                fetch_options.depth(1);
            }
            let mut builder = RepoBuilder::new();
            builder.fetch_options(fetch_options);
            if let Some(branch) = branch.as_deref() {
                builder.branch(branch);
            }
            let repo = builder.clone(&url, &tmp_dir)?;
            let commit = resolve_commit(&repo, None)?;
            let files = read_tree(&repo, &commit.tree()?)?;
            Ok(Checkout {
                commit: commit.id().to_string(),
                files,
            })
        });

        match tokio::time::timeout(self.clone_timeout, handle).await {
            Err(_) => {
                warn!("Cloning {} timed out after {:?}", src, self.clone_timeout);
                Err(AppError::CloneTimeout)
            }
            Ok(Err(e)) => Err(AppError::Git(format!("clone task failed: {}", e))),
            Ok(Ok(Err(e))) => {
                warn!("Cannot clone {}: {}", src, e);
                Err(AppError::SourceNotReachable)
            }
            Ok(Ok(Ok(checkout))) => Ok(checkout),
        }
    }
}

/// Commit at a branch name, or at HEAD
fn resolve_commit<'r>(repo: &'r Repository, branch: Option<&str>) -> Result<git2::Commit<'r>, git2::Error> {
    let object = match branch {
        Some(branch) => repo
            .revparse_single(&format!("refs/heads/{}", branch))
            .or_else(|_| repo.revparse_single(branch))?,
        None => repo.revparse_single("HEAD")?,
    };
    object.peel_to_commit()
}

/// Every regular file of a tree, with its path
fn read_tree(repo: &Repository, tree: &git2::Tree<'_>) -> Result<Vec<(String, Bytes)>, git2::Error> {
    let mut files = Vec::new();
    let mut failure = None;
    tree.walk(TreeWalkMode::PreOrder, |root, entry| {
        if entry.kind() != Some(ObjectType::Blob) || entry.filemode() == SYMLINK_MODE {
            return TreeWalkResult::Ok;
        }
        let Some(name) = entry.name() else {
            return TreeWalkResult::Ok;
        };
        match repo.find_blob(entry.id()) {
            Ok(blob) => {
                files.push((format!("{}{}", root, name), Bytes::copy_from_slice(blob.content())));
                TreeWalkResult::Ok
            }
            Err(e) => {
                failure = Some(e);
                TreeWalkResult::Abort
            }
        }
    })?;
    match failure {
        Some(e) => Err(e),
        None => Ok(files),
    }
}

#[async_trait]
impl Fetcher for GitFetcher {
    async fn fetch_manifest(&self, src: &Url) -> Result<Bytes, AppError> {
        if Self::is_local(src) {
            self.fetch_local_manifest(src).await
        } else {
            self.fetch_remote_manifest(src).await
        }
    }

    async fn fetch(&self, src: &Url, copier: &mut dyn Copier, man: &mut AppManifest) -> Result<(), AppError> {
        let checkout = self.checkout(src).await?;

        let version = format!("{}-{}", man.version(), checkout.commit);
        man.set_version(version);
        info!("Fetched {} at {}", man.slug(), man.version());

        if copier.start(man.slug(), man.version()).await? {
            info!("{} {} is already stored, skipping copy", man.slug(), man.version());
            return Ok(());
        }
        for (name, content) in checkout.files {
            copier.copy(&name, content).await?;
        }
        copier.close().await?;
        Ok(())
    }
}
