// Copyright (c) 2026 Cozy Cloud
// SPDX-License-Identifier: AGPL-3.0

//! Application manifests
//!
//! A manifest is the persisted document describing an installed application.
//! Webapps and konnectors share the [`Manifest`] capability set and are
//! carried around as the [`AppManifest`] sum type.
//!
//! `create`, `update` and `delete` write the document first and then the
//! permission set. A failing permission write is returned to the caller but
//! does not roll back the document write.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::domain::app::{manifest_id, AppState, AppType, MANIFEST_MAX_SIZE};
use crate::domain::errors::AppError;
use crate::domain::konnector::KonnectorManifest;
use crate::domain::permission::{PermissionSet, PermissionStore};
use crate::domain::repository::{Document, DocumentStore, RepositoryError};
use crate::domain::trigger::Scheduler;
use crate::domain::webapp::WebappManifest;

/// Handles a manifest needs to persist itself and its side effects
#[derive(Clone)]
pub struct ManifestContext {
    /// Instance domain, used as database prefix and trigger domain
    pub db: String,
    pub store: Arc<dyn DocumentStore>,
    pub permissions: Arc<dyn PermissionStore>,
    pub scheduler: Arc<dyn Scheduler>,
}

impl ManifestContext {
    pub fn new(
        db: impl Into<String>,
        store: Arc<dyn DocumentStore>,
        permissions: Arc<dyn PermissionStore>,
        scheduler: Arc<dyn Scheduler>,
    ) -> Self {
        Self {
            db: db.into(),
            store,
            permissions,
            scheduler,
        }
    }
}

/// Fields shared by every manifest document
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ManifestDoc {
    #[serde(rename = "_id", default, skip_serializing_if = "String::is_empty")]
    pub doc_id: String,

    #[serde(rename = "_rev", default, skip_serializing_if = "Option::is_none")]
    pub doc_rev: Option<String>,

    #[serde(default)]
    pub slug: String,

    #[serde(default)]
    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub editor: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub developer: Option<serde_json::Value>,

    #[serde(default)]
    pub version: String,

    /// Version waiting for its permissions to be acknowledged
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub available_version: Option<String>,

    #[serde(default)]
    pub source: String,

    #[serde(default)]
    pub state: AppState,

    /// Last error, only set when `state` is `Errored`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    #[serde(default)]
    pub permissions: PermissionSet,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl ManifestDoc {
    pub fn set_state(&mut self, state: AppState) {
        self.state = state;
        if state != AppState::Errored {
            self.error = None;
        }
    }

    pub fn set_error(&mut self, err: &AppError) {
        self.state = AppState::Errored;
        self.error = Some(err.to_string());
    }

    /// Carry identity over from the installed document into a freshly parsed one
    pub(crate) fn inherit(&mut self, app_type: AppType, previous: &ManifestDoc, slug: &str, source_url: &str) {
        self.doc_id = manifest_id(app_type, slug);
        self.doc_rev = previous.doc_rev.clone();
        self.slug = slug.to_string();
        self.source = source_url.to_string();
        self.created_at = previous.created_at;
        self.state = previous.state;
        self.error = None;
    }
}

/// Capability set common to webapp and konnector manifests
#[async_trait]
pub trait Manifest: Document + Sized {
    fn app_type(&self) -> AppType;
    fn doc(&self) -> &ManifestDoc;
    fn doc_mut(&mut self) -> &mut ManifestDoc;

    fn slug(&self) -> &str {
        &self.doc().slug
    }

    fn source(&self) -> &str {
        &self.doc().source
    }

    fn set_source(&mut self, source: String) {
        self.doc_mut().source = source;
    }

    fn version(&self) -> &str {
        &self.doc().version
    }

    fn set_version(&mut self, version: String) {
        self.doc_mut().version = version;
    }

    fn state(&self) -> AppState {
        self.doc().state
    }

    fn set_state(&mut self, state: AppState) {
        self.doc_mut().set_state(state);
    }

    fn error(&self) -> Option<&str> {
        self.doc().error.as_deref()
    }

    /// Mark the manifest `Errored` with the error text attached
    fn set_error(&mut self, err: &AppError) {
        self.doc_mut().set_error(err);
    }

    fn permissions(&self) -> &PermissionSet {
        &self.doc().permissions
    }

    fn set_available_version(&mut self, version: Option<String>) {
        self.doc_mut().available_version = version;
    }

    /// Parse a manifest fetched from the application source
    ///
    /// The result keeps the id, revision and creation date of `self`.
    fn read_manifest(&self, data: &[u8], slug: &str, source_url: &str) -> Result<Self, AppError>;

    /// Persist a new document and create its permission set
    async fn create(&mut self, ctx: &ManifestContext) -> Result<(), AppError>;

    /// Persist the document at its current revision and update its permission set
    async fn update(&mut self, ctx: &ManifestContext) -> Result<(), AppError>;

    /// Remove the document and tear down its permission set
    async fn delete(&self, ctx: &ManifestContext) -> Result<(), AppError>;

    /// Persist only the document, creating it when it has no revision yet
    async fn save_state(&mut self, ctx: &ManifestContext) -> Result<(), AppError> {
        self.doc_mut().updated_at = Some(Utc::now());
        if self.rev().is_some() {
            ctx.store.update_doc(&ctx.db, self).await?;
        } else {
            ctx.store.create_named_doc(&ctx.db, self).await?;
        }
        Ok(())
    }
}

/// Reject oversized manifests before parsing them
pub(crate) fn check_manifest_size(data: &[u8]) -> Result<(), AppError> {
    if data.len() > MANIFEST_MAX_SIZE {
        return Err(AppError::BadManifest(format!(
            "manifest is larger than {} bytes",
            MANIFEST_MAX_SIZE
        )));
    }
    Ok(())
}

/// A webapp or konnector manifest
#[derive(Debug, Clone, PartialEq)]
pub enum AppManifest {
    Webapp(WebappManifest),
    Konnector(KonnectorManifest),
}

macro_rules! dispatch {
    ($self:expr, $m:ident => $body:expr) => {
        match $self {
            AppManifest::Webapp($m) => $body,
            AppManifest::Konnector($m) => $body,
        }
    };
}

impl AppManifest {
    /// Blank manifest for a slug about to be installed
    pub fn new(app_type: AppType, slug: &str) -> Self {
        let doc = ManifestDoc {
            doc_id: manifest_id(app_type, slug),
            slug: slug.to_string(),
            ..Default::default()
        };
        match app_type {
            AppType::Webapp => AppManifest::Webapp(WebappManifest::with_doc(doc)),
            AppType::Konnector => AppManifest::Konnector(KonnectorManifest::with_doc(doc)),
        }
    }

    /// Load the installed manifest of a slug
    pub async fn get_by_slug(ctx: &ManifestContext, slug: &str, app_type: AppType) -> Result<Self, AppError> {
        let id = manifest_id(app_type, slug);
        let json = match ctx.store.get_doc(&ctx.db, app_type.doctype(), &id).await {
            Ok(json) => json,
            Err(RepositoryError::NotFound(_)) => return Err(AppError::NotFound),
            Err(e) => return Err(e.into()),
        };
        Self::from_json(app_type, json)
    }

    /// List every installed manifest of a type
    pub async fn list(ctx: &ManifestContext, app_type: AppType) -> Result<Vec<Self>, AppError> {
        let docs = ctx.store.all_docs(&ctx.db, app_type.doctype()).await?;
        docs.into_iter().map(|json| Self::from_json(app_type, json)).collect()
    }

    pub fn from_json(app_type: AppType, json: serde_json::Value) -> Result<Self, AppError> {
        let manifest = match app_type {
            AppType::Webapp => AppManifest::Webapp(
                serde_json::from_value(json).map_err(|e| AppError::BadManifest(e.to_string()))?,
            ),
            AppType::Konnector => AppManifest::Konnector(
                serde_json::from_value(json).map_err(|e| AppError::BadManifest(e.to_string()))?,
            ),
        };
        Ok(manifest)
    }

    pub fn as_webapp(&self) -> Option<&WebappManifest> {
        match self {
            AppManifest::Webapp(m) => Some(m),
            AppManifest::Konnector(_) => None,
        }
    }

    pub fn as_konnector(&self) -> Option<&KonnectorManifest> {
        match self {
            AppManifest::Konnector(m) => Some(m),
            AppManifest::Webapp(_) => None,
        }
    }
}

impl Document for AppManifest {
    fn doc_type(&self) -> &str {
        dispatch!(self, m => m.doc_type())
    }

    fn id(&self) -> &str {
        dispatch!(self, m => m.id())
    }

    fn rev(&self) -> Option<&str> {
        dispatch!(self, m => m.rev())
    }

    fn set_rev(&mut self, rev: String) {
        dispatch!(self, m => m.set_rev(rev))
    }

    fn to_json(&self) -> Result<serde_json::Value, RepositoryError> {
        dispatch!(self, m => m.to_json())
    }
}

#[async_trait]
impl Manifest for AppManifest {
    fn app_type(&self) -> AppType {
        dispatch!(self, m => m.app_type())
    }

    fn doc(&self) -> &ManifestDoc {
        dispatch!(self, m => m.doc())
    }

    fn doc_mut(&mut self) -> &mut ManifestDoc {
        dispatch!(self, m => m.doc_mut())
    }

    fn read_manifest(&self, data: &[u8], slug: &str, source_url: &str) -> Result<Self, AppError> {
        match self {
            AppManifest::Webapp(m) => m.read_manifest(data, slug, source_url).map(AppManifest::Webapp),
            AppManifest::Konnector(m) => m.read_manifest(data, slug, source_url).map(AppManifest::Konnector),
        }
    }

    async fn create(&mut self, ctx: &ManifestContext) -> Result<(), AppError> {
        dispatch!(self, m => m.create(ctx).await)
    }

    async fn update(&mut self, ctx: &ManifestContext) -> Result<(), AppError> {
        dispatch!(self, m => m.update(ctx).await)
    }

    async fn delete(&self, ctx: &ManifestContext) -> Result<(), AppError> {
        dispatch!(self, m => m.delete(ctx).await)
    }
}
