// Copyright (c) 2026 Cozy Cloud
// SPDX-License-Identifier: AGPL-3.0

//! Batch updater
//!
//! Updates every installed application of a type from its stored source,
//! a bounded number at a time. A failing update is logged and reported in
//! its outcome; the others carry on. Nothing is retried.

use futures::stream::{self, StreamExt};
use tracing::{info, warn};

use crate::application::installer::{Installer, InstallerContext, InstallerOptions};
use crate::domain::app::AppType;
use crate::domain::errors::AppError;
use crate::domain::manifest::{AppManifest, Manifest};
use crate::domain::storage::Copier;

/// Result of updating one slug
#[derive(Debug)]
pub struct UpdateOutcome {
    pub slug: String,
    pub previous_version: String,
    pub result: Result<AppManifest, AppError>,
}

impl UpdateOutcome {
    pub fn is_success(&self) -> bool {
        self.result.is_ok()
    }

    /// New version, when the update installed one
    pub fn new_version(&self) -> Option<&str> {
        match &self.result {
            Ok(man) if man.version() != self.previous_version => Some(man.version()),
            _ => None,
        }
    }

    /// Version waiting for a permission acknowledgement
    pub fn pending_version(&self) -> Option<&str> {
        self.result
            .as_ref()
            .ok()
            .and_then(|man| man.doc().available_version.as_deref())
    }
}

/// Update every installed application of `app_type`
///
/// `new_copier` builds the storage target of each installer. Apps that are
/// not `Ready` or `Errored` come back as `BadState` outcomes.
pub async fn update_all<F>(
    context: &InstallerContext,
    app_type: AppType,
    new_copier: F,
    concurrency: usize,
    permissions_acked: bool,
) -> Result<Vec<UpdateOutcome>, AppError>
where
    F: Fn() -> Result<Box<dyn Copier>, AppError>,
{
    let installed = AppManifest::list(&context.manifests, app_type).await?;
    info!("Updating {} installed {}s", installed.len(), app_type);

    let new_copier = &new_copier;
    let outcomes: Vec<UpdateOutcome> = stream::iter(installed)
        .map(|man| async move {
            let slug = man.slug().to_string();
            let previous_version = man.version().to_string();
            let result = update_one(context, app_type, &slug, new_copier, permissions_acked).await;
            if let Err(e) = &result {
                warn!("Skipping {} {}: {}", app_type, slug, e);
            }
            UpdateOutcome {
                slug,
                previous_version,
                result,
            }
        })
        .buffer_unordered(concurrency.max(1))
        .collect()
        .await;

    let failed = outcomes.iter().filter(|o| !o.is_success()).count();
    info!("Updated {} {}s, {} failed", outcomes.len() - failed, app_type, failed);
    Ok(outcomes)
}

async fn update_one<F>(
    context: &InstallerContext,
    app_type: AppType,
    slug: &str,
    new_copier: &F,
    permissions_acked: bool,
) -> Result<AppManifest, AppError>
where
    F: Fn() -> Result<Box<dyn Copier>, AppError>,
{
    let opts = InstallerOptions::update(app_type, slug).with_permissions_acked(permissions_acked);
    let installer = Installer::new(context, new_copier()?, opts).await?;
    installer.run_sync().await
}
