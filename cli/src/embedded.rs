// Copyright (c) 2026 Cozy Cloud
// SPDX-License-Identifier: AGPL-3.0

//! Embedded installer services
//!
//! Builds the document store, permission store, scheduler, registry client
//! and copiers from the configuration, in-process, and drives installers
//! with a progress spinner.

use anyhow::{Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use cozy_apps_core::{
    application::{batch_updater, Installer, InstallerContext, InstallerOptions, UpdateOutcome},
    domain::{
        app::AppType,
        config::AppsConfigManifest,
        errors::AppError,
        manifest::{AppManifest, Manifest, ManifestContext},
        repository::DocumentStore,
        storage::Copier,
    },
    infrastructure::{
        copier::create_copier,
        fetcher::HttpClients,
        permissions::DocumentPermissionStore,
        registry_client::HttpVersionRegistry,
        repositories::{CouchDocumentStore, InMemoryDocumentStore},
        scheduler::InMemoryScheduler,
    },
};

pub struct EmbeddedInstaller {
    config: AppsConfigManifest,
    context: InstallerContext,
}

impl EmbeddedInstaller {
    pub fn new(config_path: Option<PathBuf>) -> Result<Self> {
        let config = AppsConfigManifest::load_or_default(config_path).context("Failed to load configuration")?;
        Self::from_config(config)
    }

    pub fn from_config(config: AppsConfigManifest) -> Result<Self> {
        config.validate().context("Configuration validation failed")?;
        let spec = &config.spec;

        let store: Arc<dyn DocumentStore> = match &spec.couchdb {
            Some(couchdb) => Arc::new(
                CouchDocumentStore::new(&couchdb.url)
                    .with_context(|| format!("Failed to connect to CouchDB at {}", couchdb.url))?,
            ),
            None => {
                warn!("No CouchDB configured: manifests are kept in memory for this run only");
                Arc::new(InMemoryDocumentStore::new())
            }
        };

        let clients = HttpClients::new(&spec.http).context("Failed to build HTTP clients")?;
        let registry = Arc::new(
            HttpVersionRegistry::from_urls(clients.manifest.clone(), &spec.registries)
                .context("Invalid registry configuration")?,
        );
        let manifests = ManifestContext::new(
            spec.domain.clone(),
            store.clone(),
            Arc::new(DocumentPermissionStore::new(store)),
            Arc::new(InMemoryScheduler::new()),
        );

        info!("Installer ready for {}", spec.domain);
        Ok(Self {
            context: InstallerContext::new(manifests, registry, clients),
            config,
        })
    }

    pub fn context(&self) -> &InstallerContext {
        &self.context
    }

    /// Storage target for one installer
    pub fn copier(&self, app_type: AppType) -> Result<Box<dyn Copier>> {
        let copier = create_copier(&self.config.spec.fs, app_type, self.context.clients.fetch.clone())
            .context("Failed to set up application storage")?;
        Ok(copier)
    }

    /// Run one operation to completion, reporting progress on the terminal
    pub async fn run(&self, opts: InstallerOptions) -> Result<AppManifest> {
        let copier = self.copier(opts.app_type)?;
        let slug = opts.slug.clone();
        let installer = Arc::new(Installer::new(&self.context, copier, opts).await?);

        let spinner = ProgressBar::new_spinner();
        spinner.set_style(ProgressStyle::with_template("{spinner} {msg}")?);
        spinner.enable_steady_tick(Duration::from_millis(100));
        spinner.set_message(format!("{} {}...", installer.operation(), slug));

        let runner = installer.clone();
        let handle = tokio::spawn(async move { runner.run().await });

        let outcome = loop {
            match installer.poll().await {
                Ok((man, true)) => break Ok(man),
                Ok((man, false)) => spinner.set_message(format!("{} {} ({})", slug, man.state(), man.version())),
                Err(e) => break Err(e),
            }
        };
        spinner.finish_and_clear();
        handle.await.context("Installer task failed")?;

        Ok(outcome?)
    }

    pub async fn show(&self, app_type: AppType, slug: &str) -> Result<AppManifest, AppError> {
        AppManifest::get_by_slug(&self.context.manifests, slug, app_type).await
    }

    pub async fn list(&self, app_type: AppType) -> Result<Vec<AppManifest>, AppError> {
        AppManifest::list(&self.context.manifests, app_type).await
    }

    pub async fn update_all(
        &self,
        app_type: AppType,
        concurrency: usize,
        permissions_acked: bool,
    ) -> Result<Vec<UpdateOutcome>> {
        let new_copier = || {
            create_copier(&self.config.spec.fs, app_type, self.context.clients.fetch.clone()).map_err(AppError::from)
        };
        let outcomes =
            batch_updater::update_all(&self.context, app_type, new_copier, concurrency, permissions_acked).await?;
        Ok(outcomes)
    }
}
