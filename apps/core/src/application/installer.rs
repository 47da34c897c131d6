// Copyright (c) 2026 Cozy Cloud
// SPDX-License-Identifier: AGPL-3.0

//! Installer
//!
//! Drives one install, update or delete of a webapp or konnector.
//!
//! [`Installer::new`] validates the request and resolves the fetcher from the
//! source scheme; validation errors are returned there, before any work
//! starts. [`Installer::run`] performs the whole operation and reports
//! progress on two channels:
//!
//! - manifest snapshots (capacity 2): the intermediate `Installing` /
//!   `Upgrading` snapshot, then the terminal one
//! - the terminal error (capacity 1)
//!
//! [`Installer::poll`] waits on both channels. Callers usually spawn `run` on
//! an `Arc<Installer>` and poll from their own task, or call
//! [`Installer::run_sync`].
//!
//! # Failures
//!
//! Any error met during `run` marks the manifest `Errored`, persists it on a
//! best-effort basis and is reported once. `BadState` is reported without
//! touching the manifest.
//!
//! # Concurrency
//!
//! Two installers targeting the same slug are only kept apart by the
//! document store revision check.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, error, info, warn};
use url::Url;

use crate::domain::app::{validate_slug, AppState, AppType, Operation};
use crate::domain::errors::AppError;
use crate::domain::events::AppEvent;
use crate::domain::fetcher::Fetcher;
use crate::domain::manifest::{AppManifest, Manifest, ManifestContext};
use crate::domain::registry::VersionRegistry;
use crate::domain::storage::Copier;
use crate::infrastructure::copier::TarCopier;
use crate::infrastructure::event_bus::EventBus;
use crate::infrastructure::fetcher::{select_fetcher, HttpClients};

const MANIFEST_CHANNEL_CAPACITY: usize = 2;
const ERROR_CHANNEL_CAPACITY: usize = 1;

/// Sources whose published version is known before downloading the payload
const VERSIONED_SCHEMES: &[&str] = &["registry", "http", "https"];

/// Handles shared by every installer of an instance
#[derive(Clone)]
pub struct InstallerContext {
    pub manifests: ManifestContext,
    pub registry: Arc<dyn VersionRegistry>,
    pub clients: HttpClients,
    pub events: EventBus,
}

impl InstallerContext {
    pub fn new(manifests: ManifestContext, registry: Arc<dyn VersionRegistry>, clients: HttpClients) -> Self {
        Self {
            manifests,
            registry,
            clients,
            events: EventBus::with_default_capacity(),
        }
    }

    pub fn with_events(mut self, events: EventBus) -> Self {
        self.events = events;
        self
    }
}

/// What an installer is asked to do
#[derive(Debug, Clone)]
pub struct InstallerOptions {
    pub app_type: AppType,
    pub operation: Operation,
    pub slug: String,
    /// Required to install; update falls back on the stored source
    pub source_url: Option<String>,
    /// Accept permissions added or changed by an update
    pub permissions_acked: bool,
}

impl InstallerOptions {
    pub fn install(app_type: AppType, slug: impl Into<String>, source_url: impl Into<String>) -> Self {
        Self {
            app_type,
            operation: Operation::Install,
            slug: slug.into(),
            source_url: Some(source_url.into()),
            permissions_acked: true,
        }
    }

    pub fn update(app_type: AppType, slug: impl Into<String>) -> Self {
        Self {
            app_type,
            operation: Operation::Update,
            slug: slug.into(),
            source_url: None,
            permissions_acked: false,
        }
    }

    pub fn delete(app_type: AppType, slug: impl Into<String>) -> Self {
        Self {
            app_type,
            operation: Operation::Delete,
            slug: slug.into(),
            source_url: None,
            permissions_acked: false,
        }
    }

    pub fn with_source(mut self, source_url: impl Into<String>) -> Self {
        self.source_url = Some(source_url.into());
        self
    }

    pub fn with_permissions_acked(mut self, acked: bool) -> Self {
        self.permissions_acked = acked;
        self
    }
}

/// Mutable state of a run
struct RunState {
    man: AppManifest,
    copier: Box<dyn Copier>,
}

struct Senders {
    manc: mpsc::Sender<AppManifest>,
    errc: mpsc::Sender<AppError>,
}

pub struct Installer {
    operation: Operation,
    app_type: AppType,
    slug: String,
    src: Option<Url>,
    fetcher: Option<Box<dyn Fetcher>>,
    ctx: ManifestContext,
    events: EventBus,
    permissions_acked: bool,

    started: AtomicBool,
    state: Mutex<RunState>,
    senders: parking_lot::Mutex<Option<Senders>>,
    manc: Mutex<mpsc::Receiver<AppManifest>>,
    errc: Mutex<mpsc::Receiver<AppError>>,
}

impl Installer {
    /// Validate a request and prepare its installer
    ///
    /// Konnector payloads are bundled into one archive before reaching
    /// `copier`.
    pub async fn new(
        context: &InstallerContext,
        copier: Box<dyn Copier>,
        opts: InstallerOptions,
    ) -> Result<Self, AppError> {
        validate_slug(&opts.slug)?;
        let requested_source = opts.source_url.filter(|s| !s.is_empty());
        if opts.operation == Operation::Install && requested_source.is_none() {
            return Err(AppError::MissingSource);
        }

        let ctx = &context.manifests;
        let installed = match AppManifest::get_by_slug(ctx, &opts.slug, opts.app_type).await {
            Ok(man) => Some(man),
            Err(AppError::NotFound) => None,
            Err(e) => return Err(e),
        };

        let (man, source) = match (opts.operation, installed) {
            (Operation::Install, Some(_)) => return Err(AppError::AlreadyExists),
            (Operation::Install, None) => (AppManifest::new(opts.app_type, &opts.slug), requested_source),
            (_, None) => return Err(AppError::NotFound),
            (Operation::Update, Some(man)) => {
                let source = requested_source.or_else(|| Some(man.source().to_string()).filter(|s| !s.is_empty()));
                if source.is_none() {
                    return Err(AppError::MissingSource);
                }
                (man, source)
            }
            (Operation::Delete, Some(man)) => (man, None),
        };

        let (src, fetcher) = match source {
            Some(source) => {
                let src = Url::parse(&source)?;
                let fetcher = select_fetcher(&src, opts.app_type, &context.clients, context.registry.clone())?;
                (Some(src), Some(fetcher))
            }
            None => (None, None),
        };

        let copier: Box<dyn Copier> = match opts.app_type {
            AppType::Konnector => Box::new(TarCopier::new(copier)),
            AppType::Webapp => copier,
        };

        let (manc_tx, manc_rx) = mpsc::channel(MANIFEST_CHANNEL_CAPACITY);
        let (errc_tx, errc_rx) = mpsc::channel(ERROR_CHANNEL_CAPACITY);

        debug!(
            "Prepared {} of {} {} from {}",
            opts.operation,
            opts.app_type,
            opts.slug,
            src.as_ref().map(Url::as_str).unwrap_or("-")
        );

        Ok(Self {
            operation: opts.operation,
            app_type: opts.app_type,
            slug: opts.slug,
            src,
            fetcher,
            ctx: ctx.clone(),
            events: context.events.clone(),
            permissions_acked: opts.permissions_acked,
            started: AtomicBool::new(false),
            state: Mutex::new(RunState { man, copier }),
            senders: parking_lot::Mutex::new(Some(Senders {
                manc: manc_tx,
                errc: errc_tx,
            })),
            manc: Mutex::new(manc_rx),
            errc: Mutex::new(errc_rx),
        })
    }

    pub fn slug(&self) -> &str {
        &self.slug
    }

    pub fn operation(&self) -> Operation {
        self.operation
    }

    pub fn app_type(&self) -> AppType {
        self.app_type
    }

    /// Manifest of the run, once it is over
    pub async fn manifest(&self) -> AppManifest {
        self.state.lock().await.man.clone()
    }

    /// Perform the operation, reporting progress on the poll channels
    ///
    /// Only the first call does anything.
    pub async fn run(&self) {
        if self.started.swap(true, Ordering::SeqCst) {
            warn!("Installer for {} already ran", self.slug);
            return;
        }
        let senders = self.senders.lock().take();
        let Some(senders) = senders else {
            return;
        };

        info!("Starting {} of {} {}", self.operation, self.app_type, self.slug);
        let mut state = self.state.lock().await;
        let result = match self.operation {
            Operation::Install => self.install(&mut state, &senders).await,
            Operation::Update => self.update(&mut state, &senders).await,
            Operation::Delete => self.delete(&mut state, &senders).await,
        };

        match result {
            Ok(()) => info!(
                "Finished {} of {} {} (version {})",
                self.operation,
                self.app_type,
                self.slug,
                state.man.version()
            ),
            Err(err) => self.fail(&mut state, err, &senders).await,
        }
    }

    /// Wait for the next manifest snapshot or the terminal error
    ///
    /// Returns the snapshot and whether the operation is done.
    pub async fn poll(&self) -> Result<(AppManifest, bool), AppError> {
        let mut manc = self.manc.lock().await;
        let mut errc = self.errc.lock().await;
        tokio::select! {
            biased;
            Some(man) = manc.recv() => {
                let done = self.is_done(&man);
                Ok((man, done))
            }
            Some(err) = errc.recv() => Err(err),
            else => Err(AppError::Finished),
        }
    }

    /// Run the operation and wait for its outcome
    pub async fn run_sync(&self) -> Result<AppManifest, AppError> {
        let (_, outcome) = tokio::join!(self.run(), self.wait());
        outcome
    }

    async fn wait(&self) -> Result<AppManifest, AppError> {
        loop {
            let (man, done) = self.poll().await?;
            if done {
                return Ok(man);
            }
        }
    }

    fn is_done(&self, man: &AppManifest) -> bool {
        match man.state() {
            // Errored is only published when an update waits for acknowledgement
            AppState::Ready | AppState::Errored => true,
            AppState::Uninstalling => self.operation == Operation::Delete,
            _ => false,
        }
    }

    fn source(&self) -> Result<(&Url, &dyn Fetcher), AppError> {
        match (&self.src, &self.fetcher) {
            (Some(src), Some(fetcher)) => Ok((src, fetcher.as_ref())),
            _ => Err(AppError::MissingSource),
        }
    }

    async fn install(&self, state: &mut RunState, senders: &Senders) -> Result<(), AppError> {
        let (src, fetcher) = self.source()?;
        state.man.set_state(AppState::Installing);

        let raw = fetcher.fetch_manifest(src).await?;
        let mut man = state.man.read_manifest(&raw, &self.slug, src.as_str())?;
        man.set_state(AppState::Installing);
        state.man = man;
        state.man.create(&self.ctx).await?;
        self.notify(senders, &state.man).await;

        let RunState { man, copier } = state;
        fetcher.fetch(src, copier.as_mut(), man).await?;

        man.set_state(AppState::Ready);
        man.update(&self.ctx).await?;
        self.notify(senders, man).await;
        Ok(())
    }

    async fn update(&self, state: &mut RunState, senders: &Senders) -> Result<(), AppError> {
        if !state.man.state().is_settled() {
            return Err(AppError::BadState);
        }
        let (src, fetcher) = self.source()?;

        let raw = fetcher.fetch_manifest(src).await?;
        let mut man = state.man.read_manifest(&raw, &self.slug, src.as_str())?;

        let extra = man.permissions().extra_over(state.man.permissions());
        if !extra.is_empty() && !self.permissions_acked {
            info!(
                "{} {} requires {} new permissions, waiting for acknowledgement",
                self.slug,
                man.version(),
                extra.len()
            );
            // The installed payload and its state are left as they are
            state.man.set_available_version(Some(man.version().to_string()));
            state.man.save_state(&self.ctx).await?;
            self.notify(senders, &state.man).await;
            return Ok(());
        }

        let versioned = VERSIONED_SCHEMES.contains(&src.scheme());
        if versioned && state.man.state() == AppState::Ready && man.version() == state.man.version() {
            debug!("{} is already at version {}", self.slug, man.version());
            self.notify(senders, &state.man).await;
            return Ok(());
        }

        man.set_state(AppState::Upgrading);
        man.set_available_version(None);
        state.man = man;
        state.man.update(&self.ctx).await?;
        self.notify(senders, &state.man).await;

        let RunState { man, copier } = state;
        fetcher.fetch(src, copier.as_mut(), man).await?;

        man.set_state(AppState::Ready);
        man.update(&self.ctx).await?;
        self.notify(senders, man).await;
        Ok(())
    }

    async fn delete(&self, state: &mut RunState, senders: &Senders) -> Result<(), AppError> {
        if !state.man.state().is_settled() {
            return Err(AppError::BadState);
        }
        state.man.set_state(AppState::Uninstalling);
        state.man.save_state(&self.ctx).await?;
        state.man.delete(&self.ctx).await?;
        self.notify(senders, &state.man).await;
        Ok(())
    }

    async fn fail(&self, state: &mut RunState, err: AppError, senders: &Senders) {
        if matches!(err, AppError::BadState) {
            warn!(
                "Cannot {} {} in state {}",
                self.operation,
                self.slug,
                state.man.state()
            );
        } else {
            error!("{} of {} failed: {}", self.operation, self.slug, err);
            state.man.set_error(&err);
            if let Err(save_err) = state.man.save_state(&self.ctx).await {
                warn!("Failed to persist error state of {}: {}", self.slug, save_err);
            }
            self.events.publish(AppEvent::OperationFailed {
                app_type: self.app_type,
                slug: self.slug.clone(),
                operation: self.operation,
                error: err.to_string(),
                failed_at: Utc::now(),
            });
        }
        if senders.errc.send(err).await.is_err() {
            debug!("Nobody polls installer of {}", self.slug);
        }
    }

    async fn notify(&self, senders: &Senders, man: &AppManifest) {
        self.events.publish(AppEvent::StateChanged {
            app_type: self.app_type,
            slug: self.slug.clone(),
            operation: self.operation,
            state: man.state(),
            version: man.version().to_string(),
            changed_at: Utc::now(),
        });
        if senders.manc.send(man.clone()).await.is_err() {
            debug!("Nobody polls installer of {}", self.slug);
        }
    }
}
