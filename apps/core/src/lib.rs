// Copyright (c) 2026 Cozy Cloud
// SPDX-License-Identifier: AGPL-3.0
//! Cozy application installer
//!
//! Installs, updates and removes webapps and konnectors for a Cozy instance.
//!
//! # Architecture
//!
//! - **domain:** manifests, states, errors and the ports (document store,
//!   permission store, scheduler, registry, fetcher, copier)
//! - **application:** the [`Installer`](application::installer::Installer)
//!   state machine and the batch updater
//! - **infrastructure:** git/registry/http fetchers, local/Swift/tar copiers,
//!   document stores, scheduler and event bus adapters

pub mod domain;
pub mod application;
pub mod infrastructure;

pub use domain::*;
