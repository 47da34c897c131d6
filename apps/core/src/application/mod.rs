// Copyright (c) 2026 Cozy Cloud
// SPDX-License-Identifier: AGPL-3.0
//! Application layer: the installer use case and the batch updater.

pub mod batch_updater;
pub mod installer;

pub use batch_updater::{update_all, UpdateOutcome};
pub use installer::{Installer, InstallerContext, InstallerOptions};
