// Copyright (c) 2026 Cozy Cloud
// SPDX-License-Identifier: AGPL-3.0

//! Command implementations for the cozy-apps CLI

pub mod app;
pub mod config;

pub use self::app::AppCommand;
pub use self::config::ConfigCommand;
