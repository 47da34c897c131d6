// Copyright (c) 2026 Cozy Cloud
// SPDX-License-Identifier: AGPL-3.0
//! Infrastructure layer: adapters for the domain ports.

pub mod copier;
pub mod event_bus;
pub mod fetcher;
pub mod permissions;
pub mod registry_client;
pub mod repositories;
pub mod scheduler;
