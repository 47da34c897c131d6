// Copyright (c) 2026 Cozy Cloud
// SPDX-License-Identifier: AGPL-3.0
//! Domain layer: application manifests, their states and the ports the
//! installer depends on.

pub mod app;
pub mod errors;
pub mod manifest;
pub mod webapp;
pub mod konnector;
pub mod permission;
pub mod trigger;
pub mod repository;
pub mod storage;
pub mod fetcher;
pub mod registry;
pub mod events;
pub mod config;
