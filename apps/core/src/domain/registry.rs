// Copyright (c) 2026 Cozy Cloud
// SPDX-License-Identifier: AGPL-3.0

//! Version registry port
//!
//! A registry publishes versions of applications on channels (`stable`,
//! `beta`, `dev`). The installer only asks for the latest version of a slug
//! on a channel.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Channel used when a registry source names none
pub const DEFAULT_CHANNEL: &str = "stable";

/// Channels a registry source may name
pub const CHANNELS: &[&str] = &["stable", "beta", "dev"];

/// A published application version
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegistryVersion {
    #[serde(default)]
    pub slug: String,

    pub version: String,

    /// Download URL of the tarball
    pub url: String,

    /// Hex encoded sha256 of the tarball
    pub sha256: String,

    /// Directory prefix of every file inside the tarball
    #[serde(default)]
    pub tar_prefix: String,

    /// The application manifest as published
    #[serde(default)]
    pub manifest: serde_json::Value,
}

#[async_trait]
pub trait VersionRegistry: Send + Sync {
    async fn latest_version(&self, slug: &str, channel: &str) -> Result<RegistryVersion, RegistryError>;
}

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("Version not found for {slug} on channel {channel}")]
    NotFound { slug: String, channel: String },

    #[error("Unknown channel: {0}")]
    UnknownChannel(String),

    #[error("Registry is unreachable: {0}")]
    Unreachable(String),

    #[error("Invalid registry response: {0}")]
    InvalidResponse(String),
}
