// Copyright (c) 2026 Cozy Cloud
// SPDX-License-Identifier: AGPL-3.0

//! Installer error taxonomy
//!
//! Validation errors are returned by `Installer::new` before any work starts.
//! Everything else surfaces through `Installer::poll` once the run began.

use thiserror::Error;

use crate::domain::permission::PermissionError;
use crate::domain::registry::RegistryError;
use crate::domain::repository::RepositoryError;
use crate::domain::storage::CopierError;
use crate::domain::trigger::SchedulerError;

#[derive(Debug, Error)]
pub enum AppError {
    // --- Validation ---
    #[error("Invalid slug name")]
    InvalidSlugName,

    #[error("Missing application source")]
    MissingSource,

    #[error("Invalid or not supported source scheme")]
    NotSupportedSource,

    // --- State conflicts ---
    #[error("Application with same slug already exists")]
    AlreadyExists,

    #[error("Application is not installed")]
    NotFound,

    #[error("Application is not in valid state to perform this operation")]
    BadState,

    #[error("Installer has no more progress to report")]
    Finished,

    // --- Fetch failures ---
    #[error("Application manifest is not reachable")]
    ManifestNotReachable,

    #[error("Application source is not reachable")]
    SourceNotReachable,

    #[error("Git repository cloning timed out")]
    CloneTimeout,

    #[error("Checksum does not match the downloaded archive")]
    BadChecksum,

    #[error("Git error: {0}")]
    Git(String),

    // --- Manifest content ---
    #[error("Application manifest is invalid or malformed: {0}")]
    BadManifest(String),

    // --- Collaborators ---
    #[error("Copier error: {0}")]
    Copier(#[from] CopierError),

    #[error("Repository error: {0}")]
    Repository(#[from] RepositoryError),

    #[error("Permission error: {0}")]
    Permission(#[from] PermissionError),

    #[error("Scheduler error: {0}")]
    Scheduler(#[from] SchedulerError),

    #[error("Registry error: {0}")]
    Registry(#[from] RegistryError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<git2::Error> for AppError {
    fn from(err: git2::Error) -> Self {
        AppError::Git(err.message().to_string())
    }
}

impl From<url::ParseError> for AppError {
    fn from(_: url::ParseError) -> Self {
        AppError::NotSupportedSource
    }
}
