// Copyright (c) 2026 Cozy Cloud
// SPDX-License-Identifier: AGPL-3.0
//! # Document Store Port
//!
//! Manifests and permission sets are persisted in a CouchDB-like document
//! store. The installer only needs four primitives and revision-carrying
//! documents:
//!
//! | Method | Failure modes |
//! |--------|---------------|
//! | `create_named_doc` | `Conflict` when the id is taken |
//! | `update_doc` | `Conflict` on a stale `_rev`, `NotFound` |
//! | `delete_doc` | `Conflict` on a stale `_rev`, `NotFound` |
//! | `get_doc` | `NotFound` |
//!
//! Implementations live in `crate::infrastructure::repositories`
//! (`InMemoryDocumentStore`, `CouchDocumentStore`).
//!
//! The optimistic revision check is the only guard against two installers
//! writing the same slug concurrently.

use async_trait::async_trait;
use thiserror::Error;

/// A document carrying its own id and revision
pub trait Document: Send + Sync {
    fn doc_type(&self) -> &str;
    fn id(&self) -> &str;
    fn rev(&self) -> Option<&str>;
    fn set_rev(&mut self, rev: String);

    /// JSON body of the document, including `_id` and `_rev` when set
    fn to_json(&self) -> Result<serde_json::Value, RepositoryError>;
}

#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Create a document under its own id; fails if the id already exists
    async fn create_named_doc(&self, db: &str, doc: &mut dyn Document) -> Result<(), RepositoryError>;

    /// Update a document; the revision must match the stored one
    async fn update_doc(&self, db: &str, doc: &mut dyn Document) -> Result<(), RepositoryError>;

    /// Delete a document at its current revision
    async fn delete_doc(&self, db: &str, doc: &dyn Document) -> Result<(), RepositoryError>;

    /// Fetch the raw JSON of a document
    async fn get_doc(&self, db: &str, doc_type: &str, id: &str) -> Result<serde_json::Value, RepositoryError>;

    /// List all documents of a doctype (used by the batch updater)
    async fn all_docs(&self, db: &str, doc_type: &str) -> Result<Vec<serde_json::Value>, RepositoryError>;
}

/// Repository errors
#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("Document not found: {0}")]
    NotFound(String),

    #[error("Document update conflict: {0}")]
    Conflict(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Database error: {0}")]
    Database(String),
}

impl RepositoryError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, RepositoryError::NotFound(_))
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, RepositoryError::Conflict(_))
    }
}

impl From<serde_json::Error> for RepositoryError {
    fn from(err: serde_json::Error) -> Self {
        RepositoryError::Serialization(err.to_string())
    }
}

impl From<reqwest::Error> for RepositoryError {
    fn from(err: reqwest::Error) -> Self {
        RepositoryError::Database(err.to_string())
    }
}
