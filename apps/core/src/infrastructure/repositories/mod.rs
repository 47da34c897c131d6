// Copyright (c) 2026 Cozy Cloud
// SPDX-License-Identifier: AGPL-3.0

//! Document Store Implementations
//!
//! Infrastructure implementations of the [`DocumentStore`] port.
//!
//! # Available Implementations
//!
//! - **CouchDocumentStore** - CouchDB over its HTTP API, one database per
//!   instance and doctype
//! - **InMemoryDocumentStore** - Lock-protected map with CouchDB-like
//!   revisions, for tests and local development
//!
//! Both enforce the same optimistic revision rules: a write carrying a stale
//! `_rev` is rejected with `RepositoryError::Conflict`.

pub mod couchdb;

use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

use crate::domain::repository::{Document, DocumentStore, RepositoryError};

pub use couchdb::CouchDocumentStore;

type DocKey = (String, String, String);

#[derive(Clone, Default)]
pub struct InMemoryDocumentStore {
    docs: Arc<RwLock<HashMap<DocKey, serde_json::Value>>>,
}

impl InMemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of documents stored across databases
    pub fn len(&self) -> usize {
        self.docs.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.docs.read().is_empty()
    }

    fn key(db: &str, doc_type: &str, id: &str) -> DocKey {
        (db.to_string(), doc_type.to_string(), id.to_string())
    }

    fn next_rev(current: Option<&str>) -> String {
        let generation = current
            .and_then(|rev| rev.split_once('-'))
            .and_then(|(n, _)| n.parse::<u64>().ok())
            .unwrap_or(0);
        format!("{}-{}", generation + 1, Uuid::new_v4().simple())
    }

    fn stored_rev(value: &serde_json::Value) -> Option<&str> {
        value.get("_rev").and_then(|v| v.as_str())
    }

    fn body_with_rev(doc: &dyn Document, rev: &str) -> Result<serde_json::Value, RepositoryError> {
        let mut body = doc.to_json()?;
        let obj = body
            .as_object_mut()
            .ok_or_else(|| RepositoryError::Serialization("document is not a JSON object".to_string()))?;
        obj.insert("_id".to_string(), serde_json::Value::String(doc.id().to_string()));
        obj.insert("_rev".to_string(), serde_json::Value::String(rev.to_string()));
        Ok(body)
    }
}

#[async_trait]
impl DocumentStore for InMemoryDocumentStore {
    async fn create_named_doc(&self, db: &str, doc: &mut dyn Document) -> Result<(), RepositoryError> {
        let key = Self::key(db, doc.doc_type(), doc.id());
        let mut docs = self.docs.write();
        if docs.contains_key(&key) {
            return Err(RepositoryError::Conflict(doc.id().to_string()));
        }
        let rev = Self::next_rev(None);
        let body = Self::body_with_rev(doc, &rev)?;
        docs.insert(key, body);
        doc.set_rev(rev);
        Ok(())
    }

    async fn update_doc(&self, db: &str, doc: &mut dyn Document) -> Result<(), RepositoryError> {
        let key = Self::key(db, doc.doc_type(), doc.id());
        let mut docs = self.docs.write();
        let current = docs
            .get(&key)
            .ok_or_else(|| RepositoryError::NotFound(doc.id().to_string()))?;
        if Self::stored_rev(current) != doc.rev() {
            return Err(RepositoryError::Conflict(doc.id().to_string()));
        }
        let rev = Self::next_rev(doc.rev());
        let body = Self::body_with_rev(doc, &rev)?;
        docs.insert(key, body);
        doc.set_rev(rev);
        Ok(())
    }

    async fn delete_doc(&self, db: &str, doc: &dyn Document) -> Result<(), RepositoryError> {
        let key = Self::key(db, doc.doc_type(), doc.id());
        let mut docs = self.docs.write();
        let current = docs
            .get(&key)
            .ok_or_else(|| RepositoryError::NotFound(doc.id().to_string()))?;
        if Self::stored_rev(current) != doc.rev() {
            return Err(RepositoryError::Conflict(doc.id().to_string()));
        }
        docs.remove(&key);
        Ok(())
    }

    async fn get_doc(&self, db: &str, doc_type: &str, id: &str) -> Result<serde_json::Value, RepositoryError> {
        self.docs
            .read()
            .get(&Self::key(db, doc_type, id))
            .cloned()
            .ok_or_else(|| RepositoryError::NotFound(id.to_string()))
    }

    async fn all_docs(&self, db: &str, doc_type: &str) -> Result<Vec<serde_json::Value>, RepositoryError> {
        let docs = self.docs.read();
        let mut found: Vec<(&String, &serde_json::Value)> = docs
            .iter()
            .filter(|((d, t, _), _)| d == db && t == doc_type)
            .map(|((_, _, id), value)| (id, value))
            .collect();
        found.sort_by(|a, b| a.0.cmp(b.0));
        Ok(found.into_iter().map(|(_, value)| value.clone()).collect())
    }
}
