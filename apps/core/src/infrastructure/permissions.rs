// Copyright (c) 2026 Cozy Cloud
// SPDX-License-Identifier: AGPL-3.0

//! Permission sets persisted as `io.cozy.permissions` documents
//!
//! One document per application, with id `<app doctype>/<slug>`, stored in
//! the same document store as the manifests.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;

use crate::domain::app::{manifest_id, AppType};
use crate::domain::permission::{PermissionError, PermissionSet, PermissionStore};
use crate::domain::repository::{Document, DocumentStore, RepositoryError};

pub const PERMISSIONS_DOCTYPE: &str = "io.cozy.permissions";

#[derive(Debug, Clone, Serialize, Deserialize)]
struct PermissionDoc {
    #[serde(rename = "_id")]
    id: String,

    #[serde(rename = "_rev", default, skip_serializing_if = "Option::is_none")]
    rev: Option<String>,

    /// "app" or "konnector"
    #[serde(rename = "type")]
    kind: String,

    source_id: String,

    permissions: PermissionSet,
}

impl Document for PermissionDoc {
    fn doc_type(&self) -> &str {
        PERMISSIONS_DOCTYPE
    }

    fn id(&self) -> &str {
        &self.id
    }

    fn rev(&self) -> Option<&str> {
        self.rev.as_deref()
    }

    fn set_rev(&mut self, rev: String) {
        self.rev = Some(rev);
    }

    fn to_json(&self) -> Result<serde_json::Value, RepositoryError> {
        Ok(serde_json::to_value(self)?)
    }
}

pub struct DocumentPermissionStore {
    store: Arc<dyn DocumentStore>,
}

impl DocumentPermissionStore {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }

    fn new_doc(app_type: AppType, slug: &str, set: &PermissionSet) -> PermissionDoc {
        let id = manifest_id(app_type, slug);
        PermissionDoc {
            id: id.clone(),
            rev: None,
            kind: match app_type {
                AppType::Webapp => "app".to_string(),
                AppType::Konnector => "konnector".to_string(),
            },
            source_id: id,
            permissions: set.clone(),
        }
    }

    async fn load(&self, db: &str, app_type: AppType, slug: &str) -> Result<PermissionDoc, PermissionError> {
        let id = manifest_id(app_type, slug);
        match self.store.get_doc(db, PERMISSIONS_DOCTYPE, &id).await {
            Ok(json) => serde_json::from_value(json).map_err(|e| PermissionError::Store(e.to_string())),
            Err(RepositoryError::NotFound(_)) => Err(PermissionError::NotFound(id)),
            Err(e) => Err(PermissionError::Store(e.to_string())),
        }
    }

    /// Permission set currently granted to an application
    pub async fn get_set(&self, db: &str, app_type: AppType, slug: &str) -> Result<PermissionSet, PermissionError> {
        Ok(self.load(db, app_type, slug).await?.permissions)
    }
}

#[async_trait]
impl PermissionStore for DocumentPermissionStore {
    async fn create_set(
        &self,
        db: &str,
        app_type: AppType,
        slug: &str,
        set: &PermissionSet,
    ) -> Result<(), PermissionError> {
        let mut doc = Self::new_doc(app_type, slug, set);
        self.store
            .create_named_doc(db, &mut doc)
            .await
            .map_err(|e| PermissionError::Store(e.to_string()))?;
        debug!("Created permission set of {} ({} rules)", slug, set.len());
        Ok(())
    }

    async fn update_set(
        &self,
        db: &str,
        app_type: AppType,
        slug: &str,
        set: &PermissionSet,
    ) -> Result<(), PermissionError> {
        let mut doc = match self.load(db, app_type, slug).await {
            Ok(doc) => doc,
            Err(PermissionError::NotFound(_)) => return self.create_set(db, app_type, slug, set).await,
            Err(e) => return Err(e),
        };
        doc.permissions = set.clone();
        self.store
            .update_doc(db, &mut doc)
            .await
            .map_err(|e| PermissionError::Store(e.to_string()))?;
        debug!("Updated permission set of {} ({} rules)", slug, set.len());
        Ok(())
    }

    async fn destroy(&self, db: &str, app_type: AppType, slug: &str) -> Result<(), PermissionError> {
        let doc = self.load(db, app_type, slug).await?;
        self.store
            .delete_doc(db, &doc)
            .await
            .map_err(|e| PermissionError::Store(e.to_string()))?;
        debug!("Destroyed permission set of {}", slug);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::permission::Rule;
    use crate::infrastructure::repositories::InMemoryDocumentStore;

    fn set_of(doc_types: &[&str]) -> PermissionSet {
        let mut set = PermissionSet::new();
        for t in doc_types {
            set.insert(
                t.to_string(),
                Rule {
                    doc_type: t.to_string(),
                    description: None,
                    verbs: vec![],
                    values: vec![],
                    selector: None,
                },
            );
        }
        set
    }

    #[tokio::test]
    async fn test_permission_set_lifecycle() {
        let perms = DocumentPermissionStore::new(Arc::new(InMemoryDocumentStore::new()));

        perms
            .create_set("db", AppType::Webapp, "mini", &set_of(&["io.cozy.files"]))
            .await
            .unwrap();
        perms
            .update_set("db", AppType::Webapp, "mini", &set_of(&["io.cozy.files", "io.cozy.contacts"]))
            .await
            .unwrap();
        let granted = perms.get_set("db", AppType::Webapp, "mini").await.unwrap();
        assert_eq!(granted.len(), 2);

        perms.destroy("db", AppType::Webapp, "mini").await.unwrap();
        let result = perms.destroy("db", AppType::Webapp, "mini").await;
        assert!(matches!(result, Err(PermissionError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_update_creates_missing_set() {
        let perms = DocumentPermissionStore::new(Arc::new(InMemoryDocumentStore::new()));
        perms
            .update_set("db", AppType::Konnector, "bank", &set_of(&["io.cozy.bills"]))
            .await
            .unwrap();
        assert_eq!(perms.get_set("db", AppType::Konnector, "bank").await.unwrap().len(), 1);
    }
}
