// Copyright (c) 2026 Cozy Cloud
// SPDX-License-Identifier: AGPL-3.0

//! Konnector manifests
//!
//! A konnector is a sandboxed job fetching data from a third party service.
//! Its manifest must declare `type: "node"` (or the legacy `"konnector"`).
//! Deleting a konnector also removes the scheduler triggers that run it.

use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::domain::app::{AppType, KONNECTORS_DOCTYPE};
use crate::domain::errors::AppError;
use crate::domain::manifest::{check_manifest_size, Manifest, ManifestContext, ManifestDoc};
use crate::domain::permission::PermissionError;
use crate::domain::repository::{Document, RepositoryError};
use crate::domain::trigger::{SchedulerError, KONNECTOR_WORKER};

/// Values accepted for the `type` field of a konnector manifest
const KONNECTOR_TYPES: &[&str] = &["node", "konnector"];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KonnectorManifest {
    #[serde(flatten)]
    pub doc: ManifestDoc,

    #[serde(rename = "type", default)]
    pub konnector_type: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,

    /// Account fields asked to the user
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fields: Option<serde_json::Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub frequency: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parameters: Option<serde_json::Value>,

    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub on_delete_account: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub folders: Option<serde_json::Value>,
}

impl KonnectorManifest {
    pub fn with_doc(doc: ManifestDoc) -> Self {
        Self {
            doc,
            konnector_type: String::new(),
            language: None,
            fields: None,
            frequency: None,
            parameters: None,
            on_delete_account: false,
            folders: None,
        }
    }

    /// Remove every trigger running this konnector
    async fn delete_triggers(&self, ctx: &ManifestContext) -> Result<(), AppError> {
        let slug = self.doc.slug.as_str();
        let triggers = ctx.scheduler.triggers(&ctx.db).await?;
        for trigger in triggers {
            if trigger.worker_type != KONNECTOR_WORKER {
                continue;
            }
            let target = trigger
                .message
                .get("konnector")
                .or_else(|| trigger.message.get("slug"))
                .and_then(|v| v.as_str());
            if target != Some(slug) {
                continue;
            }
            match ctx.scheduler.delete(&ctx.db, &trigger.id).await {
                Ok(()) => debug!("Removed trigger {} of konnector {}", trigger.id, slug),
                Err(SchedulerError::NotFound(_)) => {}
                Err(e) => return Err(e.into()),
            }
        }
        Ok(())
    }
}

impl Document for KonnectorManifest {
    fn doc_type(&self) -> &str {
        KONNECTORS_DOCTYPE
    }

    fn id(&self) -> &str {
        &self.doc.doc_id
    }

    fn rev(&self) -> Option<&str> {
        self.doc.doc_rev.as_deref()
    }

    fn set_rev(&mut self, rev: String) {
        self.doc.doc_rev = Some(rev);
    }

    fn to_json(&self) -> Result<serde_json::Value, RepositoryError> {
        Ok(serde_json::to_value(self)?)
    }
}

#[async_trait]
impl Manifest for KonnectorManifest {
    fn app_type(&self) -> AppType {
        AppType::Konnector
    }

    fn doc(&self) -> &ManifestDoc {
        &self.doc
    }

    fn doc_mut(&mut self) -> &mut ManifestDoc {
        &mut self.doc
    }

    fn read_manifest(&self, data: &[u8], slug: &str, source_url: &str) -> Result<Self, AppError> {
        check_manifest_size(data)?;
        let mut parsed: KonnectorManifest =
            serde_json::from_slice(data).map_err(|e| AppError::BadManifest(e.to_string()))?;

        if !KONNECTOR_TYPES.contains(&parsed.konnector_type.as_str()) {
            return Err(AppError::BadManifest(format!(
                "konnector type must be \"node\", got {:?}",
                parsed.konnector_type
            )));
        }
        parsed.doc.inherit(AppType::Konnector, &self.doc, slug, source_url);
        Ok(parsed)
    }

    async fn create(&mut self, ctx: &ManifestContext) -> Result<(), AppError> {
        let now = Utc::now();
        self.doc.created_at = Some(now);
        self.doc.updated_at = Some(now);
        ctx.store.create_named_doc(&ctx.db, self).await?;

        ctx.permissions
            .create_set(&ctx.db, AppType::Konnector, &self.doc.slug, &self.doc.permissions)
            .await?;
        info!("Created konnector manifest {} at version {}", self.doc.slug, self.doc.version);
        Ok(())
    }

    async fn update(&mut self, ctx: &ManifestContext) -> Result<(), AppError> {
        self.doc.updated_at = Some(Utc::now());
        ctx.store.update_doc(&ctx.db, self).await?;

        ctx.permissions
            .update_set(&ctx.db, AppType::Konnector, &self.doc.slug, &self.doc.permissions)
            .await?;
        debug!("Updated konnector manifest {} (state {})", self.doc.slug, self.doc.state);
        Ok(())
    }

    async fn delete(&self, ctx: &ManifestContext) -> Result<(), AppError> {
        let slug = self.doc.slug.as_str();
        if let Err(e) = self.delete_triggers(ctx).await {
            warn!("Failed to remove triggers of konnector {}: {}", slug, e);
        }

        ctx.store.delete_doc(&ctx.db, self).await?;

        match ctx.permissions.destroy(&ctx.db, AppType::Konnector, slug).await {
            Ok(()) | Err(PermissionError::NotFound(_)) => {}
            Err(e) => return Err(e.into()),
        }
        info!("Deleted konnector manifest {}", slug);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::repository::DocumentStore;
    use crate::domain::trigger::{Scheduler, Trigger, SERVICE_WORKER};
    use crate::infrastructure::permissions::DocumentPermissionStore;
    use crate::infrastructure::repositories::InMemoryDocumentStore;
    use crate::infrastructure::scheduler::InMemoryScheduler;
    use std::sync::Arc;

    const MANIFEST: &str = r#"{
        "name": "Bank",
        "type": "node",
        "version": "3.1.0",
        "language": "node",
        "fields": {"login": {"type": "text"}},
        "permissions": {"bills": {"type": "io.cozy.bills"}}
    }"#;

    #[test]
    fn test_read_manifest() {
        let blank = KonnectorManifest::with_doc(ManifestDoc::default());
        let parsed = blank
            .read_manifest(MANIFEST.as_bytes(), "bank", "registry://bank/stable")
            .unwrap();
        assert_eq!(parsed.doc.doc_id, "io.cozy.konnectors/bank");
        assert_eq!(parsed.doc.version, "3.1.0");
        assert_eq!(parsed.konnector_type, "node");
        assert_eq!(parsed.doc.permissions.len(), 1);
    }

    #[test]
    fn test_read_manifest_requires_node_type() {
        let blank = KonnectorManifest::with_doc(ManifestDoc::default());
        let data = br#"{"name": "Bank", "type": "python", "version": "1.0.0"}"#;
        let result = blank.read_manifest(data, "bank", "registry://bank");
        assert!(matches!(result, Err(AppError::BadManifest(_))));

        let untyped = br#"{"name": "Bank", "version": "1.0.0"}"#;
        assert!(blank.read_manifest(untyped, "bank", "registry://bank").is_err());
    }

    #[tokio::test]
    async fn test_delete_removes_konnector_triggers() {
        let store = Arc::new(InMemoryDocumentStore::new());
        let scheduler = Arc::new(InMemoryScheduler::new());
        let ctx = ManifestContext::new(
            "alice.cozy",
            store.clone(),
            Arc::new(DocumentPermissionStore::new(store.clone())),
            scheduler.clone(),
        );

        let blank = KonnectorManifest::with_doc(ManifestDoc::default());
        let mut man = blank.read_manifest(MANIFEST.as_bytes(), "bank", "registry://bank").unwrap();
        man.create(&ctx).await.unwrap();

        let run = Trigger::new("@cron", KONNECTOR_WORKER, "alice.cozy", "0 0 2 * * *", serde_json::json!({"konnector": "bank"}))
            .unwrap();
        let other = Trigger::new("@cron", KONNECTOR_WORKER, "alice.cozy", "0 0 3 * * *", serde_json::json!({"konnector": "shop"}))
            .unwrap();
        let service = Trigger::new("@every", SERVICE_WORKER, "alice.cozy", "1h", serde_json::json!({"slug": "bank"})).unwrap();
        let other_id = other.id.clone();
        scheduler.add(run).await.unwrap();
        scheduler.add(other).await.unwrap();
        scheduler.add(service).await.unwrap();

        man.delete(&ctx).await.unwrap();

        let remaining = scheduler.triggers("alice.cozy").await.unwrap();
        assert_eq!(remaining.len(), 2);
        assert!(remaining.iter().any(|t| t.id == other_id));
        assert!(remaining.iter().all(|t| t.message["konnector"] != "bank"));
        let stored = store.get_doc("alice.cozy", KONNECTORS_DOCTYPE, "io.cozy.konnectors/bank").await;
        assert!(matches!(stored, Err(RepositoryError::NotFound(_))));
    }
}
