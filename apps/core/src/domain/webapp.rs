// Copyright (c) 2026 Cozy Cloud
// SPDX-License-Identifier: AGPL-3.0

//! Webapp manifests
//!
//! Besides the common fields, a webapp declares routes, intents and
//! background services. Services with a `trigger` are registered against the
//! scheduler; every create/update/delete reconciles the registered triggers
//! with the declared services (see [`diff_services`]).

use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, info};

use crate::domain::app::{AppType, WEBAPPS_DOCTYPE};
use crate::domain::errors::AppError;
use crate::domain::manifest::{check_manifest_size, Manifest, ManifestContext, ManifestDoc};
use crate::domain::permission::PermissionError;
use crate::domain::repository::{Document, RepositoryError};
use crate::domain::trigger::{Scheduler, SchedulerError, Trigger, SERVICE_WORKER};

/// A route served by the webapp
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Route {
    pub folder: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub index: Option<String>,

    #[serde(default)]
    pub public: bool,
}

/// A background service run by the job system
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Service {
    #[serde(rename = "type", default)]
    pub service_type: String,

    pub file: String,

    /// Trigger options, `"<trigger type> <arguments...>"`
    #[serde(rename = "trigger", default, skip_serializing_if = "String::is_empty")]
    pub trigger_options: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub debounce: Option<String>,

    /// Id of the trigger registered for this service
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub trigger_id: String,
}

impl Service {
    /// Fields whose change requires a new trigger
    fn same_definition(&self, other: &Service) -> bool {
        self.file == other.file
            && self.service_type == other.service_type
            && self.trigger_options == other.trigger_options
    }

    /// Split trigger options into trigger type and arguments
    fn trigger_args(&self) -> (&str, &str) {
        let opts = self.trigger_options.trim();
        match opts.split_once(' ') {
            Some((kind, args)) => (kind, args.trim()),
            None => (opts, ""),
        }
    }
}

pub type Services = BTreeMap<String, Service>;

/// An intent the webapp can handle
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Intent {
    pub action: String,

    #[serde(rename = "type", default)]
    pub types: Vec<String>,

    pub href: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WebappManifest {
    #[serde(flatten)]
    pub doc: ManifestDoc,

    #[serde(default)]
    pub routes: BTreeMap<String, Route>,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub services: Services,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub intents: Vec<Intent>,

    /// Services registered by the previously installed version
    #[serde(skip)]
    pub old_services: Option<Services>,
}

impl WebappManifest {
    pub fn with_doc(doc: ManifestDoc) -> Self {
        Self {
            doc,
            routes: BTreeMap::new(),
            services: Services::new(),
            intents: Vec::new(),
            old_services: None,
        }
    }

    fn default_routes() -> BTreeMap<String, Route> {
        let mut routes = BTreeMap::new();
        routes.insert(
            "/".to_string(),
            Route {
                folder: "/".to_string(),
                index: Some("index.html".to_string()),
                public: false,
            },
        );
        routes
    }
}

impl Document for WebappManifest {
    fn doc_type(&self) -> &str {
        WEBAPPS_DOCTYPE
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
impl Manifest for WebappManifest {
    fn app_type(&self) -> AppType {
        AppType::Webapp
    }

    fn doc(&self) -> &ManifestDoc {
        &self.doc
    }

    fn doc_mut(&mut self) -> &mut ManifestDoc {
        &mut self.doc
    }

    fn read_manifest(&self, data: &[u8], slug: &str, source_url: &str) -> Result<Self, AppError> {
        check_manifest_size(data)?;
        let mut parsed: WebappManifest =
            serde_json::from_slice(data).map_err(|e| AppError::BadManifest(e.to_string()))?;

        parsed.doc.inherit(AppType::Webapp, &self.doc, slug, source_url);
        parsed.old_services = Some(self.services.clone());
        if parsed.routes.is_empty() {
            parsed.routes = Self::default_routes();
        }
        Ok(parsed)
    }

    async fn create(&mut self, ctx: &ManifestContext) -> Result<(), AppError> {
        let slug = self.doc.slug.clone();
        self.old_services = None;
        diff_services(ctx.scheduler.as_ref(), &ctx.db, &slug, None, &mut self.services).await?;

        let now = Utc::now();
        self.doc.created_at = Some(now);
        self.doc.updated_at = Some(now);
        ctx.store.create_named_doc(&ctx.db, self).await?;

        ctx.permissions
            .create_set(&ctx.db, AppType::Webapp, &slug, &self.doc.permissions)
            .await?;
        info!("Created webapp manifest {} at version {}", slug, self.doc.version);
        Ok(())
    }

    async fn update(&mut self, ctx: &ManifestContext) -> Result<(), AppError> {
        let slug = self.doc.slug.clone();
        // Services are only reconciled once after a manifest was read
        if let Some(old_services) = self.old_services.take() {
            diff_services(ctx.scheduler.as_ref(), &ctx.db, &slug, Some(old_services), &mut self.services).await?;
        }

        self.doc.updated_at = Some(Utc::now());
        ctx.store.update_doc(&ctx.db, self).await?;

        ctx.permissions
            .update_set(&ctx.db, AppType::Webapp, &slug, &self.doc.permissions)
            .await?;
        debug!("Updated webapp manifest {} (state {})", slug, self.doc.state);
        Ok(())
    }

    async fn delete(&self, ctx: &ManifestContext) -> Result<(), AppError> {
        let slug = self.doc.slug.as_str();
        let mut remaining = Services::new();
        diff_services(ctx.scheduler.as_ref(), &ctx.db, slug, Some(self.services.clone()), &mut remaining).await?;

        ctx.store.delete_doc(&ctx.db, self).await?;

        match ctx.permissions.destroy(&ctx.db, AppType::Webapp, slug).await {
            Ok(()) | Err(PermissionError::NotFound(_)) => {}
            Err(e) => return Err(e.into()),
        }
        info!("Deleted webapp manifest {}", slug);
        Ok(())
    }
}

/// Reconcile the triggers of previously registered services with the
/// declared ones.
///
/// A service whose file, type or trigger options changed is treated as
/// removed and added again: its trigger is deleted and a new one created.
/// Unchanged services keep their trigger id. New trigger ids are written
/// back into `new_services`.
pub async fn diff_services(
    scheduler: &dyn Scheduler,
    domain: &str,
    slug: &str,
    old_services: Option<Services>,
    new_services: &mut Services,
) -> Result<(), AppError> {
    let mut old_services = old_services.unwrap_or_default();
    let mut deleted: Vec<Service> = Vec::new();
    let mut created: Vec<String> = Vec::new();

    for (name, new_service) in new_services.iter_mut() {
        match old_services.remove(name) {
            None => created.push(name.clone()),
            Some(old_service) => {
                if new_service.same_definition(&old_service) {
                    new_service.trigger_id = old_service.trigger_id;
                } else {
                    deleted.push(old_service);
                    created.push(name.clone());
                }
            }
        }
    }
    deleted.extend(old_services.into_values());

    for service in &deleted {
        if service.trigger_id.is_empty() {
            continue;
        }
        match scheduler.delete(domain, &service.trigger_id).await {
            Ok(()) | Err(SchedulerError::NotFound(_)) => {
                debug!("Removed trigger {} of {}", service.trigger_id, slug);
            }
            Err(e) => return Err(e.into()),
        }
    }

    for name in created {
        let Some(service) = new_services.get_mut(&name) else {
            continue;
        };
        service.trigger_id.clear();
        if service.trigger_options.trim().is_empty() {
            continue;
        }
        let (trigger_type, arguments) = service.trigger_args();
        let message = serde_json::json!({ "slug": slug, "name": name });
        let trigger = Trigger::new(trigger_type, SERVICE_WORKER, domain, arguments, message)?
            .with_debounce(service.debounce.clone());
        let trigger_id = trigger.id.clone();
        scheduler.add(trigger).await?;
        debug!("Registered trigger {} for service {} of {}", trigger_id, name, slug);
        service.trigger_id = trigger_id;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::app::AppState;
    use crate::infrastructure::scheduler::InMemoryScheduler;

    const MANIFEST: &str = r#"{
        "name": "Mini",
        "slug": "ignored",
        "version": "1.0.0",
        "permissions": {"files": {"type": "io.cozy.files"}},
        "services": {
            "onPhoto": {"type": "node", "file": "onPhoto.js", "trigger": "@event io.cozy.files:CREATED"},
            "daily": {"type": "node", "file": "daily.js", "trigger": "@cron 0 0 0 * * *"}
        }
    }"#;

    fn service(file: &str, trigger: &str) -> Service {
        Service {
            service_type: "node".to_string(),
            file: file.to_string(),
            trigger_options: trigger.to_string(),
            debounce: None,
            trigger_id: String::new(),
        }
    }

    #[test]
    fn test_read_manifest_keeps_identity() {
        let mut installed = WebappManifest::with_doc(ManifestDoc {
            doc_id: "io.cozy.apps/mini".to_string(),
            doc_rev: Some("3-abc".to_string()),
            slug: "mini".to_string(),
            state: AppState::Ready,
            ..Default::default()
        });
        installed.services.insert("old".to_string(), service("old.js", "@every 1h"));

        let parsed = installed
            .read_manifest(MANIFEST.as_bytes(), "mini", "git://example.org/mini.git")
            .unwrap();
        assert_eq!(parsed.doc.slug, "mini");
        assert_eq!(parsed.doc.doc_id, "io.cozy.apps/mini");
        assert_eq!(parsed.doc.doc_rev.as_deref(), Some("3-abc"));
        assert_eq!(parsed.doc.source, "git://example.org/mini.git");
        assert_eq!(parsed.doc.version, "1.0.0");
        assert_eq!(parsed.services.len(), 2);
        assert!(parsed.old_services.as_ref().unwrap().contains_key("old"));
        assert_eq!(parsed.routes["/"].index.as_deref(), Some("index.html"));
    }

    #[test]
    fn test_read_manifest_rejects_malformed_json() {
        let blank = WebappManifest::with_doc(ManifestDoc::default());
        let result = blank.read_manifest(b"{not json", "mini", "git://x/y.git");
        assert!(matches!(result, Err(AppError::BadManifest(_))));
    }

    #[tokio::test]
    async fn test_diff_services_creates_triggers() {
        let scheduler = InMemoryScheduler::new();
        let mut services = Services::new();
        services.insert("onPhoto".to_string(), service("onPhoto.js", "@event io.cozy.files:CREATED"));
        services.insert("manual".to_string(), service("manual.js", ""));

        diff_services(&scheduler, "alice.cozy", "mini", None, &mut services).await.unwrap();

        let triggers = scheduler.triggers("alice.cozy").await.unwrap();
        assert_eq!(triggers.len(), 1);
        assert_eq!(triggers[0].trigger_type, "@event");
        assert_eq!(triggers[0].arguments, "io.cozy.files:CREATED");
        assert_eq!(triggers[0].message["name"], "onPhoto");
        assert_eq!(services["onPhoto"].trigger_id, triggers[0].id);
        assert!(services["manual"].trigger_id.is_empty());
    }

    #[tokio::test]
    async fn test_diff_services_reconciles_changes() {
        let scheduler = InMemoryScheduler::new();
        let mut old = Services::new();
        old.insert("keep".to_string(), service("keep.js", "@every 1h"));
        old.insert("change".to_string(), service("change.js", "@every 1h"));
        old.insert("drop".to_string(), service("drop.js", "@every 1h"));
        diff_services(&scheduler, "d", "mini", None, &mut old).await.unwrap();
        assert_eq!(scheduler.triggers("d").await.unwrap().len(), 3);
        let keep_id = old["keep"].trigger_id.clone();
        let change_id = old["change"].trigger_id.clone();
        let drop_id = old["drop"].trigger_id.clone();

        let mut new = Services::new();
        new.insert("keep".to_string(), service("keep.js", "@every 1h"));
        new.insert("change".to_string(), service("change.js", "@every 2h"));
        new.insert("added".to_string(), service("added.js", "@cron 0 0 * * * *"));
        diff_services(&scheduler, "d", "mini", Some(old), &mut new).await.unwrap();

        let ids: Vec<String> = scheduler
            .triggers("d")
            .await
            .unwrap()
            .into_iter()
            .map(|t| t.id)
            .collect();
        assert_eq!(ids.len(), 3);
        assert_eq!(new["keep"].trigger_id, keep_id);
        assert_ne!(new["change"].trigger_id, change_id);
        assert!(!ids.contains(&change_id));
        assert!(!ids.contains(&drop_id));
        assert!(ids.contains(&new["added"].trigger_id));
    }

    #[tokio::test]
    async fn test_diff_services_rejects_unknown_trigger_type() {
        let scheduler = InMemoryScheduler::new();
        let mut services = Services::new();
        services.insert("bad".to_string(), service("bad.js", "@sometimes now"));
        let result = diff_services(&scheduler, "d", "mini", None, &mut services).await;
        assert!(matches!(result, Err(AppError::Scheduler(SchedulerError::UnknownTriggerType(_)))));
    }
}
