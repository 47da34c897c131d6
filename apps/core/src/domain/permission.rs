// Copyright (c) 2026 Cozy Cloud
// SPDX-License-Identifier: AGPL-3.0

//! Permission sets requested by applications
//!
//! Every installed application owns one permission set scoped to its slug.
//! The set is created, updated and destroyed alongside the manifest document.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

use crate::domain::app::AppType;

/// A single permission rule, as declared in a manifest
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rule {
    /// Doctype the rule applies to
    #[serde(rename = "type")]
    pub doc_type: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// HTTP verbs allowed, all of them when empty
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub verbs: Vec<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub values: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selector: Option<String>,
}

/// Named permission rules
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PermissionSet(pub BTreeMap<String, Rule>);

impl PermissionSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, rule: Rule) {
        self.0.insert(name.into(), rule);
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Rules of `self` that `installed` does not already grant unchanged
    pub fn extra_over(&self, installed: &PermissionSet) -> PermissionSet {
        let extra = self
            .0
            .iter()
            .filter(|(name, rule)| installed.0.get(*name) != Some(*rule))
            .map(|(name, rule)| (name.clone(), rule.clone()))
            .collect();
        PermissionSet(extra)
    }
}

/// Permission-set store scoped per application
#[async_trait]
pub trait PermissionStore: Send + Sync {
    async fn create_set(
        &self,
        db: &str,
        app_type: AppType,
        slug: &str,
        set: &PermissionSet,
    ) -> Result<(), PermissionError>;

    async fn update_set(
        &self,
        db: &str,
        app_type: AppType,
        slug: &str,
        set: &PermissionSet,
    ) -> Result<(), PermissionError>;

    async fn destroy(&self, db: &str, app_type: AppType, slug: &str) -> Result<(), PermissionError>;
}

#[derive(Debug, Error)]
pub enum PermissionError {
    #[error("Permission set not found: {0}")]
    NotFound(String),

    #[error("Permission store error: {0}")]
    Store(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rule(doc_type: &str, verbs: &[&str]) -> Rule {
        Rule {
            doc_type: doc_type.to_string(),
            description: None,
            verbs: verbs.iter().map(|v| v.to_string()).collect(),
            values: vec![],
            selector: None,
        }
    }

    #[test]
    fn test_extra_over_detects_new_and_changed_rules() {
        let mut installed = PermissionSet::new();
        installed.insert("files", rule("io.cozy.files", &["GET"]));
        installed.insert("contacts", rule("io.cozy.contacts", &[]));

        let mut wanted = PermissionSet::new();
        wanted.insert("files", rule("io.cozy.files", &["GET", "POST"]));
        wanted.insert("contacts", rule("io.cozy.contacts", &[]));
        wanted.insert("bills", rule("io.cozy.bills", &[]));

        let extra = wanted.extra_over(&installed);
        assert_eq!(extra.len(), 2);
        assert!(extra.0.contains_key("files"));
        assert!(extra.0.contains_key("bills"));
        assert!(installed.extra_over(&installed).is_empty());
    }

    #[test]
    fn test_parse_manifest_permissions() {
        let json = r#"{
            "files": {"type": "io.cozy.files", "description": "Required", "verbs": ["GET"]},
            "apps": {"type": "io.cozy.apps"}
        }"#;
        let set: PermissionSet = serde_json::from_str(json).unwrap();
        assert_eq!(set.len(), 2);
        assert_eq!(set.0["files"].verbs, vec!["GET".to_string()]);
        assert!(set.0["apps"].verbs.is_empty());
    }
}
