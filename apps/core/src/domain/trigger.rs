// Copyright (c) 2026 Cozy Cloud
// SPDX-License-Identifier: AGPL-3.0

//! Job triggers registered for application services
//!
//! The scheduler itself is an external collaborator; this module only holds
//! the trigger value object and the port the installer talks to.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Trigger types understood by the scheduler
pub const TRIGGER_TYPES: &[&str] = &["@at", "@in", "@cron", "@every", "@event", "@webhook", "@client"];

/// Worker type used for webapp services
pub const SERVICE_WORKER: &str = "service";

/// Worker type used for konnector runs
pub const KONNECTOR_WORKER: &str = "konnector";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trigger {
    pub id: String,

    #[serde(rename = "type")]
    pub trigger_type: String,

    pub worker_type: String,

    pub domain: String,

    #[serde(default)]
    pub arguments: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub debounce: Option<String>,

    #[serde(default)]
    pub message: serde_json::Value,
}

impl Trigger {
    /// Build a trigger with a fresh id
    pub fn new(
        trigger_type: impl Into<String>,
        worker_type: impl Into<String>,
        domain: impl Into<String>,
        arguments: impl Into<String>,
        message: serde_json::Value,
    ) -> Result<Self, SchedulerError> {
        let trigger_type = trigger_type.into();
        if !TRIGGER_TYPES.contains(&trigger_type.as_str()) {
            return Err(SchedulerError::UnknownTriggerType(trigger_type));
        }
        Ok(Self {
            id: Uuid::new_v4().simple().to_string(),
            trigger_type,
            worker_type: worker_type.into(),
            domain: domain.into(),
            arguments: arguments.into(),
            debounce: None,
            message,
        })
    }

    pub fn with_debounce(mut self, debounce: Option<String>) -> Self {
        self.debounce = debounce;
        self
    }
}

/// Job/trigger scheduler port
#[async_trait]
pub trait Scheduler: Send + Sync {
    async fn add(&self, trigger: Trigger) -> Result<(), SchedulerError>;

    async fn delete(&self, domain: &str, trigger_id: &str) -> Result<(), SchedulerError>;

    /// All triggers registered for a domain
    async fn triggers(&self, domain: &str) -> Result<Vec<Trigger>, SchedulerError>;
}

#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("Trigger not found: {0}")]
    NotFound(String),

    #[error("Unknown trigger type: {0}")]
    UnknownTriggerType(String),

    #[error("Scheduler error: {0}")]
    Internal(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_trigger() {
        let trigger = Trigger::new(
            "@event",
            SERVICE_WORKER,
            "alice.cozy.example",
            "io.cozy.files:CREATED",
            serde_json::json!({"slug": "mini", "name": "onPhoto"}),
        )
        .unwrap();
        assert_eq!(trigger.trigger_type, "@event");
        assert_eq!(trigger.id.len(), 32);
    }

    #[test]
    fn test_unknown_trigger_type() {
        let result = Trigger::new("@never", SERVICE_WORKER, "d", "", serde_json::Value::Null);
        assert!(matches!(result, Err(SchedulerError::UnknownTriggerType(_))));
    }
}
