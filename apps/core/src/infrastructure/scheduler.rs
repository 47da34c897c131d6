// Copyright (c) 2026 Cozy Cloud
// SPDX-License-Identifier: AGPL-3.0

//! In-memory trigger scheduler
//!
//! Keeps registered triggers per domain. Running the jobs is out of scope;
//! this adapter only tracks what the installer registers and removes.

use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

use crate::domain::trigger::{Scheduler, SchedulerError, Trigger};

#[derive(Clone, Default)]
pub struct InMemoryScheduler {
    triggers: Arc<RwLock<HashMap<String, Vec<Trigger>>>>,
}

impl InMemoryScheduler {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Scheduler for InMemoryScheduler {
    async fn add(&self, trigger: Trigger) -> Result<(), SchedulerError> {
        debug!(
            "Adding trigger {} ({} {}) on {}",
            trigger.id, trigger.trigger_type, trigger.arguments, trigger.domain
        );
        self.triggers
            .write()
            .entry(trigger.domain.clone())
            .or_default()
            .push(trigger);
        Ok(())
    }

    async fn delete(&self, domain: &str, trigger_id: &str) -> Result<(), SchedulerError> {
        let mut triggers = self.triggers.write();
        let list = triggers
            .get_mut(domain)
            .ok_or_else(|| SchedulerError::NotFound(trigger_id.to_string()))?;
        let before = list.len();
        list.retain(|t| t.id != trigger_id);
        if list.len() == before {
            return Err(SchedulerError::NotFound(trigger_id.to_string()));
        }
        Ok(())
    }

    async fn triggers(&self, domain: &str) -> Result<Vec<Trigger>, SchedulerError> {
        Ok(self.triggers.read().get(domain).cloned().unwrap_or_default())
    }
}
