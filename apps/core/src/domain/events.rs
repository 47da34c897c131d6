// Copyright (c) 2026 Cozy Cloud
// SPDX-License-Identifier: AGPL-3.0

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::app::{AppState, AppType, Operation};

/// Application lifecycle events, published for every manifest snapshot an
/// installer reports
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum AppEvent {
    StateChanged {
        app_type: AppType,
        slug: String,
        operation: Operation,
        state: AppState,
        version: String,
        changed_at: DateTime<Utc>,
    },
    OperationFailed {
        app_type: AppType,
        slug: String,
        operation: Operation,
        error: String,
        failed_at: DateTime<Utc>,
    },
}

impl AppEvent {
    pub fn slug(&self) -> &str {
        match self {
            AppEvent::StateChanged { slug, .. } => slug,
            AppEvent::OperationFailed { slug, .. } => slug,
        }
    }

    pub fn app_type(&self) -> AppType {
        match self {
            AppEvent::StateChanged { app_type, .. } => *app_type,
            AppEvent::OperationFailed { app_type, .. } => *app_type,
        }
    }
}
