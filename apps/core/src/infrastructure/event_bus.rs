// Copyright (c) 2026 Cozy Cloud
// SPDX-License-Identifier: AGPL-3.0

// Event Bus Implementation - Pub/Sub for application events
//
// Provides in-memory event streaming using tokio broadcast channels.
// Installers publish every manifest snapshot they report; the CLI and any
// realtime observer subscribe to follow installs as they happen.
//
// In-memory only: events published while nobody listens are dropped.

use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, warn};

use crate::domain::events::AppEvent;

/// Event bus for publishing and subscribing to application events
#[derive(Clone)]
pub struct EventBus {
    sender: Arc<broadcast::Sender<AppEvent>>,
}

impl EventBus {
    /// Create a new event bus with specified channel capacity
    /// Capacity determines how many events can be buffered before dropping old ones
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender: Arc::new(sender),
        }
    }

    /// Create event bus with default capacity (1000)
    pub fn with_default_capacity() -> Self {
        Self::new(1000)
    }

    /// Publish an application event to all subscribers
    pub fn publish(&self, event: AppEvent) {
        debug!("Publishing event: {:?}", event);

        let receiver_count = self.sender.send(event).unwrap_or(0);
        if receiver_count == 0 {
            debug!("No subscribers listening to event");
        }
    }

    /// Subscribe to all application events
    pub fn subscribe(&self) -> EventReceiver {
        EventReceiver {
            receiver: self.sender.subscribe(),
        }
    }

    /// Subscribe and filter for a single application slug
    pub fn subscribe_app(&self, slug: impl Into<String>) -> AppEventReceiver {
        AppEventReceiver {
            receiver: self.sender.subscribe(),
            slug: slug.into(),
        }
    }

    /// Get the number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::with_default_capacity()
    }
}

fn map_recv_error(e: broadcast::error::RecvError) -> EventBusError {
    match e {
        broadcast::error::RecvError::Closed => EventBusError::Closed,
        broadcast::error::RecvError::Lagged(n) => {
            warn!("Event receiver lagged by {} events", n);
            EventBusError::Lagged(n)
        }
    }
}

/// Receiver for all application events
pub struct EventReceiver {
    receiver: broadcast::Receiver<AppEvent>,
}

impl EventReceiver {
    /// Receive the next event (blocks until event is available)
    pub async fn recv(&mut self) -> Result<AppEvent, EventBusError> {
        self.receiver.recv().await.map_err(map_recv_error)
    }

    /// Try to receive an event without blocking
    pub fn try_recv(&mut self) -> Result<AppEvent, EventBusError> {
        self.receiver.try_recv().map_err(|e| match e {
            broadcast::error::TryRecvError::Empty => EventBusError::Empty,
            broadcast::error::TryRecvError::Closed => EventBusError::Closed,
            broadcast::error::TryRecvError::Lagged(n) => {
                warn!("Event receiver lagged by {} events", n);
                EventBusError::Lagged(n)
            }
        })
    }
}

/// Receiver for the events of one slug (filtered)
pub struct AppEventReceiver {
    receiver: broadcast::Receiver<AppEvent>,
    slug: String,
}

impl AppEventReceiver {
    /// Receive the next event of the followed slug
    pub async fn recv(&mut self) -> Result<AppEvent, EventBusError> {
        loop {
            let event = self.receiver.recv().await.map_err(map_recv_error)?;
            if event.slug() == self.slug {
                return Ok(event);
            }
        }
    }
}

/// Errors that can occur when receiving events
#[derive(Debug, thiserror::Error)]
pub enum EventBusError {
    #[error("Event bus is closed")]
    Closed,

    #[error("No events available")]
    Empty,

    #[error("Receiver lagged by {0} events (events were dropped)")]
    Lagged(u64),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::app::{AppState, AppType, Operation};
    use chrono::Utc;

    fn state_changed(slug: &str, state: AppState) -> AppEvent {
        AppEvent::StateChanged {
            app_type: AppType::Webapp,
            slug: slug.to_string(),
            operation: Operation::Install,
            state,
            version: "1.0.0".to_string(),
            changed_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_event_bus_publish_subscribe() {
        let event_bus = EventBus::new(10);
        let mut receiver = event_bus.subscribe();

        event_bus.publish(state_changed("mini", AppState::Installing));

        match receiver.recv().await.unwrap() {
            AppEvent::StateChanged { slug, state, .. } => {
                assert_eq!(slug, "mini");
                assert_eq!(state, AppState::Installing);
            }
            other => panic!("Wrong event received: {:?}", other),
        }
        assert!(matches!(receiver.try_recv(), Err(EventBusError::Empty)));
    }

    #[tokio::test]
    async fn test_app_event_filtering() {
        let event_bus = EventBus::new(10);
        let mut receiver = event_bus.subscribe_app("mini");

        event_bus.publish(state_changed("drive", AppState::Ready));
        event_bus.publish(state_changed("mini", AppState::Ready));

        let received = receiver.recv().await.unwrap();
        assert_eq!(received.slug(), "mini");
    }

    #[tokio::test]
    async fn test_multiple_subscribers() {
        let event_bus = EventBus::new(10);
        let mut receiver1 = event_bus.subscribe();
        let mut receiver2 = event_bus.subscribe();
        assert_eq!(event_bus.subscriber_count(), 2);

        event_bus.publish(state_changed("mini", AppState::Upgrading));

        let _ = receiver1.recv().await.unwrap();
        let _ = receiver2.recv().await.unwrap();
    }
}
