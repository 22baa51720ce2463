//! Event publishing for autoflow
//!
//! The orchestrator reports lifecycle notifications and republishes every
//! dispatched event through an [`EventPublisher`]. Publishing is
//! fire-and-forget: a publisher never returns an error and a missing
//! subscriber never affects dispatch.
//!
//! [`EventBus`] is the default publisher, a broadcast hub that observers
//! subscribe to per event type or for all events.

use af_core::{Context, Event, EventData, EventType};
use dashmap::DashMap;
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, trace};

/// Default channel capacity for event subscriptions
const DEFAULT_CHANNEL_CAPACITY: usize = 1024;

/// Sink for engine notifications
pub trait EventPublisher: Send + Sync {
    /// Publish an event; must not block on or fail because of consumers
    fn publish(&self, event: Event<Value>);
}

/// Publisher that drops everything
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopPublisher;

impl EventPublisher for NoopPublisher {
    fn publish(&self, event: Event<Value>) {
        trace!(event_type = %event.event_type, "Dropping event (no publisher)");
    }
}

/// Convert typed event data into a publishable JSON event
pub fn typed_event<T: EventData + serde::Serialize>(data: T, context: Context) -> Event<Value> {
    let event = Event::typed(data, context);
    Event {
        data: serde_json::to_value(&event.data).unwrap_or_default(),
        event_type: event.event_type,
        origin: event.origin,
        time_fired: event.time_fired,
        context: event.context,
    }
}

/// Broadcast event bus
///
/// Supports subscribing to one event type or to all events (MATCH_ALL).
pub struct EventBus {
    /// Map of event types to their broadcast senders
    listeners: DashMap<EventType, broadcast::Sender<Event<Value>>>,
    /// Special sender for MATCH_ALL subscribers
    match_all_sender: broadcast::Sender<Event<Value>>,
    /// Channel capacity
    capacity: usize,
}

impl EventBus {
    /// Create a new event bus
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CHANNEL_CAPACITY)
    }

    /// Create a new event bus with specified channel capacity
    pub fn with_capacity(capacity: usize) -> Self {
        let (match_all_sender, _) = broadcast::channel(capacity);
        Self {
            listeners: DashMap::new(),
            match_all_sender,
            capacity,
        }
    }

    /// Subscribe to events of a specific type
    pub fn subscribe(&self, event_type: impl Into<EventType>) -> broadcast::Receiver<Event<Value>> {
        let event_type = event_type.into();
        trace!(event_type = %event_type, "Subscribing to event type");

        if event_type.is_match_all() {
            return self.match_all_sender.subscribe();
        }

        self.listeners
            .entry(event_type)
            .or_insert_with(|| {
                let (tx, _) = broadcast::channel(self.capacity);
                tx
            })
            .subscribe()
    }

    /// Subscribe to all events
    pub fn subscribe_all(&self) -> broadcast::Receiver<Event<Value>> {
        self.match_all_sender.subscribe()
    }

    /// Fire an event to the subscribers of its type and to MATCH_ALL subscribers
    pub fn fire(&self, event: Event<Value>) {
        debug!(event_type = %event.event_type, "Firing event");

        if let Some(sender) = self.listeners.get(&event.event_type) {
            // Send errors only mean there are no active receivers
            let _ = sender.send(event.clone());
        }

        let _ = self.match_all_sender.send(event);
    }

    /// Fire a typed event
    pub fn fire_typed<T: EventData + serde::Serialize>(&self, data: T, context: Context) {
        self.fire(typed_event(data, context));
    }

    /// Get the number of active event type subscriptions
    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventPublisher for EventBus {
    fn publish(&self, event: Event<Value>) {
        self.fire(event);
    }
}

/// Thread-safe wrapper for EventBus
pub type SharedEventBus = Arc<EventBus>;

#[cfg(test)]
mod tests {
    use super::*;
    use af_core::events::{AutomationRef, AutomationRegisteredData, AUTOMATION_REGISTERED};
    use serde_json::json;

    #[tokio::test]
    async fn test_subscribe_and_fire() {
        let bus = EventBus::new();
        let mut rx = bus.subscribe("test_event");

        bus.fire(Event::new(
            "test_event",
            json!({"key": "value"}),
            Context::new(),
        ));

        let received = rx.recv().await.unwrap();
        assert_eq!(received.event_type.as_str(), "test_event");
        assert_eq!(received.data["key"], "value");
    }

    #[tokio::test]
    async fn test_match_all_subscription() {
        let bus = EventBus::new();
        let mut rx = bus.subscribe_all();

        let ctx = Context::new();
        bus.fire(Event::new("event_a", json!({}), ctx.clone()));
        bus.fire(Event::new("event_b", json!({}), ctx));

        assert_eq!(rx.recv().await.unwrap().event_type.as_str(), "event_a");
        assert_eq!(rx.recv().await.unwrap().event_type.as_str(), "event_b");
    }

    #[tokio::test]
    async fn test_publish_typed_notification() {
        let bus = EventBus::new();
        let mut rx = bus.subscribe(AUTOMATION_REGISTERED);

        let data = AutomationRegisteredData(AutomationRef {
            automation_id: "a1".to_string(),
            alias: Some("Porch light".to_string()),
        });
        bus.publish(typed_event(data, Context::new()));

        let received = rx.recv().await.unwrap();
        assert_eq!(received.data["automation_id"], "a1");
        assert_eq!(received.data["alias"], "Porch light");
    }

    #[tokio::test]
    async fn test_no_cross_event_pollution() {
        let bus = EventBus::new();
        let mut rx_a = bus.subscribe("event_a");
        let mut rx_b = bus.subscribe("event_b");

        bus.fire(Event::new("event_a", json!({"type": "a"}), Context::new()));

        let received = rx_a.recv().await.unwrap();
        assert_eq!(received.data["type"], "a");
        assert!(rx_b.try_recv().is_err());
    }

    #[test]
    fn test_publish_without_subscribers_is_silent() {
        let bus = EventBus::new();
        bus.publish(Event::new("nobody_listens", json!({}), Context::new()));
        NoopPublisher.publish(Event::new("dropped", json!({}), Context::new()));
        assert_eq!(bus.listener_count(), 0);
    }
}
