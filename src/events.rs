use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Mutex;

/// An event observed during a run, appended to the in-memory store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunEvent {
    pub event_type: String,
    pub timestamp: DateTime<Utc>,
    pub data: Value,
}

type EventHandler = Box<dyn Fn(&RunEvent) + Send + Sync>;

/// In-process publish/store bus, scoped to one orchestrator instance.
///
/// Subscription is registration only today; handler invocation is a
/// future extension point. The store is append-only per event type and
/// mutex-guarded so concurrent workers can publish safely.
#[derive(Default)]
pub struct EventBus {
    events: Mutex<HashMap<String, Vec<RunEvent>>>,
    subscribers: Mutex<HashMap<String, Vec<EventHandler>>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn publish(&self, event_type: &str, data: Value) {
        let event = RunEvent {
            event_type: event_type.to_string(),
            timestamp: Utc::now(),
            data,
        };

        let mut events = self.events.lock().expect("event store lock poisoned");
        events
            .entry(event_type.to_string())
            .or_default()
            .push(event);
    }

    pub fn subscribe<F>(&self, event_type: &str, handler: F)
    where
        F: Fn(&RunEvent) + Send + Sync + 'static,
    {
        let mut subscribers = self
            .subscribers
            .lock()
            .expect("subscriber table lock poisoned");
        subscribers
            .entry(event_type.to_string())
            .or_default()
            .push(Box::new(handler));
    }

    /// Events of one type, or every event when no filter is given.
    pub fn get_events(&self, event_type: Option<&str>) -> Vec<RunEvent> {
        let events = self.events.lock().expect("event store lock poisoned");

        match event_type {
            Some(kind) => events.get(kind).cloned().unwrap_or_default(),
            None => {
                let mut all: Vec<RunEvent> = events.values().flatten().cloned().collect();
                all.sort_by_key(|e| e.timestamp);
                all
            }
        }
    }

    pub fn subscriber_count(&self, event_type: &str) -> usize {
        self.subscribers
            .lock()
            .expect("subscriber table lock poisoned")
            .get(event_type)
            .map(|handlers| handlers.len())
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Arc;

    #[test]
    fn publish_appends_per_event_type() {
        let bus = EventBus::new();
        bus.publish("run_completed", json!({"suite": "Unit"}));
        bus.publish("run_completed", json!({"suite": "All"}));
        bus.publish("scaffold_generated", json!({"module": "alpha"}));

        assert_eq!(bus.get_events(Some("run_completed")).len(), 2);
        assert_eq!(bus.get_events(Some("scaffold_generated")).len(), 1);
        assert_eq!(bus.get_events(None).len(), 3);
        assert!(bus.get_events(Some("missing")).is_empty());
    }

    #[test]
    fn append_order_is_preserved_per_type() {
        let bus = EventBus::new();
        bus.publish("e", json!(1));
        bus.publish("e", json!(2));

        let events = bus.get_events(Some("e"));
        assert_eq!(events[0].data, json!(1));
        assert_eq!(events[1].data, json!(2));
    }

    #[test]
    fn subscribe_registers_without_firing() {
        let bus = EventBus::new();
        let fired = Arc::new(Mutex::new(0));
        let fired_clone = fired.clone();

        bus.subscribe("run_completed", move |_| {
            *fired_clone.lock().unwrap() += 1;
        });
        bus.publish("run_completed", json!({}));

        assert_eq!(bus.subscriber_count("run_completed"), 1);
        // Invocation is a documented future extension point.
        assert_eq!(*fired.lock().unwrap(), 0);
    }

    #[test]
    fn concurrent_publishers_never_lose_events() {
        let bus = Arc::new(EventBus::new());
        let mut handles = Vec::new();

        for i in 0..8 {
            let bus = bus.clone();
            handles.push(std::thread::spawn(move || {
                for j in 0..50 {
                    bus.publish("stress", json!({"worker": i, "n": j}));
                }
            }));
        }
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(bus.get_events(Some("stress")).len(), 400);
    }
}
