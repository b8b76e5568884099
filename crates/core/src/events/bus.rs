//! Dashboard notification bus and aggregate cache invalidation.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};

use log::debug;

use super::sink::DomainEventSink;
use super::DomainEvent;

/// A dashboard subscriber. Handlers receive each published event at most
/// once and pull fresh aggregates themselves; there is no replay.
pub trait DashboardSubscriber: Send + Sync {
    fn on_event(&self, event: &DomainEvent);
}

/// Registry of dashboard subscribers.
///
/// `register` replaces any handler previously registered under the same
/// id, so a reconnecting dashboard does not receive events twice.
#[derive(Default)]
pub struct NotificationBus {
    subscribers: RwLock<HashMap<String, Arc<dyn DashboardSubscriber>>>,
}

impl NotificationBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a subscriber under an id, replacing any previous one.
    pub fn register(&self, id: impl Into<String>, subscriber: Arc<dyn DashboardSubscriber>) {
        let id = id.into();
        debug!("Notification bus: registering subscriber '{}'", id);
        self.subscribers
            .write()
            .unwrap_or_else(|p| p.into_inner())
            .insert(id, subscriber);
    }

    /// Removes a subscriber.
    pub fn unregister(&self, id: &str) {
        self.subscribers
            .write()
            .unwrap_or_else(|p| p.into_inner())
            .remove(id);
    }

    /// Delivers the event to every registered subscriber, once each.
    pub fn publish(&self, event: &DomainEvent) {
        let subscribers: Vec<Arc<dyn DashboardSubscriber>> = self
            .subscribers
            .read()
            .unwrap_or_else(|p| p.into_inner())
            .values()
            .cloned()
            .collect();

        debug!(
            "Notification bus: publishing to {} subscriber(s)",
            subscribers.len()
        );
        for subscriber in subscribers {
            subscriber.on_event(event);
        }
    }
}

impl DomainEventSink for NotificationBus {
    fn emit(&self, event: DomainEvent) {
        self.publish(&event);
    }
}

/// Cached aggregate views keyed by user, invalidated when a batch lands.
pub trait AggregateCache: Send + Sync {
    fn invalidate_user(&self, user_id: &str);
}

/// No-op cache for contexts without cached aggregates.
#[derive(Clone, Default)]
pub struct NoOpAggregateCache;

impl AggregateCache for NoOpAggregateCache {
    fn invalidate_user(&self, _user_id: &str) {}
}

/// Mock cache for testing - records invalidated user ids.
#[derive(Clone, Default)]
pub struct MockAggregateCache {
    invalidated: Arc<Mutex<Vec<String>>>,
}

impl MockAggregateCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn invalidated(&self) -> Vec<String> {
        self.invalidated.lock().unwrap().clone()
    }
}

impl AggregateCache for MockAggregateCache {
    fn invalidate_user(&self, user_id: &str) {
        self.invalidated.lock().unwrap().push(user_id.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::SyncTotals;
    use chrono::Utc;

    #[derive(Default)]
    struct CountingSubscriber {
        seen: Mutex<usize>,
    }

    impl DashboardSubscriber for CountingSubscriber {
        fn on_event(&self, _event: &DomainEvent) {
            *self.seen.lock().unwrap() += 1;
        }
    }

    fn event() -> DomainEvent {
        DomainEvent::sync_completed("user-1", vec![], SyncTotals::default(), Utc::now())
    }

    #[test]
    fn each_subscriber_sees_a_published_event_once() {
        let bus = NotificationBus::new();
        let a = Arc::new(CountingSubscriber::default());
        let b = Arc::new(CountingSubscriber::default());
        bus.register("a", a.clone());
        bus.register("b", b.clone());

        bus.publish(&event());

        assert_eq!(*a.seen.lock().unwrap(), 1);
        assert_eq!(*b.seen.lock().unwrap(), 1);
    }

    #[test]
    fn re_registering_replaces_the_previous_handler() {
        let bus = NotificationBus::new();
        let old = Arc::new(CountingSubscriber::default());
        let new = Arc::new(CountingSubscriber::default());
        bus.register("dashboard", old.clone());
        bus.register("dashboard", new.clone());

        bus.publish(&event());

        assert_eq!(*old.seen.lock().unwrap(), 0);
        assert_eq!(*new.seen.lock().unwrap(), 1);
    }

    #[test]
    fn unregistered_subscribers_stop_receiving() {
        let bus = NotificationBus::new();
        let sub = Arc::new(CountingSubscriber::default());
        bus.register("dashboard", sub.clone());
        bus.unregister("dashboard");

        bus.publish(&event());
        assert_eq!(*sub.seen.lock().unwrap(), 0);
    }
}
