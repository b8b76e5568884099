//! Batch completion notifier.

use std::sync::Arc;

use chrono::Utc;
use log::debug;

use tradelog_brokers::Platform;
use tradelog_core::events::{AggregateCache, DomainEvent, NotificationBus, SyncTotals};

/// Publishes batch-completion events and invalidates cached aggregates.
pub struct BatchNotifier {
    bus: Arc<NotificationBus>,
    cache: Arc<dyn AggregateCache>,
}

impl BatchNotifier {
    pub fn new(bus: Arc<NotificationBus>, cache: Arc<dyn AggregateCache>) -> Self {
        Self { bus, cache }
    }

    /// Notifies subscribers that a batch finished, even with zero new
    /// trades. The cache is invalidated before publishing so subscribers
    /// pulling aggregates on receipt see fresh data.
    pub fn notify_completed(&self, user_id: &str, platforms: Vec<Platform>, totals: SyncTotals) {
        debug!(
            "Publishing sync completion for {} ({} created, {} updated)",
            user_id, totals.created, totals.updated
        );
        self.cache.invalidate_user(user_id);
        self.bus.publish(&DomainEvent::sync_completed(
            user_id,
            platforms,
            totals,
            Utc::now(),
        ));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use tradelog_core::events::{DashboardSubscriber, MockAggregateCache};

    #[derive(Default)]
    struct Collector {
        events: Mutex<Vec<DomainEvent>>,
    }

    impl DashboardSubscriber for Collector {
        fn on_event(&self, event: &DomainEvent) {
            self.events.lock().unwrap().push(event.clone());
        }
    }

    #[test]
    fn publishes_once_and_invalidates_the_user() {
        let bus = Arc::new(NotificationBus::new());
        let cache = Arc::new(MockAggregateCache::new());
        let collector = Arc::new(Collector::default());
        bus.register("dashboard", collector.clone());

        let notifier = BatchNotifier::new(bus, cache.clone());
        notifier.notify_completed("user-1", vec![Platform::Dhan], SyncTotals::default());

        assert_eq!(cache.invalidated(), vec!["user-1".to_string()]);

        let events = collector.events.lock().unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].user_id(), "user-1");
    }
}
