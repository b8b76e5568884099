//! Domain events, the dashboard notification bus, and aggregate cache
//! invalidation.

mod bus;
mod domain_event;
mod sink;

pub use bus::{
    AggregateCache, DashboardSubscriber, MockAggregateCache, NoOpAggregateCache, NotificationBus,
};
pub use domain_event::{DomainEvent, SyncTotals};
pub use sink::{DomainEventSink, MockDomainEventSink, NoOpDomainEventSink};
