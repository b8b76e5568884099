//! Domain event types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use tradelog_brokers::Platform;

/// Aggregated counts across one sync batch.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncTotals {
    pub fetched: usize,
    pub created: usize,
    pub updated: usize,
    pub skipped: usize,
}

impl SyncTotals {
    /// Accumulates another set of counts into this one.
    pub fn add(&mut self, other: SyncTotals) {
        self.fetched += other.fetched;
        self.created += other.created;
        self.updated += other.updated;
        self.skipped += other.skipped;
    }
}

/// Domain events emitted after successful mutations.
///
/// These events represent facts about journal data changes. Subscribers
/// translate them into their own actions (dashboard refresh, cache
/// rebuild); they pull fresh aggregates on receipt rather than reading
/// payload deltas.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DomainEvent {
    /// A sync batch finished, successfully or not. Emitted even when the
    /// batch produced zero new trades.
    SyncCompleted {
        user_id: String,
        platforms: Vec<Platform>,
        totals: SyncTotals,
        completed_at: DateTime<Utc>,
    },
}

impl DomainEvent {
    /// Creates a SyncCompleted event.
    pub fn sync_completed(
        user_id: impl Into<String>,
        platforms: Vec<Platform>,
        totals: SyncTotals,
        completed_at: DateTime<Utc>,
    ) -> Self {
        Self::SyncCompleted {
            user_id: user_id.into(),
            platforms,
            totals,
            completed_at,
        }
    }

    /// The user the event belongs to.
    pub fn user_id(&self) -> &str {
        match self {
            DomainEvent::SyncCompleted { user_id, .. } => user_id,
        }
    }
}
