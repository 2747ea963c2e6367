//! Health publication: snapshots on demand, transitions as a stream.

use crate::types::{HealthSnapshot, TargetHealth, TargetId, Transition};
use dashmap::DashMap;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::SystemTime;
use tokio::sync::broadcast;

/// Read-side view of the health registry.
///
/// Snapshots copy entries out one at a time under the shard lock, so a read
/// never blocks the aggregator across entries and never observes a target
/// mid-update. Delivery of either surface downstream is not owned here.
#[derive(Clone)]
pub struct HealthPublisher {
    healths: Arc<DashMap<TargetId, TargetHealth>>,
    transitions: broadcast::Sender<Transition>,
}

impl HealthPublisher {
    /// Create a publisher over the shared health registry
    pub fn new(
        healths: Arc<DashMap<TargetId, TargetHealth>>,
        transitions: broadcast::Sender<Transition>,
    ) -> Self {
        Self {
            healths,
            transitions,
        }
    }

    /// Produce a point-in-time copy of every target's health.
    pub fn snapshot(&self) -> HealthSnapshot {
        let mut targets = HashMap::with_capacity(self.healths.len());
        for entry in self.healths.iter() {
            targets.insert(*entry.key(), entry.value().clone());
        }

        HealthSnapshot {
            taken_at: SystemTime::now(),
            targets,
        }
    }

    /// Health of a single target, if monitored
    pub fn health(&self, id: TargetId) -> Option<TargetHealth> {
        self.healths.get(&id).map(|entry| entry.value().clone())
    }

    /// Subscribe to status transition events.
    ///
    /// One event is delivered per status change; a slow subscriber that
    /// falls behind the channel capacity observes a lag error, never a
    /// blocked aggregator.
    pub fn subscribe(&self) -> broadcast::Receiver<Transition> {
        self.transitions.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::TargetStatus;

    #[test]
    fn test_snapshot_copies_state() {
        let healths = Arc::new(DashMap::new());
        let (tx, _rx) = broadcast::channel(16);
        let publisher = HealthPublisher::new(healths.clone(), tx);

        healths.insert(1, TargetHealth::new(2));
        healths.insert(2, TargetHealth::new(3));

        let snapshot = publisher.snapshot();
        assert_eq!(snapshot.len(), 2);
        assert_eq!(snapshot.get(1).unwrap().status, TargetStatus::Unknown);

        // Later mutations do not leak into the copy.
        healths.get_mut(&1).unwrap().status = TargetStatus::Down;
        assert_eq!(snapshot.get(1).unwrap().status, TargetStatus::Unknown);
    }

    #[test]
    fn test_single_target_lookup() {
        let healths = Arc::new(DashMap::new());
        let (tx, _rx) = broadcast::channel(16);
        let publisher = HealthPublisher::new(healths.clone(), tx);

        assert!(publisher.health(9).is_none());
        healths.insert(9, TargetHealth::new(1));
        assert!(publisher.health(9).is_some());
    }
}
