//! Result aggregation and the per-target health state machine.
//!
//! # State transitions
//! ```text
//! unknown/up → degraded: first failed cycle after a success streak
//! degraded → down:       consecutive failed cycles reach the fall threshold
//! degraded/down → up:    a single successful cycle
//! ```
//!
//! Degradation is slow and recovery is fast: one good probe restores trust,
//! trust is lost only after exhausting retries.

use crate::types::{CycleResult, TargetHealth, TargetId, TargetStatus, Transition};
use dashmap::DashMap;
use std::sync::Arc;
use std::time::SystemTime;
use tokio::sync::broadcast;
use tracing::{debug, info};

/// Folds cycle results into per-target health state.
///
/// The registry is shared with the publisher; every mutation of a health
/// record happens under its shard lock, so readers copying an entry out
/// never observe it mid-update.
pub struct Aggregator {
    healths: Arc<DashMap<TargetId, TargetHealth>>,
    transitions: broadcast::Sender<Transition>,
}

impl Aggregator {
    /// Create a new aggregator over a shared health registry
    pub fn new(
        healths: Arc<DashMap<TargetId, TargetHealth>>,
        transitions: broadcast::Sender<Transition>,
    ) -> Self {
        Self {
            healths,
            transitions,
        }
    }

    /// Register a target, creating its health record on first sight.
    ///
    /// `fall` is the consecutive-failure threshold for the down transition
    /// (floor of 1). Re-registering an existing target updates the threshold
    /// but keeps the accumulated health state.
    pub fn register(&self, id: TargetId, fall: u32) {
        match self.healths.get_mut(&id) {
            Some(mut entry) => {
                entry.value_mut().fall = fall.max(1);
            }
            None => {
                self.healths.insert(id, TargetHealth::new(fall));
            }
        }
    }

    /// Remove a target's health record.
    ///
    /// Results still in flight for the target are discarded by [`apply`]
    /// from here on.
    ///
    /// [`apply`]: Aggregator::apply
    pub fn deregister(&self, id: TargetId) {
        self.healths.remove(&id);
    }

    /// Fold one completed cycle into the target's health.
    ///
    /// Results for unregistered targets are discarded without mutating
    /// anything.
    pub fn apply(&self, result: &CycleResult) {
        let Some(mut entry) = self.healths.get_mut(&result.target) else {
            debug!(id = result.target, "Discarding result for removed target");
            return;
        };
        let health = entry.value_mut();
        let now = SystemTime::now();
        let old_status = health.status;

        let new_status = if result.report.is_success() {
            health.consecutive_successes += 1;
            health.consecutive_failures = 0;
            if let Some(latency) = result.report.latency {
                health.latency.record(latency);
            }
            health.last_success = Some(now);
            TargetStatus::Up
        } else {
            health.consecutive_failures += 1;
            health.consecutive_successes = 0;
            if health.consecutive_failures >= health.fall {
                TargetStatus::Down
            } else {
                TargetStatus::Degraded
            }
        };

        if new_status != old_status {
            health.status = new_status;
            health.last_transition = Some(now);
            drop(entry);

            info!(
                id = result.target,
                from = %old_status,
                to = %new_status,
                outcome = %result.report.outcome,
                "Health status changed"
            );

            // No subscribers is fine; the engine may run pull-only.
            let _ = self.transitions.send(Transition {
                target: result.target,
                from: old_status,
                to: new_status,
                at: now,
            });
        }
    }

    /// Check if a target is registered
    pub fn contains(&self, id: TargetId) -> bool {
        self.healths.contains_key(&id)
    }
}
