//! Engine wiring: scheduler → aggregator → publisher.

use crate::aggregator::Aggregator;
use crate::config::{EngineSettings, TargetConfig};
use crate::publisher::HealthPublisher;
use crate::scheduler::Scheduler;
use crate::types::{CycleResult, TargetHealth, TargetId, Transition};
use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc};
use tracing::info;

/// The probing engine: owns the scheduler, the aggregator task and the
/// shared health registry.
///
/// Must be created inside a tokio runtime; the aggregator task is spawned
/// on construction.
pub struct MonitorEngine {
    scheduler: Scheduler,
    aggregator: Arc<Aggregator>,
    publisher: HealthPublisher,
}

impl MonitorEngine {
    /// Create a new engine from settings.
    pub fn new(settings: &EngineSettings) -> Self {
        let healths: Arc<DashMap<TargetId, TargetHealth>> = Arc::new(DashMap::new());
        let (transition_tx, _) = broadcast::channel::<Transition>(settings.event_capacity);
        let (result_tx, mut result_rx) = mpsc::channel::<CycleResult>(settings.result_channel);

        let aggregator = Arc::new(Aggregator::new(healths.clone(), transition_tx.clone()));
        let publisher = HealthPublisher::new(healths, transition_tx);

        let agg = aggregator.clone();
        tokio::spawn(async move {
            while let Some(result) = result_rx.recv().await {
                agg.apply(&result);
            }
            info!("Aggregator task stopped");
        });

        let scheduler = Scheduler::new(
            settings.max_concurrent_probes,
            result_tx,
            settings.backoff_base,
            settings.backoff_cap,
        );

        Self {
            scheduler,
            aggregator,
            publisher,
        }
    }

    /// Apply a target list, at startup or on reload.
    pub fn apply_targets(&self, configs: Vec<TargetConfig>) {
        self.scheduler.apply_targets(&self.aggregator, configs);
    }

    /// Read-side handle for snapshots and transition events.
    pub fn publisher(&self) -> &HealthPublisher {
        &self.publisher
    }

    /// Number of currently scheduled targets
    pub fn target_count(&self) -> usize {
        self.scheduler.target_count()
    }

    /// Stop all probe timers and clear the registry.
    pub fn shutdown(&self) {
        info!("Stopping all probe timers");
        self.scheduler.stop_all(&self.aggregator);
    }
}
