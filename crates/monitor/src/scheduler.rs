//! Probe scheduling: per-target timers, bounded concurrency, reload.
//!
//! Each target runs its own task. The loop body executes one full probe
//! cycle inline, so a target never has more than one cycle in flight;
//! overlapping timer fires coalesce via `MissedTickBehavior::Skip`. A global
//! semaphore bounds concurrent cycles across targets — when every slot is
//! busy a cycle waits for one rather than being dropped.

use crate::aggregator::Aggregator;
use crate::config::TargetConfig;
use crate::retry::{RetryPolicy, run_cycle};
use crate::types::{CycleResult, TargetId};
use dashmap::DashMap;
use probe::Prober;
use rand::Rng;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Semaphore, broadcast, mpsc};
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

/// Schedules probe cycles for all configured targets.
pub struct Scheduler {
    /// Active targets mapped by id
    targets: Arc<DashMap<TargetId, TargetEntry>>,

    /// Global probe cycle slots
    slots: Arc<Semaphore>,

    /// Channel to the aggregator
    result_tx: mpsc::Sender<CycleResult>,

    /// Backoff bounds for in-cycle retries
    backoff_base: Duration,
    backoff_cap: Duration,
}

/// State for one scheduled target
struct TargetEntry {
    config: TargetConfig,
    stop_tx: broadcast::Sender<()>,
}

impl Scheduler {
    /// Create a new scheduler with `slots` concurrent probe cycle slots.
    pub fn new(
        slots: usize,
        result_tx: mpsc::Sender<CycleResult>,
        backoff_base: Duration,
        backoff_cap: Duration,
    ) -> Self {
        Self {
            targets: Arc::new(DashMap::new()),
            slots: Arc::new(Semaphore::new(slots)),
            result_tx,
            backoff_base,
            backoff_cap,
        }
    }

    /// Apply a full target list: add new targets, remove absent ones,
    /// restart changed ones.
    ///
    /// Each entry is accepted or rejected individually; a target that fails
    /// to build its prober is skipped with a warning.
    pub fn apply_targets(&self, aggregator: &Aggregator, configs: Vec<TargetConfig>) {
        debug!("Applying {} target configs", configs.len());

        let new_ids: HashSet<TargetId> = configs.iter().map(|c| c.id).collect();

        // Remove deleted targets. Deregistering first guarantees an
        // in-flight cycle's late result is discarded, not applied.
        self.targets.retain(|id, entry| {
            if !new_ids.contains(id) {
                info!(id = *id, "Removing target");
                aggregator.deregister(*id);
                let _ = entry.stop_tx.send(());
                false
            } else {
                true
            }
        });

        for config in configs {
            if let Some(entry) = self.targets.get(&config.id) {
                if entry.config == config {
                    continue;
                }
                // Changed descriptor: replace wholesale. Health state for
                // the id survives; only the timer restarts.
                info!(id = config.id, "Updating target config");
                let _ = entry.stop_tx.send(());
                drop(entry);
                self.targets.remove(&config.id);
            }
            self.add_target(aggregator, config);
        }
    }

    /// Remove every target and stop its timer.
    pub fn stop_all(&self, aggregator: &Aggregator) {
        self.targets.retain(|id, entry| {
            aggregator.deregister(*id);
            let _ = entry.stop_tx.send(());
            false
        });
    }

    /// Number of currently scheduled targets
    pub fn target_count(&self) -> usize {
        self.targets.len()
    }

    fn add_target(&self, aggregator: &Aggregator, config: TargetConfig) {
        let prober = match config.build_prober() {
            Ok(prober) => prober,
            Err(e) => {
                warn!(id = config.id, host = %config.host, error = %e, "Rejecting target");
                return;
            }
        };

        info!(
            id = config.id,
            host = %config.host,
            port = config.port,
            kind = prober.kind(),
            interval_ms = config.interval.as_millis() as u64,
            "Adding target"
        );

        aggregator.register(config.id, config.retries);

        let (stop_tx, stop_rx) = broadcast::channel(1);
        let policy = RetryPolicy::new(config.retries, self.backoff_base, self.backoff_cap);
        let slots = self.slots.clone();
        let result_tx = self.result_tx.clone();

        self.targets.insert(
            config.id,
            TargetEntry {
                config: config.clone(),
                stop_tx,
            },
        );

        tokio::spawn(async move {
            probe_loop(config, prober, policy, slots, result_tx, stop_rx).await;
        });
    }
}

/// Run the probe loop for a single target.
async fn probe_loop(
    config: TargetConfig,
    prober: Arc<dyn Prober>,
    policy: RetryPolicy,
    slots: Arc<Semaphore>,
    result_tx: mpsc::Sender<CycleResult>,
    mut stop_rx: broadcast::Receiver<()>,
) {
    // Stagger startup so targets sharing an interval do not all fire at once.
    let interval_ms = config.interval.as_millis().max(1) as u64;
    let jitter = Duration::from_millis(rand::thread_rng().gen_range(0..interval_ms));
    tokio::select! {
        _ = stop_rx.recv() => return,
        _ = tokio::time::sleep(jitter) => {}
    }

    let mut ticker = tokio::time::interval(config.interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = stop_rx.recv() => break,
            _ = ticker.tick() => {
                // Wait for a free slot; the cycle is deferred, never dropped.
                // A removal that lands while this cycle is parked here must
                // still win: no probe is dispatched after the stop signal.
                let permit = tokio::select! {
                    _ = stop_rx.recv() => break,
                    acquired = slots.clone().acquire_owned() => match acquired {
                        Ok(permit) => permit,
                        Err(_) => break,
                    },
                };

                let result = run_cycle(config.id, prober.as_ref(), &policy, config.timeout).await;
                drop(permit);

                if result_tx.send(result).await.is_err() {
                    break;
                }
            }
        }
    }

    debug!(id = config.id, "Probe loop stopped");
}
