//! network-monitor engine
//!
//! Network-reachability and health-probing core: schedules connectivity
//! checks for a set of monitored endpoints, folds the results into rolling
//! per-target health state and publishes that state to external consumers.
//!
//! # Components
//!
//! - **Scheduler**: per-target timers with startup jitter, a bounded slot
//!   pool, and single-flight per target
//! - **Retry policy**: bounded in-cycle retries with capped exponential
//!   backoff
//! - **Aggregator**: the unknown → up → degraded → down state machine and
//!   windowed latency statistics
//! - **Publisher**: consistent snapshots (pull) and a transition event
//!   stream (push)
//!
//! Probing itself lives in the `probe` crate; configuration loading is in
//! [`config`].

pub mod aggregator;
pub mod config;
pub mod engine;
pub mod publisher;
pub mod retry;
pub mod scheduler;
pub mod types;

pub use aggregator::Aggregator;
pub use config::{Config, ConfigError, EngineSettings, ProbeKindConfig, TargetConfig};
pub use engine::MonitorEngine;
pub use publisher::HealthPublisher;
pub use retry::RetryPolicy;
pub use scheduler::Scheduler;
pub use types::{
    CycleResult, HealthSnapshot, LatencyStats, TargetHealth, TargetId, TargetStatus, Transition,
};
