//! Core types for target health tracking.

use probe::ProbeReport;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::time::{Duration, SystemTime};

/// Stable identifier of one monitored target
pub type TargetId = u64;

/// Health status of a target.
///
/// Transitions follow the aggregator's state machine: degradation is slow
/// (one failure moves to degraded, exhausting the retry limit moves to down)
/// but recovery is fast (one success restores up).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TargetStatus {
    Unknown,
    Up,
    Degraded,
    Down,
}

impl fmt::Display for TargetStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TargetStatus::Unknown => write!(f, "unknown"),
            TargetStatus::Up => write!(f, "up"),
            TargetStatus::Degraded => write!(f, "degraded"),
            TargetStatus::Down => write!(f, "down"),
        }
    }
}

/// Windowed latency statistics over recent successful attempts.
///
/// Failed and timed-out attempts never enter the window, so percentiles
/// reflect how fast the target answers, not how often it fails.
#[derive(Debug, Clone, Default, Serialize)]
pub struct LatencyStats {
    samples: VecDeque<Duration>,
    total_successes: u64,
}

impl LatencyStats {
    /// Number of successful samples retained for statistics.
    pub const WINDOW: usize = 256;

    /// Record the latency of one successful attempt.
    pub fn record(&mut self, latency: Duration) {
        if self.samples.len() == Self::WINDOW {
            self.samples.pop_front();
        }
        self.samples.push_back(latency);
        self.total_successes += 1;
    }

    /// Total successful attempts observed, including ones aged out of the window.
    pub fn total_successes(&self) -> u64 {
        self.total_successes
    }

    /// Minimum latency over the window
    pub fn min(&self) -> Option<Duration> {
        self.samples.iter().min().copied()
    }

    /// Maximum latency over the window
    pub fn max(&self) -> Option<Duration> {
        self.samples.iter().max().copied()
    }

    /// Average latency over the window
    pub fn avg(&self) -> Option<Duration> {
        if self.samples.is_empty() {
            return None;
        }
        let total: Duration = self.samples.iter().sum();
        Some(total / self.samples.len() as u32)
    }

    /// Nearest-rank percentile over the window, `p` in (0, 100].
    pub fn percentile(&self, p: f64) -> Option<Duration> {
        if self.samples.is_empty() || !(p > 0.0 && p <= 100.0) {
            return None;
        }
        let mut sorted: Vec<Duration> = self.samples.iter().copied().collect();
        sorted.sort_unstable();
        let rank = ((p / 100.0) * sorted.len() as f64).ceil() as usize;
        sorted.get(rank.saturating_sub(1)).copied()
    }
}

/// Rolling health state of one target.
///
/// Mutated only by the aggregator; the publisher copies entries out.
#[derive(Debug, Clone, Serialize)]
pub struct TargetHealth {
    /// Current status
    pub status: TargetStatus,

    /// Consecutive failed cycles
    pub consecutive_failures: u32,

    /// Consecutive successful cycles
    pub consecutive_successes: u32,

    /// Consecutive failed cycles required before degraded becomes down
    pub fall: u32,

    /// Latency statistics over recent successful attempts
    pub latency: LatencyStats,

    /// When the status last changed
    pub last_transition: Option<SystemTime>,

    /// When a probe last succeeded
    pub last_success: Option<SystemTime>,
}

impl TargetHealth {
    /// Create the initial health record for a target.
    pub fn new(fall: u32) -> Self {
        Self {
            status: TargetStatus::Unknown,
            consecutive_failures: 0,
            consecutive_successes: 0,
            fall: fall.max(1),
            latency: LatencyStats::default(),
            last_transition: None,
            last_success: None,
        }
    }
}

/// One scheduled firing of a target, folded into a single result.
///
/// The retry policy runs the initial attempt plus bounded retries; the
/// aggregator only ever sees this one value per cycle.
#[derive(Debug, Clone)]
pub struct CycleResult {
    /// Target the cycle ran against
    pub target: TargetId,

    /// Attempts made this cycle (1 = no retries needed)
    pub attempts: u32,

    /// When the cycle started
    pub started_at: SystemTime,

    /// The cycle's final report: first success, or the last failure
    pub report: ProbeReport,
}

/// A status change of one target.
#[derive(Debug, Clone, Serialize)]
pub struct Transition {
    pub target: TargetId,
    pub from: TargetStatus,
    pub to: TargetStatus,
    pub at: SystemTime,
}

/// Point-in-time copy of every target's health.
#[derive(Debug, Clone)]
pub struct HealthSnapshot {
    pub taken_at: SystemTime,
    pub targets: HashMap<TargetId, TargetHealth>,
}

impl HealthSnapshot {
    /// Health of one target, if it is being monitored
    pub fn get(&self, id: TargetId) -> Option<&TargetHealth> {
        self.targets.get(&id)
    }

    /// Number of targets in the snapshot
    pub fn len(&self) -> usize {
        self.targets.len()
    }

    /// Check if the snapshot is empty
    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }
}
