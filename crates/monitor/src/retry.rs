//! In-cycle retry with capped exponential backoff.
//!
//! A cycle is one scheduled firing of a target: the initial attempt plus up
//! to `limit` retries. The aggregator sees exactly one [`CycleResult`] per
//! cycle — retries are an implementation detail of "did this cycle succeed".

use crate::types::{CycleResult, TargetId};
use probe::Prober;
use rand::Rng;
use std::time::{Duration, SystemTime};
use tokio::time::Instant;
use tracing::debug;

/// Retry policy applied within one probe cycle.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Retries after the initial attempt
    pub limit: u32,

    /// Base backoff delay, doubled per attempt
    pub base_delay: Duration,

    /// Upper bound on a single backoff delay
    pub max_delay: Duration,
}

impl RetryPolicy {
    /// Create a new retry policy
    pub fn new(limit: u32, base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            limit,
            base_delay,
            max_delay,
        }
    }

    /// Calculate the backoff delay before retry number `attempt` (1-based),
    /// capped and with up to 10% jitter.
    pub fn backoff(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::from_millis(0);
        }

        let base_ms = self.base_delay.as_millis() as u64;
        let exponential_base = 2u64.saturating_pow(attempt - 1);
        let delay_ms = base_ms.saturating_mul(exponential_base);
        let capped_delay = delay_ms.min(self.max_delay.as_millis() as u64);

        // Apply jitter (0 to 10% of the delay)
        let jitter_range = capped_delay / 10;
        let jitter = if jitter_range > 0 {
            rand::thread_rng().gen_range(0..jitter_range)
        } else {
            0
        };

        Duration::from_millis(capped_delay + jitter)
    }
}

/// Run one full probe cycle against a target.
///
/// Each attempt gets a fresh absolute deadline of `timeout` from its start.
/// The first success ends the cycle; exhausting the retry limit reports the
/// last failure's outcome.
pub async fn run_cycle(
    target: TargetId,
    prober: &dyn Prober,
    policy: &RetryPolicy,
    timeout: Duration,
) -> CycleResult {
    let started_at = SystemTime::now();
    let mut attempt: u32 = 1;

    loop {
        let deadline = Instant::now() + timeout;
        let report = prober.probe(deadline).await;

        if report.is_success() || attempt > policy.limit {
            return CycleResult {
                target,
                attempts: attempt,
                started_at,
                report,
            };
        }

        let delay = policy.backoff(attempt);
        debug!(
            id = target,
            attempt,
            outcome = %report.outcome,
            delay_ms = delay.as_millis() as u64,
            "Probe attempt failed, retrying after backoff"
        );
        tokio::time::sleep(delay).await;
        attempt += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use probe::{OutcomeKind, ProbeReport};
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// Prober that replays a fixed sequence of reports.
    struct ScriptedProber {
        reports: Mutex<VecDeque<ProbeReport>>,
    }

    impl ScriptedProber {
        fn new(reports: Vec<ProbeReport>) -> Self {
            Self {
                reports: Mutex::new(reports.into()),
            }
        }
    }

    #[async_trait]
    impl Prober for ScriptedProber {
        async fn probe(&self, _deadline: Instant) -> ProbeReport {
            self.reports
                .lock()
                .unwrap()
                .pop_front()
                .expect("scripted prober ran out of reports")
        }

        fn kind(&self) -> &'static str {
            "scripted"
        }
    }

    #[test]
    fn test_backoff_calculation() {
        let policy = RetryPolicy::new(3, Duration::from_millis(100), Duration::from_secs(2));

        let b1 = policy.backoff(1);
        assert!(b1.as_millis() >= 100);

        let b2 = policy.backoff(2);
        assert!(b2.as_millis() >= 200);

        // Far past the cap: stays bounded by cap + 10% jitter.
        let max = policy.backoff(10);
        assert!(max.as_millis() >= 2000);
        assert!(max.as_millis() <= 2200);
    }

    #[test]
    fn test_backoff_zero_attempt() {
        let policy = RetryPolicy::new(3, Duration::from_millis(100), Duration::from_secs(2));
        assert_eq!(policy.backoff(0), Duration::from_millis(0));
    }

    #[tokio::test]
    async fn test_cycle_stops_on_first_success() {
        let prober = ScriptedProber::new(vec![ProbeReport::success(Duration::from_millis(5))]);
        let policy = RetryPolicy::new(3, Duration::from_millis(1), Duration::from_millis(2));

        let result = run_cycle(1, &prober, &policy, Duration::from_secs(1)).await;
        assert_eq!(result.attempts, 1);
        assert!(result.report.is_success());
    }

    #[tokio::test]
    async fn test_cycle_success_on_retry_is_cycle_success() {
        let prober = ScriptedProber::new(vec![
            ProbeReport::connect_error("connection refused"),
            ProbeReport::connect_error("connection refused"),
            ProbeReport::success(Duration::from_millis(7)),
        ]);
        let policy = RetryPolicy::new(3, Duration::from_millis(1), Duration::from_millis(2));

        let result = run_cycle(1, &prober, &policy, Duration::from_secs(1)).await;
        assert_eq!(result.attempts, 3);
        assert!(result.report.is_success());
        assert_eq!(result.report.latency, Some(Duration::from_millis(7)));
    }

    #[tokio::test]
    async fn test_cycle_exhaustion_reports_last_failure() {
        let prober = ScriptedProber::new(vec![
            ProbeReport::connect_error("connection refused"),
            ProbeReport::timeout(),
            ProbeReport::tls_error("handshake failed"),
        ]);
        let policy = RetryPolicy::new(2, Duration::from_millis(1), Duration::from_millis(2));

        let result = run_cycle(1, &prober, &policy, Duration::from_secs(1)).await;
        assert_eq!(result.attempts, 3);
        assert_eq!(result.report.outcome, OutcomeKind::TlsError);
    }

    #[tokio::test]
    async fn test_zero_retries_is_single_attempt() {
        let prober = ScriptedProber::new(vec![ProbeReport::timeout()]);
        let policy = RetryPolicy::new(0, Duration::from_millis(1), Duration::from_millis(2));

        let result = run_cycle(1, &prober, &policy, Duration::from_secs(1)).await;
        assert_eq!(result.attempts, 1);
        assert_eq!(result.report.outcome, OutcomeKind::Timeout);
    }
}
