//! Probe outcome types and structures.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Kind of a completed probe attempt's outcome.
///
/// The four failure kinds are first-class and never coalesced: downstream
/// aggregation must be able to tell "unreachable" from "slow" from "untrusted".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OutcomeKind {
    /// Check completed successfully before the deadline
    Success,
    /// Deadline exceeded at any stage
    Timeout,
    /// Connection refused, unreachable or routing failure
    ConnectError,
    /// TLS handshake or certificate validation failure
    TlsError,
    /// Unexpected status or malformed response
    HttpError,
}

impl OutcomeKind {
    /// Check if this outcome is a success
    pub fn is_success(&self) -> bool {
        *self == OutcomeKind::Success
    }
}

impl fmt::Display for OutcomeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutcomeKind::Success => write!(f, "success"),
            OutcomeKind::Timeout => write!(f, "timeout"),
            OutcomeKind::ConnectError => write!(f, "connect-error"),
            OutcomeKind::TlsError => write!(f, "tls-error"),
            OutcomeKind::HttpError => write!(f, "http-error"),
        }
    }
}

/// Result of one probe attempt.
#[derive(Debug, Clone)]
pub struct ProbeReport {
    /// Outcome of the attempt
    pub outcome: OutcomeKind,

    /// Measured latency, present only on success
    pub latency: Option<Duration>,

    /// Optional error detail
    pub detail: Option<String>,

    /// Response code (for HTTP probes)
    pub response_code: Option<u16>,
}

impl ProbeReport {
    /// Create a successful report with the measured latency
    pub fn success(latency: Duration) -> Self {
        Self {
            outcome: OutcomeKind::Success,
            latency: Some(latency),
            detail: None,
            response_code: None,
        }
    }

    /// Create a timeout report
    pub fn timeout() -> Self {
        Self {
            outcome: OutcomeKind::Timeout,
            latency: None,
            detail: Some("probe deadline exceeded".to_string()),
            response_code: None,
        }
    }

    /// Create a connect-error report
    pub fn connect_error(detail: impl fmt::Display) -> Self {
        Self {
            outcome: OutcomeKind::ConnectError,
            latency: None,
            detail: Some(detail.to_string()),
            response_code: None,
        }
    }

    /// Create a tls-error report
    pub fn tls_error(detail: impl fmt::Display) -> Self {
        Self {
            outcome: OutcomeKind::TlsError,
            latency: None,
            detail: Some(detail.to_string()),
            response_code: None,
        }
    }

    /// Create an http-error report
    pub fn http_error(detail: impl fmt::Display) -> Self {
        Self {
            outcome: OutcomeKind::HttpError,
            latency: None,
            detail: Some(detail.to_string()),
            response_code: None,
        }
    }

    /// Attach an HTTP response code
    pub fn with_code(mut self, code: u16) -> Self {
        self.response_code = Some(code);
        self
    }

    /// Check if the attempt succeeded
    pub fn is_success(&self) -> bool {
        self.outcome.is_success()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outcome_kind_display() {
        assert_eq!(OutcomeKind::Success.to_string(), "success");
        assert_eq!(OutcomeKind::Timeout.to_string(), "timeout");
        assert_eq!(OutcomeKind::ConnectError.to_string(), "connect-error");
        assert_eq!(OutcomeKind::TlsError.to_string(), "tls-error");
        assert_eq!(OutcomeKind::HttpError.to_string(), "http-error");
    }

    #[test]
    fn test_success_report_carries_latency() {
        let report = ProbeReport::success(Duration::from_millis(12));
        assert!(report.is_success());
        assert_eq!(report.latency, Some(Duration::from_millis(12)));
        assert!(report.detail.is_none());
    }

    #[test]
    fn test_failure_reports_carry_no_latency() {
        let report = ProbeReport::connect_error("connection refused");
        assert!(!report.is_success());
        assert!(report.latency.is_none());
        assert_eq!(report.detail.as_deref(), Some("connection refused"));

        let report = ProbeReport::timeout();
        assert_eq!(report.outcome, OutcomeKind::Timeout);
        assert!(report.latency.is_none());
    }

    #[test]
    fn test_with_code() {
        let report = ProbeReport::http_error("unexpected status code: 503").with_code(503);
        assert_eq!(report.response_code, Some(503));
        assert_eq!(report.outcome, OutcomeKind::HttpError);
    }
}
