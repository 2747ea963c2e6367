//! Connectivity probing for network-monitor.
//!
//! This crate provides single-shot reachability checks against monitored
//! endpoints with four probe kinds:
//! - TCP connect checks
//! - TLS handshake checks (with optional certificate verification)
//! - HTTP/HTTPS checks
//! - WebSocket upgrade/echo checks
//!
//! # Design
//!
//! A [`Prober`] is stateless and pure: it takes an absolute deadline and
//! returns a [`ProbeReport`]. It never retries, never mutates shared state,
//! and never raises ordinary network failures as errors — the outcome
//! taxonomy (`success` / `timeout` / `connect-error` / `tls-error` /
//! `http-error`) is part of the report so callers can distinguish
//! "unreachable" from "slow" from "untrusted".
//!
//! # Example
//!
//! ```no_run
//! use probe::{Prober, TcpProber};
//! use std::time::Duration;
//! use tokio::time::Instant;
//!
//! # async fn example() {
//! let prober = TcpProber::new("192.168.1.100:80".parse().unwrap());
//! let report = prober.probe(Instant::now() + Duration::from_secs(2)).await;
//!
//! if report.is_success() {
//!     println!("reachable in {:?}", report.latency.unwrap());
//! }
//! # }
//! ```

pub mod checkers;
pub mod types;

pub use checkers::{HttpProber, Prober, TcpProber, TlsProber, WsProber};
pub use types::{OutcomeKind, ProbeReport};

// HTTP probers are configured with this method type.
pub use reqwest::Method;
