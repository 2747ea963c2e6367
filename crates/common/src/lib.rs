//! Common utilities and types shared across network-monitor components.

pub mod error;
pub mod logging;

pub use error::{Error, Result};
