//! Tracing setup and operation timing

use std::time::Instant;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use uuid::Uuid;

/// Correlation ID attached to one keeper sweep
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CorrelationId(pub String);

impl CorrelationId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

impl Default for CorrelationId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Installs the global subscriber.
///
/// `RUST_LOG` wins when set; otherwise `default_level` applies.
pub fn init_subscriber(default_level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let fmt_layer = fmt::layer()
        .with_target(true)
        .with_thread_names(true)
        .with_file(true)
        .with_line_number(true);

    match tracing_subscriber::registry().with(filter).with(fmt_layer).try_init() {
        Ok(()) => info!(default_level, "Tracing logger initialized"),
        Err(err) => warn!(error = %err, "Tracing subscriber already installed"),
    }
}

/// Runs `f` and records its duration at debug level
pub fn timed<T>(operation: &'static str, f: impl FnOnce() -> T) -> T {
    let start = Instant::now();
    let result = f();
    debug!(
        operation,
        duration_us = start.elapsed().as_micros() as u64,
        "Operation finished"
    );
    result
}
