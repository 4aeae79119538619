//! Connection counters and per-session forwarding statistics

pub mod metrics;

pub use metrics::{ConnectionCounters, ConnectionGuard, RelayStats, ServerStats};
