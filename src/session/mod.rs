//! Per-connection relay session state

pub mod state;

pub use state::{RelayPhase, RelaySession};
