//! Relay session handler
//!
//! One [`RelayHandler`] per inbound connection mirrors the publisher's
//! stream onto the upstream server.
//!
//! ```text
//!  publisher ──RTMP──▶ server::Connection ──on_*──▶ RelayHandler ──UpstreamStream──▶ upstream
//!                                                   │
//!                                            RelaySession (phase, stats)
//! ```

pub mod handler;

pub use handler::{RelayHandler, RelayHandlerFactory};
