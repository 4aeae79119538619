//! RTMP relay with expiring stream keys
//!
//! Accepts RTMP publishes and mirrors every audio and video frame onto a
//! single fixed upstream server, while an HTTP API issues time-limited
//! main/backup stream key pairs per caller identifier.
//!
//! # Architecture
//!
//! ```text
//!                    ┌──────────────┐   on_connect / on_publish   ┌──────────────┐
//!  publisher ──RTMP──▶ server       │ ─── on_audio / on_video ──▶ │ relay        │──RTMP──▶ upstream
//!                    │ (rml_rtmp)   │         on_close            │ RelayHandler │ (client)
//!                    └──────┬───────┘                             └──────────────┘
//!                           │ ConnectionCounters
//!                    ┌──────▼───────┐        ┌──────────────┐
//!   HTTP client ────▶│ api (axum)   │───────▶│ keystore     │◀── sweep task
//!                    └──────────────┘        └──────────────┘
//! ```
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use rtmp_relay::client::{RtmpConnector, UpstreamConfig};
//! use rtmp_relay::relay::RelayHandlerFactory;
//! use rtmp_relay::server::{RtmpServer, ServerConfig};
//! use rtmp_relay::stats::ConnectionCounters;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let upstream = UpstreamConfig::new("wowza.example.com");
//!     let factory = RelayHandlerFactory::new(RtmpConnector::new(upstream.clone()), upstream);
//!
//!     let server = RtmpServer::new(
//!         ServerConfig::default(),
//!         factory,
//!         Arc::new(ConnectionCounters::new()),
//!     );
//!     server.run().await?;
//!     Ok(())
//! }
//! ```

pub mod api;
pub mod client;
pub mod config;
pub mod error;
pub mod keystore;
pub mod logging;
pub mod relay;
pub mod server;
pub mod session;
pub mod stats;

#[cfg(test)]
pub(crate) mod testutil;

pub use config::AppConfig;
pub use error::{Error, Result};
pub use keystore::{KeyStore, StreamKeyPair};
pub use relay::{RelayHandler, RelayHandlerFactory};
pub use server::{RtmpServer, ServerConfig};
