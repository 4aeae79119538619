//! RTMP server side
//!
//! Accepts publisher connections and drives one [`SessionHandler`] per
//! connection.
//!
//! ```text
//! TcpListener ──accept──▶ RtmpServer ──spawn──▶ Connection ──callbacks──▶ SessionHandler
//!                              │                    │
//!                     ConnectionCounters      rml_rtmp ServerSession
//! ```

pub mod config;
pub mod connection;
pub mod handler;
pub mod listener;

pub use config::ServerConfig;
pub use connection::Connection;
pub use handler::{HandlerFactory, SessionHandler};
pub use listener::RtmpServer;
