//! Inbound session callbacks
//!
//! The transport calls these in order for each connection: `on_connect`,
//! `on_publish`, any number of `on_audio` / `on_video`, then `on_close`
//! exactly once. Calls for one connection never overlap.

use std::future::Future;
use std::net::SocketAddr;

use tokio::io::AsyncRead;

use crate::error::Result;

/// Per-connection event handler
pub trait SessionHandler: Send + 'static {
    /// Client sent `connect` for `app`. An error rejects the connection.
    fn on_connect(&mut self, timestamp: u32, app: &str) -> impl Future<Output = Result<()>> + Send;

    /// Client asked to publish under `name`. An error rejects the connection.
    fn on_publish(&mut self, timestamp: u32, name: &str)
        -> impl Future<Output = Result<()>> + Send;

    /// Audio frame body
    fn on_audio<R>(&mut self, timestamp: u32, payload: R) -> impl Future<Output = Result<()>> + Send
    where
        R: AsyncRead + Unpin + Send;

    /// Video frame body
    fn on_video<R>(&mut self, timestamp: u32, payload: R) -> impl Future<Output = Result<()>> + Send
    where
        R: AsyncRead + Unpin + Send;

    /// Connection ended, for whatever reason
    fn on_close(&mut self) -> impl Future<Output = ()> + Send;
}

/// Builds one handler per accepted connection
pub trait HandlerFactory: Send + Sync + 'static {
    type Handler: SessionHandler;

    fn create(&self, connection_id: u64, peer_addr: SocketAddr) -> Self::Handler;
}
