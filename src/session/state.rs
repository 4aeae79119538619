//! Relay session state machine
//!
//! Tracks one inbound connection from accept to close.

use std::net::SocketAddr;
use std::time::Instant;

use crate::stats::RelayStats;

/// Relay session lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayPhase {
    /// TCP accepted, no `connect` yet
    Accepted,
    /// `connect` accepted, application name known
    Connected,
    /// Upstream publish set up, frames are forwarded
    Publishing,
    /// Session torn down
    Closed,
}

/// Per-connection relay state
#[derive(Debug)]
pub struct RelaySession {
    /// Unique connection ID
    pub connection_id: u64,

    /// Remote peer address
    pub peer_addr: SocketAddr,

    /// Application name from `connect`
    pub app_name: Option<String>,

    /// Publishing name from `publish`, used as the upstream stream key
    pub publishing_name: Option<String>,

    /// Current phase
    pub phase: RelayPhase,

    /// Connection start time
    pub connected_at: Instant,

    pub stats: RelayStats,
}

impl RelaySession {
    pub fn new(connection_id: u64, peer_addr: SocketAddr) -> Self {
        Self {
            connection_id,
            peer_addr,
            app_name: None,
            publishing_name: None,
            phase: RelayPhase::Accepted,
            connected_at: Instant::now(),
            stats: RelayStats::new(),
        }
    }

    /// Record the application name; only valid right after accept
    pub fn connect(&mut self, app: &str) -> bool {
        if self.phase != RelayPhase::Accepted {
            return false;
        }
        self.app_name = Some(app.to_string());
        self.phase = RelayPhase::Connected;
        true
    }

    /// Enter publishing once the upstream is set up
    pub fn start_publishing(&mut self, name: &str) -> bool {
        if self.phase != RelayPhase::Connected {
            return false;
        }
        self.publishing_name = Some(name.to_string());
        self.phase = RelayPhase::Publishing;
        self.stats.mark_started();
        true
    }

    /// Close the session. Returns false if it was already closed.
    pub fn close(&mut self) -> bool {
        if self.phase == RelayPhase::Closed {
            return false;
        }
        self.phase = RelayPhase::Closed;
        true
    }

    pub fn app(&self) -> Option<&str> {
        self.app_name.as_deref()
    }

    pub fn is_publishing(&self) -> bool {
        self.phase == RelayPhase::Publishing
    }

    pub fn is_closed(&self) -> bool {
        self.phase == RelayPhase::Closed
    }

    /// Get session duration
    pub fn duration(&self) -> std::time::Duration {
        self.connected_at.elapsed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::{IpAddr, Ipv4Addr};

    fn session() -> RelaySession {
        let addr = SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 50000);
        RelaySession::new(1, addr)
    }

    #[test]
    fn test_session_lifecycle() {
        let mut state = session();
        assert_eq!(state.phase, RelayPhase::Accepted);

        assert!(state.connect("live"));
        assert_eq!(state.phase, RelayPhase::Connected);
        assert_eq!(state.app(), Some("live"));

        assert!(state.start_publishing("show"));
        assert!(state.is_publishing());
        assert!(state.stats.started_at.is_some());

        assert!(state.close());
        assert!(state.is_closed());
        assert!(!state.close());
    }

    #[test]
    fn test_publish_requires_connect() {
        let mut state = session();

        assert!(!state.start_publishing("show"));
        assert_eq!(state.phase, RelayPhase::Accepted);
        assert!(state.publishing_name.is_none());
    }

    #[test]
    fn test_no_transitions_after_close() {
        let mut state = session();
        state.close();

        assert!(!state.connect("live"));
        assert!(!state.start_publishing("show"));
        assert_eq!(state.phase, RelayPhase::Closed);
    }
}
