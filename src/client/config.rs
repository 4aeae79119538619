//! Upstream client configuration

use std::net::Ipv6Addr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::upstream::DEFAULT_CHUNK_SIZE;
use crate::error::{Error, Result};

/// Default RTMP port
pub const DEFAULT_RTMP_PORT: u16 = 1935;

/// Upstream server configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct UpstreamConfig {
    /// Upstream host, `host[:port]`, optionally prefixed with `rtmp://`
    pub host: String,

    /// Bound on each setup step and each frame write, in seconds (0 = no bound)
    pub timeout_secs: u64,

    /// Chunk size requested for outbound streams
    pub chunk_size: u32,

    /// Enable TCP_NODELAY on upstream sockets
    pub tcp_nodelay: bool,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            host: String::new(),
            timeout_secs: 10,
            chunk_size: DEFAULT_CHUNK_SIZE,
            tcp_nodelay: true,
        }
    }
}

impl UpstreamConfig {
    /// Create a config pointing at `host`
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            ..Default::default()
        }
    }

    /// Set the per-operation timeout
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout_secs = timeout.as_secs();
        self
    }

    /// Set the outbound chunk size
    pub fn chunk_size(mut self, size: u32) -> Self {
        self.chunk_size = size;
        self
    }

    /// Per-operation bound, if any
    pub fn operation_timeout(&self) -> Option<Duration> {
        (self.timeout_secs > 0).then(|| Duration::from_secs(self.timeout_secs))
    }

    /// Socket address string to dial, with the default port filled in
    pub fn address(&self) -> Result<String> {
        let host = match self.host.split_once("://") {
            Some(("rtmp", rest)) => rest,
            Some((scheme, _)) => {
                return Err(Error::Config(format!(
                    "unsupported upstream scheme: {}",
                    scheme
                )))
            }
            None => self.host.as_str(),
        };
        let host = host.trim_end_matches('/');

        if host.is_empty() {
            return Err(Error::Config("upstream host is empty".into()));
        }

        // Bare IPv6 literals carry colons but no port
        if host.parse::<Ipv6Addr>().is_ok() {
            return Ok(format!("[{}]:{}", host, DEFAULT_RTMP_PORT));
        }

        let has_port = host
            .rsplit_once(':')
            .map(|(addr, port)| {
                port.parse::<u16>().is_ok() && (!addr.starts_with('[') || addr.ends_with(']'))
            })
            .unwrap_or(false);

        if has_port {
            Ok(host.to_string())
        } else {
            Ok(format!("{}:{}", host, DEFAULT_RTMP_PORT))
        }
    }
}
