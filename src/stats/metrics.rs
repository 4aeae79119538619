//! Statistics and metrics for relay sessions

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;

use crate::error::MediaKind;

/// Process-wide connection counters
///
/// Observability only; nothing depends on their exact values.
#[derive(Debug, Default)]
pub struct ConnectionCounters {
    total: AtomicU64,
    active: AtomicU64,
}

impl ConnectionCounters {
    pub fn new() -> Self {
        Self::default()
    }

    /// Count a newly accepted connection
    ///
    /// The returned guard keeps the connection counted as active until it
    /// is dropped. Its id is the connection's position in accept order.
    pub fn open(self: &Arc<Self>) -> ConnectionGuard {
        let id = self.total.fetch_add(1, Ordering::Relaxed) + 1;
        self.active.fetch_add(1, Ordering::Relaxed);
        ConnectionGuard {
            id,
            counters: Arc::clone(self),
        }
    }

    pub fn total(&self) -> u64 {
        self.total.load(Ordering::Relaxed)
    }

    pub fn active(&self) -> u64 {
        self.active.load(Ordering::Relaxed)
    }

    pub fn snapshot(&self) -> ServerStats {
        ServerStats {
            total_connections: self.total(),
            active_connections: self.active(),
        }
    }
}

/// Marks one connection as active
#[derive(Debug)]
pub struct ConnectionGuard {
    id: u64,
    counters: Arc<ConnectionCounters>,
}

impl ConnectionGuard {
    pub fn id(&self) -> u64 {
        self.id
    }
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        self.counters.active.fetch_sub(1, Ordering::Relaxed);
    }
}

/// Server-wide statistics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ServerStats {
    /// Total connections ever
    pub total_connections: u64,
    /// Current active connections
    pub active_connections: u64,
}

/// Per-session forwarding statistics
#[derive(Debug, Clone)]
pub struct RelayStats {
    /// Set when the upstream publish succeeded
    pub started_at: Option<Instant>,
    /// Bytes written upstream
    pub bytes_forwarded: u64,
    pub audio_frames: u64,
    pub video_frames: u64,
    /// Frames that failed to reach the upstream
    pub dropped_frames: u64,
    pub last_audio_ts: u32,
    pub last_video_ts: u32,
}

impl Default for RelayStats {
    fn default() -> Self {
        Self::new()
    }
}

impl RelayStats {
    pub fn new() -> Self {
        Self {
            started_at: None,
            bytes_forwarded: 0,
            audio_frames: 0,
            video_frames: 0,
            dropped_frames: 0,
            last_audio_ts: 0,
            last_video_ts: 0,
        }
    }

    pub fn mark_started(&mut self) {
        self.started_at = Some(Instant::now());
    }

    /// Record a frame delivered upstream
    pub fn record_forwarded(&mut self, media: MediaKind, timestamp: u32, len: usize) {
        self.bytes_forwarded += len as u64;
        match media {
            MediaKind::Audio => {
                self.audio_frames += 1;
                self.last_audio_ts = timestamp;
            }
            MediaKind::Video => {
                self.video_frames += 1;
                self.last_video_ts = timestamp;
            }
        }
    }

    pub fn record_dropped(&mut self) {
        self.dropped_frames += 1;
    }

    /// Time spent forwarding
    pub fn duration(&self) -> Duration {
        self.started_at.map(|t| t.elapsed()).unwrap_or_default()
    }

    /// Calculate bitrate in bits per second
    pub fn bitrate(&self) -> u64 {
        let secs = self.duration().as_secs();
        if secs > 0 {
            (self.bytes_forwarded * 8) / secs
        } else {
            0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_track_open_and_drop() {
        let counters = Arc::new(ConnectionCounters::new());

        let first = counters.open();
        let second = counters.open();
        assert_eq!(first.id(), 1);
        assert_eq!(second.id(), 2);
        assert_eq!(counters.active(), 2);

        drop(first);
        assert_eq!(counters.total(), 2);
        assert_eq!(counters.active(), 1);

        drop(second);
        assert_eq!(
            counters.snapshot(),
            ServerStats {
                total_connections: 2,
                active_connections: 0,
            }
        );
    }

    #[test]
    fn test_server_stats_serialization() {
        let stats = ServerStats {
            total_connections: 7,
            active_connections: 3,
        };
        let json = serde_json::to_value(stats).unwrap();
        assert_eq!(json["total_connections"], 7);
        assert_eq!(json["active_connections"], 3);
    }

    #[test]
    fn test_relay_stats_record() {
        let mut stats = RelayStats::new();
        stats.record_forwarded(MediaKind::Audio, 20, 100);
        stats.record_forwarded(MediaKind::Video, 33, 4000);
        stats.record_forwarded(MediaKind::Audio, 40, 100);
        stats.record_dropped();

        assert_eq!(stats.audio_frames, 2);
        assert_eq!(stats.video_frames, 1);
        assert_eq!(stats.bytes_forwarded, 4200);
        assert_eq!(stats.last_audio_ts, 40);
        assert_eq!(stats.last_video_ts, 33);
        assert_eq!(stats.dropped_frames, 1);
    }

    #[test]
    fn test_relay_stats_bitrate_before_start() {
        let mut stats = RelayStats::new();
        stats.bytes_forwarded = 1_000_000;

        assert_eq!(stats.duration(), Duration::ZERO);
        assert_eq!(stats.bitrate(), 0);
    }

    #[test]
    fn test_relay_stats_bitrate() {
        let mut stats = RelayStats::new();
        stats.started_at = Instant::now().checked_sub(Duration::from_secs(4));
        stats.record_forwarded(MediaKind::Video, 0, 500_000);

        assert!(stats.duration() >= Duration::from_secs(4));
        assert_eq!(stats.bitrate(), 1_000_000);
    }
}
