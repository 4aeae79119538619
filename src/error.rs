//! Error types for the relay
//!
//! Setup-phase errors (handshake, upstream setup) abort the affected
//! connection. Frame and close errors are logged where they happen and
//! never stop the session.

use std::fmt;

use crate::keystore::KeyStoreError;

/// Result type alias using the crate's Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Upstream setup step that failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetupStage {
    /// Opening the TCP connection and RTMP handshake
    Dial,
    /// NetConnection.connect with the inbound app name
    Connect,
    /// Creating the outbound stream context
    CreateStream,
    /// NetStream.publish with the inbound publishing name
    Publish,
}

impl fmt::Display for SetupStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SetupStage::Dial => "dial",
            SetupStage::Connect => "connect",
            SetupStage::CreateStream => "create stream",
            SetupStage::Publish => "publish",
        };
        f.write_str(name)
    }
}

/// Media type of a forwarded frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKind {
    Audio,
    Video,
}

impl fmt::Display for MediaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MediaKind::Audio => f.write_str("audio"),
            MediaKind::Video => f.write_str("video"),
        }
    }
}

/// Upstream object being torn down
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseTarget {
    Stream,
    Connection,
}

impl fmt::Display for CloseTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CloseTarget::Stream => f.write_str("stream"),
            CloseTarget::Connection => f.write_str("connection"),
        }
    }
}

/// Main error type
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Inbound connect carried no usable application name
    #[error("invalid handshake: {0}")]
    InvalidHandshake(String),

    /// Dial, connect, create-stream or publish against the upstream failed
    #[error("upstream setup failed at {stage}: {source}")]
    UpstreamSetup {
        stage: SetupStage,
        #[source]
        source: Box<Error>,
    },

    /// A single frame could not be written upstream
    #[error("failed to forward {media} frame: {source}")]
    FrameForward {
        media: MediaKind,
        #[source]
        source: Box<Error>,
    },

    /// Closing the upstream stream or connection failed
    #[error("failed to close upstream {target}: {source}")]
    Close {
        target: CloseTarget,
        #[source]
        source: Box<Error>,
    },

    /// Stream key store failure
    #[error(transparent)]
    KeyStore(#[from] KeyStoreError),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Error reported by the RTMP protocol layer
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Upstream operation did not complete in time
    #[error("operation timed out")]
    Timeout,

    /// Operation attempted without a live upstream session
    #[error("not connected")]
    NotConnected,

    /// Invalid configuration
    #[error("configuration error: {0}")]
    Config(String),
}

impl Error {
    /// Wrap an error as an upstream setup failure at `stage`
    pub fn upstream_setup(stage: SetupStage, source: Error) -> Self {
        Error::UpstreamSetup {
            stage,
            source: Box::new(source),
        }
    }

    /// Wrap an error as a dropped frame
    pub fn frame_forward(media: MediaKind, source: Error) -> Self {
        Error::FrameForward {
            media,
            source: Box::new(source),
        }
    }

    /// Wrap an error as a teardown failure
    pub fn close(target: CloseTarget, source: Error) -> Self {
        Error::Close {
            target,
            source: Box::new(source),
        }
    }

    /// Whether this error ends the connection it occurred on
    pub fn is_fatal_to_session(&self) -> bool {
        !matches!(self, Error::FrameForward { .. } | Error::Close { .. })
    }
}

impl From<tokio::time::error::Elapsed> for Error {
    fn from(_: tokio::time::error::Elapsed) -> Self {
        Error::Timeout
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_upstream_setup_display() {
        let err = Error::upstream_setup(SetupStage::CreateStream, Error::Timeout);
        assert_eq!(
            err.to_string(),
            "upstream setup failed at create stream: operation timed out"
        );
    }

    #[test]
    fn test_frame_forward_display() {
        let err = Error::frame_forward(MediaKind::Video, Error::NotConnected);
        assert_eq!(err.to_string(), "failed to forward video frame: not connected");
    }

    #[test]
    fn test_fatality() {
        assert!(Error::InvalidHandshake("app name is empty".into()).is_fatal_to_session());
        assert!(Error::upstream_setup(SetupStage::Dial, Error::Timeout).is_fatal_to_session());
        assert!(!Error::frame_forward(MediaKind::Audio, Error::Timeout).is_fatal_to_session());
        assert!(!Error::close(CloseTarget::Stream, Error::NotConnected).is_fatal_to_session());
    }
}
