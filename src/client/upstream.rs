//! Outbound session client boundary
//!
//! The relay only talks to the upstream server through these traits, so it
//! can run against the real RTMP client or an in-memory fake.

use std::future::Future;

use bytes::Bytes;

use crate::error::{MediaKind, Result};

/// Chunk size requested for the outbound stream
pub const DEFAULT_CHUNK_SIZE: u32 = 128;

/// Logical channel a media message is written on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ChannelId(pub u32);

/// Channel carrying audio messages
pub const AUDIO_CHANNEL: ChannelId = ChannelId(4);

/// Channel carrying video messages
pub const VIDEO_CHANNEL: ChannelId = ChannelId(6);

impl ChannelId {
    /// The fixed channel for a media type
    pub fn for_media(kind: MediaKind) -> Self {
        match kind {
            MediaKind::Audio => AUDIO_CHANNEL,
            MediaKind::Video => VIDEO_CHANNEL,
        }
    }
}

/// A single audio or video frame body
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MediaMessage {
    Audio(Bytes),
    Video(Bytes),
}

impl MediaMessage {
    pub fn new(kind: MediaKind, payload: Bytes) -> Self {
        match kind {
            MediaKind::Audio => MediaMessage::Audio(payload),
            MediaKind::Video => MediaMessage::Video(payload),
        }
    }

    pub fn kind(&self) -> MediaKind {
        match self {
            MediaMessage::Audio(_) => MediaKind::Audio,
            MediaMessage::Video(_) => MediaKind::Video,
        }
    }

    pub fn payload(&self) -> &Bytes {
        match self {
            MediaMessage::Audio(data) | MediaMessage::Video(data) => data,
        }
    }

    pub fn into_payload(self) -> Bytes {
        match self {
            MediaMessage::Audio(data) | MediaMessage::Video(data) => data,
        }
    }
}

/// Publish type sent with NetStream.publish
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublishType {
    Live,
    Record,
    Append,
}

impl PublishType {
    pub fn as_str(&self) -> &'static str {
        match self {
            PublishType::Live => "live",
            PublishType::Record => "record",
            PublishType::Append => "append",
        }
    }
}

impl std::fmt::Display for PublishType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Opens connections to the upstream server
pub trait UpstreamConnector: Send + Sync + 'static {
    type Connection: UpstreamConnection;

    /// Open a transport connection to `addr` (`host:port`) and complete the handshake
    fn dial(&self, addr: &str) -> impl Future<Output = Result<Self::Connection>> + Send;
}

/// An open upstream connection
pub trait UpstreamConnection: Send + 'static {
    type Stream: UpstreamStream;

    /// NetConnection.connect to `app`
    fn connect(&mut self, app: &str) -> impl Future<Output = Result<()>> + Send;

    /// Create a stream context for publishing
    fn create_stream(&mut self, chunk_size: u32)
        -> impl Future<Output = Result<Self::Stream>> + Send;

    fn close(&mut self) -> impl Future<Output = Result<()>> + Send;
}

/// A stream context on an upstream connection
pub trait UpstreamStream: Send + 'static {
    /// NetStream.publish `name` with an explicit publish type
    fn publish(
        &mut self,
        name: &str,
        publish_type: PublishType,
    ) -> impl Future<Output = Result<()>> + Send;

    /// Write one media message
    fn write(
        &mut self,
        channel: ChannelId,
        timestamp: u32,
        message: MediaMessage,
    ) -> impl Future<Output = Result<()>> + Send;

    fn close(&mut self) -> impl Future<Output = Result<()>> + Send;
}
