//! RTMP client side
//!
//! The outbound half of the relay:
//! - [`UpstreamConnector`], [`UpstreamConnection`] and [`UpstreamStream`]
//!   describe the operations the relay needs from an RTMP client
//! - [`RtmpConnector`] implements them on top of `rml_rtmp`

pub mod config;
pub mod connector;
pub mod upstream;

pub use config::UpstreamConfig;
pub use connector::{RtmpConnection, RtmpConnector, RtmpStream};
pub use upstream::{
    ChannelId, MediaMessage, PublishType, UpstreamConnection, UpstreamConnector, UpstreamStream,
    AUDIO_CHANNEL, DEFAULT_CHUNK_SIZE, VIDEO_CHANNEL,
};
