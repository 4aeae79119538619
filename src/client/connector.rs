//! RTMP upstream connector
//!
//! Client side of the relay: dials the upstream server, runs the RTMP
//! handshake and drives an `rml_rtmp` client session. The connection and the
//! stream created on it share one socket and one session.

use std::io;
use std::sync::Arc;

use rml_rtmp::handshake::{Handshake, HandshakeProcessResult, PeerType};
use rml_rtmp::sessions::{
    ClientSession, ClientSessionConfig, ClientSessionEvent, ClientSessionResult,
    PublishRequestType,
};
use rml_rtmp::time::RtmpTimestamp;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::Mutex;

use super::config::UpstreamConfig;
use super::upstream::{
    ChannelId, MediaMessage, PublishType, UpstreamConnection, UpstreamConnector, UpstreamStream,
};
use crate::error::{Error, Result};

const READ_BUFFER_SIZE: usize = 4096;

fn protocol_error<E: std::fmt::Debug>(e: E) -> Error {
    Error::Protocol(format!("{:?}", e))
}

/// Dials the upstream RTMP server
#[derive(Debug, Clone)]
pub struct RtmpConnector {
    config: UpstreamConfig,
}

impl RtmpConnector {
    pub fn new(config: UpstreamConfig) -> Self {
        Self { config }
    }
}

impl UpstreamConnector for RtmpConnector {
    type Connection = RtmpConnection;

    async fn dial(&self, addr: &str) -> Result<RtmpConnection> {
        let mut socket = TcpStream::connect(addr).await?;
        if self.config.tcp_nodelay {
            socket.set_nodelay(true)?;
        }

        let pending = ClientLink::handshake(&mut socket).await?;
        tracing::debug!(upstream = addr, "Upstream handshake completed");

        let link = ClientLink {
            addr: addr.to_string(),
            socket,
            session: None,
            pending,
            chunk_size: self.config.chunk_size,
            closed: false,
        };

        Ok(RtmpConnection {
            link: Arc::new(Mutex::new(link)),
        })
    }
}

/// Socket and client session shared by a connection and its stream
struct ClientLink {
    addr: String,
    socket: TcpStream,
    session: Option<ClientSession>,
    /// Bytes that arrived right behind the handshake
    pending: Vec<u8>,
    chunk_size: u32,
    closed: bool,
}

impl ClientLink {
    /// Run the client handshake, returning any bytes received past its end
    async fn handshake(socket: &mut TcpStream) -> Result<Vec<u8>> {
        let mut handshake = Handshake::new(PeerType::Client);
        let p0_and_p1 = handshake
            .generate_outbound_p0_and_p1()
            .map_err(protocol_error)?;
        socket.write_all(&p0_and_p1).await?;

        let mut buf = [0u8; READ_BUFFER_SIZE];
        loop {
            let n = socket.read(&mut buf).await?;
            if n == 0 {
                return Err(Error::Protocol(
                    "connection closed during handshake".into(),
                ));
            }

            match handshake.process_bytes(&buf[..n]).map_err(protocol_error)? {
                HandshakeProcessResult::InProgress { response_bytes } => {
                    if !response_bytes.is_empty() {
                        socket.write_all(&response_bytes).await?;
                    }
                }
                HandshakeProcessResult::Completed {
                    response_bytes,
                    remaining_bytes,
                } => {
                    socket.write_all(&response_bytes).await?;
                    return Ok(remaining_bytes);
                }
            }
        }
    }

    fn session_mut(&mut self) -> Result<&mut ClientSession> {
        if self.closed {
            return Err(Error::NotConnected);
        }
        self.session.as_mut().ok_or(Error::NotConnected)
    }

    /// Send outbound packets and collect raised events
    async fn dispatch(
        &mut self,
        results: Vec<ClientSessionResult>,
    ) -> Result<Vec<ClientSessionEvent>> {
        let mut events = Vec::new();
        for result in results {
            match result {
                ClientSessionResult::OutboundResponse(packet) => {
                    self.socket.write_all(&packet.bytes).await?;
                }
                ClientSessionResult::RaisedEvent(event) => events.push(event),
                ClientSessionResult::UnhandleableMessageReceived(_) => {}
            }
        }
        Ok(events)
    }

    async fn feed(&mut self, bytes: &[u8]) -> Result<Vec<ClientSessionEvent>> {
        let results = self
            .session_mut()?
            .handle_input(bytes)
            .map_err(protocol_error)?;
        self.dispatch(results).await
    }

    /// Read from the server until `accept` recognises an event
    async fn await_event<F>(&mut self, mut accept: F) -> Result<()>
    where
        F: FnMut(&ClientSessionEvent) -> Option<Result<()>> + Send,
    {
        let pending = std::mem::take(&mut self.pending);
        if !pending.is_empty() {
            for event in self.feed(&pending).await? {
                if let Some(result) = accept(&event) {
                    return result;
                }
            }
        }

        let mut buf = [0u8; READ_BUFFER_SIZE];
        loop {
            let n = self.socket.read(&mut buf).await?;
            if n == 0 {
                return Err(Error::Protocol("upstream closed the connection".into()));
            }

            for event in self.feed(&buf[..n]).await? {
                if let Some(result) = accept(&event) {
                    return result;
                }
            }
        }
    }

    /// Consume control traffic the server has already sent, without waiting
    async fn drain(&mut self) -> Result<()> {
        let mut buf = [0u8; READ_BUFFER_SIZE];
        loop {
            match self.socket.try_read(&mut buf) {
                Ok(0) => {
                    return Err(Error::Protocol("upstream closed the connection".into()));
                }
                Ok(n) => {
                    for event in self.feed(&buf[..n]).await? {
                        tracing::trace!(upstream = %self.addr, event = ?event, "Upstream event");
                    }
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => return Ok(()),
                Err(e) => return Err(e.into()),
            }
        }
    }
}

/// Connection to the upstream server
pub struct RtmpConnection {
    link: Arc<Mutex<ClientLink>>,
}

impl UpstreamConnection for RtmpConnection {
    type Stream = RtmpStream;

    async fn connect(&mut self, app: &str) -> Result<()> {
        let mut link = self.link.lock().await;

        let mut session_config = ClientSessionConfig::new();
        session_config.chunk_size = link.chunk_size;
        session_config.tc_url = Some(format!("rtmp://{}/{}", link.addr, app));

        let (session, initial_results) =
            ClientSession::new(session_config).map_err(protocol_error)?;
        link.session = Some(session);
        link.dispatch(initial_results).await?;

        let request = link
            .session_mut()?
            .request_connection(app.to_string())
            .map_err(protocol_error)?;
        link.dispatch(vec![request]).await?;

        link.await_event(|event| match event {
            ClientSessionEvent::ConnectionRequestAccepted => Some(Ok(())),
            ClientSessionEvent::ConnectionRequestRejected { .. } => Some(Err(Error::Protocol(
                format!("connect rejected: {:?}", event),
            ))),
            _ => None,
        })
        .await
    }

    async fn create_stream(&mut self, chunk_size: u32) -> Result<RtmpStream> {
        {
            let link = self.link.lock().await;
            if link.closed || link.session.is_none() {
                return Err(Error::NotConnected);
            }
            // rml_rtmp announces its chunk size when the session starts and
            // issues createStream together with publish.
            if chunk_size != link.chunk_size {
                tracing::debug!(
                    requested = chunk_size,
                    negotiated = link.chunk_size,
                    "Chunk size already negotiated at connect"
                );
            }
        }

        Ok(RtmpStream {
            link: Arc::clone(&self.link),
            publishing: false,
        })
    }

    async fn close(&mut self) -> Result<()> {
        let mut link = self.link.lock().await;
        if link.closed {
            return Ok(());
        }
        link.closed = true;
        link.session = None;
        link.socket.shutdown().await?;
        Ok(())
    }
}

/// Publishing stream on the upstream connection
pub struct RtmpStream {
    link: Arc<Mutex<ClientLink>>,
    publishing: bool,
}

impl UpstreamStream for RtmpStream {
    async fn publish(&mut self, name: &str, publish_type: PublishType) -> Result<()> {
        let mode = match publish_type {
            PublishType::Live => PublishRequestType::Live,
            PublishType::Record => PublishRequestType::Record,
            PublishType::Append => PublishRequestType::Append,
        };

        let mut link = self.link.lock().await;
        let request = link
            .session_mut()?
            .request_publishing(name.to_string(), mode)
            .map_err(protocol_error)?;
        link.dispatch(vec![request]).await?;

        link.await_event(|event| match event {
            ClientSessionEvent::PublishRequestAccepted => Some(Ok(())),
            _ => None,
        })
        .await?;

        self.publishing = true;
        Ok(())
    }

    async fn write(
        &mut self,
        channel: ChannelId,
        timestamp: u32,
        message: MediaMessage,
    ) -> Result<()> {
        // rml_rtmp picks the chunk stream from the message type
        let kind = message.kind();
        if channel != ChannelId::for_media(kind) {
            return Err(Error::Protocol(format!(
                "{} frame on channel {}",
                kind, channel.0
            )));
        }
        if !self.publishing {
            return Err(Error::NotConnected);
        }

        let mut link = self.link.lock().await;
        link.drain().await?;

        let timestamp = RtmpTimestamp::new(timestamp);
        let session = link.session_mut()?;
        let result = match message {
            MediaMessage::Audio(data) => session.publish_audio_data(data, timestamp, false),
            MediaMessage::Video(data) => session.publish_video_data(data, timestamp, false),
        }
        .map_err(protocol_error)?;

        link.dispatch(vec![result]).await?;
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        if !self.publishing {
            return Ok(());
        }
        self.publishing = false;

        let mut link = self.link.lock().await;
        let results = link.session_mut()?.stop_publishing().map_err(protocol_error)?;
        link.dispatch(results).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use tokio::net::TcpListener;

    use crate::client::upstream::{AUDIO_CHANNEL, VIDEO_CHANNEL};

    #[tokio::test]
    async fn test_dial_refused() {
        // Bind then drop to get a port nobody listens on
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let connector = RtmpConnector::new(UpstreamConfig::new(addr.to_string()));
        let result = connector.dial(&addr.to_string()).await;
        assert!(matches!(result, Err(Error::Io(_))));
    }

    #[tokio::test]
    async fn test_dial_peer_closes_during_handshake() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            let (socket, _) = listener.accept().await.unwrap();
            drop(socket);
        });

        let connector = RtmpConnector::new(UpstreamConfig::new(addr.to_string()));
        let result = connector.dial(&addr.to_string()).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_write_rejects_mismatched_channel() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let accept = tokio::spawn(async move { listener.accept().await.unwrap() });

        let socket = TcpStream::connect(addr).await.unwrap();
        let _peer = accept.await.unwrap();

        let link = ClientLink {
            addr: addr.to_string(),
            socket,
            session: None,
            pending: Vec::new(),
            chunk_size: 128,
            closed: false,
        };
        let mut stream = RtmpStream {
            link: Arc::new(Mutex::new(link)),
            publishing: true,
        };

        let audio = MediaMessage::Audio(Bytes::from_static(&[0xAF, 0x01]));
        let result = stream.write(VIDEO_CHANNEL, 0, audio).await;
        assert!(matches!(result, Err(Error::Protocol(_))));

        // Right channel, but no session was ever connected
        let audio = MediaMessage::Audio(Bytes::from_static(&[0xAF, 0x01]));
        let result = stream.write(AUDIO_CHANNEL, 0, audio).await;
        assert!(matches!(result, Err(Error::NotConnected)));
    }
}
