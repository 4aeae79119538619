//! Per-connection driver
//!
//! Runs the server handshake, feeds socket bytes into an `rml_rtmp`
//! server session and turns its events into [`SessionHandler`] calls.

use std::collections::VecDeque;
use std::net::SocketAddr;
use std::time::Instant;

use rml_rtmp::handshake::{Handshake, HandshakeProcessResult, PeerType};
use rml_rtmp::sessions::{
    ServerSession, ServerSessionConfig, ServerSessionEvent, ServerSessionResult,
};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;

use crate::error::{Error, Result};
use crate::server::config::ServerConfig;
use crate::server::handler::SessionHandler;

const HANDSHAKE_BUFFER_SIZE: usize = 4096;

fn protocol_error<E: std::fmt::Debug>(e: E) -> Error {
    Error::Protocol(format!("{:?}", e))
}

/// One accepted inbound connection
pub struct Connection<H: SessionHandler> {
    id: u64,
    socket: TcpStream,
    peer_addr: SocketAddr,
    config: ServerConfig,
    handler: H,
    started_at: Instant,
}

impl<H: SessionHandler> Connection<H> {
    pub fn new(
        id: u64,
        socket: TcpStream,
        peer_addr: SocketAddr,
        config: ServerConfig,
        handler: H,
    ) -> Self {
        Self {
            id,
            socket,
            peer_addr,
            config,
            handler,
            started_at: Instant::now(),
        }
    }

    /// Serve the connection until it ends. `on_close` runs on every path.
    pub async fn run(mut self) -> Result<()> {
        let result = self.serve().await;
        self.handler.on_close().await;
        result
    }

    async fn serve(&mut self) -> Result<()> {
        let remaining = timeout(self.config.handshake_timeout(), self.handshake()).await??;
        tracing::debug!(session_id = self.id, peer = %self.peer_addr, "Handshake completed");

        let mut session_config = ServerSessionConfig::new();
        session_config.chunk_size = self.config.chunk_size;
        session_config.peer_bandwidth = self.config.peer_bandwidth;

        let (mut session, initial_results) =
            ServerSession::new(session_config).map_err(protocol_error)?;
        self.process_results(&mut session, initial_results).await?;

        if !remaining.is_empty() {
            let results = session.handle_input(&remaining).map_err(protocol_error)?;
            self.process_results(&mut session, results).await?;
        }

        let mut buf = vec![0u8; self.config.read_buffer_size.max(HANDSHAKE_BUFFER_SIZE)];
        loop {
            let n = timeout(self.config.read_timeout(), self.socket.read(&mut buf)).await??;
            if n == 0 {
                tracing::debug!(session_id = self.id, "Peer closed connection");
                return Ok(());
            }

            let results = session.handle_input(&buf[..n]).map_err(protocol_error)?;
            self.process_results(&mut session, results).await?;
        }
    }

    /// Server side of the RTMP handshake; returns bytes read past its end
    async fn handshake(&mut self) -> Result<Vec<u8>> {
        let mut handshake = Handshake::new(PeerType::Server);
        let mut buf = [0u8; HANDSHAKE_BUFFER_SIZE];

        loop {
            let n = self.socket.read(&mut buf).await?;
            if n == 0 {
                return Err(Error::Protocol(
                    "connection closed during handshake".into(),
                ));
            }

            match handshake.process_bytes(&buf[..n]).map_err(protocol_error)? {
                HandshakeProcessResult::InProgress { response_bytes } => {
                    if !response_bytes.is_empty() {
                        self.socket.write_all(&response_bytes).await?;
                    }
                }
                HandshakeProcessResult::Completed {
                    response_bytes,
                    remaining_bytes,
                } => {
                    if !response_bytes.is_empty() {
                        self.socket.write_all(&response_bytes).await?;
                    }
                    return Ok(remaining_bytes);
                }
            }
        }
    }

    async fn process_results(
        &mut self,
        session: &mut ServerSession,
        results: Vec<ServerSessionResult>,
    ) -> Result<()> {
        let mut queue: VecDeque<ServerSessionResult> = results.into();

        while let Some(result) = queue.pop_front() {
            match result {
                ServerSessionResult::OutboundResponse(packet) => {
                    self.socket.write_all(&packet.bytes).await?;
                }
                ServerSessionResult::RaisedEvent(event) => {
                    let follow_up = self.dispatch_event(session, event).await?;
                    queue.extend(follow_up);
                }
                ServerSessionResult::UnhandleableMessageReceived(_) => {
                    tracing::trace!(session_id = self.id, "Ignoring unhandleable message");
                }
            }
        }

        Ok(())
    }

    async fn dispatch_event(
        &mut self,
        session: &mut ServerSession,
        event: ServerSessionEvent,
    ) -> Result<Vec<ServerSessionResult>> {
        match event {
            ServerSessionEvent::ConnectionRequested {
                request_id,
                app_name,
                ..
            } => {
                let timestamp = self.elapsed_ms();
                self.handler.on_connect(timestamp, &app_name).await?;
                session.accept_request(request_id).map_err(protocol_error)
            }
            ServerSessionEvent::PublishStreamRequested {
                request_id,
                stream_key,
                ..
            } => {
                let timestamp = self.elapsed_ms();
                self.handler.on_publish(timestamp, &stream_key).await?;
                session.accept_request(request_id).map_err(protocol_error)
            }
            ServerSessionEvent::AudioDataReceived {
                data, timestamp, ..
            } => {
                let result = self.handler.on_audio(timestamp.value, &data[..]).await;
                self.survive(result)?;
                Ok(Vec::new())
            }
            ServerSessionEvent::VideoDataReceived {
                data, timestamp, ..
            } => {
                let result = self.handler.on_video(timestamp.value, &data[..]).await;
                self.survive(result)?;
                Ok(Vec::new())
            }
            ServerSessionEvent::PublishStreamFinished { stream_key, .. } => {
                tracing::debug!(session_id = self.id, stream = %stream_key, "Publish finished");
                Ok(Vec::new())
            }
            other => {
                tracing::trace!(session_id = self.id, event = ?other, "Unhandled session event");
                Ok(Vec::new())
            }
        }
    }

    /// Keep the session up through errors that only cost a frame
    fn survive(&self, result: Result<()>) -> Result<()> {
        match result {
            Err(e) if !e.is_fatal_to_session() => {
                tracing::warn!(session_id = self.id, error = %e, "Media callback failed");
                Ok(())
            }
            other => other,
        }
    }

    fn elapsed_ms(&self) -> u32 {
        u32::try_from(self.started_at.elapsed().as_millis()).unwrap_or(u32::MAX)
    }
}
