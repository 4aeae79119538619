//! Relay session handler
//!
//! Bridges one inbound publish session to one outbound publish session on
//! the upstream server. Setup is one-shot: a failed dial, connect,
//! create-stream or publish ends the connection. Frame write failures drop
//! the frame and the session carries on.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tokio::io::{AsyncRead, AsyncReadExt};

use crate::client::{
    ChannelId, MediaMessage, PublishType, UpstreamConfig, UpstreamConnection, UpstreamConnector,
    UpstreamStream,
};
use crate::error::{CloseTarget, Error, MediaKind, Result, SetupStage};
use crate::server::{HandlerFactory, SessionHandler};
use crate::session::{RelayPhase, RelaySession};

type StreamOf<C> = <<C as UpstreamConnector>::Connection as UpstreamConnection>::Stream;

/// Run `op` under the optional per-operation limit
async fn with_limit<T, F>(limit: Option<Duration>, op: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match limit {
        Some(limit) => tokio::time::timeout(limit, op).await?,
        None => op.await,
    }
}

/// Run one upstream setup step, tagging any failure with its stage
async fn setup_step<T, F>(limit: Option<Duration>, stage: SetupStage, op: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    with_limit(limit, op)
        .await
        .map_err(|e| Error::upstream_setup(stage, e))
}

/// Per-connection relay
pub struct RelayHandler<C: UpstreamConnector> {
    connector: Arc<C>,
    upstream: Arc<UpstreamConfig>,
    session: RelaySession,
    connection: Option<C::Connection>,
    stream: Option<StreamOf<C>>,
}

impl<C: UpstreamConnector> RelayHandler<C> {
    pub fn new(
        connection_id: u64,
        peer_addr: SocketAddr,
        connector: Arc<C>,
        upstream: Arc<UpstreamConfig>,
    ) -> Self {
        Self {
            connector,
            upstream,
            session: RelaySession::new(connection_id, peer_addr),
            connection: None,
            stream: None,
        }
    }

    pub fn session(&self) -> &RelaySession {
        &self.session
    }

    /// Whether an upstream stream is live
    pub fn is_forwarding(&self) -> bool {
        self.stream.is_some()
    }

    /// Connect, create the stream and publish on a freshly dialed connection
    async fn open_stream(
        connection: &mut C::Connection,
        limit: Option<Duration>,
        chunk_size: u32,
        app: &str,
        name: &str,
    ) -> Result<StreamOf<C>> {
        setup_step(limit, SetupStage::Connect, connection.connect(app)).await?;

        let mut stream = setup_step(
            limit,
            SetupStage::CreateStream,
            connection.create_stream(chunk_size),
        )
        .await?;

        // The publish type must always be sent explicitly
        setup_step(
            limit,
            SetupStage::Publish,
            stream.publish(name, PublishType::Live),
        )
        .await?;

        Ok(stream)
    }

    async fn forward<R>(&mut self, media: MediaKind, timestamp: u32, mut payload: R) -> Result<()>
    where
        R: AsyncRead + Unpin + Send,
    {
        let session_id = self.session.connection_id;

        let Some(stream) = self.stream.as_mut() else {
            tracing::trace!(session_id = session_id, media = %media, "No upstream stream, ignoring frame");
            return Ok(());
        };

        let mut body = Vec::new();
        let result = match payload.read_to_end(&mut body).await {
            Ok(len) => {
                let message = MediaMessage::new(media, Bytes::from(body));
                let limit = self.upstream.operation_timeout();
                with_limit(
                    limit,
                    stream.write(ChannelId::for_media(media), timestamp, message),
                )
                .await
                .map(|()| len)
            }
            Err(e) => Err(e.into()),
        };

        match result {
            Ok(len) => self.session.stats.record_forwarded(media, timestamp, len),
            Err(e) => {
                let err = Error::frame_forward(media, e);
                tracing::warn!(
                    session_id = session_id,
                    timestamp = timestamp,
                    error = %err,
                    "Dropped frame"
                );
                self.session.stats.record_dropped();
            }
        }

        Ok(())
    }
}

impl<C: UpstreamConnector> SessionHandler for RelayHandler<C> {
    async fn on_connect(&mut self, _timestamp: u32, app: &str) -> Result<()> {
        let session_id = self.session.connection_id;

        if app.is_empty() {
            tracing::warn!(session_id = session_id, peer = %self.session.peer_addr, "Rejecting connect without app name");
            return Err(Error::InvalidHandshake("app name is empty".into()));
        }

        if !self.session.connect(app) {
            return Err(Error::Protocol(format!(
                "connect in phase {:?}",
                self.session.phase
            )));
        }

        tracing::info!(session_id = session_id, app = app, "Client connected");
        Ok(())
    }

    async fn on_publish(&mut self, _timestamp: u32, name: &str) -> Result<()> {
        let session_id = self.session.connection_id;

        let app = match (self.session.phase, self.session.app()) {
            (RelayPhase::Connected, Some(app)) => app.to_string(),
            (phase, _) => {
                return Err(Error::Protocol(format!("publish in phase {:?}", phase)));
            }
        };

        let limit = self.upstream.operation_timeout();
        let chunk_size = self.upstream.chunk_size;
        let addr = self
            .upstream
            .address()
            .map_err(|e| Error::upstream_setup(SetupStage::Dial, e))?;

        tracing::info!(
            session_id = session_id,
            app = %app,
            stream = name,
            upstream = %addr,
            "Setting up upstream publish"
        );

        let mut connection =
            setup_step(limit, SetupStage::Dial, self.connector.dial(&addr)).await?;

        match Self::open_stream(&mut connection, limit, chunk_size, &app, name).await {
            Ok(stream) => {
                self.connection = Some(connection);
                self.stream = Some(stream);
                self.session.start_publishing(name);

                tracing::info!(session_id = session_id, stream = name, "Forwarding to upstream");
                Ok(())
            }
            Err(e) => {
                tracing::error!(session_id = session_id, stream = name, error = %e, "Upstream setup failed");

                if let Err(close_err) = with_limit(limit, connection.close()).await {
                    let close_err = Error::close(CloseTarget::Connection, close_err);
                    tracing::warn!(session_id = session_id, error = %close_err, "Cleanup after failed setup");
                }
                Err(e)
            }
        }
    }

    async fn on_audio<R>(&mut self, timestamp: u32, payload: R) -> Result<()>
    where
        R: AsyncRead + Unpin + Send,
    {
        self.forward(MediaKind::Audio, timestamp, payload).await
    }

    async fn on_video<R>(&mut self, timestamp: u32, payload: R) -> Result<()>
    where
        R: AsyncRead + Unpin + Send,
    {
        self.forward(MediaKind::Video, timestamp, payload).await
    }

    async fn on_close(&mut self) {
        if !self.session.close() {
            return;
        }

        let session_id = self.session.connection_id;
        let limit = self.upstream.operation_timeout();

        // Stream first, then the connection; one failing never skips the other
        if let Some(mut stream) = self.stream.take() {
            if let Err(e) = with_limit(limit, stream.close()).await {
                let err = Error::close(CloseTarget::Stream, e);
                tracing::warn!(session_id = session_id, error = %err, "Upstream teardown");
            }
        }

        if let Some(mut connection) = self.connection.take() {
            if let Err(e) = with_limit(limit, connection.close()).await {
                let err = Error::close(CloseTarget::Connection, e);
                tracing::warn!(session_id = session_id, error = %err, "Upstream teardown");
            }
        }

        let stats = &self.session.stats;
        tracing::info!(
            session_id = session_id,
            audio_frames = stats.audio_frames,
            video_frames = stats.video_frames,
            dropped_frames = stats.dropped_frames,
            bytes = stats.bytes_forwarded,
            bitrate_bps = stats.bitrate(),
            duration_ms = self.session.duration().as_millis() as u64,
            "Relay session closed"
        );
    }
}

/// Builds a [`RelayHandler`] for each accepted connection
pub struct RelayHandlerFactory<C: UpstreamConnector> {
    connector: Arc<C>,
    upstream: Arc<UpstreamConfig>,
}

impl<C: UpstreamConnector> RelayHandlerFactory<C> {
    pub fn new(connector: C, upstream: UpstreamConfig) -> Self {
        Self {
            connector: Arc::new(connector),
            upstream: Arc::new(upstream),
        }
    }
}

impl<C: UpstreamConnector> HandlerFactory for RelayHandlerFactory<C> {
    type Handler = RelayHandler<C>;

    fn create(&self, connection_id: u64, peer_addr: SocketAddr) -> RelayHandler<C> {
        RelayHandler::new(
            connection_id,
            peer_addr,
            Arc::clone(&self.connector),
            Arc::clone(&self.upstream),
        )
    }
}
