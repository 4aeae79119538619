//! Relay end to end over loopback sockets
//!
//! publisher ──▶ relay (RelayHandler) ──▶ upstream (recording handler)

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::net::TcpListener;
use tokio::sync::mpsc;

use rtmp_relay::client::{
    MediaMessage, PublishType, RtmpConnector, UpstreamConfig, UpstreamConnection,
    UpstreamConnector, UpstreamStream, AUDIO_CHANNEL, VIDEO_CHANNEL,
};
use rtmp_relay::relay::RelayHandlerFactory;
use rtmp_relay::server::{HandlerFactory, RtmpServer, ServerConfig, SessionHandler};
use rtmp_relay::stats::ConnectionCounters;
use rtmp_relay::Result;

#[derive(Debug, PartialEq)]
enum Seen {
    Connect(String),
    Publish(String),
    Audio(u32, Vec<u8>),
    Video(u32, Vec<u8>),
    Close,
}

struct Recorder {
    seen: mpsc::UnboundedSender<Seen>,
}

impl SessionHandler for Recorder {
    async fn on_connect(&mut self, _timestamp: u32, app: &str) -> Result<()> {
        let _ = self.seen.send(Seen::Connect(app.to_string()));
        Ok(())
    }

    async fn on_publish(&mut self, _timestamp: u32, name: &str) -> Result<()> {
        let _ = self.seen.send(Seen::Publish(name.to_string()));
        Ok(())
    }

    async fn on_audio<R>(&mut self, timestamp: u32, mut payload: R) -> Result<()>
    where
        R: AsyncRead + Unpin + Send,
    {
        let mut body = Vec::new();
        payload.read_to_end(&mut body).await?;
        let _ = self.seen.send(Seen::Audio(timestamp, body));
        Ok(())
    }

    async fn on_video<R>(&mut self, timestamp: u32, mut payload: R) -> Result<()>
    where
        R: AsyncRead + Unpin + Send,
    {
        let mut body = Vec::new();
        payload.read_to_end(&mut body).await?;
        let _ = self.seen.send(Seen::Video(timestamp, body));
        Ok(())
    }

    async fn on_close(&mut self) {
        let _ = self.seen.send(Seen::Close);
    }
}

struct RecorderFactory {
    seen: mpsc::UnboundedSender<Seen>,
}

impl HandlerFactory for RecorderFactory {
    type Handler = Recorder;

    fn create(&self, _connection_id: u64, _peer_addr: SocketAddr) -> Recorder {
        Recorder {
            seen: self.seen.clone(),
        }
    }
}

async fn start<F: HandlerFactory>(factory: F, counters: Arc<ConnectionCounters>) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let server = RtmpServer::new(ServerConfig::with_addr(addr), factory, counters);

    tokio::spawn(async move {
        let _ = server
            .serve_until(listener, std::future::pending())
            .await;
    });

    addr
}

struct Harness {
    relay_addr: SocketAddr,
    relay_counters: Arc<ConnectionCounters>,
    upstream_counters: Arc<ConnectionCounters>,
    seen: mpsc::UnboundedReceiver<Seen>,
}

async fn harness() -> Harness {
    let (tx, seen) = mpsc::unbounded_channel();
    let upstream_counters = Arc::new(ConnectionCounters::new());
    let upstream_addr = start(RecorderFactory { seen: tx }, Arc::clone(&upstream_counters)).await;

    let upstream = UpstreamConfig::new(format!("rtmp://{}", upstream_addr))
        .timeout(Duration::from_secs(5));
    let factory = RelayHandlerFactory::new(RtmpConnector::new(upstream.clone()), upstream);
    let relay_counters = Arc::new(ConnectionCounters::new());
    let relay_addr = start(factory, Arc::clone(&relay_counters)).await;

    Harness {
        relay_addr,
        relay_counters,
        upstream_counters,
        seen,
    }
}

async fn next(seen: &mut mpsc::UnboundedReceiver<Seen>) -> Seen {
    tokio::time::timeout(Duration::from_secs(5), seen.recv())
        .await
        .expect("timed out waiting for upstream")
        .expect("upstream recorder gone")
}

fn publisher(addr: SocketAddr) -> RtmpConnector {
    RtmpConnector::new(UpstreamConfig::new(addr.to_string()))
}

#[tokio::test]
async fn test_publish_is_mirrored_upstream() {
    let mut h = harness().await;
    let connector = publisher(h.relay_addr);

    let mut connection = connector.dial(&h.relay_addr.to_string()).await.unwrap();
    connection.connect("live").await.unwrap();
    let mut stream = connection.create_stream(128).await.unwrap();
    stream.publish("show", PublishType::Live).await.unwrap();

    assert_eq!(next(&mut h.seen).await, Seen::Connect("live".into()));
    assert_eq!(next(&mut h.seen).await, Seen::Publish("show".into()));

    let frames: [(u32, &[u8]); 3] = [
        (0, &b"\xaf\x01one"[..]),
        (23, &b"\xaf\x01two"[..]),
        (46, &b"\xaf\x01three"[..]),
    ];
    for (ts, body) in frames {
        stream
            .write(AUDIO_CHANNEL, ts, MediaMessage::Audio(Bytes::copy_from_slice(body)))
            .await
            .unwrap();
    }
    for (ts, body) in frames {
        assert_eq!(next(&mut h.seen).await, Seen::Audio(ts, body.to_vec()));
    }

    let keyframe = Bytes::from_static(b"\x17\x01\x00\x00\x00frame");
    stream
        .write(VIDEO_CHANNEL, 50, MediaMessage::Video(keyframe.clone()))
        .await
        .unwrap();
    assert_eq!(next(&mut h.seen).await, Seen::Video(50, keyframe.to_vec()));

    assert_eq!(h.relay_counters.active(), 1);

    connection.close().await.unwrap();
    assert_eq!(next(&mut h.seen).await, Seen::Close);
}

#[tokio::test]
async fn test_empty_app_rejected_before_upstream_dial() {
    let h = harness().await;
    let connector = publisher(h.relay_addr);

    let mut connection = connector.dial(&h.relay_addr.to_string()).await.unwrap();
    assert!(connection.connect("").await.is_err());

    assert_eq!(h.relay_counters.total(), 1);
    assert_eq!(h.upstream_counters.total(), 0);
}

#[tokio::test]
async fn test_unreachable_upstream_ends_publish() {
    // Reserve a port and release it so nothing listens there
    let dead = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let dead_addr = dead.local_addr().unwrap();
    drop(dead);

    let upstream = UpstreamConfig::new(dead_addr.to_string()).timeout(Duration::from_secs(2));
    let factory = RelayHandlerFactory::new(RtmpConnector::new(upstream.clone()), upstream);
    let counters = Arc::new(ConnectionCounters::new());
    let relay_addr = start(factory, Arc::clone(&counters)).await;

    let connector = publisher(relay_addr);
    let mut connection = connector.dial(&relay_addr.to_string()).await.unwrap();
    connection.connect("live").await.unwrap();
    let mut stream = connection.create_stream(128).await.unwrap();

    let result = tokio::time::timeout(
        Duration::from_secs(5),
        stream.publish("show", PublishType::Live),
    )
    .await
    .expect("publish neither accepted nor failed");
    assert!(result.is_err());
}
