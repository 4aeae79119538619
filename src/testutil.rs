//! In-memory upstream for relay tests

use std::sync::{Arc, Mutex, MutexGuard};

use crate::client::{
    ChannelId, MediaMessage, PublishType, UpstreamConnection, UpstreamConnector, UpstreamStream,
};
use crate::error::{Error, Result, SetupStage};

/// One call made against the fake upstream
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Dial(String),
    Connect(String),
    CreateStream(u32),
    Publish(String, PublishType),
    Write(ChannelId, u32, MediaMessage),
    CloseStream,
    CloseConnection,
}

#[derive(Debug, Default)]
struct Inner {
    calls: Vec<Call>,
    fail_at: Option<SetupStage>,
    stall_at: Option<SetupStage>,
    failing_writes: usize,
    fail_stream_close: bool,
}

/// Records every upstream operation; failures and stalls can be injected
#[derive(Debug, Clone, Default)]
pub struct FakeConnector {
    inner: Arc<Mutex<Inner>>,
}

impl FakeConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the given setup step
    pub fn fail_at(self, stage: SetupStage) -> Self {
        self.lock().fail_at = Some(stage);
        self
    }

    /// Never complete the given setup step
    pub fn stall_at(self, stage: SetupStage) -> Self {
        self.lock().stall_at = Some(stage);
        self
    }

    /// Fail stream close during teardown
    pub fn fail_stream_close(self) -> Self {
        self.lock().fail_stream_close = true;
        self
    }

    /// Fail the next `n` frame writes
    pub fn fail_next_writes(&self, n: usize) {
        self.lock().failing_writes = n;
    }

    pub fn calls(&self) -> Vec<Call> {
        self.lock().calls.clone()
    }

    pub fn writes(&self) -> Vec<(ChannelId, u32, MediaMessage)> {
        self.lock()
            .calls
            .iter()
            .filter_map(|call| match call {
                Call::Write(channel, ts, message) => Some((*channel, *ts, message.clone())),
                _ => None,
            })
            .collect()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    async fn step(&self, stage: SetupStage, call: Call) -> Result<()> {
        let (fail, stall) = {
            let mut inner = self.lock();
            inner.calls.push(call);
            (inner.fail_at == Some(stage), inner.stall_at == Some(stage))
        };

        if stall {
            std::future::pending::<()>().await;
        }
        if fail {
            return Err(Error::Protocol(format!("injected {} failure", stage)));
        }
        Ok(())
    }
}

impl UpstreamConnector for FakeConnector {
    type Connection = FakeConnection;

    async fn dial(&self, addr: &str) -> Result<FakeConnection> {
        self.step(SetupStage::Dial, Call::Dial(addr.to_string())).await?;
        Ok(FakeConnection {
            upstream: self.clone(),
        })
    }
}

pub struct FakeConnection {
    upstream: FakeConnector,
}

impl UpstreamConnection for FakeConnection {
    type Stream = FakeStream;

    async fn connect(&mut self, app: &str) -> Result<()> {
        self.upstream
            .step(SetupStage::Connect, Call::Connect(app.to_string()))
            .await
    }

    async fn create_stream(&mut self, chunk_size: u32) -> Result<FakeStream> {
        self.upstream
            .step(SetupStage::CreateStream, Call::CreateStream(chunk_size))
            .await?;
        Ok(FakeStream {
            upstream: self.upstream.clone(),
        })
    }

    async fn close(&mut self) -> Result<()> {
        self.upstream.lock().calls.push(Call::CloseConnection);
        Ok(())
    }
}

pub struct FakeStream {
    upstream: FakeConnector,
}

impl UpstreamStream for FakeStream {
    async fn publish(&mut self, name: &str, publish_type: PublishType) -> Result<()> {
        self.upstream
            .step(
                SetupStage::Publish,
                Call::Publish(name.to_string(), publish_type),
            )
            .await
    }

    async fn write(
        &mut self,
        channel: ChannelId,
        timestamp: u32,
        message: MediaMessage,
    ) -> Result<()> {
        let mut inner = self.upstream.lock();
        inner.calls.push(Call::Write(channel, timestamp, message));
        if inner.failing_writes > 0 {
            inner.failing_writes -= 1;
            return Err(Error::Io(std::io::ErrorKind::BrokenPipe.into()));
        }
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        let mut inner = self.upstream.lock();
        inner.calls.push(Call::CloseStream);
        if inner.fail_stream_close {
            return Err(Error::NotConnected);
        }
        Ok(())
    }
}
