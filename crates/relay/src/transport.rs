//! Queue transports the relay pumps messages through.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::mpsc;

use crate::envelope::{Delivery, OutboundMessage};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("transport failed to connect: {0}")]
    Connect(String),
    #[error("transport read failed: {0}")]
    Receive(String),
    #[error("transport ack failed: {0}")]
    Acknowledge(String),
    #[error("transport publish failed: {0}")]
    Publish(String),
    #[error("transport disconnect failed: {0}")]
    Disconnect(String),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReconnectPolicy {
    pub max_retries: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self { max_retries: 5, base_delay_ms: 250, max_delay_ms: 5_000 }
    }
}

impl ReconnectPolicy {
    pub fn backoff(&self, attempt: u32) -> Duration {
        let multiplier = 1_u64 << attempt.min(16);
        Duration::from_millis(self.base_delay_ms.saturating_mul(multiplier).min(self.max_delay_ms))
    }
}

/// Inbound messages are handed out one at a time and stay unacknowledged
/// until the relay has queued the reply.
#[async_trait]
pub trait QueueTransport: Send + Sync {
    async fn connect(&self) -> Result<(), TransportError>;
    async fn next_delivery(&self) -> Result<Option<Delivery>, TransportError>;
    async fn acknowledge(&self, tag: &str) -> Result<(), TransportError>;
    /// Drops a delivery that can never be processed.
    async fn reject(&self, tag: &str) -> Result<(), TransportError>;
    async fn publish(&self, message: &OutboundMessage) -> Result<(), TransportError>;
    async fn disconnect(&self) -> Result<(), TransportError>;
}

#[derive(Default)]
pub struct NoopQueueTransport;

#[async_trait]
impl QueueTransport for NoopQueueTransport {
    async fn connect(&self) -> Result<(), TransportError> {
        Ok(())
    }

    async fn next_delivery(&self) -> Result<Option<Delivery>, TransportError> {
        Ok(None)
    }

    async fn acknowledge(&self, _tag: &str) -> Result<(), TransportError> {
        Ok(())
    }

    async fn reject(&self, _tag: &str) -> Result<(), TransportError> {
        Ok(())
    }

    async fn publish(&self, _message: &OutboundMessage) -> Result<(), TransportError> {
        Ok(())
    }

    async fn disconnect(&self) -> Result<(), TransportError> {
        Ok(())
    }
}

/// In-process queue: the ingress side is fed by the webhook endpoint and
/// published messages are drained by the outbound forwarder.
pub struct ChannelQueueTransport {
    inbound: tokio::sync::Mutex<mpsc::Receiver<Delivery>>,
    outbound: mpsc::UnboundedSender<OutboundMessage>,
}

pub fn channel_transport(
    capacity: usize,
) -> (ChannelQueueTransport, mpsc::Sender<Delivery>, mpsc::UnboundedReceiver<OutboundMessage>) {
    let (ingress, inbound) = mpsc::channel(capacity.max(1));
    let (outbound, outbox) = mpsc::unbounded_channel();
    (ChannelQueueTransport { inbound: tokio::sync::Mutex::new(inbound), outbound }, ingress, outbox)
}

#[async_trait]
impl QueueTransport for ChannelQueueTransport {
    async fn connect(&self) -> Result<(), TransportError> {
        Ok(())
    }

    async fn next_delivery(&self) -> Result<Option<Delivery>, TransportError> {
        Ok(self.inbound.lock().await.recv().await)
    }

    async fn acknowledge(&self, _tag: &str) -> Result<(), TransportError> {
        Ok(())
    }

    async fn reject(&self, _tag: &str) -> Result<(), TransportError> {
        Ok(())
    }

    async fn publish(&self, message: &OutboundMessage) -> Result<(), TransportError> {
        self.outbound
            .send(message.clone())
            .map_err(|_| TransportError::Publish("outbound channel closed".to_string()))
    }

    async fn disconnect(&self) -> Result<(), TransportError> {
        self.inbound.lock().await.close();
        Ok(())
    }
}

/// Scripted transport that records every side effect.
#[derive(Default)]
pub struct InMemoryQueueTransport {
    state: Mutex<InMemoryState>,
}

#[derive(Default)]
struct InMemoryState {
    connect_results: VecDeque<Result<(), TransportError>>,
    deliveries: VecDeque<Result<Option<Delivery>, TransportError>>,
    connect_attempts: usize,
    acknowledged: Vec<String>,
    rejected: Vec<String>,
    published: Vec<OutboundMessage>,
}

impl InMemoryQueueTransport {
    pub fn with_deliveries(deliveries: Vec<Delivery>) -> Self {
        let transport = Self::default();
        transport.lock().deliveries = deliveries.into_iter().map(|delivery| Ok(Some(delivery))).collect();
        transport
    }

    pub fn fail_connects(self, errors: Vec<TransportError>) -> Self {
        self.lock().connect_results = errors.into_iter().map(Err).collect();
        self
    }

    pub fn connect_attempts(&self) -> usize {
        self.lock().connect_attempts
    }

    pub fn acknowledged(&self) -> Vec<String> {
        self.lock().acknowledged.clone()
    }

    pub fn rejected(&self) -> Vec<String> {
        self.lock().rejected.clone()
    }

    pub fn published(&self) -> Vec<OutboundMessage> {
        self.lock().published.clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, InMemoryState> {
        match self.state.lock() {
            Ok(state) => state,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

#[async_trait]
impl QueueTransport for InMemoryQueueTransport {
    async fn connect(&self) -> Result<(), TransportError> {
        let mut state = self.lock();
        state.connect_attempts += 1;
        state.connect_results.pop_front().unwrap_or(Ok(()))
    }

    async fn next_delivery(&self) -> Result<Option<Delivery>, TransportError> {
        self.lock().deliveries.pop_front().unwrap_or(Ok(None))
    }

    async fn acknowledge(&self, tag: &str) -> Result<(), TransportError> {
        self.lock().acknowledged.push(tag.to_string());
        Ok(())
    }

    async fn reject(&self, tag: &str) -> Result<(), TransportError> {
        self.lock().rejected.push(tag.to_string());
        Ok(())
    }

    async fn publish(&self, message: &OutboundMessage) -> Result<(), TransportError> {
        self.lock().published.push(message.clone());
        Ok(())
    }

    async fn disconnect(&self) -> Result<(), TransportError> {
        Ok(())
    }
}
