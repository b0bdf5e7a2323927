use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use tracing::{debug, info, warn};

use kasir_agent::{AgentRuntime, OrderReply};
use kasir_core::config::RelayConfig;

use crate::envelope::{Delivery, InboundEnvelope, OutboundMessage};
use crate::groups::GroupDirectory;
use crate::transport::{QueueTransport, ReconnectPolicy, TransportError};

/// Turns one order message into a reply.
#[async_trait]
pub trait MessageHandler: Send + Sync {
    async fn handle(&self, text: &str) -> OrderReply;
}

#[async_trait]
impl MessageHandler for AgentRuntime {
    async fn handle(&self, text: &str) -> OrderReply {
        self.handle_order_message(text).await
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RelaySettings {
    pub fallback_wait: Duration,
    pub fallback_message: String,
    pub broadcast_gap: Duration,
}

impl From<&RelayConfig> for RelaySettings {
    fn from(config: &RelayConfig) -> Self {
        Self {
            fallback_wait: Duration::from_secs(config.fallback_wait_secs),
            fallback_message: config.fallback_message.clone(),
            broadcast_gap: Duration::from_millis(config.broadcast_gap_ms),
        }
    }
}

/// Broadcast only finished orders that are neither pending nor a request to
/// update an earlier receipt.
pub fn should_broadcast(reply: &OrderReply) -> bool {
    reply.completed && !reply.pending && !reply.request_update
}

pub struct RelayRunner {
    transport: Arc<dyn QueueTransport>,
    handler: Arc<dyn MessageHandler>,
    groups: Arc<dyn GroupDirectory>,
    settings: RelaySettings,
    reconnect_policy: ReconnectPolicy,
}

impl RelayRunner {
    pub fn new(
        transport: Arc<dyn QueueTransport>,
        handler: Arc<dyn MessageHandler>,
        groups: Arc<dyn GroupDirectory>,
        settings: RelaySettings,
        reconnect_policy: ReconnectPolicy,
    ) -> Self {
        Self { transport, handler, groups, settings, reconnect_policy }
    }

    /// Pumps the queue until it closes. Transport failures reconnect with
    /// backoff; exhausting the retries ends the loop without an error.
    pub async fn start(&self) -> Result<()> {
        for attempt in 0..=self.reconnect_policy.max_retries {
            match self.connect_and_pump(attempt).await {
                Ok(()) => return Ok(()),
                Err(error) => {
                    warn!(
                        event_name = "relay.transport.failed",
                        attempt,
                        max_retries = self.reconnect_policy.max_retries,
                        error = %error,
                        "queue transport failed"
                    );
                    if attempt >= self.reconnect_policy.max_retries {
                        warn!(event_name = "relay.transport.exhausted", "queue retries exhausted; relay stopped");
                        return Ok(());
                    }
                    let delay = self.reconnect_policy.backoff(attempt);
                    if !delay.is_zero() {
                        tokio::time::sleep(delay).await;
                    }
                }
            }
        }
        Ok(())
    }

    async fn connect_and_pump(&self, attempt: u32) -> Result<(), TransportError> {
        self.transport.connect().await?;
        info!(event_name = "relay.transport.connected", attempt, "queue transport connected");

        loop {
            let Some(delivery) = self.transport.next_delivery().await? else {
                info!(event_name = "relay.transport.closed", "queue closed");
                self.transport.disconnect().await?;
                return Ok(());
            };
            self.process(delivery).await?;
        }
    }

    /// Handles one delivery. It is acknowledged only after every reply for
    /// it has been published.
    pub async fn process(&self, delivery: Delivery) -> Result<(), TransportError> {
        let envelope: InboundEnvelope = match serde_json::from_slice(&delivery.body) {
            Ok(envelope) => envelope,
            Err(error) => {
                warn!(event_name = "relay.delivery.malformed", tag = %delivery.tag, error = %error, "dropping undecodable delivery");
                return self.transport.reject(&delivery.tag).await;
            }
        };
        if !envelope.is_order() {
            debug!(event_name = "relay.delivery.skipped", tag = %delivery.tag, kind = %envelope.kind, "not an order message");
            return self.transport.acknowledge(&delivery.tag).await;
        }

        info!(event_name = "relay.delivery.received", tag = %delivery.tag, from = %envelope.from, "order message received");
        let reply = self.reply_for(&envelope).await?;
        self.transport
            .publish(&OutboundMessage::send(&envelope.session_id, &envelope.from, reply.text.clone()))
            .await?;

        if should_broadcast(&reply) {
            self.broadcast(&envelope, &reply).await;
        }

        self.transport.acknowledge(&delivery.tag).await?;
        info!(
            event_name = "relay.delivery.answered",
            tag = %delivery.tag,
            order_no = reply.order_no.as_deref().unwrap_or("none"),
            completed = reply.completed,
            "reply queued"
        );
        Ok(())
    }

    /// Runs the handler on its own task; a slow run gets the fallback
    /// acknowledgement first and the final reply when it finishes.
    async fn reply_for(&self, envelope: &InboundEnvelope) -> Result<OrderReply, TransportError> {
        let handler = self.handler.clone();
        let text = envelope.text().to_string();
        let mut task = tokio::spawn(async move { handler.handle(&text).await });

        let joined = match tokio::time::timeout(self.settings.fallback_wait, &mut task).await {
            Ok(joined) => joined,
            Err(_) => {
                info!(event_name = "relay.delivery.fallback_sent", from = %envelope.from, "processing is slow; sending fallback");
                self.transport
                    .publish(&OutboundMessage::send(
                        &envelope.session_id,
                        &envelope.from,
                        self.settings.fallback_message.clone(),
                    ))
                    .await?;
                task.await
            }
        };

        Ok(joined.unwrap_or_else(|error| OrderReply {
            text: format!("An error occurred while processing the order: {error}"),
            ..OrderReply::default()
        }))
    }

    async fn broadcast(&self, envelope: &InboundEnvelope, reply: &OrderReply) {
        let groups = match self.groups.active_groups().await {
            Ok(groups) => groups,
            Err(error) => {
                warn!(event_name = "relay.broadcast.groups_failed", error = %error, "group list unavailable; skipping broadcast");
                return;
            }
        };
        for (position, group) in groups.iter().enumerate() {
            if position > 0 && !self.settings.broadcast_gap.is_zero() {
                tokio::time::sleep(self.settings.broadcast_gap).await;
            }
            let message = OutboundMessage::send(&envelope.session_id, group, reply.text.clone());
            if let Err(error) = self.transport.publish(&message).await {
                warn!(event_name = "relay.broadcast.failed", group = %group, error = %error, "broadcast to group failed");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use async_trait::async_trait;

    use kasir_agent::OrderReply;

    use super::{should_broadcast, MessageHandler, RelayRunner, RelaySettings};
    use crate::envelope::Delivery;
    use crate::groups::StaticGroupDirectory;
    use crate::transport::{InMemoryQueueTransport, ReconnectPolicy, TransportError};

    struct Scripted {
        reply: OrderReply,
        delay: Duration,
    }

    #[async_trait]
    impl MessageHandler for Scripted {
        async fn handle(&self, text: &str) -> OrderReply {
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            OrderReply { text: format!("{}: {text}", self.reply.text), ..self.reply.clone() }
        }
    }

    fn completed() -> OrderReply {
        OrderReply { text: "Invoice".to_string(), completed: true, order_no: Some("SO-1".to_string()), ..OrderReply::default() }
    }

    fn order(tag: &str, body: &str) -> Delivery {
        let payload = serde_json::json!({"type": "order", "sessionId": "shop", "from": "62811", "body": body});
        Delivery { tag: tag.to_string(), body: payload.to_string().into_bytes() }
    }

    fn runner(transport: &Arc<InMemoryQueueTransport>, reply: OrderReply, delay: Duration, wait: Duration) -> RelayRunner {
        RelayRunner::new(
            transport.clone(),
            Arc::new(Scripted { reply, delay }),
            Arc::new(StaticGroupDirectory::new(vec!["group-a".to_string(), " ".to_string(), "group-b".to_string()])),
            RelaySettings {
                fallback_wait: wait,
                fallback_message: "Still working".to_string(),
                broadcast_gap: Duration::ZERO,
            },
            ReconnectPolicy { max_retries: 2, base_delay_ms: 0, max_delay_ms: 0 },
        )
    }

    #[tokio::test]
    async fn fast_replies_go_out_once_then_broadcast_and_ack() {
        let transport = Arc::new(InMemoryQueueTransport::with_deliveries(vec![order("t1", "Nama: Rina")]));

        runner(&transport, completed(), Duration::ZERO, Duration::from_secs(30)).start().await.expect("runner");

        let published = transport.published();
        let recipients: Vec<&str> = published.iter().map(|message| message.number_recipient.as_str()).collect();
        assert_eq!(recipients, vec!["62811", "group-a", "group-b"]);
        assert_eq!(published[0].message, "Invoice: Nama: Rina");
        assert_eq!(published[0].number, "shop");
        assert_eq!(transport.acknowledged(), vec!["t1"]);
    }

    #[tokio::test]
    async fn slow_replies_send_the_fallback_first() {
        let transport = Arc::new(InMemoryQueueTransport::with_deliveries(vec![order("t1", "Nama: Rina")]));
        let mut reply = completed();
        reply.pending = true;

        runner(&transport, reply, Duration::from_millis(200), Duration::from_millis(10))
            .start()
            .await
            .expect("runner");

        let messages: Vec<String> = transport.published().into_iter().map(|message| message.message).collect();
        assert_eq!(messages, vec!["Still working".to_string(), "Invoice: Nama: Rina".to_string()]);
        assert_eq!(transport.acknowledged(), vec!["t1"]);
    }

    #[tokio::test]
    async fn malformed_and_foreign_deliveries_are_not_answered() {
        let transport = Arc::new(InMemoryQueueTransport::with_deliveries(vec![
            Delivery { tag: "bad".to_string(), body: b"not json".to_vec() },
            Delivery { tag: "status".to_string(), body: br#"{"type": "status"}"#.to_vec() },
        ]));

        runner(&transport, completed(), Duration::ZERO, Duration::from_secs(30)).start().await.expect("runner");

        assert!(transport.published().is_empty());
        assert_eq!(transport.rejected(), vec!["bad"]);
        assert_eq!(transport.acknowledged(), vec!["status"]);
    }

    #[tokio::test]
    async fn reconnects_after_a_failed_connect() {
        let transport = Arc::new(
            InMemoryQueueTransport::with_deliveries(vec![order("t1", "x")])
                .fail_connects(vec![TransportError::Connect("broker down".to_string())]),
        );

        runner(&transport, OrderReply::default(), Duration::ZERO, Duration::from_secs(30))
            .start()
            .await
            .expect("runner");

        assert_eq!(transport.connect_attempts(), 2);
        assert_eq!(transport.acknowledged(), vec!["t1"]);
    }

    #[test]
    fn only_final_completed_orders_are_broadcast() {
        assert!(should_broadcast(&completed()));
        assert!(!should_broadcast(&OrderReply { request_update: true, ..completed() }));
        assert!(!should_broadcast(&OrderReply { pending: true, ..completed() }));
        assert!(!should_broadcast(&OrderReply::default()));
    }
}
