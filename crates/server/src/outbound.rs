//! Hands relay replies to the chat gateway.

use kasir_relay::OutboundMessage;
use reqwest::Client;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{info, warn};

/// Drains the relay's outbox until every publisher is gone. Without an
/// endpoint the messages are only logged.
pub fn spawn(
    http: Client,
    endpoint: Option<String>,
    mut outbox: mpsc::UnboundedReceiver<OutboundMessage>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(message) = outbox.recv().await {
            forward(&http, endpoint.as_deref(), &message).await;
        }
    })
}

pub async fn forward(http: &Client, endpoint: Option<&str>, message: &OutboundMessage) -> bool {
    let Some(endpoint) = endpoint else {
        info!(
            event_name = "relay.outbound.unrouted",
            recipient = %message.number_recipient,
            message = %message.message,
            "no outbound endpoint configured"
        );
        return false;
    };

    match http.post(endpoint).json(message).send().await {
        Ok(response) if response.status().is_success() => {
            info!(
                event_name = "relay.outbound.sent",
                recipient = %message.number_recipient,
                "reply handed to the chat gateway"
            );
            true
        }
        Ok(response) => {
            warn!(
                event_name = "relay.outbound.rejected",
                recipient = %message.number_recipient,
                status = %response.status(),
                "chat gateway refused the reply"
            );
            false
        }
        Err(error) => {
            warn!(
                event_name = "relay.outbound.failed",
                recipient = %message.number_recipient,
                error = %error,
                "reply could not be delivered"
            );
            false
        }
    }
}
