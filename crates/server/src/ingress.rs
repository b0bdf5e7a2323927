//! Webhook the chat gateway posts inbound messages to.

use axum::{body::Bytes, extract::State, http::StatusCode, routing::post, Json, Router};
use kasir_relay::{Delivery, InboundEnvelope};
use serde::Serialize;
use tokio::sync::mpsc;
use tracing::{debug, warn};
use uuid::Uuid;

#[derive(Clone)]
pub struct IngressState {
    pub sender: mpsc::Sender<Delivery>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HookAck {
    pub status: &'static str,
    pub tag: Option<String>,
}

pub fn router(sender: mpsc::Sender<Delivery>) -> Router {
    Router::new().route("/hook", post(hook)).with_state(IngressState { sender })
}

/// Queues the payload for the relay. The reply is sent asynchronously, so
/// the gateway only learns whether the message was accepted.
pub async fn hook(State(state): State<IngressState>, body: Bytes) -> (StatusCode, Json<HookAck>) {
    if let Err(error) = serde_json::from_slice::<InboundEnvelope>(&body) {
        warn!(event_name = "relay.hook.malformed", error = %error, "webhook payload rejected");
        return (StatusCode::BAD_REQUEST, Json(HookAck { status: "malformed", tag: None }));
    }

    let tag = Uuid::new_v4().to_string();
    match state.sender.send(Delivery { tag: tag.clone(), body: body.to_vec() }).await {
        Ok(()) => {
            debug!(event_name = "relay.hook.queued", %tag, "webhook payload queued");
            (StatusCode::ACCEPTED, Json(HookAck { status: "queued", tag: Some(tag) }))
        }
        Err(_) => {
            warn!(event_name = "relay.hook.closed", %tag, "relay is no longer accepting messages");
            (StatusCode::SERVICE_UNAVAILABLE, Json(HookAck { status: "unavailable", tag: None }))
        }
    }
}
