use serde::{Deserialize, Serialize};

/// One message taken off the inbound queue, not yet acknowledged.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Delivery {
    pub tag: String,
    pub body: Vec<u8>,
}

/// Webhook payload forwarded by the chat gateway.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
pub struct InboundEnvelope {
    #[serde(rename = "type", default)]
    pub kind: String,
    /// Chat session the reply is sent from.
    #[serde(rename = "sessionId", default)]
    pub session_id: String,
    /// Sender, and recipient of the reply.
    #[serde(default)]
    pub from: String,
    #[serde(default)]
    pub body: String,
}

impl InboundEnvelope {
    pub fn is_order(&self) -> bool {
        self.kind == "order"
    }

    pub fn text(&self) -> &str {
        if self.body.trim().is_empty() {
            "Incomplete order"
        } else {
            &self.body
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
pub struct OutboundMessage {
    pub command: String,
    pub number: String,
    pub number_recipient: String,
    pub message: String,
}

impl OutboundMessage {
    pub fn send(session_id: &str, recipient: &str, message: impl Into<String>) -> Self {
        Self {
            command: "send_message".to_string(),
            number: session_id.to_string(),
            number_recipient: recipient.to_string(),
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{InboundEnvelope, OutboundMessage};

    #[test]
    fn gateway_payload_field_names_are_kept() {
        let envelope: InboundEnvelope = serde_json::from_str(
            r#"{"type": "order", "sessionId": "shop-1", "from": "62811@c.us", "body": "Nama: Rina"}"#,
        )
        .expect("envelope");
        assert!(envelope.is_order());
        assert_eq!(envelope.session_id, "shop-1");
        assert_eq!(envelope.text(), "Nama: Rina");

        let outbound = serde_json::to_value(OutboundMessage::send("shop-1", "62811@c.us", "ok")).expect("json");
        assert_eq!(outbound["command"], "send_message");
        assert_eq!(outbound["number_recipient"], "62811@c.us");
    }

    #[test]
    fn empty_bodies_get_a_placeholder() {
        let envelope: InboundEnvelope = serde_json::from_str(r#"{"type": "order"}"#).expect("envelope");
        assert_eq!(envelope.text(), "Incomplete order");
    }
}
