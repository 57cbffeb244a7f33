use crate::error::Result;
use crate::models::{
    candidate::Candidate,
    conversation::{MessageType, NewConversationEntry},
    outreach::DeliveryMethod,
};
use crate::services::channels::{Channels, SentMessage};
use crate::services::delivery::resolve_delivery;
use crate::store::ConversationStore;
use serde::Serialize;
use serde_json::{json, Value as JsonValue};
use std::sync::Arc;
use uuid::Uuid;

/// Result of a best-effort send.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Delivery {
    pub delivered: bool,
    pub delivery_method: Option<DeliveryMethod>,
    pub message_id: Option<String>,
    pub error: Option<String>,
}

/// Sends candidate messages over the resolved channel and records each one
/// in the conversation log.
#[derive(Clone)]
pub struct CandidateMessenger {
    conversations: Arc<dyn ConversationStore>,
    channels: Channels,
}

impl CandidateMessenger {
    pub fn new(conversations: Arc<dyn ConversationStore>, channels: Channels) -> Self {
        Self {
            conversations,
            channels,
        }
    }

    pub fn channels(&self) -> &Channels {
        &self.channels
    }

    /// Sends and logs on success. A failed send is returned as an error and
    /// leaves no conversation entry, so the caller may retry.
    pub async fn send(
        &self,
        candidate: &Candidate,
        request_id: Option<Uuid>,
        message_type: MessageType,
        text: &str,
        metadata: JsonValue,
    ) -> Result<SentMessage> {
        let target = resolve_delivery(candidate)?;
        let sent = self
            .channels
            .send(target.method, &target.recipient, message_type.email_subject(), text)
            .await?;

        let delivery = Delivery {
            delivered: true,
            delivery_method: Some(target.method),
            message_id: sent.message_id.clone(),
            error: None,
        };
        self.record(candidate.id, request_id, message_type, text, metadata, &delivery)
            .await?;
        Ok(sent)
    }

    /// Sends without failing the caller: the outcome lands in the returned
    /// `Delivery` and in the entry metadata. Only a store error propagates.
    pub async fn send_best_effort(
        &self,
        candidate: &Candidate,
        request_id: Option<Uuid>,
        message_type: MessageType,
        text: &str,
        metadata: JsonValue,
    ) -> Result<Delivery> {
        let delivery = match resolve_delivery(candidate) {
            Ok(target) => match self
                .channels
                .send(target.method, &target.recipient, message_type.email_subject(), text)
                .await
            {
                Ok(sent) => Delivery {
                    delivered: true,
                    delivery_method: Some(target.method),
                    message_id: sent.message_id,
                    error: None,
                },
                Err(e) => Delivery {
                    delivered: false,
                    delivery_method: Some(target.method),
                    message_id: None,
                    error: Some(e.to_string()),
                },
            },
            Err(e) => Delivery {
                error: Some(e.to_string()),
                ..Delivery::default()
            },
        };

        if let Some(error) = &delivery.error {
            tracing::warn!(candidate_id = %candidate.id, ?message_type, %error, "Candidate message not delivered");
        }
        self.record(candidate.id, request_id, message_type, text, metadata, &delivery)
            .await?;
        Ok(delivery)
    }

    /// Appends an outbound entry carrying `delivery` in its metadata.
    pub async fn record(
        &self,
        candidate_id: Uuid,
        request_id: Option<Uuid>,
        message_type: MessageType,
        text: &str,
        metadata: JsonValue,
        delivery: &Delivery,
    ) -> Result<()> {
        let mut metadata = match metadata {
            JsonValue::Object(map) => map,
            JsonValue::Null => Default::default(),
            other => {
                let mut map = serde_json::Map::new();
                map.insert("details".to_string(), other);
                map
            }
        };
        metadata.insert("delivered".into(), json!(delivery.delivered));
        metadata.insert("delivery_method".into(), json!(delivery.delivery_method));
        if let Some(id) = &delivery.message_id {
            metadata.insert("message_id".into(), json!(id));
        }
        if let Some(error) = &delivery.error {
            metadata.insert("error".into(), json!(error));
        }

        self.conversations
            .append_entry(NewConversationEntry::outbound(
                candidate_id,
                request_id,
                message_type,
                text,
                JsonValue::Object(metadata),
            ))
            .await?;
        Ok(())
    }
}
