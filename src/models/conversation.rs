use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Outbound,
    Inbound,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum MessageType {
    Intro,
    Questionnaire,
    TestTask,
    Invite,
    Rejection,
    TestTaskDecision,
    ExtensionGranted,
    ExtensionDenied,
    CandidateReply,
}

impl MessageType {
    /// Subject line used when the message goes out by email.
    pub fn email_subject(self) -> &'static str {
        match self {
            MessageType::Intro => "Запрошення до співпраці",
            MessageType::Questionnaire => "Анкета кандидата",
            MessageType::TestTask => "Тестове завдання",
            MessageType::Invite => "Запрошення на співбесіду",
            MessageType::Rejection => "Результати розгляду кандидатури",
            MessageType::TestTaskDecision => "Результати тестового завдання",
            MessageType::ExtensionGranted | MessageType::ExtensionDenied => {
                "Термін виконання тестового завдання"
            }
            MessageType::CandidateReply => "Повідомлення від команди рекрутингу",
        }
    }
}

/// Append-only audit record of a message exchanged with a candidate.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ConversationEntry {
    pub id: Uuid,
    pub candidate_id: Uuid,
    pub request_id: Option<Uuid>,
    pub direction: Direction,
    pub message_type: MessageType,
    pub content: String,
    pub metadata: JsonValue,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewConversationEntry {
    pub candidate_id: Uuid,
    pub request_id: Option<Uuid>,
    pub direction: Direction,
    pub message_type: MessageType,
    pub content: String,
    pub metadata: JsonValue,
}

impl NewConversationEntry {
    pub fn outbound(
        candidate_id: Uuid,
        request_id: Option<Uuid>,
        message_type: MessageType,
        content: impl Into<String>,
        metadata: JsonValue,
    ) -> Self {
        Self {
            candidate_id,
            request_id,
            direction: Direction::Outbound,
            message_type,
            content: content.into(),
            metadata,
        }
    }

    pub fn inbound(candidate_id: Uuid, content: impl Into<String>, metadata: JsonValue) -> Self {
        Self {
            candidate_id,
            request_id: None,
            direction: Direction::Inbound,
            message_type: MessageType::CandidateReply,
            content: content.into(),
            metadata,
        }
    }
}
