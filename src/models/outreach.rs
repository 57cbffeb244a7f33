use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::fmt;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum OutreachStatus {
    Scheduled,
    Sending,
    Sent,
    Cancelled,
    Failed,
}

impl OutreachStatus {
    /// Only scheduled items may be edited, cancelled or sent.
    pub fn is_mutable(self) -> bool {
        self == OutreachStatus::Scheduled
    }

    pub fn as_str(self) -> &'static str {
        match self {
            OutreachStatus::Scheduled => "scheduled",
            OutreachStatus::Sending => "sending",
            OutreachStatus::Sent => "sent",
            OutreachStatus::Cancelled => "cancelled",
            OutreachStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for OutreachStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum DeliveryMethod {
    Telegram,
    Email,
}

impl DeliveryMethod {
    pub fn as_str(self) -> &'static str {
        match self {
            DeliveryMethod::Telegram => "telegram",
            DeliveryMethod::Email => "email",
        }
    }
}

impl fmt::Display for DeliveryMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct OutreachQueueItem {
    pub id: Uuid,
    pub candidate_id: Uuid,
    pub request_id: Option<Uuid>,
    pub intro_message: String,
    pub test_task_message: Option<String>,
    pub delivery_method: DeliveryMethod,
    pub scheduled_for: DateTime<Utc>,
    pub status: OutreachStatus,
    pub edited_by: Option<String>,
    pub edited_at: Option<DateTime<Utc>>,
    pub sent_at: Option<DateTime<Utc>>,
    pub message_id: Option<String>,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl OutreachQueueItem {
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.status == OutreachStatus::Scheduled && self.scheduled_for <= now
    }

    /// Intro followed by the test-task block, when there is one.
    pub fn full_text(&self) -> String {
        let mut text = self.intro_message.clone();
        if let Some(test_task) = self.test_task_message.as_deref().filter(|t| !t.trim().is_empty()) {
            text.push_str("\n\n");
            text.push_str(test_task);
        }
        text
    }
}

#[derive(Debug, Clone)]
pub struct NewOutreachItem {
    pub candidate_id: Uuid,
    pub request_id: Option<Uuid>,
    pub intro_message: String,
    pub test_task_message: Option<String>,
    pub delivery_method: DeliveryMethod,
    pub scheduled_for: DateTime<Utc>,
}

#[derive(Debug, Clone, Default)]
pub struct OutreachEdit {
    pub message: Option<String>,
    pub scheduled_for: Option<DateTime<Utc>>,
}

/// Result of sending one outreach item.
#[derive(Debug, Clone, Serialize)]
pub struct ProcessOutcome {
    pub outreach_id: Uuid,
    pub success: bool,
    pub message_id: Option<String>,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct OutreachBatchResult {
    pub processed: usize,
    pub successful: usize,
    pub failed: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}
