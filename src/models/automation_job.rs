use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::fmt;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum JobAction {
    SendInvite,
    SendRejection,
    SendOutreach,
    SendQuestionnaire,
    SendTestTask,
}

impl JobAction {
    pub const ALL: [JobAction; 5] = [
        JobAction::SendInvite,
        JobAction::SendRejection,
        JobAction::SendOutreach,
        JobAction::SendQuestionnaire,
        JobAction::SendTestTask,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            JobAction::SendInvite => "send_invite",
            JobAction::SendRejection => "send_rejection",
            JobAction::SendOutreach => "send_outreach",
            JobAction::SendQuestionnaire => "send_questionnaire",
            JobAction::SendTestTask => "send_test_task",
        }
    }
}

impl fmt::Display for JobAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// `pending -> processing -> completed | failed`, with `failed` jobs either
/// returned to `pending` by the retry policy or parked in `dead_letter`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Processing,
    Completed,
    Failed,
    DeadLetter,
}

impl JobStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Processing => "processing",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
            JobStatus::DeadLetter => "dead_letter",
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct AutomationJob {
    pub id: Uuid,
    pub action_type: JobAction,
    pub status: JobStatus,
    pub candidate_id: Uuid,
    pub request_id: Option<Uuid>,
    pub scheduled_for: Option<DateTime<Utc>>,
    pub retry_count: i32,
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl AutomationJob {
    /// A null schedule means "run as soon as possible".
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.status == JobStatus::Pending && self.scheduled_for.map_or(true, |at| at <= now)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewJob {
    pub action_type: JobAction,
    pub candidate_id: Uuid,
    pub request_id: Option<Uuid>,
    pub scheduled_for: Option<DateTime<Utc>>,
}

/// Counts produced by one pass of the retry policy.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RequeueSummary {
    pub requeued: u64,
    pub dead_lettered: u64,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct BatchResult {
    pub processed: usize,
    pub successful: usize,
    pub failed: usize,
    /// Jobs fetched as due but claimed by a concurrent tick first.
    pub skipped: usize,
    /// Jobs found stuck in `processing` and moved to `failed`.
    pub recovered: u64,
    pub requeued: u64,
    pub dead_lettered: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}
