use crate::models::{
    automation_job::JobAction, candidate_match::FinalDecision, outreach::OutreachQueueItem,
};
use crate::services::{decision_service::TestTaskVerdict, message_generator::MessageKind};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

#[derive(Debug, Deserialize, Validate)]
pub struct EnqueueJobPayload {
    pub action_type: JobAction,
    pub candidate_id: Uuid,
    pub request_id: Option<Uuid>,
    pub scheduled_for: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct EditOutreachPayload {
    #[validate(length(min = 1, max = 4000))]
    pub message: Option<String>,
    pub scheduled_for: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct GenerateMessagePayload {
    pub kind: MessageKind,
    pub candidate_id: Uuid,
    pub request_id: Option<Uuid>,
    pub deadline: Option<DateTime<Utc>>,
    #[validate(length(max = 2000))]
    pub feedback: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct GeneratedMessage {
    pub kind: MessageKind,
    pub message: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct FinalDecisionPayload {
    pub candidate_id: Uuid,
    pub request_id: Uuid,
    pub decision: FinalDecision,
}

#[derive(Debug, Deserialize, Validate)]
pub struct TestTaskDecisionPayload {
    pub decision: TestTaskVerdict,
    #[validate(length(max = 2000))]
    pub feedback: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct ExtendDeadlinePayload {
    #[validate(length(min = 1, max = 2000))]
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct CancelledOutreach {
    pub cancelled: Vec<OutreachQueueItem>,
}
