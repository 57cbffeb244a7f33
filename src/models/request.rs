use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// A hiring request (open position) candidates are matched against.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct HiringRequest {
    pub id: Uuid,
    pub title: String,
    pub company: Option<String>,
    pub description: Option<String>,
    pub test_task_url: Option<String>,
    pub questionnaire_url: Option<String>,
    pub created_at: DateTime<Utc>,
}
