use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::fmt;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum FinalDecision {
    Invite,
    Reject,
}

impl FinalDecision {
    pub fn as_str(self) -> &'static str {
        match self {
            FinalDecision::Invite => "invite",
            FinalDecision::Reject => "reject",
        }
    }
}

impl fmt::Display for FinalDecision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum MatchStatus {
    Matched,
    Contacted,
    TestTask,
    Decided,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct CandidateRequestMatch {
    pub id: Uuid,
    pub candidate_id: Uuid,
    pub request_id: Uuid,
    pub match_score: f64,
    pub status: MatchStatus,
    pub final_decision: Option<FinalDecision>,
    pub final_decision_at: Option<DateTime<Utc>>,
    pub final_decision_by: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Outcome of writing a final decision onto a match.
#[derive(Debug, Clone)]
pub enum DecisionWrite {
    Recorded(CandidateRequestMatch),
    /// The match already carried a decision; nothing was changed.
    AlreadyDecided(CandidateRequestMatch),
}
