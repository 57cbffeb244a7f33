use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::fmt;
use uuid::Uuid;

use super::outreach::OutreachStatus;

/// Position of a candidate in the hiring funnel.
///
/// The lifecycle stages are ordered; a candidate only ever moves forward
/// through them. `OutreachDeclined`, `Rejected` and `Hired` are terminal and
/// reachable from any non-terminal stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum PipelineStage {
    New,
    Analyzed,
    OutreachSent,
    QuestionnaireSent,
    QuestionnaireDone,
    TestSent,
    TestDone,
    Interview,
    OutreachDeclined,
    Rejected,
    Hired,
}

impl PipelineStage {
    pub const ALL: [PipelineStage; 11] = [
        PipelineStage::New,
        PipelineStage::Analyzed,
        PipelineStage::OutreachSent,
        PipelineStage::QuestionnaireSent,
        PipelineStage::QuestionnaireDone,
        PipelineStage::TestSent,
        PipelineStage::TestDone,
        PipelineStage::Interview,
        PipelineStage::OutreachDeclined,
        PipelineStage::Rejected,
        PipelineStage::Hired,
    ];

    /// Position along the lifecycle, `None` for terminal stages.
    pub fn rank(self) -> Option<u8> {
        match self {
            PipelineStage::New => Some(0),
            PipelineStage::Analyzed => Some(1),
            PipelineStage::OutreachSent => Some(2),
            PipelineStage::QuestionnaireSent => Some(3),
            PipelineStage::QuestionnaireDone => Some(4),
            PipelineStage::TestSent => Some(5),
            PipelineStage::TestDone => Some(6),
            PipelineStage::Interview => Some(7),
            PipelineStage::OutreachDeclined | PipelineStage::Rejected | PipelineStage::Hired => {
                None
            }
        }
    }

    pub fn is_terminal(self) -> bool {
        self.rank().is_none()
    }

    /// Whether the candidate has not yet progressed past the outreach phase.
    pub fn is_outreach_phase(self) -> bool {
        matches!(self.rank(), Some(rank) if rank <= 3)
    }

    /// Staying in the same stage is always allowed so repeated handler runs
    /// stay idempotent.
    pub fn can_transition_to(self, next: PipelineStage) -> bool {
        if self == next {
            return true;
        }
        match (self.rank(), next.rank()) {
            (None, _) => false,
            (Some(_), None) => true,
            (Some(from), Some(to)) => to > from,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            PipelineStage::New => "new",
            PipelineStage::Analyzed => "analyzed",
            PipelineStage::OutreachSent => "outreach_sent",
            PipelineStage::QuestionnaireSent => "questionnaire_sent",
            PipelineStage::QuestionnaireDone => "questionnaire_done",
            PipelineStage::TestSent => "test_sent",
            PipelineStage::TestDone => "test_done",
            PipelineStage::Interview => "interview",
            PipelineStage::OutreachDeclined => "outreach_declined",
            PipelineStage::Rejected => "rejected",
            PipelineStage::Hired => "hired",
        }
    }
}

impl fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum TestTaskStatus {
    NotSent,
    Sent,
    Submitted,
    Approved,
    Rejected,
}

impl TestTaskStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            TestTaskStatus::NotSent => "not_sent",
            TestTaskStatus::Sent => "sent",
            TestTaskStatus::Submitted => "submitted",
            TestTaskStatus::Approved => "approved",
            TestTaskStatus::Rejected => "rejected",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Candidate {
    pub id: Uuid,
    pub name: String,
    pub email: Option<String>,
    pub telegram_chat_id: Option<i64>,
    pub preferred_contact_methods: Vec<String>,
    pub pipeline_stage: PipelineStage,
    pub outreach_status: Option<OutreachStatus>,
    pub ai_score: Option<f64>,
    pub ai_category: Option<String>,
    pub ai_summary: Option<String>,
    pub ai_strengths: Vec<String>,
    pub test_task_status: TestTaskStatus,
    pub test_task_original_deadline: Option<DateTime<Utc>>,
    pub test_task_current_deadline: Option<DateTime<Utc>>,
    pub test_task_extensions_count: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Candidate {
    pub fn has_received_test_task(&self) -> bool {
        self.test_task_status != TestTaskStatus::NotSent
    }

    pub fn first_name(&self) -> &str {
        self.name.split_whitespace().next().unwrap_or(&self.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lifecycle_only_moves_forward() {
        assert!(PipelineStage::New.can_transition_to(PipelineStage::Analyzed));
        assert!(PipelineStage::Analyzed.can_transition_to(PipelineStage::TestSent));
        assert!(!PipelineStage::TestSent.can_transition_to(PipelineStage::OutreachSent));
        assert!(!PipelineStage::Interview.can_transition_to(PipelineStage::New));
    }

    #[test]
    fn terminal_stages_reachable_from_any_open_stage_and_are_sinks() {
        for from in PipelineStage::ALL.iter().filter(|s| !s.is_terminal()) {
            assert!(from.can_transition_to(PipelineStage::Rejected));
            assert!(from.can_transition_to(PipelineStage::OutreachDeclined));
            assert!(from.can_transition_to(PipelineStage::Hired));
        }
        for terminal in PipelineStage::ALL.iter().filter(|s| s.is_terminal()) {
            for to in PipelineStage::ALL.iter().filter(|s| *s != terminal) {
                assert!(!terminal.can_transition_to(*to), "{terminal} -> {to}");
            }
        }
    }

    #[test]
    fn same_stage_is_allowed() {
        for stage in PipelineStage::ALL {
            assert!(stage.can_transition_to(stage));
        }
    }

    #[test]
    fn outreach_phase_covers_early_stages() {
        assert!(PipelineStage::New.is_outreach_phase());
        assert!(PipelineStage::QuestionnaireSent.is_outreach_phase());
        assert!(!PipelineStage::TestSent.is_outreach_phase());
        assert!(!PipelineStage::Rejected.is_outreach_phase());
    }
}
