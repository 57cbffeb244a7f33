use crate::config::AutomationSettings;
use crate::error::{Error, Result};
use crate::models::{
    automation_job::{AutomationJob, JobAction, NewJob},
    candidate::{Candidate, PipelineStage, TestTaskStatus},
    candidate_match::{CandidateRequestMatch, DecisionWrite, FinalDecision},
    conversation::MessageType,
};
use crate::services::message_generator::{MessageContext, MessageGenerator, MessageKind};
use crate::services::messenger::{CandidateMessenger, Delivery};
use crate::services::pipeline::advance_stage;
use crate::store::Stores;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize)]
pub struct DecisionOutcome {
    #[serde(rename = "match")]
    pub match_record: CandidateRequestMatch,
    pub pipeline_stage: PipelineStage,
    /// Follow-up job created by this call; `None` when one already existed.
    pub job: Option<AutomationJob>,
    pub already_recorded: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TestTaskVerdict {
    Approved,
    Rejected,
}

#[derive(Debug, Clone, Serialize)]
pub struct TestTaskDecisionOutcome {
    pub candidate_id: Uuid,
    pub verdict: TestTaskVerdict,
    pub pipeline_stage: PipelineStage,
    pub message: String,
    pub delivered: bool,
    pub delivery: Delivery,
}

/// Records manager decisions and queues the messages that follow them.
#[derive(Clone)]
pub struct DecisionService {
    stores: Stores,
    generator: MessageGenerator,
    messenger: CandidateMessenger,
    settings: AutomationSettings,
}

impl DecisionService {
    pub fn new(
        stores: Stores,
        generator: MessageGenerator,
        messenger: CandidateMessenger,
        settings: AutomationSettings,
    ) -> Self {
        Self {
            stores,
            generator,
            messenger,
            settings,
        }
    }

    async fn candidate(&self, candidate_id: Uuid) -> Result<Candidate> {
        self.stores
            .candidates
            .get_candidate(candidate_id)
            .await?
            .ok_or_else(|| {
                Error::precondition(
                    "candidate_not_found",
                    format!("Candidate {} not found", candidate_id),
                )
            })
    }

    /// Writes the final decision once. Repeating the same decision is a
    /// no-op apart from queueing a follow-up job that is still missing; a
    /// different decision on a decided match is a conflict.
    pub async fn record_final_decision(
        &self,
        candidate_id: Uuid,
        request_id: Uuid,
        decision: FinalDecision,
        decided_by: &str,
        now: DateTime<Utc>,
    ) -> Result<DecisionOutcome> {
        let candidate = self.candidate(candidate_id).await?;

        let (record, already_recorded) = match self
            .stores
            .matches
            .record_final_decision(candidate_id, request_id, decision, decided_by, now)
            .await?
        {
            DecisionWrite::Recorded(record) => (record, false),
            DecisionWrite::AlreadyDecided(record) if record.final_decision == Some(decision) => {
                (record, true)
            }
            DecisionWrite::AlreadyDecided(record) => {
                return Err(Error::Conflict(format!(
                    "Match already decided as {}",
                    record
                        .final_decision
                        .map(FinalDecision::as_str)
                        .unwrap_or("unknown")
                )));
            }
        };

        // The decision is stored from here on: a stage conflict is logged,
        // and the follow-up job is queued regardless.
        let candidate = self.move_to_decision_stage(candidate, decision).await;
        let job = self.ensure_follow_up(candidate_id, request_id, decision, now).await?;

        if already_recorded {
            tracing::info!(
                %candidate_id,
                %request_id,
                %decision,
                requeued = job.is_some(),
                "Final decision already recorded"
            );
        } else {
            tracing::info!(
                %candidate_id,
                %request_id,
                %decision,
                decided_by,
                job_id = ?job.as_ref().map(|j| j.id),
                "Final decision recorded"
            );
        }

        Ok(DecisionOutcome {
            match_record: record,
            pipeline_stage: candidate.pipeline_stage,
            job,
            already_recorded,
        })
    }

    async fn move_to_decision_stage(&self, candidate: Candidate, decision: FinalDecision) -> Candidate {
        let stage = match decision {
            FinalDecision::Invite => PipelineStage::Interview,
            FinalDecision::Reject => PipelineStage::Rejected,
        };
        if candidate.pipeline_stage == stage {
            return candidate;
        }
        if !candidate.pipeline_stage.can_transition_to(stage) {
            tracing::warn!(
                candidate_id = %candidate.id,
                from = %candidate.pipeline_stage,
                to = %stage,
                "Decision recorded without stage change"
            );
            return candidate;
        }
        match advance_stage(self.stores.candidates.as_ref(), &candidate, stage).await {
            Ok(updated) => updated,
            Err(e) => {
                tracing::warn!(candidate_id = %candidate.id, to = %stage, error = ?e, "Stage not advanced after decision");
                candidate
            }
        }
    }

    /// Queues the invite or rejection job unless one already exists for this
    /// match. Returns the job created by this call.
    async fn ensure_follow_up(
        &self,
        candidate_id: Uuid,
        request_id: Uuid,
        decision: FinalDecision,
        now: DateTime<Utc>,
    ) -> Result<Option<AutomationJob>> {
        let job = match decision {
            FinalDecision::Invite => NewJob {
                action_type: JobAction::SendInvite,
                candidate_id,
                request_id: Some(request_id),
                scheduled_for: None,
            },
            FinalDecision::Reject => NewJob {
                action_type: JobAction::SendRejection,
                candidate_id,
                request_id: Some(request_id),
                scheduled_for: Some(now + self.settings.rejection_delay),
            },
        };

        let existing = self.stores.jobs.jobs_for_candidate(candidate_id).await?;
        if existing
            .iter()
            .any(|j| j.action_type == job.action_type && j.request_id == Some(request_id))
        {
            return Ok(None);
        }
        Ok(Some(self.stores.jobs.enqueue_job(job).await?))
    }

    /// Approves or rejects a submitted test task and tells the candidate.
    /// A failed delivery does not undo the decision.
    pub async fn record_test_task_decision(
        &self,
        candidate_id: Uuid,
        verdict: TestTaskVerdict,
        feedback: Option<&str>,
        decided_by: &str,
    ) -> Result<TestTaskDecisionOutcome> {
        let candidate = self.candidate(candidate_id).await?;
        if !matches!(
            candidate.test_task_status,
            TestTaskStatus::Sent | TestTaskStatus::Submitted
        ) {
            return Err(Error::precondition(
                "no_test_task",
                format!(
                    "Candidate {} has test task status {}",
                    candidate_id,
                    candidate.test_task_status.as_str()
                ),
            ));
        }

        let (status, stage, kind) = match verdict {
            TestTaskVerdict::Approved => (
                TestTaskStatus::Approved,
                PipelineStage::TestDone,
                MessageKind::Approval,
            ),
            TestTaskVerdict::Rejected => (
                TestTaskStatus::Rejected,
                PipelineStage::Rejected,
                MessageKind::Rejection,
            ),
        };
        if !candidate.pipeline_stage.can_transition_to(stage) {
            return Err(Error::InvalidTransition(format!(
                "Candidate {} cannot move from {} to {}",
                candidate_id, candidate.pipeline_stage, stage
            )));
        }

        let request = match self
            .stores
            .matches
            .best_match_for_candidate(candidate_id)
            .await?
        {
            Some(m) => self.stores.requests.get_request(m.request_id).await?,
            None => None,
        };
        let message = self
            .generator
            .generate(
                kind,
                MessageContext::new(&candidate, request.as_ref()).with_feedback(feedback),
            )
            .await;

        self.stores
            .candidates
            .set_test_task_status(candidate_id, status)
            .await?;
        let updated = advance_stage(self.stores.candidates.as_ref(), &candidate, stage).await?;

        let delivery = self
            .messenger
            .send_best_effort(
                &updated,
                request.as_ref().map(|r| r.id),
                MessageType::TestTaskDecision,
                &message,
                json!({
                    "verdict": verdict,
                    "feedback": feedback,
                    "decided_by": decided_by,
                }),
            )
            .await?;

        tracing::info!(%candidate_id, ?verdict, delivered = delivery.delivered, "Test task decision recorded");

        Ok(TestTaskDecisionOutcome {
            candidate_id,
            verdict,
            pipeline_stage: updated.pipeline_stage,
            message,
            delivered: delivery.delivered,
            delivery,
        })
    }
}
