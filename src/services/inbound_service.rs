use crate::error::{Error, Result};
use crate::models::{
    automation_job::{JobAction, JobStatus, NewJob},
    candidate::{Candidate, PipelineStage, TestTaskStatus},
    conversation::NewConversationEntry,
    outreach::OutreachStatus,
};
use crate::services::classifier::{Classification, ClassificationContext, ReplyCategory, ResponseClassifier};
use crate::services::extension_service::{ExtensionOutcome, ExtensionService};
use crate::services::pipeline::advance_stage;
use crate::store::Stores;
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::json;
use uuid::Uuid;

/// What the engine did with an inbound reply.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum InboundAction {
    /// Unknown sender.
    Ignored,
    /// Recorded, nothing else to do.
    Logged,
    Extension { outcome: Box<ExtensionOutcome> },
    OutreachDeclined,
    QuestionnaireQueued { job_id: Uuid },
    TestTaskSubmitted,
}

#[derive(Debug, Clone, Serialize)]
pub struct InboundOutcome {
    pub candidate_id: Option<Uuid>,
    pub classification: Option<Classification>,
    #[serde(flatten)]
    pub action: InboundAction,
}

/// Classifies candidate replies and routes them into the pipeline.
#[derive(Clone)]
pub struct InboundService {
    stores: Stores,
    classifier: ResponseClassifier,
    extensions: ExtensionService,
}

impl InboundService {
    pub fn new(stores: Stores, classifier: ResponseClassifier, extensions: ExtensionService) -> Self {
        Self {
            stores,
            classifier,
            extensions,
        }
    }

    pub async fn handle_telegram_message(
        &self,
        chat_id: i64,
        text: &str,
        now: DateTime<Utc>,
    ) -> Result<InboundOutcome> {
        let Some(candidate) = self.stores.candidates.find_by_telegram_chat(chat_id).await? else {
            tracing::info!(chat_id, "Message from unknown chat ignored");
            return Ok(InboundOutcome {
                candidate_id: None,
                classification: None,
                action: InboundAction::Ignored,
            });
        };

        let classification = self
            .classifier
            .classify(
                text,
                ClassificationContext {
                    has_received_test_task: candidate.has_received_test_task(),
                    test_task_deadline: candidate.test_task_current_deadline,
                },
            )
            .await;

        self.stores
            .conversations
            .append_entry(NewConversationEntry::inbound(
                candidate.id,
                text,
                json!({
                    "source": "telegram",
                    "chat_id": chat_id,
                    "classification": classification,
                }),
            ))
            .await?;

        tracing::info!(
            candidate_id = %candidate.id,
            category = %classification.category,
            confidence = classification.confidence,
            "Inbound reply classified"
        );

        let action = self.route(&candidate, &classification, text, now).await?;
        Ok(InboundOutcome {
            candidate_id: Some(candidate.id),
            classification: Some(classification),
            action,
        })
    }

    async fn route(
        &self,
        candidate: &Candidate,
        classification: &Classification,
        text: &str,
        now: DateTime<Utc>,
    ) -> Result<InboundAction> {
        let stage = candidate.pipeline_stage;
        match classification.category {
            ReplyCategory::RequestDeadlineExtension
                if candidate.test_task_status == TestTaskStatus::Sent =>
            {
                match self.extensions.request_extension(candidate.id, text, now).await {
                    Ok(outcome) => Ok(InboundAction::Extension {
                        outcome: Box::new(outcome),
                    }),
                    Err(Error::Precondition { code, .. }) => {
                        tracing::info!(candidate_id = %candidate.id, code, "Extension request not applicable");
                        Ok(InboundAction::Logged)
                    }
                    Err(e) => Err(e),
                }
            }
            ReplyCategory::Negative if stage.is_outreach_phase() => {
                let cancelled = self
                    .stores
                    .outreach
                    .cancel_outreach_for_candidate(candidate.id)
                    .await?;
                if !cancelled.is_empty() {
                    self.stores
                        .candidates
                        .set_outreach_status(candidate.id, OutreachStatus::Cancelled)
                        .await?;
                }
                advance_stage(
                    self.stores.candidates.as_ref(),
                    candidate,
                    PipelineStage::OutreachDeclined,
                )
                .await?;
                tracing::info!(candidate_id = %candidate.id, cancelled = cancelled.len(), "Candidate declined outreach");
                Ok(InboundAction::OutreachDeclined)
            }
            category if category.is_positive() && stage == PipelineStage::OutreachSent => {
                let already_queued = self
                    .stores
                    .jobs
                    .jobs_for_candidate(candidate.id)
                    .await?
                    .into_iter()
                    .find(|j| {
                        j.action_type == JobAction::SendQuestionnaire
                            && matches!(j.status, JobStatus::Pending | JobStatus::Processing)
                    });
                if let Some(job) = already_queued {
                    return Ok(InboundAction::QuestionnaireQueued { job_id: job.id });
                }

                let request_id = self
                    .stores
                    .matches
                    .best_match_for_candidate(candidate.id)
                    .await?
                    .map(|m| m.request_id);
                let job = self
                    .stores
                    .jobs
                    .enqueue_job(NewJob {
                        action_type: JobAction::SendQuestionnaire,
                        candidate_id: candidate.id,
                        request_id,
                        scheduled_for: None,
                    })
                    .await?;
                tracing::info!(candidate_id = %candidate.id, job_id = %job.id, "Questionnaire queued after positive reply");
                Ok(InboundAction::QuestionnaireQueued { job_id: job.id })
            }
            ReplyCategory::TestTaskSubmission if stage == PipelineStage::TestSent => {
                self.stores
                    .candidates
                    .set_test_task_status(candidate.id, TestTaskStatus::Submitted)
                    .await?;
                advance_stage(
                    self.stores.candidates.as_ref(),
                    candidate,
                    PipelineStage::TestDone,
                )
                .await?;
                tracing::info!(candidate_id = %candidate.id, "Test task submission received");
                Ok(InboundAction::TestTaskSubmitted)
            }
            _ => Ok(InboundAction::Logged),
        }
    }
}
