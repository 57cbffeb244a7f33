use crate::config::AutomationSettings;
use crate::error::{Error, Result};
use crate::models::{
    automation_job::{AutomationJob, JobAction},
    candidate::{Candidate, PipelineStage},
    candidate_match::MatchStatus,
    conversation::MessageType,
    outreach::{NewOutreachItem, OutreachStatus},
    request::HiringRequest,
};
use crate::services::delivery::resolve_delivery;
use crate::services::message_generator::{MessageContext, MessageGenerator, MessageKind};
use crate::services::messenger::CandidateMessenger;
use crate::services::pipeline::advance_stage;
use crate::services::scheduler::{HandlerRegistry, JobHandler};
use crate::store::Stores;
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde_json::json;
use std::sync::Arc;

/// Dependencies shared by every job handler.
#[derive(Clone)]
pub struct HandlerContext {
    pub stores: Stores,
    pub generator: MessageGenerator,
    pub messenger: CandidateMessenger,
    pub settings: AutomationSettings,
}

impl HandlerContext {
    async fn candidate(&self, job: &AutomationJob) -> Result<Candidate> {
        self.stores
            .candidates
            .get_candidate(job.candidate_id)
            .await?
            .ok_or_else(|| {
                Error::precondition(
                    "candidate_not_found",
                    format!("Candidate {} not found", job.candidate_id),
                )
            })
    }

    /// The job's request, or the candidate's best match when the job has none.
    async fn request(&self, job: &AutomationJob) -> Result<Option<HiringRequest>> {
        let request_id = match job.request_id {
            Some(id) => Some(id),
            None => self
                .stores
                .matches
                .best_match_for_candidate(job.candidate_id)
                .await?
                .map(|m| m.request_id),
        };
        match request_id {
            Some(id) => Ok(self.stores.requests.get_request(id).await?),
            None => Ok(None),
        }
    }
}

/// Builds the registry with a handler for every job action.
pub fn default_registry(ctx: HandlerContext) -> HandlerRegistry {
    let ctx = Arc::new(ctx);
    HandlerRegistry::new()
        .register(JobAction::SendOutreach, Arc::new(SendOutreach(ctx.clone())))
        .register(
            JobAction::SendQuestionnaire,
            Arc::new(SendQuestionnaire(ctx.clone())),
        )
        .register(JobAction::SendTestTask, Arc::new(SendTestTask(ctx.clone())))
        .register(
            JobAction::SendInvite,
            Arc::new(SendDecision {
                ctx: ctx.clone(),
                kind: MessageKind::Invite,
                message_type: MessageType::Invite,
            }),
        )
        .register(
            JobAction::SendRejection,
            Arc::new(SendDecision {
                ctx,
                kind: MessageKind::Rejection,
                message_type: MessageType::Rejection,
            }),
        )
}

/// Test-task deadline: `test_task_days` from today at `deadline_hour_utc`.
pub fn test_task_deadline(now: DateTime<Utc>, settings: &AutomationSettings) -> Result<DateTime<Utc>> {
    (now.date_naive() + Duration::days(settings.test_task_days))
        .and_hms_opt(settings.deadline_hour_utc, 0, 0)
        .map(|naive| naive.and_utc())
        .ok_or_else(|| Error::Config(format!("Invalid deadline hour {}", settings.deadline_hour_utc)))
}

fn skip(job: &AutomationJob, candidate: &Candidate, reason: &str) {
    tracing::info!(
        job_id = %job.id,
        candidate_id = %candidate.id,
        stage = %candidate.pipeline_stage,
        reason,
        "Job has nothing to do"
    );
}

struct SendOutreach(Arc<HandlerContext>);

#[async_trait]
impl JobHandler for SendOutreach {
    async fn handle(&self, job: &AutomationJob, now: DateTime<Utc>) -> Result<()> {
        let ctx = &self.0;
        let candidate = ctx.candidate(job).await?;
        if !candidate.pipeline_stage.can_transition_to(PipelineStage::OutreachSent) {
            skip(job, &candidate, "candidate is past outreach");
            return Ok(());
        }
        if ctx
            .stores
            .outreach
            .scheduled_outreach_for_candidate(candidate.id)
            .await?
            .is_some()
        {
            skip(job, &candidate, "outreach already scheduled");
            return Ok(());
        }

        let request = ctx.request(job).await?;
        let target = resolve_delivery(&candidate)?;
        let intro = ctx.generator.intro(&candidate, request.as_ref()).await;

        let item = NewOutreachItem {
            candidate_id: candidate.id,
            request_id: request.as_ref().map(|r| r.id),
            intro_message: intro,
            test_task_message: None,
            delivery_method: target.method,
            scheduled_for: now + ctx.settings.outreach_review_delay,
        };
        match ctx.stores.outreach.schedule_outreach(item).await {
            Ok(item) => {
                tracing::info!(
                    outreach_id = %item.id,
                    candidate_id = %candidate.id,
                    scheduled_for = %item.scheduled_for,
                    "Outreach scheduled for review"
                );
            }
            Err(Error::Conflict(_)) => {
                skip(job, &candidate, "outreach scheduled concurrently");
                return Ok(());
            }
            Err(e) => return Err(e),
        }

        ctx.stores
            .candidates
            .set_outreach_status(candidate.id, OutreachStatus::Scheduled)
            .await
    }
}

struct SendQuestionnaire(Arc<HandlerContext>);

#[async_trait]
impl JobHandler for SendQuestionnaire {
    async fn handle(&self, job: &AutomationJob, _now: DateTime<Utc>) -> Result<()> {
        let ctx = &self.0;
        let candidate = ctx.candidate(job).await?;
        let target = PipelineStage::QuestionnaireSent;
        if candidate.pipeline_stage == target || !candidate.pipeline_stage.can_transition_to(target) {
            skip(job, &candidate, "questionnaire no longer applicable");
            return Ok(());
        }

        let request = ctx.request(job).await?;
        let text = ctx.generator.questionnaire(&candidate, request.as_ref());
        ctx.messenger
            .send(
                &candidate,
                request.as_ref().map(|r| r.id),
                MessageType::Questionnaire,
                &text,
                json!({ "job_id": job.id }),
            )
            .await?;

        advance_stage(ctx.stores.candidates.as_ref(), &candidate, target).await?;
        Ok(())
    }
}

struct SendTestTask(Arc<HandlerContext>);

#[async_trait]
impl JobHandler for SendTestTask {
    async fn handle(&self, job: &AutomationJob, now: DateTime<Utc>) -> Result<()> {
        let ctx = &self.0;
        let candidate = ctx.candidate(job).await?;
        let target = PipelineStage::TestSent;
        if candidate.pipeline_stage == target || !candidate.pipeline_stage.can_transition_to(target) {
            skip(job, &candidate, "test task no longer applicable");
            return Ok(());
        }

        let request = ctx.request(job).await?;
        let deadline = test_task_deadline(now, &ctx.settings)?;
        let text = ctx
            .generator
            .test_task(&candidate, request.as_ref(), deadline)
            .await;

        ctx.messenger
            .send(
                &candidate,
                request.as_ref().map(|r| r.id),
                MessageType::TestTask,
                &text,
                json!({ "job_id": job.id, "deadline": deadline }),
            )
            .await?;

        let candidate = ctx
            .stores
            .candidates
            .assign_test_task(candidate.id, deadline)
            .await?;
        advance_stage(ctx.stores.candidates.as_ref(), &candidate, target).await?;
        if let Some(request) = &request {
            ctx.stores
                .matches
                .set_match_status(candidate.id, request.id, MatchStatus::TestTask)
                .await?;
        }
        tracing::info!(candidate_id = %candidate.id, %deadline, "Test task sent");
        Ok(())
    }
}

/// Invite and rejection delivery. The stage was already moved when the
/// decision was recorded.
struct SendDecision {
    ctx: Arc<HandlerContext>,
    kind: MessageKind,
    message_type: MessageType,
}

#[async_trait]
impl JobHandler for SendDecision {
    async fn handle(&self, job: &AutomationJob, _now: DateTime<Utc>) -> Result<()> {
        let candidate = self.ctx.candidate(job).await?;
        let request = self.ctx.request(job).await?;
        let text = self
            .ctx
            .generator
            .generate(self.kind, MessageContext::new(&candidate, request.as_ref()))
            .await;

        self.ctx
            .messenger
            .send(
                &candidate,
                request.as_ref().map(|r| r.id),
                self.message_type,
                &text,
                json!({ "job_id": job.id }),
            )
            .await?;
        Ok(())
    }
}
