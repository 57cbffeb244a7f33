//! Typed repositories over the automation tables.
//!
//! Each entity gets a narrow trait exposing only the reads and conditional
//! writes the engine performs. Status-changing writes (`claim_job`,
//! `claim_outreach`, `cancel_outreach`, `record_final_decision`, ...) are
//! conditional updates: they report whether the precondition held instead of
//! reading first and writing second.

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;
use uuid::Uuid;

use crate::error::Result;
use crate::models::{
    automation_job::{AutomationJob, NewJob, RequeueSummary},
    candidate::{Candidate, PipelineStage, TestTaskStatus},
    candidate_match::{CandidateRequestMatch, DecisionWrite, FinalDecision, MatchStatus},
    conversation::{ConversationEntry, NewConversationEntry},
    outreach::{NewOutreachItem, OutreachEdit, OutreachQueueItem, OutreachStatus},
    request::HiringRequest,
};

pub use memory::MemoryStore;
pub use postgres::PgStore;

#[async_trait]
pub trait CandidateStore: Send + Sync {
    async fn get_candidate(&self, id: Uuid) -> Result<Option<Candidate>>;

    async fn find_by_telegram_chat(&self, chat_id: i64) -> Result<Option<Candidate>>;

    /// Moves the stage only if it still equals `from`. Returns `None` when a
    /// concurrent writer got there first.
    async fn update_stage(
        &self,
        id: Uuid,
        from: PipelineStage,
        to: PipelineStage,
    ) -> Result<Option<Candidate>>;

    async fn set_outreach_status(&self, id: Uuid, status: OutreachStatus) -> Result<()>;

    /// Records a freshly sent test task: status `sent`, both deadlines set,
    /// extension counter reset.
    async fn assign_test_task(&self, id: Uuid, deadline: DateTime<Utc>) -> Result<Candidate>;

    async fn set_test_task_status(&self, id: Uuid, status: TestTaskStatus) -> Result<()>;

    /// Grants one extension if the counter still equals `expected_count` and
    /// stays below `max_extensions`.
    async fn extend_deadline(
        &self,
        id: Uuid,
        expected_count: i32,
        max_extensions: i32,
        new_deadline: DateTime<Utc>,
    ) -> Result<Option<Candidate>>;
}

#[async_trait]
pub trait RequestStore: Send + Sync {
    async fn get_request(&self, id: Uuid) -> Result<Option<HiringRequest>>;
}

#[async_trait]
pub trait MatchStore: Send + Sync {
    async fn get_match(
        &self,
        candidate_id: Uuid,
        request_id: Uuid,
    ) -> Result<Option<CandidateRequestMatch>>;

    /// Highest-scoring match of the candidate.
    async fn best_match_for_candidate(
        &self,
        candidate_id: Uuid,
    ) -> Result<Option<CandidateRequestMatch>>;

    async fn set_match_status(
        &self,
        candidate_id: Uuid,
        request_id: Uuid,
        status: MatchStatus,
    ) -> Result<()>;

    /// Writes the decision only onto a match that has none yet.
    async fn record_final_decision(
        &self,
        candidate_id: Uuid,
        request_id: Uuid,
        decision: FinalDecision,
        decided_by: &str,
        decided_at: DateTime<Utc>,
    ) -> Result<DecisionWrite>;
}

#[async_trait]
pub trait JobStore: Send + Sync {
    async fn enqueue_job(&self, job: NewJob) -> Result<AutomationJob>;

    async fn get_job(&self, id: Uuid) -> Result<Option<AutomationJob>>;

    async fn jobs_for_candidate(&self, candidate_id: Uuid) -> Result<Vec<AutomationJob>>;

    /// Pending jobs whose schedule is empty or not after `now`, oldest first.
    async fn fetch_due_jobs(&self, now: DateTime<Utc>, limit: i64) -> Result<Vec<AutomationJob>>;

    /// `pending -> processing`, refused while another job of the same
    /// candidate is processing. Returns whether this caller won the claim.
    async fn claim_job(&self, id: Uuid, now: DateTime<Utc>) -> Result<bool>;

    async fn complete_job(&self, id: Uuid, now: DateTime<Utc>) -> Result<()>;

    /// `processing -> failed`, increments `retry_count`, stores the error.
    async fn fail_job(&self, id: Uuid, error: &str, now: DateTime<Utc>) -> Result<()>;

    /// Returns failed jobs to `pending` once their backoff
    /// (`base_backoff * 2^(retry_count - 1)`) has elapsed, and parks jobs that
    /// used up `max_retries` in `dead_letter`.
    async fn requeue_failed_jobs(
        &self,
        now: DateTime<Utc>,
        max_retries: i32,
        base_backoff: Duration,
    ) -> Result<RequeueSummary>;

    /// Moves `processing` jobs started before `stale_before` to `failed`,
    /// counting the attempt, so the retry policy picks them up again.
    /// Returns how many were recovered.
    async fn recover_stale_jobs(&self, now: DateTime<Utc>, stale_before: DateTime<Utc>)
        -> Result<u64>;

    /// Manual re-enqueue of a `failed` or `dead_letter` job.
    async fn retry_job(&self, id: Uuid, now: DateTime<Utc>) -> Result<Option<AutomationJob>>;
}

#[async_trait]
pub trait OutreachStore: Send + Sync {
    async fn schedule_outreach(&self, item: NewOutreachItem) -> Result<OutreachQueueItem>;

    async fn get_outreach(&self, id: Uuid) -> Result<Option<OutreachQueueItem>>;

    async fn scheduled_outreach_for_candidate(
        &self,
        candidate_id: Uuid,
    ) -> Result<Option<OutreachQueueItem>>;

    async fn due_outreach(&self, now: DateTime<Utc>, limit: i64)
        -> Result<Vec<OutreachQueueItem>>;

    /// `scheduled -> cancelled`; `None` when the item is not scheduled.
    async fn cancel_outreach(&self, id: Uuid) -> Result<Option<OutreachQueueItem>>;

    async fn cancel_outreach_for_candidate(
        &self,
        candidate_id: Uuid,
    ) -> Result<Vec<OutreachQueueItem>>;

    /// Applies the edit only while scheduled; `None` otherwise.
    async fn edit_outreach(
        &self,
        id: Uuid,
        edit: OutreachEdit,
        editor: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<OutreachQueueItem>>;

    /// `scheduled -> sending`. Returns whether this caller won the claim.
    async fn claim_outreach(&self, id: Uuid) -> Result<bool>;

    async fn mark_outreach_sent(
        &self,
        id: Uuid,
        sent_at: DateTime<Utc>,
        message_id: Option<String>,
    ) -> Result<()>;

    async fn mark_outreach_failed(&self, id: Uuid, error: &str) -> Result<()>;
}

#[async_trait]
pub trait ConversationStore: Send + Sync {
    async fn append_entry(&self, entry: NewConversationEntry) -> Result<ConversationEntry>;

    async fn entries_for_candidate(&self, candidate_id: Uuid) -> Result<Vec<ConversationEntry>>;
}

/// The repositories the engine runs against, injected at startup.
#[derive(Clone)]
pub struct Stores {
    pub candidates: Arc<dyn CandidateStore>,
    pub requests: Arc<dyn RequestStore>,
    pub matches: Arc<dyn MatchStore>,
    pub jobs: Arc<dyn JobStore>,
    pub outreach: Arc<dyn OutreachStore>,
    pub conversations: Arc<dyn ConversationStore>,
}

impl Stores {
    /// Uses one backend for every repository.
    pub fn shared<S>(store: Arc<S>) -> Self
    where
        S: CandidateStore
            + RequestStore
            + MatchStore
            + JobStore
            + OutreachStore
            + ConversationStore
            + 'static,
    {
        Self {
            candidates: store.clone(),
            requests: store.clone(),
            matches: store.clone(),
            jobs: store.clone(),
            outreach: store.clone(),
            conversations: store,
        }
    }
}

/// `last_error` of a job recovered after it stayed in `processing` too long.
pub(crate) const STALE_JOB_ERROR: &str = "abandoned while processing";

/// Exponential retry delay for a job that has failed `retry_count` times.
pub(crate) fn retry_backoff(base: Duration, retry_count: i32) -> Duration {
    let exponent = (retry_count.max(1) - 1).min(16) as u32;
    base * 2i32.pow(exponent)
}
