//! In-process store with the same conditional-update semantics as the
//! Postgres backend. Used by the test suite and for local dry runs.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use uuid::Uuid;

use super::{
    retry_backoff, CandidateStore, ConversationStore, JobStore, MatchStore, OutreachStore,
    RequestStore, STALE_JOB_ERROR,
};
use crate::error::{Error, Result};
use crate::models::{
    automation_job::{AutomationJob, JobStatus, NewJob, RequeueSummary},
    candidate::{Candidate, PipelineStage, TestTaskStatus},
    candidate_match::{CandidateRequestMatch, DecisionWrite, FinalDecision, MatchStatus},
    conversation::{ConversationEntry, NewConversationEntry},
    outreach::{NewOutreachItem, OutreachEdit, OutreachQueueItem, OutreachStatus},
    request::HiringRequest,
};

#[derive(Default)]
struct State {
    candidates: HashMap<Uuid, Candidate>,
    requests: HashMap<Uuid, HiringRequest>,
    matches: Vec<CandidateRequestMatch>,
    jobs: Vec<AutomationJob>,
    outreach: Vec<OutreachQueueItem>,
    conversations: Vec<ConversationEntry>,
}

#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<State>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().expect("memory store mutex poisoned")
    }

    pub fn insert_candidate(&self, candidate: Candidate) {
        self.lock().candidates.insert(candidate.id, candidate);
    }

    pub fn insert_request(&self, request: HiringRequest) {
        self.lock().requests.insert(request.id, request);
    }

    pub fn insert_match(&self, record: CandidateRequestMatch) {
        self.lock().matches.push(record);
    }

    pub fn all_jobs(&self) -> Vec<AutomationJob> {
        self.lock().jobs.clone()
    }

    pub fn all_outreach(&self) -> Vec<OutreachQueueItem> {
        self.lock().outreach.clone()
    }
}

fn touch(candidate: &mut Candidate) {
    candidate.updated_at = Utc::now();
}

#[async_trait]
impl CandidateStore for MemoryStore {
    async fn get_candidate(&self, id: Uuid) -> Result<Option<Candidate>> {
        Ok(self.lock().candidates.get(&id).cloned())
    }

    async fn find_by_telegram_chat(&self, chat_id: i64) -> Result<Option<Candidate>> {
        Ok(self
            .lock()
            .candidates
            .values()
            .find(|c| c.telegram_chat_id == Some(chat_id))
            .cloned())
    }

    async fn update_stage(
        &self,
        id: Uuid,
        from: PipelineStage,
        to: PipelineStage,
    ) -> Result<Option<Candidate>> {
        let mut state = self.lock();
        match state.candidates.get_mut(&id) {
            Some(candidate) if candidate.pipeline_stage == from => {
                candidate.pipeline_stage = to;
                touch(candidate);
                Ok(Some(candidate.clone()))
            }
            _ => Ok(None),
        }
    }

    async fn set_outreach_status(&self, id: Uuid, status: OutreachStatus) -> Result<()> {
        if let Some(candidate) = self.lock().candidates.get_mut(&id) {
            candidate.outreach_status = Some(status);
            touch(candidate);
        }
        Ok(())
    }

    async fn assign_test_task(&self, id: Uuid, deadline: DateTime<Utc>) -> Result<Candidate> {
        let mut state = self.lock();
        let candidate = state
            .candidates
            .get_mut(&id)
            .ok_or_else(|| Error::NotFound(format!("candidate {}", id)))?;
        candidate.test_task_status = TestTaskStatus::Sent;
        candidate.test_task_original_deadline = Some(deadline);
        candidate.test_task_current_deadline = Some(deadline);
        candidate.test_task_extensions_count = 0;
        touch(candidate);
        Ok(candidate.clone())
    }

    async fn set_test_task_status(&self, id: Uuid, status: TestTaskStatus) -> Result<()> {
        if let Some(candidate) = self.lock().candidates.get_mut(&id) {
            candidate.test_task_status = status;
            touch(candidate);
        }
        Ok(())
    }

    async fn extend_deadline(
        &self,
        id: Uuid,
        expected_count: i32,
        max_extensions: i32,
        new_deadline: DateTime<Utc>,
    ) -> Result<Option<Candidate>> {
        let mut state = self.lock();
        match state.candidates.get_mut(&id) {
            Some(candidate)
                if candidate.test_task_extensions_count == expected_count
                    && candidate.test_task_extensions_count < max_extensions =>
            {
                candidate.test_task_current_deadline = Some(new_deadline);
                candidate.test_task_extensions_count += 1;
                touch(candidate);
                Ok(Some(candidate.clone()))
            }
            _ => Ok(None),
        }
    }
}

#[async_trait]
impl RequestStore for MemoryStore {
    async fn get_request(&self, id: Uuid) -> Result<Option<HiringRequest>> {
        Ok(self.lock().requests.get(&id).cloned())
    }
}

#[async_trait]
impl MatchStore for MemoryStore {
    async fn get_match(
        &self,
        candidate_id: Uuid,
        request_id: Uuid,
    ) -> Result<Option<CandidateRequestMatch>> {
        Ok(self
            .lock()
            .matches
            .iter()
            .find(|m| m.candidate_id == candidate_id && m.request_id == request_id)
            .cloned())
    }

    async fn best_match_for_candidate(
        &self,
        candidate_id: Uuid,
    ) -> Result<Option<CandidateRequestMatch>> {
        Ok(self
            .lock()
            .matches
            .iter()
            .filter(|m| m.candidate_id == candidate_id)
            .max_by(|a, b| a.match_score.total_cmp(&b.match_score))
            .cloned())
    }

    async fn set_match_status(
        &self,
        candidate_id: Uuid,
        request_id: Uuid,
        status: MatchStatus,
    ) -> Result<()> {
        let mut state = self.lock();
        if let Some(record) = state.matches.iter_mut().find(|m| {
            m.candidate_id == candidate_id && m.request_id == request_id && m.final_decision.is_none()
        }) {
            record.status = status;
        }
        Ok(())
    }

    async fn record_final_decision(
        &self,
        candidate_id: Uuid,
        request_id: Uuid,
        decision: FinalDecision,
        decided_by: &str,
        decided_at: DateTime<Utc>,
    ) -> Result<DecisionWrite> {
        let mut state = self.lock();
        let record = state
            .matches
            .iter_mut()
            .find(|m| m.candidate_id == candidate_id && m.request_id == request_id)
            .ok_or_else(|| {
                Error::precondition(
                    "match_not_found",
                    format!(
                        "No match between candidate {} and request {}",
                        candidate_id, request_id
                    ),
                )
            })?;

        if record.final_decision.is_some() {
            return Ok(DecisionWrite::AlreadyDecided(record.clone()));
        }
        record.final_decision = Some(decision);
        record.final_decision_at = Some(decided_at);
        record.final_decision_by = Some(decided_by.to_string());
        record.status = MatchStatus::Decided;
        Ok(DecisionWrite::Recorded(record.clone()))
    }
}

#[async_trait]
impl JobStore for MemoryStore {
    async fn enqueue_job(&self, job: NewJob) -> Result<AutomationJob> {
        let now = Utc::now();
        let record = AutomationJob {
            id: Uuid::new_v4(),
            action_type: job.action_type,
            status: JobStatus::Pending,
            candidate_id: job.candidate_id,
            request_id: job.request_id,
            scheduled_for: job.scheduled_for,
            retry_count: 0,
            last_error: None,
            created_at: now,
            updated_at: now,
            started_at: None,
            completed_at: None,
        };
        self.lock().jobs.push(record.clone());
        Ok(record)
    }

    async fn get_job(&self, id: Uuid) -> Result<Option<AutomationJob>> {
        Ok(self.lock().jobs.iter().find(|j| j.id == id).cloned())
    }

    async fn jobs_for_candidate(&self, candidate_id: Uuid) -> Result<Vec<AutomationJob>> {
        Ok(self
            .lock()
            .jobs
            .iter()
            .filter(|j| j.candidate_id == candidate_id)
            .cloned()
            .collect())
    }

    async fn fetch_due_jobs(&self, now: DateTime<Utc>, limit: i64) -> Result<Vec<AutomationJob>> {
        let mut due: Vec<AutomationJob> = self
            .lock()
            .jobs
            .iter()
            .filter(|j| j.is_due(now))
            .cloned()
            .collect();
        due.sort_by_key(|j| j.created_at);
        due.truncate(limit.max(0) as usize);
        Ok(due)
    }

    async fn claim_job(&self, id: Uuid, now: DateTime<Utc>) -> Result<bool> {
        let mut state = self.lock();
        let Some(candidate_id) = state
            .jobs
            .iter()
            .find(|j| j.id == id && j.status == JobStatus::Pending)
            .map(|j| j.candidate_id)
        else {
            return Ok(false);
        };
        let sibling_in_flight = state.jobs.iter().any(|j| {
            j.id != id && j.candidate_id == candidate_id && j.status == JobStatus::Processing
        });
        if sibling_in_flight {
            return Ok(false);
        }
        if let Some(job) = state.jobs.iter_mut().find(|j| j.id == id) {
            job.status = JobStatus::Processing;
            job.started_at = Some(now);
            job.updated_at = now;
        }
        Ok(true)
    }

    async fn complete_job(&self, id: Uuid, now: DateTime<Utc>) -> Result<()> {
        let mut state = self.lock();
        if let Some(job) = state
            .jobs
            .iter_mut()
            .find(|j| j.id == id && j.status == JobStatus::Processing)
        {
            job.status = JobStatus::Completed;
            job.completed_at = Some(now);
            job.updated_at = now;
            job.last_error = None;
        }
        Ok(())
    }

    async fn fail_job(&self, id: Uuid, error: &str, now: DateTime<Utc>) -> Result<()> {
        let mut state = self.lock();
        if let Some(job) = state
            .jobs
            .iter_mut()
            .find(|j| j.id == id && j.status == JobStatus::Processing)
        {
            job.status = JobStatus::Failed;
            job.retry_count += 1;
            job.last_error = Some(error.to_string());
            job.updated_at = now;
        }
        Ok(())
    }

    async fn requeue_failed_jobs(
        &self,
        now: DateTime<Utc>,
        max_retries: i32,
        base_backoff: Duration,
    ) -> Result<RequeueSummary> {
        let mut summary = RequeueSummary::default();
        let mut state = self.lock();
        for job in state.jobs.iter_mut().filter(|j| j.status == JobStatus::Failed) {
            if job.retry_count >= max_retries {
                job.status = JobStatus::DeadLetter;
                job.updated_at = now;
                summary.dead_lettered += 1;
            } else if job.updated_at + retry_backoff(base_backoff, job.retry_count) <= now {
                job.status = JobStatus::Pending;
                job.updated_at = now;
                summary.requeued += 1;
            }
        }
        Ok(summary)
    }

    async fn recover_stale_jobs(
        &self,
        now: DateTime<Utc>,
        stale_before: DateTime<Utc>,
    ) -> Result<u64> {
        let mut recovered = 0;
        let mut state = self.lock();
        for job in state.jobs.iter_mut().filter(|j| {
            j.status == JobStatus::Processing && j.started_at.map_or(true, |at| at < stale_before)
        }) {
            job.status = JobStatus::Failed;
            job.retry_count += 1;
            job.last_error = Some(STALE_JOB_ERROR.to_string());
            job.updated_at = now;
            recovered += 1;
        }
        Ok(recovered)
    }

    async fn retry_job(&self, id: Uuid, now: DateTime<Utc>) -> Result<Option<AutomationJob>> {
        let mut state = self.lock();
        match state.jobs.iter_mut().find(|j| {
            j.id == id && matches!(j.status, JobStatus::Failed | JobStatus::DeadLetter)
        }) {
            Some(job) => {
                job.status = JobStatus::Pending;
                job.scheduled_for = None;
                job.updated_at = now;
                Ok(Some(job.clone()))
            }
            None => Ok(None),
        }
    }
}

#[async_trait]
impl OutreachStore for MemoryStore {
    async fn schedule_outreach(&self, item: NewOutreachItem) -> Result<OutreachQueueItem> {
        let mut state = self.lock();
        let already_scheduled = state.outreach.iter().any(|o| {
            o.candidate_id == item.candidate_id && o.status == OutreachStatus::Scheduled
        });
        if already_scheduled {
            return Err(Error::Conflict(format!(
                "Candidate {} already has scheduled outreach",
                item.candidate_id
            )));
        }
        let record = OutreachQueueItem {
            id: Uuid::new_v4(),
            candidate_id: item.candidate_id,
            request_id: item.request_id,
            intro_message: item.intro_message,
            test_task_message: item.test_task_message,
            delivery_method: item.delivery_method,
            scheduled_for: item.scheduled_for,
            status: OutreachStatus::Scheduled,
            edited_by: None,
            edited_at: None,
            sent_at: None,
            message_id: None,
            error_message: None,
            created_at: Utc::now(),
        };
        state.outreach.push(record.clone());
        Ok(record)
    }

    async fn get_outreach(&self, id: Uuid) -> Result<Option<OutreachQueueItem>> {
        Ok(self.lock().outreach.iter().find(|o| o.id == id).cloned())
    }

    async fn scheduled_outreach_for_candidate(
        &self,
        candidate_id: Uuid,
    ) -> Result<Option<OutreachQueueItem>> {
        Ok(self
            .lock()
            .outreach
            .iter()
            .find(|o| o.candidate_id == candidate_id && o.status == OutreachStatus::Scheduled)
            .cloned())
    }

    async fn due_outreach(
        &self,
        now: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<OutreachQueueItem>> {
        let mut due: Vec<OutreachQueueItem> = self
            .lock()
            .outreach
            .iter()
            .filter(|o| o.is_due(now))
            .cloned()
            .collect();
        due.sort_by_key(|o| o.scheduled_for);
        due.truncate(limit.max(0) as usize);
        Ok(due)
    }

    async fn cancel_outreach(&self, id: Uuid) -> Result<Option<OutreachQueueItem>> {
        let mut state = self.lock();
        match state
            .outreach
            .iter_mut()
            .find(|o| o.id == id && o.status == OutreachStatus::Scheduled)
        {
            Some(item) => {
                item.status = OutreachStatus::Cancelled;
                Ok(Some(item.clone()))
            }
            None => Ok(None),
        }
    }

    async fn cancel_outreach_for_candidate(
        &self,
        candidate_id: Uuid,
    ) -> Result<Vec<OutreachQueueItem>> {
        let mut state = self.lock();
        let mut cancelled = Vec::new();
        for item in state
            .outreach
            .iter_mut()
            .filter(|o| o.candidate_id == candidate_id && o.status == OutreachStatus::Scheduled)
        {
            item.status = OutreachStatus::Cancelled;
            cancelled.push(item.clone());
        }
        Ok(cancelled)
    }

    async fn edit_outreach(
        &self,
        id: Uuid,
        edit: OutreachEdit,
        editor: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<OutreachQueueItem>> {
        let mut state = self.lock();
        match state
            .outreach
            .iter_mut()
            .find(|o| o.id == id && o.status == OutreachStatus::Scheduled)
        {
            Some(item) => {
                if let Some(message) = edit.message {
                    item.intro_message = message;
                }
                if let Some(at) = edit.scheduled_for {
                    item.scheduled_for = at;
                }
                item.edited_by = Some(editor.to_string());
                item.edited_at = Some(now);
                Ok(Some(item.clone()))
            }
            None => Ok(None),
        }
    }

    async fn claim_outreach(&self, id: Uuid) -> Result<bool> {
        let mut state = self.lock();
        match state
            .outreach
            .iter_mut()
            .find(|o| o.id == id && o.status == OutreachStatus::Scheduled)
        {
            Some(item) => {
                item.status = OutreachStatus::Sending;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn mark_outreach_sent(
        &self,
        id: Uuid,
        sent_at: DateTime<Utc>,
        message_id: Option<String>,
    ) -> Result<()> {
        if let Some(item) = self.lock().outreach.iter_mut().find(|o| o.id == id) {
            item.status = OutreachStatus::Sent;
            item.sent_at = Some(sent_at);
            item.message_id = message_id;
            item.error_message = None;
        }
        Ok(())
    }

    async fn mark_outreach_failed(&self, id: Uuid, error: &str) -> Result<()> {
        if let Some(item) = self.lock().outreach.iter_mut().find(|o| o.id == id) {
            item.status = OutreachStatus::Failed;
            item.error_message = Some(error.to_string());
        }
        Ok(())
    }
}

#[async_trait]
impl ConversationStore for MemoryStore {
    async fn append_entry(&self, entry: NewConversationEntry) -> Result<ConversationEntry> {
        let record = ConversationEntry {
            id: Uuid::new_v4(),
            candidate_id: entry.candidate_id,
            request_id: entry.request_id,
            direction: entry.direction,
            message_type: entry.message_type,
            content: entry.content,
            metadata: entry.metadata,
            created_at: Utc::now(),
        };
        self.lock().conversations.push(record.clone());
        Ok(record)
    }

    async fn entries_for_candidate(&self, candidate_id: Uuid) -> Result<Vec<ConversationEntry>> {
        Ok(self
            .lock()
            .conversations
            .iter()
            .filter(|e| e.candidate_id == candidate_id)
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::automation_job::JobAction;

    fn new_job(candidate_id: Uuid) -> NewJob {
        NewJob {
            action_type: JobAction::SendInvite,
            candidate_id,
            request_id: None,
            scheduled_for: None,
        }
    }

    #[tokio::test]
    async fn claim_succeeds_once() {
        let store = MemoryStore::new();
        let job = store.enqueue_job(new_job(Uuid::new_v4())).await.unwrap();
        let now = Utc::now();

        assert!(store.claim_job(job.id, now).await.unwrap());
        assert!(!store.claim_job(job.id, now).await.unwrap());

        store.complete_job(job.id, now).await.unwrap();
        assert!(!store.claim_job(job.id, now).await.unwrap());
    }

    #[tokio::test]
    async fn sibling_job_of_same_candidate_waits() {
        let store = MemoryStore::new();
        let candidate_id = Uuid::new_v4();
        let first = store.enqueue_job(new_job(candidate_id)).await.unwrap();
        let second = store.enqueue_job(new_job(candidate_id)).await.unwrap();
        let other = store.enqueue_job(new_job(Uuid::new_v4())).await.unwrap();
        let now = Utc::now();

        assert!(store.claim_job(first.id, now).await.unwrap());
        assert!(!store.claim_job(second.id, now).await.unwrap());
        assert!(store.claim_job(other.id, now).await.unwrap());

        store.complete_job(first.id, now).await.unwrap();
        assert!(store.claim_job(second.id, now).await.unwrap());
    }

    #[tokio::test]
    async fn requeue_respects_backoff_and_dead_letters_exhausted_jobs() {
        let store = MemoryStore::new();
        let job = store.enqueue_job(new_job(Uuid::new_v4())).await.unwrap();
        let t0 = Utc::now();
        let backoff = Duration::seconds(60);

        store.claim_job(job.id, t0).await.unwrap();
        store.fail_job(job.id, "boom", t0).await.unwrap();

        let early = store.requeue_failed_jobs(t0, 2, backoff).await.unwrap();
        assert_eq!(early, RequeueSummary::default());

        let later = t0 + Duration::seconds(61);
        let summary = store.requeue_failed_jobs(later, 2, backoff).await.unwrap();
        assert_eq!(summary.requeued, 1);

        store.claim_job(job.id, later).await.unwrap();
        store.fail_job(job.id, "boom again", later).await.unwrap();
        let summary = store
            .requeue_failed_jobs(later + Duration::hours(1), 2, backoff)
            .await
            .unwrap();
        assert_eq!(summary.dead_lettered, 1);

        let stored = store.get_job(job.id).await.unwrap().unwrap();
        assert_eq!(stored.status, JobStatus::DeadLetter);
        assert_eq!(stored.retry_count, 2);
        assert_eq!(stored.last_error.as_deref(), Some("boom again"));
    }
}
