use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use sqlx::{PgPool, Row};
use uuid::Uuid;

use super::{
    CandidateStore, ConversationStore, JobStore, MatchStore, OutreachStore, RequestStore,
    STALE_JOB_ERROR,
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

/// PostgreSQL implementation of every repository.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl CandidateStore for PgStore {
    async fn get_candidate(&self, id: Uuid) -> Result<Option<Candidate>> {
        let candidate = sqlx::query_as::<_, Candidate>("SELECT * FROM candidates WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(candidate)
    }

    async fn find_by_telegram_chat(&self, chat_id: i64) -> Result<Option<Candidate>> {
        let candidate =
            sqlx::query_as::<_, Candidate>("SELECT * FROM candidates WHERE telegram_chat_id = $1")
                .bind(chat_id)
                .fetch_optional(&self.pool)
                .await?;
        Ok(candidate)
    }

    async fn update_stage(
        &self,
        id: Uuid,
        from: PipelineStage,
        to: PipelineStage,
    ) -> Result<Option<Candidate>> {
        let candidate = sqlx::query_as::<_, Candidate>(
            r#"
            UPDATE candidates
            SET pipeline_stage = $3, updated_at = NOW()
            WHERE id = $1 AND pipeline_stage = $2
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(from)
        .bind(to)
        .fetch_optional(&self.pool)
        .await?;
        Ok(candidate)
    }

    async fn set_outreach_status(&self, id: Uuid, status: OutreachStatus) -> Result<()> {
        sqlx::query("UPDATE candidates SET outreach_status = $2, updated_at = NOW() WHERE id = $1")
            .bind(id)
            .bind(status)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn assign_test_task(&self, id: Uuid, deadline: DateTime<Utc>) -> Result<Candidate> {
        let candidate = sqlx::query_as::<_, Candidate>(
            r#"
            UPDATE candidates
            SET test_task_status = 'sent',
                test_task_original_deadline = $2,
                test_task_current_deadline = $2,
                test_task_extensions_count = 0,
                updated_at = NOW()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(deadline)
        .fetch_one(&self.pool)
        .await?;
        Ok(candidate)
    }

    async fn set_test_task_status(&self, id: Uuid, status: TestTaskStatus) -> Result<()> {
        sqlx::query("UPDATE candidates SET test_task_status = $2, updated_at = NOW() WHERE id = $1")
            .bind(id)
            .bind(status)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn extend_deadline(
        &self,
        id: Uuid,
        expected_count: i32,
        max_extensions: i32,
        new_deadline: DateTime<Utc>,
    ) -> Result<Option<Candidate>> {
        let candidate = sqlx::query_as::<_, Candidate>(
            r#"
            UPDATE candidates
            SET test_task_current_deadline = $2,
                test_task_extensions_count = test_task_extensions_count + 1,
                updated_at = NOW()
            WHERE id = $1
              AND test_task_extensions_count = $3
              AND test_task_extensions_count < $4
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(new_deadline)
        .bind(expected_count)
        .bind(max_extensions)
        .fetch_optional(&self.pool)
        .await?;
        Ok(candidate)
    }
}

#[async_trait]
impl RequestStore for PgStore {
    async fn get_request(&self, id: Uuid) -> Result<Option<HiringRequest>> {
        let request =
            sqlx::query_as::<_, HiringRequest>("SELECT * FROM hiring_requests WHERE id = $1")
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;
        Ok(request)
    }
}

#[async_trait]
impl MatchStore for PgStore {
    async fn get_match(
        &self,
        candidate_id: Uuid,
        request_id: Uuid,
    ) -> Result<Option<CandidateRequestMatch>> {
        let record = sqlx::query_as::<_, CandidateRequestMatch>(
            "SELECT * FROM candidate_request_matches WHERE candidate_id = $1 AND request_id = $2",
        )
        .bind(candidate_id)
        .bind(request_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(record)
    }

    async fn best_match_for_candidate(
        &self,
        candidate_id: Uuid,
    ) -> Result<Option<CandidateRequestMatch>> {
        let record = sqlx::query_as::<_, CandidateRequestMatch>(
            r#"
            SELECT * FROM candidate_request_matches
            WHERE candidate_id = $1
            ORDER BY match_score DESC, created_at ASC
            LIMIT 1
            "#,
        )
        .bind(candidate_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(record)
    }

    async fn set_match_status(
        &self,
        candidate_id: Uuid,
        request_id: Uuid,
        status: MatchStatus,
    ) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE candidate_request_matches
            SET status = $3
            WHERE candidate_id = $1 AND request_id = $2 AND final_decision IS NULL
            "#,
        )
        .bind(candidate_id)
        .bind(request_id)
        .bind(status)
        .execute(&self.pool)
        .await?;
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
        let recorded = sqlx::query_as::<_, CandidateRequestMatch>(
            r#"
            UPDATE candidate_request_matches
            SET final_decision = $3,
                final_decision_at = $4,
                final_decision_by = $5,
                status = 'decided'
            WHERE candidate_id = $1 AND request_id = $2 AND final_decision IS NULL
            RETURNING *
            "#,
        )
        .bind(candidate_id)
        .bind(request_id)
        .bind(decision)
        .bind(decided_at)
        .bind(decided_by)
        .fetch_optional(&self.pool)
        .await?;

        if let Some(record) = recorded {
            return Ok(DecisionWrite::Recorded(record));
        }

        match self.get_match(candidate_id, request_id).await? {
            Some(existing) => Ok(DecisionWrite::AlreadyDecided(existing)),
            None => Err(Error::precondition(
                "match_not_found",
                format!(
                    "No match between candidate {} and request {}",
                    candidate_id, request_id
                ),
            )),
        }
    }
}

#[async_trait]
impl JobStore for PgStore {
    async fn enqueue_job(&self, job: NewJob) -> Result<AutomationJob> {
        let row = sqlx::query_as::<_, AutomationJob>(
            r#"
            INSERT INTO automation_jobs (action_type, candidate_id, request_id, scheduled_for)
            VALUES ($1, $2, $3, $4)
            RETURNING *
            "#,
        )
        .bind(job.action_type)
        .bind(job.candidate_id)
        .bind(job.request_id)
        .bind(job.scheduled_for)
        .fetch_one(&self.pool)
        .await?;
        Ok(row)
    }

    async fn get_job(&self, id: Uuid) -> Result<Option<AutomationJob>> {
        let job = sqlx::query_as::<_, AutomationJob>("SELECT * FROM automation_jobs WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(job)
    }

    async fn jobs_for_candidate(&self, candidate_id: Uuid) -> Result<Vec<AutomationJob>> {
        let jobs = sqlx::query_as::<_, AutomationJob>(
            "SELECT * FROM automation_jobs WHERE candidate_id = $1 ORDER BY created_at ASC",
        )
        .bind(candidate_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(jobs)
    }

    async fn fetch_due_jobs(&self, now: DateTime<Utc>, limit: i64) -> Result<Vec<AutomationJob>> {
        let jobs = sqlx::query_as::<_, AutomationJob>(
            r#"
            SELECT * FROM automation_jobs
            WHERE status = 'pending'
              AND (scheduled_for IS NULL OR scheduled_for <= $1)
            ORDER BY created_at ASC
            LIMIT $2
            "#,
        )
        .bind(now)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(jobs)
    }

    async fn claim_job(&self, id: Uuid, now: DateTime<Utc>) -> Result<bool> {
        let mut tx = self.pool.begin().await?;

        // Serializes claims per candidate so the NOT EXISTS check below
        // cannot race with a sibling job's claim.
        let locked = sqlx::query(
            r#"
            SELECT c.id FROM candidates c
            JOIN automation_jobs j ON j.candidate_id = c.id
            WHERE j.id = $1
            FOR UPDATE OF c
            "#,
        )
        .bind(id)
        .fetch_optional(&mut *tx)
        .await?;
        if locked.is_none() {
            tx.rollback().await?;
            return Ok(false);
        }

        let result = sqlx::query(
            r#"
            UPDATE automation_jobs j
            SET status = 'processing', started_at = $2, updated_at = $2
            WHERE j.id = $1
              AND j.status = 'pending'
              AND NOT EXISTS (
                  SELECT 1 FROM automation_jobs o
                  WHERE o.candidate_id = j.candidate_id
                    AND o.status = 'processing'
                    AND o.id <> j.id
              )
            "#,
        )
        .bind(id)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(result.rows_affected() == 1)
    }

    async fn complete_job(&self, id: Uuid, now: DateTime<Utc>) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE automation_jobs
            SET status = 'completed', completed_at = $2, updated_at = $2, last_error = NULL
            WHERE id = $1 AND status = 'processing'
            "#,
        )
        .bind(id)
        .bind(now)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn fail_job(&self, id: Uuid, error: &str, now: DateTime<Utc>) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE automation_jobs
            SET status = 'failed',
                retry_count = retry_count + 1,
                last_error = $2,
                updated_at = $3
            WHERE id = $1 AND status = 'processing'
            "#,
        )
        .bind(id)
        .bind(error)
        .bind(now)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn requeue_failed_jobs(
        &self,
        now: DateTime<Utc>,
        max_retries: i32,
        base_backoff: Duration,
    ) -> Result<RequeueSummary> {
        let backoff_secs = base_backoff.num_seconds() as f64;
        let row = sqlx::query(
            r#"
            WITH dead AS (
                UPDATE automation_jobs
                SET status = 'dead_letter', updated_at = $1
                WHERE status = 'failed' AND retry_count >= $2
                RETURNING id
            ), retried AS (
                UPDATE automation_jobs
                SET status = 'pending', updated_at = $1
                WHERE status = 'failed'
                  AND retry_count < $2
                  AND updated_at + make_interval(
                        secs => $3 * power(2, LEAST(GREATEST(retry_count - 1, 0), 16))
                      ) <= $1
                RETURNING id
            )
            SELECT
                (SELECT COUNT(*) FROM retried) AS requeued,
                (SELECT COUNT(*) FROM dead) AS dead_lettered
            "#,
        )
        .bind(now)
        .bind(max_retries)
        .bind(backoff_secs)
        .fetch_one(&self.pool)
        .await?;

        Ok(RequeueSummary {
            requeued: row.try_get::<i64, _>("requeued")? as u64,
            dead_lettered: row.try_get::<i64, _>("dead_lettered")? as u64,
        })
    }

    async fn recover_stale_jobs(
        &self,
        now: DateTime<Utc>,
        stale_before: DateTime<Utc>,
    ) -> Result<u64> {
        let result = sqlx::query(
            r#"
            UPDATE automation_jobs
            SET status = 'failed',
                retry_count = retry_count + 1,
                last_error = $3,
                updated_at = $1
            WHERE status = 'processing'
              AND (started_at IS NULL OR started_at < $2)
            "#,
        )
        .bind(now)
        .bind(stale_before)
        .bind(STALE_JOB_ERROR)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    async fn retry_job(&self, id: Uuid, now: DateTime<Utc>) -> Result<Option<AutomationJob>> {
        let job = sqlx::query_as::<_, AutomationJob>(
            r#"
            UPDATE automation_jobs
            SET status = 'pending', scheduled_for = NULL, updated_at = $2
            WHERE id = $1 AND status IN ($3, $4)
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(now)
        .bind(JobStatus::Failed)
        .bind(JobStatus::DeadLetter)
        .fetch_optional(&self.pool)
        .await?;
        Ok(job)
    }
}

#[async_trait]
impl OutreachStore for PgStore {
    async fn schedule_outreach(&self, item: NewOutreachItem) -> Result<OutreachQueueItem> {
        let row = sqlx::query_as::<_, OutreachQueueItem>(
            r#"
            INSERT INTO outreach_queue
                (candidate_id, request_id, intro_message, test_task_message, delivery_method, scheduled_for)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING *
            "#,
        )
        .bind(item.candidate_id)
        .bind(item.request_id)
        .bind(&item.intro_message)
        .bind(item.test_task_message.as_deref())
        .bind(item.delivery_method)
        .bind(item.scheduled_for)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(db) if db.is_unique_violation() => Error::Conflict(format!(
                "Candidate {} already has scheduled outreach",
                item.candidate_id
            )),
            other => other.into(),
        })?;
        Ok(row)
    }

    async fn get_outreach(&self, id: Uuid) -> Result<Option<OutreachQueueItem>> {
        let item =
            sqlx::query_as::<_, OutreachQueueItem>("SELECT * FROM outreach_queue WHERE id = $1")
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;
        Ok(item)
    }

    async fn scheduled_outreach_for_candidate(
        &self,
        candidate_id: Uuid,
    ) -> Result<Option<OutreachQueueItem>> {
        let item = sqlx::query_as::<_, OutreachQueueItem>(
            "SELECT * FROM outreach_queue WHERE candidate_id = $1 AND status = 'scheduled'",
        )
        .bind(candidate_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(item)
    }

    async fn due_outreach(
        &self,
        now: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<OutreachQueueItem>> {
        let items = sqlx::query_as::<_, OutreachQueueItem>(
            r#"
            SELECT * FROM outreach_queue
            WHERE status = 'scheduled' AND scheduled_for <= $1
            ORDER BY scheduled_for ASC
            LIMIT $2
            "#,
        )
        .bind(now)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(items)
    }

    async fn cancel_outreach(&self, id: Uuid) -> Result<Option<OutreachQueueItem>> {
        let item = sqlx::query_as::<_, OutreachQueueItem>(
            r#"
            UPDATE outreach_queue SET status = 'cancelled'
            WHERE id = $1 AND status = 'scheduled'
            RETURNING *
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(item)
    }

    async fn cancel_outreach_for_candidate(
        &self,
        candidate_id: Uuid,
    ) -> Result<Vec<OutreachQueueItem>> {
        let items = sqlx::query_as::<_, OutreachQueueItem>(
            r#"
            UPDATE outreach_queue SET status = 'cancelled'
            WHERE candidate_id = $1 AND status = 'scheduled'
            RETURNING *
            "#,
        )
        .bind(candidate_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(items)
    }

    async fn edit_outreach(
        &self,
        id: Uuid,
        edit: OutreachEdit,
        editor: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<OutreachQueueItem>> {
        let item = sqlx::query_as::<_, OutreachQueueItem>(
            r#"
            UPDATE outreach_queue
            SET intro_message = COALESCE($2, intro_message),
                scheduled_for = COALESCE($3, scheduled_for),
                edited_by = $4,
                edited_at = $5
            WHERE id = $1 AND status = 'scheduled'
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(edit.message)
        .bind(edit.scheduled_for)
        .bind(editor)
        .bind(now)
        .fetch_optional(&self.pool)
        .await?;
        Ok(item)
    }

    async fn claim_outreach(&self, id: Uuid) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE outreach_queue SET status = 'sending' WHERE id = $1 AND status = 'scheduled'",
        )
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn mark_outreach_sent(
        &self,
        id: Uuid,
        sent_at: DateTime<Utc>,
        message_id: Option<String>,
    ) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE outreach_queue
            SET status = 'sent', sent_at = $2, message_id = $3, error_message = NULL
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(sent_at)
        .bind(message_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn mark_outreach_failed(&self, id: Uuid, error: &str) -> Result<()> {
        sqlx::query("UPDATE outreach_queue SET status = 'failed', error_message = $2 WHERE id = $1")
            .bind(id)
            .bind(error)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

#[async_trait]
impl ConversationStore for PgStore {
    async fn append_entry(&self, entry: NewConversationEntry) -> Result<ConversationEntry> {
        let row = sqlx::query_as::<_, ConversationEntry>(
            r#"
            INSERT INTO conversation_entries
                (candidate_id, request_id, direction, message_type, content, metadata)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING *
            "#,
        )
        .bind(entry.candidate_id)
        .bind(entry.request_id)
        .bind(entry.direction)
        .bind(entry.message_type)
        .bind(&entry.content)
        .bind(&entry.metadata)
        .fetch_one(&self.pool)
        .await?;
        Ok(row)
    }

    async fn entries_for_candidate(&self, candidate_id: Uuid) -> Result<Vec<ConversationEntry>> {
        let entries = sqlx::query_as::<_, ConversationEntry>(
            "SELECT * FROM conversation_entries WHERE candidate_id = $1 ORDER BY created_at ASC",
        )
        .bind(candidate_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(entries)
    }
}
