//! Periodic dispatcher over the automation job queue.
//!
//! A tick is a pure function of the store and the `now` it is given: it
//! applies the retry policy, fetches a bounded batch of due jobs and runs
//! each one it manages to claim through the handler registered for its
//! action. Claiming is the serialization point between overlapping ticks.

use crate::error::{Error, Result};
use crate::models::automation_job::{AutomationJob, BatchResult, JobAction};
use crate::store::JobStore;
use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

#[async_trait]
pub trait JobHandler: Send + Sync {
    async fn handle(&self, job: &AutomationJob, now: DateTime<Utc>) -> Result<()>;
}

#[derive(Clone, Default)]
pub struct HandlerRegistry {
    handlers: HashMap<JobAction, Arc<dyn JobHandler>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(mut self, action: JobAction, handler: Arc<dyn JobHandler>) -> Self {
        self.handlers.insert(action, handler);
        self
    }

    pub fn get(&self, action: JobAction) -> Option<&Arc<dyn JobHandler>> {
        self.handlers.get(&action)
    }
}

/// Delay inserted between consecutive sends to stay under channel rate
/// limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PacingPolicy {
    delay: Duration,
}

impl PacingPolicy {
    pub fn none() -> Self {
        Self {
            delay: Duration::ZERO,
        }
    }

    pub fn fixed(delay: Duration) -> Self {
        Self { delay }
    }

    pub async fn pause(&self) {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_retries: i32,
    pub base_backoff: ChronoDuration,
}

#[derive(Clone)]
pub struct JobScheduler {
    jobs: Arc<dyn JobStore>,
    registry: HandlerRegistry,
    pacing: PacingPolicy,
    retry: RetryPolicy,
    job_timeout: Duration,
}

impl JobScheduler {
    pub fn new(
        jobs: Arc<dyn JobStore>,
        registry: HandlerRegistry,
        pacing: PacingPolicy,
        retry: RetryPolicy,
        job_timeout: Duration,
    ) -> Self {
        Self {
            jobs,
            registry,
            pacing,
            retry,
            job_timeout,
        }
    }

    /// Runs one batch. Never fails: an error fetching the batch is reported
    /// in `error`; errors on a single job are logged and the batch goes on.
    pub async fn tick(&self, now: DateTime<Utc>, limit: i64) -> BatchResult {
        let mut result = BatchResult::default();
        if let Err(e) = self.run_batch(now, limit, &mut result).await {
            tracing::error!(error = ?e, "Automation tick aborted");
            result.error = Some(e.to_string());
        }
        tracing::info!(
            processed = result.processed,
            successful = result.successful,
            failed = result.failed,
            skipped = result.skipped,
            recovered = result.recovered,
            requeued = result.requeued,
            dead_lettered = result.dead_lettered,
            "Automation tick finished"
        );
        result
    }

    async fn run_batch(
        &self,
        now: DateTime<Utc>,
        limit: i64,
        result: &mut BatchResult,
    ) -> Result<()> {
        result.recovered = self
            .jobs
            .recover_stale_jobs(now, now - self.stale_after())
            .await?;
        if result.recovered > 0 {
            tracing::warn!(recovered = result.recovered, "Recovered jobs stuck in processing");
        }

        let requeue = self
            .jobs
            .requeue_failed_jobs(now, self.retry.max_retries, self.retry.base_backoff)
            .await?;
        result.requeued = requeue.requeued;
        result.dead_lettered = requeue.dead_lettered;

        let due = self.jobs.fetch_due_jobs(now, limit).await?;
        for job in due {
            match self.jobs.claim_job(job.id, now).await {
                Ok(true) => {}
                Ok(false) => {
                    tracing::debug!(job_id = %job.id, "Job already claimed elsewhere");
                    result.skipped += 1;
                    continue;
                }
                Err(e) => {
                    tracing::error!(job_id = %job.id, error = ?e, "Job claim failed");
                    result.skipped += 1;
                    continue;
                }
            }
            if result.processed > 0 {
                self.pacing.pause().await;
            }
            result.processed += 1;

            match self.execute(&job, now).await {
                Ok(()) => {
                    result.successful += 1;
                    tracing::info!(
                        job_id = %job.id,
                        candidate_id = %job.candidate_id,
                        action = %job.action_type,
                        "Job completed"
                    );
                    if let Err(e) = self.jobs.complete_job(job.id, now).await {
                        // Left in processing; recovered once it goes stale.
                        tracing::error!(job_id = %job.id, error = ?e, "Job completion not recorded");
                    }
                }
                Err(e) => {
                    let message = e.to_string();
                    result.failed += 1;
                    tracing::warn!(
                        job_id = %job.id,
                        candidate_id = %job.candidate_id,
                        action = %job.action_type,
                        error = %message,
                        "Job failed"
                    );
                    if let Err(e) = self.jobs.fail_job(job.id, &message, now).await {
                        tracing::error!(job_id = %job.id, error = ?e, "Job failure not recorded");
                    }
                }
            }
        }
        Ok(())
    }

    /// A job still `processing` this long after its claim outlived the
    /// handler timeout and belongs to a tick that is gone.
    fn stale_after(&self) -> ChronoDuration {
        ChronoDuration::from_std(self.job_timeout * 2).unwrap_or(ChronoDuration::hours(1))
    }

    async fn execute(&self, job: &AutomationJob, now: DateTime<Utc>) -> Result<()> {
        let handler = self.registry.get(job.action_type).ok_or_else(|| {
            Error::Internal(format!("No handler registered for {}", job.action_type))
        })?;

        tokio::time::timeout(self.job_timeout, handler.handle(job, now))
            .await
            .map_err(|_| {
                Error::Internal(format!(
                    "{} timed out after {}s",
                    job.action_type,
                    self.job_timeout.as_secs()
                ))
            })?
    }

    /// Manual re-enqueue of a failed or dead-lettered job.
    pub async fn retry(&self, job_id: Uuid, now: DateTime<Utc>) -> Result<AutomationJob> {
        if let Some(job) = self.jobs.retry_job(job_id, now).await? {
            tracing::info!(job_id = %job.id, "Job re-enqueued manually");
            return Ok(job);
        }
        match self.jobs.get_job(job_id).await? {
            None => Err(Error::precondition(
                "job_not_found",
                format!("Job {} not found", job_id),
            )),
            Some(job) => Err(Error::precondition(
                "not_retryable",
                format!("Job {} is {} and cannot be retried", job_id, job.status),
            )),
        }
    }
}
