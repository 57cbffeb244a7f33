use crate::error::{Error, Result};
use crate::models::{
    candidate::{Candidate, PipelineStage},
    candidate_match::MatchStatus,
    conversation::MessageType,
    outreach::{OutreachBatchResult, OutreachEdit, OutreachQueueItem, OutreachStatus, ProcessOutcome},
};
use crate::services::channels::SentMessage;
use crate::services::delivery::recipient_for;
use crate::services::messenger::{CandidateMessenger, Delivery};
use crate::services::pipeline::advance_stage;
use crate::services::scheduler::PacingPolicy;
use crate::store::Stores;
use chrono::{DateTime, Utc};
use serde_json::json;
use std::time::Duration;
use uuid::Uuid;

/// Delivery and manager control of the reviewable outreach queue.
#[derive(Clone)]
pub struct OutreachService {
    stores: Stores,
    messenger: CandidateMessenger,
    pacing: PacingPolicy,
    send_timeout: Duration,
}

impl OutreachService {
    pub fn new(
        stores: Stores,
        messenger: CandidateMessenger,
        pacing: PacingPolicy,
        send_timeout: Duration,
    ) -> Self {
        Self {
            stores,
            messenger,
            pacing,
            send_timeout,
        }
    }

    pub async fn get_due_items(
        &self,
        now: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<OutreachQueueItem>> {
        self.stores.outreach.due_outreach(now, limit).await
    }

    /// Fetches and sends one bounded batch; store errors end up in `error`.
    pub async fn tick(&self, now: DateTime<Utc>, limit: i64) -> OutreachBatchResult {
        match self.get_due_items(now, limit).await {
            Ok(items) => self.process_batch(&items, now).await,
            Err(e) => {
                tracing::error!(error = ?e, "Outreach tick aborted");
                OutreachBatchResult {
                    error: Some(e.to_string()),
                    ..OutreachBatchResult::default()
                }
            }
        }
    }

    pub async fn process_batch(
        &self,
        items: &[OutreachQueueItem],
        now: DateTime<Utc>,
    ) -> OutreachBatchResult {
        let mut result = OutreachBatchResult::default();
        for (index, item) in items.iter().enumerate() {
            if index > 0 {
                self.pacing.pause().await;
            }
            let outcome = self.process_item(item, now).await;
            result.processed += 1;
            if outcome.success {
                result.successful += 1;
            } else {
                result.failed += 1;
            }
        }
        tracing::info!(
            processed = result.processed,
            successful = result.successful,
            failed = result.failed,
            "Outreach batch finished"
        );
        result
    }

    /// Claims and sends one item. Failures are recorded on the item and
    /// reported in the outcome, never raised. Once the channel accepted the
    /// message the outcome is a success, whatever happens to the bookkeeping.
    pub async fn process_item(&self, item: &OutreachQueueItem, now: DateTime<Utc>) -> ProcessOutcome {
        match self.stores.outreach.claim_outreach(item.id).await {
            Ok(true) => {}
            Ok(false) => return failure(item.id, "not_scheduled".to_string()),
            Err(e) => {
                tracing::error!(outreach_id = %item.id, error = ?e, "Outreach claim failed");
                return failure(item.id, e.to_string());
            }
        }

        let candidate = match self.stores.candidates.get_candidate(item.candidate_id).await {
            Ok(Some(candidate)) => candidate,
            Ok(None) => {
                let error = format!("Candidate {} not found", item.candidate_id);
                self.mark_failed(item, &error).await;
                return failure(item.id, error);
            }
            Err(e) => {
                let error = e.to_string();
                self.mark_failed(item, &error).await;
                return failure(item.id, error);
            }
        };

        let text = item.full_text();
        let sent = match recipient_for(&candidate, item.delivery_method) {
            Ok(recipient) => tokio::time::timeout(
                self.send_timeout,
                self.messenger
                    .channels()
                    .send(
                        item.delivery_method,
                        &recipient,
                        MessageType::Intro.email_subject(),
                        &text,
                    ),
            )
            .await
            .unwrap_or_else(|_| Err(Error::Channel("send timed out".to_string()))),
            Err(e) => Err(e),
        };

        let sent = match sent {
            Ok(sent) => sent,
            Err(e) => {
                let error = e.to_string();
                tracing::warn!(outreach_id = %item.id, candidate_id = %candidate.id, %error, "Outreach send failed");
                self.mark_failed(item, &error).await;
                if let Err(e) = self
                    .stores
                    .candidates
                    .set_outreach_status(candidate.id, OutreachStatus::Failed)
                    .await
                {
                    tracing::error!(candidate_id = %candidate.id, error = ?e, "Candidate outreach status not updated");
                }
                return failure(item.id, error);
            }
        };
        tracing::info!(outreach_id = %item.id, candidate_id = %candidate.id, method = %item.delivery_method, "Outreach sent");

        if let Err(e) = self.record_sent(item, &candidate, &text, &sent, now).await {
            tracing::error!(outreach_id = %item.id, candidate_id = %candidate.id, error = ?e, "Outreach sent but not fully recorded");
        }

        ProcessOutcome {
            outreach_id: item.id,
            success: true,
            message_id: sent.message_id,
            error: None,
        }
    }

    async fn mark_failed(&self, item: &OutreachQueueItem, error: &str) {
        if let Err(e) = self.stores.outreach.mark_outreach_failed(item.id, error).await {
            tracing::error!(outreach_id = %item.id, error = ?e, "Outreach failure not recorded");
        }
    }

    /// Bookkeeping after a successful send. The item is marked sent first so
    /// a later error cannot leave it claimable or stuck.
    async fn record_sent(
        &self,
        item: &OutreachQueueItem,
        candidate: &Candidate,
        text: &str,
        sent: &SentMessage,
        now: DateTime<Utc>,
    ) -> Result<()> {
        self.stores
            .outreach
            .mark_outreach_sent(item.id, now, sent.message_id.clone())
            .await?;
        self.stores
            .candidates
            .set_outreach_status(candidate.id, OutreachStatus::Sent)
            .await?;
        if candidate.pipeline_stage.can_transition_to(PipelineStage::OutreachSent) {
            if let Err(e) =
                advance_stage(self.stores.candidates.as_ref(), candidate, PipelineStage::OutreachSent).await
            {
                tracing::warn!(candidate_id = %candidate.id, error = ?e, "Stage not advanced after outreach");
            }
        }
        if let Some(request_id) = item.request_id {
            self.stores
                .matches
                .set_match_status(candidate.id, request_id, MatchStatus::Contacted)
                .await?;
        }

        let delivery = Delivery {
            delivered: true,
            delivery_method: Some(item.delivery_method),
            message_id: sent.message_id.clone(),
            error: None,
        };
        self.messenger
            .record(
                candidate.id,
                item.request_id,
                MessageType::Intro,
                text,
                json!({ "outreach_id": item.id, "edited_by": item.edited_by }),
                &delivery,
            )
            .await
    }

    pub async fn cancel(&self, outreach_id: Uuid) -> Result<OutreachQueueItem> {
        match self.stores.outreach.cancel_outreach(outreach_id).await? {
            Some(item) => {
                self.stores
                    .candidates
                    .set_outreach_status(item.candidate_id, OutreachStatus::Cancelled)
                    .await?;
                tracing::info!(outreach_id = %item.id, candidate_id = %item.candidate_id, "Outreach cancelled");
                Ok(item)
            }
            None => Err(self.not_mutable(outreach_id).await),
        }
    }

    pub async fn cancel_for_candidate(&self, candidate_id: Uuid) -> Result<Vec<OutreachQueueItem>> {
        let cancelled = self
            .stores
            .outreach
            .cancel_outreach_for_candidate(candidate_id)
            .await?;
        if cancelled.is_empty() {
            return Err(Error::precondition(
                "not_scheduled",
                format!("Candidate {} has no scheduled outreach", candidate_id),
            ));
        }
        self.stores
            .candidates
            .set_outreach_status(candidate_id, OutreachStatus::Cancelled)
            .await?;
        tracing::info!(%candidate_id, count = cancelled.len(), "Candidate outreach cancelled");
        Ok(cancelled)
    }

    pub async fn edit(
        &self,
        outreach_id: Uuid,
        edit: OutreachEdit,
        editor: &str,
        now: DateTime<Utc>,
    ) -> Result<OutreachQueueItem> {
        if edit.message.is_none() && edit.scheduled_for.is_none() {
            return Err(Error::BadRequest(
                "Provide a message or a new schedule".to_string(),
            ));
        }
        if edit.message.as_deref().is_some_and(|m| m.trim().is_empty()) {
            return Err(Error::BadRequest("Message must not be empty".to_string()));
        }

        match self
            .stores
            .outreach
            .edit_outreach(outreach_id, edit, editor, now)
            .await?
        {
            Some(item) => {
                tracing::info!(outreach_id = %item.id, editor, "Outreach edited");
                Ok(item)
            }
            None => Err(self.not_mutable(outreach_id).await),
        }
    }

    /// Sends a scheduled item immediately, ignoring its schedule.
    pub async fn send_now(&self, outreach_id: Uuid, now: DateTime<Utc>) -> Result<ProcessOutcome> {
        let item = self
            .stores
            .outreach
            .get_outreach(outreach_id)
            .await?
            .ok_or_else(|| outreach_not_found(outreach_id))?;
        if !item.status.is_mutable() {
            return Err(not_scheduled(&item));
        }
        Ok(self.process_item(&item, now).await)
    }

    async fn not_mutable(&self, outreach_id: Uuid) -> Error {
        match self.stores.outreach.get_outreach(outreach_id).await {
            Ok(Some(item)) => not_scheduled(&item),
            Ok(None) => outreach_not_found(outreach_id),
            Err(e) => e,
        }
    }
}

fn failure(outreach_id: Uuid, error: String) -> ProcessOutcome {
    ProcessOutcome {
        outreach_id,
        success: false,
        message_id: None,
        error: Some(error),
    }
}

fn outreach_not_found(outreach_id: Uuid) -> Error {
    Error::precondition(
        "outreach_not_found",
        format!("Outreach item {} not found", outreach_id),
    )
}

fn not_scheduled(item: &OutreachQueueItem) -> Error {
    Error::precondition(
        "not_scheduled",
        format!("Outreach item {} is {}, only scheduled items can be changed", item.id, item.status),
    )
}
