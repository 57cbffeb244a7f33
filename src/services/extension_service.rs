use crate::config::AutomationSettings;
use crate::error::{Error, Result};
use crate::models::{
    candidate::{Candidate, TestTaskStatus},
    conversation::MessageType,
};
use crate::services::deadline_negotiator::DeadlineNegotiator;
use crate::services::message_generator::format_deadline;
use crate::services::messenger::{CandidateMessenger, Delivery};
use crate::store::CandidateStore;
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::json;
use std::sync::Arc;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DenialReason {
    MaxExtensionsReached,
    ExceedsLimit,
}

impl DenialReason {
    pub fn as_str(self) -> &'static str {
        match self {
            DenialReason::MaxExtensionsReached => "max_extensions_reached",
            DenialReason::ExceedsLimit => "exceeds_limit",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ExtensionOutcome {
    pub granted: bool,
    pub reason: Option<DenialReason>,
    pub previous_deadline: DateTime<Utc>,
    pub new_deadline: Option<DateTime<Utc>>,
    pub additional_days: Option<i64>,
    pub extensions_count: i32,
    pub reply: String,
    pub delivery: Delivery,
}

/// Grants or denies test-task deadline extensions under the count and day
/// limits, and answers the candidate either way.
#[derive(Clone)]
pub struct ExtensionService {
    candidates: Arc<dyn CandidateStore>,
    negotiator: DeadlineNegotiator,
    messenger: CandidateMessenger,
    settings: AutomationSettings,
}

impl ExtensionService {
    pub fn new(
        candidates: Arc<dyn CandidateStore>,
        negotiator: DeadlineNegotiator,
        messenger: CandidateMessenger,
        settings: AutomationSettings,
    ) -> Self {
        Self {
            candidates,
            negotiator,
            messenger,
            settings,
        }
    }

    pub async fn request_extension(
        &self,
        candidate_id: Uuid,
        message: &str,
        now: DateTime<Utc>,
    ) -> Result<ExtensionOutcome> {
        let candidate = self
            .candidates
            .get_candidate(candidate_id)
            .await?
            .ok_or_else(|| {
                Error::precondition("candidate_not_found", format!("Candidate {} not found", candidate_id))
            })?;

        let deadline = match (candidate.test_task_status, candidate.test_task_current_deadline) {
            (TestTaskStatus::Sent, Some(deadline)) => deadline,
            _ => {
                return Err(Error::precondition(
                    "no_active_test_task",
                    format!("Candidate {} has no open test task", candidate_id),
                ))
            }
        };

        if candidate.test_task_extensions_count >= self.settings.max_extensions {
            return self
                .deny(&candidate, deadline, DenialReason::MaxExtensionsReached, None, message)
                .await;
        }

        let parsed = self.negotiator.parse(message, deadline, now).await;
        let new_deadline = match parsed.requested_date {
            Some(date) if parsed.is_reasonable => date,
            _ => {
                tracing::info!(
                    candidate_id = %candidate.id,
                    reason = parsed.reason.as_deref().unwrap_or("unknown"),
                    "Extension request not acceptable"
                );
                return self
                    .deny(
                        &candidate,
                        deadline,
                        DenialReason::ExceedsLimit,
                        parsed.additional_days,
                        message,
                    )
                    .await;
            }
        };

        let updated = self
            .candidates
            .extend_deadline(
                candidate.id,
                candidate.test_task_extensions_count,
                self.settings.max_extensions,
                new_deadline,
            )
            .await?
            .ok_or_else(|| {
                Error::Conflict(format!(
                    "Deadline of candidate {} changed while processing the request",
                    candidate.id
                ))
            })?;

        let reply = format!(
            "{}, без проблем! Новий дедлайн для тестового завдання: {}. Успіхів!",
            candidate.first_name(),
            format_deadline(new_deadline)
        );
        let delivery = self
            .messenger
            .send_best_effort(
                &updated,
                None,
                MessageType::ExtensionGranted,
                &reply,
                json!({
                    "granted": true,
                    "request_text": message,
                    "previous_deadline": deadline,
                    "new_deadline": new_deadline,
                    "additional_days": parsed.additional_days,
                    "extensions_count": updated.test_task_extensions_count,
                }),
            )
            .await?;

        tracing::info!(
            candidate_id = %candidate.id,
            %new_deadline,
            extensions_count = updated.test_task_extensions_count,
            "Deadline extension granted"
        );

        Ok(ExtensionOutcome {
            granted: true,
            reason: None,
            previous_deadline: deadline,
            new_deadline: Some(new_deadline),
            additional_days: parsed.additional_days,
            extensions_count: updated.test_task_extensions_count,
            reply,
            delivery,
        })
    }

    async fn deny(
        &self,
        candidate: &Candidate,
        deadline: DateTime<Utc>,
        reason: DenialReason,
        additional_days: Option<i64>,
        message: &str,
    ) -> Result<ExtensionOutcome> {
        let reply = match reason {
            DenialReason::MaxExtensionsReached => format!(
                "{}, на жаль, дедлайн уже переносився максимальну кількість разів, тому ми не можемо продовжити його знову. \
Будь ласка, надішліть рішення до {}.",
                candidate.first_name(),
                format_deadline(deadline)
            ),
            DenialReason::ExceedsLimit => format!(
                "{}, на жаль, ми можемо перенести дедлайн не більше ніж на {} днів. Поточний дедлайн: {}. \
Напишіть, будь ласка, конкретну дату в цих межах.",
                candidate.first_name(),
                self.settings.max_extension_days,
                format_deadline(deadline)
            ),
        };

        let delivery = self
            .messenger
            .send_best_effort(
                candidate,
                None,
                MessageType::ExtensionDenied,
                &reply,
                json!({
                    "granted": false,
                    "reason": reason.as_str(),
                    "request_text": message,
                    "current_deadline": deadline,
                    "additional_days": additional_days,
                    "extensions_count": candidate.test_task_extensions_count,
                }),
            )
            .await?;

        tracing::info!(candidate_id = %candidate.id, reason = reason.as_str(), "Deadline extension denied");

        Ok(ExtensionOutcome {
            granted: false,
            reason: Some(reason),
            previous_deadline: deadline,
            new_deadline: None,
            additional_days,
            extensions_count: candidate.test_task_extensions_count,
            reply,
            delivery,
        })
    }
}
