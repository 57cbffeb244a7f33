use crate::error::{Error, Result};
use crate::models::{candidate::Candidate, outreach::DeliveryMethod};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryTarget {
    pub method: DeliveryMethod,
    pub recipient: String,
}

/// Picks exactly one channel for a candidate. Telegram wins when the
/// candidate has a chat id and either states no preference or lists
/// telegram; everything else goes to email.
pub fn resolve_delivery(candidate: &Candidate) -> Result<DeliveryTarget> {
    let prefers = |name: &str| {
        candidate
            .preferred_contact_methods
            .iter()
            .any(|m| m.trim().eq_ignore_ascii_case(name))
    };
    let no_preference = candidate
        .preferred_contact_methods
        .iter()
        .all(|m| m.trim().is_empty());

    let method = if candidate.telegram_chat_id.is_some() && (no_preference || prefers("telegram")) {
        DeliveryMethod::Telegram
    } else {
        DeliveryMethod::Email
    };

    Ok(DeliveryTarget {
        method,
        recipient: recipient_for(candidate, method)?,
    })
}

/// Contact detail of `candidate` on `method`.
pub fn recipient_for(candidate: &Candidate, method: DeliveryMethod) -> Result<String> {
    let recipient = match method {
        DeliveryMethod::Telegram => candidate.telegram_chat_id.map(|id| id.to_string()),
        DeliveryMethod::Email => candidate
            .email
            .as_deref()
            .map(str::trim)
            .filter(|e| !e.is_empty())
            .map(str::to_string),
    };
    recipient.ok_or_else(|| {
        Error::precondition(
            "missing_contact",
            format!("Candidate {} has no {} contact", candidate.id, method),
        )
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::candidate::{PipelineStage, TestTaskStatus};
    use chrono::Utc;
    use uuid::Uuid;

    fn candidate(chat: Option<i64>, email: Option<&str>, prefs: &[&str]) -> Candidate {
        Candidate {
            id: Uuid::new_v4(),
            name: "Олена Коваль".into(),
            email: email.map(String::from),
            telegram_chat_id: chat,
            preferred_contact_methods: prefs.iter().map(|s| s.to_string()).collect(),
            pipeline_stage: PipelineStage::Analyzed,
            outreach_status: None,
            ai_score: None,
            ai_category: None,
            ai_summary: None,
            ai_strengths: vec![],
            test_task_status: TestTaskStatus::NotSent,
            test_task_original_deadline: None,
            test_task_current_deadline: None,
            test_task_extensions_count: 0,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn telegram_preferred_when_chat_known() {
        let target = resolve_delivery(&candidate(Some(42), Some("a@b.c"), &[])).unwrap();
        assert_eq!(target.method, DeliveryMethod::Telegram);
        assert_eq!(target.recipient, "42");

        let target =
            resolve_delivery(&candidate(Some(42), Some("a@b.c"), &["Telegram", "email"])).unwrap();
        assert_eq!(target.method, DeliveryMethod::Telegram);
    }

    #[test]
    fn email_when_only_email_is_preferred() {
        let target = resolve_delivery(&candidate(Some(42), Some("a@b.c"), &["email"])).unwrap();
        assert_eq!(target.method, DeliveryMethod::Email);
        assert_eq!(target.recipient, "a@b.c");
    }

    #[test]
    fn email_when_no_chat_id() {
        let target = resolve_delivery(&candidate(None, Some("a@b.c"), &["telegram"])).unwrap();
        assert_eq!(target.method, DeliveryMethod::Email);
    }

    #[test]
    fn missing_contact_is_a_precondition_failure() {
        let err = resolve_delivery(&candidate(None, None, &[])).unwrap_err();
        assert_eq!(err.code(), "missing_contact");

        let err = resolve_delivery(&candidate(Some(1), Some("  "), &["email"])).unwrap_err();
        assert_eq!(err.code(), "missing_contact");
    }
}
