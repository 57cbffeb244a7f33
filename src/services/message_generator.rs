use crate::models::{candidate::Candidate, request::HiringRequest};
use crate::services::ai_client::AiCompleter;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;

/// Candidate-facing message kinds the generator can draft.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    Intro,
    TestTask,
    Approval,
    Rejection,
    Invite,
}

/// Everything a prompt may draw on.
#[derive(Debug, Clone, Copy)]
pub struct MessageContext<'a> {
    pub candidate: &'a Candidate,
    pub request: Option<&'a HiringRequest>,
    pub deadline: Option<DateTime<Utc>>,
    pub feedback: Option<&'a str>,
}

impl<'a> MessageContext<'a> {
    pub fn new(candidate: &'a Candidate, request: Option<&'a HiringRequest>) -> Self {
        Self {
            candidate,
            request,
            deadline: None,
            feedback: None,
        }
    }

    pub fn with_deadline(mut self, deadline: DateTime<Utc>) -> Self {
        self.deadline = Some(deadline);
        self
    }

    pub fn with_feedback(mut self, feedback: Option<&'a str>) -> Self {
        self.feedback = feedback;
        self
    }
}

const LANGUAGE_RULE: &str = "Write strictly in Ukrainian, even if the input data is in another language. \
Return only the message text: no quotes, no markdown, no preface.";

#[derive(Clone)]
pub struct MessageGenerator {
    ai: Arc<dyn AiCompleter>,
}

impl MessageGenerator {
    pub fn new(ai: Arc<dyn AiCompleter>) -> Self {
        Self { ai }
    }

    pub async fn intro(&self, candidate: &Candidate, request: Option<&HiringRequest>) -> String {
        self.generate(MessageKind::Intro, MessageContext::new(candidate, request))
            .await
    }

    pub async fn test_task(
        &self,
        candidate: &Candidate,
        request: Option<&HiringRequest>,
        deadline: DateTime<Utc>,
    ) -> String {
        let ctx = MessageContext::new(candidate, request).with_deadline(deadline);
        self.generate(MessageKind::TestTask, ctx).await
    }

    /// Static questionnaire invitation, no model involved.
    pub fn questionnaire(&self, candidate: &Candidate, request: Option<&HiringRequest>) -> String {
        let link = request
            .and_then(|r| r.questionnaire_url.as_deref())
            .map(|url| format!("\n\n{}", url))
            .unwrap_or_default();
        format!(
            "{}, дякуємо за відповідь! Наступний крок: коротка анкета про ваш досвід і очікування. \
Заповнення займе близько 10 хвилин.{}",
            candidate.first_name(),
            link
        )
    }

    /// Drafts a message of `kind`. Never fails: a model error or an empty
    /// answer falls back to a fixed template.
    pub async fn generate(&self, kind: MessageKind, ctx: MessageContext<'_>) -> String {
        let system_prompt = format!("{} {}", system_prompt(kind), LANGUAGE_RULE);
        let user_prompt = prompt_data(&ctx).to_string();

        let drafted = match self.ai.complete(&system_prompt, &user_prompt).await {
            Ok(raw) => Some(clean_generated_text(&raw)).filter(|t| !t.is_empty()),
            Err(e) => {
                tracing::warn!(error = ?e, kind = ?kind, candidate_id = %ctx.candidate.id, "Message generation failed, using template");
                None
            }
        };

        let mut text = drafted.unwrap_or_else(|| fallback_message(kind, &ctx));
        if kind == MessageKind::TestTask {
            if let Some(url) = ctx.request.and_then(|r| r.test_task_url.as_deref()) {
                if !text.contains(url) {
                    text.push_str(&format!("\n\n{}", url));
                }
            }
        }
        text
    }
}

fn system_prompt(kind: MessageKind) -> &'static str {
    match kind {
        MessageKind::Intro => "You are a friendly recruiter writing a first short message to a candidate. \
Personalize it using the candidate's summary and strengths and mention the position. Keep it under 600 characters.",
        MessageKind::TestTask => "You are a recruiter sending a test task. State the task link and the exact deadline \
from the data, and say that the candidate may ask for more time if needed.",
        MessageKind::Approval => "You are a recruiter telling a candidate that their test task was approved. \
Be warm and say that the team will contact them about the next step.",
        MessageKind::Rejection => "You are a recruiter politely declining a candidate. Thank them, \
use the feedback if provided, and avoid false promises.",
        MessageKind::Invite => "You are a recruiter inviting a candidate to an interview. \
Congratulate them and say that the team will propose a time shortly.",
    }
}

fn prompt_data(ctx: &MessageContext<'_>) -> serde_json::Value {
    let candidate = ctx.candidate;
    json!({
        "candidate": {
            "name": candidate.name,
            "first_name": candidate.first_name(),
            "summary": candidate.ai_summary,
            "strengths": candidate.ai_strengths,
            "category": candidate.ai_category,
            "score": candidate.ai_score,
        },
        "position": ctx.request.map(|r| json!({
            "title": r.title,
            "company": r.company,
            "description": r.description,
            "test_task_url": r.test_task_url,
        })),
        "deadline": ctx.deadline.map(format_deadline),
        "feedback": ctx.feedback,
    })
}

pub fn format_deadline(deadline: DateTime<Utc>) -> String {
    deadline.format("%d.%m.%Y %H:%M UTC").to_string()
}

fn fallback_message(kind: MessageKind, ctx: &MessageContext<'_>) -> String {
    let name = ctx.candidate.first_name();
    let position = ctx
        .request
        .map(|r| format!(" на позицію «{}»", r.title))
        .unwrap_or_default();

    match kind {
        MessageKind::Intro => format!(
            "Вітаю, {}! Ми переглянули ваш профіль і хотіли б поговорити про можливість співпраці{}. \
Чи буде вам цікаво дізнатися більше?",
            name, position
        ),
        MessageKind::TestTask => {
            let deadline = ctx
                .deadline
                .map(|d| format!(" Будь ласка, надішліть рішення до {}.", format_deadline(d)))
                .unwrap_or_default();
            format!(
                "{}, надсилаємо тестове завдання{}.{} Якщо знадобиться більше часу, просто напишіть нам.",
                name, position, deadline
            )
        }
        MessageKind::Approval => format!(
            "{}, дякуємо за тестове завдання! Ваше рішення нам сподобалося, найближчим часом ми зв'яжемося щодо наступного кроку.",
            name
        ),
        MessageKind::Rejection => {
            let feedback = ctx
                .feedback
                .map(|f| format!(" Коментар команди: {}", f.trim()))
                .unwrap_or_default();
            format!(
                "{}, дякуємо за ваш час і інтерес{}. На жаль, цього разу ми вирішили продовжити з іншими кандидатами.{} Бажаємо успіхів!",
                name, position, feedback
            )
        }
        MessageKind::Invite => format!(
            "{}, вітаємо! Запрошуємо вас на співбесіду{}. Незабаром ми запропонуємо зручний час.",
            name, position
        ),
    }
}

const LEAD_INS: [&str; 8] = [
    "here is",
    "here's",
    "sure",
    "certainly",
    "ось",
    "звісно",
    "вот",
    "конечно",
];

/// Strips code fences, a generic lead-in line and wrapping quotes from a
/// model answer.
pub fn clean_generated_text(raw: &str) -> String {
    let mut text = raw.trim();

    if let Some(rest) = text.strip_prefix("```") {
        let rest = rest.split_once('\n').map(|(_, body)| body).unwrap_or("");
        text = rest.trim_end().strip_suffix("```").unwrap_or(rest).trim();
    }

    if let Some((first, rest)) = text.split_once('\n') {
        let lowered = first.trim().to_lowercase();
        if LEAD_INS.iter().any(|p| lowered.starts_with(p)) && lowered.ends_with(':') {
            text = rest.trim();
        }
    }

    const QUOTES: [(char, char); 4] = [('"', '"'), ('\'', '\''), ('«', '»'), ('“', '”')];
    for (open, close) in QUOTES {
        if text.chars().count() >= 2 && text.starts_with(open) && text.ends_with(close) {
            let inner = &text[open.len_utf8()..text.len() - close.len_utf8()];
            text = inner.trim();
            break;
        }
    }

    text.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::models::candidate::{PipelineStage, TestTaskStatus};
    use crate::services::ai_client::MockAiCompleter;
    use chrono::TimeZone;
    use uuid::Uuid;

    fn candidate() -> Candidate {
        Candidate {
            id: Uuid::new_v4(),
            name: "Андрій Шевченко".into(),
            email: Some("andrii@example.com".into()),
            telegram_chat_id: None,
            preferred_contact_methods: vec![],
            pipeline_stage: PipelineStage::Analyzed,
            outreach_status: None,
            ai_score: Some(8.5),
            ai_category: Some("strong".into()),
            ai_summary: Some("Backend engineer".into()),
            ai_strengths: vec!["Rust".into()],
            test_task_status: TestTaskStatus::NotSent,
            test_task_original_deadline: None,
            test_task_current_deadline: None,
            test_task_extensions_count: 0,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn request() -> HiringRequest {
        HiringRequest {
            id: Uuid::new_v4(),
            title: "Rust Developer".into(),
            company: Some("Acme".into()),
            description: None,
            test_task_url: Some("https://tasks.example.com/rust".into()),
            questionnaire_url: Some("https://forms.example.com/q".into()),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn cleaning_strips_fences_lead_ins_and_quotes() {
        assert_eq!(clean_generated_text("  \"Привіт!\"  "), "Привіт!");
        assert_eq!(clean_generated_text("«Привіт!»"), "Привіт!");
        assert_eq!(
            clean_generated_text("Here is the message:\nПривіт, Андрію!"),
            "Привіт, Андрію!"
        );
        assert_eq!(
            clean_generated_text("```text\nОсь повідомлення:\nПривіт\n```"),
            "Привіт"
        );
        assert_eq!(clean_generated_text("Привіт\nдругий рядок"), "Привіт\nдругий рядок");
    }

    #[tokio::test]
    async fn model_failure_falls_back_to_template() {
        let mut ai = MockAiCompleter::new();
        ai.expect_complete()
            .returning(|_, _| Err(Error::Internal("down".into())));
        let generator = MessageGenerator::new(Arc::new(ai));
        let c = candidate();
        let r = request();

        let text = generator.intro(&c, Some(&r)).await;
        assert!(text.starts_with("Вітаю, Андрій!"));
        assert!(text.contains("Rust Developer"));
    }

    #[tokio::test]
    async fn test_task_always_carries_link() {
        let mut ai = MockAiCompleter::new();
        ai.expect_complete()
            .returning(|_, _| Ok("\"Ось ваше завдання, успіхів!\"".into()));
        let generator = MessageGenerator::new(Arc::new(ai));
        let deadline = Utc.with_ymd_and_hms(2026, 2, 10, 18, 0, 0).unwrap();
        let c = candidate();
        let r = request();

        let text = generator.test_task(&c, Some(&r), deadline).await;
        assert!(text.starts_with("Ось ваше завдання"));
        assert!(text.ends_with("https://tasks.example.com/rust"));
    }

    #[test]
    fn questionnaire_includes_link() {
        let generator = MessageGenerator::new(Arc::new(MockAiCompleter::new()));
        let text = generator.questionnaire(&candidate(), Some(&request()));
        assert!(text.contains("https://forms.example.com/q"));
    }
}
