#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use mockall::mock;
use uuid::Uuid;

use recruitment_automation::{
    config::AutomationSettings,
    error::{Error, Result},
    models::{
        candidate::{Candidate, PipelineStage, TestTaskStatus},
        candidate_match::{CandidateRequestMatch, MatchStatus},
        conversation::{ConversationEntry, NewConversationEntry},
        request::HiringRequest,
    },
    services::{
        ai_client::AiCompleter,
        channels::{Channels, MessageSender, SentMessage},
    },
    store::{ConversationStore, MemoryStore, Stores},
    AppState, AuthSecrets,
};

pub const JWT_SECRET: &str = "test_secret_key";
pub const CRON_SECRET: &str = "cron_test_secret";
pub const TELEGRAM_SECRET: &str = "telegram_test_secret";

mock! {
    pub Ai {}

    #[async_trait]
    impl AiCompleter for Ai {
        async fn complete(&self, system_prompt: &str, user_prompt: &str) -> Result<String>;
    }
}

mock! {
    pub Sender {}

    #[async_trait]
    impl MessageSender for Sender {
        async fn send(&self, recipient: &str, subject: &str, text: &str) -> Result<SentMessage>;
    }
}

/// A model that is always down, so every generated text uses its template.
pub fn offline_ai() -> MockAi {
    let mut ai = MockAi::new();
    ai.expect_complete()
        .returning(|_, _| Err(Error::Internal("model unavailable".to_string())));
    ai
}

/// A model answering every prompt with `answer`.
pub fn ai_answering(answer: &'static str) -> MockAi {
    let mut ai = MockAi::new();
    ai.expect_complete()
        .returning(move |_, _| Ok(answer.to_string()));
    ai
}

pub fn accepting_sender() -> MockSender {
    let mut sender = MockSender::new();
    sender.expect_send().returning(|_, _, _| {
        Ok(SentMessage {
            message_id: Some("msg-1".to_string()),
        })
    });
    sender
}

pub fn unused_sender() -> MockSender {
    let mut sender = MockSender::new();
    sender.expect_send().never();
    sender
}

pub fn settings() -> AutomationSettings {
    AutomationSettings {
        send_delay: Duration::ZERO,
        external_call_timeout: Duration::from_secs(5),
        ..AutomationSettings::default()
    }
}

pub struct Harness {
    pub store: Arc<MemoryStore>,
    pub state: AppState,
}

pub fn harness(ai: MockAi, telegram: MockSender, email: MockSender) -> Harness {
    let store = Arc::new(MemoryStore::new());
    let stores = Stores::shared(store.clone());
    build_harness(store, stores, ai, telegram, email)
}

/// Conversation log that rejects every write.
pub struct BrokenConversationLog;

#[async_trait]
impl ConversationStore for BrokenConversationLog {
    async fn append_entry(&self, _entry: NewConversationEntry) -> Result<ConversationEntry> {
        Err(Error::Internal("conversation log unavailable".to_string()))
    }

    async fn entries_for_candidate(&self, _candidate_id: Uuid) -> Result<Vec<ConversationEntry>> {
        Ok(Vec::new())
    }
}

/// Like `harness`, but every conversation log write fails.
pub fn harness_with_broken_log(ai: MockAi, telegram: MockSender, email: MockSender) -> Harness {
    let store = Arc::new(MemoryStore::new());
    let stores = Stores {
        conversations: Arc::new(BrokenConversationLog),
        ..Stores::shared(store.clone())
    };
    build_harness(store, stores, ai, telegram, email)
}

fn build_harness(
    store: Arc<MemoryStore>,
    stores: Stores,
    ai: MockAi,
    telegram: MockSender,
    email: MockSender,
) -> Harness {
    let state = AppState::new(
        stores,
        Arc::new(ai),
        Channels::new(Arc::new(telegram), Arc::new(email)),
        settings(),
        AuthSecrets {
            jwt_secret: JWT_SECRET.to_string(),
            cron_secret: Some(CRON_SECRET.to_string()),
            telegram_secret: TELEGRAM_SECRET.to_string(),
        },
    );
    Harness { store, state }
}

pub fn candidate(stage: PipelineStage) -> Candidate {
    let now = Utc::now();
    Candidate {
        id: Uuid::new_v4(),
        name: "Olena Kovalenko".to_string(),
        email: Some("olena@example.com".to_string()),
        telegram_chat_id: Some(1001),
        preferred_contact_methods: Vec::new(),
        pipeline_stage: stage,
        outreach_status: None,
        ai_score: Some(82.0),
        ai_category: Some("strong".to_string()),
        ai_summary: Some("Backend engineer with Rust experience".to_string()),
        ai_strengths: vec!["Rust".to_string(), "PostgreSQL".to_string()],
        test_task_status: TestTaskStatus::NotSent,
        test_task_original_deadline: None,
        test_task_current_deadline: None,
        test_task_extensions_count: 0,
        created_at: now,
        updated_at: now,
    }
}

/// A candidate working on a test task due at `deadline`.
pub fn candidate_with_test_task(deadline: DateTime<Utc>, extensions: i32) -> Candidate {
    Candidate {
        test_task_status: TestTaskStatus::Sent,
        test_task_original_deadline: Some(deadline),
        test_task_current_deadline: Some(deadline),
        test_task_extensions_count: extensions,
        ..candidate(PipelineStage::TestSent)
    }
}

pub fn request() -> HiringRequest {
    HiringRequest {
        id: Uuid::new_v4(),
        title: "Rust Backend Developer".to_string(),
        company: Some("Screenx".to_string()),
        description: Some("Build the hiring platform backend".to_string()),
        test_task_url: Some("https://example.com/test-task".to_string()),
        questionnaire_url: Some("https://example.com/questionnaire".to_string()),
        created_at: Utc::now(),
    }
}

pub fn matched(candidate: &Candidate, request: &HiringRequest) -> CandidateRequestMatch {
    CandidateRequestMatch {
        id: Uuid::new_v4(),
        candidate_id: candidate.id,
        request_id: request.id,
        match_score: 0.87,
        status: MatchStatus::Matched,
        final_decision: None,
        final_decision_at: None,
        final_decision_by: None,
        created_at: Utc::now(),
    }
}

/// Seeds a candidate with one matched request.
pub fn seed(store: &MemoryStore, candidate: &Candidate) -> HiringRequest {
    let request = request();
    store.insert_candidate(candidate.clone());
    store.insert_request(request.clone());
    store.insert_match(matched(candidate, &request));
    request
}
