mod common;

use chrono::{Duration, Utc};
use common::*;
use recruitment_automation::{
    error::Error,
    models::{
        candidate::{Candidate, PipelineStage},
        candidate_match::MatchStatus,
        conversation::{Direction, MessageType},
        outreach::{DeliveryMethod, NewOutreachItem, OutreachEdit, OutreachQueueItem, OutreachStatus},
    },
    services::channels::SentMessage,
    store::{CandidateStore, ConversationStore, MatchStore, MemoryStore, OutreachStore},
};
use uuid::Uuid;

async fn schedule(
    store: &MemoryStore,
    candidate_id: Uuid,
    request_id: Option<Uuid>,
    scheduled_for: chrono::DateTime<Utc>,
) -> OutreachQueueItem {
    store
        .schedule_outreach(NewOutreachItem {
            candidate_id,
            request_id,
            intro_message: "Вітаю, Olena!".to_string(),
            test_task_message: Some("Тестове завдання: https://example.com/test-task".to_string()),
            delivery_method: DeliveryMethod::Telegram,
            scheduled_for,
        })
        .await
        .unwrap()
}

#[tokio::test]
async fn only_due_items_are_sent() {
    let mut telegram = MockSender::new();
    telegram
        .expect_send()
        .withf(|recipient, _, text| {
            recipient == "1001" && text.contains("Вітаю, Olena!") && text.contains("Тестове завдання")
        })
        .times(1)
        .returning(|_, _, _| {
            Ok(SentMessage {
                message_id: Some("555".to_string()),
            })
        });
    let h = harness(offline_ai(), telegram, unused_sender());
    let now = Utc::now();

    let due_candidate = candidate(PipelineStage::Analyzed);
    let request = seed(&h.store, &due_candidate);
    let due = schedule(&h.store, due_candidate.id, Some(request.id), now - Duration::minutes(1)).await;

    let later_candidate = candidate(PipelineStage::Analyzed);
    seed(&h.store, &later_candidate);
    let later = schedule(&h.store, later_candidate.id, None, now + Duration::hours(1)).await;

    let items = h.state.outreach.get_due_items(now, 10).await.unwrap();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].id, due.id);

    let result = h.state.outreach.process_batch(&items, now).await;
    assert_eq!((result.processed, result.successful, result.failed), (1, 1, 0));

    let sent = h.store.get_outreach(due.id).await.unwrap().unwrap();
    assert_eq!(sent.status, OutreachStatus::Sent);
    assert_eq!(sent.sent_at, Some(now));
    assert_eq!(sent.message_id.as_deref(), Some("555"));

    let untouched = h.store.get_outreach(later.id).await.unwrap().unwrap();
    assert_eq!(untouched.status, OutreachStatus::Scheduled);

    let c = h.store.get_candidate(due_candidate.id).await.unwrap().unwrap();
    assert_eq!(c.pipeline_stage, PipelineStage::OutreachSent);
    assert_eq!(c.outreach_status, Some(OutreachStatus::Sent));
    let m = h
        .store
        .get_match(due_candidate.id, request.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(m.status, MatchStatus::Contacted);

    let entries = h.store.entries_for_candidate(due_candidate.id).await.unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].direction, Direction::Outbound);
    assert_eq!(entries[0].message_type, MessageType::Intro);
    assert_eq!(entries[0].metadata["delivered"], true);
}

#[tokio::test]
async fn failed_send_marks_item_failed() {
    let mut telegram = MockSender::new();
    telegram
        .expect_send()
        .times(1)
        .returning(|_, _, _| Err(Error::Channel("chat not found".to_string())));
    let h = harness(offline_ai(), telegram, unused_sender());
    let now = Utc::now();
    let c = candidate(PipelineStage::Analyzed);
    seed(&h.store, &c);
    let item = schedule(&h.store, c.id, None, now).await;

    let result = h.state.outreach.tick(now, 10).await;
    assert_eq!((result.processed, result.failed), (1, 1));

    let failed = h.store.get_outreach(item.id).await.unwrap().unwrap();
    assert_eq!(failed.status, OutreachStatus::Failed);
    assert!(failed.error_message.unwrap().contains("chat not found"));
    let c = h.store.get_candidate(c.id).await.unwrap().unwrap();
    assert_eq!(c.outreach_status, Some(OutreachStatus::Failed));
    assert_eq!(c.pipeline_stage, PipelineStage::Analyzed);
}

#[tokio::test]
async fn cancelled_item_rejects_edit_cancel_and_send() {
    let h = harness(offline_ai(), unused_sender(), unused_sender());
    let now = Utc::now();
    let c = candidate(PipelineStage::Analyzed);
    seed(&h.store, &c);
    let item = schedule(&h.store, c.id, None, now + Duration::hours(1)).await;

    let cancelled = h.state.outreach.cancel(item.id).await.unwrap();
    assert_eq!(cancelled.status, OutreachStatus::Cancelled);
    let stored = h.store.get_candidate(c.id).await.unwrap().unwrap();
    assert_eq!(stored.outreach_status, Some(OutreachStatus::Cancelled));

    let edit = OutreachEdit {
        message: Some("Новий текст".to_string()),
        scheduled_for: None,
    };
    let err = h
        .state
        .outreach
        .edit(item.id, edit, "manager-1", now)
        .await
        .unwrap_err();
    assert_eq!(err.code(), "not_scheduled");

    let err = h.state.outreach.cancel(item.id).await.unwrap_err();
    assert_eq!(err.code(), "not_scheduled");

    let err = h.state.outreach.send_now(item.id, now).await.unwrap_err();
    assert_eq!(err.code(), "not_scheduled");

    let err = h.state.outreach.cancel(Uuid::new_v4()).await.unwrap_err();
    assert_eq!(err.code(), "outreach_not_found");

    let unchanged = h.store.get_outreach(item.id).await.unwrap().unwrap();
    assert_eq!(unchanged.intro_message, "Вітаю, Olena!");
    assert!(unchanged.edited_by.is_none());
}

#[tokio::test]
async fn edit_records_editor_and_new_schedule() {
    let h = harness(offline_ai(), unused_sender(), unused_sender());
    let now = Utc::now();
    let c = candidate(PipelineStage::Analyzed);
    seed(&h.store, &c);
    let item = schedule(&h.store, c.id, None, now + Duration::hours(1)).await;

    let new_time = now + Duration::hours(3);
    let edited = h
        .state
        .outreach
        .edit(
            item.id,
            OutreachEdit {
                message: Some("Оновлене привітання".to_string()),
                scheduled_for: Some(new_time),
            },
            "manager-1",
            now,
        )
        .await
        .unwrap();
    assert_eq!(edited.intro_message, "Оновлене привітання");
    assert_eq!(edited.scheduled_for, new_time);
    assert_eq!(edited.edited_by.as_deref(), Some("manager-1"));
    assert_eq!(edited.edited_at, Some(now));

    let err = h
        .state
        .outreach
        .edit(item.id, OutreachEdit::default(), "manager-1", now)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::BadRequest(_)));
}

#[tokio::test]
async fn cancel_for_candidate_without_scheduled_items_fails() {
    let h = harness(offline_ai(), unused_sender(), unused_sender());
    let c = candidate(PipelineStage::Analyzed);
    seed(&h.store, &c);

    let err = h.state.outreach.cancel_for_candidate(c.id).await.unwrap_err();
    assert_eq!(err.code(), "not_scheduled");

    schedule(&h.store, c.id, None, Utc::now() + Duration::hours(1)).await;
    let cancelled = h.state.outreach.cancel_for_candidate(c.id).await.unwrap();
    assert_eq!(cancelled.len(), 1);
    assert_eq!(cancelled[0].status, OutreachStatus::Cancelled);
}

#[tokio::test]
async fn send_now_ignores_schedule() {
    let h = harness(offline_ai(), accepting_sender(), unused_sender());
    let now = Utc::now();
    let c = candidate(PipelineStage::Analyzed);
    seed(&h.store, &c);
    let item = schedule(&h.store, c.id, None, now + Duration::days(1)).await;

    let outcome = h.state.outreach.send_now(item.id, now).await.unwrap();
    assert!(outcome.success);
    let sent = h.store.get_outreach(item.id).await.unwrap().unwrap();
    assert_eq!(sent.status, OutreachStatus::Sent);
}

#[tokio::test]
async fn failed_item_does_not_stop_the_batch() {
    let mut telegram = MockSender::new();
    telegram
        .expect_send()
        .withf(|recipient, subject, _| recipient == "1001" && subject == "Запрошення до співпраці")
        .times(1)
        .returning(|_, _, _| Ok(SentMessage::default()));
    let h = harness(offline_ai(), telegram, unused_sender());
    let now = Utc::now();

    let unreachable = Candidate {
        telegram_chat_id: None,
        email: None,
        ..candidate(PipelineStage::Analyzed)
    };
    seed(&h.store, &unreachable);
    let first = schedule(&h.store, unreachable.id, None, now).await;
    let reachable = candidate(PipelineStage::Analyzed);
    seed(&h.store, &reachable);
    let second = schedule(&h.store, reachable.id, None, now).await;

    let result = h
        .state
        .outreach
        .process_batch(&[first.clone(), second.clone()], now)
        .await;
    assert_eq!(
        (result.processed, result.successful, result.failed),
        (2, 1, 1)
    );

    let first = h.store.get_outreach(first.id).await.unwrap().unwrap();
    assert_eq!(first.status, OutreachStatus::Failed);
    let second = h.store.get_outreach(second.id).await.unwrap().unwrap();
    assert_eq!(second.status, OutreachStatus::Sent);
}

#[tokio::test]
async fn delivered_item_stays_sent_when_logging_fails() {
    let mut telegram = MockSender::new();
    telegram
        .expect_send()
        .times(1)
        .returning(|_, _, _| {
            Ok(SentMessage {
                message_id: Some("777".to_string()),
            })
        });
    let h = harness_with_broken_log(offline_ai(), telegram, unused_sender());
    let now = Utc::now();
    let c = candidate(PipelineStage::Analyzed);
    seed(&h.store, &c);
    let item = schedule(&h.store, c.id, None, now).await;

    let outcome = h.state.outreach.process_item(&item, now).await;
    assert!(outcome.success);
    assert_eq!(outcome.message_id.as_deref(), Some("777"));

    let stored = h.store.get_outreach(item.id).await.unwrap().unwrap();
    assert_eq!(stored.status, OutreachStatus::Sent);
    assert_eq!(stored.message_id.as_deref(), Some("777"));

    // A second run finds nothing to claim and sends nothing.
    let again = h.state.outreach.process_item(&item, now).await;
    assert!(!again.success);
    assert_eq!(again.error.as_deref(), Some("not_scheduled"));
}

#[tokio::test]
async fn item_for_missing_candidate_is_not_left_sending() {
    let h = harness(offline_ai(), unused_sender(), unused_sender());
    let now = Utc::now();
    let item = schedule(&h.store, Uuid::new_v4(), None, now).await;

    let outcome = h.state.outreach.process_item(&item, now).await;
    assert!(!outcome.success);

    let stored = h.store.get_outreach(item.id).await.unwrap().unwrap();
    assert_eq!(stored.status, OutreachStatus::Failed);
    assert!(stored.error_message.unwrap().contains("not found"));
}
