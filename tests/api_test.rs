mod common;

use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use chrono::{Duration, Utc};
use common::*;
use jsonwebtoken::{encode, EncodingKey, Header};
use recruitment_automation::{
    middleware::auth::Claims,
    models::{
        candidate::PipelineStage,
        outreach::{DeliveryMethod, NewOutreachItem},
    },
    routes,
    store::{ConversationStore, OutreachStore},
};
use serde_json::{json, Value};
use tower::ServiceExt;
use uuid::Uuid;

fn token(role: &str) -> String {
    let claims = Claims {
        sub: "manager-1".to_string(),
        exp: (Utc::now() + Duration::hours(1)).timestamp() as usize,
        role: Some(role.to_string()),
    };
    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(JWT_SECRET.as_bytes()),
    )
    .unwrap()
}

fn app(h: &Harness) -> Router {
    routes::router(h.state.clone())
}

async fn send(app: &Router, req: Request<Body>) -> (StatusCode, Value) {
    let resp = app.clone().oneshot(req).await.unwrap();
    let status = resp.status();
    let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX)
        .await
        .unwrap();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, body)
}

fn manager_post(uri: &str, role: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .header("authorization", format!("Bearer {}", token(role)))
        .body(Body::from(body.to_string()))
        .unwrap()
}

#[tokio::test]
async fn health_is_public() {
    let h = harness(offline_ai(), unused_sender(), unused_sender());
    let req = Request::builder().uri("/health").body(Body::empty()).unwrap();
    let (status, body) = send(&app(&h), req).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn cron_trigger_requires_secret() {
    let h = harness(offline_ai(), unused_sender(), unused_sender());
    let app = app(&h);

    let missing = Request::builder()
        .method("POST")
        .uri("/api/cron/automation")
        .body(Body::empty())
        .unwrap();
    let (status, body) = send(&app, missing).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["code"], "unauthorized");

    let wrong = Request::builder()
        .method("POST")
        .uri("/api/cron/automation")
        .header("authorization", "Bearer nope")
        .body(Body::empty())
        .unwrap();
    let (status, _) = send(&app, wrong).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let bearer = Request::builder()
        .method("POST")
        .uri("/api/cron/automation")
        .header("authorization", format!("Bearer {}", CRON_SECRET))
        .body(Body::empty())
        .unwrap();
    let (status, body) = send(&app, bearer).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["processed"], 0);

    let query = Request::builder()
        .uri(format!("/api/cron/outreach?secret={}", CRON_SECRET))
        .body(Body::empty())
        .unwrap();
    let (status, body) = send(&app, query).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["failed"], 0);
}

#[tokio::test]
async fn manager_routes_require_manager_role() {
    let h = harness(offline_ai(), unused_sender(), unused_sender());
    let app = app(&h);
    let uri = format!("/api/automation/outreach/{}/cancel", Uuid::new_v4());

    let anonymous = Request::builder()
        .method("POST")
        .uri(&uri)
        .body(Body::empty())
        .unwrap();
    let (status, _) = send(&app, anonymous).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, body) = send(&app, manager_post(&uri, "candidate", json!({}))).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["code"], "forbidden");

    let (status, body) = send(&app, manager_post(&uri, "HR", json!({}))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], "outreach_not_found");
}

#[tokio::test]
async fn cancelled_outreach_cannot_be_edited_over_http() {
    let h = harness(offline_ai(), unused_sender(), unused_sender());
    let c = candidate(PipelineStage::Analyzed);
    seed(&h.store, &c);
    let item = h
        .store
        .schedule_outreach(NewOutreachItem {
            candidate_id: c.id,
            request_id: None,
            intro_message: "Вітаю!".to_string(),
            test_task_message: None,
            delivery_method: DeliveryMethod::Telegram,
            scheduled_for: Utc::now() + Duration::hours(1),
        })
        .await
        .unwrap();
    let app = app(&h);

    let cancel_uri = format!("/api/automation/outreach/{}/cancel", item.id);
    let (status, body) = send(&app, manager_post(&cancel_uri, "admin", json!({}))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "cancelled");

    let edit = Request::builder()
        .method("PATCH")
        .uri(format!("/api/automation/outreach/{}", item.id))
        .header("content-type", "application/json")
        .header("authorization", format!("Bearer {}", token("admin")))
        .body(Body::from(json!({ "message": "Інший текст" }).to_string()))
        .unwrap();
    let (status, body) = send(&app, edit).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], "not_scheduled");

    let (status, body) = send(&app, manager_post(&cancel_uri, "admin", json!({}))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], "not_scheduled");
}

#[tokio::test]
async fn final_decision_endpoint_is_idempotent() {
    let h = harness(offline_ai(), unused_sender(), unused_sender());
    let c = candidate(PipelineStage::TestDone);
    let request = seed(&h.store, &c);
    let app = app(&h);
    let payload = json!({
        "candidate_id": c.id,
        "request_id": request.id,
        "decision": "invite",
    });

    let (status, first) = send(
        &app,
        manager_post("/api/automation/decisions", "hr", payload.clone()),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(first["already_recorded"], false);
    assert_eq!(first["job"]["action_type"], "send_invite");
    assert_eq!(first["match"]["final_decision_by"], "manager-1");
    assert_eq!(first["pipeline_stage"], "interview");

    let (status, second) = send(
        &app,
        manager_post("/api/automation/decisions", "hr", payload),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(second["already_recorded"], true);
    assert!(second["job"].is_null());
    assert_eq!(
        second["match"]["final_decision_at"],
        first["match"]["final_decision_at"]
    );
    assert_eq!(h.store.all_jobs().len(), 1);

    let conflicting = json!({
        "candidate_id": c.id,
        "request_id": request.id,
        "decision": "reject",
    });
    let (status, body) = send(
        &app,
        manager_post("/api/automation/decisions", "hr", conflicting),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["code"], "conflict");
}

#[tokio::test]
async fn enqueue_rejects_unknown_candidate() {
    let h = harness(offline_ai(), unused_sender(), unused_sender());
    let app = app(&h);

    let payload = json!({
        "action_type": "send_outreach",
        "candidate_id": Uuid::new_v4(),
    });
    let (status, body) = send(&app, manager_post("/api/automation/jobs", "admin", payload)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], "candidate_not_found");

    let c = candidate(PipelineStage::Analyzed);
    seed(&h.store, &c);
    let payload = json!({
        "action_type": "send_outreach",
        "candidate_id": c.id,
    });
    let (status, body) = send(&app, manager_post("/api/automation/jobs", "admin", payload)).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["status"], "pending");
}

#[tokio::test]
async fn generate_message_returns_draft() {
    let h = harness(
        ai_answering("Ось повідомлення:\n\"Вітаю, Олено! Маємо цікаву вакансію.\""),
        unused_sender(),
        unused_sender(),
    );
    let c = candidate(PipelineStage::Analyzed);
    let request = seed(&h.store, &c);
    let app = app(&h);

    let payload = json!({
        "kind": "intro",
        "candidate_id": c.id,
        "request_id": request.id,
    });
    let (status, body) = send(
        &app,
        manager_post("/api/automation/messages/generate", "hr", payload),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["kind"], "intro");
    assert_eq!(body["message"], "Вітаю, Олено! Маємо цікаву вакансію.");
    assert!(h.store.all_jobs().is_empty());
}

#[tokio::test]
async fn telegram_webhook_always_acknowledges() {
    let h = harness(offline_ai(), unused_sender(), unused_sender());
    let app = app(&h);

    let update = json!({
        "update_id": 1,
        "message": {
            "message_id": 10,
            "chat": { "id": 424242, "type": "private" },
            "text": "Привіт"
        }
    });
    let req = Request::builder()
        .method("POST")
        .uri("/api/webhook/telegram")
        .header("content-type", "application/json")
        .header("x-telegram-bot-api-secret-token", TELEGRAM_SECRET)
        .body(Body::from(update.to_string()))
        .unwrap();
    let (status, body) = send(&app, req).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["ok"], true);
    assert_eq!(body["result"]["action"], "ignored");

    let no_text = json!({ "update_id": 2 });
    let req = Request::builder()
        .method("POST")
        .uri("/api/webhook/telegram")
        .header("content-type", "application/json")
        .header("x-telegram-bot-api-secret-token", TELEGRAM_SECRET)
        .body(Body::from(no_text.to_string()))
        .unwrap();
    let (status, _) = send(&app, req).await;
    assert_eq!(status, StatusCode::OK);
}

fn telegram_update(secret: Option<&str>, text: &str) -> Request<Body> {
    let update = json!({
        "update_id": 3,
        "message": {
            "message_id": 11,
            "chat": { "id": 1001, "type": "private" },
            "text": text
        }
    });
    let mut builder = Request::builder()
        .method("POST")
        .uri("/api/webhook/telegram")
        .header("content-type", "application/json");
    if let Some(secret) = secret {
        builder = builder.header("x-telegram-bot-api-secret-token", secret);
    }
    builder.body(Body::from(update.to_string())).unwrap()
}

#[tokio::test]
async fn telegram_webhook_requires_secret() {
    let mut ai = MockAi::new();
    ai.expect_complete().never();
    let h = harness(ai, unused_sender(), unused_sender());
    let c = candidate(PipelineStage::OutreachSent);
    seed(&h.store, &c);
    let app = app(&h);

    let (status, body) = send(&app, telegram_update(None, "Ні, дякую, не цікаво")).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["code"], "unauthorized");

    let (status, _) = send(&app, telegram_update(Some("guess"), "Ні, дякую, не цікаво")).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    assert!(h.store.entries_for_candidate(c.id).await.unwrap().is_empty());
}
