//! Service-level tests against a real Postgres, gated on TEST_DATABASE_URL.
//! Without the variable each test is a silent no-op, so the suite stays green
//! on machines without a database.

use std::sync::Arc;
use std::time::Duration;

use uuid::Uuid;
use wiremock::matchers::method;
use wiremock::{Mock, MockServer, ResponseTemplate};

use artigen::ai::catalog::ProviderFamily;
use artigen::ai::credentials::StaticCredentials;
use artigen::ai::dispatch::{Dispatcher, DispatcherConfig, ProviderEndpoints};
use artigen::content::{ContentKind, ReviewStatus};
use artigen::db::{models, Database};
use artigen::plan::FEATURE_COLLAB_APPROVAL_FLOW;
use artigen::quota::current_month_key;
use artigen::service::{ChatService, CreateContentRequest, SendMessageRequest, ServiceError};

async fn test_db() -> Option<Database> {
    let url = std::env::var("TEST_DATABASE_URL").ok()?;
    let db = Database::connect(&url).await.ok()?;
    db.run_migrations().await.ok()?;
    db.seed_default_plans().await.ok()?;
    Some(db)
}

async fn new_user(db: &Database, plan_id: Option<i32>) -> models::User {
    let tag = Uuid::new_v4().simple().to_string();
    db.create_user(
        "Usuário de Teste",
        &format!("user_{tag}"),
        &format!("{tag}@teste.dev"),
        "senha-hash",
        plan_id,
    )
    .await
    .unwrap()
}

fn service_with(db: Database, server: &MockServer, creds: StaticCredentials) -> ChatService {
    let cfg = DispatcherConfig {
        max_retries: 2,
        backoff: Duration::from_millis(1),
        timeout: Duration::from_secs(5),
        upload_dir: std::env::temp_dir(),
    };
    let endpoints = ProviderEndpoints {
        openai: server.uri(),
        openrouter: server.uri(),
        anthropic: server.uri(),
        perplexity: server.uri(),
        gemini: server.uri(),
    };
    let dispatcher = Arc::new(Dispatcher::new(Arc::new(creds), cfg).with_endpoints(endpoints));
    ChatService::new(db, dispatcher, "gpt-4o".to_string())
}

#[tokio::test]
async fn get_or_create_usage_is_idempotent() {
    let Some(db) = test_db().await else { return };
    let user = new_user(&db, None).await;

    let first = db
        .get_or_create_usage(&user.id, &current_month_key())
        .await
        .unwrap();
    let second = db
        .get_or_create_usage(&user.id, &current_month_key())
        .await
        .unwrap();
    assert_eq!(first.id, second.id);
    assert_eq!(second.used_messages, 0);
}

#[tokio::test]
async fn blocked_user_triggers_zero_provider_calls() {
    let Some(db) = test_db().await else { return };
    let server = MockServer::start().await;
    // Any provider traffic for an over-quota user is a gate-ordering bug.
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let plan = db.get_or_create_plan("basico").await.unwrap();
    let user = new_user(&db, Some(plan.id)).await;

    // Consume the whole Básico quota.
    let usage = db
        .get_or_create_usage(&user.id, &current_month_key())
        .await
        .unwrap();
    db.increment_usage(usage.id, 100).await.unwrap();

    // Credentials are present, so nothing short-circuits before the gate.
    let creds = StaticCredentials::new().with_key(ProviderFamily::OpenAi, "sk-test");
    let service = service_with(db, &server, creds);

    let err = service
        .send_message(SendMessageRequest {
            user_id: user.id.clone(),
            chat_id: None,
            input: "olá".to_string(),
            model: Some("gpt-4o".to_string()),
            temperature: None,
            files: Vec::new(),
        })
        .await
        .unwrap_err();

    assert!(matches!(err, ServiceError::QuotaExceeded { .. }));
    assert!(server.received_requests().await.unwrap().is_empty());

    let status = service.quota_status(&user.id).await.unwrap();
    assert!(!status.actions.can_send_message);
}

#[tokio::test]
async fn text_content_flows_through_the_review_workflow() {
    let Some(db) = test_db().await else { return };
    let server = MockServer::start().await;

    // Premium plan carries the approval flow.
    let plan = db.get_or_create_plan("premium").await.unwrap();
    let feature = db
        .get_or_create_feature(FEATURE_COLLAB_APPROVAL_FLOW, Some("Fluxo de aprovação"))
        .await
        .unwrap();
    db.set_plan_feature(plan.id, feature.id, "true").await.unwrap();

    let author = new_user(&db, Some(plan.id)).await;
    let reviewer = new_user(&db, Some(plan.id)).await;
    sqlx::query("UPDATE users SET role = 'admin' WHERE id = $1")
        .bind(&reviewer.id)
        .execute(&db.pool)
        .await
        .unwrap();

    let service = service_with(db, &server, StaticCredentials::new());

    let content = service
        .create_content(CreateContentRequest {
            user_id: author.id.clone(),
            kind: ContentKind::Text,
            prompt: "post sobre café".to_string(),
            model_used: None,
            content_data: Some("O café coado é superior.".to_string()),
            temperature: Some(0.7),
            style: None,
            ratio: None,
            duration: None,
        })
        .await
        .unwrap();
    assert_eq!(content.status, ReviewStatus::Draft.as_str());

    let submitted = service
        .submit_for_review(content.id, &author.id)
        .await
        .unwrap();
    assert_eq!(submitted.status, ReviewStatus::InReview.as_str());
    assert_eq!(submitted.submitted_by.as_deref(), Some(author.id.as_str()));

    let inbox = service.review_inbox(&reviewer.id).await.unwrap();
    assert!(inbox.iter().any(|c| c.id == content.id));

    let approved = service
        .review_content(content.id, &reviewer.id, true)
        .await
        .unwrap();
    assert_eq!(approved.status, ReviewStatus::Approved.as_str());
    assert_eq!(approved.approved_by.as_deref(), Some(reviewer.id.as_str()));
    assert!(approved.rejected_at.is_none());

    // Approved content can neither be resubmitted nor re-reviewed.
    assert!(matches!(
        service.submit_for_review(content.id, &author.id).await,
        Err(ServiceError::InvalidTransition { .. })
    ));
    assert!(matches!(
        service.review_content(content.id, &reviewer.id, false).await,
        Err(ServiceError::InvalidTransition { .. })
    ));
}

#[tokio::test]
async fn non_admin_reviewers_are_denied() {
    let Some(db) = test_db().await else { return };
    let server = MockServer::start().await;

    let plan = db.get_or_create_plan("premium").await.unwrap();
    let user = new_user(&db, Some(plan.id)).await;
    let service = service_with(db, &server, StaticCredentials::new());

    assert!(matches!(
        service.review_inbox(&user.id).await,
        Err(ServiceError::AccessDenied)
    ));
}

#[tokio::test]
async fn image_content_cannot_enter_review() {
    let Some(db) = test_db().await else { return };
    let server = MockServer::start().await;

    let plan = db.get_or_create_plan("premium").await.unwrap();
    let user = new_user(&db, Some(plan.id)).await;
    let service = service_with(db, &server, StaticCredentials::new());

    let content = service
        .create_content(CreateContentRequest {
            user_id: user.id.clone(),
            kind: ContentKind::Image,
            prompt: "um gato de chapéu".to_string(),
            model_used: None,
            content_data: None,
            temperature: None,
            style: Some("aquarela".to_string()),
            ratio: Some("1:1".to_string()),
            duration: None,
        })
        .await
        .unwrap();

    assert!(matches!(
        service.submit_for_review(content.id, &user.id).await,
        Err(ServiceError::NotReviewable)
    ));
}
