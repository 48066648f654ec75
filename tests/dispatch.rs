//! Provider dispatch tests against a local mock server: retry ceiling,
//! fallback chains and credential handling, with no real network traffic.

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use artigen::ai::catalog::ProviderFamily;
use artigen::ai::credentials::StaticCredentials;
use artigen::ai::dispatch::{
    DispatchError, Dispatcher, DispatcherConfig, GenerationOptions, HistoryMessage,
    ProviderEndpoints, GENERATION_FAILED, NO_CONTENT,
};

fn test_dispatcher(server: &MockServer, creds: StaticCredentials) -> (Dispatcher, tempfile::TempDir) {
    let upload_dir = tempfile::tempdir().unwrap();
    let cfg = DispatcherConfig {
        max_retries: 3,
        backoff: Duration::from_millis(1),
        timeout: Duration::from_secs(5),
        upload_dir: upload_dir.path().to_path_buf(),
    };
    let endpoints = ProviderEndpoints {
        openai: server.uri(),
        openrouter: server.uri(),
        anthropic: server.uri(),
        perplexity: server.uri(),
        gemini: server.uri(),
    };
    let dispatcher = Dispatcher::new(Arc::new(creds), cfg).with_endpoints(endpoints);
    (dispatcher, upload_dir)
}

fn history() -> Vec<HistoryMessage> {
    vec![HistoryMessage {
        role: "user".to_string(),
        content: "olá".to_string(),
        attachments: Vec::new(),
    }]
}

fn opts() -> GenerationOptions {
    GenerationOptions {
        temperature: 0.7,
        user_input: "olá".to_string(),
    }
}

fn completion_body(text: &str) -> serde_json::Value {
    json!({
        "choices": [{"message": {"role": "assistant", "content": text}}],
        "usage": {"prompt_tokens": 10, "completion_tokens": 5, "total_tokens": 15},
    })
}

#[tokio::test]
async fn missing_api_key_aborts_before_any_call() {
    let server = MockServer::start().await;
    let (dispatcher, _dir) = test_dispatcher(&server, StaticCredentials::new());

    let err = dispatcher
        .generate("gpt-3.5-turbo", &history(), &opts())
        .await
        .unwrap_err();
    assert!(matches!(err, DispatchError::MissingApiKey(ProviderFamily::OpenAi)));
    assert!(server.received_requests().await.unwrap().is_empty());
}

#[tokio::test]
async fn retry_stops_at_the_ceiling_and_degrades_to_sentinel() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(429))
        .expect(3)
        .mount(&server)
        .await;

    let creds = StaticCredentials::new().with_key(ProviderFamily::OpenAi, "sk-test");
    let (dispatcher, _dir) = test_dispatcher(&server, creds);

    let result = dispatcher
        .generate("gpt-3.5-turbo", &history(), &opts())
        .await
        .unwrap();
    assert_eq!(result.text, GENERATION_FAILED);
    assert_eq!(result.model_used, "gpt-3.5-turbo");
    assert!(result.images.is_empty());
}

#[tokio::test]
async fn retry_recovers_after_transient_429() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(429))
        .up_to_n_times(2)
        .expect(2)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .and(header("Authorization", "Bearer sk-test"))
        .respond_with(ResponseTemplate::new(200).set_body_json(completion_body("tudo certo")))
        .expect(1)
        .mount(&server)
        .await;

    let creds = StaticCredentials::new().with_key(ProviderFamily::OpenAi, "sk-test");
    let (dispatcher, _dir) = test_dispatcher(&server, creds);

    let result = dispatcher
        .generate("gpt-3.5-turbo", &history(), &opts())
        .await
        .unwrap();
    assert_eq!(result.text, "tudo certo");
    assert_eq!(result.usage.total_tokens, Some(15));
}

#[tokio::test]
async fn anthropic_chain_advances_to_the_next_model_on_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/messages"))
        .and(body_partial_json(json!({"model": "claude-opus-4-5"})))
        .respond_with(ResponseTemplate::new(500).set_body_json(json!({
            "error": {"message": "overloaded"}
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/v1/messages"))
        .and(body_partial_json(json!({"model": "claude-sonnet-4-5"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "content": [{"type": "text", "text": "resposta do sonnet"}],
            "usage": {"input_tokens": 8, "output_tokens": 4},
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/v1/messages"))
        .and(body_partial_json(json!({"model": "claude-haiku-4-5"})))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let creds = StaticCredentials::new().with_key(ProviderFamily::Anthropic, "ak-test");
    let (dispatcher, _dir) = test_dispatcher(&server, creds);

    let result = dispatcher
        .generate("claude-opus-4-5", &history(), &opts())
        .await
        .unwrap();
    assert_eq!(result.text, "resposta do sonnet");
    assert_eq!(result.model_used, "claude-sonnet-4-5");
    assert_eq!(result.usage.prompt_tokens, Some(8));
    assert_eq!(result.usage.total_tokens, Some(12));
}

#[tokio::test]
async fn anthropic_exhausted_chain_reports_the_last_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/messages"))
        .respond_with(ResponseTemplate::new(529).set_body_json(json!({
            "error": {"message": "Overloaded"}
        })))
        .expect(3)
        .mount(&server)
        .await;

    let creds = StaticCredentials::new().with_key(ProviderFamily::Anthropic, "ak-test");
    let (dispatcher, _dir) = test_dispatcher(&server, creds);

    let result = dispatcher
        .generate("claude-opus-4-5", &history(), &opts())
        .await
        .unwrap();
    assert_eq!(result.text, "[Erro Anthropic 529: Overloaded]");
    assert_eq!(result.model_used, "claude-haiku-4-5");
}

#[tokio::test]
async fn anthropic_empty_content_yields_no_content_sentinel() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/messages"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"content": []})))
        .expect(1)
        .mount(&server)
        .await;

    let creds = StaticCredentials::new().with_key(ProviderFamily::Anthropic, "ak-test");
    let (dispatcher, _dir) = test_dispatcher(&server, creds);

    // claude-sonnet-4-5 has no fallback chain, so one call settles it.
    let result = dispatcher
        .generate("claude-sonnet-4-5", &history(), &opts())
        .await
        .unwrap();
    assert_eq!(result.text, NO_CONTENT);
}

#[tokio::test]
async fn perplexity_chain_falls_back_to_plain_sonar() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(body_partial_json(json!({"model": "sonar-reasoning-pro"})))
        .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(body_partial_json(json!({"model": "sonar-reasoning"})))
        .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(body_partial_json(json!({"model": "sonar"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(completion_body("do sonar")))
        .expect(1)
        .mount(&server)
        .await;

    let creds = StaticCredentials::new().with_key(ProviderFamily::Perplexity, "pk-test");
    let (dispatcher, _dir) = test_dispatcher(&server, creds);

    let result = dispatcher
        .generate("sonar-reasoning-pro", &history(), &opts())
        .await
        .unwrap();
    assert_eq!(result.text, "do sonar");
    assert_eq!(result.model_used, "sonar");
}

#[tokio::test]
async fn perplexity_exhausted_chain_reports_the_last_status() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(400).set_body_string("bad request"))
        .expect(2)
        .mount(&server)
        .await;

    let creds = StaticCredentials::new().with_key(ProviderFamily::Perplexity, "pk-test");
    let (dispatcher, _dir) = test_dispatcher(&server, creds);

    let result = dispatcher
        .generate("sonar-reasoning", &history(), &opts())
        .await
        .unwrap();
    assert_eq!(result.text, "[Erro Perplexity 400: bad request]");
    assert_eq!(result.model_used, "sonar");
}

#[tokio::test]
async fn gemini_pro_request_is_served_by_flash() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1beta/models/gemini-2.5-flash:generateContent"))
        .and(header("x-goog-api-key", "gk-test"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "candidates": [{"content": {"parts": [{"text": "resposta gemini"}]}}],
            "usageMetadata": {"promptTokenCount": 7, "candidatesTokenCount": 3, "totalTokenCount": 10},
        })))
        .expect(1)
        .mount(&server)
        .await;

    let creds = StaticCredentials::new().with_key(ProviderFamily::Gemini, "gk-test");
    let (dispatcher, _dir) = test_dispatcher(&server, creds);

    let result = dispatcher
        .generate("gemini-2.5-pro", &history(), &opts())
        .await
        .unwrap();
    assert_eq!(result.text, "resposta gemini");
    assert_eq!(result.model_used, "gemini-2.5-flash");
    assert_eq!(result.usage.total_tokens, Some(10));
}

#[tokio::test]
async fn gemini_retries_on_overload_then_recovers() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1beta/models/gemini-2.5-flash-lite:generateContent"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(2)
        .expect(2)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/v1beta/models/gemini-2.5-flash-lite:generateContent"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "candidates": [{"content": {"parts": [{"text": "ok"}]}}],
        })))
        .expect(1)
        .mount(&server)
        .await;

    let creds = StaticCredentials::new().with_key(ProviderFamily::Gemini, "gk-test");
    let (dispatcher, _dir) = test_dispatcher(&server, creds);

    let result = dispatcher
        .generate("gemini-2.5-flash-lite", &history(), &opts())
        .await
        .unwrap();
    assert_eq!(result.text, "ok");
}

#[tokio::test]
async fn openrouter_models_hit_the_openrouter_endpoint() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .and(header("Authorization", "Bearer or-test"))
        .and(body_partial_json(json!({"model": "deepseek/deepseek-r1-0528:free"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(completion_body("via openrouter")))
        .expect(1)
        .mount(&server)
        .await;

    let creds = StaticCredentials::new().with_key(ProviderFamily::OpenRouter, "or-test");
    let (dispatcher, _dir) = test_dispatcher(&server, creds);

    let result = dispatcher
        .generate("deepseek/deepseek-r1-0528:free", &history(), &opts())
        .await
        .unwrap();
    assert_eq!(result.text, "via openrouter");
}
