use std::sync::Arc;
use std::time::Duration;

use duel_harness::gateway::completions::OpenAiCompletionsAdapter;
use duel_harness::gateway::openai::OpenAiChatAdapter;
use duel_harness::gateway::{
    BackendGateway, ChatBackend, FinishReason, GatewayConfig, Message, NoopUsageSink,
    ProviderError,
};
use serde_json::json;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, Request, Respond, ResponseTemplate};

fn conversation() -> Vec<Message> {
    vec![Message::system("be brief"), Message::user("hi")]
}

#[tokio::test]
async fn chat_adapter_parses_success_content_and_usage() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "choices": [{
                "message": { "content": "hello" },
                "finish_reason": "stop"
            }],
            "usage": { "prompt_tokens": 10, "completion_tokens": 20 }
        })))
        .mount(&server)
        .await;

    let adapter =
        OpenAiChatAdapter::with_config("sk-test", server.uri(), Duration::from_secs(5), "gpt-3.5-turbo")
            .unwrap();

    let resp = adapter.complete_chat(&conversation()).await.unwrap();
    assert_eq!(resp.content, "hello");
    assert_eq!(resp.finish_reason, FinishReason::Stop);
    assert_eq!(resp.input_tokens, 10);
    assert_eq!(resp.output_tokens, 20);
}

#[tokio::test]
async fn chat_adapter_maps_429_to_rate_limited() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(429).set_body_json(json!({
            "error": { "message": "Rate limit reached", "code": "rate_limit_exceeded" }
        })))
        .mount(&server)
        .await;

    let adapter =
        OpenAiChatAdapter::with_config("sk-test", server.uri(), Duration::from_secs(5), "gpt-3.5-turbo")
            .unwrap();

    let err = adapter.complete_chat(&conversation()).await.unwrap_err();
    assert!(err.is_rate_limited());
    assert_eq!(err.code(), "rate_limited");
    let ctx = err.context().expect("429 carries context");
    assert_eq!(ctx.http_status, Some(429));
    assert_eq!(ctx.provider_code.as_deref(), Some("rate_limit_exceeded"));
}

#[tokio::test]
async fn chat_adapter_surfaces_api_error_body() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({
            "error": { "message": "Incorrect API key provided", "code": "invalid_api_key" }
        })))
        .mount(&server)
        .await;

    let adapter =
        OpenAiChatAdapter::with_config("sk-bad", server.uri(), Duration::from_secs(5), "gpt-3.5-turbo")
            .unwrap();

    let err = adapter.complete_chat(&conversation()).await.unwrap_err();
    assert!(!err.is_retryable());
    assert!(err.to_string().contains("Incorrect API key"));
}

#[tokio::test]
async fn gateway_retries_5xx_then_surfaces_the_error() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(500).set_body_json(json!({
            "error": { "message": "internal error" }
        })))
        // One initial attempt plus one retry, then the gateway gives up.
        .expect(2)
        .mount(&server)
        .await;

    let adapter =
        OpenAiChatAdapter::with_config("sk-test", server.uri(), Duration::from_secs(5), "gpt-3.5-turbo")
            .unwrap();
    let gateway = BackendGateway::new(
        Arc::new(adapter),
        Arc::new(NoopUsageSink),
        GatewayConfig {
            max_retries: 1,
            retry_base_delay: Duration::from_millis(1),
        },
    );

    let err = gateway.complete_chat(&conversation()).await.unwrap_err();
    assert_eq!(err.code(), "provider_error");
    assert!(err.is_retryable());
}

#[tokio::test]
async fn gateway_rejects_malformed_conversations_without_calling_the_provider() {
    let server = MockServer::start().await;
    // No mock mounted: any request would 404 and fail differently.

    let adapter =
        OpenAiChatAdapter::with_config("sk-test", server.uri(), Duration::from_secs(5), "gpt-3.5-turbo")
            .unwrap();
    let gateway = BackendGateway::new(
        Arc::new(adapter),
        Arc::new(NoopUsageSink),
        GatewayConfig::default(),
    );

    let err = gateway.complete_chat(&[]).await.unwrap_err();
    assert!(matches!(err, ProviderError::InvalidRequest { .. }));

    let ends_with_assistant = vec![Message::user("hi"), Message::assistant("hello")];
    let err = gateway.complete_chat(&ends_with_assistant).await.unwrap_err();
    assert!(matches!(err, ProviderError::InvalidRequest { .. }));
}

/// Echoes the prompt it received, so the test can see exactly what the
/// adapter sent.
struct EchoPrompt;

impl Respond for EchoPrompt {
    fn respond(&self, request: &Request) -> ResponseTemplate {
        let parsed: serde_json::Value = serde_json::from_slice(&request.body).unwrap_or_default();
        let prompt = parsed
            .get("prompt")
            .and_then(|p| p.as_str())
            .unwrap_or("")
            .to_string();
        ResponseTemplate::new(200).set_body_json(json!({
            "choices": [{ "text": prompt, "finish_reason": "stop" }],
            "usage": { "prompt_tokens": 5, "completion_tokens": 5 }
        }))
    }
}

#[tokio::test]
async fn completions_adapter_flattens_the_conversation_role_tagged() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/completions"))
        .respond_with(EchoPrompt)
        .mount(&server)
        .await;

    let adapter = OpenAiCompletionsAdapter::with_config(
        "sk-test",
        server.uri(),
        Duration::from_secs(5),
        "gpt-3.5-turbo-instruct",
    )
    .unwrap();

    let resp = adapter.complete_chat(&conversation()).await.unwrap();
    assert_eq!(resp.content, "system: be brief\n\nuser: hi\n\nassistant:");
}

#[tokio::test]
async fn completions_adapter_trims_generated_text() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "choices": [{ "text": "  Hello.\n", "finish_reason": "stop" }]
        })))
        .mount(&server)
        .await;

    let adapter = OpenAiCompletionsAdapter::with_config(
        "sk-test",
        server.uri(),
        Duration::from_secs(5),
        "gpt-3.5-turbo-instruct",
    )
    .unwrap();

    let resp = adapter.complete_chat(&conversation()).await.unwrap();
    assert_eq!(resp.content, "Hello.");
}
