use modelgate::failover::{FailoverReason, RetryOptions, classify, is_retryable_error, with_retry};
use modelgate::llm::{
    ApiProvider, AuthProfileConfig, ChatOptions, FinishReason, LocalProvider, Message, Operation,
    Provider, ProviderConfig, ProviderError, ProviderLogEvent, ProviderLogger,
    SharedProviderLogger, ToolSchema, TracingProviderLogger,
};
use serde_json::json;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[derive(Debug, Default)]
struct RecordingLogger {
    finished: Mutex<Vec<ProviderLogEvent>>,
}

impl ProviderLogger for RecordingLogger {
    fn request_started(&self, _event: &ProviderLogEvent) {}

    fn request_finished(&self, event: &ProviderLogEvent) {
        self.finished.lock().unwrap().push(event.clone());
    }
}

fn logger() -> SharedProviderLogger {
    TracingProviderLogger::shared(Default::default())
}

fn api_provider(server: &MockServer, config: ProviderConfig) -> ApiProvider {
    ApiProvider::new(
        "openai",
        &config.with_base_url(format!("{}/v1", server.uri())),
        logger(),
    )
    .expect("provider should build")
}

fn completion(content: &str) -> serde_json::Value {
    json!({
        "choices": [{
            "message": { "role": "assistant", "content": content },
            "finish_reason": "stop"
        }],
        "usage": { "prompt_tokens": 12, "completion_tokens": 3, "total_tokens": 15 }
    })
}

#[tokio::test]
async fn test_chat_sends_bearer_key_and_maps_response() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .and(header("authorization", "Bearer sk-test"))
        .and(body_partial_json(json!({ "model": "gpt-test" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(completion("Hello!")))
        .expect(1)
        .mount(&server)
        .await;

    let recorder = Arc::new(RecordingLogger::default());
    let provider = ApiProvider::new(
        "openai",
        &ProviderConfig::api(format!("{}/v1/", server.uri()), "gpt-test").with_api_key("sk-test"),
        recorder.clone(),
    )
    .unwrap();

    let response = provider
        .chat(&[Message::user("hi")], &ChatOptions::default())
        .await
        .unwrap();

    assert_eq!(response.content, "Hello!");
    assert_eq!(response.finish_reason, FinishReason::Stop);
    assert_eq!(response.usage.unwrap().total_tokens, 15);

    let finished = recorder.finished.lock().unwrap();
    assert_eq!(finished.len(), 1);
    assert_eq!(finished[0].operation, Operation::Chat);
    assert_eq!(finished[0].success, Some(true));
    assert_eq!(finished[0].provider_id, "openai");
}

#[tokio::test]
async fn test_native_tool_calls_are_mapped() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "choices": [{
                "message": {
                    "content": null,
                    "tool_calls": [{
                        "id": "call_1",
                        "type": "function",
                        "function": { "name": "get_weather", "arguments": "{\"city\":\"Paris\"}" }
                    }]
                },
                "finish_reason": "tool_calls"
            }]
        })))
        .mount(&server)
        .await;

    let provider = api_provider(&server, ProviderConfig::api("", "gpt-test"));
    let options = ChatOptions::default().with_tools(vec![ToolSchema {
        name: "get_weather".to_string(),
        description: "Current weather".to_string(),
        parameters: json!({ "type": "object" }),
    }]);

    let response = provider
        .chat(&[Message::user("weather?")], &options)
        .await
        .unwrap();

    assert_eq!(response.finish_reason, FinishReason::ToolCalls);
    assert_eq!(response.tool_calls.len(), 1);
    assert_eq!(response.tool_calls[0].id, "call_1");
    assert_eq!(response.tool_calls[0].arguments["city"], "Paris");
}

#[tokio::test]
async fn test_rate_limit_is_classified_and_retried() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(429).set_body_string("Too Many Requests"))
        .up_to_n_times(2)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(completion("after backoff")))
        .mount(&server)
        .await;

    let provider = api_provider(&server, ProviderConfig::api("", "gpt-test"));
    let messages = vec![Message::user("hi")];
    let options = ChatOptions::default();

    let first = provider.chat(&messages, &options).await.unwrap_err();
    assert_eq!(first.status(), Some(429));
    assert_eq!(classify(&first), Some(FailoverReason::RateLimit));

    let retry = RetryOptions::default()
        .with_delays(Duration::from_millis(1), Duration::from_millis(10));
    let response = with_retry(|| provider.chat(&messages, &options), retry)
        .await
        .unwrap();
    assert_eq!(response.content, "after backoff");
}

#[tokio::test]
async fn test_auth_failure_is_not_retried() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(401).set_body_string("invalid api key"))
        .expect(1)
        .mount(&server)
        .await;

    let provider = api_provider(&server, ProviderConfig::api("", "gpt-test"));
    let messages = vec![Message::user("hi")];
    let options = ChatOptions::default();

    let err = with_retry(|| provider.chat(&messages, &options), RetryOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(err, ProviderError::Http { status: 401, .. }));
    assert_eq!(classify(&err), Some(FailoverReason::Auth));
}

#[tokio::test]
async fn test_auth_rotation_switches_bearer_key() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .and(header("authorization", "Bearer key-a"))
        .respond_with(ResponseTemplate::new(401).set_body_string("revoked"))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .and(header("authorization", "Bearer key-b"))
        .respond_with(ResponseTemplate::new(200).set_body_json(completion("second key works")))
        .mount(&server)
        .await;

    let provider = api_provider(
        &server,
        ProviderConfig::api("", "gpt-test")
            .with_auth_profile(AuthProfileConfig {
                api_key: "key-a".to_string(),
                label: Some("a".to_string()),
                cooldown_minutes: None,
            })
            .with_auth_profile(AuthProfileConfig {
                api_key: "key-b".to_string(),
                label: Some("b".to_string()),
                cooldown_minutes: None,
            }),
    );
    let messages = vec![Message::user("hi")];
    let options = ChatOptions::default();

    let err = provider.chat(&messages, &options).await.unwrap_err();
    assert_eq!(classify(&err), Some(FailoverReason::Auth));

    provider.mark_auth_failure();
    let response = provider.chat(&messages, &options).await.unwrap();
    assert_eq!(response.content, "second key works");
    assert_eq!(provider.auth_profiles().cursor(), 1);
}

#[tokio::test]
async fn test_embeddings_preserve_input_order() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/embeddings"))
        .and(body_partial_json(json!({ "model": "embed-small" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": [
                { "index": 1, "embedding": [0.75, 1.5] },
                { "index": 0, "embedding": [0.25, 0.5] }
            ]
        })))
        .mount(&server)
        .await;

    let mut config = ProviderConfig::api("", "gpt-test");
    config.embedding_model = Some("embed-small".to_string());
    let provider = api_provider(&server, config);

    let vectors = provider
        .embeddings(&["first".to_string(), "second".to_string()])
        .await
        .unwrap();
    assert_eq!(vectors, vec![vec![0.25, 0.5], vec![0.75, 1.5]]);
}

#[tokio::test]
async fn test_health_probes_models_endpoint() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/models"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "data": [] })))
        .mount(&server)
        .await;

    let provider = api_provider(&server, ProviderConfig::api("", "gpt-test"));
    assert!(provider.health().await);

    let down = ApiProvider::new(
        "dead",
        &ProviderConfig::api("http://127.0.0.1:9", "gpt-test"),
        logger(),
    )
    .unwrap();
    assert!(!down.health().await);
}

#[tokio::test]
async fn test_refused_connection_ignores_digits_in_url() {
    // Nothing listens on this port; its digits contain 401 and 403.
    let provider = ApiProvider::new(
        "refused",
        &ProviderConfig::api("http://127.0.0.1:40311/v1", "gpt-test"),
        logger(),
    )
    .unwrap();

    let err = provider
        .chat(&[Message::user("hi")], &ChatOptions::default())
        .await
        .unwrap_err();

    assert!(matches!(err, ProviderError::Network { .. }), "got {err:?}");
    assert!(!err.to_string().contains("40311"));
    assert_ne!(classify(&err), Some(FailoverReason::Auth));
    assert!(is_retryable_error(&err));
}

#[tokio::test]
async fn test_local_provider_chat_and_embeddings() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/chat"))
        .and(body_partial_json(json!({ "model": "llama3", "stream": false })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "message": { "role": "assistant", "content": "local answer" },
            "done_reason": "stop",
            "prompt_eval_count": 7,
            "eval_count": 2
        })))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/embeddings"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "embedding": [1.0, 2.0] })))
        .expect(2)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/tags"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "models": [] })))
        .mount(&server)
        .await;

    let provider = LocalProvider::new(
        "ollama",
        &ProviderConfig::local_network("llama3").with_base_url(server.uri()),
        logger(),
    )
    .unwrap();

    let response = provider
        .chat(&[Message::user("hi")], &ChatOptions::default())
        .await
        .unwrap();
    assert_eq!(response.content, "local answer");
    let usage = response.usage.unwrap();
    assert_eq!((usage.prompt_tokens, usage.completion_tokens), (7, 2));

    let vectors = provider
        .embeddings(&["a".to_string(), "b".to_string()])
        .await
        .unwrap();
    assert_eq!(vectors.len(), 2);
    assert!(provider.health().await);
}

#[tokio::test]
async fn test_local_provider_server_error_keeps_status() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/chat"))
        .respond_with(ResponseTemplate::new(503).set_body_string("model loading"))
        .mount(&server)
        .await;

    let provider = LocalProvider::new(
        "ollama",
        &ProviderConfig::local_network("llama3").with_base_url(server.uri()),
        logger(),
    )
    .unwrap();

    let err = provider
        .chat(&[Message::user("hi")], &ChatOptions::default())
        .await
        .unwrap_err();
    assert_eq!(err.status(), Some(503));
    assert!(err.to_string().contains("model loading"));
}
