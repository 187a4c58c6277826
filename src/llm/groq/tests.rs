use super::*;
use crate::config::LlmConfig;
use crate::llm::Role;
use serde_json::json;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn client_for(server: &MockServer, model: &str) -> GroqClient {
    let config = Config {
        llm: LlmConfig {
            base_url: format!("{}/openai/v1/", server.uri()),
            model: model.to_string(),
            api_key_env: "THINKBOOK_TEST_UNSET_KEY".to_string(),
        },
        ..Config::default()
    };
    GroqClient::new(&config)
        .with_api_key("test-key")
        .with_retry_policy(RetryPolicy {
            max_attempts: 2,
            initial_backoff: Duration::from_millis(1),
            timeout: Duration::from_secs(5),
        })
}

fn request() -> CompletionRequest {
    CompletionRequest {
        messages: vec![Message::system("be brief"), Message::user("hello")],
        temperature: 0.4,
        max_tokens: 64,
    }
}

fn completion(content: &str) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({
        "choices": [{"message": {"role": "assistant", "content": content}}]
    }))
}

#[tokio::test]
async fn completes_with_configured_model() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/openai/v1/chat/completions"))
        .and(header("Authorization", "Bearer test-key"))
        .and(body_partial_json(json!({
            "model": "llama-3.1-8b-instant",
            "max_tokens": 64,
            "messages": [{"role": "system", "content": "be brief"}, {"role": "user", "content": "hello"}]
        })))
        .respond_with(completion("  Hi there!\n"))
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(&server, "llama-3.1-8b-instant");
    let reply = client.complete(&request()).await.expect("should complete");
    assert_eq!(reply, "Hi there!");
}

#[tokio::test]
async fn auto_model_is_selected_once() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/openai/v1/models"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": [
                {"id": "llama-3.3-70b-versatile"},
                {"id": "llama-3.1-8b-instant"}
            ]
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/openai/v1/chat/completions"))
        .and(body_partial_json(json!({"model": "llama-3.1-8b-instant"})))
        .respond_with(completion("ok"))
        .expect(2)
        .mount(&server)
        .await;

    let client = client_for(&server, "auto");
    assert_eq!(client.complete(&request()).await.expect("first call"), "ok");
    assert_eq!(client.complete(&request()).await.expect("second call"), "ok");
    assert_eq!(
        client.resolve_model().await.expect("cached model"),
        "llama-3.1-8b-instant"
    );
}

#[tokio::test]
async fn missing_api_key_is_model_unavailable() {
    let server = MockServer::start().await;
    let config = Config {
        llm: LlmConfig {
            base_url: server.uri(),
            model: "some-model".to_string(),
            api_key_env: "THINKBOOK_TEST_UNSET_KEY".to_string(),
        },
        ..Config::default()
    };
    let client = GroqClient::new(&config);

    let error = client
        .complete(&request())
        .await
        .expect_err("no key configured");
    assert!(matches!(error, ThinkbookError::ModelUnavailable(_)));
    assert!(error.to_string().contains("THINKBOOK_TEST_UNSET_KEY"));
}

#[tokio::test]
async fn server_failure_is_retried_then_reported() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/openai/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(502))
        .expect(2)
        .mount(&server)
        .await;

    let client = client_for(&server, "some-model");
    let result = client.complete(&request()).await;
    assert!(matches!(result, Err(ThinkbookError::ModelUnavailable(_))));
}

#[tokio::test]
async fn unauthorized_is_not_retried() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/openai/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(401))
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(&server, "some-model");
    assert!(client.complete(&request()).await.is_err());
}

#[tokio::test]
async fn empty_choices_are_rejected() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/openai/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"choices": []})))
        .mount(&server)
        .await;

    let client = client_for(&server, "some-model");
    let result = client.complete(&request()).await;
    assert!(matches!(result, Err(ThinkbookError::ModelUnavailable(_))));
}

#[test]
fn request_body_shape() {
    let messages = vec![Message::assistant("prior answer")];
    let body = ChatCompletionBody {
        model: "m",
        messages: &messages,
        temperature: 0.5,
        max_tokens: 10,
    };
    let value = serde_json::to_value(&body).expect("should serialize");
    assert_eq!(value["messages"][0]["role"], "assistant");
    assert_eq!(value["max_tokens"], 10);
    assert_eq!(messages[0].role, Role::Assistant);
}
