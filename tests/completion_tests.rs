//! Integration tests for the completion client against a mock service

use serde_json::json;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use vmpilot::completion::{Completer, CompletionClient, CompletionError, Sampling};
use vmpilot::config::Engine;

fn client_for(server: &MockServer) -> CompletionClient {
    CompletionClient::new(
        format!("{}/v1", server.uri()),
        "sk-test",
        Engine::CodeDavinci001,
        Sampling {
            temperature: 0.5,
            frequency_penalty: 1.0,
        },
    )
}

#[tokio::test]
async fn test_returns_first_choice_trimmed() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/completions"))
        .and(header("authorization", "Bearer sk-test"))
        .and(body_partial_json(json!({
            "model": "code-davinci-001",
            "prompt": "user@host:~$ ",
            "temperature": 0.5,
            "frequency_penalty": 1.0,
            "top_p": 1.0,
            "max_tokens": 128,
            "stop": "\n",
            "echo": false
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "cmpl-1",
            "object": "text_completion",
            "choices": [
                {"text": "uname -a  \t", "index": 0, "finish_reason": "stop"},
                {"text": "ls", "index": 1, "finish_reason": "stop"}
            ]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let command = client_for(&server).complete("user@host:~$ ").await.unwrap();
    assert_eq!(command, "uname -a");
}

#[tokio::test]
async fn test_api_error_is_returned() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/completions"))
        .respond_with(ResponseTemplate::new(429).set_body_string("rate limited"))
        .expect(1)
        .mount(&server)
        .await;

    let err = client_for(&server).complete("$ ").await.unwrap_err();
    match err {
        CompletionError::Api { status, body } => {
            assert_eq!(status, 429);
            assert_eq!(body, "rate limited");
        }
        other => panic!("expected Api error, got {other:?}"),
    }
}

#[tokio::test]
async fn test_empty_choices_is_an_error() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"choices": []})))
        .mount(&server)
        .await;

    let err = client_for(&server).complete("$ ").await.unwrap_err();
    assert!(matches!(err, CompletionError::NoChoices));
}

#[tokio::test]
async fn test_malformed_body_is_parse_error() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
        .mount(&server)
        .await;

    let err = client_for(&server).complete("$ ").await.unwrap_err();
    assert!(matches!(err, CompletionError::Parse(_)));
}

#[tokio::test]
async fn test_trailing_slash_in_base_url() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/completions"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"choices": [{"text": "id\n"}]})),
        )
        .expect(1)
        .mount(&server)
        .await;

    let client = CompletionClient::new(
        format!("{}/v1/", server.uri()),
        "sk-test",
        Engine::CodeCushman001,
        Sampling::default(),
    );
    assert_eq!(client.create_completion("$ ").await.unwrap(), "id");
}

#[tokio::test]
async fn test_unreachable_service_is_request_error() {
    let server = MockServer::start().await;
    let base = format!("{}/v1", server.uri());
    drop(server);

    let client = CompletionClient::new(base, "sk-test", Engine::default(), Sampling::default());
    let err = client.complete("$ ").await.unwrap_err();
    assert!(matches!(err, CompletionError::Request(_)));
}
