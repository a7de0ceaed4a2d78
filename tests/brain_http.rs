use std::time::Duration;

use serde_json::{Value, json};
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use web_navigator::brain::{ChatBackend, ChatClient, MAX_CONVERSATION_MESSAGES};
use web_navigator::config::ModelSettings;
use web_navigator::error::ModelError;
use web_navigator::LanguageModel;

fn settings(server: &MockServer, route: &str, backend: ChatBackend) -> ModelSettings {
    ModelSettings {
        api_url: format!("{}{}", server.uri(), route),
        model: "test-model".into(),
        backend,
        api_key: None,
        request_timeout: Duration::from_secs(5),
    }
}

/// The client is blocking, so every exchange runs on the blocking pool.
async fn ask(
    settings: ModelSettings,
    prompts: Vec<&'static str>,
) -> Vec<Result<String, ModelError>> {
    tokio::task::spawn_blocking(move || {
        let mut client = ChatClient::new(settings).unwrap();
        prompts.into_iter().map(|p| client.complete(p)).collect()
    })
    .await
    .unwrap()
}

async fn request_bodies(server: &MockServer) -> Vec<Value> {
    server
        .received_requests()
        .await
        .unwrap_or_default()
        .iter()
        .map(|r| serde_json::from_slice(&r.body).unwrap())
        .collect()
}

#[tokio::test(flavor = "multi_thread")]
async fn ollama_reply_is_read_from_message_content() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/chat"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "model": "test-model",
            "message": {"role": "assistant", "content": "  [{\"action\": \"click\", \"target\": \"#go\"}]\n"},
            "done": true
        })))
        .expect(1)
        .mount(&server)
        .await;

    let replies = ask(settings(&server, "/api/chat", ChatBackend::Ollama), vec!["next?"]).await;

    assert_eq!(
        replies[0].as_deref().unwrap(),
        r##"[{"action": "click", "target": "#go"}]"##
    );
    let body = &request_bodies(&server).await[0];
    assert_eq!(body["stream"], false);
    assert_eq!(body["model"], "test-model");
    assert_eq!(body["messages"][0]["role"], "system");
    assert_eq!(body["messages"][1]["content"], "next?");
}

#[tokio::test(flavor = "multi_thread")]
async fn openai_reply_is_read_from_choices() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .and(header("authorization", "Bearer sk-test"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "choices": [{"message": {"role": "assistant", "content": "{\"action\": \"navigate\", \"target\": \"https://example.com\"}"}}]
        })))
        .mount(&server)
        .await;

    let mut settings = settings(&server, "/v1/chat/completions", ChatBackend::OpenAi);
    settings.api_key = Some("sk-test".into());
    let replies = ask(settings, vec!["where to?"]).await;

    assert!(replies[0].as_deref().unwrap().contains("https://example.com"));
}

#[tokio::test(flavor = "multi_thread")]
async fn api_errors_carry_status_and_message() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({
            "error": {"message": "Invalid API key", "type": "invalid_request_error"}
        })))
        .mount(&server)
        .await;

    let settings = settings(&server, "/v1/chat/completions", ChatBackend::OpenAi);
    let replies = ask(settings, vec!["hi"]).await;

    match &replies[0] {
        Err(ModelError::Api { status, message }) => {
            assert_eq!(*status, 401);
            assert_eq!(message, "Invalid API key");
        }
        other => panic!("expected an API error, got {other:?}"),
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn blank_content_is_an_empty_response() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "message": {"role": "assistant", "content": "   "}
        })))
        .mount(&server)
        .await;

    let replies = ask(settings(&server, "/api/chat", ChatBackend::Ollama), vec!["hi"]).await;

    assert!(matches!(replies[0], Err(ModelError::EmptyResponse)));
}

#[tokio::test(flavor = "multi_thread")]
async fn non_json_success_body_is_malformed() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>gateway</html>"))
        .mount(&server)
        .await;

    let replies = ask(settings(&server, "/api/chat", ChatBackend::Ollama), vec!["hi"]).await;

    assert!(matches!(replies[0], Err(ModelError::Malformed(_))));
}

#[tokio::test(flavor = "multi_thread")]
async fn conversation_is_replayed_and_bounded() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "message": {"role": "assistant", "content": "ok"}
        })))
        .mount(&server)
        .await;

    let prompts = vec!["one", "two", "three", "four", "five", "six", "seven"];
    let replies = ask(settings(&server, "/api/chat", ChatBackend::Ollama), prompts).await;
    assert!(replies.iter().all(|r| r.is_ok()));

    let bodies = request_bodies(&server).await;
    let second = bodies[1]["messages"].as_array().unwrap();
    assert_eq!(second.len(), 4);
    assert_eq!(second[1]["content"], "one");
    assert_eq!(second[2]["role"], "assistant");

    // system + remembered messages + the new prompt
    let last = bodies[6]["messages"].as_array().unwrap();
    assert_eq!(last.len(), MAX_CONVERSATION_MESSAGES + 2);
    assert_eq!(last[0]["role"], "system");
    assert_eq!(last.last().unwrap()["content"], "seven");
}
