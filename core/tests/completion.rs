//! End-to-end coverage of the streaming completion client against a mock
//! chat-completions endpoint.

use std::path::PathBuf;
use std::sync::Arc;

use pretty_assertions::assert_eq;
use quill_core::CompletionEvent;
use quill_core::CompletionRequest;
use quill_core::ModelClient;
use quill_core::StoryContext;
use quill_core::config::Config;
use quill_core::error::QuillErr;
use wiremock::Mock;
use wiremock::MockServer;
use wiremock::ResponseTemplate;
use wiremock::matchers::body_partial_json;
use wiremock::matchers::header;
use wiremock::matchers::method;
use wiremock::matchers::path;

fn test_config(base_url: String) -> Config {
    Config {
        quill_home: PathBuf::from("/tmp/quill-test-home"),
        model: "test-model".to_string(),
        base_url,
        api_key: Some("sk-test".to_string()),
        temperature: 0.7,
        prediction_length: 50,
        draft_path: None,
    }
}

fn test_request(draft: &str) -> CompletionRequest {
    let story = StoryContext {
        style: "fast-paced adventure".to_string(),
        outline: "a voyage west".to_string(),
        ..Default::default()
    };
    CompletionRequest::new(&story, 50, draft)
}

fn sse_body(fragments: &[&str]) -> String {
    let mut body = String::new();
    for fragment in fragments {
        let frame = serde_json::json!({
            "choices": [{"delta": {"content": fragment}}]
        });
        body.push_str(&format!("data: {frame}\n\n"));
    }
    body.push_str("data: [DONE]\n\n");
    body
}

#[tokio::test]
async fn streams_cumulative_snapshots() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .and(header("authorization", "Bearer sk-test"))
        .and(body_partial_json(serde_json::json!({
            "model": "test-model",
            "stream": true,
        })))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_raw(sse_body(&["Once", " upon", " a time"]), "text/event-stream"),
        )
        .expect(1)
        .mount(&server)
        .await;

    let config = Arc::new(test_config(format!("{}/v1", server.uri())));
    let client = ModelClient::new(config);

    let mut stream = client
        .stream_completion(&test_request("She opened the hatch and"))
        .await
        .expect("stream opens");

    let mut events = Vec::new();
    while let Some(event) = stream.next().await {
        events.push(event.expect("event"));
    }

    assert_eq!(
        events,
        vec![
            CompletionEvent::Delta {
                content: "Once".to_string()
            },
            CompletionEvent::Delta {
                content: "Once upon".to_string()
            },
            CompletionEvent::Delta {
                content: "Once upon a time".to_string()
            },
            CompletionEvent::Completed {
                content: "Once upon a time".to_string()
            },
        ]
    );
}

#[tokio::test]
async fn request_carries_system_and_user_messages() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .and(body_partial_json(serde_json::json!({
            "messages": [
                {"role": "system"},
                {"role": "user"},
            ]
        })))
        .respond_with(
            ResponseTemplate::new(200).set_body_raw(sse_body(&["ok"]), "text/event-stream"),
        )
        .expect(1)
        .mount(&server)
        .await;

    let config = Arc::new(test_config(format!("{}/v1", server.uri())));
    let client = ModelClient::new(config);

    let mut stream = client
        .stream_completion(&test_request("draft text"))
        .await
        .expect("stream opens");
    while stream.next().await.is_some() {}
}

#[tokio::test]
async fn non_success_status_fails_before_streaming() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(401).set_body_string("invalid api key"))
        .expect(1)
        .mount(&server)
        .await;

    let config = Arc::new(test_config(format!("{}/v1", server.uri())));
    let client = ModelClient::new(config);

    let err = client
        .stream_completion(&test_request("draft"))
        .await
        .expect_err("401 must fail");

    match err {
        QuillErr::UnexpectedStatus { status, body } => {
            assert_eq!(status.as_u16(), 401);
            assert_eq!(body, "invalid api key");
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn missing_api_key_never_reaches_the_network() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let mut config = test_config(format!("{}/v1", server.uri()));
    config.api_key = None;
    let client = ModelClient::new(Arc::new(config));

    let err = client
        .stream_completion(&test_request("draft"))
        .await
        .expect_err("missing key must fail");
    assert!(matches!(err, QuillErr::MissingConfig("api_key")));
}
