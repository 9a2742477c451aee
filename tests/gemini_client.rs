//! Generation client and fallback pipeline against a mock generateContent API.

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use shopassist::pipeline::gemini::GeminiClient;
use shopassist::pipeline::{
    AttemptOutcome, GenerationError, GenerativeClient, ModelPipeline, Outcome, PipelineError,
};
use shopassist::validation::validate;

fn text_reply(text: &str) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({
        "candidates": [{
            "content": { "role": "model", "parts": [{ "text": text }] },
            "finishReason": "STOP"
        }]
    }))
}

fn client(server: &MockServer) -> GeminiClient {
    GeminiClient::new(&server.uri(), Some("test-key".into()), Some(Duration::from_secs(5))).unwrap()
}

#[tokio::test]
async fn test_request_shape_and_api_key() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1beta/models/m1:generateContent"))
        .and(header("x-goog-api-key", "test-key"))
        .and(body_partial_json(json!({
            "contents": [{ "role": "user", "parts": [{ "text": "laptop" }] }]
        })))
        .respond_with(text_reply("Consider X"))
        .expect(1)
        .mount(&server)
        .await;

    let text = tokio_test::assert_ok!(client(&server).generate("m1", "laptop").await);
    assert_eq!(text, "Consider X");
}

#[tokio::test]
async fn test_non_2xx_is_status_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(429).set_body_string("quota exhausted"))
        .mount(&server)
        .await;

    let err = client(&server).generate("m1", "laptop").await.unwrap_err();
    assert_eq!(
        err,
        GenerationError::Status {
            status: 429,
            body: "quota exhausted".into()
        }
    );
}

#[tokio::test]
async fn test_blocked_prompt_is_failure() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "promptFeedback": { "blockReason": "SAFETY" }
        })))
        .mount(&server)
        .await;

    let err = client(&server).generate("m1", "laptop").await.unwrap_err();
    assert_eq!(err, GenerationError::Blocked("SAFETY".into()));
}

#[tokio::test]
async fn test_pipeline_falls_back_once_per_model() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1beta/models/m1:generateContent"))
        .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/v1beta/models/m2:generateContent"))
        .respond_with(text_reply("Consider X"))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/v1beta/models/m3:generateContent"))
        .respond_with(text_reply("never asked"))
        .expect(0)
        .mount(&server)
        .await;

    let pipeline = ModelPipeline::new(
        vec!["m1".into(), "m2".into(), "m3".into()],
        Arc::new(client(&server)),
    );
    let query = validate("best laptop under $500").unwrap();

    match pipeline.run(&query).await.unwrap() {
        Outcome::Success {
            model,
            text,
            attempts,
        } => {
            assert_eq!(model, "m2");
            assert_eq!(text, "Consider X");
            assert_eq!(attempts.len(), 2);
            assert!(matches!(attempts[0].outcome, AttemptOutcome::Failure(_)));
        }
        other => panic!("expected success, got {:?}", other),
    }
}

#[tokio::test]
async fn test_pipeline_reports_last_error_when_all_fail() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(503).set_body_string("overloaded"))
        .expect(2)
        .mount(&server)
        .await;

    let pipeline = ModelPipeline::new(vec!["m1".into(), "m2".into()], Arc::new(client(&server)));
    let query = validate("laptop").unwrap();

    let err = pipeline.invoke(&query).await.unwrap_err();
    let PipelineError::AllModelsFailed { ref attempts } = err else {
        panic!("expected AllModelsFailed, got {:?}", err);
    };
    assert_eq!(attempts.len(), 2);
    assert_eq!(err.last_attempt().unwrap().model, "m2");
    assert!(err.to_string().contains("m2"));
}
