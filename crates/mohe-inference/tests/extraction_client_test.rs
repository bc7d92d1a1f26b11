//! Integration tests for the keyword extraction HTTP client.
//!
//! This test validates:
//! - Request body carries text, context type and optional MBTI tag
//! - Successful responses parse into vector and keywords
//! - Server errors and connection failures are transient
//! - Client errors are not transient
//! - Vectors of the wrong length are rejected

use mohe_inference::{
    Error, ExtractionConfig, ExtractionContext, HttpKeywordExtractor, KeywordExtractor,
};
use serde_json::json;
use wiremock::matchers::{body_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn response_body(dimension: usize) -> serde_json::Value {
    json!({
        "vector": vec![0.1f32; dimension],
        "selected_keywords": [
            {"keyword_id": 16, "keyword": "quiet", "confidence": 0.9},
            {"keyword_id": 24, "keyword": "cozy", "confidence": 0.6}
        ],
        "model_name": "kw-extractor",
        "model_version": "3"
    })
}

fn client(server: &MockServer) -> HttpKeywordExtractor {
    HttpKeywordExtractor::new(
        ExtractionConfig::default()
            .with_base_url(server.uri())
            .with_timeout_secs(5),
    )
    .expect("Failed to create client")
}

#[tokio::test]
async fn test_place_extraction_parses_response() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/extract"))
        .and(body_json(json!({
            "text": "quiet cafe",
            "context_type": "place"
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(response_body(100)))
        .expect(1)
        .mount(&server)
        .await;

    let result = client(&server)
        .extract("quiet cafe", &ExtractionContext::Place)
        .await
        .unwrap();

    assert_eq!(result.vector.len(), 100);
    assert_eq!(result.selected_keywords.len(), 2);
    assert_eq!(result.selected_keywords[0].keyword_id, 16);
    assert_eq!(result.model_name, "kw-extractor");
    assert_eq!(result.model_version.as_deref(), Some("3"));
}

#[tokio::test]
async fn test_user_extraction_sends_mbti() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/extract"))
        .and(body_json(json!({
            "text": "likes calm places",
            "context_type": "user",
            "mbti": "INFP"
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(response_body(100)))
        .expect(1)
        .mount(&server)
        .await;

    let context = ExtractionContext::User {
        mbti: Some("INFP".to_string()),
    };
    let result = client(&server)
        .extract("likes calm places", &context)
        .await
        .unwrap();
    assert_eq!(result.vector.len(), 100);
}

#[tokio::test]
async fn test_server_error_is_transient() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/extract"))
        .respond_with(ResponseTemplate::new(503).set_body_string("loading model"))
        .mount(&server)
        .await;

    let err = client(&server)
        .extract("text", &ExtractionContext::Place)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Embedding(_)));
    assert!(err.is_transient());
}

#[tokio::test]
async fn test_client_error_is_not_transient() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/extract"))
        .respond_with(ResponseTemplate::new(422).set_body_string("bad context"))
        .mount(&server)
        .await;

    let err = client(&server)
        .extract("text", &ExtractionContext::Place)
        .await
        .unwrap_err();
    assert!(!err.is_transient());
}

#[tokio::test]
async fn test_wrong_dimension_rejected() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/extract"))
        .respond_with(ResponseTemplate::new(200).set_body_json(response_body(64)))
        .mount(&server)
        .await;

    let err = client(&server)
        .extract("text", &ExtractionContext::Place)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        Error::DimensionMismatch {
            left: 64,
            right: 100
        }
    ));
}

#[tokio::test]
async fn test_unreachable_service_is_transient() {
    // Nothing listens on the discard port.
    let extractor = HttpKeywordExtractor::new(
        ExtractionConfig::default()
            .with_base_url("http://127.0.0.1:9")
            .with_timeout_secs(2),
    )
    .unwrap();

    let err = extractor
        .extract("text", &ExtractionContext::Place)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Embedding(_)));
    assert!(!extractor.health_check().await.unwrap());
}

#[tokio::test]
async fn test_empty_text_rejected_without_request() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(response_body(100)))
        .expect(0)
        .mount(&server)
        .await;

    let err = client(&server)
        .extract("   ", &ExtractionContext::Place)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::InvalidInput(_)));
}
