//! Gemini client tests against a mock API.

use std::time::Duration;

use chrono::Utc;
use serde_json::json;
use wiremock::matchers::{body_string_contains, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use resto_insight::{
    GeminiConfig, GeminiInsightClient, InsightAnalyzer, InsightError, InsightRequest,
};
use resto_models::{Alert, AlertType, Severity};

fn client(server: &MockServer, models: &[&str]) -> GeminiInsightClient {
    let mut config = GeminiConfig::new("test-key");
    config.base_url = server.uri();
    config.models = models.iter().map(|m| m.to_string()).collect();
    config.request_timeout = Duration::from_secs(2);
    GeminiInsightClient::new(config).unwrap()
}

fn request() -> InsightRequest {
    InsightRequest {
        alert: Alert::new(
            2,
            AlertType::GuestAngry,
            Severity::Urgent,
            "Guest showing sustained anger.",
            Utc::now(),
        ),
        window: Vec::new(),
        table_sentiment: None,
    }
}

fn answer(text: &str) -> serde_json::Value {
    json!({"candidates": [{"content": {"parts": [{"text": text}]}}]})
}

#[tokio::test]
async fn test_analyze_parses_fenced_answer() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/models/primary:generateContent"))
        .and(query_param("key", "test-key"))
        .and(body_string_contains("Table 02: Angry Guest"))
        .respond_with(ResponseTemplate::new(200).set_body_json(answer(
            "```json\n{\"root_cause\": \"Order delayed\", \"ai_recommendation\": \"Apologize\", \"urgency_score\": 8}\n```",
        )))
        .expect(1)
        .mount(&server)
        .await;

    let insight = client(&server, &["primary"]).analyze(&request()).await.unwrap();
    assert_eq!(insight.root_cause, "Order delayed");
    assert_eq!(insight.recommendation, "Apologize");
    assert_eq!(insight.urgency, 8);
}

#[tokio::test]
async fn test_analyze_falls_back_to_next_model() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/models/primary:generateContent"))
        .respond_with(ResponseTemplate::new(503))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/models/backup:generateContent"))
        .respond_with(ResponseTemplate::new(200).set_body_json(answer(
            r#"{"root_cause": "Busy floor", "ai_recommendation": "Send help", "urgency_score": 6}"#,
        )))
        .expect(1)
        .mount(&server)
        .await;

    let insight = client(&server, &["primary", "backup"])
        .analyze(&request())
        .await
        .unwrap();
    assert_eq!(insight.root_cause, "Busy floor");
}

#[tokio::test]
async fn test_analyze_reports_failure_when_all_models_fail() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"candidates": []})))
        .mount(&server)
        .await;

    let err = client(&server, &["a", "b"]).analyze(&request()).await.unwrap_err();
    assert!(matches!(err, InsightError::AllModelsFailed(_)));
    assert!(err.is_retryable());
}
