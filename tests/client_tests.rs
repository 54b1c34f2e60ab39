//! HTTP-level tests for the provider clients against a local mock server.

use serde_json::json;
use std::time::Duration;
use transflow::translate::{GeminiClient, TranslateRequest, YandexClient};
use transflow::{ErrorKind, TranslateError, TranslationClient};
use wiremock::matchers::{
    body_json, body_string_contains, header, method, path, query_param_is_missing,
};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn request(text: &str, target: &str, source: Option<&str>) -> TranslateRequest {
    TranslateRequest {
        text: text.to_string(),
        target_language_code: target.to_string(),
        source_language_code: source.map(str::to_string),
    }
}

// ============================================================================
// Yandex
// ============================================================================

mod yandex_tests {
    use super::*;

    fn client(server: &MockServer) -> YandexClient {
        YandexClient::new("test-key".to_string(), Duration::from_secs(5))
            .unwrap()
            .with_base_url(server.uri())
    }

    async fn respond_with_status(status: u16, body: serde_json::Value) -> TranslateError {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/translate"))
            .respond_with(ResponseTemplate::new(status).set_body_json(body))
            .mount(&server)
            .await;

        client(&server)
            .translate(&request("Hello", "ru", Some("en")))
            .await
            .unwrap_err()
    }

    #[tokio::test]
    async fn test_translate_success() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/translate"))
            .and(header("Authorization", "Api-Key test-key"))
            .and(body_json(json!({
                "texts": ["Hello"],
                "targetLanguageCode": "ru",
                "sourceLanguageCode": "en"
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "translations": [{"text": "Привет"}]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let response = client(&server)
            .translate(&request("Hello", "ru", Some("en")))
            .await
            .unwrap();

        assert_eq!(response.translated_text, "Привет");
        assert!(response.detected_language_code.is_none());
    }

    #[tokio::test]
    async fn test_translate_sends_folder_and_reads_detection() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/translate"))
            .and(body_string_contains("\"folderId\":\"b1g-folder\""))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "translations": [{"text": "Hello", "detectedLanguageCode": "de"}]
            })))
            .mount(&server)
            .await;

        let response = client(&server)
            .with_folder_id("b1g-folder")
            .translate(&request("Hallo", "en", None))
            .await
            .unwrap();

        assert_eq!(response.detected_language_code.as_deref(), Some("de"));
    }

    #[tokio::test]
    async fn test_detect() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/detect"))
            .and(body_json(json!({"text": "Bonjour"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"languageCode": "fr"})))
            .mount(&server)
            .await;

        let detected = client(&server).detect("Bonjour").await.unwrap();
        assert_eq!(detected.as_deref(), Some("fr"));
    }

    #[tokio::test]
    async fn test_detect_empty_code_is_none() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/detect"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"languageCode": ""})))
            .mount(&server)
            .await;

        assert!(client(&server).detect("...").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_empty_translations_array() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/translate"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"translations": []})))
            .mount(&server)
            .await;

        let err = client(&server)
            .translate(&request("Hello", "ru", None))
            .await
            .unwrap_err();
        assert_eq!(err, TranslateError::EmptyResponse);
    }

    #[tokio::test]
    async fn test_status_mapping() {
        let err = respond_with_status(401, json!({"message": "bad key"})).await;
        assert_eq!(err.kind(), ErrorKind::InvalidCredential);

        let err = respond_with_status(403, json!({})).await;
        assert_eq!(err.kind(), ErrorKind::InvalidCredential);

        let err = respond_with_status(429, json!({})).await;
        assert_eq!(err.to_string(), "Rate limit exceeded");

        let err = respond_with_status(503, json!({})).await;
        assert_eq!(err.to_string(), "Yandex API service unavailable");

        let err = respond_with_status(400, json!({"code": 3, "message": "bad language"})).await;
        assert_eq!(err.to_string(), "Yandex API error: bad language");
    }

    #[tokio::test]
    async fn test_connection_refused_is_network_error() {
        let client = YandexClient::new("test-key".to_string(), Duration::from_secs(5))
            .unwrap()
            .with_base_url("http://127.0.0.1:1");

        let err = client
            .translate(&request("Hello", "ru", None))
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "Network error: No response from Yandex API");
    }

    #[tokio::test]
    async fn test_timeout_is_network_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/translate"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"translations": [{"text": "late"}]}))
                    .set_delay(Duration::from_secs(2)),
            )
            .mount(&server)
            .await;

        let client = YandexClient::new("test-key".to_string(), Duration::from_millis(200))
            .unwrap()
            .with_base_url(server.uri());

        let err = client
            .translate(&request("Hello", "ru", None))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NetworkError);
    }
}

// ============================================================================
// Gemini
// ============================================================================

mod gemini_tests {
    use super::*;

    const GENERATE_PATH: &str = "/models/gemini-2.0-flash:generateContent";

    fn client(server: &MockServer) -> GeminiClient {
        GeminiClient::new("test-key".to_string(), Duration::from_secs(5))
            .unwrap()
            .with_base_url(server.uri())
    }

    fn answer(text: &str) -> serde_json::Value {
        json!({
            "candidates": [{"content": {"parts": [{"text": text}]}}]
        })
    }

    async fn mount_answer(server: &MockServer, text: &str) {
        Mock::given(method("POST"))
            .and(path(GENERATE_PATH))
            .and(header("x-goog-api-key", "test-key"))
            .respond_with(ResponseTemplate::new(200).set_body_json(answer(text)))
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn test_translate_with_source() {
        let server = MockServer::start().await;
        mount_answer(&server, "  Привет\n").await;

        let response = client(&server)
            .translate(&request("Hello", "ru", Some("en")))
            .await
            .unwrap();

        assert_eq!(response.translated_text, "Привет");
        assert_eq!(response.detected_language_code.as_deref(), Some("en"));
    }

    #[tokio::test]
    async fn test_api_key_stays_out_of_the_url() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(GENERATE_PATH))
            .and(header("x-goog-api-key", "test-key"))
            .and(query_param_is_missing("key"))
            .respond_with(ResponseTemplate::new(200).set_body_json(answer("Hallo")))
            .expect(1)
            .mount(&server)
            .await;

        let response = client(&server)
            .translate(&request("Hello", "de", Some("en")))
            .await
            .unwrap();
        assert_eq!(response.translated_text, "Hallo");
    }

    #[tokio::test]
    async fn test_translate_with_inline_detection() {
        let server = MockServer::start().await;
        mount_answer(
            &server,
            "```json\n{\"detectedLanguage\": \"en\", \"translation\": \"Привет\"}\n```",
        )
        .await;

        let response = client(&server)
            .translate(&request("Hello", "ru", None))
            .await
            .unwrap();

        assert_eq!(response.translated_text, "Привет");
        assert_eq!(response.detected_language_code.as_deref(), Some("en"));
    }

    #[tokio::test]
    async fn test_unstructured_detection_answer_falls_back() {
        let server = MockServer::start().await;
        mount_answer(&server, "Привет").await;

        let response = client(&server)
            .translate(&request("Hello", "ru", None))
            .await
            .unwrap();

        assert_eq!(response.translated_text, "Привет");
        assert!(response.detected_language_code.is_none());
    }

    #[tokio::test]
    async fn test_blank_answer_is_empty_response() {
        let server = MockServer::start().await;
        mount_answer(&server, "   ").await;

        let err = client(&server)
            .translate(&request("Hello", "ru", Some("en")))
            .await
            .unwrap_err();
        assert_eq!(err, TranslateError::EmptyResponse);
    }

    #[tokio::test]
    async fn test_missing_candidates_is_empty_response() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(GENERATE_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"candidates": []})))
            .mount(&server)
            .await;

        let err = client(&server)
            .translate(&request("Hello", "ru", Some("en")))
            .await
            .unwrap_err();
        assert_eq!(err, TranslateError::EmptyResponse);
    }

    #[tokio::test]
    async fn test_detect() {
        let server = MockServer::start().await;
        mount_answer(&server, "RU\n").await;
        assert_eq!(
            client(&server).detect("Привет").await.unwrap().as_deref(),
            Some("ru")
        );
    }

    #[tokio::test]
    async fn test_detect_rejects_long_answers() {
        let server = MockServer::start().await;
        mount_answer(&server, "The language is Russian").await;
        assert!(client(&server).detect("Привет").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_bad_api_key_message() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(GENERATE_PATH))
            .respond_with(ResponseTemplate::new(400).set_body_json(json!({
                "error": {"code": 400, "message": "API key not valid. Please pass a valid API key.", "status": "INVALID_ARGUMENT"}
            })))
            .mount(&server)
            .await;

        let err = client(&server)
            .translate(&request("Hello", "ru", Some("en")))
            .await
            .unwrap_err();
        assert_eq!(err, TranslateError::InvalidCredential);
    }

    #[tokio::test]
    async fn test_quota_and_outage_statuses() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(GENERATE_PATH))
            .and(body_string_contains("quota-please"))
            .respond_with(ResponseTemplate::new(429).set_body_json(json!({
                "error": {"code": 429, "message": "Resource has been exhausted"}
            })))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path(GENERATE_PATH))
            .and(body_string_contains("outage-please"))
            .respond_with(ResponseTemplate::new(503).set_body_string("overloaded"))
            .mount(&server)
            .await;

        let client = client(&server);
        let err = client
            .translate(&request("quota-please", "ru", Some("en")))
            .await
            .unwrap_err();
        assert_eq!(err, TranslateError::RateLimited);

        let err = client
            .translate(&request("outage-please", "ru", Some("en")))
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "Google Gemini API service unavailable");
    }

    #[tokio::test]
    async fn test_other_errors_pass_message_through() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(GENERATE_PATH))
            .respond_with(ResponseTemplate::new(400).set_body_json(json!({
                "error": {"code": 400, "message": "Unsupported language"}
            })))
            .mount(&server)
            .await;

        let err = client(&server)
            .translate(&request("Hello", "xx", Some("en")))
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "Google Gemini API error: Unsupported language");
    }
}
