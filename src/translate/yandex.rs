//! Yandex Cloud Translate v2 client.

use crate::error::{Result, TranslateError};
use crate::translate::{map_transport_error, TranslateRequest, TranslateResponse, TranslationClient};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

const DEFAULT_BASE_URL: &str = "https://translate.api.cloud.yandex.net/translate/v2";
const PROVIDER: &str = "Yandex";

/// Client for the Yandex translate and detect endpoints.
///
/// Yandex does not report the source language unless asked, so the queue
/// engine calls [`TranslationClient::detect`] first when none is supplied.
pub struct YandexClient {
    client: Client,
    api_key: String,
    folder_id: Option<String>,
    base_url: String,
}

impl YandexClient {
    pub fn new(api_key: String, timeout: Duration) -> Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            api_key,
            folder_id: None,
            base_url: DEFAULT_BASE_URL.to_string(),
        })
    }

    pub fn with_folder_id(mut self, folder_id: impl Into<String>) -> Self {
        self.folder_id = Some(folder_id.into());
        self
    }

    /// Point the client at a different API root (used by tests).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    async fn post<B, R>(&self, path: &str, body: &B) -> std::result::Result<R, TranslateError>
    where
        B: Serialize + ?Sized,
        R: for<'de> Deserialize<'de>,
    {
        let url = format!("{}{}", self.base_url, path);

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Api-Key {}", self.api_key))
            .json(body)
            .send()
            .await
            .map_err(|e| map_transport_error(PROVIDER, e))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| map_transport_error(PROVIDER, e))?;

        if !status.is_success() {
            return Err(classify_failure(status, &body));
        }

        serde_json::from_str(&body).map_err(|e| {
            TranslateError::Unknown(format!("Failed to parse Yandex response: {}", e))
        })
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct YandexTranslateRequest<'a> {
    texts: [&'a str; 1],
    target_language_code: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    source_language_code: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    folder_id: Option<&'a str>,
}

#[derive(Deserialize, Debug)]
struct YandexTranslateResponse {
    #[serde(default)]
    translations: Vec<YandexTranslation>,
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
struct YandexTranslation {
    #[serde(default)]
    text: String,
    detected_language_code: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct YandexDetectRequest<'a> {
    text: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    folder_id: Option<&'a str>,
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
struct YandexDetectResponse {
    language_code: Option<String>,
}

#[derive(Deserialize, Debug)]
struct YandexApiError {
    message: Option<String>,
}

fn classify_failure(status: StatusCode, body: &str) -> TranslateError {
    match status.as_u16() {
        401 | 403 => TranslateError::InvalidCredential,
        429 => TranslateError::RateLimited,
        s if s >= 500 => TranslateError::ServiceUnavailable { provider: PROVIDER },
        s => match serde_json::from_str::<YandexApiError>(body)
            .ok()
            .and_then(|e| e.message)
        {
            Some(message) => TranslateError::Unknown(format!("Yandex API error: {}", message)),
            None => TranslateError::Unknown(format!("HTTP error {}", s)),
        },
    }
}

#[async_trait]
impl TranslationClient for YandexClient {
    async fn translate(
        &self,
        request: &TranslateRequest,
    ) -> std::result::Result<TranslateResponse, TranslateError> {
        debug!(
            "Yandex translate: {} chars -> {}",
            request.text.chars().count(),
            request.target_language_code
        );

        let body = YandexTranslateRequest {
            texts: [request.text.as_str()],
            target_language_code: &request.target_language_code,
            source_language_code: request.source_language_code.as_deref(),
            folder_id: self.folder_id.as_deref(),
        };

        let response: YandexTranslateResponse = self.post("/translate", &body).await?;
        let translation = response
            .translations
            .into_iter()
            .next()
            .ok_or(TranslateError::EmptyResponse)?;

        Ok(TranslateResponse {
            translated_text: translation.text,
            detected_language_code: translation
                .detected_language_code
                .filter(|code| !code.is_empty()),
        })
    }

    async fn detect(&self, text: &str) -> std::result::Result<Option<String>, TranslateError> {
        let body = YandexDetectRequest {
            text,
            folder_id: self.folder_id.as_deref(),
        };

        let response: YandexDetectResponse = self.post("/detect", &body).await?;
        Ok(response.language_code.filter(|code| !code.is_empty()))
    }

    fn detects_inline(&self) -> bool {
        false
    }

    fn name(&self) -> &'static str {
        PROVIDER
    }
}
