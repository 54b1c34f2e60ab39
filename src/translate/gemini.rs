//! Gemini-based translation using the Generative AI API.

use crate::error::{Result, TranslateError};
use crate::translate::{map_transport_error, TranslateRequest, TranslateResponse, TranslationClient};
use async_trait::async_trait;
use regex::Regex;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;
use std::time::Duration;
use tracing::{debug, warn};

const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
const PROVIDER: &str = "Google Gemini";

static CODE_FENCE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"```(?:json)?\s*").expect("Invalid regex"));

/// Translator using Google Gemini API.
///
/// When no source language is given the model is asked to detect it and
/// answer with a small JSON object, so detection costs no extra request.
pub struct GeminiClient {
    client: Client,
    api_key: String,
    model: String,
    base_url: String,
}

impl GeminiClient {
    /// Create a new Gemini client with the given API key.
    pub fn new(api_key: String, timeout: Duration) -> Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            api_key,
            model: "gemini-2.0-flash".to_string(),
            base_url: DEFAULT_BASE_URL.to_string(),
        })
    }

    /// Set a different model (e.g., "gemini-1.5-pro").
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Point the client at a different API root (used by tests).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    /// Build the translation prompt.
    fn build_prompt(&self, request: &TranslateRequest) -> String {
        let target = language_code_to_name(&request.target_language_code);

        match &request.source_language_code {
            Some(source) => format!(
                r#"Translate the following text from {} to {target}.
Return ONLY the translated text, nothing else. Preserve all formatting and line breaks.

Text to translate:
{}"#,
                language_code_to_name(source),
                request.text
            ),
            None => format!(
                r#"Detect the language of the following text and translate it to {target}.
Respond in JSON format with keys "detectedLanguage" (ISO 639-1 code) and "translation" (the translated text). Do not include any other text.

Text to translate:
{}"#,
                request.text
            ),
        }
    }

    async fn generate(&self, prompt: String) -> std::result::Result<String, TranslateError> {
        let request = GeminiRequest {
            contents: vec![GeminiContent {
                parts: vec![GeminiPart { text: prompt }],
            }],
        };

        let url = format!("{}/models/{}:generateContent", self.base_url, self.model);

        let response = self
            .client
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| map_transport_error(PROVIDER, e))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| map_transport_error(PROVIDER, e))?;

        let parsed = serde_json::from_str::<GeminiResponse>(&body);

        if !status.is_success() {
            let message = parsed
                .ok()
                .and_then(|r| r.error)
                .map(|e| e.message)
                .unwrap_or(body);
            return Err(classify_failure(status, &message));
        }

        let gemini_response = parsed.map_err(|e| {
            TranslateError::Unknown(format!("Failed to parse translation response: {}", e))
        })?;

        if let Some(error) = gemini_response.error {
            return Err(classify_message(&error.message));
        }

        Ok(gemini_response
            .candidates
            .and_then(|c| c.into_iter().next())
            .and_then(|c| c.content)
            .and_then(|c| c.parts)
            .and_then(|p| p.into_iter().next())
            .and_then(|p| p.text)
            .unwrap_or_default())
    }
}

#[derive(Serialize)]
struct GeminiRequest {
    contents: Vec<GeminiContent>,
}

#[derive(Serialize)]
struct GeminiContent {
    parts: Vec<GeminiPart>,
}

#[derive(Serialize)]
struct GeminiPart {
    text: String,
}

#[derive(Deserialize, Debug)]
struct GeminiResponse {
    candidates: Option<Vec<GeminiCandidate>>,
    error: Option<GeminiError>,
}

#[derive(Deserialize, Debug)]
struct GeminiCandidate {
    content: Option<GeminiResponseContent>,
}

#[derive(Deserialize, Debug)]
struct GeminiResponseContent {
    parts: Option<Vec<GeminiResponsePart>>,
}

#[derive(Deserialize, Debug)]
struct GeminiResponsePart {
    text: Option<String>,
}

#[derive(Deserialize, Debug)]
struct GeminiError {
    message: String,
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
struct DetectedTranslation {
    detected_language: Option<String>,
    translation: Option<String>,
}

fn classify_failure(status: StatusCode, message: &str) -> TranslateError {
    match status.as_u16() {
        401 | 403 => TranslateError::InvalidCredential,
        429 => TranslateError::RateLimited,
        s if s >= 500 => TranslateError::ServiceUnavailable { provider: PROVIDER },
        _ => classify_message(message),
    }
}

/// Gemini reports most failures as free text, so classify by content.
fn classify_message(message: &str) -> TranslateError {
    let lower = message.to_lowercase();

    if lower.contains("api key") || lower.contains("unauthorized") || lower.contains("forbidden")
    {
        TranslateError::InvalidCredential
    } else if lower.contains("quota") || lower.contains("rate limit") || lower.contains("429") {
        TranslateError::RateLimited
    } else if lower.contains("500")
        || lower.contains("503")
        || lower.contains("service unavailable")
    {
        TranslateError::ServiceUnavailable { provider: PROVIDER }
    } else if lower.contains("network") || lower.contains("timeout") {
        TranslateError::Network { provider: PROVIDER }
    } else {
        TranslateError::Unknown(format!("Google Gemini API error: {}", message))
    }
}

/// Parse the JSON answer to a detect-and-translate prompt.
///
/// Falls back to treating the whole answer as the translation with no
/// detected language when the model ignored the requested format.
fn parse_detected_answer(answer: &str) -> TranslateResponse {
    let cleaned = CODE_FENCE.replace_all(answer.trim(), "");
    let cleaned = cleaned.trim();

    match serde_json::from_str::<DetectedTranslation>(cleaned) {
        Ok(DetectedTranslation {
            detected_language: Some(lang),
            translation: Some(text),
        }) if !lang.trim().is_empty() && !text.is_empty() => TranslateResponse {
            translated_text: text,
            detected_language_code: Some(lang.trim().to_lowercase()),
        },
        _ => {
            warn!("Gemini ignored the JSON answer format, using raw text");
            TranslateResponse {
                translated_text: answer.trim().to_string(),
                detected_language_code: None,
            }
        }
    }
}

#[async_trait]
impl TranslationClient for GeminiClient {
    async fn translate(
        &self,
        request: &TranslateRequest,
    ) -> std::result::Result<TranslateResponse, TranslateError> {
        debug!(
            "Gemini translate: {} chars -> {} ({})",
            request.text.chars().count(),
            request.target_language_code,
            self.model
        );

        let answer = self.generate(self.build_prompt(request)).await?;
        if answer.trim().is_empty() {
            return Err(TranslateError::EmptyResponse);
        }

        match &request.source_language_code {
            Some(source) => Ok(TranslateResponse {
                translated_text: answer.trim().to_string(),
                detected_language_code: Some(source.clone()),
            }),
            None => Ok(parse_detected_answer(&answer)),
        }
    }

    async fn detect(&self, text: &str) -> std::result::Result<Option<String>, TranslateError> {
        let prompt = format!(
            r#"Detect the language of the following text and respond ONLY with the ISO 639-1 language code (e.g., "en" for English, "ru" for Russian). No explanations:

{}"#,
            text
        );

        let answer = self.generate(prompt).await?;
        let code = answer.trim().to_lowercase();

        if code.is_empty() || code.len() > 5 {
            return Ok(None);
        }
        Ok(Some(code))
    }

    fn detects_inline(&self) -> bool {
        true
    }

    fn name(&self) -> &'static str {
        PROVIDER
    }
}

/// Convert language code to human-readable name for better prompting.
fn language_code_to_name(code: &str) -> &str {
    let lowercase = code.to_lowercase();
    match lowercase.as_str() {
        "en" => "English",
        "es" => "Spanish",
        "fr" => "French",
        "de" => "German",
        "it" => "Italian",
        "pt" => "Portuguese",
        "ru" => "Russian",
        "ja" => "Japanese",
        "ko" => "Korean",
        "zh" => "Chinese",
        "ar" => "Arabic",
        "hi" => "Hindi",
        "tr" => "Turkish",
        "uk" => "Ukrainian",
        "pl" => "Polish",
        "nl" => "Dutch",
        "sv" => "Swedish",
        "cs" => "Czech",
        "kk" => "Kazakh",
        "be" => "Belarusian",
        // Let the model interpret anything else
        _ => code,
    }
}
