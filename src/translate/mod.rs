pub mod gemini;
pub mod service;
pub mod yandex;

pub use gemini::GeminiClient;
pub use service::{QueueStatus, ServiceConfig, TranslationResult, TranslationService};
pub use yandex::YandexClient;

use crate::config::{Config, Provider};
use crate::error::{Result, TransflowError, TranslateError};
use async_trait::async_trait;
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranslateRequest {
    pub text: String,
    pub target_language_code: String,
    pub source_language_code: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranslateResponse {
    pub translated_text: String,
    pub detected_language_code: Option<String>,
}

/// A remote translation provider.
///
/// Implementations never retry; they make one call and map whatever went
/// wrong onto [`TranslateError`].
#[async_trait]
pub trait TranslationClient: Send + Sync {
    async fn translate(
        &self,
        request: &TranslateRequest,
    ) -> std::result::Result<TranslateResponse, TranslateError>;

    async fn detect(&self, text: &str) -> std::result::Result<Option<String>, TranslateError>;

    /// Whether `translate` reports the source language itself when none is given.
    fn detects_inline(&self) -> bool;

    fn name(&self) -> &'static str;
}

/// Build the client for the configured provider.
pub fn create_client(config: &Config) -> Result<Arc<dyn TranslationClient>> {
    match config.provider {
        Provider::Yandex => {
            let api_key = config.yandex_api_key.clone().ok_or_else(|| {
                TransflowError::Config("Yandex API key not configured".to_string())
            })?;
            let mut client = YandexClient::new(api_key, config.request_timeout())?;
            if let Some(folder) = &config.yandex_folder_id {
                client = client.with_folder_id(folder.clone());
            }
            Ok(Arc::new(client))
        }
        Provider::Gemini => {
            let api_key = config.gemini_api_key.clone().ok_or_else(|| {
                TransflowError::Config("Gemini API key not configured".to_string())
            })?;
            let client = GeminiClient::new(api_key, config.request_timeout())?
                .with_model(config.gemini_model.clone());
            Ok(Arc::new(client))
        }
    }
}

/// Map a transport-level reqwest failure onto the shared taxonomy.
///
/// The request URL is stripped so it never reaches user-facing messages.
pub(crate) fn map_transport_error(provider: &'static str, err: reqwest::Error) -> TranslateError {
    if err.is_timeout() || err.is_connect() || err.is_request() {
        TranslateError::Network { provider }
    } else {
        TranslateError::Unknown(err.without_url().to_string())
    }
}
