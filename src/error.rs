use thiserror::Error;

/// Coarse classification of a [`TranslateError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    InvalidCredential,
    RateLimited,
    ServiceUnavailable,
    NetworkError,
    EmptyResponse,
    Unknown,
}

/// Provider failures normalized by the translation clients.
///
/// The queue engine retries every kind the same way; the message is what
/// reaches the caller once retries are exhausted.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TranslateError {
    #[error("Invalid or expired API key")]
    InvalidCredential,

    #[error("Rate limit exceeded")]
    RateLimited,

    #[error("{provider} API service unavailable")]
    ServiceUnavailable { provider: &'static str },

    #[error("Network error: No response from {provider} API")]
    Network { provider: &'static str },

    #[error("Empty translation response")]
    EmptyResponse,

    #[error("{0}")]
    Unknown(String),
}

impl TranslateError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            TranslateError::InvalidCredential => ErrorKind::InvalidCredential,
            TranslateError::RateLimited => ErrorKind::RateLimited,
            TranslateError::ServiceUnavailable { .. } => ErrorKind::ServiceUnavailable,
            TranslateError::Network { .. } => ErrorKind::NetworkError,
            TranslateError::EmptyResponse => ErrorKind::EmptyResponse,
            TranslateError::Unknown(_) => ErrorKind::Unknown,
        }
    }
}

#[derive(Error, Debug)]
pub enum TransflowError {
    #[error(transparent)]
    Translate(#[from] TranslateError),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Encryption error: {0}")]
    Crypto(String),

    #[error("Translation queue shut down before the request completed")]
    QueueClosed,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, TransflowError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages_are_human_readable() {
        assert_eq!(
            TranslateError::InvalidCredential.to_string(),
            "Invalid or expired API key"
        );
        assert_eq!(
            TranslateError::Network { provider: "Yandex" }.to_string(),
            "Network error: No response from Yandex API"
        );
        assert_eq!(
            TranslateError::EmptyResponse.to_string(),
            "Empty translation response"
        );
    }

    #[test]
    fn test_translate_error_passes_through_unwrapped() {
        let err: TransflowError = TranslateError::Unknown("boom".to_string()).into();
        assert_eq!(err.to_string(), "boom");
    }

    #[test]
    fn test_kind() {
        assert_eq!(TranslateError::RateLimited.kind(), ErrorKind::RateLimited);
        assert_eq!(
            TranslateError::ServiceUnavailable { provider: "x" }.kind(),
            ErrorKind::ServiceUnavailable
        );
        assert_eq!(
            TranslateError::Unknown(String::new()).kind(),
            ErrorKind::Unknown
        );
    }
}
