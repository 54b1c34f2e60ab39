use crate::error::{Result, TransflowError};
use crate::translate::ServiceConfig;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    Yandex,
    #[default]
    Gemini,
}

impl std::fmt::Display for Provider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Provider::Yandex => write!(f, "yandex"),
            Provider::Gemini => write!(f, "gemini"),
        }
    }
}

impl std::str::FromStr for Provider {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "yandex" => Ok(Provider::Yandex),
            "gemini" => Ok(Provider::Gemini),
            _ => Err(format!("Unknown provider: {}. Use 'yandex' or 'gemini'", s)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub provider: Provider,
    pub yandex_api_key: Option<String>,
    pub yandex_folder_id: Option<String>,
    pub gemini_api_key: Option<String>,
    pub gemini_model: String,
    pub max_retries: u32,
    pub retry_delay_ms: u64,
    pub rate_limit_ms: u64,
    pub request_timeout_ms: u64,
    pub data_dir: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            provider: Provider::default(),
            yandex_api_key: None,
            yandex_folder_id: None,
            gemini_api_key: None,
            gemini_model: "gemini-2.0-flash".to_string(),
            max_retries: 3,
            retry_delay_ms: 1000,
            rate_limit_ms: 200,
            request_timeout_ms: 10_000,
            data_dir: None,
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        let mut config = Self::default();

        if let Some(config_path) = Self::config_file_path() {
            if config_path.exists() {
                let contents = std::fs::read_to_string(&config_path)?;
                config = toml::from_str::<Config>(&contents).map_err(|e| {
                    TransflowError::Config(format!("{}: {}", config_path.display(), e))
                })?;
            }
        }

        // A missing .env is the normal case
        let _ = dotenvy::dotenv();

        config.apply_env(|name| std::env::var(name).ok());
        Ok(config)
    }

    /// Override fields from environment-style variables.
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(key) = lookup("YANDEX_API_KEY") {
            self.yandex_api_key = Some(key);
        }
        if let Some(folder) = lookup("YANDEX_FOLDER_ID") {
            self.yandex_folder_id = Some(folder);
        }
        if let Some(key) = lookup("GOOGLE_GEMINI_API_KEY").or_else(|| lookup("GEMINI_API_KEY")) {
            self.gemini_api_key = Some(key);
        }
        if let Some(provider) = lookup("TRANSFLOW_PROVIDER") {
            if let Ok(p) = provider.parse() {
                self.provider = p;
            }
        }
        if let Some(retries) = lookup("TRANSFLOW_MAX_RETRIES") {
            if let Ok(r) = retries.parse() {
                self.max_retries = r;
            }
        }
        if let Some(delay) = lookup("TRANSFLOW_RETRY_DELAY_MS") {
            if let Ok(d) = delay.parse() {
                self.retry_delay_ms = d;
            }
        }
        if let Some(limit) = lookup("TRANSFLOW_RATE_LIMIT_MS") {
            if let Ok(l) = limit.parse() {
                self.rate_limit_ms = l;
            }
        }
    }

    pub fn validate(&self) -> Result<()> {
        let (key, hint) = match self.provider {
            Provider::Yandex => (
                &self.yandex_api_key,
                "YANDEX_API_KEY not set. Create one in the Yandex Cloud console",
            ),
            Provider::Gemini => (
                &self.gemini_api_key,
                "GOOGLE_GEMINI_API_KEY not set. Get one at https://aistudio.google.com/apikey",
            ),
        };

        match key {
            None => return Err(TransflowError::Config(hint.to_string())),
            Some(k) if k.trim().is_empty() => {
                return Err(TransflowError::Config(format!(
                    "API key for {} is empty",
                    self.provider
                )));
            }
            Some(_) => {}
        }

        if self.request_timeout_ms == 0 {
            return Err(TransflowError::Config(
                "Request timeout must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }

    pub fn service_config(&self) -> ServiceConfig {
        ServiceConfig {
            max_retries: self.max_retries,
            retry_delay: Duration::from_millis(self.retry_delay_ms),
            rate_limit: Duration::from_millis(self.rate_limit_ms),
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    /// Directory holding the history file and its key.
    pub fn data_dir(&self) -> Result<PathBuf> {
        self.data_dir
            .clone()
            .or_else(|| dirs::data_dir().map(|p| p.join("transflow")))
            .ok_or_else(|| TransflowError::Config("Could not determine a data directory".to_string()))
    }

    fn config_file_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("transflow").join("config.toml"))
    }
}
