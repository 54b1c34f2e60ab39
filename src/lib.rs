pub mod config;
pub mod error;
pub mod history;
pub mod translate;

pub use config::{Config, Provider};
pub use error::{ErrorKind, Result, TransflowError, TranslateError};
pub use history::{HistoryConfig, HistoryEntry, HistoryFilter, HistoryService, HistoryStats};
pub use translate::{
    create_client, QueueStatus, ServiceConfig, TranslationClient, TranslationResult,
    TranslationService,
};
