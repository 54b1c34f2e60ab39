pub mod crypto;
pub mod store;

pub use crypto::EntryCipher;
pub use store::{JsonFileStore, KeyValueStore, MemoryStore};

use crate::error::{Result, TransflowError};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use tracing::{debug, warn};
use uuid::Uuid;

const HISTORY_KEY: &str = "history";
const CONFIG_KEY: &str = "config";

/// File name of the history store inside the data directory.
pub const HISTORY_FILE: &str = "translation-history.json";
/// File name of the encryption key inside the data directory.
pub const KEY_FILE: &str = "history.key";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryEntry {
    pub id: String,
    pub source_text: String,
    pub translated_text: String,
    pub source_lang: String,
    pub target_lang: String,
    /// Epoch milliseconds of the last translation of this triple.
    pub timestamp: i64,
    pub is_favorite: bool,
    pub usage_count: u32,
}

/// Query for [`HistoryService::get_history`]. Empty strings and `None`
/// disable the corresponding criterion.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HistoryFilter {
    /// Case-insensitive substring of the source or translated text.
    pub search: Option<String>,
    pub source_lang: Option<String>,
    pub target_lang: Option<String>,
    pub only_favorites: bool,
    /// Inclusive lower timestamp bound.
    pub start_date: Option<i64>,
    /// Inclusive upper timestamp bound.
    pub end_date: Option<i64>,
}

impl HistoryFilter {
    fn matches(&self, entry: &HistoryEntry, search_lower: Option<&str>) -> bool {
        if let Some(needle) = search_lower {
            if !entry.source_text.to_lowercase().contains(needle)
                && !entry.translated_text.to_lowercase().contains(needle)
            {
                return false;
            }
        }
        if let Some(lang) = non_empty(&self.source_lang) {
            if entry.source_lang != lang {
                return false;
            }
        }
        if let Some(lang) = non_empty(&self.target_lang) {
            if entry.target_lang != lang {
                return false;
            }
        }
        if self.only_favorites && !entry.is_favorite {
            return false;
        }
        if self.start_date.is_some_and(|start| entry.timestamp < start) {
            return false;
        }
        if self.end_date.is_some_and(|end| entry.timestamp > end) {
            return false;
        }
        true
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct HistoryConfig {
    pub max_entries: usize,
    pub enable_encryption: bool,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            max_entries: 1000,
            enable_encryption: false,
        }
    }
}

/// Partial update merged over the stored [`HistoryConfig`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HistoryConfigUpdate {
    pub max_entries: Option<usize>,
    pub enable_encryption: Option<bool>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryStats {
    pub total_entries: usize,
    pub favorites_count: usize,
    pub total_usage: u64,
    pub oldest_entry: Option<i64>,
    pub newest_entry: Option<i64>,
}

type Clock = Box<dyn Fn() -> i64 + Send + Sync>;

/// Translation history with deduplication, favorites and a size cap.
///
/// Entries are unique per `(source_text, source_lang, target_lang)`; a repeat
/// refreshes the existing entry and bumps its usage count. After each insert
/// the oldest non-favorite entries are evicted until the history fits
/// `max_entries`. Favorites are never evicted, even if they alone exceed it.
///
/// With encryption enabled the two text fields are stored sealed. Every read
/// path tries to unseal and keeps the stored string when that fails.
pub struct HistoryService {
    store: Box<dyn KeyValueStore>,
    cipher: OnceLock<EntryCipher>,
    /// Where the key lives; `None` when the cipher was supplied directly.
    key_path: Option<PathBuf>,
    clock: Clock,
}

impl HistoryService {
    pub fn new(store: Box<dyn KeyValueStore>, cipher: EntryCipher) -> Self {
        Self {
            store,
            cipher: OnceLock::from(cipher),
            key_path: None,
            clock: Box::new(|| chrono::Utc::now().timestamp_millis()),
        }
    }

    /// Open the on-disk history in `data_dir`.
    ///
    /// The key file in `data_dir` is read when sealed text is first revealed
    /// and created only when encryption is first needed.
    pub fn open(data_dir: &Path) -> Result<Self> {
        let store = JsonFileStore::open(data_dir.join(HISTORY_FILE))?;
        Ok(Self {
            store: Box::new(store),
            cipher: OnceLock::new(),
            key_path: Some(data_dir.join(KEY_FILE)),
            clock: Box::new(|| chrono::Utc::now().timestamp_millis()),
        })
    }

    /// Replace the timestamp source (epoch millis).
    pub fn with_clock<F>(mut self, clock: F) -> Self
    where
        F: Fn() -> i64 + Send + Sync + 'static,
    {
        self.clock = Box::new(clock);
        self
    }

    pub fn get_config(&self) -> HistoryConfig {
        match self.store.get(CONFIG_KEY) {
            Ok(Some(value)) => serde_json::from_value(value).unwrap_or_else(|e| {
                warn!("Ignoring unreadable history config: {}", e);
                HistoryConfig::default()
            }),
            Ok(None) => HistoryConfig::default(),
            Err(e) => {
                warn!("Failed to read history config: {}", e);
                HistoryConfig::default()
            }
        }
    }

    /// Merge `update` into the stored config. Lowering `max_entries` trims
    /// the history right away.
    pub fn update_config(&self, update: HistoryConfigUpdate) -> Result<HistoryConfig> {
        if update.max_entries == Some(0) {
            return Err(TransflowError::Config(
                "maxEntries must be at least 1".to_string(),
            ));
        }

        let current = self.get_config();
        let config = HistoryConfig {
            max_entries: update.max_entries.unwrap_or(current.max_entries),
            enable_encryption: update.enable_encryption.unwrap_or(current.enable_encryption),
        };
        if config.enable_encryption {
            self.sealing_cipher()?;
        }
        self.store.set(CONFIG_KEY, serde_json::to_value(config)?)?;

        if config.max_entries < current.max_entries {
            let mut history = self.load_history();
            if apply_retention(&mut history, config.max_entries) > 0 {
                self.save_history(&history)?;
            }
        }

        Ok(config)
    }

    /// Record a translation and return the stored entry in plaintext.
    pub fn add_entry(
        &self,
        source_text: &str,
        translated_text: &str,
        source_lang: &str,
        target_lang: &str,
    ) -> Result<HistoryEntry> {
        let config = self.get_config();
        let mut history = self.load_history();
        let now = (self.clock)();

        let existing = history.iter().position(|entry| {
            entry.source_lang == source_lang
                && entry.target_lang == target_lang
                && self.reveal_text(&entry.source_text) == source_text
        });

        if let Some(index) = existing {
            let sealed = self.seal(translated_text, &config)?;
            let entry = &mut history[index];
            entry.translated_text = sealed;
            entry.timestamp = now;
            entry.usage_count = entry.usage_count.saturating_add(1);
            let updated = self.reveal(entry.clone());

            self.save_history(&history)?;
            debug!("History entry {} used {} times", updated.id, updated.usage_count);
            return Ok(updated);
        }

        let entry = HistoryEntry {
            id: Uuid::new_v4().to_string(),
            source_text: source_text.to_string(),
            translated_text: translated_text.to_string(),
            source_lang: source_lang.to_string(),
            target_lang: target_lang.to_string(),
            timestamp: now,
            is_favorite: false,
            usage_count: 1,
        };

        history.insert(
            0,
            HistoryEntry {
                source_text: self.seal(source_text, &config)?,
                translated_text: self.seal(translated_text, &config)?,
                ..entry.clone()
            },
        );
        apply_retention(&mut history, config.max_entries);
        self.save_history(&history)?;

        Ok(entry)
    }

    /// Entries matching `filter`, newest first.
    pub fn get_history(&self, filter: &HistoryFilter) -> Vec<HistoryEntry> {
        let search = non_empty(&filter.search).map(str::to_lowercase);

        let mut history: Vec<HistoryEntry> = self
            .load_history()
            .into_iter()
            .map(|entry| self.reveal(entry))
            .filter(|entry| filter.matches(entry, search.as_deref()))
            .collect();

        history.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        history
    }

    /// Favorites, most used first.
    pub fn get_favorites(&self) -> Vec<HistoryEntry> {
        let mut favorites = self.get_history(&HistoryFilter {
            only_favorites: true,
            ..HistoryFilter::default()
        });
        favorites.sort_by(|a, b| b.usage_count.cmp(&a.usage_count));
        favorites
    }

    /// Flip the favorite flag. `None` when no entry has this id.
    pub fn toggle_favorite(&self, id: &str) -> Result<Option<HistoryEntry>> {
        let mut history = self.load_history();
        let Some(entry) = history.iter_mut().find(|entry| entry.id == id) else {
            return Ok(None);
        };

        entry.is_favorite = !entry.is_favorite;
        let toggled = self.reveal(entry.clone());
        self.save_history(&history)?;

        Ok(Some(toggled))
    }

    pub fn delete_entry(&self, id: &str) -> Result<bool> {
        let mut history = self.load_history();
        let before = history.len();
        history.retain(|entry| entry.id != id);

        if history.len() == before {
            return Ok(false);
        }
        self.save_history(&history)?;
        Ok(true)
    }

    /// Remove entries and return how many were removed.
    pub fn clear_history(&self, keep_favorites: bool) -> Result<usize> {
        let mut history = self.load_history();
        let before = history.len();

        if keep_favorites {
            history.retain(|entry| entry.is_favorite);
        } else {
            history.clear();
        }

        self.save_history(&history)?;
        Ok(before - history.len())
    }

    pub fn get_stats(&self) -> HistoryStats {
        let history = self.load_history();

        HistoryStats {
            total_entries: history.len(),
            favorites_count: history.iter().filter(|entry| entry.is_favorite).count(),
            total_usage: history.iter().map(|entry| u64::from(entry.usage_count)).sum(),
            oldest_entry: history.iter().map(|entry| entry.timestamp).min(),
            newest_entry: history.iter().map(|entry| entry.timestamp).max(),
        }
    }

    fn load_history(&self) -> Vec<HistoryEntry> {
        match self.store.get(HISTORY_KEY) {
            Ok(Some(value)) => serde_json::from_value(value).unwrap_or_else(|e| {
                warn!("Ignoring unreadable history: {}", e);
                Vec::new()
            }),
            Ok(None) => Vec::new(),
            Err(e) => {
                warn!("Failed to read history: {}", e);
                Vec::new()
            }
        }
    }

    fn save_history(&self, history: &[HistoryEntry]) -> Result<()> {
        self.store.set(HISTORY_KEY, serde_json::to_value(history)?)
    }

    fn seal(&self, text: &str, config: &HistoryConfig) -> Result<String> {
        if config.enable_encryption {
            self.sealing_cipher()?.encrypt(text)
        } else {
            Ok(text.to_string())
        }
    }

    /// Cipher for writing, creating the key file on first use.
    fn sealing_cipher(&self) -> Result<&EntryCipher> {
        if let Some(cipher) = self.cipher.get() {
            return Ok(cipher);
        }
        let path = self
            .key_path
            .as_deref()
            .ok_or_else(|| TransflowError::Crypto("no history key configured".to_string()))?;
        let cipher = EntryCipher::load_or_create(path)?;
        Ok(self.cipher.get_or_init(|| cipher))
    }

    /// Cipher for reading. Never creates a key: without one nothing sealed
    /// can be opened anyway.
    fn revealing_cipher(&self) -> Option<&EntryCipher> {
        if let Some(cipher) = self.cipher.get() {
            return Some(cipher);
        }
        let path = self.key_path.as_deref().filter(|path| path.exists())?;
        match EntryCipher::load(path) {
            Ok(cipher) => Some(self.cipher.get_or_init(|| cipher)),
            Err(e) => {
                warn!("Unreadable history key {}: {}", path.display(), e);
                None
            }
        }
    }

    fn reveal_text(&self, stored: &str) -> String {
        // Plaintext written while encryption was off never carries a nonce
        if !stored.contains(':') {
            return stored.to_string();
        }
        let Some(cipher) = self.revealing_cipher() else {
            return stored.to_string();
        };
        match cipher.decrypt(stored) {
            Ok(text) => text,
            Err(e) => {
                debug!("Keeping stored text as-is: {}", e);
                stored.to_string()
            }
        }
    }

    fn reveal(&self, entry: HistoryEntry) -> HistoryEntry {
        HistoryEntry {
            source_text: self.reveal_text(&entry.source_text),
            translated_text: self.reveal_text(&entry.translated_text),
            ..entry
        }
    }
}

/// Evict the oldest non-favorites until `history` fits `max_entries`.
/// Returns the number of evicted entries.
fn apply_retention(history: &mut Vec<HistoryEntry>, max_entries: usize) -> usize {
    let excess = history.len().saturating_sub(max_entries);
    if excess == 0 {
        return 0;
    }

    // Later positions were inserted earlier, so they lose timestamp ties
    let mut candidates: Vec<(i64, std::cmp::Reverse<usize>)> = history
        .iter()
        .enumerate()
        .filter(|(_, entry)| !entry.is_favorite)
        .map(|(index, entry)| (entry.timestamp, std::cmp::Reverse(index)))
        .collect();
    candidates.sort();

    let evict: HashSet<usize> = candidates
        .into_iter()
        .take(excess)
        .map(|(_, std::cmp::Reverse(index))| index)
        .collect();

    let mut index = 0;
    history.retain(|_| {
        let keep = !evict.contains(&index);
        index += 1;
        keep
    });

    if evict.len() < excess {
        warn!(
            "History holds {} entries over its limit of {}; favorites are kept",
            excess - evict.len(),
            max_entries
        );
    }
    debug!("Evicted {} history entries", evict.len());
    evict.len()
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.is_empty())
}
