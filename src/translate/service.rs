//! Serial translation queue with rate limiting and linear-backoff retries.

use crate::error::{Result, TransflowError, TranslateError};
use crate::translate::{TranslateRequest, TranslationClient};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Tuning for the queue engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServiceConfig {
    /// Retries after the first attempt before a request is rejected.
    pub max_retries: u32,
    /// Base backoff; attempt `n` waits `n * retry_delay` before requeueing.
    pub retry_delay: Duration,
    /// Minimum spacing between the starts of consecutive provider calls.
    pub rate_limit: Duration,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            retry_delay: Duration::from_millis(1000),
            rate_limit: Duration::from_millis(200),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranslationResult {
    pub translated_text: String,
    /// Detected or supplied source language, `"unknown"` when neither exists.
    pub detected_source_lang: String,
    pub target_lang: String,
}

/// Point-in-time view of the queue, for diagnostics only.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueStatus {
    pub queue_length: usize,
    pub is_processing: bool,
}

type Responder = oneshot::Sender<std::result::Result<TranslationResult, TranslateError>>;

struct QueueItem {
    text: String,
    target_lang: String,
    source_lang: Option<String>,
    retries: u32,
    responder: Responder,
}

struct QueueState {
    queue: VecDeque<QueueItem>,
    is_processing: bool,
    last_request: Option<Instant>,
}

struct Inner {
    client: Arc<dyn TranslationClient>,
    config: ServiceConfig,
    state: Mutex<QueueState>,
}

/// Queues translation requests and runs them one at a time against a
/// [`TranslationClient`].
///
/// New requests join the back of the queue. A failed request sleeps out its
/// backoff and is put back at the front, so retries run before requests that
/// have not been tried yet. Cloning is cheap and every clone shares one queue.
#[derive(Clone)]
pub struct TranslationService {
    inner: Arc<Inner>,
}

impl TranslationService {
    pub fn new(client: Arc<dyn TranslationClient>, config: ServiceConfig) -> Self {
        Self {
            inner: Arc::new(Inner {
                client,
                config,
                state: Mutex::new(QueueState {
                    queue: VecDeque::new(),
                    is_processing: false,
                    last_request: None,
                }),
            }),
        }
    }

    pub fn config(&self) -> ServiceConfig {
        self.inner.config
    }

    /// Enqueue a translation and return a future for its outcome.
    ///
    /// The request is queued before this returns, so calls made back to back
    /// reach the provider in call order regardless of when the futures are
    /// awaited. Dropping the future does not cancel the request. An empty
    /// `source_lang` counts as absent. Must be called within a Tokio runtime.
    pub fn translate(
        &self,
        text: impl Into<String>,
        target_lang: impl Into<String>,
        source_lang: Option<String>,
    ) -> impl Future<Output = Result<TranslationResult>> + Send + 'static {
        let (responder, receiver) = oneshot::channel();

        let item = QueueItem {
            text: text.into(),
            target_lang: target_lang.into(),
            source_lang: source_lang.filter(|lang| !lang.is_empty()),
            retries: 0,
            responder,
        };

        let start_worker = {
            let mut state = self.inner.state.lock();
            state.queue.push_back(item);
            !std::mem::replace(&mut state.is_processing, true)
        };

        if start_worker {
            let inner = Arc::clone(&self.inner);
            tokio::spawn(inner.drain());
        }

        async move {
            match receiver.await {
                Ok(outcome) => outcome.map_err(TransflowError::from),
                Err(_) => Err(TransflowError::QueueClosed),
            }
        }
    }

    pub fn queue_status(&self) -> QueueStatus {
        let state = self.inner.state.lock();
        QueueStatus {
            queue_length: state.queue.len(),
            is_processing: state.is_processing,
        }
    }
}

/// Releases the queue if the worker stops before it runs dry, for instance
/// when a client panics. Pending requests are dropped, so their callers see
/// [`TransflowError::QueueClosed`], and the next `translate` starts a fresh
/// worker.
struct WorkerGuard<'a> {
    state: &'a Mutex<QueueState>,
    finished: bool,
}

impl Drop for WorkerGuard<'_> {
    fn drop(&mut self) {
        if self.finished {
            return;
        }

        let abandoned = {
            let mut state = self.state.lock();
            state.is_processing = false;
            std::mem::take(&mut state.queue)
        };
        warn!(
            "Translation worker stopped early, closing {} queued request(s)",
            abandoned.len()
        );
    }
}

impl Inner {
    async fn drain(self: Arc<Self>) {
        debug!("Translation worker started ({})", self.client.name());
        let mut guard = WorkerGuard {
            state: &self.state,
            finished: false,
        };

        loop {
            let mut item = {
                let mut state = self.state.lock();
                match state.queue.pop_front() {
                    Some(item) => item,
                    None => {
                        state.is_processing = false;
                        guard.finished = true;
                        break;
                    }
                }
            };

            self.enforce_rate_limit().await;
            let outcome = self.execute(&item).await;

            match outcome {
                Ok(result) => {
                    debug!(
                        "Translated {} chars ({} -> {})",
                        item.text.chars().count(),
                        result.detected_source_lang,
                        result.target_lang
                    );
                    if item.responder.send(Ok(result)).is_err() {
                        debug!("Caller went away before the translation finished");
                    }
                }
                Err(err) if item.retries < self.config.max_retries => {
                    item.retries += 1;
                    warn!(
                        "Retrying translation (attempt {}/{}): {}",
                        item.retries, self.config.max_retries, err
                    );
                    tokio::time::sleep(self.config.retry_delay * item.retries).await;
                    self.state.lock().queue.push_front(item);
                }
                Err(err) => {
                    info!(
                        "Translation failed after {} attempts: {}",
                        item.retries + 1,
                        err
                    );
                    let _ = item.responder.send(Err(err));
                }
            }
        }

        debug!("Translation worker idle");
    }

    async fn enforce_rate_limit(&self) {
        let last_request = self.state.lock().last_request;

        if let Some(last) = last_request {
            let elapsed = last.elapsed();
            if elapsed < self.config.rate_limit {
                tokio::time::sleep(self.config.rate_limit - elapsed).await;
            }
        }

        self.state.lock().last_request = Some(Instant::now());
    }

    async fn execute(
        &self,
        item: &QueueItem,
    ) -> std::result::Result<TranslationResult, TranslateError> {
        let mut source_lang = item.source_lang.clone();

        if source_lang.is_none() && !self.client.detects_inline() {
            source_lang = self.client.detect(&item.text).await?;
        }

        let request = TranslateRequest {
            text: item.text.clone(),
            target_language_code: item.target_lang.clone(),
            source_language_code: source_lang.clone(),
        };

        let response = self.client.translate(&request).await?;
        if response.translated_text.is_empty() {
            return Err(TranslateError::EmptyResponse);
        }

        let detected_source_lang = response
            .detected_language_code
            .filter(|lang| !lang.is_empty())
            .or(source_lang)
            .unwrap_or_else(|| "unknown".to_string());

        Ok(TranslationResult {
            translated_text: response.translated_text,
            detected_source_lang,
            target_lang: item.target_lang.clone(),
        })
    }
}
