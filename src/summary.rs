//! Summary stream engine: resolves the active profile, builds the chat
//! request and turns the streaming response into a [`FragmentStream`].
//!
//! At most one stream is tracked as active; [`SummaryService::stop_summarization`]
//! cancels it. Starting a new stream does not cancel the previous one.

use crate::content::ContentData;
use crate::profile::{self, ApiSettings};
use crate::prompt;
use crate::storage::{SettingsStore, StorageError};
use crate::stream::FragmentStream;
use parking_lot::Mutex;
use reqwest::{Client, StatusCode};
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Errors raised while requesting or reading a summary.
#[derive(Error, Debug)]
pub enum SummaryError {
    #[error("Please configure an LLM provider profile in settings.")]
    NoProfileConfigured,
    #[error("The active profile is incomplete ({0}). Please update it in settings.")]
    IncompleteProfile(String),
    #[error("Network error: {0}. If the provider blocks cross-origin requests (CORS), switch to another profile or provider.")]
    Network(String),
    #[error("Authentication failed (401). Please check the API key of the active profile.")]
    Auth,
    #[error("API request failed: {status} - {body}")]
    Http { status: StatusCode, body: String },
    #[error("Error parsing stream: {0}")]
    StreamParse(String),
    #[error("API error: {0}")]
    Api(String),
    #[error(transparent)]
    Storage(#[from] StorageError),
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: String,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
    stream: bool,
}

type ActiveSlot = Arc<Mutex<Option<(u64, CancellationToken)>>>;

/// Clears the active-stream slot when its stream goes away, unless a newer
/// stream has taken the slot in the meantime.
pub(crate) struct ActiveStreamGuard {
    slot: ActiveSlot,
    generation: u64,
}

impl Drop for ActiveStreamGuard {
    fn drop(&mut self) {
        let mut slot = self.slot.lock();
        if slot.as_ref().is_some_and(|(generation, _)| *generation == self.generation) {
            *slot = None;
        }
    }
}

/// Sends summary requests and tracks the active stream.
pub struct SummaryService {
    client: Client,
    store: SettingsStore,
    active: ActiveSlot,
    generation: AtomicU64,
}

impl SummaryService {
    pub fn new(client: Client, store: SettingsStore) -> Self {
        Self {
            client,
            store,
            active: Arc::new(Mutex::new(None)),
            generation: AtomicU64::new(0),
        }
    }

    /// Settings from the first stored profile plus the language preference.
    pub fn api_settings(&self) -> Result<ApiSettings, SummaryError> {
        let profiles = self.store.profiles()?;
        let language = self.store.language()?;
        profile::resolve(&profiles, &language)
    }

    /// Whether a stream is currently registered as active.
    pub fn is_streaming(&self) -> bool {
        self.active.lock().is_some()
    }

    /// Start streaming a summary of `data`. A stop request that lands before
    /// the response arrives yields an already-finished stream.
    pub async fn stream_summary(
        &self,
        data: &ContentData,
        custom_prompt: Option<&str>,
    ) -> Result<FragmentStream, SummaryError> {
        let settings = self.api_settings()?;
        let request = ChatRequest {
            model: &settings.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: prompt::system_prompt(&settings.language),
                },
                ChatMessage {
                    role: "user",
                    content: prompt::format_prompt(data, &settings.language, custom_prompt),
                },
            ],
            temperature: settings.temperature,
            stream: true,
        };

        let (token, guard) = self.begin();
        let url = settings.chat_completions_url();
        info!(provider = %settings.provider, model = %settings.model, %url, site = %data.site, "requesting summary");

        let send = self
            .client
            .post(&url)
            .bearer_auth(&settings.api_key)
            .json(&request)
            .send();
        let response = tokio::select! {
            _ = token.cancelled() => return Ok(FragmentStream::cancelled()),
            response = send => response.map_err(|e| SummaryError::Network(e.to_string()))?,
        };

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED {
            return Err(SummaryError::Auth);
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(%status, "summary request rejected");
            return Err(SummaryError::Http { status, body });
        }
        debug!(%status, "summary stream opened");

        Ok(FragmentStream::new(response.bytes_stream(), token).with_guard(guard))
    }

    /// Cancel the active stream. A no-op when nothing is streaming.
    pub fn stop_summarization(&self) {
        match self.active.lock().take() {
            Some((_, token)) => {
                info!("stopping summary stream");
                token.cancel();
            }
            None => debug!("no active summary stream to stop"),
        }
    }

    fn begin(&self) -> (CancellationToken, ActiveStreamGuard) {
        let generation = self.generation.fetch_add(1, Ordering::Relaxed) + 1;
        let token = CancellationToken::new();
        if self
            .active
            .lock()
            .replace((generation, token.clone()))
            .is_some()
        {
            warn!("a summary stream is already active; it keeps running");
        }
        let guard = ActiveStreamGuard {
            slot: self.active.clone(),
            generation,
        };
        (token, guard)
    }
}
