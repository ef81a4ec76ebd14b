//! Content services: one per site, picked by the factory from the active
//! tab's URL.
//!
//! An extraction walks `validate URL -> ensure agent -> request -> convert`.
//! The only retry is the agent re-injection inside
//! [`MessagingBridge::ensure_ready`]; every other failure ends the call.

use crate::bridge::{BridgeError, MessagingBridge, Request, TabHost, TabId};
use crate::config::BridgeConfig;
use crate::content::{ContentData, Site};
use crate::extract::RawData;
use crate::stream::FragmentStream;
use crate::summary::{SummaryError, SummaryService};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{info, warn};

pub const EXTRACT_TIMEOUT: Duration = Duration::from_secs(5);
pub const HIGHLIGHT_TIMEOUT: Duration = Duration::from_secs(3);

/// Errors surfaced by content services. Messages are user-facing.
#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("No active tab found.")]
    NoActiveTab,
    #[error("This page is not on a supported site. Open a Reddit post, a YouTube video or a Hacker News item.")]
    NotOnSupportedSite { url: String },
    #[error("{0}")]
    InvalidPage(&'static str),
    #[error(transparent)]
    Bridge(#[from] BridgeError),
    #[error("{0}")]
    ExtractionFailed(String),
    #[error("{0}")]
    HighlightFailed(String),
    #[error(transparent)]
    Summary(#[from] SummaryError),
}

/// Picks the site for the active tab.
pub struct SiteDetector;

impl SiteDetector {
    pub fn detect(url: &str) -> Option<Site> {
        Site::detect(url)
    }

    pub async fn current_site(host: &dyn TabHost) -> Option<Site> {
        let tab = host.active_tab().await?;
        tab.url.as_deref().and_then(Site::detect)
    }
}

/// Extraction, highlighting and summaries for one site.
pub struct ContentService {
    site: Site,
    bridge: MessagingBridge,
    summary: Arc<SummaryService>,
    extract_timeout: Duration,
    highlight_timeout: Duration,
}

impl ContentService {
    pub fn new(site: Site, bridge: MessagingBridge, summary: Arc<SummaryService>) -> Self {
        Self {
            site,
            bridge,
            summary,
            extract_timeout: EXTRACT_TIMEOUT,
            highlight_timeout: HIGHLIGHT_TIMEOUT,
        }
    }

    pub fn with_timeouts(mut self, extract: Duration, highlight: Duration) -> Self {
        self.extract_timeout = extract;
        self.highlight_timeout = highlight;
        self
    }

    pub fn site(&self) -> Site {
        self.site
    }

    /// Active tab and its URL, once the URL is known to be a page this
    /// site's extractor can read. Nothing is sent to the tab before this.
    async fn checked_tab(&self) -> Result<(TabId, String), ServiceError> {
        let tab = self
            .bridge
            .host()
            .active_tab()
            .await
            .ok_or(ServiceError::NoActiveTab)?;
        let url = tab.url.unwrap_or_default();
        if !url.contains(self.site.domain()) {
            return Err(ServiceError::NotOnSupportedSite { url });
        }
        if !self.site.is_valid_page(&url) {
            return Err(ServiceError::InvalidPage(self.site.invalid_page_message()));
        }
        Ok((tab.id, url))
    }

    async fn ready_tab(&self) -> Result<(TabId, String), ServiceError> {
        let (tab, url) = self.checked_tab().await?;
        self.bridge
            .ensure_ready(tab, self.site.name(), Some(self.site.script_filename()))
            .await?;
        Ok((tab, url))
    }

    /// Extract the active tab's post and comments.
    pub async fn extract_data(&self) -> Result<ContentData, ServiceError> {
        let (tab, url) = self.ready_tab().await?;
        let action = format!("extract.{}", self.site.key());
        let response = self
            .bridge
            .request(tab, Request::new(action), self.extract_timeout)
            .await?;

        if !response.success {
            let message = response
                .error
                .unwrap_or_else(|| format!("Failed to extract {} data", self.site));
            warn!(site = %self.site, %tab, error = %message, "extraction failed");
            return Err(ServiceError::ExtractionFailed(message));
        }
        let raw = response.data.ok_or_else(|| {
            ServiceError::ExtractionFailed(format!("No {} data returned from the page", self.site))
        })?;
        let data = RawData::decode(self.site, raw)
            .map_err(|e| ServiceError::ExtractionFailed(e.to_string()))?
            .into_content(&url);

        info!(site = %self.site, comments = data.comments.len(), "extracted content");
        Ok(data)
    }

    /// Start the summary stream for `data`, optionally with a custom
    /// prompt template.
    pub async fn summarize_data(
        &self,
        data: &ContentData,
        custom_prompt: Option<&str>,
    ) -> Result<FragmentStream, ServiceError> {
        Ok(self.summary.stream_summary(data, custom_prompt).await?)
    }

    /// Stop the active summary stream, if any.
    pub fn stop_summarization(&self) {
        self.summary.stop_summarization();
    }

    /// Mark the comments written by `username`; returns how many matched.
    pub async fn highlight_user_comments(&self, username: &str) -> Result<usize, ServiceError> {
        let username = username.trim();
        if username.is_empty() {
            return Err(ServiceError::HighlightFailed(
                "Please enter a username to highlight.".to_string(),
            ));
        }
        let (tab, _) = self.ready_tab().await?;
        let action = format!("highlight.{}", self.site.key());
        let request = Request::new(action).with("username", username);
        let response = self
            .bridge
            .request(tab, request, self.highlight_timeout)
            .await?;

        if !response.success {
            return Err(ServiceError::HighlightFailed(response.error.unwrap_or_else(
                || format!("Failed to highlight comments from {username}"),
            )));
        }
        let matched = response
            .data
            .as_ref()
            .and_then(|data| data.get("matched"))
            .and_then(|matched| matched.as_u64())
            .unwrap_or_default() as usize;
        info!(site = %self.site, username, matched, "highlighted comments");
        Ok(matched)
    }
}

/// Builds the content service for a site, sharing one bridge and one
/// summary engine.
#[derive(Clone)]
pub struct ContentServiceFactory {
    bridge: MessagingBridge,
    summary: Arc<SummaryService>,
    extract_timeout: Duration,
    highlight_timeout: Duration,
}

impl ContentServiceFactory {
    pub fn new(host: Arc<dyn TabHost>, summary: Arc<SummaryService>, config: &BridgeConfig) -> Self {
        Self {
            bridge: MessagingBridge::new(host).with_ping_timeout(config.ping_timeout()),
            summary,
            extract_timeout: config.extract_timeout(),
            highlight_timeout: config.highlight_timeout(),
        }
    }

    /// Service for a known site.
    pub fn create(&self, site: Site) -> ContentService {
        ContentService::new(site, self.bridge.clone(), self.summary.clone())
            .with_timeouts(self.extract_timeout, self.highlight_timeout)
    }

    /// Service for the site of the active tab.
    pub async fn for_active_tab(&self) -> Result<ContentService, ServiceError> {
        let host = self.bridge.host();
        let tab = host.active_tab().await.ok_or(ServiceError::NoActiveTab)?;
        let url = tab.url.unwrap_or_default();
        let site = SiteDetector::detect(&url).ok_or(ServiceError::NotOnSupportedSite { url })?;
        Ok(self.create(site))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridge::{Response, SendError, Tab};
    use crate::storage::SettingsStore;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use serde_json::json;
    use tempfile::TempDir;

    /// Host with one tab that records every message and answers from a script.
    struct ScriptedHost {
        url: Option<String>,
        sent: Mutex<Vec<String>>,
        injected: Mutex<usize>,
        reply: fn(&Request) -> Response,
    }

    impl ScriptedHost {
        fn new(url: &str, reply: fn(&Request) -> Response) -> Arc<Self> {
            Arc::new(Self {
                url: Some(url.to_string()),
                sent: Mutex::new(Vec::new()),
                injected: Mutex::new(0),
                reply,
            })
        }
    }

    #[async_trait]
    impl TabHost for ScriptedHost {
        async fn active_tab(&self) -> Option<Tab> {
            Some(Tab {
                id: TabId(7),
                url: self.url.clone(),
            })
        }

        async fn send_message(&self, _tab: TabId, request: Request) -> Result<Response, SendError> {
            self.sent.lock().push(request.action.clone());
            Ok((self.reply)(&request))
        }

        async fn inject_scripts(&self, _tab: TabId, _files: &[&str]) -> Result<(), SendError> {
            *self.injected.lock() += 1;
            Ok(())
        }
    }

    fn summary() -> (Arc<SummaryService>, TempDir) {
        let dir = TempDir::new().unwrap();
        let store = SettingsStore::open(dir.path()).unwrap();
        (Arc::new(SummaryService::new(reqwest::Client::new(), store)), dir)
    }

    fn service(site: Site, host: Arc<ScriptedHost>) -> (ContentService, TempDir) {
        let (summary, dir) = summary();
        (ContentService::new(site, MessagingBridge::new(host), summary), dir)
    }

    fn hn_reply(request: &Request) -> Response {
        match request.action.as_str() {
            "ping" => Response::ok(None),
            "extract.hackernews" => Response::ok(Some(json!({
                "title": "Launch",
                "url": "https://example.com",
                "itemUrl": "https://news.ycombinator.com/item?id=9",
                "content": null,
                "author": "pg",
                "score": "12",
                "age": null,
                "commentCount": "1",
                "comments": [{"author": "alice", "content": "Neat"}],
            }))),
            "highlight.hackernews" => Response::ok(Some(json!({"username": "alice", "matched": 2}))),
            other => Response::failure(format!("Unknown action: {other}")),
        }
    }

    #[tokio::test]
    async fn test_invalid_page_fails_before_messaging() {
        let host = ScriptedHost::new("https://www.youtube.com/feed/trending", hn_reply);
        let (service, _dir) = service(Site::YouTube, host.clone());
        let err = service.extract_data().await.unwrap_err();
        assert!(matches!(err, ServiceError::InvalidPage(_)));
        assert!(err.to_string().contains("YouTube video page"));
        assert!(host.sent.lock().is_empty());
        assert_eq!(*host.injected.lock(), 0);
    }

    #[tokio::test]
    async fn test_wrong_domain_is_not_supported() {
        let host = ScriptedHost::new("https://example.com/item?id=1", hn_reply);
        let (service, _dir) = service(Site::HackerNews, host.clone());
        assert!(matches!(
            service.extract_data().await,
            Err(ServiceError::NotOnSupportedSite { .. })
        ));
        assert!(host.sent.lock().is_empty());
    }

    #[tokio::test]
    async fn test_extract_converts_raw_data() {
        let host = ScriptedHost::new("https://news.ycombinator.com/item?id=9", hn_reply);
        let (service, _dir) = service(Site::HackerNews, host.clone());
        let data = service.extract_data().await.unwrap();
        assert_eq!(data.site, "HackerNews");
        assert_eq!(data.title.as_deref(), Some("Launch"));
        assert_eq!(data.content.as_deref(), Some(""));
        assert_eq!(data.comments.len(), 1);
        assert_eq!(*host.sent.lock(), vec!["ping", "extract.hackernews"]);
    }

    #[tokio::test]
    async fn test_agent_failure_message_passes_through() {
        fn failing(request: &Request) -> Response {
            match request.action.as_str() {
                "ping" => Response::ok(None),
                _ => Response::failure("Failed to extract Reddit data: could not find the Reddit post on this page"),
            }
        }
        let host = ScriptedHost::new("https://www.reddit.com/r/rust/comments/x/y/", failing);
        let (service, _dir) = service(Site::Reddit, host);
        let err = service.extract_data().await.unwrap_err();
        assert_eq!(
            err.to_string(),
            "Failed to extract Reddit data: could not find the Reddit post on this page"
        );
    }

    #[tokio::test]
    async fn test_highlight_reports_matches() {
        let host = ScriptedHost::new("https://news.ycombinator.com/item?id=9", hn_reply);
        let (service, _dir) = service(Site::HackerNews, host.clone());
        assert_eq!(service.highlight_user_comments(" alice ").await.unwrap(), 2);
        assert!(matches!(
            service.highlight_user_comments("").await,
            Err(ServiceError::HighlightFailed(_))
        ));
    }

    #[tokio::test]
    async fn test_factory_picks_site_from_active_tab() {
        let (summary, _dir) = summary();
        let host = ScriptedHost::new("https://www.youtube.com/watch?v=abc", hn_reply);
        let factory = ContentServiceFactory::new(host.clone(), summary.clone(), &BridgeConfig::default());
        assert_eq!(factory.for_active_tab().await.unwrap().site(), Site::YouTube);
        assert_eq!(SiteDetector::current_site(host.as_ref()).await, Some(Site::YouTube));

        let elsewhere = ScriptedHost::new("https://example.com", hn_reply);
        let factory = ContentServiceFactory::new(elsewhere, summary, &BridgeConfig::default());
        assert!(matches!(
            factory.for_active_tab().await,
            Err(ServiceError::NotOnSupportedSite { .. })
        ));
    }

    #[tokio::test]
    async fn test_summarize_without_profile() {
        let host = ScriptedHost::new("https://news.ycombinator.com/item?id=9", hn_reply);
        let (service, _dir) = service(Site::HackerNews, host);
        let data = service.extract_data().await.unwrap();
        let err = service.summarize_data(&data, None).await.unwrap_err();
        assert!(matches!(err, ServiceError::Summary(SummaryError::NoProfileConfigured)));
        service.stop_summarization();
    }
}
