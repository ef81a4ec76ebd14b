//! The page agent: lives in a tab, hosts the extraction registry and
//! answers action envelopes from the messaging bridge.
//!
//! Actions are `ping`, `getSite`, and `<verb>.<site>` where verb is
//! `extract`, `get` or `highlight`. Anything else gets a failure envelope;
//! nothing is ever thrown back across the channel.

use crate::bridge::{Request, Response, BASE_SCRIPT};
use crate::content::Site;
use crate::extract::site_functions;
use crate::registry::ExtractionRegistry;
use scraper::Html;
use serde_json::json;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Errors raised while loading scripts into a page.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum AgentError {
    #[error("unknown script: {0}")]
    UnknownScript(String),
}

/// A loaded document: its address and markup.
#[derive(Debug, Clone, PartialEq)]
pub struct Page {
    pub url: String,
    pub html: String,
}

impl Page {
    pub fn new(url: impl Into<String>, html: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            html: html.into(),
        }
    }
}

/// The in-page side of the bridge: one per loaded document.
#[derive(Debug)]
pub struct Agent {
    page: Page,
    registry: ExtractionRegistry,
}

impl Agent {
    pub fn new(page: Page) -> Self {
        Self {
            page,
            registry: ExtractionRegistry::new(),
        }
    }

    pub fn page(&self) -> &Page {
        &self.page
    }

    /// Extractors registered by the scripts loaded so far.
    pub fn registry(&self) -> &ExtractionRegistry {
        &self.registry
    }

    /// Run a page script. The base script is the agent itself; a site script
    /// registers that site's extractor and highlighter.
    pub fn load_script(&mut self, file: &str) -> Result<(), AgentError> {
        if file == BASE_SCRIPT {
            debug!(url = %self.page.url, "base agent script loaded");
            return Ok(());
        }
        let site = Site::from_script(file).ok_or_else(|| AgentError::UnknownScript(file.into()))?;
        let (extract, highlight) = site_functions(site);
        self.registry.register(site, extract, highlight);
        info!(%site, url = %self.page.url, "site script loaded");
        Ok(())
    }

    /// Replace the document. Registrations belong to the old page and are dropped.
    pub fn navigate(&mut self, page: Page) {
        self.page = page;
        self.registry.reset();
    }

    /// Answer one request. Failures come back as a failure envelope, never as an error.
    pub fn handle(&mut self, request: &Request) -> Response {
        match request.action.as_str() {
            "ping" => self.ping(),
            "getSite" => Response::ok(None)
                .with_site(Site::detect(&self.page.url).map(|site| site.key().to_string())),
            action => self.dispatch(action, request),
        }
    }

    fn ping(&self) -> Response {
        let site = self.registry.sites().next().map(|site| site.key().to_string());
        Response::ok(Some(json!({
            "siteScriptLoaded": self.registry.site_script_loaded(),
            "extractorAvailable": self.registry.extractor_available(),
        })))
        .with_site(site)
    }

    fn dispatch(&mut self, action: &str, request: &Request) -> Response {
        let parts: Vec<&str> = action.split('.').collect();
        let [verb, key] = parts.as_slice() else {
            warn!(action, "malformed action");
            return Response::failure(format!("Unknown action: {action}"));
        };
        let verb = verb.to_ascii_lowercase();
        let Some(site) = Site::from_key(key) else {
            return Response::failure(format!("No extractor registered for site: {key}"));
        };
        let site_key = Some(site.key().to_string());

        match verb.as_str() {
            "extract" | "get" => self.extract(site).with_site(site_key),
            "highlight" => match request.field("username") {
                Some(username) => self.highlight(site, username).with_site(site_key),
                None => Response::failure("Missing username for highlight request"),
            },
            _ => {
                warn!(action, "unknown action");
                Response::failure(format!("Unknown action: {action}"))
            }
        }
    }

    fn extract(&self, site: Site) -> Response {
        let Some(registration) = self.registry.get(site) else {
            return Response::failure(format!("No extractor registered for site: {}", site.key()));
        };
        let document = Html::parse_document(&self.page.html);
        match (registration.extract)(&document, &self.page.url) {
            Ok(raw) => match serde_json::to_value(raw) {
                Ok(data) => Response::ok(Some(data)),
                Err(e) => Response::failure(format!("Failed to encode {site} data: {e}")),
            },
            Err(e) => {
                warn!(%site, error = %e, "extraction failed");
                Response::failure(format!("Failed to extract {site} data: {e}"))
            }
        }
    }

    fn highlight(&self, site: Site, username: &str) -> Response {
        let Some(highlight) = self.registry.get(site).and_then(|r| r.highlight) else {
            return Response::failure(format!("No highlighter registered for site: {}", site.key()));
        };
        let document = Html::parse_document(&self.page.html);
        let matched = highlight(&document, username);
        if matched == 0 {
            return Response::failure(format!("No comments found from user: {username}"));
        }
        debug!(%site, username, matched, "highlighted comments");
        Response::ok(Some(json!({ "username": username, "matched": matched })))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const REDDIT_URL: &str = "https://www.reddit.com/r/rust/comments/abc/title/";
    const REDDIT_HTML: &str = r#"<html><body>
        <shreddit-post post-title="Hello" author="op" score="5"></shreddit-post>
        <shreddit-comment author="alice" score="3" depth="0"><div slot="comment"><p>hi</p></div></shreddit-comment>
        </body></html>"#;

    fn agent_with_reddit() -> Agent {
        let mut agent = Agent::new(Page::new(REDDIT_URL, REDDIT_HTML));
        agent.load_script(BASE_SCRIPT).unwrap();
        agent.load_script("reddit-content.js").unwrap();
        agent
    }

    #[test]
    fn test_ping_reports_liveness() {
        let mut agent = Agent::new(Page::new(REDDIT_URL, REDDIT_HTML));
        let response = agent.handle(&Request::new("ping"));
        assert!(response.success);
        assert_eq!(response.data.unwrap()["extractorAvailable"], false);

        let mut agent = agent_with_reddit();
        let response = agent.handle(&Request::new("ping"));
        assert_eq!(response.site.as_deref(), Some("reddit"));
        assert_eq!(response.data.unwrap()["siteScriptLoaded"], true);
    }

    #[test]
    fn test_extract_and_get_aliases() {
        let mut agent = agent_with_reddit();
        for action in ["extract.reddit", "get.reddit", "Extract.Reddit"] {
            let response = agent.handle(&Request::new(action));
            assert!(response.success, "{action}: {:?}", response.error);
            let data = response.data.unwrap();
            assert_eq!(data["title"], "Hello");
            assert_eq!(data["comments"][0]["author"], "alice");
        }
    }

    #[test]
    fn test_malformed_and_unknown_actions_fail_softly() {
        let mut agent = agent_with_reddit();
        for action in ["extract.reddit.extra", "extract", "explode.reddit"] {
            let response = agent.handle(&Request::new(action));
            assert!(!response.success);
            assert!(response.error.unwrap().starts_with("Unknown action"));
        }
        let response = agent.handle(&Request::new("extract.myspace"));
        assert!(!response.success);
    }

    #[test]
    fn test_extract_without_registration_fails() {
        let mut agent = Agent::new(Page::new(REDDIT_URL, REDDIT_HTML));
        let response = agent.handle(&Request::new("extract.reddit"));
        assert!(!response.success);
        assert!(response.error.unwrap().contains("No extractor registered"));
    }

    #[test]
    fn test_highlight_requires_matches() {
        let mut agent = agent_with_reddit();
        let hit = agent.handle(&Request::new("highlight.reddit").with("username", "Alice"));
        assert!(hit.success);
        assert_eq!(hit.data.unwrap()["matched"], 1);

        let miss = agent.handle(&Request::new("highlight.reddit").with("username", "zed"));
        assert!(!miss.success);

        let missing = agent.handle(&Request::new("highlight.reddit"));
        assert!(!missing.success);
    }

    #[test]
    fn test_navigation_resets_registry() {
        let mut agent = agent_with_reddit();
        agent.navigate(Page::new("https://www.youtube.com/watch?v=1", "<html></html>"));
        assert!(!agent.registry().extractor_available());
        let response = agent.handle(&Request::new("getSite"));
        assert_eq!(response.site.as_deref(), Some("youtube"));
    }

    #[test]
    fn test_unknown_script_rejected() {
        let mut agent = Agent::new(Page::new(REDDIT_URL, REDDIT_HTML));
        assert_eq!(
            agent.load_script("evil.js"),
            Err(AgentError::UnknownScript("evil.js".to_string()))
        );
    }
}
