//! In-process browser host: one tokio task per tab runs that tab's agent.
//!
//! Opening a tab on a supported site starts its agent with the base and
//! site scripts already loaded, the way declared content scripts behave.
//! Navigation tears the agent down; only injection brings it back.

use crate::agent::{Agent, Page};
use crate::bridge::{Request, Response, SendError, Tab, TabHost, TabId, BASE_SCRIPT};
use crate::content::Site;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::BTreeMap;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

const AGENT_QUEUE: usize = 32;

enum AgentMessage {
    Request(Request, oneshot::Sender<Response>),
    Load(Vec<String>, oneshot::Sender<Result<(), SendError>>),
}

struct TabSlot {
    page: Page,
    agent: Option<mpsc::Sender<AgentMessage>>,
}

#[derive(Default)]
struct TabState {
    tabs: BTreeMap<TabId, TabSlot>,
    active: Option<TabId>,
    next_id: u32,
}

/// In-process tab host: each tab's agent runs on its own tokio task.
pub struct LocalTabs {
    state: Mutex<TabState>,
    content_scripts: bool,
}

impl Default for LocalTabs {
    fn default() -> Self {
        Self::new()
    }
}

impl LocalTabs {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(TabState::default()),
            content_scripts: true,
        }
    }

    /// A host that never starts agents on its own; every tab needs an
    /// explicit injection first.
    pub fn without_content_scripts() -> Self {
        Self {
            content_scripts: false,
            ..Self::new()
        }
    }

    /// Open a tab and make it active. Must be called inside a tokio runtime.
    pub fn open(&self, page: Page) -> TabId {
        let mut state = self.state.lock();
        state.next_id += 1;
        let id = TabId(state.next_id);
        let agent = self.declared_agent(&page);
        state.tabs.insert(id, TabSlot { page, agent });
        state.active = Some(id);
        debug!(tab = %id, "opened tab");
        id
    }

    /// Make `tab` the active tab.
    pub fn activate(&self, tab: TabId) -> Result<(), SendError> {
        let mut state = self.state.lock();
        if !state.tabs.contains_key(&tab) {
            return Err(SendError::NoTab(tab));
        }
        state.active = Some(tab);
        Ok(())
    }

    /// Close `tab`; its agent task ends once the sender is dropped.
    pub fn close(&self, tab: TabId) {
        let mut state = self.state.lock();
        state.tabs.remove(&tab);
        if state.active == Some(tab) {
            state.active = None;
        }
    }

    /// Load a new document into the tab. The old agent and its registry go away.
    pub fn navigate(&self, tab: TabId, page: Page) -> Result<(), SendError> {
        let mut state = self.state.lock();
        let agent = self.declared_agent(&page);
        let slot = state.tabs.get_mut(&tab).ok_or(SendError::NoTab(tab))?;
        slot.page = page;
        slot.agent = agent;
        Ok(())
    }

    /// Drop the tab's agent without touching the page, as when the extension
    /// reloads underneath an open tab.
    pub fn detach_agent(&self, tab: TabId) {
        if let Some(slot) = self.state.lock().tabs.get_mut(&tab) {
            slot.agent = None;
        }
    }

    fn declared_agent(&self, page: &Page) -> Option<mpsc::Sender<AgentMessage>> {
        if !self.content_scripts {
            return None;
        }
        let site = Site::detect(&page.url)?;
        let mut agent = Agent::new(page.clone());
        for script in [BASE_SCRIPT, site.script_filename()] {
            if let Err(e) = agent.load_script(script) {
                warn!(error = %e, "declared content script failed to load");
            }
        }
        Some(spawn_agent(agent))
    }

    fn agent_sender(&self, tab: TabId) -> Result<mpsc::Sender<AgentMessage>, SendError> {
        let state = self.state.lock();
        let slot = state.tabs.get(&tab).ok_or(SendError::NoTab(tab))?;
        slot.agent
            .as_ref()
            .filter(|sender| !sender.is_closed())
            .cloned()
            .ok_or(SendError::NoReceiver)
    }
}

fn spawn_agent(mut agent: Agent) -> mpsc::Sender<AgentMessage> {
    let (tx, mut rx) = mpsc::channel(AGENT_QUEUE);
    tokio::spawn(async move {
        while let Some(message) = rx.recv().await {
            match message {
                AgentMessage::Request(request, reply) => {
                    let response = agent.handle(&request);
                    let _ = reply.send(response);
                }
                AgentMessage::Load(files, reply) => {
                    let result = files.iter().try_for_each(|file| {
                        agent
                            .load_script(file)
                            .map_err(|e| SendError::Injection(e.to_string()))
                    });
                    let _ = reply.send(result);
                }
            }
        }
        debug!(url = %agent.page().url, "agent stopped");
    });
    tx
}

#[async_trait]
impl TabHost for LocalTabs {
    async fn active_tab(&self) -> Option<Tab> {
        let state = self.state.lock();
        let id = state.active?;
        state.tabs.get(&id).map(|slot| Tab {
            id,
            url: Some(slot.page.url.clone()),
        })
    }

    async fn send_message(&self, tab: TabId, request: Request) -> Result<Response, SendError> {
        let sender = self.agent_sender(tab)?;
        let (reply_tx, reply_rx) = oneshot::channel();
        sender
            .send(AgentMessage::Request(request, reply_tx))
            .await
            .map_err(|_| SendError::NoReceiver)?;
        reply_rx.await.map_err(|_| SendError::NoReceiver)
    }

    async fn inject_scripts(&self, tab: TabId, files: &[&str]) -> Result<(), SendError> {
        let sender = match self.agent_sender(tab) {
            Ok(sender) => sender,
            Err(SendError::NoReceiver) => {
                let mut state = self.state.lock();
                let slot = state.tabs.get_mut(&tab).ok_or(SendError::NoTab(tab))?;
                let sender = spawn_agent(Agent::new(slot.page.clone()));
                slot.agent = Some(sender.clone());
                sender
            }
            Err(e) => return Err(e),
        };
        let (reply_tx, reply_rx) = oneshot::channel();
        let files = files.iter().map(|file| file.to_string()).collect();
        sender
            .send(AgentMessage::Load(files, reply_tx))
            .await
            .map_err(|_| SendError::NoReceiver)?;
        reply_rx.await.map_err(|_| SendError::NoReceiver)?
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const HN_URL: &str = "https://news.ycombinator.com/item?id=1";
    const HN_HTML: &str = r#"<html><body><table class="fatitem"><tr class="athing submission"><td><span class="titleline"><a href="https://a.b">T</a></span></td></tr></table></body></html>"#;

    #[tokio::test]
    async fn test_declared_agent_answers() {
        let tabs = LocalTabs::new();
        let tab = tabs.open(Page::new(HN_URL, HN_HTML));
        assert_eq!(tabs.active_tab().await.map(|t| t.id), Some(tab));

        let response = tabs.send_message(tab, Request::new("extract.hackernews")).await.unwrap();
        assert!(response.success);
        assert_eq!(response.data.unwrap()["title"], "T");
    }

    #[tokio::test]
    async fn test_no_agent_until_injected() {
        let tabs = LocalTabs::without_content_scripts();
        let tab = tabs.open(Page::new(HN_URL, HN_HTML));
        assert_eq!(
            tabs.send_message(tab, Request::new("ping")).await,
            Err(SendError::NoReceiver)
        );

        tabs.inject_scripts(tab, &[BASE_SCRIPT, "hacker-news-content.js"])
            .await
            .unwrap();
        let response = tabs.send_message(tab, Request::new("ping")).await.unwrap();
        assert_eq!(response.site.as_deref(), Some("hackernews"));
    }

    #[tokio::test]
    async fn test_navigation_replaces_agent() {
        let tabs = LocalTabs::new();
        let tab = tabs.open(Page::new(HN_URL, HN_HTML));
        tabs.navigate(tab, Page::new("https://example.com/", "<html></html>"))
            .unwrap();
        assert_eq!(
            tabs.send_message(tab, Request::new("ping")).await,
            Err(SendError::NoReceiver)
        );
    }

    #[tokio::test]
    async fn test_unknown_script_injection_fails() {
        let tabs = LocalTabs::new();
        let tab = tabs.open(Page::new(HN_URL, HN_HTML));
        let err = tabs.inject_scripts(tab, &["nope.js"]).await.unwrap_err();
        assert!(matches!(err, SendError::Injection(_)));
    }

    #[tokio::test]
    async fn test_activate_and_close() {
        let tabs = LocalTabs::new();
        let first = tabs.open(Page::new(HN_URL, HN_HTML));
        let second = tabs.open(Page::new("https://example.com/", "<html></html>"));
        assert_eq!(tabs.active_tab().await.map(|t| t.id), Some(second));

        tabs.activate(first).unwrap();
        let active = tabs.active_tab().await.unwrap();
        assert_eq!(active.id, first);
        assert_eq!(active.url.as_deref(), Some(HN_URL));
        assert_eq!(tabs.activate(TabId(99)), Err(SendError::NoTab(TabId(99))));

        tabs.close(first);
        assert!(tabs.active_tab().await.is_none());
        assert_eq!(
            tabs.send_message(first, Request::new("ping")).await,
            Err(SendError::NoTab(first))
        );
        tabs.activate(second).unwrap();
        assert_eq!(tabs.active_tab().await.map(|t| t.id), Some(second));
    }

    #[tokio::test]
    async fn test_unknown_tab() {
        let tabs = LocalTabs::new();
        assert_eq!(
            tabs.send_message(TabId(99), Request::new("ping")).await,
            Err(SendError::NoTab(TabId(99)))
        );
        assert!(tabs.active_tab().await.is_none());
    }
}
