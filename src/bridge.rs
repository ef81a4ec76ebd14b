//! Request/response channel between the UI side and a page agent.
//!
//! Every round-trip is bounded by a timeout. A stale or missing agent gets
//! exactly one recovery attempt (script re-injection) in
//! [`MessagingBridge::ensure_ready`].

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::time::timeout;
use tracing::{debug, error, info, warn};

/// Script that installs the page agent itself.
pub const BASE_SCRIPT: &str = "content.js";

pub const DEFAULT_PING_TIMEOUT: Duration = Duration::from_millis(1000);

/// Host-assigned tab identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TabId(pub u32);

impl fmt::Display for TabId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A tab as seen by the host: its id and current URL, if any.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tab {
    pub id: TabId,
    pub url: Option<String>,
}

/// Action envelope sent to the agent: `{"action": ..., <payload fields>}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Request {
    pub action: String,
    #[serde(flatten)]
    pub payload: Map<String, Value>,
}

impl Request {
    pub fn new(action: impl Into<String>) -> Self {
        Self {
            action: action.into(),
            payload: Map::new(),
        }
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.payload.insert(key.into(), value.into());
        self
    }

    /// String payload field, if present.
    pub fn field(&self, key: &str) -> Option<&str> {
        self.payload.get(key).and_then(Value::as_str)
    }
}

/// Agent reply: `{"success": bool, "data"?, "error"?, "site"?}`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Response {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub site: Option<String>,
}

impl Response {
    pub fn ok(data: Option<Value>) -> Self {
        Self {
            success: true,
            data,
            ..Self::default()
        }
    }

    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(error.into()),
            ..Self::default()
        }
    }

    pub fn with_site(mut self, site: Option<String>) -> Self {
        self.site = site;
        self
    }
}

/// Delivery failures reported by a [`TabHost`].
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SendError {
    #[error("Could not establish connection. Receiving end does not exist.")]
    NoReceiver,
    #[error("no tab with id {0}")]
    NoTab(TabId),
    #[error("script injection failed: {0}")]
    Injection(String),
}

/// Failures of a bridge call, after any recovery.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum BridgeError {
    #[error("Timeout ({timeout_ms}ms) waiting for response to {action} from tab {tab}")]
    Timeout {
        action: String,
        tab: TabId,
        timeout_ms: u128,
    },
    #[error(transparent)]
    Send(#[from] SendError),
    #[error("Could not communicate with the page extension on {site}. Please try refreshing the page.")]
    AgentUnreachable { site: String },
}

/// The browser side: tabs, message delivery and script injection.
#[async_trait]
pub trait TabHost: Send + Sync {
    /// The focused tab of the current window, if any.
    async fn active_tab(&self) -> Option<Tab>;

    /// Deliver a request to the tab's agent and wait for its reply.
    async fn send_message(&self, tab: TabId, request: Request) -> Result<Response, SendError>;

    /// Run the named scripts in the tab's page context.
    async fn inject_scripts(&self, tab: TabId, files: &[&str]) -> Result<(), SendError>;
}

/// Request/response messaging with tab agents, with readiness checks and timeouts.
#[derive(Clone)]
pub struct MessagingBridge {
    host: Arc<dyn TabHost>,
    ping_timeout: Duration,
}

impl MessagingBridge {
    pub fn new(host: Arc<dyn TabHost>) -> Self {
        Self {
            host,
            ping_timeout: DEFAULT_PING_TIMEOUT,
        }
    }

    pub fn with_ping_timeout(mut self, ping_timeout: Duration) -> Self {
        self.ping_timeout = ping_timeout;
        self
    }

    pub fn host(&self) -> &Arc<dyn TabHost> {
        &self.host
    }

    /// Liveness probe. Fails on timeout or when nothing listens in the tab.
    pub async fn ping(&self, tab: TabId) -> Result<Response, BridgeError> {
        let response = self
            .request(tab, Request::new("ping"), self.ping_timeout)
            .await?;
        debug!(%tab, site = ?response.site, "ping answered");
        Ok(response)
    }

    /// Make sure an agent answers in `tab`, re-injecting the agent and the
    /// site script once if the first ping fails.
    pub async fn ensure_ready(
        &self,
        tab: TabId,
        site_name: &str,
        site_script: Option<&str>,
    ) -> Result<(), BridgeError> {
        let first = match self.ping(tab).await {
            Ok(_) => return Ok(()),
            Err(e) => e,
        };
        warn!(%tab, error = %first, "ping failed, re-injecting page scripts");

        let mut files = vec![BASE_SCRIPT];
        match site_script {
            Some(script) => files.push(script),
            None => warn!(site = site_name, "no site-specific script to inject"),
        }

        let recovered = async {
            timeout(self.ping_timeout, self.host.inject_scripts(tab, &files))
                .await
                .map_err(|_| BridgeError::Timeout {
                    action: "script injection".to_string(),
                    tab,
                    timeout_ms: self.ping_timeout.as_millis(),
                })??;
            info!(%tab, files = ?files, "injected scripts, pinging again");
            self.ping(tab).await
        }
        .await;

        match recovered {
            Ok(_) => Ok(()),
            Err(e) => {
                error!(%tab, error = %e, "page agent recovery failed");
                Err(BridgeError::AgentUnreachable {
                    site: site_name.to_string(),
                })
            }
        }
    }

    /// Send `request` and wait at most `limit` for the reply.
    pub async fn request(
        &self,
        tab: TabId,
        request: Request,
        limit: Duration,
    ) -> Result<Response, BridgeError> {
        let action = request.action.clone();
        debug!(%tab, action = %action, "sending request");
        match timeout(limit, self.host.send_message(tab, request)).await {
            Ok(reply) => Ok(reply?),
            Err(_) => Err(BridgeError::Timeout {
                action,
                tab,
                timeout_ms: limit.as_millis(),
            }),
        }
    }
}
