//! # Plify
//!
//! Extracts posts and comments from Reddit, YouTube and Hacker News pages
//! and streams an LLM summary of the discussion.
//!
//! ## Features
//!
//! - **Site Extractors**: one per site, registered into a per-page registry by a page agent
//! - **Messaging Bridge**: timed request/response with the agent and a single re-injection recovery
//! - **Streaming Summaries**: SSE parsing into reasoning and content fragments, cancellable mid-stream

pub mod agent;
pub mod bridge;
pub mod config;
pub mod content;
pub mod extract;
pub mod page;
pub mod profile;
pub mod prompt;
pub mod registry;
pub mod service;
pub mod storage;
pub mod stream;
pub mod summary;
pub mod tabs;
pub mod ui;

pub use agent::{Agent, Page};
pub use bridge::{MessagingBridge, TabHost, TabId};
pub use config::Config;
pub use content::{ContentComment, ContentData, Site};
pub use profile::{ApiSettings, Profile, ProviderType};
pub use registry::ExtractionRegistry;
pub use service::{ContentService, ContentServiceFactory, ServiceError, SiteDetector};
pub use storage::SettingsStore;
pub use stream::{FragmentKind, FragmentStream, StreamFragment};
pub use summary::{SummaryError, SummaryService};
pub use tabs::LocalTabs;
