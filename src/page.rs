//! Loading page documents to open in a tab: over HTTP, or from a saved file.
//!
//! Uses reqwest for fetching. Parsing is left to the page agent.

use crate::agent::Page;
use crate::config::HttpConfig;
use reqwest::Client;
use std::path::Path;
use thiserror::Error;
use tracing::info;

/// User-Agent string sent with page fetches and API calls
const USER_AGENT: &str = concat!("plify/", env!("CARGO_PKG_VERSION"));

/// Errors that can occur while loading a page.
#[derive(Error, Debug)]
pub enum PageError {
    #[error("failed to fetch URL: {0}")]
    FetchError(#[from] reqwest::Error),
    #[error("{url} answered with HTTP {status}")]
    Status { url: String, status: u16 },
    #[error("failed to read {path}: {source}")]
    ReadError {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("no content found at {0}")]
    NoContent(String),
}

/// Create the shared HTTP client.
pub fn http_client(config: &HttpConfig) -> Result<Client, reqwest::Error> {
    Client::builder()
        .user_agent(USER_AGENT)
        .connect_timeout(config.connect_timeout())
        .build()
}

/// Fetch the document at `url`.
pub async fn fetch_page(client: &Client, url: &str) -> Result<Page, PageError> {
    let response = client.get(url).send().await?;
    let status = response.status();
    if !status.is_success() {
        return Err(PageError::Status {
            url: url.to_string(),
            status: status.as_u16(),
        });
    }
    let html = response.text().await?;
    if html.trim().is_empty() {
        return Err(PageError::NoContent(url.to_string()));
    }
    info!(url, bytes = html.len(), "fetched page");
    Ok(Page::new(url, html))
}

/// Read a saved document and present it as loaded from `url`.
pub fn read_page(url: &str, path: &Path) -> Result<Page, PageError> {
    let html = std::fs::read_to_string(path).map_err(|source| PageError::ReadError {
        path: path.display().to_string(),
        source,
    })?;
    if html.trim().is_empty() {
        return Err(PageError::NoContent(path.display().to_string()));
    }
    Ok(Page::new(url, html))
}
