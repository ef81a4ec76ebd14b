//! Site extractors.
//!
//! Each extractor reads a parsed page and returns its site's raw structure.
//! A malformed comment is skipped and logged, never fatal; a page without
//! the post itself is an [`ExtractError`].

pub mod hackernews;
pub mod reddit;
pub mod youtube;

use crate::content::{ContentData, Site};
use scraper::{ElementRef, Html, Selector};
use serde::Serialize;
use thiserror::Error;

pub use hackernews::{HackerNewsComment, HackerNewsPost};
pub use reddit::{RedditComment, RedditPost};
pub use youtube::{YouTubeComment, YouTubeVideo};

/// Why a page could not be extracted.
#[derive(Error, Debug)]
pub enum ExtractError {
    #[error("could not find {0} on this page")]
    MissingElement(&'static str),
    #[error("unexpected {site} data: {source}")]
    InvalidData {
        site: Site,
        #[source]
        source: serde_json::Error,
    },
}

/// Reads the page and returns the site's raw data.
pub type ExtractorFn = fn(&Html, &str) -> Result<RawData, ExtractError>;

/// Counts the comments written by `username`.
pub type HighlighterFn = fn(&Html, &str) -> usize;

/// Raw per-site extraction result, as sent across the messaging bridge.
///
/// Untagged on the wire; the receiving side knows which site it asked for
/// and decodes with [`RawData::decode`].
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum RawData {
    Reddit(RedditPost),
    YouTube(YouTubeVideo),
    HackerNews(HackerNewsPost),
}

impl RawData {
    /// Decode the `data` field of an extraction reply for a known site.
    pub fn decode(site: Site, value: serde_json::Value) -> Result<Self, ExtractError> {
        let invalid = |source| ExtractError::InvalidData { site, source };
        Ok(match site {
            Site::Reddit => RawData::Reddit(serde_json::from_value(value).map_err(invalid)?),
            Site::YouTube => RawData::YouTube(serde_json::from_value(value).map_err(invalid)?),
            Site::HackerNews => {
                RawData::HackerNews(serde_json::from_value(value).map_err(invalid)?)
            }
        })
    }

    pub fn into_content(self, url: &str) -> ContentData {
        match self {
            RawData::Reddit(post) => post.into_content(url),
            RawData::YouTube(video) => video.into_content(url),
            RawData::HackerNews(post) => post.into_content(url),
        }
    }
}

/// Extractor and highlighter a site script installs.
pub fn site_functions(site: Site) -> (ExtractorFn, Option<HighlighterFn>) {
    match site {
        Site::Reddit => (reddit::extract, Some(reddit::highlight)),
        Site::YouTube => (youtube::extract, Some(youtube::highlight)),
        Site::HackerNews => (hackernews::extract, Some(hackernews::highlight)),
    }
}

pub(crate) fn selector(css: &str) -> Selector {
    Selector::parse(css).expect("static selector must parse")
}

/// Whitespace-trimmed text of an element.
pub(crate) fn element_text(element: ElementRef<'_>) -> String {
    element.text().collect::<String>().trim().to_string()
}

/// Trimmed text of the first match, `None` when missing or blank.
pub(crate) fn first_text(scope: ElementRef<'_>, selector: &Selector) -> Option<String> {
    scope
        .select(selector)
        .next()
        .map(element_text)
        .filter(|text| !text.is_empty())
}
