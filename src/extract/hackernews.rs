//! Hacker News item pages (`/item?id=`).

use super::{element_text, first_text, selector, ExtractError, RawData};
use crate::content::{ContentComment, ContentData, Site};
use lazy_static::lazy_static;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use serde::{Deserialize, Serialize};
use tracing::debug;

lazy_static! {
    static ref FAT_ITEM: Selector = selector(".fatitem");
    static ref TITLE_LINK: Selector = selector(".athing.submission .titleline > a");
    static ref SUBLINE: Selector = selector(".subtext .subline");
    static ref SCORE: Selector = selector(".score");
    static ref USER: Selector = selector(".hnuser");
    static ref AGE: Selector = selector(".age a");
    static ref LINK: Selector = selector("a");
    static ref TOP_TEXT: Selector = selector(".toptext");
    static ref COMMENT_ROW: Selector = selector(".comment-tree .comtr");
    static ref COMMENT_TEXT: Selector = selector(".commtext");

    static ref PARAGRAPH_TAG: Regex = Regex::new(r"<p>").expect("valid regex");
    static ref ITALIC_TAG: Regex = Regex::new(r"</?i>").expect("valid regex");
    static ref CODE_BLOCK: Regex =
        Regex::new(r"(?s)<pre><code>(.*?)</code></pre>").expect("valid regex");
    static ref ANCHOR: Regex =
        Regex::new(r#"(?s)<a\s[^>]*?href="([^"]*)"[^>]*>.*?</a>"#).expect("valid regex");
    static ref ANY_TAG: Regex = Regex::new(r"(?s)<.*?>").expect("valid regex");
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HackerNewsComment {
    pub author: Option<String>,
    pub content: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HackerNewsPost {
    pub title: Option<String>,
    /// Submitted link, or the item itself for self-posts.
    pub url: Option<String>,
    pub item_url: Option<String>,
    pub content: Option<String>,
    pub author: Option<String>,
    pub score: Option<String>,
    pub age: Option<String>,
    pub comment_count: Option<String>,
    #[serde(default)]
    pub comments: Vec<HackerNewsComment>,
}

impl HackerNewsPost {
    pub fn into_content(self, url: &str) -> ContentData {
        ContentData {
            site: Site::HackerNews.name().to_string(),
            url: self.item_url.unwrap_or_else(|| url.to_string()),
            title: self.title,
            // Link posts have no text.
            content: Some(self.content.unwrap_or_default()),
            author: self.author,
            score: self.score,
            comments: self
                .comments
                .into_iter()
                .filter(|comment| !comment.content.is_empty() && !is_removed(&comment.content))
                .map(|comment| ContentComment {
                    author: comment.author.unwrap_or_else(|| "unknown".to_string()),
                    content: comment.content,
                    // Comment points are not public on HN.
                    score: None,
                })
                .collect(),
        }
    }
}

/// Extract the item details and its live comments.
pub fn extract(document: &Html, url: &str) -> Result<RawData, ExtractError> {
    let item = document
        .select(&FAT_ITEM)
        .next()
        .ok_or(ExtractError::MissingElement("the Hacker News item"))?;

    let title_link = item.select(&TITLE_LINK).next();
    let mut post = HackerNewsPost {
        title: title_link.map(element_text).filter(|t| !t.is_empty()),
        url: title_link
            .and_then(|link| link.value().attr("href"))
            .map(str::to_string),
        item_url: Some(url.to_string()),
        content: item
            .select(&TOP_TEXT)
            .next()
            .map(|text| html_to_text(&text.inner_html()))
            .filter(|text| !text.is_empty()),
        author: None,
        score: None,
        age: None,
        comment_count: None,
        comments: Vec::new(),
    };

    if let Some(subline) = item.select(&SUBLINE).next() {
        post.author = first_text(subline, &USER);
        post.age = first_text(subline, &AGE);
        post.score = first_text(subline, &SCORE)
            .map(|score| score.trim_end_matches(" points").trim_end_matches(" point").to_string());
        post.comment_count = subline
            .select(&LINK)
            .last()
            .map(element_text)
            .filter(|text| text.contains("comment"))
            .map(|text| {
                text.replace('\u{a0}', " ")
                    .trim_end_matches("comments")
                    .trim_end_matches("comment")
                    .trim()
                    .to_string()
            });
    }

    for (index, row) in document.select(&COMMENT_ROW).enumerate() {
        match read_comment(row) {
            Ok(comment) => post.comments.push(comment),
            Err(reason) => debug!(index, reason, "skipping hacker news comment"),
        }
    }
    debug!(count = post.comments.len(), "extracted hacker news comments");

    Ok(RawData::HackerNews(post))
}

fn read_comment(row: ElementRef<'_>) -> Result<HackerNewsComment, &'static str> {
    let text = row
        .select(&COMMENT_TEXT)
        .next()
        .ok_or("missing comment text")?;
    let plain = element_text(text);
    if plain.contains("[dead]") || plain.contains("[flagged]") {
        return Err("dead or flagged");
    }
    let content = html_to_text(&text.inner_html());
    if is_removed(&content) {
        return Err("deleted");
    }
    if content.is_empty() {
        return Err("empty comment text");
    }
    Ok(HackerNewsComment {
        author: first_text(row, &USER),
        content,
    })
}

fn is_removed(content: &str) -> bool {
    content == "[deleted]"
}

/// Down-convert HN comment markup: paragraphs become blank lines, italics
/// become `*text*`, code blocks are fenced, links collapse to their URL and
/// any other tag is dropped.
pub fn html_to_text(html: &str) -> String {
    let text = PARAGRAPH_TAG.replace_all(html, "\n\n");
    let text = ITALIC_TAG.replace_all(&text, "*");
    let text = CODE_BLOCK.replace_all(&text, "```\n$1\n```");
    let text = ANCHOR.replace_all(&text, "$1");
    let text = ANY_TAG.replace_all(&text, "");
    decode_entities(text.trim())
}

fn decode_entities(text: &str) -> String {
    text.replace("&nbsp;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#x27;", "'")
        .replace("&#39;", "'")
        .replace("&#x2F;", "/")
        .replace("&amp;", "&")
}

/// Number of comments written by `username`, case-insensitive.
pub fn highlight(document: &Html, username: &str) -> usize {
    let wanted = username.to_lowercase();
    document
        .select(&COMMENT_ROW)
        .filter(|row| first_text(*row, &USER).is_some_and(|author| author.to_lowercase() == wanted))
        .count()
}
