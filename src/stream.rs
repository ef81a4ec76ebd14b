//! Fragment stream over a chat-completions SSE body.
//!
//! Splits the body into lines, reads `data:` payloads and yields typed
//! reasoning/content fragments in wire order. The cancellation token is
//! checked before every line and every chunk read; a cancelled stream just
//! ends. Any terminal state drops the response body.

use crate::summary::{ActiveStreamGuard, SummaryError};
use bytes::Bytes;
use futures::stream::Stream;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::VecDeque;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio_util::sync::{CancellationToken, WaitForCancellationFutureOwned};
use tracing::{debug, info};

const DONE_MARKER: &str = "[DONE]";

/// Which panel a fragment belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FragmentKind {
    Content,
    Reasoning,
}

/// One piece of streamed output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamFragment {
    #[serde(rename = "type")]
    pub kind: FragmentKind,
    pub text: String,
}

impl StreamFragment {
    pub fn content(text: impl Into<String>) -> Self {
        Self {
            kind: FragmentKind::Content,
            text: text.into(),
        }
    }

    pub fn reasoning(text: impl Into<String>) -> Self {
        Self {
            kind: FragmentKind::Reasoning,
            text: text.into(),
        }
    }
}

/// Lifecycle of a [`FragmentStream`]. Every state but `Streaming` is final.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamState {
    Streaming,
    Done,
    Cancelled,
    Failed,
}

/// What one SSE line amounts to.
#[derive(Debug, PartialEq)]
enum LineEvent {
    Skip,
    Done,
    Fragments(Vec<StreamFragment>),
}

type Body = Pin<Box<dyn Stream<Item = Result<Bytes, SummaryError>> + Send>>;

/// Stream of summary fragments read from an SSE response body.
pub struct FragmentStream {
    body: Option<Body>,
    buffer: Vec<u8>,
    pending: VecDeque<StreamFragment>,
    token: CancellationToken,
    cancelled: Pin<Box<WaitForCancellationFutureOwned>>,
    state: StreamState,
    guard: Option<ActiveStreamGuard>,
}

impl fmt::Debug for FragmentStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FragmentStream")
            .field("state", &self.state)
            .field("buffered", &self.buffer.len())
            .field("pending", &self.pending.len())
            .finish()
    }
}

impl FragmentStream {
    pub fn new<S, E>(body: S, token: CancellationToken) -> Self
    where
        S: Stream<Item = Result<Bytes, E>> + Send + 'static,
        E: fmt::Display,
    {
        use futures::TryStreamExt;
        let body = body.map_err(|e| SummaryError::Network(e.to_string()));
        Self {
            body: Some(Box::pin(body)),
            buffer: Vec::new(),
            pending: VecDeque::new(),
            cancelled: Box::pin(token.clone().cancelled_owned()),
            token,
            state: StreamState::Streaming,
            guard: None,
        }
    }

    /// A stream that was cancelled before any response arrived.
    pub fn cancelled() -> Self {
        let token = CancellationToken::new();
        token.cancel();
        Self {
            body: None,
            buffer: Vec::new(),
            pending: VecDeque::new(),
            cancelled: Box::pin(token.clone().cancelled_owned()),
            token,
            state: StreamState::Cancelled,
            guard: None,
        }
    }

    pub(crate) fn with_guard(mut self, guard: ActiveStreamGuard) -> Self {
        self.guard = Some(guard);
        self
    }

    /// Current lifecycle state.
    pub fn state(&self) -> StreamState {
        self.state
    }

    fn finish(&mut self, state: StreamState) {
        if self.state != StreamState::Streaming {
            return;
        }
        match state {
            StreamState::Cancelled => info!("summary stream cancelled"),
            StreamState::Done => debug!("summary stream finished"),
            _ => debug!(?state, "summary stream stopped"),
        }
        self.state = state;
        self.body = None;
        self.buffer.clear();
        self.guard = None;
    }

    fn next_line(&mut self) -> Option<String> {
        let newline = self.buffer.iter().position(|b| *b == b'\n')?;
        let line: Vec<u8> = self.buffer.drain(..=newline).collect();
        let line = String::from_utf8_lossy(&line);
        Some(line.trim_end_matches(['\n', '\r']).to_string())
    }
}

impl Stream for FragmentStream {
    type Item = Result<StreamFragment, SummaryError>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();

        loop {
            if this.state == StreamState::Streaming && this.token.is_cancelled() {
                this.pending.clear();
                this.finish(StreamState::Cancelled);
            }
            if let Some(fragment) = this.pending.pop_front() {
                return Poll::Ready(Some(Ok(fragment)));
            }
            if this.state != StreamState::Streaming {
                return Poll::Ready(None);
            }

            if let Some(line) = this.next_line() {
                match parse_line(&line) {
                    Ok(LineEvent::Skip) => {}
                    Ok(LineEvent::Done) => this.finish(StreamState::Done),
                    Ok(LineEvent::Fragments(fragments)) => this.pending.extend(fragments),
                    Err(e) => {
                        this.finish(StreamState::Failed);
                        return Poll::Ready(Some(Err(e)));
                    }
                }
                continue;
            }

            let Some(body) = this.body.as_mut() else {
                this.finish(StreamState::Done);
                continue;
            };
            match body.as_mut().poll_next(cx) {
                Poll::Ready(Some(Ok(bytes))) => this.buffer.extend_from_slice(&bytes),
                Poll::Ready(Some(Err(e))) => {
                    this.finish(StreamState::Failed);
                    return Poll::Ready(Some(Err(e)));
                }
                Poll::Ready(None) => {
                    // Flush a final line that lacks its newline.
                    this.body = None;
                    if !this.buffer.is_empty() {
                        this.buffer.push(b'\n');
                    }
                }
                Poll::Pending => {
                    if this.cancelled.as_mut().poll(cx).is_ready() {
                        continue;
                    }
                    return Poll::Pending;
                }
            }
        }
    }
}

fn parse_line(line: &str) -> Result<LineEvent, SummaryError> {
    let Some(payload) = line.strip_prefix("data:") else {
        return Ok(LineEvent::Skip);
    };
    let payload = payload.trim();
    if payload == DONE_MARKER {
        return Ok(LineEvent::Done);
    }

    let json: Value = serde_json::from_str(payload).map_err(|e| {
        SummaryError::StreamParse(format!("{e} (data: {})", snippet(payload)))
    })?;

    if let Some(error) = json.get("error") {
        let message = error
            .get("message")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| error.to_string());
        return Err(SummaryError::Api(message));
    }
    let Some(choices) = json.get("choices") else {
        return Err(SummaryError::StreamParse(format!(
            "invalid response format: {}",
            snippet(payload)
        )));
    };

    let delta = choices.get(0).and_then(|choice| choice.get("delta"));
    let field = |name: &str| {
        delta
            .and_then(|d| d.get(name))
            .and_then(Value::as_str)
            .filter(|text| !text.is_empty())
    };
    let reasoning = field("reasoning_content").or_else(|| field("reasoning"));
    let content = field("content");

    let mut fragments = Vec::with_capacity(2);
    if let Some(text) = reasoning {
        fragments.push(StreamFragment::reasoning(text));
    }
    match content {
        Some(text) => fragments.push(StreamFragment::content(text)),
        // Keep-alive deltas still count as a fragment for consumers that
        // wait on the first one.
        None if reasoning.is_none() => fragments.push(StreamFragment::content("")),
        None => {}
    }
    Ok(LineEvent::Fragments(fragments))
}

fn snippet(payload: &str) -> &str {
    match payload.char_indices().nth(200) {
        Some((end, _)) => &payload[..end],
        None => payload,
    }
}

/// Tracks whether a reasoning panel should collapse: once, on the first
/// non-empty content fragment after reasoning has started.
#[derive(Debug, Default, Clone)]
pub struct ReasoningPanel {
    reasoning_started: bool,
    collapsed: bool,
}

impl ReasoningPanel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a fragment; returns `true` exactly when the panel collapses.
    pub fn observe(&mut self, fragment: &StreamFragment) -> bool {
        match fragment.kind {
            FragmentKind::Reasoning => {
                self.reasoning_started = true;
                false
            }
            FragmentKind::Content => {
                if self.reasoning_started && !self.collapsed && !fragment.text.is_empty() {
                    self.collapsed = true;
                    return true;
                }
                false
            }
        }
    }

    pub fn reasoning_started(&self) -> bool {
        self.reasoning_started
    }

    pub fn collapsed(&self) -> bool {
        self.collapsed
    }
}
