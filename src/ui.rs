//! Terminal rendering for extracted content and summary streams.
//!
//! Reasoning text is shown dimmed under a "Thinking" header and closed off
//! with a rule once the answer starts.

use crate::content::ContentData;
use crate::profile::Profile;
use crate::stream::{FragmentKind, ReasoningPanel, StreamFragment};
use colored::Colorize;
use std::io::{self, Write};

const RULE: &str = "────────────────────────────────────────";

/// Writes fragments as they arrive.
pub struct SummaryPrinter<W: Write> {
    out: W,
    panel: ReasoningPanel,
}

impl<W: Write> SummaryPrinter<W> {
    pub fn new(out: W) -> Self {
        Self {
            out,
            panel: ReasoningPanel::new(),
        }
    }

    pub fn render(&mut self, fragment: &StreamFragment) -> io::Result<()> {
        let first_reasoning =
            fragment.kind == FragmentKind::Reasoning && !self.panel.reasoning_started();
        let collapse = self.panel.observe(fragment);

        if first_reasoning {
            writeln!(self.out, "{}", "🤔 Thinking...".dimmed().italic())?;
        }
        if collapse {
            writeln!(self.out, "\n{}\n", RULE.dimmed())?;
        }
        match fragment.kind {
            FragmentKind::Reasoning => write!(self.out, "{}", fragment.text.dimmed())?,
            FragmentKind::Content => write!(self.out, "{}", fragment.text)?,
        }
        self.out.flush()
    }

    /// End the output; `stopped` notes a user cancellation.
    pub fn finish(&mut self, stopped: bool) -> io::Result<()> {
        writeln!(self.out)?;
        if stopped {
            writeln!(self.out, "{}", "⏹ Summary stopped.".yellow())?;
        }
        self.out.flush()
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

/// Print extracted content as a readable listing.
pub fn print_content<W: Write>(out: &mut W, data: &ContentData) -> io::Result<()> {
    let title = data.title.as_deref().unwrap_or("No title");
    writeln!(out, "{} {}", "===".bold(), title.bold())?;
    writeln!(out, "{} · {}", data.site.cyan(), data.url)?;
    if let Some(author) = &data.author {
        let score = data.score.as_deref().map(|s| format!(" · 👍 {s}")).unwrap_or_default();
        writeln!(out, "by {}{}", author.green(), score)?;
    }
    if let Some(content) = data.content.as_deref().filter(|c| !c.is_empty()) {
        writeln!(out, "\n{content}")?;
    }

    writeln!(out, "\n💬 Comments ({}):", data.comments.len())?;
    for comment in &data.comments {
        match &comment.score {
            Some(score) => writeln!(out, "  • {} ({})", comment.author.green(), score)?,
            None => writeln!(out, "  • {}", comment.author.green())?,
        }
        for line in comment.content.lines() {
            writeln!(out, "    {line}")?;
        }
    }
    Ok(())
}

/// List profiles, marking the default.
pub fn print_profiles<W: Write>(out: &mut W, profiles: &[Profile]) -> io::Result<()> {
    if profiles.is_empty() {
        return writeln!(out, "No profiles configured. Add one with `plify profile add`.");
    }
    for profile in profiles {
        let marker = if profile.index == 0 { "*" } else { " " };
        writeln!(
            out,
            "{marker} [{}] {} ({}, {}) {}",
            profile.index,
            profile.profile_name.bold(),
            profile.provider_type,
            profile.model_name,
            profile.api_endpoint.dimmed()
        )?;
    }
    Ok(())
}
