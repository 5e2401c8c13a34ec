//! Narration script parsing.
//!
//! Scripts are plain text: an optional `s"Title"` first line naming the
//! video, then sections separated by blank lines. Each section becomes one
//! narration chunk.

use tracing::{info, warn};

use crate::error::{PipelineError, PipelineResult};

/// One blank-line-delimited block of the script.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptSection {
    /// 1-based position in the script.
    pub index: usize,
    pub raw_text: String,
    pub lines: Vec<String>,
}

impl ScriptSection {
    /// Estimate spoken words.
    ///
    /// Whitespace tokens when the text has them; otherwise roughly three
    /// characters per word, which fits CJK narration well enough for the
    /// grouping heuristics that consume this.
    pub fn word_count(&self) -> usize {
        let word_based: usize = self.lines.iter().map(|l| l.split_whitespace().count()).sum();
        if word_based >= 3 {
            return word_based;
        }
        let char_count: usize = self
            .lines
            .iter()
            .map(|l| l.trim().chars().count())
            .sum();
        if char_count == 0 {
            return 0;
        }
        word_based.max(char_count.div_ceil(3))
    }
}

/// A parsed script: title plus ordered sections.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptDocument {
    pub thumbnail_title: String,
    pub sections: Vec<ScriptSection>,
}

impl ScriptDocument {
    pub fn total_word_count(&self) -> usize {
        self.sections.iter().map(|s| s.word_count()).sum()
    }
}

/// Parse a raw script into a document.
pub fn parse_script(raw: &str) -> PipelineResult<ScriptDocument> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err(PipelineError::EmptyScript);
    }

    let mut lines = raw.lines();
    let mut thumbnail_title = String::new();
    let mut body: Vec<&str> = Vec::new();

    if let Some(first) = lines.next() {
        if let Some(title) = first
            .strip_prefix("s\"")
            .and_then(|rest| rest.strip_suffix('"'))
        {
            thumbnail_title = title.trim().to_string();
        } else {
            warn!("Script has no s\"...\" title line; using fallback title");
            body.push(first);
        }
    }
    body.extend(lines);

    let mut sections: Vec<ScriptSection> = Vec::new();
    let mut current: Vec<String> = Vec::new();
    for line in body {
        if line.trim().is_empty() {
            flush_section(&mut sections, &mut current);
        } else {
            current.push(line.trim_end().to_string());
        }
    }
    flush_section(&mut sections, &mut current);

    if sections.is_empty() {
        return Err(PipelineError::EmptyScript);
    }

    info!(
        "Parsed script into {} sections (title: {})",
        sections.len(),
        if thumbnail_title.is_empty() {
            "N/A"
        } else {
            &thumbnail_title
        }
    );
    Ok(ScriptDocument {
        thumbnail_title,
        sections,
    })
}

fn flush_section(sections: &mut Vec<ScriptSection>, current: &mut Vec<String>) {
    if current.is_empty() {
        return;
    }
    let lines: Vec<String> = current
        .drain(..)
        .map(|l| l.trim().to_string())
        .filter(|l| !l.is_empty())
        .collect();
    if lines.is_empty() {
        return;
    }
    sections.push(ScriptSection {
        index: sections.len() + 1,
        raw_text: lines.join("\n"),
        lines,
    });
}
