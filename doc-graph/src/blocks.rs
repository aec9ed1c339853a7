//! Markdown block parser
//!
//! Splits raw document text into typed blocks with a heading path per block.
//! Only block structure is recognized (no inline rendering). The parser never
//! fails: anything it cannot classify becomes a paragraph.

use serde::{Deserialize, Serialize};
use std::borrow::Cow;

/// Block classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlockKind {
    Heading,
    Paragraph,
    ListItem,
    Code,
    Table,
    Blockquote,
}

impl BlockKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Heading => "heading",
            Self::Paragraph => "paragraph",
            Self::ListItem => "list_item",
            Self::Code => "code",
            Self::Table => "table",
            Self::Blockquote => "blockquote",
        }
    }

    /// Prose blocks carry instructions and links; code and tables do not
    pub fn is_prose(&self) -> bool {
        matches!(
            self,
            Self::Heading | Self::Paragraph | Self::ListItem | Self::Blockquote
        )
    }
}

impl std::fmt::Display for BlockKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A classified, contiguous unit of a parsed document
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    pub kind: BlockKind,
    /// Source text; for code blocks, the fence contents verbatim
    pub raw: String,
    /// Comparison form (see [`normalize_text`])
    pub normalized: String,
    /// Titles of the enclosing headings, outermost first
    pub heading_path: Vec<String>,
    /// 1-based line of the first source line
    pub line: usize,
    /// Heading level (1-6) for heading blocks
    pub level: Option<u8>,
}

impl Block {
    /// Heading title without its `#` markers
    pub fn title(&self) -> Option<&str> {
        (self.kind == BlockKind::Heading).then(|| strip_line_markers(&self.raw))
    }
}

/// Parse document text into blocks, preserving source order
pub fn parse_blocks(text: &str) -> Vec<Block> {
    let text = normalize_line_endings(text);
    let lines: Vec<&str> = text.split('\n').collect();
    let mut builder = BlockBuilder::default();
    let mut fence: Option<OpenFence> = None;
    let mut i = frontmatter_end(&lines);

    while i < lines.len() {
        let line = lines[i];
        let line_no = i + 1;

        if let Some(open) = fence.as_mut() {
            if is_closing_fence(line, open.marker, open.width) {
                if let Some(open) = fence.take() {
                    builder.push_code(open);
                }
            } else {
                open.body.push(line.to_string());
            }
            i += 1;
            continue;
        }

        if let Some((marker, width)) = opening_fence(line) {
            builder.flush();
            fence = Some(OpenFence {
                marker,
                width,
                line: line_no,
                body: Vec::new(),
            });
            i += 1;
            continue;
        }

        if line.trim().is_empty() {
            builder.flush();
            i += 1;
            continue;
        }

        if let Some((level, title)) = parse_atx_heading(line) {
            builder.flush();
            builder.push_heading(level, title, line, line_no);
            i += 1;
            continue;
        }

        if let Some(level) = setext_level(line)
            && builder.pending_single_paragraph_line()
        {
            builder.promote_to_heading(level);
            i += 1;
            continue;
        }

        if is_thematic_break(line) {
            builder.flush();
            i += 1;
            continue;
        }

        if line.contains('|') && lines.get(i + 1).is_some_and(|next| is_table_delimiter(next)) {
            builder.flush();
            let mut rows = vec![line, lines[i + 1]];
            let mut j = i + 2;
            while j < lines.len() && lines[j].contains('|') && !lines[j].trim().is_empty() {
                rows.push(lines[j]);
                j += 1;
            }
            builder.push_table(&rows, line_no);
            i = j;
            continue;
        }

        let trimmed = line.trim_start();
        if trimmed.starts_with('>') {
            builder.continue_or_start(PendingKind::Blockquote, line, line_no);
        } else if list_marker_len(trimmed).is_some() {
            builder.flush();
            builder.start(PendingKind::ListItem, line, line_no);
        } else if builder.pending_kind() == Some(PendingKind::ListItem)
            && line.starts_with([' ', '\t'])
        {
            builder.append(line);
        } else {
            builder.continue_or_start(PendingKind::Paragraph, line, line_no);
        }
        i += 1;
    }

    if let Some(open) = fence.take() {
        tracing::warn!(
            line = open.line,
            "Unterminated code fence; treating the rest of the document as code"
        );
        builder.push_code(open);
    }

    builder.finish()
}

/// Index of the first line after a leading `---` frontmatter block (0 if none).
///
/// Only YAML-looking bodies count; otherwise the opening `---` is a
/// thematic break and everything after it is regular content.
fn frontmatter_end(lines: &[&str]) -> usize {
    if lines.first().map(|l| l.trim()) != Some("---") {
        return 0;
    }
    let Some(close) = lines
        .iter()
        .skip(1)
        .position(|l| matches!(l.trim(), "---" | "..."))
    else {
        return 0;
    };
    let body = &lines[1..=close];
    if body.iter().all(|l| is_yaml_line(l)) && body.iter().any(|l| is_yaml_key_line(l)) {
        close + 2
    } else {
        0
    }
}

fn is_yaml_line(line: &str) -> bool {
    let trimmed = line.trim();
    trimmed.is_empty()
        || line.starts_with([' ', '\t'])
        || trimmed == "-"
        || trimmed.starts_with("- ")
        || is_yaml_key_line(line)
}

/// `key:` or `key: value` with a bare key
fn is_yaml_key_line(line: &str) -> bool {
    let Some((key, rest)) = line.split_once(':') else {
        return false;
    };
    !key.is_empty()
        && key
            .chars()
            .all(|c| c.is_alphanumeric() || matches!(c, '_' | '-' | '.'))
        && (rest.is_empty() || rest.starts_with([' ', '\t']))
}

/// Convert CRLF and lone CR line endings to LF
pub fn normalize_line_endings(text: &str) -> Cow<'_, str> {
    if text.contains('\r') {
        Cow::Owned(text.replace("\r\n", "\n").replace('\r', "\n"))
    } else {
        Cow::Borrowed(text)
    }
}

/// Comparison form of prose: markers stripped, lowercased, emphasis and
/// punctuation removed, whitespace collapsed.
///
/// Characters that make up paths (`/ . - _`) survive inside tokens so that
/// `scripts/build.sh` stays recognizable after normalization.
pub fn normalize_text(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for line in raw.lines() {
        let stripped = strip_line_markers(line);
        for token in stripped.split_whitespace() {
            let token = normalize_token(token);
            if token.is_empty() {
                continue;
            }
            if !out.is_empty() {
                out.push(' ');
            }
            out.push_str(&token);
        }
    }
    out
}

/// Comparison form of code: lowercased, whitespace collapsed, nothing else
pub fn normalize_code(raw: &str) -> String {
    raw.split_whitespace()
        .map(str::to_lowercase)
        .collect::<Vec<_>>()
        .join(" ")
}

fn normalize_token(token: &str) -> String {
    let lowered = token.to_lowercase();
    let mut cleaned = String::with_capacity(lowered.len());
    for ch in lowered.chars() {
        if ch.is_alphanumeric() || matches!(ch, '/' | '.' | '-' | '_') {
            cleaned.push(ch);
        } else if !matches!(ch, '*' | '`' | '~') {
            // Interior punctuation splits words ("don't" -> "don t")
            cleaned.push(' ');
        }
    }
    // Emphasis underscores and sentence punctuation only live at the edges
    cleaned
        .split_whitespace()
        .map(|part| {
            part.trim_start_matches(|c: char| !c.is_alphanumeric() && c != '/' && c != '.')
                .trim_end_matches(|c: char| !c.is_alphanumeric() && c != '/')
        })
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Remove leading heading, blockquote and list markers from one line
pub(crate) fn strip_line_markers(line: &str) -> &str {
    let mut rest = line.trim_start();
    loop {
        if let Some(after) = rest.strip_prefix('>') {
            rest = after.trim_start();
            continue;
        }
        break;
    }
    if let Some((_, title)) = parse_atx_heading(rest) {
        return title;
    }
    if let Some(len) = list_marker_len(rest) {
        rest = rest[len..].trim_start();
        // Task list checkbox
        for checkbox in ["[ ]", "[x]", "[X]"] {
            if let Some(after) = rest.strip_prefix(checkbox) {
                return after.trim_start();
            }
        }
    }
    rest
}

/// Length of a list marker (`- `, `* `, `+ `, `1. `, `1) `) at the start
fn list_marker_len(trimmed: &str) -> Option<usize> {
    let bytes = trimmed.as_bytes();
    match bytes.first()? {
        b'-' | b'*' | b'+' => {
            if bytes.len() == 1 || bytes[1] == b' ' || bytes[1] == b'\t' {
                Some(1)
            } else {
                None
            }
        }
        b'0'..=b'9' => {
            let digits = bytes.iter().take_while(|b| b.is_ascii_digit()).count();
            if digits > 9 {
                return None;
            }
            match bytes.get(digits) {
                Some(b'.') | Some(b')') => match bytes.get(digits + 1) {
                    None | Some(b' ') | Some(b'\t') => Some(digits + 1),
                    _ => None,
                },
                _ => None,
            }
        }
        _ => None,
    }
}

fn parse_atx_heading(line: &str) -> Option<(u8, &str)> {
    let trimmed = line.trim_start();
    if line.len() - trimmed.len() > 3 {
        return None;
    }
    let hashes = trimmed.bytes().take_while(|b| *b == b'#').count();
    if hashes == 0 || hashes > 6 {
        return None;
    }
    let rest = &trimmed[hashes..];
    if !rest.is_empty() && !rest.starts_with([' ', '\t']) {
        return None;
    }
    let title = rest.trim().trim_end_matches('#').trim_end();
    Some((hashes as u8, title))
}

fn setext_level(line: &str) -> Option<u8> {
    let trimmed = line.trim();
    if trimmed.len() >= 2 && trimmed.bytes().all(|b| b == b'=') {
        Some(1)
    } else if trimmed.len() >= 2 && trimmed.bytes().all(|b| b == b'-') {
        Some(2)
    } else {
        None
    }
}

fn is_thematic_break(line: &str) -> bool {
    let compact: String = line.chars().filter(|c| !c.is_whitespace()).collect();
    compact.len() >= 3
        && ['-', '*', '_']
            .iter()
            .any(|m| compact.chars().all(|c| c == *m))
}

/// GFM delimiter row; the pipe keeps a setext `---` underline from qualifying
fn is_table_delimiter(line: &str) -> bool {
    let trimmed = line.trim();
    trimmed.contains('|')
        && trimmed.contains('-')
        && trimmed
            .chars()
            .all(|c| matches!(c, '-' | '|' | ':' | ' ' | '\t'))
}

fn opening_fence(line: &str) -> Option<(char, usize)> {
    let trimmed = line.trim_start();
    if line.len() - trimmed.len() > 3 {
        return None;
    }
    let marker = trimmed.chars().next()?;
    if marker != '`' && marker != '~' {
        return None;
    }
    let width = trimmed.chars().take_while(|c| *c == marker).count();
    if width < 3 {
        return None;
    }
    // Backtick fences cannot carry backticks in their info string
    if marker == '`' && trimmed[width..].contains('`') {
        return None;
    }
    Some((marker, width))
}

fn is_closing_fence(line: &str, marker: char, width: usize) -> bool {
    let trimmed = line.trim();
    let run = trimmed.chars().take_while(|c| *c == marker).count();
    run >= width && trimmed.chars().skip(run).all(char::is_whitespace)
}

// ─────────────────────────────────────────────────────────────────────────────
// Builder
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PendingKind {
    Paragraph,
    ListItem,
    Blockquote,
}

#[derive(Debug)]
struct Pending {
    kind: PendingKind,
    lines: Vec<String>,
    line: usize,
}

#[derive(Debug)]
struct OpenFence {
    marker: char,
    width: usize,
    line: usize,
    body: Vec<String>,
}

#[derive(Debug, Default)]
struct BlockBuilder {
    blocks: Vec<Block>,
    pending: Option<Pending>,
    /// (level, title) of the open headings
    headings: Vec<(u8, String)>,
}

impl BlockBuilder {
    fn heading_path(&self) -> Vec<String> {
        self.headings.iter().map(|(_, t)| t.clone()).collect()
    }

    fn pending_kind(&self) -> Option<PendingKind> {
        self.pending.as_ref().map(|p| p.kind)
    }

    fn pending_single_paragraph_line(&self) -> bool {
        self.pending
            .as_ref()
            .is_some_and(|p| p.kind == PendingKind::Paragraph && p.lines.len() == 1)
    }

    fn start(&mut self, kind: PendingKind, line: &str, line_no: usize) {
        self.pending = Some(Pending {
            kind,
            lines: vec![line.to_string()],
            line: line_no,
        });
    }

    fn append(&mut self, line: &str) {
        if let Some(pending) = self.pending.as_mut() {
            pending.lines.push(line.to_string());
        }
    }

    fn continue_or_start(&mut self, kind: PendingKind, line: &str, line_no: usize) {
        if self.pending_kind() == Some(kind) {
            self.append(line);
        } else {
            self.flush();
            self.start(kind, line, line_no);
        }
    }

    fn flush(&mut self) {
        let Some(pending) = self.pending.take() else {
            return;
        };
        let raw = pending.lines.join("\n");
        let kind = match pending.kind {
            PendingKind::Paragraph => BlockKind::Paragraph,
            PendingKind::ListItem => BlockKind::ListItem,
            PendingKind::Blockquote => BlockKind::Blockquote,
        };
        self.blocks.push(Block {
            kind,
            normalized: normalize_text(&raw),
            raw,
            heading_path: self.heading_path(),
            line: pending.line,
            level: None,
        });
    }

    fn push_heading(&mut self, level: u8, title: &str, raw: &str, line_no: usize) {
        while self.headings.last().is_some_and(|(l, _)| *l >= level) {
            self.headings.pop();
        }
        self.blocks.push(Block {
            kind: BlockKind::Heading,
            raw: raw.trim().to_string(),
            normalized: normalize_text(title),
            heading_path: self.heading_path(),
            line: line_no,
            level: Some(level),
        });
        self.headings.push((level, title.to_string()));
    }

    /// Setext underline: the single pending paragraph line becomes a heading
    fn promote_to_heading(&mut self, level: u8) {
        if let Some(pending) = self.pending.take() {
            let title = pending.lines.join(" ").trim().to_string();
            self.push_heading(level, &title, &title, pending.line);
        }
    }

    fn push_table(&mut self, rows: &[&str], line_no: usize) {
        let raw = rows.join("\n");
        let normalized = rows
            .iter()
            .filter(|r| !is_table_delimiter(r))
            .map(|r| normalize_text(&r.replace('|', " ")))
            .filter(|r| !r.is_empty())
            .collect::<Vec<_>>()
            .join(" ");
        self.blocks.push(Block {
            kind: BlockKind::Table,
            raw,
            normalized,
            heading_path: self.heading_path(),
            line: line_no,
            level: None,
        });
    }

    fn push_code(&mut self, fence: OpenFence) {
        let raw = fence.body.join("\n");
        self.blocks.push(Block {
            kind: BlockKind::Code,
            normalized: normalize_code(&raw),
            raw,
            heading_path: self.heading_path(),
            line: fence.line,
            level: None,
        });
    }

    fn finish(mut self) -> Vec<Block> {
        self.flush();
        self.blocks
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
