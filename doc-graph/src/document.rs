//! Per-document parsing: blocks, instruction nodes, links and anchors

use crate::blocks::{Block, BlockKind, parse_blocks};
use crate::corpus::SourceDocument;
use crate::patterns::{InstructionTag, PatternSet};
use crate::resolver::is_external;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};

/// Identity of an instruction: (document path, block index)
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct NodeId {
    pub document: String,
    pub block_index: usize,
}

/// An actionable directive found in a document.
///
/// Referenced files and linked documents are kept as written; the node
/// never owns other nodes, so link cycles cannot become ownership cycles.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InstructionNode {
    pub id: NodeId,
    pub text: String,
    pub tags: BTreeSet<InstructionTag>,
    pub file_refs: Vec<String>,
    pub links: Vec<String>,
    pub heading_path: Vec<String>,
    pub line: usize,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub matched_signals: Vec<String>,
}

impl InstructionNode {
    pub fn has_tag(&self, tag: InstructionTag) -> bool {
        self.tags.contains(&tag)
    }
}

/// Outbound link as written in the source
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DocumentLink {
    pub target: String,
    pub line: usize,
    pub block_index: usize,
}

impl DocumentLink {
    pub fn is_external(&self) -> bool {
        is_external(&self.target)
    }
}

/// A parsed, immutable document
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedDocument {
    pub path: String,
    pub blocks: Vec<Block>,
    pub instructions: Vec<InstructionNode>,
    pub links: Vec<DocumentLink>,
    /// Heading slugs usable as `#fragment` targets
    pub anchors: BTreeSet<String>,
    pub modified: Option<DateTime<Utc>>,
}

impl ParsedDocument {
    /// Concatenated normalized text of every block, in order
    pub fn normalized_text(&self) -> String {
        self.blocks
            .iter()
            .map(|b| b.normalized.as_str())
            .filter(|t| !t.is_empty())
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Fragment lookup; GitHub anchors are case-insensitive in practice
    pub fn has_anchor(&self, fragment: &str) -> bool {
        let fragment = fragment.replace("%20", "-");
        self.anchors.contains(&fragment) || self.anchors.contains(&fragment.to_lowercase())
    }
}

/// Combines block parsing and pattern matching for one document
#[derive(Debug, Clone, Copy)]
pub struct DocumentParser<'a> {
    patterns: &'a PatternSet,
}

impl<'a> DocumentParser<'a> {
    pub fn new(patterns: &'a PatternSet) -> Self {
        Self { patterns }
    }

    pub fn parse(&self, source: &SourceDocument) -> ParsedDocument {
        let mut parsed = self.parse_text(&source.path, &source.text);
        parsed.modified = source.modified;
        parsed
    }

    pub fn parse_text(&self, path: &str, text: &str) -> ParsedDocument {
        let blocks = parse_blocks(text);
        let mut instructions = Vec::new();
        let mut links = Vec::new();

        for (block_index, block) in blocks.iter().enumerate() {
            if block.kind == BlockKind::Code {
                continue;
            }
            let block_links = self.patterns.extract_links(&block.raw);
            for target in &block_links {
                links.push(DocumentLink {
                    target: target.clone(),
                    line: line_of(block, target),
                    block_index,
                });
            }

            if let Some(classification) = self.patterns.classify(block) {
                instructions.push(InstructionNode {
                    id: NodeId {
                        document: path.to_string(),
                        block_index,
                    },
                    text: classification.text,
                    tags: classification.tags,
                    file_refs: classification.file_refs,
                    links: block_links,
                    heading_path: block.heading_path.clone(),
                    line: block.line,
                    matched_signals: classification.matched_signals,
                });
            }
        }

        tracing::debug!(
            path,
            blocks = blocks.len(),
            instructions = instructions.len(),
            links = links.len(),
            "Parsed document"
        );

        ParsedDocument {
            path: path.to_string(),
            anchors: heading_anchors(&blocks),
            blocks,
            instructions,
            links,
            modified: None,
        }
    }
}

pub(crate) fn line_of(block: &Block, target: &str) -> usize {
    block
        .raw
        .lines()
        .position(|l| l.contains(target))
        .map(|offset| block.line + offset)
        .unwrap_or(block.line)
}

/// Slugs for every heading, with `-1`, `-2` suffixes on repeats
pub fn heading_anchors(blocks: &[Block]) -> BTreeSet<String> {
    let mut seen: BTreeMap<String, usize> = BTreeMap::new();
    let mut anchors = BTreeSet::new();
    for title in blocks.iter().filter_map(Block::title) {
        let slug = slugify(title);
        let count = seen.entry(slug.clone()).or_insert(0);
        if *count == 0 {
            anchors.insert(slug);
        } else {
            anchors.insert(format!("{slug}-{count}"));
        }
        *count += 1;
    }
    anchors
}

/// GitHub-style heading slug: lowercase, punctuation dropped, spaces to `-`
pub fn slugify(title: &str) -> String {
    title
        .trim()
        .to_lowercase()
        .chars()
        .filter_map(|c| match c {
            ' ' => Some('-'),
            c if c.is_alphanumeric() || c == '-' || c == '_' => Some(c),
            _ => None,
        })
        .collect()
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
