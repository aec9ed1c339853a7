//! Link validation and orphan detection

use crate::document::{ParsedDocument, line_of};
use crate::resolver::{PathResolver, Resolution, is_external, split_link_target};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

/// Classification of one outbound link
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LinkStatus {
    Valid,
    /// Nothing in the tree matches
    Broken,
    /// Several files match; not guessed
    Ambiguous,
    /// The file exists but the `#fragment` is not one of its headings
    AnchorInvalid,
    /// URI scheme or network path; not checked
    External,
}

/// Where a checked reference came from
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReferenceKind {
    /// Markdown link or bare document path
    #[default]
    Link,
    /// File path named inside an instruction
    FileRef,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LinkCheck {
    pub source: String,
    pub target: String,
    pub line: usize,
    pub kind: ReferenceKind,
    pub status: LinkStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resolved: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub candidates: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReferenceReport {
    pub links: Vec<LinkCheck>,
    /// Documents without incoming links from other documents that are not
    /// entry points
    pub orphans: Vec<String>,
}

impl ReferenceReport {
    pub fn count(&self, status: LinkStatus) -> usize {
        self.links.iter().filter(|l| l.status == status).count()
    }

    pub fn with_status(&self, status: LinkStatus) -> impl Iterator<Item = &LinkCheck> {
        self.links.iter().filter(move |l| l.status == status)
    }

    pub fn of_kind(&self, kind: ReferenceKind) -> impl Iterator<Item = &LinkCheck> {
        self.links.iter().filter(move |l| l.kind == kind)
    }
}

/// Checks every outbound link of every document; never mutates documents
#[derive(Debug, Clone, Copy)]
pub struct ReferenceValidator<'a> {
    resolver: &'a PathResolver,
}

impl<'a> ReferenceValidator<'a> {
    pub fn new(resolver: &'a PathResolver) -> Self {
        Self { resolver }
    }

    pub fn validate<S: AsRef<str>>(
        &self,
        documents: &[Arc<ParsedDocument>],
        entry_points: &[S],
    ) -> ReferenceReport {
        let by_path: BTreeMap<&str, &ParsedDocument> =
            documents.iter().map(|d| (d.path.as_str(), d.as_ref())).collect();
        let mut incoming: BTreeSet<&str> = BTreeSet::new();
        let mut links = Vec::new();

        for doc in documents {
            for link in &doc.links {
                let mut check = LinkCheck {
                    source: doc.path.clone(),
                    target: link.target.clone(),
                    line: link.line,
                    kind: ReferenceKind::Link,
                    status: LinkStatus::Valid,
                    resolved: None,
                    candidates: Vec::new(),
                };

                if is_external(&link.target) {
                    check.status = LinkStatus::External;
                    links.push(check);
                    continue;
                }

                let (path_part, anchor) = split_link_target(&link.target);
                if path_part.is_empty() {
                    // Same-document fragment
                    if anchor.is_some_and(|a| !doc.has_anchor(a)) {
                        check.status = LinkStatus::AnchorInvalid;
                    }
                    check.resolved = Some(doc.path.clone());
                    links.push(check);
                    continue;
                }

                match self.resolver.resolve_from(path_part, &doc.path) {
                    Resolution::Resolved { path, .. } => {
                        let anchor_ok = match (anchor, by_path.get(path.as_str())) {
                            (Some(fragment), Some(target)) => target.has_anchor(fragment),
                            // Non-markdown targets and skipped documents have no heading data
                            _ => true,
                        };
                        if !anchor_ok {
                            check.status = LinkStatus::AnchorInvalid;
                        }
                        if path != doc.path
                            && let Some((key, _)) = by_path.get_key_value(path.as_str())
                        {
                            incoming.insert(key);
                        }
                        check.resolved = Some(path);
                    }
                    Resolution::Ambiguous { candidates } => {
                        check.status = LinkStatus::Ambiguous;
                        check.candidates = candidates;
                    }
                    Resolution::Missing => check.status = LinkStatus::Broken,
                }
                links.push(check);
            }

            links.extend(self.check_file_refs(doc));
        }

        let entries: BTreeSet<&str> = entry_points.iter().map(AsRef::as_ref).collect();
        let orphans: Vec<String> = by_path
            .keys()
            .filter(|path| !incoming.contains(*path) && !entries.contains(*path))
            .map(|path| (*path).to_string())
            .collect();

        let report = ReferenceReport { links, orphans };
        tracing::info!(
            links = report.links.len(),
            broken = report.count(LinkStatus::Broken),
            ambiguous = report.count(LinkStatus::Ambiguous),
            anchor_invalid = report.count(LinkStatus::AnchorInvalid),
            orphans = report.orphans.len(),
            "References validated"
        );
        report
    }

    /// Files named by instructions; paths that are also links of the same
    /// block were already checked above
    fn check_file_refs(&self, doc: &ParsedDocument) -> Vec<LinkCheck> {
        let mut checks = Vec::new();
        for node in &doc.instructions {
            for file_ref in &node.file_refs {
                if node.links.iter().any(|l| l == file_ref) {
                    continue;
                }
                let mut check = LinkCheck {
                    source: doc.path.clone(),
                    target: file_ref.clone(),
                    line: doc
                        .blocks
                        .get(node.id.block_index)
                        .map_or(node.line, |block| line_of(block, file_ref)),
                    kind: ReferenceKind::FileRef,
                    status: LinkStatus::Valid,
                    resolved: None,
                    candidates: Vec::new(),
                };
                match self.resolver.resolve_from(file_ref, &doc.path) {
                    Resolution::Resolved { path, .. } => check.resolved = Some(path),
                    Resolution::Ambiguous { candidates } => {
                        check.status = LinkStatus::Ambiguous;
                        check.candidates = candidates;
                    }
                    Resolution::Missing => check.status = LinkStatus::Broken,
                }
                checks.push(check);
            }
        }
        checks
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
