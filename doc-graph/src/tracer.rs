//! Breadth-first instruction graph tracing
//!
//! Documents are referenced by path only. Each document moves through
//! `Unvisited -> Queued -> Visited` exactly once per trace, so cyclic link
//! graphs terminate and nothing is expanded twice.

use crate::document::InstructionNode;
use crate::resolver::{PathResolver, Resolution, is_external, normalize_path, split_link_target};
use crate::store::DocumentStore;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet, VecDeque};

/// Per-document traversal state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VisitState {
    Unvisited,
    Queued,
    Visited,
}

/// How a visited document was first reached
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VisitInfo {
    /// Link hops from the nearest entry point
    pub depth: usize,
    /// Document whose link first queued this one (`None` for entry points)
    pub referrer: Option<String>,
    /// Dequeue position
    pub order: usize,
}

/// A link that did not resolve during tracing
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BrokenLink {
    pub source: String,
    pub target: String,
    pub line: usize,
    pub resolution: Resolution,
}

/// Output of one trace
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TraceResult {
    pub entry_points: Vec<String>,
    pub visited: BTreeMap<String, VisitInfo>,
    /// Instructions across all visited documents, ordered by node id
    pub instructions: Vec<InstructionNode>,
    pub broken_links: Vec<BrokenLink>,
    /// Requested entry points that are not loaded documents
    pub missing_entry_points: Vec<String>,
    /// Loaded documents no entry point reaches
    pub unreached: BTreeSet<String>,
    /// Unreached documents that some loaded document links to
    pub referenced_unvisited: BTreeSet<String>,
}

impl TraceResult {
    pub fn visited_set(&self) -> BTreeSet<String> {
        self.visited.keys().cloned().collect()
    }

    /// Documents that are linked to but never visited
    pub fn orphan_count(&self) -> usize {
        self.referenced_unvisited.len()
    }
}

/// BFS over the document link graph
#[derive(Debug)]
pub struct InstructionGraphTracer<'s, 'a> {
    store: &'s DocumentStore<'a>,
    resolver: &'s PathResolver,
}

impl<'s, 'a> InstructionGraphTracer<'s, 'a> {
    pub fn new(store: &'s DocumentStore<'a>, resolver: &'s PathResolver) -> Self {
        Self { store, resolver }
    }

    /// Trace from `entry_points` until the queue drains
    pub fn trace<S: AsRef<str>>(&self, entry_points: &[S]) -> TraceResult {
        let mut result = TraceResult::default();
        let mut states: BTreeMap<String, VisitState> = self
            .store
            .paths()
            .map(|p| (p.to_string(), VisitState::Unvisited))
            .collect();
        let mut pending: BTreeMap<String, (usize, Option<String>)> = BTreeMap::new();
        let mut queue: VecDeque<String> = VecDeque::new();

        for entry in entry_points {
            let entry = entry.as_ref();
            match self.entry_document(entry) {
                Some(path) => {
                    if !result.entry_points.contains(&path) {
                        result.entry_points.push(path.clone());
                    }
                    if states.get(&path) == Some(&VisitState::Unvisited) {
                        states.insert(path.clone(), VisitState::Queued);
                        pending.insert(path.clone(), (0, None));
                        queue.push_back(path);
                    }
                }
                None => {
                    tracing::warn!(entry, "Entry point is not a loaded document");
                    result.missing_entry_points.push(entry.to_string());
                }
            }
        }

        let mut order = 0;
        while let Some(path) = queue.pop_front() {
            if states.get(&path) == Some(&VisitState::Visited) {
                continue;
            }
            states.insert(path.clone(), VisitState::Visited);
            let (depth, referrer) = pending.remove(&path).unwrap_or((0, None));
            result.visited.insert(
                path.clone(),
                VisitInfo {
                    depth,
                    referrer,
                    order,
                },
            );
            order += 1;

            let Some(doc) = self.store.get(&path) else {
                continue;
            };
            result.instructions.extend(doc.instructions.iter().cloned());

            for link in &doc.links {
                if is_external(&link.target) {
                    continue;
                }
                let (target_path, _) = split_link_target(&link.target);
                if target_path.is_empty() {
                    continue;
                }
                match self.resolver.resolve_from(target_path, &path) {
                    Resolution::Resolved { path: target, .. } => {
                        if states.get(&target) == Some(&VisitState::Unvisited) {
                            tracing::debug!(from = %path, to = %target, depth = depth + 1, "Queued linked document");
                            states.insert(target.clone(), VisitState::Queued);
                            pending.insert(target.clone(), (depth + 1, Some(path.clone())));
                            queue.push_back(target);
                        }
                    }
                    unresolved => result.broken_links.push(BrokenLink {
                        source: path.clone(),
                        target: link.target.clone(),
                        line: link.line,
                        resolution: unresolved,
                    }),
                }
            }
        }

        result.instructions.sort_by(|a, b| a.id.cmp(&b.id));
        result.unreached = states
            .into_iter()
            .filter(|(_, state)| *state != VisitState::Visited)
            .map(|(path, _)| path)
            .collect();
        result.referenced_unvisited = self.referenced_unvisited(&result.unreached);

        tracing::info!(
            entry_points = result.entry_points.len(),
            visited = result.visited.len(),
            instructions = result.instructions.len(),
            broken_links = result.broken_links.len(),
            unreached = result.unreached.len(),
            orphans = result.referenced_unvisited.len(),
            "Instruction graph traced"
        );
        result
    }

    fn referenced_unvisited(&self, unreached: &BTreeSet<String>) -> BTreeSet<String> {
        let mut referenced = BTreeSet::new();
        if unreached.is_empty() {
            return referenced;
        }
        for source in self.store.paths() {
            let Some(doc) = self.store.get(source) else {
                continue;
            };
            for link in doc.links.iter().filter(|l| !l.is_external()) {
                let (target_path, _) = split_link_target(&link.target);
                if target_path.is_empty() {
                    continue;
                }
                if let Resolution::Resolved { path, .. } =
                    self.resolver.resolve_from(target_path, source)
                    && path != source
                    && unreached.contains(&path)
                {
                    referenced.insert(path);
                }
            }
        }
        referenced
    }

    fn entry_document(&self, entry: &str) -> Option<String> {
        let normalized = normalize_path(entry)?;
        if self.store.contains(&normalized) {
            return Some(normalized);
        }
        self.resolver
            .resolve(entry)
            .path()
            .filter(|p| self.store.contains(p))
            .map(str::to_string)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::corpus::Corpus;
    use crate::patterns::PatternSet;
    use pretty_assertions::assert_eq;

    fn trace(docs: &[(&str, &str)], entries: &[&str]) -> TraceResult {
        let corpus = Corpus::from_memory(docs.iter().copied());
        let patterns = PatternSet::builtin().unwrap();
        let store = DocumentStore::new(&corpus, &patterns);
        let resolver = PathResolver::new(corpus.files.iter());
        InstructionGraphTracer::new(&store, &resolver).trace(entries)
    }

    fn set(items: &[&str]) -> BTreeSet<String> {
        items.iter().map(|s| (*s).to_string()).collect()
    }

    #[test]
    fn test_cycle_terminates_and_visits_each_once() {
        let result = trace(
            &[
                ("a.md", "See [b](b.md)."),
                ("b.md", "See [c](c.md)."),
                ("c.md", "Back to [a](a.md)."),
            ],
            &["a.md"],
        );
        assert_eq!(result.visited_set(), set(&["a.md", "b.md", "c.md"]));
        assert_eq!(result.orphan_count(), 0);
        assert_eq!(result.visited["c.md"].depth, 2);
        assert_eq!(result.visited["c.md"].referrer.as_deref(), Some("b.md"));
    }

    #[test]
    fn test_self_links_and_anchor_only_links() {
        let result = trace(
            &[("a.md", "# Top\n\nJump to [top](#top) or [me](a.md#top).")],
            &["a.md"],
        );
        assert_eq!(result.visited.len(), 1);
        assert!(result.broken_links.is_empty());
    }

    #[test]
    fn test_broken_links_do_not_stop_traversal() {
        let result = trace(
            &[
                ("a.md", "- [gone](gone.md)\n- [b](b.md)\n"),
                ("b.md", "Leaf."),
                ("island.md", "Nobody links here."),
            ],
            &["a.md"],
        );
        assert_eq!(result.visited_set(), set(&["a.md", "b.md"]));
        assert_eq!(result.broken_links.len(), 1);
        assert_eq!(result.broken_links[0].target, "gone.md");
        assert_eq!(result.broken_links[0].resolution, Resolution::Missing);
        assert_eq!(result.unreached, set(&["island.md"]));
        assert_eq!(result.orphan_count(), 0);
    }

    #[test]
    fn test_orphans_are_referenced_but_unvisited() {
        let result = trace(
            &[
                ("a.md", "Start here."),
                ("b.md", "Only [c](c.md) links here."),
                ("c.md", "Back to [b](b.md) and [self](c.md)."),
                ("island.md", "Nobody links here."),
            ],
            &["a.md"],
        );
        assert_eq!(result.unreached, set(&["b.md", "c.md", "island.md"]));
        assert_eq!(result.referenced_unvisited, set(&["b.md", "c.md"]));
        assert_eq!(result.orphan_count(), 2);
    }

    #[test]
    fn test_multiple_entries_and_missing_entry() {
        let result = trace(
            &[("a.md", "A"), ("b.md", "B"), ("c.md", "C")],
            &["./a.md", "c.md", "nope.md", "a.md"],
        );
        assert_eq!(result.entry_points, vec!["a.md".to_string(), "c.md".to_string()]);
        assert_eq!(result.missing_entry_points, vec!["nope.md".to_string()]);
        assert_eq!(result.unreached, set(&["b.md"]));
    }

    #[test]
    fn test_trace_is_idempotent() {
        let docs = [
            ("hub.md", "- [x](x.md)\n- [y](y.md)\n- [z](sub/z.md)\n"),
            ("x.md", "[y](y.md) and [hub](hub.md)"),
            ("y.md", "[z](sub/z.md)"),
            ("sub/z.md", "[x](../x.md)"),
        ];
        let first = trace(&docs, &["hub.md"]);
        let second = trace(&docs, &["hub.md"]);
        assert_eq!(first, second);
        assert_eq!(first.visited.len(), 4);
    }

    #[test]
    fn test_instructions_collected_from_visited_only() {
        let result = trace(
            &[
                ("a.md", "Run `make check` before pushing. See [b](b.md)."),
                ("b.md", "Create `docs/adr/0001.md` for each decision."),
                ("c.md", "Update the unreachable changelog."),
            ],
            &["a.md"],
        );
        let docs: Vec<&str> = result
            .instructions
            .iter()
            .map(|n| n.id.document.as_str())
            .collect();
        assert_eq!(docs, vec!["a.md", "b.md"]);
    }
}
