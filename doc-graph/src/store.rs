//! Lazily parsed document cache over a loaded corpus

use crate::corpus::Corpus;
use crate::document::{DocumentParser, ParsedDocument};
use crate::patterns::PatternSet;
use rayon::prelude::*;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock};

/// Parses each document at most once, on first access.
///
/// Cells are keyed by document path; parsing can be fanned out across
/// threads with [`DocumentStore::parse_all`] and later lookups hit the cache.
#[derive(Debug)]
pub struct DocumentStore<'a> {
    corpus: &'a Corpus,
    parser: DocumentParser<'a>,
    cache: BTreeMap<String, OnceLock<Arc<ParsedDocument>>>,
    parses: AtomicUsize,
}

impl<'a> DocumentStore<'a> {
    pub fn new(corpus: &'a Corpus, patterns: &'a PatternSet) -> Self {
        let cache = corpus
            .documents
            .iter()
            .map(|d| (d.path.clone(), OnceLock::new()))
            .collect();
        Self {
            corpus,
            parser: DocumentParser::new(patterns),
            cache,
            parses: AtomicUsize::new(0),
        }
    }

    pub fn corpus(&self) -> &'a Corpus {
        self.corpus
    }

    /// Whether `path` is a loaded document
    pub fn contains(&self, path: &str) -> bool {
        self.cache.contains_key(path)
    }

    pub fn paths(&self) -> impl Iterator<Item = &str> {
        self.cache.keys().map(String::as_str)
    }

    /// Parsed document, parsing it on first access
    pub fn get(&self, path: &str) -> Option<Arc<ParsedDocument>> {
        let cell = self.cache.get(path)?;
        let source = self.corpus.document(path)?;
        let parsed = cell.get_or_init(|| {
            self.parses.fetch_add(1, Ordering::Relaxed);
            Arc::new(self.parser.parse(source))
        });
        Some(Arc::clone(parsed))
    }

    /// Parse every document in parallel; results are in path order
    pub fn parse_all(&self) -> Vec<Arc<ParsedDocument>> {
        self.corpus
            .documents
            .par_iter()
            .filter_map(|d| self.get(&d.path))
            .collect()
    }

    /// Number of parses performed so far (cache misses)
    pub fn parse_count(&self) -> usize {
        self.parses.load(Ordering::Relaxed)
    }
}
