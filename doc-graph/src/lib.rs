//! Documentation graph engine for spec-kit markdown trees
//!
//! Given a tree of markdown documents and one or more entry points, this
//! crate:
//! - Splits documents into blocks and extracts tagged instructions
//! - Traces the link graph breadth-first from the entry points
//! - Measures how many expected files the instructions actually reference
//! - Scores pairwise document similarity and clusters near-duplicates
//! - Validates every outbound link and flags orphaned documents
//!
//! Everything runs over an immutable snapshot; nothing is written to disk.

#![deny(clippy::print_stdout, clippy::print_stderr)]

pub mod blocks;
pub mod config;
pub mod corpus;
pub mod coverage;
pub mod document;
pub mod errors;
pub mod patterns;
pub mod references;
pub mod resolver;
pub mod similarity;
pub mod store;
pub mod tracer;

pub use blocks::{Block, BlockKind, parse_blocks};
pub use config::{AnalysisConfig, MatrixNormalization, PathAlias, SimilarityMethod, StringMode};
pub use corpus::{Corpus, SkipReason, SkippedDocument, SourceDocument};
pub use coverage::{
    CategoryCoverage, CoverageAnalyzer, CoverageReport, RequiredFilesManifest,
    alignment_percentage,
};
pub use document::{DocumentLink, DocumentParser, InstructionNode, NodeId, ParsedDocument};
pub use errors::{DocGraphError, ErrorCategory, Result};
pub use patterns::{InstructionTag, PatternSet, VocabularySpec};
pub use references::{LinkCheck, LinkStatus, ReferenceKind, ReferenceReport, ReferenceValidator};
pub use resolver::{PathResolver, Resolution, ResolutionStep};
pub use similarity::{
    Cluster, ComparableDocument, EmbeddingBackend, HashedTfIdfEmbedder, NoopEmbeddingBackend,
    ScoreMatrix, ScoreMethod, SimilarityEngine, SimilarityOutcome, SimilarityResult,
};
pub use store::DocumentStore;
pub use tracer::{BrokenLink, InstructionGraphTracer, TraceResult, VisitInfo};

use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;
use std::time::Instant;

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// What to analyze
#[derive(Debug, Clone, Default)]
pub struct AnalysisInput {
    pub root: PathBuf,
    /// Explicit document list relative to `root`; `None` walks the tree
    pub documents: Option<Vec<PathBuf>>,
    pub entry_points: Vec<String>,
}

impl AnalysisInput {
    pub fn new<I, S>(root: impl Into<PathBuf>, entry_points: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            root: root.into(),
            documents: None,
            entry_points: entry_points.into_iter().map(Into::into).collect(),
        }
    }

    pub fn with_documents(mut self, documents: Vec<PathBuf>) -> Self {
        self.documents = Some(documents);
        self
    }
}

/// Counters for one run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AnalysisStats {
    pub documents_loaded: usize,
    pub documents_skipped: usize,
    pub blocks: usize,
    pub instructions: usize,
    pub duration_ms: u64,
}

/// Full result of one analysis run
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnalysisReport {
    pub entry_points: Vec<String>,
    pub missing_entry_points: Vec<String>,
    pub visited: BTreeMap<String, VisitInfo>,
    /// Loaded documents no entry point reaches
    pub unreached: BTreeSet<String>,
    /// Unreached documents that some loaded document links to
    pub referenced_unvisited: BTreeSet<String>,
    /// Instructions from visited documents
    pub instructions: Vec<InstructionNode>,
    pub broken_links: Vec<BrokenLink>,
    pub coverage: CoverageReport,
    pub similarities: Vec<SimilarityResult>,
    pub duplicate_pairs: Vec<SimilarityResult>,
    pub clusters: Vec<Cluster>,
    pub references: Vec<LinkCheck>,
    /// Documents with no incoming links that are not entry points
    pub orphans: Vec<String>,
    pub skipped: Vec<SkippedDocument>,
    pub semantic_fallback: bool,
    pub stats: AnalysisStats,
}

impl AnalysisReport {
    pub fn visited_set(&self) -> BTreeSet<String> {
        self.visited.keys().cloned().collect()
    }
}

/// Main entry point: owns the validated configuration, the vocabularies
/// and the manifest, and runs the whole pipeline per call
pub struct DocGraphEngine {
    config: AnalysisConfig,
    patterns: PatternSet,
    manifest: RequiredFilesManifest,
    similarity: SimilarityEngine,
}

impl std::fmt::Debug for DocGraphEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DocGraphEngine")
            .field("config", &self.config)
            .field("manifest", &self.manifest)
            .field("similarity", &self.similarity)
            .finish_non_exhaustive()
    }
}

impl DocGraphEngine {
    /// Validate `config` and build the engine. Configuration errors are
    /// fatal here, before any document is touched.
    pub fn new(
        config: AnalysisConfig,
        patterns: PatternSet,
        manifest: RequiredFilesManifest,
    ) -> Result<Self> {
        config.validate()?;
        let similarity = SimilarityEngine::new(&config);

        tracing::info!(
            version = VERSION,
            method = ?config.similarity_method,
            threshold = config.similarity_threshold,
            clustering = config.clustering_enabled,
            semantic_available = similarity.semantic_available(),
            "Doc-graph engine initialized"
        );

        Ok(Self {
            config,
            patterns,
            manifest,
            similarity,
        })
    }

    /// Engine with the built-in vocabularies and an empty manifest
    pub fn with_config(config: AnalysisConfig) -> Result<Self> {
        Self::new(config, PatternSet::builtin()?, RequiredFilesManifest::new())
    }

    /// Replace the embedding backend chosen from the configuration
    pub fn with_embedding_backend(mut self, backend: Box<dyn EmbeddingBackend>) -> Self {
        self.similarity = SimilarityEngine::new(&self.config).with_backend(backend);
        self
    }

    pub fn config(&self) -> &AnalysisConfig {
        &self.config
    }

    pub fn patterns(&self) -> &PatternSet {
        &self.patterns
    }

    pub fn manifest(&self) -> &RequiredFilesManifest {
        &self.manifest
    }

    /// Load the corpus described by `input` and analyze it
    pub fn analyze(&mut self, input: &AnalysisInput) -> Result<AnalysisReport> {
        ensure_entry_points(&input.entry_points)?;
        let corpus = match &input.documents {
            Some(documents) => Corpus::load_documents(&input.root, documents, &self.config)?,
            None => Corpus::load(&input.root, &self.config)?,
        };
        self.analyze_corpus(&corpus, &input.entry_points)
    }

    /// Analyze an already loaded corpus
    pub fn analyze_corpus<S: AsRef<str>>(
        &mut self,
        corpus: &Corpus,
        entry_points: &[S],
    ) -> Result<AnalysisReport> {
        ensure_entry_points(entry_points)?;
        let started = Instant::now();

        let store = DocumentStore::new(corpus, &self.patterns);
        let parsed = store.parse_all();
        let resolver = PathResolver::from_config(corpus.files.iter(), &self.config);

        let trace = InstructionGraphTracer::new(&store, &resolver).trace(entry_points);
        let coverage = CoverageAnalyzer::new(&self.patterns, &self.manifest, &resolver)
            .analyze(&trace.instructions);

        let comparable: Vec<ComparableDocument> = parsed
            .iter()
            .map(|doc| ComparableDocument::from_parsed(doc))
            .collect();
        let outcome = self.similarity.analyze(&comparable);
        let duplicate_pairs = self.similarity.duplicate_pairs(&outcome.results);

        let references = ReferenceValidator::new(&resolver).validate(&parsed, &trace.entry_points);

        let stats = AnalysisStats {
            documents_loaded: corpus.documents.len(),
            documents_skipped: corpus.skipped.len(),
            blocks: parsed.iter().map(|d| d.blocks.len()).sum(),
            instructions: parsed.iter().map(|d| d.instructions.len()).sum(),
            duration_ms: u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
        };

        tracing::info!(
            documents = stats.documents_loaded,
            skipped = stats.documents_skipped,
            visited = trace.visited.len(),
            instructions = trace.instructions.len(),
            overall_alignment = coverage.overall,
            duplicates = duplicate_pairs.len(),
            clusters = outcome.clusters.len(),
            orphans = references.orphans.len(),
            duration_ms = stats.duration_ms,
            "Analysis complete"
        );

        Ok(AnalysisReport {
            entry_points: trace.entry_points,
            missing_entry_points: trace.missing_entry_points,
            visited: trace.visited,
            unreached: trace.unreached,
            referenced_unvisited: trace.referenced_unvisited,
            instructions: trace.instructions,
            broken_links: trace.broken_links,
            coverage,
            similarities: outcome.results,
            duplicate_pairs,
            clusters: outcome.clusters,
            references: references.links,
            orphans: references.orphans,
            skipped: corpus.skipped.clone(),
            semantic_fallback: outcome.semantic_fallback,
            stats,
        })
    }
}

fn ensure_entry_points<S: AsRef<str>>(entry_points: &[S]) -> Result<()> {
    if entry_points.iter().all(|e| e.as_ref().trim().is_empty()) {
        return Err(DocGraphError::config("at least one entry point is required"));
    }
    Ok(())
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn engine() -> DocGraphEngine {
        DocGraphEngine::with_config(AnalysisConfig::default()).expect("should create")
    }

    #[test]
    fn test_new_rejects_invalid_config() {
        let config = AnalysisConfig {
            similarity_threshold: 1.5,
            ..AnalysisConfig::default()
        };
        let err = DocGraphEngine::with_config(config).unwrap_err();
        assert_eq!(err.category(), ErrorCategory::ConfigError);
    }

    #[test]
    fn test_empty_entry_set_is_fatal() {
        let corpus = Corpus::from_memory([("a.md", "# A")]);
        let empty: [&str; 0] = [];
        let err = engine().analyze_corpus(&corpus, &empty).unwrap_err();
        assert!(err.is_fatal());

        let err = engine().analyze_corpus(&corpus, &["  "]).unwrap_err();
        assert_eq!(err.category(), ErrorCategory::ConfigError);
    }

    #[test]
    fn test_analyze_in_memory_corpus() {
        let corpus = Corpus::from_memory([
            ("README.md", "# Home\n\nSee [setup](docs/setup.md).\n"),
            (
                "docs/setup.md",
                "# Setup\n\nRun the tests with `cargo test` before pushing.\n",
            ),
            ("docs/stray.md", "# Stray\n\nNothing links here.\n"),
        ]);
        let report = engine().analyze_corpus(&corpus, &["README.md"]).unwrap();

        assert_eq!(
            report.visited_set(),
            BTreeSet::from(["README.md".to_string(), "docs/setup.md".to_string()])
        );
        assert_eq!(report.orphans, vec!["docs/stray.md".to_string()]);
        assert_eq!(report.unreached, BTreeSet::from(["docs/stray.md".to_string()]));
        assert_eq!(report.stats.documents_loaded, 3);
        assert_eq!(report.similarities.len(), 3);
        assert!(
            report
                .instructions
                .iter()
                .all(|n| report.visited.contains_key(&n.id.document))
        );
        assert!(!report.semantic_fallback);
    }
}
