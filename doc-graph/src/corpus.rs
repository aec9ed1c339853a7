//! Corpus discovery and loading
//!
//! Reads the markdown documents of one analysis run into memory once. The
//! resulting [`Corpus`] is an immutable snapshot: nothing downstream touches
//! the filesystem again.

use crate::config::AnalysisConfig;
use crate::errors::{DocGraphError, Result};
use chrono::{DateTime, Utc};
use rayon::prelude::*;
use serde::Serialize;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use walkdir::{DirEntry, WalkDir};
use wildmatch::WildMatch;

/// Directories never descended into
const SKIPPED_DIRS: &[&str] = &[".git", "target"];

/// One markdown document as read from disk (or supplied in memory)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceDocument {
    /// Tree-relative, `/`-separated
    pub path: String,
    pub text: String,
    pub modified: Option<DateTime<Utc>>,
    pub size_bytes: u64,
}

/// Why a document was left out of the run
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum SkipReason {
    Oversized { size_bytes: u64, limit_bytes: u64 },
    Unreadable { message: String },
    /// Lives under a hidden directory such as `.github/`
    Hidden,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkippedDocument {
    pub path: String,
    #[serde(flatten)]
    pub reason: SkipReason,
}

/// Immutable snapshot of the documents and the file tree
#[derive(Debug, Clone, Default)]
pub struct Corpus {
    pub root: Option<PathBuf>,
    /// Sorted by path
    pub documents: Vec<SourceDocument>,
    /// Every non-excluded file in the tree (documents included)
    pub files: BTreeSet<String>,
    pub skipped: Vec<SkippedDocument>,
}

/// Result of one directory walk
struct TreeWalk {
    files: BTreeSet<String>,
    candidates: Vec<Candidate>,
    hidden: Vec<SkippedDocument>,
}

struct Candidate {
    rel: String,
    abs: PathBuf,
    size_bytes: u64,
    modified: Option<DateTime<Utc>>,
}

impl Corpus {
    /// Walk `root` and load every markdown document that survives the
    /// exclusion globs and the size cap
    pub fn load(root: &Path, config: &AnalysisConfig) -> Result<Self> {
        ensure_root(root)?;
        let walk = walk_tree(root, &config.exclude_matchers());

        let mut corpus = read_candidates(walk.candidates, config.max_document_bytes());
        corpus.root = Some(root.to_path_buf());
        corpus.files = walk.files;
        corpus.skipped.extend(walk.hidden);
        corpus.skipped.sort_by(|a, b| a.path.cmp(&b.path));
        tracing::info!(
            root = %root.display(),
            documents = corpus.documents.len(),
            skipped = corpus.skipped.len(),
            files = corpus.files.len(),
            "Loaded documentation corpus"
        );
        Ok(corpus)
    }

    /// Load an explicit document list (paths relative to `root`); the file
    /// tree for resolution is still walked from `root`
    pub fn load_documents(
        root: &Path,
        documents: &[PathBuf],
        config: &AnalysisConfig,
    ) -> Result<Self> {
        ensure_root(root)?;
        let files = walk_tree(root, &config.exclude_matchers()).files;

        let mut candidates = Vec::new();
        let mut missing = Vec::new();
        for doc in documents {
            let abs = if doc.is_absolute() {
                doc.clone()
            } else {
                root.join(doc)
            };
            let rel = relative_path(root, &abs);
            match std::fs::metadata(&abs) {
                Ok(metadata) if metadata.is_file() => candidates.push(Candidate {
                    rel,
                    abs,
                    size_bytes: metadata.len(),
                    modified: metadata.modified().ok().map(DateTime::<Utc>::from),
                }),
                Ok(_) => missing.push(SkippedDocument {
                    path: rel,
                    reason: SkipReason::Unreadable {
                        message: "not a regular file".to_string(),
                    },
                }),
                Err(e) => {
                    tracing::warn!(path = %rel, error = %e, "Listed document is missing; skipping");
                    missing.push(SkippedDocument {
                        path: rel,
                        reason: SkipReason::Unreadable {
                            message: e.to_string(),
                        },
                    });
                }
            }
        }

        let mut corpus = read_candidates(candidates, config.max_document_bytes());
        corpus.skipped.extend(missing);
        corpus.skipped.sort_by(|a, b| a.path.cmp(&b.path));
        corpus.root = Some(root.to_path_buf());
        corpus.files = files;
        for doc in &corpus.documents {
            corpus.files.insert(doc.path.clone());
        }
        Ok(corpus)
    }

    /// In-memory corpus; the file tree is exactly the document set
    pub fn from_memory<I, P, T>(documents: I) -> Self
    where
        I: IntoIterator<Item = (P, T)>,
        P: Into<String>,
        T: Into<String>,
    {
        let mut documents: Vec<SourceDocument> = documents
            .into_iter()
            .map(|(path, text)| {
                let text = text.into();
                SourceDocument {
                    path: path.into(),
                    size_bytes: text.len() as u64,
                    text,
                    modified: None,
                }
            })
            .collect();
        documents.sort_by(|a, b| a.path.cmp(&b.path));
        documents.dedup_by(|a, b| a.path == b.path);
        let files = documents.iter().map(|d| d.path.clone()).collect();
        Self {
            root: None,
            documents,
            files,
            skipped: Vec::new(),
        }
    }

    /// Add non-document files to the tree (in-memory corpora)
    pub fn with_files<I, S>(mut self, files: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.files.extend(files.into_iter().map(Into::into));
        self
    }

    pub fn document(&self, path: &str) -> Option<&SourceDocument> {
        self.documents
            .binary_search_by(|d| d.path.as_str().cmp(path))
            .ok()
            .map(|idx| &self.documents[idx])
    }

    pub fn is_document(&self, path: &str) -> bool {
        self.document(path).is_some()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }
}

fn ensure_root(root: &Path) -> Result<()> {
    if root.is_dir() {
        Ok(())
    } else {
        Err(DocGraphError::config(format!(
            "analysis root {} does not exist or is not a directory",
            root.display()
        )))
    }
}

/// All non-excluded files, plus the markdown documents among them
fn walk_tree(root: &Path, excludes: &[WildMatch]) -> TreeWalk {
    let mut files = BTreeSet::new();
    let mut candidates = Vec::new();
    let mut hidden = Vec::new();

    let walker = WalkDir::new(root)
        .min_depth(1)
        .follow_links(false)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| !is_skipped_dir(e));

    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to walk directory entry; skipping");
                continue;
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }
        let rel = relative_path(root, entry.path());
        if is_excluded(excludes, &rel) {
            continue;
        }
        files.insert(rel.clone());

        if !is_markdown_file(entry.path()) {
            continue;
        }
        if has_hidden_component(&rel) {
            tracing::debug!(path = %rel, "Markdown file under a hidden directory; not loaded");
            hidden.push(SkippedDocument {
                path: rel,
                reason: SkipReason::Hidden,
            });
        } else {
            let metadata = entry.metadata().ok();
            candidates.push(Candidate {
                rel,
                abs: entry.path().to_path_buf(),
                size_bytes: metadata.as_ref().map(|m| m.len()).unwrap_or(0),
                modified: metadata
                    .and_then(|m| m.modified().ok())
                    .map(DateTime::<Utc>::from),
            });
        }
    }
    TreeWalk {
        files,
        candidates,
        hidden,
    }
}

fn read_candidates(candidates: Vec<Candidate>, limit_bytes: u64) -> Corpus {
    let results: Vec<std::result::Result<SourceDocument, SkippedDocument>> = candidates
        .into_par_iter()
        .map(|candidate| {
            if candidate.size_bytes > limit_bytes {
                tracing::warn!(
                    path = %candidate.rel,
                    size_bytes = candidate.size_bytes,
                    limit_bytes,
                    "Document exceeds size cap; skipping"
                );
                return Err(SkippedDocument {
                    path: candidate.rel,
                    reason: SkipReason::Oversized {
                        size_bytes: candidate.size_bytes,
                        limit_bytes,
                    },
                });
            }
            match std::fs::read_to_string(&candidate.abs) {
                Ok(text) => Ok(SourceDocument {
                    path: candidate.rel,
                    size_bytes: text.len() as u64,
                    text,
                    modified: candidate.modified,
                }),
                Err(e) => {
                    let err = DocGraphError::io_with_source(&candidate.abs, e);
                    tracing::warn!(
                        path = %candidate.rel,
                        error = %err,
                        category = err.category().as_str(),
                        "Failed to read document; skipping"
                    );
                    Err(SkippedDocument {
                        path: candidate.rel,
                        reason: SkipReason::Unreadable {
                            message: std::error::Error::source(&err)
                                .map(ToString::to_string)
                                .unwrap_or_else(|| err.to_string()),
                        },
                    })
                }
            }
        })
        .collect();

    let mut corpus = Corpus::default();
    for result in results {
        match result {
            Ok(doc) => corpus.documents.push(doc),
            Err(skipped) => corpus.skipped.push(skipped),
        }
    }
    corpus.documents.sort_by(|a, b| a.path.cmp(&b.path));
    corpus.documents.dedup_by(|a, b| a.path == b.path);
    corpus
}

fn is_skipped_dir(entry: &DirEntry) -> bool {
    entry.file_type().is_dir()
        && entry
            .file_name()
            .to_str()
            .is_some_and(|name| SKIPPED_DIRS.contains(&name))
}

fn is_excluded(excludes: &[WildMatch], rel: &str) -> bool {
    excludes.iter().any(|pattern| pattern.matches(rel))
}

fn has_hidden_component(rel: &str) -> bool {
    rel.split('/')
        .rev()
        .skip(1)
        .any(|segment| segment.starts_with('.'))
}

/// `.md` / `.markdown`, case-insensitive
pub fn is_markdown_file(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("md") || e.eq_ignore_ascii_case("markdown"))
}

fn relative_path(root: &Path, path: &Path) -> String {
    let rel = path.strip_prefix(root).unwrap_or(path);
    rel.components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::fs;
    use tempfile::TempDir;

    fn write(root: &Path, rel: &str, contents: &str) {
        let path = root.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, contents).unwrap();
    }

    #[test]
    fn test_load_walks_markdown_and_tree() {
        let tmp = TempDir::new().unwrap();
        write(tmp.path(), "README.md", "# Root\n");
        write(tmp.path(), "docs/guide.markdown", "# Guide\n");
        write(tmp.path(), "scripts/build.sh", "echo hi\n");
        write(tmp.path(), ".github/workflows/ci.yml", "on: push\n");
        write(tmp.path(), ".github/PULL_REQUEST_TEMPLATE.md", "# PR\n");
        write(tmp.path(), "target/debug/notes.md", "# Build output\n");
        write(tmp.path(), "node_modules/pkg/README.md", "# Vendored\n");

        let corpus = Corpus::load(tmp.path(), &AnalysisConfig::default()).unwrap();
        let docs: Vec<&str> = corpus.documents.iter().map(|d| d.path.as_str()).collect();
        assert_eq!(docs, vec!["README.md", "docs/guide.markdown"]);
        assert!(corpus.files.contains("scripts/build.sh"));
        assert!(corpus.files.contains(".github/workflows/ci.yml"));
        assert!(!corpus.files.iter().any(|f| f.starts_with("target/")));
        assert!(!corpus.files.iter().any(|f| f.starts_with("node_modules/")));
        assert!(corpus.documents[0].modified.is_some());
        assert_eq!(
            corpus.skipped,
            vec![SkippedDocument {
                path: ".github/PULL_REQUEST_TEMPLATE.md".to_string(),
                reason: SkipReason::Hidden,
            }]
        );
    }

    #[test]
    fn test_exclude_patterns_apply_to_relative_paths() {
        let tmp = TempDir::new().unwrap();
        write(tmp.path(), "docs/a.md", "a");
        write(tmp.path(), "docs/archive/old.md", "old");
        write(tmp.path(), "notes.draft.md", "draft");

        let config = AnalysisConfig {
            exclude_patterns: vec!["docs/archive/*".to_string(), "*.draft.md".to_string()],
            ..AnalysisConfig::default()
        };
        let corpus = Corpus::load(tmp.path(), &config).unwrap();
        let docs: Vec<&str> = corpus.documents.iter().map(|d| d.path.as_str()).collect();
        assert_eq!(docs, vec!["docs/a.md"]);
    }

    #[test]
    fn test_oversized_documents_are_skipped_with_marker() {
        let tmp = TempDir::new().unwrap();
        write(tmp.path(), "small.md", "tiny");
        write(tmp.path(), "big.md", &"x".repeat(4096));

        let config = AnalysisConfig {
            max_document_size_mb: 1.0 / 1024.0,
            ..AnalysisConfig::default()
        };
        let corpus = Corpus::load(tmp.path(), &config).unwrap();
        assert_eq!(corpus.documents.len(), 1);
        assert_eq!(
            corpus.skipped,
            vec![SkippedDocument {
                path: "big.md".to_string(),
                reason: SkipReason::Oversized {
                    size_bytes: 4096,
                    limit_bytes: 1024,
                },
            }]
        );
        // Oversized documents still exist for link resolution
        assert!(corpus.files.contains("big.md"));
    }

    #[test]
    fn test_non_utf8_document_is_unreadable() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join("bad.md"), [0xff, 0xfe, 0x00]).unwrap();
        let corpus = Corpus::load(tmp.path(), &AnalysisConfig::default()).unwrap();
        assert!(corpus.documents.is_empty());
        assert!(matches!(
            corpus.skipped[0].reason,
            SkipReason::Unreadable { .. }
        ));
    }

    #[test]
    fn test_missing_root_is_fatal() {
        let tmp = TempDir::new().unwrap();
        let err = Corpus::load(&tmp.path().join("nope"), &AnalysisConfig::default()).unwrap_err();
        assert!(err.category().is_fatal());
    }

    #[test]
    fn test_explicit_document_list() {
        let tmp = TempDir::new().unwrap();
        write(tmp.path(), "a.md", "# A\n");
        write(tmp.path(), "b.md", "# B\n");
        let corpus = Corpus::load_documents(
            tmp.path(),
            &[PathBuf::from("b.md"), PathBuf::from("gone.md")],
            &AnalysisConfig::default(),
        )
        .unwrap();
        assert_eq!(corpus.documents.len(), 1);
        assert_eq!(corpus.documents[0].path, "b.md");
        assert!(corpus.files.contains("a.md"));
        assert_eq!(corpus.skipped[0].path, "gone.md");
    }

    #[test]
    fn test_from_memory_lookup() {
        let corpus = Corpus::from_memory([("b.md", "B"), ("a.md", "A")]).with_files(["x.sh"]);
        assert_eq!(corpus.document("a.md").map(|d| d.text.as_str()), Some("A"));
        assert!(corpus.is_document("b.md"));
        assert!(!corpus.is_document("x.sh"));
        assert!(corpus.files.contains("x.sh"));
    }
}
