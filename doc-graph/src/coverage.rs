//! Category coverage against a required-files manifest

use crate::document::InstructionNode;
use crate::errors::{DocGraphError, Result};
use crate::patterns::{InstructionTag, PatternSet};
use crate::resolver::{PathResolver, normalize_path};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use std::str::FromStr;

/// Paths expected to exist, grouped by category
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequiredFilesManifest {
    categories: BTreeMap<InstructionTag, BTreeSet<String>>,
}

/// On-disk shape:
///
/// ```toml
/// [required]
/// ci_cd = [".github/workflows/ci.yml"]
/// test = ["tests/"]
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct ManifestFile {
    #[serde(default)]
    required: BTreeMap<String, Vec<String>>,
}

impl RequiredFilesManifest {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add expected paths for a category (builder style)
    pub fn with_category<I, S>(mut self, category: InstructionTag, paths: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let entry = self.categories.entry(category).or_default();
        entry.extend(paths.into_iter().filter_map(|p| normalize_path(p.as_ref())));
        entry.remove("");
        self
    }

    pub fn parse(contents: &str) -> Result<Self> {
        let file: ManifestFile = toml::from_str(contents)
            .map_err(|e| DocGraphError::config_with_source("failed to parse manifest", e))?;
        let mut manifest = Self::new();
        for (name, paths) in file.required {
            let category = InstructionTag::from_str(&name).map_err(DocGraphError::config)?;
            if !category.is_category() {
                return Err(DocGraphError::config(format!(
                    "manifest section `{name}` is not a coverage category"
                )));
            }
            if let Some(bad) = paths.iter().find(|p| normalize_path(p).is_none()) {
                return Err(DocGraphError::config(format!(
                    "manifest path {bad:?} escapes the analysis root"
                )));
            }
            manifest = manifest.with_category(category, paths);
        }
        Ok(manifest)
    }

    pub fn load_from_path(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            DocGraphError::config_with_source(
                format!("failed to read manifest at {}", path.display()),
                e,
            )
        })?;
        Self::parse(&contents)
    }

    pub fn expected(&self, category: InstructionTag) -> Option<&BTreeSet<String>> {
        self.categories.get(&category)
    }

    pub fn categories(&self) -> impl Iterator<Item = InstructionTag> + '_ {
        self.categories.keys().copied()
    }
}

/// Coverage numbers for one category
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CategoryCoverage {
    pub category: InstructionTag,
    /// Instructions carrying the tag
    pub instructions: usize,
    /// Distinct resolved paths those instructions reference
    pub found: usize,
    /// Distinct manifest paths
    pub expected: usize,
    /// Manifest paths that are referenced and exist
    pub present: usize,
    /// `present / expected * 100`, 100 when nothing is expected
    pub alignment: f64,
    /// Manifest paths not covered
    pub missing: Vec<String>,
    /// References that did not resolve to an existing path
    pub unresolved_refs: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CoverageReport {
    pub categories: Vec<CategoryCoverage>,
    /// Equal-weight mean over categories with a non-empty manifest
    pub overall: f64,
}

impl CoverageReport {
    pub fn category(&self, category: InstructionTag) -> Option<&CategoryCoverage> {
        self.categories.iter().find(|c| c.category == category)
    }
}

/// Alignment percentage, clamped to `[0, 100]`
pub fn alignment_percentage(present: usize, expected: usize) -> f64 {
    if expected == 0 {
        return 100.0;
    }
    (present as f64 / expected as f64 * 100.0).clamp(0.0, 100.0)
}

/// Aggregates traced instructions into per-category coverage
#[derive(Debug, Clone, Copy)]
pub struct CoverageAnalyzer<'a> {
    patterns: &'a PatternSet,
    manifest: &'a RequiredFilesManifest,
    resolver: &'a PathResolver,
}

impl<'a> CoverageAnalyzer<'a> {
    pub fn new(
        patterns: &'a PatternSet,
        manifest: &'a RequiredFilesManifest,
        resolver: &'a PathResolver,
    ) -> Self {
        Self {
            patterns,
            manifest,
            resolver,
        }
    }

    pub fn analyze(&self, instructions: &[InstructionNode]) -> CoverageReport {
        let mut categories: BTreeSet<InstructionTag> = self.patterns.categories().collect();
        categories.extend(self.manifest.categories());
        categories.insert(InstructionTag::FileGeneration);

        let empty = BTreeSet::new();
        let mut report = Vec::with_capacity(categories.len());
        for category in categories {
            let tagged: Vec<&InstructionNode> =
                instructions.iter().filter(|n| n.has_tag(category)).collect();

            let mut found = BTreeSet::new();
            let mut unresolved = BTreeSet::new();
            for node in &tagged {
                for file_ref in &node.file_refs {
                    match self.resolver.resolve_from(file_ref, &node.id.document).path() {
                        Some(path) => {
                            found.insert(path.to_string());
                        }
                        None => {
                            unresolved.insert(file_ref.clone());
                        }
                    }
                }
            }

            let expected = self.manifest.expected(category).unwrap_or(&empty);
            let (present, missing): (Vec<&String>, Vec<&String>) = expected
                .iter()
                .partition(|path| found.contains(*path) && self.resolver.exists(path));

            report.push(CategoryCoverage {
                category,
                instructions: tagged.len(),
                found: found.len(),
                expected: expected.len(),
                present: present.len(),
                alignment: alignment_percentage(present.len(), expected.len()),
                missing: missing.into_iter().cloned().collect(),
                unresolved_refs: unresolved.into_iter().collect(),
            });
        }

        let scored: Vec<f64> = report
            .iter()
            .filter(|c| c.expected > 0)
            .map(|c| c.alignment)
            .collect();
        let overall = if scored.is_empty() {
            100.0
        } else {
            scored.iter().sum::<f64>() / scored.len() as f64
        };

        tracing::info!(
            categories = report.len(),
            overall,
            "Coverage computed"
        );
        CoverageReport {
            categories: report,
            overall,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::NodeId;
    use pretty_assertions::assert_eq;

    fn node(doc: &str, idx: usize, tags: &[InstructionTag], refs: &[&str]) -> InstructionNode {
        InstructionNode {
            id: NodeId {
                document: doc.to_string(),
                block_index: idx,
            },
            text: String::new(),
            tags: tags.iter().copied().collect(),
            file_refs: refs.iter().map(|r| (*r).to_string()).collect(),
            links: Vec::new(),
            heading_path: Vec::new(),
            line: 1,
            matched_signals: Vec::new(),
        }
    }

    #[test]
    fn test_alignment_percentage_bounds() {
        assert_eq!(alignment_percentage(0, 0), 100.0);
        assert_eq!(alignment_percentage(0, 4), 0.0);
        assert_eq!(alignment_percentage(7, 10), 70.0);
        assert_eq!(alignment_percentage(12, 10), 100.0);
    }

    #[test]
    fn test_manifest_parse() {
        let manifest = RequiredFilesManifest::parse(
            r#"
            [required]
            "ci-cd" = ["./.github/workflows/ci.yml", ".github/workflows/ci.yml"]
            test = ["tests/"]
            "#,
        )
        .unwrap();
        assert_eq!(
            manifest.expected(InstructionTag::CiCd).unwrap().iter().collect::<Vec<_>>(),
            vec![".github/workflows/ci.yml"]
        );
        assert_eq!(
            manifest.expected(InstructionTag::Test).unwrap().iter().collect::<Vec<_>>(),
            vec!["tests"]
        );
    }

    #[test]
    fn test_manifest_rejects_unknown_sections() {
        assert!(RequiredFilesManifest::parse("[required]\nmisc = [\"a\"]\n").is_err());
        assert!(RequiredFilesManifest::parse("[required]\ntest = [\"../x\"]\n").is_err());
    }

    #[test]
    fn test_seven_of_ten_ci_files_is_seventy_percent() {
        let files: Vec<String> = (0..10).map(|i| format!("ci/job{i}.yml")).collect();
        let resolver = PathResolver::new(files.iter());
        let manifest = RequiredFilesManifest::new().with_category(InstructionTag::CiCd, &files);
        let referenced: Vec<&str> = files.iter().take(7).map(String::as_str).collect();
        let nodes = vec![node("ci.md", 0, &[InstructionTag::CiCd], &referenced)];

        let patterns = PatternSet::builtin().unwrap();
        let report = CoverageAnalyzer::new(&patterns, &manifest, &resolver).analyze(&nodes);
        let ci = report.category(InstructionTag::CiCd).unwrap();
        assert_eq!((ci.found, ci.expected, ci.present), (7, 10, 7));
        assert_eq!(ci.alignment, 70.0);
        assert_eq!(ci.missing.len(), 3);
        // Only CI/CD has a manifest, so it alone drives the overall score
        assert_eq!(report.overall, 70.0);
    }

    #[test]
    fn test_missing_reference_counts_as_expected_not_present() {
        let resolver = PathResolver::new(["scripts/build.sh"]);
        let manifest = RequiredFilesManifest::new().with_category(
            InstructionTag::FileGeneration,
            ["scripts/build.sh", "scripts/missing.py"],
        );
        let nodes = vec![node(
            "a.md",
            2,
            &[InstructionTag::FileGeneration],
            &["scripts/build.sh", "scripts/missing.py"],
        )];
        let patterns = PatternSet::builtin().unwrap();
        let report = CoverageAnalyzer::new(&patterns, &manifest, &resolver).analyze(&nodes);
        let files = report.category(InstructionTag::FileGeneration).unwrap();
        assert_eq!((files.expected, files.present), (2, 1));
        assert_eq!(files.missing, vec!["scripts/missing.py".to_string()]);
        assert_eq!(files.unresolved_refs, vec!["scripts/missing.py".to_string()]);
        assert_eq!(files.alignment, 50.0);
    }

    #[test]
    fn test_untagged_references_do_not_count() {
        let resolver = PathResolver::new(["tests/smoke.rs"]);
        let manifest =
            RequiredFilesManifest::new().with_category(InstructionTag::Test, ["tests/smoke.rs"]);
        let nodes = vec![node("a.md", 0, &[InstructionTag::Directive], &["tests/smoke.rs"])];
        let patterns = PatternSet::builtin().unwrap();
        let report = CoverageAnalyzer::new(&patterns, &manifest, &resolver).analyze(&nodes);
        assert_eq!(report.category(InstructionTag::Test).unwrap().present, 0);
        assert_eq!(report.overall, 0.0);
    }

    #[test]
    fn test_empty_manifest_overall_is_full() {
        let resolver = PathResolver::default();
        let manifest = RequiredFilesManifest::new();
        let patterns = PatternSet::builtin().unwrap();
        let report = CoverageAnalyzer::new(&patterns, &manifest, &resolver).analyze(&[]);
        assert_eq!(report.overall, 100.0);
        assert!(report.categories.iter().all(|c| c.alignment == 100.0));
    }
}
