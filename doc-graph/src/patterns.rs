//! Instruction and category pattern matching
//!
//! Heuristic rules that decide whether a block is an actionable instruction,
//! which file paths it mentions, and which coverage categories it touches.
//! All vocabularies are data carried by a [`PatternSet`] value, so two runs
//! with different taxonomies never share state.

use crate::blocks::{Block, BlockKind, normalize_text, strip_line_markers};
use crate::errors::{DocGraphError, Result};
use regex_lite::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::Path;
use std::str::FromStr;

/// Classification tag attached to an instruction
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InstructionTag {
    /// Mentions a file to create or touch
    FileGeneration,
    /// Pipelines, workflows, release automation
    CiCd,
    /// Test suites and verification
    Test,
    /// Module boundaries, design, ADRs
    Architecture,
    /// Locating files or code in the tree
    FileSearch,
    /// Actionable, but no category matched
    Directive,
}

impl InstructionTag {
    /// Tags that take part in coverage scoring
    pub const CATEGORIES: [InstructionTag; 5] = [
        Self::FileGeneration,
        Self::CiCd,
        Self::Test,
        Self::Architecture,
        Self::FileSearch,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::FileGeneration => "file_generation",
            Self::CiCd => "ci_cd",
            Self::Test => "test",
            Self::Architecture => "architecture",
            Self::FileSearch => "file_search",
            Self::Directive => "directive",
        }
    }

    pub fn is_category(&self) -> bool {
        !matches!(self, Self::Directive)
    }
}

impl fmt::Display for InstructionTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for InstructionTag {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace(['-', '/'], "_").as_str() {
            "file_generation" => Ok(Self::FileGeneration),
            "ci_cd" | "cicd" => Ok(Self::CiCd),
            "test" | "testing" => Ok(Self::Test),
            "architecture" => Ok(Self::Architecture),
            "file_search" => Ok(Self::FileSearch),
            "directive" => Ok(Self::Directive),
            _ => Err(format!("Unknown instruction category: {s}")),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Vocabulary data
// ─────────────────────────────────────────────────────────────────────────────

/// Serializable vocabulary bundle (TOML) from which a [`PatternSet`] is built
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VocabularySpec {
    /// Verbs that make a sentence an instruction when they appear early
    #[serde(default = "default_action_keywords")]
    pub action_keywords: Vec<String>,

    /// Verbs that make a sentence an instruction only alongside a path
    #[serde(default = "default_imperative_verbs")]
    pub imperative_verbs: Vec<String>,

    /// Extensions that make a token path-shaped
    #[serde(default = "default_known_extensions")]
    pub known_extensions: Vec<String>,

    /// Extension-less file names that are still paths
    #[serde(default = "default_known_file_names")]
    pub known_file_names: Vec<String>,

    /// How many leading tokens are searched for an action keyword
    #[serde(default = "default_instruction_window")]
    pub instruction_window: usize,

    /// Category name -> phrases. Phrases containing `/` or `.` match as
    /// substrings of a token; others match whole token sequences.
    #[serde(default = "default_categories")]
    pub categories: BTreeMap<String, Vec<String>>,
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| (*s).to_string()).collect()
}

fn default_action_keywords() -> Vec<String> {
    strings(&[
        "create", "run", "add", "update", "generate", "write", "implement", "install",
        "configure", "execute", "build", "delete", "remove", "rename", "move", "copy",
        "scaffold", "initialize", "init", "deploy", "enable", "migrate", "register", "ensure",
        "define", "invoke", "setup",
    ])
}

fn default_imperative_verbs() -> Vec<String> {
    strings(&[
        "use", "follow", "read", "see", "check", "verify", "review", "place", "put", "store",
        "edit", "modify", "document", "reference", "include", "keep", "consult", "open",
    ])
}

fn default_known_extensions() -> Vec<String> {
    strings(&[
        "md", "markdown", "rs", "toml", "yml", "yaml", "json", "sh", "bash", "py", "ts", "tsx",
        "js", "jsx", "go", "java", "kt", "txt", "cfg", "ini", "lock", "sql", "html", "css",
        "proto", "graphql", "env", "xml", "csv", "mjs", "ps1",
    ])
}

fn default_known_file_names() -> Vec<String> {
    strings(&[
        "Dockerfile", "Makefile", "Justfile", "Procfile", "CODEOWNERS", "LICENSE",
    ])
}

fn default_instruction_window() -> usize {
    6
}

fn default_categories() -> BTreeMap<String, Vec<String>> {
    let mut categories = BTreeMap::new();
    categories.insert(
        "ci_cd".to_string(),
        strings(&[
            "ci", "cd", "ci/cd", "pipeline", "pipelines", "workflow", "workflows",
            "github actions", ".github/workflows", "pre-commit", "release", "deploy",
            "deployment", "continuous integration", "build matrix", "gitlab-ci", "artifact",
        ]),
    );
    categories.insert(
        "test".to_string(),
        strings(&[
            "test", "tests", "testing", "unit test", "integration test", "e2e", "fixture",
            "fixtures", "coverage", "assert", "cargo test", "pytest", "golden", "snapshot",
            "regression", "tests/",
        ]),
    );
    categories.insert(
        "architecture".to_string(),
        strings(&[
            "architecture", "architectural", "adr", "design", "module", "modules", "boundary",
            "boundaries", "layer", "layers", "component", "components", "dependency graph",
            "interface", "diagram", "docs/adr",
        ]),
    );
    categories.insert(
        "file_search".to_string(),
        strings(&[
            "search", "find", "locate", "grep", "ripgrep", "glob", "lookup", "index", "scan",
        ]),
    );
    categories.insert(
        "file_generation".to_string(),
        strings(&["template", "templates", "scaffold", "boilerplate", "generate", "generated"]),
    );
    categories
}

impl Default for VocabularySpec {
    fn default() -> Self {
        Self {
            action_keywords: default_action_keywords(),
            imperative_verbs: default_imperative_verbs(),
            known_extensions: default_known_extensions(),
            known_file_names: default_known_file_names(),
            instruction_window: default_instruction_window(),
            categories: default_categories(),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// PatternSet
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
struct Phrase {
    text: String,
    tokens: Vec<String>,
    substring: bool,
}

impl Phrase {
    fn new(raw: &str) -> Self {
        let text = raw.trim().to_lowercase();
        let substring = text.contains('/') || text.contains('.');
        let tokens = text.split_whitespace().map(str::to_string).collect();
        Self {
            text,
            tokens,
            substring,
        }
    }

    fn matches(&self, tokens: &[&str]) -> bool {
        if self.tokens.is_empty() {
            return false;
        }
        if self.substring {
            return tokens.iter().any(|t| t.contains(self.text.as_str()));
        }
        tokens
            .windows(self.tokens.len())
            .any(|w| w.iter().zip(&self.tokens).all(|(a, b)| *a == b.as_str()))
    }
}

/// Result of classifying one block
#[derive(Debug, Clone, PartialEq)]
pub struct Classification {
    /// Qualifying sentences, markers stripped, whitespace collapsed
    pub text: String,
    pub tags: BTreeSet<InstructionTag>,
    /// Path tokens as written
    pub file_refs: Vec<String>,
    /// Keywords and phrases that fired (for audit/debugging)
    pub matched_signals: Vec<String>,
}

/// Compiled classification rules
#[derive(Debug, Clone)]
pub struct PatternSet {
    action_keywords: BTreeSet<String>,
    imperative_verbs: BTreeSet<String>,
    known_extensions: BTreeSet<String>,
    known_file_names: BTreeSet<String>,
    instruction_window: usize,
    vocabularies: BTreeMap<InstructionTag, Vec<Phrase>>,
    inline_code: Regex,
    inline_link: Regex,
}

impl PatternSet {
    /// Rules built from the bundled vocabularies
    pub fn builtin() -> Result<Self> {
        Self::from_spec(VocabularySpec::default())
    }

    /// Compile a vocabulary bundle
    pub fn from_spec(spec: VocabularySpec) -> Result<Self> {
        if spec.instruction_window == 0 {
            return Err(DocGraphError::config("instruction_window must be at least 1"));
        }

        let mut vocabularies = BTreeMap::new();
        for (name, phrases) in &spec.categories {
            let tag = InstructionTag::from_str(name).map_err(DocGraphError::config)?;
            if !tag.is_category() {
                return Err(DocGraphError::config(format!(
                    "`{name}` is not a coverage category"
                )));
            }
            let compiled: Vec<Phrase> = phrases
                .iter()
                .map(|p| Phrase::new(p))
                .filter(|p| !p.tokens.is_empty())
                .collect();
            vocabularies.insert(tag, compiled);
        }

        let lower = |items: &[String]| -> BTreeSet<String> {
            items.iter().map(|s| s.trim().to_lowercase()).collect()
        };

        Ok(Self {
            action_keywords: lower(&spec.action_keywords),
            imperative_verbs: lower(&spec.imperative_verbs),
            known_extensions: spec
                .known_extensions
                .iter()
                .map(|e| e.trim().trim_start_matches('.').to_lowercase())
                .collect(),
            known_file_names: spec.known_file_names.iter().cloned().collect(),
            instruction_window: spec.instruction_window,
            vocabularies,
            inline_code: compile(r"`([^`]+)`")?,
            inline_link: compile(r"(!?)\[[^\]]*\]\(([^)]*)\)")?,
        })
    }

    /// Parse a vocabulary bundle from TOML
    pub fn parse_toml(contents: &str) -> Result<Self> {
        let spec: VocabularySpec = toml::from_str(contents)
            .map_err(|e| DocGraphError::config_with_source("failed to parse vocabularies", e))?;
        Self::from_spec(spec)
    }

    /// Load a vocabulary bundle from a TOML file
    pub fn load_from_path(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            DocGraphError::config_with_source(
                format!("failed to read vocabularies at {}", path.display()),
                e,
            )
        })?;
        Self::parse_toml(&contents)
    }

    /// Categories with at least one phrase
    pub fn categories(&self) -> impl Iterator<Item = InstructionTag> + '_ {
        self.vocabularies.keys().copied()
    }

    /// Whether normalized text reads as an actionable directive
    pub fn is_instruction(&self, normalized: &str, raw: &str) -> bool {
        self.instruction_signal(normalized, raw).is_some()
    }

    fn instruction_signal(&self, normalized: &str, raw: &str) -> Option<String> {
        let tokens: Vec<&str> = normalized.split_whitespace().collect();
        if let Some(hit) = tokens
            .iter()
            .take(self.instruction_window)
            .find(|t| self.action_keywords.contains(**t))
        {
            return Some(format!("action:{hit}"));
        }
        let verb = tokens.iter().find(|t| self.imperative_verbs.contains(**t))?;
        if self.extract_paths(raw).is_empty() {
            return None;
        }
        Some(format!("imperative:{verb}"))
    }

    /// Category tags whose vocabulary matches the normalized text
    pub fn category_tags(&self, normalized: &str) -> (BTreeSet<InstructionTag>, Vec<String>) {
        let tokens: Vec<&str> = normalized.split_whitespace().collect();
        let mut tags = BTreeSet::new();
        let mut signals = Vec::new();
        for (tag, phrases) in &self.vocabularies {
            for phrase in phrases {
                if phrase.matches(&tokens) {
                    tags.insert(*tag);
                    signals.push(format!("{tag}:{}", phrase.text));
                }
            }
        }
        (tags, signals)
    }

    /// Path-shaped tokens in raw text, as written, deduplicated in order.
    ///
    /// Inline-code spans are checked leniently (any `a/b` token counts);
    /// plain prose needs an extension or an unambiguous path shape so that
    /// words like `and/or` and `CI/CD` are not mistaken for paths. Link
    /// targets are left to [`PatternSet::extract_links`].
    pub fn extract_paths(&self, raw: &str) -> Vec<String> {
        let mut out: Vec<String> = Vec::new();
        let mut push = |token: String| {
            if !out.contains(&token) {
                out.push(token);
            }
        };

        let without_links = self.inline_link.replace_all(raw, " ");
        for cap in self.inline_code.captures_iter(&without_links) {
            for token in cap[1].split_whitespace() {
                if let Some(path) = self.path_token(token, true) {
                    push(path);
                }
            }
        }

        let prose = self.inline_code.replace_all(&without_links, " ");
        for token in prose.split_whitespace() {
            if let Some(path) = self.path_token(token, false) {
                push(path);
            }
        }
        out
    }

    /// Outbound link targets as written: inline `[label](target)` links
    /// (images skipped, `<...>` unwrapped, titles dropped) plus bare
    /// markdown paths mentioned in the text.
    pub fn extract_links(&self, raw: &str) -> Vec<String> {
        let mut out: Vec<String> = Vec::new();
        for cap in self.inline_link.captures_iter(raw) {
            if &cap[1] == "!" {
                continue;
            }
            let target = cap[2].trim();
            let target = if let Some(inner) = target
                .strip_prefix('<')
                .and_then(|t| t.strip_suffix('>'))
            {
                inner.trim()
            } else {
                target.split_whitespace().next().unwrap_or_default()
            };
            if !target.is_empty() && !out.iter().any(|t| t == target) {
                out.push(target.to_string());
            }
        }
        for path in self.extract_paths(raw) {
            if is_markdown_path(&path) && !out.contains(&path) {
                out.push(path);
            }
        }
        out
    }

    fn path_token(&self, token: &str, in_code: bool) -> Option<String> {
        let token = token
            .trim_start_matches(['(', '"', '\'', '[', '<'])
            .trim_end_matches(['.', ',', ';', ':', ')', '!', '?', '"', '\'', ']', '>']);
        if token.is_empty()
            || token.contains("://")
            || token.contains('@')
            || token.starts_with('-')
            || !token.chars().any(char::is_alphanumeric)
        {
            return None;
        }
        if !token
            .chars()
            .all(|c| c.is_alphanumeric() || matches!(c, '/' | '.' | '-' | '_' | '~' | '\\'))
        {
            return None;
        }

        let file_name = token.rsplit(['/', '\\']).next().unwrap_or(token);
        if self.known_file_names.contains(file_name) {
            return Some(token.to_string());
        }
        if let Some((stem, ext)) = file_name.rsplit_once('.')
            && self.known_extensions.contains(&ext.to_lowercase())
            && (!stem.is_empty() || in_code || token.contains('/'))
        {
            return Some(token.to_string());
        }
        if !token.contains('/') {
            return None;
        }
        if in_code {
            return Some(token.to_string());
        }
        let segments = token.split('/').filter(|s| !s.is_empty()).count();
        let anchored = token.starts_with("./")
            || token.starts_with("../")
            || token.starts_with("~/")
            || token.starts_with('/')
            || token.ends_with('/');
        if anchored || segments >= 3 {
            Some(token.to_string())
        } else {
            None
        }
    }

    /// Classify a block; `None` when it carries no instruction
    pub fn classify(&self, block: &Block) -> Option<Classification> {
        if !matches!(
            block.kind,
            BlockKind::Paragraph | BlockKind::ListItem | BlockKind::Blockquote
        ) {
            return None;
        }

        let mut sentences = Vec::new();
        let mut signals = Vec::new();
        for sentence in split_sentences(&block.raw) {
            let normalized = normalize_text(&sentence);
            if let Some(signal) = self.instruction_signal(&normalized, &sentence) {
                signals.push(signal);
                sentences.push(sentence);
            }
        }
        if sentences.is_empty() {
            return None;
        }

        let text = sentences.join(" ");
        let mut file_refs = Vec::new();
        for sentence in &sentences {
            for path in self.extract_paths(sentence) {
                if !file_refs.contains(&path) {
                    file_refs.push(path);
                }
            }
        }

        // Section titles give context ("## CI" above "- Create ci.yml")
        let mut context = normalize_text(&text);
        for title in &block.heading_path {
            context.push(' ');
            context.push_str(&normalize_text(title));
        }
        let (mut tags, category_signals) = self.category_tags(&context);
        signals.extend(category_signals);

        if !file_refs.is_empty() {
            tags.insert(InstructionTag::FileGeneration);
        }
        if tags.is_empty() {
            tags.insert(InstructionTag::Directive);
        }

        Some(Classification {
            text,
            tags,
            file_refs,
            matched_signals: signals,
        })
    }
}

fn compile(pattern: &str) -> Result<Regex> {
    Regex::new(pattern).map_err(|e| {
        DocGraphError::internal(format!("invalid built-in pattern {pattern:?}: {e}"))
    })
}

/// Whether a link target or path names a markdown document
pub fn is_markdown_path(target: &str) -> bool {
    let path = target.split('#').next().unwrap_or(target).to_lowercase();
    path.ends_with(".md") || path.ends_with(".markdown")
}

/// Split block text into sentences with list/quote markers removed.
///
/// A sentence ends at `.`, `!` or `?` followed by whitespace, so dots
/// inside paths (`docs/a.md`) never split.
pub fn split_sentences(raw: &str) -> Vec<String> {
    let joined = raw
        .lines()
        .map(strip_line_markers)
        .collect::<Vec<_>>()
        .join(" ");
    let chars: Vec<char> = joined.chars().collect();
    let mut sentences = Vec::new();
    let mut current = String::new();

    for (idx, ch) in chars.iter().enumerate() {
        current.push(*ch);
        let at_boundary = matches!(ch, '.' | '!' | '?')
            && chars.get(idx + 1).is_none_or(|next| next.is_whitespace());
        if at_boundary {
            let sentence = collapse_whitespace(&current);
            if !sentence.is_empty() {
                sentences.push(sentence);
            }
            current.clear();
        }
    }
    let tail = collapse_whitespace(&current);
    if !tail.is_empty() {
        sentences.push(tail);
    }
    sentences
}

fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blocks::parse_blocks;
    use pretty_assertions::assert_eq;

    fn patterns() -> PatternSet {
        PatternSet::builtin().unwrap()
    }

    fn classify_first(doc: &str) -> Option<Classification> {
        let blocks = parse_blocks(doc);
        patterns().classify(&blocks[blocks.len() - 1])
    }

    #[test]
    fn test_tag_from_str() {
        assert_eq!(InstructionTag::from_str("CI/CD").unwrap(), InstructionTag::CiCd);
        assert_eq!(InstructionTag::from_str("ci-cd").unwrap(), InstructionTag::CiCd);
        assert_eq!(
            InstructionTag::from_str("file_generation").unwrap(),
            InstructionTag::FileGeneration
        );
        assert!(InstructionTag::from_str("astrology").is_err());
    }

    #[test]
    fn test_action_keyword_in_window() {
        let p = patterns();
        assert!(p.is_instruction("create the config file", "Create the config file"));
        assert!(p.is_instruction("you must then run the linter", "You must then run the linter"));
        assert!(!p.is_instruction(
            "this long paragraph eventually mentions that we might run",
            "This long paragraph eventually mentions that we might run"
        ));
    }

    #[test]
    fn test_imperative_verb_needs_path() {
        let p = patterns();
        assert!(p.is_instruction(
            "follow docs/style.md for naming",
            "Follow docs/style.md for naming"
        ));
        assert!(!p.is_instruction("follow the team norms", "Follow the team norms"));
    }

    #[test]
    fn test_extract_paths_prose_and_code() {
        let p = patterns();
        let paths = p.extract_paths(
            "Create `scripts/build.sh` and update Cargo.toml, then see ./docs/guide and/or CI/CD.",
        );
        assert_eq!(
            paths,
            vec![
                "scripts/build.sh".to_string(),
                "Cargo.toml".to_string(),
                "./docs/guide".to_string(),
            ]
        );
    }

    #[test]
    fn test_extract_paths_ignores_urls_and_versions() {
        let p = patterns();
        assert!(
            p.extract_paths("Bump to 1.2.3, e.g. via https://example.com/a/b.md")
                .is_empty()
        );
    }

    #[test]
    fn test_extract_paths_known_file_names() {
        let p = patterns();
        assert_eq!(
            p.extract_paths("Add a Dockerfile next to docker/Makefile"),
            vec!["Dockerfile".to_string(), "docker/Makefile".to_string()]
        );
    }

    #[test]
    fn test_extract_links() {
        let p = patterns();
        let links = p.extract_links(
            "See [guide](docs/guide.md#setup \"Setup\"), ![img](img/a.png), [ext](https://x.io) and `plan.md`.",
        );
        assert_eq!(
            links,
            vec![
                "docs/guide.md#setup".to_string(),
                "https://x.io".to_string(),
                "plan.md".to_string(),
            ]
        );
        assert_eq!(
            p.extract_links("[spaced](<my docs/a b.md>)"),
            vec!["my docs/a b.md".to_string()]
        );
    }

    #[test]
    fn test_classify_file_generation_and_ci() {
        let result = classify_first(
            "## CI\n\n- Create `.github/workflows/ci.yml` that runs the test suite.\n",
        )
        .expect("instruction");
        assert!(result.tags.contains(&InstructionTag::FileGeneration));
        assert!(result.tags.contains(&InstructionTag::CiCd));
        assert!(result.tags.contains(&InstructionTag::Test));
        assert!(!result.tags.contains(&InstructionTag::Directive));
        assert_eq!(result.file_refs, vec![".github/workflows/ci.yml".to_string()]);
    }

    #[test]
    fn test_classify_generic_directive() {
        let result = classify_first("Update the changelog before merging.").expect("instruction");
        assert_eq!(
            result.tags.into_iter().collect::<Vec<_>>(),
            vec![InstructionTag::Directive]
        );
    }

    #[test]
    fn test_classify_keeps_only_qualifying_sentences() {
        let result = classify_first(
            "This section explains the layout. Run `cargo test -p codex-doc-graph` afterwards.",
        )
        .expect("instruction");
        assert_eq!(result.text, "Run `cargo test -p codex-doc-graph` afterwards.");
    }

    #[test]
    fn test_non_instruction_blocks() {
        assert!(classify_first("The system is composed of three layers.").is_none());
        assert!(classify_first("```\nrun everything\n```\n").is_none());
        assert!(classify_first("# Create things\n").is_none());
    }

    #[test]
    fn test_custom_vocabulary_from_toml() {
        let p = PatternSet::parse_toml(
            r#"
            action_keywords = ["provision"]
            [categories]
            "ci-cd" = ["buildkite"]
            "#,
        )
        .unwrap();
        assert!(p.is_instruction("provision the runners", "Provision the runners"));
        assert!(!p.is_instruction("create the runners", "Create the runners"));
        let (tags, _) = p.category_tags("provision buildkite agents");
        assert_eq!(tags.into_iter().collect::<Vec<_>>(), vec![InstructionTag::CiCd]);
        assert_eq!(p.categories().collect::<Vec<_>>(), vec![InstructionTag::CiCd]);
    }

    #[test]
    fn test_unknown_category_is_config_error() {
        let err = PatternSet::parse_toml("[categories]\nvibes = [\"x\"]\n").unwrap_err();
        assert!(err.category().is_fatal());
        let err = PatternSet::parse_toml("[categories]\ndirective = [\"x\"]\n").unwrap_err();
        assert!(err.to_string().contains("not a coverage category"));
    }

    #[test]
    fn test_split_sentences() {
        assert_eq!(
            split_sentences("- First step. Then edit docs/a.md! Done?\n  Trailing"),
            vec![
                "First step.".to_string(),
                "Then edit docs/a.md!".to_string(),
                "Done?".to_string(),
                "Trailing".to_string(),
            ]
        );
    }
}
