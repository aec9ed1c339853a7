//! Path resolution against a precomputed file tree
//!
//! The resolver is pure: it only consults the path set it was built with and
//! never touches the filesystem.

use crate::config::{AnalysisConfig, PathAlias};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Which resolution step produced a match
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionStep {
    /// Relative to the directory of the linking document
    DocumentRelative,
    /// Exact match from the tree root
    Exact,
    /// After stripping a common prefix or rewriting an alias
    Alias,
    /// Unique file-name (or longer suffix) match anywhere in the tree
    SuffixMatch,
}

/// Outcome of resolving one path token
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Resolution {
    Resolved { path: String, via: ResolutionStep },
    /// Several files match; never guessed
    Ambiguous { candidates: Vec<String> },
    Missing,
}

impl Resolution {
    pub fn path(&self) -> Option<&str> {
        match self {
            Self::Resolved { path, .. } => Some(path),
            _ => None,
        }
    }

    pub fn is_resolved(&self) -> bool {
        matches!(self, Self::Resolved { .. })
    }
}

/// Resolves raw path tokens to tree-relative paths
#[derive(Debug, Clone, Default)]
pub struct PathResolver {
    files: BTreeSet<String>,
    dirs: BTreeSet<String>,
    by_name: BTreeMap<String, Vec<String>>,
    aliases: Vec<PathAlias>,
    strip_prefixes: Vec<String>,
}

impl PathResolver {
    /// Build from tree-relative paths (`/`-separated)
    pub fn new<I, S>(files: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut resolver = Self::default();
        for file in files {
            let Some(path) = normalize_path(file.as_ref()) else {
                continue;
            };
            if path.is_empty() {
                continue;
            }
            let mut parent = path.as_str();
            while let Some((dir, _)) = parent.rsplit_once('/') {
                resolver.dirs.insert(dir.to_string());
                parent = dir;
            }
            let name = file_name(&path).to_string();
            resolver.by_name.entry(name).or_default().push(path.clone());
            resolver.files.insert(path);
        }
        for candidates in resolver.by_name.values_mut() {
            candidates.sort();
            candidates.dedup();
        }
        resolver
    }

    /// Build with the alias table and strippable prefixes from `config`
    pub fn from_config<I, S>(files: I, config: &AnalysisConfig) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self::new(files)
            .with_aliases(config.path_aliases.clone())
            .with_strip_prefixes(config.strip_prefixes.clone())
    }

    pub fn with_aliases(mut self, aliases: Vec<PathAlias>) -> Self {
        self.aliases = aliases
            .into_iter()
            .filter_map(|alias| {
                let from = normalize_path(&alias.from)?;
                let to = normalize_path(&alias.to)?;
                (!from.is_empty()).then_some(PathAlias { from, to })
            })
            .collect();
        self
    }

    pub fn with_strip_prefixes(mut self, prefixes: Vec<String>) -> Self {
        self.strip_prefixes = prefixes
            .iter()
            .filter_map(|p| normalize_path(p))
            .filter(|p| !p.is_empty())
            .collect();
        self
    }

    /// Whether `path` is a known file
    pub fn contains(&self, path: &str) -> bool {
        self.files.contains(path)
    }

    /// Whether `path` is a known file or directory
    pub fn exists(&self, path: &str) -> bool {
        self.files.contains(path) || self.dirs.contains(path)
    }

    pub fn files(&self) -> impl Iterator<Item = &str> {
        self.files.iter().map(String::as_str)
    }

    /// Resolve a token as written at the tree root (manifest entries,
    /// instruction file references)
    pub fn resolve(&self, token: &str) -> Resolution {
        self.resolve_inner(token, None)
    }

    /// Resolve a token written inside `referrer`; the referrer's directory
    /// is tried before the tree-wide steps
    pub fn resolve_from(&self, token: &str, referrer: &str) -> Resolution {
        self.resolve_inner(token, Some(referrer))
    }

    fn resolve_inner(&self, token: &str, referrer: Option<&str>) -> Resolution {
        let token = clean_token(token);
        if token.is_empty() {
            return Resolution::Missing;
        }
        let rooted = token.starts_with('/');

        if let Some(referrer) = referrer
            && !rooted
        {
            let base = referrer.rsplit_once('/').map(|(dir, _)| dir).unwrap_or("");
            let joined = if base.is_empty() {
                token.clone()
            } else {
                format!("{base}/{token}")
            };
            if let Some(path) = normalize_path(&joined).and_then(|p| self.lookup(&p)) {
                return resolved(path, ResolutionStep::DocumentRelative);
            }
        }

        let normalized = normalize_path(&token);
        if let Some(path) = normalized.as_deref().and_then(|p| self.lookup(p)) {
            return resolved(path, ResolutionStep::Exact);
        }

        if let Some(normalized) = normalized.as_deref() {
            for rewritten in self.rewrites(normalized) {
                if let Some(path) = self.lookup(&rewritten) {
                    return resolved(path, ResolutionStep::Alias);
                }
            }
        }

        self.suffix_match(&token)
    }

    /// Exact lookup with the usual markdown fallbacks for extension-less links
    fn lookup(&self, path: &str) -> Option<String> {
        if self.exists(path) {
            return Some(path.to_string());
        }
        if file_name(path).contains('.') {
            return None;
        }
        let prefix = if path.is_empty() {
            String::new()
        } else {
            format!("{path}/")
        };
        [
            format!("{path}.md"),
            format!("{prefix}README.md"),
            format!("{prefix}index.md"),
        ]
        .into_iter()
        .find(|candidate| self.files.contains(candidate))
    }

    fn rewrites(&self, normalized: &str) -> Vec<String> {
        let mut out = Vec::new();
        for prefix in &self.strip_prefixes {
            if let Some(rest) = strip_dir_prefix(normalized, prefix) {
                out.push(rest.to_string());
            }
        }
        for alias in &self.aliases {
            if let Some(rest) = strip_dir_prefix(normalized, &alias.from) {
                out.push(join(&alias.to, rest));
            }
        }
        out
    }

    fn suffix_match(&self, token: &str) -> Resolution {
        let segments: Vec<&str> = token
            .split('/')
            .filter(|s| !s.is_empty() && *s != "." && *s != "..")
            .collect();
        let Some(name) = segments.last() else {
            return Resolution::Missing;
        };

        let mut candidates = self.by_name.get(*name).cloned().unwrap_or_default();
        if candidates.is_empty() && !name.contains('.') {
            candidates = self
                .by_name
                .get(&format!("{name}.md"))
                .cloned()
                .unwrap_or_default();
        }

        match candidates.len() {
            0 => Resolution::Missing,
            1 => resolved(candidates.remove(0), ResolutionStep::SuffixMatch),
            _ => {
                // Narrow by the whole token when it has directory context
                let suffix = segments.join("/");
                let narrowed: Vec<String> = if segments.len() > 1 {
                    candidates
                        .iter()
                        .filter(|c| c.as_str() == suffix || c.ends_with(&format!("/{suffix}")))
                        .cloned()
                        .collect()
                } else {
                    Vec::new()
                };
                if narrowed.len() == 1 {
                    return resolved(narrowed[0].clone(), ResolutionStep::SuffixMatch);
                }
                let candidates = if narrowed.is_empty() {
                    candidates
                } else {
                    narrowed
                };
                tracing::debug!(token, candidates = candidates.len(), "Ambiguous path reference");
                Resolution::Ambiguous { candidates }
            }
        }
    }
}

fn resolved(path: String, via: ResolutionStep) -> Resolution {
    Resolution::Resolved { path, via }
}

fn file_name(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}

fn strip_dir_prefix<'a>(path: &'a str, prefix: &str) -> Option<&'a str> {
    if path == prefix {
        return Some("");
    }
    path.strip_prefix(prefix)?.strip_prefix('/')
}

fn join(dir: &str, rest: &str) -> String {
    match (dir.is_empty(), rest.is_empty()) {
        (true, _) => rest.to_string(),
        (_, true) => dir.to_string(),
        _ => format!("{dir}/{rest}"),
    }
}

/// Backslashes to `/`, `%20` decoded, query string dropped
fn clean_token(token: &str) -> String {
    let token = token.trim().replace('\\', "/").replace("%20", " ");
    match token.split_once('?') {
        Some((path, _)) => path.to_string(),
        None => token,
    }
}

/// Lexically normalize a `/`-separated path relative to the tree root.
///
/// Strips `./` segments and a leading `/`, collapses `..`, and drops a
/// trailing `/`. Returns `None` when `..` would escape the root.
pub fn normalize_path(raw: &str) -> Option<String> {
    let raw = raw.replace('\\', "/");
    let mut parts: Vec<&str> = Vec::new();
    for segment in raw.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                parts.pop()?;
            }
            other => parts.push(other),
        }
    }
    Some(parts.join("/"))
}

/// Split `path#anchor` into its parts; an empty anchor is `None`
pub fn split_link_target(target: &str) -> (&str, Option<&str>) {
    match target.split_once('#') {
        Some((path, anchor)) if !anchor.is_empty() => (path, Some(anchor)),
        Some((path, _)) => (path, None),
        None => (target, None),
    }
}

/// `https:`, `mailto:` and network-path (`//host`) targets
pub fn is_external(target: &str) -> bool {
    let target = target.trim();
    if target.starts_with("//") {
        return true;
    }
    let Some((scheme, _)) = target.split_once(':') else {
        return false;
    };
    let mut chars = scheme.chars();
    let Some(first) = chars.next() else {
        return false;
    };
    // Single letters are drive prefixes (C:\docs)
    first.is_ascii_alphabetic()
        && scheme.len() > 1
        && chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '.' | '-'))
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn tree() -> PathResolver {
        PathResolver::new([
            "README.md",
            "docs/guide.md",
            "docs/ci/README.md",
            "docs/new/setup.md",
            "scripts/build.sh",
            ".github/workflows/ci.yml",
            "legacy/ci.yml",
            "crates/a/lib.rs",
            "crates/b/lib.rs",
        ])
    }

    #[test]
    fn test_normalize_path() {
        assert_eq!(normalize_path("./docs//guide.md"), Some("docs/guide.md".to_string()));
        assert_eq!(normalize_path("/docs/x/../guide.md"), Some("docs/guide.md".to_string()));
        assert_eq!(normalize_path("docs\\ci\\"), Some("docs/ci".to_string()));
        assert_eq!(normalize_path("../outside.md"), None);
    }

    #[test]
    fn test_exact_and_markdown_fallbacks() {
        let r = tree();
        assert_eq!(
            r.resolve("./scripts/build.sh"),
            resolved("scripts/build.sh".to_string(), ResolutionStep::Exact)
        );
        assert_eq!(r.resolve("docs/guide").path(), Some("docs/guide.md"));
        assert_eq!(r.resolve("docs/ci").path(), Some("docs/ci"));
        assert_eq!(r.resolve("docs/ci/").path(), Some("docs/ci"));
    }

    #[test]
    fn test_document_relative_first() {
        let r = tree();
        assert_eq!(
            r.resolve_from("../guide.md", "docs/ci/README.md"),
            resolved("docs/guide.md".to_string(), ResolutionStep::DocumentRelative)
        );
        assert_eq!(
            r.resolve_from("guide.md", "docs/ci/README.md"),
            resolved("docs/guide.md".to_string(), ResolutionStep::SuffixMatch)
        );
        // Rooted links skip the relative step
        assert_eq!(
            r.resolve_from("/README.md", "docs/guide.md"),
            resolved("README.md".to_string(), ResolutionStep::Exact)
        );
    }

    #[test]
    fn test_prefix_and_alias_rewrites() {
        let r = tree()
            .with_strip_prefixes(vec!["codex-rs/".to_string()])
            .with_aliases(vec![PathAlias {
                from: "docs/old".to_string(),
                to: "docs/new".to_string(),
            }]);
        assert_eq!(
            r.resolve("codex-rs/scripts/build.sh"),
            resolved("scripts/build.sh".to_string(), ResolutionStep::Alias)
        );
        assert_eq!(
            r.resolve("docs/old/setup.md"),
            resolved("docs/new/setup.md".to_string(), ResolutionStep::Alias)
        );
    }

    #[test]
    fn test_suffix_unique_and_ambiguous() {
        let r = tree();
        assert_eq!(
            r.resolve("tools/build.sh"),
            resolved("scripts/build.sh".to_string(), ResolutionStep::SuffixMatch)
        );
        assert_eq!(
            r.resolve("ci.yml"),
            Resolution::Ambiguous {
                candidates: vec![".github/workflows/ci.yml".to_string(), "legacy/ci.yml".to_string()]
            }
        );
        // Directory context disambiguates
        assert_eq!(
            r.resolve("workflows/ci.yml").path(),
            Some(".github/workflows/ci.yml")
        );
        assert!(matches!(r.resolve("lib.rs"), Resolution::Ambiguous { .. }));
    }

    #[test]
    fn test_missing() {
        let r = tree();
        assert_eq!(r.resolve("scripts/missing.py"), Resolution::Missing);
        assert_eq!(r.resolve(""), Resolution::Missing);
        assert!(!r.resolve("../../nowhere.md").is_resolved());
    }

    #[test]
    fn test_link_helpers() {
        assert_eq!(split_link_target("a.md#intro"), ("a.md", Some("intro")));
        assert_eq!(split_link_target("#intro"), ("", Some("intro")));
        assert_eq!(split_link_target("a.md#"), ("a.md", None));
        assert!(is_external("https://example.com/a.md"));
        assert!(is_external("mailto:team@example.com"));
        assert!(is_external("//cdn.example.com/x"));
        assert!(!is_external("docs/guide.md"));
        assert!(!is_external("C:/docs/guide.md"));
    }
}
