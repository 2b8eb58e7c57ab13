//! Glob-based exclusion matching on archive paths.
//!
//! Patterns are matched against the full forward-slash path an entry will
//! have inside the archive, not the base name, so `dir/sub/*.txt` and
//! `**/file2.txt` can target nested entries, including entries reached through
//! a symlinked directory under the symlink's name.

use globset::{GlobBuilder, GlobSet, GlobSetBuilder};

use crate::error::{ArchiverError, Result};

/// An immutable, compiled list of exclusion patterns.
#[derive(Debug, Clone)]
pub struct ExclusionSet {
    patterns: Vec<String>,
    set: GlobSet,
}

impl ExclusionSet {
    /// Compiles `patterns`. Empty patterns are ignored; an invalid pattern
    /// fails the whole set.
    pub fn new<S: AsRef<str>>(patterns: &[S]) -> Result<Self> {
        let mut builder = GlobSetBuilder::new();
        let mut kept = Vec::new();
        for pattern in patterns.iter().map(AsRef::as_ref) {
            if pattern.is_empty() {
                continue;
            }
            // `*` and `?` must not cross a `/`, like a shell glob.
            let glob = GlobBuilder::new(&normalize_separators(pattern))
                .literal_separator(true)
                .build()
                .map_err(|source| ArchiverError::MatchPattern {
                    pattern: pattern.to_string(),
                    source,
                })?;
            builder.add(glob);
            kept.push(pattern.to_string());
        }
        let set = builder.build().map_err(|source| ArchiverError::MatchPattern {
            pattern: kept.join(", "),
            source,
        })?;
        Ok(Self { patterns: kept, set })
    }

    pub fn empty() -> Self {
        Self { patterns: Vec::new(), set: GlobSet::empty() }
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    pub fn patterns(&self) -> &[String] {
        &self.patterns
    }

    /// True when any pattern matches `archive_path`.
    pub fn is_excluded(&self, archive_path: &str) -> bool {
        !self.set.is_empty() && self.set.is_match(normalize_separators(archive_path))
    }
}

impl Default for ExclusionSet {
    fn default() -> Self {
        Self::empty()
    }
}

/// One-shot form: compiles `patterns` and tests `candidate` against them.
pub fn is_excluded<S: AsRef<str>>(candidate: &str, patterns: &[S]) -> Result<bool> {
    Ok(ExclusionSet::new(patterns)?.is_excluded(candidate))
}

#[cfg(windows)]
fn normalize_separators(path: &str) -> String {
    path.replace('\\', "/")
}

#[cfg(not(windows))]
fn normalize_separators(path: &str) -> String {
    path.to_string()
}
