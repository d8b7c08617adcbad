//! Regex path filter.
//!
//! Patterns are given as one comma-separated string. Each pattern is searched
//! (unanchored) in the repository-relative path, so `^src/` scopes a directory
//! and `\.rs$` scopes an extension with the same syntax.

use regex::Regex;
use tracing::debug;

use crate::error::ConvertError;

/// Compiled inclusion patterns. Empty means "match everything".
#[derive(Debug, Clone, Default)]
pub struct FilterSpec {
    patterns: Vec<Regex>,
}

impl FilterSpec {
    /// Compile every pattern or none: the first invalid one rejects the whole input.
    pub fn compile(input: &str) -> Result<Self, ConvertError> {
        let mut patterns = Vec::new();
        for (position, raw) in split_patterns(input).into_iter().enumerate() {
            let compiled = Regex::new(raw).map_err(|e| ConvertError::InvalidPattern {
                pattern: raw.to_string(),
                position,
                message: e.to_string(),
            })?;
            patterns.push(compiled);
        }
        debug!(patterns = patterns.len(), "Compiled path filter");
        Ok(Self { patterns })
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    /// True when the filter is empty or any pattern is found in `path`.
    pub fn matches(&self, path: &str) -> bool {
        self.patterns.is_empty() || self.patterns.iter().any(|p| p.is_match(path))
    }
}

fn split_patterns(input: &str) -> Vec<&str> {
    input
        .split(',')
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_ignores_blank_segments() {
        assert_eq!(split_patterns(" a , ,b,"), vec!["a", "b"]);
        assert!(split_patterns("   ").is_empty());
    }
}
