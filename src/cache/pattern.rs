//! Key patterns for bulk invalidation.

use regex::Regex;

use crate::error::CacheError;

/// Selects keys for [`super::CacheEngine::invalidate_by_pattern`].
#[derive(Debug, Clone)]
pub enum KeyPattern {
    /// Keys containing the string.
    Substring(String),
    /// Keys the regex matches anywhere (anchor explicitly with `^`/`$`).
    Regex(Regex),
}

impl KeyPattern {
    pub fn substring(needle: impl Into<String>) -> Self {
        Self::Substring(needle.into())
    }

    /// Compile a regex pattern.
    pub fn regex(pattern: &str) -> Result<Self, CacheError> {
        Ok(Self::Regex(Regex::new(pattern)?))
    }

    pub fn matches(&self, key: &str) -> bool {
        match self {
            Self::Substring(needle) => key.contains(needle.as_str()),
            Self::Regex(re) => re.is_match(key),
        }
    }
}
