//! Glob-style key patterns for bulk eviction.

use crate::error::{CacheError, Result};

/// A key pattern where `*` matches any run of characters, including none.
/// Every other character matches itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyPattern {
    parts: Vec<String>,
    anchored_end: bool,
}

impl KeyPattern {
    pub fn parse(pattern: &str) -> Result<Self> {
        if pattern.is_empty() {
            return Err(CacheError::InvalidPattern(pattern.to_string()));
        }
        Ok(Self {
            parts: pattern.split('*').map(str::to_string).collect(),
            anchored_end: !pattern.ends_with('*'),
        })
    }

    /// True if the pattern has no wildcard and names exactly one key.
    pub fn is_literal(&self) -> bool {
        self.parts.len() == 1
    }

    pub fn matches(&self, key: &str) -> bool {
        let Some((first, rest)) = self.parts.split_first() else {
            return false;
        };
        let Some(mut remaining) = key.strip_prefix(first.as_str()) else {
            return false;
        };
        if rest.is_empty() {
            return remaining.is_empty();
        }

        let (middle, last) = rest.split_at(rest.len() - 1);
        for part in middle {
            match remaining.find(part.as_str()) {
                Some(at) => remaining = &remaining[at + part.len()..],
                None => return false,
            }
        }

        let last = &last[0];
        if self.anchored_end {
            remaining.ends_with(last.as_str())
        } else {
            remaining.contains(last.as_str())
        }
    }
}
