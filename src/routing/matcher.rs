//! Path patterns.

use serde::{Deserialize, Serialize};

use crate::routing::RegistryError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchPolicy {
    #[default]
    Prefix,
    Exact,
}

/// Trailing slashes are not significant, except for the root.
pub fn normalize(path: &str) -> &str {
    let trimmed = path.trim_end_matches('/');
    if trimmed.is_empty() {
        "/"
    } else {
        trimmed
    }
}

/// A validated path pattern with its match policy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathMatcher {
    pattern: String,
    policy: MatchPolicy,
}

impl PathMatcher {
    pub fn new(pattern: &str, policy: MatchPolicy) -> Result<Self, RegistryError> {
        if !pattern.starts_with('/') {
            return Err(RegistryError::InvalidPattern(pattern.to_string()));
        }
        Ok(Self {
            pattern: normalize(pattern).to_string(),
            policy,
        })
    }

    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    pub fn policy(&self) -> MatchPolicy {
        self.policy
    }

    /// Prefix patterns match whole path segments only: `/api` matches
    /// `/api` and `/api/x`, never `/apix`.
    pub fn matches(&self, path: &str) -> bool {
        match self.policy {
            MatchPolicy::Exact => normalize(path) == self.pattern,
            MatchPolicy::Prefix => {
                if self.pattern == "/" {
                    return path.starts_with('/');
                }
                path.starts_with(&self.pattern)
                    && matches!(path.as_bytes().get(self.pattern.len()), None | Some(b'/'))
            }
        }
    }

    /// Part of `path` below the pattern, always starting with `/` or empty.
    pub fn relative_path<'a>(&self, path: &'a str) -> &'a str {
        if self.pattern == "/" {
            return path;
        }
        path.get(self.pattern.len()..).unwrap_or("")
    }
}
