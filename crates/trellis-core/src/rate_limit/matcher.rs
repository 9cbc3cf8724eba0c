//! Endpoint path patterns

use regex::Regex;

use crate::error::{TrellisError, TrellisResult};

/// Plain patterns match the path or anything below it; `*` matches any run of characters
#[derive(Debug)]
pub(super) enum PathMatcher {
    Prefix(String),
    Wildcard(Regex),
}

impl PathMatcher {
    pub(super) fn compile(pattern: &str) -> TrellisResult<Self> {
        if !pattern.contains('*') {
            return Ok(Self::Prefix(pattern.trim_end_matches('/').to_string()));
        }
        let body = pattern
            .split('*')
            .map(regex::escape)
            .collect::<Vec<_>>()
            .join(".*");
        let regex = Regex::new(&format!("^{}$", body)).map_err(|e| {
            TrellisError::config_with_context(
                format!("invalid endpoint pattern '{}': {}", pattern, e),
                "rate_limit.endpoints",
            )
        })?;
        Ok(Self::Wildcard(regex))
    }

    pub(super) fn matches(&self, path: &str) -> bool {
        match self {
            Self::Prefix(prefix) => {
                path == prefix.as_str()
                    || path
                        .strip_prefix(prefix.as_str())
                        .is_some_and(|rest| rest.starts_with('/'))
            }
            Self::Wildcard(regex) => regex.is_match(path),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prefix_respects_segments() {
        let matcher = PathMatcher::compile("/api/v1/plants/").unwrap();
        assert!(matcher.matches("/api/v1/plants"));
        assert!(matcher.matches("/api/v1/plants/7"));
        assert!(!matcher.matches("/api/v1/plantsxyz"));
    }

    #[test]
    fn test_wildcard_is_anchored() {
        let matcher = PathMatcher::compile("/files/*.png").unwrap();
        assert!(matcher.matches("/files/a/b.png"));
        assert!(!matcher.matches("/files/a.png.bak"));
    }
}
