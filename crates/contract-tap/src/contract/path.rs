//! Path pattern compilation and matching.
//!
//! Patterns are split on `/` into literal segments and named parameters
//! (`:id` or `{id}`). Empty segments are ignored on both sides, so
//! `/api/users/` and `api/users` compile to the same pattern.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Segment {
    Literal(String),
    Param(String),
}

impl Segment {
    fn parse(raw: &str) -> Self {
        if let Some(name) = raw.strip_prefix(':').filter(|name| !name.is_empty()) {
            return Segment::Param(name.to_string());
        }
        if let Some(name) = raw
            .strip_prefix('{')
            .and_then(|rest| rest.strip_suffix('}'))
            .filter(|name| !name.is_empty())
        {
            return Segment::Param(name.to_string());
        }
        Segment::Literal(raw.to_string())
    }
}

/// Compiled path pattern.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct PathPattern {
    raw: String,
    segments: Vec<Segment>,
}

impl PathPattern {
    pub fn parse(pattern: &str) -> Self {
        Self {
            raw: pattern.to_string(),
            segments: split_segments(pattern).map(Segment::parse).collect(),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    pub fn is_empty(&self) -> bool {
        self.raw.trim().is_empty()
    }

    /// Equal segment counts, and every literal segment equal (case-sensitive).
    pub fn matches(&self, path: &str) -> bool {
        let mut candidate = split_segments(path);
        for segment in &self.segments {
            match (segment, candidate.next()) {
                (_, None) => return false,
                (Segment::Literal(expected), Some(actual)) if expected != actual => return false,
                _ => {}
            }
        }
        candidate.next().is_none()
    }

    /// Parameter bindings for a matching path, `None` otherwise.
    pub fn captures(&self, path: &str) -> Option<BTreeMap<String, String>> {
        if !self.matches(path) {
            return None;
        }
        Some(
            self.segments
                .iter()
                .zip(split_segments(path))
                .filter_map(|(segment, actual)| match segment {
                    Segment::Param(name) => Some((name.clone(), actual.to_string())),
                    Segment::Literal(_) => None,
                })
                .collect(),
        )
    }

    /// True when every path `other` matches is also matched by `self`.
    pub fn covers(&self, other: &PathPattern) -> bool {
        self.segments.len() == other.segments.len()
            && self
                .segments
                .iter()
                .zip(&other.segments)
                .all(|pair| match pair {
                    (Segment::Param(_), _) => true,
                    (Segment::Literal(a), Segment::Literal(b)) => a == b,
                    (Segment::Literal(_), Segment::Param(_)) => false,
                })
    }

    /// Pattern with parameter names erased; two patterns with the same shape
    /// match exactly the same paths.
    pub fn shape(&self) -> String {
        let mut shape = String::new();
        for segment in &self.segments {
            shape.push('/');
            match segment {
                Segment::Literal(literal) => shape.push_str(literal),
                Segment::Param(_) => shape.push(':'),
            }
        }
        if shape.is_empty() {
            shape.push('/');
        }
        shape
    }
}

impl From<String> for PathPattern {
    fn from(raw: String) -> Self {
        PathPattern::parse(&raw)
    }
}

impl From<&str> for PathPattern {
    fn from(raw: &str) -> Self {
        PathPattern::parse(raw)
    }
}

impl From<PathPattern> for String {
    fn from(pattern: PathPattern) -> Self {
        pattern.raw
    }
}

impl fmt::Display for PathPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

fn split_segments(path: &str) -> impl Iterator<Item = &str> {
    path.split('/').filter(|segment| !segment.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_param_matches_any_single_segment() {
        let pattern = PathPattern::parse("/api/users/:id");
        assert!(pattern.matches("/api/users/42"));
        assert!(pattern.matches("/api/users/abc"));
        assert!(!pattern.matches("/api/users"));
        assert!(!pattern.matches("/api/users/42/posts"));
    }

    #[test]
    fn test_literals_are_case_sensitive() {
        let pattern = PathPattern::parse("/api/Users");
        assert!(pattern.matches("/api/Users"));
        assert!(!pattern.matches("/api/users"));
    }

    #[test]
    fn test_empty_segments_ignored() {
        let pattern = PathPattern::parse("/api//users/");
        assert!(pattern.matches("api/users"));
        assert!(pattern.matches("/api/users/"));
    }

    #[test]
    fn test_brace_params_and_captures() {
        let pattern = PathPattern::parse("/orgs/{org}/repos/:repo");
        let captures = pattern.captures("/orgs/acme/repos/widget").unwrap();
        assert_eq!(captures["org"], "acme");
        assert_eq!(captures["repo"], "widget");
        assert!(pattern.captures("/orgs/acme").is_none());
    }

    #[test]
    fn test_root_pattern() {
        let pattern = PathPattern::parse("/");
        assert!(pattern.matches("/"));
        assert!(pattern.matches(""));
        assert!(!pattern.matches("/x"));
        assert_eq!(pattern.shape(), "/");
    }

    #[test]
    fn test_shape_erases_param_names() {
        assert_eq!(
            PathPattern::parse("/users/:id").shape(),
            PathPattern::parse("/users/{userId}").shape()
        );
        assert_ne!(
            PathPattern::parse("/users/:id").shape(),
            PathPattern::parse("/users/me").shape()
        );
    }

    #[test]
    fn test_param_pattern_covers_literal() {
        let param = PathPattern::parse("/users/:id");
        assert!(param.covers(&PathPattern::parse("/users/me")));
        assert!(param.covers(&PathPattern::parse("/users/{other}")));
        assert!(!PathPattern::parse("/users/me").covers(&param));
        assert!(!param.covers(&PathPattern::parse("/users/me/posts")));
        assert!(!PathPattern::parse("/a/:").covers(&PathPattern::parse("/a/:id")));
    }

    #[test]
    fn test_bare_colon_is_literal() {
        let pattern = PathPattern::parse("/a/:");
        assert_eq!(pattern.segments()[1], Segment::Literal(":".into()));
    }
}
