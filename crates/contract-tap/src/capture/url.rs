//! URL and query string normalization.

use super::Parsed;
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use url::Url;

/// Base used to resolve root-relative paths. Its scheme and host never leak
/// into a [`ParsedUrl`].
static RELATIVE_BASE: Lazy<Option<Url>> = Lazy::new(|| Url::parse("http://relative.invalid/").ok());

/// A query parameter value; repeated names collect in order of appearance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum QueryValue {
    Single(String),
    Multiple(Vec<String>),
}

impl QueryValue {
    fn push(&mut self, value: String) {
        match self {
            QueryValue::Single(first) => {
                let first = std::mem::take(first);
                *self = QueryValue::Multiple(vec![first, value]);
            }
            QueryValue::Multiple(values) => values.push(value),
        }
    }

    /// The first value, or the only one.
    pub fn first(&self) -> Option<&str> {
        match self {
            QueryValue::Single(value) => Some(value),
            QueryValue::Multiple(values) => values.first().map(String::as_str),
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        match self {
            QueryValue::Single(value) => serde_json::Value::String(value.clone()),
            QueryValue::Multiple(values) => serde_json::Value::Array(
                values
                    .iter()
                    .cloned()
                    .map(serde_json::Value::String)
                    .collect(),
            ),
        }
    }
}

/// Canonical pieces of a request URL.
///
/// `port` is empty when the scheme default applies. `query` is the raw query
/// string without the leading `?`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParsedUrl {
    pub scheme: String,
    pub host: String,
    pub port: String,
    pub path: String,
    pub query: String,
    pub query_params: BTreeMap<String, QueryValue>,
    pub fragment: String,
}

impl ParsedUrl {
    /// Query parameters as a JSON object, for schema checks.
    pub fn query_json(&self) -> serde_json::Value {
        query_to_json(&self.query_params)
    }
}

/// Parses absolute URLs and root-relative paths; anything else is split
/// naively on `#` and `?`.
pub fn parse_url(raw: &str) -> Parsed<ParsedUrl> {
    match Url::parse(raw) {
        Ok(url) => Parsed::Value(from_url(&url)),
        Err(url::ParseError::RelativeUrlWithoutBase) if raw.starts_with('/') => {
            let joined = RELATIVE_BASE.as_ref().and_then(|base| base.join(raw).ok());
            match joined {
                Some(url) if !raw.starts_with("//") => Parsed::Value(ParsedUrl {
                    scheme: String::new(),
                    host: String::new(),
                    port: String::new(),
                    ..from_url(&url)
                }),
                Some(url) => Parsed::Value(ParsedUrl {
                    scheme: String::new(),
                    ..from_url(&url)
                }),
                None => Parsed::Fallback(naive_split(raw)),
            }
        }
        Err(_) => Parsed::Fallback(naive_split(raw)),
    }
}

fn from_url(url: &Url) -> ParsedUrl {
    let query = url.query().unwrap_or_default().to_string();
    ParsedUrl {
        scheme: url.scheme().to_string(),
        host: url.host_str().unwrap_or_default().to_string(),
        port: url.port().map(|p| p.to_string()).unwrap_or_default(),
        path: url.path().to_string(),
        query_params: parse_query(&query),
        query,
        fragment: url.fragment().unwrap_or_default().to_string(),
    }
}

fn naive_split(raw: &str) -> ParsedUrl {
    let (rest, fragment) = raw.split_once('#').unwrap_or((raw, ""));
    let (path, query) = rest.split_once('?').unwrap_or((rest, ""));
    ParsedUrl {
        path: path.to_string(),
        query: query.to_string(),
        query_params: parse_query(query),
        fragment: fragment.to_string(),
        ..ParsedUrl::default()
    }
}

/// Decodes an `application/x-www-form-urlencoded` string.
pub fn parse_query(query: &str) -> BTreeMap<String, QueryValue> {
    let mut params: BTreeMap<String, QueryValue> = BTreeMap::new();
    for (name, value) in url::form_urlencoded::parse(query.as_bytes()) {
        if name.is_empty() {
            continue;
        }
        match params.get_mut(name.as_ref()) {
            Some(existing) => existing.push(value.into_owned()),
            None => {
                params.insert(name.into_owned(), QueryValue::Single(value.into_owned()));
            }
        }
    }
    params
}

pub(crate) fn query_to_json(params: &BTreeMap<String, QueryValue>) -> serde_json::Value {
    serde_json::Value::Object(
        params
            .iter()
            .map(|(name, value)| (name.clone(), value.to_json()))
            .collect(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_absolute_url() {
        let parsed = parse_url("https://api.example.com:8443/v1/users?id=7&tag=a&tag=b#top");
        assert!(!parsed.is_fallback());
        let url = parsed.into_inner();
        assert_eq!(url.scheme, "https");
        assert_eq!(url.host, "api.example.com");
        assert_eq!(url.port, "8443");
        assert_eq!(url.path, "/v1/users");
        assert_eq!(url.query, "id=7&tag=a&tag=b");
        assert_eq!(url.fragment, "top");
        assert_eq!(url.query_params["id"], QueryValue::Single("7".into()));
        assert_eq!(
            url.query_params["tag"],
            QueryValue::Multiple(vec!["a".into(), "b".into()])
        );
    }

    #[test]
    fn test_default_port_is_empty() {
        let url = parse_url("http://example.com:80/x").into_inner();
        assert_eq!(url.port, "");
    }

    #[test]
    fn test_root_relative_path() {
        let parsed = parse_url("/api/users/42?expand=true");
        assert!(!parsed.is_fallback());
        let url = parsed.into_inner();
        assert_eq!(url.scheme, "");
        assert_eq!(url.host, "");
        assert_eq!(url.path, "/api/users/42");
        assert_eq!(url.query_params["expand"].first(), Some("true"));
    }

    #[test]
    fn test_malformed_url_falls_back() {
        let parsed = parse_url("not a url?q=1 2#frag");
        assert!(parsed.is_fallback());
        let url = parsed.into_inner();
        assert_eq!(url.path, "not a url");
        assert_eq!(url.query, "q=1 2");
        assert_eq!(url.fragment, "frag");
        assert_eq!(url.query_params["q"].first(), Some("1 2"));
    }

    #[test]
    fn test_query_decoding() {
        let params = parse_query("name=J%C3%BCrgen&empty=&plus=a+b&=skipped");
        assert_eq!(params["name"].first(), Some("Jürgen"));
        assert_eq!(params["empty"].first(), Some(""));
        assert_eq!(params["plus"].first(), Some("a b"));
        assert_eq!(params.len(), 3);
    }

    #[test]
    fn test_query_json_shape() {
        let url = parse_url("/x?a=1&b=2&b=3").into_inner();
        assert_eq!(
            url.query_json(),
            serde_json::json!({"a": "1", "b": ["2", "3"]})
        );
    }
}
