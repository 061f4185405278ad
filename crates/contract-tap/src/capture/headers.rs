//! Header and cookie normalization.

use hyper::header::{COOKIE, SET_COOKIE};
use hyper::HeaderMap;
use std::collections::BTreeMap;

/// Collapses a header container into `name -> value`.
///
/// Names come out lower-case; repeated headers are joined with `", "`.
pub fn header_map(headers: &HeaderMap) -> BTreeMap<String, String> {
    let mut map: BTreeMap<String, String> = BTreeMap::new();
    for (name, value) in headers {
        let value = String::from_utf8_lossy(value.as_bytes()).into_owned();
        map.entry(name.as_str().to_string())
            .and_modify(|existing| {
                existing.push_str(", ");
                existing.push_str(&value);
            })
            .or_insert(value);
    }
    map
}

/// Case-insensitive lookup in a collapsed header map.
pub fn header_value<'a>(headers: &'a BTreeMap<String, String>, name: &str) -> Option<&'a str> {
    headers
        .iter()
        .find(|(key, _)| key.eq_ignore_ascii_case(name))
        .map(|(_, value)| value.as_str())
}

/// Parses a request `Cookie` header (`a=1; b=2`).
///
/// Pairs without `=` or with an empty name are skipped.
pub fn parse_cookie_header(raw: &str) -> BTreeMap<String, String> {
    raw.split(';').filter_map(parse_pair).collect()
}

/// Parses one `Set-Cookie` entry, ignoring its attributes.
pub fn parse_set_cookie(entry: &str) -> Option<(String, String)> {
    entry.split(';').next().and_then(parse_pair)
}

/// Merges several `Set-Cookie` entries; the last value for a name wins.
pub fn parse_set_cookies<'a, I>(entries: I) -> BTreeMap<String, String>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut cookies = BTreeMap::new();
    for entry in entries {
        if let Some((name, value)) = parse_set_cookie(entry) {
            cookies.insert(name, value);
        }
    }
    cookies
}

/// Cookies sent with a request, from every `Cookie` header present.
pub fn request_cookies(headers: &HeaderMap) -> BTreeMap<String, String> {
    let mut cookies = BTreeMap::new();
    for value in headers.get_all(COOKIE) {
        cookies.extend(parse_cookie_header(&String::from_utf8_lossy(value.as_bytes())));
    }
    cookies
}

/// Cookies set by a response, from every `Set-Cookie` header present.
pub fn response_cookies(headers: &HeaderMap) -> BTreeMap<String, String> {
    let entries: Vec<String> = headers
        .get_all(SET_COOKIE)
        .iter()
        .map(|value| String::from_utf8_lossy(value.as_bytes()).into_owned())
        .collect();
    parse_set_cookies(entries.iter().map(String::as_str))
}

fn parse_pair(pair: &str) -> Option<(String, String)> {
    let (name, value) = pair.split_once('=')?;
    let name = name.trim();
    if name.is_empty() {
        return None;
    }
    let value = value.trim();
    let value = value
        .strip_prefix('"')
        .and_then(|v| v.strip_suffix('"'))
        .unwrap_or(value);
    let decoded = urlencoding::decode(value)
        .map(|v| v.into_owned())
        .unwrap_or_else(|_| value.to_string());
    Some((name.to_string(), decoded))
}

#[cfg(test)]
mod tests {
    use super::*;
    use hyper::header::HeaderValue;

    #[test]
    fn test_header_map_joins_duplicates() {
        let mut headers = HeaderMap::new();
        headers.append("Accept", HeaderValue::from_static("text/html"));
        headers.append("accept", HeaderValue::from_static("application/json"));
        headers.insert("X-Trace-Id", HeaderValue::from_static("abc"));

        let map = header_map(&headers);
        assert_eq!(map["accept"], "text/html, application/json");
        assert_eq!(map["x-trace-id"], "abc");
        assert_eq!(header_value(&map, "X-TRACE-ID"), Some("abc"));
        assert_eq!(header_value(&map, "missing"), None);
    }

    #[test]
    fn test_parse_cookie_header() {
        let cookies = parse_cookie_header("session=abc123; theme=\"dark\"; broken; =x; enc=a%20b");
        assert_eq!(cookies.len(), 3);
        assert_eq!(cookies["session"], "abc123");
        assert_eq!(cookies["theme"], "dark");
        assert_eq!(cookies["enc"], "a b");
    }

    #[test]
    fn test_parse_cookie_header_keeps_bad_escapes() {
        let cookies = parse_cookie_header("raw=%E0%A4%A");
        assert_eq!(cookies["raw"], "%E0%A4%A");
    }

    #[test]
    fn test_set_cookies_last_wins() {
        let cookies = parse_set_cookies([
            "session=one; Path=/; HttpOnly",
            "prefs=compact; Max-Age=3600",
            "session=two; Secure",
        ]);
        assert_eq!(cookies.len(), 2);
        assert_eq!(cookies["session"], "two");
        assert_eq!(cookies["prefs"], "compact");
    }

    #[test]
    fn test_response_cookies_from_header_map() {
        let mut headers = HeaderMap::new();
        headers.append(SET_COOKIE, HeaderValue::from_static("a=1; Path=/"));
        headers.append(SET_COOKIE, HeaderValue::from_static("b=2"));
        let cookies = response_cookies(&headers);
        assert_eq!(cookies["a"], "1");
        assert_eq!(cookies["b"], "2");
    }
}
