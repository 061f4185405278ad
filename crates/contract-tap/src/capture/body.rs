//! Body classification and best-effort parsing.
//!
//! Classification priority:
//! 1. empty or absent body is always `empty`
//! 2. the structural type of the payload (stream, multipart, form, buffer)
//! 3. the primary media type of the declared content type
//! 4. the shape of the parsed body
//! 5. `unknown`

use super::url::{parse_query, query_to_json, QueryValue};
use super::Parsed;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::BTreeMap;

/// Coarse classification of how a captured body was encoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BodyKind {
    Json,
    Xml,
    Yaml,
    Csv,
    Html,
    Markdown,
    Form,
    Multipart,
    Graphql,
    Text,
    Binary,
    Stream,
    Empty,
    Unknown,
}

impl BodyKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            BodyKind::Json => "json",
            BodyKind::Xml => "xml",
            BodyKind::Yaml => "yaml",
            BodyKind::Csv => "csv",
            BodyKind::Html => "html",
            BodyKind::Markdown => "markdown",
            BodyKind::Form => "form",
            BodyKind::Multipart => "multipart",
            BodyKind::Graphql => "graphql",
            BodyKind::Text => "text",
            BodyKind::Binary => "binary",
            BodyKind::Stream => "stream",
            BodyKind::Empty => "empty",
            BodyKind::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for BodyKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Size and type of a binary payload; the bytes themselves are not kept.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BinaryDescriptor {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub media_type: Option<String>,
    pub size: u64,
}

/// Marker for a streamed body that was never read.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamDescriptor {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub media_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub length: Option<u64>,
}

/// A file part of a multipart form, described without its content.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileDescriptor {
    pub name: String,
    #[serde(rename = "type")]
    pub content_type: String,
    pub size: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FormFieldValue {
    Text(String),
    File(FileDescriptor),
}

/// Normalized body value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "lowercase")]
pub enum CapturedBody {
    Absent,
    Json(Value),
    Text(String),
    Form(BTreeMap<String, QueryValue>),
    Multipart(BTreeMap<String, FormFieldValue>),
    Binary(BinaryDescriptor),
    Stream(StreamDescriptor),
}

impl CapturedBody {
    pub fn is_absent(&self) -> bool {
        matches!(self, CapturedBody::Absent)
    }

    /// The value schema checks run against.
    pub fn to_json(&self) -> Value {
        match self {
            CapturedBody::Absent => Value::Null,
            CapturedBody::Json(value) => value.clone(),
            CapturedBody::Text(text) => Value::String(text.clone()),
            CapturedBody::Form(fields) => query_to_json(fields),
            CapturedBody::Multipart(fields) => Value::Object(
                fields
                    .iter()
                    .map(|(name, field)| {
                        let value = match field {
                            FormFieldValue::Text(text) => Value::String(text.clone()),
                            FormFieldValue::File(file) => json!({
                                "name": file.name,
                                "type": file.content_type,
                                "size": file.size,
                            }),
                        };
                        (name.clone(), value)
                    })
                    .collect(),
            ),
            CapturedBody::Binary(descriptor) => json!({
                "binary": true,
                "mediaType": descriptor.media_type,
                "size": descriptor.size,
            }),
            CapturedBody::Stream(descriptor) => json!({
                "stream": true,
                "mediaType": descriptor.media_type,
                "length": descriptor.length,
            }),
        }
    }
}

/// Lower-cased media type without parameters (`application/json`).
pub fn media_type(content_type: &str) -> String {
    content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase()
}

const BINARY_MEDIA_TYPES: &[&str] = &[
    "application/octet-stream",
    "application/pdf",
    "application/zip",
    "application/gzip",
    "application/x-gzip",
    "application/x-tar",
    "application/x-7z-compressed",
    "application/x-bzip2",
    "application/wasm",
    "application/protobuf",
    "application/x-protobuf",
    "application/msword",
    "application/vnd.ms-excel",
    "application/vnd.ms-powerpoint",
];

const BINARY_MEDIA_PREFIXES: &[&str] = &[
    "image/",
    "audio/",
    "video/",
    "font/",
    "application/vnd.openxmlformats-officedocument.",
];

/// Infers a body kind from a media type, if it is one we know.
pub fn kind_from_media_type(media: &str) -> Option<BodyKind> {
    let media = media_type(media);
    if media.is_empty() {
        return None;
    }
    let kind = if media.contains("graphql") {
        BodyKind::Graphql
    } else if media == "application/json" || media == "text/json" || media.ends_with("+json") {
        BodyKind::Json
    } else if media == "text/html" || media == "application/xhtml+xml" {
        BodyKind::Html
    } else if media == "application/xml" || media == "text/xml" || media.ends_with("+xml") {
        BodyKind::Xml
    } else if matches!(
        media.as_str(),
        "application/yaml" | "application/x-yaml" | "text/yaml" | "text/x-yaml"
    ) || media.ends_with("+yaml")
    {
        BodyKind::Yaml
    } else if media == "text/csv" || media == "application/csv" {
        BodyKind::Csv
    } else if media == "text/markdown" || media == "text/x-markdown" {
        BodyKind::Markdown
    } else if media == "application/x-www-form-urlencoded" {
        BodyKind::Form
    } else if media.starts_with("multipart/") {
        BodyKind::Multipart
    } else if media.starts_with("text/") {
        BodyKind::Text
    } else if BINARY_MEDIA_TYPES.contains(&media.as_str())
        || BINARY_MEDIA_PREFIXES.iter().any(|p| media.starts_with(p))
    {
        BodyKind::Binary
    } else {
        return None;
    };
    Some(kind)
}

fn kind_from_shape(body: &CapturedBody) -> Option<BodyKind> {
    match body {
        CapturedBody::Text(_) => Some(BodyKind::Text),
        CapturedBody::Binary(_) => Some(BodyKind::Binary),
        CapturedBody::Stream(_) => Some(BodyKind::Stream),
        CapturedBody::Absent => Some(BodyKind::Empty),
        CapturedBody::Json(_) | CapturedBody::Form(_) | CapturedBody::Multipart(_) => None,
    }
}

/// Picks the body kind following the module-level priority order.
pub fn classify(
    structural: Option<BodyKind>,
    content_type: Option<&str>,
    body: &CapturedBody,
) -> BodyKind {
    if body.is_absent() {
        return BodyKind::Empty;
    }
    if let Some(kind) = structural {
        return kind;
    }
    if let Some(kind) = content_type.and_then(kind_from_media_type) {
        return kind;
    }
    kind_from_shape(body).unwrap_or(BodyKind::Unknown)
}

/// Parses a text payload according to its declared media type.
///
/// JSON and YAML fall back to raw text when they do not parse.
pub fn parse_text(text: &str, content_type: Option<&str>) -> Parsed<CapturedBody> {
    if text.is_empty() {
        return Parsed::Value(CapturedBody::Absent);
    }
    match content_type.and_then(kind_from_media_type) {
        Some(BodyKind::Json) => match serde_json::from_str::<Value>(text) {
            Ok(value) => Parsed::Value(CapturedBody::Json(value)),
            Err(_) => Parsed::Fallback(CapturedBody::Text(text.to_string())),
        },
        Some(BodyKind::Yaml) => match serde_yaml::from_str::<Value>(text) {
            Ok(value) => Parsed::Value(CapturedBody::Json(value)),
            Err(_) => Parsed::Fallback(CapturedBody::Text(text.to_string())),
        },
        Some(BodyKind::Form) => Parsed::Value(CapturedBody::Form(parse_query(text))),
        _ => Parsed::Value(CapturedBody::Text(text.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_media_type_strips_parameters() {
        assert_eq!(media_type("Application/JSON; charset=utf-8"), "application/json");
        assert_eq!(media_type(""), "");
    }

    #[test]
    fn test_kind_from_media_type() {
        let cases = [
            ("application/json", Some(BodyKind::Json)),
            ("application/problem+json", Some(BodyKind::Json)),
            ("application/graphql", Some(BodyKind::Graphql)),
            ("application/xml", Some(BodyKind::Xml)),
            ("application/atom+xml", Some(BodyKind::Xml)),
            ("application/xhtml+xml", Some(BodyKind::Html)),
            ("text/html; charset=utf-8", Some(BodyKind::Html)),
            ("application/x-yaml", Some(BodyKind::Yaml)),
            ("text/csv", Some(BodyKind::Csv)),
            ("text/markdown", Some(BodyKind::Markdown)),
            ("application/x-www-form-urlencoded", Some(BodyKind::Form)),
            ("multipart/form-data; boundary=x", Some(BodyKind::Multipart)),
            ("text/plain", Some(BodyKind::Text)),
            ("image/png", Some(BodyKind::Binary)),
            ("application/octet-stream", Some(BodyKind::Binary)),
            ("application/x-custom", None),
        ];
        for (content_type, expected) in cases {
            assert_eq!(kind_from_media_type(content_type), expected, "{content_type}");
        }
    }

    #[test]
    fn test_empty_body_wins_over_content_type() {
        let kind = classify(
            Some(BodyKind::Binary),
            Some("application/json"),
            &CapturedBody::Absent,
        );
        assert_eq!(kind, BodyKind::Empty);
    }

    #[test]
    fn test_structure_wins_over_content_type() {
        let body = CapturedBody::Binary(BinaryDescriptor {
            media_type: Some("application/json".into()),
            size: 4,
        });
        assert_eq!(
            classify(Some(BodyKind::Binary), Some("application/json"), &body),
            BodyKind::Binary
        );
    }

    #[test]
    fn test_shape_used_without_content_type() {
        let body = CapturedBody::Text("hello".into());
        assert_eq!(classify(None, None, &body), BodyKind::Text);
        assert_eq!(
            classify(None, Some("application/x-custom"), &body),
            BodyKind::Text
        );
        let body = CapturedBody::Json(json!({"a": 1}));
        assert_eq!(classify(None, None, &body), BodyKind::Unknown);
    }

    #[test]
    fn test_parse_text_json_and_fallback() {
        let parsed = parse_text(r#"{"id": 7}"#, Some("application/json"));
        assert!(!parsed.is_fallback());
        assert_eq!(parsed.into_inner(), CapturedBody::Json(json!({"id": 7})));

        let parsed = parse_text("{not json", Some("application/json"));
        assert!(parsed.is_fallback());
        assert_eq!(parsed.into_inner(), CapturedBody::Text("{not json".into()));
    }

    #[test]
    fn test_parse_text_yaml_and_form() {
        let parsed = parse_text("name: Ann\nage: 3\n", Some("application/yaml")).into_inner();
        assert_eq!(parsed, CapturedBody::Json(json!({"name": "Ann", "age": 3})));

        let parsed = parse_text("a=1&a=2&b=x", Some("application/x-www-form-urlencoded"));
        assert_eq!(
            parsed.into_inner().to_json(),
            json!({"a": ["1", "2"], "b": "x"})
        );
    }

    #[test]
    fn test_to_json_descriptors() {
        let body = CapturedBody::Binary(BinaryDescriptor {
            media_type: Some("image/png".into()),
            size: 10,
        });
        assert_eq!(
            body.to_json(),
            json!({"binary": true, "mediaType": "image/png", "size": 10})
        );
        assert_eq!(CapturedBody::Absent.to_json(), Value::Null);
    }
}
