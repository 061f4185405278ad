//! Request snapshots, taken before the underlying call is issued.

use super::body::{
    classify, parse_text, BinaryDescriptor, BodyKind, CapturedBody, FileDescriptor, FormFieldValue,
    StreamDescriptor,
};
use super::headers::{header_map, header_value, request_cookies};
use super::url::{parse_url, ParsedUrl, QueryValue};
use crate::transport::{OutboundRequest, PartValue, RequestBody};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::debug;

/// Immutable view of an outbound request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CapturedRequest {
    /// Upper-cased method.
    pub method: String,
    /// The URL exactly as the caller passed it.
    pub url: String,
    pub parsed_url: ParsedUrl,
    pub headers: BTreeMap<String, String>,
    pub cookies: BTreeMap<String, String>,
    pub body: CapturedBody,
    pub body_kind: BodyKind,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<String>,
}

impl CapturedRequest {
    pub fn path(&self) -> &str {
        &self.parsed_url.path
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        header_value(&self.headers, name)
    }

    pub fn content_type(&self) -> Option<&str> {
        self.header("content-type")
    }
}

/// Snapshots `request` without touching its body.
///
/// Streams are described, not read. Multipart files are reduced to
/// name/type/size descriptors.
pub fn capture_request(request: &OutboundRequest, correlation_id: Option<String>) -> CapturedRequest {
    let parsed_url = parse_url(&request.url);
    if parsed_url.is_fallback() {
        debug!("Captured URL '{}' did not parse; using naive split", request.url);
    }

    let headers = header_map(&request.headers);
    let content_type = header_value(&headers, "content-type").map(str::to_string);
    let (structural, body) = capture_request_body(&request.body, content_type.as_deref());
    let body_kind = classify(structural, content_type.as_deref(), &body);

    CapturedRequest {
        method: request.method.as_str().to_ascii_uppercase(),
        url: request.url.clone(),
        parsed_url: parsed_url.into_inner(),
        cookies: request_cookies(&request.headers),
        headers,
        body,
        body_kind,
        timestamp: Utc::now(),
        correlation_id,
    }
}

fn capture_request_body(
    body: &RequestBody,
    content_type: Option<&str>,
) -> (Option<BodyKind>, CapturedBody) {
    if body.is_empty() {
        return (None, CapturedBody::Absent);
    }
    match body {
        RequestBody::Empty => (None, CapturedBody::Absent),
        RequestBody::Text(text) => (None, parse_text(text, content_type).into_inner()),
        RequestBody::Bytes(bytes) => (
            Some(BodyKind::Binary),
            CapturedBody::Binary(BinaryDescriptor {
                media_type: content_type.map(str::to_string),
                size: bytes.len() as u64,
            }),
        ),
        RequestBody::Form(pairs) => {
            let mut fields: BTreeMap<String, QueryValue> = BTreeMap::new();
            for (name, value) in pairs {
                let merged = match fields.remove(name) {
                    None => QueryValue::Single(value.clone()),
                    Some(QueryValue::Single(first)) => {
                        QueryValue::Multiple(vec![first, value.clone()])
                    }
                    Some(QueryValue::Multiple(mut values)) => {
                        values.push(value.clone());
                        QueryValue::Multiple(values)
                    }
                };
                fields.insert(name.clone(), merged);
            }
            (Some(BodyKind::Form), CapturedBody::Form(fields))
        }
        RequestBody::Multipart(form) => {
            let fields = form
                .parts
                .iter()
                .map(|part| {
                    let value = match &part.value {
                        PartValue::Text(text) => FormFieldValue::Text(text.clone()),
                        PartValue::File {
                            file_name,
                            content_type,
                            data,
                        } => FormFieldValue::File(FileDescriptor {
                            name: file_name.clone(),
                            content_type: content_type
                                .clone()
                                .unwrap_or_else(|| "application/octet-stream".to_string()),
                            size: data.len() as u64,
                        }),
                    };
                    (part.name.clone(), value)
                })
                .collect();
            (Some(BodyKind::Multipart), CapturedBody::Multipart(fields))
        }
        RequestBody::Stream(stream) => (
            Some(BodyKind::Stream),
            CapturedBody::Stream(StreamDescriptor {
                media_type: content_type.map(str::to_string),
                length: stream.length(),
            }),
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::{BodyStream, MultipartForm};
    use bytes::Bytes;
    use serde_json::json;

    #[test]
    fn test_capture_json_request() {
        let request = OutboundRequest::post("https://api.example.com/api/users?dry=1")
            .header("Cookie", "session=abc; theme=dark")
            .json(&json!({"name": "Ann"}));
        let captured = capture_request(&request, Some("corr-1".into()));

        assert_eq!(captured.method, "POST");
        assert_eq!(captured.path(), "/api/users");
        assert_eq!(captured.parsed_url.query_params["dry"].first(), Some("1"));
        assert_eq!(captured.cookies["session"], "abc");
        assert_eq!(captured.body_kind, BodyKind::Json);
        assert_eq!(captured.body, CapturedBody::Json(json!({"name": "Ann"})));
        assert_eq!(captured.correlation_id.as_deref(), Some("corr-1"));
        assert_eq!(captured.content_type(), Some("application/json"));
    }

    #[test]
    fn test_extension_method_is_upper_cased() {
        let method = hyper::Method::from_bytes(b"patch").unwrap();
        let request = OutboundRequest::new(method, "/x");
        assert_eq!(capture_request(&request, None).method, "PATCH");
    }

    #[test]
    fn test_multipart_files_are_descriptors() {
        let form = MultipartForm::new()
            .text("title", "holiday")
            .file("photo", "beach.png", Some("image/png"), vec![0u8; 2048]);
        let request = OutboundRequest::post("/upload").body(form);
        let captured = capture_request(&request, None);

        assert_eq!(captured.body_kind, BodyKind::Multipart);
        assert_eq!(
            captured.body.to_json(),
            json!({
                "title": "holiday",
                "photo": {"name": "beach.png", "type": "image/png", "size": 2048}
            })
        );
    }

    #[test]
    fn test_binary_buffer_overrides_content_type() {
        let request = OutboundRequest::put("/blob")
            .header("content-type", "application/json")
            .body(Bytes::from_static(b"\x00\x01\x02"));
        let captured = capture_request(&request, None);
        assert_eq!(captured.body_kind, BodyKind::Binary);
        assert_eq!(
            captured.body,
            CapturedBody::Binary(BinaryDescriptor {
                media_type: Some("application/json".into()),
                size: 3
            })
        );
    }

    #[test]
    fn test_stream_is_not_read() {
        let stream = BodyStream::new(futures::stream::iter(vec![Ok(Bytes::from_static(b"abc"))]))
            .with_length(3);
        let request = OutboundRequest::post("/upload").body(RequestBody::Stream(stream));
        let captured = capture_request(&request, None);
        assert_eq!(captured.body_kind, BodyKind::Stream);
        assert!(matches!(
            captured.body,
            CapturedBody::Stream(StreamDescriptor { length: Some(3), .. })
        ));
    }

    #[test]
    fn test_form_pairs_collect_repeats() {
        let request = OutboundRequest::post("/login").body(RequestBody::Form(vec![
            ("role".into(), "a".into()),
            ("user".into(), "ann".into()),
            ("role".into(), "b".into()),
        ]));
        let captured = capture_request(&request, None);
        assert_eq!(captured.body_kind, BodyKind::Form);
        assert_eq!(captured.body.to_json(), json!({"role": ["a", "b"], "user": "ann"}));
    }

    #[test]
    fn test_empty_body_with_content_type() {
        let request = OutboundRequest::get("/x").header("content-type", "application/json");
        let captured = capture_request(&request, None);
        assert_eq!(captured.body_kind, BodyKind::Empty);
        assert!(captured.body.is_absent());
    }
}
