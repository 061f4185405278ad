//! Response snapshots, taken from a duplicate of the settled response.

use super::body::{
    classify, kind_from_media_type, parse_text, BinaryDescriptor, BodyKind, CapturedBody,
};
use super::headers::{header_map, header_value, response_cookies};
use bytes::Bytes;
use chrono::{DateTime, Utc};
use hyper::Response;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

/// Immutable view of a settled response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CapturedResponse {
    pub status: u16,
    pub status_text: String,
    pub headers: BTreeMap<String, String>,
    pub cookies: BTreeMap<String, String>,
    pub body: CapturedBody,
    pub body_kind: BodyKind,
    pub timestamp: DateTime<Utc>,
    #[serde(
        default,
        with = "duration_millis",
        skip_serializing_if = "Option::is_none"
    )]
    pub duration: Option<Duration>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_length: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_encoding: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cache_control: Option<String>,
    /// `access-control-*` headers.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub cors: BTreeMap<String, String>,
    /// `location` header, when present.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub redirect_location: Option<String>,
}

impl CapturedResponse {
    pub fn header(&self, name: &str) -> Option<&str> {
        header_value(&self.headers, name)
    }

    pub fn is_redirect(&self) -> bool {
        (300..400).contains(&self.status)
    }
}

/// Snapshots a response.
///
/// Only a reference-counted clone of the body buffer is read, so the caller's
/// response is neither consumed nor altered. Binary bodies keep their size
/// only.
pub fn capture_response(
    response: &Response<Bytes>,
    duration: Option<Duration>,
    correlation_id: Option<String>,
) -> CapturedResponse {
    let headers = header_map(response.headers());
    let content_type = header_value(&headers, "content-type").map(str::to_string);
    let duplicate = response.body().clone();
    let body = capture_response_body(duplicate, content_type.as_deref());
    let body_kind = classify(None, content_type.as_deref(), &body);

    let status = response.status();
    let cors = headers
        .iter()
        .filter(|(name, _)| name.starts_with("access-control-"))
        .map(|(name, value)| (name.clone(), value.clone()))
        .collect();

    CapturedResponse {
        status: status.as_u16(),
        status_text: status.canonical_reason().unwrap_or_default().to_string(),
        cookies: response_cookies(response.headers()),
        body,
        body_kind,
        timestamp: Utc::now(),
        duration,
        correlation_id,
        content_length: header_value(&headers, "content-length")
            .and_then(|value| value.trim().parse().ok()),
        content_encoding: header_value(&headers, "content-encoding").map(str::to_string),
        cache_control: header_value(&headers, "cache-control").map(str::to_string),
        redirect_location: header_value(&headers, "location").map(str::to_string),
        content_type,
        cors,
        headers,
    }
}

fn capture_response_body(bytes: Bytes, content_type: Option<&str>) -> CapturedBody {
    if bytes.is_empty() {
        return CapturedBody::Absent;
    }
    let binary = CapturedBody::Binary(BinaryDescriptor {
        media_type: content_type.map(str::to_string),
        size: bytes.len() as u64,
    });
    if content_type.and_then(kind_from_media_type) == Some(BodyKind::Binary) {
        return binary;
    }
    match std::str::from_utf8(&bytes) {
        Ok(text) => parse_text(text, content_type).into_inner(),
        Err(_) => binary,
    }
}

mod duration_millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error> {
        match value {
            Some(duration) => serializer.serialize_u64(duration.as_millis() as u64),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<Duration>, D::Error> {
        Ok(Option::<u64>::deserialize(deserializer)?.map(Duration::from_millis))
    }
}
