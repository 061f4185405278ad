//! Normalization of raw transport values into canonical snapshots.
//!
//! Every function here is total: malformed input degrades to a fallback value
//! instead of an error, because capture must never abort an in-flight call.
//!
//! # Module Structure
//!
//! - `url` - URL splitting and query decoding
//! - `headers` - Header collapsing and cookie parsing
//! - `body` - Body kind classification and best-effort parsing
//! - `request` - Request snapshots
//! - `response` - Response snapshots

mod body;
mod headers;
mod request;
mod response;
mod url;

pub use body::{
    classify, kind_from_media_type, media_type, parse_text, BinaryDescriptor, BodyKind,
    CapturedBody, FileDescriptor, FormFieldValue, StreamDescriptor,
};
pub use headers::{
    header_map, header_value, parse_cookie_header, parse_set_cookie, parse_set_cookies,
    request_cookies, response_cookies,
};
pub use request::{capture_request, CapturedRequest};
pub use response::{capture_response, CapturedResponse};
pub use url::{parse_query, parse_url, ParsedUrl, QueryValue};

/// Outcome of a best-effort parse: the value parsed as intended, or a
/// fallback used because the input did not have the expected shape.
#[derive(Debug, Clone, PartialEq)]
pub enum Parsed<T> {
    Value(T),
    Fallback(T),
}

impl<T> Parsed<T> {
    pub fn is_fallback(&self) -> bool {
        matches!(self, Parsed::Fallback(_))
    }

    pub fn into_inner(self) -> T {
        match self {
            Parsed::Value(value) | Parsed::Fallback(value) => value,
        }
    }

    pub fn value(&self) -> &T {
        match self {
            Parsed::Value(value) | Parsed::Fallback(value) => value,
        }
    }
}
