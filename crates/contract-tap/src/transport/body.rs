//! Outbound request bodies.
//!
//! The variant a caller picks is the body's structural type. Capture looks at
//! the variant before it looks at any declared content type.

use bytes::Bytes;
use futures::Stream;
use std::fmt;
use std::pin::Pin;

/// Boxed byte stream used for streaming uploads.
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes, std::io::Error>> + Send>>;

/// Body of an [`OutboundRequest`](super::OutboundRequest).
#[derive(Default)]
pub enum RequestBody {
    #[default]
    Empty,
    /// String payload; its meaning comes from the `content-type` header.
    Text(String),
    /// Raw binary buffer.
    Bytes(Bytes),
    /// `application/x-www-form-urlencoded` pairs, in order.
    Form(Vec<(String, String)>),
    /// `multipart/form-data` parts.
    Multipart(MultipartForm),
    /// One-shot stream. Never read by the capture path.
    Stream(BodyStream),
}

impl RequestBody {
    /// Serializes a JSON value into a text body.
    pub fn json(value: &serde_json::Value) -> Self {
        RequestBody::Text(value.to_string())
    }

    pub fn is_empty(&self) -> bool {
        match self {
            RequestBody::Empty => true,
            RequestBody::Text(text) => text.is_empty(),
            RequestBody::Bytes(bytes) => bytes.is_empty(),
            RequestBody::Form(pairs) => pairs.is_empty(),
            RequestBody::Multipart(form) => form.parts.is_empty(),
            RequestBody::Stream(_) => false,
        }
    }
}

impl fmt::Debug for RequestBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RequestBody::Empty => f.write_str("Empty"),
            RequestBody::Text(text) => f.debug_tuple("Text").field(&text.len()).finish(),
            RequestBody::Bytes(bytes) => f.debug_tuple("Bytes").field(&bytes.len()).finish(),
            RequestBody::Form(pairs) => f.debug_tuple("Form").field(pairs).finish(),
            RequestBody::Multipart(form) => f.debug_tuple("Multipart").field(form).finish(),
            RequestBody::Stream(stream) => f.debug_tuple("Stream").field(stream).finish(),
        }
    }
}

impl From<String> for RequestBody {
    fn from(text: String) -> Self {
        RequestBody::Text(text)
    }
}

impl From<&str> for RequestBody {
    fn from(text: &str) -> Self {
        RequestBody::Text(text.to_string())
    }
}

impl From<Bytes> for RequestBody {
    fn from(bytes: Bytes) -> Self {
        RequestBody::Bytes(bytes)
    }
}

impl From<Vec<u8>> for RequestBody {
    fn from(bytes: Vec<u8>) -> Self {
        RequestBody::Bytes(Bytes::from(bytes))
    }
}

impl From<MultipartForm> for RequestBody {
    fn from(form: MultipartForm) -> Self {
        RequestBody::Multipart(form)
    }
}

/// Streaming upload with an optional declared length.
pub struct BodyStream {
    pub(crate) inner: ByteStream,
    pub(crate) length: Option<u64>,
}

impl BodyStream {
    pub fn new<S>(stream: S) -> Self
    where
        S: Stream<Item = Result<Bytes, std::io::Error>> + Send + 'static,
    {
        Self {
            inner: Box::pin(stream),
            length: None,
        }
    }

    /// Declares the total length, used only for reporting.
    pub fn with_length(mut self, length: u64) -> Self {
        self.length = Some(length);
        self
    }

    pub fn length(&self) -> Option<u64> {
        self.length
    }

    pub fn into_inner(self) -> ByteStream {
        self.inner
    }
}

impl fmt::Debug for BodyStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BodyStream")
            .field("length", &self.length)
            .finish_non_exhaustive()
    }
}

/// A `multipart/form-data` body.
#[derive(Debug, Clone, Default)]
pub struct MultipartForm {
    pub parts: Vec<FormPart>,
}

/// One named part of a multipart form.
#[derive(Debug, Clone)]
pub struct FormPart {
    pub name: String,
    pub value: PartValue,
}

#[derive(Debug, Clone)]
pub enum PartValue {
    Text(String),
    File {
        file_name: String,
        content_type: Option<String>,
        data: Bytes,
    },
}

impl MultipartForm {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a text field.
    pub fn text(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.parts.push(FormPart {
            name: name.into(),
            value: PartValue::Text(value.into()),
        });
        self
    }

    /// Appends a file field.
    pub fn file(
        mut self,
        name: impl Into<String>,
        file_name: impl Into<String>,
        content_type: Option<&str>,
        data: impl Into<Bytes>,
    ) -> Self {
        self.parts.push(FormPart {
            name: name.into(),
            value: PartValue::File {
                file_name: file_name.into(),
                content_type: content_type.map(str::to_string),
                data: data.into(),
            },
        });
        self
    }

    /// Encodes the form for the wire using `boundary`.
    pub fn encode(&self, boundary: &str) -> Bytes {
        let mut out = Vec::new();
        for part in &self.parts {
            out.extend_from_slice(format!("--{boundary}\r\n").as_bytes());
            match &part.value {
                PartValue::Text(value) => {
                    out.extend_from_slice(
                        format!(
                            "Content-Disposition: form-data; name=\"{}\"\r\n\r\n",
                            escape_quoted(&part.name)
                        )
                        .as_bytes(),
                    );
                    out.extend_from_slice(value.as_bytes());
                }
                PartValue::File {
                    file_name,
                    content_type,
                    data,
                } => {
                    out.extend_from_slice(
                        format!(
                            "Content-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\n",
                            escape_quoted(&part.name),
                            escape_quoted(file_name)
                        )
                        .as_bytes(),
                    );
                    let content_type = content_type
                        .as_deref()
                        .unwrap_or("application/octet-stream");
                    out.extend_from_slice(format!("Content-Type: {content_type}\r\n\r\n").as_bytes());
                    out.extend_from_slice(data);
                }
            }
            out.extend_from_slice(b"\r\n");
        }
        out.extend_from_slice(format!("--{boundary}--\r\n").as_bytes());
        Bytes::from(out)
    }
}

fn escape_quoted(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}
