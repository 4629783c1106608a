//! The response the engine hands back to the transport collaborator.

use crate::error::DavError;
use bytes::Bytes;
use davgate_core::ByteStream;
use http::header::{CONTENT_LENGTH, CONTENT_TYPE, HeaderName, HeaderValue};
use http::{HeaderMap, StatusCode};

/// Response body: nothing, one buffer, or a byte stream.
///
/// Streams come from provider reads; the transport owns their pacing and may
/// drop them on client disconnect without telling the engine.
pub enum DavBody {
    Empty,
    Full(Bytes),
    Stream(ByteStream),
}

impl std::fmt::Debug for DavBody {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DavBody::Empty => f.write_str("Empty"),
            DavBody::Full(b) => f.debug_tuple("Full").field(&b.len()).finish(),
            DavBody::Stream(_) => f.write_str("Stream(..)"),
        }
    }
}

/// Status, headers, body. The transport writes this back verbatim.
#[derive(Debug)]
pub struct DavResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: DavBody,
}

impl DavResponse {
    /// A bodyless response.
    pub fn empty(status: StatusCode) -> Self {
        DavResponse {
            status,
            headers: HeaderMap::new(),
            body: DavBody::Empty,
        }
    }

    /// The single-point mapping from an error kind to its response.
    pub fn error(e: DavError) -> Self {
        DavResponse::empty(e.status())
    }

    /// A buffered response with an explicit content type.
    pub fn with_body(status: StatusCode, content_type: &str, body: Bytes) -> Self {
        let mut response = DavResponse::empty(status);
        response.set_header(CONTENT_TYPE, content_type);
        response.set_header(CONTENT_LENGTH, &body.len().to_string());
        response.body = DavBody::Full(body);
        response
    }

    /// An XML response body (Multi-Status, lockdiscovery).
    pub fn xml(status: StatusCode, body: Bytes) -> Self {
        DavResponse::with_body(status, "application/xml; charset=utf-8", body)
    }

    /// A plain-text response body.
    pub fn text(status: StatusCode, body: String) -> Self {
        DavResponse::with_body(status, "text/plain; charset=utf-8", Bytes::from(body))
    }

    /// A streaming response of known length.
    pub fn stream(status: StatusCode, content_type: &str, len: u64, body: ByteStream) -> Self {
        let mut response = DavResponse::empty(status);
        response.set_header(CONTENT_TYPE, content_type);
        response.set_header(CONTENT_LENGTH, &len.to_string());
        response.body = DavBody::Stream(body);
        response
    }

    /// Set a header, replacing any previous value.
    ///
    /// Values the engine produces are always valid header text; a value that
    /// is not is dropped rather than poisoning the response.
    pub fn set_header(&mut self, name: HeaderName, value: &str) {
        if let Ok(value) = HeaderValue::from_str(value) {
            self.headers.insert(name, value);
        }
    }

    /// Add a header without replacing previous values (`WWW-Authenticate`).
    pub fn append_header(&mut self, name: HeaderName, value: &str) {
        if let Ok(value) = HeaderValue::from_str(value) {
            self.headers.append(name, value);
        }
    }

    /// Builder-style [`set_header`](Self::set_header).
    pub fn header(mut self, name: HeaderName, value: &str) -> Self {
        self.set_header(name, value);
        self
    }

    /// Convert into an `http::Response` for transports that want one.
    pub fn into_http(self) -> http::Response<DavBody> {
        let mut builder = http::Response::builder().status(self.status);
        if let Some(headers) = builder.headers_mut() {
            *headers = self.headers;
        }
        builder
            .body(self.body)
            .unwrap_or_else(|_| http::Response::new(DavBody::Empty))
    }
}
