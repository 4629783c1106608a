//! The parsed request the engine dispatches on.

use crate::error::{DavError, DavResult};
use crate::headers::{self, Depth, LockTimeout};
use bytes::Bytes;
use davgate_core::{ByteStream, DavPath, collect_body};
use http::{HeaderMap, Method};

/// Upper bound for buffered request bodies (XML method bodies).
///
/// PUT bodies stream straight to the provider and are not subject to this.
pub const MAX_XML_BODY: usize = 1024 * 1024;

/// The closed set of methods the engine understands.
///
/// Anything else maps to [`DavMethod::Unknown`] and is answered with 405;
/// there is no dynamic method lookup that could fail at runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DavMethod {
    Options,
    Get,
    Head,
    Put,
    Delete,
    MkCol,
    Copy,
    Move,
    PropFind,
    PropPatch,
    Lock,
    Unlock,
    Unknown,
}

impl DavMethod {
    /// Map an HTTP method, extension methods included.
    pub fn from_http(method: &Method) -> DavMethod {
        match method.as_str() {
            "OPTIONS" => DavMethod::Options,
            "GET" => DavMethod::Get,
            "HEAD" => DavMethod::Head,
            "PUT" => DavMethod::Put,
            "DELETE" => DavMethod::Delete,
            "MKCOL" => DavMethod::MkCol,
            "COPY" => DavMethod::Copy,
            "MOVE" => DavMethod::Move,
            "PROPFIND" => DavMethod::PropFind,
            "PROPPATCH" => DavMethod::PropPatch,
            "LOCK" => DavMethod::Lock,
            "UNLOCK" => DavMethod::Unlock,
            _ => DavMethod::Unknown,
        }
    }

    /// Wire name of the method.
    pub fn as_str(self) -> &'static str {
        match self {
            DavMethod::Options => "OPTIONS",
            DavMethod::Get => "GET",
            DavMethod::Head => "HEAD",
            DavMethod::Put => "PUT",
            DavMethod::Delete => "DELETE",
            DavMethod::MkCol => "MKCOL",
            DavMethod::Copy => "COPY",
            DavMethod::Move => "MOVE",
            DavMethod::PropFind => "PROPFIND",
            DavMethod::PropPatch => "PROPPATCH",
            DavMethod::Lock => "LOCK",
            DavMethod::Unlock => "UNLOCK",
            DavMethod::Unknown => "UNKNOWN",
        }
    }

    /// Whether the method writes through to the storage provider.
    ///
    /// LOCK/UNLOCK mutate engine state only, so a read-only provider still
    /// accepts them.
    pub fn mutates_storage(self) -> bool {
        matches!(
            self,
            DavMethod::Put
                | DavMethod::Delete
                | DavMethod::MkCol
                | DavMethod::Copy
                | DavMethod::Move
                | DavMethod::PropPatch
        )
    }

    /// Every supported method, for the OPTIONS `Allow` header.
    pub const SUPPORTED: [DavMethod; 12] = [
        DavMethod::Options,
        DavMethod::Get,
        DavMethod::Head,
        DavMethod::Put,
        DavMethod::Delete,
        DavMethod::MkCol,
        DavMethod::Copy,
        DavMethod::Move,
        DavMethod::PropFind,
        DavMethod::PropPatch,
        DavMethod::Lock,
        DavMethod::Unlock,
    ];
}

/// One inbound request, as handed over by the transport collaborator.
///
/// The transport supplies the method, the raw request target, the header
/// set, and (optionally) a body stream; everything else is derived here.
pub struct DavRequest {
    /// Engine method.
    pub method: DavMethod,
    /// Raw request target as the client sent it (digest `uri` checks).
    pub raw_uri: String,
    /// Decoded, normalized path.
    pub path: DavPath,
    /// Request headers.
    pub headers: HeaderMap,
    body: Option<ByteStream>,
}

impl DavRequest {
    /// Build a request from transport-level pieces.
    ///
    /// `raw_uri` is the percent-encoded request target; query strings are
    /// not part of the resource address and are cut off here.
    pub fn new(
        method: &Method,
        raw_uri: &str,
        headers: HeaderMap,
        body: Option<ByteStream>,
    ) -> DavResult<Self> {
        let path_part = raw_uri.split(['?', '#']).next().unwrap_or("");
        let decoded = headers::percent_decode(path_part)?;
        let path = DavPath::parse(&decoded).map_err(|_| DavError::BadRequest)?;
        Ok(DavRequest {
            method: DavMethod::from_http(method),
            raw_uri: raw_uri.to_string(),
            path,
            headers,
            body,
        })
    }

    /// The `Authorization` header, if present and readable.
    pub fn authorization(&self) -> Option<&str> {
        self.headers.get("authorization")?.to_str().ok()
    }

    /// Parsed `Depth` header with a per-method default.
    pub fn depth(&self, default: Depth) -> DavResult<Depth> {
        headers::depth(&self.headers, default)
    }

    /// Parsed `Overwrite` header; absent means `true`.
    pub fn overwrite(&self) -> DavResult<bool> {
        headers::overwrite(&self.headers)
    }

    /// Parsed `Destination` header.
    pub fn destination(&self) -> DavResult<Option<DavPath>> {
        headers::destination(&self.headers)
    }

    /// Lock tokens submitted through the `If` header.
    pub fn if_tokens(&self) -> Vec<String> {
        headers::if_tokens(&self.headers)
    }

    /// Parsed `Lock-Token` header.
    pub fn lock_token(&self) -> Option<String> {
        headers::lock_token(&self.headers)
    }

    /// Parsed `Timeout` header.
    pub fn timeout(&self) -> Option<LockTimeout> {
        headers::timeout(&self.headers)
    }

    /// Take the body as a stream (for PUT); empty stream when absent.
    pub fn take_body_stream(&mut self) -> ByteStream {
        self.body
            .take()
            .unwrap_or_else(|| davgate_core::bytes_stream(Bytes::new()))
    }

    /// Collect the body into memory (for XML method bodies).
    pub async fn take_body(&mut self) -> DavResult<Bytes> {
        let Some(stream) = self.body.take() else {
            return Ok(Bytes::new());
        };
        let body = collect_body(stream).await.map_err(|_| DavError::BadRequest)?;
        if body.len() > MAX_XML_BODY {
            return Err(DavError::BadRequest);
        }
        Ok(body)
    }
}

impl std::fmt::Debug for DavRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DavRequest")
            .field("method", &self.method)
            .field("path", &self.path)
            .field("has_body", &self.body.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_method_mapping() {
        assert_eq!(DavMethod::from_http(&Method::GET), DavMethod::Get);
        assert_eq!(
            DavMethod::from_http(&Method::from_bytes(b"PROPFIND").unwrap()),
            DavMethod::PropFind
        );
        assert_eq!(
            DavMethod::from_http(&Method::from_bytes(b"BREW").unwrap()),
            DavMethod::Unknown
        );
    }

    #[test]
    fn test_request_decodes_path() {
        let req = DavRequest::new(
            &Method::GET,
            "/docs/h%C3%A9llo?ignored=1",
            HeaderMap::new(),
            None,
        )
        .unwrap();
        assert_eq!(req.path.as_url(), "/docs/héllo");
        assert_eq!(req.raw_uri, "/docs/h%C3%A9llo?ignored=1");
    }

    #[test]
    fn test_request_rejects_traversal() {
        assert!(DavRequest::new(&Method::GET, "/a/../b", HeaderMap::new(), None).is_err());
        assert!(
            DavRequest::new(&Method::GET, "/a/%2e%2e/b", HeaderMap::new(), None).is_err()
        );
    }

    #[tokio::test]
    async fn test_take_body_enforces_limit() {
        let big = Bytes::from(vec![b'x'; MAX_XML_BODY + 1]);
        let mut req = DavRequest::new(
            &Method::from_bytes(b"PROPFIND").unwrap(),
            "/",
            HeaderMap::new(),
            Some(davgate_core::bytes_stream(big)),
        )
        .unwrap();
        assert_eq!(req.take_body().await.unwrap_err(), DavError::BadRequest);
    }
}
