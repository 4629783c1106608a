//! Shared test harness for the engine integration suites.
//!
//! Builds an engine over in-memory mounts and provides convenience request
//! builders so the suites read as protocol conversations.

#![allow(dead_code)] // Each suite uses the subset of helpers it needs.

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use bytes::Bytes;
use davgate_core::{DavPath, MemoryProvider, collect_body};
use davgate_webdav::{
    AccountConfig, DavBody, DavConfig, DavEngine, DavRequest, DavResponse,
};
use http::{HeaderMap, HeaderValue, Method};
use std::sync::Arc;

pub const TEST_USER: &str = "alice";
pub const TEST_PASSWORD: &str = "correct horse battery staple";

/// A second account confined to `/dav`.
pub const SCOPED_USER: &str = "bob";
pub const SCOPED_PASSWORD: &str = "bobs-password";

/// An engine over in-memory mounts:
/// `/dav` (writable), `/second` (writable, distinct provider),
/// `/ro` (read-only), `/quota` (64-byte quota).
pub struct TestEngine {
    pub engine: DavEngine,
}

impl TestEngine {
    pub fn new() -> Self {
        let config = DavConfig {
            realm: "davgate-tests".to_string(),
            accounts: vec![
                AccountConfig {
                    username: TEST_USER.to_string(),
                    password: TEST_PASSWORD.to_string(),
                    permissions: vec!["/".to_string()],
                },
                AccountConfig {
                    username: SCOPED_USER.to_string(),
                    password: SCOPED_PASSWORD.to_string(),
                    permissions: vec!["/dav".to_string()],
                },
            ],
            ..DavConfig::default()
        };
        let mounts = vec![
            mount("/dav", MemoryProvider::new()),
            mount("/second", MemoryProvider::new()),
            mount("/ro", MemoryProvider::new_read_only()),
            mount("/quota", MemoryProvider::with_quota(64)),
        ];
        let engine = DavEngine::with_mounts(&config, mounts).expect("engine construction");
        TestEngine { engine }
    }

    /// Issue a request as the default test user.
    pub async fn request(
        &self,
        method: &str,
        path: &str,
        headers: &[(&str, &str)],
        body: Option<&[u8]>,
    ) -> DavResponse {
        self.request_as(TEST_USER, TEST_PASSWORD, method, path, headers, body)
            .await
    }

    /// Issue a request with explicit credentials.
    pub async fn request_as(
        &self,
        user: &str,
        password: &str,
        method: &str,
        path: &str,
        headers: &[(&str, &str)],
        body: Option<&[u8]>,
    ) -> DavResponse {
        let mut header_map = HeaderMap::new();
        header_map.insert(
            "authorization",
            HeaderValue::from_str(&basic_auth(user, password)).unwrap(),
        );
        for (name, value) in headers {
            header_map.append(
                http::header::HeaderName::from_bytes(name.as_bytes()).unwrap(),
                HeaderValue::from_str(value).unwrap(),
            );
        }
        self.dispatch(method, path, header_map, body).await
    }

    /// Issue a request with no credentials at all.
    pub async fn request_anonymous(&self, method: &str, path: &str) -> DavResponse {
        self.dispatch(method, path, HeaderMap::new(), None).await
    }

    async fn dispatch(
        &self,
        method: &str,
        path: &str,
        headers: HeaderMap,
        body: Option<&[u8]>,
    ) -> DavResponse {
        let method = Method::from_bytes(method.as_bytes()).unwrap();
        let body = body.map(|b| davgate_core::bytes_stream(Bytes::from(b.to_vec())));
        let request = DavRequest::new(&method, path, headers, body).expect("request construction");
        self.engine.dispatch(request).await
    }

    // Shorthand for the common verbs.

    pub async fn put(&self, path: &str, content: &[u8]) -> DavResponse {
        self.request("PUT", path, &[], Some(content)).await
    }

    pub async fn get(&self, path: &str) -> DavResponse {
        self.request("GET", path, &[], None).await
    }

    pub async fn mkcol(&self, path: &str) -> DavResponse {
        self.request("MKCOL", path, &[], None).await
    }

    pub async fn delete(&self, path: &str) -> DavResponse {
        self.request("DELETE", path, &[], None).await
    }

    pub async fn propfind(&self, path: &str, depth: &str, body: Option<&[u8]>) -> DavResponse {
        self.request("PROPFIND", path, &[("depth", depth)], body)
            .await
    }

    /// LOCK with a standard exclusive lockinfo body; returns the response.
    pub async fn lock_exclusive(&self, path: &str, headers: &[(&str, &str)]) -> DavResponse {
        self.request("LOCK", path, headers, Some(LOCKINFO_EXCLUSIVE))
            .await
    }

    pub async fn lock_shared(&self, path: &str) -> DavResponse {
        self.request("LOCK", path, &[], Some(LOCKINFO_SHARED)).await
    }
}

pub const LOCKINFO_EXCLUSIVE: &[u8] = br#"<?xml version="1.0" encoding="utf-8"?>
<D:lockinfo xmlns:D="DAV:">
  <D:lockscope><D:exclusive/></D:lockscope>
  <D:locktype><D:write/></D:locktype>
  <D:owner><D:href>test-suite</D:href></D:owner>
</D:lockinfo>"#;

pub const LOCKINFO_SHARED: &[u8] = br#"<?xml version="1.0" encoding="utf-8"?>
<D:lockinfo xmlns:D="DAV:">
  <D:lockscope><D:shared/></D:lockscope>
  <D:locktype><D:write/></D:locktype>
</D:lockinfo>"#;

fn mount(prefix: &str, provider: MemoryProvider) -> (DavPath, Arc<dyn davgate_core::DavProvider>) {
    (
        DavPath::parse(prefix).unwrap(),
        Arc::new(provider) as Arc<dyn davgate_core::DavProvider>,
    )
}

fn basic_auth(user: &str, password: &str) -> String {
    format!("Basic {}", BASE64.encode(format!("{user}:{password}")))
}

/// Collect a response body into a string.
pub async fn body_string(response: DavResponse) -> String {
    match response.body {
        DavBody::Empty => String::new(),
        DavBody::Full(bytes) => String::from_utf8(bytes.to_vec()).unwrap(),
        DavBody::Stream(stream) => {
            String::from_utf8(collect_body(stream).await.unwrap().to_vec()).unwrap()
        }
    }
}

/// Number of non-overlapping occurrences of `needle` in `haystack`.
pub fn count(haystack: &str, needle: &str) -> usize {
    haystack.matches(needle).count()
}

/// Extract the `Lock-Token` header value (without angle brackets).
pub fn lock_token(response: &DavResponse) -> String {
    response
        .headers
        .get("lock-token")
        .expect("lock-token header")
        .to_str()
        .unwrap()
        .trim_start_matches('<')
        .trim_end_matches('>')
        .to_string()
}
