//! Authentication and authorization through the dispatcher.

mod common;

use common::{SCOPED_PASSWORD, SCOPED_USER, TEST_PASSWORD, TEST_USER, TestEngine, body_string};
use davgate_webdav::{AdminFuture, AdminPage, DavRequest};
use http::StatusCode;
use std::sync::Arc;

#[tokio::test]
async fn test_anonymous_request_is_challenged_with_both_schemes() {
    let server = TestEngine::new();
    let response = server.request_anonymous("GET", "/dav/f").await;
    assert_eq!(response.status.as_u16(), 401);

    let schemes: Vec<String> = response
        .headers
        .get_all("www-authenticate")
        .iter()
        .map(|v| {
            v.to_str()
                .unwrap()
                .split(' ')
                .next()
                .unwrap()
                .to_string()
        })
        .collect();
    assert!(schemes.contains(&"Basic".to_string()));
    assert!(schemes.contains(&"Digest".to_string()));

    let digest = response
        .headers
        .get_all("www-authenticate")
        .iter()
        .map(|v| v.to_str().unwrap())
        .find(|v| v.starts_with("Digest"))
        .unwrap();
    assert!(digest.contains("nonce=\""));
    assert!(digest.contains("qop=\"auth\""));
}

#[tokio::test]
async fn test_wrong_password_gets_same_challenge() {
    let server = TestEngine::new();
    let response = server
        .request_as(TEST_USER, "wrong-password", "GET", "/dav/f", &[], None)
        .await;
    assert_eq!(response.status.as_u16(), 401);
    // Same shape as the anonymous challenge; no hint about what failed.
    assert_eq!(response.headers.get_all("www-authenticate").iter().count(), 2);
}

#[tokio::test]
async fn test_unknown_user_gets_same_challenge() {
    let server = TestEngine::new();
    let response = server
        .request_as("mallory", TEST_PASSWORD, "GET", "/dav/f", &[], None)
        .await;
    assert_eq!(response.status.as_u16(), 401);
}

#[tokio::test]
async fn test_permissions_scope_account_to_its_prefixes() {
    let server = TestEngine::new();

    // bob may write under /dav but not /second.
    let response = server
        .request_as(SCOPED_USER, SCOPED_PASSWORD, "PUT", "/dav/f", &[], Some(b"x"))
        .await;
    assert_eq!(response.status.as_u16(), 201);

    let response = server
        .request_as(SCOPED_USER, SCOPED_PASSWORD, "PUT", "/second/f", &[], Some(b"x"))
        .await;
    assert_eq!(response.status.as_u16(), 403);
}

#[tokio::test]
async fn test_admin_marker_requires_credentials() {
    let server = TestEngine::new();
    let response = server.request_anonymous("GET", "/_/status").await;
    assert_eq!(response.status.as_u16(), 401);
}

#[tokio::test]
async fn test_admin_marker_without_collaborator_is_not_found() {
    let server = TestEngine::new();
    let response = server.request("GET", "/_/status", &[], None).await;
    assert_eq!(response.status.as_u16(), 404);
}

struct StatusPage;

impl AdminPage for StatusPage {
    fn enter<'a>(&'a self, request: &'a DavRequest) -> AdminFuture<'a> {
        let body = format!("<h1>{}</h1>", request.path);
        Box::pin(async move { (StatusCode::OK, body) })
    }
}

#[tokio::test]
async fn test_admin_collaborator_answer_is_returned_verbatim() {
    let mut server = TestEngine::new();
    server.engine.set_admin(Arc::new(StatusPage));

    let response = server.request("GET", "/_/status", &[], None).await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(body_string(response).await, "<h1>/_/status</h1>");
}
