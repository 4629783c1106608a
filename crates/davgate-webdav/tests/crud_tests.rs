//! Basic resource lifecycle: OPTIONS, PUT, GET, HEAD, MKCOL, DELETE.

mod common;

use common::{TestEngine, body_string};

#[tokio::test]
async fn test_options_advertises_dav_class() {
    let server = TestEngine::new();
    let response = server.request("OPTIONS", "/dav", &[], None).await;
    assert_eq!(response.status.as_u16(), 200);
    assert_eq!(response.headers.get("dav").unwrap(), "1, 2");
    let allow = response.headers.get("allow").unwrap().to_str().unwrap();
    assert!(allow.contains("PROPFIND"));
    assert!(allow.contains("LOCK"));
    assert!(allow.contains("MKCOL"));
}

#[tokio::test]
async fn test_put_then_get_round_trip() {
    let server = TestEngine::new();

    let response = server.put("/dav/note.txt", b"remember the milk").await;
    assert_eq!(response.status.as_u16(), 201);

    let response = server.get("/dav/note.txt").await;
    assert_eq!(response.status.as_u16(), 200);
    assert!(response.headers.contains_key("etag"));
    assert!(response.headers.contains_key("last-modified"));
    assert_eq!(
        response.headers.get("content-length").unwrap(),
        &17.to_string()
    );
    assert_eq!(body_string(response).await, "remember the milk");
}

#[tokio::test]
async fn test_put_replace_reports_no_content() {
    let server = TestEngine::new();
    assert_eq!(server.put("/dav/f", b"one").await.status.as_u16(), 201);
    assert_eq!(server.put("/dav/f", b"two").await.status.as_u16(), 204);
    assert_eq!(body_string(server.get("/dav/f").await).await, "two");
}

#[tokio::test]
async fn test_put_missing_parent_is_conflict() {
    let server = TestEngine::new();
    let response = server.put("/dav/no/such/dir/f", b"x").await;
    assert_eq!(response.status.as_u16(), 409);
}

#[tokio::test]
async fn test_head_has_headers_but_no_body() {
    let server = TestEngine::new();
    server.put("/dav/f", b"payload").await;
    let response = server.request("HEAD", "/dav/f", &[], None).await;
    assert_eq!(response.status.as_u16(), 200);
    assert_eq!(response.headers.get("content-length").unwrap(), "7");
    assert!(body_string(response).await.is_empty());
}

#[tokio::test]
async fn test_get_missing_resource_is_not_found() {
    let server = TestEngine::new();
    assert_eq!(server.get("/dav/nope").await.status.as_u16(), 404);
}

#[tokio::test]
async fn test_unmapped_path_is_not_found() {
    let server = TestEngine::new();
    assert_eq!(server.get("/elsewhere/f").await.status.as_u16(), 404);
    // Partial-segment prefixes do not match a mount.
    assert_eq!(server.get("/davx/f").await.status.as_u16(), 404);
}

#[tokio::test]
async fn test_get_collection_lists_children() {
    let server = TestEngine::new();
    server.mkcol("/dav/dir").await;
    server.put("/dav/dir/a.txt", b"a").await;
    server.mkcol("/dav/dir/sub").await;

    let response = server.get("/dav/dir").await;
    assert_eq!(response.status.as_u16(), 200);
    let listing = body_string(response).await;
    assert!(listing.contains("a.txt\n"));
    assert!(listing.contains("sub/\n"));
}

#[tokio::test]
async fn test_mkcol_lifecycle() {
    let server = TestEngine::new();
    assert_eq!(server.mkcol("/dav/dir").await.status.as_u16(), 201);
    // Existing target and missing parent are both conflicts.
    assert_eq!(server.mkcol("/dav/dir").await.status.as_u16(), 409);
    assert_eq!(server.mkcol("/dav/a/b/c").await.status.as_u16(), 409);
}

#[tokio::test]
async fn test_mkcol_rejects_request_body() {
    let server = TestEngine::new();
    let response = server
        .request("MKCOL", "/dav/dir", &[], Some(b"<mkcol-extension/>"))
        .await;
    assert_eq!(response.status.as_u16(), 415);
}

#[tokio::test]
async fn test_delete_file() {
    let server = TestEngine::new();
    server.put("/dav/f", b"x").await;
    assert_eq!(server.delete("/dav/f").await.status.as_u16(), 204);
    assert_eq!(server.get("/dav/f").await.status.as_u16(), 404);
    assert_eq!(server.delete("/dav/f").await.status.as_u16(), 404);
}

#[tokio::test]
async fn test_delete_collection_recursive_success_is_single_status() {
    let server = TestEngine::new();
    server.mkcol("/dav/dir").await;
    server.put("/dav/dir/a", b"1").await;
    server.mkcol("/dav/dir/sub").await;
    server.put("/dav/dir/sub/b", b"2").await;

    // A fully successful recursive delete reports one status, not a 207.
    let response = server.delete("/dav/dir").await;
    assert_eq!(response.status.as_u16(), 204);
    assert_eq!(server.get("/dav/dir").await.status.as_u16(), 404);
}

#[tokio::test]
async fn test_unknown_method_is_rejected() {
    let server = TestEngine::new();
    let response = server.request("BREW", "/dav", &[], None).await;
    assert_eq!(response.status.as_u16(), 405);
}
