//! PROPFIND: depth handling, live and dead properties, propstat grouping.

mod common;

use common::{TestEngine, body_string, count};

async fn seeded() -> TestEngine {
    let server = TestEngine::new();
    server.mkcol("/dav/dir").await;
    server.put("/dav/dir/one.txt", b"11111").await;
    server.put("/dav/dir/two.txt", b"22").await;
    server
}

#[tokio::test]
async fn test_depth_zero_returns_only_the_resource() {
    let server = seeded().await;
    let response = server.propfind("/dav/dir", "0", None).await;
    assert_eq!(response.status.as_u16(), 207);
    let body = body_string(response).await;
    assert_eq!(count(&body, "<D:response>"), 1);
    assert!(body.contains("<D:href>/dav/dir/</D:href>"));
    assert!(body.contains("<D:resourcetype><D:collection/></D:resourcetype>"));
}

#[tokio::test]
async fn test_depth_one_returns_collection_plus_children() {
    let server = seeded().await;
    let response = server.propfind("/dav/dir", "1", None).await;
    assert_eq!(response.status.as_u16(), 207);
    let body = body_string(response).await;
    // The collection itself plus its two children: exactly three entries.
    assert_eq!(count(&body, "<D:response>"), 3);
    assert!(body.contains("/dav/dir/one.txt"));
    assert!(body.contains("/dav/dir/two.txt"));
}

#[tokio::test]
async fn test_depth_infinity_descends() {
    let server = seeded().await;
    server.mkcol("/dav/dir/sub").await;
    server.put("/dav/dir/sub/deep.txt", b"deep").await;

    let body = body_string(server.propfind("/dav/dir", "infinity", None).await).await;
    assert_eq!(count(&body, "<D:response>"), 5);
    assert!(body.contains("/dav/dir/sub/deep.txt"));
}

#[tokio::test]
async fn test_single_resource_still_gets_multistatus() {
    let server = seeded().await;
    let response = server.propfind("/dav/dir/one.txt", "0", None).await;
    assert_eq!(response.status.as_u16(), 207);
    let body = body_string(response).await;
    assert_eq!(count(&body, "<D:response>"), 1);
    assert!(body.contains("<D:getcontentlength>5</D:getcontentlength>"));
}

#[tokio::test]
async fn test_named_props_split_found_and_missing() {
    let server = seeded().await;
    let body = br#"<?xml version="1.0"?>
        <D:propfind xmlns:D="DAV:" xmlns:z="urn:zoo">
          <D:prop><D:getcontentlength/><z:species/></D:prop>
        </D:propfind>"#;
    let response = server.propfind("/dav/dir/one.txt", "0", Some(body)).await;
    let body = body_string(response).await;

    assert!(body.contains("HTTP/1.1 200 OK"));
    assert!(body.contains("HTTP/1.1 404 Not Found"));
    assert!(body.contains("<D:getcontentlength>5</D:getcontentlength>"));
    assert!(body.contains("<V:species xmlns:V=\"urn:zoo\"/>"));
}

#[tokio::test]
async fn test_allprop_includes_live_set() {
    let server = seeded().await;
    let body = body_string(server.propfind("/dav/dir/one.txt", "0", None).await).await;
    assert!(body.contains("<D:getlastmodified>"));
    assert!(body.contains("<D:getetag>"));
    assert!(body.contains("<D:creationdate>"));
    assert!(body.contains("<D:displayname>one.txt</D:displayname>"));
    assert!(body.contains("<D:supportedlock>"));
}

#[tokio::test]
async fn test_propname_lists_names_without_values() {
    let server = seeded().await;
    let body = br#"<D:propfind xmlns:D="DAV:"><D:propname/></D:propfind>"#;
    let response = server.propfind("/dav/dir/one.txt", "0", Some(body)).await;
    let body = body_string(response).await;
    assert!(body.contains("<D:getcontentlength/>"));
    assert!(!body.contains("<D:getcontentlength>5"));
}

#[tokio::test]
async fn test_propfind_missing_resource_is_not_found() {
    let server = TestEngine::new();
    let response = server.propfind("/dav/ghost", "0", None).await;
    assert_eq!(response.status.as_u16(), 404);
}

#[tokio::test]
async fn test_propfind_bad_depth_is_rejected() {
    let server = seeded().await;
    let response = server.propfind("/dav/dir", "2", None).await;
    assert_eq!(response.status.as_u16(), 400);
}

#[tokio::test]
async fn test_lockdiscovery_reflects_active_lock() {
    let server = seeded().await;
    let lock_response = server.lock_exclusive("/dav/dir/one.txt", &[]).await;
    assert_eq!(lock_response.status.as_u16(), 200);

    let body = body_string(server.propfind("/dav/dir/one.txt", "0", None).await).await;
    assert!(body.contains("<D:lockdiscovery><D:activelock>"));
    assert!(body.contains("<D:exclusive/>"));
    assert!(body.contains("opaquelocktoken:"));
}
