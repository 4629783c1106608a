//! COPY and MOVE: Destination/Overwrite handling, recursion, properties.

mod common;

use common::{TestEngine, body_string, count, lock_token};

#[tokio::test]
async fn test_copy_file_creates_destination() {
    let server = TestEngine::new();
    server.put("/dav/src.txt", b"payload").await;

    let response = server
        .request("COPY", "/dav/src.txt", &[("destination", "/dav/dst.txt")], None)
        .await;
    assert_eq!(response.status.as_u16(), 201);
    assert_eq!(body_string(server.get("/dav/dst.txt").await).await, "payload");
    // The source is untouched.
    assert_eq!(body_string(server.get("/dav/src.txt").await).await, "payload");
}

#[tokio::test]
async fn test_copy_absolute_url_destination() {
    let server = TestEngine::new();
    server.put("/dav/src.txt", b"x").await;
    let response = server
        .request(
            "COPY",
            "/dav/src.txt",
            &[("destination", "http://example.net:8080/dav/dst.txt")],
            None,
        )
        .await;
    assert_eq!(response.status.as_u16(), 201);
    assert_eq!(server.get("/dav/dst.txt").await.status.as_u16(), 200);
}

#[tokio::test]
async fn test_copy_overwrite_false_on_existing_destination() {
    let server = TestEngine::new();
    server.put("/dav/src.txt", b"new").await;
    server.put("/dav/dst.txt", b"precious").await;

    let response = server
        .request(
            "COPY",
            "/dav/src.txt",
            &[("destination", "/dav/dst.txt"), ("overwrite", "F")],
            None,
        )
        .await;
    assert_eq!(response.status.as_u16(), 412);
    // The destination is unmodified.
    assert_eq!(body_string(server.get("/dav/dst.txt").await).await, "precious");
}

#[tokio::test]
async fn test_copy_overwrite_true_replaces_and_reports_no_content() {
    let server = TestEngine::new();
    server.put("/dav/src.txt", b"new").await;
    server.put("/dav/dst.txt", b"old").await;

    let response = server
        .request(
            "COPY",
            "/dav/src.txt",
            &[("destination", "/dav/dst.txt"), ("overwrite", "T")],
            None,
        )
        .await;
    assert_eq!(response.status.as_u16(), 204);
    assert_eq!(body_string(server.get("/dav/dst.txt").await).await, "new");
}

#[tokio::test]
async fn test_copy_collection_recursive() {
    let server = TestEngine::new();
    server.mkcol("/dav/dir").await;
    server.put("/dav/dir/a", b"1").await;
    server.mkcol("/dav/dir/sub").await;
    server.put("/dav/dir/sub/b", b"2").await;

    let response = server
        .request("COPY", "/dav/dir", &[("destination", "/dav/copy")], None)
        .await;
    assert_eq!(response.status.as_u16(), 201);
    assert_eq!(body_string(server.get("/dav/copy/a").await).await, "1");
    assert_eq!(body_string(server.get("/dav/copy/sub/b").await).await, "2");
}

#[tokio::test]
async fn test_copy_collection_depth_zero_is_shallow() {
    let server = TestEngine::new();
    server.mkcol("/dav/dir").await;
    server.put("/dav/dir/a", b"1").await;

    let response = server
        .request(
            "COPY",
            "/dav/dir",
            &[("destination", "/dav/copy"), ("depth", "0")],
            None,
        )
        .await;
    assert_eq!(response.status.as_u16(), 201);
    // The collection exists but no children were copied.
    assert_eq!(server.propfind("/dav/copy", "0", None).await.status.as_u16(), 207);
    assert_eq!(server.get("/dav/copy/a").await.status.as_u16(), 404);
}

#[tokio::test]
async fn test_copy_into_own_subtree_is_conflict() {
    let server = TestEngine::new();
    server.mkcol("/dav/dir").await;
    let response = server
        .request("COPY", "/dav/dir", &[("destination", "/dav/dir/inner")], None)
        .await;
    assert_eq!(response.status.as_u16(), 409);
}

#[tokio::test]
async fn test_copy_without_destination_is_bad_request() {
    let server = TestEngine::new();
    server.put("/dav/src", b"x").await;
    let response = server.request("COPY", "/dav/src", &[], None).await;
    assert_eq!(response.status.as_u16(), 400);
}

#[tokio::test]
async fn test_copy_across_providers_is_conflict() {
    let server = TestEngine::new();
    server.put("/dav/src", b"x").await;
    let response = server
        .request("COPY", "/dav/src", &[("destination", "/second/dst")], None)
        .await;
    assert_eq!(response.status.as_u16(), 409);
}

#[tokio::test]
async fn test_move_file() {
    let server = TestEngine::new();
    server.put("/dav/src.txt", b"payload").await;

    let response = server
        .request("MOVE", "/dav/src.txt", &[("destination", "/dav/dst.txt")], None)
        .await;
    assert_eq!(response.status.as_u16(), 201);
    assert_eq!(server.get("/dav/src.txt").await.status.as_u16(), 404);
    assert_eq!(body_string(server.get("/dav/dst.txt").await).await, "payload");
}

#[tokio::test]
async fn test_move_collection_carries_subtree_and_props() {
    let server = TestEngine::new();
    server.mkcol("/dav/dir").await;
    server.put("/dav/dir/f", b"data").await;

    let patch = br#"<D:propertyupdate xmlns:D="DAV:" xmlns:z="urn:zoo">
        <D:set><D:prop><z:tag>keep</z:tag></D:prop></D:set>
      </D:propertyupdate>"#;
    server.request("PROPPATCH", "/dav/dir/f", &[], Some(patch)).await;

    let response = server
        .request("MOVE", "/dav/dir", &[("destination", "/dav/moved")], None)
        .await;
    assert_eq!(response.status.as_u16(), 201);
    assert_eq!(body_string(server.get("/dav/moved/f").await).await, "data");

    // Dead properties travel with the resource.
    let propfind = br#"<D:propfind xmlns:D="DAV:" xmlns:z="urn:zoo">
        <D:prop><z:tag/></D:prop></D:propfind>"#;
    let body = body_string(server.propfind("/dav/moved/f", "0", Some(propfind)).await).await;
    assert!(body.contains(">keep</"));
    assert!(body.contains("HTTP/1.1 200 OK"));
}

#[tokio::test]
async fn test_move_does_not_carry_locks() {
    let server = TestEngine::new();
    server.put("/dav/src", b"x").await;
    let token = lock_token(&server.lock_exclusive("/dav/src", &[]).await);

    let if_header = format!("(<{token}>)");
    let response = server
        .request(
            "MOVE",
            "/dav/src",
            &[("destination", "/dav/dst"), ("if", &if_header)],
            None,
        )
        .await;
    assert_eq!(response.status.as_u16(), 201);

    // The destination starts unlocked: a fresh exclusive lock succeeds.
    assert_eq!(server.lock_exclusive("/dav/dst", &[]).await.status.as_u16(), 200);
}

#[tokio::test]
async fn test_move_onto_locked_destination_needs_token() {
    let server = TestEngine::new();
    server.put("/dav/src", b"x").await;
    server.put("/dav/dst", b"y").await;
    server.lock_exclusive("/dav/dst", &[]).await;

    let response = server
        .request("MOVE", "/dav/src", &[("destination", "/dav/dst")], None)
        .await;
    assert_eq!(response.status.as_u16(), 423);
    // Nothing moved.
    assert_eq!(server.get("/dav/src").await.status.as_u16(), 200);
    assert_eq!(body_string(server.get("/dav/dst").await).await, "y");
}

#[tokio::test]
async fn test_copy_preserves_dead_props_of_source() {
    let server = TestEngine::new();
    server.put("/dav/src", b"x").await;
    let patch = br#"<D:propertyupdate xmlns:D="DAV:" xmlns:z="urn:zoo">
        <D:set><D:prop><z:tag>dup</z:tag></D:prop></D:set>
      </D:propertyupdate>"#;
    server.request("PROPPATCH", "/dav/src", &[], Some(patch)).await;

    server
        .request("COPY", "/dav/src", &[("destination", "/dav/dst")], None)
        .await;

    let propfind = br#"<D:propfind xmlns:D="DAV:" xmlns:z="urn:zoo">
        <D:prop><z:tag/></D:prop></D:propfind>"#;
    for path in ["/dav/src", "/dav/dst"] {
        let body = body_string(server.propfind(path, "0", Some(propfind)).await).await;
        assert!(body.contains(">dup</"), "missing dead prop on {path}");
    }
}

#[tokio::test]
async fn test_propfind_after_copy_counts_subtree() {
    let server = TestEngine::new();
    server.mkcol("/dav/dir").await;
    server.put("/dav/dir/a", b"1").await;
    server.put("/dav/dir/b", b"2").await;
    server
        .request("COPY", "/dav/dir", &[("destination", "/dav/copy")], None)
        .await;

    let body = body_string(server.propfind("/dav/copy", "1", None).await).await;
    assert_eq!(count(&body, "<D:response>"), 3);
}
