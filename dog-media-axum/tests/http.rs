use axum::body::Body;
use axum::http::{HeaderValue, Request};
use dog_media::{MediaAdapter, MediaConfig};
use dog_media_axum::MediaApp;
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tempfile::TempDir;
use tower::ServiceExt;

fn test_app() -> (TempDir, MediaApp) {
    let dir = tempfile::tempdir().unwrap();
    let app = MediaApp::new(MediaAdapter::from_config(MediaConfig::rooted_at(dir.path())));
    (dir, app)
}

async fn send(app: &MediaApp, request: Request<Body>) -> axum::response::Response {
    app.router.clone().oneshot(request).await.unwrap()
}

async fn json_body(res: axum::response::Response) -> Value {
    let bytes = res.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

async fn raw_body(res: axum::response::Response) -> Vec<u8> {
    res.into_body().collect().await.unwrap().to_bytes().to_vec()
}

async fn put_chunk(app: &MediaApp, upload: &str, index: u32, data: &'static [u8]) -> axum::response::Response {
    send(
        app,
        Request::builder()
            .method("PUT")
            .uri(format!("/uploads/{upload}/chunks/{index}"))
            .body(Body::from(data))
            .unwrap(),
    )
    .await
}

async fn complete(app: &MediaApp, upload: &str, body: Value) -> axum::response::Response {
    send(
        app,
        Request::builder()
            .method("POST")
            .uri(format!("/uploads/{upload}/complete"))
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
    )
    .await
}

fn get_media(id: &str, range: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().method("GET").uri(format!("/media/{id}"));
    if let Some(range) = range {
        builder = builder.header("range", range);
    }
    builder.body(Body::empty()).unwrap()
}

/// Upload "0123456789" as two chunks, sent out of order, and assemble it
async fn published(app: &MediaApp, upload: &str) {
    assert_eq!(put_chunk(app, upload, 1, b"56789").await.status().as_u16(), 200);
    assert_eq!(put_chunk(app, upload, 0, b"01234").await.status().as_u16(), 200);
    let res = complete(app, upload, json!({"totalChunks": 2, "title": "Trailer"})).await;
    assert_eq!(res.status().as_u16(), 201);
}

#[tokio::test]
async fn health_ok() {
    let (_dir, app) = test_app();

    let res = send(&app, Request::builder().uri("/health").body(Body::empty()).unwrap()).await;

    assert_eq!(res.status().as_u16(), 200);
    assert!(res.headers().get("x-request-id").is_some());
    assert_eq!(raw_body(res).await, b"ok".to_vec());
}

#[tokio::test]
async fn request_id_is_preserved_when_provided() {
    let (_dir, app) = test_app();

    let provided = HeaderValue::from_static("req-test-123");
    let res = send(
        &app,
        Request::builder()
            .uri("/health")
            .header("x-request-id", provided.clone())
            .body(Body::empty())
            .unwrap(),
    )
    .await;

    assert_eq!(res.headers().get("x-request-id").unwrap(), &provided);
}

#[tokio::test]
async fn chunk_upload_returns_ack() {
    let (_dir, app) = test_app();

    let res = put_chunk(&app, "clip.mp4", 3, b"abcdef").await;
    assert_eq!(res.status().as_u16(), 200);

    let body = json_body(res).await;
    assert_eq!(body["upload_id"], "clip.mp4");
    assert_eq!(body["chunk_index"], 3);
    assert_eq!(body["size_bytes"], 6);
    assert_eq!(body["chunks_received"], 1);
}

#[tokio::test]
async fn complete_creates_object_and_repeats_idempotently() {
    let (_dir, app) = test_app();

    put_chunk(&app, "clip.mp4", 0, b"hello ").await;
    put_chunk(&app, "clip.mp4", 1, b"world").await;

    let res = complete(&app, "clip.mp4", json!({"totalChunks": 2, "tags": ["demo"]})).await;
    assert_eq!(res.status().as_u16(), 201);
    let created = json_body(res).await;
    assert_eq!(created["id"], "clip.mp4");
    assert_eq!(created["size_bytes"], 11);
    assert_eq!(created["content_type"], "video/mp4");
    assert_eq!(created["metadata"]["tags"], json!(["demo"]));

    let res = complete(&app, "clip.mp4", json!({"totalChunks": 2})).await;
    assert_eq!(res.status().as_u16(), 200);
    let repeated = json_body(res).await;
    assert_eq!(repeated["id"], created["id"]);
    assert_eq!(repeated["created_at"], created["created_at"]);
}

#[tokio::test]
async fn missing_chunk_is_conflict_with_index() {
    let (_dir, app) = test_app();

    put_chunk(&app, "gap.webm", 0, b"a").await;
    put_chunk(&app, "gap.webm", 2, b"c").await;

    let res = complete(&app, "gap.webm", json!({"totalChunks": 3})).await;
    assert_eq!(res.status().as_u16(), 409);
    let body = json_body(res).await;
    assert_eq!(body["name"], "Conflict");
    assert_eq!(body["className"], "conflict");
    assert_eq!(body["code"], 409);
    assert_eq!(body["retryable"], true);
    assert_eq!(body["data"]["kind"], "IncompleteUpload");
    assert_eq!(body["data"]["missingIndex"], 1);

    let res = send(&app, get_media("gap.webm", None)).await;
    assert_eq!(res.status().as_u16(), 404);
}

#[tokio::test]
async fn malformed_json_returns_bad_request() {
    let (_dir, app) = test_app();

    let res = send(
        &app,
        Request::builder()
            .method("POST")
            .uri("/uploads/clip.mp4/complete")
            .header("content-type", "application/json")
            .body(Body::from("{\"totalChunks\":"))
            .unwrap(),
    )
    .await;

    assert_eq!(res.status().as_u16(), 400);
    let body = json_body(res).await;
    assert_eq!(body["name"], "BadRequest");
    assert_eq!(body["className"], "bad-request");
    assert!(body.get("errors").is_some());
}

#[tokio::test]
async fn invalid_identifiers_are_rejected() {
    let (_dir, app) = test_app();

    let res = put_chunk(&app, "..secret", 0, b"x").await;
    assert_eq!(res.status().as_u16(), 400);

    let res = put_chunk(&app, "clip.mp4", 0, b"x").await;
    assert_eq!(res.status().as_u16(), 200);

    let res = send(
        &app,
        Request::builder()
            .method("PUT")
            .uri("/uploads/clip.mp4/chunks/first")
            .body(Body::from("x"))
            .unwrap(),
    )
    .await;
    assert_eq!(res.status().as_u16(), 400);
    assert_eq!(json_body(res).await["data"]["kind"], "InvalidRequest");
}

#[tokio::test]
async fn range_requests_return_partial_content() {
    let (_dir, app) = test_app();
    published(&app, "trailer.mp4").await;

    let res = send(&app, get_media("trailer.mp4", Some("bytes=2-5"))).await;
    assert_eq!(res.status().as_u16(), 206);
    assert_eq!(res.headers()["content-range"], "bytes 2-5/10");
    assert_eq!(res.headers()["content-length"], "4");
    assert_eq!(res.headers()["accept-ranges"], "bytes");
    assert_eq!(res.headers()["content-type"], "video/mp4");
    assert_eq!(raw_body(res).await, b"2345".to_vec());

    let res = send(&app, get_media("trailer.mp4", None)).await;
    assert_eq!(res.status().as_u16(), 200);
    assert_eq!(res.headers()["content-length"], "10");
    assert_eq!(raw_body(res).await, b"0123456789".to_vec());
}

#[tokio::test]
async fn unsatisfiable_range_is_416() {
    let (_dir, app) = test_app();
    published(&app, "trailer.mp4").await;

    let res = send(&app, get_media("trailer.mp4", Some("bytes=20-30"))).await;
    assert_eq!(res.status().as_u16(), 416);
    assert_eq!(res.headers()["content-range"], "bytes */10");
    assert!(raw_body(res).await.is_empty());
}

#[tokio::test]
async fn head_reports_length_without_body() {
    let (_dir, app) = test_app();
    published(&app, "trailer.mp4").await;

    let res = send(
        &app,
        Request::builder()
            .method("HEAD")
            .uri("/media/trailer.mp4")
            .body(Body::empty())
            .unwrap(),
    )
    .await;

    assert_eq!(res.status().as_u16(), 200);
    assert_eq!(res.headers()["content-length"], "10");
    assert!(raw_body(res).await.is_empty());
}

#[tokio::test]
async fn unknown_media_is_not_found() {
    let (_dir, app) = test_app();

    for range in [None, Some("bytes=0-1")] {
        let res = send(&app, get_media("missing.mp4", range)).await;
        assert_eq!(res.status().as_u16(), 404);
        let body = json_body(res).await;
        assert_eq!(body["name"], "NotFound");
        assert_eq!(body["className"], "not-found");
        assert_eq!(body["retryable"], false);
    }
}

#[tokio::test]
async fn status_and_abort_lifecycle() {
    let (_dir, app) = test_app();
    put_chunk(&app, "draft.mov", 0, b"abc").await;
    put_chunk(&app, "draft.mov", 4, b"de").await;

    let status = || Request::builder().uri("/uploads/draft.mov").body(Body::empty()).unwrap();

    let res = send(&app, status()).await;
    assert_eq!(res.status().as_u16(), 200);
    let body = json_body(res).await;
    assert_eq!(body["state"], "open");
    assert_eq!(body["received"], json!({"0": 3, "4": 2}));

    let res = send(
        &app,
        Request::builder()
            .method("DELETE")
            .uri("/uploads/draft.mov")
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(res.status().as_u16(), 204);

    let res = send(&app, status()).await;
    assert_eq!(res.status().as_u16(), 404);
}

#[tokio::test]
async fn chunks_after_completion_are_sealed() {
    let (_dir, app) = test_app();
    published(&app, "final.mp3").await;

    let res = put_chunk(&app, "final.mp3", 2, b"late").await;
    assert_eq!(res.status().as_u16(), 409);
    let body = json_body(res).await;
    assert_eq!(body["data"]["kind"], "UploadSealed");
    assert_eq!(body["retryable"], false);
}
