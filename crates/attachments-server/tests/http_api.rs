use attachments_core::Capability;
use attachments_server::test_helpers::{spawn_test_server, test_router, test_router_with_keys};
use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use serde_json::Value;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tower::ServiceExt;

const BOUNDARY: &str = "----attachments-test-boundary";

/// Build a multipart body. `file` is `(filename, contents)`.
fn multipart_body(file: Option<(&str, &str)>, tag: Option<&str>, next: Option<&str>) -> String {
    let mut body = String::new();
    if let Some((filename, contents)) = file {
        body.push_str(&format!(
            "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"attachment_file\"; filename=\"{filename}\"\r\nContent-Type: application/octet-stream\r\n\r\n{contents}\r\n"
        ));
    }
    if let Some(tag) = tag {
        body.push_str(&format!(
            "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"tag\"\r\n\r\n{tag}\r\n"
        ));
    }
    if let Some(next) = next {
        body.push_str(&format!(
            "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"next\"\r\n\r\n{next}\r\n"
        ));
    }
    body.push_str(&format!("--{BOUNDARY}--\r\n"));
    body
}

fn upload_request(uri: &str, key: Option<&str>, body: String) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri(uri)
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={BOUNDARY}"),
        );
    if let Some(key) = key {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {key}"));
    }
    builder.body(Body::from(body)).unwrap()
}

fn get_request(uri: &str, key: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().uri(uri);
    if let Some(key) = key {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {key}"));
    }
    builder.body(Body::empty()).unwrap()
}

fn delete_request(id: &str, key: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri(format!("/attachments/delete/{id}"));
    if let Some(key) = key {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {key}"));
    }
    builder.body(Body::empty()).unwrap()
}

async fn json_body(resp: axum::response::Response) -> Value {
    let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

async fn upload(app: &Router, key: Option<&str>, filename: &str, tag: &str) -> Value {
    let resp = app
        .clone()
        .oneshot(upload_request(
            "/attachments/add-for/project/42",
            key,
            multipart_body(Some((filename, "hello")), Some(tag), None),
        ))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::CREATED);
    json_body(resp).await
}

#[tokio::test]
async fn health_is_public() {
    let app = test_router().await;
    let resp = app.oneshot(get_request("/api/health", None)).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(json_body(resp).await["status"], "ok");
}

#[tokio::test]
async fn upload_creates_record_at_target_path() {
    let app = test_router().await;
    let att = upload(&app, None, "report.pdf", "draft").await;
    assert_eq!(att["target_type"], "project");
    assert_eq!(att["target_id"], "42");
    assert_eq!(att["file_key"], "attachments/project/42/report.pdf");
    assert_eq!(att["tag"], "draft");
    assert_eq!(att["creator"], "local");
    assert_eq!(att["size_bytes"], 5);
}

#[tokio::test]
async fn upload_with_next_redirects() {
    let app = test_router().await;
    let resp = app
        .oneshot(upload_request(
            "/attachments/add-for/project/42",
            None,
            multipart_body(Some(("a.txt", "x")), Some("draft"), Some("/projects/42")),
        ))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::SEE_OTHER);
    assert_eq!(resp.headers()[header::LOCATION], "/projects/42");
}

#[tokio::test]
async fn upload_ignores_offsite_next() {
    let app = test_router().await;
    let resp = app
        .oneshot(upload_request(
            "/attachments/add-for/project/42",
            None,
            multipart_body(Some(("a.txt", "x")), Some("draft"), Some("https://evil.example/")),
        ))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::CREATED);
}

#[tokio::test]
async fn upload_validation_errors_are_reported_per_field() {
    let app = test_router().await;
    let long_tag = "t".repeat(31);
    let resp = app
        .clone()
        .oneshot(upload_request(
            "/attachments/add-for/project/42",
            None,
            multipart_body(Some(("a.txt", "x")), Some(&long_tag), None),
        ))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let body = json_body(resp).await;
    assert!(body["fields"]["tag"][0].as_str().unwrap().contains("at most 30"));

    let resp = app
        .oneshot(upload_request(
            "/attachments/add-for/project/42",
            None,
            multipart_body(None, None, Some("")),
        ))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let body = json_body(resp).await;
    assert!(body["fields"]["attachment_file"].is_array());
    assert!(body["fields"]["tag"].is_array());
}

#[tokio::test]
async fn upload_rejects_bad_target_segments() {
    let app = test_router().await;
    let resp = app
        .oneshot(upload_request(
            "/attachments/add-for/project/..",
            None,
            multipart_body(Some(("a.txt", "x")), Some("draft"), None),
        ))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn same_filename_gets_distinct_keys() {
    let app = test_router().await;
    let first = upload(&app, None, "report.pdf", "draft").await;
    let second = upload(&app, None, "report.pdf", "final").await;
    assert_eq!(first["file_key"], "attachments/project/42/report.pdf");
    assert_ne!(first["file_key"], second["file_key"]);
    let key = second["file_key"].as_str().unwrap();
    assert!(key.starts_with("attachments/project/42/report_"));
    assert!(key.ends_with(".pdf"));
}

#[tokio::test]
async fn list_returns_newest_first() {
    let app = test_router().await;
    upload(&app, None, "a.txt", "one").await;
    upload(&app, None, "b.txt", "two").await;

    let resp = app
        .clone()
        .oneshot(get_request("/attachments/for/project/42", None))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let list = json_body(resp).await;
    let tags: Vec<&str> = list
        .as_array()
        .unwrap()
        .iter()
        .map(|a| a["tag"].as_str().unwrap())
        .collect();
    assert_eq!(tags, vec!["two", "one"]);

    let resp = app
        .oneshot(get_request("/attachments/for/project/7", None))
        .await
        .unwrap();
    assert_eq!(json_body(resp).await, serde_json::json!([]));
}

#[tokio::test]
async fn download_returns_file_bytes() {
    let app = test_router().await;
    let att = upload(&app, None, "report.pdf", "draft").await;
    let id = att["id"].as_str().unwrap();

    let resp = app
        .clone()
        .oneshot(get_request(&format!("/attachments/{id}/file"), None))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(
        resp.headers()[header::CONTENT_DISPOSITION],
        "attachment; filename=\"report.pdf\""
    );
    let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    assert_eq!(&bytes[..], b"hello");

    let resp = app
        .oneshot(get_request("/attachments/missing/file", None))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn delete_removes_record_and_file() {
    let app = test_router().await;
    let att = upload(&app, None, "report.pdf", "draft").await;
    let id = att["id"].as_str().unwrap();

    let resp = app.clone().oneshot(delete_request(id, None)).await.unwrap();
    assert_eq!(resp.status(), StatusCode::NO_CONTENT);

    let resp = app
        .clone()
        .oneshot(get_request(&format!("/attachments/{id}/file"), None))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);

    let resp = app.oneshot(delete_request(id, None)).await.unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn delete_with_form_next_redirects() {
    let app = test_router().await;
    let att = upload(&app, None, "report.pdf", "draft").await;
    let id = att["id"].as_str().unwrap();

    let resp = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri(format!("/attachments/delete/{id}"))
                .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
                .body(Body::from("next=%2Fprojects%2F42"))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::SEE_OTHER);
    assert_eq!(resp.headers()[header::LOCATION], "/projects/42");
}

#[tokio::test]
async fn capabilities_gate_upload_and_delete() {
    let (app, keys) = test_router_with_keys(vec![
        ("alice", vec![Capability::AddAttachment, Capability::DeleteAttachment]),
        ("bob", vec![Capability::DeleteAttachment]),
        ("carol", vec![Capability::DeleteForeignAttachments]),
        ("dave", vec![]),
    ])
    .await;
    let (alice, bob, carol, dave) = (&keys[0], &keys[1], &keys[2], &keys[3]);

    // Upload requires add_attachment.
    let resp = app
        .clone()
        .oneshot(upload_request(
            "/attachments/add-for/project/42",
            Some(bob),
            multipart_body(Some(("a.txt", "x")), Some("draft"), None),
        ))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);

    let first = upload(&app, Some(alice), "a.txt", "draft").await;
    assert_eq!(first["creator"], "alice");
    let second = upload(&app, Some(alice), "b.txt", "final").await;

    // Plain delete needs ownership.
    let resp = app
        .clone()
        .oneshot(delete_request(first["id"].as_str().unwrap(), Some(bob)))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);

    let resp = app
        .clone()
        .oneshot(delete_request(first["id"].as_str().unwrap(), Some(dave)))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);

    let resp = app
        .clone()
        .oneshot(delete_request(first["id"].as_str().unwrap(), Some(alice)))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::NO_CONTENT);

    // delete_foreign_attachments overrides ownership.
    let resp = app
        .oneshot(delete_request(second["id"].as_str().unwrap(), Some(carol)))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::NO_CONTENT);
}

#[tokio::test]
async fn replace_swaps_file_and_tag() {
    let app = test_router().await;
    let att = upload(&app, None, "draft.txt", "draft").await;
    let id = att["id"].as_str().unwrap();

    let resp = app
        .clone()
        .oneshot(upload_request(
            &format!("/attachments/{id}/replace"),
            None,
            multipart_body(Some(("final.txt", "done")), Some("final"), None),
        ))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let updated = json_body(resp).await;
    assert_eq!(updated["id"], att["id"]);
    assert_eq!(updated["tag"], "final");
    assert_eq!(updated["file_key"], "attachments/project/42/final.txt");
    assert_eq!(updated["creator"], att["creator"]);

    let resp = app
        .oneshot(get_request(&format!("/attachments/{id}/file"), None))
        .await
        .unwrap();
    let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    assert_eq!(&bytes[..], b"done");
}

#[tokio::test]
async fn served_over_tcp() {
    let server = spawn_test_server().await;
    let addr = server.base_url.trim_start_matches("http://");
    let mut stream = tokio::net::TcpStream::connect(addr).await.unwrap();
    stream
        .write_all(b"GET /api/health HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n")
        .await
        .unwrap();
    let mut response = String::new();
    stream.read_to_string(&mut response).await.unwrap();
    assert!(response.starts_with("HTTP/1.1 200"));
    assert!(response.contains("\"status\":\"ok\""));
}
