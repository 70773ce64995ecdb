#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use http_body_util::BodyExt;
use serde_json::Value;
use sqlx::PgPool;
use tower::ServiceExt;

use verifywise::config::{AuthMode, BlobBackend, Config};
use verifywise::files::FileStore;
use verifywise::store::AppState;

pub const ADMIN_TOKEN: &str = "vw_test_admin_token";

/// Config with test defaults: no control seeding, in-memory blobs.
pub fn test_config(auth_mode: AuthMode) -> Config {
    Config {
        listen: "127.0.0.1:0".into(),
        database_url: "postgres://localhost/test".into(),
        auth_mode,
        admin_token: Some(ADMIN_TOKEN.into()),
        db_max_connections: 5,
        db_acquire_timeout: Duration::from_secs(5),
        request_timeout: Duration::from_secs(30),
        max_upload_bytes: 1024 * 1024,
        blob_backend: BlobBackend::Memory,
        blob_root: std::env::temp_dir(),
        s3_endpoint: "http://localhost:9000".into(),
        s3_bucket: "test".into(),
        s3_access_key: "test".into(),
        s3_secret_key: "test".into(),
        cors_origins: vec![],
        trust_proxy_headers: false,
        seed_controls: false,
    }
}

pub fn memory_file_store(pool: PgPool, max_bytes: usize) -> FileStore {
    let blobs = opendal::Operator::new(opendal::services::Memory::default())
        .expect("memory operator")
        .finish();
    FileStore::new(pool, blobs, max_bytes)
}

/// Build a test `AppState` with auth disabled.
pub async fn test_state(pool: PgPool) -> AppState {
    test_state_with(pool, test_config(AuthMode::Disabled)).await
}

pub async fn test_state_with(pool: PgPool, config: Config) -> AppState {
    verifywise::store::bootstrap::run(&pool, &config)
        .await
        .expect("bootstrap failed");

    AppState {
        pool: pool.clone(),
        files: memory_file_store(pool, config.max_upload_bytes),
        config: Arc::new(config),
    }
}

pub fn test_router(state: AppState) -> Router {
    verifywise::api::app(state)
}

/// Insert a control row directly. Returns its id.
pub async fn insert_control(pool: &PgPool, id: i32, title: &str) -> i32 {
    sqlx::query_scalar("INSERT INTO controls (id, title) VALUES ($1, $2) RETURNING id")
        .bind(id)
        .bind(title)
        .fetch_one(pool)
        .await
        .expect("insert control")
}

/// Insert a `files` metadata row without a blob. Returns its id.
pub async fn insert_file(pool: &PgPool, filename: &str) -> i32 {
    sqlx::query_scalar(
        "INSERT INTO files (filename, size_bytes, sha256) VALUES ($1, 0, '') RETURNING id",
    )
    .bind(filename)
    .fetch_one(pool)
    .await
    .expect("insert file")
}

pub async fn count(pool: &PgPool, table: &str) -> i64 {
    sqlx::query_scalar(&format!("SELECT COUNT(*) FROM {table}"))
        .fetch_one(pool)
        .await
        .expect("count")
}

fn authed(builder: axum::http::request::Builder, token: &str) -> axum::http::request::Builder {
    if token.is_empty() {
        builder
    } else {
        builder.header("Authorization", format!("Bearer {token}"))
    }
}

/// Send a GET request with Bearer auth.
pub async fn get_json(app: &Router, token: &str, path: &str) -> (StatusCode, Value) {
    let req = authed(Request::builder().method("GET").uri(path), token)
        .body(Body::empty())
        .unwrap();
    send(app, req).await
}

/// Send a GET request and return the raw body with its content type.
pub async fn get_bytes(app: &Router, path: &str) -> (StatusCode, Option<String>, Vec<u8>) {
    let req = Request::builder()
        .method("GET")
        .uri(path)
        .body(Body::empty())
        .unwrap();
    let resp = app.clone().oneshot(req).await.unwrap();
    let status = resp.status();
    let content_type = resp
        .headers()
        .get("content-type")
        .and_then(|v| v.to_str().ok())
        .map(str::to_owned);
    let bytes = resp.into_body().collect().await.unwrap().to_bytes();
    (status, content_type, bytes.to_vec())
}

async fn send_json(
    app: &Router,
    method: &str,
    token: &str,
    path: &str,
    body: &Value,
) -> (StatusCode, Value) {
    let req = authed(
        Request::builder()
            .method(method)
            .uri(path)
            .header("Content-Type", "application/json"),
        token,
    )
    .body(Body::from(serde_json::to_string(body).unwrap()))
    .unwrap();
    send(app, req).await
}

/// Send a POST request with Bearer auth and JSON body.
pub async fn post_json(app: &Router, token: &str, path: &str, body: Value) -> (StatusCode, Value) {
    send_json(app, "POST", token, path, &body).await
}

/// Send a PUT request with Bearer auth and JSON body.
pub async fn put_json(app: &Router, token: &str, path: &str, body: Value) -> (StatusCode, Value) {
    send_json(app, "PUT", token, path, &body).await
}

/// Send a DELETE request with Bearer auth.
pub async fn delete_json(app: &Router, token: &str, path: &str) -> (StatusCode, Value) {
    let req = authed(Request::builder().method("DELETE").uri(path), token)
        .body(Body::empty())
        .unwrap();
    send(app, req).await
}

const BOUNDARY: &str = "----verifywise-test-boundary";

/// `fields` are `(name, value)` text parts; `files` are
/// `(field name, file name, content)` file parts.
fn multipart_body(fields: &[(&str, &str)], files: &[(&str, &str, &str)]) -> Vec<u8> {
    let mut body = String::new();
    for (name, value) in fields {
        body.push_str(&format!(
            "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n"
        ));
    }
    for (name, file_name, content) in files {
        body.push_str(&format!(
            "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{name}\"; filename=\"{file_name}\"\r\n\
             Content-Type: text/plain\r\n\r\n{content}\r\n"
        ));
    }
    body.push_str(&format!("--{BOUNDARY}--\r\n"));
    body.into_bytes()
}

/// Send a multipart POST request with Bearer auth.
pub async fn post_multipart(
    app: &Router,
    token: &str,
    path: &str,
    fields: &[(&str, &str)],
    files: &[(&str, &str, &str)],
) -> (StatusCode, Value) {
    let req = authed(
        Request::builder()
            .method("POST")
            .uri(path)
            .header(
                "Content-Type",
                format!("multipart/form-data; boundary={BOUNDARY}"),
            ),
        token,
    )
    .body(Body::from(multipart_body(fields, files)))
    .unwrap();
    send(app, req).await
}

async fn send(app: &Router, req: Request<Body>) -> (StatusCode, Value) {
    let resp = app.clone().oneshot(req).await.unwrap();
    let status = resp.status();
    let bytes = resp.into_body().collect().await.unwrap().to_bytes();
    if bytes.is_empty() {
        return (status, Value::Null);
    }
    let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, body)
}
