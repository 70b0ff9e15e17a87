use std::sync::Arc;

use axum::Router;
use attachments_core::Capability;
use attachments_db::{Database, SqliteDatabase};
use attachments_service::AttachmentService;
use attachments_store::StoreConfig;
use tokio::net::TcpListener;

use crate::auth::AuthConfig;

/// Service over in-memory SQLite and a temp local store.
pub fn test_service(db: Arc<dyn Database>) -> AttachmentService {
    let store_config = StoreConfig {
        local_data_dir: Some(
            tempfile::tempdir()
                .unwrap()
                .keep()
                .to_string_lossy()
                .to_string(),
        ),
    };
    let store = attachments_store::create_store(&store_config).unwrap();
    AttachmentService::new(db, store)
}

/// Build a test router with no auth: every request runs as the local superuser.
pub async fn test_router() -> Router {
    let db = Arc::new(SqliteDatabase::open_in_memory().unwrap());
    crate::router(test_service(db), None)
}

/// Build a test router with an env key, returning (router, api_key).
pub async fn test_router_with_auth() -> (Router, String) {
    let db = Arc::new(SqliteDatabase::open_in_memory().unwrap());
    let api_key = crate::auth::generate_api_key();
    let auth = Arc::new(AuthConfig {
        env_key_hash: Some(crate::auth::sha256_hex(&api_key)),
        db: db.clone(),
    });
    (crate::router(test_service(db), Some(auth)), api_key)
}

/// Build a test router with one DB-backed key per `(name, capabilities)`,
/// returning the raw keys in the same order.
pub async fn test_router_with_keys(keys: Vec<(&str, Vec<Capability>)>) -> (Router, Vec<String>) {
    let db = Arc::new(SqliteDatabase::open_in_memory().unwrap());
    let mut raw_keys = Vec::with_capacity(keys.len());
    for (name, caps) in keys {
        let raw = crate::auth::generate_api_key();
        db.insert_api_key(name, &crate::auth::sha256_hex(&raw), &caps)
            .await
            .unwrap();
        raw_keys.push(raw);
    }
    let auth = crate::auth::build_auth_config_with_key(db.clone(), None)
        .await
        .unwrap();
    (crate::router(test_service(db), auth), raw_keys)
}

/// A running test server with base_url and background task handle.
pub struct TestServer {
    pub base_url: String,
    _handle: tokio::task::JoinHandle<()>,
}

/// Spawn an axum test server on a random port.
pub async fn spawn_test_server() -> TestServer {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let base_url = format!("http://{addr}");
    let app = test_router().await;
    let handle = tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    TestServer {
        base_url,
        _handle: handle,
    }
}
