//! Common test utilities for driving the router in-process.
//!
//! The fixture builds the real router on top of either a file-backed SQLite
//! session in a temp directory or an in-memory session whose availability the
//! test controls.

#![allow(dead_code)]

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::Value;
use tempfile::TempDir;
use tower::ServiceExt;

use bangumi_torrent_core::{
    testing::MemorySession, Config, DatabaseConfig, SqliteSession, TorrentSession,
};
use bangumi_torrent_server::{api::create_router, state::AppState};

/// Re-export fixtures for test convenience
pub use bangumi_torrent_core::testing::fixtures;

/// Test fixture for in-process API testing.
///
/// # Example
///
/// ```rust,ignore
/// #[tokio::test]
/// async fn test_add_torrent() {
///     let fixture = TestFixture::new();
///
///     let response = fixture.post("/api/v1/torrents", json!({
///         "name": "Show - 01",
///         "url": "https://example.org/1.torrent"
///     })).await;
///
///     assert_eq!(response.status, 201);
/// }
/// ```
pub struct TestFixture {
    /// The Axum router for testing
    pub router: Router,
    /// In-memory session, when the fixture was built with one
    pub memory: Option<Arc<MemorySession>>,
    /// Temporary directory holding the SQLite database
    pub temp_dir: TempDir,
}

/// Response from a test request
#[derive(Debug)]
pub struct TestResponse {
    pub status: StatusCode,
    pub body: Value,
}

impl TestFixture {
    /// Create a fixture backed by a SQLite file in a temp directory.
    pub fn new() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let db_path = temp_dir.path().join("test.db");

        let session: Arc<dyn TorrentSession> =
            Arc::new(SqliteSession::new(&db_path).expect("Failed to open SQLite session"));

        let config = Config {
            database: DatabaseConfig { path: db_path },
            ..Default::default()
        };

        Self {
            router: create_router(Arc::new(AppState::new(config, session))),
            memory: None,
            temp_dir,
        }
    }

    /// Create a fixture backed by an in-memory session.
    pub fn with_memory_session() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let memory = Arc::new(MemorySession::new());
        let session = Arc::clone(&memory) as Arc<dyn TorrentSession>;

        Self {
            router: create_router(Arc::new(AppState::new(Config::default(), session))),
            memory: Some(memory),
            temp_dir,
        }
    }

    /// The in-memory session. Panics for SQLite-backed fixtures.
    pub fn memory(&self) -> &MemorySession {
        self.memory
            .as_deref()
            .expect("Fixture was not built with a memory session")
    }

    /// Send a GET request to the test server.
    pub async fn get(&self, path: &str) -> TestResponse {
        self.request("GET", path, None).await
    }

    /// Send a POST request with JSON body.
    pub async fn post(&self, path: &str, body: Value) -> TestResponse {
        self.request("POST", path, Some(body)).await
    }

    /// Send a PUT request with JSON body.
    pub async fn put(&self, path: &str, body: Value) -> TestResponse {
        self.request("PUT", path, Some(body)).await
    }

    /// Send a DELETE request.
    pub async fn delete(&self, path: &str) -> TestResponse {
        self.request("DELETE", path, None).await
    }

    /// Send a request to the test server.
    async fn request(&self, method: &str, path: &str, body: Option<Value>) -> TestResponse {
        let mut request_builder = Request::builder().method(method).uri(path);

        let body = if let Some(json_body) = body {
            request_builder = request_builder.header("Content-Type", "application/json");
            Body::from(serde_json::to_vec(&json_body).unwrap())
        } else {
            Body::empty()
        };

        let request = request_builder.body(body).unwrap();

        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("Failed to send request");

        let status = response.status();
        let body_bytes = response
            .into_body()
            .collect()
            .await
            .expect("Failed to collect body")
            .to_bytes();

        let body: Value = if body_bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&body_bytes).unwrap_or(Value::Null)
        };

        TestResponse { status, body }
    }
}

/// Helper to assert a response has expected status.
#[macro_export]
macro_rules! assert_status {
    ($response:expr, $status:expr) => {
        assert_eq!(
            $response.status, $status,
            "Expected status {:?}, got {:?}. Body: {}",
            $status,
            $response.status,
            serde_json::to_string_pretty(&$response.body).unwrap_or_default()
        );
    };
}
