//! Common test utilities for E2E testing with mocks.
//!
//! This module provides a test fixture that creates an in-process server
//! with mock extractor and transcoder injected, so the HTTP surface can be
//! driven without `yt-dlp` or `ffmpeg`.

#![allow(dead_code)]

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::Value;
use tempfile::TempDir;
use tower::ServiceExt;

use yoink_core::{
    testing::{MockExtractor, MockTranscoder},
    Config, Extractor, HistoryStore, JobService, LedgerStore, Presets, ServiceDeps,
    SettingsStore, SqliteHistoryStore, SqliteLedgerStore, SqliteSettingsStore, Transcoder,
};
use yoink_server::state::AppState;

/// Re-export fixtures for test convenience
pub use yoink_core::testing::fixtures;

/// Test fixture for E2E testing with mock dependencies.
///
/// # Example
///
/// ```rust,ignore
/// #[tokio::test]
/// async fn test_download() {
///     let fixture = TestFixture::new().await;
///
///     let response = fixture.post("/api/v1/downloads", json!({
///         "url": "https://www.youtube.com/watch?v=abc"
///     })).await;
///
///     assert_eq!(response.status, 202);
/// }
/// ```
pub struct TestFixture {
    /// The Axum router for testing
    pub router: Router,
    pub state: Arc<AppState>,
    pub service: Arc<JobService>,
    /// Mock extractor - script per-URL outcomes and playlists
    pub extractor: Arc<MockExtractor>,
    pub transcoder: Arc<MockTranscoder>,
    pub ledger: Arc<SqliteLedgerStore>,
    /// Temporary directory for test database, downloads and cookies
    pub temp_dir: TempDir,
}

/// Response from a test request
#[derive(Debug)]
pub struct TestResponse {
    pub status: StatusCode,
    pub body: Value,
}

impl TestFixture {
    /// Create a new test fixture with default mocks.
    pub async fn new() -> Self {
        Self::with_config(|_| {}).await
    }

    /// Create a test fixture with adjusted configuration.
    pub async fn with_config(adjust: impl FnOnce(&mut Config)) -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let db_path = temp_dir.path().join("test.db");

        let mut config = Config::default();
        config.database.path = db_path.clone();
        config.extractor.downloads_dir = temp_dir.path().join("downloads");
        config.extractor.cookies_file = temp_dir.path().join("cookies.txt");
        config.workers.max_concurrent = 2;
        config.retry.transient_backoff_ms = 20;
        config.retry.unknown_delay_ms = 5;
        adjust(&mut config);

        // Create stores
        let ledger = Arc::new(SqliteLedgerStore::new(&db_path).expect("Failed to create ledger"));
        let history: Arc<dyn HistoryStore> =
            Arc::new(SqliteHistoryStore::new(&db_path).expect("Failed to create history"));
        let settings: Arc<dyn SettingsStore> =
            Arc::new(SqliteSettingsStore::new(&db_path).expect("Failed to create settings"));

        // Create mocks
        let extractor = Arc::new(MockExtractor::new());
        let transcoder = Arc::new(MockTranscoder::new());

        let service = Arc::new(JobService::new(
            &config,
            ServiceDeps {
                ledger: Arc::clone(&ledger) as Arc<dyn LedgerStore>,
                history: Arc::clone(&history),
                extractor: Arc::clone(&extractor) as Arc<dyn Extractor>,
                transcoder: Arc::clone(&transcoder) as Arc<dyn Transcoder>,
            },
        ));
        service.start();

        // Create app state
        let state = Arc::new(AppState::new(
            config,
            Arc::clone(&service),
            history,
            Presets::new(settings),
        ));

        // Create router
        let router = yoink_server::api::create_router(Arc::clone(&state));

        Self {
            router,
            state,
            service,
            extractor,
            transcoder,
            ledger,
            temp_dir,
        }
    }

    pub fn cookies_path(&self) -> PathBuf {
        self.temp_dir.path().join("cookies.txt")
    }

    /// Send a GET request to the test server.
    pub async fn get(&self, path: &str) -> TestResponse {
        self.request("GET", path, None).await
    }

    /// Send a POST request with JSON body.
    pub async fn post(&self, path: &str, body: Value) -> TestResponse {
        self.request("POST", path, Some(body)).await
    }

    /// Send a DELETE request.
    pub async fn delete(&self, path: &str) -> TestResponse {
        self.request("DELETE", path, None).await
    }

    /// Send a PUT request with a plain text body.
    pub async fn put_text(&self, path: &str, body: &str) -> TestResponse {
        self.request_raw("PUT", path, Body::from(body.to_string()), "text/plain")
            .await
    }

    /// Send a POST request with raw string body (for testing malformed JSON).
    pub async fn post_raw(&self, path: &str, body: &str) -> TestResponse {
        self.request_raw("POST", path, Body::from(body.to_string()), "application/json")
            .await
    }

    /// Upload one file as multipart field `file`.
    pub async fn post_file(&self, path: &str, file_name: &str, contents: &[u8]) -> TestResponse {
        let boundary = "yoink-test-boundary";
        let mut body = Vec::new();
        body.extend_from_slice(
            format!(
                "--{b}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"{f}\"\r\n\
                 Content-Type: application/octet-stream\r\n\r\n",
                b = boundary,
                f = file_name
            )
            .as_bytes(),
        );
        body.extend_from_slice(contents);
        body.extend_from_slice(format!("\r\n--{}--\r\n", boundary).as_bytes());

        self.request_raw(
            "POST",
            path,
            Body::from(body),
            &format!("multipart/form-data; boundary={}", boundary),
        )
        .await
    }

    /// Send a GET request and return the raw body as text.
    pub async fn get_text(&self, path: &str) -> (StatusCode, String) {
        let request = Request::builder()
            .method("GET")
            .uri(path)
            .body(Body::empty())
            .unwrap();

        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("Failed to send request");

        let status = response.status();
        let bytes = response
            .into_body()
            .collect()
            .await
            .expect("Failed to collect body")
            .to_bytes();
        (status, String::from_utf8_lossy(&bytes).into_owned())
    }

    /// Poll a job until it reaches a terminal status.
    pub async fn wait_for_terminal(&self, job_id: &str, timeout: Duration) -> Value {
        let start = Instant::now();
        loop {
            let response = self.get(&format!("/api/v1/downloads/{}", job_id)).await;
            let status = response.body["status"].as_str().unwrap_or_default().to_string();
            if matches!(status.as_str(), "done" | "error" | "timeout" | "cancelled") {
                return response.body;
            }
            assert!(
                start.elapsed() < timeout,
                "job {} did not finish in time, last status {}",
                job_id,
                status
            );
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    }

    /// Send a request with a prepared body and content type.
    async fn request_raw(
        &self,
        method: &str,
        path: &str,
        body: Body,
        content_type: &str,
    ) -> TestResponse {
        let request = Request::builder()
            .method(method)
            .uri(path)
            .header("Content-Type", content_type)
            .body(body)
            .unwrap();

        self.send(request).await
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
        self.send(request).await
    }

    async fn send(&self, request: Request<Body>) -> TestResponse {
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
