use std::io::Write;
use std::net::TcpListener;
use std::path::Path;
use std::time::Duration;

use reqwest::Client;
use tempfile::{NamedTempFile, TempDir};
use tokio::time::{sleep, timeout};

fn get_available_port() -> u16 {
    TcpListener::bind("127.0.0.1:0")
        .unwrap()
        .local_addr()
        .unwrap()
        .port()
}

/// Create a minimal valid config rooted in `dir`
fn minimal_config(port: u16, dir: &Path) -> String {
    format!(
        r#"
[server]
host = "127.0.0.1"
port = {port}

[database]
path = "{db}"

[extractor]
ytdlp_path = "/nonexistent/yt-dlp"
downloads_dir = "{downloads}"
cookies_file = "{cookies}"

[transcoder]
ffmpeg_path = "/nonexistent/ffmpeg"
"#,
        port = port,
        db = dir.join("yoink.db").display(),
        downloads = dir.join("downloads").display(),
        cookies = dir.join("cookies.txt").display(),
    )
}

fn write_config(content: &str) -> NamedTempFile {
    let mut temp_file = NamedTempFile::new().unwrap();
    temp_file.write_all(content.as_bytes()).unwrap();
    temp_file.flush().unwrap();
    temp_file
}

/// Start the binary against `config_path` with extra environment overrides.
fn spawn_server(config_path: &Path, env: &[(&str, &str)]) -> tokio::process::Child {
    let mut command = tokio::process::Command::new(env!("CARGO_BIN_EXE_yoink"));
    command
        .env("YOINK_CONFIG", config_path)
        .env("RUST_LOG", "error")
        .kill_on_drop(true);
    for (key, value) in env {
        command.env(key, value);
    }
    command.spawn().expect("Failed to spawn server")
}

/// Run the binary to completion; used for configs that must be rejected.
async fn run_to_exit(config_path: &str) -> std::process::Output {
    timeout(
        Duration::from_secs(5),
        tokio::process::Command::new(env!("CARGO_BIN_EXE_yoink"))
            .env("YOINK_CONFIG", config_path)
            .env("RUST_LOG", "error")
            .output(),
    )
    .await
    .expect("Command timed out")
    .expect("Failed to execute command")
}

async fn wait_for_server(port: u16) {
    let client = Client::new();
    for _ in 0..60 {
        if client
            .get(format!("http://127.0.0.1:{}/api/v1/health", port))
            .send()
            .await
            .is_ok()
        {
            return;
        }
        sleep(Duration::from_millis(50)).await;
    }
    panic!("Server on port {} did not start in time", port);
}

async fn get_json(port: u16, path: &str) -> serde_json::Value {
    let response = Client::new()
        .get(format!("http://127.0.0.1:{}/api/v1{}", port, path))
        .send()
        .await
        .expect("Failed to send request");
    assert!(response.status().is_success(), "GET {} failed", path);
    response.json().await.expect("Failed to parse JSON")
}

#[tokio::test]
async fn test_health_reports_running_pool() {
    let dir = TempDir::new().unwrap();
    let port = get_available_port();
    let config = write_config(&minimal_config(port, dir.path()));

    let mut server = spawn_server(config.path(), &[]);
    wait_for_server(port).await;

    let health = get_json(port, "/health").await;
    assert_eq!(health["status"], "ok");
    assert_eq!(health["workers"]["running"], true);
    assert!(dir.path().join("downloads").is_dir());

    server.kill().await.ok();
}

#[tokio::test]
async fn test_config_endpoint_hides_paths() {
    let dir = TempDir::new().unwrap();
    let port = get_available_port();
    let config = write_config(&minimal_config(port, dir.path()));

    let mut server = spawn_server(config.path(), &[]);
    wait_for_server(port).await;

    let sanitized = get_json(port, "/config").await;
    assert_eq!(sanitized["server"]["port"], port);
    assert_eq!(sanitized["extractor"]["cookies_configured"], false);
    assert!(sanitized.get("database").is_none());

    server.kill().await.ok();
}

#[tokio::test]
async fn test_env_overrides_worker_count() {
    let dir = TempDir::new().unwrap();
    let port = get_available_port();
    let config = write_config(&minimal_config(port, dir.path()));

    let mut server = spawn_server(config.path(), &[("YOINK_WORKERS__MAX_CONCURRENT", "7")]);
    wait_for_server(port).await;

    let health = get_json(port, "/health").await;
    assert_eq!(health["workers"]["workers"], 7);

    server.kill().await.ok();
}

#[tokio::test]
async fn test_relative_paths_follow_config_location() {
    let dir = TempDir::new().unwrap();
    let port = get_available_port();
    let config_path = dir.path().join("yoink.toml");
    std::fs::write(
        &config_path,
        format!(
            r#"
[server]
host = "127.0.0.1"
port = {port}

[database]
path = "state/yoink.db"

[extractor]
ytdlp_path = "/nonexistent/yt-dlp"
downloads_dir = "media"

[transcoder]
ffmpeg_path = "/nonexistent/ffmpeg"
"#
        ),
    )
    .unwrap();
    std::fs::create_dir_all(dir.path().join("state")).unwrap();

    let mut server = spawn_server(&config_path, &[]);
    wait_for_server(port).await;

    assert!(dir.path().join("media").is_dir());
    assert!(dir.path().join("state").join("yoink.db").exists());

    server.kill().await.ok();
}

#[tokio::test]
async fn test_missing_config_file_exits_with_error() {
    let output = run_to_exit("/nonexistent/config.toml").await;
    assert!(!output.status.success());
}

#[tokio::test]
async fn test_zero_workers_rejected_at_startup() {
    let config = write_config("[workers]\nmax_concurrent = 0\n");
    let output = run_to_exit(config.path().to_str().unwrap()).await;
    assert!(!output.status.success());
}
