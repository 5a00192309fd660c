//! yt-dlp based extractor.

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex_lite::Regex;
use serde_json::Value;
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tokio::sync::mpsc;
use tokio::time::{timeout, Duration};
use tracing::{debug, info, warn};

use super::error::ExtractorError;
use super::traits::Extractor;
use super::types::{
    format_duration, Artifact, Metadata, PlaylistEntry, PlaylistInfo, ProgressEvent,
};
use crate::config::ExtractorConfig;
use crate::job::AuthSource;
use crate::strategy::ResolvedOptions;
use crate::transcoder::OutputTarget;

const PROGRESS_TEMPLATE: &str = "download:[yoink] %(progress.downloaded_bytes)s %(progress.total_bytes)s %(progress.total_bytes_estimate)s";
const POSTPROCESS_TEMPLATE: &str = "postprocess:[yoink-pp] %(progress.postprocessor)s";
const POSTPROCESS_PREFIX: &str = "[yoink-pp]";
const METADATA_TEMPLATE: &str = "%(.{id,title,uploader,artist,duration,thumbnail,webpage_url})j";

/// Client rotation used for playlist listings.
const PLAYLIST_CLIENTS: &[&str] = &["tv", "android", "web"];

/// Lines of stderr kept for error reports.
const STDERR_TAIL: usize = 30;

static PROGRESS_RE: Lazy<Option<Regex>> =
    Lazy::new(|| Regex::new(r"^\[yoink\]\s+(\S+)\s+(\S+)\s+(\S+)\s*$").ok());

/// yt-dlp subprocess extractor.
pub struct YtDlpExtractor {
    config: ExtractorConfig,
}

impl YtDlpExtractor {
    pub fn new(config: ExtractorConfig) -> Self {
        Self { config }
    }

    /// Client identity, cookie and impersonation arguments of a strategy.
    fn strategy_args(options: &ResolvedOptions) -> Vec<String> {
        let mut args = Vec::new();

        if !options.clients.is_empty() {
            args.extend([
                "--extractor-args".to_string(),
                format!("youtube:player_client={}", options.clients.join(",")),
            ]);
        }

        match &options.auth {
            Some(AuthSource::CookieFile(path)) => {
                args.extend(["--cookies".to_string(), path.to_string_lossy().to_string()])
            }
            Some(AuthSource::Browser(browser)) => {
                args.extend(["--cookies-from-browser".to_string(), browser.clone()])
            }
            None => {}
        }

        if let Some(target) = &options.impersonate {
            args.extend(["--impersonate".to_string(), target.clone()]);
        }

        args
    }

    fn build_fetch_args(&self, url: &str, options: &ResolvedOptions, dest_dir: &Path) -> Vec<String> {
        let template = dest_dir.join("%(id)s.%(ext)s");
        let mut args: Vec<String> = [
            "--newline",
            "--no-colors",
            "--progress",
            "--no-simulate",
            "--print",
            METADATA_TEMPLATE,
            "--progress-template",
            PROGRESS_TEMPLATE,
            "--progress-template",
            POSTPROCESS_TEMPLATE,
            "--socket-timeout",
            "30",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect();

        args.extend(["-f".to_string(), options.format.clone()]);
        args.extend(["-o".to_string(), template.to_string_lossy().to_string()]);
        args.push(if options.playlist {
            "--yes-playlist".to_string()
        } else {
            "--no-playlist".to_string()
        });

        match options.target {
            OutputTarget::Video => {
                args.extend(["--merge-output-format".to_string(), "mp4".to_string()]);
            }
            OutputTarget::Audio { .. } => {
                args.extend([
                    "--write-thumbnail".to_string(),
                    "--convert-thumbnails".to_string(),
                    "jpg".to_string(),
                ]);
            }
        }

        if let Some(range) = &options.trim {
            args.extend([
                "--download-sections".to_string(),
                range.as_section(),
                "--force-keyframes-at-cuts".to_string(),
            ]);
        }

        args.extend(Self::strategy_args(options));
        args.extend(["--".to_string(), url.to_string()]);
        args
    }

    fn build_probe_args(url: &str, options: &ResolvedOptions) -> Vec<String> {
        let mut args = vec![
            "-J".to_string(),
            "--no-warnings".to_string(),
            "--no-playlist".to_string(),
        ];
        args.extend(Self::strategy_args(options));
        args.extend(["--".to_string(), url.to_string()]);
        args
    }

    fn build_playlist_args(&self, url: &str, limit: usize, client: &str) -> Vec<String> {
        let mut args = vec![
            "-J".to_string(),
            "--flat-playlist".to_string(),
            "--no-warnings".to_string(),
            "--playlist-end".to_string(),
            limit.to_string(),
        ];
        if client != "web" {
            args.extend([
                "--extractor-args".to_string(),
                format!("youtube:player_client={}", client),
            ]);
        }
        if has_content(&self.config.cookies_file) {
            args.extend([
                "--cookies".to_string(),
                self.config.cookies_file.to_string_lossy().to_string(),
            ]);
        }
        args.extend(["--".to_string(), url.to_string()]);
        args
    }

    /// `[yoink] <done> <total> <estimate>`; `NA` marks unknown values.
    fn parse_progress_line(line: &str) -> Option<ProgressEvent> {
        let caps = PROGRESS_RE.as_ref()?.captures(line)?;
        let number = |i: usize| {
            caps.get(i)
                .and_then(|m| m.as_str().parse::<f64>().ok())
                .map(|n| n as u64)
        };
        let done = number(1)?;
        let total = number(2).or_else(|| number(3));
        Some(ProgressEvent::downloading(done, total))
    }

    fn parse_metadata_line(line: &str) -> Option<Metadata> {
        if !line.starts_with('{') {
            return None;
        }
        serde_json::from_str(line).ok()
    }

    fn parse_playlist(json: &str, limit: usize) -> Result<PlaylistInfo, ExtractorError> {
        let value: Value = serde_json::from_str(json).map_err(|e| ExtractorError::ParseError {
            reason: e.to_string(),
        })?;

        let entries = value
            .get("entries")
            .and_then(Value::as_array)
            .ok_or(ExtractorError::NotAPlaylist)?;

        let text = |v: &Value, key: &str| v.get(key).and_then(Value::as_str).map(str::to_string);

        let entries = entries
            .iter()
            .enumerate()
            // Private or deleted videos come back as null.
            .filter(|(_, entry)| !entry.is_null())
            .take(limit)
            .map(|(index, entry)| {
                let id = text(entry, "id").unwrap_or_default();
                let duration = entry.get("duration").and_then(Value::as_f64).unwrap_or(0.0);
                let thumbnail = text(entry, "thumbnail").or_else(|| {
                    entry
                        .get("thumbnails")
                        .and_then(Value::as_array)
                        .and_then(|t| t.first())
                        .and_then(|t| text(t, "url"))
                });
                PlaylistEntry {
                    index,
                    title: text(entry, "title").unwrap_or_else(|| "Untitled".to_string()),
                    thumbnail,
                    duration,
                    duration_string: text(entry, "duration_string")
                        .filter(|s| !s.is_empty())
                        .unwrap_or_else(|| format_duration(duration)),
                    uploader: text(entry, "uploader")
                        .or_else(|| text(entry, "channel"))
                        .unwrap_or_else(|| "Unknown".to_string()),
                    url: text(entry, "url")
                        .or_else(|| text(entry, "webpage_url"))
                        .unwrap_or_else(|| format!("https://www.youtube.com/watch?v={}", id)),
                    id,
                }
            })
            .collect();

        Ok(PlaylistInfo {
            id: text(&value, "id").unwrap_or_default(),
            title: text(&value, "title").unwrap_or_else(|| "Playlist".to_string()),
            uploader: text(&value, "uploader")
                .or_else(|| text(&value, "channel"))
                .unwrap_or_else(|| "Unknown".to_string()),
            entries,
        })
    }

    /// Media files and thumbnails in `dir`, ignoring partial downloads.
    async fn collect_outputs(dir: &Path) -> Result<(Vec<PathBuf>, Vec<PathBuf>), ExtractorError> {
        let mut files = Vec::new();
        let mut thumbnails = Vec::new();
        let mut entries = tokio::fs::read_dir(dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            if !entry.file_type().await?.is_file() {
                continue;
            }
            let path = entry.path();
            let ext = path
                .extension()
                .and_then(|e| e.to_str())
                .map(str::to_ascii_lowercase)
                .unwrap_or_default();
            match ext.as_str() {
                "part" | "ytdl" | "temp" => {}
                "jpg" | "jpeg" | "png" | "webp" => thumbnails.push(path),
                _ => files.push(path),
            }
        }
        files.sort();
        thumbnails.sort();
        Ok((files, thumbnails))
    }

    /// Run a one-shot yt-dlp command under the probe deadline, returning stdout.
    async fn run_json(&self, args: &[String]) -> Result<String, ExtractorError> {
        let command = Command::new(&self.config.ytdlp_path)
            .args(args)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output();

        let output = timeout(Duration::from_secs(self.config.probe_timeout_secs), command)
            .await
            .map_err(|_| ExtractorError::Timeout {
                timeout_secs: self.config.probe_timeout_secs,
            })?
            .map_err(|e| self.spawn_error(e))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let lines: Vec<String> = stderr.lines().map(str::to_string).collect();
            return Err(ExtractorError::failed(error_message(&lines, output.status.code())));
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    /// Installed yt-dlp version, used as a startup check.
    pub async fn version(&self) -> Result<String, ExtractorError> {
        let out = self.run_json(&["--version".to_string()]).await?;
        Ok(out.trim().to_string())
    }

    fn spawn_error(&self, e: std::io::Error) -> ExtractorError {
        if e.kind() == std::io::ErrorKind::NotFound {
            ExtractorError::BinaryNotFound {
                path: self.config.ytdlp_path.clone(),
            }
        } else {
            ExtractorError::Io(e)
        }
    }
}

/// ERROR lines when present, otherwise the tail of stderr.
fn error_message<S: AsRef<str>>(stderr: &[S], code: Option<i32>) -> String {
    let errors: Vec<&str> = stderr
        .iter()
        .map(|l| l.as_ref().trim())
        .filter(|l| l.starts_with("ERROR"))
        .collect();
    if !errors.is_empty() {
        return errors.join("\n");
    }
    let tail: Vec<&str> = stderr
        .iter()
        .map(|l| l.as_ref().trim())
        .filter(|l| !l.is_empty())
        .collect();
    if tail.is_empty() {
        format!("yt-dlp exited with code: {:?}", code)
    } else {
        tail.join("\n")
    }
}

fn has_content(path: &Path) -> bool {
    std::fs::metadata(path).is_ok_and(|m| m.is_file() && m.len() > 0)
}

#[async_trait]
impl Extractor for YtDlpExtractor {
    fn name(&self) -> &str {
        "yt-dlp"
    }

    async fn probe(&self, url: &str, options: &ResolvedOptions) -> Result<Metadata, ExtractorError> {
        let stdout = self.run_json(&Self::build_probe_args(url, options)).await?;
        serde_json::from_str(&stdout).map_err(|e| ExtractorError::ParseError {
            reason: e.to_string(),
        })
    }

    async fn fetch(
        &self,
        url: &str,
        options: &ResolvedOptions,
        dest_dir: &Path,
        progress: mpsc::Sender<ProgressEvent>,
    ) -> Result<Artifact, ExtractorError> {
        tokio::fs::create_dir_all(dest_dir).await?;

        let args = self.build_fetch_args(url, options, dest_dir);
        debug!(strategy = %options.strategy, ?args, "Running yt-dlp");

        let mut child = Command::new(&self.config.ytdlp_path)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| self.spawn_error(e))?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| ExtractorError::failed("yt-dlp stdout was not captured"))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| ExtractorError::failed("yt-dlp stderr was not captured"))?;

        let stderr_task = tokio::spawn(async move {
            let mut tail = VecDeque::with_capacity(STDERR_TAIL);
            let mut lines = BufReader::new(stderr).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                debug!(line = %line, "yt-dlp stderr");
                if tail.len() == STDERR_TAIL {
                    tail.pop_front();
                }
                tail.push_back(line);
            }
            Vec::from(tail)
        });

        let mut metadata = Vec::new();
        let mut lines = BufReader::new(stdout).lines();
        while let Some(line) = lines.next_line().await? {
            if let Some(event) = Self::parse_progress_line(&line) {
                let _ = progress.try_send(event);
            } else if line.starts_with(POSTPROCESS_PREFIX) {
                let _ = progress.try_send(ProgressEvent::processing());
            } else if let Some(item) = Self::parse_metadata_line(&line) {
                info!(id = %item.id, title = %item.title, "Fetching item");
                metadata.push(item);
            }
        }

        let status = child.wait().await?;
        let stderr_tail = stderr_task.await.unwrap_or_default();

        if !status.success() {
            let message = error_message(&stderr_tail, status.code());
            warn!(strategy = %options.strategy, error = %message, "yt-dlp failed");
            return Err(ExtractorError::failed(message));
        }

        let (files, thumbnails) = Self::collect_outputs(dest_dir).await?;
        if files.is_empty() {
            return Err(ExtractorError::NoOutput);
        }

        Ok(Artifact {
            files,
            metadata,
            thumbnails,
        })
    }

    async fn playlist(&self, url: &str, limit: usize) -> Result<PlaylistInfo, ExtractorError> {
        let mut last_error = None;

        for client in PLAYLIST_CLIENTS {
            let args = self.build_playlist_args(url, limit, client);
            match self.run_json(&args).await {
                Ok(stdout) => return Self::parse_playlist(&stdout, limit),
                Err(e @ ExtractorError::BinaryNotFound { .. }) => return Err(e),
                Err(e) => {
                    warn!(client = %client, error = %e, "Playlist listing failed");
                    last_error = Some(e);
                }
            }
        }

        Err(last_error.unwrap_or_else(|| ExtractorError::failed("playlist listing failed")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::{DownloadRequest, MediaMode, TimeRange};
    use crate::strategy::{resolve, StrategyDescriptor};

    fn extractor() -> YtDlpExtractor {
        YtDlpExtractor::new(ExtractorConfig::default())
    }

    fn options(strategy: StrategyDescriptor, request: &DownloadRequest) -> ResolvedOptions {
        let trim = request.trim().unwrap();
        resolve(1, &strategy, request, trim, None).unwrap()
    }

    fn value_after<'a>(args: &'a [String], flag: &str) -> Option<&'a str> {
        let idx = args.iter().position(|a| a == flag)?;
        args.get(idx + 1).map(String::as_str)
    }

    #[test]
    fn test_fetch_args_audio() {
        let request = DownloadRequest::new("https://youtu.be/abc");
        let opts = options(StrategyDescriptor::new("tv", &["tv"]), &request);
        let args = extractor().build_fetch_args(&request.url, &opts, Path::new("/work/j1"));

        assert_eq!(value_after(&args, "-f"), Some("bestaudio/best"));
        assert_eq!(value_after(&args, "-o"), Some("/work/j1/%(id)s.%(ext)s"));
        assert_eq!(
            value_after(&args, "--extractor-args"),
            Some("youtube:player_client=tv")
        );
        assert!(args.contains(&"--no-playlist".to_string()));
        assert!(!args.contains(&"--merge-output-format".to_string()));
        assert!(args.contains(&"--write-thumbnail".to_string()));
        assert_eq!(value_after(&args, "--convert-thumbnails"), Some("jpg"));
        assert_eq!(&args[args.len() - 2..], ["--", "https://youtu.be/abc"]);
    }

    #[test]
    fn test_fetch_args_video_trim_and_auth() {
        let mut request = DownloadRequest::new("https://youtu.be/abc");
        request.mode = MediaMode::Video;
        request.quality = "720p".to_string();
        request.browser_cookies = Some("firefox".to_string());
        request.start_time = Some("10".to_string());
        let strategy = StrategyDescriptor::new("web", &["web"])
            .with_auth(crate::strategy::AuthUse::IfAvailable)
            .with_impersonate("chrome");
        let opts = options(strategy, &request);
        assert_eq!(opts.trim, Some(TimeRange { start: Some(10), end: None }));

        let args = extractor().build_fetch_args(&request.url, &opts, Path::new("/w"));
        assert_eq!(value_after(&args, "--merge-output-format"), Some("mp4"));
        assert!(!args.contains(&"--write-thumbnail".to_string()));
        assert_eq!(value_after(&args, "--download-sections"), Some("*10-inf"));
        assert!(args.contains(&"--force-keyframes-at-cuts".to_string()));
        assert_eq!(value_after(&args, "--cookies-from-browser"), Some("firefox"));
        assert_eq!(value_after(&args, "--impersonate"), Some("chrome"));
    }

    #[test]
    fn test_parse_progress_line() {
        assert_eq!(
            YtDlpExtractor::parse_progress_line("[yoink] 1024 4096 NA"),
            Some(ProgressEvent::downloading(1024, Some(4096)))
        );
        assert_eq!(
            YtDlpExtractor::parse_progress_line("[yoink] 1024 NA 8192.5"),
            Some(ProgressEvent::downloading(1024, Some(8192)))
        );
        assert_eq!(
            YtDlpExtractor::parse_progress_line("[yoink] 10 NA NA"),
            Some(ProgressEvent::downloading(10, None))
        );
        assert_eq!(YtDlpExtractor::parse_progress_line("[download] 5%"), None);
    }

    #[test]
    fn test_parse_metadata_line() {
        let meta = YtDlpExtractor::parse_metadata_line(
            r#"{"id": "abc", "title": "Song", "uploader": "Band", "duration": 201.0, "thumbnail": null}"#,
        )
        .unwrap();
        assert_eq!(meta.id, "abc");
        assert_eq!(meta.title, "Song");
        assert_eq!(meta.duration, Some(201.0));
        assert!(YtDlpExtractor::parse_metadata_line("[info] abc").is_none());
    }

    #[test]
    fn test_parse_playlist() {
        let json = r#"{
            "id": "PL123",
            "title": "Mix",
            "channel": "Someone",
            "entries": [
                {"id": "a", "title": "First", "duration": 125, "url": "https://youtu.be/a"},
                null,
                {"id": "b", "thumbnails": [{"url": "https://img/b.jpg"}]},
                {"id": "c", "title": "Third"}
            ]
        }"#;
        let info = YtDlpExtractor::parse_playlist(json, 2).unwrap();
        assert_eq!(info.id, "PL123");
        assert_eq!(info.uploader, "Someone");
        assert_eq!(info.entries.len(), 2);
        assert_eq!(info.entries[0].duration_string, "2:05");
        assert_eq!(info.entries[1].index, 2);
        assert_eq!(info.entries[1].title, "Untitled");
        assert_eq!(info.entries[1].thumbnail.as_deref(), Some("https://img/b.jpg"));
        assert_eq!(info.entries[1].url, "https://www.youtube.com/watch?v=b");
    }

    #[test]
    fn test_parse_playlist_rejects_single_video() {
        let result = YtDlpExtractor::parse_playlist(r#"{"id": "abc", "title": "Song"}"#, 50);
        assert!(matches!(result, Err(ExtractorError::NotAPlaylist)));
    }

    #[test]
    fn test_error_message_prefers_error_lines() {
        let stderr = vec![
            "WARNING: something".to_string(),
            "ERROR: [youtube] abc: Private video".to_string(),
        ];
        assert_eq!(
            error_message(&stderr, Some(1)),
            "ERROR: [youtube] abc: Private video"
        );
        assert_eq!(
            error_message::<String>(&[], Some(2)),
            "yt-dlp exited with code: Some(2)"
        );
    }

    #[cfg(unix)]
    mod process {
        use super::*;
        use std::os::unix::fs::PermissionsExt;

        fn write_script(dir: &Path, body: &str) -> String {
            let path = dir.join("fake-yt-dlp");
            std::fs::write(&path, format!("#!/bin/sh\n{}", body)).unwrap();
            std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
            path.to_string_lossy().to_string()
        }

        const SUCCESS_SCRIPT: &str = r#"
out=""
while [ $# -gt 0 ]; do
  case "$1" in
    -o) out="$2"; shift 2 ;;
    *) shift ;;
  esac
done
dir=$(dirname "$out")
echo '{"id": "abc123", "title": "Test Song", "uploader": "Band"}'
echo '[yoink] 512 1024 NA'
echo '[yoink] 1024 1024 NA'
echo '[yoink-pp] Merger'
printf 'data' > "$dir/abc123.webm"
printf 'jpeg' > "$dir/abc123.jpg"
printf 'partial' > "$dir/other.webm.part"
"#;

        #[tokio::test]
        async fn test_fetch_with_fake_binary() {
            let dir = tempfile::tempdir().unwrap();
            let config = ExtractorConfig {
                ytdlp_path: write_script(dir.path(), SUCCESS_SCRIPT),
                ..ExtractorConfig::default()
            };
            let extractor = YtDlpExtractor::new(config);
            let request = DownloadRequest::new("https://youtu.be/abc123");
            let opts = options(StrategyDescriptor::new("web", &["web"]), &request);

            let (tx, mut rx) = mpsc::channel(16);
            let work = dir.path().join("work");
            let artifact = extractor
                .fetch(&request.url, &opts, &work, tx)
                .await
                .unwrap();

            assert_eq!(artifact.files, vec![work.join("abc123.webm")]);
            assert_eq!(artifact.thumbnails, vec![work.join("abc123.jpg")]);
            assert_eq!(artifact.metadata[0].title, "Test Song");

            let mut events = Vec::new();
            while let Ok(event) = rx.try_recv() {
                events.push(event);
            }
            assert_eq!(events.len(), 3);
            assert_eq!(events[1].percent(), Some(100.0));
            assert_eq!(events[2], ProgressEvent::processing());
        }

        #[tokio::test]
        async fn test_fetch_failure_reports_error_lines() {
            let dir = tempfile::tempdir().unwrap();
            let config = ExtractorConfig {
                ytdlp_path: write_script(
                    dir.path(),
                    "echo \"ERROR: [youtube] abc: Sign in to confirm you're not a bot\" >&2\nexit 1\n",
                ),
                ..ExtractorConfig::default()
            };
            let extractor = YtDlpExtractor::new(config);
            let request = DownloadRequest::new("https://youtu.be/abc");
            let opts = options(StrategyDescriptor::new("web", &["web"]), &request);
            let (tx, _rx) = mpsc::channel(16);

            let err = extractor
                .fetch(&request.url, &opts, &dir.path().join("work"), tx)
                .await
                .unwrap_err();
            assert!(err.to_string().contains("Sign in to confirm"));
            assert_eq!(err.kind(), crate::classifier::ErrorKind::AuthRequired);
        }

        #[tokio::test]
        async fn test_version() {
            let dir = tempfile::tempdir().unwrap();
            let config = ExtractorConfig {
                ytdlp_path: write_script(dir.path(), "echo 2024.10.07\n"),
                ..ExtractorConfig::default()
            };
            let extractor = YtDlpExtractor::new(config);
            assert_eq!(extractor.version().await.unwrap(), "2024.10.07");
        }

        #[tokio::test]
        async fn test_missing_binary() {
            let config = ExtractorConfig {
                ytdlp_path: "/nonexistent/yt-dlp".to_string(),
                ..ExtractorConfig::default()
            };
            let extractor = YtDlpExtractor::new(config);
            let result = extractor.playlist("https://youtube.com/playlist?list=x", 5).await;
            assert!(matches!(result, Err(ExtractorError::BinaryNotFound { .. })));
        }
    }
}
