//! FFmpeg-based transcoder implementation.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Instant;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tokio::time::{timeout, Duration};
use tracing::{debug, info};

use super::error::TranscoderError;
use super::traits::Transcoder;
use super::types::{AudioCodec, AudioFilters, OutputTarget, TranscodeJob};
use crate::config::TranscoderConfig;

/// Lines of ffmpeg stderr kept for error reports.
const STDERR_TAIL: usize = 20;

/// FFmpeg-based transcoder.
pub struct FfmpegTranscoder {
    config: TranscoderConfig,
}

impl FfmpegTranscoder {
    pub fn new(config: TranscoderConfig) -> Self {
        Self { config }
    }

    /// Builds the full ffmpeg argument list for a job.
    fn build_args(&self, job: &TranscodeJob) -> Vec<String> {
        let mut args = vec![
            "-y".to_string(),
            "-i".to_string(),
            job.input.to_string_lossy().to_string(),
        ];

        match job.target {
            OutputTarget::Audio {
                codec,
                bitrate_kbps,
            } => {
                if let Some(cover) = &job.cover {
                    args.extend([
                        "-i".to_string(),
                        cover.to_string_lossy().to_string(),
                        "-map".to_string(),
                        "0:a".to_string(),
                        "-map".to_string(),
                        "1:v".to_string(),
                        "-c:v".to_string(),
                        "copy".to_string(),
                        "-disposition:v:0".to_string(),
                        "attached_pic".to_string(),
                    ]);
                } else {
                    args.push("-vn".to_string());
                }

                if let Some(chain) = job.filters.filter_chain() {
                    args.extend(["-af".to_string(), chain]);
                }

                args.extend(["-c:a".to_string(), codec.ffmpeg_codec().to_string()]);
                if !codec.is_lossless() {
                    if let Some(bitrate) = bitrate_kbps {
                        args.extend(["-b:a".to_string(), format!("{}k", bitrate)]);
                    }
                }
                if codec == AudioCodec::Mp3 {
                    args.extend(["-id3v2_version".to_string(), "3".to_string()]);
                }
            }
            OutputTarget::Video => {
                // Tempo changes would desync the picture, only EQ applies.
                let filters = AudioFilters {
                    eq: job.filters.eq,
                    ..AudioFilters::default()
                };
                args.extend(["-c:v".to_string(), "copy".to_string()]);
                match filters.filter_chain() {
                    Some(chain) => {
                        args.extend(["-af".to_string(), chain]);
                        args.extend(["-c:a".to_string(), "aac".to_string()]);
                    }
                    None => args.extend(["-c:a".to_string(), "copy".to_string()]),
                }
                args.extend(["-movflags".to_string(), "+faststart".to_string()]);
            }
        }

        args.extend(job.tags.to_ffmpeg_args());
        args.extend(["-loglevel".to_string(), self.config.log_level.clone()]);
        args.push(job.output.to_string_lossy().to_string());
        args
    }
}

#[async_trait]
impl Transcoder for FfmpegTranscoder {
    fn name(&self) -> &str {
        "ffmpeg"
    }

    async fn convert(&self, job: TranscodeJob) -> Result<PathBuf, TranscoderError> {
        let start = Instant::now();

        if !job.input.exists() {
            return Err(TranscoderError::InputNotFound {
                path: job.input.clone(),
            });
        }

        if let Some(parent) = job.output.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(|_| {
                TranscoderError::OutputDirectoryFailed {
                    path: parent.to_path_buf(),
                }
            })?;
        }

        let args = self.build_args(&job);
        debug!(job_id = %job.job_id, ?args, "Running ffmpeg");

        let mut child = Command::new(&self.config.ffmpeg_path)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    TranscoderError::FfmpegNotFound {
                        path: self.config.ffmpeg_path.clone(),
                    }
                } else {
                    TranscoderError::Io(e)
                }
            })?;

        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| TranscoderError::failed("ffmpeg stderr was not captured", None))?;
        let mut reader = BufReader::new(stderr).lines();

        let timeout_duration = Duration::from_secs(self.config.timeout_secs);
        let result = timeout(timeout_duration, async {
            let mut tail = VecDeque::with_capacity(STDERR_TAIL);
            while let Ok(Some(line)) = reader.next_line().await {
                if tail.len() == STDERR_TAIL {
                    tail.pop_front();
                }
                tail.push_back(line);
            }
            let status = child.wait().await?;
            Ok::<_, std::io::Error>((status, tail))
        })
        .await;

        match result {
            Ok(Ok((status, tail))) => {
                if !status.success() {
                    let stderr = Vec::from(tail).join("\n");
                    return Err(TranscoderError::failed(
                        format!("FFmpeg exited with code: {:?}", status.code()),
                        if stderr.is_empty() { None } else { Some(stderr) },
                    ));
                }
            }
            Ok(Err(e)) => return Err(TranscoderError::Io(e)),
            Err(_) => {
                let _ = child.kill().await;
                return Err(TranscoderError::Timeout {
                    timeout_secs: self.config.timeout_secs,
                });
            }
        }

        if tokio::fs::metadata(&job.output).await.is_err() {
            return Err(TranscoderError::failed("Output file not created", None));
        }

        info!(
            job_id = %job.job_id,
            output = %job.output.display(),
            duration_ms = start.elapsed().as_millis() as u64,
            "Transcoding finished"
        );
        Ok(job.output)
    }

    async fn validate(&self) -> Result<(), TranscoderError> {
        let output = Command::new(&self.config.ffmpeg_path)
            .arg("-version")
            .output()
            .await
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    TranscoderError::FfmpegNotFound {
                        path: self.config.ffmpeg_path.clone(),
                    }
                } else {
                    TranscoderError::Io(e)
                }
            })?;

        if !output.status.success() {
            return Err(TranscoderError::failed("ffmpeg -version failed", None));
        }
        Ok(())
    }
}
