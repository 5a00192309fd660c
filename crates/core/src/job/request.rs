//! Download request as submitted by clients.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::transcoder::EqPreset;

/// Output kind of a download.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum MediaMode {
    #[default]
    Audio,
    Video,
}

/// Where authentication cookies come from for an attempt.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum AuthSource {
    /// Netscape-format cookie file on disk.
    CookieFile(PathBuf),
    /// Cookie store of a locally installed browser (e.g. "firefox").
    Browser(String),
}

/// Position of a request inside a batch such as a playlist.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct BatchRef {
    pub batch_id: String,
    pub item_id: String,
}

/// Seconds to cut the fetched media to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TimeRange {
    pub start: Option<u64>,
    pub end: Option<u64>,
}

impl TimeRange {
    /// yt-dlp `--download-sections` expression, e.g. `*30-95`.
    pub fn as_section(&self) -> String {
        let start = self.start.unwrap_or(0);
        match self.end {
            Some(end) => format!("*{}-{}", start, end),
            None => format!("*{}-inf", start),
        }
    }
}

/// Reasons a request is rejected before it is queued.
#[derive(Debug, Error, PartialEq)]
pub enum RequestError {
    #[error("url cannot be empty")]
    EmptyUrl,

    #[error("invalid time '{0}', expected SS, MM:SS or HH:MM:SS")]
    InvalidTime(String),

    #[error("end_time must be after start_time")]
    InvalidRange,

    #[error("pitch {0} is outside -12..=12 semitones")]
    PitchOutOfRange(i32),

    #[error("speed {0} is outside 0.5..=2.0")]
    SpeedOutOfRange(f64),
}

/// A media acquisition request. Immutable once queued.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DownloadRequest {
    pub url: String,
    #[serde(default)]
    pub mode: MediaMode,
    /// `best`, `high`, `medium`, `low`, `flac` for audio, or `NNNp` for video.
    #[serde(default = "default_quality")]
    pub quality: String,
    #[serde(default)]
    pub playlist: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_time: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_time: Option<String>,
    /// Semitones.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pitch: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub speed: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub artist: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cover_path: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cookies_path: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub browser_cookies: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub eq_preset: Option<EqPreset>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub batch_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub item_id: Option<String>,
}

fn default_quality() -> String {
    "best".to_string()
}

impl DownloadRequest {
    /// Audio request with default settings.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            mode: MediaMode::Audio,
            quality: default_quality(),
            playlist: false,
            start_time: None,
            end_time: None,
            pitch: None,
            speed: None,
            title: None,
            artist: None,
            cover_path: None,
            cookies_path: None,
            browser_cookies: None,
            eq_preset: None,
            batch_id: None,
            item_id: None,
        }
    }

    /// Attach the request to a batch item.
    pub fn with_batch(mut self, batch_id: impl Into<String>, item_id: impl Into<String>) -> Self {
        self.batch_id = Some(batch_id.into());
        self.item_id = Some(item_id.into());
        self
    }

    /// The batch item this request belongs to, when both halves are present.
    pub fn batch(&self) -> Option<BatchRef> {
        match (&self.batch_id, &self.item_id) {
            (Some(batch_id), Some(item_id)) if !batch_id.is_empty() && !item_id.is_empty() => {
                Some(BatchRef {
                    batch_id: batch_id.clone(),
                    item_id: item_id.clone(),
                })
            }
            _ => None,
        }
    }

    /// Auth brought by the request itself. A cookie file wins over a browser store.
    pub fn auth_source(&self) -> Option<AuthSource> {
        if let Some(path) = &self.cookies_path {
            return Some(AuthSource::CookieFile(path.clone()));
        }
        self.browser_cookies
            .as_ref()
            .filter(|b| !b.trim().is_empty())
            .map(|b| AuthSource::Browser(b.trim().to_string()))
    }

    /// Parsed trim range, `None` when neither bound is set.
    pub fn trim(&self) -> Result<Option<TimeRange>, RequestError> {
        let start = self.start_time.as_deref().map(parse_time).transpose()?;
        let end = self.end_time.as_deref().map(parse_time).transpose()?;
        let (start, end) = (start.flatten(), end.flatten());

        if let (Some(s), Some(e)) = (start, end) {
            if e <= s {
                return Err(RequestError::InvalidRange);
            }
        }

        if start.is_none() && end.is_none() {
            Ok(None)
        } else {
            Ok(Some(TimeRange { start, end }))
        }
    }

    /// Reject malformed requests before queueing.
    pub fn validate(&self) -> Result<(), RequestError> {
        if self.url.trim().is_empty() {
            return Err(RequestError::EmptyUrl);
        }
        if let Some(pitch) = self.pitch {
            if !(-12..=12).contains(&pitch) {
                return Err(RequestError::PitchOutOfRange(pitch));
            }
        }
        if let Some(speed) = self.speed {
            if !(0.5..=2.0).contains(&speed) {
                return Err(RequestError::SpeedOutOfRange(speed));
            }
        }
        self.trim()?;
        Ok(())
    }
}

/// Parse `SS`, `MM:SS` or `HH:MM:SS` into seconds. Blank input means unset.
pub fn parse_time(value: &str) -> Result<Option<u64>, RequestError> {
    let value = value.trim();
    if value.is_empty() {
        return Ok(None);
    }

    let parts: Vec<&str> = value.split(':').collect();
    if parts.len() > 3 {
        return Err(RequestError::InvalidTime(value.to_string()));
    }

    let invalid = || RequestError::InvalidTime(value.to_string());
    let mut seconds = 0u64;
    for (i, part) in parts.iter().enumerate() {
        let n: u64 = part.parse().map_err(|_| invalid())?;
        // Only the leading field may exceed 59.
        if i > 0 && n >= 60 {
            return Err(invalid());
        }
        seconds = seconds
            .checked_mul(60)
            .and_then(|s| s.checked_add(n))
            .ok_or_else(invalid)?;
    }
    Ok(Some(seconds))
}
