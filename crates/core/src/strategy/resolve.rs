//! Turning a strategy plus a request into concrete per-attempt options.

use serde::Serialize;

use super::descriptor::{AuthUse, FormatPolicy, StrategyDescriptor};
use crate::job::{AuthSource, DownloadRequest, MediaMode, TimeRange};
use crate::transcoder::OutputTarget;

/// Everything the extractor needs for one attempt. Built fresh per attempt
/// and never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResolvedOptions {
    /// 1-based catalog position.
    pub attempt: u32,
    pub strategy: String,
    pub clients: Vec<String>,
    pub auth: Option<AuthSource>,
    pub impersonate: Option<String>,
    /// yt-dlp `-f` expression.
    pub format: String,
    pub target: OutputTarget,
    #[serde(skip)]
    pub trim: Option<TimeRange>,
    pub playlist: bool,
}

/// Format expression implied by the request for the requested policy.
pub fn format_expression(mode: MediaMode, quality: &str, policy: FormatPolicy) -> String {
    match (mode, policy) {
        (MediaMode::Audio, FormatPolicy::Requested) => "bestaudio/best".to_string(),
        (MediaMode::Audio, FormatPolicy::Reduced) => {
            "bestaudio[abr<=128]/worstaudio/worst".to_string()
        }
        (MediaMode::Video, FormatPolicy::Requested) => match video_height(quality) {
            Some(h) => format!("bestvideo[height<={h}]+bestaudio/best[height<={h}]"),
            None => "bestvideo+bestaudio/best".to_string(),
        },
        (MediaMode::Video, FormatPolicy::Reduced) => "best[height<=480]/worst".to_string(),
    }
}

/// `720p` -> 720
fn video_height(quality: &str) -> Option<u32> {
    quality.strip_suffix('p').and_then(|h| h.parse().ok())
}

/// Resolve `strategy` at `attempt` for `request`.
///
/// `fallback_auth` is the server-wide cookie source used when the request
/// brings none. Returns `None` when the strategy requires auth and none is
/// available, meaning the attempt is skipped.
pub fn resolve(
    attempt: u32,
    strategy: &StrategyDescriptor,
    request: &DownloadRequest,
    trim: Option<TimeRange>,
    fallback_auth: Option<&AuthSource>,
) -> Option<ResolvedOptions> {
    let available = request.auth_source().or_else(|| fallback_auth.cloned());
    let auth = match strategy.auth {
        AuthUse::None => None,
        AuthUse::IfAvailable => available,
        AuthUse::Required => Some(available?),
    };

    Some(ResolvedOptions {
        attempt,
        strategy: strategy.name.clone(),
        clients: strategy.clients.clone(),
        auth,
        impersonate: strategy.impersonate.clone(),
        format: format_expression(request.mode, &request.quality, strategy.format),
        target: OutputTarget::for_request(request.mode, &request.quality),
        trim,
        playlist: request.playlist,
    })
}
