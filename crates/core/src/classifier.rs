//! Failure classification driving the retry decision table.

use serde::{Deserialize, Serialize};

/// Classified failure kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Rate limiting, temporary unavailability, network trouble.
    Transient,
    /// Sign-in, account or private content errors. Never retried.
    AuthRequired,
    /// The requested encoding or quality is not offered.
    FormatUnavailable,
    /// Deadline exceeded, enforced by the worker pool.
    Timeout,
    /// Externally requested abort.
    Cancelled,
    Unknown,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Transient => "transient",
            ErrorKind::AuthRequired => "auth_required",
            ErrorKind::FormatUnavailable => "format_unavailable",
            ErrorKind::Timeout => "timeout",
            ErrorKind::Cancelled => "cancelled",
            ErrorKind::Unknown => "unknown",
        }
    }
}

const TRANSIENT: &[&str] = &[
    "http error 429",
    "too many requests",
    "rate limit",
    "rate-limit",
    "ratelimit",
    "temporarily unavailable",
    "temporary failure",
    "service unavailable",
    "http error 502",
    "http error 503",
    "http error 504",
    "network is unreachable",
    "connection reset",
    "connection refused",
    "connection aborted",
    "timed out",
    "read timeout",
    "try again later",
];

const AUTH_REQUIRED: &[&str] = &[
    "sign in",
    "sign-in",
    "login required",
    "log in",
    "private video",
    "members-only",
    "members only",
    "account",
    "cookies",
    "age-restricted",
    "confirm your age",
    "not a bot",
];

const FORMAT_UNAVAILABLE: &[&str] = &[
    "requested format is not available",
    "format is not available",
    "no video formats",
    "no formats found",
    "unsupported format",
];

/// Map failure text to an [`ErrorKind`].
///
/// Case-insensitive fragment matching, checked in the order transient,
/// auth, format. Anything else is `Unknown`.
pub fn classify(message: &str) -> ErrorKind {
    let message = message.to_lowercase();
    let table: [(ErrorKind, &[&str]); 3] = [
        (ErrorKind::Transient, TRANSIENT),
        (ErrorKind::AuthRequired, AUTH_REQUIRED),
        (ErrorKind::FormatUnavailable, FORMAT_UNAVAILABLE),
    ];

    table
        .iter()
        .find(|(_, fragments)| fragments.iter().any(|f| message.contains(f)))
        .map(|(kind, _)| *kind)
        .unwrap_or(ErrorKind::Unknown)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient() {
        assert_eq!(
            classify("ERROR: [youtube] abc: HTTP Error 429: Too Many Requests"),
            ErrorKind::Transient
        );
        assert_eq!(
            classify("<urlopen error [Errno 101] Network is unreachable>"),
            ErrorKind::Transient
        );
        assert_eq!(classify("The read operation timed out"), ErrorKind::Transient);
    }

    #[test]
    fn test_auth_required() {
        assert_eq!(
            classify("ERROR: Sign in to confirm you're not a bot"),
            ErrorKind::AuthRequired
        );
        assert_eq!(classify("Private video"), ErrorKind::AuthRequired);
        assert_eq!(
            classify("This video is available to this channel's members-only"),
            ErrorKind::AuthRequired
        );
    }

    #[test]
    fn test_format_unavailable() {
        assert_eq!(
            classify("ERROR: Requested format is not available. Use --list-formats"),
            ErrorKind::FormatUnavailable
        );
    }

    #[test]
    fn test_unknown() {
        assert_eq!(classify("ffmpeg exited with code 1"), ErrorKind::Unknown);
        assert_eq!(classify(""), ErrorKind::Unknown);
    }

    #[test]
    fn test_transient_checked_before_auth() {
        assert_eq!(
            classify("HTTP Error 429 while fetching sign in page"),
            ErrorKind::Transient
        );
    }

    #[test]
    fn test_auth_checked_before_format() {
        assert_eq!(
            classify("Requested format is not available; sign in for more"),
            ErrorKind::AuthRequired
        );
    }
}
