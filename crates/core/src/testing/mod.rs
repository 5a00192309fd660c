//! Testing utilities and mock implementations.
//!
//! Mocks for the extractor and transcoder seams so the pipeline, worker pool
//! and HTTP layer can be exercised without `yt-dlp` or `ffmpeg`.
//!
//! # Example
//!
//! ```rust,ignore
//! use yoink_core::testing::{MockExtractor, MockOutcome, MockTranscoder};
//!
//! let extractor = MockExtractor::new();
//! extractor
//!     .script("https://example.com/v", vec![MockOutcome::fail("HTTP Error 429"), MockOutcome::Success])
//!     .await;
//! ```

mod mock_extractor;
mod mock_transcoder;

pub use mock_extractor::{MockExtractor, MockOutcome, RecordedFetch};
pub use mock_transcoder::MockTranscoder;

/// Test fixtures and helper functions.
pub mod fixtures {
    use crate::extractor::{PlaylistEntry, PlaylistInfo};
    use crate::job::DownloadRequest;

    /// Audio request for `url` with the given quality.
    pub fn audio_request(url: &str, quality: &str) -> DownloadRequest {
        let mut request = DownloadRequest::new(url);
        request.quality = quality.to_string();
        request
    }

    /// Playlist with `count` entries whose ids are `v0`, `v1`, ...
    pub fn playlist(id: &str, count: usize) -> PlaylistInfo {
        PlaylistInfo {
            id: id.to_string(),
            title: format!("Playlist {}", id),
            uploader: "Uploader".to_string(),
            entries: (0..count)
                .map(|i| PlaylistEntry {
                    index: i,
                    id: format!("v{}", i),
                    title: format!("Track {}", i),
                    thumbnail: None,
                    duration: 180.0,
                    duration_string: "3:00".to_string(),
                    uploader: "Uploader".to_string(),
                    url: format!("https://www.youtube.com/watch?v=v{}", i),
                })
                .collect(),
        }
    }
}
