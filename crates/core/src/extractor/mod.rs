//! Media extraction: metadata probing and media transfer.
//!
//! The [`Extractor`] trait is consumed by the retry pipeline with one
//! [`ResolvedOptions`](crate::strategy::ResolvedOptions) per attempt.
//! [`YtDlpExtractor`] drives a `yt-dlp` subprocess and reports progress
//! through an mpsc channel.

mod error;
mod traits;
mod types;
mod ytdlp;

pub use error::ExtractorError;
pub use traits::Extractor;
pub use types::{
    format_duration, Artifact, Metadata, PlaylistEntry, PlaylistInfo, ProgressEvent, ProgressPhase,
};
pub use ytdlp::YtDlpExtractor;
