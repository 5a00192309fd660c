//! Transcoding of fetched media into the requested output.
//!
//! The [`Transcoder`] trait is the seam the retry pipeline calls after a
//! successful fetch; [`FfmpegTranscoder`] drives an `ffmpeg` subprocess to
//! apply codec, pitch/tempo/EQ filters, metadata tags and cover art.

mod error;
mod ffmpeg;
mod traits;
mod types;

pub use error::TranscoderError;
pub use ffmpeg::FfmpegTranscoder;
pub use traits::Transcoder;
pub use types::{AudioCodec, AudioFilters, EqPreset, OutputTarget, Tags, TranscodeJob};
