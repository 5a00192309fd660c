//! Transcoding targets, filters and jobs.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::job::{DownloadRequest, MediaMode};

/// Output sample rate the pitch chain resamples to.
const SAMPLE_RATE: u32 = 44_100;

/// Named equalizer curves.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum EqPreset {
    Bass,
    Soft,
    Treble,
    Vocal,
}

impl EqPreset {
    /// ffmpeg `equalizer` filter for this preset.
    pub fn filter(&self) -> &'static str {
        match self {
            EqPreset::Bass => "equalizer=f=60:width_type=h:width=50:g=10",
            EqPreset::Soft => "equalizer=f=1000:width_type=h:width=200:g=-5",
            EqPreset::Treble => "equalizer=f=14000:width_type=h:width=1000:g=10",
            EqPreset::Vocal => "equalizer=f=3000:width_type=h:width=1000:g=5",
        }
    }
}

/// Audio codecs the transcoder produces.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AudioCodec {
    Mp3,
    Aac,
    Flac,
}

impl AudioCodec {
    pub fn ffmpeg_codec(&self) -> &'static str {
        match self {
            AudioCodec::Mp3 => "libmp3lame",
            AudioCodec::Aac => "aac",
            AudioCodec::Flac => "flac",
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            AudioCodec::Mp3 => "mp3",
            AudioCodec::Aac => "m4a",
            AudioCodec::Flac => "flac",
        }
    }

    pub fn is_lossless(&self) -> bool {
        matches!(self, AudioCodec::Flac)
    }
}

/// Final container/codec of a job.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OutputTarget {
    Audio {
        codec: AudioCodec,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        bitrate_kbps: Option<u32>,
    },
    /// MP4 video, streams copied.
    Video,
}

impl OutputTarget {
    /// Target implied by request mode and quality.
    ///
    /// Audio: `flac` is lossless, `best` keeps AAC, `high` and `medium` are
    /// 192k and 128k MP3, anything else is 320k MP3.
    pub fn for_request(mode: MediaMode, quality: &str) -> Self {
        if mode == MediaMode::Video {
            return OutputTarget::Video;
        }
        let (codec, bitrate_kbps) = match quality {
            "flac" => (AudioCodec::Flac, None),
            "best" => (AudioCodec::Aac, None),
            "high" => (AudioCodec::Mp3, Some(192)),
            "medium" => (AudioCodec::Mp3, Some(128)),
            _ => (AudioCodec::Mp3, Some(320)),
        };
        OutputTarget::Audio {
            codec,
            bitrate_kbps,
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            OutputTarget::Audio { codec, .. } => codec.extension(),
            OutputTarget::Video => "mp4",
        }
    }

    pub fn is_audio(&self) -> bool {
        matches!(self, OutputTarget::Audio { .. })
    }
}

/// Pitch, tempo and EQ adjustments.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
pub struct AudioFilters {
    /// Semitones.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pitch: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub speed: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub eq: Option<EqPreset>,
}

impl AudioFilters {
    pub fn from_request(request: &DownloadRequest) -> Self {
        Self {
            pitch: request.pitch,
            speed: request.speed,
            eq: request.eq_preset,
        }
    }

    /// Comma-joined `-af` value, `None` when nothing changes the audio.
    ///
    /// Pitch is applied by resampling (`asetrate`), which also changes tempo
    /// by the same factor; the `atempo` chain compensates so the net tempo
    /// equals `speed`. Each `atempo` stage stays within ffmpeg's 0.5..=2.0.
    pub fn filter_chain(&self) -> Option<String> {
        let pitch = self.pitch.unwrap_or(0);
        let speed = self.speed.unwrap_or(1.0);
        let mut filters = Vec::new();

        if pitch != 0 || (speed - 1.0).abs() > f64::EPSILON {
            let pitch_factor = 2f64.powf(pitch as f64 / 12.0);
            let new_rate = (SAMPLE_RATE as f64 * pitch_factor) as u32;
            let mut tempo = speed / pitch_factor;
            let mut stages = Vec::new();
            while tempo > 2.0 {
                stages.push(2.0);
                tempo /= 2.0;
            }
            while tempo < 0.5 {
                stages.push(0.5);
                tempo /= 0.5;
            }
            stages.push(tempo);

            filters.push(format!("asetrate={}", new_rate));
            filters.extend(stages.iter().map(|t| format!("atempo={}", t)));
            filters.push(format!("aresample={}", SAMPLE_RATE));
        }

        if let Some(eq) = self.eq {
            filters.push(eq.filter().to_string());
        }

        if filters.is_empty() {
            None
        } else {
            Some(filters.join(","))
        }
    }
}

/// Metadata tags written into the output.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Tags {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub artist: Option<String>,
}

impl Tags {
    pub fn to_ffmpeg_args(&self) -> Vec<String> {
        let mut args = Vec::new();
        if let Some(title) = &self.title {
            args.extend(["-metadata".to_string(), format!("title={}", title)]);
        }
        if let Some(artist) = &self.artist {
            args.extend(["-metadata".to_string(), format!("artist={}", artist)]);
        }
        args
    }
}

/// One transcoding invocation.
#[derive(Debug, Clone, PartialEq)]
pub struct TranscodeJob {
    pub job_id: String,
    pub input: PathBuf,
    pub output: PathBuf,
    pub target: OutputTarget,
    pub filters: AudioFilters,
    pub tags: Tags,
    /// Image embedded as attached picture (audio only).
    pub cover: Option<PathBuf>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_target_for_audio_quality() {
        let high = OutputTarget::for_request(MediaMode::Audio, "high");
        assert_eq!(
            high,
            OutputTarget::Audio {
                codec: AudioCodec::Mp3,
                bitrate_kbps: Some(192)
            }
        );
        assert_eq!(high.extension(), "mp3");
        assert_eq!(
            OutputTarget::for_request(MediaMode::Audio, "best").extension(),
            "m4a"
        );
        assert_eq!(
            OutputTarget::for_request(MediaMode::Audio, "flac").extension(),
            "flac"
        );
        assert_eq!(
            OutputTarget::for_request(MediaMode::Audio, "low"),
            OutputTarget::Audio {
                codec: AudioCodec::Mp3,
                bitrate_kbps: Some(320)
            }
        );
    }

    #[test]
    fn test_target_for_video() {
        let target = OutputTarget::for_request(MediaMode::Video, "1080p");
        assert_eq!(target, OutputTarget::Video);
        assert_eq!(target.extension(), "mp4");
        assert!(!target.is_audio());
    }

    #[test]
    fn test_no_filters() {
        assert_eq!(AudioFilters::default().filter_chain(), None);
        let neutral = AudioFilters {
            pitch: Some(0),
            speed: Some(1.0),
            eq: None,
        };
        assert_eq!(neutral.filter_chain(), None);
    }

    #[test]
    fn test_speed_only_chain() {
        let filters = AudioFilters {
            pitch: None,
            speed: Some(1.5),
            eq: None,
        };
        assert_eq!(
            filters.filter_chain().unwrap(),
            "asetrate=44100,atempo=1.5,aresample=44100"
        );
    }

    #[test]
    fn test_pitch_up_octave_compensates_tempo() {
        let filters = AudioFilters {
            pitch: Some(12),
            speed: None,
            eq: None,
        };
        assert_eq!(
            filters.filter_chain().unwrap(),
            "asetrate=88200,atempo=0.5,aresample=44100"
        );
    }

    #[test]
    fn test_atempo_stages_stay_in_range() {
        let filters = AudioFilters {
            pitch: Some(-12),
            speed: Some(2.0),
            eq: None,
        };
        let chain = filters.filter_chain().unwrap();
        assert_eq!(chain, "asetrate=22050,atempo=2,atempo=2,aresample=44100");
    }

    #[test]
    fn test_eq_appended_last() {
        let filters = AudioFilters {
            pitch: None,
            speed: Some(0.75),
            eq: Some(EqPreset::Bass),
        };
        let chain = filters.filter_chain().unwrap();
        assert!(chain.ends_with("equalizer=f=60:width_type=h:width=50:g=10"));

        let eq_only = AudioFilters {
            eq: Some(EqPreset::Vocal),
            ..AudioFilters::default()
        };
        assert_eq!(
            eq_only.filter_chain().unwrap(),
            "equalizer=f=3000:width_type=h:width=1000:g=5"
        );
    }

    #[test]
    fn test_tags_args() {
        let tags = Tags {
            title: Some("Song".to_string()),
            artist: Some("Band".to_string()),
        };
        assert_eq!(
            tags.to_ffmpeg_args(),
            vec!["-metadata", "title=Song", "-metadata", "artist=Band"]
        );
        assert!(Tags::default().to_ffmpeg_args().is_empty());
    }
}
