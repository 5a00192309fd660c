//! Extractor data types.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Stage a fetch is in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProgressPhase {
    Downloading,
    /// Merging, remuxing or other local post-processing by the extractor.
    Processing,
}

/// Raw progress reported during a fetch.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ProgressEvent {
    pub bytes_done: u64,
    pub bytes_total: Option<u64>,
    pub phase: ProgressPhase,
}

impl ProgressEvent {
    pub fn downloading(bytes_done: u64, bytes_total: Option<u64>) -> Self {
        Self {
            bytes_done,
            bytes_total,
            phase: ProgressPhase::Downloading,
        }
    }

    pub fn processing() -> Self {
        Self {
            bytes_done: 0,
            bytes_total: None,
            phase: ProgressPhase::Processing,
        }
    }

    /// Percentage when the total is known.
    pub fn percent(&self) -> Option<f64> {
        match self.bytes_total {
            Some(total) if total > 0 => {
                Some((self.bytes_done as f64 / total as f64 * 100.0).min(100.0))
            }
            _ => None,
        }
    }
}

/// Descriptive information about one media item.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Metadata {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uploader: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub artist: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thumbnail: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub webpage_url: Option<String>,
}

/// Files left behind by a successful fetch.
#[derive(Debug, Clone, PartialEq)]
pub struct Artifact {
    /// Never empty. More than one only for playlist fetches.
    pub files: Vec<PathBuf>,
    /// Metadata of fetched items, in the order the extractor reported them.
    pub metadata: Vec<Metadata>,
    /// Source thumbnails written next to the media, converted to jpg.
    pub thumbnails: Vec<PathBuf>,
}

impl Artifact {
    pub fn single(path: PathBuf, metadata: Metadata) -> Self {
        Self {
            files: vec![path],
            metadata: vec![metadata],
            thumbnails: Vec::new(),
        }
    }

    pub fn with_thumbnail(mut self, path: PathBuf) -> Self {
        self.thumbnails.push(path);
        self
    }

    /// Thumbnail sharing the media file's stem, or the only one fetched.
    pub fn thumbnail_for(&self, path: &Path) -> Option<&PathBuf> {
        let stem = path.file_stem()?;
        self.thumbnails
            .iter()
            .find(|t| t.file_stem() == Some(stem))
            .or_else(|| match (self.files.len(), self.thumbnails.len()) {
                (1, 1) => self.thumbnails.first(),
                _ => None,
            })
    }

    /// Metadata for a fetched file, matched on the item id used as file stem.
    pub fn metadata_for(&self, path: &Path) -> Option<&Metadata> {
        let stem = path.file_stem()?.to_str()?;
        self.metadata
            .iter()
            .find(|m| m.id == stem)
            .or_else(|| match self.files.len() {
                1 => self.metadata.first(),
                _ => None,
            })
    }
}

/// One entry of a flat playlist listing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlaylistEntry {
    pub index: usize,
    pub id: String,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thumbnail: Option<String>,
    pub duration: f64,
    pub duration_string: String,
    pub uploader: String,
    pub url: String,
}

/// A playlist and its (possibly truncated) entries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlaylistInfo {
    pub id: String,
    pub title: String,
    pub uploader: String,
    pub entries: Vec<PlaylistEntry>,
}

/// `195` -> `3:15`, `3725` -> `1:02:05`.
pub fn format_duration(seconds: f64) -> String {
    let total = seconds.max(0.0) as u64;
    let (h, m, s) = (total / 3600, (total % 3600) / 60, total % 60);
    if h > 0 {
        format!("{}:{:02}:{:02}", h, m, s)
    } else {
        format!("{}:{:02}", m, s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_percent() {
        assert_eq!(ProgressEvent::downloading(50, Some(200)).percent(), Some(25.0));
        assert_eq!(ProgressEvent::downloading(50, None).percent(), None);
        assert_eq!(ProgressEvent::downloading(300, Some(200)).percent(), Some(100.0));
        assert_eq!(ProgressEvent::processing().percent(), None);
    }

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(0.0), "0:00");
        assert_eq!(format_duration(195.4), "3:15");
        assert_eq!(format_duration(3725.0), "1:02:05");
    }

    #[test]
    fn test_metadata_for_matches_stem() {
        let artifact = Artifact {
            files: vec![PathBuf::from("/w/a1.webm"), PathBuf::from("/w/b2.webm")],
            metadata: vec![
                Metadata {
                    id: "b2".to_string(),
                    title: "Second".to_string(),
                    ..Metadata::default()
                },
                Metadata {
                    id: "a1".to_string(),
                    title: "First".to_string(),
                    ..Metadata::default()
                },
            ],
            thumbnails: vec![PathBuf::from("/w/b2.jpg"), PathBuf::from("/w/a1.jpg")],
        };
        assert_eq!(
            artifact.metadata_for(Path::new("/w/a1.webm")).unwrap().title,
            "First"
        );
        assert!(artifact.metadata_for(Path::new("/w/zz.webm")).is_none());
        assert_eq!(
            artifact.thumbnail_for(Path::new("/w/a1.webm")),
            Some(&PathBuf::from("/w/a1.jpg"))
        );
        assert!(artifact.thumbnail_for(Path::new("/w/zz.webm")).is_none());
    }

    #[test]
    fn test_metadata_for_single_file_fallback() {
        let artifact = Artifact::single(
            PathBuf::from("/w/whatever.m4a"),
            Metadata {
                id: "abc".to_string(),
                title: "Only".to_string(),
                ..Metadata::default()
            },
        );
        assert_eq!(
            artifact
                .metadata_for(Path::new("/w/whatever.m4a"))
                .unwrap()
                .title,
            "Only"
        );
        assert!(artifact.thumbnail_for(Path::new("/w/whatever.m4a")).is_none());

        let artifact = artifact.with_thumbnail(PathBuf::from("/w/cover.jpg"));
        assert_eq!(
            artifact.thumbnail_for(Path::new("/w/whatever.m4a")),
            Some(&PathBuf::from("/w/cover.jpg"))
        );
    }
}
