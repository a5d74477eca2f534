use std::fmt;

use serde::{Deserialize, Serialize};

/// A validated reference to a piece of remote media. Only the URL
/// validator constructs these; `content_id` is always 11 characters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VideoReference {
    pub source_url: String,
    pub content_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VideoMetadata {
    pub title: String,
    pub author: String,
    pub duration_display: String,
    pub thumbnail_url: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Quality {
    #[serde(rename = "1080p")]
    Q1080,
    #[serde(rename = "720p")]
    Q720,
    #[serde(rename = "480p")]
    Q480,
    #[serde(rename = "360p")]
    Q360,
}

impl Quality {
    pub fn height(self) -> u32 {
        match self {
            Self::Q1080 => 1080,
            Self::Q720 => 720,
            Self::Q480 => 480,
            Self::Q360 => 360,
        }
    }
}

impl fmt::Display for Quality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}p", self.height())
    }
}

/// A quality only exists for video downloads; an audio selection with a
/// stray `quality` key deserializes to `Audio` and the key is ignored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "format", rename_all = "lowercase")]
pub enum DownloadSelection {
    Video { quality: Quality },
    Audio,
}

impl DownloadSelection {
    pub fn kind_label(self) -> &'static str {
        match self {
            Self::Video { .. } => "video",
            Self::Audio => "audio",
        }
    }

    pub fn file_extension(self) -> &'static str {
        match self {
            Self::Video { .. } => "mp4",
            Self::Audio => "mp3",
        }
    }

    pub fn quality(self) -> Option<Quality> {
        match self {
            Self::Video { quality } => Some(quality),
            Self::Audio => None,
        }
    }
}
