use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PerformanceId(pub Uuid);

impl PerformanceId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for PerformanceId {
    fn default() -> Self {
        Self::new()
    }
}

/// One time-stamped lyric cue. `timestamp` is in seconds from the start of the reference track.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LyricLine {
    pub text: String,
    // Some lyric sources emit `start_time` instead of `timestamp`.
    #[serde(alias = "start_time")]
    pub timestamp: f64,
}

impl LyricLine {
    pub fn new(text: impl Into<String>, timestamp: f64) -> Self {
        Self {
            text: text.into(),
            timestamp,
        }
    }
}

/// What the reference media element should load for a session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlaybackSource {
    pub url: String,
    pub track_name: String,
    pub source_file_path: String,
    pub is_alternate_variant: bool,
}

impl PlaybackSource {
    /// Two sources are the same song when they point at the same downloaded file.
    pub fn is_same_song(&self, other: &PlaybackSource) -> bool {
        if self.source_file_path.is_empty() || other.source_file_path.is_empty() {
            return self.url == other.url;
        }
        self.source_file_path == other.source_file_path
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    Casual,
    Competition,
}

impl Mode {
    pub fn as_str(self) -> &'static str {
        match self {
            Mode::Casual => "casual",
            Mode::Competition => "competition",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlayerSlot {
    P1,
    P2,
}

impl PlayerSlot {
    pub fn other(self) -> Self {
        match self {
            PlayerSlot::P1 => PlayerSlot::P2,
            PlayerSlot::P2 => PlayerSlot::P1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn source(path: &str, url: &str) -> PlaybackSource {
        PlaybackSource {
            url: url.into(),
            track_name: "Song".into(),
            source_file_path: path.into(),
            is_alternate_variant: false,
        }
    }

    #[test]
    fn lyric_line_accepts_start_time_alias() {
        let line: LyricLine = serde_json::from_str(r#"{"text":"hi","start_time":1.5}"#).unwrap();
        assert_eq!(line, LyricLine::new("hi", 1.5));
    }

    #[test]
    fn same_song_compares_file_path_then_url() {
        assert!(source("a.mp4", "/songs/a.mp4").is_same_song(&source("a.mp4", "/x")));
        assert!(!source("a.mp4", "/songs/a.mp4").is_same_song(&source("b.mp4", "/songs/a.mp4")));
        assert!(source("", "/songs/a.mp4").is_same_song(&source("", "/songs/a.mp4")));
    }

    #[test]
    fn player_slot_other_flips() {
        assert_eq!(PlayerSlot::P1.other(), PlayerSlot::P2);
        assert_eq!(PlayerSlot::P2.other(), PlayerSlot::P1);
    }
}
