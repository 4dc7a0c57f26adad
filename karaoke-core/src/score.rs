use serde::{Deserialize, Serialize};

/// Scale applied to `overall_score` before it is shown or recorded.
pub const DISPLAY_SCORE_SCALE: f64 = 10_000.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiffStatus {
    Matched,
    Wrong,
    Missing,
    Extra,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LyricsDiffEntry {
    pub word: String,
    pub status: DiffStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub heard: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct PitchDetail {
    #[serde(default)]
    pub perfect: f64,
    #[serde(default)]
    pub high: f64,
    #[serde(default)]
    pub low: f64,
}

impl PitchDetail {
    /// Fraction of frames that were off by a small amount in either direction.
    pub fn close(&self) -> f64 {
        self.high + self.low
    }
}

/// Scorer output. The controller routes it; it never computes any of these values.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ScoreResult {
    #[serde(rename = "overall_score", default)]
    pub overall_score: f64,
    #[serde(rename = "pitch_accuracy_score", default)]
    pub pitch_accuracy: f64,
    #[serde(rename = "rhythm_score", default)]
    pub rhythm: f64,
    #[serde(default)]
    pub lyrics_score: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pitch_detail: Option<PitchDetail>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lyrics_diff: Option<Vec<LyricsDiffEntry>>,
}

impl ScoreResult {
    pub fn display_score(&self) -> u32 {
        display_score(self.overall_score)
    }

    pub fn grade(&self) -> Grade {
        Grade::from_display_score(self.display_score())
    }

    /// A zero score means nothing meaningful was sung (aborted or silent take).
    pub fn is_meaningful(&self) -> bool {
        self.display_score() > 0
    }
}

/// `floor(overall × 10000)`, saturating at zero for negative or NaN input.
pub fn display_score(overall_score: f64) -> u32 {
    let scaled = (overall_score * DISPLAY_SCORE_SCALE).floor();
    if scaled.is_nan() || scaled <= 0.0 {
        0
    } else if scaled >= u32::MAX as f64 {
        u32::MAX
    } else {
        scaled as u32
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Grade {
    S,
    A,
    B,
    C,
    D,
}

impl Grade {
    pub fn from_display_score(score: u32) -> Self {
        match score {
            s if s > 9000 => Grade::S,
            s if s > 8000 => Grade::A,
            s if s > 7000 => Grade::B,
            s if s > 6000 => Grade::C,
            _ => Grade::D,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Grade::S => "S",
            Grade::A => "A",
            Grade::B => "B",
            Grade::C => "C",
            Grade::D => "D",
        }
    }
}

/// Full scorer response: numbers plus the judge's written verdict.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerformanceFeedback {
    pub evaluation: ScoreResult,
    #[serde(default)]
    pub feedback: String,
}
