use karaoke_core::calibration::Offset;
use karaoke_core::score::{Grade, PerformanceFeedback, ScoreResult};
use karaoke_core::types::{Mode, PerformanceId};
use serde::{Deserialize, Serialize};

use crate::battle::{BattleResult, BattleView};
use crate::capture::CaptureStage;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Search,
    Playing,
    Submitting,
    Evaluation,
    BattleSetup,
    BattleIntermission,
    BattleReveal,
}

impl SessionState {
    /// Where a fresh (or reset) session of this mode begins.
    pub fn initial(mode: Mode) -> Self {
        match mode {
            Mode::Casual => SessionState::Search,
            Mode::Competition => SessionState::BattleSetup,
        }
    }

    // A stable string label for UI display.
    pub fn label(self) -> &'static str {
        match self {
            SessionState::Search => "search",
            SessionState::Playing => "playing",
            SessionState::Submitting => "submitting",
            SessionState::Evaluation => "evaluation",
            SessionState::BattleSetup => "battle_setup",
            SessionState::BattleIntermission => "battle_intermission",
            SessionState::BattleReveal => "battle_reveal",
        }
    }
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NoticeLevel {
    Warning,
    Error,
}

/// A user-visible message that does not by itself change the session state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notice {
    pub level: NoticeLevel,
    pub message: String,
}

impl Notice {
    pub fn warning(message: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Warning,
            message: message.into(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Error,
            message: message.into(),
        }
    }
}

/// One scored take, as handed to history and display layers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerformanceRecord {
    pub id: PerformanceId,
    pub mode: Mode,
    pub player_name: String,
    pub song: String,
    pub feedback: PerformanceFeedback,
}

impl PerformanceRecord {
    pub fn display_score(&self) -> u32 {
        self.feedback.evaluation.display_score()
    }

    pub fn grade(&self) -> Grade {
        self.feedback.evaluation.grade()
    }
}

/// Result of a finish request.
#[derive(Debug, Clone, PartialEq)]
pub enum FinishOutcome {
    // Another finish already ran for this turn, or nothing was playing.
    Ignored,
    Scored {
        record: PerformanceRecord,
        next: SessionState,
    },
}

/// Serializable view of the whole session for the UI layer.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionSnapshot {
    pub state: SessionState,
    pub state_label: String,
    pub mode: Mode,
    pub song: Option<String>,
    pub is_alternate_variant: bool,
    pub offset: Offset,
    pub line_count: usize,
    pub active_line: Option<usize>,
    pub current_time: f64,
    pub is_playing: bool,
    pub capture: CaptureStage,
    pub busy: bool,
    pub battle: Option<BattleView>,
    pub last_score: Option<ScoreResult>,
    pub last_feedback: Option<String>,
    pub battle_result: Option<BattleResult>,
    pub notice: Option<Notice>,
    pub disposed: bool,
}
