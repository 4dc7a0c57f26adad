use crate::calibration::OFFSET_STEP_SECONDS;
use crate::types::Mode;
use serde::{Deserialize, Serialize};

pub const DEFAULT_BACKEND_BASE_URL: &str = "http://localhost:8000";
pub const DEFAULT_USER_NAME: &str = "Anonymous";
pub const DEFAULT_CASUAL_PERSONALITY: &str = "friendly";
pub const DEFAULT_COMPETITION_PERSONALITY: &str = "strict_judge";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JudgePersonalities {
    pub casual: String,
    pub competition: String,
}

impl Default for JudgePersonalities {
    fn default() -> Self {
        Self {
            casual: DEFAULT_CASUAL_PERSONALITY.into(),
            competition: DEFAULT_COMPETITION_PERSONALITY.into(),
        }
    }
}

impl JudgePersonalities {
    pub fn for_mode(&self, mode: Mode) -> &str {
        match mode {
            Mode::Casual => &self.casual,
            Mode::Competition => &self.competition,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub backend_base_url: String,

    // Stage name used for leaderboard entries in casual mode.
    pub user_name: Option<String>,

    pub personalities: JudgePersonalities,
    pub offset_step_seconds: f64,
    pub capture_flush_interval_ms: u64,
    pub scoring_sample_rate_hz: u32,
    pub microphone_device: Option<String>,
    pub history_enabled: bool,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            backend_base_url: DEFAULT_BACKEND_BASE_URL.into(),
            user_name: None,
            personalities: JudgePersonalities::default(),
            offset_step_seconds: OFFSET_STEP_SECONDS,
            capture_flush_interval_ms: 1000,
            scoring_sample_rate_hz: 16_000,
            microphone_device: None,
            history_enabled: true,
        }
    }
}

impl AppConfig {
    pub fn display_name(&self) -> &str {
        self.user_name
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .unwrap_or(DEFAULT_USER_NAME)
    }
}
