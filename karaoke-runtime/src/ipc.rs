//! Display payloads shared by the front-ends.

use karaoke_core::score::{DiffStatus, Grade, ScoreResult};
use karaoke_engine::battle::BattleResult;
use karaoke_engine::session::PerformanceRecord;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PitchBreakdown {
    pub perfect_percent: u32,
    pub close_percent: u32,
}

/// One result screen's worth of numbers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoreCard {
    pub score: u32,
    pub grade: Grade,
    pub pitch_percent: u32,
    pub rhythm_percent: u32,
    pub lyrics_percent: u32,
    pub pitch: Option<PitchBreakdown>,
    // Words the singer skipped or got wrong, in lyric order.
    pub missed_words: Vec<String>,
}

impl ScoreCard {
    pub fn from_score(result: &ScoreResult) -> Self {
        Self {
            score: result.display_score(),
            grade: result.grade(),
            pitch_percent: percent(result.pitch_accuracy),
            rhythm_percent: percent(result.rhythm),
            lyrics_percent: percent(result.lyrics_score),
            pitch: result.pitch_detail.map(|d| PitchBreakdown {
                perfect_percent: percent(d.perfect),
                close_percent: percent(d.close()),
            }),
            missed_words: result
                .lyrics_diff
                .iter()
                .flatten()
                .filter(|e| matches!(e.status, DiffStatus::Missing | DiffStatus::Wrong))
                .map(|e| e.word.clone())
                .collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PerformanceSummary {
    pub player: String,
    pub song: String,
    pub card: ScoreCard,
    pub feedback: String,
}

impl From<&PerformanceRecord> for PerformanceSummary {
    fn from(record: &PerformanceRecord) -> Self {
        Self {
            player: record.player_name.clone(),
            song: record.song.clone(),
            card: ScoreCard::from_score(&record.feedback.evaluation),
            feedback: record.feedback.feedback.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BattleSummary {
    pub p1_name: String,
    pub p2_name: String,
    pub p1: ScoreCard,
    pub p2: ScoreCard,
    pub winner: Option<String>,
    pub is_draw: bool,
}

impl From<&BattleResult> for BattleSummary {
    fn from(result: &BattleResult) -> Self {
        Self {
            p1_name: result.p1_name.clone(),
            p2_name: result.p2_name.clone(),
            p1: ScoreCard::from_score(&result.p1),
            p2: ScoreCard::from_score(&result.p2),
            winner: result.winner_name().map(str::to_string),
            is_draw: result.is_draw(),
        }
    }
}

fn percent(fraction: f64) -> u32 {
    let p = (fraction * 100.0).round();
    if p.is_nan() || p <= 0.0 { 0 } else { p as u32 }
}

#[cfg(test)]
mod tests {
    use super::*;
    use karaoke_core::score::{LyricsDiffEntry, PitchDetail};
    use karaoke_engine::battle::BattleOutcome;
    use karaoke_core::types::PlayerSlot;

    fn result(overall: f64) -> ScoreResult {
        ScoreResult {
            overall_score: overall,
            pitch_accuracy: 0.824,
            rhythm: 0.5,
            lyrics_score: 1.0,
            pitch_detail: Some(PitchDetail {
                perfect: 0.75,
                high: 0.125,
                low: 0.125,
            }),
            lyrics_diff: Some(vec![
                LyricsDiffEntry {
                    word: "dancing".into(),
                    status: DiffStatus::Matched,
                    heard: None,
                },
                LyricsDiffEntry {
                    word: "queen".into(),
                    status: DiffStatus::Missing,
                    heard: None,
                },
                LyricsDiffEntry {
                    word: "seventeen".into(),
                    status: DiffStatus::Wrong,
                    heard: Some("sixteen".into()),
                },
            ]),
        }
    }

    #[test]
    fn card_rounds_percentages_and_lists_missed_words() {
        let card = ScoreCard::from_score(&result(0.75));
        assert_eq!(card.score, 7500);
        assert_eq!(card.grade, Grade::B);
        assert_eq!(card.pitch_percent, 82);
        assert_eq!(card.rhythm_percent, 50);
        assert_eq!(card.lyrics_percent, 100);
        assert_eq!(
            card.pitch,
            Some(PitchBreakdown {
                perfect_percent: 75,
                close_percent: 25,
            })
        );
        assert_eq!(card.missed_words, vec!["queen", "seventeen"]);
    }

    #[test]
    fn empty_result_yields_zeroes() {
        let card = ScoreCard::from_score(&ScoreResult::default());
        assert_eq!(card.score, 0);
        assert_eq!(card.grade, Grade::D);
        assert_eq!(card.pitch, None);
        assert!(card.missed_words.is_empty());
    }

    #[test]
    fn battle_summary_names_the_winner() {
        let battle = BattleResult {
            p1_name: "Alice".into(),
            p2_name: "Bob".into(),
            p1: result(0.8),
            p2: result(0.6),
            outcome: BattleOutcome::Winner(PlayerSlot::P1),
        };
        let summary = BattleSummary::from(&battle);
        assert_eq!(summary.winner.as_deref(), Some("Alice"));
        assert!(!summary.is_draw);
        assert_eq!(summary.p1.score, 8000);
        assert_eq!(summary.p2.score, 6000);
    }
}
