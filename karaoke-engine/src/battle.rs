use karaoke_core::score::ScoreResult;
use karaoke_core::types::PlayerSlot;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BattleSetupError {
    #[error("player {0:?} needs a name")]
    MissingName(PlayerSlot),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "player")]
pub enum BattleOutcome {
    Winner(PlayerSlot),
    Draw,
}

/// Compares display scores; only a strictly higher score wins.
pub fn decide(p1_score: u32, p2_score: u32) -> BattleOutcome {
    match p1_score.cmp(&p2_score) {
        std::cmp::Ordering::Greater => BattleOutcome::Winner(PlayerSlot::P1),
        std::cmp::Ordering::Less => BattleOutcome::Winner(PlayerSlot::P2),
        std::cmp::Ordering::Equal => BattleOutcome::Draw,
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BattleResult {
    pub p1_name: String,
    pub p2_name: String,
    pub p1: ScoreResult,
    pub p2: ScoreResult,
    pub outcome: BattleOutcome,
}

impl BattleResult {
    pub fn winner_name(&self) -> Option<&str> {
        match self.outcome {
            BattleOutcome::Winner(PlayerSlot::P1) => Some(&self.p1_name),
            BattleOutcome::Winner(PlayerSlot::P2) => Some(&self.p2_name),
            BattleOutcome::Draw => None,
        }
    }

    pub fn is_draw(&self) -> bool {
        self.outcome == BattleOutcome::Draw
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "score")]
pub enum ScoreView {
    // Not sung yet.
    Pending,
    // Sung, but withheld until both players are done.
    Hidden,
    Revealed(u32),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BattleView {
    pub p1_name: String,
    pub p2_name: String,
    pub current_turn: PlayerSlot,
    pub p1_score: ScoreView,
    pub p2_score: ScoreView,
}

/// What the session should do after a turn's score arrives.
#[derive(Debug, Clone, PartialEq)]
pub enum TurnOutcome {
    Intermission,
    Reveal(BattleResult),
}

/// Turn bookkeeping for a two-player battle. Lives exactly as long as one battle.
#[derive(Debug, Clone, PartialEq)]
pub struct BattleTurnManager {
    p1_name: String,
    p2_name: String,
    p1_score: Option<ScoreResult>,
    p2_score: Option<ScoreResult>,
    current_turn: PlayerSlot,
}

impl BattleTurnManager {
    pub fn new(p1: &str, p2: &str) -> Result<Self, BattleSetupError> {
        let p1 = p1.trim();
        let p2 = p2.trim();
        if p1.is_empty() {
            return Err(BattleSetupError::MissingName(PlayerSlot::P1));
        }
        if p2.is_empty() {
            return Err(BattleSetupError::MissingName(PlayerSlot::P2));
        }
        Ok(Self {
            p1_name: p1.to_string(),
            p2_name: p2.to_string(),
            p1_score: None,
            p2_score: None,
            current_turn: PlayerSlot::P1,
        })
    }

    pub fn current_turn(&self) -> PlayerSlot {
        self.current_turn
    }

    pub fn player_name(&self, slot: PlayerSlot) -> &str {
        match slot {
            PlayerSlot::P1 => &self.p1_name,
            PlayerSlot::P2 => &self.p2_name,
        }
    }

    pub fn score(&self, slot: PlayerSlot) -> Option<&ScoreResult> {
        match slot {
            PlayerSlot::P1 => self.p1_score.as_ref(),
            PlayerSlot::P2 => self.p2_score.as_ref(),
        }
    }

    /// Stores the score for whoever just sang.
    pub fn record(&mut self, result: ScoreResult) -> TurnOutcome {
        match self.current_turn {
            PlayerSlot::P1 => {
                self.p1_score = Some(result);
                TurnOutcome::Intermission
            }
            PlayerSlot::P2 => {
                self.p2_score = Some(result);
                match self.reveal() {
                    Some(r) => TurnOutcome::Reveal(r),
                    // P2 can only sing after P1 has been recorded.
                    None => TurnOutcome::Intermission,
                }
            }
        }
    }

    /// Hands the stage to player two. Only valid once player one has a score.
    pub fn advance_to_round_two(&mut self) -> bool {
        if self.current_turn != PlayerSlot::P1 || self.p1_score.is_none() {
            return false;
        }
        self.current_turn = PlayerSlot::P2;
        true
    }

    /// Undoes [`advance_to_round_two`](Self::advance_to_round_two) when player two never sang.
    pub fn return_to_round_one(&mut self) -> bool {
        if self.current_turn != PlayerSlot::P2 || self.p2_score.is_some() {
            return false;
        }
        self.current_turn = PlayerSlot::P1;
        true
    }

    pub fn reveal(&self) -> Option<BattleResult> {
        let (p1, p2) = (self.p1_score.as_ref()?, self.p2_score.as_ref()?);
        Some(BattleResult {
            p1_name: self.p1_name.clone(),
            p2_name: self.p2_name.clone(),
            p1: p1.clone(),
            p2: p2.clone(),
            outcome: decide(p1.display_score(), p2.display_score()),
        })
    }

    pub fn view(&self) -> BattleView {
        let both_done = self.p1_score.is_some() && self.p2_score.is_some();
        let show = |s: &Option<ScoreResult>| match s {
            None => ScoreView::Pending,
            Some(_) if !both_done => ScoreView::Hidden,
            Some(r) => ScoreView::Revealed(r.display_score()),
        };
        BattleView {
            p1_name: self.p1_name.clone(),
            p2_name: self.p2_name.clone(),
            current_turn: self.current_turn,
            p1_score: show(&self.p1_score),
            p2_score: show(&self.p2_score),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn score(overall: f64) -> ScoreResult {
        ScoreResult {
            overall_score: overall,
            ..Default::default()
        }
    }

    #[test]
    fn rejects_blank_names() {
        assert_eq!(
            BattleTurnManager::new("  ", "Bob"),
            Err(BattleSetupError::MissingName(PlayerSlot::P1))
        );
        assert_eq!(
            BattleTurnManager::new("Alice", ""),
            Err(BattleSetupError::MissingName(PlayerSlot::P2))
        );
    }

    #[test]
    fn full_battle_reveals_higher_score() {
        let mut b = BattleTurnManager::new(" Alice ", "Bob").unwrap();
        assert_eq!(b.player_name(PlayerSlot::P1), "Alice");
        assert!(!b.advance_to_round_two());

        assert_eq!(b.record(score(0.8)), TurnOutcome::Intermission);
        assert_eq!(b.view().p1_score, ScoreView::Hidden);
        assert_eq!(b.view().p2_score, ScoreView::Pending);
        assert!(b.reveal().is_none());

        assert!(b.advance_to_round_two());
        assert!(!b.advance_to_round_two());
        assert_eq!(b.current_turn(), PlayerSlot::P2);

        let TurnOutcome::Reveal(result) = b.record(score(0.6)) else {
            panic!("expected reveal");
        };
        assert_eq!(result.outcome, BattleOutcome::Winner(PlayerSlot::P1));
        assert_eq!(result.winner_name(), Some("Alice"));
        assert!(!result.is_draw());
        assert_eq!(b.view().p1_score, ScoreView::Revealed(8000));
        assert_eq!(b.view().p2_score, ScoreView::Revealed(6000));
    }

    #[test]
    fn round_two_can_be_handed_back_until_player_two_scores() {
        let mut b = BattleTurnManager::new("Alice", "Bob").unwrap();
        assert!(!b.return_to_round_one());
        b.record(score(0.8));
        assert!(b.advance_to_round_two());
        assert!(b.return_to_round_one());
        assert_eq!(b.current_turn(), PlayerSlot::P1);
        assert_eq!(b.view().p1_score, ScoreView::Hidden);

        assert!(b.advance_to_round_two());
        b.record(score(0.6));
        assert!(!b.return_to_round_one());
        assert_eq!(b.current_turn(), PlayerSlot::P2);
    }

    #[test]
    fn equal_scores_are_a_draw() {
        let mut b = BattleTurnManager::new("Alice", "Bob").unwrap();
        b.record(score(0.75));
        b.advance_to_round_two();
        let TurnOutcome::Reveal(result) = b.record(score(0.75)) else {
            panic!("expected reveal");
        };
        assert!(result.is_draw());
        assert_eq!(result.winner_name(), None);
    }

    #[test]
    fn decide_compares_display_scores() {
        assert_eq!(decide(6000, 8000), BattleOutcome::Winner(PlayerSlot::P2));
        assert_eq!(decide(7000, 7000), BattleOutcome::Draw);
        // Sub-point differences do not survive the display scale.
        assert_eq!(
            decide(score(0.70001).display_score(), score(0.700015).display_score()),
            BattleOutcome::Draw
        );
    }
}
