use crate::types::LyricLine;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Step applied by the manual "+" / "-" offset buttons, in seconds.
pub const OFFSET_STEP_SECONDS: f64 = 0.5;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CalibrationError {
    #[error("no lyrics loaded to sync against")]
    EmptyLyrics,
}

/// Manual audio/lyric offset in seconds.
///
/// The effective time of every cue is `timestamp - offset`, both on screen and in the copy sent
/// to the scorer. A positive offset makes lyrics appear earlier. There is no clamping: the
/// singer decides what looks right.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Offset(pub f64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OffsetStep {
    Earlier,
    Later,
}

impl Offset {
    pub const ZERO: Offset = Offset(0.0);

    pub fn seconds(self) -> f64 {
        self.0
    }

    pub fn stepped(self, step: OffsetStep, step_seconds: f64) -> Offset {
        match step {
            OffsetStep::Later => Offset(self.0 + step_seconds),
            OffsetStep::Earlier => Offset(self.0 - step_seconds),
        }
    }

    pub fn effective(self, timestamp: f64) -> f64 {
        timestamp - self.0
    }

    /// Wire form used by the scoring endpoint (`"0"`, `"-1.5"`, ...).
    pub fn to_form_value(self) -> String {
        self.0.to_string()
    }
}

impl std::ops::Add for Offset {
    type Output = Offset;

    fn add(self, rhs: Offset) -> Offset {
        Offset(self.0 + rhs.0)
    }
}

/// Returns a calibrated copy of `lines`. Text and order are untouched.
pub fn apply_offset(lines: &[LyricLine], offset: Offset) -> Vec<LyricLine> {
    lines
        .iter()
        .map(|l| LyricLine {
            text: l.text.clone(),
            timestamp: offset.effective(l.timestamp),
        })
        .collect()
}

/// Offset that makes the first cue land exactly at `current_playback_time`.
pub fn sync_to_start(
    lines: &[LyricLine],
    current_playback_time: f64,
) -> Result<Offset, CalibrationError> {
    let first = lines.first().ok_or(CalibrationError::EmptyLyrics)?;
    Ok(Offset(first.timestamp - current_playback_time))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lines(ts: &[f64]) -> Vec<LyricLine> {
        ts.iter()
            .enumerate()
            .map(|(i, t)| LyricLine::new(format!("line {i}"), *t))
            .collect()
    }

    fn stamps(lines: &[LyricLine]) -> Vec<f64> {
        lines.iter().map(|l| l.timestamp).collect()
    }

    #[test]
    fn negative_offset_shifts_cues_later() {
        let out = apply_offset(&lines(&[0.0, 2.0, 5.0]), Offset(-2.0));
        assert_eq!(stamps(&out), vec![2.0, 4.0, 7.0]);
    }

    #[test]
    fn apply_keeps_text_and_does_not_touch_input() {
        let raw = lines(&[1.0, 3.0]);
        let out = apply_offset(&raw, Offset(0.5));
        assert_eq!(out[0].text, "line 0");
        assert_eq!(out[1].text, "line 1");
        assert_eq!(stamps(&raw), vec![1.0, 3.0]);
        assert_eq!(stamps(&out), vec![0.5, 2.5]);
    }

    #[test]
    fn offsets_compose_additively() {
        let raw = lines(&[0.0, 1.25, 7.5, 12.0]);
        for (o1, o2) in [(0.5, -1.5), (3.0, 2.0), (-0.5, -0.5), (0.0, 4.5)] {
            let twice = apply_offset(&apply_offset(&raw, Offset(o1)), Offset(o2));
            let once = apply_offset(&raw, Offset(o1) + Offset(o2));
            for (a, b) in stamps(&twice).iter().zip(stamps(&once)) {
                assert!((a - b).abs() < 1e-9, "{a} != {b}");
            }
        }
    }

    #[test]
    fn sync_to_start_lands_first_line_on_playhead() {
        let raw = lines(&[10.0, 14.0]);
        let offset = sync_to_start(&raw, 7.0).unwrap();
        assert_eq!(offset, Offset(3.0));
        assert_eq!(apply_offset(&raw, offset)[0].timestamp, 7.0);
    }

    #[test]
    fn sync_to_start_requires_lyrics() {
        assert_eq!(sync_to_start(&[], 3.0), Err(CalibrationError::EmptyLyrics));
    }

    #[test]
    fn steps_are_relative_and_unbounded() {
        let mut o = Offset::ZERO;
        for _ in 0..100 {
            o = o.stepped(OffsetStep::Earlier, OFFSET_STEP_SECONDS);
        }
        assert_eq!(o, Offset(-50.0));
        assert_eq!(o.stepped(OffsetStep::Later, OFFSET_STEP_SECONDS), Offset(-49.5));
    }

    #[test]
    fn form_value_matches_plain_decimal() {
        assert_eq!(Offset(0.0).to_form_value(), "0");
        assert_eq!(Offset(-1.5).to_form_value(), "-1.5");
        assert_eq!(Offset(2.0).to_form_value(), "2");
    }
}
