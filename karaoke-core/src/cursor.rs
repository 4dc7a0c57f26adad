use crate::types::LyricLine;

/// Index of the line being sung at `current_time`, or `None` before the first cue.
///
/// `lines` must already be calibrated and sorted ascending. The scan stops at the first cue in
/// the future, so cost grows with the current position rather than the song length.
pub fn active_line_index(lines: &[LyricLine], current_time: f64) -> Option<usize> {
    let mut active = None;
    for (i, line) in lines.iter().enumerate() {
        if line.timestamp <= current_time {
            active = Some(i);
        } else {
            break;
        }
    }
    active
}

/// Tick-to-tick tracker around [`active_line_index`].
///
/// `update` reports a value only when the active line changed since the previous tick, so the
/// consumer can scroll the line into view exactly once per change.
#[derive(Debug, Clone, Default)]
pub struct LyricCursor {
    current: Option<usize>,
}

impl LyricCursor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current(&self) -> Option<usize> {
        self.current
    }

    pub fn update(&mut self, lines: &[LyricLine], current_time: f64) -> Option<Option<usize>> {
        let next = active_line_index(lines, current_time);
        if next == self.current {
            return None;
        }
        self.current = next;
        Some(next)
    }

    pub fn reset(&mut self) {
        self.current = None;
    }
}
