use std::time::{Duration, Instant};

/// Groups small device callbacks into chunks of roughly `interval` wall time.
#[derive(Debug)]
pub struct FlushBuffer {
    interval: Duration,
    pending: Vec<f32>,
    last_flush: Instant,
}

impl FlushBuffer {
    pub fn new(interval: Duration, now: Instant) -> Self {
        Self {
            interval,
            pending: Vec::new(),
            last_flush: now,
        }
    }

    /// Appends samples; returns a chunk once an interval has elapsed since the last flush.
    pub fn push(&mut self, samples: &[f32], now: Instant) -> Option<Vec<f32>> {
        self.pending.extend_from_slice(samples);
        if now.saturating_duration_since(self.last_flush) < self.interval {
            return None;
        }
        self.last_flush = now;
        if self.pending.is_empty() {
            return None;
        }
        Some(std::mem::take(&mut self.pending))
    }

    /// Whatever is left after the last full interval.
    pub fn finish(&mut self) -> Vec<f32> {
        std::mem::take(&mut self.pending)
    }
}

/// Downmixes interleaved frames to mono by averaging channels.
pub fn downmix(data: &[f32], channels: usize) -> Vec<f32> {
    if channels <= 1 {
        return data.to_vec();
    }
    data.chunks_exact(channels)
        .map(|frame| frame.iter().sum::<f32>() / channels as f32)
        .collect()
}
