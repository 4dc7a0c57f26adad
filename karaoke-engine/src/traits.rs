use async_trait::async_trait;
use karaoke_core::score::PerformanceFeedback;
use karaoke_core::types::{LyricLine, PlaybackSource};
use karaoke_providers::backend::{EvaluationRequest, LeaderboardWrite};
use karaoke_providers::parse::SongResolution;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc;

use crate::session::{Notice, SessionSnapshot};

#[derive(Debug, Clone, PartialEq)]
pub struct AudioChunk {
    pub sample_rate_hz: u32,
    pub samples: Vec<f32>,
}

/// One finalized take: mono PCM at `sample_rate_hz`.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedAudio {
    pub sample_rate_hz: u32,
    pub samples: Vec<f32>,
}

impl RecordedAudio {
    pub fn duration(&self) -> Duration {
        if self.sample_rate_hz == 0 {
            return Duration::ZERO;
        }
        Duration::from_secs_f64(self.samples.len() as f64 / self.sample_rate_hz as f64)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaptureConstraints {
    pub echo_cancellation: bool,
    pub noise_suppression: bool,
    pub auto_gain_control: bool,
}

impl Default for CaptureConstraints {
    fn default() -> Self {
        Self {
            echo_cancellation: true,
            noise_suppression: true,
            auto_gain_control: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum CaptureCapability {
    Available,
    Unavailable(String),
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CaptureError {
    #[error("microphone access required")]
    PermissionDenied,

    #[error("no microphone found")]
    DeviceNotFound,

    #[error("audio capture unavailable: {0}")]
    Unavailable(String),

    #[error("recorder failed: {0}")]
    Recorder(String),
}

/// Events a running recorder pushes to its coordinator.
#[derive(Debug, Clone, PartialEq)]
pub enum RecorderEvent {
    Data(AudioChunk),
    // The input track ended underneath us (device unplugged, permission revoked, ...).
    TrackEnded(String),
    // Final event after a stop request; no `Data` follows it.
    Stopped,
}

#[async_trait]
pub trait Microphone: Send + Sync {
    /// Whether this host can capture audio at all. Queried once per controller.
    fn capability(&self) -> CaptureCapability;

    async fn acquire(
        &self,
        constraints: &CaptureConstraints,
    ) -> Result<Box<dyn MicrophoneStream>, CaptureError>;
}

pub trait MicrophoneStream: Send {
    /// Starts recording. Chunks are flushed to `events` every `flush_interval`.
    fn start(
        &mut self,
        flush_interval: Duration,
        events: mpsc::UnboundedSender<RecorderEvent>,
    ) -> Result<(), CaptureError>;

    /// Asks the recorder to flush its last chunk and then send `Stopped`.
    fn request_stop(&mut self) -> Result<(), CaptureError>;

    /// Releases the underlying device. Called exactly once, last.
    fn release(&mut self) {}
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PlaybackError {
    #[error("playback blocked until the user interacts with the page")]
    AutoplayBlocked,

    #[error("playback failed: {0}")]
    Failed(String),
}

/// The reference media element, driven by the controller.
///
/// Playback progress flows back through the controller's `on_*` callbacks.
#[async_trait]
pub trait MediaTransport: Send + Sync {
    async fn load(&self, source: &PlaybackSource) -> anyhow::Result<()>;
    async fn play(&self) -> Result<(), PlaybackError>;
    async fn pause(&self);
    async fn seek(&self, seconds: f64);
}

#[async_trait]
pub trait SongResolver: Send + Sync {
    async fn resolve(&self, query: &str) -> anyhow::Result<SongResolution>;
    async fn lyrics(&self, query: &str) -> anyhow::Result<Vec<LyricLine>>;
}

#[async_trait]
pub trait Scorer: Send + Sync {
    async fn evaluate(&self, req: &EvaluationRequest) -> anyhow::Result<PerformanceFeedback>;
}

#[async_trait]
pub trait LeaderboardSink: Send + Sync {
    async fn record(&self, entry: &LeaderboardWrite) -> anyhow::Result<()>;
}

/// UI-side hooks. Must be fast; they are called inline from controller actions.
pub trait SessionObserver: Send + Sync {
    fn state_changed(&self, _snapshot: &SessionSnapshot) {}
    fn active_line_changed(&self, _index: Option<usize>) {}
    fn notice(&self, _notice: &Notice) {}
}
