use crate::traits::{
    AudioChunk, CaptureCapability, CaptureConstraints, CaptureError, Microphone, MicrophoneStream,
    RecordedAudio, RecorderEvent,
};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::sync::mpsc;

pub const DEFAULT_FLUSH_INTERVAL: Duration = Duration::from_secs(1);

// Extra time granted to the recorder on top of one flush interval before we stop waiting.
const STOP_GRACE: Duration = Duration::from_secs(2);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CaptureStage {
    Idle,
    Armed,
    Recording,
    Stopped,
}

/// The finalized output of one capture session.
#[derive(Debug, Clone, PartialEq)]
pub struct CapturedPerformance {
    pub audio: RecordedAudio,
    pub warnings: Vec<String>,
}

/// Owns one microphone stream for exactly one performance.
///
/// Arming happens during the user's submit gesture; recording starts only once the reference
/// media reports that it is actually playing. `stop` consumes the coordinator, so a recorder
/// can never be restarted for a second take.
pub struct CaptureCoordinator {
    stage: CaptureStage,
    stream: Option<Box<dyn MicrophoneStream>>,
    events_tx: Option<mpsc::UnboundedSender<RecorderEvent>>,
    events_rx: mpsc::UnboundedReceiver<RecorderEvent>,
    chunks: Vec<AudioChunk>,
    warnings: Vec<String>,
    flush_interval: Duration,
    recorder_stopped: bool,
}

impl std::fmt::Debug for CaptureCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CaptureCoordinator")
            .field("stage", &self.stage)
            .field("chunks", &self.chunks.len())
            .field("warnings", &self.warnings)
            .finish()
    }
}

impl CaptureCoordinator {
    pub async fn arm(
        microphone: &dyn Microphone,
        capability: &CaptureCapability,
        constraints: &CaptureConstraints,
        flush_interval: Duration,
    ) -> Result<Self, CaptureError> {
        if let CaptureCapability::Unavailable(reason) = capability {
            return Err(CaptureError::Unavailable(reason.clone()));
        }

        // No timeout: a permission prompt may legitimately sit open for as long as the user likes.
        let stream = microphone.acquire(constraints).await?;
        log::info!("microphone armed");

        let (events_tx, events_rx) = mpsc::unbounded_channel();
        Ok(Self {
            stage: CaptureStage::Armed,
            stream: Some(stream),
            events_tx: Some(events_tx),
            events_rx,
            chunks: Vec::new(),
            warnings: Vec::new(),
            flush_interval,
            recorder_stopped: false,
        })
    }

    pub fn stage(&self) -> CaptureStage {
        self.stage
    }

    /// Bound to the media "playing" signal. Returns `true` only on the call that started capture.
    pub fn start_on_playback_begin(&mut self) -> Result<bool, CaptureError> {
        if self.stage != CaptureStage::Armed {
            return Ok(false);
        }
        let (Some(stream), Some(tx)) = (self.stream.as_mut(), self.events_tx.take()) else {
            return Ok(false);
        };

        // The stream gets the only sender, so the channel closes if the recorder dies.
        stream.start(self.flush_interval, tx)?;
        self.stage = CaptureStage::Recording;
        log::info!(
            "capture started (flush every {} ms)",
            self.flush_interval.as_millis()
        );
        Ok(true)
    }

    pub fn warnings(&self) -> &[String] {
        &self.warnings
    }

    /// Drains pending recorder events without waiting. Returns warnings raised since last call.
    pub fn pump(&mut self) -> Vec<String> {
        let before = self.warnings.len();
        while let Ok(ev) = self.events_rx.try_recv() {
            self.absorb(ev);
        }
        self.warnings[before..].to_vec()
    }

    fn absorb(&mut self, ev: RecorderEvent) {
        match ev {
            RecorderEvent::Data(chunk) => {
                if !chunk.samples.is_empty() {
                    self.chunks.push(chunk);
                }
            }
            RecorderEvent::TrackEnded(reason) => {
                log::warn!("microphone track ended: {reason}");
                self.warnings
                    .push(format!("Microphone stopped during the performance: {reason}"));
            }
            RecorderEvent::Stopped => self.recorder_stopped = true,
        }
    }

    /// Stops recording and resolves once the recorder has emitted its final chunk.
    pub async fn stop(mut self) -> CapturedPerformance {
        if self.stage == CaptureStage::Recording {
            if let Some(stream) = self.stream.as_mut() {
                if let Err(e) = stream.request_stop() {
                    log::warn!("recorder stop request failed: {e}");
                    self.warnings.push(e.to_string());
                }
            }

            let deadline = self.flush_interval + STOP_GRACE;
            let drained = tokio::time::timeout(deadline, async {
                while !self.recorder_stopped {
                    match self.events_rx.recv().await {
                        Some(ev) => self.absorb(ev),
                        None => break,
                    }
                }
            })
            .await;

            if drained.is_err() {
                log::warn!("recorder did not confirm stop within {deadline:?}; using audio so far");
                self.warnings
                    .push("Recorder did not finish flushing; the take may be cut short.".into());
            }
        }

        self.stage = CaptureStage::Stopped;
        self.release_stream();

        let sample_rate_hz = self.chunks.first().map(|c| c.sample_rate_hz).unwrap_or(0);
        let mut samples = Vec::with_capacity(self.chunks.iter().map(|c| c.samples.len()).sum());
        for chunk in self.chunks.drain(..) {
            if chunk.sample_rate_hz != sample_rate_hz {
                log::warn!(
                    "dropping chunk at {} Hz (take is {} Hz)",
                    chunk.sample_rate_hz,
                    sample_rate_hz
                );
                continue;
            }
            samples.extend_from_slice(&chunk.samples);
        }

        CapturedPerformance {
            audio: RecordedAudio {
                sample_rate_hz,
                samples,
            },
            warnings: std::mem::take(&mut self.warnings),
        }
    }

    /// Tears down without producing a take (reset, failed search, dispose).
    pub fn discard(mut self) {
        self.stage = CaptureStage::Stopped;
        self.release_stream();
    }

    fn release_stream(&mut self) {
        if let Some(mut stream) = self.stream.take() {
            stream.release();
        }
    }
}

impl Drop for CaptureCoordinator {
    fn drop(&mut self) {
        self.release_stream();
    }
}


#[cfg(test)]
mod tests {
    use super::test_support::FakeMicrophone;
    use super::*;

    async fn armed(mic: &FakeMicrophone) -> CaptureCoordinator {
        CaptureCoordinator::arm(
            mic,
            &CaptureCapability::Available,
            &CaptureConstraints::default(),
            Duration::from_millis(50),
        )
        .await
        .unwrap()
    }

    #[tokio::test]
    async fn unavailable_capability_refuses_to_arm() {
        let mic = FakeMicrophone::default();
        let err = CaptureCoordinator::arm(
            &mic,
            &CaptureCapability::Unavailable("no MediaRecorder".into()),
            &CaptureConstraints::default(),
            DEFAULT_FLUSH_INTERVAL,
        )
        .await
        .unwrap_err();
        assert_eq!(err, CaptureError::Unavailable("no MediaRecorder".into()));
        assert_eq!(mic.log.lock().unwrap().acquired, 0);
    }

    #[tokio::test]
    async fn permission_errors_propagate() {
        let mic = FakeMicrophone {
            acquire_error: Some(CaptureError::PermissionDenied),
            ..Default::default()
        };
        let err = CaptureCoordinator::arm(
            &mic,
            &CaptureCapability::Available,
            &CaptureConstraints::default(),
            DEFAULT_FLUSH_INTERVAL,
        )
        .await
        .unwrap_err();
        assert_eq!(err, CaptureError::PermissionDenied);
    }

    #[tokio::test]
    async fn starts_once_and_collects_final_chunk() {
        let mic = FakeMicrophone::default();
        let mut cap = armed(&mic).await;
        assert_eq!(cap.stage(), CaptureStage::Armed);

        assert!(cap.start_on_playback_begin().unwrap());
        assert!(!cap.start_on_playback_begin().unwrap());
        assert_eq!(cap.stage(), CaptureStage::Recording);

        let take = cap.stop().await;
        assert_eq!(take.audio.sample_rate_hz, 16_000);
        assert_eq!(take.audio.samples.len(), 10);
        assert_eq!(take.audio.samples[9], 0.3);
        assert!(take.warnings.is_empty());

        let log = mic.log.lock().unwrap();
        assert_eq!(log.started, 1);
        assert_eq!(log.stop_requests, 1);
        assert_eq!(log.released, 1);
    }

    #[tokio::test]
    async fn stop_before_playback_yields_empty_take() {
        let mic = FakeMicrophone::default();
        let take = armed(&mic).await.stop().await;
        assert!(take.audio.samples.is_empty());

        let log = mic.log.lock().unwrap();
        assert_eq!(log.started, 0);
        assert_eq!(log.stop_requests, 0);
        assert_eq!(log.released, 1);
    }

    #[tokio::test]
    async fn track_end_is_reported_and_partial_audio_kept() {
        let mic = FakeMicrophone {
            track_end: Some("device unplugged".into()),
            ..Default::default()
        };
        let mut cap = armed(&mic).await;
        cap.start_on_playback_begin().unwrap();

        let warnings = cap.pump();
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].contains("device unplugged"));
        assert!(cap.pump().is_empty());

        let take = cap.stop().await;
        assert_eq!(take.audio.samples.len(), 10);
        assert_eq!(take.warnings.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn stop_gives_up_after_grace_period() {
        let mic = FakeMicrophone {
            confirm_stop: false,
            ..Default::default()
        };
        let mut cap = armed(&mic).await;
        cap.start_on_playback_begin().unwrap();

        let take = cap.stop().await;
        // Everything flushed before the timeout still makes it into the take.
        assert_eq!(take.audio.samples.len(), 10);
        assert_eq!(take.warnings.len(), 1);
    }

    #[tokio::test]
    async fn discard_releases_without_recording() {
        let mic = FakeMicrophone::default();
        armed(&mic).await.discard();
        let log = mic.log.lock().unwrap();
        assert_eq!(log.released, 1);
        assert_eq!(log.stop_requests, 0);
    }
}
