use std::time::{Duration, Instant};

use async_trait::async_trait;
use karaoke_core::types::PlaybackSource;
use karaoke_engine::session::{Notice, NoticeLevel, SessionSnapshot};
use karaoke_engine::traits::{
    AudioChunk, CaptureCapability, CaptureConstraints, CaptureError, MediaTransport, Microphone,
    MicrophoneStream, PlaybackError, RecorderEvent, SessionObserver,
};
use tokio::sync::mpsc;

/// There is no media element in a terminal; playback is a wall clock.
pub struct ConsoleTransport;

#[async_trait]
impl MediaTransport for ConsoleTransport {
    async fn load(&self, source: &PlaybackSource) -> anyhow::Result<()> {
        log::info!("reference track: {} ({})", source.track_name, source.url);
        Ok(())
    }

    async fn play(&self) -> Result<(), PlaybackError> {
        Ok(())
    }

    async fn pause(&self) {}

    async fn seek(&self, seconds: f64) {
        log::debug!("seek to {seconds:.1}s");
    }
}

pub struct ConsoleObserver;

impl SessionObserver for ConsoleObserver {
    fn state_changed(&self, snapshot: &SessionSnapshot) {
        log::debug!("state: {}", snapshot.state_label);
    }

    fn notice(&self, notice: &Notice) {
        match notice.level {
            NoticeLevel::Warning => eprintln!("warning: {}", notice.message),
            NoticeLevel::Error => eprintln!("error: {}", notice.message),
        }
    }
}

const SILENT_RATE_HZ: u32 = 16_000;

/// Records silence for as long as the take runs.
pub struct SilentMicrophone;

#[async_trait]
impl Microphone for SilentMicrophone {
    fn capability(&self) -> CaptureCapability {
        CaptureCapability::Available
    }

    async fn acquire(
        &self,
        _constraints: &CaptureConstraints,
    ) -> Result<Box<dyn MicrophoneStream>, CaptureError> {
        Ok(Box::new(SilentStream {
            started: None,
            events: None,
        }))
    }
}

struct SilentStream {
    started: Option<Instant>,
    events: Option<mpsc::UnboundedSender<RecorderEvent>>,
}

impl MicrophoneStream for SilentStream {
    fn start(
        &mut self,
        _flush_interval: Duration,
        events: mpsc::UnboundedSender<RecorderEvent>,
    ) -> Result<(), CaptureError> {
        self.started = Some(Instant::now());
        self.events = Some(events);
        Ok(())
    }

    fn request_stop(&mut self) -> Result<(), CaptureError> {
        let Some(events) = self.events.take() else {
            return Ok(());
        };
        let elapsed = self.started.map(|s| s.elapsed()).unwrap_or_default();
        let len = (elapsed.as_secs_f64() * SILENT_RATE_HZ as f64) as usize;
        let _ = events.send(RecorderEvent::Data(AudioChunk {
            sample_rate_hz: SILENT_RATE_HZ,
            samples: vec![0.0; len],
        }));
        let _ = events.send(RecorderEvent::Stopped);
        Ok(())
    }
}
