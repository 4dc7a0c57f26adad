//
// cpal-backed `Microphone` for desktop hosts.
//
// Supported platforms:
// - Windows
// - macOS

use std::time::Duration;

use async_trait::async_trait;
use karaoke_audio::{AudioCaptureError, AudioRecorder, CaptureSignal};
use karaoke_engine::traits::{
    AudioChunk, CaptureCapability, CaptureConstraints, CaptureError, Microphone, MicrophoneStream,
    RecorderEvent,
};
use tokio::sync::mpsc;

#[derive(Debug, Clone, Default)]
pub struct CpalMicrophone {
    device_name: Option<String>,
}

impl CpalMicrophone {
    pub fn new(device_name: Option<String>) -> Self {
        Self { device_name }
    }
}

#[async_trait]
impl Microphone for CpalMicrophone {
    fn capability(&self) -> CaptureCapability {
        match AudioRecorder::list_input_device_names() {
            Ok(names) if !names.is_empty() => CaptureCapability::Available,
            Ok(_) => CaptureCapability::Unavailable("no input devices".into()),
            Err(e) => CaptureCapability::Unavailable(e.to_string()),
        }
    }

    async fn acquire(
        &self,
        _constraints: &CaptureConstraints,
    ) -> Result<Box<dyn MicrophoneStream>, CaptureError> {
        // cpal has no voice-processing switches; the OS input chain applies its own.
        let device = self.device_name.clone();
        let recorder = tokio::task::spawn_blocking(move || AudioRecorder::open_named(device.as_deref()))
            .await
            .map_err(|e| CaptureError::Recorder(e.to_string()))?
            .map_err(|e| capture_error(&e))?;

        log::info!("microphone opened at {} Hz", recorder.sample_rate_hz());
        Ok(Box::new(CpalStream {
            recorder: Some(recorder),
        }))
    }
}

struct CpalStream {
    recorder: Option<AudioRecorder>,
}

impl CpalStream {
    fn recorder(&self) -> Result<&AudioRecorder, CaptureError> {
        self.recorder
            .as_ref()
            .ok_or_else(|| CaptureError::Recorder("recorder already released".into()))
    }
}

impl MicrophoneStream for CpalStream {
    fn start(
        &mut self,
        flush_interval: Duration,
        events: mpsc::UnboundedSender<RecorderEvent>,
    ) -> Result<(), CaptureError> {
        self.recorder()?
            .start(
                flush_interval,
                Box::new(move |signal| {
                    let _ = events.send(recorder_event(signal));
                }),
            )
            .map_err(|e| capture_error(&e))
    }

    fn request_stop(&mut self) -> Result<(), CaptureError> {
        self.recorder()?
            .request_stop()
            .map_err(|e| capture_error(&e))
    }

    fn release(&mut self) {
        if let Some(r) = self.recorder.take() {
            r.close();
        }
    }
}

fn recorder_event(signal: CaptureSignal) -> RecorderEvent {
    match signal {
        CaptureSignal::Chunk {
            sample_rate_hz,
            samples,
        } => RecorderEvent::Data(AudioChunk {
            sample_rate_hz,
            samples,
        }),
        CaptureSignal::DeviceLost(reason) => RecorderEvent::TrackEnded(reason),
        CaptureSignal::Stopped => RecorderEvent::Stopped,
    }
}

pub fn capture_error(e: &AudioCaptureError) -> CaptureError {
    if matches!(e, AudioCaptureError::NoInputDevice) {
        return CaptureError::DeviceNotFound;
    }
    let raw = e.to_string().to_lowercase();
    if raw.contains("permission") || raw.contains("access") {
        return CaptureError::PermissionDenied;
    }
    CaptureError::Recorder(e.to_string())
}
