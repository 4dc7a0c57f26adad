pub mod chunker;
pub mod resample;
pub mod wav;

// Live capture is only wired up where we ship a desktop build.
#[cfg(any(windows, target_os = "macos"))]
pub mod recorder;

#[cfg(any(windows, target_os = "macos"))]
pub use recorder::{AudioCaptureError, AudioRecorder, CaptureSignal};
