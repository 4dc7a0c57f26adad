#[cfg(any(windows, target_os = "macos"))]
pub mod microphone;
pub mod service;

pub use service::KaraokeService;
