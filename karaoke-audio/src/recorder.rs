//
// CPAL-based microphone recorder that streams flush-interval chunks to a sink.
//
// Supported platforms:
// - Windows
// - macOS

use std::sync::mpsc;
use std::time::{Duration, Instant};

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, Sample, SampleFormat, SizedSample, Stream};

use crate::chunker::{FlushBuffer, downmix};

#[derive(Debug, thiserror::Error)]
pub enum AudioCaptureError {
    #[error("no input device found")]
    NoInputDevice,

    #[error("failed to list input devices: {0}")]
    ListDevices(#[from] cpal::DevicesError),

    #[error("failed to get default config: {0}")]
    DefaultConfig(#[from] cpal::DefaultStreamConfigError),

    #[error("failed to build input stream: {0}")]
    BuildStream(#[from] cpal::BuildStreamError),

    #[error("failed to play stream: {0}")]
    PlayStream(#[from] cpal::PlayStreamError),

    #[error("audio worker failed: {0}")]
    Worker(String),

    #[error("audio worker startup timeout")]
    WorkerTimeout,

    #[error("internal channel error")]
    Channel,
}

/// What the recorder reports while a take is running.
#[derive(Debug, Clone, PartialEq)]
pub enum CaptureSignal {
    Chunk {
        sample_rate_hz: u32,
        samples: Vec<f32>,
    },
    DeviceLost(String),
    // Sent once after a stop request, after the final chunk.
    Stopped,
}

pub type SignalSink = Box<dyn FnMut(CaptureSignal) + Send + 'static>;

enum Cmd {
    Start {
        flush_interval: Duration,
        sink: SignalSink,
    },
    Stop,
    Shutdown,
}

enum WorkerMsg {
    Ready,
    Error(String),
}

pub struct AudioRecorder {
    cmd_tx: mpsc::Sender<Cmd>,
    worker_handle: Option<std::thread::JoinHandle<()>>,
    sample_rate_hz: u32,
}

impl AudioRecorder {
    pub fn list_input_device_names() -> Result<Vec<String>, AudioCaptureError> {
        let host = cpal::default_host();
        let mut out = Vec::new();
        for dev in host.input_devices()? {
            if let Ok(name) = dev.name() {
                out.push(name);
            }
        }
        out.sort();
        out.dedup();
        Ok(out)
    }

    pub fn open_named(device_name: Option<&str>) -> Result<Self, AudioCaptureError> {
        let host = cpal::default_host();

        if let Some(needle) = device_name.map(str::trim).filter(|n| !n.is_empty()) {
            if let Ok(devices) = host.input_devices() {
                for dev in devices {
                    if dev.name().is_ok_and(|name| name == needle) {
                        log::info!("Using input device: {needle}");
                        return Self::open(dev);
                    }
                }
            }
            log::warn!("Preferred input device not found, falling back to default: {needle}");
        }

        let device = host
            .default_input_device()
            .ok_or(AudioCaptureError::NoInputDevice)?;
        Self::open(device)
    }

    pub fn open(device: Device) -> Result<Self, AudioCaptureError> {
        let default_cfg = device.default_input_config()?;
        let sample_rate_hz = default_cfg.sample_rate().0;

        let (sample_tx, sample_rx) = mpsc::channel::<Vec<f32>>();
        let (error_tx, error_rx) = mpsc::channel::<String>();
        let (cmd_tx, cmd_rx) = mpsc::channel::<Cmd>();
        let (worker_tx, worker_rx) = mpsc::channel::<WorkerMsg>();

        // The stream is not Send on every host, so it lives and dies on this thread.
        let worker_handle = std::thread::spawn(move || {
            let config: cpal::StreamConfig = default_cfg.clone().into();
            let channels = default_cfg.channels() as usize;

            let stream = match default_cfg.sample_format() {
                SampleFormat::I16 => {
                    build_input_stream::<i16>(&device, &config, channels, sample_tx, error_tx)
                }
                SampleFormat::U16 => {
                    build_input_stream::<u16>(&device, &config, channels, sample_tx, error_tx)
                }
                SampleFormat::I32 => {
                    build_input_stream::<i32>(&device, &config, channels, sample_tx, error_tx)
                }
                SampleFormat::F64 => {
                    build_input_stream::<f64>(&device, &config, channels, sample_tx, error_tx)
                }
                _ => build_input_stream::<f32>(&device, &config, channels, sample_tx, error_tx),
            };

            let stream = match stream {
                Ok(s) => s,
                Err(e) => {
                    let _ = worker_tx.send(WorkerMsg::Error(format!("build stream: {e}")));
                    log::error!("Audio stream build failed: {e}");
                    return;
                }
            };

            if let Err(e) = stream.play() {
                let _ = worker_tx.send(WorkerMsg::Error(format!("play stream: {e}")));
                log::error!("Audio stream play failed: {e}");
                return;
            }

            let _ = worker_tx.send(WorkerMsg::Ready);

            run_consumer(sample_rate_hz, sample_rx, error_rx, cmd_rx);
            drop(stream);
        });

        match worker_rx.recv_timeout(Duration::from_secs(2)) {
            Ok(WorkerMsg::Ready) => {}
            Ok(WorkerMsg::Error(e)) => return Err(AudioCaptureError::Worker(e)),
            Err(mpsc::RecvTimeoutError::Timeout) => return Err(AudioCaptureError::WorkerTimeout),
            Err(_) => return Err(AudioCaptureError::Channel),
        }

        Ok(Self {
            cmd_tx,
            worker_handle: Some(worker_handle),
            sample_rate_hz,
        })
    }

    pub fn sample_rate_hz(&self) -> u32 {
        self.sample_rate_hz
    }

    /// Begins a take. Chunks reach `sink` every `flush_interval` from the worker thread.
    pub fn start(&self, flush_interval: Duration, sink: SignalSink) -> Result<(), AudioCaptureError> {
        self.cmd_tx
            .send(Cmd::Start {
                flush_interval,
                sink,
            })
            .map_err(|_| AudioCaptureError::Channel)
    }

    /// Non-blocking; completion is signalled through the sink.
    pub fn request_stop(&self) -> Result<(), AudioCaptureError> {
        self.cmd_tx
            .send(Cmd::Stop)
            .map_err(|_| AudioCaptureError::Channel)
    }

    pub fn close(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        let _ = self.cmd_tx.send(Cmd::Shutdown);
        if let Some(h) = self.worker_handle.take() {
            let _ = h.join();
        }
    }
}

impl Drop for AudioRecorder {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn build_input_stream<T>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    channels: usize,
    sample_tx: mpsc::Sender<Vec<f32>>,
    error_tx: mpsc::Sender<String>,
) -> Result<Stream, cpal::BuildStreamError>
where
    T: Sample + SizedSample + Send + 'static,
    f32: cpal::FromSample<T>,
{
    let cb = move |data: &[T], _: &cpal::InputCallbackInfo| {
        let interleaved: Vec<f32> = data.iter().map(|&s| s.to_sample::<f32>()).collect();
        let _ = sample_tx.send(downmix(&interleaved, channels));
    };

    device.build_input_stream(
        config,
        cb,
        move |err| {
            log::error!("Audio stream error: {err}");
            let _ = error_tx.send(err.to_string());
        },
        None,
    )
}

struct Take {
    buffer: FlushBuffer,
    sink: SignalSink,
}

fn run_consumer(
    sample_rate_hz: u32,
    sample_rx: mpsc::Receiver<Vec<f32>>,
    error_rx: mpsc::Receiver<String>,
    cmd_rx: mpsc::Receiver<Cmd>,
) {
    let mut take: Option<Take> = None;

    loop {
        while let Ok(cmd) = cmd_rx.try_recv() {
            match cmd {
                Cmd::Start {
                    flush_interval,
                    sink,
                } => {
                    take = Some(Take {
                        buffer: FlushBuffer::new(flush_interval, Instant::now()),
                        sink,
                    });
                }
                Cmd::Stop => {
                    if let Some(mut t) = take.take() {
                        let rest = t.buffer.finish();
                        if !rest.is_empty() {
                            (t.sink)(CaptureSignal::Chunk {
                                sample_rate_hz,
                                samples: rest,
                            });
                        }
                        (t.sink)(CaptureSignal::Stopped);
                    }
                }
                Cmd::Shutdown => return,
            }
        }

        while let Ok(err) = error_rx.try_recv() {
            if let Some(t) = take.as_mut() {
                (t.sink)(CaptureSignal::DeviceLost(err));
            }
        }

        let incoming = match sample_rx.recv_timeout(Duration::from_millis(50)) {
            Ok(samples) => samples,
            Err(mpsc::RecvTimeoutError::Timeout) => Vec::new(),
            Err(mpsc::RecvTimeoutError::Disconnected) => {
                if let Some(mut t) = take.take() {
                    (t.sink)(CaptureSignal::DeviceLost("input stream closed".into()));
                }
                return;
            }
        };

        if let Some(t) = take.as_mut() {
            if let Some(chunk) = t.buffer.push(&incoming, Instant::now()) {
                (t.sink)(CaptureSignal::Chunk {
                    sample_rate_hz,
                    samples: chunk,
                });
            }
        }
    }
}
