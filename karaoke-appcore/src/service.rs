use std::path::PathBuf;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::anyhow;
use karaoke_core::config::AppConfig;
use karaoke_core::types::{LyricLine, Mode};
use karaoke_engine::SessionController;
use karaoke_engine::session::{FinishOutcome, PerformanceRecord};
use karaoke_engine::traits::SongResolver;
use karaoke_providers::backend::ChatTurn;
use karaoke_providers::parse::{ChatReply, Leaderboard};
use karaoke_runtime::backend::HttpBackend;
use karaoke_runtime::config_store::ConfigStore;
use karaoke_runtime::defaults::{apply_backend_override, history_path_for};
use karaoke_runtime::history::{HistoryStore, PerformanceHistoryEntry};
use karaoke_runtime::runtime_engine::{HostBindings, build_controller_from_config};

#[cfg(any(windows, target_os = "macos"))]
use karaoke_audio::{AudioCaptureError, AudioRecorder};
#[cfg(any(windows, target_os = "macos"))]
use karaoke_engine::traits::Microphone;

#[cfg(any(windows, target_os = "macos"))]
pub fn user_facing_audio_error(e: &AudioCaptureError) -> String {
    let raw = e.to_string().to_lowercase();

    // Keep messages actionable and short; details are in logs.
    if matches!(e, AudioCaptureError::NoInputDevice) || raw.contains("no input device") {
        return "No microphone detected. Check your mic and choose the device in the app.".into();
    }

    if raw.contains("permission") || raw.contains("access") {
        #[cfg(windows)]
        {
            return "Microphone access appears blocked. Check Windows Settings > Privacy & security > Microphone.".into();
        }

        #[cfg(target_os = "macos")]
        {
            return "Microphone access appears blocked. Check System Settings > Privacy & Security > Microphone.".into();
        }
    }

    "Audio recording failed. Check logs for details.".into()
}

#[derive(Clone)]
pub struct KaraokeService {
    config_store: ConfigStore,
    // Applied on top of the stored config for backend calls; never persisted.
    backend_override: Option<String>,
    // Conversation so far with the assistant, oldest first.
    chat_history: Arc<tokio::sync::Mutex<Vec<ChatTurn>>>,
}

impl KaraokeService {
    pub fn new(config_path: PathBuf) -> Self {
        Self {
            config_store: ConfigStore::at_path(config_path),
            backend_override: None,
            chat_history: Arc::new(tokio::sync::Mutex::new(Vec::new())),
        }
    }

    pub fn with_backend_override(mut self, url: Option<String>) -> Self {
        self.backend_override = url;
        self
    }

    pub fn load_config(&self) -> anyhow::Result<AppConfig> {
        self.config_store.load_or_default()
    }

    fn effective_config(&self) -> anyhow::Result<AppConfig> {
        let mut cfg = self.load_config()?;
        apply_backend_override(&mut cfg, self.backend_override.clone());
        Ok(cfg)
    }

    pub fn save_config(&self, cfg: &AppConfig) -> anyhow::Result<()> {
        self.config_store.save(cfg)
    }

    /// Stores the stage name; a blank name reverts to the anonymous default.
    pub fn set_user_name(&self, name: &str) -> anyhow::Result<String> {
        let mut cfg = self.load_config()?;
        let trimmed = name.trim();
        cfg.user_name = (!trimmed.is_empty()).then(|| trimmed.to_string());
        self.save_config(&cfg)?;
        Ok(cfg.display_name().to_string())
    }

    pub fn history_store(&self) -> HistoryStore {
        HistoryStore::at_path(history_path_for(self.config_store.path()))
    }

    /// Returns whether an entry was written.
    pub fn record_performance(&self, record: &PerformanceRecord) -> anyhow::Result<bool> {
        if !self.load_config()?.history_enabled {
            return Ok(false);
        }
        let entry = PerformanceHistoryEntry::from_record(record, now_unix_ms());
        self.history_store().append(entry)?;
        Ok(true)
    }

    /// Best-effort history write after a finish; failures are only logged.
    pub fn record_outcome(&self, outcome: &FinishOutcome) {
        let FinishOutcome::Scored { record, .. } = outcome else {
            return;
        };
        if let Err(e) = self.record_performance(record) {
            log::warn!("failed to write performance history: {e:#}");
        }
    }

    /// Newest first.
    pub fn recent_performances(&self, limit: usize) -> anyhow::Result<Vec<PerformanceHistoryEntry>> {
        let mut entries = self.history_store().load()?;
        entries.reverse();
        entries.truncate(limit);
        Ok(entries)
    }

    fn backend(&self) -> anyhow::Result<HttpBackend> {
        Ok(HttpBackend::new(self.effective_config()?.backend_base_url))
    }

    pub async fn leaderboard(&self) -> anyhow::Result<Leaderboard> {
        self.backend()?.leaderboard().await
    }

    pub async fn lyrics(&self, query: &str) -> anyhow::Result<Vec<LyricLine>> {
        self.backend()?.lyrics(query.trim()).await
    }

    pub async fn personalities(&self) -> anyhow::Result<Vec<String>> {
        self.backend()?.personalities().await
    }

    pub async fn create_personality(&self, name: &str, description: &str) -> anyhow::Result<()> {
        let name = name.trim();
        if name.is_empty() {
            return Err(anyhow!("personality name must not be empty"));
        }
        self.backend()?
            .create_personality(name, description.trim())
            .await
    }

    /// Sends one message with the conversation so far. Failed exchanges are not remembered.
    pub async fn chat(&self, message: &str) -> anyhow::Result<ChatReply> {
        let message = message.trim();
        if message.is_empty() {
            return Err(anyhow!("message must not be empty"));
        }
        let backend = self.backend()?;

        let mut history = self.chat_history.lock().await;
        let reply = backend.chat(message, &history).await?;
        history.push(ChatTurn {
            role: "user".into(),
            content: message.to_string(),
        });
        history.push(ChatTurn {
            role: "assistant".into(),
            content: reply.response.clone(),
        });
        Ok(reply)
    }

    pub async fn clear_chat(&self) {
        self.chat_history.lock().await.clear();
    }

    pub fn open_session(&self, mode: Mode, host: HostBindings) -> anyhow::Result<SessionController> {
        let cfg = self.effective_config()?;
        Ok(build_controller_from_config(&cfg, mode, host))
    }

    #[cfg(any(windows, target_os = "macos"))]
    pub fn microphone(&self) -> anyhow::Result<Arc<dyn Microphone>> {
        let cfg = self.load_config()?;
        Ok(Arc::new(crate::microphone::CpalMicrophone::new(
            cfg.microphone_device,
        )))
    }

    #[cfg(any(windows, target_os = "macos"))]
    pub fn list_microphones(&self) -> Result<Vec<String>, AudioCaptureError> {
        AudioRecorder::list_input_device_names()
    }
}

fn now_unix_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as i64
}
