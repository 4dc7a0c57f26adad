use async_trait::async_trait;
use karaoke_core::score::PerformanceFeedback;
use karaoke_core::types::LyricLine;
use karaoke_engine::traits::{LeaderboardSink, Scorer, SongResolver};
use karaoke_providers::backend::{
    BackendConfig, ChatTurn, EvaluationRequest, LeaderboardWrite, build_chat_request,
    build_create_personality_request, build_leaderboard_request, build_list_personalities_request,
    build_lyrics_request, build_resolve_song_request, build_save_score_request,
    build_submit_performance_request,
};
use karaoke_providers::parse::{
    ChatReply, Leaderboard, SongResolution, parse_chat_reply, parse_create_personality,
    parse_leaderboard, parse_lyrics, parse_performance_feedback, parse_personalities,
    parse_song_resolution,
};
use karaoke_providers::request::HttpRequest;
use karaoke_providers::runtime::{HttpResponse, execute, execute_with_timeout};
use std::time::Duration;

// Everything except scoring and song download should answer quickly.
const QUICK_TIMEOUT: Duration = Duration::from_secs(30);

/// The karaoke backend over HTTP: song resolution, scoring, leaderboard, chat and judges.
#[derive(Debug, Clone)]
pub struct HttpBackend {
    cfg: BackendConfig,
}

impl HttpBackend {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            cfg: BackendConfig::new(base_url),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.cfg.base_url
    }

    pub async fn leaderboard(&self) -> anyhow::Result<Leaderboard> {
        let resp = send(&build_leaderboard_request(&self.cfg), QUICK_TIMEOUT).await?;
        parse_leaderboard(&resp.body)
    }

    pub async fn chat(&self, message: &str, history: &[ChatTurn]) -> anyhow::Result<ChatReply> {
        // The assistant may look up and download a song before answering.
        let resp = execute(&build_chat_request(&self.cfg, message, history))
            .await?
            .error_for_status()?;
        parse_chat_reply(&resp.body)
    }

    pub async fn personalities(&self) -> anyhow::Result<Vec<String>> {
        let resp = send(&build_list_personalities_request(&self.cfg), QUICK_TIMEOUT).await?;
        parse_personalities(&resp.body)
    }

    /// The backend answers `{"status":"error"}` with a 200 for some failures.
    pub async fn create_personality(&self, name: &str, description: &str) -> anyhow::Result<()> {
        let req = build_create_personality_request(&self.cfg, name, description);
        let resp = execute_with_timeout(&req, QUICK_TIMEOUT).await?;
        match parse_create_personality(&resp.body) {
            Ok(()) if resp.is_success() => Ok(()),
            Ok(()) => resp.error_for_status().map(|_| ()),
            Err(e) if resp.is_success() => Err(e),
            Err(e) => Err(e.context(format!("backend returned status={}", resp.status))),
        }
    }
}

async fn send(req: &HttpRequest, timeout: Duration) -> anyhow::Result<HttpResponse> {
    execute_with_timeout(req, timeout).await?.error_for_status()
}

#[async_trait]
impl SongResolver for HttpBackend {
    async fn resolve(&self, query: &str) -> anyhow::Result<SongResolution> {
        let resp = execute(&build_resolve_song_request(&self.cfg, query))
            .await?
            .error_for_status()?;
        let song = parse_song_resolution(&resp.body)?;
        log::info!(
            "resolved '{}' -> '{}' ({} lyric lines)",
            query,
            song.source.track_name,
            song.lyrics.len()
        );
        Ok(song)
    }

    async fn lyrics(&self, query: &str) -> anyhow::Result<Vec<LyricLine>> {
        let resp = send(&build_lyrics_request(&self.cfg, query)?, QUICK_TIMEOUT).await?;
        parse_lyrics(&resp.body)
    }
}

#[async_trait]
impl Scorer for HttpBackend {
    async fn evaluate(&self, req: &EvaluationRequest) -> anyhow::Result<PerformanceFeedback> {
        let http = build_submit_performance_request(&self.cfg, req)?;
        let resp = execute(&http).await?.error_for_status()?;
        parse_performance_feedback(&resp.body)
    }
}

#[async_trait]
impl LeaderboardSink for HttpBackend {
    async fn record(&self, entry: &LeaderboardWrite) -> anyhow::Result<()> {
        send(&build_save_score_request(&self.cfg, entry), QUICK_TIMEOUT).await?;
        Ok(())
    }
}
