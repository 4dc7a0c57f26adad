use anyhow::{Context, anyhow};
use karaoke_core::score::PerformanceFeedback;
use karaoke_core::types::{LyricLine, Mode, PlaybackSource};
use serde::{Deserialize, Serialize};

/// A resolved song: what to play plus the raw (uncalibrated) lyric timeline.
#[derive(Debug, Clone, PartialEq)]
pub struct SongResolution {
    pub source: PlaybackSource,
    pub lyrics: Vec<LyricLine>,
}

#[derive(Debug, Deserialize)]
struct SongResponse {
    audio: AudioPayload,
    #[serde(default)]
    lyrics: Option<LyricsPayload>,
}

#[derive(Debug, Deserialize)]
struct AudioPayload {
    #[serde(default)]
    track: String,
    url: String,
    #[serde(default)]
    file_path: String,
    #[serde(default)]
    is_sing_king: bool,
}

#[derive(Debug, Default, Deserialize)]
struct LyricsPayload {
    #[serde(default)]
    lyrics: Vec<LyricLine>,
}

pub fn parse_song_resolution(body: &[u8]) -> anyhow::Result<SongResolution> {
    let resp: SongResponse = serde_json::from_slice(body).context("decode song JSON")?;
    Ok(SongResolution {
        source: PlaybackSource {
            url: resp.audio.url,
            track_name: resp.audio.track,
            source_file_path: resp.audio.file_path,
            is_alternate_variant: resp.audio.is_sing_king,
        },
        lyrics: resp.lyrics.unwrap_or_default().lyrics,
    })
}

pub fn parse_lyrics(body: &[u8]) -> anyhow::Result<Vec<LyricLine>> {
    let resp: LyricsPayload = serde_json::from_slice(body).context("decode lyrics JSON")?;
    Ok(resp.lyrics)
}

pub fn parse_performance_feedback(body: &[u8]) -> anyhow::Result<PerformanceFeedback> {
    serde_json::from_slice(body).context("decode evaluation JSON")
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeaderboardEntry {
    pub user_name: String,
    pub score: u32,
    #[serde(default)]
    pub song: String,
    #[serde(default)]
    pub date: Option<String>,
    #[serde(default)]
    pub timestamp: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Leaderboard {
    #[serde(default)]
    pub casual: Vec<LeaderboardEntry>,
    #[serde(default)]
    pub competition: Vec<LeaderboardEntry>,
}

impl Leaderboard {
    pub fn tab(&self, mode: Mode) -> &[LeaderboardEntry] {
        match mode {
            Mode::Casual => &self.casual,
            Mode::Competition => &self.competition,
        }
    }
}

/// The server sorts on write, but entries from older files may be out of order.
pub fn parse_leaderboard(body: &[u8]) -> anyhow::Result<Leaderboard> {
    let mut board: Leaderboard =
        serde_json::from_slice(body).context("decode leaderboard JSON")?;
    board.casual.sort_by(|a, b| b.score.cmp(&a.score));
    board.competition.sort_by(|a, b| b.score.cmp(&a.score));
    Ok(board)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatTrack {
    pub track: String,
    pub url: String,
    pub file_path: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatAction {
    PlayAudio(ChatTrack),
    // Action types this client does not act on.
    Other(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatReply {
    pub response: String,
    pub action: Option<ChatAction>,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    response: String,
    #[serde(default)]
    action: Option<RawAction>,
}

#[derive(Debug, Deserialize)]
struct RawAction {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    payload: Option<RawTrack>,
}

#[derive(Debug, Deserialize)]
struct RawTrack {
    #[serde(default)]
    track: String,
    url: String,
    #[serde(default)]
    file_path: String,
}

pub fn parse_chat_reply(body: &[u8]) -> anyhow::Result<ChatReply> {
    let resp: ChatResponse = serde_json::from_slice(body).context("decode chat JSON")?;
    let action = match resp.action {
        None => None,
        Some(RawAction { kind, payload }) if kind == "play_audio" => {
            let p = payload.ok_or_else(|| anyhow!("play_audio action without payload"))?;
            Some(ChatAction::PlayAudio(ChatTrack {
                track: p.track,
                url: p.url,
                file_path: p.file_path,
            }))
        }
        Some(RawAction { kind, .. }) => Some(ChatAction::Other(kind)),
    };
    Ok(ChatReply {
        response: resp.response,
        action,
    })
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum PersonalityList {
    Bare(Vec<String>),
    Wrapped { personalities: Vec<String> },
}

pub fn parse_personalities(body: &[u8]) -> anyhow::Result<Vec<String>> {
    let list: PersonalityList =
        serde_json::from_slice(body).context("decode personalities JSON")?;
    Ok(match list {
        PersonalityList::Bare(v) => v,
        PersonalityList::Wrapped { personalities } => personalities,
    })
}

#[derive(Debug, Deserialize)]
struct StatusResponse {
    status: String,
    #[serde(default)]
    error: Option<String>,
}

pub fn parse_create_personality(body: &[u8]) -> anyhow::Result<()> {
    let resp: StatusResponse = serde_json::from_slice(body).context("decode status JSON")?;
    if resp.status == "success" {
        return Ok(());
    }
    Err(anyhow!(
        "create personality failed: {}",
        resp.error.unwrap_or(resp.status)
    ))
}
