use crate::multipart::{AudioFile, MultipartForm};
use crate::request::HttpRequest;
use anyhow::Context;
use karaoke_core::calibration::Offset;
use karaoke_core::types::{LyricLine, Mode};
use serde::{Deserialize, Serialize};
use serde_json::json;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendConfig {
    pub base_url: String,
}

impl BackendConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
        }
    }

    fn endpoint(&self, path: &str) -> String {
        join_url(&self.base_url, path)
    }
}

/// Everything the scoring backend needs for one performance.
#[derive(Debug, Clone, PartialEq)]
pub struct EvaluationRequest {
    pub audio: AudioFile,
    pub personality: String,
    // Already calibrated: timestamps are in the singer's perceived timeline.
    pub reference_lyrics: Vec<LyricLine>,
    pub offset: Offset,
    pub reference_audio_path: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeaderboardWrite {
    pub user_name: String,
    pub score: u32,
    pub mode: Mode,
    pub song: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatTurn {
    pub role: String,
    pub content: String,
}

pub fn build_resolve_song_request(cfg: &BackendConfig, query: &str) -> HttpRequest {
    HttpRequest::post_json(cfg.endpoint("/api/play_song"), &json!({ "query": query }))
}

pub fn build_lyrics_request(cfg: &BackendConfig, query: &str) -> anyhow::Result<HttpRequest> {
    let url = url::Url::parse_with_params(&cfg.endpoint("/api/lyrics"), &[("query", query)])
        .with_context(|| format!("invalid backend url: {}", cfg.base_url))?;
    Ok(HttpRequest::get(url.to_string()))
}

pub fn build_submit_performance_request(
    cfg: &BackendConfig,
    req: &EvaluationRequest,
) -> anyhow::Result<HttpRequest> {
    let lyrics_json =
        serde_json::to_string(&req.reference_lyrics).context("encode reference lyrics")?;

    let mut form = MultipartForm::new()
        .file("audio_file", &req.audio)
        .field("personality", &req.personality)
        .field("reference_lyrics", &lyrics_json)
        .field("offset", &req.offset.to_form_value());

    if let Some(path) = req.reference_audio_path.as_ref().filter(|p| !p.trim().is_empty()) {
        form = form.field("reference_audio_path", path);
    }

    let content_type = form.content_type();
    Ok(HttpRequest {
        method: "POST".into(),
        url: cfg.endpoint("/api/submit_performance"),
        headers: vec![
            ("Content-Type".into(), content_type),
            ("Accept".into(), "application/json".into()),
        ],
        body: form.finish(),
    })
}

pub fn build_save_score_request(cfg: &BackendConfig, entry: &LeaderboardWrite) -> HttpRequest {
    HttpRequest::post_json(
        cfg.endpoint("/api/save_score"),
        &json!({
            "user_name": entry.user_name,
            "score": entry.score,
            "mode": entry.mode.as_str(),
            "song": entry.song,
        }),
    )
}

pub fn build_leaderboard_request(cfg: &BackendConfig) -> HttpRequest {
    HttpRequest::get(cfg.endpoint("/api/leaderboard"))
}

pub fn build_chat_request(cfg: &BackendConfig, message: &str, history: &[ChatTurn]) -> HttpRequest {
    let mut payload = json!({ "message": message });
    if !history.is_empty() {
        payload["history"] = json!(history);
    }
    HttpRequest::post_json(cfg.endpoint("/chat"), &payload)
}

pub fn build_list_personalities_request(cfg: &BackendConfig) -> HttpRequest {
    HttpRequest::get(cfg.endpoint("/api/personalities"))
}

pub fn build_create_personality_request(
    cfg: &BackendConfig,
    name: &str,
    description: &str,
) -> HttpRequest {
    HttpRequest::post_json(
        cfg.endpoint("/api/personalities"),
        &json!({ "name": name, "description": description }),
    )
}

fn join_url(base: &str, path: &str) -> String {
    let base = base.trim_end_matches('/');
    let path = path.trim_start_matches('/');
    format!("{}/{}", base, path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request::Body;

    fn cfg() -> BackendConfig {
        BackendConfig::new("http://karaoke.local:8000/")
    }

    #[test]
    fn join_url_handles_trailing_slash() {
        assert_eq!(
            join_url("http://karaoke.local/", "/api/play_song"),
            "http://karaoke.local/api/play_song"
        );
        assert_eq!(
            join_url("http://karaoke.local", "api/play_song"),
            "http://karaoke.local/api/play_song"
        );
    }

    #[test]
    fn lyrics_query_is_url_encoded() {
        let req = build_lyrics_request(&cfg(), "Don't Stop Me Now & more").unwrap();
        assert_eq!(req.method, "GET");
        assert!(
            req.url
                .starts_with("http://karaoke.local:8000/api/lyrics?query=Don%27t+Stop+Me+Now"),
            "{}",
            req.url
        );
        assert!(req.url.contains("%26"));
    }

    #[test]
    fn submit_performance_carries_all_fields() {
        let req = build_submit_performance_request(
            &cfg(),
            &EvaluationRequest {
                audio: AudioFile {
                    filename: "performance.wav".into(),
                    mime_type: "audio/wav".into(),
                    bytes: vec![1, 2, 3],
                },
                personality: "strict_judge".into(),
                reference_lyrics: vec![LyricLine::new("Hello", 1.5)],
                offset: Offset(-0.5),
                reference_audio_path: Some("songs/hello.mp4".into()),
            },
        )
        .unwrap();

        assert!(req.url.ends_with("/api/submit_performance"));
        assert!(
            req.header("content-type")
                .is_some_and(|v| v.starts_with("multipart/form-data; boundary="))
        );

        let Body::MultipartFormData { bytes, .. } = req.body else {
            panic!("expected multipart");
        };
        let s = String::from_utf8_lossy(&bytes);
        assert!(s.contains("name=\"audio_file\"; filename=\"performance.wav\""));
        assert!(s.contains("name=\"personality\"\r\n\r\nstrict_judge\r\n"));
        assert!(s.contains(r#"[{"text":"Hello","timestamp":1.5}]"#));
        assert!(s.contains("name=\"offset\"\r\n\r\n-0.5\r\n"));
        assert!(s.contains("name=\"reference_audio_path\"\r\n\r\nsongs/hello.mp4\r\n"));
    }

    #[test]
    fn submit_performance_omits_blank_reference_path() {
        let req = build_submit_performance_request(
            &cfg(),
            &EvaluationRequest {
                audio: AudioFile {
                    filename: "performance.wav".into(),
                    mime_type: "audio/wav".into(),
                    bytes: vec![],
                },
                personality: "friendly".into(),
                reference_lyrics: vec![],
                offset: Offset::ZERO,
                reference_audio_path: Some("  ".into()),
            },
        )
        .unwrap();

        let Body::MultipartFormData { bytes, .. } = req.body else {
            panic!("expected multipart");
        };
        let s = String::from_utf8_lossy(&bytes);
        assert!(!s.contains("reference_audio_path"));
        assert!(s.contains("name=\"reference_lyrics\"\r\n\r\n[]\r\n"));
    }

    #[test]
    fn save_score_uses_wire_mode_names() {
        let req = build_save_score_request(
            &cfg(),
            &LeaderboardWrite {
                user_name: "Alice".into(),
                score: 8123,
                mode: Mode::Competition,
                song: "Dancing Queen".into(),
            },
        );
        let Body::Json(s) = req.body else {
            panic!("expected json");
        };
        let v: serde_json::Value = serde_json::from_str(&s).unwrap();
        assert_eq!(v["mode"], "competition");
        assert_eq!(v["score"], 8123);
        assert_eq!(v["user_name"], "Alice");
    }

    #[test]
    fn chat_history_is_optional() {
        let req = build_chat_request(&cfg(), "play abba", &[]);
        let Body::Json(s) = req.body else {
            panic!("expected json");
        };
        assert_eq!(s, r#"{"message":"play abba"}"#);

        let req = build_chat_request(
            &cfg(),
            "louder",
            &[ChatTurn {
                role: "user".into(),
                content: "play abba".into(),
            }],
        );
        let Body::Json(s) = req.body else {
            panic!("expected json");
        };
        assert!(s.contains("\"history\":[{"));
    }
}
