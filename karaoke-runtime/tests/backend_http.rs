use std::sync::{Arc, Mutex};
use std::time::Duration;

use karaoke_core::config::AppConfig;
use karaoke_core::types::{Mode, PlaybackSource};
use karaoke_engine::session::{FinishOutcome, SessionState};
use karaoke_engine::traits::{
    AudioChunk, CaptureCapability, CaptureConstraints, CaptureError, LeaderboardSink,
    MediaTransport, Microphone, MicrophoneStream, PlaybackError, RecorderEvent, SongResolver,
};
use karaoke_providers::backend::{ChatTurn, LeaderboardWrite};
use karaoke_providers::parse::ChatAction;
use karaoke_runtime::backend::HttpBackend;
use karaoke_runtime::runtime_engine::{HostBindings, build_controller_from_config};
use serde_json::json;
use tokio::sync::mpsc;
use wiremock::matchers::{body_json, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const SONG_BODY: &str = r#"{
    "audio": {"track": "ABBA - Dancing Queen", "url": "/static/dq.mp4",
              "file_path": "songs/dq.mp4", "is_sing_king": true},
    "lyrics": {"lyrics": [
        {"text": "You can dance", "timestamp": 0.0},
        {"text": "You can jive", "start_time": 2.0},
        {"text": "Having the time of your life", "timestamp": 5.0}
    ]}
}"#;

#[tokio::test]
async fn resolves_song_with_lyrics() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/play_song"))
        .and(body_json(json!({"query": "dancing queen"})))
        .respond_with(ResponseTemplate::new(200).set_body_raw(SONG_BODY, "application/json"))
        .expect(1)
        .mount(&server)
        .await;

    let backend = HttpBackend::new(server.uri());
    let song = backend.resolve("dancing queen").await.unwrap();
    assert_eq!(song.source.track_name, "ABBA - Dancing Queen");
    assert!(song.source.is_alternate_variant);
    let ts: Vec<f64> = song.lyrics.iter().map(|l| l.timestamp).collect();
    assert_eq!(ts, vec![0.0, 2.0, 5.0]);
}

#[tokio::test]
async fn fetches_lyrics_by_query() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/lyrics"))
        .and(query_param("query", "ABBA - Dancing Queen"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(
            r#"{"lyrics":[{"text":"You can dance","timestamp":1.5}]}"#,
            "application/json",
        ))
        .mount(&server)
        .await;

    let lines = HttpBackend::new(server.uri())
        .lyrics("ABBA - Dancing Queen")
        .await
        .unwrap();
    assert_eq!(lines.len(), 1);
    assert_eq!(lines[0].timestamp, 1.5);
}

#[tokio::test]
async fn server_errors_surface_status_and_body() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/play_song"))
        .respond_with(ResponseTemplate::new(404).set_body_string("Song not found"))
        .mount(&server)
        .await;

    let err = HttpBackend::new(server.uri())
        .resolve("nothing")
        .await
        .unwrap_err()
        .to_string();
    assert!(err.contains("status=404"), "{err}");
    assert!(err.contains("Song not found"), "{err}");
}

#[tokio::test]
async fn saves_score_with_mode_label() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/save_score"))
        .and(body_json(json!({
            "user_name": "Mia",
            "score": 8123,
            "mode": "competition",
            "song": "Dancing Queen"
        })))
        .respond_with(ResponseTemplate::new(200).set_body_raw(r#"{"status":"success"}"#, "application/json"))
        .expect(1)
        .mount(&server)
        .await;

    HttpBackend::new(server.uri())
        .record(&LeaderboardWrite {
            user_name: "Mia".into(),
            score: 8123,
            mode: Mode::Competition,
            song: "Dancing Queen".into(),
        })
        .await
        .unwrap();
}

#[tokio::test]
async fn reads_leaderboard_sorted_by_score() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/leaderboard"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(
            r#"{"casual":[{"user_name":"a","score":10,"song":"x"},{"user_name":"b","score":90,"song":"y"}],
                "competition":[]}"#,
            "application/json",
        ))
        .mount(&server)
        .await;

    let board = HttpBackend::new(server.uri()).leaderboard().await.unwrap();
    let casual = board.tab(Mode::Casual);
    assert_eq!(casual[0].user_name, "b");
    assert_eq!(casual[1].user_name, "a");
    assert!(board.tab(Mode::Competition).is_empty());
}

#[tokio::test]
async fn chat_reply_can_carry_a_track() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat"))
        .and(body_json(json!({
            "message": "play it",
            "history": [{"role": "user", "content": "hi"}]
        })))
        .respond_with(ResponseTemplate::new(200).set_body_raw(
            r#"{"response":"Here you go!","action":{"type":"play_audio",
                "payload":{"track":"Dancing Queen","url":"/static/dq.mp4","file_path":"songs/dq.mp4"}}}"#,
            "application/json",
        ))
        .mount(&server)
        .await;

    let history = vec![ChatTurn {
        role: "user".into(),
        content: "hi".into(),
    }];
    let reply = HttpBackend::new(server.uri())
        .chat("play it", &history)
        .await
        .unwrap();
    assert_eq!(reply.response, "Here you go!");
    let Some(ChatAction::PlayAudio(track)) = reply.action else {
        panic!("expected a play_audio action");
    };
    assert_eq!(track.file_path, "songs/dq.mp4");
}

#[tokio::test]
async fn personalities_list_and_create() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/personalities"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(
            r#"["friendly","strict_judge"]"#,
            "application/json",
        ))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/personalities"))
        .and(body_json(json!({"name": "pirate", "description": "Talks like a pirate"})))
        .respond_with(ResponseTemplate::new(200).set_body_raw(r#"{"status":"success"}"#, "application/json"))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/personalities"))
        .and(body_json(json!({"name": "", "description": ""})))
        .respond_with(ResponseTemplate::new(400).set_body_raw(
            r#"{"status":"error","error":"name required"}"#,
            "application/json",
        ))
        .mount(&server)
        .await;

    let backend = HttpBackend::new(server.uri());
    assert_eq!(
        backend.personalities().await.unwrap(),
        vec!["friendly", "strict_judge"]
    );
    backend
        .create_personality("pirate", "Talks like a pirate")
        .await
        .unwrap();

    let err = format!("{:#}", backend.create_personality("", "").await.unwrap_err());
    assert!(err.contains("name required"), "{err}");
    assert!(err.contains("status=400"), "{err}");
}

#[derive(Default)]
struct QuietTransport {
    loaded: Mutex<Vec<String>>,
}

#[async_trait::async_trait]
impl MediaTransport for QuietTransport {
    async fn load(&self, source: &PlaybackSource) -> anyhow::Result<()> {
        self.loaded.lock().unwrap().push(source.url.clone());
        Ok(())
    }
    async fn play(&self) -> Result<(), PlaybackError> {
        Ok(())
    }
    async fn pause(&self) {}
    async fn seek(&self, _seconds: f64) {}
}

struct OneShotMicrophone;

struct OneShotStream {
    tx: Option<mpsc::UnboundedSender<RecorderEvent>>,
}

#[async_trait::async_trait]
impl Microphone for OneShotMicrophone {
    fn capability(&self) -> CaptureCapability {
        CaptureCapability::Available
    }

    async fn acquire(
        &self,
        _constraints: &CaptureConstraints,
    ) -> Result<Box<dyn MicrophoneStream>, CaptureError> {
        Ok(Box::new(OneShotStream { tx: None }))
    }
}

impl MicrophoneStream for OneShotStream {
    fn start(
        &mut self,
        _flush_interval: Duration,
        events: mpsc::UnboundedSender<RecorderEvent>,
    ) -> Result<(), CaptureError> {
        self.tx = Some(events);
        Ok(())
    }

    fn request_stop(&mut self) -> Result<(), CaptureError> {
        if let Some(tx) = self.tx.take() {
            let _ = tx.send(RecorderEvent::Data(AudioChunk {
                sample_rate_hz: 16_000,
                samples: vec![0.25; 1600],
            }));
            let _ = tx.send(RecorderEvent::Stopped);
        }
        Ok(())
    }
}

#[tokio::test]
async fn controller_wired_from_config_talks_to_backend() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/play_song"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(SONG_BODY, "application/json"))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/submit_performance"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(
            r#"{"evaluation":{"overall_score":0.8125,"pitch_accuracy_score":0.8,
                "rhythm_score":0.9,"lyrics_score":0.75},"feedback":"Nice!"}"#,
            "application/json",
        ))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/save_score"))
        .and(body_json(json!({
            "user_name": "Mia",
            "score": 8125,
            "mode": "casual",
            "song": "ABBA - Dancing Queen"
        })))
        .respond_with(ResponseTemplate::new(200).set_body_raw(r#"{"status":"success"}"#, "application/json"))
        .expect(1)
        .mount(&server)
        .await;

    let cfg = AppConfig {
        backend_base_url: server.uri(),
        user_name: Some("Mia".into()),
        ..Default::default()
    };
    let transport = Arc::new(QuietTransport::default());
    let controller = build_controller_from_config(
        &cfg,
        Mode::Casual,
        HostBindings {
            microphone: Arc::new(OneShotMicrophone),
            transport: transport.clone(),
            observer: None,
        },
    );

    controller.submit_query("dancing queen").await.unwrap();
    assert_eq!(controller.snapshot().await.state, SessionState::Playing);
    assert_eq!(*transport.loaded.lock().unwrap(), vec!["/static/dq.mp4"]);

    controller.on_playback_started().await;
    let FinishOutcome::Scored { record, next } = controller.finish().await.unwrap() else {
        panic!("expected a scored performance");
    };
    assert_eq!(next, SessionState::Evaluation);
    assert_eq!(record.display_score(), 8125);
    assert_eq!(record.feedback.feedback, "Nice!");

    controller.flush_side_effects().await;

    let received = server.received_requests().await.unwrap();
    let submit = received
        .iter()
        .find(|r| r.url.path() == "/api/submit_performance")
        .unwrap();
    let body = String::from_utf8_lossy(&submit.body);
    assert!(body.contains("name=\"personality\"\r\n\r\nfriendly\r\n"));
}
