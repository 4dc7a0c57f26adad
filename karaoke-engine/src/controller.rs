use std::sync::Arc;
use std::time::Duration;

use karaoke_core::calibration::{CalibrationError, Offset, OffsetStep, apply_offset, sync_to_start};
use karaoke_core::config::{AppConfig, JudgePersonalities};
use karaoke_core::cursor::LyricCursor;
use karaoke_core::score::PerformanceFeedback;
use karaoke_core::types::{LyricLine, Mode, PerformanceId, PlaybackSource, PlayerSlot};
use karaoke_providers::backend::LeaderboardWrite;
use karaoke_providers::parse::{ChatTrack, SongResolution};
use thiserror::Error;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

use crate::battle::{BattleResult, BattleTurnManager, TurnOutcome};
use crate::capture::{CaptureCoordinator, CaptureStage, CapturedPerformance};
use crate::session::{FinishOutcome, Notice, PerformanceRecord, SessionSnapshot, SessionState};
use crate::submission::{SubmissionContext, assemble_evaluation_request};
use crate::traits::{
    CaptureCapability, CaptureConstraints, CaptureError, LeaderboardSink, MediaTransport,
    Microphone, PlaybackError, RecordedAudio, Scorer, SessionObserver, SongResolver,
};

#[derive(Debug, Error, Clone, PartialEq)]
pub enum SessionError {
    #[error("microphone access required")]
    PermissionDenied,

    #[error("no microphone found")]
    DeviceNotFound,

    #[error("audio capture unavailable: {0}")]
    CaptureUnavailable(String),

    #[error("network request failed: {0}")]
    NetworkFailure(String),

    #[error("no lyrics loaded to sync against")]
    EmptyLyrics,

    #[error("playback blocked; press play to start")]
    AutoplayBlocked,

    #[error("cannot {action} while in {state}")]
    InvalidTransition {
        state: SessionState,
        action: &'static str,
    },

    #[error("both players need a name")]
    InvalidPlayers,

    #[error("search query is empty")]
    EmptyQuery,

    #[error("could not package the performance: {0}")]
    Assembly(String),

    #[error("session has been disposed")]
    Disposed,
}

impl From<CaptureError> for SessionError {
    fn from(e: CaptureError) -> Self {
        match e {
            CaptureError::PermissionDenied => SessionError::PermissionDenied,
            CaptureError::DeviceNotFound => SessionError::DeviceNotFound,
            CaptureError::Unavailable(r) | CaptureError::Recorder(r) => {
                SessionError::CaptureUnavailable(r)
            }
        }
    }
}

impl From<CalibrationError> for SessionError {
    fn from(e: CalibrationError) -> Self {
        match e {
            CalibrationError::EmptyLyrics => SessionError::EmptyLyrics,
        }
    }
}

/// Per-controller settings, resolved once from `AppConfig`.
#[derive(Debug, Clone, PartialEq)]
pub struct ControllerConfig {
    pub mode: Mode,
    pub user_name: String,
    pub personalities: JudgePersonalities,
    pub offset_step_seconds: f64,
    pub flush_interval: Duration,
    pub scoring_sample_rate_hz: u32,
    pub constraints: CaptureConstraints,
}

impl ControllerConfig {
    pub fn from_app_config(cfg: &AppConfig, mode: Mode) -> Self {
        Self {
            mode,
            user_name: cfg.display_name().to_string(),
            personalities: cfg.personalities.clone(),
            offset_step_seconds: cfg.offset_step_seconds,
            flush_interval: Duration::from_millis(cfg.capture_flush_interval_ms.max(1)),
            scoring_sample_rate_hz: cfg.scoring_sample_rate_hz,
            constraints: CaptureConstraints::default(),
        }
    }
}

/// External systems the controller drives.
#[derive(Clone)]
pub struct Collaborators {
    pub microphone: Arc<dyn Microphone>,
    pub transport: Arc<dyn MediaTransport>,
    pub resolver: Arc<dyn SongResolver>,
    pub scorer: Arc<dyn Scorer>,
    pub leaderboard: Arc<dyn LeaderboardSink>,
    pub observer: Option<Arc<dyn SessionObserver>>,
}

struct Inner {
    state: SessionState,
    capability: CaptureCapability,

    source: Option<PlaybackSource>,
    // Raw timeline as resolved; `calibrated` is derived from it on every offset change.
    lyrics: Vec<LyricLine>,
    calibrated: Vec<LyricLine>,
    offset: Offset,
    cursor: LyricCursor,
    current_time: f64,
    is_playing: bool,

    capture: Option<CaptureCoordinator>,
    performance_id: Option<PerformanceId>,

    // Set while a search/arm is in flight so a second submit cannot race it.
    busy: bool,
    // Bumped by reset/dispose so in-flight work from an older session can't win.
    epoch: u64,

    battle: Option<BattleTurnManager>,
    last_feedback: Option<PerformanceFeedback>,
    battle_result: Option<BattleResult>,
    notice: Option<Notice>,

    side_effects: Vec<JoinHandle<()>>,
    disposed: bool,

    // Observer queue, drained by `publish` after the lock is released.
    state_dirty: bool,
    pending_lines: Vec<Option<usize>>,
    pending_notices: Vec<Notice>,
}

impl Inner {
    fn new(mode: Mode, capability: CaptureCapability) -> Self {
        Self {
            state: SessionState::initial(mode),
            capability,
            source: None,
            lyrics: Vec::new(),
            calibrated: Vec::new(),
            offset: Offset::ZERO,
            cursor: LyricCursor::new(),
            current_time: 0.0,
            is_playing: false,
            capture: None,
            performance_id: None,
            busy: false,
            epoch: 0,
            battle: None,
            last_feedback: None,
            battle_result: None,
            notice: None,
            side_effects: Vec::new(),
            disposed: false,
            state_dirty: true,
            pending_lines: Vec::new(),
            pending_notices: Vec::new(),
        }
    }

    fn set_state(&mut self, next: SessionState) {
        let prev = self.state;
        self.state = next;
        if prev != next {
            log::info!("session state: {:?} -> {:?}", prev, next);
        }
        self.state_dirty = true;
    }

    fn set_notice(&mut self, notice: Notice) {
        self.notice = Some(notice.clone());
        self.pending_notices.push(notice);
        self.state_dirty = true;
    }

    fn clear_notice(&mut self) {
        if self.notice.take().is_some() {
            self.state_dirty = true;
        }
    }

    // The cursor keeps its previous line, so a nudge only reports a line that actually moved.
    fn set_offset(&mut self, offset: Offset) {
        self.offset = offset;
        self.calibrated = apply_offset(&self.lyrics, offset);
        self.refresh_cursor();
        self.state_dirty = true;
    }

    // Swaps in a new timeline from the top. The old line is cleared first so observers drop it
    // even when the new timeline highlights the same index.
    fn load_timeline(&mut self, lyrics: Vec<LyricLine>, offset: Offset) {
        if self.cursor.current().is_some() {
            self.pending_lines.push(None);
        }
        self.cursor.reset();
        self.lyrics = lyrics;
        self.current_time = 0.0;
        self.set_offset(offset);
    }

    // Player two's turn is bound to the song player one sang.
    fn replays_battle_song(&self) -> bool {
        let Some(b) = self.battle.as_ref() else {
            return false;
        };
        self.source.is_some()
            && b.current_turn() == PlayerSlot::P2
            && b.score(PlayerSlot::P2).is_none()
    }

    fn refresh_cursor(&mut self) {
        if let Some(change) = self.cursor.update(&self.calibrated, self.current_time) {
            self.pending_lines.push(change);
        }
    }

    fn pump_capture(&mut self) {
        let warnings = match self.capture.as_mut() {
            Some(c) => c.pump(),
            None => return,
        };
        for w in warnings {
            self.set_notice(Notice::warning(w));
        }
    }

    fn ensure_active(&self) -> Result<(), SessionError> {
        if self.disposed {
            return Err(SessionError::Disposed);
        }
        Ok(())
    }

    fn expect_state(&self, expected: SessionState, action: &'static str) -> Result<(), SessionError> {
        self.ensure_active()?;
        if self.state != expected || self.busy {
            return Err(SessionError::InvalidTransition {
                state: self.state,
                action,
            });
        }
        Ok(())
    }

    fn current_player(&self, cfg: &ControllerConfig) -> String {
        match &self.battle {
            Some(b) => b.player_name(b.current_turn()).to_string(),
            None => cfg.user_name.clone(),
        }
    }

    fn song_title(&self) -> String {
        match &self.source {
            Some(s) if !s.track_name.trim().is_empty() => s.track_name.clone(),
            Some(s) => s.url.clone(),
            None => String::new(),
        }
    }

    fn release_capture(&mut self) {
        if let Some(c) = self.capture.take() {
            c.discard();
        }
    }
}

/// Drives one karaoke session: search, synchronized playback and capture, scoring, battles.
///
/// Cheap to clone; every clone drives the same session. Media element events (`on_*`) may
/// arrive from any task.
#[derive(Clone)]
pub struct SessionController {
    inner: Arc<Mutex<Inner>>,
    deps: Arc<Collaborators>,
    cfg: Arc<ControllerConfig>,
}

// Snapshot of what a finish needs once the lock is released.
struct PendingSubmission {
    capture: Option<CaptureCoordinator>,
    // Capture warnings already shown as notices during playback.
    surfaced_warnings: usize,
    lyrics: Vec<LyricLine>,
    source: Option<PlaybackSource>,
    personality: String,
    player_name: String,
    song: String,
    performance_id: PerformanceId,
    epoch: u64,
}

impl SessionController {
    pub fn create(cfg: ControllerConfig, deps: Collaborators) -> Self {
        // Capability is fixed for the lifetime of the controller.
        let capability = deps.microphone.capability();
        if let CaptureCapability::Unavailable(reason) = &capability {
            log::warn!("audio capture unavailable on this host: {reason}");
        }
        log::info!("session controller created (mode={})", cfg.mode.as_str());

        Self {
            inner: Arc::new(Mutex::new(Inner::new(cfg.mode, capability))),
            deps: Arc::new(deps),
            cfg: Arc::new(cfg),
        }
    }

    pub fn mode(&self) -> Mode {
        self.cfg.mode
    }

    pub async fn snapshot(&self) -> SessionSnapshot {
        let inner = self.inner.lock().await;
        Self::snapshot_of(&inner, &self.cfg)
    }

    fn snapshot_of(inner: &Inner, cfg: &ControllerConfig) -> SessionSnapshot {
        let capture = match (&inner.capture, inner.state) {
            (Some(c), _) => c.stage(),
            (None, SessionState::Submitting) => CaptureStage::Stopped,
            (None, _) => CaptureStage::Idle,
        };
        SessionSnapshot {
            state: inner.state,
            state_label: inner.state.label().into(),
            mode: cfg.mode,
            song: inner.source.as_ref().map(|_| inner.song_title()),
            is_alternate_variant: inner
                .source
                .as_ref()
                .is_some_and(|s| s.is_alternate_variant),
            offset: inner.offset,
            line_count: inner.lyrics.len(),
            active_line: inner.cursor.current(),
            current_time: inner.current_time,
            is_playing: inner.is_playing,
            capture,
            busy: inner.busy,
            battle: inner.battle.as_ref().map(|b| b.view()),
            last_score: inner.last_feedback.as_ref().map(|f| f.evaluation.clone()),
            last_feedback: inner.last_feedback.as_ref().map(|f| f.feedback.clone()),
            battle_result: inner.battle_result.clone(),
            notice: inner.notice.clone(),
            disposed: inner.disposed,
        }
    }

    /// Calibrated lyric timeline as currently displayed.
    pub async fn lyrics(&self) -> Vec<LyricLine> {
        self.inner.lock().await.calibrated.clone()
    }

    /// Delivers queued observer events. Never called with the lock held.
    async fn publish(&self) {
        let (snapshot, lines, notices) = {
            let mut inner = self.inner.lock().await;
            let snapshot = if inner.state_dirty {
                inner.state_dirty = false;
                Some(Self::snapshot_of(&inner, &self.cfg))
            } else {
                None
            };
            (
                snapshot,
                std::mem::take(&mut inner.pending_lines),
                std::mem::take(&mut inner.pending_notices),
            )
        };

        let Some(observer) = self.deps.observer.as_ref() else {
            return;
        };
        for n in &notices {
            observer.notice(n);
        }
        for l in lines {
            observer.active_line_changed(l);
        }
        if let Some(s) = snapshot {
            observer.state_changed(&s);
        }
    }

    async fn published<T>(&self, r: T) -> T {
        self.publish().await;
        r
    }

    pub async fn start_battle(&self, p1: &str, p2: &str) -> Result<(), SessionError> {
        let r = {
            let mut inner = self.inner.lock().await;
            self.start_battle_locked(&mut inner, p1, p2)
        };
        self.published(r).await
    }

    fn start_battle_locked(&self, inner: &mut Inner, p1: &str, p2: &str) -> Result<(), SessionError> {
        inner.expect_state(SessionState::BattleSetup, "start a battle")?;
        let battle = BattleTurnManager::new(p1, p2).map_err(|e| {
            log::warn!("battle setup rejected: {e}");
            SessionError::InvalidPlayers
        })?;
        log::info!(
            "battle: {} vs {}",
            battle.player_name(PlayerSlot::P1),
            battle.player_name(PlayerSlot::P2)
        );
        inner.battle = Some(battle);
        inner.battle_result = None;
        inner.clear_notice();
        inner.set_state(SessionState::Search);
        Ok(())
    }

    /// Discards every trace of the current battle and returns to player setup.
    pub async fn new_battle(&self) -> Result<(), SessionError> {
        if self.cfg.mode != Mode::Competition {
            let state = self.inner.lock().await.state;
            return Err(SessionError::InvalidTransition {
                state,
                action: "start a new battle",
            });
        }
        self.reset().await
    }

    /// Resolves `query` and starts the performance. The microphone is armed first, while the
    /// user's gesture is still fresh. On player two's battle turn the loaded song is replayed
    /// and `query` is not resolved.
    pub async fn submit_query(&self, query: &str) -> Result<(), SessionError> {
        let r = self.submit_query_inner(query).await;
        self.published(r).await
    }

    async fn submit_query_inner(&self, query: &str) -> Result<(), SessionError> {
        let query = query.trim();
        let replay = self.inner.lock().await.replays_battle_song();
        let epoch = self
            .begin_arming(SessionState::Search, "search", query.is_empty() && !replay)
            .await?;
        self.publish().await;

        let capture = self.arm(epoch).await?;
        if replay {
            log::info!("player two retries the round-one song; ignoring query {query:?}");
            return self.enter_playing(capture, None, epoch).await;
        }

        let resolution = match self.deps.resolver.resolve(query).await {
            Ok(r) => r,
            Err(e) => {
                log::warn!("song resolution failed for {query:?}: {e:#}");
                capture.discard();
                let mut inner = self.inner.lock().await;
                if inner.epoch == epoch {
                    inner.busy = false;
                    inner.set_notice(Notice::error(format!("Could not load song: {e}")));
                }
                return Err(SessionError::NetworkFailure(e.to_string()));
            }
        };

        self.enter_playing(capture, Some(resolution), epoch).await
    }

    /// Starts a track the assistant picked. Lyrics are looked up by track title; a failed lookup
    /// still plays the song, just without a timeline.
    pub async fn play_from_chat(&self, track: ChatTrack) -> Result<(), SessionError> {
        let r = self.play_from_chat_inner(track).await;
        self.published(r).await
    }

    async fn play_from_chat_inner(&self, track: ChatTrack) -> Result<(), SessionError> {
        let epoch = self
            .begin_arming(SessionState::Search, "play a suggested track", track.url.trim().is_empty())
            .await?;
        self.publish().await;

        let capture = self.arm(epoch).await?;

        let lyrics = match self.deps.resolver.lyrics(&track.track).await {
            Ok(l) => l,
            Err(e) => {
                log::warn!("lyrics lookup failed for {:?}: {e:#}", track.track);
                let mut inner = self.inner.lock().await;
                inner.set_notice(Notice::warning("No lyrics found for this track."));
                Vec::new()
            }
        };

        let resolution = SongResolution {
            source: PlaybackSource {
                url: track.url,
                track_name: track.track,
                source_file_path: track.file_path,
                is_alternate_variant: false,
            },
            lyrics,
        };
        self.enter_playing(capture, Some(resolution), epoch).await
    }

    /// Operator hands the stage to player two; same song, fresh capture, offset back to zero.
    pub async fn start_round_two(&self) -> Result<(), SessionError> {
        let r = self.start_round_two_inner().await;
        self.published(r).await
    }

    async fn start_round_two_inner(&self) -> Result<(), SessionError> {
        let epoch = {
            let mut inner = self.inner.lock().await;
            inner.expect_state(SessionState::BattleIntermission, "start round two")?;
            let advanced = inner
                .battle
                .as_mut()
                .is_some_and(|b| b.advance_to_round_two());
            if !advanced {
                return Err(SessionError::InvalidTransition {
                    state: inner.state,
                    action: "start round two",
                });
            }
            inner.busy = true;
            inner.state_dirty = true;
            inner.epoch
        };

        let capture = match self.arm(epoch).await {
            Ok(c) => c,
            Err(e) => {
                // Player two never got the stage; the operator can start the round again.
                let mut inner = self.inner.lock().await;
                if inner.epoch == epoch {
                    if let Some(b) = inner.battle.as_mut() {
                        b.return_to_round_one();
                    }
                    inner.state_dirty = true;
                }
                return Err(e);
            }
        };
        self.enter_playing(capture, None, epoch).await
    }

    // Validates the state and marks the controller busy. Returns the epoch to check later.
    async fn begin_arming(
        &self,
        expected: SessionState,
        action: &'static str,
        empty_input: bool,
    ) -> Result<u64, SessionError> {
        let mut inner = self.inner.lock().await;
        inner.expect_state(expected, action)?;
        if empty_input {
            return Err(SessionError::EmptyQuery);
        }
        inner.busy = true;
        inner.clear_notice();
        inner.state_dirty = true;
        Ok(inner.epoch)
    }

    async fn arm(&self, epoch: u64) -> Result<CaptureCoordinator, SessionError> {
        let capability = self.inner.lock().await.capability.clone();
        let armed = CaptureCoordinator::arm(
            self.deps.microphone.as_ref(),
            &capability,
            &self.cfg.constraints,
            self.cfg.flush_interval,
        )
        .await;

        match armed {
            Ok(c) => Ok(c),
            Err(e) => {
                log::warn!("microphone arm failed: {e}");
                let mut inner = self.inner.lock().await;
                if inner.epoch == epoch {
                    inner.busy = false;
                    inner.set_notice(Notice::error(capitalize(&e.to_string())));
                }
                Err(e.into())
            }
        }
    }

    async fn enter_playing(
        &self,
        capture: CaptureCoordinator,
        resolution: Option<SongResolution>,
        epoch: u64,
    ) -> Result<(), SessionError> {
        let source = {
            let mut inner = self.inner.lock().await;
            if inner.disposed || inner.epoch != epoch {
                capture.discard();
                return Err(if inner.disposed {
                    SessionError::Disposed
                } else {
                    SessionError::InvalidTransition {
                        state: inner.state,
                        action: "start playback",
                    }
                });
            }

            if let Some(SongResolution { source, lyrics }) = resolution {
                let same_song = inner
                    .source
                    .as_ref()
                    .is_some_and(|prev| prev.is_same_song(&source));
                let offset = if inner.battle.is_none() && same_song {
                    inner.offset
                } else {
                    Offset::ZERO
                };
                log::info!(
                    "loaded {:?} ({} lyric lines, offset {:+}s)",
                    source.track_name,
                    lyrics.len(),
                    offset.seconds()
                );
                inner.source = Some(source);
                inner.load_timeline(lyrics, offset);
            } else {
                // Round two replays the loaded song from the top.
                inner.current_time = 0.0;
                inner.set_offset(Offset::ZERO);
            }

            let Some(source) = inner.source.clone() else {
                capture.discard();
                inner.busy = false;
                return Err(SessionError::InvalidTransition {
                    state: inner.state,
                    action: "start playback",
                });
            };

            inner.capture = Some(capture);
            inner.performance_id = Some(PerformanceId::new());
            inner.is_playing = false;
            inner.last_feedback = None;
            inner.busy = false;
            inner.set_state(SessionState::Playing);
            source
        };
        self.publish().await;

        if let Err(e) = self.deps.transport.load(&source).await {
            log::error!("failed to load {:?}: {e:#}", source.url);
            let mut inner = self.inner.lock().await;
            if inner.epoch == epoch && inner.state == SessionState::Playing {
                inner.release_capture();
                inner.set_state(SessionState::Search);
                inner.set_notice(Notice::error(format!("Could not load the track: {e}")));
            }
            return Err(SessionError::NetworkFailure(e.to_string()));
        }
        self.deps.transport.seek(0.0).await;

        match self.deps.transport.play().await {
            Ok(()) => {}
            Err(PlaybackError::AutoplayBlocked) => {
                log::warn!("autoplay blocked; waiting for the user to press play");
                let mut inner = self.inner.lock().await;
                inner.set_notice(Notice::warning("Press play to start the song."));
            }
            Err(PlaybackError::Failed(msg)) => {
                log::warn!("play() failed: {msg}");
                let mut inner = self.inner.lock().await;
                inner.set_notice(Notice::warning(format!("Playback did not start: {msg}")));
            }
        }
        Ok(())
    }

    /// Media "playing" signal. The first one in a turn starts capture.
    pub async fn on_playback_started(&self) {
        {
            let mut inner = self.inner.lock().await;
            if inner.disposed {
                return;
            }
            inner.is_playing = true;
            inner.state_dirty = true;
            if inner.state == SessionState::Playing {
                let started = match inner.capture.as_mut() {
                    Some(c) => c.start_on_playback_begin(),
                    None => Ok(false),
                };
                match started {
                    Ok(true) => inner.clear_notice(),
                    Ok(false) => {}
                    Err(e) => {
                        log::error!("capture failed to start: {e}");
                        inner.set_notice(Notice::error(capitalize(&e.to_string())));
                    }
                }
            }
        }
        self.publish().await;
    }

    pub async fn on_playback_paused(&self) {
        {
            let mut inner = self.inner.lock().await;
            if inner.is_playing {
                inner.is_playing = false;
                inner.state_dirty = true;
            }
        }
        self.publish().await;
    }

    /// Pause/resume button. A resume after a blocked autoplay is how capture eventually starts.
    pub async fn toggle_playback(&self) -> Result<(), SessionError> {
        let r = self.toggle_playback_inner().await;
        self.published(r).await
    }

    async fn toggle_playback_inner(&self) -> Result<(), SessionError> {
        let was_playing = {
            let inner = self.inner.lock().await;
            inner.ensure_active()?;
            if inner.state != SessionState::Playing {
                return Err(SessionError::InvalidTransition {
                    state: inner.state,
                    action: "toggle playback",
                });
            }
            inner.is_playing
        };

        if was_playing {
            self.deps.transport.pause().await;
            self.on_playback_paused().await;
            return Ok(());
        }

        match self.deps.transport.play().await {
            Ok(()) => Ok(()),
            Err(PlaybackError::AutoplayBlocked) => {
                let mut inner = self.inner.lock().await;
                inner.set_notice(Notice::warning("Press play to start the song."));
                Err(SessionError::AutoplayBlocked)
            }
            Err(PlaybackError::Failed(msg)) => {
                let mut inner = self.inner.lock().await;
                inner.set_notice(Notice::warning(format!("Playback did not start: {msg}")));
                Err(SessionError::NetworkFailure(msg))
            }
        }
    }

    /// Media time tick. Returns the active lyric line after the update.
    pub async fn on_time_update(&self, current_time: f64) -> Option<usize> {
        let active = {
            let mut inner = self.inner.lock().await;
            if inner.state != SessionState::Playing || !current_time.is_finite() {
                return inner.cursor.current();
            }
            inner.current_time = current_time.max(0.0);
            inner.refresh_cursor();
            inner.pump_capture();
            inner.cursor.current()
        };
        self.publish().await;
        active
    }

    /// Nudges the lyrics by one step. Returns the new offset.
    pub async fn adjust_offset(&self, step: OffsetStep) -> Result<Offset, SessionError> {
        let r = {
            let mut inner = self.inner.lock().await;
            inner
                .expect_state(SessionState::Playing, "adjust the offset")
                .map(|()| {
                    let next = inner.offset.stepped(step, self.cfg.offset_step_seconds);
                    log::debug!("offset {:+}s -> {:+}s", inner.offset.seconds(), next.seconds());
                    inner.set_offset(next);
                    next
                })
        };
        self.published(r).await
    }

    /// Sets the offset so the first lyric line lands on the current playback time.
    pub async fn sync_to_first_line(&self) -> Result<Offset, SessionError> {
        let r = {
            let mut inner = self.inner.lock().await;
            self.sync_locked(&mut inner)
        };
        self.published(r).await
    }

    fn sync_locked(&self, inner: &mut Inner) -> Result<Offset, SessionError> {
        inner.expect_state(SessionState::Playing, "sync lyrics")?;
        match sync_to_start(&inner.lyrics, inner.current_time) {
            Ok(offset) => {
                log::info!(
                    "synced first line to {:.2}s (offset {:+}s)",
                    inner.current_time,
                    offset.seconds()
                );
                inner.set_offset(offset);
                Ok(offset)
            }
            Err(e) => {
                inner.set_notice(Notice::warning("No lyrics to sync."));
                Err(e.into())
            }
        }
    }

    /// Natural end of the reference media; shares the finish path with a manual stop.
    pub async fn on_media_ended(&self) -> Result<FinishOutcome, SessionError> {
        self.finish().await
    }

    /// Stops the performance and submits it. Runs at most once per turn: a second caller
    /// (e.g. the end event racing a manual stop) gets `Ignored`.
    pub async fn finish(&self) -> Result<FinishOutcome, SessionError> {
        let r = self.finish_inner().await;
        self.published(r).await
    }

    async fn finish_inner(&self) -> Result<FinishOutcome, SessionError> {
        let pending = {
            let mut inner = self.inner.lock().await;
            inner.ensure_active()?;
            if inner.state != SessionState::Playing {
                return Ok(FinishOutcome::Ignored);
            }
            inner.pump_capture();
            inner.is_playing = false;
            inner.set_state(SessionState::Submitting);
            let capture = inner.capture.take();
            PendingSubmission {
                surfaced_warnings: capture.as_ref().map_or(0, |c| c.warnings().len()),
                capture,
                lyrics: inner.lyrics.clone(),
                source: inner.source.clone(),
                personality: self.cfg.personalities.for_mode(self.cfg.mode).to_string(),
                player_name: inner.current_player(&self.cfg),
                song: inner.song_title(),
                performance_id: inner.performance_id.take().unwrap_or_default(),
                epoch: inner.epoch,
            }
        };
        self.publish().await;

        self.deps.transport.pause().await;

        let taken = match pending.capture {
            Some(c) => c.stop().await,
            None => CapturedPerformance {
                audio: RecordedAudio {
                    sample_rate_hz: 0,
                    samples: Vec::new(),
                },
                warnings: Vec::new(),
            },
        };
        log::info!(
            "take finished: {:.1}s of audio for {}",
            taken.audio.duration().as_secs_f64(),
            pending.player_name
        );

        // The offset in effect right now is the one the singer performed against.
        let offset = self.inner.lock().await.offset;
        let req = assemble_evaluation_request(
            &taken.audio,
            &SubmissionContext {
                lyrics: &pending.lyrics,
                offset,
                personality: &pending.personality,
                reference_audio_path: pending
                    .source
                    .as_ref()
                    .map(|s| s.source_file_path.as_str()),
                target_sample_rate_hz: self.cfg.scoring_sample_rate_hz,
            },
        );

        let scored = match req {
            Ok(req) => self
                .deps
                .scorer
                .evaluate(&req)
                .await
                .map_err(|e| SessionError::NetworkFailure(format!("{e:#}"))),
            Err(e) => Err(SessionError::Assembly(format!("{e:#}"))),
        };

        let mut inner = self.inner.lock().await;
        for w in taken.warnings.into_iter().skip(pending.surfaced_warnings) {
            inner.set_notice(Notice::warning(w));
        }
        if inner.disposed || inner.epoch != pending.epoch {
            return Err(SessionError::Disposed);
        }

        let feedback = match scored {
            Ok(f) => f,
            Err(e) => {
                log::error!("submission failed: {e}");
                // A battle keeps its players and turn; the same singer can try again, and player
                // two's retry replays the round-one song.
                inner.set_state(SessionState::Search);
                inner.set_notice(Notice::error(format!("Scoring failed: {e}")));
                return Err(e);
            }
        };

        let record = PerformanceRecord {
            id: pending.performance_id,
            mode: self.cfg.mode,
            player_name: pending.player_name,
            song: pending.song,
            feedback: feedback.clone(),
        };
        log::info!(
            "{} scored {} ({})",
            record.player_name,
            record.display_score(),
            record.grade().as_str()
        );

        let outcome = inner.battle.as_mut().map(|b| b.record(feedback.evaluation.clone()));
        inner.last_feedback = Some(feedback);

        let next = match outcome {
            None => {
                self.spawn_leaderboard_write(
                    &mut inner,
                    &record.player_name,
                    record.display_score(),
                    &record.song,
                );
                SessionState::Evaluation
            }
            Some(TurnOutcome::Intermission) => SessionState::BattleIntermission,
            Some(TurnOutcome::Reveal(result)) => {
                match result.winner_name() {
                    Some(w) => log::info!("battle winner: {w}"),
                    None => log::info!("battle ended in a draw"),
                }
                for (name, score) in [(&result.p1_name, &result.p1), (&result.p2_name, &result.p2)] {
                    self.spawn_leaderboard_write(&mut inner, name, score.display_score(), &record.song);
                }
                inner.battle_result = Some(result);
                SessionState::BattleReveal
            }
        };
        inner.set_state(next);

        Ok(FinishOutcome::Scored { record, next })
    }

    // Fire and forget; only the handle is kept so callers can wait for it.
    fn spawn_leaderboard_write(&self, inner: &mut Inner, name: &str, score: u32, song: &str) {
        if score == 0 {
            log::debug!("not recording zero score for {name}");
            return;
        }
        let entry = LeaderboardWrite {
            user_name: name.to_string(),
            score,
            mode: self.cfg.mode,
            song: song.to_string(),
        };
        let sink = self.deps.leaderboard.clone();
        inner.side_effects.retain(|h| !h.is_finished());
        inner.side_effects.push(tokio::spawn(async move {
            if let Err(e) = sink.record(&entry).await {
                log::warn!("leaderboard write failed for {}: {e:#}", entry.user_name);
            }
        }));
    }

    /// Waits for background leaderboard writes issued so far.
    pub async fn flush_side_effects(&self) {
        let handles = std::mem::take(&mut self.inner.lock().await.side_effects);
        for h in handles {
            if let Err(e) = h.await {
                log::warn!("background task failed: {e}");
            }
        }
    }

    /// Evaluation screen's "sing again". The last song stays loaded so a replay keeps its offset.
    pub async fn retry(&self) -> Result<(), SessionError> {
        let r = {
            let mut inner = self.inner.lock().await;
            inner.expect_state(SessionState::Evaluation, "retry").map(|()| {
                inner.clear_notice();
                inner.set_state(SessionState::Search);
            })
        };
        self.published(r).await
    }

    /// Back to the mode's initial state, dropping the battle and any armed microphone.
    pub async fn reset(&self) -> Result<(), SessionError> {
        let r = self.reset_inner().await;
        self.published(r).await
    }

    async fn reset_inner(&self) -> Result<(), SessionError> {
        let was_playing = {
            let mut inner = self.inner.lock().await;
            inner.ensure_active()?;
            if inner.state == SessionState::Submitting {
                return Err(SessionError::InvalidTransition {
                    state: inner.state,
                    action: "reset",
                });
            }
            let was_playing = inner.state == SessionState::Playing;
            inner.release_capture();
            inner.epoch = inner.epoch.wrapping_add(1);
            inner.busy = false;
            inner.battle = None;
            inner.battle_result = None;
            inner.last_feedback = None;
            inner.performance_id = None;
            inner.source = None;
            inner.is_playing = false;
            inner.load_timeline(Vec::new(), Offset::ZERO);
            inner.clear_notice();
            inner.set_state(SessionState::initial(self.cfg.mode));
            was_playing
        };
        if was_playing {
            self.deps.transport.pause().await;
        }
        Ok(())
    }

    /// Releases the microphone and stops accepting actions.
    pub async fn dispose(&self) {
        let was_playing = {
            let mut inner = self.inner.lock().await;
            if inner.disposed {
                return;
            }
            inner.disposed = true;
            inner.epoch = inner.epoch.wrapping_add(1);
            inner.release_capture();
            inner.busy = false;
            inner.state_dirty = true;
            let was_playing = inner.is_playing;
            inner.is_playing = false;
            was_playing
        };
        if was_playing {
            self.deps.transport.pause().await;
        }
        log::info!("session controller disposed");
        self.publish().await;
    }
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) => c.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn capture_errors_map_onto_session_errors() {
        assert_eq!(
            SessionError::from(CaptureError::PermissionDenied),
            SessionError::PermissionDenied
        );
        assert_eq!(
            SessionError::from(CaptureError::Recorder("boom".into())),
            SessionError::CaptureUnavailable("boom".into())
        );
    }

    #[test]
    fn config_resolves_display_name_and_flush_interval() {
        let app = AppConfig {
            user_name: Some("  ".into()),
            capture_flush_interval_ms: 250,
            ..Default::default()
        };
        let cfg = ControllerConfig::from_app_config(&app, Mode::Competition);
        assert_eq!(cfg.user_name, "Anonymous");
        assert_eq!(cfg.flush_interval, Duration::from_millis(250));
        assert_eq!(cfg.personalities.for_mode(cfg.mode), "strict_judge");
    }

    #[test]
    fn invalid_transition_message_names_state() {
        let e = SessionError::InvalidTransition {
            state: SessionState::Playing,
            action: "search",
        };
        assert_eq!(e.to_string(), "cannot search while in playing");
    }

    #[test]
    fn capitalizes_first_letter() {
        assert_eq!(capitalize("microphone access required"), "Microphone access required");
        assert_eq!(capitalize(""), "");
    }
}
