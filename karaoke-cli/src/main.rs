use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, bail};
use clap::Parser;
use karaoke_appcore::KaraokeService;
use karaoke_core::calibration::OffsetStep;
use karaoke_core::types::Mode;
use karaoke_engine::SessionController;
use karaoke_engine::session::{FinishOutcome, SessionState};
use karaoke_engine::traits::Microphone;
use karaoke_providers::parse::{ChatAction, ChatTrack};
use karaoke_runtime::defaults::{BACKEND_URL_ENV, CONFIG_FILENAME, default_data_dir};
use karaoke_runtime::ipc::{BattleSummary, PerformanceSummary, ScoreCard};
use karaoke_runtime::runtime_engine::HostBindings;

mod cli;
mod console;

use cli::{Cli, Commands, PersonalityCommand, TakeOptions};
use console::{ConsoleObserver, ConsoleTransport, SilentMicrophone};

// Keep recording a little past the last cue so the final line can be sung out.
const TAIL_SECONDS: f64 = 5.0;
const TICK: Duration = Duration::from_millis(250);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    let config_path = cli
        .config
        .clone()
        .unwrap_or_else(|| default_data_dir().join(CONFIG_FILENAME));
    let backend = cli.backend.clone().or_else(|| std::env::var(BACKEND_URL_ENV).ok());
    let svc = KaraokeService::new(config_path).with_backend_override(backend);

    match cli.command {
        Commands::Sing(cmd) => sing(&svc, Start::Query(&cmd.query), &cmd.take).await,
        Commands::Battle(cmd) => {
            battle(&svc, &cmd.player_one, &cmd.player_two, &cmd.query, &cmd.take).await
        }
        Commands::Lyrics { query } => {
            let lines = svc.lyrics(&query).await?;
            if lines.is_empty() {
                println!("No lyrics found.");
            }
            for line in lines {
                println!("[{:>6.2}] {}", line.timestamp, line.text);
            }
            Ok(())
        }
        Commands::Leaderboard { mode } => {
            let mode = Mode::from(mode);
            let board = svc.leaderboard().await?;
            println!("{} leaderboard", mode.as_str());
            for (rank, entry) in board.tab(mode).iter().enumerate() {
                println!(
                    "{:>3}. {:<20} {:>6}  {}",
                    rank + 1,
                    entry.user_name,
                    entry.score,
                    entry.song
                );
            }
            Ok(())
        }
        Commands::Chat(cmd) => {
            let reply = svc.chat(&cmd.message.join(" ")).await?;
            println!("{}", reply.response);
            match reply.action {
                Some(ChatAction::PlayAudio(track)) if cmd.sing => {
                    sing(&svc, Start::Suggested(track), &cmd.take).await
                }
                Some(ChatAction::PlayAudio(track)) => {
                    println!("Found \"{}\". Add --sing to perform it.", track.track);
                    Ok(())
                }
                Some(ChatAction::Other(kind)) => {
                    log::debug!("ignoring assistant action {kind}");
                    Ok(())
                }
                None => Ok(()),
            }
        }
        Commands::Personalities(PersonalityCommand::List) => {
            for p in svc.personalities().await? {
                println!("{p}");
            }
            Ok(())
        }
        Commands::Personalities(PersonalityCommand::Add { name, description }) => {
            svc.create_personality(&name, &description).await?;
            println!("Added judge personality: {}", name.trim());
            Ok(())
        }
        Commands::History { limit } => {
            for e in svc.recent_performances(limit)? {
                println!(
                    "{:<12} {:<16} {:>6} {}  {}",
                    e.mode.as_str(),
                    e.player,
                    e.score,
                    e.grade.as_str(),
                    e.song
                );
            }
            Ok(())
        }
        Commands::Name { name } => {
            let shown = svc.set_user_name(&name)?;
            println!("Stage name: {shown}");
            Ok(())
        }
        Commands::Devices => list_devices(&svc),
    }
}

fn host(svc: &KaraokeService, take: &TakeOptions) -> anyhow::Result<HostBindings> {
    Ok(HostBindings {
        microphone: microphone(svc, take.silent)?,
        transport: Arc::new(ConsoleTransport),
        observer: Some(Arc::new(ConsoleObserver)),
    })
}

#[cfg(any(windows, target_os = "macos"))]
fn microphone(svc: &KaraokeService, silent: bool) -> anyhow::Result<Arc<dyn Microphone>> {
    if silent {
        return Ok(Arc::new(SilentMicrophone));
    }
    svc.microphone()
}

#[cfg(not(any(windows, target_os = "macos")))]
fn microphone(_svc: &KaraokeService, silent: bool) -> anyhow::Result<Arc<dyn Microphone>> {
    if !silent {
        log::warn!("microphone capture is not supported on this platform; recording silence");
    }
    Ok(Arc::new(SilentMicrophone))
}

#[cfg(any(windows, target_os = "macos"))]
fn list_devices(svc: &KaraokeService) -> anyhow::Result<()> {
    let names = svc
        .list_microphones()
        .map_err(|e| anyhow::anyhow!(karaoke_appcore::service::user_facing_audio_error(&e)))?;
    for name in names {
        println!("{name}");
    }
    Ok(())
}

#[cfg(not(any(windows, target_os = "macos")))]
fn list_devices(_svc: &KaraokeService) -> anyhow::Result<()> {
    println!("Microphone capture is only available on Windows and macOS.");
    Ok(())
}

enum Start<'a> {
    Query(&'a str),
    // A track the assistant already picked.
    Suggested(ChatTrack),
}

async fn sing(svc: &KaraokeService, start: Start<'_>, take: &TakeOptions) -> anyhow::Result<()> {
    let controller = svc.open_session(Mode::Casual, host(svc, take)?)?;
    match start {
        Start::Query(query) => controller.submit_query(query).await?,
        Start::Suggested(track) => controller.play_from_chat(track).await?,
    }

    let outcome = perform(&controller, take).await?;
    svc.record_outcome(&outcome);
    controller.flush_side_effects().await;

    if let FinishOutcome::Scored { record, .. } = &outcome {
        print_performance(&PerformanceSummary::from(record));
        match svc
            .history_store()
            .personal_best(&record.player_name, &record.song)
        {
            Ok(Some(best)) => println!("Personal best for this song: {best}"),
            Ok(None) => {}
            Err(e) => log::warn!("could not read history: {e:#}"),
        }
    }
    controller.dispose().await;
    Ok(())
}

async fn battle(
    svc: &KaraokeService,
    p1: &str,
    p2: &str,
    query: &str,
    take: &TakeOptions,
) -> anyhow::Result<()> {
    let controller = svc.open_session(Mode::Competition, host(svc, take)?)?;
    controller.start_battle(p1, p2).await?;

    println!("{}, you're up!", p1.trim());
    controller.submit_query(query).await?;
    let first = perform(&controller, take).await?;
    svc.record_outcome(&first);
    if !matches!(
        first,
        FinishOutcome::Scored {
            next: SessionState::BattleIntermission,
            ..
        }
    ) {
        bail!("round one did not finish");
    }

    println!("Score hidden. Press Enter when {} is ready.", p2.trim());
    wait_for_enter().await?;

    controller.start_round_two().await?;
    let second = perform(&controller, take).await?;
    svc.record_outcome(&second);
    controller.flush_side_effects().await;

    let result = controller
        .snapshot()
        .await
        .battle_result
        .context("battle finished without a result")?;
    print_battle(&BattleSummary::from(&result));
    controller.dispose().await;
    Ok(())
}

/// Runs one take against the wall clock, printing lyric lines as they come up.
async fn perform(controller: &SessionController, take: &TakeOptions) -> anyhow::Result<FinishOutcome> {
    for _ in 0..take.plus {
        controller.adjust_offset(OffsetStep::Later).await?;
    }
    for _ in 0..take.minus {
        controller.adjust_offset(OffsetStep::Earlier).await?;
    }

    let snapshot = controller.snapshot().await;
    println!(
        "Now singing: {} (offset {:+.1}s)",
        snapshot.song.unwrap_or_default(),
        snapshot.offset.seconds()
    );

    controller.on_playback_started().await;
    let lyrics = controller.lyrics().await;
    if lyrics.is_empty() {
        println!("(no lyrics for this track)");
    }
    let end = take.seconds.unwrap_or_else(|| {
        lyrics.last().map(|l| l.timestamp.max(0.0)).unwrap_or(0.0) + TAIL_SECONDS
    });

    let started = Instant::now();
    let mut ticker = tokio::time::interval(TICK);
    let mut shown = None;
    loop {
        ticker.tick().await;
        let now = started.elapsed().as_secs_f64();
        if now >= end {
            break;
        }
        let active = controller.on_time_update(now).await;
        if active != shown {
            if let Some(line) = active.and_then(|i| lyrics.get(i)) {
                println!("  {}", line.text);
            }
            shown = active;
        }
    }

    println!("Scoring...");
    Ok(controller.on_media_ended().await?)
}

async fn wait_for_enter() -> anyhow::Result<()> {
    tokio::task::spawn_blocking(|| {
        let mut buf = String::new();
        std::io::stdin().read_line(&mut buf).map(|_| ())
    })
    .await
    .context("stdin task failed")?
    .context("read stdin")
}

fn print_card(card: &ScoreCard) {
    println!("  Score  {:>6}  ({})", card.score, card.grade.as_str());
    println!(
        "  Pitch {:>3}%  Rhythm {:>3}%  Lyrics {:>3}%",
        card.pitch_percent, card.rhythm_percent, card.lyrics_percent
    );
    if let Some(p) = card.pitch {
        println!(
            "  Perfect {:>3}%  Close {:>3}%",
            p.perfect_percent, p.close_percent
        );
    }
    if !card.missed_words.is_empty() {
        println!("  Missed: {}", card.missed_words.join(", "));
    }
}

fn print_performance(summary: &PerformanceSummary) {
    println!("{} - {}", summary.player, summary.song);
    print_card(&summary.card);
    if !summary.feedback.trim().is_empty() {
        println!("\n{}", summary.feedback.trim());
    }
}

fn print_battle(summary: &BattleSummary) {
    println!("{}", summary.p1_name);
    print_card(&summary.p1);
    println!("{}", summary.p2_name);
    print_card(&summary.p2);
    match &summary.winner {
        Some(name) => println!("\nWinner: {name}"),
        None => println!("\nIt's a draw!"),
    }
}
