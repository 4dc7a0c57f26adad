use clap::{Args, Parser, Subcommand, ValueEnum};
use karaoke_core::types::Mode;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "karaoke", about = "Terminal front-end for the karaoke session controller")]
pub struct Cli {
    /// Config file (defaults to config.json in the data directory)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Backend base URL for this run only
    #[arg(long, global = true)]
    pub backend: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Sing a song and get it scored
    Sing(SingCommand),

    /// Two players, one song, sequential turns
    Battle(BattleCommand),

    /// Print the time-stamped lyrics for a song
    Lyrics { query: String },

    /// Show the leaderboard
    Leaderboard {
        #[arg(long, value_enum, default_value = "casual")]
        mode: ModeArg,
    },

    /// Talk to the host assistant
    Chat(ChatCommand),

    /// List or add judge personalities
    #[command(subcommand)]
    Personalities(PersonalityCommand),

    /// Show recent local performances
    History {
        #[arg(long, default_value_t = 10)]
        limit: usize,
    },

    /// Set the stage name used for the leaderboard
    Name { name: String },

    /// List microphones
    Devices,
}

#[derive(Args, Debug, Clone)]
pub struct TakeOptions {
    /// Raise the offset this many steps (lyrics show earlier)
    #[arg(long, default_value_t = 0)]
    pub plus: u32,

    /// Lower the offset this many steps (lyrics show later)
    #[arg(long, default_value_t = 0)]
    pub minus: u32,

    /// Stop after this many seconds instead of shortly after the last lyric
    #[arg(long)]
    pub seconds: Option<f64>,

    /// Record silence instead of opening a microphone
    #[arg(long)]
    pub silent: bool,
}

#[derive(Args, Debug)]
pub struct SingCommand {
    pub query: String,

    #[command(flatten)]
    pub take: TakeOptions,
}

#[derive(Args, Debug)]
pub struct BattleCommand {
    pub player_one: String,
    pub player_two: String,
    pub query: String,

    #[command(flatten)]
    pub take: TakeOptions,
}

#[derive(Args, Debug)]
pub struct ChatCommand {
    pub message: Vec<String>,

    /// Sing the track right away if the host picks one
    #[arg(long)]
    pub sing: bool,

    #[command(flatten)]
    pub take: TakeOptions,
}

#[derive(Subcommand, Debug)]
pub enum PersonalityCommand {
    List,
    Add { name: String, description: String },
}

#[derive(ValueEnum, Debug, Clone, Copy)]
pub enum ModeArg {
    Casual,
    Competition,
}

impl From<ModeArg> for Mode {
    fn from(m: ModeArg) -> Self {
        match m {
            ModeArg::Casual => Mode::Casual,
            ModeArg::Competition => Mode::Competition,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_sing_with_offset_steps() {
        let cli = Cli::try_parse_from([
            "karaoke",
            "--backend",
            "http://10.0.0.2:8000",
            "sing",
            "dancing queen",
            "--plus",
            "2",
            "--silent",
        ])
        .unwrap();
        assert_eq!(cli.backend.as_deref(), Some("http://10.0.0.2:8000"));
        let Commands::Sing(cmd) = cli.command else {
            panic!("expected sing");
        };
        assert_eq!(cmd.query, "dancing queen");
        assert_eq!(cmd.take.plus, 2);
        assert_eq!(cmd.take.minus, 0);
        assert!(cmd.take.silent);
        assert_eq!(cmd.take.seconds, None);
    }

    #[test]
    fn parses_battle_and_leaderboard_mode() {
        let cli = Cli::try_parse_from(["karaoke", "battle", "Alice", "Bob", "abba"]).unwrap();
        let Commands::Battle(cmd) = cli.command else {
            panic!("expected battle");
        };
        assert_eq!((cmd.player_one.as_str(), cmd.player_two.as_str()), ("Alice", "Bob"));

        let cli =
            Cli::try_parse_from(["karaoke", "leaderboard", "--mode", "competition"]).unwrap();
        let Commands::Leaderboard { mode } = cli.command else {
            panic!("expected leaderboard");
        };
        assert_eq!(Mode::from(mode), Mode::Competition);
    }

    #[test]
    fn chat_joins_words_and_accepts_take_options() {
        let cli =
            Cli::try_parse_from(["karaoke", "chat", "play", "some", "abba", "--sing", "--minus", "1"])
                .unwrap();
        let Commands::Chat(cmd) = cli.command else {
            panic!("expected chat");
        };
        assert_eq!(cmd.message.join(" "), "play some abba");
        assert!(cmd.sing);
        assert_eq!(cmd.take.minus, 1);
    }

    #[test]
    fn battle_needs_two_players_and_a_song() {
        assert!(Cli::try_parse_from(["karaoke", "battle", "Alice", "abba"]).is_err());
    }
}
