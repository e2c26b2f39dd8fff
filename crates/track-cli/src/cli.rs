use std::path::PathBuf;

use audio_track::Dialect;
use clap::{Parser, Subcommand, ValueEnum};

#[derive(Parser, Debug)]
#[command(name = "track-cli", version)]
pub struct Args {
    #[command(subcommand)]
    pub cmd: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Load one track on the headless host, play it and report lifecycle events
    Play(PlayArgs),
}

#[derive(clap::Args, Debug)]
pub struct PlayArgs {
    /// Path, file:// or http(s) URL; a stream label in stream mode
    pub src: String,

    /// Source mode: buffer, element or stream (overrides the config file)
    #[arg(long)]
    pub mode: Option<String>,

    /// Let the track start itself once loaded instead of calling play
    #[arg(long)]
    pub autoplay: bool,

    /// Linear gain, >= 0
    #[arg(long)]
    pub volume: Option<f32>,

    /// Pan position in [-1, 1]
    #[arg(long, allow_negative_numbers = true)]
    pub pan: Option<f32>,

    /// Host dialect the headless context exposes
    #[arg(long, value_enum, default_value_t = DialectArg::Unprefixed)]
    pub dialect: DialectArg,

    /// Seconds of simulated playback before stopping (Ctrl-C stops early)
    #[arg(long, default_value_t = 3.0)]
    pub seconds: f64,

    /// TOML settings file
    #[arg(long)]
    pub config: Option<PathBuf>,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
pub enum DialectArg {
    Unprefixed,
    Prefixed,
}

impl From<DialectArg> for Dialect {
    fn from(arg: DialectArg) -> Self {
        match arg {
            DialectArg::Unprefixed => Dialect::Unprefixed,
            DialectArg::Prefixed => Dialect::Prefixed,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_play_with_overrides() {
        let args = Args::try_parse_from([
            "track-cli", "play", "song.wav", "--mode", "element", "--pan", "-0.5", "--dialect",
            "prefixed", "--seconds", "1.5",
        ])
        .unwrap();
        let Command::Play(play) = args.cmd;
        assert_eq!(play.src, "song.wav");
        assert_eq!(play.mode.as_deref(), Some("element"));
        assert_eq!(play.pan, Some(-0.5));
        assert!(matches!(play.dialect, DialectArg::Prefixed));
        assert_eq!(play.seconds, 1.5);
        assert!(!play.autoplay);
    }

    #[test]
    fn play_requires_src() {
        assert!(Args::try_parse_from(["track-cli", "play"]).is_err());
    }
}
