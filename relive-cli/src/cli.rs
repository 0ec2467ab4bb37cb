use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "relive")]
#[command(author, version, about = "Clip the last minutes of a live HLS stream")]
pub struct Args {
    /// Path to config file (defaults to the user config directory)
    #[arg(short, long, global = true, env = "RELIVE_CONFIG")]
    pub config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true, conflicts_with = "quiet")]
    pub verbose: bool,

    /// Only log errors
    #[arg(short, long, global = true)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Track a media playlist, then save a clip from its rolling buffer
    Capture {
        /// Media playlist URL
        url: String,

        /// Clip the last SECS seconds (30, 120 and 180 are the usual presets)
        #[arg(long, value_name = "SECS", conflicts_with_all = ["start", "end"])]
        last: Option<f64>,

        /// Clip start on the player's clock, in seconds
        #[arg(long, requires = "end")]
        start: Option<f64>,

        /// Clip end on the player's clock, in seconds
        #[arg(long, requires = "start")]
        end: Option<f64>,

        /// The player's seekable end when the marks were taken
        #[arg(long, value_name = "SEEKABLE_END", requires = "start")]
        live_edge: Option<f64>,

        /// Seconds to keep polling before taking the clip
        #[arg(long, value_name = "SECS", default_value_t = 10.0)]
        warmup: f64,

        /// Output directory (overrides the config file)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Print the session state as JSON before exiting
        #[arg(long)]
        dump_state: bool,
    },

    /// Print the effective configuration as TOML
    Config,
}
