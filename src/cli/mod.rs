use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "wotd",
    about = "Word of the Day pipeline - turn the daily word into a narrated short video",
    version,
    long_about = "Fetches the day's word, writes a short script with a generative text backend, narrates it, \
                  renders or generates visuals and muxes the final video. A separate approval step gates \
                  the video behind human review before it is distributed to social platforms and archived."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Disable progress indicators
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Emit log lines as JSON
    #[arg(long, global = true)]
    pub log_json: bool,

    /// Settings file (defaults to ./wotd.yaml, then the user config directory)
    #[arg(long, global = true, value_name = "FILE", env = "WOTD_CONFIG")]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Generate today's video: fetch, script, narrate, render and mux
    Run {
        /// Replay mode: reuse the cached checkpoint and audio, skipping the fetch, script and TTS calls
        #[arg(long)]
        test: bool,
    },

    /// Review the latest video, distribute it on approval and archive it
    Approve,

    /// Show or initialize settings
    Config {
        /// Show current configuration
        #[arg(short, long)]
        show: bool,

        /// Write the default settings file to the user config directory
        #[arg(long, conflicts_with = "show")]
        init: bool,
    },

    /// List distribution platforms and whether each has credentials
    Platforms,
}
