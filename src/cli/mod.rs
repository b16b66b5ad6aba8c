use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::download::Mode;

#[derive(Parser)]
#[command(
    name = "tubegrab",
    about = "tubegrab - Download YouTube videos as MP3 audio or merged MP4 video",
    version,
    long_about = "An interactive downloader for YouTube videos and playlists. Paste a URL at the prompt to save its audio as MP3 (sound mode, the default) or the best video and audio merged into an MP4 (video mode). Uses yt-dlp to resolve streams and ffmpeg to encode."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Directory downloads are written to (defaults to your Downloads folder)
    #[arg(short, long, global = true, value_name = "DIR")]
    pub output: Option<PathBuf>,

    /// Mode to start in
    #[arg(short, long, global = true, value_enum)]
    pub mode: Option<Mode>,

    /// Caption language code to download alongside each video
    #[arg(short, long, global = true, value_name = "LANG")]
    pub lang: Option<String>,

    /// Path to the configuration file
    #[arg(long = "config", global = true, value_name = "FILE")]
    pub config_file: Option<PathBuf>,

    /// Skip the startup check for ffmpeg and yt-dlp
    #[arg(long, global = true)]
    pub skip_checks: bool,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Disable progress indicators
    #[arg(short, long, global = true)]
    pub quiet: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Read URLs and commands from an interactive prompt (the default)
    Interactive,

    /// Download a single video or playlist and exit
    Get {
        /// Video or playlist URL
        #[arg(value_name = "URL")]
        url: String,
    },

    /// Show or locate the configuration
    Config {
        /// Show current configuration
        #[arg(short, long)]
        show: bool,
    },
}
