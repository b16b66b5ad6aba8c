//! tubegrab - An interactive CLI for downloading YouTube videos
//!
//! This library resolves video and playlist URLs through yt-dlp, then either converts the
//! audio stream to MP3 or merges the best video and audio streams into an MP4 using ffmpeg.

pub mod cli;
pub mod config;
pub mod download;
pub mod encoder;
pub mod extractors;
pub mod utils;

pub use cli::{Cli, Commands};
pub use config::Config;
pub use download::{Downloader, Mode};
pub use encoder::{Encoder, MergeJob};
pub use extractors::{MediaSource, PlaylistInfo, StreamInfo, VideoInfo};

/// Result type used throughout the library
pub type Result<T> = anyhow::Result<T>;

/// Error types specific to the downloader
#[derive(thiserror::Error, Debug)]
pub enum GrabError {
    #[error("Missing dependency: {0}")]
    MissingDependency(String),

    #[error("Extraction failed: {0}")]
    Extraction(String),

    #[error("No video stream found.")]
    NoVideoStream,

    #[error("No audio stream found.")]
    NoAudioStream,

    #[error("ffmpeg exited with {status}: {stderr}")]
    Encoder { status: String, stderr: String },

    #[error("Not a playlist URL (no list= parameter): {0}")]
    InvalidPlaylistUrl(String),

    #[error("Could not download captions: {0}")]
    Caption(String),
}
