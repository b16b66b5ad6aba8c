use async_trait::async_trait;
use std::path::{Path, PathBuf};

pub mod ffmpeg;
pub mod progress;

pub use ffmpeg::Ffmpeg;

use crate::Result;

/// Everything needed to mux one video-only and one audio-only stream into a single file
#[derive(Debug, Clone, PartialEq)]
pub struct MergeJob {
    pub video_path: PathBuf,
    pub audio_path: PathBuf,
    pub output_path: PathBuf,

    /// Expected length in seconds, used to size the progress bar
    pub duration_secs: u64,
}

/// Boundary to the external process that transcodes and muxes media
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Encoder: Send + Sync {
    /// Merge the job's streams into its output file, overwriting it
    async fn merge(&self, job: &MergeJob) -> Result<()>;

    /// Convert an in-memory audio stream into an MP3 at `output_path`
    async fn encode_mp3(&self, audio: Vec<u8>, output_path: &Path) -> Result<()>;
}

/// Hardware encoder on macOS, libx264 everywhere else
pub fn platform_video_codec() -> &'static str {
    if cfg!(target_os = "macos") {
        "h264_videotoolbox"
    } else {
        "libx264"
    }
}
