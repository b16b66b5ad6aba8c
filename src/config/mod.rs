use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::download::Mode;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Download settings
    pub download: DownloadConfig,

    /// ffmpeg settings
    pub encoder: EncoderConfig,

    /// yt-dlp settings
    pub extractor: ExtractorConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DownloadConfig {
    /// Output directory (platform download directory if not set)
    pub path: Option<PathBuf>,

    /// Mode the session starts in
    pub default_mode: Mode,

    /// Caption language fetched alongside each video
    pub caption_language: String,

    /// Pause between playlist items
    pub playlist_delay_secs: u64,

    /// Name of the scratch directory created under the output directory
    pub temp_dir_name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EncoderConfig {
    /// ffmpeg binary
    pub ffmpeg_path: String,

    /// MP3 bitrate used in sound mode
    pub audio_bitrate: String,

    /// Overrides the platform default video codec
    pub video_codec: Option<String>,

    /// Pixel format forced on merged videos
    pub pixel_format: String,

    /// Audio codec used for merged videos
    pub audio_codec: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractorConfig {
    /// yt-dlp binary
    pub yt_dlp_path: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            download: DownloadConfig {
                path: None,
                default_mode: Mode::Sound,
                caption_language: "ko".to_string(),
                playlist_delay_secs: 1,
                temp_dir_name: ".temp".to_string(),
            },
            encoder: EncoderConfig {
                ffmpeg_path: "ffmpeg".to_string(),
                audio_bitrate: "192k".to_string(),
                video_codec: None,
                pixel_format: "yuv420p".to_string(),
                audio_codec: "aac".to_string(),
            },
            extractor: ExtractorConfig {
                yt_dlp_path: "yt-dlp".to_string(),
            },
        }
    }
}

impl Config {
    /// Load configuration from the default location or create it
    pub async fn load() -> Result<Self> {
        let config_path = Self::config_path()?;
        Self::load_from(&config_path).await
    }

    /// Load configuration from `config_path`, writing defaults there if the file is missing
    pub async fn load_from(config_path: &Path) -> Result<Self> {
        if config_path.exists() {
            let content = fs_err::read_to_string(config_path)
                .context("Failed to read config file")?;

            let config: Config = serde_yaml::from_str(&content)
                .context("Failed to parse config file")?;

            config.validate()?;
            Ok(config)
        } else {
            let config = Self::default();
            config.save_to(config_path).await?;
            Ok(config)
        }
    }

    /// Save configuration to file
    pub async fn save_to(&self, config_path: &Path) -> Result<()> {
        if let Some(parent) = config_path.parent() {
            if !parent.as_os_str().is_empty() {
                fs_err::create_dir_all(parent)?;
            }
        }

        let content = serde_yaml::to_string(self)
            .context("Failed to serialize config")?;

        fs_err::write(config_path, content)
            .context("Failed to write config file")?;

        Ok(())
    }

    /// Get configuration file path
    pub fn config_path() -> Result<PathBuf> {
        // First try current directory for easy testing
        let local_config = PathBuf::from("config.yaml");
        if local_config.exists() {
            return Ok(local_config);
        }

        let config_dir = dirs::config_dir()
            .context("Could not determine config directory")?;

        Ok(config_dir.join("tubegrab").join("config.yaml"))
    }

    /// Validate configuration
    fn validate(&self) -> Result<()> {
        if self.encoder.ffmpeg_path.trim().is_empty() {
            anyhow::bail!("encoder.ffmpeg_path must not be empty");
        }
        if self.extractor.yt_dlp_path.trim().is_empty() {
            anyhow::bail!("extractor.yt_dlp_path must not be empty");
        }
        if self.encoder.audio_bitrate.trim().is_empty() {
            anyhow::bail!("encoder.audio_bitrate must not be empty");
        }
        if self.download.temp_dir_name.trim().is_empty() {
            anyhow::bail!("download.temp_dir_name must not be empty");
        }

        Ok(())
    }

    /// Resolve the download directory, falling back to the user's download folder
    pub fn download_path(&self) -> Result<PathBuf> {
        if let Some(path) = &self.download.path {
            return Ok(path.clone());
        }

        dirs::download_dir()
            .or_else(|| dirs::home_dir().map(|home| home.join("Downloads")))
            .context("Could not determine download directory")
    }

    pub fn playlist_delay(&self) -> Duration {
        Duration::from_secs(self.download.playlist_delay_secs)
    }

    /// Display current configuration
    pub fn display(&self) {
        println!("Current Configuration:");
        match self.download_path() {
            Ok(path) => println!("  Download Path: {}", path.display()),
            Err(_) => println!("  Download Path: (unknown)"),
        }
        println!("  Default Mode: {}", self.download.default_mode);
        println!("  Caption Language: {}", self.download.caption_language);
        println!("  Playlist Delay: {}s", self.download.playlist_delay_secs);
        println!("  ffmpeg: {}", self.encoder.ffmpeg_path);
        println!("  Audio Bitrate: {}", self.encoder.audio_bitrate);
        if let Some(codec) = &self.encoder.video_codec {
            println!("  Video Codec: {}", codec);
        }
        println!("  yt-dlp: {}", self.extractor.yt_dlp_path);
    }
}
