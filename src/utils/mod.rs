use std::path::Path;
use std::process::Stdio;
use tokio::process::Command;

use crate::config::Config;

/// Characters that are stripped from titles before they are used as file names
const ILLEGAL_FILENAME_CHARS: &[char] = &['\\', '/', '*', '?', ':', '"', '<', '>', '|', '#'];

/// Remove characters that are illegal in file names, keeping everything else in order
pub fn sanitize_filename(title: &str) -> String {
    title
        .chars()
        .filter(|c| !ILLEGAL_FILENAME_CHARS.contains(c))
        .collect()
}

/// Format file size in human-readable format
pub fn format_file_size(bytes: u64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB"];
    const THRESHOLD: f64 = 1024.0;

    if bytes == 0 {
        return "0 B".to_string();
    }

    let bytes_f = bytes as f64;
    let unit_index = (bytes_f.log10() / THRESHOLD.log10()).floor() as usize;
    let unit_index = unit_index.min(UNITS.len() - 1);

    let size = bytes_f / THRESHOLD.powi(unit_index as i32);

    if unit_index == 0 {
        format!("{} {}", bytes, UNITS[unit_index])
    } else {
        format!("{:.1} {}", size, UNITS[unit_index])
    }
}

/// Format duration in human-readable format
pub fn format_duration(seconds: u64) -> String {
    let hours = seconds / 3600;
    let minutes = (seconds % 3600) / 60;
    let secs = seconds % 60;

    if hours > 0 {
        format!("{}h {}m {}s", hours, minutes, secs)
    } else if minutes > 0 {
        format!("{}m {}s", minutes, secs)
    } else {
        format!("{}s", secs)
    }
}

/// An external tool that could not be run from PATH
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MissingTool {
    pub name: String,
    pub guidance: Vec<&'static str>,
}

/// Check that the external tools the downloader shells out to are available
pub async fn check_dependencies(config: &Config) -> Vec<MissingTool> {
    let mut missing = Vec::new();

    // ffmpeg only understands the single-dash form
    if !check_command_available(&config.encoder.ffmpeg_path, "-version").await {
        missing.push(MissingTool {
            name: config.encoder.ffmpeg_path.clone(),
            guidance: vec![
                "Please install ffmpeg to use this program.",
                "  - On macOS (with Homebrew): brew install ffmpeg",
                "  - On Windows (with Chocolatey): choco install ffmpeg",
                "  - Or download from https://ffmpeg.org/download.html and add it to your system's PATH.",
            ],
        });
    }

    if !check_command_available(&config.extractor.yt_dlp_path, "--version").await {
        missing.push(MissingTool {
            name: config.extractor.yt_dlp_path.clone(),
            guidance: vec![
                "Please install yt-dlp to resolve video URLs.",
                "  - On macOS (with Homebrew): brew install yt-dlp",
                "  - With pip: pip install -U yt-dlp",
                "  - Or download from https://github.com/yt-dlp/yt-dlp/releases and add it to your system's PATH.",
            ],
        });
    }

    missing
}

/// Check if a command is available in PATH
pub async fn check_command_available(command: &str, version_arg: &str) -> bool {
    Command::new(command)
        .arg(version_arg)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .await
        .map(|status| status.success())
        .unwrap_or(false)
}

/// Create a directory (and its parents) if it does not exist yet
pub fn ensure_dir(path: &Path) -> crate::Result<()> {
    if !path.is_dir() {
        tracing::debug!("Creating directory: {}", path.display());
        fs_err::create_dir_all(path)?;
    }
    Ok(())
}
