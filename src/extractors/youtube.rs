use anyhow::Context;
use async_trait::async_trait;
use futures_util::StreamExt;
use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use reqwest::Client;
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap};
use std::io::Write;
use std::path::Path;
use std::process::Stdio;
use tokio::process::Command;

use super::{CaptionTrack, MediaSource, PlaylistInfo, StreamInfo, StreamKind, VideoInfo};
use crate::{GrabError, Result};

/// Caption formats in order of preference
const CAPTION_FORMATS: &[&str] = &["srt", "vtt"];

/// Upper bound on the buffer reserved up front from a server-reported length
const MAX_PREALLOCATION: u64 = 64 << 20;

/// Video metadata as dumped by `yt-dlp --dump-single-json`
#[derive(Debug, Deserialize)]
struct YtDlpVideo {
    title: String,
    duration: Option<f64>,
    #[serde(default)]
    subtitles: HashMap<String, Vec<YtDlpSubtitle>>,
    #[serde(default)]
    automatic_captions: HashMap<String, Vec<YtDlpSubtitle>>,
    #[serde(default)]
    formats: Vec<YtDlpFormat>,
}

#[derive(Debug, Deserialize)]
struct YtDlpSubtitle {
    ext: String,
    url: String,
}

#[derive(Debug, Deserialize)]
struct YtDlpFormat {
    url: Option<String>,
    ext: Option<String>,
    protocol: Option<String>,
    vcodec: Option<String>,
    acodec: Option<String>,
    height: Option<u32>,
    tbr: Option<f64>,
    abr: Option<f64>,
    filesize: Option<u64>,
    filesize_approx: Option<u64>,
    #[serde(default)]
    http_headers: HashMap<String, String>,
}

/// Playlist metadata as dumped by `yt-dlp --flat-playlist --dump-single-json`
#[derive(Debug, Deserialize)]
struct YtDlpPlaylist {
    title: Option<String>,
    #[serde(default)]
    entries: Vec<YtDlpEntry>,
}

#[derive(Debug, Deserialize)]
struct YtDlpEntry {
    id: Option<String>,
    url: Option<String>,
}

impl YtDlpFormat {
    fn codec_present(codec: &Option<String>) -> bool {
        matches!(codec.as_deref(), Some(c) if c != "none")
    }

    fn into_stream(self) -> Option<StreamInfo> {
        // Manifests (m3u8, dash) can't be fetched with a plain GET
        if !matches!(self.protocol.as_deref(), Some("http") | Some("https")) {
            return None;
        }

        let has_video = Self::codec_present(&self.vcodec);
        let has_audio = Self::codec_present(&self.acodec);
        let kind = match (has_video, has_audio) {
            (true, false) => StreamKind::VideoOnly,
            (false, true) => StreamKind::AudioOnly,
            (true, true) => StreamKind::Muxed,
            (false, false) => return None,
        };

        Some(StreamInfo {
            kind,
            url: self.url?,
            ext: self.ext.unwrap_or_else(|| "mp4".to_string()),
            height: self.height,
            bitrate: self.tbr.or(self.abr),
            filesize: self.filesize.or(self.filesize_approx),
            http_headers: self.http_headers,
        })
    }
}

fn buffer_capacity(reported_len: Option<u64>) -> usize {
    reported_len.unwrap_or(0).min(MAX_PREALLOCATION) as usize
}

fn pick_caption(language: &str, tracks: &[YtDlpSubtitle]) -> Option<CaptionTrack> {
    let chosen = CAPTION_FORMATS
        .iter()
        .find_map(|ext| tracks.iter().find(|track| track.ext == *ext))
        .or_else(|| tracks.first())?;

    Some(CaptionTrack {
        language: language.to_string(),
        url: chosen.url.clone(),
        ext: chosen.ext.clone(),
    })
}

impl From<YtDlpVideo> for VideoInfo {
    fn from(raw: YtDlpVideo) -> Self {
        let mut captions = BTreeMap::new();
        for (language, tracks) in &raw.automatic_captions {
            let key = format!("a.{}", language);
            if let Some(track) = pick_caption(&key, tracks) {
                captions.insert(key, track);
            }
        }
        for (language, tracks) in &raw.subtitles {
            if let Some(track) = pick_caption(language, tracks) {
                captions.insert(language.clone(), track);
            }
        }

        VideoInfo {
            title: raw.title,
            duration: raw.duration.map(|d| d.max(0.0).round() as u64).unwrap_or(0),
            captions,
            streams: raw.formats.into_iter().filter_map(YtDlpFormat::into_stream).collect(),
        }
    }
}

impl From<YtDlpPlaylist> for PlaylistInfo {
    fn from(raw: YtDlpPlaylist) -> Self {
        let video_urls = raw
            .entries
            .into_iter()
            .filter_map(|entry| match (entry.url, entry.id) {
                (Some(url), _) if url.starts_with("http") => Some(url),
                (_, Some(id)) => Some(format!("https://www.youtube.com/watch?v={}", id)),
                _ => None,
            })
            .collect();

        PlaylistInfo {
            title: raw.title.unwrap_or_else(|| "Untitled playlist".to_string()),
            video_urls,
        }
    }
}

/// Media source backed by the yt-dlp binary for metadata and plain HTTP for the bytes
pub struct YtDlpSource {
    yt_dlp_path: String,
    client: Client,
    quiet: bool,
}

impl YtDlpSource {
    pub fn new(yt_dlp_path: impl Into<String>, quiet: bool) -> Self {
        Self {
            yt_dlp_path: yt_dlp_path.into(),
            client: Client::new(),
            quiet,
        }
    }

    /// Run yt-dlp and return its stdout
    async fn run_yt_dlp(&self, args: &[&str]) -> Result<Vec<u8>> {
        tracing::debug!("Running {} {}", self.yt_dlp_path, args.join(" "));

        let output = Command::new(&self.yt_dlp_path)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .with_context(|| format!("Failed to run {}", self.yt_dlp_path))?;

        if !output.status.success() {
            let error = String::from_utf8_lossy(&output.stderr);
            return Err(GrabError::Extraction(error.trim().to_string()).into());
        }

        Ok(output.stdout)
    }

    fn progress_bar(&self, total: Option<u64>, message: &str) -> ProgressBar {
        let progress = ProgressBar::new(total.unwrap_or(0));
        if self.quiet {
            progress.set_draw_target(ProgressDrawTarget::hidden());
        }
        progress.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {bytes}/{total_bytes} {msg}")
                .unwrap()
        );
        progress.set_message(message.to_string());
        progress
    }

    async fn get(&self, url: &str, headers: &HashMap<String, String>) -> Result<reqwest::Response> {
        let mut request = self.client.get(url);
        for (name, value) in headers {
            request = request.header(name.as_str(), value.as_str());
        }

        let response = request.send().await?;
        if !response.status().is_success() {
            anyhow::bail!("Failed to download media: HTTP {}", response.status());
        }
        Ok(response)
    }
}

#[async_trait]
impl MediaSource for YtDlpSource {
    async fn video_info(&self, url: &str) -> Result<VideoInfo> {
        let stdout = self
            .run_yt_dlp(&["--dump-single-json", "--no-playlist", "--no-warnings", url])
            .await?;

        let raw: YtDlpVideo = serde_json::from_slice(&stdout)
            .map_err(|e| GrabError::Extraction(format!("yt-dlp returned invalid JSON: {}", e)))?;

        Ok(raw.into())
    }

    async fn playlist_info(&self, url: &str) -> Result<PlaylistInfo> {
        let stdout = self
            .run_yt_dlp(&["--flat-playlist", "--dump-single-json", "--no-warnings", url])
            .await?;

        let raw: YtDlpPlaylist = serde_json::from_slice(&stdout)
            .map_err(|e| GrabError::Extraction(format!("yt-dlp returned invalid JSON: {}", e)))?;

        Ok(raw.into())
    }

    async fn download_stream(&self, stream: &StreamInfo, dest: &Path) -> Result<()> {
        tracing::info!("Downloading stream to: {}", dest.display());

        let response = self.get(&stream.url, &stream.http_headers).await?;
        let progress = self.progress_bar(response.content_length().or(stream.filesize), "Downloading...");

        let mut file = fs_err::File::create(dest)?;
        let mut downloaded = 0u64;
        let mut body = response.bytes_stream();

        while let Some(chunk) = body.next().await {
            let chunk = chunk?;
            file.write_all(&chunk)?;
            downloaded += chunk.len() as u64;
            progress.set_position(downloaded);
        }
        file.flush()?;

        progress.finish_with_message("Download complete");
        Ok(())
    }

    async fn fetch_stream(&self, stream: &StreamInfo) -> Result<Vec<u8>> {
        let response = self.get(&stream.url, &stream.http_headers).await?;
        let total = response.content_length().or(stream.filesize);
        let progress = self.progress_bar(total, "Buffering audio...");

        let mut buffer = Vec::with_capacity(buffer_capacity(total));
        let mut body = response.bytes_stream();

        while let Some(chunk) = body.next().await {
            let chunk = chunk?;
            buffer.extend_from_slice(&chunk);
            progress.set_position(buffer.len() as u64);
        }

        progress.finish_with_message("Buffered");
        Ok(buffer)
    }

    async fn download_caption(&self, track: &CaptionTrack, dest: &Path) -> Result<()> {
        let response = self
            .get(&track.url, &HashMap::new())
            .await
            .map_err(|e| GrabError::Caption(e.to_string()))?;
        let content = response.bytes().await?;
        fs_err::write(dest, content)?;
        Ok(())
    }
}
