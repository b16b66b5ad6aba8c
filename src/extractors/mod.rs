use async_trait::async_trait;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::OnceLock;
use url::Url;

pub mod youtube;

use crate::Result;

/// Metadata for a single video, resolved fresh for every download attempt
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VideoInfo {
    /// Title as reported by the site
    pub title: String,

    /// Duration in seconds
    pub duration: u64,

    /// Caption tracks keyed by language code (`a.<code>` for auto-generated ones)
    pub captions: BTreeMap<String, CaptionTrack>,

    /// Every directly downloadable stream
    pub streams: Vec<StreamInfo>,
}

/// What a stream carries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StreamKind {
    VideoOnly,
    AudioOnly,
    Muxed,
}

/// A single downloadable stream
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamInfo {
    pub kind: StreamKind,

    /// Direct media URL
    pub url: String,

    /// Container extension (mp4, m4a, webm, ...)
    pub ext: String,

    /// Frame height for video streams
    pub height: Option<u32>,

    /// Total bitrate in kbit/s
    pub bitrate: Option<f64>,

    /// Size in bytes if known up front
    pub filesize: Option<u64>,

    /// Headers the site expects on the media request
    #[serde(default)]
    pub http_headers: HashMap<String, String>,
}

impl StreamInfo {
    /// Human readable resolution, e.g. `1080p`
    pub fn resolution(&self) -> String {
        match self.height {
            Some(height) => format!("{}p", height),
            None => "unknown resolution".to_string(),
        }
    }
}

/// A caption track in one language
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaptionTrack {
    pub language: String,
    pub url: String,
    pub ext: String,
}

/// An ordered list of the videos in a playlist
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlaylistInfo {
    pub title: String,
    pub video_urls: Vec<String>,
}

impl VideoInfo {
    /// Highest resolution video-only stream, ties broken by bitrate
    pub fn best_video_stream(&self) -> Option<&StreamInfo> {
        self.streams
            .iter()
            .filter(|stream| stream.kind == StreamKind::VideoOnly)
            .max_by(|a, b| {
                a.height
                    .unwrap_or(0)
                    .cmp(&b.height.unwrap_or(0))
                    .then_with(|| a.bitrate.unwrap_or(0.0).total_cmp(&b.bitrate.unwrap_or(0.0)))
            })
    }

    /// Audio-only stream, preferring an MP4 container and then the highest bitrate
    pub fn audio_stream(&self) -> Option<&StreamInfo> {
        self.streams
            .iter()
            .filter(|stream| stream.kind == StreamKind::AudioOnly)
            .max_by(|a, b| {
                let a_mp4 = matches!(a.ext.as_str(), "m4a" | "mp4");
                let b_mp4 = matches!(b.ext.as_str(), "m4a" | "mp4");
                a_mp4
                    .cmp(&b_mp4)
                    .then_with(|| a.bitrate.unwrap_or(0.0).total_cmp(&b.bitrate.unwrap_or(0.0)))
            })
    }

    pub fn caption(&self, language: &str) -> Option<&CaptionTrack> {
        self.captions.get(language)
    }
}

/// Boundary to the service that turns URLs into downloadable streams
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MediaSource: Send + Sync {
    /// Resolve a single video URL
    async fn video_info(&self, url: &str) -> Result<VideoInfo>;

    /// Resolve a playlist URL into its video URLs
    async fn playlist_info(&self, url: &str) -> Result<PlaylistInfo>;

    /// Download a stream to `dest`
    async fn download_stream(&self, stream: &StreamInfo, dest: &Path) -> Result<()>;

    /// Read a whole stream into memory
    async fn fetch_stream(&self, stream: &StreamInfo) -> Result<Vec<u8>>;

    /// Download a caption track to `dest`
    async fn download_caption(&self, track: &CaptionTrack, dest: &Path) -> Result<()>;
}

fn playlist_id_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"list=([a-zA-Z0-9_-]+)").expect("valid playlist regex"))
}

/// Pull the playlist id out of any URL carrying a `list=` parameter
pub fn extract_playlist_id(url: &str) -> Option<&str> {
    playlist_id_regex()
        .captures(url)
        .and_then(|caps| caps.get(1))
        .map(|id| id.as_str())
}

/// Canonical playlist page for an id
pub fn playlist_url(playlist_id: &str) -> String {
    format!("https://www.youtube.com/playlist?list={}", playlist_id)
}

/// A URL points at a playlist page when it names a playlist but no single video
pub fn is_playlist_url(url: &str) -> bool {
    if extract_playlist_id(url).is_none() {
        return false;
    }

    match Url::parse(url) {
        Ok(parsed) => !names_single_video(&parsed),
        Err(_) => !url.contains("v="),
    }
}

/// `watch?v=`, `youtu.be/<id>`, `/shorts/<id>` and `/live/<id>` all name one video
fn names_single_video(url: &Url) -> bool {
    if url.query_pairs().any(|(key, _)| key == "v") {
        return true;
    }

    let host = url.host_str().unwrap_or_default();
    let mut segments = url
        .path_segments()
        .into_iter()
        .flatten()
        .filter(|segment| !segment.is_empty());

    if host == "youtu.be" || host.ends_with(".youtu.be") {
        return segments.next().is_some();
    }

    match segments.next() {
        Some("watch") => true,
        Some("shorts" | "live" | "embed") => segments.next().is_some(),
        _ => false,
    }
}
