use anyhow::Context;
use console::style;
use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

pub mod session;

pub use session::InputCommand;

use crate::encoder::{Encoder, MergeJob};
use crate::extractors::{self, MediaSource, VideoInfo};
use crate::utils::{ensure_dir, format_duration, format_file_size, sanitize_filename};
use crate::{GrabError, Result};

/// What a download produces
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// MP4 with the best video and audio merged
    Video,
    /// MP3 audio only
    #[default]
    Sound,
}

impl std::fmt::Display for Mode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Mode::Video => write!(f, "Video"),
            Mode::Sound => write!(f, "Sound"),
        }
    }
}

/// Per-session settings owned by the downloader
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub download_path: PathBuf,
    pub mode: Mode,
    pub caption_language: String,
    pub playlist_delay: Duration,
    pub temp_dir_name: String,
    pub quiet: bool,
}

/// Drives one video (or playlist) at a time from URL to file on disk
pub struct Downloader {
    config: SessionConfig,
    source: Arc<dyn MediaSource>,
    encoder: Arc<dyn Encoder>,
}

impl Downloader {
    /// Create a downloader, creating the download directory if needed
    pub fn new(
        config: SessionConfig,
        source: Arc<dyn MediaSource>,
        encoder: Arc<dyn Encoder>,
    ) -> Result<Self> {
        let mut config = config;
        config.download_path = std::path::absolute(&config.download_path).with_context(|| {
            format!("Invalid download directory {}", config.download_path.display())
        })?;
        ensure_dir(&config.download_path).with_context(|| {
            format!("Failed to create download directory {}", config.download_path.display())
        })?;

        Ok(Self {
            config,
            source,
            encoder,
        })
    }

    pub fn mode(&self) -> Mode {
        self.config.mode
    }

    pub fn set_mode(&mut self, mode: Mode) {
        self.config.mode = mode;
    }

    pub fn download_path(&self) -> &Path {
        &self.config.download_path
    }

    /// Download one video in the current mode, reporting any failure instead of returning it.
    ///
    /// Returns the output path on success.
    pub async fn download_video(&self, url: &str) -> Option<PathBuf> {
        let language = self.config.caption_language.clone();
        self.download_video_with_captions(url, &language).await
    }

    /// Like [`Downloader::download_video`] with an explicit caption language
    pub async fn download_video_with_captions(&self, url: &str, language: &str) -> Option<PathBuf> {
        match self.try_download_video(url, language).await {
            Ok(path) => path,
            Err(e) => {
                tracing::warn!("Download of {} failed: {:#}", url, e);
                println!(
                    "{} An error occurred during video processing: {:#}",
                    style("✗").red(),
                    e
                );
                None
            }
        }
    }

    async fn try_download_video(&self, url: &str, language: &str) -> Result<Option<PathBuf>> {
        tracing::info!("Resolving video: {}", url);
        let info = self.source.video_info(url).await?;
        let title = sanitize_filename(&info.title);

        println!("\nProcessing: {}", style(&info.title).bold());
        println!("Sanitized Title: {}", title);
        println!("Duration: {}", format_duration(info.duration));

        self.download_captions(&info, &title, language).await;

        match self.config.mode {
            Mode::Video => self.download_merged(&info, &title).await,
            Mode::Sound => self.download_mp3(&info, &title).await,
        }
    }

    /// Caption failures are reported here and never abort the media download
    async fn download_captions(&self, info: &VideoInfo, title: &str, language: &str) {
        let Some(track) = info.caption(language) else {
            println!("No captions available for language code: {}", language);
            return;
        };

        let dest = self
            .config
            .download_path
            .join(format!("{} ({}).{}", title, language, track.ext));

        match self.source.download_caption(track, &dest).await {
            Ok(()) => {
                tracing::info!("Captions saved to {}", dest.display());
                println!("Captions downloaded.");
            }
            Err(e) => {
                tracing::warn!("Caption download failed: {:#}", e);
                println!("Could not download captions: {:#}", e);
            }
        }
    }

    async fn download_merged(&self, info: &VideoInfo, title: &str) -> Result<Option<PathBuf>> {
        let Some(video_stream) = info.best_video_stream() else {
            println!("{}", GrabError::NoVideoStream);
            return Ok(None);
        };
        let Some(audio_stream) = info.audio_stream() else {
            println!("{}", GrabError::NoAudioStream);
            return Ok(None);
        };

        // One scratch directory per operation so equal titles never share temp files.
        // It is removed with everything in it when `scratch` drops.
        let temp_root = self.config.download_path.join(&self.config.temp_dir_name);
        ensure_dir(&temp_root)?;
        let scratch = tempfile::Builder::new()
            .prefix("merge-")
            .tempdir_in(&temp_root)
            .context("Failed to create temporary directory")?;

        let video_path = scratch.path().join(format!("{}_video.mp4", title));
        let audio_path = scratch.path().join(format!("{}_audio.mp4", title));

        println!(
            "Downloading video stream ({}{})...",
            video_stream.resolution(),
            video_stream
                .filesize
                .map(|size| format!(", {}", format_file_size(size)))
                .unwrap_or_default()
        );
        self.source.download_stream(video_stream, &video_path).await?;
        println!("Video stream download complete.");

        println!("Downloading audio stream...");
        self.source.download_stream(audio_stream, &audio_path).await?;
        println!("Audio stream download complete.");

        let output_path = self.config.download_path.join(format!("{}.mp4", title));
        let job = MergeJob {
            video_path,
            audio_path,
            output_path: output_path.clone(),
            duration_secs: info.duration,
        };

        println!("Merging video and audio streams with ffmpeg...");
        let merged = self.encoder.merge(&job).await;

        match scratch.close() {
            Ok(()) => println!("Temporary files cleaned up."),
            Err(e) => tracing::warn!("Failed to remove temporary files: {}", e),
        }

        match merged {
            Ok(()) => {
                println!(
                    "{} Successfully merged and saved to {}",
                    style("✓").green(),
                    output_path.display()
                );
                Ok(Some(output_path))
            }
            Err(e) => {
                tracing::warn!("Merge of {} failed: {:#}", title, e);
                println!("{} Error during ffmpeg merging: {:#}", style("✗").red(), e);
                Ok(None)
            }
        }
    }

    async fn download_mp3(&self, info: &VideoInfo, title: &str) -> Result<Option<PathBuf>> {
        let Some(stream) = info.audio_stream() else {
            println!("{}", GrabError::NoAudioStream);
            return Ok(None);
        };

        println!("Streaming audio to ffmpeg for MP3 conversion...");
        let audio = self.source.fetch_stream(stream).await?;
        tracing::debug!("Buffered {} of audio", format_file_size(audio.len() as u64));

        let output_path = self.config.download_path.join(format!("{}.mp3", title));
        if let Err(e) = self.encoder.encode_mp3(audio, &output_path).await {
            tracing::warn!("MP3 conversion of {} failed: {:#}", title, e);
            println!("{} Error during ffmpeg conversion: {:#}", style("✗").red(), e);
            return Ok(None);
        }

        println!("{} Successfully created {}.mp3", style("✓").green(), title);
        Ok(Some(output_path))
    }

    /// Download every video of a playlist in order, pausing between items.
    ///
    /// Returns how many items produced an output file.
    pub async fn download_playlist(&self, url: &str) -> usize {
        match self.try_download_playlist(url).await {
            Ok(completed) => completed,
            Err(e) => {
                tracing::warn!("Playlist {} failed: {:#}", url, e);
                println!("{} Error processing playlist: {:#}", style("✗").red(), e);
                0
            }
        }
    }

    async fn try_download_playlist(&self, url: &str) -> Result<usize> {
        let playlist_id = extractors::extract_playlist_id(url)
            .ok_or_else(|| GrabError::InvalidPlaylistUrl(url.to_string()))?;
        println!("playlist_id: {}", playlist_id);

        let playlist = self
            .source
            .playlist_info(&extractors::playlist_url(playlist_id))
            .await?;
        println!("\nFound playlist: {}", style(&playlist.title).bold());
        println!("Downloading {} videos...", playlist.video_urls.len());

        let progress = ProgressBar::new(playlist.video_urls.len() as u64);
        if self.config.quiet {
            progress.set_draw_target(ProgressDrawTarget::hidden());
        }
        progress.set_style(
            ProgressStyle::default_bar()
                .template("Playlist Progress [{bar:40.cyan/blue}] {pos}/{len} [{elapsed_precise}]")
                .unwrap()
        );

        let mut completed = 0;
        for (index, video_url) in playlist.video_urls.iter().enumerate() {
            if index > 0 {
                tokio::time::sleep(self.config.playlist_delay).await;
            }
            if self.download_video(video_url).await.is_some() {
                completed += 1;
            }
            progress.inc(1);
        }
        progress.finish();

        println!("\nPlaylist download finished.");
        tracing::info!("Playlist done: {}/{} items saved", completed, playlist.video_urls.len());
        Ok(completed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encoder::MockEncoder;
    use crate::extractors::{CaptionTrack, MockMediaSource, PlaylistInfo, StreamInfo, StreamKind};
    use mockall::predicate::eq;
    use std::collections::{BTreeMap, HashMap};
    use tempfile::TempDir;

    fn stream(kind: StreamKind, height: Option<u32>) -> StreamInfo {
        StreamInfo {
            kind,
            url: format!("https://media.example/{:?}", kind),
            ext: "mp4".to_string(),
            height,
            bitrate: None,
            filesize: Some(2048),
            http_headers: HashMap::new(),
        }
    }

    fn video_info(title: &str, captions: &[&str]) -> VideoInfo {
        VideoInfo {
            title: title.to_string(),
            duration: 42,
            captions: captions
                .iter()
                .map(|lang| {
                    (
                        lang.to_string(),
                        CaptionTrack {
                            language: lang.to_string(),
                            url: format!("https://captions.example/{}", lang),
                            ext: "vtt".to_string(),
                        },
                    )
                })
                .collect::<BTreeMap<_, _>>(),
            streams: vec![
                stream(StreamKind::VideoOnly, Some(1080)),
                stream(StreamKind::VideoOnly, Some(720)),
                stream(StreamKind::AudioOnly, None),
            ],
        }
    }

    fn downloader(dir: &TempDir, mode: Mode, source: MockMediaSource, encoder: MockEncoder) -> Downloader {
        let config = SessionConfig {
            download_path: dir.path().join("downloads"),
            mode,
            caption_language: "ko".to_string(),
            playlist_delay: Duration::from_secs(1),
            temp_dir_name: ".temp".to_string(),
            quiet: true,
        };
        Downloader::new(config, Arc::new(source), Arc::new(encoder)).unwrap()
    }

    fn files_in(path: &Path) -> Vec<PathBuf> {
        let mut files = Vec::new();
        if let Ok(entries) = fs_err::read_dir(path) {
            for entry in entries {
                let entry = entry.unwrap();
                if entry.path().is_dir() {
                    files.extend(files_in(&entry.path()));
                } else {
                    files.push(entry.path());
                }
            }
        }
        files
    }

    fn source_writing_streams() -> MockMediaSource {
        let mut source = MockMediaSource::new();
        source
            .expect_download_stream()
            .returning(|_, dest| {
                fs_err::write(dest, b"elementary stream")?;
                Ok(())
            });
        source
    }

    #[test]
    fn test_relative_download_path_is_made_absolute() {
        let relative = PathBuf::from("target").join("tubegrab-relative-downloads");
        let config = SessionConfig {
            download_path: relative.clone(),
            mode: Mode::Sound,
            caption_language: "ko".to_string(),
            playlist_delay: Duration::from_secs(1),
            temp_dir_name: ".temp".to_string(),
            quiet: true,
        };

        let downloader =
            Downloader::new(config, Arc::new(MockMediaSource::new()), Arc::new(MockEncoder::new())).unwrap();
        let path = downloader.download_path().to_path_buf();
        let _ = fs_err::remove_dir(&path);

        assert!(path.is_absolute());
        assert!(path.ends_with(&relative));
    }

    #[tokio::test]
    async fn test_sound_mode_writes_single_mp3_and_no_temp_files() {
        let dir = tempfile::tempdir().unwrap();
        let mut source = MockMediaSource::new();
        source
            .expect_video_info()
            .with(eq("https://youtu.be/abc"))
            .returning(|_| Ok(video_info("AC/DC: Thunder?", &[])));
        source
            .expect_fetch_stream()
            .withf(|stream| stream.kind == StreamKind::AudioOnly)
            .times(1)
            .returning(|_| Ok(b"raw audio".to_vec()));
        source.expect_download_stream().never();

        let mut encoder = MockEncoder::new();
        encoder
            .expect_encode_mp3()
            .withf(|audio, _| audio == b"raw audio")
            .times(1)
            .returning(|_, path| {
                fs_err::write(path, b"mp3")?;
                Ok(())
            });
        encoder.expect_merge().never();

        let downloader = downloader(&dir, Mode::Sound, source, encoder);
        let output = downloader.download_video("https://youtu.be/abc").await.unwrap();

        let root = downloader.download_path().to_path_buf();
        assert_eq!(output, root.join("ACDC Thunder.mp3"));
        assert_eq!(files_in(&root), vec![output]);
        assert!(!root.join(".temp").exists());
    }

    #[tokio::test]
    async fn test_video_mode_merges_and_cleans_up() {
        let dir = tempfile::tempdir().unwrap();
        let mut source = source_writing_streams();
        source
            .expect_video_info()
            .returning(|_| Ok(video_info("Clip #1", &[])));

        let mut encoder = MockEncoder::new();
        encoder
            .expect_merge()
            .withf(|job| {
                job.video_path.exists()
                    && job.audio_path.exists()
                    && job.video_path.file_name().unwrap() == "Clip 1_video.mp4"
                    && job.audio_path.file_name().unwrap() == "Clip 1_audio.mp4"
                    && job.duration_secs == 42
            })
            .times(1)
            .returning(|job| {
                fs_err::write(&job.output_path, b"mp4")?;
                Ok(())
            });

        let downloader = downloader(&dir, Mode::Video, source, encoder);
        let output = downloader.download_video("https://youtu.be/abc").await.unwrap();

        let root = downloader.download_path().to_path_buf();
        assert_eq!(output, root.join("Clip 1.mp4"));
        assert_eq!(files_in(&root), vec![output]);
        assert!(files_in(&root.join(".temp")).is_empty());
    }

    #[tokio::test]
    async fn test_video_mode_cleans_up_after_failed_merge() {
        let dir = tempfile::tempdir().unwrap();
        let mut source = source_writing_streams();
        source
            .expect_video_info()
            .returning(|_| Ok(video_info("Clip", &[])));

        let mut encoder = MockEncoder::new();
        encoder.expect_merge().times(1).returning(|_| {
            Err(GrabError::Encoder {
                status: "exit status: 1".to_string(),
                stderr: "boom".to_string(),
            }
            .into())
        });

        let downloader = downloader(&dir, Mode::Video, source, encoder);
        assert!(downloader.download_video("https://youtu.be/abc").await.is_none());

        let root = downloader.download_path().to_path_buf();
        assert!(files_in(&root).is_empty());
        assert!(root.join(".temp").is_dir());
    }

    #[tokio::test]
    async fn test_video_mode_without_video_stream_downloads_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let mut source = MockMediaSource::new();
        source.expect_video_info().returning(|_| {
            let mut info = video_info("Clip", &[]);
            info.streams.retain(|s| s.kind == StreamKind::AudioOnly);
            Ok(info)
        });
        source.expect_download_stream().never();

        let mut encoder = MockEncoder::new();
        encoder.expect_merge().never();

        let downloader = downloader(&dir, Mode::Video, source, encoder);
        assert!(downloader.download_video("https://youtu.be/abc").await.is_none());
        assert!(files_in(downloader.download_path()).is_empty());
    }

    #[tokio::test]
    async fn test_sound_mode_without_audio_stream_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let mut source = MockMediaSource::new();
        source.expect_video_info().returning(|_| {
            let mut info = video_info("Clip", &[]);
            info.streams.retain(|s| s.kind == StreamKind::VideoOnly);
            Ok(info)
        });
        source.expect_fetch_stream().never();

        let mut encoder = MockEncoder::new();
        encoder.expect_encode_mp3().never();

        let downloader = downloader(&dir, Mode::Sound, source, encoder);
        assert!(downloader.download_video("https://youtu.be/abc").await.is_none());
    }

    #[tokio::test]
    async fn test_caption_downloaded_next_to_output() {
        let dir = tempfile::tempdir().unwrap();
        let mut source = MockMediaSource::new();
        source
            .expect_video_info()
            .returning(|_| Ok(video_info("Clip", &["ko", "en"])));
        source
            .expect_download_caption()
            .withf(|track, _| track.language == "ko")
            .times(1)
            .returning(|_, dest| {
                fs_err::write(dest, b"WEBVTT")?;
                Ok(())
            });
        source.expect_fetch_stream().returning(|_| Ok(vec![1, 2, 3]));

        let mut encoder = MockEncoder::new();
        encoder.expect_encode_mp3().returning(|_, path| {
            fs_err::write(path, b"mp3")?;
            Ok(())
        });

        let downloader = downloader(&dir, Mode::Sound, source, encoder);
        downloader.download_video("https://youtu.be/abc").await.unwrap();

        let root = downloader.download_path();
        assert!(root.join("Clip (ko).vtt").is_file());
        assert!(root.join("Clip.mp3").is_file());
    }

    #[tokio::test]
    async fn test_missing_caption_language_still_downloads_media() {
        let dir = tempfile::tempdir().unwrap();
        let mut source = MockMediaSource::new();
        source
            .expect_video_info()
            .returning(|_| Ok(video_info("Clip", &["en"])));
        source.expect_download_caption().never();
        source.expect_fetch_stream().returning(|_| Ok(vec![1, 2, 3]));

        let mut encoder = MockEncoder::new();
        encoder.expect_encode_mp3().times(1).returning(|_, path| {
            fs_err::write(path, b"mp3")?;
            Ok(())
        });

        let downloader = downloader(&dir, Mode::Sound, source, encoder);
        let output = downloader
            .download_video_with_captions("https://youtu.be/abc", "ko")
            .await;
        assert_eq!(output, Some(downloader.download_path().join("Clip.mp3")));
    }

    #[tokio::test]
    async fn test_caption_failure_does_not_abort_media() {
        let dir = tempfile::tempdir().unwrap();
        let mut source = MockMediaSource::new();
        source
            .expect_video_info()
            .returning(|_| Ok(video_info("Clip", &["ko"])));
        source
            .expect_download_caption()
            .returning(|_, _| Err(GrabError::Caption("HTTP 403".to_string()).into()));
        source.expect_fetch_stream().returning(|_| Ok(vec![1, 2, 3]));

        let mut encoder = MockEncoder::new();
        encoder.expect_encode_mp3().times(1).returning(|_, path| {
            fs_err::write(path, b"mp3")?;
            Ok(())
        });

        let downloader = downloader(&dir, Mode::Sound, source, encoder);
        assert!(downloader.download_video("https://youtu.be/abc").await.is_some());
    }

    #[tokio::test]
    async fn test_extraction_failure_is_contained() {
        let dir = tempfile::tempdir().unwrap();
        let mut source = MockMediaSource::new();
        source
            .expect_video_info()
            .returning(|_| Err(GrabError::Extraction("Video unavailable".to_string()).into()));

        let downloader = downloader(&dir, Mode::Sound, source, MockEncoder::new());
        assert!(downloader.download_video("https://youtu.be/gone").await.is_none());
    }

    #[tokio::test]
    async fn test_playlist_without_list_parameter_makes_no_calls() {
        let dir = tempfile::tempdir().unwrap();
        let mut source = MockMediaSource::new();
        source.expect_playlist_info().never();
        source.expect_video_info().never();

        let downloader = downloader(&dir, Mode::Sound, source, MockEncoder::new());
        let completed = downloader
            .download_playlist("https://www.youtube.com/watch?v=abc")
            .await;
        assert_eq!(completed, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_playlist_continues_past_failed_item_with_pauses() {
        let dir = tempfile::tempdir().unwrap();
        let mut source = MockMediaSource::new();
        source
            .expect_playlist_info()
            .with(eq("https://www.youtube.com/playlist?list=PLxyz"))
            .times(1)
            .returning(|_| {
                Ok(PlaylistInfo {
                    title: "Mix".to_string(),
                    video_urls: vec![
                        "https://youtu.be/one".to_string(),
                        "https://youtu.be/two".to_string(),
                        "https://youtu.be/three".to_string(),
                    ],
                })
            });
        source.expect_video_info().times(3).returning(|url| {
            if url.ends_with("two") {
                Err(GrabError::Extraction("Video unavailable".to_string()).into())
            } else {
                Ok(video_info(url.rsplit('/').next().unwrap_or("clip"), &[]))
            }
        });
        source.expect_fetch_stream().times(2).returning(|_| Ok(vec![0; 16]));

        let mut encoder = MockEncoder::new();
        encoder.expect_encode_mp3().times(2).returning(|_, path| {
            fs_err::write(path, b"mp3")?;
            Ok(())
        });

        let downloader = downloader(&dir, Mode::Sound, source, encoder);
        let started = tokio::time::Instant::now();
        let completed = downloader
            .download_playlist("https://www.youtube.com/watch?v=one&list=PLxyz&index=1")
            .await;

        assert_eq!(completed, 2);
        assert!(started.elapsed() >= Duration::from_secs(2));
        let root = downloader.download_path();
        assert!(root.join("one.mp3").is_file());
        assert!(root.join("three.mp3").is_file());
    }
}
