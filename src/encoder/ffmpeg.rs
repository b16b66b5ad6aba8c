use anyhow::Context;
use async_trait::async_trait;
use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use std::path::Path;
use std::process::Stdio;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tokio::sync::oneshot;

use super::{platform_video_codec, progress, Encoder, MergeJob};
use crate::config::EncoderConfig;
use crate::{GrabError, Result};

/// Encoder that shells out to the ffmpeg binary
pub struct Ffmpeg {
    ffmpeg_path: String,
    video_codec: String,
    pixel_format: String,
    audio_codec: String,
    audio_bitrate: String,
    quiet: bool,
}

impl Ffmpeg {
    pub fn new(config: &EncoderConfig, quiet: bool) -> Self {
        Self {
            ffmpeg_path: config.ffmpeg_path.clone(),
            video_codec: config
                .video_codec
                .clone()
                .unwrap_or_else(|| platform_video_codec().to_string()),
            pixel_format: config.pixel_format.clone(),
            audio_codec: config.audio_codec.clone(),
            audio_bitrate: config.audio_bitrate.clone(),
            quiet,
        }
    }

    /// Arguments for muxing a video-only and an audio-only stream
    pub fn merge_args(&self, job: &MergeJob, progress_log: &Path) -> Vec<String> {
        vec![
            "-y".to_string(),
            "-nostdin".to_string(),
            "-progress".to_string(),
            progress_log.to_string_lossy().into_owned(),
            "-i".to_string(),
            job.video_path.to_string_lossy().into_owned(),
            "-i".to_string(),
            job.audio_path.to_string_lossy().into_owned(),
            "-c:v".to_string(),
            self.video_codec.clone(),
            "-pix_fmt".to_string(),
            self.pixel_format.clone(),
            "-c:a".to_string(),
            self.audio_codec.clone(),
            // older builds refuse the native aac encoder without it
            "-strict".to_string(),
            "experimental".to_string(),
            job.output_path.to_string_lossy().into_owned(),
        ]
    }

    /// Arguments for converting audio read from stdin into an MP3
    pub fn mp3_args(&self, output_path: &Path) -> Vec<String> {
        vec![
            "-y".to_string(),
            "-i".to_string(),
            "pipe:0".to_string(),
            "-vn".to_string(),
            "-b:a".to_string(),
            self.audio_bitrate.clone(),
            "-f".to_string(),
            "mp3".to_string(),
            output_path.to_string_lossy().into_owned(),
        ]
    }

    fn merge_progress_bar(&self, duration_secs: u64) -> ProgressBar {
        let progress = ProgressBar::new(duration_secs);
        if self.quiet {
            progress.set_draw_target(ProgressDrawTarget::hidden());
        }
        progress.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} FFmpeg Progress [{bar:40.cyan/blue}] {pos}/{len}s [{elapsed_precise}]")
                .unwrap()
        );
        progress
    }

    fn encoder_error(status: std::process::ExitStatus, stderr: &[u8]) -> anyhow::Error {
        GrabError::Encoder {
            status: status.to_string(),
            stderr: String::from_utf8_lossy(stderr).trim().to_string(),
        }
        .into()
    }
}

#[async_trait]
impl Encoder for Ffmpeg {
    async fn merge(&self, job: &MergeJob) -> Result<()> {
        // Deleted when dropped, whichever way this function returns
        let progress_log = tempfile::Builder::new()
            .prefix("tubegrab-progress-")
            .suffix(".log")
            .tempfile()
            .context("Failed to create ffmpeg progress log")?;

        let args = self.merge_args(job, progress_log.path());
        tracing::debug!("Running {} {}", self.ffmpeg_path, args.join(" "));

        let bar = self.merge_progress_bar(job.duration_secs);
        let (exited_tx, exited_rx) = oneshot::channel();
        let tail = tokio::spawn(progress::tail_progress(
            progress_log.path().to_path_buf(),
            bar.clone(),
            exited_rx,
        ));

        let output = Command::new(&self.ffmpeg_path)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .output()
            .await;

        let _ = exited_tx.send(());
        match tail.await {
            Ok(Ok(elapsed)) => tracing::debug!("ffmpeg reported {:.1}s of output", elapsed),
            Ok(Err(e)) => tracing::warn!("Could not follow ffmpeg progress: {}", e),
            Err(e) => tracing::warn!("ffmpeg progress task failed: {}", e),
        }
        bar.finish_and_clear();

        let output = output.with_context(|| format!("Failed to run {}", self.ffmpeg_path))?;
        if !output.status.success() {
            return Err(Self::encoder_error(output.status, &output.stderr));
        }

        Ok(())
    }

    async fn encode_mp3(&self, audio: Vec<u8>, output_path: &Path) -> Result<()> {
        let args = self.mp3_args(output_path);
        tracing::debug!("Running {} {} ({} bytes on stdin)", self.ffmpeg_path, args.join(" "), audio.len());

        let mut child = Command::new(&self.ffmpeg_path)
            .args(&args)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .with_context(|| format!("Failed to run {}", self.ffmpeg_path))?;

        let mut stdin = child
            .stdin
            .take()
            .context("ffmpeg stdin was not captured")?;

        // Feed stdin while stderr is drained, otherwise a chatty ffmpeg can fill the pipe and stall
        let writer = tokio::spawn(async move {
            stdin.write_all(&audio).await?;
            stdin.shutdown().await
        });

        let output = child.wait_with_output().await?;
        let written = writer.await.context("ffmpeg stdin writer panicked")?;

        if !output.status.success() {
            return Err(Self::encoder_error(output.status, &output.stderr));
        }
        written.context("Failed to write audio to ffmpeg")?;

        Ok(())
    }
}
