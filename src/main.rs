use anyhow::Result;
use clap::Parser;
use std::sync::Arc;
use tokio::io::BufReader;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use tubegrab::cli::{Cli, Commands};
use tubegrab::config::Config;
use tubegrab::download::session::confirm_missing_tools;
use tubegrab::download::{Downloader, SessionConfig};
use tubegrab::encoder::Ffmpeg;
use tubegrab::extractors::youtube::YtDlpSource;
use tubegrab::{extractors, utils, GrabError};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize tracing
    let default_filter = if cli.verbose { "tubegrab=debug" } else { "tubegrab=warn" };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let config = match &cli.config_file {
        Some(path) => Config::load_from(path).await?,
        None => Config::load().await?,
    };

    if let Some(Commands::Config { show }) = &cli.command {
        if *show {
            config.display();
        } else {
            let path = match &cli.config_file {
                Some(path) => path.clone(),
                None => Config::config_path()?,
            };
            println!("Configuration file: {}", path.display());
            println!("Edit it to change the download folder, default mode or tool paths.");
        }
        return Ok(());
    }

    let mut stdin = BufReader::new(tokio::io::stdin());

    if !cli.skip_checks {
        let missing = utils::check_dependencies(&config).await;
        if !missing.is_empty() {
            if matches!(cli.command, Some(Commands::Get { .. })) {
                let names: Vec<_> = missing.iter().map(|tool| tool.name.as_str()).collect();
                return Err(GrabError::MissingDependency(names.join(", ")).into());
            }
            if confirm_missing_tools(&missing, &mut stdin).await? {
                return Ok(());
            }
        }
    }

    let session = SessionConfig {
        download_path: match &cli.output {
            Some(path) => path.clone(),
            None => config.download_path()?,
        },
        mode: cli.mode.unwrap_or(config.download.default_mode),
        caption_language: cli
            .lang
            .clone()
            .unwrap_or_else(|| config.download.caption_language.clone()),
        playlist_delay: config.playlist_delay(),
        temp_dir_name: config.download.temp_dir_name.clone(),
        quiet: cli.quiet,
    };

    let source = Arc::new(YtDlpSource::new(config.extractor.yt_dlp_path.clone(), cli.quiet));
    let encoder = Arc::new(Ffmpeg::new(&config.encoder, cli.quiet));
    let mut downloader = Downloader::new(session, source, encoder)?;
    tracing::info!("Saving downloads to {}", downloader.download_path().display());

    match cli.command {
        Some(Commands::Get { url }) => {
            let url = url.trim();
            if extractors::is_playlist_url(url) {
                if downloader.download_playlist(url).await == 0 {
                    anyhow::bail!("No videos downloaded from playlist: {}", url);
                }
            } else if downloader.download_video(url).await.is_none() {
                anyhow::bail!("Download failed: {}", url);
            }
        }
        _ => downloader.run(stdin).await?,
    }

    Ok(())
}
