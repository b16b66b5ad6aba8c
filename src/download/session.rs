//! The interactive prompt loop and its command set.

use console::style;
use std::io::Write;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};

use super::{Downloader, Mode};
use crate::extractors;
use crate::utils::MissingTool;
use crate::Result;

/// One line of user input, classified
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputCommand {
    Exit,
    SwitchMode(Mode),
    Help,
    Playlist(String),
    Video(String),
    Empty,
}

impl InputCommand {
    pub fn parse(line: &str) -> Self {
        let input = line.trim();
        if input.is_empty() {
            return InputCommand::Empty;
        }

        let (head, rest) = match input.split_once(char::is_whitespace) {
            Some((head, rest)) => (head, rest.trim()),
            None => (input, ""),
        };

        match head.to_lowercase().as_str() {
            "/exit" => InputCommand::Exit,
            "/video" => InputCommand::SwitchMode(Mode::Video),
            "/sound" => InputCommand::SwitchMode(Mode::Sound),
            "/help" => InputCommand::Help,
            "/playlist" => InputCommand::Playlist(rest.to_string()),
            _ if extractors::is_playlist_url(input) => InputCommand::Playlist(input.to_string()),
            _ => InputCommand::Video(input.to_string()),
        }
    }
}

pub fn print_instructions(mode: Mode) {
    println!("\n{}", style("Commands:").bold());
    println!("  - Enter a YouTube URL to download (playlist pages download every video).");
    println!("  - '/playlist <URL>' to download the playlist a URL belongs to.");
    println!("  - '/video' to switch to video download mode.");
    println!("  - '/sound' to switch to sound download mode (default).");
    println!("  - '/help' to show these commands again.");
    println!("  - '/exit' to quit the program.");
    println!("\nDefault mode is Sound. Current mode: {}", mode);
}

fn prompt(text: &str) {
    print!("{}", text);
    let _ = std::io::stdout().flush();
}

/// Read one line, `None` on end of input
async fn read_line<R: AsyncBufRead + Unpin>(input: &mut R) -> Result<Option<String>> {
    let mut line = String::new();
    if input.read_line(&mut line).await? == 0 {
        return Ok(None);
    }
    Ok(Some(line))
}

/// Report missing tools and ask whether to quit. Returns true when the user wants to exit.
pub async fn confirm_missing_tools<R: AsyncBufRead + Unpin>(
    missing: &[MissingTool],
    input: &mut R,
) -> Result<bool> {
    for tool in missing {
        println!(
            "\n{} {} is not installed or not in your PATH.",
            style("Error:").red().bold(),
            tool.name
        );
        for line in &tool.guidance {
            println!("{}", line);
        }

        prompt("Do you want to exit? (y/n): ");
        let answer = read_line(input).await?.unwrap_or_default();
        if answer.trim().eq_ignore_ascii_case("y") {
            return Ok(true);
        }
    }
    Ok(false)
}

impl Downloader {
    /// Run the prompt loop until `/exit` or end of input
    pub async fn run<R: AsyncBufRead + Unpin>(&mut self, mut input: R) -> Result<()> {
        print_instructions(self.mode());

        loop {
            prompt("\nEnter YouTube URL or command: ");
            let Some(line) = read_line(&mut input).await? else {
                println!();
                break;
            };

            match InputCommand::parse(&line) {
                InputCommand::Exit => {
                    println!("Exiting program.");
                    break;
                }
                InputCommand::SwitchMode(mode) => {
                    self.set_mode(mode);
                    tracing::info!("Mode switched to {}", mode);
                    println!("Mode changed to {}.", mode);
                    continue;
                }
                InputCommand::Help => {
                    print_instructions(self.mode());
                    continue;
                }
                InputCommand::Empty => continue,
                InputCommand::Playlist(url) => {
                    self.download_playlist(&url).await;
                }
                InputCommand::Video(url) => {
                    self.download_video(&url).await;
                }
            }

            println!("\nCurrent mode: {}", self.mode());
        }

        Ok(())
    }
}
