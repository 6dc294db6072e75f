//! Interactive narration session (`chronicle narrate`)

use std::io::Write;
use std::sync::Arc;

use chronicle_core::playback::{NarrationMode, NarrationStatus, SequenceEnd};
use chronicle_core::{
    AppConfigExt, NarrationHandle, NarrationService, PlaybackController, RodioOutput,
    create_narration_channel,
};
use chronicle_types::{TimelineEntry, Voice};
use clap::{Parser, Subcommand};
use tokio::io::{AsyncBufReadExt, BufReader};

use crate::commands::format_entries;
use crate::context::CliContext;
use crate::describe;
use crate::view::ConsoleView;

#[derive(Parser, Debug)]
#[command(name = "narrate")]
struct ReplLine {
    #[command(subcommand)]
    command: ReplCommand,
}

#[derive(Subcommand, Debug, PartialEq, Eq)]
enum ReplCommand {
    /// Show the timeline
    List,
    /// Narrate entry <n>; again to stop it
    Speak { number: usize },
    /// Narrate every entry in order; again to stop
    PlayAll,
    Stop,
    /// Switch narrator voice
    Voice { name: Voice },
    Status,
    /// Reload the timeline from storage
    Reload,
    #[command(alias = "exit")]
    Quit,
}

fn parse_line(line: &str) -> Result<ReplCommand, String> {
    let mut args = shlex::split(line).ok_or("error: Invalid quoting")?;
    args.insert(0, "narrate".to_string());
    let parsed = ReplLine::try_parse_from(args).map_err(|e| e.to_string())?;
    Ok(parsed.command)
}

fn prompt() -> Result<(), String> {
    print!("> ");
    std::io::stdout().flush().map_err(|e| e.to_string())
}

struct Repl {
    ctx: CliContext,
    handle: NarrationHandle,
    entries: Vec<TimelineEntry>,
}

impl Repl {
    /// Returns true when the session should end
    async fn respond(&mut self, line: &str) -> Result<bool, String> {
        let closed = |e: chronicle_core::playback::NarrationClosed| e.to_string();

        match parse_line(line)? {
            ReplCommand::List => print!("{}", format_entries(&self.entries)),
            ReplCommand::Speak { number } => {
                if number == 0 || number > self.entries.len() {
                    return Err(format!(
                        "no entry {} (timeline has {})",
                        number,
                        self.entries.len()
                    ));
                }
                self.handle.speak(number - 1).await.map_err(closed)?;
            }
            ReplCommand::PlayAll => self.handle.play_all().await.map_err(closed)?,
            ReplCommand::Stop => self.handle.stop().await.map_err(closed)?,
            ReplCommand::Voice { name } => {
                self.handle.set_voice(name).await.map_err(closed)?;
                println!("Voice set to {name}");
            }
            ReplCommand::Status => {
                let status = self.handle.status().await.map_err(closed)?;
                print!("{}", format_status(&status));
            }
            ReplCommand::Reload => {
                self.entries = self.ctx.entries().await?;
                self.handle
                    .replace_entries(self.entries.clone())
                    .await
                    .map_err(closed)?;
                println!("Reloaded {} entries", self.entries.len());
            }
            ReplCommand::Quit => return Ok(true),
        }
        Ok(false)
    }
}

fn format_status(status: &NarrationStatus) -> String {
    let mode = match status.mode {
        NarrationMode::Idle => "idle".to_string(),
        NarrationMode::Single { index } => format!("narrating entry {}", index + 1),
        NarrationMode::Sequence { index } => format!("playing all, at entry {}", index + 1),
    };
    let mut text = format!(
        "{} | voice {} | {} | {} entries\n",
        mode,
        status.voice,
        if status.playing { "audio playing" } else { "silent" },
        status.entries
    );
    if let Some(report) = &status.last_sequence {
        let end = match report.end {
            SequenceEnd::Finished => "finished",
            SequenceEnd::Stopped => "stopped",
            SequenceEnd::Interrupted => "interrupted",
        };
        text.push_str(&format!(
            "last play all: {} of {} entries played, {}\n",
            report.played(),
            report.steps.len(),
            end
        ));
    }
    text
}

/// Run the narration REPL until `quit` or end of input
pub async fn run(ctx: CliContext, voice: Option<Voice>) -> Result<(), String> {
    let config = ctx.config.read().await.clone();
    let entries = ctx.entries().await?;

    let output = RodioOutput::spawn().map_err(|e| describe(&e))?;
    let player = PlaybackController::new(Arc::new(output), config.playback.volume);
    let source = ctx.speech_source().await?;

    let (handle, commands) = create_narration_channel();
    let service = NarrationService::new(
        commands,
        source,
        player,
        ConsoleView::default(),
        entries.clone(),
    )
    .with_voice(voice.unwrap_or(config.speech.voice))
    .with_delays(config.settle_delay(), config.inter_item_delay());
    let task = tokio::spawn(service.run());

    print!("{}", format_entries(&entries));
    println!("Commands: list, speak <n>, play-all, stop, voice <name>, status, reload, quit");

    let mut repl = Repl {
        ctx,
        handle,
        entries,
    };
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        prompt()?;
        let Some(line) = lines.next_line().await.map_err(|e| e.to_string())? else {
            break;
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        match repl.respond(line).await {
            Ok(true) => break,
            Ok(false) => {}
            Err(err) => println!("{err}"),
        }
    }

    if repl.handle.shutdown().await.is_err() {
        tracing::debug!("Narration service already stopped");
    }
    task.await.map_err(|e| e.to_string())?;
    println!("quitting...");
    Ok(())
}
