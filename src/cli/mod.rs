mod render;

use std::path::PathBuf;

use anyhow::{anyhow, Result};
use clap::{Parser, Subcommand};
use tokio::{
    io::{AsyncBufReadExt, BufReader},
    sync::broadcast::{self, error::RecvError},
};

use crate::{
    capture::ScanUpdate,
    commands::{self, SettingsChange},
    AppState,
};

#[derive(Debug, Parser)]
#[command(name = "platewatch", version, about = "Watch a camera for license plates on your list")]
pub struct Cli {
    /// Where the watchlist store and settings live.
    #[arg(long, env = "PLATEWATCH_DATA_DIR", default_value = ".platewatch")]
    pub data_dir: PathBuf,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Show the watchlist.
    List,
    /// Add a plate to the watchlist.
    Add { plate: String },
    /// Remove a plate by id or by number.
    Remove { key: String },
    /// Scan the camera until Ctrl-C.
    Scan {
        /// Snapshot URL or image file, overriding the configured source.
        #[arg(long)]
        source: Option<String>,
        #[arg(long)]
        interval_ms: Option<u64>,
    },
    /// Show settings, or change and persist them.
    Settings {
        #[arg(long)]
        source: Option<String>,
        #[arg(long)]
        interval_ms: Option<u64>,
        /// Let the model reason before answering (slower).
        #[arg(long)]
        deep_reasoning: Option<bool>,
    },
    /// Interactive session switching between list and scan views (default).
    Shell,
}

pub async fn dispatch(cli: Cli) -> Result<()> {
    let state = AppState::initialize(&cli.data_dir).await?;

    match cli.command.unwrap_or(Command::Shell) {
        Command::List => {
            let plates = commands::list_plates(&state).await.map_err(|e| anyhow!(e))?;
            println!("{}", render::watchlist(&plates));
        }
        Command::Add { plate } => {
            let added = commands::add_plate(&state, &plate)
                .await
                .map_err(|e| anyhow!(e))?;
            println!("added {}", added.number);
        }
        Command::Remove { key } => match commands::remove_plate(&state, &key)
            .await
            .map_err(|e| anyhow!(e))?
        {
            Some(removed) => println!("removed {}", removed.number),
            None => println!("no entry matches {key}"),
        },
        Command::Scan {
            source,
            interval_ms,
        } => scan_view(&state, source.as_deref(), interval_ms).await?,
        Command::Settings {
            source,
            interval_ms,
            deep_reasoning,
        } => {
            let change = SettingsChange {
                source,
                interval_ms,
                deep_reasoning,
            };
            let settings = if change.is_empty() {
                commands::get_settings(&state)
            } else {
                commands::update_settings(&state, change).map_err(|e| anyhow!(e))?
            };
            println!("{}", serde_json::to_string_pretty(&settings)?);
        }
        Command::Shell => shell(&state).await?,
    }

    Ok(())
}

async fn scan_view(state: &AppState, source: Option<&str>, interval_ms: Option<u64>) -> Result<()> {
    let mut updates = state.scan.subscribe();
    commands::start_scan(state, source, interval_ms)
        .await
        .map_err(|e| anyhow!(e))?;

    loop {
        tokio::select! {
            update = updates.recv() => {
                if !print_update(update) {
                    break;
                }
            }
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    commands::stop_scan(state).await.map_err(|e| anyhow!(e))?;
    println!("{}", render::snapshot(&commands::get_scan_state(state)));
    Ok(())
}

/// Prints one broadcast result; `false` once the channel is gone.
fn print_update(update: Result<ScanUpdate, RecvError>) -> bool {
    match update {
        Ok(update) => {
            if let Some(line) = render::update(&update) {
                println!("{line}");
            }
            true
        }
        Err(RecvError::Lagged(missed)) => {
            log::warn!("scan view fell behind by {missed} updates");
            true
        }
        Err(RecvError::Closed) => false,
    }
}

const SHELL_HELP: &str = "\
commands:
  list                 show the watchlist
  add <plate>          add a plate
  remove <id|plate>    remove a plate
  scan [source]        start scanning (snapshot URL or image file)
  stop                 stop scanning
  status               scanner state
  log                  recent recognitions
  help                 this text
  quit                 leave";

async fn shell(state: &AppState) -> Result<()> {
    println!("platewatch shell, type `help` for commands");
    let mut updates: broadcast::Receiver<ScanUpdate> = state.scan.subscribe();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else { break };
                if !shell_command(state, line.trim()).await {
                    break;
                }
            }
            update = updates.recv() => {
                if !print_update(update) {
                    break;
                }
            }
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    commands::stop_scan(state).await.map_err(|e| anyhow!(e))?;
    Ok(())
}

/// Runs one shell line; `false` means quit.
async fn shell_command(state: &AppState, line: &str) -> bool {
    let (verb, arg) = match line.split_once(char::is_whitespace) {
        Some((verb, rest)) => (verb, rest.trim()),
        None => (line, ""),
    };

    let result: Result<Option<String>, String> = match verb {
        "" => Ok(None),
        "quit" | "exit" => return false,
        "help" => Ok(Some(SHELL_HELP.into())),
        "list" => commands::list_plates(state)
            .await
            .map(|plates| Some(render::watchlist(&plates))),
        "add" => commands::add_plate(state, arg)
            .await
            .map(|plate| Some(format!("added {}", plate.number))),
        "remove" => commands::remove_plate(state, arg).await.map(|removed| {
            Some(match removed {
                Some(plate) => format!("removed {}", plate.number),
                None => format!("no entry matches {arg}"),
            })
        }),
        "scan" => {
            let source = Some(arg).filter(|s| !s.is_empty());
            commands::start_scan(state, source, None).await.map(|_| None)
        }
        "stop" => commands::stop_scan(state).await.map(|_| None),
        "status" => Ok(Some(render::snapshot(&commands::get_scan_state(state)))),
        "log" => Ok(Some(render::log(&commands::get_scan_state(state).log))),
        other => Err(format!("unknown command `{other}`, try `help`")),
    };

    match result {
        Ok(Some(text)) => println!("{text}"),
        Ok(None) => {}
        Err(err) => println!("error: {err}"),
    }
    true
}
