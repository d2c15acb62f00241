use std::{
    fs,
    io::{BufWriter, Write},
    path::PathBuf,
};

use anyhow::{Context, Result};
use clap::Args;
use futures_lite::future;
use owo_colors::OwoColorize;
use serde_json::json;
use tracing::info;
use unifying::{config::Config, event::ButtonEvent};

use super::Cli;

/// Print button presses of all discovered mice until interrupted.
#[derive(Args)]
pub struct WatchCommand {
    /// A JSON file binding control names to actions
    #[arg(short, long)]
    config: Option<PathBuf>,
}

impl WatchCommand {
    pub async fn execute(&self, root: &Cli) -> Result<()> {
        let config = self.config.as_deref().map(read_config).transpose()?;
        let receivers = root.scanned_receivers().await?;

        let (events_sender, events) = flume::unbounded::<ButtonEvent>();
        for receiver in &receivers {
            for device in receiver.devices().iter() {
                info!(device_index = device.device_index(), name = device.name(), "watching device");
                if let Some(config) = &config {
                    device.set_config(config);
                }
            }

            let listener = receiver.listen();
            let events_sender = events_sender.clone();
            tokio::spawn(async move {
                while let Ok(event) = listener.recv_async().await {
                    if events_sender.send(event).is_err() {
                        break;
                    }
                }
            });
        }
        drop(events_sender);

        let print = async {
            let mut stdout = BufWriter::new(anstream::stdout());
            while let Ok(event) = events.recv_async().await {
                print_event(&mut stdout, &event, root.json)?;
                stdout.flush()?;
            }

            Ok::<_, anyhow::Error>(())
        };

        let interrupt = async {
            tokio::signal::ctrl_c().await?;
            Ok::<_, anyhow::Error>(())
        };

        future::or(print, interrupt).await
    }
}

fn read_config(path: &std::path::Path) -> Result<Config> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("could not read {}", path.display()))?;

    serde_json::from_str(&raw).with_context(|| format!("could not parse {}", path.display()))
}

fn print_event(out: &mut impl Write, event: &ButtonEvent, json: bool) -> Result<()> {
    if json {
        writeln!(out, "{}", json!(event))?;
        return Ok(());
    }

    if event.pressed.is_empty() {
        writeln!(out, "{}: {}", event.device_index.bright_blue(), "released".bright_black())?;
        return Ok(());
    }

    let names: Vec<String> = event.pressed.iter().map(|button| button.cid.to_string()).collect();
    writeln!(out, "{}: {}", event.device_index.bright_blue(), names.join(" + ").green())?;

    Ok(())
}
