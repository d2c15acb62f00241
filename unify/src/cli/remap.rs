use std::io::{BufWriter, Write};

use anyhow::{Context, Result};
use clap::Args;
use owo_colors::OwoColorize;
use serde_json::json;
use unifying::button::ControlId;

use super::Cli;

/// Make a control of a mouse behave like another control.
#[derive(Args)]
pub struct RemapCommand {
    /// The index the mouse is paired at (1 to 6)
    #[arg(short, long)]
    device: u8,

    /// The control to change, by name (e.g. `back`) or ID (e.g. `0x0053`)
    #[arg(short, long)]
    control: ControlId,

    /// The control whose behavior to take over
    #[arg(short, long)]
    to: ControlId,
}

impl RemapCommand {
    pub async fn execute(&self, root: &Cli) -> Result<()> {
        let receivers = root.scanned_receivers().await?;

        let device = receivers
            .iter()
            .find_map(|receiver| receiver.device(self.device))
            .with_context(|| format!("no mouse was found at index {}", self.device))?;

        let button = *device
            .find_button(self.control)
            .with_context(|| format!("{} has no {} control", device.name(), self.control))?;

        let applied = device
            .remap_button(&button, self.to)
            .await
            .with_context(|| format!("could not remap {}", self.control))?;

        let mut stdout = BufWriter::new(anstream::stdout());
        if root.json {
            writeln!(stdout, "{}", json!(applied))?;
        } else {
            writeln!(
                stdout,
                "{}: {} {} {}",
                device.name(),
                applied.cid.bright_blue(),
                "→".bright_black(),
                applied.remap.green()
            )?;
        }
        stdout.flush()?;

        Ok(())
    }
}
