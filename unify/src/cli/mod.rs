mod probe;
mod remap;
mod watch;

use std::time::Duration;

use anyhow::{Result, bail};
use clap::{ArgAction, Parser, Subcommand};
use probe::ProbeCommand;
use remap::RemapCommand;
use tracing_subscriber::{EnvFilter, filter::LevelFilter};
use unifying::{channel::ChannelConfig, receiver::unifying::UnifyingReceiver};
use watch::WatchCommand;

use crate::hidraw::open_receivers;

#[derive(Parser)]
#[command(version, about, long_about = None)]
struct Cli {
    #[command(flatten)]
    color: colorchoice_clap::Color,

    #[command(subcommand)]
    command: Commands,

    /// Output plain JSON without color and interactivity
    #[arg(short, long, global = true)]
    json: bool,

    /// How long to wait for a device to answer a request
    #[arg(long, global = true, default_value_t = 1000, value_name = "MS")]
    timeout_ms: u64,

    /// Log more details to stderr, repeat for even more
    #[arg(short, long, global = true, action = ArgAction::Count)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Commands {
    Probe(ProbeCommand),
    Watch(WatchCommand),
    Remap(RemapCommand),
}

impl Cli {
    fn channel_config(&self) -> ChannelConfig {
        ChannelConfig {
            timeout: Duration::from_millis(self.timeout_ms),
            ..ChannelConfig::default()
        }
    }

    /// Opens all receivers and discovers their devices.
    async fn scanned_receivers(&self) -> Result<Vec<UnifyingReceiver>> {
        let receivers = open_receivers(self.channel_config()).await?;
        if receivers.is_empty() {
            bail!("no Unifying receiver was found");
        }

        for receiver in &receivers {
            receiver.scan_devices().await?;
        }

        Ok(receivers)
    }
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => LevelFilter::WARN,
        1 => LevelFilter::INFO,
        2 => LevelFilter::DEBUG,
        _ => LevelFilter::TRACE,
    };

    let filter = EnvFilter::builder()
        .with_default_directive(level.into())
        .from_env_lossy();

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

pub async fn execute() -> Result<()> {
    let cli = Cli::parse();

    cli.color.write_global();
    init_logging(cli.verbose);

    match &cli.command {
        Commands::Probe(cmd) => cmd.execute(&cli).await,
        Commands::Watch(cmd) => cmd.execute(&cli).await,
        Commands::Remap(cmd) => cmd.execute(&cli).await,
    }
}
