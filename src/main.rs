use anyhow::{Context, Result};
use bbswitch::client;
use bbswitch::config::DaemonConfig;
use bbswitch::daemon;
use bbswitch::{Request, Response};
use bbswitch_core::PciFunctionExt;
use bbswitch_types::SleepEvent;
use clap::{Parser, Subcommand};
use log::{info, warn};
use std::path::PathBuf;

/// bbswitch - Toggle the discrete graphics card
#[derive(Parser, Debug)]
#[command(name = "bbswitch")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Debug verbosity level (0=quiet, 1=info, 2=debug, 3=trace)
    #[arg(short = 'd', long = "debug", value_name = "LEVEL", default_value = "0")]
    debug: u8,

    /// Configuration file to use instead of the default location
    #[arg(short = 'c', long = "config", value_name = "FILE")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the daemon owning the discrete card
    Daemon,
    /// Print the card's bus address and state
    Status,
    /// Power the card on
    On,
    /// Power the card off
    Off,
    /// Write raw text to the control channel
    Write {
        #[arg(value_name = "TEXT")]
        text: String,
    },
    /// Locate the discrete card without contacting the daemon
    Locate,
    /// Entry point for systemd-sleep (installed into /usr/lib/systemd/system-sleep)
    SleepHook {
        /// `pre` or `post`
        #[arg(value_name = "PHASE")]
        phase: String,
        /// `suspend`, `hibernate`, `hybrid-sleep` or `suspend-then-hibernate`
        #[arg(value_name = "KIND")]
        kind: String,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Level 0 (default): warn only
    // Level 1: info (normal verbosity)
    // Level 2: debug (detailed)
    // Level 3+: trace (very detailed)
    let log_level = match cli.debug {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    // Allow RUST_LOG to override CLI setting
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(log_level)).init();

    if let Err(e) = run(cli).await {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config = match cli.config {
        Some(ref path) => DaemonConfig::load_from_path(path)?,
        None => DaemonConfig::load().unwrap_or_else(|e| {
            warn!("Failed to load config, using defaults: {:#}", e);
            DaemonConfig::default()
        }),
    };
    let socket = config.socket_path.clone();

    match cli.command {
        Command::Daemon => {
            warn!("Starting bbswitch v{}", env!("CARGO_PKG_VERSION"));
            daemon::run(config).await
        }
        Command::Status => {
            println!("{}", client::status(&socket).await?);
            Ok(())
        }
        Command::On => switch(&socket, "ON").await,
        Command::Off => switch(&socket, "OFF").await,
        Command::Write { text } => {
            let len = client::write(&socket, &text).await?;
            info!("Wrote {} bytes", len);
            Ok(())
        }
        Command::Locate => locate(&config),
        Command::SleepHook { phase, kind } => sleep_hook(&socket, &phase, &kind).await,
    }
}

/// Send a command and report the state it left the card in
async fn switch(socket: &std::path::Path, command: &str) -> Result<()> {
    client::write(socket, command).await?;
    println!("{}", client::status(socket).await?);
    Ok(())
}

fn locate(config: &DaemonConfig) -> Result<()> {
    let device = bbswitch_linux::locate_discrete(&config.sysfs_root, config.integrated_vendor)
        .context("Failed to locate the discrete GPU")?;

    println!(
        "{} {:04x} {} {}",
        device.address(),
        device.vendor_id(),
        device.firmware_handle(),
        device.device().power_state()
    );
    if let Some(driver) = device.bound_driver() {
        println!("driver: {}", driver);
    }
    Ok(())
}

/// Forward a systemd-sleep notification to the daemon
///
/// Never fails: a broken hook must not hold up the sleep transition.
async fn sleep_hook(socket: &std::path::Path, phase: &str, kind: &str) -> Result<()> {
    let Some(event) = SleepEvent::from_systemd(phase, kind) else {
        info!("Ignoring sleep hook call '{} {}'", phase, kind);
        return Ok(());
    };

    match client::send(socket, &Request::Sleep { event }).await {
        Ok(Response::Ack) => info!("Delivered {}", event),
        Ok(other) => warn!("Daemon did not accept {}: {:?}", event, other),
        Err(e) => warn!("Failed to deliver {}: {:#}", event, e),
    }
    Ok(())
}
