//! The bbswitch daemon
//!
//! Locates the discrete card once, then serves control requests and sleep
//! notifications over a Unix socket until SIGINT or SIGTERM.

pub mod protocol;
mod server;

pub use server::{handle_request, with_context, ControlSocket, SharedContext};

use crate::config::DaemonConfig;
use anyhow::{Context, Result};
use bbswitch_core::Bbswitch;
use bbswitch_linux::AcpiCall;
use std::sync::Arc;
use tokio::signal::unix::{signal, SignalKind};
use tokio::sync::Mutex;

/// Run the daemon until a termination signal arrives
pub async fn run(config: DaemonConfig) -> Result<()> {
    let device = bbswitch_linux::locate_discrete(&config.sysfs_root, config.integrated_vendor)
        .context("Failed to locate the discrete GPU")?;

    let firmware = AcpiCall::new(&config.acpi_call_path);
    if !firmware.is_available() {
        log::warn!(
            "{} not found, is the acpi_call module loaded? Power-off requests will fail",
            firmware.path().display()
        );
    }

    let ctx: SharedContext<_, _> = Arc::new(Mutex::new(Bbswitch::new(device, firmware)));

    if let Some(state) = config.load_state {
        log::info!("Applying load state {}", state);
        with_context(&ctx, move |ctx| ctx.request(state)).await?;
    }

    let socket = ControlSocket::bind(&config.socket_path)?;
    let mut sigterm = signal(SignalKind::terminate()).context("Failed to install SIGTERM handler")?;

    tokio::select! {
        result = socket.serve(Arc::clone(&ctx)) => {
            result.context("Control socket failed")?;
        }
        _ = tokio::signal::ctrl_c() => {
            log::info!("Interrupted, shutting down");
        }
        _ = sigterm.recv() => {
            log::info!("Terminated, shutting down");
        }
    }

    // stop accepting commands before the final transition
    drop(socket);

    if let Some(state) = config.unload_state {
        log::info!("Applying unload state {}", state);
        with_context(&ctx, move |ctx| ctx.request(state)).await?;
    }

    log::warn!("Stopped");
    Ok(())
}
