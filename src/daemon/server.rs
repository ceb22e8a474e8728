//! Control socket server

use super::protocol::{Request, Response};
use anyhow::{bail, Context, Result};
use bbswitch_core::{AcpiEvaluator, Bbswitch, PciFunction};
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::Mutex;

/// The context shared between connections
///
/// Command writes and sleep notifications both go through this single lock.
pub type SharedContext<D, F> = Arc<Mutex<Bbswitch<D, F>>>;

/// Longest request line accepted from a client
const MAX_REQUEST_LINE: usize = 4096;

/// Run `f` on the locked context from the blocking thread pool
///
/// Device and firmware access is synchronous file I/O with settle delays.
pub async fn with_context<D, F, R>(
    ctx: &SharedContext<D, F>,
    f: impl FnOnce(&mut Bbswitch<D, F>) -> R + Send + 'static,
) -> Result<R>
where
    D: PciFunction + Send + 'static,
    F: AcpiEvaluator + Send + 'static,
    R: Send + 'static,
{
    let mut guard = Arc::clone(ctx).lock_owned().await;
    tokio::task::spawn_blocking(move || f(&mut *guard))
        .await
        .context("Context task failed")
}

/// Execute one request against the context
pub async fn handle_request<D, F>(ctx: &SharedContext<D, F>, request: Request) -> Response
where
    D: PciFunction + Send + 'static,
    F: AcpiEvaluator + Send + 'static,
{
    let result = with_context(ctx, move |ctx| match request {
        Request::Read => Response::State {
            line: ctx.read_status().trim_end().to_string(),
        },
        Request::Write { data } => match ctx.write_command(data.as_bytes()) {
            Ok(len) => Response::Written { len },
            Err(e) => Response::error(e.to_string()),
        },
        Request::Sleep { event } => {
            log::info!("sleep notification: {}", event);
            ctx.notify_sleep(event);
            Response::Ack
        }
    })
    .await;

    result.unwrap_or_else(|e| Response::error(format!("{:#}", e)))
}

/// The bound control socket
///
/// Dropping it removes the socket file, ending the subscription to sleep
/// notifications and commands.
pub struct ControlSocket {
    listener: UnixListener,
    path: PathBuf,
}

impl ControlSocket {
    /// Bind `path`, replacing a stale socket left by a previous run
    ///
    /// Fails if another daemon is still accepting connections there.
    pub fn bind(path: &Path) -> Result<Self> {
        if path.exists() {
            if std::os::unix::net::UnixStream::connect(path).is_ok() {
                bail!("{} is in use by another running daemon", path.display());
            }
            std::fs::remove_file(path)
                .with_context(|| format!("Failed to remove stale socket {}", path.display()))?;
        }
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let listener = UnixListener::bind(path)
            .with_context(|| format!("Failed to bind {}", path.display()))?;
        std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o660))?;
        log::info!("Listening on {}", path.display());

        Ok(Self {
            listener,
            path: path.to_path_buf(),
        })
    }

    /// Accept connections until the task is cancelled
    pub async fn serve<D, F>(&self, ctx: SharedContext<D, F>) -> Result<()>
    where
        D: PciFunction + Send + 'static,
        F: AcpiEvaluator + Send + 'static,
    {
        loop {
            let (stream, _) = self.listener.accept().await?;
            let ctx = Arc::clone(&ctx);
            tokio::spawn(async move {
                if let Err(e) = handle_connection(stream, ctx).await {
                    log::warn!("control connection failed: {:#}", e);
                }
            });
        }
    }
}

impl Drop for ControlSocket {
    fn drop(&mut self) {
        match std::fs::remove_file(&self.path) {
            Ok(()) => log::debug!("Removed {}", self.path.display()),
            Err(e) => log::warn!("Failed to remove {}: {}", self.path.display(), e),
        }
    }
}

async fn handle_connection<D, F>(stream: UnixStream, ctx: SharedContext<D, F>) -> Result<()>
where
    D: PciFunction + Send + 'static,
    F: AcpiEvaluator + Send + 'static,
{
    let (reader, mut writer) = stream.into_split();
    let mut lines = BufReader::new(reader).lines();

    while let Some(line) = lines.next_line().await? {
        let response = if line.len() > MAX_REQUEST_LINE {
            Response::error("request too long")
        } else {
            match serde_json::from_str::<Request>(&line) {
                Ok(request) => handle_request(&ctx, request).await,
                Err(e) => Response::error(format!("invalid request: {}", e)),
            }
        };

        let mut out = serde_json::to_vec(&response)?;
        out.push(b'\n');
        writer.write_all(&out).await?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client;
    use bbswitch_core::fake::{FakeFirmware, FakeGpu};
    use bbswitch_core::{AcpiHandle, ManagedDevice, PowerState};
    use bbswitch_types::SleepEvent;
    use tempfile::TempDir;

    fn context() -> SharedContext<FakeGpu, FakeFirmware> {
        let gpu = FakeGpu::nvidia("0000:01:00.0");
        let device = ManagedDevice::new(gpu, AcpiHandle::new("\\_SB_.PCI0.PEG0.PEGP"));
        Arc::new(Mutex::new(Bbswitch::new(device, FakeFirmware::optimus())))
    }

    #[tokio::test]
    async fn test_read_and_write() {
        let ctx = context();

        let response = handle_request(&ctx, Request::Read).await;
        assert_eq!(response, Response::State { line: "0000:01:00.0 ON".into() });

        let response = handle_request(&ctx, Request::Write { data: "OFF".into() }).await;
        assert_eq!(response, Response::Written { len: 3 });

        let response = handle_request(&ctx, Request::Read).await;
        assert_eq!(response, Response::State { line: "0000:01:00.0 OFF".into() });
    }

    #[tokio::test]
    async fn test_oversized_write() {
        let ctx = context();
        let request = Request::Write {
            data: "OFFOFFOFF".into(),
        };
        let response = handle_request(&ctx, request).await;
        assert_eq!(response, Response::error("Input too large (9)"));
        assert_eq!(ctx.lock().await.query_state(), PowerState::On);
    }

    #[tokio::test]
    async fn test_sleep_events() {
        let ctx = context();
        handle_request(&ctx, Request::Write { data: "OFF".into() }).await;

        let event = SleepEvent::SuspendPrepare;
        let response = handle_request(&ctx, Request::Sleep { event }).await;
        assert_eq!(response, Response::Ack);
        assert_eq!(ctx.lock().await.query_state(), PowerState::On);

        let event = SleepEvent::PostSuspend;
        handle_request(&ctx, Request::Sleep { event }).await;
        assert_eq!(ctx.lock().await.query_state(), PowerState::Off);
    }

    #[tokio::test]
    async fn test_socket_round_trip_and_cleanup() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("bbswitch.sock");
        let ctx = context();

        let socket = ControlSocket::bind(&path).unwrap();
        let server = {
            let ctx = Arc::clone(&ctx);
            tokio::spawn(async move {
                let _ = socket.serve(ctx).await;
            })
        };

        let request = Request::Write {
            data: "OFF\n".into(),
        };
        let response = client::send(&path, &request).await.unwrap();
        assert_eq!(response, Response::Written { len: 4 });
        let response = client::send(&path, &Request::Read).await.unwrap();
        assert_eq!(response, Response::State { line: "0000:01:00.0 OFF".into() });

        server.abort();
        let _ = server.await;
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_bind_refuses_live_socket() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("bbswitch.sock");

        let first = ControlSocket::bind(&path).unwrap();
        assert!(ControlSocket::bind(&path).is_err());
        assert!(path.exists());

        drop(first);
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_bind_replaces_stale_socket() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("bbswitch.sock");

        // a socket file nobody listens on any more
        drop(std::os::unix::net::UnixListener::bind(&path).unwrap());
        assert!(path.exists());

        let socket = ControlSocket::bind(&path).unwrap();
        assert!(path.exists());
        drop(socket);
    }
}
