//! Client side of the control socket

use crate::daemon::protocol::{Request, Response};
use anyhow::{anyhow, Context, Result};
use std::path::Path;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::UnixStream;

/// Send one request and wait for its response
pub async fn send(socket: &Path, request: &Request) -> Result<Response> {
    let stream = UnixStream::connect(socket)
        .await
        .with_context(|| {
            format!("Failed to connect to {} (is the daemon running?)", socket.display())
        })?;
    let (reader, mut writer) = stream.into_split();

    let mut line = serde_json::to_vec(request)?;
    line.push(b'\n');
    writer.write_all(&line).await?;

    let mut lines = BufReader::new(reader).lines();
    let reply = lines
        .next_line()
        .await?
        .ok_or_else(|| anyhow!("Daemon closed the connection without answering"))?;

    serde_json::from_str(&reply).with_context(|| format!("Invalid response: {}", reply))
}

/// Read the status line
pub async fn status(socket: &Path) -> Result<String> {
    match send(socket, &Request::Read).await? {
        Response::State { line } => Ok(line),
        Response::Error { message } => Err(anyhow!(message)),
        other => Err(anyhow!("Unexpected response: {:?}", other)),
    }
}

/// Write command text to the control channel
pub async fn write(socket: &Path, data: &str) -> Result<usize> {
    let request = Request::Write {
        data: data.to_string(),
    };
    match send(socket, &request).await? {
        Response::Written { len } => Ok(len),
        Response::Error { message } => Err(anyhow!(message)),
        other => Err(anyhow!("Unexpected response: {:?}", other)),
    }
}
