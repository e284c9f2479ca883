//! Lightweight async IPC client for one-shot CLI commands.
//!
//! Connects, sends one request, reads one response, and disconnects.
//! `stream_events` keeps the connection open for attach.

use tokio::io::{AsyncReadExt, AsyncWriteExt};

use agentboard_core::ipc;
use agentboard_core::protocol::{ClientRequest, DaemonEvent};

const CONNECT_ERROR: &str = "Failed to connect to daemon. Is it running? Start with: agentboardd";

async fn read_event(stream: &mut tokio::net::UnixStream) -> Result<DaemonEvent, String> {
    let mut len_buf = [0u8; 4];
    stream
        .read_exact(&mut len_buf)
        .await
        .map_err(|e| format!("Read error: {e}"))?;
    let len = u32::from_be_bytes(len_buf) as usize;
    if len > ipc::MAX_FRAME_SIZE {
        return Err("Response frame too large".to_string());
    }
    let mut payload = vec![0u8; len];
    stream
        .read_exact(&mut payload)
        .await
        .map_err(|e| format!("Read error: {e}"))?;
    serde_json::from_slice(&payload).map_err(|e| format!("Deserialize error: {e}"))
}

async fn write_request(
    stream: &mut tokio::net::UnixStream,
    req: &ClientRequest,
) -> Result<(), String> {
    let json = serde_json::to_vec(req).map_err(|e| format!("Serialize error: {e}"))?;
    let frame = ipc::encode_frame(&json);
    stream
        .write_all(&frame)
        .await
        .map_err(|e| format!("Write error: {e}"))?;
    stream
        .flush()
        .await
        .map_err(|e| format!("Flush error: {e}"))
}

/// Connect to the daemon, send a request, wait for the first response event.
pub async fn request(req: ClientRequest) -> Result<DaemonEvent, String> {
    let socket_path = agentboard_core::config::socket_path();
    let mut stream = tokio::net::UnixStream::connect(&socket_path)
        .await
        .map_err(|_| CONNECT_ERROR.to_string())?;

    write_request(&mut stream, &req).await?;
    read_event(&mut stream).await
}

/// Connect, send setup requests, then stream events via callback until the
/// callback returns `false` or the daemon hangs up.
pub async fn stream_events(
    setup_requests: Vec<ClientRequest>,
    mut on_event: impl FnMut(DaemonEvent) -> bool,
) -> Result<(), String> {
    let socket_path = agentboard_core::config::socket_path();
    let mut stream = tokio::net::UnixStream::connect(&socket_path)
        .await
        .map_err(|_| CONNECT_ERROR.to_string())?;

    for req in setup_requests {
        write_request(&mut stream, &req).await?;
    }

    loop {
        match read_event(&mut stream).await {
            Ok(event) => {
                if !on_event(event) {
                    break;
                }
            }
            Err(_) => break,
        }
    }
    Ok(())
}
