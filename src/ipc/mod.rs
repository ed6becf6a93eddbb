//! Framed command channel between the HTTP front-end and the privileged
//! worker.
//!
//! Wire format: an 8-byte big-endian unsigned length followed by that
//! many bytes of UTF-8 JSON. The protocol has no recovery primitive, so
//! framing errors are fatal for the channel.

pub mod client;

use crate::peer::PeerInfo;
use serde::{Deserialize, Serialize};
use std::io::{Read, Write};
use std::time::Duration;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Width of the length prefix.
pub const LEN_BYTES: usize = 8;
/// Upper bound on a single frame; anything larger is a framing error.
pub const MAX_FRAME: u64 = 1 << 20;

#[derive(Debug, Error)]
pub enum IpcError {
    #[error("command channel is closed")]
    Closed,
    #[error("connection closed mid-frame")]
    Truncated,
    #[error("frame of {0} bytes exceeds the {MAX_FRAME} byte limit")]
    Oversize(u64),
    #[error("i/o error on command channel: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid frame payload: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("worker did not answer within {0:?}")]
    Timeout(Duration),
}

/// Provisioning command sent to the privileged worker.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum Command {
    BgpUpdate { peers: Vec<PeerInfo> },
    WgExists { peer: PeerInfo },
    WgCreate { peer: PeerInfo },
    WgDelete { peer: PeerInfo },
}

/// Worker reply to a single command.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct WorkerResponse {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl WorkerResponse {
    pub fn ok(message: impl Into<String>) -> Self {
        WorkerResponse {
            success: true,
            message: Some(message.into()),
            error: None,
        }
    }

    pub fn err(error: impl Into<String>) -> Self {
        WorkerResponse {
            success: false,
            message: None,
            error: Some(error.into()),
        }
    }

    /// Error text for the client, falling back through the fields.
    pub fn error_message(&self) -> String {
        self.error
            .clone()
            .or_else(|| self.message.clone())
            .unwrap_or_else(|| "worker reported failure".to_string())
    }
}

/// Read one frame. `Ok(None)` means the peer hung up at a frame boundary.
pub fn read_frame(stream: &mut impl Read) -> Result<Option<Vec<u8>>, IpcError> {
    let mut len_buf = [0u8; LEN_BYTES];
    match stream.read_exact(&mut len_buf) {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e.into()),
    }
    let len = u64::from_be_bytes(len_buf);
    if len > MAX_FRAME {
        return Err(IpcError::Oversize(len));
    }
    let mut payload = vec![0u8; len as usize];
    stream.read_exact(&mut payload).map_err(|e| {
        if e.kind() == std::io::ErrorKind::UnexpectedEof {
            IpcError::Truncated
        } else {
            IpcError::Io(e)
        }
    })?;
    Ok(Some(payload))
}

pub fn write_frame(stream: &mut impl Write, payload: &[u8]) -> Result<(), IpcError> {
    stream.write_all(&(payload.len() as u64).to_be_bytes())?;
    stream.write_all(payload)?;
    stream.flush()?;
    Ok(())
}

pub async fn read_frame_async(
    stream: &mut (impl AsyncRead + Unpin),
) -> Result<Option<Vec<u8>>, IpcError> {
    let mut len_buf = [0u8; LEN_BYTES];
    match stream.read_exact(&mut len_buf).await {
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e.into()),
    }
    let len = u64::from_be_bytes(len_buf);
    if len > MAX_FRAME {
        return Err(IpcError::Oversize(len));
    }
    let mut payload = vec![0u8; len as usize];
    stream.read_exact(&mut payload).await.map_err(|e| {
        if e.kind() == std::io::ErrorKind::UnexpectedEof {
            IpcError::Truncated
        } else {
            IpcError::Io(e)
        }
    })?;
    Ok(Some(payload))
}

pub async fn write_frame_async(
    stream: &mut (impl AsyncWrite + Unpin),
    payload: &[u8],
) -> Result<(), IpcError> {
    stream.write_all(&(payload.len() as u64).to_be_bytes()).await?;
    stream.write_all(payload).await?;
    stream.flush().await?;
    Ok(())
}
