//! Front-end side of the command channel.

use super::{read_frame_async, write_frame_async, Command, IpcError, WorkerResponse};
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::error;

/// Bound on one `send → recv` exchange with the worker.
pub const CALL_TIMEOUT: Duration = Duration::from_secs(30);

/// Serialized access to the worker socket.
///
/// The framed protocol is not multiplexed, so every exchange holds the
/// lock across the full `send → recv` pair. A timeout or framing error
/// poisons the channel; later calls fail fast with [`IpcError::Closed`]
/// and the service is expected to be restarted.
pub struct WorkerChannel {
    stream: Mutex<Option<tokio::net::UnixStream>>,
    timeout: Duration,
}

impl WorkerChannel {
    /// Wrap the front-end's socket end. Must run inside the runtime.
    pub fn new(stream: std::os::unix::net::UnixStream) -> std::io::Result<Self> {
        Self::with_timeout(stream, CALL_TIMEOUT)
    }

    pub fn with_timeout(
        stream: std::os::unix::net::UnixStream,
        timeout: Duration,
    ) -> std::io::Result<Self> {
        stream.set_nonblocking(true)?;
        Ok(WorkerChannel {
            stream: Mutex::new(Some(tokio::net::UnixStream::from_std(stream)?)),
            timeout,
        })
    }

    /// Send one command and wait for its response.
    pub async fn call(&self, command: &Command) -> Result<WorkerResponse, IpcError> {
        let payload = serde_json::to_vec(command)?;
        let mut guard = self.stream.lock().await;
        let stream = guard.as_mut().ok_or(IpcError::Closed)?;

        let exchange = async {
            write_frame_async(stream, &payload).await?;
            match read_frame_async(stream).await? {
                Some(frame) => Ok(frame),
                None => Err(IpcError::Closed),
            }
        };

        let result = match tokio::time::timeout(self.timeout, exchange).await {
            Ok(Ok(frame)) => serde_json::from_slice(&frame).map_err(IpcError::from),
            Ok(Err(e)) => Err(e),
            Err(_) => Err(IpcError::Timeout(self.timeout)),
        };

        if let Err(e) = &result {
            // no way to resynchronize the stream after a failed exchange
            error!("worker channel failed, closing it: {e}");
            *guard = None;
        }
        result
    }
}
