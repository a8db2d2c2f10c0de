//! Line-delimited JSON-RPC over a tracked child's pipes.
//!
//! The pipes are plain blocking handles owned by the process registry;
//! every read and write hops onto the blocking pool so the session
//! timeout stays effective. A read that outlives its timeout leaves a
//! parked blocking thread holding the stdout lock until the provider
//! writes a line or exits; one session at a time per process is the
//! supported mode.

use std::io::{BufRead, Write};

use tokio::task;

use super::SessionError;
use crate::protocol::JsonRpcResponse;
use crate::registry::StdioPipes;

pub(super) struct StdioTransport {
    pipes: StdioPipes,
}

impl StdioTransport {
    pub(super) fn new(pipes: StdioPipes) -> Self {
        Self { pipes }
    }

    pub(super) async fn round_trip(
        &self,
        id: u64,
        payload: String,
    ) -> Result<JsonRpcResponse, SessionError> {
        self.write_line(payload).await?;
        loop {
            let Some(line) = self.read_line().await? else {
                return Err(SessionError::Closed(
                    "provider closed stdout (process may have exited)".to_string(),
                ));
            };
            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }
            match serde_json::from_str::<JsonRpcResponse>(trimmed) {
                Ok(response) if response.id == Some(id) => return Ok(response),
                // Response to some other request; not ours to consume
                // meaningfully, keep scanning.
                Ok(_) => {}
                Err(_) => {
                    // Providers sometimes print banners or debug noise
                    // on stdout before speaking JSON-RPC.
                    tracing::debug!(line = %trimmed, "Skipping non-protocol stdout line");
                }
            }
        }
    }

    pub(super) async fn send_notification(&self, payload: String) -> Result<(), SessionError> {
        self.write_line(payload).await
    }

    async fn write_line(&self, payload: String) -> Result<(), SessionError> {
        let stdin = std::sync::Arc::clone(&self.pipes.stdin);
        run_blocking(move || {
            let mut guard = stdin
                .lock()
                .map_err(|_| SessionError::Closed("stdin lock poisoned".to_string()))?;
            guard.write_all(payload.as_bytes())?;
            guard.write_all(b"\n")?;
            guard.flush()?;
            Ok(())
        })
        .await
    }

    async fn read_line(&self) -> Result<Option<String>, SessionError> {
        let stdout = std::sync::Arc::clone(&self.pipes.stdout);
        run_blocking(move || {
            let mut guard = stdout
                .lock()
                .map_err(|_| SessionError::Closed("stdout lock poisoned".to_string()))?;
            let mut line = String::new();
            let bytes = guard.read_line(&mut line)?;
            Ok(if bytes == 0 { None } else { Some(line) })
        })
        .await
    }
}

async fn run_blocking<T, F>(f: F) -> Result<T, SessionError>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T, SessionError> + Send + 'static,
{
    task::spawn_blocking(f)
        .await
        .map_err(|e| SessionError::Closed(format!("blocking pipe task failed: {e}")))?
}
