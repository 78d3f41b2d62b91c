//! Streaming response body for a running command.
//!
//! Chunks flow from the driver's `OutputSink` straight into the response.
//! Dropping the body before the driver finishes means the client went
//! away; the command's cancellation token fires exactly once. Request and
//! response bytes are counted per command.

use std::io;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use axum::body::Body;
use bytes::Bytes;
use futures_util::{stream, StreamExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::admission::CommandPermit;
use crate::driver::{DriverError, InputStream};
use crate::observability::metrics;

/// Cancels a command's token when dropped while still armed.
#[derive(Debug)]
pub struct CancelOnDrop {
    token: Option<CancellationToken>,
    request_id: String,
}

impl CancelOnDrop {
    pub fn new(token: CancellationToken, request_id: impl Into<String>) -> Self {
        Self {
            token: Some(token),
            request_id: request_id.into(),
        }
    }

    /// The driver is done; dropping must not cancel anymore.
    pub fn disarm(&mut self) {
        self.token = None;
    }
}

impl Drop for CancelOnDrop {
    fn drop(&mut self) {
        if let Some(token) = self.token.take() {
            token.cancel();
            metrics::record_cancellation();
            tracing::debug!(request_id = %self.request_id, "Client went away, command cancelled");
        }
    }
}

/// Request body as handed to the driver, adding every chunk it reads to `counter`.
pub fn count_input(body: Body, counter: Arc<AtomicU64>) -> InputStream {
    let counted = body.into_data_stream().inspect(move |chunk| {
        if let Ok(chunk) = chunk {
            counter.fetch_add(chunk.len() as u64, Ordering::Relaxed);
        }
    });
    Body::from_stream(counted).into_data_stream()
}

/// Everything a streaming response keeps alive.
pub struct CommandStream {
    pub(crate) first: Option<Bytes>,
    pub(crate) rx: mpsc::Receiver<Bytes>,
    pub(crate) task: Option<JoinHandle<Result<(), DriverError>>>,
    pub(crate) guard: CancelOnDrop,
    pub(crate) permit: Option<CommandPermit>,
    pub(crate) command: String,
    pub(crate) request_id: String,
    pub(crate) bytes_in: Arc<AtomicU64>,
    pub(crate) bytes_out: u64,
}

impl CommandStream {
    pub fn into_body(self) -> Body {
        Body::from_stream(stream::unfold(self, next_chunk))
    }

    fn finish(&mut self) {
        self.guard.disarm();
        self.record_transfer();
    }

    /// Record the byte counters once, when the permit is released.
    fn record_transfer(&mut self) {
        if self.permit.take().is_some() {
            metrics::record_bytes_in(&self.command, self.bytes_in.load(Ordering::Relaxed));
            metrics::record_bytes_out(&self.command, self.bytes_out);
        }
    }
}

impl Drop for CommandStream {
    fn drop(&mut self) {
        // Client gone mid-stream; the guard cancels right after this.
        self.record_transfer();
    }
}

async fn next_chunk(mut state: CommandStream) -> Option<(Result<Bytes, io::Error>, CommandStream)> {
    let chunk = match state.first.take() {
        Some(chunk) => Some(chunk),
        None => state.rx.recv().await,
    };
    if let Some(chunk) = chunk {
        state.bytes_out += chunk.len() as u64;
        return Some((Ok(chunk), state));
    }

    // The sink is gone, so the driver has returned or is returning.
    state.finish();
    let task = state.task.take()?;

    match task.await {
        Ok(Ok(())) => {
            tracing::debug!(
                request_id = %state.request_id,
                command = %state.command,
                bytes_out = state.bytes_out,
                "Command finished"
            );
            None
        }
        Ok(Err(e)) => {
            tracing::error!(
                request_id = %state.request_id,
                command = %state.command,
                status = e.status,
                error = %e.message,
                "Command failed mid-stream, aborting response"
            );
            Some((Err(io::Error::other(e)), state))
        }
        Err(e) => {
            tracing::error!(
                request_id = %state.request_id,
                command = %state.command,
                error = %e,
                "Driver task panicked mid-stream"
            );
            Some((Err(io::Error::other(e)), state))
        }
    }
}
