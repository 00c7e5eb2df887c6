//! Single-writer queue for the command characteristic.
//!
//! Heartbeats and user commands target the same characteristic. Every write
//! on a link goes through one [`WriteQueue`], whose worker task performs
//! exactly one transport write at a time, in submission order.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tokio::sync::{mpsc, oneshot};
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use aroma_types::uuids::{COMMAND_CHARACTERISTIC, DIFFUSER_SERVICE};

use crate::commands::{Command, hex};
use crate::error::{TransportError, TransportResult};
use crate::traits::Transport;

/// Pending writes per link.
const QUEUE_DEPTH: usize = 16;

struct WriteRequest {
    command: &'static str,
    payload: Bytes,
    reply: oneshot::Sender<TransportResult<()>>,
}

/// Serializes writes to one peripheral's command characteristic.
#[derive(Debug)]
pub struct WriteQueue {
    device_id: String,
    sender: mpsc::Sender<WriteRequest>,
    closed: CancellationToken,
}

impl WriteQueue {
    /// Spawn the worker for a link.
    pub fn spawn(transport: Arc<dyn Transport>, device_id: String, write_timeout: Duration) -> Self {
        let (sender, receiver) = mpsc::channel(QUEUE_DEPTH);
        let closed = CancellationToken::new();
        tokio::spawn(run_worker(
            transport,
            device_id.clone(),
            write_timeout,
            receiver,
            closed.clone(),
        ));
        Self {
            device_id,
            sender,
            closed,
        }
    }

    /// Encode and write a command, waiting for the write to complete.
    ///
    /// Returns [`TransportError::NotConnected`] once the queue is closed.
    pub async fn write(&self, command: &Command) -> TransportResult<()> {
        if self.closed.is_cancelled() {
            return Err(TransportError::NotConnected);
        }
        let (reply, response) = oneshot::channel();
        let request = WriteRequest {
            command: command.name(),
            payload: command.encode(),
            reply,
        };
        self.sender
            .send(request)
            .await
            .map_err(|_| TransportError::NotConnected)?;
        // A dropped reply means the worker shut down with the write pending.
        response.await.map_err(|_| TransportError::NotConnected)?
    }

    /// Stop the worker. Pending and later writes fail with `NotConnected`.
    pub fn close(&self) {
        if !self.closed.is_cancelled() {
            debug!(device_id = %self.device_id, "Closing write queue");
            self.closed.cancel();
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed.is_cancelled()
    }
}

impl Drop for WriteQueue {
    fn drop(&mut self) {
        self.closed.cancel();
    }
}

async fn run_worker(
    transport: Arc<dyn Transport>,
    device_id: String,
    write_timeout: Duration,
    mut receiver: mpsc::Receiver<WriteRequest>,
    closed: CancellationToken,
) {
    loop {
        let request = tokio::select! {
            biased;
            _ = closed.cancelled() => break,
            request = receiver.recv() => match request {
                Some(request) => request,
                None => break,
            },
        };

        trace!(device_id = %device_id, command = request.command, payload = %hex(&request.payload), "Writing");
        let write = transport.write(
            &device_id,
            DIFFUSER_SERVICE,
            COMMAND_CHARACTERISTIC,
            &request.payload,
        );
        let result = tokio::select! {
            biased;
            _ = closed.cancelled() => break,
            result = timeout(write_timeout, write) => match result {
                Ok(result) => result,
                Err(_) => Err(TransportError::timeout(request.command, write_timeout)),
            },
        };

        if let Err(e) = &result {
            debug!(device_id = %device_id, command = request.command, error = %e, "Write failed");
        }
        // The caller may have given up waiting.
        let _ = request.reply.send(result);
    }
    debug!(device_id = %device_id, "Write queue stopped");
}
