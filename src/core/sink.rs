//! Outgoing half of a streaming relay.
//!
//! The sink moves through `Open -> Closing -> Closed` exactly once. Closing is
//! idempotent: any later `close` or `fail` is a no-op, so a relay can close on
//! every exit path without tracking whether someone else already did.
use std::io;

use bytes::Bytes;
use tokio::sync::mpsc;

/// Lifecycle of a [`RelaySink`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SinkState {
    Open,
    Closing,
    Closed,
}

/// Returned by [`RelaySink::send`] when the receiving side is gone or the sink
/// is no longer open.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SinkClosed;

/// Producer handle feeding the outgoing response body.
#[derive(Debug)]
pub struct RelaySink {
    tx: Option<mpsc::Sender<io::Result<Bytes>>>,
    state: SinkState,
}

impl RelaySink {
    pub fn new(tx: mpsc::Sender<io::Result<Bytes>>) -> Self {
        Self {
            tx: Some(tx),
            state: SinkState::Open,
        }
    }

    pub fn state(&self) -> SinkState {
        self.state
    }

    /// Enqueue one chunk unmodified. Waits while the client is slower than the upstream.
    pub async fn send(&mut self, chunk: Bytes) -> Result<(), SinkClosed> {
        if self.state != SinkState::Open {
            return Err(SinkClosed);
        }
        let tx = self.tx.as_ref().ok_or(SinkClosed)?;
        tx.send(Ok(chunk)).await.map_err(|_| SinkClosed)
    }

    /// Push an error into the outgoing stream, then close it.
    pub async fn fail(&mut self, err: io::Error) {
        if self.state != SinkState::Open {
            return;
        }
        self.state = SinkState::Closing;
        if let Some(tx) = self.tx.as_ref() {
            if tx.send(Err(err)).await.is_err() {
                tracing::debug!("Relay receiver gone before error could be delivered");
            }
        }
        self.close();
    }

    /// Close the outgoing stream. Returns `true` only for the call that closed it.
    pub fn close(&mut self) -> bool {
        if self.state == SinkState::Closed {
            return false;
        }
        self.tx.take();
        self.state = SinkState::Closed;
        true
    }
}

impl Drop for RelaySink {
    fn drop(&mut self) {
        self.close();
    }
}
