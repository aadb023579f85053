//! Queued bulk IN reader
//!
//! Keeps a fixed number of read requests pending against the IN endpoint and
//! hands back completions in arrival order. The pending transfers bound
//! unread data in flight to `depth * chunk_size`: no new request is
//! submitted until a slot frees.

use common::error::{CaptureError, Result};
use rusb::{Context, DeviceHandle};
use rusb_async::TransferPool;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::debug;

/// Fixed per-request poll timeout. Intermittent timeouts are expected device
/// behavior, not failures.
const READ_TIMEOUT: Duration = Duration::from_millis(100);

/// Upper bound on waiting for cancelled transfers during drain.
const DRAIN_DEADLINE: Duration = Duration::from_secs(1);

/// Outcome of one poll of the queue.
#[derive(Debug)]
pub enum ReadOutcome {
    /// A transfer completed. The payload may be shorter than the requested
    /// chunk size, including empty.
    Data(Vec<u8>),
    /// Nothing completed within the poll timeout; the transfers are still
    /// pending.
    Idle,
    /// A transfer failed in a way the stream survives. Its slot is gone and
    /// the next `fill` resubmits it.
    Transient(rusb_async::Error),
    /// The device is gone; the stream cannot recover.
    Disconnected,
}

/// A fixed-depth queue of in-flight bulk IN requests.
pub struct ReadQueue {
    pool: TransferPool<Context>,
    endpoint: u8,
    depth: usize,
    chunk_size: usize,
}

impl ReadQueue {
    pub fn new(
        handle: Arc<DeviceHandle<Context>>,
        endpoint: u8,
        depth: usize,
        chunk_size: usize,
    ) -> Result<Self> {
        let pool = TransferPool::new(handle)
            .map_err(|e| CaptureError::Usb(format!("transfer pool: {}", e)))?;

        Ok(Self {
            pool,
            endpoint,
            depth,
            chunk_size,
        })
    }

    /// Top the pool up to `depth` pending requests. Called before every
    /// poll, so completed and failed slots alike are resubmitted.
    pub fn fill(&mut self) -> Result<()> {
        while self.pool.pending() < self.depth {
            self.pool
                .submit_bulk(self.endpoint, Vec::with_capacity(self.chunk_size))
                .map_err(|e| CaptureError::ReadFailed {
                    reason: format!("submit: {}", e),
                })?;
        }
        Ok(())
    }

    /// Wait for the next completion.
    pub fn poll(&mut self) -> ReadOutcome {
        match self.pool.poll(READ_TIMEOUT) {
            Ok(data) => ReadOutcome::Data(data),
            Err(rusb_async::Error::PollTimeout) => ReadOutcome::Idle,
            Err(rusb_async::Error::Disconnected) => ReadOutcome::Disconnected,
            Err(err) => ReadOutcome::Transient(err),
        }
    }

    /// Number of requests currently outstanding.
    pub fn outstanding(&self) -> usize {
        self.pool.pending()
    }

    /// Cancel all pending requests and wait for each to complete or
    /// acknowledge the cancellation. Data completing during the drain is
    /// discarded; nothing is delivered once the drain has begun.
    pub fn drain(mut self) -> Result<()> {
        self.pool.cancel_all();

        let deadline = Instant::now() + DRAIN_DEADLINE;
        while self.pool.pending() > 0 {
            if Instant::now() >= deadline {
                return Err(CaptureError::ShutdownStep {
                    step: "drain reads",
                    reason: format!("{} transfers still pending", self.pool.pending()),
                });
            }
            match self.pool.poll(READ_TIMEOUT) {
                Ok(data) => debug!("discarding {} bytes completed during drain", data.len()),
                Err(rusb_async::Error::PollTimeout) => {}
                Err(err) => debug!("transfer settled during drain: {}", err),
            }
        }

        Ok(())
    }
}
