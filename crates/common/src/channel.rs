//! Async channel bridge between the tokio runtime and the USB capture thread

use crate::error::{CaptureError, Result};
use async_channel::{Receiver, Sender, bounded};

/// Commands from the runtime to the capture thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureCommand {
    /// Stop streaming: drain outstanding transfers, release the interface,
    /// close the device. Sent at most once per run.
    Stop,
}

/// Events from the capture thread.
#[derive(Debug)]
pub enum CaptureEvent {
    /// The wake sequence was accepted by the device.
    HandshakeSent,
    /// One completed bulk IN transfer, delivered in completion order. May be
    /// shorter than the configured chunk size, including empty.
    Data(Vec<u8>),
    /// The pipeline failed; the capture thread is tearing itself down and
    /// will close its end of the bridge when done.
    Fatal(CaptureError),
}

/// Runtime half of the bridge (async).
#[derive(Clone)]
pub struct CaptureBridge {
    cmd_tx: Sender<CaptureCommand>,
    event_rx: Receiver<CaptureEvent>,
}

impl CaptureBridge {
    /// Send a command to the capture thread.
    pub async fn send_command(&self, cmd: CaptureCommand) -> Result<()> {
        self.cmd_tx
            .send(cmd)
            .await
            .map_err(|e| CaptureError::Channel(e.to_string()))
    }

    /// Receive the next event. An error means the capture thread has dropped
    /// its half, i.e. the device side of the pipeline is fully torn down.
    pub async fn recv_event(&self) -> Result<CaptureEvent> {
        self.event_rx
            .recv()
            .await
            .map_err(|e| CaptureError::Channel(e.to_string()))
    }
}

/// Capture-thread half of the bridge (blocking).
pub struct CaptureWorker {
    cmd_rx: Receiver<CaptureCommand>,
    event_tx: Sender<CaptureEvent>,
}

impl CaptureWorker {
    /// Send an event to the runtime, blocking while the event channel is
    /// full. This block is the pipeline's backpressure: no new reads are
    /// submitted until the consumer frees a slot.
    pub fn send_event(&self, event: CaptureEvent) -> Result<()> {
        self.event_tx
            .send_blocking(event)
            .map_err(|e| CaptureError::Channel(e.to_string()))
    }

    /// Receive a command, blocking until one arrives. Fails once the
    /// runtime half is dropped.
    pub fn recv_command(&self) -> Result<CaptureCommand> {
        self.cmd_rx
            .recv_blocking()
            .map_err(|e| CaptureError::Channel(e.to_string()))
    }

    /// Check for a pending command without blocking.
    pub fn try_recv_command(&self) -> Option<CaptureCommand> {
        self.cmd_rx.try_recv().ok()
    }
}

/// Create the bridge. `depth` bounds the event channel; together with the
/// transfer pool's own depth this caps buffered-but-unwritten data at
/// `2 * depth` chunks.
pub fn create_capture_bridge(depth: usize) -> (CaptureBridge, CaptureWorker) {
    let (cmd_tx, cmd_rx) = bounded(depth.max(1));
    let (event_tx, event_rx) = bounded(depth.max(1));

    (
        CaptureBridge { cmd_tx, event_rx },
        CaptureWorker { cmd_rx, event_tx },
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_channel_bridge() {
        let (bridge, worker) = create_capture_bridge(3);
        bridge.send_command(CaptureCommand::Stop).await.unwrap();

        // Simulate the capture thread delivering one chunk, then noticing
        // the stop command.
        let handle = std::thread::spawn(move || {
            worker
                .send_event(CaptureEvent::Data(vec![0xAA; 16]))
                .unwrap();
            worker.try_recv_command()
        });

        match bridge.recv_event().await.unwrap() {
            CaptureEvent::Data(data) => assert_eq!(data.len(), 16),
            other => panic!("unexpected event: {:?}", other),
        }

        assert_eq!(handle.join().unwrap(), Some(CaptureCommand::Stop));
    }

    #[tokio::test]
    async fn test_recv_fails_after_worker_drops() {
        let (bridge, worker) = create_capture_bridge(1);
        drop(worker);
        assert!(bridge.recv_event().await.is_err());
    }
}
