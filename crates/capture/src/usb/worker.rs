//! Capture worker thread
//!
//! Dedicated thread owning all USB state. It acquires the device, sends the
//! wake sequence, runs the streaming loop, and on the way out performs the
//! ordered teardown: drain outstanding reads, release the interface, close
//! the device. Dropping its half of the bridge is the signal to the runtime
//! that the device side is fully closed.

use crate::usb::device::DeviceSession;
use crate::usb::handshake::send_wake;
use crate::usb::reader::{ReadOutcome, ReadQueue};
use common::channel::{CaptureCommand, CaptureEvent, CaptureWorker};
use common::endpoints;
use common::error::{CaptureError, Result};
use common::types::{CaptureConfig, DeviceIdentity, PipelineState};
use rusb::Context;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Backoff after a transient read error, so a failing endpoint does not spin
/// the thread hot.
const TRANSIENT_BACKOFF: Duration = Duration::from_millis(100);

pub struct CaptureWorkerThread {
    link: CaptureWorker,
    identity: DeviceIdentity,
    interface: u8,
    config: CaptureConfig,
    state: PipelineState,
    session: Option<DeviceSession>,
    reader: Option<ReadQueue>,
}

impl CaptureWorkerThread {
    pub fn new(
        link: CaptureWorker,
        identity: DeviceIdentity,
        interface: u8,
        config: CaptureConfig,
    ) -> Self {
        Self {
            link,
            identity,
            interface,
            config,
            state: PipelineState::Idle,
            session: None,
            reader: None,
        }
    }

    /// Run the capture pipeline, then the ordered teardown.
    ///
    /// Pipeline failures are reported over the bridge; the returned error
    /// covers the teardown steps only.
    pub fn run(mut self) -> Result<()> {
        info!("capture thread started");

        if let Err(err) = self.capture() {
            error!("capture pipeline failed: {}", err);
            let _ = self.link.send_event(CaptureEvent::Fatal(err));
        }

        let result = self.teardown();
        info!("capture thread stopped");
        result
    }

    /// Acquire the device, then hand the session to the streaming stage.
    /// The session is stored before any error can escape, so teardown always
    /// sees whatever was acquired.
    fn capture(&mut self) -> Result<()> {
        let context =
            Context::new().map_err(|e| CaptureError::Usb(format!("context: {}", e)))?;

        let mut session = DeviceSession::open(&context, self.identity)?;
        let streamed = self.stream_session(&mut session);
        self.session = Some(session);
        streamed
    }

    /// Claim, resolve, wake, stream.
    fn stream_session(&mut self, session: &mut DeviceSession) -> Result<()> {
        session.claim(self.interface)?;

        let pair = endpoints::resolve(&session.endpoints(self.interface)?)?;
        debug!(
            "resolved endpoints: in {:#04x}, out {:#04x}",
            pair.input.address, pair.output.address
        );

        self.transition(PipelineState::Handshaking);
        send_wake(&session.handle(), pair.output.address)?;
        self.link.send_event(CaptureEvent::HandshakeSent)?;

        let mut reader = ReadQueue::new(
            session.handle(),
            pair.input.address,
            self.config.queue_depth.get(),
            self.config.chunk_size.get(),
        )?;

        self.transition(PipelineState::Streaming);
        let result = Self::stream(&self.link, &mut reader);
        self.reader = Some(reader);
        result
    }

    /// The streaming loop: keep the queue full, deliver completions in
    /// arrival order, stop on command or fatal error.
    fn stream(link: &CaptureWorker, reader: &mut ReadQueue) -> Result<()> {
        loop {
            reader.fill()?;

            if let Some(CaptureCommand::Stop) = link.try_recv_command() {
                info!("stop requested, {} reads outstanding", reader.outstanding());
                return Ok(());
            }

            match reader.poll() {
                ReadOutcome::Data(data) => {
                    if link.send_event(CaptureEvent::Data(data)).is_err() {
                        // The runtime went away; treat it like a stop.
                        return Ok(());
                    }
                }
                ReadOutcome::Idle => {}
                ReadOutcome::Transient(err) => {
                    warn!("transient read error: {}", err);
                    std::thread::sleep(TRANSIENT_BACKOFF);
                }
                ReadOutcome::Disconnected => {
                    return Err(CaptureError::ReadFailed {
                        reason: "device disconnected".into(),
                    });
                }
            }
        }
    }

    /// Ordered teardown: drain reads, release the interface, close the
    /// device. Every step runs even if an earlier one failed; the first
    /// failure is what gets reported.
    fn teardown(&mut self) -> Result<()> {
        self.transition(PipelineState::Draining);
        let mut first_failure = None;

        if let Some(reader) = self.reader.take() {
            if let Err(err) = reader.drain() {
                warn!("{}", err);
                first_failure.get_or_insert(err);
            }
        }

        if let Some(mut session) = self.session.take() {
            if let Err(err) = session.release() {
                warn!("{}", err);
                first_failure.get_or_insert(err);
            }
            session.close();
        }

        self.transition(PipelineState::Closed);
        match first_failure {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    /// Move the pipeline forward. Transitions never go backwards; fatal
    /// paths jump ahead to `Draining`.
    fn transition(&mut self, next: PipelineState) {
        debug_assert!(next > self.state, "pipeline may only move forward");
        debug!(from = ?self.state, to = ?next, "pipeline state");
        self.state = next;
    }
}

/// Spawn the capture thread.
pub fn spawn_capture_worker(
    link: CaptureWorker,
    identity: DeviceIdentity,
    interface: u8,
    config: CaptureConfig,
) -> std::thread::JoinHandle<Result<()>> {
    std::thread::Builder::new()
        .name("usb-capture".to_string())
        .spawn(move || CaptureWorkerThread::new(link, identity, interface, config).run())
        .expect("Failed to spawn capture thread")
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::channel::create_capture_bridge;

    #[tokio::test]
    async fn test_missing_device_reports_fatal_then_closes() {
        let (bridge, link) = create_capture_bridge(3);
        let bogus = DeviceIdentity {
            vendor_id: 0xdead,
            product_id: 0xbeef,
        };
        let worker = spawn_capture_worker(link, bogus, 3, CaptureConfig::default());

        match bridge.recv_event().await {
            Ok(CaptureEvent::Fatal(CaptureError::DeviceNotFound { .. })) => {}
            Ok(CaptureEvent::Fatal(CaptureError::Usb(_))) => {
                // No usable libusb context in this environment.
            }
            other => panic!("expected a fatal setup error, got {:?}", other),
        }

        // After the fatal, the thread finishes its teardown and drops its
        // half of the bridge.
        assert!(bridge.recv_event().await.is_err());
        assert!(worker.join().unwrap().is_ok());
    }
}
