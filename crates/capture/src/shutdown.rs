//! Shutdown coordination
//!
//! Single owner of teardown sequencing. Termination signals and fatal errors
//! all funnel into `trigger`; however many times it fires, the capture
//! thread sees exactly one stop command and the teardown runs exactly once.

use common::channel::{CaptureBridge, CaptureCommand};
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::info;

pub struct ShutdownCoordinator {
    bridge: CaptureBridge,
    triggered: AtomicBool,
}

impl ShutdownCoordinator {
    pub fn new(bridge: CaptureBridge) -> Self {
        Self {
            bridge,
            triggered: AtomicBool::new(false),
        }
    }

    /// Request shutdown. The first call sends the stop command; later calls
    /// are no-ops. A send failure means the capture thread is already gone,
    /// which is the state shutdown is driving toward anyway.
    pub async fn trigger(&self) {
        if self.triggered.swap(true, Ordering::SeqCst) {
            return;
        }

        info!("shutting down");
        let _ = self.bridge.send_command(CaptureCommand::Stop).await;
    }

    /// Whether shutdown has been requested.
    pub fn is_triggered(&self) -> bool {
        self.triggered.load(Ordering::SeqCst)
    }
}
