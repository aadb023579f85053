//! Data fan-out loop
//!
//! Single consumer of the capture thread's events. Buffers are dispatched to
//! the sinks one at a time, in completion order, so sink writes never
//! overlap. A sink failure escalates to the shutdown coordinator instead of
//! dropping bytes silently. The loop ends when the capture thread closes its
//! half of the bridge, which it only does once the device side of the
//! teardown is complete.

use crate::shutdown::ShutdownCoordinator;
use common::channel::{CaptureBridge, CaptureEvent};
use common::error::CaptureError;
use common::sink::SinkSet;
use tracing::error;

/// Pump events until the bridge closes. Returns the first fatal error, from
/// either the capture thread or a sink write.
pub async fn pump_events(
    bridge: &CaptureBridge,
    sinks: &mut SinkSet,
    shutdown: &ShutdownCoordinator,
) -> Option<CaptureError> {
    let mut fatal = None;

    while let Ok(event) = bridge.recv_event().await {
        match event {
            CaptureEvent::HandshakeSent => sinks.note_handshake(),
            CaptureEvent::Data(buffer) => {
                if fatal.is_some() {
                    // Already failed; swallow remaining in-flight buffers so
                    // the capture thread can finish draining.
                    continue;
                }
                if let Err(err) = sinks.dispatch(&buffer) {
                    error!("{}", err);
                    fatal = Some(err);
                    shutdown.trigger().await;
                }
            }
            CaptureEvent::Fatal(err) => {
                error!("{}", err);
                if fatal.is_none() {
                    fatal = Some(err);
                }
                shutdown.trigger().await;
            }
        }
    }

    fatal
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::channel::{CaptureCommand, create_capture_bridge};
    use common::sink::SinkConfig;
    use std::fs;

    #[tokio::test]
    async fn test_buffers_reach_file_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("feed.bin");
        let mut sinks = SinkSet::open(&SinkConfig {
            file: Some(path.clone()),
            ..Default::default()
        })
        .unwrap();

        let (bridge, worker) = create_capture_bridge(4);
        let shutdown = ShutdownCoordinator::new(bridge.clone());

        let feeder = std::thread::spawn(move || {
            worker.send_event(CaptureEvent::HandshakeSent).unwrap();
            for chunk in [vec![1u8; 512], vec![2u8; 300], Vec::new(), vec![3u8; 512]] {
                worker.send_event(CaptureEvent::Data(chunk)).unwrap();
            }
        });

        let fatal = pump_events(&bridge, &mut sinks, &shutdown).await;
        feeder.join().unwrap();

        assert!(fatal.is_none());
        assert!(!shutdown.is_triggered());
        assert_eq!(sinks.chunks(), 4);
        assert_eq!(sinks.bytes(), 1324);
        sinks.finish().unwrap();
        assert_eq!(fs::read(&path).unwrap().len(), 1324);
    }

    #[tokio::test]
    async fn test_worker_fatal_is_returned_and_triggers_stop() {
        let mut sinks = SinkSet::open(&SinkConfig::default()).unwrap();
        let (bridge, worker) = create_capture_bridge(4);
        let shutdown = ShutdownCoordinator::new(bridge.clone());

        let feeder = std::thread::spawn(move || {
            worker
                .send_event(CaptureEvent::Fatal(CaptureError::HandshakeFailed {
                    reason: "endpoint rejected the transfer".into(),
                }))
                .unwrap();
            // A real capture thread drains and closes after a fatal; here we
            // just wait for the stop the coordinator sends back.
            worker.recv_command()
        });

        let fatal = pump_events(&bridge, &mut sinks, &shutdown).await;
        assert!(matches!(fatal, Some(CaptureError::HandshakeFailed { .. })));
        assert!(shutdown.is_triggered());
        assert_eq!(feeder.join().unwrap().unwrap(), CaptureCommand::Stop);
    }

    #[tokio::test]
    async fn test_no_sink_activity_after_bridge_closes() {
        let mut sinks = SinkSet::open(&SinkConfig::default()).unwrap();
        let (bridge, worker) = create_capture_bridge(2);
        let shutdown = ShutdownCoordinator::new(bridge.clone());

        drop(worker);
        let fatal = pump_events(&bridge, &mut sinks, &shutdown).await;

        assert!(fatal.is_none());
        assert_eq!(sinks.chunks(), 0);
    }
}
