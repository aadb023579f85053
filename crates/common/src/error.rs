//! Capture error taxonomy

use crate::types::EndpointDirection;
use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Everything that can abort a capture run.
///
/// Transient read errors never appear here: a timeout or stall on a live
/// stream is logged and the request is resubmitted. Only errors that end the
/// run (or prevent it from starting) get a variant.
#[derive(Debug, Error)]
pub enum CaptureError {
    /// The device is not attached (or not visible to this user).
    #[error("USB device {vendor_id:04x}:{product_id:04x} not found")]
    DeviceNotFound { vendor_id: u16, product_id: u16 },

    /// Claiming the streaming interface failed.
    #[error("failed to claim interface {interface}: {reason}")]
    ClaimFailed { interface: u8, reason: String },

    /// The interface descriptor lacks an endpoint in the named direction.
    /// A static property of the descriptor, so never retried.
    #[error("interface has no {direction} endpoint")]
    MissingEndpoint { direction: EndpointDirection },

    /// The capture file could not be created.
    #[error("could not open capture file {}: {source}", path.display())]
    FileOpen {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The wake transfer was rejected; the device will not stream without it.
    #[error("wake transfer failed: {reason}")]
    HandshakeFailed { reason: String },

    /// The bulk stream is gone for good, e.g. the device was unplugged.
    #[error("bulk stream lost: {reason}")]
    ReadFailed { reason: String },

    /// A data sink write failed. The sinks are the requested persistence
    /// targets, so this ends the run rather than dropping bytes silently.
    #[error("{sink} sink write failed: {source}")]
    SinkWrite {
        sink: &'static str,
        #[source]
        source: io::Error,
    },

    /// One step of the ordered teardown failed. Remaining steps still run,
    /// but the process exits non-zero.
    #[error("shutdown step '{step}' failed: {reason}")]
    ShutdownStep { step: &'static str, reason: String },

    /// USB transport error outside the categories above.
    #[error("USB error: {0}")]
    Usb(String),

    /// Bridge channel failure between the capture thread and the runtime.
    #[error("channel error: {0}")]
    Channel(String),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, CaptureError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_device_not_found_display() {
        let err = CaptureError::DeviceNotFound {
            vendor_id: 0x2ca3,
            product_id: 0x0020,
        };
        let msg = format!("{}", err);
        assert!(msg.contains("2ca3"));
        assert!(msg.contains("0020"));
        assert!(msg.contains("not found"));
    }

    #[test]
    fn test_missing_endpoint_names_direction() {
        let err = CaptureError::MissingEndpoint {
            direction: EndpointDirection::Out,
        };
        assert!(format!("{}", err).contains("OUT"));
    }

    #[test]
    fn test_file_open_includes_path() {
        let err = CaptureError::FileOpen {
            path: PathBuf::from("/tmp/feed.bin"),
            source: io::Error::new(io::ErrorKind::PermissionDenied, "denied"),
        };
        let msg = format!("{}", err);
        assert!(msg.contains("/tmp/feed.bin"));
        assert!(msg.contains("denied"));
    }
}
