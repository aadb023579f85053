//! Wake handshake
//!
//! One bulk OUT transfer of the fixed wake sequence. The device produces no
//! inbound data until it has seen this, so a failure here is fatal and the
//! streaming state is never entered.

use common::error::{CaptureError, Result};
use common::types::WAKE_SEQUENCE;
use rusb::{Context, DeviceHandle};
use std::time::Duration;

/// Timeout for the wake transfer.
const WAKE_TIMEOUT: Duration = Duration::from_secs(5);

/// Send the wake sequence to the device's OUT endpoint. Issued exactly once
/// per run; never retried.
pub fn send_wake(handle: &DeviceHandle<Context>, endpoint: u8) -> Result<()> {
    let written = handle
        .write_bulk(endpoint, &WAKE_SEQUENCE, WAKE_TIMEOUT)
        .map_err(|e| CaptureError::HandshakeFailed {
            reason: e.to_string(),
        })?;

    if written != WAKE_SEQUENCE.len() {
        return Err(CaptureError::HandshakeFailed {
            reason: format!("short write: {} of {} bytes", written, WAKE_SEQUENCE.len()),
        });
    }

    Ok(())
}
