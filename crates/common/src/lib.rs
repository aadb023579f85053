//! Shared core for the fpv-capture tool
//!
//! This crate holds everything that does not touch hardware: the error
//! taxonomy, device and endpoint descriptions, endpoint role discovery, the
//! sink fan-out, and the async channel bridge between the USB capture thread
//! and the tokio runtime.

pub mod channel;
pub mod endpoints;
pub mod error;
pub mod logging;
pub mod sink;
pub mod types;

pub use channel::{
    CaptureBridge, CaptureCommand, CaptureEvent, CaptureWorker, create_capture_bridge,
};
pub use error::{CaptureError, Result};
pub use logging::setup_logging;
