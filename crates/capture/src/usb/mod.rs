//! USB subsystem
//!
//! Everything that talks to hardware. USB operations run in a dedicated
//! thread to avoid blocking the tokio runtime; completed buffers cross back
//! over the channel bridge, commands arrive the same way.

pub mod device;
pub mod handshake;
pub mod reader;
pub mod worker;

pub use device::DeviceSession;
pub use reader::{ReadOutcome, ReadQueue};
pub use worker::{CaptureWorkerThread, spawn_capture_worker};
