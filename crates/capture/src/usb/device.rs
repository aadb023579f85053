//! USB device session
//!
//! Owns the opened device handle and the claimed interface. Acquisition and
//! release are strictly ordered: claim only after open, release before
//! close. Release is idempotent, so the teardown path can always call it.

use common::error::{CaptureError, Result};
use common::types::{DeviceIdentity, EndpointDirection, EndpointInfo, TransferKind};
use rusb::{Context, DeviceHandle, UsbContext};
use std::sync::Arc;
use tracing::{debug, warn};

pub struct DeviceSession {
    handle: Arc<DeviceHandle<Context>>,
    claimed: Option<u8>,
    detached_kernel_driver: bool,
}

impl DeviceSession {
    /// Open the device by vendor/product ID.
    ///
    /// A device that is not on the bus is `DeviceNotFound`; never retried,
    /// the caller decides whether to abort the process.
    pub fn open(context: &Context, identity: DeviceIdentity) -> Result<Self> {
        let handle = context
            .open_device_with_vid_pid(identity.vendor_id, identity.product_id)
            .ok_or(CaptureError::DeviceNotFound {
                vendor_id: identity.vendor_id,
                product_id: identity.product_id,
            })?;

        debug!(device = %identity, "opened device");

        Ok(Self {
            handle: Arc::new(handle),
            claimed: None,
            detached_kernel_driver: false,
        })
    }

    /// Claim an interface, detaching an active kernel driver first.
    pub fn claim(&mut self, interface: u8) -> Result<()> {
        match self.handle.kernel_driver_active(interface) {
            Ok(true) => {
                debug!(interface, "detaching kernel driver");
                if let Err(e) = self.handle.detach_kernel_driver(interface) {
                    warn!(interface, "failed to detach kernel driver: {}", e);
                } else {
                    self.detached_kernel_driver = true;
                }
            }
            Ok(false) => {}
            Err(e) => {
                debug!(interface, "could not check kernel driver status: {}", e);
            }
        }

        self.handle
            .claim_interface(interface)
            .map_err(|e| CaptureError::ClaimFailed {
                interface,
                reason: e.to_string(),
            })?;

        debug!(interface, "claimed interface");
        self.claimed = Some(interface);
        Ok(())
    }

    /// Snapshot the endpoint descriptors of an interface in the active
    /// configuration.
    pub fn endpoints(&self, interface: u8) -> Result<Vec<EndpointInfo>> {
        let device = self.handle.device();
        let config = device
            .active_config_descriptor()
            .map_err(|e| CaptureError::Usb(format!("config descriptor: {}", e)))?;

        let descriptor = config
            .interfaces()
            .flat_map(|interface| interface.descriptors())
            .find(|descriptor| descriptor.interface_number() == interface)
            .ok_or_else(|| CaptureError::Usb(format!("interface {} not present", interface)))?;

        Ok(descriptor
            .endpoint_descriptors()
            .map(|endpoint| EndpointInfo {
                address: endpoint.address(),
                direction: map_direction(endpoint.direction()),
                kind: map_transfer_kind(endpoint.transfer_type()),
                max_packet_size: endpoint.max_packet_size(),
            })
            .collect())
    }

    /// Shared handle for transfer submission.
    pub fn handle(&self) -> Arc<DeviceHandle<Context>> {
        Arc::clone(&self.handle)
    }

    /// Release the claimed interface and reattach the kernel driver.
    /// A no-op when nothing is claimed.
    pub fn release(&mut self) -> Result<()> {
        let Some(interface) = self.claimed.take() else {
            return Ok(());
        };

        self.handle
            .release_interface(interface)
            .map_err(|e| CaptureError::ShutdownStep {
                step: "release interface",
                reason: e.to_string(),
            })?;

        if self.detached_kernel_driver {
            if let Err(e) = self.handle.attach_kernel_driver(interface) {
                debug!(interface, "could not reattach kernel driver: {}", e);
            }
        }

        debug!(interface, "released interface");
        Ok(())
    }

    /// Close the device. The interface must already be released.
    pub fn close(self) {
        debug!("closed device");
    }
}

fn map_direction(direction: rusb::Direction) -> EndpointDirection {
    match direction {
        rusb::Direction::In => EndpointDirection::In,
        rusb::Direction::Out => EndpointDirection::Out,
    }
}

fn map_transfer_kind(kind: rusb::TransferType) -> TransferKind {
    match kind {
        rusb::TransferType::Control => TransferKind::Control,
        rusb::TransferType::Isochronous => TransferKind::Isochronous,
        rusb::TransferType::Bulk => TransferKind::Bulk,
        rusb::TransferType::Interrupt => TransferKind::Interrupt,
    }
}
