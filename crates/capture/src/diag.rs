//! One-shot diagnostic modes
//!
//! Bring-up tooling: list the device's interfaces and endpoints, or probe a
//! range of interfaces to find the one carrying the stream. Neither mode is
//! part of the steady-state pipeline; both reuse its session and reader.

use crate::usb::device::DeviceSession;
use crate::usb::handshake::send_wake;
use crate::usb::reader::{ReadOutcome, ReadQueue};
use anyhow::{Context as _, Result};
use common::endpoints;
use common::types::{CaptureConfig, DeviceIdentity};
use rusb::Context;
use std::ops::RangeInclusive;
use std::time::{Duration, Instant};

/// Interface range the probe walks; these goggles put their bulk interfaces
/// here.
const PROBE_INTERFACES: RangeInclusive<u8> = 3..=7;

/// How long the probe listens on each interface.
const PROBE_DURATION: Duration = Duration::from_secs(3);

/// Print every interface's class triple and endpoint descriptors.
pub fn list_interfaces(identity: DeviceIdentity) -> Result<()> {
    let context = Context::new().context("Failed to initialize libusb")?;
    let session = DeviceSession::open(&context, identity)?;

    let device = session.handle().device();
    let config = device
        .active_config_descriptor()
        .context("Failed to read config descriptor")?;

    for interface in config.interfaces() {
        for descriptor in interface.descriptors() {
            println!("Interface {}:", descriptor.interface_number());
            println!("  Class: {:#04x}", descriptor.class_code());
            println!("  Subclass: {:#04x}", descriptor.sub_class_code());
            println!("  Protocol: {:#04x}", descriptor.protocol_code());

            for (index, endpoint) in descriptor.endpoint_descriptors().enumerate() {
                println!(
                    "    EP {} | Address {:#04x} | Direction: {:?} | Type: {:?}",
                    index,
                    endpoint.address(),
                    endpoint.direction(),
                    endpoint.transfer_type()
                );
            }
        }
    }

    session.close();
    Ok(())
}

/// Claim each interface in the probe range, send the wake sequence, and
/// count what arrives for a few seconds. The interface with traffic is the
/// one to capture from.
pub fn probe_interfaces(identity: DeviceIdentity, config: CaptureConfig) -> Result<()> {
    let context = Context::new().context("Failed to initialize libusb")?;
    let mut session = DeviceSession::open(&context, identity)?;
    let mut results = Vec::new();

    for interface in PROBE_INTERFACES {
        println!("\nTesting interface {}...", interface);
        match probe_one(&mut session, interface, config) {
            Ok(bytes) => {
                println!("  Received {} bytes", bytes);
                results.push((interface, bytes));
            }
            Err(err) => {
                println!("  Skipped: {}", err);
                results.push((interface, 0));
            }
        }
    }

    session.close();

    println!("\n===== RESULTS =====");
    for (interface, bytes) in results {
        println!("Interface {}: {} bytes", interface, bytes);
    }

    Ok(())
}

fn probe_one(
    session: &mut DeviceSession,
    interface: u8,
    config: CaptureConfig,
) -> common::Result<u64> {
    session.claim(interface)?;

    let outcome = (|| -> common::Result<u64> {
        let pair = endpoints::resolve(&session.endpoints(interface)?)?;
        send_wake(&session.handle(), pair.output.address)?;

        let mut reader = ReadQueue::new(
            session.handle(),
            pair.input.address,
            config.queue_depth.get(),
            config.chunk_size.get(),
        )?;

        let mut total = 0u64;
        let deadline = Instant::now() + PROBE_DURATION;
        while Instant::now() < deadline {
            reader.fill()?;
            if let ReadOutcome::Data(data) = reader.poll() {
                total += data.len() as u64;
            }
        }
        reader.drain()?;

        Ok(total)
    })();

    let released = session.release();
    let total = outcome?;
    released?;
    Ok(total)
}
