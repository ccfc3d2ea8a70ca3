//! Raw USB probing
//!
//! libgphoto2 can open a camera even while another process holds its data
//! interface on some platforms, so ownership is probed one level down by
//! trying to claim interface 0 ourselves.

use super::ClaimDetector;
use crate::types::DeviceCandidate;

const DATA_INTERFACE: u8 = 0;

/// Claim probe backed by `nusb`
#[derive(Debug, Default, Clone, Copy)]
pub struct UsbClaimDetector;

impl ClaimDetector for UsbClaimDetector {
    fn is_claimed(&self, candidate: &DeviceCandidate) -> bool {
        let info = match find_device(candidate.bus, candidate.address) {
            Some(info) => info,
            None => {
                log::debug!(
                    "Device {} not on the USB list, treating as unclaimed",
                    candidate.port
                );
                return false;
            }
        };

        // Device and Interface release on drop, so every return below leaves
        // nothing claimed.
        let device = match info.open() {
            Ok(device) => device,
            Err(e) => {
                log::debug!("Cannot open {} for claim probe: {}", candidate.port, e);
                return true;
            }
        };

        match device.claim_interface(DATA_INTERFACE) {
            Ok(_interface) => false,
            Err(e) => {
                log::debug!("Device on {} is already claimed: {}", candidate.port, e);
                true
            }
        }
    }
}

/// Whether a device with this bus/address pair is currently attached
pub fn device_present(bus: u8, address: u8) -> bool {
    find_device(bus, address).is_some()
}

fn find_device(bus: u8, address: u8) -> Option<nusb::DeviceInfo> {
    match nusb::list_devices() {
        Ok(mut devices) => devices.find(|d| d.bus_number() == bus && d.device_address() == address),
        Err(e) => {
            log::warn!("Failed to list USB devices: {}", e);
            None
        }
    }
}
