use hidapi::{HidApi, HidDevice};
use log::{info, trace, warn};
use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crate::devices::{RAZER_DEATHADDER_V3_PRO_WIRED, RAZER_DEATHADDER_V3_PRO_WIRELESS, RAZER_VENDOR_ID};
use crate::error::HardwareError;
use crate::product_id::{ProductId, RawProductId};

const MAX_TRIES_SEND: u8 = 10;
const TIME_BETWEEN_SEND: Duration = Duration::from_millis(500);
const CONTROL_INTERFACE: i32 = 0;

/// (usage page, usage) pairs of the collections that accept feature
/// reports. Windows lists every top-level collection of interface 0 as its
/// own device; the others reject the control report.
const CONTROL_USAGES: [(u16, u16); 3] = [
    (0x01, 0x02), // generic desktop, mouse
    (0x01, 0x06), // generic desktop, keyboard
    (0x0C, 0x01), // consumer control
];

fn is_control_collection(usage_page: u16, usage: u16) -> bool {
    CONTROL_USAGES.contains(&(usage_page, usage))
}

/// A device as seen by the hardware layer during one enumeration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveredDevice {
    pub internal_device_id: u32,
    pub product_id: RawProductId,
}

/// Access to attached hardware. Calls block; the manager moves them off
/// the async executor where it matters.
pub trait HardwareLayer: Send + Sync {
    /// Snapshot of the currently attached devices. Opens a handle for each.
    fn get_all_devices(&self) -> Result<Vec<DiscoveredDevice>, HardwareError>;

    /// Releases every open handle. Calling it with nothing open is a no-op.
    fn close_all_devices(&self) -> Result<(), HardwareError>;

    /// One request/response exchange with an open device.
    fn send_command(&self, internal_id: u32, command: &Command) -> Result<RazerReport, HardwareError>;
}

/// Request half of a razer report, without transport details.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Command {
    pub command_class: u8,
    pub command_id: u8,
    pub data_size: u8,
    pub arguments: [u8; 80],
}

impl Command {
    pub const fn new(command_class: u8, command_id: u8, data_size: u8) -> Self {
        Self {
            command_class,
            command_id,
            data_size,
            arguments: [0; 80],
        }
    }

    pub fn with_arguments(mut self, arguments: &[u8]) -> Self {
        let len = arguments.len().min(self.arguments.len());
        self.arguments[..len].copy_from_slice(&arguments[..len]);
        self
    }

    pub const fn firmware_version() -> Self {
        Self::new(0x00, 0x81, 0x02)
    }

    pub const fn battery_level() -> Self {
        Self::new(0x07, 0x80, 0x02)
    }

    pub const fn charging_status() -> Self {
        Self::new(0x07, 0x84, 0x02)
    }

    /// DPI from the variable store.
    pub fn dpi() -> Self {
        Self::new(0x04, 0x85, 0x07).with_arguments(&[0x01])
    }

    /// Backlight brightness from the variable store.
    pub fn brightness() -> Self {
        Self::new(0x0F, 0x84, 0x03).with_arguments(&[0x01, 0x05])
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RazerReport {
    pub status: u8,
    pub transaction_id: u8,
    pub remaining_packets: u16,
    pub protocol_type: u8,
    pub data_size: u8,
    pub command_class: u8,
    pub command_id: u8,
    pub arguments: [u8; 80],
    pub crc: u8,
    pub reserved: u8,
}

impl RazerReport {
    pub const STATUS_NEW_COMMAND: u8 = 0x00;
    pub const STATUS_BUSY: u8 = 0x01;
    pub const STATUS_SUCCESSFUL: u8 = 0x02;
    pub const STATUS_FAILURE: u8 = 0x03;
    pub const STATUS_NO_RESPONSE: u8 = 0x04;
    pub const STATUS_NOT_SUPPORTED: u8 = 0x05;

    pub const LENGTH: usize = 90;

    pub fn new() -> Self {
        RazerReport {
            status: 0,
            transaction_id: 0,
            remaining_packets: 0,
            protocol_type: 0,
            data_size: 0,
            command_class: 0,
            command_id: 0,
            arguments: [0; 80],
            crc: 0,
            reserved: 0,
        }
    }

    pub fn request(command: &Command, transaction_id: u8) -> Self {
        let mut report = RazerReport::new();
        report.status = RazerReport::STATUS_NEW_COMMAND;
        report.transaction_id = transaction_id;
        report.command_class = command.command_class;
        report.command_id = command.command_id;
        report.data_size = command.data_size;
        report.arguments = command.arguments;
        report.crc = report.calculate_crc();
        report
    }

    pub fn from_bytes(data: &[u8]) -> Result<Self, HardwareError> {
        if data.len() != Self::LENGTH {
            return Err(HardwareError::ReportLength(data.len()));
        }

        let mut report = RazerReport::new();
        report.status = data[0];
        report.transaction_id = data[1];
        report.remaining_packets = u16::from_be_bytes([data[2], data[3]]);
        report.protocol_type = data[4];
        report.data_size = data[5];
        report.command_class = data[6];
        report.command_id = data[7];
        report.arguments.copy_from_slice(&data[8..88]);
        report.crc = data[88];
        report.reserved = data[89];

        Ok(report)
    }

    pub fn pack(&self) -> Vec<u8> {
        let mut data = vec![
            self.status,
            self.transaction_id,
            (self.remaining_packets >> 8) as u8,
            (self.remaining_packets & 0xFF) as u8,
            self.protocol_type,
            self.data_size,
            self.command_class,
            self.command_id,
        ];
        data.extend_from_slice(&self.arguments);
        data.push(self.crc);
        data.push(self.reserved);
        data
    }

    pub fn calculate_crc(&self) -> u8 {
        let data = self.pack();
        data[2..88].iter().fold(0, |crc, &byte| crc ^ byte)
    }

    pub fn is_valid(&self) -> bool {
        self.calculate_crc() == self.crc
    }

    pub fn matches(&self, request: &RazerReport) -> bool {
        self.remaining_packets == request.remaining_packets
            && self.command_class == request.command_class
            && self.command_id == request.command_id
    }
}

impl Default for RazerReport {
    fn default() -> Self {
        Self::new()
    }
}

pub fn transaction_id(product_id: ProductId) -> u8 {
    match product_id {
        RAZER_DEATHADDER_V3_PRO_WIRED | RAZER_DEATHADDER_V3_PRO_WIRELESS => 0x1F,
        _ => 0x3F,
    }
}

#[derive(Debug)]
pub struct DeviceController {
    pub handle: Mutex<HidDevice>,
    pub internal_id: u32,
    pub pid: u16,
    pub report_id: u8,
    pub transaction_id: u8,
}

impl DeviceController {
    pub fn new(handle: HidDevice, internal_id: u32, pid: u16) -> Self {
        DeviceController {
            handle: Mutex::new(handle),
            internal_id,
            pid,
            report_id: 0x00,
            transaction_id: transaction_id(ProductId(pid)),
        }
    }

    pub fn send_payload(&self, request: RazerReport) -> Result<RazerReport, HardwareError> {
        let handle = self.handle.lock();

        for _ in 0..MAX_TRIES_SEND {
            self.usb_send(&handle, &request)?;
            let response = self.usb_receive(&handle)?;

            if !response.matches(&request) {
                return Err(HardwareError::Mismatch);
            }

            match response.status {
                RazerReport::STATUS_SUCCESSFUL => return Ok(response),
                RazerReport::STATUS_BUSY => info!("Device is busy"),
                RazerReport::STATUS_NO_RESPONSE => info!("Command timed out"),
                RazerReport::STATUS_NOT_SUPPORTED => return Err(HardwareError::NotSupported),
                RazerReport::STATUS_FAILURE => return Err(HardwareError::Failed),
                status => return Err(HardwareError::UnknownStatus(status)),
            }

            thread::sleep(TIME_BETWEEN_SEND);
            warn!("Trying to resend command");
        }

        Err(HardwareError::RetriesExhausted(MAX_TRIES_SEND))
    }

    fn usb_send(&self, handle: &HidDevice, report: &RazerReport) -> Result<(), HardwareError> {
        let mut data = vec![self.report_id];
        data.extend_from_slice(&report.pack());
        trace!(
            "-> {:#06x} class={:#04x} id={:#04x}",
            self.pid,
            report.command_class,
            report.command_id
        );
        handle.send_feature_report(&data)?;
        thread::sleep(Duration::from_millis(60));
        Ok(())
    }

    fn usb_receive(&self, handle: &HidDevice) -> Result<RazerReport, HardwareError> {
        let expected_length = RazerReport::LENGTH + 1;
        let mut buf = vec![0u8; expected_length];
        buf[0] = self.report_id;
        let bytes_read = handle.get_feature_report(&mut buf)?;

        if bytes_read != expected_length {
            return Err(HardwareError::ReportLength(bytes_read.saturating_sub(1)));
        }

        let report = RazerReport::from_bytes(&buf[1..])?;
        if !report.is_valid() {
            return Err(HardwareError::InvalidCrc);
        }

        trace!("<- {:#06x} status={:#04x}", self.pid, report.status);
        Ok(report)
    }
}

struct HidState {
    api: HidApi,
    controllers: Vec<Arc<DeviceController>>,
    next_id: u32,
}

/// hidapi backed hardware layer for Razer USB devices.
pub struct HidHardware {
    state: Mutex<HidState>,
}

impl HidHardware {
    pub fn new() -> Result<Self, HardwareError> {
        Ok(Self {
            state: Mutex::new(HidState {
                api: HidApi::new()?,
                controllers: Vec::new(),
                next_id: 1,
            }),
        })
    }

    fn controller(&self, internal_id: u32) -> Result<Arc<DeviceController>, HardwareError> {
        self.state
            .lock()
            .controllers
            .iter()
            .find(|controller| controller.internal_id == internal_id)
            .cloned()
            .ok_or(HardwareError::UnknownDevice(internal_id))
    }
}

impl HardwareLayer for HidHardware {
    fn get_all_devices(&self) -> Result<Vec<DiscoveredDevice>, HardwareError> {
        let mut guard = self.state.lock();
        let state = &mut *guard;
        state.api.refresh_devices()?;

        let mut controllers = Vec::new();
        let mut added_devices = HashSet::new();

        for hid_device in state.api.device_list() {
            if hid_device.vendor_id() != RAZER_VENDOR_ID
                || hid_device.interface_number() != CONTROL_INTERFACE
            {
                continue;
            }

            if cfg!(target_os = "windows")
                && !is_control_collection(hid_device.usage_page(), hid_device.usage())
            {
                continue;
            }

            // Only add the device if it hasn't been added yet
            if added_devices.contains(&hid_device.product_id()) {
                continue;
            }

            match state.api.open_path(hid_device.path()) {
                Ok(handle) => {
                    let controller =
                        DeviceController::new(handle, state.next_id, hid_device.product_id());
                    state.next_id = state.next_id.wrapping_add(1);
                    added_devices.insert(hid_device.product_id());
                    controllers.push(Arc::new(controller));
                }
                Err(err) => warn!(
                    "Failed to open device {:#06x}: {:?}",
                    hid_device.product_id(),
                    err
                ),
            }
        }

        let discovered = controllers
            .iter()
            .map(|controller| DiscoveredDevice {
                internal_device_id: controller.internal_id,
                product_id: RawProductId::from(controller.pid),
            })
            .collect();

        state.controllers = controllers;
        Ok(discovered)
    }

    fn close_all_devices(&self) -> Result<(), HardwareError> {
        let mut state = self.state.lock();
        if !state.controllers.is_empty() {
            info!("Closing {} device handle(s)", state.controllers.len());
            state.controllers.clear();
        }
        Ok(())
    }

    fn send_command(&self, internal_id: u32, command: &Command) -> Result<RazerReport, HardwareError> {
        let controller = self.controller(internal_id)?;
        let request = RazerReport::request(command, controller.transaction_id);
        controller.send_payload(request)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_control_collection_filter() {
        assert!(is_control_collection(0x01, 0x02));
        assert!(is_control_collection(0x01, 0x06));
        assert!(is_control_collection(0x0C, 0x01));
        assert!(!is_control_collection(0x01, 0x80));
        assert!(!is_control_collection(0xFF00, 0x01));
    }

    #[test]
    fn test_request_carries_valid_crc() {
        let request = RazerReport::request(&Command::dpi(), 0x3F);
        assert!(request.is_valid());
        assert_eq!(request.pack().len(), RazerReport::LENGTH);
        assert_eq!(request.arguments[0], 0x01);

        let mut corrupted = request;
        corrupted.arguments[3] ^= 0xFF;
        assert!(!corrupted.is_valid());
    }

    #[test]
    fn test_from_bytes_rejects_short_report() {
        assert!(matches!(
            RazerReport::from_bytes(&[0u8; 12]),
            Err(HardwareError::ReportLength(12))
        ));
    }

    #[test]
    fn test_from_bytes_reads_fields() {
        let mut request = RazerReport::request(&Command::battery_level(), 0x1F);
        request.remaining_packets = 0x0102;
        let parsed = RazerReport::from_bytes(&request.pack()).unwrap();

        assert_eq!(parsed.remaining_packets, 0x0102);
        assert_eq!(parsed.command_class, 0x07);
        assert_eq!(parsed.command_id, 0x80);
        assert!(parsed.matches(&request));
    }

    #[test]
    fn test_transaction_id_per_product() {
        assert_eq!(transaction_id(RAZER_DEATHADDER_V3_PRO_WIRELESS), 0x1F);
        assert_eq!(transaction_id(ProductId(0x0099)), 0x3F);
    }
}
