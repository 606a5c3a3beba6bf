//! Scripted hardware layer shared by the unit tests.

use parking_lot::{Condvar, Mutex};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use crate::controller::{Command, DiscoveredDevice, HardwareLayer, RazerReport};
use crate::devices::{DeviceProfile, MainType};
use crate::error::HardwareError;
use crate::product_id::{ProductId, RawProductId};

pub fn profile(name: &str, product_id: u16, main_type: MainType) -> DeviceProfile {
    DeviceProfile {
        name: name.to_owned(),
        product_id: ProductId(product_id),
        main_type,
        features: None,
        features_missing: None,
        features_config: None,
        image: None,
    }
}

/// How long a held device waits before giving up.
const HOLD_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Default)]
pub struct FakeHardware {
    devices: Mutex<Vec<DiscoveredDevice>>,
    failing: Mutex<HashSet<u32>>,
    fail_enumeration: Mutex<bool>,
    enumerations: AtomicUsize,
    closes: AtomicUsize,
    commands: AtomicUsize,
    /// held id -> id that must send a command first
    holds: Mutex<HashMap<u32, u32>>,
    talked: Mutex<HashSet<u32>>,
    talked_changed: Condvar,
}

impl FakeHardware {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_devices(devices: &[(u32, RawProductId)]) -> Self {
        let hardware = Self::new();
        hardware.attach(devices);
        hardware
    }

    /// Replaces what the next enumeration reports.
    pub fn attach(&self, devices: &[(u32, RawProductId)]) {
        *self.devices.lock() = devices
            .iter()
            .map(|(internal_device_id, product_id)| DiscoveredDevice {
                internal_device_id: *internal_device_id,
                product_id: product_id.clone(),
            })
            .collect();
    }

    pub fn fail_commands_for(&self, internal_id: u32) {
        self.failing.lock().insert(internal_id);
    }

    /// Commands for `held` block until `released_by` has sent one. Gives up
    /// with an error after a few seconds, so it only passes when both
    /// devices talk at the same time.
    pub fn hold_until(&self, held: u32, released_by: u32) {
        self.holds.lock().insert(held, released_by);
    }

    fn wait_for_release(&self, internal_id: u32) -> Result<(), HardwareError> {
        let Some(released_by) = self.holds.lock().get(&internal_id).copied() else {
            return Ok(());
        };

        let mut talked = self.talked.lock();
        while !talked.contains(&released_by) {
            if self.talked_changed.wait_for(&mut talked, HOLD_TIMEOUT).timed_out() {
                return Err(HardwareError::Failed);
            }
        }
        Ok(())
    }

    pub fn fail_enumeration(&self, fail: bool) {
        *self.fail_enumeration.lock() = fail;
    }

    pub fn enumeration_count(&self) -> usize {
        self.enumerations.load(Ordering::SeqCst)
    }

    pub fn close_count(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }

    pub fn command_count(&self) -> usize {
        self.commands.load(Ordering::SeqCst)
    }
}

impl HardwareLayer for FakeHardware {
    fn get_all_devices(&self) -> Result<Vec<DiscoveredDevice>, HardwareError> {
        self.enumerations.fetch_add(1, Ordering::SeqCst);
        if *self.fail_enumeration.lock() {
            return Err(HardwareError::Failed);
        }
        Ok(self.devices.lock().clone())
    }

    fn close_all_devices(&self) -> Result<(), HardwareError> {
        self.closes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn send_command(&self, internal_id: u32, command: &Command) -> Result<RazerReport, HardwareError> {
        self.commands.fetch_add(1, Ordering::SeqCst);
        self.wait_for_release(internal_id)?;
        self.talked.lock().insert(internal_id);
        self.talked_changed.notify_all();

        if self.failing.lock().contains(&internal_id) {
            return Err(HardwareError::NotSupported);
        }

        let mut response = RazerReport::request(command, 0x3F);
        response.status = RazerReport::STATUS_SUCCESSFUL;
        let reply: &[u8] = match (command.command_class, command.command_id) {
            (0x00, 0x81) => &[0x01, 0x04],
            (0x04, 0x85) => &[0x01, 0x06, 0x40, 0x06, 0x40],
            (0x07, 0x80) => &[0x00, 128],
            (0x07, 0x84) => &[0x00, 0x01],
            (0x0F, 0x84) => &[0x01, 0x05, 200],
            _ => &[],
        };
        response.arguments[..reply.len()].copy_from_slice(reply);
        response.crc = response.calculate_crc();
        Ok(response)
    }
}
