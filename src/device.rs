//! Device factory and the per-category device variants.

use log::{debug, info};
use std::any::Any;
use std::fmt;
use std::sync::Arc;

use crate::controller::{Command, HardwareLayer, RazerReport};
use crate::devices::{DeviceProfile, MainType};
use crate::error::DeviceError;
use crate::features::{
    assemble, FeatureConfig, FeatureDescriptor, FeatureIdentifier, FeatureOverrides,
};
use crate::product_id::ProductId;

/// Application settings store, passed through to devices untouched.
pub type SettingsHandle = Arc<dyn Any + Send + Sync>;
/// Application state store, passed through to devices untouched.
pub type StateHandle = Arc<dyn Any + Send + Sync>;

/// Everything the factory needs to build one device.
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceProperties {
    pub name: String,
    pub product_id: ProductId,
    pub internal_id: u32,
    pub main_type: MainType,
    pub image: Option<String>,
    pub features: Option<Vec<FeatureConfig>>,
    pub features_missing: Option<Vec<FeatureIdentifier>>,
    pub features_config: Option<FeatureOverrides>,
}

impl DeviceProperties {
    pub fn from_profile(profile: &DeviceProfile, internal_id: u32) -> Self {
        Self {
            name: profile.name.clone(),
            product_id: profile.product_id,
            internal_id,
            main_type: profile.main_type.clone(),
            image: profile.image.clone(),
            features: profile.features.clone(),
            features_missing: profile.features_missing.clone(),
            features_config: profile.features_config.clone(),
        }
    }
}

/// State shared by every device variant.
pub struct DeviceCore {
    pub name: String,
    pub product_id: ProductId,
    pub internal_id: u32,
    pub main_type: MainType,
    pub image: Option<String>,
    pub features: Vec<FeatureDescriptor>,
    pub firmware_version: Option<String>,
    pub settings: SettingsHandle,
    pub state: StateHandle,
    hardware: Arc<dyn HardwareLayer>,
    closed: bool,
}

impl fmt::Debug for DeviceCore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeviceCore")
            .field("name", &self.name)
            .field("product_id", &self.product_id)
            .field("internal_id", &self.internal_id)
            .field("main_type", &self.main_type)
            .field("image", &self.image)
            .field("features", &self.features)
            .field("firmware_version", &self.firmware_version)
            .field("closed", &self.closed)
            .finish_non_exhaustive()
    }
}

impl DeviceCore {
    fn new(
        hardware: Arc<dyn HardwareLayer>,
        settings: SettingsHandle,
        state: StateHandle,
        properties: DeviceProperties,
    ) -> Self {
        let features = assemble(
            &properties.main_type,
            properties.features.as_deref(),
            properties.features_missing.as_deref(),
            properties.features_config.as_ref(),
        );
        debug!(
            "{}: assembled {} feature(s) for {}",
            properties.name,
            features.len(),
            properties.main_type
        );

        Self {
            name: properties.name,
            product_id: properties.product_id,
            internal_id: properties.internal_id,
            main_type: properties.main_type,
            image: properties.image,
            features,
            firmware_version: None,
            settings,
            state,
            hardware,
            closed: false,
        }
    }

    pub fn has_feature(&self, identifier: FeatureIdentifier) -> bool {
        self.features
            .iter()
            .any(|feature| feature.identifier == identifier)
    }

    pub fn feature(&self, identifier: FeatureIdentifier) -> Option<&FeatureDescriptor> {
        self.features
            .iter()
            .find(|feature| feature.identifier == identifier)
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Runs one command on the blocking pool so other devices keep going.
    async fn query(&self, command: Command) -> Result<RazerReport, DeviceError> {
        let hardware = Arc::clone(&self.hardware);
        let internal_id = self.internal_id;

        tokio::task::spawn_blocking(move || hardware.send_command(internal_id, &command))
            .await?
            .map_err(|source| DeviceError::Hardware {
                name: self.name.clone(),
                source,
            })
    }

    async fn read_firmware(&mut self) -> Result<(), DeviceError> {
        let response = self.query(Command::firmware_version()).await?;
        self.firmware_version = Some(format!(
            "v{}.{}",
            response.arguments[0], response.arguments[1]
        ));
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatteryStatus {
    pub level: u8,
    pub is_charging: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Dpi {
    pub x: u16,
    pub y: u16,
}

#[derive(Debug)]
pub struct Keyboard {
    pub core: DeviceCore,
    pub brightness: Option<u8>,
}

#[derive(Debug)]
pub struct Mouse {
    pub core: DeviceCore,
    pub dpi: Option<Dpi>,
    pub battery: Option<BatteryStatus>,
}

/// Docks, mats, eGPU enclosures, headphones and other accessories: only
/// lighting features, no extra state read at startup.
#[derive(Debug)]
pub struct LightingDevice {
    pub core: DeviceCore,
}

#[derive(Debug)]
pub enum RazerDevice {
    Keyboard(Keyboard),
    Mouse(Mouse),
    MouseDock(LightingDevice),
    MouseMat(LightingDevice),
    Egpu(LightingDevice),
    Headphone(LightingDevice),
    Accessory(LightingDevice),
    /// Unknown category. Carries its properties but talks to no hardware.
    Generic(DeviceCore),
}

/// Builds an uninitialized device for `properties.main_type`.
pub fn create(
    hardware: Arc<dyn HardwareLayer>,
    settings: SettingsHandle,
    state: StateHandle,
    properties: DeviceProperties,
) -> RazerDevice {
    let core = DeviceCore::new(hardware, settings, state, properties);
    let lighting = |core| LightingDevice { core };

    match core.main_type {
        MainType::Keyboard => RazerDevice::Keyboard(Keyboard {
            core,
            brightness: None,
        }),
        MainType::Mouse => RazerDevice::Mouse(Mouse {
            core,
            dpi: None,
            battery: None,
        }),
        MainType::MouseDock => RazerDevice::MouseDock(lighting(core)),
        MainType::MouseMat => RazerDevice::MouseMat(lighting(core)),
        MainType::Egpu => RazerDevice::Egpu(lighting(core)),
        MainType::Headphone => RazerDevice::Headphone(lighting(core)),
        MainType::Accessory => RazerDevice::Accessory(lighting(core)),
        MainType::Unknown(_) => RazerDevice::Generic(core),
    }
}

impl RazerDevice {
    pub fn core(&self) -> &DeviceCore {
        match self {
            RazerDevice::Keyboard(keyboard) => &keyboard.core,
            RazerDevice::Mouse(mouse) => &mouse.core,
            RazerDevice::MouseDock(device)
            | RazerDevice::MouseMat(device)
            | RazerDevice::Egpu(device)
            | RazerDevice::Headphone(device)
            | RazerDevice::Accessory(device) => &device.core,
            RazerDevice::Generic(core) => core,
        }
    }

    fn core_mut(&mut self) -> &mut DeviceCore {
        match self {
            RazerDevice::Keyboard(keyboard) => &mut keyboard.core,
            RazerDevice::Mouse(mouse) => &mut mouse.core,
            RazerDevice::MouseDock(device)
            | RazerDevice::MouseMat(device)
            | RazerDevice::Egpu(device)
            | RazerDevice::Headphone(device)
            | RazerDevice::Accessory(device) => &mut device.core,
            RazerDevice::Generic(core) => core,
        }
    }

    pub fn name(&self) -> &str {
        &self.core().name
    }

    pub fn product_id(&self) -> ProductId {
        self.core().product_id
    }

    pub fn internal_id(&self) -> u32 {
        self.core().internal_id
    }

    pub fn main_type(&self) -> &MainType {
        &self.core().main_type
    }

    pub fn image(&self) -> Option<&str> {
        self.core().image.as_deref()
    }

    pub fn features(&self) -> &[FeatureDescriptor] {
        &self.core().features
    }

    /// Reads the device's current state. Must be called once before the
    /// device is handed out.
    pub async fn init(&mut self) -> Result<(), DeviceError> {
        match self {
            RazerDevice::Generic(core) => {
                debug!("{}: unknown category {}, nothing to read", core.name, core.main_type);
            }
            RazerDevice::Keyboard(keyboard) => {
                keyboard.core.read_firmware().await?;

                if keyboard.core.has_feature(FeatureIdentifier::Brightness) {
                    let response = keyboard.core.query(Command::brightness()).await?;
                    keyboard.brightness = Some(response.arguments[2]);
                }
            }
            RazerDevice::Mouse(mouse) => {
                mouse.core.read_firmware().await?;

                if mouse.core.has_feature(FeatureIdentifier::Dpi) {
                    let response = mouse.core.query(Command::dpi()).await?;
                    let args = response.arguments;
                    mouse.dpi = Some(Dpi {
                        x: u16::from_be_bytes([args[1], args[2]]),
                        y: u16::from_be_bytes([args[3], args[4]]),
                    });
                }

                if mouse.core.has_feature(FeatureIdentifier::Battery) {
                    let level = mouse.core.query(Command::battery_level()).await?;
                    let charging = mouse.core.query(Command::charging_status()).await?;
                    let battery_level = (level.arguments[1] as f32 / 255.0) * 100.0;

                    mouse.battery = Some(BatteryStatus {
                        level: battery_level.round() as u8,
                        is_charging: charging.arguments[1] != 0,
                    });
                }
            }
            RazerDevice::MouseDock(device)
            | RazerDevice::MouseMat(device)
            | RazerDevice::Egpu(device)
            | RazerDevice::Headphone(device)
            | RazerDevice::Accessory(device) => {
                device.core.read_firmware().await?;
            }
        }

        let core = self.core();
        info!(
            "{} ({}) initialized, firmware {}",
            core.name,
            core.product_id,
            core.firmware_version.as_deref().unwrap_or("unknown")
        );
        Ok(())
    }

    /// Teardown hook. Safe to call on an already closed device.
    pub fn destroy(&mut self) {
        let core = self.core_mut();
        if core.closed {
            return;
        }
        core.closed = true;
        debug!("{}: destroyed", core.name);
    }

    pub fn is_closed(&self) -> bool {
        self.core().is_closed()
    }

    pub fn battery(&self) -> Option<BatteryStatus> {
        match self {
            RazerDevice::Mouse(mouse) => mouse.battery,
            _ => None,
        }
    }

    pub fn dpi(&self) -> Option<Dpi> {
        match self {
            RazerDevice::Mouse(mouse) => mouse.dpi,
            _ => None,
        }
    }

    pub fn brightness(&self) -> Option<u8> {
        match self {
            RazerDevice::Keyboard(keyboard) => keyboard.brightness,
            _ => None,
        }
    }
}
