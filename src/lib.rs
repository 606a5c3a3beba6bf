//! Razer device reconciliation.
//!
//! Turns the raw list of attached Razer hardware into configured device
//! objects:
//! - product id normalization and catalog matching
//! - feature list assembly (defaults, removals, per-feature overrides)
//! - one device variant per category, initialized concurrently
//! - an ordered registry of active devices with coordinated teardown

pub mod config;
pub mod controller;
pub mod device;
pub mod devices;
pub mod error;
pub mod features;
pub mod manager;
pub mod product_id;
pub mod registry;

#[cfg(test)]
mod test_support;

pub use config::Config;
pub use controller::{Command, DiscoveredDevice, HardwareLayer, HidHardware, RazerReport};
pub use device::{create, DeviceProperties, RazerDevice, SettingsHandle, StateHandle};
pub use devices::{DeviceCatalog, DeviceProfile, MainType};
pub use error::{CatalogError, ConfigError, DeviceError, Error, HardwareError};
pub use features::{assemble, FeatureConfig, FeatureDescriptor, FeatureIdentifier, FeatureOverrides};
pub use manager::{DeviceManager, RefreshOutcome, RefreshSummary};
pub use product_id::{ProductId, RawProductId};
pub use registry::DeviceRegistry;
