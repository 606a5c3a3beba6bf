//! Device profile catalog: what the application knows about each Razer
//! product, keyed by product id.

use log::{debug, warn};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::collections::HashSet;
use std::fmt;
use std::fs;
use std::path::Path;

use crate::error::CatalogError;
use crate::features::{self, Configuration, FeatureConfig, FeatureIdentifier, FeatureOverride, FeatureOverrides};
use crate::product_id::{ProductId, RawProductId};

pub const RAZER_VENDOR_ID: u16 = 0x1532;

pub const RAZER_DEATHADDER_V3_PRO_WIRED: ProductId = ProductId(0x00B6);
pub const RAZER_DEATHADDER_V3_PRO_WIRELESS: ProductId = ProductId(0x00B7);

/// Device category. Drives the default feature list, the device variant
/// built by the factory and the sort order.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum MainType {
    Keyboard,
    Mouse,
    MouseDock,
    MouseMat,
    Egpu,
    Headphone,
    Accessory,
    Unknown(String),
}

impl MainType {
    /// Categories in display order.
    pub const PRIORITY: [MainType; 7] = [
        MainType::Keyboard,
        MainType::Mouse,
        MainType::MouseDock,
        MainType::MouseMat,
        MainType::Egpu,
        MainType::Headphone,
        MainType::Accessory,
    ];

    /// Position in [`MainType::PRIORITY`]; unknown categories rank last.
    pub fn rank(&self) -> usize {
        Self::PRIORITY
            .iter()
            .position(|main_type| main_type == self)
            .unwrap_or(Self::PRIORITY.len())
    }

    pub fn as_str(&self) -> &str {
        match self {
            MainType::Keyboard => "keyboard",
            MainType::Mouse => "mouse",
            MainType::MouseDock => "mousedock",
            MainType::MouseMat => "mousemat",
            MainType::Egpu => "egpu",
            MainType::Headphone => "headphone",
            MainType::Accessory => "accessory",
            MainType::Unknown(name) => name,
        }
    }
}

impl From<String> for MainType {
    fn from(name: String) -> Self {
        let normalized: String = name
            .chars()
            .filter(|c| *c != '-' && *c != '_')
            .flat_map(char::to_lowercase)
            .collect();

        match normalized.as_str() {
            "keyboard" => MainType::Keyboard,
            "mouse" => MainType::Mouse,
            "mousedock" => MainType::MouseDock,
            "mousemat" => MainType::MouseMat,
            "egpu" => MainType::Egpu,
            "headphone" => MainType::Headphone,
            "accessory" => MainType::Accessory,
            _ => MainType::Unknown(name),
        }
    }
}

impl From<MainType> for String {
    fn from(main_type: MainType) -> Self {
        main_type.as_str().to_owned()
    }
}

impl fmt::Display for MainType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceProfile {
    pub name: String,
    #[serde(deserialize_with = "deserialize_product_id")]
    pub product_id: ProductId,
    pub main_type: MainType,
    #[serde(default, deserialize_with = "features::deserialize_feature_list")]
    pub features: Option<Vec<FeatureConfig>>,
    #[serde(default, deserialize_with = "features::deserialize_identifiers")]
    pub features_missing: Option<Vec<FeatureIdentifier>>,
    #[serde(default)]
    pub features_config: Option<FeatureOverrides>,
    #[serde(default)]
    pub image: Option<String>,
}

fn deserialize_product_id<'de, D>(deserializer: D) -> Result<ProductId, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = RawProductId::deserialize(deserializer)?;
    raw.normalize()
        .ok_or_else(|| serde::de::Error::custom(format!("invalid product id {}", raw)))
}

/// Parses a JSON array of profiles, or a single profile object. Entries
/// that fail to parse are skipped so one bad profile does not hide the rest.
fn parse_profiles(json: &str) -> Result<Vec<DeviceProfile>, CatalogError> {
    let entries = match serde_json::from_str::<Value>(json)? {
        Value::Array(entries) => entries,
        entry @ Value::Object(_) => vec![entry],
        _ => return Err(CatalogError::InvalidLayout),
    };

    let profiles = entries
        .into_iter()
        .enumerate()
        .filter_map(|(index, entry)| {
            let name = entry
                .get("name")
                .and_then(Value::as_str)
                .map(str::to_owned)
                .unwrap_or_else(|| format!("#{}", index));

            match serde_json::from_value::<DeviceProfile>(entry) {
                Ok(profile) => Some(profile),
                Err(err) => {
                    warn!("Skipping device profile {}: {}", name, err);
                    None
                }
            }
        })
        .collect();

    Ok(profiles)
}

/// Pre-loaded, immutable set of device profiles.
#[derive(Debug, Clone, Default)]
pub struct DeviceCatalog {
    profiles: Vec<DeviceProfile>,
}

impl DeviceCatalog {
    /// Wraps `profiles` in catalog order. Later entries reusing a product
    /// id are kept but never matched; they are reported here.
    pub fn new(profiles: Vec<DeviceProfile>) -> Self {
        let mut seen = HashSet::new();
        for profile in &profiles {
            if !seen.insert(profile.product_id) {
                warn!(
                    "Duplicate product id {} for {}, the first entry wins",
                    profile.product_id, profile.name
                );
            }
        }

        Self { profiles }
    }

    pub fn builtin() -> Self {
        let deathadder = |product_id, name: &str| DeviceProfile {
            name: name.to_owned(),
            product_id,
            main_type: MainType::Mouse,
            features: Some(vec![
                FeatureIdentifier::Dpi.into(),
                FeatureIdentifier::PollRate.into(),
                FeatureIdentifier::Battery.into(),
            ]),
            features_missing: None,
            features_config: Some(FeatureOverrides::new(vec![FeatureOverride {
                identifier: FeatureIdentifier::Dpi,
                patch: dpi_limit(30000),
            }])),
            image: Some("deathadder-v3-pro.png".to_owned()),
        };

        Self::new(vec![
            deathadder(RAZER_DEATHADDER_V3_PRO_WIRED, "Razer DeathAdder V3 Pro (Wired)"),
            deathadder(
                RAZER_DEATHADDER_V3_PRO_WIRELESS,
                "Razer DeathAdder V3 Pro (Wireless)",
            ),
        ])
    }

    /// Parses a JSON array of profiles (a single object is accepted too).
    pub fn from_json_str(json: &str) -> Result<Self, CatalogError> {
        Ok(Self::new(parse_profiles(json)?))
    }

    pub fn from_file(path: &Path) -> Result<Self, CatalogError> {
        let content = fs::read_to_string(path)?;
        Self::from_json_str(&content)
    }

    /// Loads every `*.json` file in `dir`, in file name order. Files that
    /// cannot be read or are not valid JSON are skipped.
    pub fn from_dir(dir: &Path) -> Result<Self, CatalogError> {
        let mut paths: Vec<_> = fs::read_dir(dir)?
            .filter_map(|entry| entry.ok().map(|entry| entry.path()))
            .filter(|path| path.extension().is_some_and(|ext| ext == "json"))
            .collect();
        paths.sort();

        let mut profiles = Vec::new();
        for path in paths {
            let loaded = fs::read_to_string(&path)
                .map_err(CatalogError::from)
                .and_then(|content| parse_profiles(&content));

            match loaded {
                Ok(entries) => {
                    debug!("Loaded {} profile(s) from {}", entries.len(), path.display());
                    profiles.extend(entries);
                }
                Err(err) => warn!("Skipping device profile {}: {}", path.display(), err),
            }
        }

        Ok(Self::new(profiles))
    }

    /// Loads a catalog from a file or a directory of files.
    pub fn load(path: &Path) -> Result<Self, CatalogError> {
        if path.is_dir() {
            Self::from_dir(path)
        } else {
            Self::from_file(path)
        }
    }

    /// First profile with `product_id`, in catalog order.
    pub fn find(&self, product_id: ProductId) -> Option<&DeviceProfile> {
        self.profiles
            .iter()
            .find(|profile| profile.product_id == product_id)
    }

    pub fn known_product_ids(&self) -> Vec<ProductId> {
        self.profiles.iter().map(|profile| profile.product_id).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &DeviceProfile> {
        self.profiles.iter()
    }

    pub fn len(&self) -> usize {
        self.profiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.profiles.is_empty()
    }
}

fn dpi_limit(max: u32) -> Configuration {
    let mut configuration = Configuration::new();
    configuration.insert("max".into(), max.into());
    configuration
}
