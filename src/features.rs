//! Feature list assembly for a single device instance.
//!
//! The list starts from the profile's explicit features (or the category
//! defaults), drops the features the profile marks as missing and finally
//! merges per-feature configuration overrides into what is left.

use log::{debug, warn};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;
use std::fmt;

use crate::devices::MainType;

/// Free-form per-feature settings such as DPI limits or poll rates.
pub type Configuration = Map<String, Value>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FeatureIdentifier {
    #[serde(rename = "none")]
    Off,
    Static,
    WaveSimple,
    WaveExtended,
    Spectrum,
    Reactive,
    Breathe,
    Starlight,
    Ripple,
    Wheel,
    OldMouseEffects,
    Brightness,
    MouseBrightness,
    PollRate,
    Dpi,
    Battery,
}

impl FeatureIdentifier {
    /// Settings a feature starts with before any profile override.
    pub fn default_configuration(self) -> Configuration {
        let value = match self {
            FeatureIdentifier::Dpi => json!({ "min": 100, "max": 16000 }),
            FeatureIdentifier::PollRate => json!({ "rates": [125, 500, 1000] }),
            FeatureIdentifier::Brightness => json!({ "min": 0, "max": 100 }),
            FeatureIdentifier::MouseBrightness => {
                json!({ "logo": true, "scroll": true, "matrix": false })
            }
            FeatureIdentifier::Battery => json!({ "lowThreshold": 15 }),
            _ => return Configuration::new(),
        };

        match value {
            Value::Object(map) => map,
            _ => Configuration::new(),
        }
    }
}

impl FeatureIdentifier {
    /// Looks up a catalog spelling such as `"waveExtended"`.
    pub fn from_name(name: &str) -> Option<Self> {
        serde_json::from_value(Value::String(name.to_owned())).ok()
    }
}

impl fmt::Display for FeatureIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Same spelling as the catalog files.
        match serde_json::to_value(self) {
            Ok(Value::String(name)) => f.write_str(&name),
            _ => write!(f, "{:?}", self),
        }
    }
}

/// One entry of a profile's `features` list: either a bare identifier or
/// an identifier mapped to configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FeatureConfig {
    Plain(FeatureIdentifier),
    Configured(BTreeMap<FeatureIdentifier, Configuration>),
}

impl From<FeatureIdentifier> for FeatureConfig {
    fn from(identifier: FeatureIdentifier) -> Self {
        FeatureConfig::Plain(identifier)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureDescriptor {
    pub identifier: FeatureIdentifier,
    pub configuration: Configuration,
}

impl FeatureDescriptor {
    pub fn new(identifier: FeatureIdentifier) -> Self {
        Self {
            identifier,
            configuration: identifier.default_configuration(),
        }
    }

    pub fn with_configuration(identifier: FeatureIdentifier, configuration: &Configuration) -> Self {
        let mut descriptor = Self::new(identifier);
        merge(&mut descriptor.configuration, configuration);
        descriptor
    }
}

/// Partial configuration to merge into one feature.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureOverride {
    pub identifier: FeatureIdentifier,
    pub patch: Configuration,
}

/// The `featuresConfig` section of a profile, stored in catalog order.
///
/// On disk it is a list of single-key objects, e.g.
/// `[{"dpi": {"max": 20000}}]`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(
    from = "Vec<Value>",
    into = "Vec<BTreeMap<FeatureIdentifier, Configuration>>"
)]
pub struct FeatureOverrides(Vec<FeatureOverride>);

impl FeatureOverrides {
    pub fn new(overrides: Vec<FeatureOverride>) -> Self {
        Self(overrides)
    }

    pub fn iter(&self) -> impl Iterator<Item = &FeatureOverride> {
        self.0.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<Vec<BTreeMap<FeatureIdentifier, Configuration>>> for FeatureOverrides {
    fn from(entries: Vec<BTreeMap<FeatureIdentifier, Configuration>>) -> Self {
        Self(
            entries
                .into_iter()
                .flat_map(BTreeMap::into_iter)
                .map(|(identifier, patch)| FeatureOverride { identifier, patch })
                .collect(),
        )
    }
}

impl From<Vec<Value>> for FeatureOverrides {
    fn from(entries: Vec<Value>) -> Self {
        let entries = entries
            .into_iter()
            .filter_map(|entry| match entry {
                Value::Object(map) => Some(known_features(map)),
                other => {
                    warn!("Ignoring malformed feature override {}", other);
                    None
                }
            })
            .collect::<Vec<_>>();
        Self::from(entries)
    }
}

impl From<FeatureOverrides> for Vec<BTreeMap<FeatureIdentifier, Configuration>> {
    fn from(overrides: FeatureOverrides) -> Self {
        overrides
            .0
            .into_iter()
            .map(|o| BTreeMap::from([(o.identifier, o.patch)]))
            .collect()
    }
}

/// Keeps the entries keyed by a known feature whose value is an object.
fn known_features(map: Configuration) -> BTreeMap<FeatureIdentifier, Configuration> {
    map.into_iter()
        .filter_map(|(name, value)| match (FeatureIdentifier::from_name(&name), value) {
            (Some(identifier), Value::Object(configuration)) => Some((identifier, configuration)),
            (Some(_), other) => {
                warn!("Ignoring non-object configuration for {}: {}", name, other);
                None
            }
            (None, _) => {
                warn!("Ignoring unknown feature {:?}", name);
                None
            }
        })
        .collect()
}

fn feature_entry(entry: Value) -> Option<FeatureConfig> {
    match entry {
        Value::String(name) => match FeatureIdentifier::from_name(&name) {
            Some(identifier) => Some(FeatureConfig::Plain(identifier)),
            None => {
                warn!("Ignoring unknown feature {:?}", name);
                None
            }
        },
        Value::Object(map) => {
            let configured = known_features(map);
            (!configured.is_empty()).then_some(FeatureConfig::Configured(configured))
        }
        other => {
            warn!("Ignoring malformed feature entry {}", other);
            None
        }
    }
}

/// Profile `features` list. Entries naming features this build does not
/// know are dropped with a warning instead of failing the profile.
pub fn deserialize_feature_list<'de, D>(deserializer: D) -> Result<Option<Vec<FeatureConfig>>, D::Error>
where
    D: Deserializer<'de>,
{
    let entries = Option::<Vec<Value>>::deserialize(deserializer)?;
    Ok(entries.map(|entries| entries.into_iter().filter_map(feature_entry).collect()))
}

/// Profile `featuresMissing` list, with unknown names dropped.
pub fn deserialize_identifiers<'de, D>(deserializer: D) -> Result<Option<Vec<FeatureIdentifier>>, D::Error>
where
    D: Deserializer<'de>,
{
    let names = Option::<Vec<String>>::deserialize(deserializer)?;
    Ok(names.map(|names| {
        names
            .iter()
            .filter_map(|name| {
                let identifier = FeatureIdentifier::from_name(name);
                if identifier.is_none() {
                    debug!("Unknown feature {:?} in featuresMissing", name);
                }
                identifier
            })
            .collect()
    }))
}

/// Features a category exposes when its profile has no explicit list.
pub fn default_features(main_type: &MainType) -> &'static [FeatureIdentifier] {
    use FeatureIdentifier::*;

    match main_type {
        MainType::Keyboard => &[
            Off,
            Static,
            WaveExtended,
            Spectrum,
            Reactive,
            Breathe,
            Starlight,
            Ripple,
            Wheel,
            Brightness,
        ],
        MainType::Mouse => &[
            Off,
            Static,
            WaveSimple,
            Spectrum,
            Reactive,
            Breathe,
            MouseBrightness,
            PollRate,
            Dpi,
        ],
        MainType::MouseDock => &[Off, Static, Spectrum, Breathe],
        MainType::MouseMat => &[Off, Static, WaveSimple, Spectrum, Breathe, Brightness],
        MainType::Egpu => &[Off, Static, WaveSimple, Spectrum, Breathe],
        MainType::Headphone => &[Off, Static, Spectrum, Breathe],
        MainType::Accessory => &[Off, Static, WaveSimple, Spectrum, Breathe, Brightness],
        MainType::Unknown(_) => &[],
    }
}

/// Recursively merges `patch` into `target`. Keys present in `patch` win,
/// nested objects are merged key by key, every other key is left alone.
pub fn merge(target: &mut Configuration, patch: &Configuration) {
    for (key, value) in patch {
        match (target.get_mut(key), value) {
            (Some(Value::Object(existing)), Value::Object(nested)) => merge(existing, nested),
            _ => {
                target.insert(key.clone(), value.clone());
            }
        }
    }
}

/// Builds the ordered feature list for one device instance.
///
/// Every call returns freshly owned descriptors, so two instances built
/// from the same profile never share configuration.
pub fn assemble(
    main_type: &MainType,
    features: Option<&[FeatureConfig]>,
    features_missing: Option<&[FeatureIdentifier]>,
    features_config: Option<&FeatureOverrides>,
) -> Vec<FeatureDescriptor> {
    let mut descriptors: Vec<FeatureDescriptor> = match features {
        Some(features) => features
            .iter()
            .flat_map(|entry| match entry {
                FeatureConfig::Plain(identifier) => vec![FeatureDescriptor::new(*identifier)],
                FeatureConfig::Configured(map) => map
                    .iter()
                    .map(|(identifier, configuration)| {
                        FeatureDescriptor::with_configuration(*identifier, configuration)
                    })
                    .collect(),
            })
            .collect(),
        None => default_features(main_type)
            .iter()
            .copied()
            .map(FeatureDescriptor::new)
            .collect(),
    };

    if let Some(missing) = features_missing {
        descriptors.retain(|descriptor| !missing.contains(&descriptor.identifier));
    }

    if let Some(overrides) = features_config {
        for entry in overrides.iter() {
            let mut matched = false;
            for descriptor in descriptors
                .iter_mut()
                .filter(|descriptor| descriptor.identifier == entry.identifier)
            {
                merge(&mut descriptor.configuration, &entry.patch);
                matched = true;
            }

            if !matched {
                debug!("Ignoring override for absent feature {}", entry.identifier);
            }
        }
    }

    descriptors
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(value: Value) -> Configuration {
        match value {
            Value::Object(map) => map,
            _ => panic!("expected an object"),
        }
    }

    fn identifiers(descriptors: &[FeatureDescriptor]) -> Vec<FeatureIdentifier> {
        descriptors.iter().map(|d| d.identifier).collect()
    }

    #[test]
    fn test_defaults_used_without_explicit_list() {
        let descriptors = assemble(&MainType::Mouse, None, None, None);
        assert_eq!(identifiers(&descriptors), default_features(&MainType::Mouse));

        let dpi = descriptors
            .iter()
            .find(|d| d.identifier == FeatureIdentifier::Dpi)
            .unwrap();
        assert_eq!(dpi.configuration, config(json!({ "min": 100, "max": 16000 })));
    }

    #[test]
    fn test_explicit_list_replaces_defaults() {
        let features = vec![
            FeatureConfig::from(FeatureIdentifier::Static),
            FeatureConfig::Configured(BTreeMap::from([(
                FeatureIdentifier::Dpi,
                config(json!({ "max": 30000 })),
            )])),
            FeatureConfig::from(FeatureIdentifier::Battery),
        ];

        let descriptors = assemble(&MainType::Mouse, Some(&features), None, None);
        assert_eq!(
            identifiers(&descriptors),
            vec![
                FeatureIdentifier::Static,
                FeatureIdentifier::Dpi,
                FeatureIdentifier::Battery
            ]
        );
        assert_eq!(
            descriptors[1].configuration,
            config(json!({ "min": 100, "max": 30000 }))
        );
    }

    #[test]
    fn test_removal_preserves_order() {
        let missing = [FeatureIdentifier::Reactive, FeatureIdentifier::WaveSimple];
        let descriptors = assemble(&MainType::Mouse, None, Some(&missing), None);

        assert_eq!(
            identifiers(&descriptors),
            vec![
                FeatureIdentifier::Off,
                FeatureIdentifier::Static,
                FeatureIdentifier::Spectrum,
                FeatureIdentifier::Breathe,
                FeatureIdentifier::MouseBrightness,
                FeatureIdentifier::PollRate,
                FeatureIdentifier::Dpi,
            ]
        );
    }

    #[test]
    fn test_override_only_touches_listed_keys() {
        let mut target = config(json!({ "a": 1, "b": 2 }));
        merge(&mut target, &config(json!({ "b": 3 })));
        assert_eq!(target, config(json!({ "a": 1, "b": 3 })));
    }

    #[test]
    fn test_merge_is_deep() {
        let mut target = config(json!({ "limits": { "min": 1, "max": 2 }, "flag": true }));
        merge(&mut target, &config(json!({ "limits": { "max": 9 } })));
        assert_eq!(
            target,
            config(json!({ "limits": { "min": 1, "max": 9 }, "flag": true }))
        );
    }

    #[test]
    fn test_removal_precedes_override() {
        let missing = [FeatureIdentifier::Dpi];
        let overrides: FeatureOverrides =
            serde_json::from_value(json!([{ "dpi": { "max": 20000 } }])).unwrap();

        let descriptors = assemble(&MainType::Mouse, None, Some(&missing), Some(&overrides));
        assert!(descriptors
            .iter()
            .all(|d| d.identifier != FeatureIdentifier::Dpi));
        assert_eq!(descriptors.len(), default_features(&MainType::Mouse).len() - 1);
    }

    #[test]
    fn test_override_for_absent_feature_is_ignored() {
        let overrides: FeatureOverrides =
            serde_json::from_value(json!([{ "battery": { "lowThreshold": 5 } }])).unwrap();

        let with = assemble(&MainType::MouseMat, None, None, Some(&overrides));
        let without = assemble(&MainType::MouseMat, None, None, None);
        assert_eq!(with, without);
    }

    #[test]
    fn test_assembly_is_deterministic_and_independent() {
        let overrides: FeatureOverrides =
            serde_json::from_value(json!([{ "pollRate": { "rates": [1000, 4000] } }])).unwrap();

        let mut first = assemble(&MainType::Mouse, None, None, Some(&overrides));
        let second = assemble(&MainType::Mouse, None, None, Some(&overrides));
        assert_eq!(first, second);

        first[0].configuration.insert("mutated".into(), json!(true));
        assert_ne!(first, second);
        assert!(!second[0].configuration.contains_key("mutated"));
    }

    #[test]
    fn test_unknown_category_has_no_defaults() {
        let main_type = MainType::Unknown("toaster".into());
        assert!(assemble(&main_type, None, None, None).is_empty());
    }

    #[test]
    fn test_identifier_display_matches_catalog_spelling() {
        assert_eq!(FeatureIdentifier::WaveExtended.to_string(), "waveExtended");
        assert_eq!(FeatureIdentifier::Dpi.to_string(), "dpi");
        assert_eq!(FeatureIdentifier::Off.to_string(), "none");
        assert_eq!(FeatureIdentifier::from_name("pollRate"), Some(FeatureIdentifier::PollRate));
        assert_eq!(FeatureIdentifier::from_name("warpDrive"), None);
    }

    #[test]
    fn test_overrides_skip_unknown_features() {
        let overrides: FeatureOverrides = serde_json::from_value(json!([
            { "dpi": { "max": 20000 } },
            { "warpDrive": { "speed": 9 } },
            { "battery": 5 },
            "oops"
        ]))
        .unwrap();

        let identifiers: Vec<_> = overrides.iter().map(|o| o.identifier).collect();
        assert_eq!(identifiers, vec![FeatureIdentifier::Dpi]);
    }
}
