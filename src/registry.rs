use std::cmp::Ordering;

use crate::device::RazerDevice;

/// The devices produced by the last completed refresh.
#[derive(Debug, Default)]
pub enum DeviceRegistry {
    /// Nothing enumerated, or the last set was closed.
    #[default]
    Empty,
    /// Initialized devices in display order. May be an empty list when a
    /// refresh found nothing usable.
    Active(Vec<RazerDevice>),
}

impl DeviceRegistry {
    /// Registry holding `devices`, sorted for display.
    pub fn active(mut devices: Vec<RazerDevice>) -> Self {
        sort_devices(&mut devices);
        DeviceRegistry::Active(devices)
    }

    pub fn is_active(&self) -> bool {
        matches!(self, DeviceRegistry::Active(_))
    }

    pub fn devices(&self) -> &[RazerDevice] {
        match self {
            DeviceRegistry::Empty => &[],
            DeviceRegistry::Active(devices) => devices,
        }
    }

    pub fn len(&self) -> usize {
        self.devices().len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices().is_empty()
    }

    pub fn get_by_internal_id(&self, internal_id: u32) -> Option<&RazerDevice> {
        self.devices()
            .iter()
            .find(|device| device.internal_id() == internal_id)
    }

    pub fn get_by_internal_id_mut(&mut self, internal_id: u32) -> Option<&mut RazerDevice> {
        match self {
            DeviceRegistry::Empty => None,
            DeviceRegistry::Active(devices) => devices
                .iter_mut()
                .find(|device| device.internal_id() == internal_id),
        }
    }

    /// Runs every device's teardown hook, keeping the set in place.
    pub fn destroy_all(&mut self) {
        if let DeviceRegistry::Active(devices) = self {
            devices.iter_mut().for_each(RazerDevice::destroy);
        }
    }

    /// Takes the active set out, leaving the registry empty.
    pub fn take(&mut self) -> Option<Vec<RazerDevice>> {
        match std::mem::take(self) {
            DeviceRegistry::Empty => None,
            DeviceRegistry::Active(devices) => Some(devices),
        }
    }
}

/// Category rank first, then name. Stable, so equal devices keep their
/// discovery order.
pub fn display_order(a: &RazerDevice, b: &RazerDevice) -> Ordering {
    a.main_type()
        .rank()
        .cmp(&b.main_type().rank())
        .then_with(|| a.name().cmp(b.name()))
}

pub fn sort_devices(devices: &mut [RazerDevice]) {
    devices.sort_by(display_order);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::{create, DeviceProperties};
    use crate::devices::MainType;
    use crate::test_support::{profile, FakeHardware};
    use std::sync::Arc;

    fn device(name: &str, main_type: MainType, internal_id: u32) -> RazerDevice {
        let hardware = Arc::new(FakeHardware::new());
        create(
            hardware,
            Arc::new(()),
            Arc::new(()),
            DeviceProperties::from_profile(&profile(name, 0x0001, main_type), internal_id),
        )
    }

    fn order(registry: &DeviceRegistry) -> Vec<(String, u32)> {
        registry
            .devices()
            .iter()
            .map(|d| (d.name().to_owned(), d.internal_id()))
            .collect()
    }

    #[test]
    fn test_category_then_name() {
        let registry = DeviceRegistry::active(vec![
            device("Z", MainType::Headphone, 1),
            device("A", MainType::Keyboard, 2),
            device("B", MainType::Mouse, 3),
        ]);

        assert_eq!(
            order(&registry),
            vec![("A".into(), 2), ("B".into(), 3), ("Z".into(), 1)]
        );
    }

    #[test]
    fn test_unknown_categories_sort_last() {
        let registry = DeviceRegistry::active(vec![
            device("A", MainType::Unknown("lamp".into()), 1),
            device("Z", MainType::Accessory, 2),
            device("B", MainType::Unknown("chair".into()), 3),
        ]);

        let names: Vec<_> = order(&registry).into_iter().map(|(n, _)| n).collect();
        assert_eq!(names[0], "Z");
    }

    #[test]
    fn test_names_are_case_sensitive() {
        let registry = DeviceRegistry::active(vec![
            device("basilisk", MainType::Mouse, 1),
            device("Viper", MainType::Mouse, 2),
        ]);

        assert_eq!(registry.devices()[0].name(), "Viper");
    }

    #[test]
    fn test_ties_keep_discovery_order() {
        let registry = DeviceRegistry::active(vec![
            device("Mat", MainType::MouseMat, 4),
            device("Mat", MainType::MouseMat, 2),
            device("Mat", MainType::MouseMat, 9),
        ]);

        let ids: Vec<_> = order(&registry).into_iter().map(|(_, id)| id).collect();
        assert_eq!(ids, vec![4, 2, 9]);
    }

    #[test]
    fn test_lookup_and_take() {
        let mut registry = DeviceRegistry::active(vec![device("A", MainType::Mouse, 11)]);

        assert_eq!(registry.get_by_internal_id(11).map(RazerDevice::name), Some("A"));
        assert!(registry.get_by_internal_id(12).is_none());

        registry.destroy_all();
        assert!(registry.devices()[0].is_closed());

        assert_eq!(registry.take().map(|d| d.len()), Some(1));
        assert!(!registry.is_active());
        assert!(registry.take().is_none());
        assert!(DeviceRegistry::Empty.get_by_internal_id(11).is_none());
    }
}
