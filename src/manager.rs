use log::{debug, info, warn};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;
use tokio::time::Instant;

use crate::controller::HardwareLayer;
use crate::device::{self, DeviceProperties, RazerDevice, SettingsHandle, StateHandle};
use crate::devices::DeviceCatalog;
use crate::error::{DeviceError, Result};
use crate::product_id::{ProductId, RawProductId};
use crate::registry::DeviceRegistry;

pub const REFRESH_THROTTLE: Duration = Duration::from_millis(2000);

/// What happened to each attached device during a refresh.
#[derive(Debug, Default)]
pub struct RefreshSummary {
    pub active: usize,
    /// Devices whose product id could not be parsed
    pub invalid_ids: Vec<(u32, RawProductId)>,
    /// Devices with no catalog profile
    pub unmatched: Vec<(u32, ProductId)>,
    /// Devices whose initialization failed
    pub failed: Vec<(u32, DeviceError)>,
}

#[derive(Debug)]
pub enum RefreshOutcome {
    /// Called again inside the throttle window; nothing was done.
    Throttled,
    Completed(RefreshSummary),
}

/// True while `now` is still inside the window opened by `last`.
pub fn is_throttled(last: Option<Instant>, now: Instant, window: Duration) -> bool {
    last.is_some_and(|last| now.saturating_duration_since(last) < window)
}

type InitOutput = (usize, RazerDevice, std::result::Result<(), DeviceError>);

/// Waits for every initialization task to finish. Returns the initialized
/// devices in discovery order and the internal ids that failed, including
/// tasks that panicked. `pending` maps discovery index to internal id.
async fn settle(
    mut tasks: JoinSet<InitOutput>,
    mut pending: HashMap<usize, u32>,
) -> (Vec<RazerDevice>, Vec<(u32, DeviceError)>) {
    let mut initialized = Vec::new();
    let mut failed = Vec::new();

    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok((index, device, Ok(()))) => {
                pending.remove(&index);
                initialized.push((index, device));
            }
            Ok((index, mut device, Err(err))) => {
                pending.remove(&index);
                warn!("Failed to initialize {}: {}", device.name(), err);
                device.destroy();
                failed.push((device.internal_id(), err));
            }
            Err(err) => warn!("Device initialization task failed: {}", err),
        }
    }

    // Anything left never handed its device back.
    let mut lost: Vec<_> = pending.into_iter().collect();
    lost.sort_unstable();
    failed.extend(
        lost.into_iter()
            .map(|(_, internal_id)| (internal_id, DeviceError::InitPanicked)),
    );

    // Restore discovery order so the display sort breaks ties by it.
    initialized.sort_by_key(|(index, _)| *index);
    (initialized.into_iter().map(|(_, device)| device).collect(), failed)
}

/// Reconciles attached hardware with the device catalog and owns the
/// resulting devices.
pub struct DeviceManager {
    hardware: Arc<dyn HardwareLayer>,
    catalog: DeviceCatalog,
    settings: SettingsHandle,
    state: StateHandle,
    registry: DeviceRegistry,
    last_refresh: Option<Instant>,
    throttle: Duration,
}

impl DeviceManager {
    pub fn new(
        hardware: Arc<dyn HardwareLayer>,
        catalog: DeviceCatalog,
        settings: SettingsHandle,
        state: StateHandle,
    ) -> Self {
        info!("Device catalog holds {} profile(s)", catalog.len());
        Self {
            hardware,
            catalog,
            settings,
            state,
            registry: DeviceRegistry::Empty,
            last_refresh: None,
            throttle: REFRESH_THROTTLE,
        }
    }

    pub fn with_throttle(mut self, throttle: Duration) -> Self {
        self.throttle = throttle;
        self
    }

    pub fn catalog(&self) -> &DeviceCatalog {
        &self.catalog
    }

    pub fn devices(&self) -> &[RazerDevice] {
        self.registry.devices()
    }

    pub fn get_by_internal_id(&self, internal_id: u32) -> Option<&RazerDevice> {
        self.registry.get_by_internal_id(internal_id)
    }

    pub fn get_by_internal_id_mut(&mut self, internal_id: u32) -> Option<&mut RazerDevice> {
        self.registry.get_by_internal_id_mut(internal_id)
    }

    /// Tears down the current set, enumerates attached hardware and
    /// replaces the set with every device that matched and initialized.
    ///
    /// Hardware enumeration and close failures are returned; anything that
    /// goes wrong with a single device only drops that device.
    pub async fn refresh(&mut self) -> Result<RefreshOutcome> {
        let now = Instant::now();
        if is_throttled(self.last_refresh, now, self.throttle) {
            debug!("Refresh throttled");
            return Ok(RefreshOutcome::Throttled);
        }
        self.last_refresh = Some(now);

        self.close_all()?;
        let discovered = self.hardware.get_all_devices()?;
        debug!("Hardware reports {} device(s)", discovered.len());

        let mut summary = RefreshSummary::default();
        let mut tasks = JoinSet::new();
        let mut pending = HashMap::new();

        for (index, found) in discovered.into_iter().enumerate() {
            let internal_id = found.internal_device_id;

            let Some(product_id) = found.product_id.normalize() else {
                warn!(
                    "Skipping device {}: unrecognized product id {}",
                    internal_id, found.product_id
                );
                summary.invalid_ids.push((internal_id, found.product_id));
                continue;
            };

            let Some(profile) = self.catalog.find(product_id) else {
                info!(
                    "Skipping device {}: no profile for product id {} (known: {})",
                    internal_id,
                    product_id,
                    self.known_ids()
                );
                summary.unmatched.push((internal_id, product_id));
                continue;
            };

            let mut device = device::create(
                Arc::clone(&self.hardware),
                Arc::clone(&self.settings),
                Arc::clone(&self.state),
                DeviceProperties::from_profile(profile, internal_id),
            );

            pending.insert(index, internal_id);
            tasks.spawn(async move {
                let result = device.init().await;
                (index, device, result)
            });
        }

        let (initialized, failed) = settle(tasks, pending).await;
        summary.failed = failed;
        self.registry = DeviceRegistry::active(initialized);
        summary.active = self.registry.len();

        info!(
            "Refresh complete: {} active, {} unmatched, {} invalid, {} failed",
            summary.active,
            summary.unmatched.len(),
            summary.invalid_ids.len(),
            summary.failed.len()
        );
        Ok(RefreshOutcome::Completed(summary))
    }

    /// Releases the hardware handles of the active set once and clears it.
    /// Does nothing when no set is active.
    pub fn close_all(&mut self) -> Result<()> {
        if !self.registry.is_active() {
            return Ok(());
        }

        self.hardware.close_all_devices()?;
        if let Some(devices) = self.registry.take() {
            debug!("Closed {} device(s)", devices.len());
        }
        Ok(())
    }

    /// Destroys every active device, closes the hardware and drops the
    /// manager along with its hardware handle.
    pub fn destroy(mut self) -> Result<()> {
        self.registry.destroy_all();
        self.close_all()?;
        info!("Device manager destroyed");
        Ok(())
    }

    fn known_ids(&self) -> String {
        self.catalog
            .known_product_ids()
            .iter()
            .map(ProductId::to_string)
            .collect::<Vec<_>>()
            .join(", ")
    }
}
