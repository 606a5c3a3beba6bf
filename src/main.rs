use anyhow::{Context, Result};
use clap::Parser;
use log::{error, info};
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;

use razer_device_core::config::{self, Config};
use razer_device_core::{DeviceCatalog, DeviceManager, HidHardware, RazerDevice, RefreshOutcome};

#[derive(Parser, Debug)]
#[command(name = "razer-device-core")]
#[command(about = "Detect attached Razer devices and show their configured features")]
#[command(version)]
struct Args {
    /// Path to configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Device catalog file or directory (overrides the config file)
    #[arg(long)]
    catalog: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long)]
    log_level: Option<String>,

    /// Keep polling for device changes until interrupted
    #[arg(short, long)]
    watch: bool,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut config = match args.config.clone().or_else(Config::default_path) {
        Some(path) => config::load_config(&path)
            .with_context(|| format!("Failed to load config from {:?}", path))?,
        None => Config::default(),
    };
    if let Some(catalog) = args.catalog {
        config.catalog = Some(catalog);
    }
    if let Some(level) = args.log_level {
        config.log_level = level;
    }

    pretty_env_logger::formatted_builder()
        .parse_filters(&config.log_level)
        .init();

    let catalog = match &config.catalog {
        Some(path) => DeviceCatalog::load(path)
            .with_context(|| format!("Failed to load device catalog from {:?}", path))?,
        None => DeviceCatalog::builtin(),
    };

    let hardware = HidHardware::new().context("Failed to initialize HidApi")?;
    let mut manager = DeviceManager::new(
        Arc::new(hardware),
        catalog,
        Arc::new(config.clone()),
        Arc::new(()),
    )
    .with_throttle(config.refresh_throttle());

    if args.watch {
        watch(&mut manager, &config).await;
    } else {
        manager.refresh().await?;
        print_devices(manager.devices());
    }

    manager.destroy()?;
    Ok(())
}

async fn watch(manager: &mut DeviceManager, config: &Config) {
    let mut ticker = tokio::time::interval(config.watch_interval());
    let mut known: HashSet<u32> = HashSet::new();

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            _ = ticker.tick() => {}
        }

        match manager.refresh().await {
            Ok(RefreshOutcome::Completed(_)) => {}
            Ok(RefreshOutcome::Throttled) => continue,
            Err(err) => {
                error!("Failed to refresh devices: {}", err);
                continue;
            }
        }

        let current: HashSet<u32> = manager
            .devices()
            .iter()
            .map(|device| u32::from(device.product_id().value()))
            .collect();

        for pid in known.difference(&current) {
            info!("Device removed: {:#06x}", pid);
        }
        for device in manager.devices() {
            if !known.contains(&u32::from(device.product_id().value())) {
                info!("New device: {}", device.name());
            }
        }

        known = current;
    }
}

fn print_devices(devices: &[RazerDevice]) {
    println!("Found {} device(s):", devices.len());
    for device in devices {
        println!(
            "  - {} ({}) [{}] id {}",
            device.name(),
            device.product_id(),
            device.main_type(),
            device.internal_id()
        );
        if let Some(firmware) = &device.core().firmware_version {
            println!("    Firmware: {}", firmware);
        }
        if let Some(battery) = device.battery() {
            println!(
                "    Battery: {}%{}",
                battery.level,
                if battery.is_charging { " (charging)" } else { "" }
            );
        }
        if let Some(dpi) = device.dpi() {
            println!("    DPI: {}x{}", dpi.x, dpi.y);
        }
        let features: Vec<String> = device
            .features()
            .iter()
            .map(|feature| feature.identifier.to_string())
            .collect();
        println!("    Features: {}", features.join(", "));
    }
}
