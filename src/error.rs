use thiserror::Error;

#[derive(Error, Debug)]
pub enum CatalogError {
    #[error("Failed to read device catalog: {0}")]
    IoError(#[from] std::io::Error),
    #[error("Failed to parse device catalog: {0}")]
    ParseError(#[from] serde_json::Error),
    #[error("Device catalog must be a profile object or an array of profiles")]
    InvalidLayout,
}

#[derive(Error, Debug)]
pub enum HardwareError {
    #[error("HID error: {0}")]
    Hid(#[from] hidapi::HidError),
    #[error("No open device with internal id {0}")]
    UnknownDevice(u32),
    #[error("Expected 90 bytes of data as razer report, got {0}")]
    ReportLength(usize),
    #[error("Get report has no valid crc")]
    InvalidCrc,
    #[error("Response doesn't match request")]
    Mismatch,
    #[error("Command not supported")]
    NotSupported,
    #[error("Command failed")]
    Failed,
    #[error("Error unknown report status {0:#04x}")]
    UnknownStatus(u8),
    #[error("Abort command (tries: {0})")]
    RetriesExhausted(u8),
}

#[derive(Error, Debug)]
pub enum DeviceError {
    #[error("{name}: {source}")]
    Hardware {
        name: String,
        #[source]
        source: HardwareError,
    },
    #[error("Device task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
    #[error("Initialization task panicked")]
    InitPanicked,
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config: {0}")]
    IoError(#[from] std::io::Error),
    #[error("Failed to parse config: {0}")]
    ParseError(#[from] serde_json::Error),
}

/// Errors surfaced by the device manager. Per-device problems are never
/// reported here; they only remove that device from the active set.
#[derive(Error, Debug)]
pub enum Error {
    #[error("Hardware layer failure: {0}")]
    Hardware(#[from] HardwareError),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
