// Sensor bus seam: enumerate device handles, read each one independently.
// The engine only sees these traits; `OwfsBus` is the driver used by the binary.

mod owfs;
pub mod sensors;

pub use owfs::OwfsBus;

use std::path::PathBuf;

use crate::models::SensorValues;

#[derive(Debug, thiserror::Error)]
pub enum BusError {
    #[error("{path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("{path}: cannot parse {value:?} as a number")]
    Parse { path: PathBuf, value: String },
    #[error(
        "no sensor values known for device type {0:?} (supported: {supported})",
        supported = sensors::SUPPORTED_TYPES.join(", ")
    )]
    UnsupportedType(String),
    #[error("property {0:?} not available")]
    MissingProperty(String),
}

/// One device on the bus. Reads may fail without affecting other devices.
pub trait DeviceHandle: Send {
    /// Stable bus address, unique per device.
    fn id(&self) -> &str;
    fn device_type(&self) -> &str;
    fn family(&self) -> &str;
    /// Current sensor values rounded to `resolution` decimal places.
    fn read(&self, resolution: u32) -> Result<SensorValues, BusError>;
}

pub trait SensorBus: Send + Sync {
    /// Devices currently present on the bus.
    fn devices(&self) -> Result<Vec<Box<dyn DeviceHandle>>, BusError>;
}
