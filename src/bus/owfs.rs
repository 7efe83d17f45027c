// 1-Wire bus through an OWFS directory tree (owfs FUSE mount or a copy of it).
// Each device is a directory named `FF.XXXXXXXXXXXX` (family code, dot, 12 hex digits) holding
// one text file per property. Point `root` at `<mount>/uncached` to bypass the owserver cache.

use std::fs;
use std::path::{Path, PathBuf};

use super::sensors::{PropertySource, read_sensors};
use super::{BusError, DeviceHandle, SensorBus};
use crate::models::SensorValues;

pub struct OwfsBus {
    root: PathBuf,
}

impl OwfsBus {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl SensorBus for OwfsBus {
    fn devices(&self) -> Result<Vec<Box<dyn DeviceHandle>>, BusError> {
        let entries = fs::read_dir(&self.root).map_err(|source| BusError::Io {
            path: self.root.clone(),
            source,
        })?;

        let mut devices: Vec<OwfsDevice> = Vec::new();
        for entry in entries.flatten() {
            let path = entry.path();
            let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            if !path.is_dir() || !is_device_address(name) {
                continue;
            }
            let id = name.to_string();
            let family = read_text(&path.join("family"))
                .unwrap_or_else(|_| id[..2].to_string());
            let device_type = match read_text(&path.join("type")) {
                Ok(t) => t,
                Err(e) => {
                    tracing::warn!(device_id = %id, error = %e, "device type unreadable; skipped");
                    continue;
                }
            };
            devices.push(OwfsDevice {
                path,
                id,
                device_type,
                family,
            });
        }
        devices.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(devices
            .into_iter()
            .map(|d| Box::new(d) as Box<dyn DeviceHandle>)
            .collect())
    }
}

struct OwfsDevice {
    path: PathBuf,
    id: String,
    device_type: String,
    family: String,
}

impl PropertySource for OwfsDevice {
    fn property(&self, name: &str) -> Result<f64, BusError> {
        let path = self.path.join(name);
        if !path.exists() {
            return Err(BusError::MissingProperty(name.to_string()));
        }
        let text = read_text(&path)?;
        text.parse::<f64>().map_err(|_| BusError::Parse { path, value: text })
    }
}

impl DeviceHandle for OwfsDevice {
    fn id(&self) -> &str {
        &self.id
    }

    fn device_type(&self) -> &str {
        &self.device_type
    }

    fn family(&self) -> &str {
        &self.family
    }

    fn read(&self, resolution: u32) -> Result<SensorValues, BusError> {
        read_sensors(&self.device_type, self, resolution)
    }
}

fn read_text(path: &Path) -> Result<String, BusError> {
    fs::read_to_string(path)
        .map(|s| s.trim().to_string())
        .map_err(|source| BusError::Io {
            path: path.to_path_buf(),
            source,
        })
}

/// `28.0000055A1F2B` style address: two hex digits, a dot, twelve hex digits.
fn is_device_address(name: &str) -> bool {
    let Some((family, serial)) = name.split_once('.') else {
        return false;
    };
    family.len() == 2
        && serial.len() == 12
        && family.chars().all(|c| c.is_ascii_hexdigit())
        && serial.chars().all(|c| c.is_ascii_hexdigit())
}
