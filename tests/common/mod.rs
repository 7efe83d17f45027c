// Shared test helpers: a scripted in-memory sensor bus and fixed clocks

#![allow(dead_code)]

use chrono::{DateTime, TimeZone, Utc};
use sensorpoll::bus::{BusError, DeviceHandle, SensorBus};
use sensorpoll::models::{SensorValues, Settings};
use std::collections::BTreeMap;
use std::sync::Mutex;

#[derive(Clone)]
pub struct FakeDevice {
    pub id: String,
    pub device_type: String,
    pub family: String,
    pub values: SensorValues,
    pub fail: bool,
}

impl DeviceHandle for FakeDevice {
    fn id(&self) -> &str {
        &self.id
    }

    fn device_type(&self) -> &str {
        &self.device_type
    }

    fn family(&self) -> &str {
        &self.family
    }

    fn read(&self, _resolution: u32) -> Result<SensorValues, BusError> {
        if self.fail {
            return Err(BusError::MissingProperty("temperature".into()));
        }
        Ok(self.values.clone())
    }
}

/// Devices present on the bus, keyed by id. Tests mutate it between cycles.
#[derive(Default)]
pub struct FakeBus {
    devices: Mutex<BTreeMap<String, FakeDevice>>,
}

impl FakeBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, id: &str, values: &[(&str, f64)]) {
        let mut devices = self.devices.lock().unwrap();
        let device = devices.entry(id.to_string()).or_insert_with(|| FakeDevice {
            id: id.to_string(),
            device_type: "DS18B20".into(),
            family: "28".into(),
            values: SensorValues::new(),
            fail: false,
        });
        device.values = values.iter().map(|(k, v)| (k.to_string(), *v)).collect();
        device.fail = false;
    }

    pub fn fail(&self, id: &str) {
        if let Some(d) = self.devices.lock().unwrap().get_mut(id) {
            d.fail = true;
        }
    }

    pub fn remove(&self, id: &str) {
        self.devices.lock().unwrap().remove(id);
    }
}

impl SensorBus for FakeBus {
    fn devices(&self) -> Result<Vec<Box<dyn DeviceHandle>>, BusError> {
        Ok(self
            .devices
            .lock()
            .unwrap()
            .values()
            .cloned()
            .map(|d| Box::new(d) as Box<dyn DeviceHandle>)
            .collect())
    }
}

pub fn values(pairs: &[(&str, f64)]) -> SensorValues {
    pairs.iter().map(|(k, v)| (k.to_string(), *v)).collect()
}

/// 2024-03-05 at h:m:s UTC.
pub fn at(h: u32, m: u32, s: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 5, h, m, s).unwrap()
}

pub fn timeseries_settings(unit: &str, size: i64) -> Settings {
    Settings {
        timeseries_enable: true,
        timeseries_bucket_type: unit.into(),
        timeseries_bucket_size: size,
        ..Settings::default()
    }
}
