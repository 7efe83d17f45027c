// Device registry: last known reading per device and per-poll change detection.
// Two-phase protocol per cycle: begin_poll() marks everything inactive, ingest() reactivates
// what the bus reported. Records are never removed.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, TimeZone};

use crate::models::{CurrentSnapshot, DeviceReading, FORMATTED_TIME_FORMAT, SensorValues};

#[derive(Debug, Default)]
pub struct DeviceRegistry {
    devices: BTreeMap<String, DeviceReading>,
}

impl DeviceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Marks every known device inactive. Devices ingested afterwards become active again.
    pub fn begin_poll(&mut self) {
        for reading in self.devices.values_mut() {
            reading.is_active = false;
        }
    }

    /// Merges a fresh reading for `device_id` and returns the merged state plus the
    /// sensors whose value changed. A first observation reports every sensor as changed.
    /// Sensors missing from `sensor_values` keep their previous value.
    pub fn ingest<Tz: TimeZone>(
        &mut self,
        device_id: &str,
        device_type: &str,
        device_family: &str,
        sensor_values: SensorValues,
        now: &DateTime<Tz>,
        strftime_enabled: bool,
    ) -> (DeviceReading, BTreeSet<String>) {
        let now_ms = now.timestamp_millis();

        let Some(reading) = self.devices.get_mut(device_id) else {
            let changed: BTreeSet<String> = sensor_values.keys().cloned().collect();
            let reading = DeviceReading {
                id: device_id.to_string(),
                device_type: device_type.to_string(),
                device_family: device_family.to_string(),
                sensor_values,
                last_modified: now_ms,
                is_active: true,
                formatted_time: strftime_enabled.then(|| format_local(now)),
            };
            self.devices.insert(device_id.to_string(), reading.clone());
            return (reading, changed);
        };

        reading.is_active = true;
        let mut changed = BTreeSet::new();
        for (sensor, value) in sensor_values {
            if reading.sensor_values.get(&sensor) != Some(&value) {
                reading.sensor_values.insert(sensor.clone(), value);
                changed.insert(sensor);
            }
        }
        if !changed.is_empty() {
            reading.last_modified = now_ms;
        }
        reading.formatted_time = if strftime_enabled {
            let tz = now.timezone();
            tz.timestamp_millis_opt(reading.last_modified)
                .single()
                .map(|t| format_local(&t))
        } else {
            None
        };
        (reading.clone(), changed)
    }

    /// All known devices, including the ones inactive this cycle.
    pub fn snapshot(&self) -> CurrentSnapshot {
        self.devices.clone()
    }

    pub fn get(&self, device_id: &str) -> Option<&DeviceReading> {
        self.devices.get(device_id)
    }

    /// Ids of devices not re-observed since the last `begin_poll`.
    pub fn inactive_ids(&self) -> Vec<&str> {
        self.devices
            .values()
            .filter(|r| !r.is_active)
            .map(|r| r.id.as_str())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }
}

fn format_local<Tz: TimeZone>(t: &DateTime<Tz>) -> String {
    t.naive_local().format(FORMATTED_TIME_FORMAT).to_string()
}
