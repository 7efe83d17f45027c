// One poll cycle: bucket lifecycle, device enumeration, registry update, output assembly.
// Synchronous; the worker runs it on a blocking thread because bus reads block.

use chrono::{DateTime, TimeZone};
use tracing::{debug, info, warn};

use crate::bus::SensorBus;
use crate::models::{BucketUnit, CycleOutput, Settings, Timeseries};
use crate::registry::DeviceRegistry;
use crate::timeseries::{BucketAggregator, BucketState};

#[derive(Debug)]
pub struct PollCycle<Tz: TimeZone> {
    registry: DeviceRegistry,
    aggregator: BucketAggregator<Tz>,
}

impl<Tz: TimeZone> Default for PollCycle<Tz> {
    fn default() -> Self {
        Self::new()
    }
}

impl<Tz: TimeZone> PollCycle<Tz> {
    pub fn new() -> Self {
        Self {
            registry: DeviceRegistry::new(),
            aggregator: BucketAggregator::new(),
        }
    }

    pub fn registry(&self) -> &DeviceRegistry {
        &self.registry
    }

    pub fn aggregator(&self) -> &BucketAggregator<Tz> {
        &self.aggregator
    }

    /// Runs one cycle at `now` against `settings`. Every sample recorded in this cycle is
    /// stamped with `now`, so it always falls inside the bucket checked at the top.
    pub fn run(&mut self, bus: &dyn SensorBus, settings: &Settings, now: DateTime<Tz>) -> CycleOutput {
        let unit = self.timeseries_unit(settings);
        let delta = match unit {
            Some(unit) => self.advance_bucket(&now, unit, settings),
            None => Timeseries::new(),
        };

        self.registry.begin_poll();

        let devices = match bus.devices() {
            Ok(d) => d,
            Err(e) => {
                warn!(error = %e, operation = "enumerate_devices", "sensor bus unavailable");
                Vec::new()
            }
        };

        for device in devices {
            let id = device.id().to_string();
            let values = match device.read(settings.sensor_resolution) {
                Ok(v) => v,
                Err(e) => {
                    warn!(
                        device_id = %id,
                        device_type = %device.device_type(),
                        error = %e,
                        operation = "read_device",
                        "failed to read device"
                    );
                    continue;
                }
            };

            let is_new = self.registry.get(&id).is_none();
            let previous = self.registry.get(&id).map(|r| r.sensor_values.clone());
            let (reading, changed) = self.registry.ingest(
                &id,
                device.device_type(),
                device.family(),
                values,
                &now,
                settings.strftime,
            );

            if unit.is_some() {
                for sensor in &changed {
                    if let Some(value) = reading.sensor_values.get(sensor) {
                        self.aggregator.record(&id, sensor, *value, &now);
                    }
                }
            }

            if is_new {
                info!(device_id = %id, device_type = %reading.device_type, values = ?reading.sensor_values, "device NEW");
            } else if changed.is_empty() {
                debug!(device_id = %id, device_type = %reading.device_type, "device unchanged");
            } else {
                let changes: Vec<String> = changed
                    .iter()
                    .map(|s| {
                        let old = previous.as_ref().and_then(|p| p.get(s)).copied();
                        let new = reading.sensor_values.get(s).copied();
                        format!("{}: {:?} -> {:?}", s, old, new)
                    })
                    .collect();
                info!(device_id = %id, device_type = %reading.device_type, changes = ?changes, "device changed");
            }
        }

        for id in self.registry.inactive_ids() {
            info!(device_id = %id, "device inactive");
        }

        CycleOutput {
            timestamp: now.timestamp_millis(),
            current: self.registry.snapshot(),
            timeseries_delta: delta,
        }
    }

    /// Bucket unit when timeseries collection runs this cycle. An unknown unit is reported and
    /// skips collection until the setting is corrected.
    fn timeseries_unit(&self, settings: &Settings) -> Option<BucketUnit> {
        if !settings.timeseries_enable {
            return None;
        }
        match settings.bucket_unit() {
            Ok(unit) => Some(unit),
            Err(e) => {
                warn!(error = %e, "timeseries collection skipped this cycle");
                None
            }
        }
    }

    /// Opens a bucket when none is open, or rolls an expired one over and opens the next.
    fn advance_bucket(&mut self, now: &DateTime<Tz>, unit: BucketUnit, settings: &Settings) -> Timeseries {
        let size = settings.timeseries_bucket_size;
        match self.aggregator.state() {
            BucketState::Empty => {
                self.aggregator.open(now, unit, size);
                Timeseries::new()
            }
            BucketState::Accumulating if self.aggregator.is_expired(now, unit, size) => {
                let delta = self.aggregator.rollover(settings.sensor_resolution);
                self.aggregator.open(now, unit, size);
                delta
            }
            BucketState::Accumulating => Timeseries::new(),
        }
    }
}
