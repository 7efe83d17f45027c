// Rolled-up bucket statistics: device -> sensor -> bucket key -> point.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One bucket's min/max/mean for a single device sensor.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AggregatedPoint {
    pub min: f64,
    pub max: f64,
    pub mean: f64,
}

/// Bucket key (bucket start as integer epoch seconds, as text) -> point.
pub type SensorSeries = BTreeMap<String, AggregatedPoint>;

/// Device id -> sensor kind -> series. Used both for the running store and for a single rollover delta.
pub type Timeseries = BTreeMap<String, BTreeMap<String, SensorSeries>>;

/// Merges `delta` into `target`; points with the same bucket key are replaced.
pub fn merge_timeseries(target: &mut Timeseries, delta: &Timeseries) {
    for (device_id, sensors) in delta {
        let device = target.entry(device_id.clone()).or_default();
        for (sensor, series) in sensors {
            device
                .entry(sensor.clone())
                .or_default()
                .extend(series.iter().map(|(k, p)| (k.clone(), *p)));
        }
    }
}

/// Number of points in a timeseries (all devices, all sensors).
pub fn point_count(ts: &Timeseries) -> usize {
    ts.values()
        .flat_map(|sensors| sensors.values())
        .map(|series| series.len())
        .sum()
}
