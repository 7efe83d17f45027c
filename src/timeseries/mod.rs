// Time-bucket aggregation: one open bucket collects raw samples; on expiry it is rolled up
// into min/max/mean points keyed by the bucket start and merged into the running timeseries.

pub mod align;

use std::collections::BTreeMap;

use chrono::{DateTime, TimeZone};
use tracing::{debug, info, warn};

use crate::models::{AggregatedPoint, BucketUnit, Timeseries, merge_timeseries, round_to};

pub use align::{aligned_bucket_start, bucket_key, clamp_size, is_expired};

/// Sample timestamp (epoch ms) -> value, for one device sensor.
type SampleSet = BTreeMap<i64, f64>;

/// Lifecycle of the single live bucket. Rolling over is transient inside [`BucketAggregator::rollover`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BucketState {
    Empty,
    Accumulating,
}

#[derive(Debug)]
pub struct BucketAggregator<Tz: TimeZone> {
    bucket_start: Option<DateTime<Tz>>,
    samples: BTreeMap<String, BTreeMap<String, SampleSet>>,
    timeseries: Timeseries,
}

impl<Tz: TimeZone> Default for BucketAggregator<Tz> {
    fn default() -> Self {
        Self::new()
    }
}

impl<Tz: TimeZone> BucketAggregator<Tz> {
    pub fn new() -> Self {
        Self {
            bucket_start: None,
            samples: BTreeMap::new(),
            timeseries: Timeseries::new(),
        }
    }

    pub fn state(&self) -> BucketState {
        if self.bucket_start.is_some() {
            BucketState::Accumulating
        } else {
            BucketState::Empty
        }
    }

    pub fn bucket_start(&self) -> Option<&DateTime<Tz>> {
        self.bucket_start.as_ref()
    }

    /// Opens a bucket aligned to `now`. An out-of-range size is clamped with a warning.
    pub fn open(&mut self, now: &DateTime<Tz>, unit: BucketUnit, size: i64) -> DateTime<Tz> {
        let (clamped, out_of_bounds) = clamp_size(unit, size);
        if out_of_bounds {
            warn!(
                configured = size,
                clamped,
                unit = %unit,
                "bucket size out of bounds; clamped"
            );
        }
        let start = aligned_bucket_start(now, unit, size);
        info!(
            bucket_start = %start.naive_local().format("%H:%M:%S"),
            size = clamped,
            unit = %unit,
            "bucket time set"
        );
        self.bucket_start = Some(start.clone());
        start
    }

    /// False while no bucket is open.
    pub fn is_expired(&self, now: &DateTime<Tz>, unit: BucketUnit, size: i64) -> bool {
        let Some(start) = &self.bucket_start else {
            return false;
        };
        let expired = is_expired(start, now, unit, size);
        debug!(
            expired,
            bucket_start = %start.naive_local().format("%H:%M:%S"),
            now = %now.naive_local().format("%H:%M:%S"),
            "bucket expiry check"
        );
        expired
    }

    /// Adds one sample to the open bucket. Returns false (and stores nothing) when no bucket is open.
    pub fn record(
        &mut self,
        device_id: &str,
        sensor: &str,
        value: f64,
        timestamp: &DateTime<Tz>,
    ) -> bool {
        if self.bucket_start.is_none() {
            debug!(device_id, sensor, "no open bucket; sample dropped");
            return false;
        }
        self.samples
            .entry(device_id.to_string())
            .or_default()
            .entry(sensor.to_string())
            .or_default()
            .insert(timestamp.timestamp_millis(), value);
        true
    }

    /// Summarizes every device sensor with samples, merges the points into the running
    /// timeseries and returns them. The bucket is cleared and left empty.
    pub fn rollover(&mut self, resolution: u32) -> Timeseries {
        let mut delta = Timeseries::new();
        let samples = std::mem::take(&mut self.samples);
        let Some(start) = self.bucket_start.take() else {
            return delta;
        };
        let key = bucket_key(&start);

        for (device_id, sensors) in samples {
            for (sensor, set) in sensors {
                let Some(point) = summarize(&set, resolution) else {
                    continue;
                };
                info!(
                    device_id = %device_id,
                    sensor = %sensor,
                    bucket_start = %start.naive_local().format("%H:%M:%S"),
                    min = point.min,
                    mean = point.mean,
                    max = point.max,
                    "bucket emptied"
                );
                delta
                    .entry(device_id.clone())
                    .or_default()
                    .entry(sensor)
                    .or_default()
                    .insert(key.clone(), point);
            }
        }
        merge_timeseries(&mut self.timeseries, &delta);
        delta
    }

    /// Everything rolled up so far. Never pruned here.
    pub fn timeseries(&self) -> &Timeseries {
        &self.timeseries
    }

    pub fn sample_count(&self) -> usize {
        self.samples
            .values()
            .flat_map(|sensors| sensors.values())
            .map(|set| set.len())
            .sum()
    }
}

/// min/max/mean of one sample set; None for an empty set.
fn summarize(set: &SampleSet, resolution: u32) -> Option<AggregatedPoint> {
    if set.is_empty() {
        return None;
    }
    let min = set.values().copied().fold(f64::INFINITY, f64::min);
    let max = set.values().copied().fold(f64::NEG_INFINITY, f64::max);
    let mean = set.values().sum::<f64>() / (set.len().max(1) as f64);
    Some(AggregatedPoint {
        min,
        max,
        mean: round_to(mean, resolution),
    })
}
