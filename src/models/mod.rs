// Domain models: device readings, rolled-up timeseries, settings snapshot

mod reading;
mod settings;
mod timeseries;

pub use reading::{DeviceReading, FORMATTED_TIME_FORMAT, SensorValues, round_to};
pub use settings::{
    BucketUnit, KEY_LOG_LEVEL, KEY_POLL_ENABLE, KEY_SENSOR_RESOLUTION, KEY_STRFTIME,
    KEY_TIMESERIES_BUCKET_SIZE, KEY_TIMESERIES_BUCKET_TYPE, KEY_TIMESERIES_ENABLE, RawSettings,
    SettingEntry, Settings, SettingsError, changed_keys,
};
pub use timeseries::{AggregatedPoint, SensorSeries, Timeseries, merge_timeseries, point_count};

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Device id -> reading, as published under `current`.
pub type CurrentSnapshot = BTreeMap<String, DeviceReading>;

/// What one poll cycle hands to the publisher.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CycleOutput {
    /// Epoch milliseconds the cycle ran at.
    pub timestamp: i64,
    pub current: CurrentSnapshot,
    /// Points produced by a rollover in this cycle; empty when no bucket expired.
    pub timeseries_delta: Timeseries,
}
