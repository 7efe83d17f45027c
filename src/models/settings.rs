// Settings snapshot fetched from the telemetry store.
// The store keeps `{key: {name, value}}`; everything the engine reads is parsed once
// into an immutable `Settings` and replaced wholesale on refresh.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::str::FromStr;

/// One stored setting: display name and raw JSON value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SettingEntry {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub value: serde_json::Value,
}

/// Raw settings as kept in the store, keyed by setting key.
pub type RawSettings = BTreeMap<String, SettingEntry>;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum SettingsError {
    #[error("unknown timeseries bucket type {0:?} (expected h, m or s)")]
    UnknownBucketUnit(String),
}

/// Calendar unit a time bucket is aligned to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BucketUnit {
    Hour,
    Minute,
    Second,
}

impl BucketUnit {
    /// Largest accepted bucket size for the unit; bigger sizes are clamped.
    /// Seconds keep the historical bound of 61 (the range of a leap-second aware clock).
    pub fn max_size(self) -> u32 {
        match self {
            BucketUnit::Hour => 23,
            BucketUnit::Minute => 59,
            BucketUnit::Second => 61,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            BucketUnit::Hour => "hour",
            BucketUnit::Minute => "minute",
            BucketUnit::Second => "second",
        }
    }
}

impl FromStr for BucketUnit {
    type Err = SettingsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "h" => Ok(BucketUnit::Hour),
            "m" => Ok(BucketUnit::Minute),
            "s" => Ok(BucketUnit::Second),
            _ => Err(SettingsError::UnknownBucketUnit(s.to_string())),
        }
    }
}

impl std::fmt::Display for BucketUnit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

pub const KEY_TIMESERIES_ENABLE: &str = "timeseriesEnable";
pub const KEY_TIMESERIES_BUCKET_TYPE: &str = "timeseriesBucketType";
pub const KEY_TIMESERIES_BUCKET_SIZE: &str = "timeseriesBucketSize";
pub const KEY_SENSOR_RESOLUTION: &str = "sensorResolution";
pub const KEY_STRFTIME: &str = "strftime";
pub const KEY_POLL_ENABLE: &str = "pollEnable";
pub const KEY_LOG_LEVEL: &str = "logLevel";

/// Upper bound for `sensorResolution`; f64 has no meaningful digits past this.
const MAX_RESOLUTION: u32 = 9;

/// Immutable settings snapshot read once per poll cycle.
#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub timeseries_enable: bool,
    /// Raw bucket type as stored; see [`Settings::bucket_unit`].
    pub timeseries_bucket_type: String,
    pub timeseries_bucket_size: i64,
    pub sensor_resolution: u32,
    pub strftime: bool,
    pub poll_enable: bool,
    pub log_level: i64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            timeseries_enable: false,
            timeseries_bucket_type: "s".into(),
            timeseries_bucket_size: 1,
            sensor_resolution: 1,
            strftime: false,
            poll_enable: true,
            log_level: 2,
        }
    }
}

impl Settings {
    /// Builds a snapshot from stored settings. Missing or mistyped keys keep their defaults.
    pub fn from_entries(entries: &RawSettings) -> Self {
        let defaults = Self::default();
        let value = |key: &str| entries.get(key).map(|e| &e.value);
        Self {
            timeseries_enable: value(KEY_TIMESERIES_ENABLE)
                .and_then(as_bool)
                .unwrap_or(defaults.timeseries_enable),
            timeseries_bucket_type: value(KEY_TIMESERIES_BUCKET_TYPE)
                .and_then(|v| v.as_str().map(str::to_string))
                .unwrap_or(defaults.timeseries_bucket_type),
            timeseries_bucket_size: value(KEY_TIMESERIES_BUCKET_SIZE)
                .and_then(as_i64)
                .unwrap_or(defaults.timeseries_bucket_size),
            sensor_resolution: value(KEY_SENSOR_RESOLUTION)
                .and_then(as_i64)
                .map(|n| n.clamp(0, MAX_RESOLUTION as i64) as u32)
                .unwrap_or(defaults.sensor_resolution),
            strftime: value(KEY_STRFTIME)
                .and_then(as_bool)
                .unwrap_or(defaults.strftime),
            poll_enable: value(KEY_POLL_ENABLE)
                .and_then(as_bool)
                .unwrap_or(defaults.poll_enable),
            log_level: value(KEY_LOG_LEVEL)
                .and_then(as_i64)
                .unwrap_or(defaults.log_level),
        }
    }

    pub fn bucket_unit(&self) -> Result<BucketUnit, SettingsError> {
        self.timeseries_bucket_type.parse()
    }

    /// tracing filter directive for `logLevel` (1 debug .. 5 critical); unknown levels log everything.
    pub fn log_directive(&self) -> &'static str {
        match self.log_level {
            i64::MIN..=1 => "debug",
            2 => "info",
            3 => "warn",
            4 | 5 => "error",
            _ => "debug",
        }
    }
}

fn as_bool(v: &serde_json::Value) -> Option<bool> {
    match v {
        serde_json::Value::Bool(b) => Some(*b),
        serde_json::Value::Number(n) => n.as_i64().map(|n| n != 0),
        serde_json::Value::String(s) => match s.trim().to_lowercase().as_str() {
            "true" | "1" | "yes" | "on" => Some(true),
            "false" | "0" | "no" | "off" => Some(false),
            _ => None,
        },
        _ => None,
    }
}

fn as_i64(v: &serde_json::Value) -> Option<i64> {
    match v {
        serde_json::Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
        serde_json::Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Keys whose entry differs between two raw settings maps (added, removed or changed).
pub fn changed_keys(old: &RawSettings, new: &RawSettings) -> Vec<String> {
    let mut keys: Vec<String> = new
        .iter()
        .filter(|(k, v)| old.get(*k) != Some(*v))
        .map(|(k, _)| k.clone())
        .collect();
    keys.extend(old.keys().filter(|k| !new.contains_key(*k)).cloned());
    keys.sort();
    keys
}
