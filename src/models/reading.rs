// Per-device reading as published under `current`

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Sensor kind (e.g. "temperature") -> value rounded to the configured resolution.
pub type SensorValues = BTreeMap<String, f64>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceReading {
    pub id: String,
    pub device_type: String,
    pub device_family: String,
    pub sensor_values: SensorValues,
    /// Epoch milliseconds of the last value change.
    pub last_modified: i64,
    pub is_active: bool,
    /// Local wall-clock mirror of `last_modified`; only kept when the `strftime` setting is on.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub formatted_time: Option<String>,
}

/// Format used for `formatted_time`.
pub const FORMATTED_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Rounds `value` to `ndigits` decimal places (half away from zero).
pub fn round_to(value: f64, ndigits: u32) -> f64 {
    let factor = 10f64.powi(ndigits as i32);
    let scaled = (value * factor).round() / factor;
    if scaled.is_finite() { scaled } else { value }
}
