// Sensor library: which properties each device type exposes and how they turn into values.

use super::BusError;
use crate::models::{SensorValues, round_to};

/// Numeric device properties by name (e.g. "temperature", "VAD").
pub trait PropertySource {
    fn property(&self, name: &str) -> Result<f64, BusError>;
}

/// Device types with a known sensor layout.
pub const SUPPORTED_TYPES: &[&str] = &["DS18B20", "DS2438"];

/// Reads every sensor a `device_type` provides, rounded to `ndigits`.
pub fn read_sensors(
    device_type: &str,
    source: &dyn PropertySource,
    ndigits: u32,
) -> Result<SensorValues, BusError> {
    let mut values = SensorValues::new();
    match device_type.to_uppercase().as_str() {
        "DS18B20" => {
            values.insert("temperature".into(), source.property("temperature")?);
        }
        "DS2438" => {
            let temperature = source.property("temperature")?;
            let humidity = match source.property("humidity") {
                Ok(h) => h,
                Err(_) => {
                    let vad = source.property("VAD")?;
                    let vdd = source.property("VDD")?;
                    hih4000_humidity(vad, vdd, temperature)?
                }
            };
            values.insert("temperature".into(), temperature);
            values.insert("humidity".into(), humidity);
        }
        other => return Err(BusError::UnsupportedType(other.to_string())),
    }
    for v in values.values_mut() {
        *v = round_to(*v, ndigits);
    }
    Ok(values)
}

/// Relative humidity from an HIH-4000 wired to a DS2438: output voltage `vad` on supply `vdd`,
/// compensated for `temperature` (°C).
pub fn hih4000_humidity(vad: f64, vdd: f64, temperature: f64) -> Result<f64, BusError> {
    if vdd <= 0.0 {
        return Err(BusError::MissingProperty("VDD".into()));
    }
    let sensor_rh = (vad / vdd - 0.16) / 0.0062;
    Ok(sensor_rh / (1.0546 - 0.00216 * temperature))
}
