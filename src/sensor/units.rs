// Pressure unit conversion
// Maps raw sensor counts onto physical pressure units

use serde::{Deserialize, Serialize};

/// Lowest valid 24-bit reading (10% of full scale)
pub const RAW_MIN: i64 = 0x19999A;

/// Highest valid 24-bit reading (90% of full scale)
pub const RAW_MAX: i64 = 0xE66666;

/// Hectopascals per pound-force per square inch
pub const HPA_PER_PSI: f64 = 68.947_572_931_683_6;

/// Convert a raw 24-bit digital reading into hectopascals.
///
/// The counts are mapped linearly from `[RAW_MIN, RAW_MAX]` onto
/// `[p_min, p_max]` psi and then converted to hPa. Readings outside the
/// valid window are still converted and may land below `p_min` or above
/// `p_max`.
pub fn raw_to_hectopascal(raw: i64, p_min: f64, p_max: f64) -> f64 {
    let span = (RAW_MAX - RAW_MIN) as f64;
    let psi = p_min + (raw - RAW_MIN) as f64 * (p_max - p_min) / span;
    psi_to_hectopascal(psi)
}

/// Convert psi to hectopascals
pub fn psi_to_hectopascal(psi: f64) -> f64 {
    psi * HPA_PER_PSI
}

/// Transfer function of a ratiometric analog pressure sensor sampled by an ADC.
///
/// Assumes voltage and pressure are linear: `v = m * p + o`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalogSensor {
    /// Output voltage at `pmin`
    pub vmin: f64,

    /// Output voltage at `pmax`
    pub vmax: f64,

    /// Lowest working pressure
    pub pmin: f64,

    /// Highest working pressure
    pub pmax: f64,

    /// ADC resolution in counts (e.g. 1024 for 10 bits)
    pub resolution: f64,

    /// ADC reference voltage
    pub working_voltage: f64,
}

impl Default for AnalogSensor {
    fn default() -> Self {
        AnalogSensor {
            vmin: 0.5,
            vmax: 4.5,
            pmin: 0.0,
            pmax: 6.0,
            resolution: 1024.0,
            working_voltage: 5.0,
        }
    }
}

impl AnalogSensor {
    /// Pressure for an ADC count (counts may be fractional after filtering)
    pub fn to_pressure(&self, counts: f64) -> f64 {
        let volts_per_bit = self.working_voltage / self.resolution;
        let slope = (self.vmax - self.vmin) / (self.pmax - self.pmin);
        let volts = counts * volts_per_bit;
        (volts - self.vmin) / slope + self.pmin
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_raw_min_maps_to_p_min() {
        let hpa = raw_to_hectopascal(RAW_MIN, 0.0, 25.0);
        assert!(hpa.abs() < 1e-9);

        let hpa = raw_to_hectopascal(RAW_MIN, 2.0, 25.0);
        assert!((hpa - 2.0 * HPA_PER_PSI).abs() < 1e-9);
    }

    #[test]
    fn test_raw_max_maps_to_p_max() {
        let hpa = raw_to_hectopascal(RAW_MAX, 0.0, 25.0);
        assert!((hpa - 25.0 * HPA_PER_PSI).abs() < 1e-6);
    }

    #[test]
    fn test_out_of_range_is_not_rejected() {
        let below = raw_to_hectopascal(0, 0.0, 25.0);
        assert!(below < 0.0);

        let above = raw_to_hectopascal(0xFFFFFF, 0.0, 25.0);
        assert!(above > 25.0 * HPA_PER_PSI);
    }

    #[test]
    fn test_analog_sensor_endpoints() {
        let sensor = AnalogSensor::default();

        // 0.5 V is 102.4 counts at 5 V / 1024
        assert!(sensor.to_pressure(102.4).abs() < 1e-9);
        // 4.5 V is 921.6 counts
        assert!((sensor.to_pressure(921.6) - 6.0).abs() < 1e-9);
    }
}
