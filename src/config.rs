//! Protection thresholds and capacity model, fixed for the lifetime of a
//! control cycle. Defaults are safe values for a generic Li-ion pack; a
//! settings layer may overwrite them before the handle is built.

use heapless::Vec;

use crate::fmt::*;

/// Sized for the 15s hardware variant (bq76940 front-end)
pub const NUM_CELLS_MAX: usize = 15;
pub const NUM_THERMISTORS_MAX: usize = 3;
pub const OCV_POINTS_MAX: usize = 21;

/// Default open-circuit voltage curve, volts per cell, 100% down to 0% at
/// even spacing
const OCV_LI_ION_DEFAULT: [f32; 11] = [
    4.20, 4.06, 3.98, 3.92, 3.87, 3.82, 3.78, 3.73, 3.67, 3.55, 3.00,
];

/// Rejection reasons for a configuration that the SOC math cannot work with
#[derive(Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ConfigError {
    /// `nominal_capacity_ah` is zero or negative
    InvalidCapacity,
    /// The OCV table needs at least two points to interpolate between
    OcvTableTooShort,
    /// The OCV table must be sorted strictly descending, fullest point first
    OcvTableNotDescending,
}

/// Thresholds and calibration data read by the state machine and the charge
/// accountant. Immutable during a cycle.
pub struct BmsConfig {
    /// Charge path over-temperature limit, °C
    pub chg_ot_limit: f32,
    /// Charge path under-temperature limit, °C
    pub chg_ut_limit: f32,
    /// Discharge path over-temperature limit, °C
    pub dis_ot_limit: f32,
    /// Discharge path under-temperature limit, °C
    pub dis_ut_limit: f32,

    /// Per-cell over-voltage limit, V
    pub cell_ov_limit: f32,
    /// Per-cell under-voltage limit, V
    pub cell_uv_limit: f32,

    /// Minimum time without significant pack current before balancing, s
    pub balancing_min_idle_s: u32,
    /// Balancing is pointless below this max-cell voltage, V
    pub balancing_cell_voltage_min: f32,
    /// Minimum max-to-min cell spread worth balancing out, V
    pub balancing_voltage_diff_target: f32,
    /// Currents below this magnitude count as idle, mA
    pub idle_current_threshold: f32,
    pub auto_balancing_enabled: bool,

    /// Usable pack capacity, Ah
    pub nominal_capacity_ah: f32,
    /// Open-circuit voltage calibration points, volts per cell, sorted
    /// descending. Point `i` maps to SOC `1 - i / (len - 1)`.
    pub ocv: Vec<f32, OCV_POINTS_MAX>,

    /// Thermistor beta constant, consumed by the analog layer during ADC
    /// conversion, not by the decision core
    pub thermistor_beta: u16,
}

impl Default for BmsConfig {
    fn default() -> Self {
        let mut ocv = Vec::new();
        ocv.extend_from_slice(&OCV_LI_ION_DEFAULT).ok();

        Self {
            chg_ot_limit: 45.0,
            chg_ut_limit: 0.0,
            dis_ot_limit: 60.0,
            dis_ut_limit: -20.0,
            cell_ov_limit: 4.2,
            cell_uv_limit: 3.0,
            balancing_min_idle_s: 1800, // default: 30 minutes
            balancing_cell_voltage_min: 3.2,
            balancing_voltage_diff_target: 0.01, // 10 mV
            idle_current_threshold: 30.0,        // mA
            auto_balancing_enabled: false,
            nominal_capacity_ah: 20.0,
            ocv,
            thermistor_beta: 3435, // typical value for Semitec 103AT-5
        }
    }
}

impl BmsConfig {
    /// Checks the capacity model before it is handed to the SOC math, which
    /// itself has no error path.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.nominal_capacity_ah <= 0.0 {
            return Err(ConfigError::InvalidCapacity);
        }

        if self.ocv.len() < 2 {
            return Err(ConfigError::OcvTableTooShort);
        }

        for pair in self.ocv.windows(2) {
            if pair[1] >= pair[0] {
                warn!("ocv table not descending");
                return Err(ConfigError::OcvTableNotDescending);
            }
        }

        Ok(())
    }
}
