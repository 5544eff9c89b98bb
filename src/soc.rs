//! Charge accounting: mapping the coulomb counter to a state-of-charge
//! percentage and recalibrating the counter, either to a known percentage or
//! from open-circuit voltage.
//!
//! The counter drifts with sensor offset over time, so callers are expected
//! to recalibrate periodically (typically from OCV after a long idle phase).

use crate::config::BmsConfig;
use crate::fmt::*;
use crate::status::BmsStatus;

/// Milliamp-seconds per amp-hour
const MAS_PER_AH: f32 = 3.6e6;

/// Source for a coulomb counter recalibration
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SocReset {
    /// Set the counter to a known state of charge, percent, clamped to 0..=100
    Percent(f32),
    /// Estimate the charge state from open-circuit voltage and the
    /// configured calibration curve
    FromOcv,
}

/// Recomputes the stored percentage from the coulomb counter.
///
/// 360 = 3600 s/h with the mAs-to-Ah and percent scalings folded in.
pub fn update_soc(conf: &BmsConfig, status: &mut BmsStatus) {
    status.soc = status.coulomb_counter_mas / (conf.nominal_capacity_ah * 360.0);
}

/// Recalibrates the coulomb counter.
///
/// The OCV path assumes no current is flowing, so the terminal voltage is a
/// usable open-circuit estimate. Table points are evenly spaced on the SOC
/// axis; the measured per-cell voltage is interpolated between the two
/// bracketing points. A voltage above the first point counts as full; a
/// voltage below the last one leaves the counter at the depleted default.
pub fn reset_soc(conf: &BmsConfig, status: &mut BmsStatus, reset: SocReset) {
    let capacity_mas = conf.nominal_capacity_ah * MAS_PER_AH;

    match reset {
        SocReset::Percent(percent) => {
            let percent = percent.clamp(0.0, 100.0);
            status.coulomb_counter_mas = capacity_mas * (percent / 100.0);
        }
        SocReset::FromOcv => {
            info!(
                "soc reset from ocv: {} cells, {} V pack",
                status.connected_cells, status.pack_voltage
            );

            let cell_voltage = status.pack_voltage / status.connected_cells as f32;
            let points = conf.ocv.len() as f32;

            // start out totally depleted; a below-table voltage keeps this
            status.coulomb_counter_mas = 0.0;

            for (i, &point) in conf.ocv.iter().enumerate() {
                if point <= cell_voltage {
                    status.coulomb_counter_mas = if i == 0 {
                        capacity_mas // 100% full
                    } else {
                        // interpolate between ocv[i] and ocv[i - 1]
                        capacity_mas / (points - 1.0)
                            * (points - 1.0 - i as f32
                                + (cell_voltage - point) / (conf.ocv[i - 1] - point))
                    };
                    break;
                }
            }
        }
    }
}
