//! Live pack status. One shared record: the measurement layer fills in the
//! sensor side before each cycle, the core writes back state, SOC and the
//! switch intents.

use crate::config::{NUM_CELLS_MAX, NUM_THERMISTORS_MAX};
use crate::fmt::*;

/// Operating state of the pack supervisor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum BmsState {
    /// Power-on, nothing decided yet
    Init,
    /// Both power paths off
    Idle,
    /// Charge path enabled only
    Chg,
    /// Discharge path enabled only
    Dis,
    /// Both paths enabled
    Normal,
    /// Both paths enabled, balancing higher cells down
    Balancing,
    /// At least one fault flag active
    Error,
}

bitflags! {
    /// Active fault sources, raised and cleared by the monitoring layer.
    /// The core treats any nonzero value as a uniform aggregate fault and
    /// never inspects individual bits.
    pub struct ErrorFlags: u32 {
        const CELL_UNDERVOLTAGE = 1 << 0;
        const CELL_OVERVOLTAGE  = 1 << 1;
        const SHORT_CIRCUIT     = 1 << 2;
        const CHG_OVERCURRENT   = 1 << 3;
        const DIS_OVERCURRENT   = 1 << 4;
        const OVER_TEMPERATURE  = 1 << 5;
        const UNDER_TEMPERATURE = 1 << 6;
        const AFE_FAULT         = 1 << 7;
    }
}

/// The shared status record
pub struct BmsStatus {
    pub state: BmsState,
    pub error_flags: ErrorFlags,

    /// Thermistor readings, °C, indexed by channel
    pub temperatures: [f32; NUM_THERMISTORS_MAX],
    /// Cell voltages, V, indexed by cell position
    pub cell_voltages: [f32; NUM_CELLS_MAX],
    /// Index (not value) of the highest cell, maintained by the measurement
    /// layer together with the voltage array
    pub id_cell_voltage_max: usize,
    /// Index of the lowest cell
    pub id_cell_voltage_min: usize,

    /// Total pack voltage, V
    pub pack_voltage: f32,
    /// Number of cells actually populated in series
    pub connected_cells: u8,

    /// Running charge integral, mAs. The canonical charge-state quantity;
    /// `soc` is derived from it.
    pub coulomb_counter_mas: f32,
    /// Derived state of charge, percent
    pub soc: f32,

    /// Last time (s) the pack current exceeded the idle threshold
    pub no_idle_timestamp: u32,

    /// Last commanded charge switch position
    pub chg_switch_enabled: bool,
    /// Last commanded discharge switch position
    pub dis_switch_enabled: bool,
}

impl BmsStatus {
    pub fn new() -> Self {
        Self {
            state: BmsState::Init,
            error_flags: ErrorFlags::empty(),
            temperatures: [0.0; NUM_THERMISTORS_MAX],
            cell_voltages: [0.0; NUM_CELLS_MAX],
            id_cell_voltage_max: 0,
            id_cell_voltage_min: 0,
            pack_voltage: 0.0,
            connected_cells: 0,
            coulomb_counter_mas: 0.0,
            soc: 0.0,
            no_idle_timestamp: 0,
            chg_switch_enabled: false,
            dis_switch_enabled: false,
        }
    }

    /// Voltage of the highest cell, V
    pub fn cell_voltage_max(&self) -> f32 {
        self.cell_voltages[self.id_cell_voltage_max]
    }

    /// Voltage of the lowest cell, V
    pub fn cell_voltage_min(&self) -> f32 {
        self.cell_voltages[self.id_cell_voltage_min]
    }
}

impl Default for BmsStatus {
    fn default() -> Self {
        Self::new()
    }
}
