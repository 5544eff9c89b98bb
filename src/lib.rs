#![cfg_attr(not(test), no_std)]

//! Decision core of a battery management controller: a small state machine
//! that gates the charge and discharge paths and triggers cell balancing,
//! plus coulomb-counter based state-of-charge accounting.
//!
//! The crate is hardware-free. The measurement layer writes decoded sensor
//! values into [`BmsStatus`] before each cycle and the switch hardware sits
//! behind the [`PowerPath`] trait, so the whole core runs unmodified on the
//! host for testing.

pub(crate) mod fmt;

pub mod config;
pub mod soc;
pub mod status;

use fmt::*;
use libm::fabsf;

pub use config::{BmsConfig, ConfigError, NUM_CELLS_MAX, NUM_THERMISTORS_MAX, OCV_POINTS_MAX};
pub use soc::SocReset;
pub use status::{BmsState, BmsStatus, ErrorFlags};

/// Capability interface to the charge/discharge switch hardware.
///
/// Implementations must tolerate redundant commands: the state machine may
/// enable a path that is already enabled (e.g. leaving `Dis` for `Normal`
/// keeps discharge on and separately enables charge).
pub trait PowerPath {
    type Error;

    fn set_chg_switch(&mut self, enable: bool) -> Result<(), Self::Error>;
    fn set_dis_switch(&mut self, enable: bool) -> Result<(), Self::Error>;
}

/// A single switch actuation requested by a transition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SwitchCommand {
    Chg(bool),
    Dis(bool),
}

/// Charging is allowed iff every thermistor is within the charge temperature
/// window and the highest cell is at or below the over-voltage limit.
/// Boundary values themselves are allowed.
pub fn chg_allowed(conf: &BmsConfig, status: &BmsStatus) -> bool {
    let mut errors = 0;

    for &temperature in status.temperatures.iter() {
        if temperature > conf.chg_ot_limit || temperature < conf.chg_ut_limit {
            errors += 1;
        }
    }

    if status.cell_voltage_max() > conf.cell_ov_limit {
        errors += 1;
    }

    errors == 0
}

/// Discharging is allowed iff every thermistor is within the discharge
/// temperature window and the lowest cell is at or above the under-voltage
/// limit.
pub fn dis_allowed(conf: &BmsConfig, status: &BmsStatus) -> bool {
    let mut errors = 0;

    for &temperature in status.temperatures.iter() {
        if temperature > conf.dis_ot_limit || temperature < conf.dis_ut_limit {
            errors += 1;
        }
    }

    if status.cell_voltage_min() < conf.cell_uv_limit {
        errors += 1;
    }

    errors == 0
}

/// Balancing is allowed iff the pack has been idle long enough, the highest
/// cell is high enough to bother, and the max-to-min spread exceeds the
/// configured target. All three must hold simultaneously.
pub fn balancing_allowed(conf: &BmsConfig, status: &BmsStatus, now: u32) -> bool {
    let idle_s = now.saturating_sub(status.no_idle_timestamp);
    let voltage_diff = status.cell_voltage_max() - status.cell_voltage_min();

    idle_s >= conf.balancing_min_idle_s
        && status.cell_voltage_max() > conf.balancing_cell_voltage_min
        && voltage_diff > conf.balancing_voltage_diff_target
}

/// Computes one state machine step without touching anything.
///
/// Any active fault flag pre-empts the current state and forces [`BmsState::Error`];
/// recovery back to `Idle` is automatic once the flags clear. Each transition
/// requests at most one switch actuation, and none when the state holds.
/// Entering `Error` deliberately leaves the switches as they were.
pub fn evaluate(
    conf: &BmsConfig,
    status: &BmsStatus,
    now: u32,
) -> (BmsState, Option<SwitchCommand>) {
    let state = if !status.error_flags.is_empty() {
        BmsState::Error
    } else {
        status.state
    };

    match state {
        BmsState::Init => {
            // TODO: gate on an AFE communication self-test before going live
            (BmsState::Idle, None)
        }
        BmsState::Idle => {
            // discharge readiness is checked first on purpose
            if dis_allowed(conf, status) {
                (BmsState::Dis, Some(SwitchCommand::Dis(true)))
            } else if chg_allowed(conf, status) {
                (BmsState::Chg, Some(SwitchCommand::Chg(true)))
            } else {
                (BmsState::Idle, None)
            }
        }
        BmsState::Chg => {
            if !chg_allowed(conf, status) {
                (BmsState::Idle, Some(SwitchCommand::Chg(false)))
            } else if dis_allowed(conf, status) {
                (BmsState::Normal, Some(SwitchCommand::Dis(true)))
            } else {
                (BmsState::Chg, None)
            }
        }
        BmsState::Dis => {
            if !dis_allowed(conf, status) {
                (BmsState::Idle, Some(SwitchCommand::Dis(false)))
            } else if chg_allowed(conf, status) {
                (BmsState::Normal, Some(SwitchCommand::Chg(true)))
            } else {
                (BmsState::Dis, None)
            }
        }
        BmsState::Normal => {
            if !dis_allowed(conf, status) {
                (BmsState::Chg, Some(SwitchCommand::Dis(false)))
            } else if !chg_allowed(conf, status) {
                (BmsState::Dis, Some(SwitchCommand::Chg(false)))
            } else if balancing_allowed(conf, status, now) {
                (BmsState::Balancing, None)
            } else {
                (BmsState::Normal, None)
            }
        }
        BmsState::Balancing => {
            if !balancing_allowed(conf, status, now) {
                (BmsState::Normal, None)
            } else {
                (BmsState::Balancing, None)
            }
        }
        BmsState::Error => {
            if status.error_flags.is_empty() {
                (BmsState::Idle, None)
            } else {
                (BmsState::Error, None)
            }
        }
    }
}

/// The supervisor handle: owns the configuration, the shared status record
/// and the switch capability.
pub struct Bms<P> {
    config: BmsConfig,
    status: BmsStatus,
    switches: P,
}

impl<P, E> Bms<P>
where
    P: PowerPath<Error = E>,
{
    /// Builds the handle, validating the configuration up front since the
    /// SOC math has no runtime error path.
    pub fn new(config: BmsConfig, switches: P) -> Result<Self, ConfigError> {
        config.validate()?;

        Ok(Self {
            config,
            status: BmsStatus::new(),
            switches,
        })
    }

    pub fn config(&self) -> &BmsConfig {
        &self.config
    }

    pub fn status(&self) -> &BmsStatus {
        &self.status
    }

    /// The measurement layer writes sensor readings through this before each
    /// cycle. The caller must serialize these writes with [`Bms::step`].
    pub fn status_mut(&mut self) -> &mut BmsStatus {
        &mut self.status
    }

    /// Runs one control cycle: evaluate, actuate, commit.
    ///
    /// A switch failure aborts the step before the new state is committed,
    /// so the cycle is retried from the old state on the next tick.
    pub fn step(&mut self, now: u32) -> Result<BmsState, E> {
        let (next, command) = evaluate(&self.config, &self.status, now);

        match command {
            Some(SwitchCommand::Chg(enable)) => {
                self.switches.set_chg_switch(enable)?;
                self.status.chg_switch_enabled = enable;
            }
            Some(SwitchCommand::Dis(enable)) => {
                self.switches.set_dis_switch(enable)?;
                self.status.dis_switch_enabled = enable;
            }
            None => {}
        }

        if next != self.status.state {
            info!("bms state: {} -> {}", self.status.state, next);
        }

        self.status.state = next;
        Ok(next)
    }

    /// Feeds one coulomb counter sample: integrates the current draw and
    /// refreshes the idle tracking that gates balancing.
    pub fn apply_current(&mut self, current_ma: f32, elapsed_s: f32, now: u32) {
        self.status.coulomb_counter_mas += current_ma * elapsed_s;

        if fabsf(current_ma) > self.config.idle_current_threshold {
            self.status.no_idle_timestamp = now;
        }
    }

    /// Recomputes the SOC percentage from the coulomb counter
    pub fn update_soc(&mut self) {
        soc::update_soc(&self.config, &mut self.status);
    }

    /// Recalibrates the coulomb counter, see [`SocReset`]
    pub fn reset_soc(&mut self, reset: SocReset) {
        soc::reset_soc(&self.config, &mut self.status, reset);
    }
}
