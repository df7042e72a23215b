// Copyright 2026 The atomseq developers
// SPDX-License-Identifier: Apache-2.0

use crate::eom::{EomConfig, MODBW_TO_TR};
use crate::pulse::Pulse;
use crate::{Error, Result};
use atomseq_units::{Nanos, ns};
use serde::{Deserialize, Serialize};
use std::fmt::{self, Display, Formatter};

/// How the channel reaches the atoms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Addressing {
    /// Acts on every qubit of the register at once.
    Global,
    /// Acts on an explicitly targeted subset of qubits.
    Local,
}

impl Display for Addressing {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Addressing::Global => write!(f, "Global"),
            Addressing::Local => write!(f, "Local"),
        }
    }
}

/// The two-level transition a channel addresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Basis {
    GroundRydberg,
    Digital,
    Xy,
}

impl Display for Basis {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Basis::GroundRydberg => write!(f, "ground-rydberg"),
            Basis::Digital => write!(f, "digital"),
            Basis::Xy => write!(f, "XY"),
        }
    }
}

/// The physical kind of a channel, which fixes the basis it drives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChannelKind {
    Rydberg,
    Raman,
    Microwave,
}

impl ChannelKind {
    pub fn basis(self) -> Basis {
        match self {
            ChannelKind::Rydberg => Basis::GroundRydberg,
            ChannelKind::Raman => Basis::Digital,
            ChannelKind::Microwave => Basis::Xy,
        }
    }
}

/// A physical channel of a device.
///
/// The timing-related fields are all expressed in integer nanoseconds and
/// constrain where slots may land on this channel's timeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Channel {
    pub kind: ChannelKind,
    pub addressing: Addressing,
    /// Maximum amplitude (rad/µs) the channel can output.
    pub max_amp: f64,
    /// Maximum absolute detuning (rad/µs).
    pub max_abs_detuning: f64,
    /// All slot durations must be multiples of this.
    pub clock_period: Nanos,
    pub min_duration: Nanos,
    pub max_duration: Nanos,
    /// Minimum time between the start of two target operations.
    pub min_retarget_interval: Nanos,
    /// Fixed time a retarget takes, regardless of the elapsed time.
    pub fixed_retarget_t: Nanos,
    /// Maximum number of simultaneously targeted qubits, if bounded.
    pub max_targets: Option<usize>,
    /// Modulation bandwidth (MHz) of the output filter, if modulated.
    pub mod_bandwidth: Option<f64>,
    /// Time the phase reference needs to settle after a phase jump.
    pub phase_jump_time: Nanos,
    pub eom_config: Option<EomConfig>,
}

impl Channel {
    pub fn new(kind: ChannelKind, addressing: Addressing) -> Self {
        Channel {
            kind,
            addressing,
            max_amp: f64::INFINITY,
            max_abs_detuning: f64::INFINITY,
            clock_period: ns(1),
            min_duration: ns(1),
            max_duration: ns(100_000_000),
            min_retarget_interval: Nanos::ZERO,
            fixed_retarget_t: Nanos::ZERO,
            max_targets: None,
            mod_bandwidth: None,
            phase_jump_time: Nanos::ZERO,
            eom_config: None,
        }
    }

    pub fn rydberg(addressing: Addressing) -> Self {
        Channel::new(ChannelKind::Rydberg, addressing)
    }

    pub fn raman(addressing: Addressing) -> Self {
        Channel::new(ChannelKind::Raman, addressing)
    }

    pub fn microwave() -> Self {
        Channel::new(ChannelKind::Microwave, Addressing::Global)
    }

    pub fn with_max_amp(mut self, max_amp: f64) -> Self {
        self.max_amp = max_amp;
        self
    }

    pub fn with_max_abs_detuning(mut self, max_abs_detuning: f64) -> Self {
        self.max_abs_detuning = max_abs_detuning;
        self
    }

    pub fn with_clock_period(mut self, clock_period: Nanos) -> Self {
        self.clock_period = clock_period;
        self
    }

    pub fn with_min_duration(mut self, min_duration: Nanos) -> Self {
        self.min_duration = min_duration;
        self
    }

    pub fn with_max_duration(mut self, max_duration: Nanos) -> Self {
        self.max_duration = max_duration;
        self
    }

    pub fn with_min_retarget_interval(mut self, interval: Nanos) -> Self {
        self.min_retarget_interval = interval;
        self
    }

    pub fn with_fixed_retarget_t(mut self, fixed: Nanos) -> Self {
        self.fixed_retarget_t = fixed;
        self
    }

    pub fn with_max_targets(mut self, max_targets: usize) -> Self {
        self.max_targets = Some(max_targets);
        self
    }

    pub fn with_mod_bandwidth(mut self, mod_bandwidth: f64) -> Self {
        self.mod_bandwidth = Some(mod_bandwidth);
        self
    }

    pub fn with_phase_jump_time(mut self, phase_jump_time: Nanos) -> Self {
        self.phase_jump_time = phase_jump_time;
        self
    }

    pub fn with_eom_config(mut self, eom_config: EomConfig) -> Self {
        self.eom_config = Some(eom_config);
        self
    }

    pub fn basis(&self) -> Basis {
        self.kind.basis()
    }

    /// Rise time (ns) of the output filter, zero when unmodulated.
    pub fn rise_time(&self) -> Nanos {
        match self.mod_bandwidth {
            Some(bw) => ns((MODBW_TO_TR / bw * 1e3).round() as i64),
            None => Nanos::ZERO,
        }
    }

    /// Check a pulse against this channel's output limits.
    pub fn validate_pulse(&self, pulse: &Pulse) -> Result<()> {
        if pulse.amplitude.min_value() < 0.0 {
            return Err(Error::OutOfBounds(
                "The pulse amplitude goes below zero.".into(),
            ));
        }
        if pulse.amplitude.max_value() > self.max_amp {
            return Err(Error::OutOfBounds(format!(
                "The pulse amplitude goes over the maximum value allowed for this channel ({}).",
                self.max_amp
            )));
        }
        if pulse.detuning.min_value().abs().max(pulse.detuning.max_value().abs())
            > self.max_abs_detuning
        {
            return Err(Error::OutOfBounds(format!(
                "The pulse detuning goes out of the bounds allowed for this channel (+-{}).",
                self.max_abs_detuning
            )));
        }
        let duration = pulse.duration();
        if duration > self.max_duration {
            return Err(Error::OutOfBounds(format!(
                "The pulse duration ({duration}) goes over the maximum allowed for this channel \
                 ({}).",
                self.max_duration
            )));
        }
        Ok(())
    }
}
