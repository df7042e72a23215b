// Copyright 2026 The atomseq developers
// SPDX-License-Identifier: Apache-2.0

use atomseq_units::{Nanos, ns};
use serde::{Deserialize, Serialize};

/// Conversion factor between modulation bandwidth (MHz) and rise time (ns).
pub(crate) const MODBW_TO_TR: f64 = 0.48;

/// EOM operation parameters of a channel.
///
/// Driving the channel through its EOM trades the slow output filter for a
/// much faster switch, at the cost of a residual light shift whenever the
/// requested amplitude exceeds what the limiting amplitude can compensate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EomConfig {
    /// Largest amplitude (rad/µs) for which the off detuning can stay at zero.
    pub max_limiting_amp: f64,
    /// Detuning (rad/µs) between the two EOM sidebands.
    pub intermediate_detuning: f64,
    /// Modulation bandwidth (MHz) of the EOM itself.
    pub mod_bandwidth: f64,
}

impl EomConfig {
    pub fn new(max_limiting_amp: f64, intermediate_detuning: f64, mod_bandwidth: f64) -> Self {
        EomConfig {
            max_limiting_amp,
            intermediate_detuning,
            mod_bandwidth,
        }
    }

    /// Rise time (ns) of the EOM switch.
    pub fn rise_time(&self) -> Nanos {
        ns((MODBW_TO_TR / self.mod_bandwidth * 1e3).round() as i64)
    }

    /// Largest Rabi frequency that leaves no residual light shift when off.
    pub fn limit_rabi_freq(&self) -> f64 {
        self.max_limiting_amp.powi(2) / (2.0 * self.intermediate_detuning)
    }

    /// The detuning (rad/µs) seen by the atoms while the EOM output is off.
    ///
    /// Below the Rabi limit the off state is a clean zero. Above it, the
    /// limiting beam cannot fully cancel the carrier and the off detuning is
    /// shifted by the residual light shift, on whichever side lands closest
    /// to `optimal_detuning_off`.
    pub fn detuning_off(&self, amp_on: f64, detuning_on: f64, optimal_detuning_off: f64) -> f64 {
        if amp_on <= self.limit_rabi_freq() {
            return 0.0;
        }
        let other_amp = 2.0 * amp_on * self.intermediate_detuning / self.max_limiting_amp;
        let lightshift = other_amp.powi(2) / (4.0 * self.intermediate_detuning);
        let lower = detuning_on - lightshift;
        let upper = detuning_on + lightshift;
        if (lower - optimal_detuning_off).abs() <= (upper - optimal_detuning_off).abs() {
            lower
        } else {
            upper
        }
    }
}
