// Copyright 2026 The atomseq developers
// SPDX-License-Identifier: Apache-2.0

use crate::channel::Channel;
use crate::waveform::Waveform;
use crate::{Error, Result};
use atomseq_units::Nanos;
use serde::{Deserialize, Serialize};

/// An amplitude and detuning waveform pair played with a fixed phase.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pulse {
    pub amplitude: Waveform,
    pub detuning: Waveform,
    /// Phase (rad) of the pulse, relative to the channel's phase reference.
    pub phase: f64,
    /// Phase shift (rad) applied to the targeted qubits after the pulse.
    pub post_phase_shift: f64,
}

impl Pulse {
    pub fn new(amplitude: Waveform, detuning: Waveform, phase: f64) -> Result<Self> {
        if amplitude.duration() != detuning.duration() {
            return Err(Error::Invalid(format!(
                "The amplitude and detuning waveforms must have the same duration \
                 ({} vs {}).",
                amplitude.duration(),
                detuning.duration()
            )));
        }
        if amplitude.min_value() < 0.0 {
            return Err(Error::Invalid(
                "All samples of an amplitude waveform must be non-negative.".into(),
            ));
        }
        Ok(Pulse {
            amplitude,
            detuning,
            phase,
            post_phase_shift: 0.0,
        })
    }

    /// A pulse with constant amplitude and constant detuning.
    pub fn constant(duration: Nanos, amplitude: f64, detuning: f64, phase: f64) -> Result<Self> {
        Pulse::new(
            Waveform::constant(duration, amplitude)?,
            Waveform::constant(duration, detuning)?,
            phase,
        )
    }

    /// An arbitrary amplitude waveform over a constant detuning.
    pub fn constant_detuning(amplitude: Waveform, detuning: f64, phase: f64) -> Result<Self> {
        let detuning = Waveform::constant(amplitude.duration(), detuning)?;
        Pulse::new(amplitude, detuning, phase)
    }

    /// An arbitrary detuning waveform under a constant amplitude.
    pub fn constant_amplitude(amplitude: f64, detuning: Waveform, phase: f64) -> Result<Self> {
        let amplitude = Waveform::constant(detuning.duration(), amplitude)?;
        Pulse::new(amplitude, detuning, phase)
    }

    pub fn with_post_phase_shift(mut self, post_phase_shift: f64) -> Self {
        self.post_phase_shift = post_phase_shift;
        self
    }

    pub fn duration(&self) -> Nanos {
        self.amplitude.duration()
    }

    /// The same pulse stretched to a new duration.
    pub fn with_duration(&self, duration: Nanos) -> Result<Self> {
        let mut pulse = Pulse::new(
            self.amplitude.with_duration(duration)?,
            self.detuning.with_duration(duration)?,
            self.phase,
        )?;
        pulse.post_phase_shift = self.post_phase_shift;
        Ok(pulse)
    }

    /// Time the channel output takes to die down after this pulse ends.
    ///
    /// In EOM mode the EOM switch sets the rise time instead of the channel's
    /// output filter.
    pub fn fall_time(&self, channel: &Channel, in_eom_mode: bool) -> Nanos {
        let rise_time = if in_eom_mode {
            channel
                .eom_config
                .as_ref()
                .map(|cfg| cfg.rise_time())
                .unwrap_or(Nanos::ZERO)
        } else {
            channel.rise_time()
        };
        rise_time + self.amplitude.modulation_buffers(rise_time).1
    }
}
