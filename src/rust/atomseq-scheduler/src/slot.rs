// Copyright 2026 The atomseq developers
// SPDX-License-Identifier: Apache-2.0

use atomseq_device::{Pulse, QubitId, Waveform};
use atomseq_units::Nanos;
use indexmap::IndexSet;
use serde::{Deserialize, Serialize};

/// What occupies a slot on a channel's timeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SlotKind {
    /// A (re)targeting operation.
    Target,
    /// Idle time.
    Delay,
    /// Output playing the contained pulse.
    Pulse(Pulse),
}

/// A half-open interval `[ti, tf)` on one channel's timeline.
///
/// Slots on a channel are contiguous: each slot starts where the previous
/// one ends. The first slot of a targeted channel is a zero-length `[0, 0)`
/// target slot carrying the initial targets.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeSlot {
    pub kind: SlotKind,
    pub ti: Nanos,
    pub tf: Nanos,
    pub targets: IndexSet<QubitId>,
}

impl TimeSlot {
    pub fn new(kind: SlotKind, ti: Nanos, tf: Nanos, targets: IndexSet<QubitId>) -> Self {
        TimeSlot {
            kind,
            ti,
            tf,
            targets,
        }
    }

    pub fn duration(&self) -> Nanos {
        self.tf - self.ti
    }

    pub fn pulse(&self) -> Option<&Pulse> {
        match &self.kind {
            SlotKind::Pulse(pulse) => Some(pulse),
            _ => None,
        }
    }

    pub fn is_pulse(&self) -> bool {
        matches!(self.kind, SlotKind::Pulse(_))
    }

    /// Whether this slot holds a "detuned delay": a zero-amplitude pulse
    /// used to keep the EOM output off between EOM pulses.
    pub fn is_detuned_delay(&self) -> bool {
        match self.pulse() {
            Some(pulse) => {
                matches!(pulse.amplitude, Waveform::Constant { value, .. } if value == 0.0)
            }
            None => false,
        }
    }
}
