// Copyright 2026 The atomseq developers
// SPDX-License-Identifier: Apache-2.0

//! Composition and scheduling of pulse sequences for neutral-atom devices.
//!
//! A [`Sequence`] is written against a [`Device`](atomseq_device::Device)
//! and a register of qubits. Pulses, delays and (re)targeting operations
//! land on per-channel timelines of contiguous slots, with all hardware
//! buffers (clock grids, retargeting times, modulation rise and fall
//! times, phase jumps, EOM switching) inserted automatically. Sequences
//! may be parametrized with variables and built later, and can be
//! re-created on different hardware with [`Sequence::switch_device`].

pub mod device_match;
pub mod error;
pub mod expr;
pub mod phase_tracker;
pub mod recorder;
pub mod schedule;
pub mod sequence;
pub mod slm_mask;
pub mod slot;
pub mod warning;

pub use crate::error::{Error, Result};
pub use crate::expr::{BindingStore, Expr, Value, VarDtype, Variable};
pub use crate::recorder::{ParametrizedPulse, PulseArg, SequenceOp};
pub use crate::schedule::{ChannelSchedule, EomBlock, Protocol, Schedule};
pub use crate::sequence::{Sequence, SequenceRegister};
pub use crate::slm_mask::SlmMask;
pub use crate::slot::{SlotKind, TimeSlot};
pub use crate::warning::Warning;
