// Copyright 2026 The atomseq developers
// SPDX-License-Identifier: Apache-2.0

use crate::error::Result;
use crate::expr::{BindingStore, Expr};
use crate::schedule::Protocol;
use atomseq_device::{Basis, Pulse, QubitId};
use indexmap::IndexSet;
use serde::{Deserialize, Serialize};

/// A constant pulse whose parameters may depend on variables.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParametrizedPulse {
    pub duration: Expr,
    pub amplitude: Expr,
    pub detuning: Expr,
    pub phase: Expr,
    pub post_phase_shift: f64,
}

impl ParametrizedPulse {
    pub fn evaluate(&self, store: &BindingStore) -> Result<Pulse> {
        let duration = self.duration.evaluate(store)?.as_nanos()?;
        let amplitude = self.amplitude.evaluate(store)?.as_float()?;
        let detuning = self.detuning.evaluate(store)?.as_float()?;
        let phase = self.phase.evaluate(store)?.as_float()?;
        Ok(Pulse::constant(duration, amplitude, detuning, phase)?
            .with_post_phase_shift(self.post_phase_shift))
    }

    pub fn variables(&self, out: &mut IndexSet<String>) {
        self.duration.variables(out);
        self.amplitude.variables(out);
        self.detuning.variables(out);
        self.phase.variables(out);
    }
}

/// A pulse argument, either fully concrete or variable-dependent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum PulseArg {
    Concrete(Pulse),
    Parametrized(ParametrizedPulse),
}

impl PulseArg {
    pub fn variables(&self, out: &mut IndexSet<String>) {
        if let PulseArg::Parametrized(pulse) = self {
            pulse.variables(out);
        }
    }
}

impl From<Pulse> for PulseArg {
    fn from(pulse: Pulse) -> Self {
        PulseArg::Concrete(pulse)
    }
}

impl From<ParametrizedPulse> for PulseArg {
    fn from(pulse: ParametrizedPulse) -> Self {
        PulseArg::Parametrized(pulse)
    }
}

/// Target qubits given either by id or by index into the register.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum TargetArg {
    Ids(IndexSet<QubitId>),
    /// An expression evaluating to one or more indices into the register's
    /// qubit order.
    Indices(Expr),
}

impl TargetArg {
    pub fn variables(&self, out: &mut IndexSet<String>) {
        if let TargetArg::Indices(expr) = self {
            expr.variables(out);
        }
    }
}

/// One recorded mutating call on a sequence.
///
/// Every mutation is recorded: eager calls are needed to rebuild the
/// sequence on another device, deferred ones to build a parametrized
/// sequence once its variables are bound.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SequenceOp {
    DeclareChannel {
        name: String,
        channel_id: String,
        initial_target: Option<IndexSet<QubitId>>,
    },
    Target {
        channel: String,
        targets: TargetArg,
    },
    AddPulse {
        channel: String,
        pulse: PulseArg,
        protocol: Protocol,
    },
    AddEomPulse {
        channel: String,
        duration: Expr,
        phase: Expr,
        post_phase_shift: f64,
        protocol: Protocol,
    },
    Delay {
        channel: String,
        duration: Expr,
    },
    EnableEom {
        channel: String,
        amp_on: f64,
        detuning_on: f64,
        optimal_detuning_off: f64,
    },
    DisableEom {
        channel: String,
    },
    PhaseShift {
        targets: TargetArg,
        phi: Expr,
        basis: Basis,
    },
    Align {
        channels: Vec<String>,
    },
    Measure {
        basis: Basis,
    },
    SetMagneticField {
        field: [f64; 3],
    },
    ConfigSlmMask {
        targets: IndexSet<QubitId>,
    },
}

impl SequenceOp {
    /// Collect the variables this call depends on.
    pub fn variables(&self, out: &mut IndexSet<String>) {
        match self {
            SequenceOp::Target { targets, .. } => targets.variables(out),
            SequenceOp::AddPulse { pulse, .. } => pulse.variables(out),
            SequenceOp::AddEomPulse {
                duration, phase, ..
            } => {
                duration.variables(out);
                phase.variables(out);
            }
            SequenceOp::Delay { duration, .. } => duration.variables(out),
            SequenceOp::PhaseShift { targets, phi, .. } => {
                targets.variables(out);
                phi.variables(out);
            }
            _ => {}
        }
    }

    pub fn is_parametrized(&self) -> bool {
        let mut names = IndexSet::new();
        self.variables(&mut names);
        !names.is_empty()
    }
}

/// The call history of a sequence.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CallRecorder {
    /// Calls that were executed when they were made.
    pub eager: Vec<SequenceOp>,
    /// Calls stored for execution at build time.
    pub deferred: Vec<SequenceOp>,
}

impl CallRecorder {
    pub fn new() -> Self {
        CallRecorder::default()
    }

    pub fn record_eager(&mut self, op: SequenceOp) {
        self.eager.push(op);
    }

    pub fn record_deferred(&mut self, op: SequenceOp) {
        self.deferred.push(op);
    }
}
