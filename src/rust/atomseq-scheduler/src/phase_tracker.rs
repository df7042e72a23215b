// Copyright 2026 The atomseq developers
// SPDX-License-Identifier: Apache-2.0

use atomseq_device::{Basis, QubitId};
use indexmap::IndexMap;
use std::f64::consts::TAU;

/// Per-basis, per-qubit phase references accumulated from phase shifts.
///
/// Phases are kept in `[0, 2π)`. A qubit with no recorded shift has a zero
/// phase reference.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PhaseTracker {
    refs: IndexMap<Basis, IndexMap<QubitId, f64>>,
}

impl PhaseTracker {
    pub fn new() -> Self {
        PhaseTracker::default()
    }

    pub fn phase(&self, basis: Basis, qubit: &str) -> f64 {
        self.refs
            .get(&basis)
            .and_then(|qubits| qubits.get(qubit))
            .copied()
            .unwrap_or(0.0)
    }

    pub fn shift(&mut self, basis: Basis, qubit: &str, phi: f64) {
        if phi == 0.0 {
            return;
        }
        let entry = self
            .refs
            .entry(basis)
            .or_default()
            .entry(qubit.to_string())
            .or_insert(0.0);
        *entry = (*entry + phi).rem_euclid(TAU);
    }

    /// The phase reference shared by all given qubits, or `None` when the
    /// qubits disagree.
    pub fn common_phase<'a>(
        &self,
        basis: Basis,
        mut qubits: impl Iterator<Item = &'a QubitId>,
    ) -> Option<f64> {
        let first = self.phase(basis, qubits.next()?);
        for qubit in qubits {
            if self.phase(basis, qubit) != first {
                return None;
            }
        }
        Some(first)
    }
}
