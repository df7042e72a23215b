// Copyright 2026 The atomseq developers
// SPDX-License-Identifier: Apache-2.0

use crate::{Error, Result};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

pub type QubitId = String;

/// A fixed assignment of qubit ids to trap coordinates (µm).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Register {
    qubits: IndexMap<QubitId, (f64, f64)>,
}

impl Register {
    pub fn new(qubits: IndexMap<QubitId, (f64, f64)>) -> Result<Self> {
        if qubits.is_empty() {
            return Err(Error::Invalid(
                "A register must hold at least one qubit.".into(),
            ));
        }
        Ok(Register { qubits })
    }

    /// A register with qubits "q0", "q1", ... at the given coordinates.
    pub fn from_coordinates(coords: Vec<(f64, f64)>) -> Result<Self> {
        Register::new(
            coords
                .into_iter()
                .enumerate()
                .map(|(i, c)| (format!("q{i}"), c))
                .collect(),
        )
    }

    pub fn qubit_ids(&self) -> impl Iterator<Item = &QubitId> {
        self.qubits.keys()
    }

    pub fn contains(&self, qubit: &str) -> bool {
        self.qubits.contains_key(qubit)
    }

    pub fn len(&self) -> usize {
        self.qubits.len()
    }

    pub fn is_empty(&self) -> bool {
        self.qubits.is_empty()
    }

    pub fn coordinates(&self, qubit: &str) -> Option<(f64, f64)> {
        self.qubits.get(qubit).copied()
    }
}

/// A register whose qubit ids are bound to trap positions only at build time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MappableRegister {
    qubit_ids: Vec<QubitId>,
    trap_coords: Vec<(f64, f64)>,
}

impl MappableRegister {
    pub fn new(qubit_ids: Vec<QubitId>, trap_coords: Vec<(f64, f64)>) -> Result<Self> {
        if qubit_ids.len() > trap_coords.len() {
            return Err(Error::Invalid(format!(
                "The number of qubit ids ({}) exceeds the number of traps ({}).",
                qubit_ids.len(),
                trap_coords.len()
            )));
        }
        Ok(MappableRegister {
            qubit_ids,
            trap_coords,
        })
    }

    pub fn qubit_ids(&self) -> &[QubitId] {
        &self.qubit_ids
    }

    pub fn contains(&self, qubit: &str) -> bool {
        self.qubit_ids.iter().any(|id| id == qubit)
    }

    /// Bind qubit ids to trap indices and produce the concrete register.
    ///
    /// The built register lists its qubits in declared order, regardless of
    /// the order of the mapping, so that indices into the register keep
    /// their pre-build meaning.
    pub fn build_register(&self, mapping: &IndexMap<QubitId, usize>) -> Result<Register> {
        for qubit in mapping.keys() {
            if !self.contains(qubit) {
                return Err(Error::Invalid(format!(
                    "All qubits must be labeled with pre-declared qubit ids, got '{qubit}'."
                )));
            }
        }
        let mut qubits = IndexMap::new();
        for qubit in &self.qubit_ids {
            let Some(&trap) = mapping.get(qubit) else {
                continue;
            };
            let Some(&coords) = self.trap_coords.get(trap) else {
                return Err(Error::Invalid(format!(
                    "Trap index {trap} for qubit '{qubit}' is out of range."
                )));
            };
            qubits.insert(qubit.clone(), coords);
        }
        Register::new(qubits)
    }
}
