// Copyright 2026 The atomseq developers
// SPDX-License-Identifier: Apache-2.0

use atomseq_device::QubitId;
use atomseq_units::Nanos;
use indexmap::IndexSet;
use serde::{Deserialize, Serialize};

/// An SLM mask hiding a set of qubits from the first global pulse.
///
/// The masked interval tracks the earliest pulse played on a global channel
/// of the masked basis, and is refreshed whenever such a pulse is added.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SlmMask {
    pub targets: IndexSet<QubitId>,
    pub interval: Option<(Nanos, Nanos)>,
}

impl SlmMask {
    pub fn new(targets: IndexSet<QubitId>) -> Self {
        SlmMask {
            targets,
            interval: None,
        }
    }

    pub fn is_set(&self) -> bool {
        !self.targets.is_empty()
    }
}
