// Copyright 2026 The atomseq developers
// SPDX-License-Identifier: Apache-2.0

#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// A caller-supplied argument is malformed or references something
    /// that does not exist.
    #[error("{0}")]
    Argument(String),

    /// The request is well-formed but violates a hardware constraint.
    #[error("{0}")]
    Constraint(String),

    /// The operation is not allowed in the sequence's current state.
    #[error("{0}")]
    State(String),

    #[error(transparent)]
    Device(#[from] atomseq_device::Error),

    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
