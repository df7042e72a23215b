// Copyright 2026 The atomseq developers
// SPDX-License-Identifier: Apache-2.0

pub mod channel;
pub mod device;
pub mod eom;
pub mod pulse;
pub mod register;
pub mod waveform;

pub use crate::channel::{Addressing, Basis, Channel, ChannelKind};
pub use crate::device::Device;
pub use crate::eom::EomConfig;
pub use crate::pulse::Pulse;
pub use crate::register::{MappableRegister, QubitId, Register};
pub use crate::waveform::Waveform;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// A value exceeds what the hardware can produce.
    #[error("{0}")]
    OutOfBounds(String),

    /// A malformed value object (mismatched durations, bad qubit ids, ...).
    #[error("{0}")]
    Invalid(String),

    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
