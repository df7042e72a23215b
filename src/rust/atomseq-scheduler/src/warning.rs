// Copyright 2026 The atomseq developers
// SPDX-License-Identifier: Apache-2.0

use atomseq_device::Basis;
use atomseq_units::Nanos;
use std::fmt::{self, Display, Formatter};

/// A non-fatal condition noticed while composing or building a sequence.
///
/// Warnings are accumulated on the sequence and also emitted through the
/// `log` crate at the point they arise.
#[derive(Debug, Clone, PartialEq)]
pub enum Warning {
    /// A pulse or delay duration was rounded up to satisfy the channel's
    /// clock period and minimum duration.
    RoundedDuration {
        channel: String,
        from: Nanos,
        to: Nanos,
    },
    /// The measurement basis is not addressed by any declared channel.
    BasisNotAddressed { basis: Basis },
    /// `build` was called on a sequence with no declared variables.
    NoParametrizedCalls,
    /// Bindings were supplied for variables that were never consulted.
    UnusedBindings { names: Vec<String> },
    /// `switch_device` was called with the sequence's own device.
    SameDeviceSwitch,
    /// The new device differs in a parameter that is not checked outside
    /// strict mode.
    DeviceParamMismatch { param: String },
}

impl Display for Warning {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Warning::RoundedDuration { channel, from, to } => write!(
                f,
                "The duration on channel '{channel}' was rounded up from {from} to {to} \
                 to comply with the channel's clock period and minimum duration."
            ),
            Warning::BasisNotAddressed { basis } => write!(
                f,
                "The desired measurement basis '{basis}' is not addressed by any channel \
                 in the sequence."
            ),
            Warning::NoParametrizedCalls => write!(
                f,
                "Building a sequence with no parametrized calls returns a copy of itself."
            ),
            Warning::UnusedBindings { names } => {
                write!(f, "No declared variables named: {}", names.join(", "))
            }
            Warning::SameDeviceSwitch => write!(
                f,
                "Switching a sequence to the device it already uses has no effect."
            ),
            Warning::DeviceParamMismatch { param } => write!(
                f,
                "Switching to a device with a different {param}; take this into account."
            ),
        }
    }
}
