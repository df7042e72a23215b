// Copyright 2026 The atomseq developers
// SPDX-License-Identifier: Apache-2.0

use crate::channel::{Basis, Channel};
use indexmap::{IndexMap, IndexSet};
use serde::{Deserialize, Serialize};

/// The hardware a sequence is written against.
///
/// Channels are keyed by their device-level id (e.g. "rydberg_global") and
/// kept in declaration order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Device {
    pub name: String,
    pub channels: IndexMap<String, Channel>,
    /// Principal quantum number of the Rydberg level used.
    pub rydberg_level: u32,
    /// XY interaction coefficient, when the device supports the XY basis.
    pub interaction_coeff_xy: Option<f64>,
    pub supports_slm_mask: bool,
    /// Whether one channel id may back several declared channels.
    pub reusable_channels: bool,
}

impl Device {
    pub fn new(name: impl Into<String>, channels: IndexMap<String, Channel>) -> Self {
        Device {
            name: name.into(),
            channels,
            rydberg_level: 70,
            interaction_coeff_xy: None,
            supports_slm_mask: false,
            reusable_channels: false,
        }
    }

    pub fn with_rydberg_level(mut self, rydberg_level: u32) -> Self {
        self.rydberg_level = rydberg_level;
        self
    }

    pub fn with_interaction_coeff_xy(mut self, coeff: f64) -> Self {
        self.interaction_coeff_xy = Some(coeff);
        self
    }

    pub fn with_slm_mask(mut self) -> Self {
        self.supports_slm_mask = true;
        self
    }

    pub fn with_reusable_channels(mut self) -> Self {
        self.reusable_channels = true;
        self
    }

    pub fn channel(&self, channel_id: &str) -> Option<&Channel> {
        self.channels.get(channel_id)
    }

    /// All bases addressable by at least one channel of the device.
    pub fn supported_bases(&self) -> IndexSet<Basis> {
        self.channels.values().map(|ch| ch.basis()).collect()
    }
}
