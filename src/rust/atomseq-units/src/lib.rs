// Copyright 2026 The atomseq developers
// SPDX-License-Identifier: Apache-2.0

pub mod grid;
pub mod nanosecond;

pub use crate::grid::{ceil_to_grid, floor_to_grid};
pub use crate::nanosecond::{Nanos, ns};
