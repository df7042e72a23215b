// Copyright 2026 The atomseq developers
// SPDX-License-Identifier: Apache-2.0

use crate::nanosecond::Nanos;
use num_integer::{Integer, div_ceil, div_floor};

/// Ceil the given value to the nearest multiple of the grid.
///
/// This function panics if `grid` is not positive.
#[inline]
pub fn ceil_to_grid<T: Integer + Copy>(value: T, grid: T) -> T {
    assert!(grid > T::zero(), "Grid must be positive for rounding.");
    div_ceil(value, grid) * grid
}

/// Floor the given value to the nearest multiple of the grid.
///
/// This function panics if `grid` is not positive.
#[inline]
pub fn floor_to_grid<T: Integer + Copy>(value: T, grid: T) -> T {
    assert!(grid > T::zero(), "Grid must be positive for rounding.");
    div_floor(value, grid) * grid
}

impl Nanos {
    /// Round up to the next multiple of the channel clock period.
    pub fn ceil_to(self, grid: Nanos) -> Nanos {
        ceil_to_grid(self.value(), grid.value()).into()
    }
}
