// Copyright 2026 The atomseq developers
// SPDX-License-Identifier: Apache-2.0

use serde::{Deserialize, Serialize};
use std::fmt::{self, Display, Formatter};
use std::iter::Sum;
use std::ops::{Add, AddAssign, Mul, Neg, Sub, SubAssign};

/// A duration or instant expressed in integer nanoseconds.
///
/// All schedule arithmetic is integral: hardware clock periods divide slot
/// boundaries exactly, so no floating point rounding can leak into the
/// timeline.
///
/// # Examples
/// ```rust
/// use atomseq_units::nanosecond::ns;
///
/// let buffer = ns(120) + ns(40);
/// assert_eq!(buffer.value(), 160);
/// ```
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct Nanos(i64);

pub const fn ns(value: i64) -> Nanos {
    Nanos(value)
}

impl Nanos {
    pub const ZERO: Nanos = Nanos(0);

    pub const fn value(self) -> i64 {
        self.0
    }

    pub const fn is_zero(self) -> bool {
        self.0 == 0
    }

    /// Clamp a (possibly negative) difference into `[0, upper]`.
    pub fn clamp_buffer(self, upper: Nanos) -> Nanos {
        Nanos(self.0.clamp(0, upper.0))
    }
}

impl From<i64> for Nanos {
    fn from(value: i64) -> Self {
        Nanos(value)
    }
}

impl From<Nanos> for i64 {
    fn from(value: Nanos) -> Self {
        value.0
    }
}

impl Add for Nanos {
    type Output = Nanos;

    fn add(self, rhs: Self) -> Self::Output {
        Nanos(self.0 + rhs.0)
    }
}

impl Sub for Nanos {
    type Output = Nanos;

    fn sub(self, rhs: Self) -> Self::Output {
        Nanos(self.0 - rhs.0)
    }
}

impl Mul<i64> for Nanos {
    type Output = Nanos;

    fn mul(self, rhs: i64) -> Self::Output {
        Nanos(self.0 * rhs)
    }
}

impl Neg for Nanos {
    type Output = Nanos;

    fn neg(self) -> Self::Output {
        Nanos(-self.0)
    }
}

impl AddAssign for Nanos {
    fn add_assign(&mut self, rhs: Self) {
        self.0 += rhs.0;
    }
}

impl SubAssign for Nanos {
    fn sub_assign(&mut self, rhs: Self) {
        self.0 -= rhs.0;
    }
}

impl Sum for Nanos {
    fn sum<I: Iterator<Item = Nanos>>(iter: I) -> Self {
        Nanos(iter.map(|t| t.0).sum())
    }
}

impl Display for Nanos {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{} ns", self.0)
    }
}
