// Copyright 2026 The atomseq developers
// SPDX-License-Identifier: Apache-2.0

use crate::{Error, Result};
use atomseq_units::{Nanos, ns};
use serde::{Deserialize, Serialize};

/// The shape of one pulse quantity (amplitude or detuning) over time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Waveform {
    /// A constant value held for the whole duration.
    Constant { duration: Nanos, value: f64 },
    /// A linear ramp from `start` to `stop`.
    Ramp {
        duration: Nanos,
        start: f64,
        stop: f64,
    },
    /// One sample per nanosecond.
    Custom { samples: Vec<f64> },
}

impl Waveform {
    pub fn constant(duration: Nanos, value: f64) -> Result<Self> {
        if duration < Nanos::ZERO {
            return Err(Error::Invalid(format!(
                "Waveform duration must not be negative, got {duration}."
            )));
        }
        Ok(Waveform::Constant { duration, value })
    }

    pub fn ramp(duration: Nanos, start: f64, stop: f64) -> Result<Self> {
        if duration < Nanos::ZERO {
            return Err(Error::Invalid(format!(
                "Waveform duration must not be negative, got {duration}."
            )));
        }
        Ok(Waveform::Ramp {
            duration,
            start,
            stop,
        })
    }

    pub fn custom(samples: Vec<f64>) -> Result<Self> {
        if samples.is_empty() {
            return Err(Error::Invalid(
                "A custom waveform needs at least one sample.".into(),
            ));
        }
        Ok(Waveform::Custom { samples })
    }

    pub fn duration(&self) -> Nanos {
        match self {
            Waveform::Constant { duration, .. } | Waveform::Ramp { duration, .. } => *duration,
            Waveform::Custom { samples } => ns(samples.len() as i64),
        }
    }

    pub fn first_value(&self) -> f64 {
        match self {
            Waveform::Constant { value, .. } => *value,
            Waveform::Ramp { start, .. } => *start,
            Waveform::Custom { samples } => samples[0],
        }
    }

    pub fn last_value(&self) -> f64 {
        match self {
            Waveform::Constant { value, .. } => *value,
            Waveform::Ramp { stop, .. } => *stop,
            Waveform::Custom { samples } => samples[samples.len() - 1],
        }
    }

    pub fn min_value(&self) -> f64 {
        match self {
            Waveform::Constant { value, .. } => *value,
            Waveform::Ramp { start, stop, .. } => start.min(*stop),
            Waveform::Custom { samples } => samples.iter().copied().fold(f64::INFINITY, f64::min),
        }
    }

    pub fn max_value(&self) -> f64 {
        match self {
            Waveform::Constant { value, .. } => *value,
            Waveform::Ramp { start, stop, .. } => start.max(*stop),
            Waveform::Custom { samples } => {
                samples.iter().copied().fold(f64::NEG_INFINITY, f64::max)
            }
        }
    }

    /// The same waveform stretched to a new duration.
    ///
    /// Custom waveforms are sampled per nanosecond and cannot be stretched.
    pub fn with_duration(&self, duration: Nanos) -> Result<Self> {
        match self {
            Waveform::Constant { value, .. } => Waveform::constant(duration, *value),
            Waveform::Ramp { start, stop, .. } => Waveform::ramp(duration, *start, *stop),
            Waveform::Custom { .. } => Err(Error::Invalid(
                "A custom waveform cannot be stretched to a new duration.".into(),
            )),
        }
    }

    /// Extra time the output filter needs around this waveform.
    ///
    /// A buffer is only needed at an edge where the waveform does not start
    /// (or end) at zero, since the modulated output then still has to settle.
    pub fn modulation_buffers(&self, rise_time: Nanos) -> (Nanos, Nanos) {
        if rise_time.is_zero() {
            return (Nanos::ZERO, Nanos::ZERO);
        }
        let start = if self.first_value() != 0.0 {
            rise_time
        } else {
            Nanos::ZERO
        };
        let end = if self.last_value() != 0.0 {
            rise_time
        } else {
            Nanos::ZERO
        };
        (start, end)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_constant() {
        let wf = Waveform::constant(ns(100), 2.0).unwrap();
        assert_eq!(wf.duration(), ns(100));
        assert_eq!(wf.first_value(), 2.0);
        assert_eq!(wf.last_value(), 2.0);
        assert!(Waveform::constant(ns(-1), 2.0).is_err());
    }

    #[test]
    fn test_ramp() {
        let wf = Waveform::ramp(ns(200), 1.0, 3.0).unwrap();
        assert_eq!(wf.first_value(), 1.0);
        assert_eq!(wf.last_value(), 3.0);
        assert_eq!(wf.min_value(), 1.0);
        assert_eq!(wf.max_value(), 3.0);
    }

    #[test]
    fn test_custom() {
        let wf = Waveform::custom(vec![0.0, 1.0, 2.0, 0.0]).unwrap();
        assert_eq!(wf.duration(), ns(4));
        assert_eq!(wf.max_value(), 2.0);
        assert!(Waveform::custom(vec![]).is_err());
    }

    #[test]
    fn test_modulation_buffers() {
        let rise = ns(120);
        let zero_edges = Waveform::custom(vec![0.0, 1.0, 0.0]).unwrap();
        assert_eq!(zero_edges.modulation_buffers(rise), (ns(0), ns(0)));

        let hot = Waveform::constant(ns(100), 2.0).unwrap();
        assert_eq!(hot.modulation_buffers(rise), (rise, rise));

        let tail = Waveform::ramp(ns(100), 0.0, 2.0).unwrap();
        assert_eq!(tail.modulation_buffers(rise), (ns(0), rise));

        assert_eq!(hot.modulation_buffers(ns(0)), (ns(0), ns(0)));
    }
}
