// Copyright 2026 The atomseq developers
// SPDX-License-Identifier: Apache-2.0

use crate::error::{Error, Result};
use crate::expr::BindingStore;
use crate::recorder::SequenceOp;
use crate::sequence::{Sequence, SequenceRegister};
use crate::warning::Warning;
use atomseq_device::{Channel, Device};
use indexmap::{IndexMap, IndexSet};

/// Which features of a declared channel the sequence actually exercises.
///
/// Only exercised features constrain the strict device match: a channel
/// that never retargets does not care about retargeting times.
#[derive(Debug, Clone, Copy, Default)]
struct ChannelUsage {
    pulses: bool,
    retargets: bool,
    eom: bool,
}

fn strict_mismatch(old: &Channel, new: &Channel, usage: ChannelUsage) -> Option<&'static str> {
    if new.clock_period != old.clock_period {
        return Some("clock_period");
    }
    if usage.pulses && new.mod_bandwidth != old.mod_bandwidth {
        return Some("mod_bandwidth");
    }
    if usage.retargets {
        if new.fixed_retarget_t != old.fixed_retarget_t {
            return Some("fixed_retarget_t");
        }
        if new.min_retarget_interval != old.min_retarget_interval {
            return Some("min_retarget_interval");
        }
    }
    if usage.eom && new.eom_config != old.eom_config {
        return Some("eom_config");
    }
    None
}

impl Sequence {
    fn channel_usage(&self, name: &str) -> ChannelUsage {
        let mut usage = ChannelUsage::default();
        for op in self
            .recorder
            .eager
            .iter()
            .chain(self.recorder.deferred.iter())
        {
            match op {
                SequenceOp::AddPulse { channel, .. }
                | SequenceOp::AddEomPulse { channel, .. }
                    if channel == name =>
                {
                    usage.pulses = true;
                }
                SequenceOp::Target { channel, .. } if channel == name => {
                    usage.retargets = true;
                }
                SequenceOp::EnableEom { channel, .. } if channel == name => {
                    usage.eom = true;
                }
                _ => {}
            }
        }
        usage
    }

    /// Re-create this sequence on another device.
    ///
    /// Each declared channel is re-assigned to a channel of the new device
    /// with the same basis and addressing, and the recorded calls are
    /// replayed against the new hardware. In strict mode, device and channel
    /// parameters that affect the timing of the exercised features must
    /// match exactly; otherwise differences only produce warnings.
    pub fn switch_device(&self, new_device: &Device, strict: bool) -> Result<Sequence> {
        if new_device == &self.device {
            let mut copy = self.clone();
            copy.push_warning(Warning::SameDeviceSwitch);
            return Ok(copy);
        }
        let mut pending_warnings = Vec::new();
        if new_device.rydberg_level != self.device.rydberg_level {
            if strict {
                return Err(Error::Constraint(
                    "Strict device match failed because the devices have different Rydberg \
                     levels."
                        .into(),
                ));
            }
            pending_warnings.push(Warning::DeviceParamMismatch {
                param: "Rydberg level".into(),
            });
        }
        if self.in_xy && new_device.interaction_coeff_xy != self.device.interaction_coeff_xy {
            if strict {
                return Err(Error::Constraint(
                    "Strict device match failed because the devices have different XY \
                     interaction coefficients."
                        .into(),
                ));
            }
            pending_warnings.push(Warning::DeviceParamMismatch {
                param: "XY interaction coefficient".into(),
            });
        }

        let mut assigned: IndexMap<String, String> = IndexMap::new();
        let mut taken: IndexSet<String> = IndexSet::new();
        for cs in self.schedule.channels() {
            let usage = self.channel_usage(&cs.name);
            let mut strict_error = None;
            let mut found = None;
            for (id, candidate) in &new_device.channels {
                if !new_device.reusable_channels && taken.contains(id) {
                    continue;
                }
                if candidate.kind != cs.channel.kind
                    || candidate.addressing != cs.channel.addressing
                {
                    continue;
                }
                if usage.eom && candidate.eom_config.is_none() {
                    continue;
                }
                if strict {
                    if let Some(param) = strict_mismatch(&cs.channel, candidate, usage) {
                        strict_error = Some(Error::Constraint(format!(
                            "No match for channel {} with the same {param}.",
                            cs.name
                        )));
                        continue;
                    }
                }
                found = Some(id.clone());
                break;
            }
            let Some(id) = found else {
                return Err(strict_error.unwrap_or_else(|| {
                    Error::Constraint(format!(
                        "No match for channel {} with the right basis and addressing.",
                        cs.name
                    ))
                }));
            };
            taken.insert(id.clone());
            assigned.insert(cs.name.clone(), id);
        }

        let mut fresh = match &self.register {
            SequenceRegister::Concrete(register) => {
                Sequence::new(register.clone(), new_device.clone())
            }
            SequenceRegister::Mappable(register) => {
                Sequence::new_mappable(register.clone(), new_device.clone())
            }
        };
        let bindings = BindingStore::new();
        for op in &self.recorder.eager {
            let op = match op {
                SequenceOp::DeclareChannel {
                    name,
                    initial_target,
                    ..
                } => {
                    let Some(channel_id) = assigned.get(name) else {
                        return Err(Error::Argument(
                            "Use the name of a declared channel.".into(),
                        ));
                    };
                    SequenceOp::DeclareChannel {
                        name: name.clone(),
                        channel_id: channel_id.clone(),
                        initial_target: initial_target.clone(),
                    }
                }
                other => other.clone(),
            };
            fresh.apply_op(&op, &bindings)?;
        }
        fresh.recorder.deferred = self.recorder.deferred.clone();
        fresh.variables = self.variables.clone();
        fresh.building = self.building;
        for warning in pending_warnings {
            fresh.push_warning(warning);
        }
        Ok(fresh)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::VarDtype;
    use crate::schedule::Protocol;
    use atomseq_device::{Addressing, EomConfig, Pulse, Register};
    use atomseq_units::ns;

    fn register() -> Register {
        Register::from_coordinates(vec![(0.0, 0.0), (5.0, 0.0), (10.0, 0.0)]).unwrap()
    }

    fn device(name: &str) -> Device {
        let channels: IndexMap<String, Channel> = [
            (
                "rydberg_global".to_string(),
                Channel::rydberg(Addressing::Global)
                    .with_max_amp(15.0)
                    .with_max_abs_detuning(120.0),
            ),
            (
                "raman_local".to_string(),
                Channel::raman(Addressing::Local)
                    .with_max_amp(10.0)
                    .with_max_abs_detuning(120.0)
                    .with_clock_period(ns(4))
                    .with_min_duration(ns(16))
                    .with_min_retarget_interval(ns(220)),
            ),
        ]
        .into_iter()
        .collect();
        Device::new(name, channels)
    }

    fn sample_sequence() -> Sequence {
        let mut seq = Sequence::new(register(), device("DeviceA"));
        seq.declare_channel("global", "rydberg_global").unwrap();
        seq.declare_channel_with_target("local", "raman_local", ["q0"])
            .unwrap();
        let pulse = Pulse::constant(ns(100), 1.0, 0.0, 0.0).unwrap();
        seq.add("global", pulse, Protocol::MinDelay).unwrap();
        seq.target("local", ["q1"]).unwrap();
        seq
    }

    #[test]
    fn test_same_device_returns_copy() {
        let seq = sample_sequence();
        let mut switched = seq.switch_device(&device("DeviceA"), true).unwrap();
        assert_eq!(
            switched.drain_warnings(),
            vec![Warning::SameDeviceSwitch]
        );
        assert_eq!(
            switched.schedule().channel("global").unwrap().slots,
            seq.schedule().channel("global").unwrap().slots
        );
    }

    #[test]
    fn test_rydberg_level_mismatch() {
        let seq = sample_sequence();
        let other = device("DeviceB").with_rydberg_level(61);

        let err = seq.switch_device(&other, true).unwrap_err();
        assert!(err.to_string().contains("different Rydberg levels"));

        let mut switched = seq.switch_device(&other, false).unwrap();
        assert!(switched.drain_warnings().iter().any(|w| matches!(
            w,
            Warning::DeviceParamMismatch { param } if param == "Rydberg level"
        )));
    }

    #[test]
    fn test_no_channel_with_right_basis() {
        let seq = sample_sequence();
        let mut incomplete = device("DeviceB");
        incomplete.channels.shift_remove("raman_local");
        let err = seq.switch_device(&incomplete, false).unwrap_err();
        assert!(
            err.to_string()
                .contains("No match for channel local with the right basis and addressing.")
        );
    }

    #[test]
    fn test_strict_clock_period() {
        let seq = sample_sequence();
        let mut other = device("DeviceB");
        other
            .channels
            .get_mut("raman_local")
            .unwrap()
            .clock_period = ns(8);

        let err = seq.switch_device(&other, true).unwrap_err();
        assert!(
            err.to_string()
                .contains("No match for channel local with the same clock_period.")
        );

        // Outside strict mode the switch goes through and re-times the
        // retarget on the new clock.
        let switched = seq.switch_device(&other, false).unwrap();
        let cs = switched.schedule().channel("local").unwrap();
        assert_eq!(cs.duration(), ns(224));
    }

    #[test]
    fn test_strict_mod_bandwidth_only_when_pulses_used() {
        let seq = sample_sequence();
        let mut other = device("DeviceB");
        other
            .channels
            .get_mut("raman_local")
            .unwrap()
            .mod_bandwidth = Some(4.0);
        // The local channel never plays a pulse, so its mod_bandwidth is
        // not part of the strict match.
        assert!(seq.switch_device(&other, true).is_ok());

        other
            .channels
            .get_mut("rydberg_global")
            .unwrap()
            .mod_bandwidth = Some(4.0);
        let err = seq.switch_device(&other, true).unwrap_err();
        assert!(
            err.to_string()
                .contains("No match for channel global with the same mod_bandwidth.")
        );
    }

    #[test]
    fn test_eom_usage_requires_eom_config() {
        let eom_channel = Channel::rydberg(Addressing::Global)
            .with_max_amp(15.0)
            .with_max_abs_detuning(120.0)
            .with_eom_config(EomConfig::new(30.0, 700.0, 24.0));
        let mut dev_a = device("DeviceA");
        dev_a.channels.insert("rydberg_eom".to_string(), eom_channel);

        let mut seq = Sequence::new(register(), dev_a);
        seq.declare_channel("ch0", "rydberg_eom").unwrap();
        seq.enable_eom_mode("ch0", 1.0, -10.0, 0.0).unwrap();
        seq.add_eom_pulse("ch0", ns(100), 0.0, 0.0, Protocol::NoDelay)
            .unwrap();
        seq.disable_eom_mode("ch0").unwrap();

        // DeviceB's only Rydberg Global channel has no EOM.
        let err = seq.switch_device(&device("DeviceB"), false).unwrap_err();
        assert!(err.to_string().contains("right basis and addressing"));
    }

    #[test]
    fn test_switch_keeps_parametrized_calls() {
        let mut seq = sample_sequence();
        let t = seq.declare_variable("t", 1, VarDtype::Int).unwrap();
        seq.delay("global", &t).unwrap();
        assert!(seq.is_parametrized());

        let switched = seq.switch_device(&device("DeviceB"), true).unwrap();
        assert!(switched.is_parametrized());

        let mut bindings = BindingStore::new();
        bindings.set("t", 200_i64);
        let built = switched.build(&bindings, None).unwrap();
        assert_eq!(
            built.get_duration(Some("global"), false).unwrap(),
            ns(300)
        );
    }
}
