// Copyright 2026 The atomseq developers
// SPDX-License-Identifier: Apache-2.0

use crate::error::{Error, Result};
use crate::expr::{BindingStore, Expr, Value, VarDtype, Variable};
use crate::phase_tracker::PhaseTracker;
use crate::recorder::{CallRecorder, PulseArg, SequenceOp, TargetArg};
use crate::schedule::{Protocol, Schedule};
use crate::slm_mask::SlmMask;
use crate::warning::Warning;
use atomseq_device::{
    Addressing, Basis, ChannelKind, Device, MappableRegister, Pulse, QubitId, Register,
};
use atomseq_units::Nanos;
use indexmap::{IndexMap, IndexSet};
use itertools::Itertools;
use log::warn;
use std::f64::consts::TAU;

/// The register a sequence is written for.
#[derive(Debug, Clone, PartialEq)]
pub enum SequenceRegister {
    Concrete(Register),
    /// Qubit ids whose trap positions are only fixed at build time.
    Mappable(MappableRegister),
}

impl SequenceRegister {
    pub fn contains(&self, qubit: &str) -> bool {
        match self {
            SequenceRegister::Concrete(register) => register.contains(qubit),
            SequenceRegister::Mappable(register) => register.contains(qubit),
        }
    }

    /// All qubit ids, in declaration order.
    pub fn qubit_ids(&self) -> Vec<QubitId> {
        match self {
            SequenceRegister::Concrete(register) => register.qubit_ids().cloned().collect(),
            SequenceRegister::Mappable(register) => register.qubit_ids().to_vec(),
        }
    }
}

/// A pulse sequence under construction for a given device and register.
///
/// All mutating calls are recorded. Calls that depend on declared variables
/// are not executed but deferred until `build` binds the variables; from the
/// first such call on, every later mutation is deferred as well, so that
/// build replays them in their original order.
#[derive(Debug, Clone)]
pub struct Sequence {
    pub(crate) device: Device,
    pub(crate) register: SequenceRegister,
    pub(crate) schedule: Schedule,
    pub(crate) phase_tracker: PhaseTracker,
    pub(crate) slm_mask: Option<SlmMask>,
    pub(crate) recorder: CallRecorder,
    pub(crate) variables: IndexMap<String, Variable>,
    /// False from the first deferred call on.
    pub(crate) building: bool,
    pub(crate) in_xy: bool,
    pub(crate) measurement: Option<Basis>,
    pub(crate) magnetic_field: Option<[f64; 3]>,
    pub(crate) warnings: Vec<Warning>,
}

impl Sequence {
    pub fn new(register: Register, device: Device) -> Self {
        Sequence::with_register(SequenceRegister::Concrete(register), device)
    }

    pub fn new_mappable(register: MappableRegister, device: Device) -> Self {
        Sequence::with_register(SequenceRegister::Mappable(register), device)
    }

    fn with_register(register: SequenceRegister, device: Device) -> Self {
        Sequence {
            device,
            register,
            schedule: Schedule::new(),
            phase_tracker: PhaseTracker::new(),
            slm_mask: None,
            recorder: CallRecorder::new(),
            variables: IndexMap::new(),
            building: true,
            in_xy: false,
            measurement: None,
            magnetic_field: None,
            warnings: Vec::new(),
        }
    }

    pub fn device(&self) -> &Device {
        &self.device
    }

    pub fn register(&self) -> &SequenceRegister {
        &self.register
    }

    pub fn schedule(&self) -> &Schedule {
        &self.schedule
    }

    pub fn slm_mask(&self) -> Option<&SlmMask> {
        self.slm_mask.as_ref()
    }

    pub fn measurement(&self) -> Option<Basis> {
        self.measurement
    }

    pub fn is_measured(&self) -> bool {
        self.measurement.is_some()
    }

    pub fn is_parametrized(&self) -> bool {
        !self.building
    }

    pub fn is_in_xy(&self) -> bool {
        self.in_xy
    }

    pub fn magnetic_field(&self) -> Option<[f64; 3]> {
        self.magnetic_field
    }

    pub fn declared_variables(&self) -> &IndexMap<String, Variable> {
        &self.variables
    }

    pub fn declared_channels(&self) -> Vec<&String> {
        self.schedule.channel_names().collect()
    }

    /// Device channel ids still available for declaration.
    pub fn available_channels(&self) -> Vec<&String> {
        let used: IndexSet<&String> = self
            .schedule
            .channels()
            .map(|cs| &cs.channel_id)
            .collect();
        self.device
            .channels
            .iter()
            .filter(|(id, channel)| {
                if !self.device.reusable_channels && used.contains(id) {
                    return false;
                }
                if self.in_xy {
                    channel.kind == ChannelKind::Microwave
                } else if self.schedule.is_empty() {
                    true
                } else {
                    channel.kind != ChannelKind::Microwave
                }
            })
            .map(|(id, _)| id)
            .collect()
    }

    pub fn warnings(&self) -> &[Warning] {
        &self.warnings
    }

    pub fn drain_warnings(&mut self) -> Vec<Warning> {
        std::mem::take(&mut self.warnings)
    }

    pub fn is_in_eom_mode(&self, channel: &str) -> Result<bool> {
        Ok(self.schedule.channel(channel)?.in_eom_mode())
    }

    pub fn eom_intervals(&self, channel: &str) -> Result<Vec<(Nanos, Nanos)>> {
        Ok(self.schedule.channel(channel)?.eom_intervals())
    }

    /// The sequence duration, per channel or overall.
    pub fn get_duration(&self, channel: Option<&str>, include_fall_time: bool) -> Result<Nanos> {
        let pick = |cs: &crate::schedule::ChannelSchedule| {
            if include_fall_time {
                cs.duration_with_fall_time()
            } else {
                cs.duration()
            }
        };
        match channel {
            Some(name) => Ok(pick(self.schedule.channel(name)?)),
            None => Ok(self
                .schedule
                .channels()
                .map(pick)
                .max()
                .unwrap_or(Nanos::ZERO)),
        }
    }

    /// The accumulated phase reference of a qubit on a basis.
    pub fn current_phase_ref(&self, qubit: &str, basis: Basis) -> Result<f64> {
        self.check_qubits([&qubit.to_string()])?;
        if !self.used_bases().contains(&basis) {
            return Err(Error::Argument(
                "No declared channel targets the given 'basis'.".into(),
            ));
        }
        Ok(self.phase_tracker.phase(basis, qubit))
    }

    /// Set the magnetic field (in Gauss), entering XY mode on an empty
    /// sequence.
    pub fn set_magnetic_field(&mut self, bx: f64, by: f64, bz: f64) -> Result<()> {
        self.check_not_measured()?;
        if !self.in_xy {
            if !self.schedule.is_empty() {
                return Err(Error::State(
                    "The magnetic field can only be set in 'XY Mode'.".into(),
                ));
            }
            if !self.device.supported_bases().contains(&Basis::Xy) {
                return Err(Error::Constraint(
                    "This device does not support the XY basis.".into(),
                ));
            }
            self.in_xy = true;
        }
        if (bx * bx + by * by + bz * bz).sqrt() == 0.0 {
            return Err(Error::Argument(
                "The magnetic field must have a magnitude greater than 0.".into(),
            ));
        }
        self.magnetic_field = Some([bx, by, bz]);
        self.recorder.record_eager(SequenceOp::SetMagneticField {
            field: [bx, by, bz],
        });
        Ok(())
    }

    pub fn declare_channel(&mut self, name: &str, channel_id: &str) -> Result<()> {
        self.declare_channel_inner(name, channel_id, None)
    }

    /// Declare a 'Local' channel with its initial target already set.
    pub fn declare_channel_with_target<I, S>(
        &mut self,
        name: &str,
        channel_id: &str,
        initial_target: I,
    ) -> Result<()>
    where
        I: IntoIterator<Item = S>,
        S: Into<QubitId>,
    {
        let targets: IndexSet<QubitId> = initial_target.into_iter().map(Into::into).collect();
        self.declare_channel_inner(name, channel_id, Some(targets))
    }

    pub(crate) fn declare_channel_inner(
        &mut self,
        name: &str,
        channel_id: &str,
        initial_target: Option<IndexSet<QubitId>>,
    ) -> Result<()> {
        self.check_not_measured()?;
        let Some(channel) = self.device.channel(channel_id).cloned() else {
            return Err(Error::Argument(format!(
                "No channel named '{channel_id}' in the device."
            )));
        };
        if self.schedule.contains(name) {
            return Err(Error::Argument(format!(
                "The name '{name}' is already in use."
            )));
        }
        if !self.device.reusable_channels
            && self.schedule.channels().any(|cs| cs.channel_id == channel_id)
        {
            return Err(Error::Argument(format!(
                "Channel '{channel_id}' is not available."
            )));
        }
        if channel.kind == ChannelKind::Microwave {
            if !self.in_xy && !self.schedule.is_empty() {
                return Err(Error::Constraint(
                    "Microwave channels cannot be combined with Rydberg or Raman channels."
                        .into(),
                ));
            }
            self.in_xy = true;
            if self.magnetic_field.is_none() {
                self.magnetic_field = Some([0.0, 0.0, 30.0]);
            }
        } else if self.in_xy {
            return Err(Error::Constraint(
                "Only Microwave channels can be declared in XY mode.".into(),
            ));
        }
        if let Some(targets) = &initial_target {
            if channel.addressing != Addressing::Local {
                return Err(Error::Argument(
                    "Cannot set an initial target on a 'Global' channel.".into(),
                ));
            }
            self.check_qubits(targets.iter())?;
            self.check_max_targets(&channel, targets.len())?;
        }
        let targets = match channel.addressing {
            Addressing::Global => self.register.qubit_ids().into_iter().collect(),
            Addressing::Local => initial_target.clone().unwrap_or_default(),
        };
        self.schedule.declare(name, channel_id, channel, targets);
        self.recorder.record_eager(SequenceOp::DeclareChannel {
            name: name.to_string(),
            channel_id: channel_id.to_string(),
            initial_target,
        });
        Ok(())
    }

    /// Declare a variable to be bound at build time.
    pub fn declare_variable(
        &mut self,
        name: &str,
        size: usize,
        dtype: VarDtype,
    ) -> Result<Variable> {
        if name == "qubits" {
            return Err(Error::Argument(
                "'qubits' is a protected name; please use a different name for the variable."
                    .into(),
            ));
        }
        if self.variables.contains_key(name) {
            return Err(Error::Argument(format!(
                "Name '{name}' is already being used for a variable."
            )));
        }
        if size == 0 {
            return Err(Error::Argument(
                "A variable must have a size of at least 1.".into(),
            ));
        }
        let variable = Variable {
            name: name.to_string(),
            dtype,
            size,
        };
        self.variables.insert(name.to_string(), variable.clone());
        Ok(variable)
    }

    /// Point a 'Local' channel at a new set of qubits.
    pub fn target<I, S>(&mut self, channel: &str, targets: I) -> Result<()>
    where
        I: IntoIterator<Item = S>,
        S: Into<QubitId>,
    {
        let targets: IndexSet<QubitId> = targets.into_iter().map(Into::into).collect();
        self.validate_target(channel, &targets)?;
        let op = SequenceOp::Target {
            channel: channel.to_string(),
            targets: TargetArg::Ids(targets.clone()),
        };
        if !self.building {
            self.recorder.record_deferred(op);
            return Ok(());
        }
        if self.schedule.channel(channel)?.in_eom_mode() {
            return Err(Error::State(format!(
                "Channel '{channel}' cannot be targeted while in EOM mode."
            )));
        }
        self.schedule.add_target(channel, targets)?;
        self.recorder.record_eager(op);
        Ok(())
    }

    /// Like `target`, with qubits given by index into the register.
    pub fn target_index(&mut self, channel: &str, indices: impl Into<Expr>) -> Result<()> {
        self.check_not_measured()?;
        self.schedule.channel(channel)?;
        let indices = indices.into();
        let op = SequenceOp::Target {
            channel: channel.to_string(),
            targets: TargetArg::Indices(indices.clone()),
        };
        if !self.building || op.is_parametrized() {
            self.building = false;
            self.recorder.record_deferred(op);
            return Ok(());
        }
        let targets = self.qubits_from_value(&indices.evaluate(&BindingStore::new())?)?;
        self.target(channel, targets)
    }

    fn validate_target(&self, channel: &str, targets: &IndexSet<QubitId>) -> Result<()> {
        self.check_not_measured()?;
        let cs = self.schedule.channel(channel)?;
        if cs.channel.addressing != Addressing::Local {
            return Err(Error::Constraint(
                "Can only choose the target of 'Local' channels.".into(),
            ));
        }
        if targets.is_empty() {
            return Err(Error::Argument("Need at least one qubit to target.".into()));
        }
        self.check_qubits(targets.iter())?;
        self.check_max_targets(&cs.channel, targets.len())
    }

    /// Add idle time to a channel.
    pub fn delay(&mut self, channel: &str, duration: impl Into<Expr>) -> Result<()> {
        self.check_not_measured()?;
        self.schedule.channel(channel)?;
        let duration = duration.into();
        let op = SequenceOp::Delay {
            channel: channel.to_string(),
            duration: duration.clone(),
        };
        if !self.building || op.is_parametrized() {
            self.building = false;
            self.recorder.record_deferred(op);
            return Ok(());
        }
        self.check_targeted(channel)?;
        let requested = duration.evaluate(&BindingStore::new())?.as_nanos()?;
        if requested < Nanos::ZERO {
            return Err(Error::Argument(
                "A delay duration cannot be negative.".into(),
            ));
        }
        if requested > Nanos::ZERO {
            let adjusted = self.schedule.channel(channel)?.adjust_duration(requested);
            if adjusted != requested {
                self.push_warning(Warning::RoundedDuration {
                    channel: channel.to_string(),
                    from: requested,
                    to: adjusted,
                });
            }
            self.schedule.add_delay(channel, adjusted)?;
        }
        self.recorder.record_eager(op);
        Ok(())
    }

    /// Add a pulse to a channel.
    pub fn add(
        &mut self,
        channel: &str,
        pulse: impl Into<PulseArg>,
        protocol: Protocol,
    ) -> Result<()> {
        self.check_not_measured()?;
        self.schedule.channel(channel)?;
        let pulse = pulse.into();
        let op = SequenceOp::AddPulse {
            channel: channel.to_string(),
            pulse: pulse.clone(),
            protocol,
        };
        if !self.building || op.is_parametrized() {
            self.building = false;
            self.recorder.record_deferred(op);
            return Ok(());
        }
        if self.schedule.channel(channel)?.in_eom_mode() {
            return Err(Error::State(format!(
                "Channel '{channel}' is in EOM mode, only 'add_eom_pulse' can add pulses to it."
            )));
        }
        let concrete = match pulse {
            PulseArg::Concrete(pulse) => pulse,
            PulseArg::Parametrized(pulse) => pulse.evaluate(&BindingStore::new())?,
        };
        self.schedule_pulse(channel, concrete, protocol)?;
        self.recorder.record_eager(op);
        Ok(())
    }

    /// Shift the phase reference of the given qubits on a basis.
    pub fn phase_shift<I, S>(
        &mut self,
        phi: impl Into<Expr>,
        targets: I,
        basis: Basis,
    ) -> Result<()>
    where
        I: IntoIterator<Item = S>,
        S: Into<QubitId>,
    {
        let targets: IndexSet<QubitId> = targets.into_iter().map(Into::into).collect();
        self.validate_phase_shift(&targets, basis)?;
        let phi = phi.into();
        let op = SequenceOp::PhaseShift {
            targets: TargetArg::Ids(targets.clone()),
            phi: phi.clone(),
            basis,
        };
        if !self.building || op.is_parametrized() {
            self.building = false;
            self.recorder.record_deferred(op);
            return Ok(());
        }
        let phi = phi.evaluate(&BindingStore::new())?.as_float()?;
        for qubit in &targets {
            self.phase_tracker.shift(basis, qubit, phi);
        }
        self.recorder.record_eager(op);
        Ok(())
    }

    /// Like `phase_shift`, with qubits given by index into the register.
    pub fn phase_shift_index(
        &mut self,
        phi: impl Into<Expr>,
        indices: impl Into<Expr>,
        basis: Basis,
    ) -> Result<()> {
        self.check_not_measured()?;
        let (phi, indices) = (phi.into(), indices.into());
        let op = SequenceOp::PhaseShift {
            targets: TargetArg::Indices(indices.clone()),
            phi: phi.clone(),
            basis,
        };
        if !self.building || op.is_parametrized() {
            self.building = false;
            self.recorder.record_deferred(op);
            return Ok(());
        }
        let targets = self.qubits_from_value(&indices.evaluate(&BindingStore::new())?)?;
        self.phase_shift(phi, targets, basis)
    }

    fn validate_phase_shift(&self, targets: &IndexSet<QubitId>, basis: Basis) -> Result<()> {
        self.check_not_measured()?;
        if !self.used_bases().contains(&basis) {
            return Err(Error::Argument(
                "No declared channel targets the given 'basis'.".into(),
            ));
        }
        self.check_qubits(targets.iter())
    }

    /// Extend the named channels so they all reach the same time, taking
    /// the fall time of their last pulses into account.
    pub fn align(&mut self, channels: &[&str]) -> Result<()> {
        self.check_not_measured()?;
        let distinct: IndexSet<&str> = channels.iter().copied().collect();
        if distinct.len() != channels.len() {
            return Err(Error::Argument(
                "The same channel was provided more than once to 'align'.".into(),
            ));
        }
        if distinct.len() < 2 {
            return Err(Error::Argument(
                "'align' requires at least two different channels.".into(),
            ));
        }
        for name in &distinct {
            self.schedule.channel(name)?;
        }
        let op = SequenceOp::Align {
            channels: distinct.iter().map(|s| s.to_string()).collect(),
        };
        if !self.building {
            self.recorder.record_deferred(op);
            return Ok(());
        }
        let tf = distinct
            .iter()
            .map(|name| {
                self.schedule
                    .channel(name)
                    .map(|cs| cs.duration_with_fall_time())
            })
            .process_results(|iter| iter.max())?
            .unwrap_or(Nanos::ZERO);
        for name in &distinct {
            let cs = self.schedule.channel(name)?;
            let diff = tf - cs.duration();
            if diff > Nanos::ZERO {
                let delay = cs.adjust_duration(diff);
                self.schedule.add_delay(name, delay)?;
            }
        }
        self.recorder.record_eager(op);
        Ok(())
    }

    /// Set the measurement basis, after which the sequence is frozen.
    pub fn measure(&mut self, basis: Basis) -> Result<()> {
        self.check_not_measured()?;
        let allowed: IndexSet<Basis> = if self.in_xy {
            [Basis::Xy].into_iter().collect()
        } else {
            self.device
                .supported_bases()
                .into_iter()
                .filter(|basis| *basis != Basis::Xy)
                .collect()
        };
        if !allowed.contains(&basis) {
            return Err(Error::Argument(format!(
                "The basis '{basis}' can't be measured in this setup."
            )));
        }
        if !self.used_bases().contains(&basis) {
            self.push_warning(Warning::BasisNotAddressed { basis });
        }
        self.measurement = Some(basis);
        let op = SequenceOp::Measure { basis };
        if self.building {
            self.recorder.record_eager(op);
        } else {
            self.recorder.record_deferred(op);
        }
        Ok(())
    }

    /// Put a channel in EOM mode.
    ///
    /// The off detuning is derived from the channel's EOM configuration,
    /// landing as close to `optimal_detuning_off` as the hardware allows.
    pub fn enable_eom_mode(
        &mut self,
        channel: &str,
        amp_on: f64,
        detuning_on: f64,
        optimal_detuning_off: f64,
    ) -> Result<()> {
        self.check_not_measured()?;
        let cs = self.schedule.channel(channel)?;
        let Some(eom_config) = cs.channel.eom_config.clone() else {
            return Err(Error::Constraint(format!(
                "Channel '{channel}' does not have an EOM."
            )));
        };
        let probe = Pulse::constant(cs.channel.min_duration, amp_on, detuning_on, 0.0)?;
        cs.channel.validate_pulse(&probe)?;
        let max_abs_detuning = cs.channel.max_abs_detuning;
        let op = SequenceOp::EnableEom {
            channel: channel.to_string(),
            amp_on,
            detuning_on,
            optimal_detuning_off,
        };
        if !self.building {
            self.recorder.record_deferred(op);
            return Ok(());
        }
        if self.schedule.channel(channel)?.in_eom_mode() {
            return Err(Error::State(format!(
                "Channel '{channel}' is already in EOM mode."
            )));
        }
        let detuning_off = eom_config.detuning_off(amp_on, detuning_on, optimal_detuning_off);
        if detuning_off.abs() > max_abs_detuning {
            return Err(Error::Constraint(format!(
                "The off detuning ({detuning_off}) goes out of the bounds allowed for this \
                 channel (+-{max_abs_detuning})."
            )));
        }
        self.schedule
            .enable_eom(channel, amp_on, detuning_on, detuning_off)?;
        self.recorder.record_eager(op);
        Ok(())
    }

    /// Add a pulse to a channel in EOM mode.
    ///
    /// Amplitude and detuning are fixed by the EOM block; only duration,
    /// phase and post phase shift are free.
    pub fn add_eom_pulse(
        &mut self,
        channel: &str,
        duration: impl Into<Expr>,
        phase: impl Into<Expr>,
        post_phase_shift: f64,
        protocol: Protocol,
    ) -> Result<()> {
        self.check_not_measured()?;
        self.schedule.channel(channel)?;
        let (duration, phase) = (duration.into(), phase.into());
        let op = SequenceOp::AddEomPulse {
            channel: channel.to_string(),
            duration: duration.clone(),
            phase: phase.clone(),
            post_phase_shift,
            protocol,
        };
        if !self.building || op.is_parametrized() {
            self.building = false;
            self.recorder.record_deferred(op);
            return Ok(());
        }
        let cs = self.schedule.channel(channel)?;
        let Some(block) = cs.eom_settings() else {
            return Err(Error::State(format!(
                "Channel '{channel}' must be in EOM mode to use 'add_eom_pulse'."
            )));
        };
        let (amp_on, detuning_on) = (block.amp_on, block.detuning_on);
        let duration = duration.evaluate(&BindingStore::new())?.as_nanos()?;
        let phase = phase.evaluate(&BindingStore::new())?.as_float()?;
        let pulse = Pulse::constant(duration, amp_on, detuning_on, phase)?
            .with_post_phase_shift(post_phase_shift);
        self.schedule_pulse(channel, pulse, protocol)?;
        self.recorder.record_eager(op);
        Ok(())
    }

    /// Take a channel out of EOM mode.
    pub fn disable_eom_mode(&mut self, channel: &str) -> Result<()> {
        self.check_not_measured()?;
        let cs = self.schedule.channel(channel)?;
        let op = SequenceOp::DisableEom {
            channel: channel.to_string(),
        };
        if !self.building {
            self.recorder.record_deferred(op);
            return Ok(());
        }
        if !cs.in_eom_mode() {
            return Err(Error::State(format!(
                "Channel '{channel}' is not in EOM mode."
            )));
        }
        self.schedule.disable_eom(channel)?;
        self.recorder.record_eager(op);
        Ok(())
    }

    /// Mask a set of qubits during the first global pulse of the sequence.
    pub fn config_slm_mask<I, S>(&mut self, targets: I) -> Result<()>
    where
        I: IntoIterator<Item = S>,
        S: Into<QubitId>,
    {
        self.check_not_measured()?;
        if !self.device.supports_slm_mask {
            return Err(Error::Constraint(
                "This device does not have an SLM mask.".into(),
            ));
        }
        if matches!(self.register, SequenceRegister::Mappable(_)) {
            return Err(Error::State(
                "The SLM mask cannot be combined with a mappable register.".into(),
            ));
        }
        if self.slm_mask.is_some() {
            return Err(Error::State(
                "The SLM mask can be configured only once.".into(),
            ));
        }
        let targets: IndexSet<QubitId> = targets.into_iter().map(Into::into).collect();
        self.check_qubits(targets.iter())?;
        self.slm_mask = Some(SlmMask::new(targets.clone()));
        self.refresh_slm_interval();
        self.recorder
            .record_eager(SequenceOp::ConfigSlmMask { targets });
        Ok(())
    }

    /// Bind the declared variables and produce the concrete sequence.
    ///
    /// For a mappable register, `qubits` maps each referenced qubit id to a
    /// trap index. Building is deterministic: the recorded calls are
    /// replayed in order onto a fresh sequence.
    pub fn build(
        &self,
        bindings: &BindingStore,
        qubits: Option<&IndexMap<QubitId, usize>>,
    ) -> Result<Sequence> {
        if matches!(self.register, SequenceRegister::Concrete(_)) && qubits.is_some() {
            return Err(Error::Argument(
                "'qubits' can only be specified when building a sequence with a mappable \
                 register."
                    .into(),
            ));
        }
        if self.building {
            if let SequenceRegister::Concrete(_) = &self.register {
                let mut copy = self.clone();
                copy.push_warning(Warning::NoParametrizedCalls);
                return Ok(copy);
            }
        }
        let missing: Vec<&String> = self
            .variables
            .keys()
            .filter(|name| !bindings.contains(name))
            .collect();
        if !missing.is_empty() {
            return Err(Error::Argument(format!(
                "Did not receive values for variables: {}.",
                missing.iter().join(", ")
            )));
        }
        for variable in self.variables.values() {
            let value = bindings.get(&variable.name)?;
            if value.len() != variable.size {
                return Err(Error::Argument(format!(
                    "The value for variable '{}' must be of size {}.",
                    variable.name, variable.size
                )));
            }
            if variable.dtype == VarDtype::Int && value.dtype() == VarDtype::Float {
                return Err(Error::Argument(format!(
                    "The value for variable '{}' must be of dtype int.",
                    variable.name
                )));
            }
        }
        let register = match &self.register {
            SequenceRegister::Concrete(register) => register.clone(),
            SequenceRegister::Mappable(mappable) => {
                let Some(mapping) = qubits else {
                    return Err(Error::Argument(
                        "'qubits' must be specified when building a sequence with a mappable \
                         register."
                            .into(),
                    ));
                };
                let referenced = self.referenced_qubits(bindings)?;
                let missing: Vec<&QubitId> = referenced
                    .iter()
                    .filter(|qubit| !mapping.contains_key(*qubit))
                    .collect();
                if !missing.is_empty() {
                    return Err(Error::Argument(format!(
                        "Please include trap ids for the following qubits: {}.",
                        missing.iter().sorted().join(", ")
                    )));
                }
                mappable.build_register(mapping)?
            }
        };
        let mut fresh = Sequence::new(register, self.device.clone());
        for op in self
            .recorder
            .eager
            .iter()
            .chain(self.recorder.deferred.iter())
        {
            fresh.apply_op(op, bindings)?;
        }
        let extra = bindings.unqueried();
        if !extra.is_empty() {
            fresh.push_warning(Warning::UnusedBindings { names: extra });
        }
        Ok(fresh)
    }

    /// Execute one recorded call against this sequence.
    pub(crate) fn apply_op(&mut self, op: &SequenceOp, bindings: &BindingStore) -> Result<()> {
        match op {
            SequenceOp::DeclareChannel {
                name,
                channel_id,
                initial_target,
            } => self.declare_channel_inner(name, channel_id, initial_target.clone()),
            SequenceOp::Target { channel, targets } => {
                let targets = self.resolve_targets(targets, bindings)?;
                self.target(channel, targets)
            }
            SequenceOp::AddPulse {
                channel,
                pulse,
                protocol,
            } => {
                let concrete = match pulse {
                    PulseArg::Concrete(pulse) => pulse.clone(),
                    PulseArg::Parametrized(pulse) => pulse.evaluate(bindings)?,
                };
                self.add(channel, concrete, *protocol)
            }
            SequenceOp::AddEomPulse {
                channel,
                duration,
                phase,
                post_phase_shift,
                protocol,
            } => {
                let duration = duration.evaluate(bindings)?.as_nanos()?;
                let phase = phase.evaluate(bindings)?.as_float()?;
                self.add_eom_pulse(channel, duration, phase, *post_phase_shift, *protocol)
            }
            SequenceOp::Delay { channel, duration } => {
                let duration = duration.evaluate(bindings)?.as_nanos()?;
                self.delay(channel, duration)
            }
            SequenceOp::EnableEom {
                channel,
                amp_on,
                detuning_on,
                optimal_detuning_off,
            } => self.enable_eom_mode(channel, *amp_on, *detuning_on, *optimal_detuning_off),
            SequenceOp::DisableEom { channel } => self.disable_eom_mode(channel),
            SequenceOp::PhaseShift {
                targets,
                phi,
                basis,
            } => {
                let targets = self.resolve_targets(targets, bindings)?;
                let phi = phi.evaluate(bindings)?.as_float()?;
                self.phase_shift(phi, targets, *basis)
            }
            SequenceOp::Align { channels } => {
                let names: Vec<&str> = channels.iter().map(String::as_str).collect();
                self.align(&names)
            }
            SequenceOp::Measure { basis } => self.measure(*basis),
            SequenceOp::SetMagneticField { field } => {
                self.set_magnetic_field(field[0], field[1], field[2])
            }
            SequenceOp::ConfigSlmMask { targets } => self.config_slm_mask(targets.clone()),
        }
    }

    fn resolve_targets(
        &self,
        targets: &TargetArg,
        bindings: &BindingStore,
    ) -> Result<IndexSet<QubitId>> {
        match targets {
            TargetArg::Ids(ids) => Ok(ids.clone()),
            TargetArg::Indices(expr) => self.qubits_from_value(&expr.evaluate(bindings)?),
        }
    }

    fn qubits_from_value(&self, value: &Value) -> Result<IndexSet<QubitId>> {
        let indices: Vec<i64> = match value {
            Value::Int(index) => vec![*index],
            Value::IntArray(indices) => indices.clone(),
            _ => {
                return Err(Error::Argument(
                    "Qubit indices must be integers.".into(),
                ));
            }
        };
        let ids = self.register.qubit_ids();
        let mut targets = IndexSet::new();
        for index in indices {
            let qubit = usize::try_from(index)
                .ok()
                .and_then(|index| ids.get(index));
            let Some(qubit) = qubit else {
                return Err(Error::Argument(format!(
                    "Index {index} is out of bounds for the register of size {}.",
                    ids.len()
                )));
            };
            targets.insert(qubit.clone());
        }
        Ok(targets)
    }

    /// All qubit ids referenced by recorded calls.
    ///
    /// Index-based targets are resolved against the register's declared
    /// qubit order, which requires the bindings for any symbolic index.
    fn referenced_qubits(&self, bindings: &BindingStore) -> Result<IndexSet<QubitId>> {
        let mut qubits = IndexSet::new();
        for op in self
            .recorder
            .eager
            .iter()
            .chain(self.recorder.deferred.iter())
        {
            match op {
                SequenceOp::DeclareChannel {
                    initial_target: Some(targets),
                    ..
                }
                | SequenceOp::ConfigSlmMask { targets } => {
                    qubits.extend(targets.iter().cloned());
                }
                SequenceOp::Target { targets, .. } | SequenceOp::PhaseShift { targets, .. } => {
                    qubits.extend(self.resolve_targets(targets, bindings)?);
                }
                _ => {}
            }
        }
        Ok(qubits)
    }

    fn schedule_pulse(&mut self, channel: &str, pulse: Pulse, protocol: Protocol) -> Result<()> {
        let (channel_obj, targets, basis, adjusted) = {
            let cs = self.schedule.channel(channel)?;
            let targets = cs.current_targets();
            if targets.is_empty() {
                return Err(Error::State(format!(
                    "Channel '{channel}' has no target qubits yet."
                )));
            }
            (
                cs.channel.clone(),
                targets,
                cs.channel.basis(),
                cs.adjust_duration(pulse.duration()),
            )
        };
        let mut pulse = pulse;
        if adjusted != pulse.duration() {
            self.push_warning(Warning::RoundedDuration {
                channel: channel.to_string(),
                from: pulse.duration(),
                to: adjusted,
            });
            pulse = pulse.with_duration(adjusted)?;
        }
        channel_obj.validate_pulse(&pulse)?;
        let phase_ref = self
            .phase_tracker
            .common_phase(basis, targets.iter())
            .ok_or_else(|| {
                Error::Argument(
                    "Cannot target qubits with different phase references for the same basis."
                        .into(),
                )
            })?;
        let mut scheduled = pulse.clone();
        scheduled.phase = (pulse.phase + phase_ref).rem_euclid(TAU);
        let barriers: Vec<Nanos> = targets
            .iter()
            .map(|qubit| self.schedule.last_used(basis, qubit))
            .collect();
        let (_, tf) = self
            .schedule
            .add_pulse(channel, scheduled.clone(), &barriers, protocol)?;
        let in_eom = self.schedule.channel(channel)?.in_eom_mode();
        let fall = scheduled.fall_time(&channel_obj, in_eom);
        for qubit in &targets {
            self.schedule.mark_used(basis, qubit, tf + fall);
            self.phase_tracker.shift(basis, qubit, pulse.post_phase_shift);
        }
        self.refresh_slm_interval();
        Ok(())
    }

    fn refresh_slm_interval(&mut self) {
        if self.slm_mask.is_none() {
            return;
        }
        let basis = if self.in_xy {
            Basis::Xy
        } else {
            Basis::GroundRydberg
        };
        let earliest = self
            .schedule
            .channels()
            .filter(|cs| {
                cs.channel.addressing == Addressing::Global && cs.channel.basis() == basis
            })
            .flat_map(|cs| cs.slots.iter())
            .filter(|slot| slot.is_pulse())
            .map(|slot| (slot.ti, slot.tf))
            .min();
        if let Some(mask) = self.slm_mask.as_mut() {
            if earliest.is_some() {
                mask.interval = earliest;
            }
        }
    }

    /// Bases addressed by the declared channels.
    fn used_bases(&self) -> IndexSet<Basis> {
        self.schedule.channels().map(|cs| cs.channel.basis()).collect()
    }

    fn check_not_measured(&self) -> Result<()> {
        if self.is_measured() {
            return Err(Error::State(
                "The sequence has been measured, no further changes are allowed.".into(),
            ));
        }
        Ok(())
    }

    fn check_targeted(&self, channel: &str) -> Result<()> {
        if self.schedule.channel(channel)?.current_targets().is_empty() {
            return Err(Error::State(format!(
                "Channel '{channel}' has no target qubits yet."
            )));
        }
        Ok(())
    }

    fn check_qubits<'a>(&self, qubits: impl IntoIterator<Item = &'a QubitId>) -> Result<()> {
        for qubit in qubits {
            if !self.register.contains(qubit) {
                return Err(Error::Argument(format!(
                    "'{qubit}' is not a qubit id of the register."
                )));
            }
        }
        Ok(())
    }

    fn check_max_targets(&self, channel: &atomseq_device::Channel, count: usize) -> Result<()> {
        if let Some(max_targets) = channel.max_targets {
            if count > max_targets {
                return Err(Error::Constraint(format!(
                    "This channel can target at most {max_targets} qubits at a time."
                )));
            }
        }
        Ok(())
    }

    pub(crate) fn push_warning(&mut self, warning: Warning) {
        warn!("{warning}");
        self.warnings.push(warning);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recorder::ParametrizedPulse;
    use atomseq_device::{Channel, EomConfig};
    use atomseq_units::ns;

    fn register() -> Register {
        Register::from_coordinates(vec![(0.0, 0.0), (5.0, 0.0), (10.0, 0.0), (15.0, 0.0)])
            .unwrap()
    }

    fn local_channel(kind: ChannelKind) -> Channel {
        Channel::new(kind, Addressing::Local)
            .with_max_amp(10.0)
            .with_max_abs_detuning(120.0)
            .with_clock_period(ns(4))
            .with_min_duration(ns(16))
            .with_min_retarget_interval(ns(220))
            .with_max_targets(2)
    }

    fn test_device() -> Device {
        let channels: IndexMap<String, Channel> = [
            (
                "rydberg_global".to_string(),
                Channel::rydberg(Addressing::Global)
                    .with_max_amp(15.0)
                    .with_max_abs_detuning(120.0),
            ),
            (
                "rydberg_local".to_string(),
                local_channel(ChannelKind::Rydberg),
            ),
            ("raman_local".to_string(), local_channel(ChannelKind::Raman)),
        ]
        .into_iter()
        .collect();
        Device::new("TestDevice", channels).with_slm_mask()
    }

    fn xy_device() -> Device {
        let channels: IndexMap<String, Channel> = [
            (
                "rydberg_global".to_string(),
                Channel::rydberg(Addressing::Global).with_max_amp(15.0),
            ),
            (
                "mw_global".to_string(),
                Channel::microwave().with_max_amp(4.0),
            ),
        ]
        .into_iter()
        .collect();
        Device::new("XyDevice", channels).with_interaction_coeff_xy(3700.0)
    }

    fn eom_device() -> Device {
        let channels: IndexMap<String, Channel> = [(
            "rydberg_eom".to_string(),
            Channel::rydberg(Addressing::Global)
                .with_max_amp(15.0)
                .with_max_abs_detuning(120.0)
                .with_eom_config(EomConfig::new(30.0, 700.0, 24.0)),
        )]
        .into_iter()
        .collect();
        Device::new("EomDevice", channels)
    }

    fn pulse(duration: i64) -> Pulse {
        Pulse::constant(ns(duration), 1.0, 0.0, 0.0).unwrap()
    }

    #[test]
    fn test_declare_channel() {
        let mut seq = Sequence::new(register(), test_device());
        seq.declare_channel("global", "rydberg_global").unwrap();

        let err = seq.declare_channel("other", "missing").unwrap_err();
        assert!(err.to_string().contains("No channel named 'missing'"));

        let err = seq.declare_channel("global", "raman_local").unwrap_err();
        assert!(err.to_string().contains("already in use"));

        let err = seq.declare_channel("global2", "rydberg_global").unwrap_err();
        assert!(err.to_string().contains("not available"));

        assert_eq!(seq.declared_channels(), vec!["global"]);
        assert!(!seq.available_channels().contains(&&"rydberg_global".to_string()));
        assert!(seq.available_channels().contains(&&"raman_local".to_string()));
    }

    #[test]
    fn test_reusable_channels() {
        let device = test_device().with_reusable_channels();
        let mut seq = Sequence::new(register(), device);
        seq.declare_channel("a", "rydberg_global").unwrap();
        seq.declare_channel("b", "rydberg_global").unwrap();
        assert_eq!(seq.declared_channels().len(), 2);
    }

    #[test]
    fn test_initial_target() {
        let mut seq = Sequence::new(register(), test_device());
        let err = seq
            .declare_channel_with_target("global", "rydberg_global", ["q0"])
            .unwrap_err();
        assert!(err.to_string().contains("'Global' channel"));

        seq.declare_channel_with_target("local", "raman_local", ["q0"])
            .unwrap();
        let cs = seq.schedule().channel("local").unwrap();
        assert_eq!(cs.slots.len(), 1);
        assert_eq!((cs.slots[0].ti, cs.slots[0].tf), (ns(0), ns(0)));

        // A local channel without a target can take no delays or pulses.
        seq.declare_channel("bare", "rydberg_local").unwrap();
        let err = seq.delay("bare", ns(100)).unwrap_err();
        assert!(err.to_string().contains("no target qubits"));
        let err = seq.add("bare", pulse(100), Protocol::MinDelay).unwrap_err();
        assert!(err.to_string().contains("no target qubits"));
    }

    #[test]
    fn test_xy_exclusivity() {
        let mut seq = Sequence::new(register(), xy_device());
        seq.declare_channel("ryd", "rydberg_global").unwrap();
        let err = seq.declare_channel("mw", "mw_global").unwrap_err();
        assert!(err.to_string().contains("cannot be combined"));

        let mut seq = Sequence::new(register(), xy_device());
        seq.declare_channel("mw", "mw_global").unwrap();
        assert!(seq.is_in_xy());
        assert_eq!(seq.magnetic_field(), Some([0.0, 0.0, 30.0]));
        let err = seq.declare_channel("ryd", "rydberg_global").unwrap_err();
        assert!(err.to_string().contains("XY mode"));
        assert_eq!(seq.available_channels(), Vec::<&String>::new());
    }

    #[test]
    fn test_magnetic_field() {
        let mut seq = Sequence::new(register(), xy_device());
        seq.declare_channel("ryd", "rydberg_global").unwrap();
        let err = seq.set_magnetic_field(0.0, 0.0, 10.0).unwrap_err();
        assert!(err.to_string().contains("'XY Mode'"));

        let mut seq = Sequence::new(register(), xy_device());
        seq.set_magnetic_field(1.0, 0.0, 0.0).unwrap();
        assert!(seq.is_in_xy());
        assert_eq!(seq.magnetic_field(), Some([1.0, 0.0, 0.0]));
        assert!(seq.set_magnetic_field(0.0, 0.0, 0.0).is_err());

        // Measurements in XY mode are restricted to the XY basis.
        seq.declare_channel("mw", "mw_global").unwrap();
        assert!(seq.measure(Basis::GroundRydberg).is_err());
        seq.measure(Basis::Xy).unwrap();
    }

    #[test]
    fn test_target() {
        let mut seq = Sequence::new(register(), test_device());
        seq.declare_channel("global", "rydberg_global").unwrap();
        seq.declare_channel_with_target("local", "raman_local", ["q0"])
            .unwrap();

        let err = seq.target("global", ["q0"]).unwrap_err();
        assert!(err.to_string().contains("'Local' channels"));
        let err = seq.target("local", ["q20"]).unwrap_err();
        assert!(err.to_string().contains("not a qubit id"));
        let err = seq.target("local", ["q0", "q1", "q2"]).unwrap_err();
        assert!(err.to_string().contains("at most 2 qubits"));
        let err = seq.target("none", ["q0"]).unwrap_err();
        assert!(err.to_string().contains("declared channel"));

        // Retargeting to the current targets adds nothing.
        seq.target("local", ["q0"]).unwrap();
        assert_eq!(seq.schedule().channel("local").unwrap().slots.len(), 1);

        seq.target("local", ["q1"]).unwrap();
        assert_eq!(seq.get_duration(Some("local"), false).unwrap(), ns(220));

        // A 4 ns residue of the retarget interval rounds up to the
        // channel's 16 ns minimum duration.
        seq.delay("local", ns(216)).unwrap();
        seq.target("local", ["q2"]).unwrap();
        let cs = seq.schedule().channel("local").unwrap();
        let last = cs.slots.last().unwrap();
        assert_eq!((last.ti, last.tf), (ns(436), ns(452)));
    }

    #[test]
    fn test_delay_rounding_warns() {
        let mut seq = Sequence::new(register(), test_device());
        seq.declare_channel_with_target("local", "raman_local", ["q0"])
            .unwrap();
        seq.delay("local", ns(10)).unwrap();
        assert_eq!(seq.get_duration(Some("local"), false).unwrap(), ns(16));
        let warnings = seq.drain_warnings();
        assert!(matches!(
            &warnings[0],
            Warning::RoundedDuration { from, to, .. } if *from == ns(10) && *to == ns(16)
        ));
    }

    #[test]
    fn test_add_pulse() {
        let mut seq = Sequence::new(register(), test_device());
        seq.declare_channel("global", "rydberg_global").unwrap();

        let strong = Pulse::constant(ns(100), 20.0, 0.0, 0.0).unwrap();
        let err = seq.add("global", strong, Protocol::MinDelay).unwrap_err();
        assert!(matches!(err, Error::Device(_)));

        seq.add("global", pulse(100), Protocol::MinDelay).unwrap();
        let cs = seq.schedule().channel("global").unwrap();
        let slot = cs.slots.last().unwrap();
        assert_eq!((slot.ti, slot.tf), (ns(0), ns(100)));
        assert_eq!(slot.pulse().unwrap().amplitude.first_value(), 1.0);
    }

    #[test]
    fn test_pulse_duration_rounding_warns() {
        let mut seq = Sequence::new(register(), test_device());
        seq.declare_channel_with_target("local", "raman_local", ["q0"])
            .unwrap();
        seq.add("local", pulse(10), Protocol::MinDelay).unwrap();
        let cs = seq.schedule().channel("local").unwrap();
        assert_eq!(cs.slots.last().unwrap().duration(), ns(16));
        let warnings = seq.drain_warnings();
        assert!(matches!(
            &warnings[0],
            Warning::RoundedDuration { from, to, .. } if *from == ns(10) && *to == ns(16)
        ));
    }

    #[test]
    fn test_phase_refs() {
        let mut seq = Sequence::new(register(), test_device());
        seq.declare_channel("global", "rydberg_global").unwrap();

        let err = seq.phase_shift(1.0, ["q0"], Basis::Digital).unwrap_err();
        assert!(err.to_string().contains("'basis'"));

        seq.phase_shift(1.0, ["q0", "q1", "q2", "q3"], Basis::GroundRydberg)
            .unwrap();
        assert_eq!(
            seq.current_phase_ref("q0", Basis::GroundRydberg).unwrap(),
            1.0
        );

        // The phase reference is folded into the scheduled phase.
        seq.add("global", pulse(100), Protocol::MinDelay).unwrap();
        let cs = seq.schedule().channel("global").unwrap();
        assert_eq!(cs.slots.last().unwrap().pulse().unwrap().phase, 1.0);
    }

    #[test]
    fn test_mismatched_phase_refs() {
        let mut seq = Sequence::new(register(), test_device());
        seq.declare_channel_with_target("local", "raman_local", ["q0", "q1"])
            .unwrap();
        seq.phase_shift(1.0, ["q0"], Basis::Digital).unwrap();
        let err = seq.add("local", pulse(100), Protocol::MinDelay).unwrap_err();
        assert!(err.to_string().contains("different phase references"));
    }

    #[test]
    fn test_post_phase_shift() {
        let mut seq = Sequence::new(register(), test_device());
        seq.declare_channel("global", "rydberg_global").unwrap();
        let shifted = pulse(100).with_post_phase_shift(0.75);
        seq.add("global", shifted, Protocol::MinDelay).unwrap();
        assert_eq!(
            seq.current_phase_ref("q2", Basis::GroundRydberg).unwrap(),
            0.75
        );
    }

    #[test]
    fn test_measure() {
        let mut seq = Sequence::new(register(), test_device());
        seq.declare_channel("global", "rydberg_global").unwrap();

        let err = seq.measure(Basis::Xy).unwrap_err();
        assert!(err.to_string().contains("can't be measured"));

        // Digital is supported by the device but addressed by no declared
        // channel.
        seq.measure(Basis::Digital).unwrap();
        assert!(seq
            .drain_warnings()
            .iter()
            .any(|w| matches!(w, Warning::BasisNotAddressed { basis } if *basis == Basis::Digital)));
        assert!(seq.is_measured());

        let err = seq.delay("global", ns(100)).unwrap_err();
        assert!(err.to_string().contains("has been measured"));
        assert!(seq.measure(Basis::GroundRydberg).is_err());
    }

    #[test]
    fn test_align() {
        let mut seq = Sequence::new(register(), test_device());
        seq.declare_channel("global", "rydberg_global").unwrap();
        seq.declare_channel_with_target("local", "raman_local", ["q0"])
            .unwrap();

        assert!(seq.align(&["global"]).is_err());
        assert!(seq.align(&["global", "global"]).is_err());
        assert!(seq.align(&["global", "nope"]).is_err());
        let err = seq.align(&["global", "local", "global"]).unwrap_err();
        assert!(err.to_string().contains("more than once"));

        seq.add("global", pulse(100), Protocol::MinDelay).unwrap();
        seq.align(&["global", "local"]).unwrap();
        assert_eq!(seq.get_duration(Some("local"), false).unwrap(), ns(100));
    }

    #[test]
    fn test_declare_variable() {
        let mut seq = Sequence::new(register(), test_device());
        seq.declare_variable("t", 1, VarDtype::Int).unwrap();
        assert!(seq.declare_variable("t", 1, VarDtype::Int).is_err());
        assert!(seq.declare_variable("qubits", 1, VarDtype::Int).is_err());
        assert!(seq.declare_variable("empty", 0, VarDtype::Int).is_err());
    }

    #[test]
    fn test_parametrized_build() {
        let mut seq = Sequence::new(register(), test_device());
        seq.declare_channel("global", "rydberg_global").unwrap();
        seq.declare_channel_with_target("local", "raman_local", ["q0"])
            .unwrap();
        let t = seq.declare_variable("t", 1, VarDtype::Int).unwrap();

        seq.add("global", pulse(100), Protocol::MinDelay).unwrap();
        seq.delay("global", &t).unwrap();
        assert!(seq.is_parametrized());

        // Later concrete calls are deferred too.
        seq.target("local", ["q1"]).unwrap();
        assert_eq!(
            seq.schedule().channel("local").unwrap().current_targets(),
            ["q0".to_string()].into_iter().collect::<IndexSet<_>>()
        );

        let err = seq.build(&BindingStore::new(), None).unwrap_err();
        assert!(err
            .to_string()
            .contains("Did not receive values for variables: t."));

        let mut bad = BindingStore::new();
        bad.set("t", 2.5);
        assert!(seq.build(&bad, None).unwrap_err().to_string().contains("dtype int"));

        let mut bindings = BindingStore::new();
        bindings.set("t", 200_i64);
        bindings.set("extra", 1_i64);
        let mut built = seq.build(&bindings, None).unwrap();
        assert!(!built.is_parametrized());
        assert_eq!(built.get_duration(Some("global"), false).unwrap(), ns(300));
        assert_eq!(
            built.schedule().channel("local").unwrap().current_targets(),
            ["q1".to_string()].into_iter().collect::<IndexSet<_>>()
        );
        assert!(built
            .drain_warnings()
            .iter()
            .any(|w| matches!(w, Warning::UnusedBindings { names } if names == &["extra"])));

        // Building is deterministic.
        let again = seq.build(&bindings, None).unwrap();
        assert_eq!(again.schedule(), built.schedule());
    }

    #[test]
    fn test_build_concrete_sequence_warns() {
        let mut seq = Sequence::new(register(), test_device());
        seq.declare_channel("global", "rydberg_global").unwrap();
        seq.add("global", pulse(100), Protocol::MinDelay).unwrap();
        let mut built = seq.build(&BindingStore::new(), None).unwrap();
        assert_eq!(built.schedule(), seq.schedule());
        assert!(built
            .drain_warnings()
            .contains(&Warning::NoParametrizedCalls));
    }

    #[test]
    fn test_parametrized_pulse() {
        let mut seq = Sequence::new(register(), test_device());
        seq.declare_channel("global", "rydberg_global").unwrap();
        let a = seq.declare_variable("a", 1, VarDtype::Float).unwrap();
        let par = ParametrizedPulse {
            duration: Expr::Int(100),
            amplitude: a.expr(),
            detuning: Expr::Float(0.0),
            phase: Expr::Float(0.0),
            post_phase_shift: 0.0,
        };
        seq.add("global", par, Protocol::MinDelay).unwrap();
        assert!(seq.is_parametrized());

        let mut bindings = BindingStore::new();
        bindings.set("a", 2.0);
        let built = seq.build(&bindings, None).unwrap();
        let cs = built.schedule().channel("global").unwrap();
        assert_eq!(cs.slots.last().unwrap().pulse().unwrap().amplitude.first_value(), 2.0);
    }

    #[test]
    fn test_target_index() {
        let mut seq = Sequence::new(register(), test_device());
        seq.declare_channel_with_target("local", "raman_local", ["q0"])
            .unwrap();

        seq.target_index("local", 1_i64).unwrap();
        assert_eq!(
            seq.schedule().channel("local").unwrap().current_targets(),
            ["q1".to_string()].into_iter().collect::<IndexSet<_>>()
        );
        let err = seq.target_index("local", 10_i64).unwrap_err();
        assert!(err.to_string().contains("out of bounds"));

        let i = seq.declare_variable("i", 1, VarDtype::Int).unwrap();
        seq.target_index("local", &i).unwrap();
        assert!(seq.is_parametrized());

        let mut bindings = BindingStore::new();
        bindings.set("i", 3_i64);
        let built = seq.build(&bindings, None).unwrap();
        assert_eq!(
            built.schedule().channel("local").unwrap().current_targets(),
            ["q3".to_string()].into_iter().collect::<IndexSet<_>>()
        );

        let mut bindings = BindingStore::new();
        bindings.set("i", 9_i64);
        assert!(seq.build(&bindings, None).is_err());
    }

    #[test]
    fn test_mappable_register() {
        let mappable = MappableRegister::new(
            vec!["q0".into(), "q1".into()],
            vec![(0.0, 0.0), (5.0, 0.0), (10.0, 0.0)],
        )
        .unwrap();
        let mut seq = Sequence::new_mappable(mappable, test_device());
        seq.declare_channel("global", "rydberg_global").unwrap();
        seq.declare_channel_with_target("local", "raman_local", ["q0"])
            .unwrap();
        seq.add("global", pulse(100), Protocol::MinDelay).unwrap();

        let err = seq.build(&BindingStore::new(), None).unwrap_err();
        assert!(err.to_string().contains("'qubits' must be specified"));

        let incomplete: IndexMap<QubitId, usize> =
            [("q1".to_string(), 0)].into_iter().collect();
        let err = seq.build(&BindingStore::new(), Some(&incomplete)).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Please include trap ids for the following qubits: q0."
        );

        let mapping: IndexMap<QubitId, usize> =
            [("q0".to_string(), 2), ("q1".to_string(), 0)].into_iter().collect();
        let built = seq.build(&BindingStore::new(), Some(&mapping)).unwrap();
        let SequenceRegister::Concrete(reg) = built.register() else {
            panic!("expected a concrete register");
        };
        assert_eq!(reg.coordinates("q0"), Some((10.0, 0.0)));
        assert_eq!(built.get_duration(Some("global"), false).unwrap(), ns(100));
    }

    #[test]
    fn test_mappable_register_index_order() {
        let mappable = MappableRegister::new(
            vec!["q0".into(), "q1".into(), "q2".into()],
            vec![(0.0, 0.0), (5.0, 0.0), (10.0, 0.0)],
        )
        .unwrap();
        let mut seq = Sequence::new_mappable(mappable, test_device());
        seq.declare_channel_with_target("local", "raman_local", ["q0"])
            .unwrap();
        let i = seq.declare_variable("i", 1, VarDtype::Int).unwrap();
        seq.target_index("local", &i).unwrap();

        let mut bindings = BindingStore::new();
        bindings.set("i", 1_i64);

        // Indices follow the declared qubit order, not the mapping order.
        let mapping: IndexMap<QubitId, usize> =
            [("q0".to_string(), 1), ("q2".to_string(), 2), ("q1".to_string(), 0)]
                .into_iter()
                .collect();
        let built = seq.build(&bindings, Some(&mapping)).unwrap();
        assert_eq!(
            built.schedule().channel("local").unwrap().current_targets(),
            ["q1".to_string()].into_iter().collect::<IndexSet<_>>()
        );

        // A qubit referenced only through an index still needs a trap id.
        let partial: IndexMap<QubitId, usize> =
            [("q0".to_string(), 1), ("q2".to_string(), 2)].into_iter().collect();
        let err = seq.build(&bindings, Some(&partial)).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Please include trap ids for the following qubits: q1."
        );
    }

    #[test]
    fn test_slm_mask() {
        let mut seq = Sequence::new(register(), test_device());
        seq.declare_channel("global", "rydberg_global").unwrap();

        assert!(seq.config_slm_mask(["q9"]).is_err());
        seq.config_slm_mask(["q0", "q1"]).unwrap();
        assert!(seq.slm_mask().unwrap().interval.is_none());
        let err = seq.config_slm_mask(["q2"]).unwrap_err();
        assert!(err.to_string().contains("only once"));

        seq.add("global", pulse(100), Protocol::MinDelay).unwrap();
        assert_eq!(seq.slm_mask().unwrap().interval, Some((ns(0), ns(100))));

        // Later pulses do not move the masked interval.
        seq.add("global", pulse(200), Protocol::MinDelay).unwrap();
        assert_eq!(seq.slm_mask().unwrap().interval, Some((ns(0), ns(100))));
    }

    #[test]
    fn test_slm_mask_unsupported() {
        let device = Device::new(
            "NoSlm",
            [(
                "rydberg_global".to_string(),
                Channel::rydberg(Addressing::Global).with_max_amp(15.0),
            )]
            .into_iter()
            .collect(),
        );
        let mut seq = Sequence::new(register(), device);
        let err = seq.config_slm_mask(["q0"]).unwrap_err();
        assert!(err.to_string().contains("does not have an SLM mask"));
    }

    #[test]
    fn test_eom_mode() {
        let mut seq = Sequence::new(register(), eom_device());
        seq.declare_channel("ch0", "rydberg_eom").unwrap();

        let err = seq
            .add_eom_pulse("ch0", ns(100), 0.0, 0.0, Protocol::MinDelay)
            .unwrap_err();
        assert!(err.to_string().contains("must be in EOM mode"));

        seq.enable_eom_mode("ch0", 2.0, -10.0, 0.0).unwrap();
        assert!(seq.is_in_eom_mode("ch0").unwrap());
        let err = seq.enable_eom_mode("ch0", 2.0, -10.0, 0.0).unwrap_err();
        assert!(err.to_string().contains("already in EOM mode"));
        let err = seq.add("ch0", pulse(100), Protocol::MinDelay).unwrap_err();
        assert!(err.to_string().contains("add_eom_pulse"));

        seq.add_eom_pulse("ch0", ns(100), 0.0, 0.0, Protocol::MinDelay)
            .unwrap();
        let cs = seq.schedule().channel("ch0").unwrap();
        let slot_pulse = cs.slots.last().unwrap().pulse().unwrap();
        assert_eq!(slot_pulse.amplitude.first_value(), 2.0);
        assert_eq!(slot_pulse.detuning.first_value(), -10.0);

        // Idle time in EOM mode holds the off detuning.
        seq.delay("ch0", ns(200)).unwrap();
        let cs = seq.schedule().channel("ch0").unwrap();
        let idle = cs.slots.last().unwrap();
        assert!(idle.is_detuned_delay());
        let config = EomConfig::new(30.0, 700.0, 24.0);
        let expected_off = config.detuning_off(2.0, -10.0, 0.0);
        assert_eq!(idle.pulse().unwrap().detuning.first_value(), expected_off);

        seq.disable_eom_mode("ch0").unwrap();
        assert!(!seq.is_in_eom_mode("ch0").unwrap());
        assert_eq!(seq.eom_intervals("ch0").unwrap(), vec![(ns(0), ns(300))]);
        let err = seq
            .add_eom_pulse("ch0", ns(100), 0.0, 0.0, Protocol::MinDelay)
            .unwrap_err();
        assert!(err.to_string().contains("must be in EOM mode"));
    }

    #[test]
    fn test_eom_requires_config() {
        let mut seq = Sequence::new(register(), test_device());
        seq.declare_channel("global", "rydberg_global").unwrap();
        let err = seq.enable_eom_mode("global", 2.0, -10.0, 0.0).unwrap_err();
        assert!(err.to_string().contains("does not have an EOM"));
    }
}
