// Copyright 2026 The atomseq developers
// SPDX-License-Identifier: Apache-2.0

use crate::error::{Error, Result};
use crate::slot::{SlotKind, TimeSlot};
use atomseq_device::{Basis, Channel, Pulse, QubitId};
use atomseq_units::Nanos;
use indexmap::{IndexMap, IndexSet};
use std::fmt::{self, Display, Formatter};
use std::str::FromStr;

/// How a new pulse synchronizes with the other channels.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum Protocol {
    /// Wait for every pulse already scheduled, on any channel, to finish.
    #[default]
    WaitForAll,
    /// Wait only for pulses acting on a shared target to finish.
    MinDelay,
    /// Start as soon as the channel itself is free.
    NoDelay,
}

impl FromStr for Protocol {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "wait-for-all" => Ok(Protocol::WaitForAll),
            "min-delay" => Ok(Protocol::MinDelay),
            "no-delay" => Ok(Protocol::NoDelay),
            _ => Err(Error::Argument(format!(
                "'{s}' is not a valid protocol. Choose between 'wait-for-all', 'min-delay' \
                 and 'no-delay'."
            ))),
        }
    }
}

impl Display for Protocol {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Protocol::WaitForAll => write!(f, "wait-for-all"),
            Protocol::MinDelay => write!(f, "min-delay"),
            Protocol::NoDelay => write!(f, "no-delay"),
        }
    }
}

/// One span of EOM operation on a channel.
///
/// `tf` stays `None` while the block is still open.
#[derive(Debug, Clone, PartialEq)]
pub struct EomBlock {
    pub ti: Nanos,
    pub tf: Option<Nanos>,
    pub amp_on: f64,
    pub detuning_on: f64,
    pub detuning_off: f64,
}

/// The timeline of a single declared channel.
#[derive(Debug, Clone, PartialEq)]
pub struct ChannelSchedule {
    /// The name the channel was declared under.
    pub name: String,
    /// The device channel id backing the declaration.
    pub channel_id: String,
    pub channel: Channel,
    pub slots: Vec<TimeSlot>,
    pub eom_blocks: Vec<EomBlock>,
}

impl ChannelSchedule {
    pub fn new(name: impl Into<String>, channel_id: impl Into<String>, channel: Channel) -> Self {
        ChannelSchedule {
            name: name.into(),
            channel_id: channel_id.into(),
            channel,
            slots: Vec::new(),
            eom_blocks: Vec::new(),
        }
    }

    pub fn duration(&self) -> Nanos {
        self.slots.last().map(|slot| slot.tf).unwrap_or(Nanos::ZERO)
    }

    /// The channel duration, extended by the time the output of the last
    /// pulse still takes to die down.
    pub fn duration_with_fall_time(&self) -> Nanos {
        let mut duration = self.duration();
        if let Some((slot, pulse)) = self.last_pulse_slot(false) {
            let fall = pulse.fall_time(&self.channel, self.slot_in_eom_mode(slot));
            duration = duration.max(slot.tf + fall);
        }
        duration
    }

    /// Round a duration up to this channel's minimum duration and clock grid.
    pub fn adjust_duration(&self, duration: Nanos) -> Nanos {
        duration
            .max(self.channel.min_duration)
            .ceil_to(self.channel.clock_period)
    }

    pub fn current_targets(&self) -> IndexSet<QubitId> {
        self.slots
            .last()
            .map(|slot| slot.targets.clone())
            .unwrap_or_default()
    }

    pub fn is_targeted(&self) -> bool {
        !self.slots.is_empty()
    }

    /// Time at which the last targeting operation finished.
    pub fn last_target_time(&self) -> Nanos {
        self.slots
            .iter()
            .rev()
            .find(|slot| matches!(slot.kind, SlotKind::Target))
            .map(|slot| slot.tf)
            .unwrap_or(Nanos::ZERO)
    }

    /// The most recent pulse slot, optionally skipping detuned delays.
    pub fn last_pulse_slot(&self, ignore_detuned_delay: bool) -> Option<(&TimeSlot, &Pulse)> {
        self.slots
            .iter()
            .rev()
            .filter(|slot| !(ignore_detuned_delay && slot.is_detuned_delay()))
            .find_map(|slot| slot.pulse().map(|pulse| (slot, pulse)))
    }

    pub fn in_eom_mode(&self) -> bool {
        self.eom_blocks.last().is_some_and(|block| block.tf.is_none())
    }

    /// The settings of the currently open EOM block.
    pub fn eom_settings(&self) -> Option<&EomBlock> {
        self.eom_blocks.last().filter(|block| block.tf.is_none())
    }

    /// Whether the given slot falls within an EOM block.
    pub fn slot_in_eom_mode(&self, slot: &TimeSlot) -> bool {
        self.eom_blocks.iter().any(|block| {
            block.ti <= slot.ti && block.tf.map(|tf| slot.tf <= tf).unwrap_or(true)
        })
    }

    /// All EOM intervals, closing the open block at the current duration.
    pub fn eom_intervals(&self) -> Vec<(Nanos, Nanos)> {
        self.eom_blocks
            .iter()
            .map(|block| (block.ti, block.tf.unwrap_or(self.duration())))
            .collect()
    }

    fn push(&mut self, kind: SlotKind, duration: Nanos) {
        let ti = self.duration();
        let targets = self.current_targets();
        self.slots
            .push(TimeSlot::new(kind, ti, ti + duration, targets));
    }
}

/// The timelines of all declared channels plus cross-channel bookkeeping.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Schedule {
    channels: IndexMap<String, ChannelSchedule>,
    /// Last time each qubit was acted on, per basis, including fall time.
    last_used: IndexMap<Basis, IndexMap<QubitId, Nanos>>,
}

impl Schedule {
    pub fn new() -> Self {
        Schedule::default()
    }

    pub fn declare(
        &mut self,
        name: impl Into<String>,
        channel_id: impl Into<String>,
        channel: Channel,
        initial_targets: IndexSet<QubitId>,
    ) {
        let name = name.into();
        let mut cs = ChannelSchedule::new(name.clone(), channel_id, channel);
        if !initial_targets.is_empty() {
            cs.slots.push(TimeSlot::new(
                SlotKind::Target,
                Nanos::ZERO,
                Nanos::ZERO,
                initial_targets,
            ));
        }
        self.channels.insert(name, cs);
    }

    pub fn channel(&self, name: &str) -> Result<&ChannelSchedule> {
        self.channels
            .get(name)
            .ok_or_else(|| Error::Argument("Use the name of a declared channel.".into()))
    }

    fn channel_mut(&mut self, name: &str) -> Result<&mut ChannelSchedule> {
        self.channels
            .get_mut(name)
            .ok_or_else(|| Error::Argument("Use the name of a declared channel.".into()))
    }

    pub fn channels(&self) -> impl Iterator<Item = &ChannelSchedule> {
        self.channels.values()
    }

    pub fn channel_names(&self) -> impl Iterator<Item = &String> {
        self.channels.keys()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.channels.contains_key(name)
    }

    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }

    /// The overall sequence duration.
    pub fn duration(&self) -> Nanos {
        self.channels
            .values()
            .map(|cs| cs.duration())
            .max()
            .unwrap_or(Nanos::ZERO)
    }

    pub fn last_used(&self, basis: Basis, qubit: &str) -> Nanos {
        self.last_used
            .get(&basis)
            .and_then(|qubits| qubits.get(qubit))
            .copied()
            .unwrap_or(Nanos::ZERO)
    }

    pub fn mark_used(&mut self, basis: Basis, qubit: &str, time: Nanos) {
        let entry = self
            .last_used
            .entry(basis)
            .or_default()
            .entry(qubit.to_string())
            .or_insert(Nanos::ZERO);
        *entry = (*entry).max(time);
    }

    /// Point the channel at a new set of targets.
    ///
    /// Retargeting to the very same targets is a no-op. Otherwise a target
    /// slot is appended whose duration accounts for the channel's minimum
    /// retarget interval and fixed retarget time; if the previous slot was
    /// a pulse whose output is still falling, an explicit delay covers the
    /// fall first so that slots stay contiguous.
    pub fn add_target(&mut self, name: &str, targets: IndexSet<QubitId>) -> Result<()> {
        let cs = self.channel_mut(name)?;
        let Some(last) = cs.slots.last() else {
            cs.slots.push(TimeSlot::new(
                SlotKind::Target,
                Nanos::ZERO,
                Nanos::ZERO,
                targets,
            ));
            return Ok(());
        };
        if last.targets == targets {
            return Ok(());
        }
        if let Some((slot, pulse)) = cs.last_pulse_slot(false) {
            if slot.tf == cs.duration() {
                let fall = pulse.fall_time(&cs.channel, cs.slot_in_eom_mode(slot));
                if fall > Nanos::ZERO {
                    let duration = cs.adjust_duration(fall);
                    cs.push(SlotKind::Delay, duration);
                }
            }
        }
        let ti = cs.duration();
        let elapsed = ti - cs.last_target_time();
        let mut delta = (cs.channel.min_retarget_interval - elapsed)
            .clamp_buffer(cs.channel.min_retarget_interval);
        delta = delta.max(cs.channel.fixed_retarget_t);
        if !delta.is_zero() {
            delta = cs.adjust_duration(delta);
        }
        cs.slots
            .push(TimeSlot::new(SlotKind::Target, ti, ti + delta, targets));
        Ok(())
    }

    /// Append idle time to the channel.
    ///
    /// While in EOM mode the idle time is materialized as a "detuned delay":
    /// a zero-amplitude pulse holding the block's off detuning.
    pub fn add_delay(&mut self, name: &str, duration: Nanos) -> Result<()> {
        let cs = self.channel_mut(name)?;
        let duration = cs.adjust_duration(duration);
        if let Some(block) = cs.eom_settings() {
            let detuning_off = block.detuning_off;
            let phase = cs
                .last_pulse_slot(true)
                .map(|(_, pulse)| pulse.phase)
                .unwrap_or(0.0);
            let pulse = Pulse::constant(duration, 0.0, detuning_off, phase)?;
            cs.push(SlotKind::Pulse(pulse), duration);
        } else {
            cs.push(SlotKind::Delay, duration);
        }
        Ok(())
    }

    /// Schedule a pulse, inserting whatever delay the protocol, the phase
    /// barriers and the channel's phase jump time require.
    ///
    /// Returns the interval the pulse occupies.
    pub fn add_pulse(
        &mut self,
        name: &str,
        pulse: Pulse,
        phase_barrier_ts: &[Nanos],
        protocol: Protocol,
    ) -> Result<(Nanos, Nanos)> {
        let cs = self.channel(name)?;
        let t0 = cs.duration();
        let mut current_max_t = t0;
        if protocol != Protocol::NoDelay {
            for &t in phase_barrier_ts {
                current_max_t = current_max_t.max(t);
            }
            if !cs.in_eom_mode() {
                let targets = cs.current_targets();
                for other in self.channels.values() {
                    if other.name == name {
                        continue;
                    }
                    for slot in other.slots.iter().rev() {
                        if slot.tf <= current_max_t {
                            break;
                        }
                        let Some(other_pulse) = slot.pulse() else {
                            continue;
                        };
                        if protocol == Protocol::WaitForAll
                            || !slot.targets.is_disjoint(&targets)
                        {
                            let fall = other_pulse
                                .fall_time(&other.channel, other.slot_in_eom_mode(slot));
                            current_max_t = current_max_t.max(slot.tf + fall);
                            break;
                        }
                    }
                }
            }
        }

        let cs = self.channel(name)?;
        let mut phase_jump_buffer = Nanos::ZERO;
        if protocol != Protocol::NoDelay {
            if let Some((last_slot, last_pulse)) = cs.last_pulse_slot(true) {
                if last_pulse.phase != pulse.phase {
                    let fall = last_pulse.fall_time(&cs.channel, cs.slot_in_eom_mode(last_slot));
                    phase_jump_buffer = cs.channel.phase_jump_time + fall - (t0 - last_slot.tf);
                }
            }
        }

        let wait = (current_max_t - t0).max(phase_jump_buffer);
        if wait > Nanos::ZERO {
            let wait = self.channel(name)?.adjust_duration(wait);
            self.add_delay(name, wait)?;
        }

        let cs = self.channel_mut(name)?;
        let ti = cs.duration();
        let tf = ti + pulse.duration();
        let targets = cs.current_targets();
        cs.slots
            .push(TimeSlot::new(SlotKind::Pulse(pulse), ti, tf, targets));
        Ok((ti, tf))
    }

    /// Open an EOM block on the channel.
    ///
    /// If the channel already has output, this first waits for the last
    /// pulse to fall and then inserts a buffer of twice the EOM rise time,
    /// held at the block's off detuning when it is not zero.
    pub fn enable_eom(
        &mut self,
        name: &str,
        amp_on: f64,
        detuning_on: f64,
        detuning_off: f64,
    ) -> Result<()> {
        let cs = self.channel(name)?;
        let rise_time = cs
            .channel
            .eom_config
            .as_ref()
            .map(|cfg| cfg.rise_time())
            .unwrap_or(Nanos::ZERO);
        if cs.duration() > Nanos::ZERO {
            self.wait_for_fall(name)?;
            let cs = self.channel_mut(name)?;
            let buffer = cs.adjust_duration(rise_time * 2);
            if detuning_off != 0.0 {
                let phase = cs
                    .last_pulse_slot(true)
                    .map(|(_, pulse)| pulse.phase)
                    .unwrap_or(0.0);
                let pulse = Pulse::constant(buffer, 0.0, detuning_off, phase)?;
                cs.push(SlotKind::Pulse(pulse), buffer);
            } else {
                cs.push(SlotKind::Delay, buffer);
            }
        }
        let cs = self.channel_mut(name)?;
        let ti = cs.duration();
        cs.eom_blocks.push(EomBlock {
            ti,
            tf: None,
            amp_on,
            detuning_on,
            detuning_off,
        });
        Ok(())
    }

    /// Close the channel's open EOM block and let the output fall.
    pub fn disable_eom(&mut self, name: &str) -> Result<()> {
        let cs = self.channel_mut(name)?;
        let tf = cs.duration();
        if let Some(block) = cs.eom_blocks.last_mut() {
            if block.tf.is_none() {
                block.tf = Some(tf);
            }
        }
        self.wait_for_fall(name)
    }

    /// Delay until the last pulse's output has died down.
    pub fn wait_for_fall(&mut self, name: &str) -> Result<()> {
        let cs = self.channel(name)?;
        let Some((slot, pulse)) = cs.last_pulse_slot(false) else {
            return Ok(());
        };
        let fall = pulse.fall_time(&cs.channel, cs.in_eom_mode());
        let diff = slot.tf + fall - cs.duration();
        if diff > Nanos::ZERO {
            let delay = cs.adjust_duration(diff);
            self.add_delay(name, delay)?;
        }
        Ok(())
    }
}
