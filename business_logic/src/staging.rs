//! Per-kind reconciliation of the running count against the target count.
//!
//! Each call to [`StagingControl::reconcile`] commits at most one start or
//! stop. Manual overrides go first, then automatic staging picks a unit with
//! the configured policy or from a ranked candidate list.

use core::cmp::Reverse;

use crate::capacity::Tier;
use crate::config::{ConfigError, STALL_CYCLE_LIMIT, StagingTiming};
use crate::fmt::{error, info, warn};
use crate::ports::{ActuationPort, EventSink, PlantEvent};
use crate::timestamp::Timestamp;
use crate::unit::{CondenserBank, SlotId, Unit, UnitKind, UnitMode, UnitState};

/// A slot the staging controller can drive.
pub trait Stageable: AsRef<Unit> + AsMut<Unit> {
    /// Extra start gate on top of the unit's own eligibility.
    fn start_permitted(&self) -> bool {
        true
    }
}

impl Stageable for Unit {}

impl Stageable for CondenserBank {
    fn start_permitted(&self) -> bool {
        self.maintenance.state.allows_start()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum StagingAlgorithm {
    /// Rotating cursor over the slots.
    #[default]
    Sequential = 0,
    /// Least-run unit starts first, most-run unit stops first.
    RuntimeBalanced = 1,
}

impl TryFrom<u8> for StagingAlgorithm {
    type Error = ConfigError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(StagingAlgorithm::Sequential),
            1 => Ok(StagingAlgorithm::RuntimeBalanced),
            _ => Err(ConfigError::UnknownAlgorithm),
        }
    }
}

/// Aggregate state of one kind of equipment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum KindState {
    #[default]
    Off,
    Starting,
    Running,
    Stopping,
    /// Emergency stop or stop-all latched until re-armed.
    Fault,
    /// No unit of this kind is available.
    Disabled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum StagingAction {
    Start(SlotId),
    Stop(SlotId),
}

impl StagingAction {
    pub fn slot(&self) -> SlotId {
        match self {
            StagingAction::Start(slot) | StagingAction::Stop(slot) => *slot,
        }
    }

    fn powers_on(&self) -> bool {
        matches!(self, StagingAction::Start(_))
    }
}

/// What one reconciliation pass did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum StagingOutcome {
    /// Running count matches the target.
    #[default]
    Converged,
    Acted(StagingAction),
    /// A unit will become eligible once a delay or minimum run time passes.
    Waiting,
    /// Count mismatch with nothing eligible to act on.
    EligibilityExhausted,
    /// Auto staging is off or the kind is latched.
    Suspended,
    /// The port rejected the command; the unit stays a candidate.
    ActuationFailed(StagingAction),
}

/// Candidate source for automatic staging.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Candidates<'a> {
    /// Pick with the controller's own algorithm.
    Policy,
    /// Pre-ranked slots, best first.
    Ranked { start: &'a [SlotId], stop: &'a [SlotId] },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct StagingControl {
    kind: UnitKind,
    algorithm: StagingAlgorithm,
    timing: StagingTiming,
    target_count: usize,
    target_tier: Tier,
    current_tier: Tier,
    auto_staging_enabled: bool,
    runtime_balancing_enabled: bool,
    latched: bool,
    state: KindState,
    last_outcome: StagingOutcome,
    last_kind_start: Option<Timestamp>,
    last_kind_stop: Option<Timestamp>,
    start_cursor: usize,
    stop_cursor: usize,
    stalled_cycles: u32,
}

impl StagingControl {
    pub fn new(kind: UnitKind) -> Self {
        Self {
            kind,
            algorithm: StagingAlgorithm::default(),
            timing: StagingTiming::defaults_for(kind),
            target_count: 0,
            target_tier: Tier::One,
            current_tier: Tier::One,
            auto_staging_enabled: true,
            runtime_balancing_enabled: true,
            latched: false,
            state: KindState::Off,
            last_outcome: StagingOutcome::Converged,
            last_kind_start: None,
            last_kind_stop: None,
            start_cursor: 0,
            stop_cursor: 0,
            stalled_cycles: 0,
        }
    }

    pub fn kind(&self) -> UnitKind {
        self.kind
    }

    pub fn algorithm(&self) -> StagingAlgorithm {
        self.algorithm
    }

    pub fn timing(&self) -> StagingTiming {
        self.timing
    }

    pub fn target_count(&self) -> usize {
        self.target_count
    }

    pub fn current_tier(&self) -> Tier {
        self.current_tier
    }

    pub fn auto_staging_enabled(&self) -> bool {
        self.auto_staging_enabled
    }

    pub fn runtime_balancing_enabled(&self) -> bool {
        self.runtime_balancing_enabled
    }

    pub fn is_latched(&self) -> bool {
        self.latched
    }

    pub fn state(&self) -> KindState {
        self.state
    }

    pub fn last_outcome(&self) -> StagingOutcome {
        self.last_outcome
    }

    pub fn stalled_cycles(&self) -> u32 {
        self.stalled_cycles
    }

    pub fn set_algorithm(&mut self, algorithm: StagingAlgorithm) {
        self.algorithm = algorithm;
    }

    pub fn set_timing(&mut self, timing: StagingTiming) -> Result<(), ConfigError> {
        timing.validate()?;
        self.timing = timing;
        Ok(())
    }

    pub fn set_auto_staging(&mut self, enabled: bool) {
        self.auto_staging_enabled = enabled;
    }

    pub fn set_runtime_balancing(&mut self, enabled: bool) {
        self.runtime_balancing_enabled = enabled;
    }

    /// Sets this cycle's target. Ignored while latched.
    pub fn set_target(&mut self, count: usize, tier: Tier) {
        if !self.latched {
            self.target_count = count;
            self.target_tier = tier;
        }
    }

    /// Clears the latch so automatic staging resumes next cycle.
    pub fn rearm(&mut self) {
        if self.latched {
            info!("{:?} staging re-armed", self.kind);
        }
        self.latched = false;
        self.stalled_cycles = 0;
    }

    /// Powers down every running unit immediately, ignoring minimum run time
    /// and inter-stop spacing, and latches the kind until [`Self::rearm`].
    pub fn force_stop_all<U, P, E>(&mut self, units: &mut [U], now: Timestamp, port: &mut P, events: &mut E)
    where
        U: Stageable,
        P: ActuationPort + ?Sized,
        E: EventSink + ?Sized,
    {
        for unit in units.iter_mut().map(AsMut::as_mut) {
            if unit.is_running() || unit.state == UnitState::Stopping {
                self.power_off_now(unit, now, port, events);
            }
        }
        error!("{:?} stop-all: every unit forced off", self.kind);
        self.latched = true;
        self.target_count = 0;
        self.target_tier = Tier::One;
        self.stalled_cycles = 0;
        self.last_outcome = StagingOutcome::Suspended;
        self.refresh(units);
    }

    /// Powers down units that are still running but no longer available,
    /// ignoring minimum run time. Shedding is the kind's action for the
    /// cycle, so the caller skips [`Self::reconcile`] when this returns
    /// non-zero. Returns the number shed.
    pub fn shed_unavailable<U, P, E>(&mut self, units: &mut [U], now: Timestamp, port: &mut P, events: &mut E) -> usize
    where
        U: Stageable,
        P: ActuationPort + ?Sized,
        E: EventSink + ?Sized,
    {
        let mut shed = 0;
        let mut last_slot = None;
        for unit in units.iter_mut().map(AsMut::as_mut) {
            if unit.is_running() && !unit.available {
                warn!("{:?} {} lost availability while running", self.kind, unit.id());
                self.power_off_now(unit, now, port, events);
                last_slot = Some(unit.id());
                shed += 1;
            }
        }
        if let Some(slot) = last_slot {
            self.stalled_cycles = 0;
            self.last_outcome = StagingOutcome::Acted(StagingAction::Stop(slot));
            self.refresh(units);
        }
        shed
    }

    /// One reconciliation pass. Commits at most one start or stop.
    pub fn reconcile<U, P, E>(
        &mut self,
        units: &mut [U],
        candidates: Candidates<'_>,
        now: Timestamp,
        port: &mut P,
        events: &mut E,
    ) -> StagingOutcome
    where
        U: Stageable,
        P: ActuationPort + ?Sized,
        E: EventSink + ?Sized,
    {
        let outcome = if self.latched {
            StagingOutcome::Suspended
        } else if let Some(outcome) = self.apply_overrides(units, now, port, events) {
            outcome
        } else if !self.auto_staging_enabled {
            StagingOutcome::Suspended
        } else {
            self.auto_stage(units, candidates, now, port, events)
        };

        match outcome {
            StagingOutcome::EligibilityExhausted => {
                self.stalled_cycles = self.stalled_cycles.saturating_add(1);
                if self.stalled_cycles == STALL_CYCLE_LIMIT {
                    warn!("{:?} target {} unreachable for {} cycles", self.kind, self.target_count, self.stalled_cycles);
                    events.emit(PlantEvent::ConvergenceStalled { kind: self.kind, cycles: self.stalled_cycles });
                }
            }
            StagingOutcome::Waiting | StagingOutcome::ActuationFailed(_) => {}
            _ => self.stalled_cycles = 0,
        }
        self.last_outcome = outcome;
        self.refresh(units);
        outcome
    }

    /// ManualOn starts and ManualOff/Disabled/Fault stops, lowest slot first.
    /// An override blocked by timing leaves the cycle to automatic staging.
    fn apply_overrides<U, P, E>(&mut self, units: &mut [U], now: Timestamp, port: &mut P, events: &mut E) -> Option<StagingOutcome>
    where
        U: Stageable,
        P: ActuationPort + ?Sized,
        E: EventSink + ?Sized,
    {
        let start_open = now.has_elapsed(self.last_kind_start, self.timing.inter_start_delay);
        let stop_open = now.has_elapsed(self.last_kind_stop, self.timing.inter_stop_delay);

        let slot = units.iter().map(AsRef::as_ref).find_map(|unit| {
            if start_open
                && unit.mode == UnitMode::ManualOn
                && unit.state == UnitState::Off
                && unit.available
                && !unit.motor_fault
            {
                Some(StagingAction::Start(unit.id()))
            } else if stop_open
                && unit.mode.holds_off()
                && unit.is_running()
                && unit.has_met_minimum_run(now, self.timing.minimum_run_time)
            {
                Some(StagingAction::Stop(unit.id()))
            } else {
                None
            }
        })?;
        Some(self.commit(units, slot, now, port, events))
    }

    fn auto_stage<U, P, E>(
        &mut self,
        units: &mut [U],
        candidates: Candidates<'_>,
        now: Timestamp,
        port: &mut P,
        events: &mut E,
    ) -> StagingOutcome
    where
        U: Stageable,
        P: ActuationPort + ?Sized,
        E: EventSink + ?Sized,
    {
        let running = units.iter().filter(|unit| unit.as_ref().is_running()).count();
        if running < self.target_count {
            let Some(slot) = self.start_candidate(units, candidates) else {
                return StagingOutcome::EligibilityExhausted;
            };
            if !now.has_elapsed(self.last_kind_start, self.timing.inter_start_delay) {
                return StagingOutcome::Waiting;
            }
            self.commit(units, StagingAction::Start(slot), now, port, events)
        } else if running > self.target_count {
            let Some(slot) = self.stop_candidate(units, candidates, now) else {
                let stoppable = units.iter().map(AsRef::as_ref).any(|unit| unit.is_running() && unit.mode == UnitMode::Auto);
                return if stoppable { StagingOutcome::Waiting } else { StagingOutcome::EligibilityExhausted };
            };
            if !now.has_elapsed(self.last_kind_stop, self.timing.inter_stop_delay) {
                return StagingOutcome::Waiting;
            }
            self.commit(units, StagingAction::Stop(slot), now, port, events)
        } else {
            StagingOutcome::Converged
        }
    }

    fn start_candidate<U: Stageable>(&self, units: &[U], candidates: Candidates<'_>) -> Option<SlotId> {
        let eligible = |unit: &U| unit.as_ref().can_auto_start() && unit.start_permitted();
        match candidates {
            Candidates::Ranked { start, .. } => start
                .iter()
                .copied()
                .find(|slot| units.get(usize::from(*slot)).is_some_and(|unit| eligible(unit))),
            Candidates::Policy => match self.algorithm {
                StagingAlgorithm::Sequential => scan_from(units, self.start_cursor, eligible),
                StagingAlgorithm::RuntimeBalanced => units
                    .iter()
                    .filter(|unit| eligible(*unit))
                    .map(AsRef::as_ref)
                    .min_by_key(|unit| (unit.stats.accumulated_runtime, unit.id()))
                    .map(Unit::id),
            },
        }
    }

    fn stop_candidate<U: Stageable>(&self, units: &[U], candidates: Candidates<'_>, now: Timestamp) -> Option<SlotId> {
        let minimum_run_time = self.timing.minimum_run_time;
        let eligible = |unit: &U| {
            let unit = unit.as_ref();
            unit.can_auto_stop(now, minimum_run_time) && !unit.motor_fault
        };
        match candidates {
            Candidates::Ranked { stop, .. } => stop
                .iter()
                .copied()
                .find(|slot| units.get(usize::from(*slot)).is_some_and(|unit| eligible(unit))),
            Candidates::Policy => match self.algorithm {
                StagingAlgorithm::Sequential => scan_from(units, self.stop_cursor, eligible),
                StagingAlgorithm::RuntimeBalanced => units
                    .iter()
                    .filter(|unit| eligible(*unit))
                    .map(AsRef::as_ref)
                    .max_by_key(|unit| (unit.stats.accumulated_runtime, Reverse(unit.id())))
                    .map(Unit::id),
            },
        }
    }

    fn commit<U, P, E>(&mut self, units: &mut [U], action: StagingAction, now: Timestamp, port: &mut P, events: &mut E) -> StagingOutcome
    where
        U: Stageable,
        P: ActuationPort + ?Sized,
        E: EventSink + ?Sized,
    {
        let slot = action.slot();
        let count = units.len();
        let Some(unit) = units.get_mut(usize::from(slot)).map(AsMut::as_mut) else {
            return StagingOutcome::EligibilityExhausted;
        };
        if let Err(err) = port.set_unit_power(self.kind, slot, action.powers_on()) {
            warn!("{:?} {} actuation failed: {:?}", self.kind, slot, err);
            events.emit(PlantEvent::ActuationFailed { kind: self.kind, slot });
            return StagingOutcome::ActuationFailed(action);
        }

        let next = (usize::from(slot) + 1) % count;
        match action {
            StagingAction::Start(_) => {
                unit.mark_started(now);
                self.last_kind_start = Some(now);
                self.start_cursor = next;
                info!("{:?} {} started", self.kind, slot);
            }
            StagingAction::Stop(_) => {
                unit.mark_stopped(now);
                self.last_kind_stop = Some(now);
                self.stop_cursor = next;
                info!("{:?} {} stopped", self.kind, slot);
            }
        }
        StagingOutcome::Acted(action)
    }

    /// Unconditional power-off. The unit is parked even when the port
    /// fails, so the model never reports it as running.
    fn power_off_now<P, E>(&mut self, unit: &mut Unit, now: Timestamp, port: &mut P, events: &mut E)
    where
        P: ActuationPort + ?Sized,
        E: EventSink + ?Sized,
    {
        if let Err(err) = port.set_unit_power(self.kind, unit.id(), false) {
            warn!("{:?} {} forced stop not confirmed: {:?}", self.kind, unit.id(), err);
            events.emit(PlantEvent::ActuationFailed { kind: self.kind, slot: unit.id() });
        }
        unit.force_off(now);
        self.last_kind_stop = Some(now);
    }

    fn refresh<U: AsRef<Unit>>(&mut self, units: &[U]) {
        let units = || units.iter().map(AsRef::as_ref);
        let running = units().filter(|unit| unit.is_running()).count();
        self.current_tier = self.target_tier.max(Tier::covering(self.kind, running));
        self.state = if self.latched {
            KindState::Fault
        } else if !units().any(|unit| unit.available) {
            KindState::Disabled
        } else {
            match self.last_outcome {
                StagingOutcome::Acted(StagingAction::Start(_)) => KindState::Starting,
                StagingOutcome::Acted(StagingAction::Stop(_)) => KindState::Stopping,
                _ if running > 0 => KindState::Running,
                _ => KindState::Off,
            }
        };
    }
}

/// First eligible slot at or after `cursor`, wrapping once.
fn scan_from<U>(units: &[U], cursor: usize, eligible: impl Fn(&U) -> bool) -> Option<SlotId>
where
    U: AsRef<Unit>,
{
    let count = units.len();
    (0..count)
        .map(|offset| (cursor + offset) % count)
        .filter_map(|index| units.get(index))
        .find(|unit| eligible(*unit))
        .map(|unit| unit.as_ref().id())
}
