//! One physical cooling element and the per-slot statistics that follow it
//! for the life of the process.

use crate::maintenance::MaintenanceRecord;
use crate::selection::SelectionWeights;
use crate::timestamp::{Millis, Timestamp};

/// Hardware slot index within one kind's pool.
pub type SlotId = u8;

/// Efficiency assumed for a condenser bank until measurements arrive.
pub const NOMINAL_EFFICIENCY: f32 = 1.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum UnitKind {
    Compressor,
    CondenserBank,
}

/// Operating state, driven by the engine.
///
/// `Starting` and `Stopping` last exactly one control cycle: a commanded unit
/// settles into `Running` (or its parked state) on the next tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum UnitState {
    #[default]
    Off,
    Starting,
    Running,
    Stopping,
    Fault,
    Disabled,
}

/// Operator control, orthogonal to `UnitState`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum UnitMode {
    #[default]
    Auto,
    ManualOn,
    ManualOff,
    Disabled,
    Fault,
}

impl UnitMode {
    /// Modes that hold a unit off regardless of demand.
    pub fn holds_off(&self) -> bool {
        matches!(self, UnitMode::ManualOff | UnitMode::Disabled | UnitMode::Fault)
    }
}

/// Lifetime counters. Loaded from and saved to the external store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct UnitStatistics {
    pub accumulated_runtime: Millis,
    pub start_cycles: u32,
    pub fault_count: u32,
}

#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Unit {
    id: SlotId,
    kind: UnitKind,
    pub(crate) state: UnitState,
    pub(crate) mode: UnitMode,
    pub(crate) available: bool,
    pub(crate) enabled: bool,
    pub(crate) motor_fault: bool,
    pub(crate) last_start: Option<Timestamp>,
    pub(crate) last_stop: Option<Timestamp>,
    pub(crate) stats: UnitStatistics,
}

impl Unit {
    pub fn new(kind: UnitKind, id: SlotId) -> Self {
        Self {
            id,
            kind,
            state: UnitState::Off,
            mode: UnitMode::Auto,
            available: false,
            enabled: false,
            motor_fault: false,
            last_start: None,
            last_stop: None,
            stats: UnitStatistics::default(),
        }
    }

    pub fn id(&self) -> SlotId {
        self.id
    }

    pub fn kind(&self) -> UnitKind {
        self.kind
    }

    pub fn state(&self) -> UnitState {
        self.state
    }

    pub fn mode(&self) -> UnitMode {
        self.mode
    }

    pub fn is_available(&self) -> bool {
        self.available
    }

    pub fn has_motor_fault(&self) -> bool {
        self.motor_fault
    }

    pub fn last_start(&self) -> Option<Timestamp> {
        self.last_start
    }

    pub fn last_stop(&self) -> Option<Timestamp> {
        self.last_stop
    }

    pub fn statistics(&self) -> UnitStatistics {
        self.stats
    }

    /// Powered, including the cycle in which the start was commanded.
    pub fn is_running(&self) -> bool {
        matches!(self.state, UnitState::Starting | UnitState::Running)
    }

    /// Counts toward the capacity the plant can dispatch: available, healthy
    /// and not held off by the operator.
    pub fn is_dispatchable(&self) -> bool {
        self.available && !self.motor_fault && !self.mode.holds_off()
    }

    /// Content eligibility for an automatic start. Inter-start spacing is a
    /// per-kind condition checked by the staging controller.
    pub fn can_auto_start(&self) -> bool {
        self.available && self.state == UnitState::Off && self.mode == UnitMode::Auto && !self.motor_fault
    }

    /// Running long enough to be stopped without short-cycling.
    pub fn has_met_minimum_run(&self, now: Timestamp, minimum_run_time: Millis) -> bool {
        now.has_elapsed(self.last_start, minimum_run_time)
    }

    pub fn can_auto_stop(&self, now: Timestamp, minimum_run_time: Millis) -> bool {
        self.is_running() && self.mode == UnitMode::Auto && self.has_met_minimum_run(now, minimum_run_time)
    }

    pub(crate) fn mark_started(&mut self, now: Timestamp) {
        self.state = UnitState::Starting;
        self.last_start = Some(now);
        self.stats.start_cycles = self.stats.start_cycles.saturating_add(1);
    }

    pub(crate) fn mark_stopped(&mut self, now: Timestamp) {
        self.state = UnitState::Stopping;
        self.last_stop = Some(now);
    }

    /// Immediate transition to off, skipping `Stopping`.
    pub(crate) fn force_off(&mut self, now: Timestamp) {
        self.state = self.parked_state();
        self.last_stop = Some(now);
    }

    /// Completes the one-cycle `Starting`/`Stopping` transitions.
    pub(crate) fn settle(&mut self) {
        match self.state {
            UnitState::Starting => self.state = UnitState::Running,
            UnitState::Stopping => self.state = self.parked_state(),
            _ => {}
        }
    }

    pub(crate) fn accrue_runtime(&mut self, elapsed: Millis) {
        if self.is_running() {
            self.stats.accumulated_runtime = self.stats.accumulated_runtime.saturating_add(elapsed);
        }
    }

    pub(crate) fn record_fault(&mut self, now: Timestamp) {
        if self.is_running() {
            self.last_stop = Some(now);
        }
        self.state = UnitState::Fault;
        self.motor_fault = true;
        self.stats.fault_count = self.stats.fault_count.saturating_add(1);
    }

    pub(crate) fn clear_fault(&mut self) {
        self.motor_fault = false;
        if self.state == UnitState::Fault {
            self.state = self.parked_state();
        }
    }

    /// Applies configuration flags. Returns true when the unit is powered but
    /// no longer enabled and has to be shed.
    pub(crate) fn apply_enabled(&mut self, enabled: bool) -> bool {
        self.enabled = enabled;
        self.available = enabled;
        match self.state {
            UnitState::Off if !enabled => self.state = UnitState::Disabled,
            UnitState::Disabled if enabled && self.mode != UnitMode::Disabled => self.state = UnitState::Off,
            _ => {}
        }
        !enabled && self.is_running()
    }

    pub(crate) fn set_mode(&mut self, mode: UnitMode) {
        self.mode = mode;
        if !self.is_running() && self.state != UnitState::Stopping {
            self.state = self.parked_state();
        }
    }

    /// The resting state for a unit that is not powered.
    fn parked_state(&self) -> UnitState {
        if self.motor_fault || self.mode == UnitMode::Fault {
            UnitState::Fault
        } else if !self.enabled || self.mode == UnitMode::Disabled {
            UnitState::Disabled
        } else {
            UnitState::Off
        }
    }
}

impl AsRef<Unit> for Unit {
    fn as_ref(&self) -> &Unit {
        self
    }
}

impl AsMut<Unit> for Unit {
    fn as_mut(&mut self) -> &mut Unit {
        self
    }
}

/// A condenser fan bank: a `Unit` plus the data the selection engine scores.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CondenserBank {
    pub(crate) unit: Unit,
    pub(crate) efficiency_rating: f32,
    pub(crate) performance_valid: bool,
    pub(crate) priority_score: f32,
    pub(crate) maintenance: MaintenanceRecord,
    pub(crate) ambient_compensation: f32,
    pub(crate) seasonal_factor: f32,
    pub(crate) weights: SelectionWeights,
}

impl CondenserBank {
    pub fn new(id: SlotId, now: Timestamp, service_interval: Millis) -> Self {
        Self {
            unit: Unit::new(UnitKind::CondenserBank, id),
            efficiency_rating: NOMINAL_EFFICIENCY,
            performance_valid: false,
            priority_score: 0.0,
            maintenance: MaintenanceRecord::new(now, service_interval),
            ambient_compensation: 1.0,
            seasonal_factor: 1.0,
            weights: SelectionWeights::default(),
        }
    }

    pub fn unit(&self) -> &Unit {
        &self.unit
    }

    pub fn efficiency_rating(&self) -> f32 {
        self.efficiency_rating
    }

    pub fn performance_valid(&self) -> bool {
        self.performance_valid
    }

    pub fn priority_score(&self) -> f32 {
        self.priority_score
    }

    pub fn maintenance(&self) -> &MaintenanceRecord {
        &self.maintenance
    }

    pub fn ambient_compensation(&self) -> f32 {
        self.ambient_compensation
    }

    pub fn seasonal_factor(&self) -> f32 {
        self.seasonal_factor
    }

    pub fn weights(&self) -> SelectionWeights {
        self.weights
    }
}

impl AsRef<Unit> for CondenserBank {
    fn as_ref(&self) -> &Unit {
        &self.unit
    }
}

impl AsMut<Unit> for CondenserBank {
    fn as_mut(&mut self) -> &mut Unit {
        &mut self.unit
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn enabled_unit() -> Unit {
        let mut unit = Unit::new(UnitKind::Compressor, 3);
        unit.apply_enabled(true);
        unit
    }

    #[test]
    fn test_start_settles_into_running() {
        let mut unit = enabled_unit();
        assert!(unit.can_auto_start());
        unit.mark_started(Timestamp::from_secs(10));
        assert_eq!(unit.state(), UnitState::Starting);
        assert!(unit.is_running());
        assert_eq!(unit.statistics().start_cycles, 1);
        unit.settle();
        assert_eq!(unit.state(), UnitState::Running);
    }

    #[test]
    fn test_minimum_run_time_gates_auto_stop() {
        let mut unit = enabled_unit();
        unit.mark_started(Timestamp::from_secs(100));
        unit.settle();
        assert!(!unit.can_auto_stop(Timestamp::from_secs(279), 180_000));
        assert!(unit.can_auto_stop(Timestamp::from_secs(280), 180_000));
    }

    #[test]
    fn test_runtime_accrues_only_while_powered() {
        let mut unit = enabled_unit();
        unit.accrue_runtime(500);
        assert_eq!(unit.statistics().accumulated_runtime, 0);
        unit.mark_started(Timestamp::from_secs(1));
        unit.accrue_runtime(500);
        unit.settle();
        unit.accrue_runtime(250);
        assert_eq!(unit.statistics().accumulated_runtime, 750);
    }

    #[test]
    fn test_disable_parks_idle_unit_and_flags_running_unit() {
        let mut idle = enabled_unit();
        assert!(!idle.apply_enabled(false));
        assert_eq!(idle.state(), UnitState::Disabled);
        assert!(!idle.can_auto_start());
        assert!(!idle.apply_enabled(true));
        assert_eq!(idle.state(), UnitState::Off);

        let mut running = enabled_unit();
        running.mark_started(Timestamp::from_secs(1));
        assert!(running.apply_enabled(false));
        running.force_off(Timestamp::from_secs(2));
        assert_eq!(running.state(), UnitState::Disabled);
    }

    #[test]
    fn test_fault_then_clear() {
        let mut unit = enabled_unit();
        unit.mark_started(Timestamp::from_secs(1));
        unit.record_fault(Timestamp::from_secs(5));
        assert_eq!(unit.state(), UnitState::Fault);
        assert!(!unit.is_running());
        assert_eq!(unit.last_stop(), Some(Timestamp::from_secs(5)));
        assert_eq!(unit.statistics().fault_count, 1);
        assert!(!unit.can_auto_start());
        unit.clear_fault();
        assert_eq!(unit.state(), UnitState::Off);
        assert!(unit.can_auto_start());
    }

    #[test]
    fn test_manual_modes_park_idle_units() {
        let mut unit = enabled_unit();
        unit.set_mode(UnitMode::Disabled);
        assert_eq!(unit.state(), UnitState::Disabled);
        unit.set_mode(UnitMode::Auto);
        assert_eq!(unit.state(), UnitState::Off);
        unit.set_mode(UnitMode::ManualOn);
        assert_eq!(unit.state(), UnitState::Off);
        assert!(!unit.can_auto_start());
        assert!(UnitMode::ManualOff.holds_off());
        assert!(!UnitMode::ManualOn.holds_off());
    }
}
