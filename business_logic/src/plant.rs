//! The staging engine as one host-owned context: demand and configuration
//! in, relay commands and events out, a status snapshot on request.

use crate::capacity::{CapacityTarget, Tier, clamp_demand, translate};
use crate::config::{ConfigError, EquipmentConfig, MAX_CONDENSERS, StagingTiming};
use crate::fmt::{debug, error, info, warn};
use crate::maintenance::{MaintenanceRecord, MaintenanceScheduler};
use crate::pool::UnitPool;
use crate::ports::{ActuationPort, EventSink, PlantEvent};
use crate::rotation::{RotationManager, RotationState};
use crate::selection::{CondenserSelectionEngine, SelectionAlgorithm, SelectionWeights};
use crate::staging::{Candidates, StagingAlgorithm, StagingControl};
use crate::status::{KindStatus, PlantStatus, UnitStatus};
use crate::timestamp::{Millis, Timestamp, TimestampError};
use crate::unit::{SlotId, UnitKind, UnitMode, UnitStatistics};

/// Smoothing factor for measured condenser efficiency.
pub const EFFICIENCY_SMOOTHING: f32 = 0.2;

const SEASONAL_FACTOR_MIN: f32 = 0.5;
const SEASONAL_FACTOR_MAX: f32 = 1.5;

fn rejected(err: ConfigError) -> ConfigError {
    warn!("configuration rejected: {:?}", err);
    err
}

#[derive(Debug, Clone, PartialEq)]
pub struct ChillerPlant {
    pool: UnitPool,
    equipment: EquipmentConfig,
    compressor_staging: StagingControl,
    condenser_staging: StagingControl,
    compressor_rotation: RotationManager,
    condenser_rotation: RotationManager,
    selection: CondenserSelectionEngine,
    selection_engine_enabled: bool,
    maintenance: MaintenanceScheduler,
    max_tier: Tier,
    demand_percent: f32,
    target: CapacityTarget,
    emergency_stop: bool,
    last_tick: Timestamp,
}

impl ChillerPlant {
    /// A plant with every slot installed and enabled, no demand, and default
    /// tuning. `now` anchors runtime accrual and the first maintenance due dates.
    pub fn new(now: Timestamp) -> Self {
        let maintenance = MaintenanceScheduler::default();
        let equipment = EquipmentConfig::default();
        let mut pool = UnitPool::new(now, maintenance.service_interval());
        pool.apply_config(&equipment);

        Self {
            pool,
            equipment,
            compressor_staging: StagingControl::new(UnitKind::Compressor),
            condenser_staging: StagingControl::new(UnitKind::CondenserBank),
            compressor_rotation: RotationManager::default(),
            condenser_rotation: RotationManager::default(),
            selection: CondenserSelectionEngine::default(),
            selection_engine_enabled: true,
            maintenance,
            max_tier: Tier::Four,
            demand_percent: 0.0,
            target: CapacityTarget::default(),
            emergency_stop: false,
            last_tick: now,
        }
    }

    /// One control cycle. Rejects a timestamp earlier than the previous tick
    /// without touching any state.
    pub fn tick<P, E>(&mut self, now: Timestamp, port: &mut P, events: &mut E) -> Result<(), TimestampError>
    where
        P: ActuationPort + ?Sized,
        E: EventSink + ?Sized,
    {
        let elapsed = self.validate_timestamp_and_update(now)?;
        self.pool.accrue(elapsed);
        self.pool.settle();

        self.target = translate(
            self.demand_percent,
            self.max_tier,
            self.pool.dispatchable_count(UnitKind::Compressor),
            self.pool.dispatchable_count(UnitKind::CondenserBank),
        );
        self.compressor_staging.set_target(self.target.compressors, self.target.tier);
        self.condenser_staging.set_target(self.target.condensers, self.target.tier);

        let compressors_shed = self.compressor_staging.shed_unavailable(self.pool.compressors_mut(), now, port, events);
        let condensers_shed = self.condenser_staging.shed_unavailable(self.pool.condensers_mut(), now, port, events);

        if self.compressor_staging.runtime_balancing_enabled() {
            self.compressor_rotation.update(self.pool.compressors(), now);
        }
        if self.condenser_staging.runtime_balancing_enabled() {
            self.condenser_rotation.update(self.pool.condensers(), now);
        }
        self.selection.observe_rotation(self.condenser_rotation.state());

        self.maintenance.run(self.pool.condensers_mut(), now, events);
        self.selection.update_scores(self.pool.condensers_mut());

        // A shed is the kind's one transition for this cycle.
        if compressors_shed == 0 {
            self.compressor_staging
                .reconcile(self.pool.compressors_mut(), Candidates::Policy, now, port, events);
        }
        if condensers_shed > 0 {
            debug!("{} condenser banks shed, selection deferred", condensers_shed);
        } else if self.selection_engine_enabled {
            let start = self.selection.select_to_start(self.pool.condensers(), MAX_CONDENSERS);
            let stop = self.selection.select_to_stop(self.pool.condensers(), MAX_CONDENSERS);
            let ranked = Candidates::Ranked { start: &start, stop: &stop };
            self.condenser_staging
                .reconcile(self.pool.condensers_mut(), ranked, now, port, events);
        } else {
            self.condenser_staging
                .reconcile(self.pool.condensers_mut(), Candidates::Policy, now, port, events);
        }
        Ok(())
    }

    /// Forces every unit of both kinds off in this call and latches until
    /// [`Self::rearm`].
    pub fn emergency_stop<P, E>(&mut self, now: Timestamp, port: &mut P, events: &mut E)
    where
        P: ActuationPort + ?Sized,
        E: EventSink + ?Sized,
    {
        error!("emergency stop");
        self.compressor_staging.force_stop_all(self.pool.compressors_mut(), now, port, events);
        self.condenser_staging.force_stop_all(self.pool.condensers_mut(), now, port, events);
        self.emergency_stop = true;
        self.target = CapacityTarget::default();
        events.emit(PlantEvent::EmergencyStopActivated);
    }

    /// Forces every unit of one kind off and latches that kind.
    pub fn stop_all<P, E>(&mut self, kind: UnitKind, now: Timestamp, port: &mut P, events: &mut E)
    where
        P: ActuationPort + ?Sized,
        E: EventSink + ?Sized,
    {
        match kind {
            UnitKind::Compressor => {
                self.compressor_staging.force_stop_all(self.pool.compressors_mut(), now, port, events)
            }
            UnitKind::CondenserBank => {
                self.condenser_staging.force_stop_all(self.pool.condensers_mut(), now, port, events)
            }
        }
    }

    /// Clears the emergency-stop and stop-all latches.
    pub fn rearm(&mut self) {
        if self.emergency_stop {
            info!("emergency stop cleared");
        }
        self.emergency_stop = false;
        self.compressor_staging.rearm();
        self.condenser_staging.rearm();
    }

    pub fn set_demand_percent(&mut self, demand_percent: f32) {
        self.demand_percent = clamp_demand(demand_percent);
    }

    /// Applies installed/enabled flags. Running units that lost their flag
    /// are powered off on the next tick.
    pub fn refresh_equipment_config(&mut self, config: EquipmentConfig) {
        if self.pool.apply_config(&config) {
            warn!("running units disabled by configuration");
        }
        self.equipment = config;
    }

    pub fn set_staging_algorithm(&mut self, kind: UnitKind, algorithm: StagingAlgorithm) {
        self.staging_mut(kind).set_algorithm(algorithm);
    }

    pub fn set_staging_algorithm_code(&mut self, kind: UnitKind, code: u8) -> Result<(), ConfigError> {
        let algorithm = StagingAlgorithm::try_from(code).map_err(rejected)?;
        self.set_staging_algorithm(kind, algorithm);
        Ok(())
    }

    pub fn set_max_tier(&mut self, tier: Tier) {
        self.max_tier = tier;
    }

    pub fn set_max_tier_code(&mut self, code: u8) -> Result<(), ConfigError> {
        self.max_tier = Tier::try_from(code).map_err(rejected)?;
        Ok(())
    }

    pub fn set_selection_algorithm(&mut self, algorithm: SelectionAlgorithm) {
        self.selection.set_algorithm(algorithm);
    }

    pub fn set_selection_algorithm_code(&mut self, code: u8) -> Result<(), ConfigError> {
        let algorithm = SelectionAlgorithm::try_from(code).map_err(rejected)?;
        self.selection.set_algorithm(algorithm);
        Ok(())
    }

    /// Chooses between the scoring engine and the plain staging policy for
    /// condenser banks.
    pub fn set_selection_engine_enabled(&mut self, enabled: bool) {
        self.selection_engine_enabled = enabled;
    }

    pub fn set_selection_weights(&mut self, slot: SlotId, weights: SelectionWeights) -> Result<(), ConfigError> {
        weights.validate().map_err(rejected)?;
        self.pool.condenser_mut(slot).map_err(rejected)?.weights = weights;
        Ok(())
    }

    pub fn set_auto_staging(&mut self, kind: UnitKind, enabled: bool) {
        self.staging_mut(kind).set_auto_staging(enabled);
    }

    /// Turning runtime balancing off also drops the kind's lead/lag designation.
    pub fn set_runtime_balancing(&mut self, kind: UnitKind, enabled: bool) {
        self.staging_mut(kind).set_runtime_balancing(enabled);
        if !enabled {
            match kind {
                UnitKind::Compressor => self.compressor_rotation.clear(),
                UnitKind::CondenserBank => self.condenser_rotation.clear(),
            }
        }
    }

    pub fn set_staging_timing(&mut self, kind: UnitKind, timing: StagingTiming) -> Result<(), ConfigError> {
        self.staging_mut(kind).set_timing(timing).map_err(rejected)
    }

    pub fn set_unit_mode(&mut self, kind: UnitKind, slot: SlotId, mode: UnitMode) -> Result<(), ConfigError> {
        self.pool.unit_mut(kind, slot).map_err(rejected)?.set_mode(mode);
        info!("{:?} {} mode {:?}", kind, slot, mode);
        Ok(())
    }

    pub fn set_seasonal_factor(&mut self, slot: SlotId, factor: f32) -> Result<(), ConfigError> {
        if !(SEASONAL_FACTOR_MIN..=SEASONAL_FACTOR_MAX).contains(&factor) {
            return Err(rejected(ConfigError::InvalidFactor));
        }
        self.pool.condenser_mut(slot).map_err(rejected)?.seasonal_factor = factor;
        self.selection.compensate(self.pool.condensers_mut());
        Ok(())
    }

    pub fn set_ambient_temperature(&mut self, celsius: f32) -> Result<(), ConfigError> {
        if !celsius.is_finite() {
            return Err(rejected(ConfigError::InvalidMeasurement));
        }
        let previous = self.selection.zone();
        self.selection.apply_ambient(celsius, self.pool.condensers_mut());
        if self.selection.zone() != previous {
            info!("ambient zone {:?} -> {:?}", previous, self.selection.zone());
        }
        Ok(())
    }

    /// Folds a measured efficiency (0..1) into the bank's rating. The first
    /// sample after a reset replaces the nominal rating.
    pub fn record_performance(&mut self, slot: SlotId, efficiency: f32) -> Result<(), ConfigError> {
        if !efficiency.is_finite() {
            return Err(rejected(ConfigError::InvalidMeasurement));
        }
        let sample = efficiency.clamp(0.0, 1.0);
        let bank = self.pool.condenser_mut(slot).map_err(rejected)?;
        bank.efficiency_rating = if bank.performance_valid {
            bank.efficiency_rating + EFFICIENCY_SMOOTHING * (sample - bank.efficiency_rating)
        } else {
            sample
        };
        bank.performance_valid = true;
        self.selection.compensate(self.pool.condensers_mut());
        Ok(())
    }

    /// Latches a motor fault: the unit is parked in `Fault` and commanded off.
    pub fn report_fault<P, E>(
        &mut self,
        kind: UnitKind,
        slot: SlotId,
        now: Timestamp,
        port: &mut P,
        events: &mut E,
    ) -> Result<(), ConfigError>
    where
        P: ActuationPort + ?Sized,
        E: EventSink + ?Sized,
    {
        self.pool.unit_mut(kind, slot).map_err(rejected)?.record_fault(now);
        error!("{:?} {} motor fault", kind, slot);
        events.emit(PlantEvent::UnitFaulted { kind, slot });
        if let Err(err) = port.set_unit_power(kind, slot, false) {
            warn!("{:?} {} fault power-off not confirmed: {:?}", kind, slot, err);
            events.emit(PlantEvent::ActuationFailed { kind, slot });
        }
        Ok(())
    }

    pub fn clear_fault(&mut self, kind: UnitKind, slot: SlotId) -> Result<(), ConfigError> {
        self.pool.unit_mut(kind, slot).map_err(rejected)?.clear_fault();
        info!("{:?} {} fault cleared", kind, slot);
        Ok(())
    }

    pub fn begin_maintenance(&mut self, slot: SlotId) -> Result<(), ConfigError> {
        let bank = self.pool.condenser_mut(slot).map_err(rejected)?;
        self.maintenance.begin(bank);
        info!("condenser {} maintenance started", slot);
        Ok(())
    }

    pub fn complete_maintenance(&mut self, slot: SlotId, now: Timestamp, note: &str) -> Result<(), ConfigError> {
        let bank = self.pool.condenser_mut(slot).map_err(rejected)?;
        self.maintenance.complete(bank, now, note);
        self.selection.compensate(self.pool.condensers_mut());
        Ok(())
    }

    /// Loads persisted lifetime counters for one unit.
    pub fn restore_unit_statistics(&mut self, kind: UnitKind, slot: SlotId, stats: UnitStatistics) -> Result<(), ConfigError> {
        self.pool.unit_mut(kind, slot).map_err(rejected)?.stats = stats;
        Ok(())
    }

    /// Loads a persisted maintenance record. The state is re-assessed on the
    /// next maintenance check.
    pub fn restore_maintenance(&mut self, slot: SlotId, record: MaintenanceRecord) -> Result<(), ConfigError> {
        self.pool.condenser_mut(slot).map_err(rejected)?.maintenance = record;
        Ok(())
    }

    pub fn reset_statistics(&mut self, kind: UnitKind, slot: SlotId) -> Result<(), ConfigError> {
        self.pool.unit_mut(kind, slot).map_err(rejected)?.stats = UnitStatistics::default();
        info!("{:?} {} statistics reset", kind, slot);
        Ok(())
    }

    pub fn pool(&self) -> &UnitPool {
        &self.pool
    }

    pub fn equipment(&self) -> &EquipmentConfig {
        &self.equipment
    }

    pub fn staging(&self, kind: UnitKind) -> &StagingControl {
        match kind {
            UnitKind::Compressor => &self.compressor_staging,
            UnitKind::CondenserBank => &self.condenser_staging,
        }
    }

    pub fn rotation(&self, kind: UnitKind) -> RotationState {
        match kind {
            UnitKind::Compressor => self.compressor_rotation.state(),
            UnitKind::CondenserBank => self.condenser_rotation.state(),
        }
    }

    pub fn selection(&self) -> &CondenserSelectionEngine {
        &self.selection
    }

    pub fn selection_engine_enabled(&self) -> bool {
        self.selection_engine_enabled
    }

    pub fn max_tier(&self) -> Tier {
        self.max_tier
    }

    pub fn demand_percent(&self) -> f32 {
        self.demand_percent
    }

    pub fn target(&self) -> CapacityTarget {
        self.target
    }

    pub fn is_emergency_stopped(&self) -> bool {
        self.emergency_stop
    }

    pub fn status(&self) -> PlantStatus {
        let units = self
            .pool
            .compressors()
            .iter()
            .map(UnitStatus::from)
            .chain(self.pool.condensers().iter().map(UnitStatus::from))
            .collect();

        PlantStatus {
            timestamp: self.last_tick,
            demand_percent: self.demand_percent,
            target: self.target,
            max_tier: self.max_tier,
            emergency_stop: self.emergency_stop,
            selection_algorithm: self.selection.algorithm(),
            selection_engine_enabled: self.selection_engine_enabled,
            ambient_zone: self.selection.zone(),
            compressors: self.kind_status(UnitKind::Compressor),
            condensers: self.kind_status(UnitKind::CondenserBank),
            units,
        }
    }

    fn kind_status(&self, kind: UnitKind) -> KindStatus {
        let staging = self.staging(kind);
        let running = self.pool.running_count(kind);
        let available = self.pool.available_count(kind);
        KindStatus {
            kind,
            state: staging.state(),
            algorithm: staging.algorithm(),
            running,
            available,
            target: staging.target_count(),
            capacity_percent: KindStatus::capacity_percent(running, available),
            tier: staging.current_tier(),
            auto_staging_enabled: staging.auto_staging_enabled(),
            last_outcome: staging.last_outcome(),
            stalled_cycles: staging.stalled_cycles(),
            rotation: self.rotation(kind),
        }
    }

    fn staging_mut(&mut self, kind: UnitKind) -> &mut StagingControl {
        match kind {
            UnitKind::Compressor => &mut self.compressor_staging,
            UnitKind::CondenserBank => &mut self.condenser_staging,
        }
    }

    fn validate_timestamp_and_update(&mut self, now: Timestamp) -> Result<Millis, TimestampError> {
        if now < self.last_tick {
            return Err(TimestampError::OutOfOrder);
        }
        let elapsed = now.elapsed_since(self.last_tick);
        self.last_tick = now;
        Ok(elapsed)
    }
}
