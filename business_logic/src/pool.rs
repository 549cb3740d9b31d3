//! Fixed slots for every unit the plant can hold, indexed by hardware slot.

use crate::config::{ConfigError, EquipmentConfig, MAX_COMPRESSORS, MAX_CONDENSERS};
use crate::fmt::info;
use crate::timestamp::{Millis, Timestamp};
use crate::unit::{CondenserBank, SlotId, Unit, UnitKind};

#[derive(Debug, Clone, PartialEq)]
pub struct UnitPool {
    compressors: [Unit; MAX_COMPRESSORS],
    condensers: [CondenserBank; MAX_CONDENSERS],
}

impl UnitPool {
    /// Every slot starts out absent until the first configuration is applied.
    pub fn new(now: Timestamp, service_interval: Millis) -> Self {
        Self {
            compressors: core::array::from_fn(|slot| Unit::new(UnitKind::Compressor, slot as SlotId)),
            condensers: core::array::from_fn(|slot| CondenserBank::new(slot as SlotId, now, service_interval)),
        }
    }

    pub fn compressors(&self) -> &[Unit] {
        &self.compressors
    }

    pub fn condensers(&self) -> &[CondenserBank] {
        &self.condensers
    }

    pub(crate) fn compressors_mut(&mut self) -> &mut [Unit] {
        &mut self.compressors
    }

    pub(crate) fn condensers_mut(&mut self) -> &mut [CondenserBank] {
        &mut self.condensers
    }

    pub fn unit(&self, kind: UnitKind, slot: SlotId) -> Result<&Unit, ConfigError> {
        let slot = usize::from(slot);
        match kind {
            UnitKind::Compressor => self.compressors.get(slot),
            UnitKind::CondenserBank => self.condensers.get(slot).map(|bank| &bank.unit),
        }
        .ok_or(ConfigError::NoSuchUnit)
    }

    pub(crate) fn unit_mut(&mut self, kind: UnitKind, slot: SlotId) -> Result<&mut Unit, ConfigError> {
        let slot = usize::from(slot);
        match kind {
            UnitKind::Compressor => self.compressors.get_mut(slot),
            UnitKind::CondenserBank => self.condensers.get_mut(slot).map(|bank| &mut bank.unit),
        }
        .ok_or(ConfigError::NoSuchUnit)
    }

    pub fn condenser(&self, slot: SlotId) -> Result<&CondenserBank, ConfigError> {
        self.condensers.get(usize::from(slot)).ok_or(ConfigError::NoSuchUnit)
    }

    pub(crate) fn condenser_mut(&mut self, slot: SlotId) -> Result<&mut CondenserBank, ConfigError> {
        self.condensers.get_mut(usize::from(slot)).ok_or(ConfigError::NoSuchUnit)
    }

    pub fn running_count(&self, kind: UnitKind) -> usize {
        self.count(kind, Unit::is_running)
    }

    pub fn available_count(&self, kind: UnitKind) -> usize {
        self.count(kind, Unit::is_available)
    }

    /// Units that can contribute capacity, the basis for demand translation.
    pub fn dispatchable_count(&self, kind: UnitKind) -> usize {
        self.count(kind, Unit::is_dispatchable)
    }

    fn count(&self, kind: UnitKind, predicate: fn(&Unit) -> bool) -> usize {
        match kind {
            UnitKind::Compressor => self.compressors.iter().filter(|unit| predicate(unit)).count(),
            UnitKind::CondenserBank => self.condensers.iter().filter(|bank| predicate(&bank.unit)).count(),
        }
    }

    pub(crate) fn for_each_unit_mut(&mut self, mut f: impl FnMut(&mut Unit)) {
        self.compressors.iter_mut().for_each(&mut f);
        self.condensers.iter_mut().for_each(|bank| f(&mut bank.unit));
    }

    /// Adds `elapsed` to every powered unit.
    pub(crate) fn accrue(&mut self, elapsed: Millis) {
        self.for_each_unit_mut(|unit| unit.accrue_runtime(elapsed));
    }

    /// Completes last cycle's start and stop transitions.
    pub(crate) fn settle(&mut self) {
        self.for_each_unit_mut(Unit::settle);
    }

    /// Refreshes the installed/enabled flags. Returns true when a powered
    /// unit lost its enabled flag and has to be shed.
    pub(crate) fn apply_config(&mut self, config: &EquipmentConfig) -> bool {
        let mut shed = false;
        self.for_each_unit_mut(|unit| {
            let enabled = config.is_enabled(unit.kind(), usize::from(unit.id()));
            if unit.enabled != enabled {
                info!("{:?} {} enabled: {}", unit.kind(), unit.id(), enabled);
            }
            shed |= unit.apply_enabled(enabled);
        });
        shed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MAINTENANCE_INTERVAL;
    use crate::unit::UnitState;

    fn pool() -> UnitPool {
        let mut pool = UnitPool::new(Timestamp::from_millis(0), MAINTENANCE_INTERVAL);
        pool.apply_config(&EquipmentConfig::default());
        pool
    }

    #[test]
    fn test_slots_are_absent_until_configured() {
        let pool = UnitPool::new(Timestamp::from_millis(0), MAINTENANCE_INTERVAL);
        assert_eq!(pool.available_count(UnitKind::Compressor), 0);
        assert_eq!(pool.available_count(UnitKind::CondenserBank), 0);
        assert_eq!(pool.compressors().len(), MAX_COMPRESSORS);
        assert_eq!(pool.condensers()[3].unit().id(), 3);
    }

    #[test]
    fn test_lookup_is_bounds_checked() {
        let pool = pool();
        assert!(pool.unit(UnitKind::Compressor, 7).is_ok());
        assert_eq!(pool.unit(UnitKind::Compressor, 8).err(), Some(ConfigError::NoSuchUnit));
        assert_eq!(pool.unit(UnitKind::CondenserBank, 4).err(), Some(ConfigError::NoSuchUnit));
        assert_eq!(pool.condenser(200).err(), Some(ConfigError::NoSuchUnit));
        assert_eq!(pool.unit(UnitKind::CondenserBank, 2).map(Unit::kind), Ok(UnitKind::CondenserBank));
    }

    #[test]
    fn test_counts_and_accrual() {
        let mut pool = pool();
        assert_eq!(pool.available_count(UnitKind::Compressor), 8);
        pool.unit_mut(UnitKind::Compressor, 2).unwrap().mark_started(Timestamp::from_millis(0));
        pool.condenser_mut(1).unwrap().unit.mark_started(Timestamp::from_millis(0));
        assert_eq!(pool.running_count(UnitKind::Compressor), 1);
        assert_eq!(pool.running_count(UnitKind::CondenserBank), 1);

        pool.settle();
        pool.accrue(100);
        assert_eq!(pool.compressors()[2].state(), UnitState::Running);
        assert_eq!(pool.compressors()[2].statistics().accumulated_runtime, 100);
        assert_eq!(pool.condensers()[1].unit().statistics().accumulated_runtime, 100);
        assert_eq!(pool.compressors()[0].statistics().accumulated_runtime, 0);
    }

    #[test]
    fn test_apply_config_reports_units_to_shed() {
        let mut pool = pool();
        let mut config = EquipmentConfig::default();
        config.compressor_count = 6;
        assert!(!pool.apply_config(&config));
        assert_eq!(pool.available_count(UnitKind::Compressor), 6);
        assert_eq!(pool.compressors()[7].state(), UnitState::Disabled);

        pool.unit_mut(UnitKind::Compressor, 0).unwrap().mark_started(Timestamp::from_millis(0));
        config.compressor_enabled[0] = false;
        assert!(pool.apply_config(&config));
    }
}
