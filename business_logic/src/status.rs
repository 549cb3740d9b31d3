//! Read-only snapshot handed to telemetry and the operator display between
//! control cycles.

use arrayvec::ArrayVec;

use crate::capacity::{CapacityTarget, Tier};
use crate::config::MAX_UNITS;
use crate::maintenance::MaintenanceState;
use crate::rotation::RotationState;
use crate::selection::{AmbientZone, SelectionAlgorithm};
use crate::staging::{KindState, StagingAlgorithm, StagingOutcome};
use crate::timestamp::{Millis, Timestamp};
use crate::unit::{CondenserBank, SlotId, Unit, UnitKind, UnitMode, UnitState};

#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct KindStatus {
    pub kind: UnitKind,
    pub state: KindState,
    pub algorithm: StagingAlgorithm,
    pub running: usize,
    pub available: usize,
    pub target: usize,
    /// Running share of the available units, 0 when none are available.
    pub capacity_percent: f32,
    pub tier: Tier,
    pub auto_staging_enabled: bool,
    pub last_outcome: StagingOutcome,
    pub stalled_cycles: u32,
    pub rotation: RotationState,
}

impl KindStatus {
    pub fn capacity_percent(running: usize, available: usize) -> f32 {
        if available == 0 {
            0.0
        } else {
            running as f32 / available as f32 * 100.0
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct UnitStatus {
    pub kind: UnitKind,
    pub slot: SlotId,
    pub state: UnitState,
    pub mode: UnitMode,
    pub available: bool,
    pub motor_fault: bool,
    pub accumulated_runtime: Millis,
    pub start_cycles: u32,
    pub fault_count: u32,
    /// Condenser banks only.
    pub maintenance: Option<MaintenanceState>,
    pub priority_score: Option<f32>,
    pub efficiency_rating: Option<f32>,
}

impl From<&Unit> for UnitStatus {
    fn from(unit: &Unit) -> Self {
        let stats = unit.statistics();
        Self {
            kind: unit.kind(),
            slot: unit.id(),
            state: unit.state(),
            mode: unit.mode(),
            available: unit.is_available(),
            motor_fault: unit.has_motor_fault(),
            accumulated_runtime: stats.accumulated_runtime,
            start_cycles: stats.start_cycles,
            fault_count: stats.fault_count,
            maintenance: None,
            priority_score: None,
            efficiency_rating: None,
        }
    }
}

impl From<&CondenserBank> for UnitStatus {
    fn from(bank: &CondenserBank) -> Self {
        Self {
            maintenance: Some(bank.maintenance().state),
            priority_score: Some(bank.priority_score()),
            efficiency_rating: Some(bank.efficiency_rating()),
            ..UnitStatus::from(bank.unit())
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PlantStatus {
    pub timestamp: Timestamp,
    pub demand_percent: f32,
    pub target: CapacityTarget,
    pub max_tier: Tier,
    pub emergency_stop: bool,
    pub selection_algorithm: SelectionAlgorithm,
    pub selection_engine_enabled: bool,
    pub ambient_zone: AmbientZone,
    pub compressors: KindStatus,
    pub condensers: KindStatus,
    /// Compressors first, then condenser banks, each in slot order.
    pub units: ArrayVec<UnitStatus, MAX_UNITS>,
}

impl PlantStatus {
    pub fn kind(&self, kind: UnitKind) -> &KindStatus {
        match kind {
            UnitKind::Compressor => &self.compressors,
            UnitKind::CondenserBank => &self.condensers,
        }
    }

    pub fn unit(&self, kind: UnitKind, slot: SlotId) -> Option<&UnitStatus> {
        self.units.iter().find(|unit| unit.kind == kind && unit.slot == slot)
    }
}
