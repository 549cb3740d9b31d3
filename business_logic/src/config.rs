//! Hardware bounds, default tuning, and the validated configuration types the
//! host hands to the engine.

use core::fmt;

use crate::timestamp::{MILLIS_PER_DAY, MILLIS_PER_HOUR, MILLIS_PER_SECOND, Millis};
use crate::unit::UnitKind;

// Hardware bounds. Slots are indexed 0..MAX for each kind.
pub const MAX_COMPRESSORS: usize = 8;
pub const MAX_CONDENSERS: usize = 4;
pub const MAX_UNITS: usize = MAX_COMPRESSORS + MAX_CONDENSERS;

/// Cadence the host is expected to call `ChillerPlant::tick` at.
pub const CONTROL_PERIOD_MS: Millis = 100;

// Short-cycling protection defaults.
pub const COMPRESSOR_MINIMUM_RUN_TIME: Millis = 180 * MILLIS_PER_SECOND;
pub const COMPRESSOR_INTER_START_DELAY: Millis = 30 * MILLIS_PER_SECOND;
pub const COMPRESSOR_INTER_STOP_DELAY: Millis = 30 * MILLIS_PER_SECOND;
pub const CONDENSER_MINIMUM_RUN_TIME: Millis = 60 * MILLIS_PER_SECOND;
pub const CONDENSER_INTER_START_DELAY: Millis = 10 * MILLIS_PER_SECOND;
pub const CONDENSER_INTER_STOP_DELAY: Millis = 10 * MILLIS_PER_SECOND;

// Rotation bookkeeping.
pub const ROTATION_COOLDOWN: Millis = MILLIS_PER_HOUR;
pub const RUNTIME_BALANCE_THRESHOLD: Millis = 10 * MILLIS_PER_HOUR;

// Maintenance scheduling.
pub const MAINTENANCE_CHECK_PERIOD: Millis = MILLIS_PER_DAY;
pub const MAINTENANCE_LOOKAHEAD: Millis = 7 * MILLIS_PER_DAY;
pub const MAINTENANCE_INTERVAL: Millis = 90 * MILLIS_PER_DAY;
pub const MAINTENANCE_EFFICIENCY_THRESHOLD: f32 = 0.6;

/// Consecutive cycles with an unmet target and no eligible unit before
/// `ConvergenceStalled` is raised (one minute at the default cadence).
pub const STALL_CYCLE_LIMIT: u32 = 600;

/// Longest accepted timing value for any staging delay.
const MAX_STAGING_DELAY: Millis = MILLIS_PER_DAY;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ConfigError {
    /// Tier outside 1..=4.
    InvalidTier,
    /// Algorithm code with no matching algorithm.
    UnknownAlgorithm,
    /// Negative or non-finite selection weight.
    InvalidWeight,
    /// Timing value outside the accepted range.
    InvalidTiming,
    /// Seasonal factor outside 0.5..=1.5 or non-finite.
    InvalidFactor,
    /// Non-finite measurement.
    InvalidMeasurement,
    /// Slot index outside the pool for that kind.
    NoSuchUnit,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let msg = match self {
            ConfigError::InvalidTier => "tier must be between 1 and 4",
            ConfigError::UnknownAlgorithm => "unknown algorithm code",
            ConfigError::InvalidWeight => "selection weights must be finite and non-negative",
            ConfigError::InvalidTiming => "staging delay out of range",
            ConfigError::InvalidFactor => "seasonal factor must be between 0.5 and 1.5",
            ConfigError::InvalidMeasurement => "measurement must be finite",
            ConfigError::NoSuchUnit => "no such unit slot",
        };
        f.write_str(msg)
    }
}

/// Short-cycling protection for one kind of equipment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct StagingTiming {
    pub minimum_run_time: Millis,
    pub inter_start_delay: Millis,
    pub inter_stop_delay: Millis,
}

impl StagingTiming {
    pub const fn defaults_for(kind: UnitKind) -> Self {
        match kind {
            UnitKind::Compressor => Self {
                minimum_run_time: COMPRESSOR_MINIMUM_RUN_TIME,
                inter_start_delay: COMPRESSOR_INTER_START_DELAY,
                inter_stop_delay: COMPRESSOR_INTER_STOP_DELAY,
            },
            UnitKind::CondenserBank => Self {
                minimum_run_time: CONDENSER_MINIMUM_RUN_TIME,
                inter_start_delay: CONDENSER_INTER_START_DELAY,
                inter_stop_delay: CONDENSER_INTER_STOP_DELAY,
            },
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let in_range = |value: Millis| value <= MAX_STAGING_DELAY;
        if in_range(self.minimum_run_time) && in_range(self.inter_start_delay) && in_range(self.inter_stop_delay) {
            Ok(())
        } else {
            Err(ConfigError::InvalidTiming)
        }
    }
}

/// Installed and enabled flags for every slot, as held by the external
/// configuration store. Slots at or beyond the installed count are treated
/// as absent regardless of their enabled flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct EquipmentConfig {
    pub compressor_count: u8,
    pub condenser_count: u8,
    pub compressor_enabled: [bool; MAX_COMPRESSORS],
    pub condenser_enabled: [bool; MAX_CONDENSERS],
}

impl Default for EquipmentConfig {
    /// Everything installed and enabled.
    fn default() -> Self {
        Self {
            compressor_count: MAX_COMPRESSORS as u8,
            condenser_count: MAX_CONDENSERS as u8,
            compressor_enabled: [true; MAX_COMPRESSORS],
            condenser_enabled: [true; MAX_CONDENSERS],
        }
    }
}

impl EquipmentConfig {
    /// Whether a slot is installed and enabled.
    pub fn is_enabled(&self, kind: UnitKind, slot: usize) -> bool {
        match kind {
            UnitKind::Compressor => {
                slot < usize::from(self.compressor_count) && self.compressor_enabled.get(slot).copied().unwrap_or(false)
            }
            UnitKind::CondenserBank => {
                slot < usize::from(self.condenser_count) && self.condenser_enabled.get(slot).copied().unwrap_or(false)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_timing_is_valid() {
        assert!(StagingTiming::defaults_for(UnitKind::Compressor).validate().is_ok());
        assert!(StagingTiming::defaults_for(UnitKind::CondenserBank).validate().is_ok());
    }

    #[test]
    fn test_timing_rejects_excessive_delay() {
        let mut timing = StagingTiming::defaults_for(UnitKind::Compressor);
        timing.inter_start_delay = 2 * MILLIS_PER_DAY;
        assert_eq!(timing.validate(), Err(ConfigError::InvalidTiming));
    }

    #[test]
    fn test_equipment_config_respects_installed_count() {
        let mut config = EquipmentConfig::default();
        config.compressor_count = 6;
        config.condenser_enabled[1] = false;
        assert!(config.is_enabled(UnitKind::Compressor, 5));
        assert!(!config.is_enabled(UnitKind::Compressor, 6));
        assert!(!config.is_enabled(UnitKind::Compressor, 42));
        assert!(config.is_enabled(UnitKind::CondenserBank, 0));
        assert!(!config.is_enabled(UnitKind::CondenserBank, 1));
    }
}
