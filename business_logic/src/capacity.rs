//! Demand-to-unit-count translation over the four-tier capacity model.

use crate::config::{ConfigError, MAX_COMPRESSORS, MAX_CONDENSERS};
use crate::unit::UnitKind;

/// Capacity band. Each tier admits another quarter of the hardware maximum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum Tier {
    #[default]
    One = 1,
    Two = 2,
    Three = 3,
    Four = 4,
}

impl TryFrom<u8> for Tier {
    type Error = ConfigError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(Tier::One),
            2 => Ok(Tier::Two),
            3 => Ok(Tier::Three),
            4 => Ok(Tier::Four),
            _ => Err(ConfigError::InvalidTier),
        }
    }
}

impl Tier {
    const ALL: [Tier; 4] = [Tier::One, Tier::Two, Tier::Three, Tier::Four];

    pub fn number(&self) -> u8 {
        *self as u8
    }

    /// Most units of `kind` this tier allows to run: 2/4/6/8 compressors,
    /// 1/2/3/4 condenser banks.
    pub fn ceiling(&self, kind: UnitKind) -> usize {
        let hardware_max = match kind {
            UnitKind::Compressor => MAX_COMPRESSORS,
            UnitKind::CondenserBank => MAX_CONDENSERS,
        };
        hardware_max * usize::from(self.number()) / 4
    }

    /// The smallest tier whose ceiling holds `count` units of `kind`.
    pub fn covering(kind: UnitKind, count: usize) -> Tier {
        Self::ALL
            .into_iter()
            .find(|tier| tier.ceiling(kind) >= count)
            .unwrap_or(Tier::Four)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct CapacityTarget {
    pub compressors: usize,
    pub condensers: usize,
    pub tier: Tier,
}

/// Clamps a demand signal into 0..=100. NaN reads as no demand.
pub fn clamp_demand(demand_percent: f32) -> f32 {
    if demand_percent.is_nan() {
        0.0
    } else {
        demand_percent.clamp(0.0, 100.0)
    }
}

/// Converts a demand percentage into compressor and condenser counts.
///
/// The compressor count is the demanded share of what is both available and
/// allowed by `max_tier`, rounded half up. One condenser bank runs per two
/// compressors (at least one while any compressor runs), limited to the banks
/// available.
pub fn translate(
    demand_percent: f32,
    max_tier: Tier,
    available_compressors: usize,
    available_condensers: usize,
) -> CapacityTarget {
    let demand = clamp_demand(demand_percent);
    let effective_max = available_compressors.min(max_tier.ceiling(UnitKind::Compressor));
    let exact = demand / 100.0 * effective_max as f32;
    // Non-negative, so truncating after adding one half rounds half up.
    let compressors = ((exact + 0.5) as usize).min(effective_max);
    let condensers = if compressors > 0 {
        compressors.div_ceil(2).max(1).min(available_condensers)
    } else {
        0
    };

    CapacityTarget {
        compressors,
        condensers,
        tier: Tier::covering(UnitKind::Compressor, compressors),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn target(compressors: usize, condensers: usize, tier: Tier) -> CapacityTarget {
        CapacityTarget { compressors, condensers, tier }
    }

    #[test]
    fn test_zero_demand_is_tier_one_and_idle() {
        for tier in Tier::ALL {
            for available in 0..=MAX_COMPRESSORS {
                assert_eq!(translate(0.0, tier, available, MAX_CONDENSERS), target(0, 0, Tier::One));
            }
        }
    }

    #[test]
    fn test_full_demand_full_plant() {
        assert_eq!(translate(100.0, Tier::Four, 8, 4), target(8, 4, Tier::Four));
    }

    #[test]
    fn test_half_demand() {
        assert_eq!(translate(50.0, Tier::Four, 8, 4), target(4, 2, Tier::Two));
    }

    #[test]
    fn test_rounds_half_up() {
        // 31.25% of 8 is exactly 2.5.
        assert_eq!(translate(31.25, Tier::Four, 8, 4).compressors, 3);
        // 30% of 8 is 2.4.
        assert_eq!(translate(30.0, Tier::Four, 8, 4).compressors, 2);
        // A sliver of demand on a single unit rounds down to nothing.
        assert_eq!(translate(10.0, Tier::Four, 1, 4), target(0, 0, Tier::One));
    }

    #[test]
    fn test_max_tier_limits_target() {
        assert_eq!(translate(100.0, Tier::Two, 8, 4), target(4, 2, Tier::Two));
        assert_eq!(translate(50.0, Tier::One, 8, 4), target(1, 1, Tier::One));
    }

    #[test]
    fn test_availability_limits_target() {
        assert_eq!(translate(100.0, Tier::Four, 5, 4), target(5, 3, Tier::Three));
        assert_eq!(translate(100.0, Tier::Four, 0, 4), target(0, 0, Tier::One));
    }

    #[test]
    fn test_condensers_clamped_to_available() {
        assert_eq!(translate(100.0, Tier::Four, 8, 2), target(8, 2, Tier::Four));
        assert_eq!(translate(100.0, Tier::Four, 8, 0), target(8, 0, Tier::Four));
        // One compressor still needs a bank.
        assert_eq!(translate(12.5, Tier::Four, 8, 4), target(1, 1, Tier::One));
    }

    #[test]
    fn test_demand_is_clamped() {
        assert_eq!(translate(250.0, Tier::Four, 8, 4), translate(100.0, Tier::Four, 8, 4));
        assert_eq!(translate(-20.0, Tier::Four, 8, 4), target(0, 0, Tier::One));
        assert_eq!(translate(f32::NAN, Tier::Four, 8, 4), target(0, 0, Tier::One));
    }

    #[test]
    fn test_tier_ceilings_and_covering() {
        assert_eq!(Tier::One.ceiling(UnitKind::Compressor), 2);
        assert_eq!(Tier::Three.ceiling(UnitKind::Compressor), 6);
        assert_eq!(Tier::Three.ceiling(UnitKind::CondenserBank), 3);
        assert_eq!(Tier::covering(UnitKind::Compressor, 0), Tier::One);
        assert_eq!(Tier::covering(UnitKind::Compressor, 3), Tier::Two);
        assert_eq!(Tier::covering(UnitKind::Compressor, 8), Tier::Four);
        assert_eq!(Tier::covering(UnitKind::Compressor, 9), Tier::Four);
        assert_eq!(Tier::covering(UnitKind::CondenserBank, 3), Tier::Three);
    }

    #[test]
    fn test_tier_from_code() {
        assert_eq!(Tier::try_from(3), Ok(Tier::Three));
        assert_eq!(Tier::try_from(0), Err(ConfigError::InvalidTier));
        assert_eq!(Tier::try_from(5), Err(ConfigError::InvalidTier));
    }
}
