//! Multi-criteria scoring and ranking of condenser banks.
//!
//! Every candidate gets a raw score under the selected algorithm. The raw
//! score is scaled by the bank's ambient compensation and halved while the
//! bank needs maintenance. Start candidates are ranked by descending score,
//! stop candidates by descending reciprocal score, so the least favourable
//! running bank is shed first. Ties go to the lowest slot.

use arrayvec::ArrayVec;
use core::cmp::Ordering;

use crate::config::{ConfigError, MAX_CONDENSERS};
use crate::maintenance::MaintenanceState;
use crate::rotation::RotationState;
use crate::timestamp::{MILLIS_PER_HOUR, Millis};
use crate::unit::{CondenserBank, SlotId, UnitMode};

/// Runtime score decay per accumulated hour.
pub const RUNTIME_SCORE_SCALE: f32 = 0.01;
/// Runtime term multipliers for the rotation lead and lag units.
pub const LEAD_BIAS: f32 = 1.2;
pub const LAG_BIAS: f32 = 0.8;

const COMPENSATION_MIN: f32 = 0.5;
const COMPENSATION_MAX: f32 = 1.5;

pub type RankedSlots = ArrayVec<SlotId, MAX_CONDENSERS>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum SelectionAlgorithm {
    RuntimeBalance = 0,
    Performance = 1,
    #[default]
    Hybrid = 2,
    MaintenancePriority = 3,
    Adaptive = 4,
}

impl TryFrom<u8> for SelectionAlgorithm {
    type Error = ConfigError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(SelectionAlgorithm::RuntimeBalance),
            1 => Ok(SelectionAlgorithm::Performance),
            2 => Ok(SelectionAlgorithm::Hybrid),
            3 => Ok(SelectionAlgorithm::MaintenancePriority),
            4 => Ok(SelectionAlgorithm::Adaptive),
            _ => Err(ConfigError::UnknownAlgorithm),
        }
    }
}

/// Per-bank weights for the scoring terms.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct SelectionWeights {
    pub runtime: f32,
    pub performance: f32,
    pub maintenance: f32,
}

impl Default for SelectionWeights {
    fn default() -> Self {
        Self { runtime: 1.0, performance: 1.0, maintenance: 1.0 }
    }
}

impl SelectionWeights {
    pub fn validate(&self) -> Result<(), ConfigError> {
        let valid = |weight: f32| weight.is_finite() && weight >= 0.0;
        if valid(self.runtime) && valid(self.performance) && valid(self.maintenance) {
            Ok(())
        } else {
            Err(ConfigError::InvalidWeight)
        }
    }
}

/// Discretized ambient temperature.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum AmbientZone {
    /// Assumed until the first ambient reading.
    #[default]
    Cold,
    Mild,
    Warm,
    Hot,
}

impl AmbientZone {
    pub fn from_celsius(celsius: f32) -> Self {
        if celsius < 10.0 {
            AmbientZone::Cold
        } else if celsius < 25.0 {
            AmbientZone::Mild
        } else if celsius < 35.0 {
            AmbientZone::Warm
        } else {
            AmbientZone::Hot
        }
    }

    /// How strongly the zone rewards efficiency in ambient compensation.
    pub fn efficiency_bias(&self) -> f32 {
        match self {
            AmbientZone::Cold => 0.0,
            AmbientZone::Mild => 0.2,
            AmbientZone::Warm => 0.5,
            AmbientZone::Hot => 1.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct CondenserSelectionEngine {
    algorithm: SelectionAlgorithm,
    zone: AmbientZone,
    rotation: RotationState,
}

impl CondenserSelectionEngine {
    pub fn new(algorithm: SelectionAlgorithm) -> Self {
        Self { algorithm, ..Self::default() }
    }

    pub fn algorithm(&self) -> SelectionAlgorithm {
        self.algorithm
    }

    pub fn set_algorithm(&mut self, algorithm: SelectionAlgorithm) {
        self.algorithm = algorithm;
    }

    pub fn zone(&self) -> AmbientZone {
        self.zone
    }

    pub fn observe_rotation(&mut self, rotation: RotationState) {
        self.rotation = rotation;
    }

    /// Re-zones the plant and recomputes every bank's ambient compensation.
    /// Hotter zones favour efficient banks more strongly.
    pub fn apply_ambient(&mut self, celsius: f32, banks: &mut [CondenserBank]) {
        self.zone = AmbientZone::from_celsius(celsius);
        self.compensate(banks);
    }

    /// Recomputes ambient compensation for the current zone, e.g. after a
    /// bank's efficiency or seasonal factor changed.
    pub fn compensate(&self, banks: &mut [CondenserBank]) {
        let bias = self.zone.efficiency_bias();
        for bank in banks.iter_mut() {
            let compensation = bank.seasonal_factor * (1.0 + bias * (bank.efficiency_rating - 0.5));
            bank.ambient_compensation = compensation.clamp(COMPENSATION_MIN, COMPENSATION_MAX);
        }
    }

    /// Adjusted score of one bank against the rest of the fleet.
    pub fn priority_score(&self, bank: &CondenserBank, banks: &[CondenserBank]) -> f32 {
        self.adjusted_score(bank, fleet_average_runtime(banks))
    }

    /// Caches the current score on every bank for status reporting.
    pub fn update_scores(&self, banks: &mut [CondenserBank]) {
        let average = fleet_average_runtime(banks);
        for bank in banks.iter_mut() {
            bank.priority_score = self.adjusted_score(bank, average);
        }
    }

    /// Up to `required` banks to start, best first.
    pub fn select_to_start(&self, banks: &[CondenserBank], required: usize) -> RankedSlots {
        self.rank(banks, required, Self::eligible_to_start, |score| score)
    }

    /// Up to `count` running banks to stop, least favourable first.
    pub fn select_to_stop(&self, banks: &[CondenserBank], count: usize) -> RankedSlots {
        self.rank(banks, count, Self::eligible_to_stop, |score| {
            if score > 0.0 { 1.0 / score } else { f32::INFINITY }
        })
    }

    fn eligible_to_start(bank: &CondenserBank) -> bool {
        bank.unit.can_auto_start() && bank.maintenance.state.allows_start()
    }

    // Maintenance state does not gate stops.
    fn eligible_to_stop(bank: &CondenserBank) -> bool {
        bank.unit.available && bank.unit.is_running() && bank.unit.mode == UnitMode::Auto && !bank.unit.motor_fault
    }

    fn rank(
        &self,
        banks: &[CondenserBank],
        count: usize,
        eligible: fn(&CondenserBank) -> bool,
        key: impl Fn(f32) -> f32,
    ) -> RankedSlots {
        let mut ranked: ArrayVec<(f32, SlotId), MAX_CONDENSERS> = banks
            .iter()
            .filter(|bank| eligible(bank))
            .map(|bank| (key(self.priority_score(bank, banks)), bank.unit.id()))
            .take(MAX_CONDENSERS)
            .collect();
        ranked.sort_unstable_by(|a, b| match b.0.total_cmp(&a.0) {
            Ordering::Equal => a.1.cmp(&b.1),
            ordering => ordering,
        });
        ranked.into_iter().take(count).map(|(_, slot)| slot).collect()
    }

    fn adjusted_score(&self, bank: &CondenserBank, fleet_average: Millis) -> f32 {
        let compensation = bank.ambient_compensation.clamp(COMPENSATION_MIN, COMPENSATION_MAX);
        let score = self.raw_score(bank, fleet_average) * compensation;
        if bank.maintenance.state == MaintenanceState::Ok { score } else { score * 0.5 }
    }

    fn raw_score(&self, bank: &CondenserBank, fleet_average: Millis) -> f32 {
        let weights = bank.weights;
        let maintenance_ok = bank.maintenance.state == MaintenanceState::Ok;
        match self.algorithm {
            SelectionAlgorithm::RuntimeBalance => self.runtime_term(bank, weights.runtime),
            SelectionAlgorithm::Performance => weights.performance * bank.efficiency_rating,
            SelectionAlgorithm::Hybrid => {
                self.runtime_term(bank, weights.runtime)
                    + weights.performance * bank.efficiency_rating
                    + weights.maintenance * if maintenance_ok { 1.0 } else { 0.5 }
            }
            SelectionAlgorithm::MaintenancePriority => weights.maintenance * if maintenance_ok { 1.0 } else { 0.1 },
            SelectionAlgorithm::Adaptive => {
                let efficiency = bank.efficiency_rating;
                let below_average = if bank.unit.stats.accumulated_runtime < fleet_average { 0.3 } else { 0.1 };
                let zone_term = match self.zone {
                    AmbientZone::Hot => 0.3 * efficiency,
                    AmbientZone::Warm => 0.2 * efficiency + 0.1 * self.runtime_term(bank, 1.0),
                    AmbientZone::Mild | AmbientZone::Cold => 0.15 * efficiency + 0.15 * self.runtime_term(bank, 1.0),
                };
                0.4 * efficiency + below_average + zone_term
            }
        }
    }

    /// `weight / (1 + hours × k)`, nudged up for the lead unit and down for the lag unit.
    fn runtime_term(&self, bank: &CondenserBank, weight: f32) -> f32 {
        let hours = bank.unit.stats.accumulated_runtime as f32 / MILLIS_PER_HOUR as f32;
        let term = weight / (1.0 + hours * RUNTIME_SCORE_SCALE);
        let slot = Some(bank.unit.id());
        if slot == self.rotation.lead {
            term * LEAD_BIAS
        } else if slot == self.rotation.lag {
            term * LAG_BIAS
        } else {
            term
        }
    }
}

/// Mean accumulated runtime over the available banks.
fn fleet_average_runtime(banks: &[CondenserBank]) -> Millis {
    let (total, count) = banks
        .iter()
        .filter(|bank| bank.unit.available)
        .fold((0u64, 0u64), |(total, count), bank| {
            (total.saturating_add(bank.unit.stats.accumulated_runtime), count + 1)
        });
    if count == 0 { 0 } else { total / count }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MAINTENANCE_INTERVAL;
    use crate::timestamp::Timestamp;
    use approx::assert_relative_eq;

    fn fleet(count: usize) -> std::vec::Vec<CondenserBank> {
        (0..count)
            .map(|slot| {
                let mut bank = CondenserBank::new(slot as SlotId, Timestamp::from_millis(0), MAINTENANCE_INTERVAL);
                bank.unit.apply_enabled(true);
                bank
            })
            .collect()
    }

    fn run(bank: &mut CondenserBank) {
        bank.unit.mark_started(Timestamp::from_millis(0));
        bank.unit.settle();
    }

    #[test]
    fn test_runtime_balance_prefers_least_run() {
        let engine = CondenserSelectionEngine::new(SelectionAlgorithm::RuntimeBalance);
        let mut banks = fleet(3);
        banks[0].unit.stats.accumulated_runtime = 200 * MILLIS_PER_HOUR;
        banks[1].unit.stats.accumulated_runtime = 50 * MILLIS_PER_HOUR;
        banks[2].unit.stats.accumulated_runtime = 100 * MILLIS_PER_HOUR;
        assert_relative_eq!(engine.priority_score(&banks[2], &banks), 0.5, epsilon = 1e-6);
        assert_eq!(engine.select_to_start(&banks, 3).as_slice(), &[1, 2, 0]);
        assert_eq!(engine.select_to_start(&banks, 1).as_slice(), &[1]);
    }

    #[test]
    fn test_performance_score() {
        let engine = CondenserSelectionEngine::new(SelectionAlgorithm::Performance);
        let mut banks = fleet(2);
        banks[0].efficiency_rating = 0.7;
        banks[1].efficiency_rating = 0.9;
        banks[1].weights.performance = 2.0;
        assert_relative_eq!(engine.priority_score(&banks[0], &banks), 0.7, epsilon = 1e-6);
        assert_relative_eq!(engine.priority_score(&banks[1], &banks), 1.8, epsilon = 1e-6);
        assert_eq!(engine.select_to_start(&banks, 2).as_slice(), &[1, 0]);
    }

    #[test]
    fn test_hybrid_sums_terms_and_halves_for_maintenance() {
        let engine = CondenserSelectionEngine::new(SelectionAlgorithm::Hybrid);
        let mut banks = fleet(2);
        banks[0].efficiency_rating = 0.8;
        assert_relative_eq!(engine.priority_score(&banks[0], &banks), 2.8, epsilon = 1e-6);
        banks[0].maintenance.state = MaintenanceState::DueSoon;
        // (1.0 + 0.8 + 0.5) halved.
        assert_relative_eq!(engine.priority_score(&banks[0], &banks), 1.15, epsilon = 1e-6);
    }

    #[test]
    fn test_maintenance_priority() {
        let engine = CondenserSelectionEngine::new(SelectionAlgorithm::MaintenancePriority);
        let mut banks = fleet(3);
        banks[0].maintenance.state = MaintenanceState::DueNow;
        assert_relative_eq!(engine.priority_score(&banks[0], &banks), 0.05, epsilon = 1e-6);
        assert_relative_eq!(engine.priority_score(&banks[1], &banks), 1.0, epsilon = 1e-6);
        assert_eq!(engine.select_to_start(&banks, 3).as_slice(), &[1, 2, 0]);
    }

    #[test]
    fn test_critical_bank_never_proposed_to_start() {
        for algorithm in [SelectionAlgorithm::Hybrid, SelectionAlgorithm::MaintenancePriority] {
            let engine = CondenserSelectionEngine::new(algorithm);
            let mut banks = fleet(2);
            banks[0].maintenance.state = MaintenanceState::Critical;
            banks[0].efficiency_rating = 1.0;
            banks[1].efficiency_rating = 0.2;
            assert_eq!(engine.select_to_start(&banks, 1).as_slice(), &[1]);
            assert_eq!(engine.select_to_start(&banks, 2).as_slice(), &[1]);
        }
    }

    #[test]
    fn test_eligibility_filter() {
        let engine = CondenserSelectionEngine::default();
        let mut banks = fleet(4);
        banks[0].unit.apply_enabled(false);
        banks[1].unit.set_mode(UnitMode::ManualOff);
        banks[2].unit.record_fault(Timestamp::from_millis(0));
        run(&mut banks[3]);
        assert!(engine.select_to_start(&banks, 4).is_empty());
        assert_eq!(engine.select_to_stop(&banks, 4).as_slice(), &[3]);
    }

    #[test]
    fn test_stop_ranking_sheds_least_favourable_first() {
        let engine = CondenserSelectionEngine::new(SelectionAlgorithm::Performance);
        let mut banks = fleet(3);
        for (bank, efficiency) in banks.iter_mut().zip([0.9, 0.5, 0.7]) {
            bank.efficiency_rating = efficiency;
            run(bank);
        }
        assert_eq!(engine.select_to_stop(&banks, 3).as_slice(), &[1, 2, 0]);
        assert_eq!(engine.select_to_stop(&banks, 1).as_slice(), &[1]);
    }

    #[test]
    fn test_critical_running_bank_is_shed_first() {
        let engine = CondenserSelectionEngine::new(SelectionAlgorithm::Hybrid);
        let mut banks = fleet(2);
        run(&mut banks[0]);
        run(&mut banks[1]);
        banks[1].maintenance.state = MaintenanceState::Critical;
        assert_eq!(engine.select_to_stop(&banks, 1).as_slice(), &[1]);
    }

    #[test]
    fn test_ties_break_on_lowest_slot() {
        let engine = CondenserSelectionEngine::default();
        let mut banks = fleet(4);
        assert_eq!(engine.select_to_start(&banks, 4).as_slice(), &[0, 1, 2, 3]);
        for bank in banks.iter_mut() {
            run(bank);
        }
        assert_eq!(engine.select_to_stop(&banks, 4).as_slice(), &[0, 1, 2, 3]);
    }

    #[test]
    fn test_rotation_biases_runtime_term() {
        let mut engine = CondenserSelectionEngine::new(SelectionAlgorithm::RuntimeBalance);
        let banks = fleet(3);
        engine.observe_rotation(RotationState { lead: Some(2), lag: Some(0), last_rotation: None });
        assert_relative_eq!(engine.priority_score(&banks[2], &banks), 1.2, epsilon = 1e-6);
        assert_relative_eq!(engine.priority_score(&banks[0], &banks), 0.8, epsilon = 1e-6);
        assert_eq!(engine.select_to_start(&banks, 3).as_slice(), &[2, 1, 0]);
    }

    #[test]
    fn test_ambient_compensation_favours_efficiency_when_hot() {
        let mut engine = CondenserSelectionEngine::new(SelectionAlgorithm::Performance);
        let mut banks = fleet(2);
        banks[0].efficiency_rating = 0.9;
        banks[1].efficiency_rating = 0.4;

        engine.apply_ambient(5.0, &mut banks);
        assert_eq!(engine.zone(), AmbientZone::Cold);
        assert_relative_eq!(banks[0].ambient_compensation, 1.0, epsilon = 1e-6);

        engine.apply_ambient(40.0, &mut banks);
        assert_eq!(engine.zone(), AmbientZone::Hot);
        assert_relative_eq!(banks[0].ambient_compensation, 1.4, epsilon = 1e-6);
        assert_relative_eq!(banks[1].ambient_compensation, 0.9, epsilon = 1e-6);

        banks[0].seasonal_factor = 1.5;
        engine.apply_ambient(40.0, &mut banks);
        assert_relative_eq!(banks[0].ambient_compensation, 1.5, epsilon = 1e-6);
    }

    #[test]
    fn test_adaptive_rewards_below_average_runtime() {
        let mut engine = CondenserSelectionEngine::new(SelectionAlgorithm::Adaptive);
        let mut banks = fleet(2);
        banks[1].unit.stats.accumulated_runtime = 100 * MILLIS_PER_HOUR;
        // Cold: 0.4 + 0.3 + 0.15 + 0.15 for the idle bank.
        assert_relative_eq!(engine.priority_score(&banks[0], &banks), 1.0, epsilon = 1e-6);
        // 0.4 + 0.1 + 0.15 + 0.15 × 0.5 for the worn bank.
        assert_relative_eq!(engine.priority_score(&banks[1], &banks), 0.725, epsilon = 1e-6);

        engine.apply_ambient(40.0, &mut banks);
        // Hot: 0.4 + 0.3 + 0.3, scaled by a compensation of 1.5.
        assert_relative_eq!(engine.priority_score(&banks[0], &banks), 1.5, epsilon = 1e-6);
    }

    #[test]
    fn test_empty_when_nothing_eligible() {
        let engine = CondenserSelectionEngine::default();
        let banks = fleet(0);
        assert!(engine.select_to_start(&banks, 2).is_empty());
        assert!(engine.select_to_stop(&banks, 2).is_empty());
    }

    #[test]
    fn test_algorithm_from_code() {
        assert_eq!(SelectionAlgorithm::try_from(4), Ok(SelectionAlgorithm::Adaptive));
        assert_eq!(SelectionAlgorithm::try_from(9), Err(ConfigError::UnknownAlgorithm));
    }

    #[test]
    fn test_weights_validation() {
        assert!(SelectionWeights::default().validate().is_ok());
        let negative = SelectionWeights { runtime: -0.1, ..SelectionWeights::default() };
        assert_eq!(negative.validate(), Err(ConfigError::InvalidWeight));
        let nan = SelectionWeights { maintenance: f32::NAN, ..SelectionWeights::default() };
        assert_eq!(nan.validate(), Err(ConfigError::InvalidWeight));
    }
}
