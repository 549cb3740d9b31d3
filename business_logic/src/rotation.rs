//! Lead/lag designation from accumulated runtime. Advisory only: the result
//! biases condenser scoring and is reported, but never starts or stops a unit.

use crate::config::{ROTATION_COOLDOWN, RUNTIME_BALANCE_THRESHOLD};
use crate::fmt::debug;
use crate::timestamp::{Millis, Timestamp};
use crate::unit::{SlotId, Unit};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct RotationState {
    /// Least-run unit, preferred for the next start.
    pub lead: Option<SlotId>,
    /// Most-run unit, preferred for the next stop.
    pub lag: Option<SlotId>,
    pub last_rotation: Option<Timestamp>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct RotationManager {
    state: RotationState,
    cooldown: Millis,
    balance_threshold: Millis,
    last_evaluation: Option<Timestamp>,
}

impl Default for RotationManager {
    fn default() -> Self {
        Self::new(ROTATION_COOLDOWN, RUNTIME_BALANCE_THRESHOLD)
    }
}

impl RotationManager {
    pub fn new(cooldown: Millis, balance_threshold: Millis) -> Self {
        Self {
            state: RotationState::default(),
            cooldown,
            balance_threshold,
            last_evaluation: None,
        }
    }

    pub fn state(&self) -> RotationState {
        self.state
    }

    /// Scans the enabled units once per cooldown. When the runtime spread
    /// exceeds the balance threshold, the least-run unit becomes lead and the
    /// most-run unit lag (ties go to the lowest slot).
    pub fn update<U: AsRef<Unit>>(&mut self, units: &[U], now: Timestamp) {
        if !now.has_elapsed(self.last_evaluation, self.cooldown) {
            return;
        }
        self.last_evaluation = Some(now);

        let mut least: Option<(Millis, SlotId)> = None;
        let mut most: Option<(Millis, SlotId)> = None;
        for unit in units.iter().map(AsRef::as_ref).filter(|unit| unit.enabled) {
            let runtime = unit.stats.accumulated_runtime;
            if least.is_none_or(|(min, _)| runtime < min) {
                least = Some((runtime, unit.id()));
            }
            if most.is_none_or(|(max, _)| runtime > max) {
                most = Some((runtime, unit.id()));
            }
        }

        let (Some((min_runtime, lead)), Some((max_runtime, lag))) = (least, most) else {
            return;
        };
        if max_runtime - min_runtime <= self.balance_threshold {
            return;
        }
        debug!("rotation: lead {} lag {} spread {} ms", lead, lag, max_runtime - min_runtime);
        self.state = RotationState {
            lead: Some(lead),
            lag: Some(lag),
            last_rotation: Some(now),
        };
    }

    /// Drops the designation, e.g. when runtime balancing is switched off.
    pub fn clear(&mut self) {
        self.state = RotationState::default();
        self.last_evaluation = None;
    }
}
