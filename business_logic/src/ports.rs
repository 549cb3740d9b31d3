//! Boundaries between the engine and the rest of the firmware: the relay
//! driver it commands and the alarm/telemetry aggregator it reports to.

use arrayvec::ArrayVec;
use core::fmt;

use crate::maintenance::MaintenanceState;
use crate::unit::{SlotId, UnitKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ActuationError {
    /// The output was driven but did not read back at the commanded level.
    NotConfirmed,
    /// The driver could not reach the output at all.
    Bus,
}

impl fmt::Display for ActuationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ActuationError::NotConfirmed => f.write_str("output did not confirm the commanded level"),
            ActuationError::Bus => f.write_str("output driver unreachable"),
        }
    }
}

/// The sole path to physical hardware. Calls must be idempotent: the engine
/// re-issues a failed command on a later cycle rather than retrying.
pub trait ActuationPort {
    fn set_unit_power(&mut self, kind: UnitKind, slot: SlotId, on: bool) -> Result<(), ActuationError>;
}

/// Discrete events for the alarm/telemetry aggregator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum PlantEvent {
    EmergencyStopActivated,
    /// A kind's target has gone unmet for `cycles` consecutive cycles with no
    /// eligible unit to act on.
    ConvergenceStalled { kind: UnitKind, cycles: u32 },
    MaintenanceDue { slot: SlotId, state: MaintenanceState },
    ActuationFailed { kind: UnitKind, slot: SlotId },
    UnitFaulted { kind: UnitKind, slot: SlotId },
}

pub trait EventSink {
    fn emit(&mut self, event: PlantEvent);
}

/// Collects events for the host to forward after the tick. Events beyond the
/// capacity are dropped.
impl<const N: usize> EventSink for ArrayVec<PlantEvent, N> {
    fn emit(&mut self, event: PlantEvent) {
        let _ = self.try_push(event);
    }
}

/// Discards every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct IgnoreEvents;

impl EventSink for IgnoreEvents {
    fn emit(&mut self, _event: PlantEvent) {}
}

#[cfg(test)]
impl EventSink for std::vec::Vec<PlantEvent> {
    fn emit(&mut self, event: PlantEvent) {
        self.push(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_array_sink_drops_overflow() {
        let mut sink: ArrayVec<PlantEvent, 2> = ArrayVec::new();
        sink.emit(PlantEvent::EmergencyStopActivated);
        sink.emit(PlantEvent::ActuationFailed { kind: UnitKind::Compressor, slot: 1 });
        sink.emit(PlantEvent::UnitFaulted { kind: UnitKind::CondenserBank, slot: 0 });
        assert_eq!(sink.len(), 2);
        assert_eq!(sink[0], PlantEvent::EmergencyStopActivated);
    }
}
