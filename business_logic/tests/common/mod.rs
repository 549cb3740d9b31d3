#![allow(dead_code)]

use business_logic::{ActuationError, ActuationPort, EventSink, PlantEvent, SlotId, Timestamp, UnitKind};

/// One relay command as seen by the port.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Command {
    pub kind: UnitKind,
    pub slot: SlotId,
    pub on: bool,
}

/// Fake relay bank: records every command and can be told to reject one slot.
#[derive(Debug, Default)]
pub struct RecordingPort {
    pub commands: Vec<Command>,
    pub reject: Option<(UnitKind, SlotId)>,
}

impl ActuationPort for RecordingPort {
    fn set_unit_power(&mut self, kind: UnitKind, slot: SlotId, on: bool) -> Result<(), ActuationError> {
        if self.reject == Some((kind, slot)) {
            return Err(ActuationError::NotConfirmed);
        }
        self.commands.push(Command { kind, slot, on });
        Ok(())
    }
}

impl RecordingPort {
    pub fn starts(&self, kind: UnitKind) -> Vec<SlotId> {
        self.commands
            .iter()
            .filter(|command| command.kind == kind && command.on)
            .map(|command| command.slot)
            .collect()
    }
}

pub fn millis(millis: u64) -> Timestamp {
    Timestamp::from_millis(millis)
}

/// Unbounded event sink for tests.
#[derive(Debug, Default)]
pub struct EventLog(pub Vec<PlantEvent>);

impl EventSink for EventLog {
    fn emit(&mut self, event: PlantEvent) {
        self.0.push(event);
    }
}
