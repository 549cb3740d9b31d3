//! Maintenance due-date and efficiency tracking for condenser banks.

use arrayvec::ArrayString;
use core::fmt::Write;

use crate::config::{MAINTENANCE_CHECK_PERIOD, MAINTENANCE_EFFICIENCY_THRESHOLD, MAINTENANCE_INTERVAL, MAINTENANCE_LOOKAHEAD};
use crate::fmt::info;
use crate::ports::{EventSink, PlantEvent};
use crate::timestamp::{Millis, Timestamp};
use crate::unit::{CondenserBank, NOMINAL_EFFICIENCY};

pub const MAINTENANCE_NOTE_LEN: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum MaintenanceState {
    #[default]
    Ok,
    DueSoon,
    DueNow,
    Critical,
    InProgress,
}

impl MaintenanceState {
    /// States worth raising to the alarm aggregator.
    pub fn needs_attention(&self) -> bool {
        matches!(self, MaintenanceState::DueSoon | MaintenanceState::DueNow | MaintenanceState::Critical)
    }

    /// Whether a unit in this state may be proposed for starting.
    pub fn allows_start(&self) -> bool {
        !matches!(self, MaintenanceState::Critical | MaintenanceState::InProgress)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MaintenanceRecord {
    pub last_service: Option<Timestamp>,
    pub next_due: Timestamp,
    pub state: MaintenanceState,
    pub cycle_count: u32,
    pub notes: ArrayString<MAINTENANCE_NOTE_LEN>,
}

impl MaintenanceRecord {
    /// A record for a unit commissioned at `now`, first due one interval later.
    pub fn new(now: Timestamp, service_interval: Millis) -> Self {
        Self {
            last_service: None,
            next_due: now.saturating_add(service_interval),
            state: MaintenanceState::Ok,
            cycle_count: 0,
            notes: ArrayString::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct MaintenanceScheduler {
    check_period: Millis,
    lookahead: Millis,
    service_interval: Millis,
    efficiency_threshold: f32,
    last_check: Option<Timestamp>,
}

impl Default for MaintenanceScheduler {
    fn default() -> Self {
        Self {
            check_period: MAINTENANCE_CHECK_PERIOD,
            lookahead: MAINTENANCE_LOOKAHEAD,
            service_interval: MAINTENANCE_INTERVAL,
            efficiency_threshold: MAINTENANCE_EFFICIENCY_THRESHOLD,
            last_check: None,
        }
    }
}

impl MaintenanceScheduler {
    pub fn service_interval(&self) -> Millis {
        self.service_interval
    }

    pub fn last_check(&self) -> Option<Timestamp> {
        self.last_check
    }

    /// The state a bank should be in at `now`. `InProgress` is sticky until the
    /// work is completed.
    pub fn assess(&self, bank: &CondenserBank, now: Timestamp) -> MaintenanceState {
        let record = &bank.maintenance;
        if record.state == MaintenanceState::InProgress {
            return MaintenanceState::InProgress;
        }
        if bank.performance_valid && bank.efficiency_rating < self.efficiency_threshold {
            return MaintenanceState::Critical;
        }
        if now > record.next_due {
            MaintenanceState::DueNow
        } else if record.next_due.elapsed_since(now) < self.lookahead {
            MaintenanceState::DueSoon
        } else {
            MaintenanceState::Ok
        }
    }

    /// Re-assesses every bank if the check period has passed. Emits
    /// `MaintenanceDue` for each bank entering a state that needs attention.
    pub fn run<E: EventSink + ?Sized>(&mut self, banks: &mut [CondenserBank], now: Timestamp, events: &mut E) {
        if !now.has_elapsed(self.last_check, self.check_period) {
            return;
        }
        self.last_check = Some(now);
        for bank in banks.iter_mut().filter(|bank| bank.unit.enabled) {
            let state = self.assess(bank, now);
            if state != bank.maintenance.state {
                info!("condenser {} maintenance {:?} -> {:?}", bank.unit.id(), bank.maintenance.state, state);
                bank.maintenance.state = state;
                if state.needs_attention() {
                    events.emit(PlantEvent::MaintenanceDue { slot: bank.unit.id(), state });
                }
            }
        }
    }

    /// Marks service as started; the bank leaves the start candidates until
    /// `complete` is called.
    pub fn begin(&self, bank: &mut CondenserBank) {
        bank.maintenance.state = MaintenanceState::InProgress;
    }

    /// Records completed service. The next due date is one interval from now
    /// and the efficiency estimate returns to nominal until re-measured.
    pub fn complete(&self, bank: &mut CondenserBank, now: Timestamp, note: &str) {
        let record = &mut bank.maintenance;
        record.last_service = Some(now);
        record.next_due = now.saturating_add(self.service_interval);
        record.state = MaintenanceState::Ok;
        record.cycle_count = record.cycle_count.saturating_add(1);
        record.notes.clear();
        let _ = write!(&mut record.notes, "{}: ", now.create_iso8601_str());
        for ch in note.chars() {
            if record.notes.try_push(ch).is_err() {
                break;
            }
        }
        bank.efficiency_rating = NOMINAL_EFFICIENCY;
        bank.performance_valid = false;
        info!("condenser {} maintenance completed, cycle {}", bank.unit.id(), record.cycle_count);
    }
}
