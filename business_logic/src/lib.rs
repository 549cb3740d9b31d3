#![cfg_attr(not(test), no_std)]
//! Equipment staging and condenser selection for a chiller plant.
//!
//! The host owns a [`ChillerPlant`], feeds it demand, configuration and the
//! current time, and calls [`ChillerPlant::tick`] once per control period.
//! Relay commands leave through an [`ActuationPort`], alarms through an
//! [`EventSink`].

mod fmt;

pub mod capacity;
pub mod config;
pub mod maintenance;
pub mod plant;
pub mod pool;
pub mod ports;
pub mod rotation;
pub mod selection;
pub mod staging;
pub mod status;
pub mod timestamp;
pub mod unit;

pub use capacity::{CapacityTarget, Tier, translate};
pub use config::{ConfigError, EquipmentConfig, StagingTiming};
pub use maintenance::{MaintenanceRecord, MaintenanceState};
pub use plant::ChillerPlant;
pub use ports::{ActuationError, ActuationPort, EventSink, IgnoreEvents, PlantEvent};
pub use selection::{AmbientZone, SelectionAlgorithm, SelectionWeights};
pub use staging::{KindState, StagingAction, StagingAlgorithm, StagingOutcome};
pub use status::{KindStatus, PlantStatus, UnitStatus};
pub use timestamp::{Timestamp, TimestampError};
pub use unit::{SlotId, UnitKind, UnitMode, UnitState, UnitStatistics};
