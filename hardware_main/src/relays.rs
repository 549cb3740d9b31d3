//! Contactor outputs for the compressors and condenser fan banks.

use embassy_stm32::gpio::Output;

use business_logic::config::{MAX_COMPRESSORS, MAX_CONDENSERS};
use business_logic::{ActuationError, ActuationPort, SlotId, UnitKind};

use crate::fmt::debug;

/// One push-pull output per contactor coil, high energizes.
pub struct RelayBank {
    compressors: [Output<'static>; MAX_COMPRESSORS],
    condensers: [Output<'static>; MAX_CONDENSERS],
}

impl RelayBank {
    pub fn new(compressors: [Output<'static>; MAX_COMPRESSORS], condensers: [Output<'static>; MAX_CONDENSERS]) -> Self {
        Self { compressors, condensers }
    }

    fn output(&mut self, kind: UnitKind, slot: SlotId) -> Option<&mut Output<'static>> {
        match kind {
            UnitKind::Compressor => self.compressors.get_mut(usize::from(slot)),
            UnitKind::CondenserBank => self.condensers.get_mut(usize::from(slot)),
        }
    }

    /// De-energizes every coil. Used at boot before the engine takes over.
    pub fn all_off(&mut self) {
        for output in self.compressors.iter_mut().chain(self.condensers.iter_mut()) {
            output.set_low();
        }
    }
}

impl ActuationPort for RelayBank {
    fn set_unit_power(&mut self, kind: UnitKind, slot: SlotId, on: bool) -> Result<(), ActuationError> {
        let output = self.output(kind, slot).ok_or(ActuationError::Bus)?;
        if on {
            output.set_high();
        } else {
            output.set_low();
        }
        // Read back the output data register.
        if output.is_set_high() != on {
            return Err(ActuationError::NotConfirmed);
        }
        debug!("relay {:?} {} -> {}", kind, slot, on);
        Ok(())
    }
}
