//! Reserva de pares bus/chip-select dentro del proceso
//!
//! Sólo una transacción puede estar en curso en el bus físico, así que un par
//! bus/chip-select pertenece como mucho a un driver a la vez.

use std::collections::HashSet;
use std::sync::Mutex;

use once_cell::sync::Lazy;

use super::InterfaceError;

static CLAIMED: Lazy<Mutex<HashSet<(u8, u8)>>> = Lazy::new(|| Mutex::new(HashSet::new()));

/// Reserva exclusiva de un par bus/chip-select; se libera al soltarse
#[derive(Debug)]
pub struct BusClaim {
    bus: u8,
    chip_select: u8,
}

impl BusClaim {
    /// Reserva el par o falla con `BusBusy` si otro driver lo tiene
    pub fn acquire(bus: u8, chip_select: u8) -> Result<Self, InterfaceError> {
        let mut claimed = CLAIMED.lock().unwrap_or_else(|e| e.into_inner());
        if !claimed.insert((bus, chip_select)) {
            return Err(InterfaceError::BusBusy { bus, chip_select });
        }
        Ok(Self { bus, chip_select })
    }

    pub fn bus(&self) -> u8 {
        self.bus
    }

    pub fn chip_select(&self) -> u8 {
        self.chip_select
    }
}

impl Drop for BusClaim {
    fn drop(&mut self) {
        let mut claimed = CLAIMED.lock().unwrap_or_else(|e| e.into_inner());
        claimed.remove(&(self.bus, self.chip_select));
    }
}
