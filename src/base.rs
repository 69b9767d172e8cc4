//! Funcionalidades y traits base: fuentes de tiempo y marcas temporales

use std::cell::Cell;
use std::fmt;
use std::rc::Rc;
use std::time::{Instant, SystemTime, UNIX_EPOCH};

use embedded_hal::delay::DelayNs;

/// Trait para obtener marcas de tiempo en microsegundos.
/// Permite implementar diferentes fuentes (sistema o simulada).
pub trait TimeSource {
    /// Reloj de pared: microsegundos desde la época UNIX
    fn get_timestamp_us(&self) -> u64;

    /// Reloj monotónico en microsegundos, de origen arbitrario
    fn monotonic_us(&self) -> u64;
}

/// Implementación por defecto usando los relojes del sistema.
pub struct SystemTimeSource {
    origin: Instant,
}

impl SystemTimeSource {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for SystemTimeSource {
    fn default() -> Self {
        Self::new()
    }
}

impl TimeSource for SystemTimeSource {
    fn get_timestamp_us(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_micros() as u64
    }

    fn monotonic_us(&self) -> u64 {
        self.origin.elapsed().as_micros() as u64
    }
}

/// Reloj manual: el tiempo sólo avanza con `advance` o al esperar con `DelayNs`.
///
/// Los clones comparten el mismo instante, de modo que un clon puede usarse como
/// fuente de tiempo y otro como retardo.
#[derive(Debug, Clone)]
pub struct ManualClock {
    now_us: Rc<Cell<u64>>,
}

impl ManualClock {
    pub fn new(start_unix_us: u64) -> Self {
        Self {
            now_us: Rc::new(Cell::new(start_unix_us)),
        }
    }

    pub fn advance(&self, us: u64) {
        self.now_us.set(self.now_us.get() + us);
    }

    pub fn now_us(&self) -> u64 {
        self.now_us.get()
    }
}

impl TimeSource for ManualClock {
    fn get_timestamp_us(&self) -> u64 {
        self.now_us.get()
    }

    fn monotonic_us(&self) -> u64 {
        self.now_us.get()
    }
}

impl DelayNs for ManualClock {
    fn delay_ns(&mut self, ns: u32) {
        self.advance(ns as u64 / 1_000);
    }

    fn delay_us(&mut self, us: u32) {
        self.advance(us as u64);
    }

    fn delay_ms(&mut self, ms: u32) {
        self.advance(ms as u64 * 1_000);
    }
}

/// Instante UTC con resolución de microsegundos
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Timestamp {
    unix_us: u64,
}

impl Timestamp {
    pub fn from_unix_us(unix_us: u64) -> Self {
        Self { unix_us }
    }

    pub fn now<T: TimeSource + ?Sized>(source: &T) -> Self {
        Self::from_unix_us(source.get_timestamp_us())
    }

    pub fn unix_us(&self) -> u64 {
        self.unix_us
    }

    /// Desplaza el instante `us` microsegundos hacia delante
    pub fn offset_us(&self, us: u64) -> Self {
        Self::from_unix_us(self.unix_us + us)
    }

    /// Etiqueta para nombres de fichero: `YYYY_MM_DD_THH_MM_SS.ffffff`
    pub fn label(&self) -> String {
        let c = self.civil();
        format!(
            "{:04}_{:02}_{:02}_T{:02}_{:02}_{:02}.{:06}",
            c.year, c.month, c.day, c.hour, c.minute, c.second, c.micros
        )
    }

    fn civil(&self) -> Civil {
        let secs = self.unix_us / 1_000_000;
        let micros = (self.unix_us % 1_000_000) as u32;
        let days = (secs / 86_400) as i64;
        let rem = (secs % 86_400) as u32;
        let (year, month, day) = civil_from_days(days);

        Civil {
            year,
            month,
            day,
            hour: rem / 3_600,
            minute: (rem % 3_600) / 60,
            second: rem % 60,
            micros,
        }
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let c = self.civil();
        write!(
            f,
            "{:04}-{:02}-{:02}T{:02}:{:02}:{:02}.{:06}Z",
            c.year, c.month, c.day, c.hour, c.minute, c.second, c.micros
        )
    }
}

struct Civil {
    year: i64,
    month: u32,
    day: u32,
    hour: u32,
    minute: u32,
    second: u32,
    micros: u32,
}

// Días desde 1970-01-01 a fecha del calendario gregoriano proléptico
fn civil_from_days(days: i64) -> (i64, u32, u32) {
    let z = days + 719_468;
    let era = (if z >= 0 { z } else { z - 146_096 }) / 146_097;
    let doe = (z - era * 146_097) as u64;
    let yoe = (doe - doe / 1_460 + doe / 36_524 - doe / 146_096) / 365;
    let doy = doe - (365 * yoe + yoe / 4 - yoe / 100);
    let mp = (5 * doy + 2) / 153;
    let day = (doy - (153 * mp + 2) / 5 + 1) as u32;
    let month = (if mp < 10 { mp + 3 } else { mp - 9 }) as u32;
    let year = yoe as i64 + era * 400;

    (if month <= 2 { year + 1 } else { year }, month, day)
}
