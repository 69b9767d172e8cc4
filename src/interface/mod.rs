//! Módulo de abstracción para la interfaz de comunicación con el MPU9250
//!
//! El driver sólo necesita una primitiva: una transferencia full-duplex donde el
//! byte 0 es el opcode (dirección + bit de lectura/escritura) y el resto son datos
//! o relleno. La respuesta tiene la misma longitud y su byte 0 se descarta.

use embedded_hal::spi::{Error as _, ErrorKind, SpiDevice};

pub mod claim;
#[cfg(test)]
pub(crate) mod mock;

pub use claim::BusClaim;

#[cfg(feature = "linux")]
use crate::config::SpiSettings;
#[cfg(feature = "linux")]
use linux_embedded_hal::{
    spidev::{SpiModeFlags, SpidevOptions},
    SpidevDevice,
};

/// Error genérico para interfaces de comunicación
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum InterfaceError {
    /// Error de comunicación SPI
    #[error("error de comunicación SPI: {0:?}")]
    Spi(ErrorKind),
    /// Error al abrir o configurar el nodo de dispositivo
    #[error("error de E/S en el bus: {0}")]
    Io(String),
    /// El par bus/chip-select ya pertenece a otro driver
    #[error("el bus SPI {bus}.{chip_select} ya está en uso")]
    BusBusy { bus: u8, chip_select: u8 },
    /// Parámetro inválido
    #[error("parámetro inválido para la transferencia")]
    InvalidParameter,
    /// Modo SPI fuera de 0-3
    #[error("modo SPI inválido: {0} (admitidos 0-3)")]
    InvalidMode(u8),
}

/// Trait para abstraer la comunicación con el dispositivo MPU9250
pub trait Interface {
    /// Tipo de error que puede producir la interfaz
    type Error;

    /// Transfiere `buffer` y lo sobrescribe con la respuesta (misma longitud)
    fn transfer(&mut self, buffer: &mut [u8]) -> Result<(), Self::Error>;
}

/// Implementación de Interface para un dispositivo SPI
///
/// El chip-select lo gestiona el propio `SpiDevice`, de modo que cada
/// transferencia es una única transacción con CS activo.
pub struct SpiInterface<SPI> {
    spi: SPI,
    claim: Option<BusClaim>,
}

impl<SPI: SpiDevice> SpiInterface<SPI> {
    /// Crea una nueva interfaz SPI
    pub fn new(spi: SPI) -> Self {
        Self { spi, claim: None }
    }

    /// Crea una interfaz que mantiene reservado el bus mientras viva
    pub fn with_claim(spi: SPI, claim: BusClaim) -> Self {
        Self {
            spi,
            claim: Some(claim),
        }
    }

    /// Bus/chip-select reservado por esta interfaz, si lo hay
    pub fn claim(&self) -> Option<&BusClaim> {
        self.claim.as_ref()
    }

    /// Consume la interfaz, libera la reserva y devuelve el dispositivo SPI
    pub fn release(self) -> SPI {
        self.spi
    }
}

impl<SPI: SpiDevice> Interface for SpiInterface<SPI> {
    type Error = InterfaceError;

    fn transfer(&mut self, buffer: &mut [u8]) -> Result<(), Self::Error> {
        if buffer.is_empty() {
            return Err(InterfaceError::InvalidParameter);
        }

        self.spi
            .transfer_in_place(buffer)
            .map_err(|e| InterfaceError::Spi(e.kind()))
    }
}

/// Abre `/dev/spidev<bus>.<cs>` con los parámetros eléctricos indicados
///
/// El par bus/chip-select queda reservado hasta que se suelte la interfaz.
#[cfg(feature = "linux")]
pub fn open_spidev(settings: &SpiSettings) -> Result<SpiInterface<SpidevDevice>, InterfaceError> {
    let mode = mode_flags(settings.mode)?;
    let claim = BusClaim::acquire(settings.bus, settings.chip_select)?;

    let path = settings.device_path();
    let mut spi = SpidevDevice::open(&path)
        .map_err(|e| InterfaceError::Io(format!("{}: {:?}", path, e)))?;

    let options = SpidevOptions::new()
        .bits_per_word(8)
        .max_speed_hz(settings.speed_hz)
        .mode(mode)
        .build();
    spi.configure(&options)
        .map_err(|e| InterfaceError::Io(format!("{}: {}", path, e)))?;

    log::debug!(
        "{} abierto a {} Hz, modo {}",
        path,
        settings.speed_hz,
        settings.mode
    );

    Ok(SpiInterface::with_claim(spi, claim))
}

#[cfg(feature = "linux")]
fn mode_flags(mode: u8) -> Result<SpiModeFlags, InterfaceError> {
    match mode {
        0 => Ok(SpiModeFlags::SPI_MODE_0),
        1 => Ok(SpiModeFlags::SPI_MODE_1),
        2 => Ok(SpiModeFlags::SPI_MODE_2),
        3 => Ok(SpiModeFlags::SPI_MODE_3),
        other => Err(InterfaceError::InvalidMode(other)),
    }
}
