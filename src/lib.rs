//! Biblioteca Rust para el acelerómetro y giroscopio InvenSense MPU9250
//!
//! Esta biblioteca proporciona un driver por registros sobre SPI y un bucle de
//! adquisición que muestrea a frecuencia fija y entrega segmentos de duración
//! fija, cada uno con sus metadatos de canal, a un sumidero.

use embedded_hal::spi::SpiDevice;

// Importaciones internas
pub mod acquisition;
pub mod base;
pub mod config;
pub mod conversion;
pub mod device;
pub mod interface;
pub mod register;
pub mod sink;
pub mod types;

// Re-exports públicos
pub use acquisition::{AcquisitionError, Recorder, RunSummary, Segment, SensorSource};
pub use config::{AcquisitionConfig, Measurement, PartialWindow, SpiSettings};
pub use conversion::{raw_to_physical, temp_raw_to_celsius};
pub use device::{Mpu9250, Mpu9250Error};
pub use sink::{CsvSegmentSink, MemorySink, SegmentSink};
pub use types::{AccelFullScale, GyroFullScale, PhysicalSample, SensorGroup};

use crate::interface::SpiInterface;

/// Crea un nuevo dispositivo MPU9250 usando un dispositivo SPI
pub fn new_spi_device<SPI: SpiDevice>(spi: SPI) -> Mpu9250<SpiInterface<SPI>> {
    Mpu9250::new(SpiInterface::new(spi))
}

/// Abre el nodo spidev indicado y crea el driver sobre él
#[cfg(feature = "linux")]
pub fn open(
    settings: &SpiSettings,
) -> Result<Mpu9250<SpiInterface<linux_embedded_hal::SpidevDevice>>, Mpu9250Error> {
    let interface = interface::open_spidev(settings)?;
    Ok(Mpu9250::new(interface))
}
