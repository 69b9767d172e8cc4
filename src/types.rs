//! Definiciones de tipos y constantes comunes para el MPU9250

use core::fmt;

use crate::device::Mpu9250Error;

/// Grupo de sensores con escala configurable
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SensorGroup {
    Accelerometer,
    Gyroscope,
}

impl fmt::Display for SensorGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SensorGroup::Accelerometer => f.write_str("acelerómetro"),
            SensorGroup::Gyroscope => f.write_str("giroscopio"),
        }
    }
}

/// Escalas completas disponibles para el acelerómetro
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum AccelFullScale {
    /// ±2g
    Fs2G = 0,
    /// ±4g
    Fs4G = 1,
    /// ±8g
    Fs8G = 2,
    /// ±16g
    Fs16G = 3,
}

impl AccelFullScale {
    /// Valores admitidos, en g, en orden de índice
    pub const VALUES: [u16; 4] = [2, 4, 8, 16];

    /// Índice 0-3 que se codifica en el registro
    pub fn index(self) -> u8 {
        self as u8
    }

    /// Valor del registro ACCEL_CONFIG (índice en los bits 3-4)
    pub fn register_value(self) -> u8 {
        self.index() << 3
    }

    /// Rango en g
    pub fn value(self) -> u16 {
        Self::VALUES[self.index() as usize]
    }
}

impl Default for AccelFullScale {
    fn default() -> Self {
        AccelFullScale::Fs16G
    }
}

impl TryFrom<u16> for AccelFullScale {
    type Error = Mpu9250Error;

    fn try_from(value: u16) -> Result<Self, Self::Error> {
        match value {
            2 => Ok(AccelFullScale::Fs2G),
            4 => Ok(AccelFullScale::Fs4G),
            8 => Ok(AccelFullScale::Fs8G),
            16 => Ok(AccelFullScale::Fs16G),
            _ => Err(Mpu9250Error::InvalidConfig {
                group: SensorGroup::Accelerometer,
                value,
            }),
        }
    }
}

/// Escalas completas disponibles para el giroscopio
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum GyroFullScale {
    /// ±250 dps
    Fs250Dps = 0,
    /// ±500 dps
    Fs500Dps = 1,
    /// ±1000 dps
    Fs1000Dps = 2,
    /// ±2000 dps
    Fs2000Dps = 3,
}

impl GyroFullScale {
    /// Valores admitidos, en grados/segundo, en orden de índice
    pub const VALUES: [u16; 4] = [250, 500, 1000, 2000];

    pub fn index(self) -> u8 {
        self as u8
    }

    /// Valor del registro GYRO_CONFIG (índice en los bits 3-4)
    pub fn register_value(self) -> u8 {
        self.index() << 3
    }

    /// Rango en grados/segundo
    pub fn value(self) -> u16 {
        Self::VALUES[self.index() as usize]
    }
}

impl Default for GyroFullScale {
    fn default() -> Self {
        GyroFullScale::Fs250Dps
    }
}

impl TryFrom<u16> for GyroFullScale {
    type Error = Mpu9250Error;

    fn try_from(value: u16) -> Result<Self, Self::Error> {
        match value {
            250 => Ok(GyroFullScale::Fs250Dps),
            500 => Ok(GyroFullScale::Fs500Dps),
            1000 => Ok(GyroFullScale::Fs1000Dps),
            2000 => Ok(GyroFullScale::Fs2000Dps),
            _ => Err(Mpu9250Error::InvalidConfig {
                group: SensorGroup::Gyroscope,
                value,
            }),
        }
    }
}

/// Muestra de tres ejes en unidades físicas (g o grados/segundo)
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PhysicalSample {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl PhysicalSample {
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }
}

/// Valores por defecto de registros
pub mod defaults {
    /// ACCEL_CONFIG_2: BW=99Hz, rate=1kHz
    pub const ACCEL_CONFIG_2: u8 = 0b0000_1010;
    /// CONFIG: BW=92Hz, FS=1kHz
    pub const GYRO_DLPF_CONFIG: u8 = 0b0000_0010;
    /// Valor esperado en WHO_AM_I
    pub const WHO_AM_I: u8 = 0x71;
    /// PWR_MGMT_1 con el chip despierto y oscilador interno
    pub const PWR_MGMT_1_AWAKE: u8 = 0x00;
}
