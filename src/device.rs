use crate::conversion::{decode_unsigned16, decode_xyz, temp_raw_to_celsius, xyz_to_physical};
use crate::interface::{Interface, InterfaceError};
use crate::register::{self, registers};
use crate::types::{defaults, AccelFullScale, GyroFullScale, PhysicalSample, SensorGroup};

/// Driver del MPU9250 sobre una interfaz de transferencia full-duplex
pub struct Mpu9250<I> {
    pub(crate) interface: I,
    pub(crate) scale: ScaleConfig,
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum Mpu9250Error {
    /// Escala completa fuera del conjunto admitido
    #[error("escala completa no admitida para el {group}: {value} (admitidas: {})", allowed(*.group))]
    InvalidConfig { group: SensorGroup, value: u16 },
    /// Número de bytes distinto del contrato de decodificación
    #[error("longitud inválida: se esperaban {expected} bytes, recibidos {actual}")]
    InvalidLength { expected: usize, actual: usize },
    /// Lectura antes de configurar la escala del grupo
    #[error("el {0} no está configurado: falta la escala completa")]
    NotConfigured(SensorGroup),
    /// Dirección que no cabe en 7 bits
    #[error("dirección de registro fuera de rango: {0:#04x}")]
    InvalidAddress(u8),
    #[error("WHO_AM_I inesperado: {0:#04x}")]
    UnexpectedWhoAmI(u8),
    /// Fallo en la transacción del bus
    #[error(transparent)]
    Interface(#[from] InterfaceError),
}

fn allowed(group: SensorGroup) -> String {
    let values: &[u16] = match group {
        SensorGroup::Accelerometer => &AccelFullScale::VALUES,
        SensorGroup::Gyroscope => &GyroFullScale::VALUES,
    };
    values
        .iter()
        .map(|v| v.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

impl Mpu9250Error {
    /// Errores del bus que pueden desaparecer al reintentar
    pub fn is_transient(&self) -> bool {
        matches!(self, Mpu9250Error::Interface(InterfaceError::Spi(_)))
    }
}

/// Escalas completas configuradas
///
/// La conversión de bruto a unidades físicas depende de la configuración previa,
/// no sólo de los bytes leídos; por eso el driver guarda el rango elegido.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScaleConfig {
    pub accel: Option<AccelFullScale>,
    pub gyro: Option<GyroFullScale>,
}

impl<I, E> Mpu9250<I>
where
    I: Interface<Error = E>,
    Mpu9250Error: From<E>,
{
    /// Create a new instance of Mpu9250
    pub fn new(interface: I) -> Self {
        Self {
            interface,
            scale: ScaleConfig::default(),
        }
    }

    /// Consume el driver y devuelve la interfaz
    pub fn close(self) -> I {
        self.interface
    }

    pub fn scale(&self) -> ScaleConfig {
        self.scale
    }

    /// Lee `count` registros consecutivos desde `reg` en una sola transacción
    ///
    /// Se transmite `[READ | reg, 0x00 * count]` y se descarta el primer byte
    /// de la respuesta.
    pub fn read_register_block(&mut self, reg: u8, count: usize) -> Result<Vec<u8>, Mpu9250Error> {
        if !register::is_valid_address(reg) {
            return Err(Mpu9250Error::InvalidAddress(reg));
        }

        let mut buffer = vec![0u8; count + 1];
        buffer[0] = register::read_opcode(reg);
        self.interface.transfer(&mut buffer)?;

        buffer.remove(0);
        Ok(buffer)
    }

    pub fn read_register(&mut self, reg: u8) -> Result<u8, Mpu9250Error> {
        let data = self.read_register_block(reg, 1)?;
        Ok(data[0])
    }

    /// Escribe un registro; la respuesta se descarta
    pub fn write_register(&mut self, reg: u8, value: u8) -> Result<(), Mpu9250Error> {
        if !register::is_valid_address(reg) {
            return Err(Mpu9250Error::InvalidAddress(reg));
        }

        let mut buffer = [register::write_opcode(reg), value];
        self.interface.transfer(&mut buffer)?;
        Ok(())
    }

    /// Configura la escala del acelerómetro (2, 4, 8 o 16 g) y ACCEL_CONFIG_2
    pub fn configure_accelerometer(
        &mut self,
        full_scale_g: u16,
        bandwidth_select: u8,
    ) -> Result<(), Mpu9250Error> {
        // Validar antes de tocar ningún registro
        let fs = AccelFullScale::try_from(full_scale_g)?;

        self.write_register(registers::ACCEL_CONFIG, fs.register_value())?;
        self.write_register(registers::ACCEL_CONFIG_2, bandwidth_select)?;
        self.scale.accel = Some(fs);

        log::debug!(
            "Acelerómetro configurado: ±{}g, ACCEL_CONFIG_2={:#010b}",
            fs.value(),
            bandwidth_select
        );
        Ok(())
    }

    /// Configura la escala del giroscopio (250, 500, 1000 o 2000 dps) y el DLPF
    pub fn configure_gyroscope(
        &mut self,
        full_scale_dps: u16,
        filter_select: u8,
    ) -> Result<(), Mpu9250Error> {
        let fs = GyroFullScale::try_from(full_scale_dps)?;

        self.write_register(registers::CONFIG, filter_select)?;
        self.write_register(registers::GYRO_CONFIG, fs.register_value())?;
        self.scale.gyro = Some(fs);

        log::debug!(
            "Giroscopio configurado: ±{}dps, CONFIG={:#010b}",
            fs.value(),
            filter_select
        );
        Ok(())
    }

    /// Read accelerometer data from hardware registers
    pub fn accel_read_raw(&mut self) -> Result<[i16; 3], Mpu9250Error> {
        let data = self.read_register_block(registers::ACCEL_XOUT_H, 6)?;
        decode_xyz(&data)
    }

    /// Read gyroscope data from hardware registers
    pub fn gyro_read_raw(&mut self) -> Result<[i16; 3], Mpu9250Error> {
        let data = self.read_register_block(registers::GYRO_XOUT_H, 6)?;
        decode_xyz(&data)
    }

    /// Valor bruto de temperatura, combinado sin signo
    pub fn temp_read_raw(&mut self) -> Result<u16, Mpu9250Error> {
        let data = self.read_register_block(registers::TEMP_OUT_H, 2)?;
        decode_unsigned16(&data)
    }

    /// Lee la aceleración en g usando la escala configurada
    pub fn read_acceleration(&mut self) -> Result<PhysicalSample, Mpu9250Error> {
        let fs = self
            .scale
            .accel
            .ok_or(Mpu9250Error::NotConfigured(SensorGroup::Accelerometer))?;
        let raw = self.accel_read_raw()?;
        Ok(xyz_to_physical(raw, fs.value() as f64))
    }

    /// Lee la velocidad angular en grados/segundo usando la escala configurada
    pub fn read_angular_rate(&mut self) -> Result<PhysicalSample, Mpu9250Error> {
        let fs = self
            .scale
            .gyro
            .ok_or(Mpu9250Error::NotConfigured(SensorGroup::Gyroscope))?;
        let raw = self.gyro_read_raw()?;
        Ok(xyz_to_physical(raw, fs.value() as f64))
    }

    /// Lee la temperatura en grados Celsius
    pub fn read_temperature(&mut self) -> Result<f64, Mpu9250Error> {
        let raw = self.temp_read_raw()?;
        Ok(temp_raw_to_celsius(raw))
    }

    pub fn who_am_i(&mut self) -> Result<u8, Mpu9250Error> {
        self.read_register(registers::WHO_AM_I)
    }

    /// Comprueba que el dispositivo responde con el identificador del MPU9250
    pub fn verify_who_am_i(&mut self) -> Result<(), Mpu9250Error> {
        match self.who_am_i()? {
            defaults::WHO_AM_I => Ok(()),
            other => Err(Mpu9250Error::UnexpectedWhoAmI(other)),
        }
    }

    /// Saca el chip del modo sleep
    pub fn wake(&mut self) -> Result<(), Mpu9250Error> {
        self.write_register(registers::PWR_MGMT_1, defaults::PWR_MGMT_1_AWAKE)
    }

    /// SMPLRT_DIV: ODR interno = 1kHz / (1 + div) con el DLPF activo
    pub fn set_sample_rate_divider(&mut self, div: u8) -> Result<(), Mpu9250Error> {
        self.write_register(registers::SMPLRT_DIV, div)
    }
}
