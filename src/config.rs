//! Configuración de la adquisición y del bus SPI
//!
//! Los valores por defecto reproducen la estación de registro original:
//! 256 s de grabación a 1 Hz en segmentos de 64 s, acelerómetro a ±16 g.

use std::path::PathBuf;

use crate::types::defaults;

/// Parámetros eléctricos del bus SPI
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpiSettings {
    pub bus: u8,
    pub chip_select: u8,
    pub speed_hz: u32,
    /// Modo SPI 0-3 (CPOL/CPHA)
    pub mode: u8,
}

impl Default for SpiSettings {
    fn default() -> Self {
        Self {
            bus: 0,
            chip_select: 0,
            speed_hz: 1_000_000,
            mode: 0,
        }
    }
}

impl SpiSettings {
    /// Nodo de dispositivo spidev correspondiente
    pub fn device_path(&self) -> String {
        format!("/dev/spidev{}.{}", self.bus, self.chip_select)
    }
}

/// Magnitud registrada en los tres ejes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Measurement {
    #[default]
    Acceleration,
    AngularRate,
}

impl Measurement {
    /// Prefijo del nombre de canal
    pub fn channel_prefix(&self) -> &'static str {
        match self {
            Measurement::Acceleration => "AC",
            Measurement::AngularRate => "GY",
        }
    }
}

/// Qué hacer con una ventana incompleta al terminar la grabación
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PartialWindow {
    /// Emitir un segmento truncado con las muestras tomadas
    #[default]
    Flush,
    /// Descartar las muestras de la ventana incompleta
    Discard,
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConfigError {
    #[error("falta el valor para {0}")]
    MissingValue(String),
    #[error("valor inválido para {flag}: {value}")]
    InvalidValue { flag: String, value: String },
    #[error("argumento desconocido: {0}")]
    UnknownArgument(String),
    #[error("{name} debe ser positivo y finito (recibido {value})")]
    NonPositive { name: &'static str, value: f64 },
    #[error("la ventana no contiene ninguna muestra: segmento {segment_seconds} s a {sample_rate_hz} Hz")]
    EmptyWindow {
        segment_seconds: f64,
        sample_rate_hz: f64,
    },
    #[error("modo SPI inválido: {0} (admitidos 0-3)")]
    InvalidSpiMode(u8),
    #[error("se solicitó la ayuda")]
    HelpRequested,
}

/// Configuración completa de una grabación
#[derive(Debug, Clone, PartialEq)]
pub struct AcquisitionConfig {
    /// Duración total de la grabación (s)
    pub duration_seconds: f64,
    /// Frecuencia de muestreo nominal (Hz)
    pub sample_rate_hz: f64,
    /// Duración de cada segmento (s)
    pub segment_seconds: f64,
    pub measurement: Measurement,
    pub accel_full_scale: u16,
    pub accel_bandwidth: u8,
    pub gyro_full_scale: u16,
    pub gyro_filter: u8,
    /// Registrar la temperatura como canal acompañante
    pub record_temperature: bool,
    pub partial_window: PartialWindow,
    /// Reintentos ante errores transitorios del bus por muestra
    pub retries: u8,
    pub network: String,
    pub station: String,
    pub data_quality: char,
    pub output_dir: PathBuf,
    pub spi: SpiSettings,
}

impl Default for AcquisitionConfig {
    fn default() -> Self {
        Self {
            duration_seconds: 256.0,
            sample_rate_hz: 1.0,
            segment_seconds: 64.0,
            measurement: Measurement::default(),
            accel_full_scale: 16,
            accel_bandwidth: defaults::ACCEL_CONFIG_2,
            gyro_full_scale: 250,
            gyro_filter: defaults::GYRO_DLPF_CONFIG,
            record_temperature: false,
            partial_window: PartialWindow::default(),
            retries: 0,
            network: "MBA_PI".to_string(),
            station: "08_MPU".to_string(),
            data_quality: 'D',
            output_dir: PathBuf::from("."),
            spi: SpiSettings::default(),
        }
    }
}

impl AcquisitionConfig {
    /// Muestras por segmento
    pub fn window_length(&self) -> usize {
        (self.segment_seconds * self.sample_rate_hz).round() as usize
    }

    /// Muestras de toda la grabación
    pub fn total_samples(&self) -> u64 {
        (self.duration_seconds * self.sample_rate_hz).round() as u64
    }

    /// Periodo nominal entre muestras en microsegundos
    pub fn sample_period_us(&self) -> u64 {
        (1_000_000.0 / self.sample_rate_hz).round() as u64
    }

    fn timing(&self) -> [(&'static str, f64); 3] {
        [
            ("duration", self.duration_seconds),
            ("sample rate", self.sample_rate_hz),
            ("segment", self.segment_seconds),
        ]
    }

    /// Valida y avisa de los tiempos que no son potencia de 2
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.check()?;
        for (name, value) in self.non_power_of_two() {
            log::warn!("{} = {} no es potencia de 2", name, value);
        }
        Ok(())
    }

    /// Tiempos que no son potencia de 2 (válidos, pero sólo con aviso)
    pub fn non_power_of_two(&self) -> Vec<(&'static str, f64)> {
        self.timing()
            .into_iter()
            .filter(|(_, value)| value.log2().fract() != 0.0)
            .collect()
    }

    /// Comprobaciones sin efectos secundarios
    pub fn check(&self) -> Result<(), ConfigError> {
        for (name, value) in self.timing() {
            if !value.is_finite() || value <= 0.0 {
                return Err(ConfigError::NonPositive { name, value });
            }
        }

        if self.window_length() == 0 {
            return Err(ConfigError::EmptyWindow {
                segment_seconds: self.segment_seconds,
                sample_rate_hz: self.sample_rate_hz,
            });
        }

        if self.spi.mode > 3 {
            return Err(ConfigError::InvalidSpiMode(self.spi.mode));
        }

        Ok(())
    }

    /// Construye la configuración a partir de los argumentos (sin el nombre del programa)
    pub fn from_args<I, S>(args: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut config = Self::default();
        let mut args = args.into_iter().map(Into::into);

        while let Some(flag) = args.next() {
            match flag.as_str() {
                "-h" | "--help" => return Err(ConfigError::HelpRequested),
                "--gyro" => config.measurement = Measurement::AngularRate,
                "--temperature" => config.record_temperature = true,
                _ => {
                    let value = args
                        .next()
                        .ok_or_else(|| ConfigError::MissingValue(flag.clone()))?;
                    config.apply(&flag, value)?;
                }
            }
        }

        config.validate()?;
        Ok(config)
    }

    fn apply(&mut self, flag: &str, value: String) -> Result<(), ConfigError> {
        match flag {
            "-t" | "--time" => self.duration_seconds = parse(flag, &value)?,
            "-fs" | "--rate" => self.sample_rate_hz = parse(flag, &value)?,
            "-s" | "-miniSeed" | "--segment" => self.segment_seconds = parse(flag, &value)?,
            "--accel-fs" => self.accel_full_scale = parse(flag, &value)?,
            "--gyro-fs" => self.gyro_full_scale = parse(flag, &value)?,
            "--bus" => self.spi.bus = parse(flag, &value)?,
            "--cs" => self.spi.chip_select = parse(flag, &value)?,
            "--speed" => self.spi.speed_hz = parse(flag, &value)?,
            "--mode" => self.spi.mode = parse(flag, &value)?,
            "--retries" => self.retries = parse(flag, &value)?,
            "--network" => self.network = value,
            "--station" => self.station = value,
            "--out" => self.output_dir = PathBuf::from(value),
            "--partial" => {
                self.partial_window = match value.as_str() {
                    "flush" => PartialWindow::Flush,
                    "discard" => PartialWindow::Discard,
                    _ => return Err(invalid(flag, &value)),
                }
            }
            _ => return Err(ConfigError::UnknownArgument(flag.to_string())),
        }
        Ok(())
    }
}

fn parse<T: std::str::FromStr>(flag: &str, value: &str) -> Result<T, ConfigError> {
    value.parse().map_err(|_| invalid(flag, value))
}

fn invalid(flag: &str, value: &str) -> ConfigError {
    ConfigError::InvalidValue {
        flag: flag.to_string(),
        value: value.to_string(),
    }
}

/// Texto de ayuda para la línea de comandos
pub const USAGE: &str = "\
Lectura del sensor MPU9250 por SPI

Opciones:
  -t, --time <s>         duración de la grabación, potencia de 2 [256]
  -fs, --rate <Hz>       frecuencia de muestreo [1]
  -s, --segment <s>      guardar los datos cada <s> segundos, potencia de 2 [64]
  --gyro                 registrar velocidad angular en lugar de aceleración
  --temperature          añadir el canal de temperatura
  --accel-fs <g>         escala del acelerómetro: 2, 4, 8, 16 [16]
  --gyro-fs <dps>        escala del giroscopio: 250, 500, 1000, 2000 [250]
  --partial <modo>       ventana final incompleta: flush | discard [flush]
  --retries <n>          reintentos ante errores del bus [0]
  --network <id>         identificador de red [MBA_PI]
  --station <id>         identificador de estación [08_MPU]
  --out <dir>            directorio de salida [.]
  --bus <n>, --cs <n>    bus SPI y chip-select [0, 0]
  --speed <Hz>           velocidad del bus [1000000]
  --mode <0-3>           modo SPI [0]
";
