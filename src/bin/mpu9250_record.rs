//! Graba aceleración (o velocidad angular) del MPU9250 en segmentos CSV
//!
//! Uso: mpu9250_record [-t SEGUNDOS] [-fs HZ] [-s SEGUNDOS] [opciones]

use std::process;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use linux_embedded_hal::Delay;
use signal_hook::consts::{SIGINT, SIGTERM};

use mpu9250_rs::acquisition::{AcquisitionError, Recorder, SensorSource};
use mpu9250_rs::base::SystemTimeSource;
use mpu9250_rs::config::{AcquisitionConfig, ConfigError, USAGE};
use mpu9250_rs::sink::CsvSegmentSink;
use mpu9250_rs::Mpu9250Error;

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = match AcquisitionConfig::from_args(std::env::args().skip(1)) {
        Ok(config) => config,
        Err(ConfigError::HelpRequested) => {
            println!("{}", USAGE);
            return;
        }
        Err(e) => {
            eprintln!("{}\n\n{}", e, USAGE);
            process::exit(2);
        }
    };

    if let Err(e) = record(config) {
        log::error!("{}", e);
        process::exit(1);
    }
}

fn record(config: AcquisitionConfig) -> Result<(), AcquisitionError> {
    let stop = Arc::new(AtomicBool::new(false));
    for signal in [SIGINT, SIGTERM] {
        if let Err(e) = signal_hook::flag::register(signal, Arc::clone(&stop)) {
            log::warn!("No se pudo registrar la señal {}: {}", signal, e);
        }
    }

    let mut device = mpu9250_rs::open(&config.spi)?;
    device.wake()?;
    match device.verify_who_am_i() {
        Ok(()) => {}
        Err(Mpu9250Error::UnexpectedWhoAmI(id)) => {
            log::warn!("WHO_AM_I = {:#04x}, se esperaba 0x71; se continúa", id)
        }
        Err(e) => return Err(e.into()),
    }

    let source = SensorSource::configure(device, &config)?;
    let sink = CsvSegmentSink::new(&config.output_dir)?;
    log::info!(
        "Escribiendo segmentos en {} desde {}",
        sink.dir().display(),
        config.spi.device_path()
    );

    let mut recorder = Recorder::new(
        source,
        sink,
        SystemTimeSource::new(),
        Delay,
        config,
    )?
    .with_stop_flag(stop);

    let summary = recorder.run()?;
    log::info!(
        "Grabación terminada: {} muestras, {} segmentos, {} reintentos, {} muestras retrasadas (máx. {} us)",
        summary.samples,
        summary.segments,
        summary.retries,
        summary.overruns,
        summary.max_lag_us
    );
    if summary.discarded > 0 {
        log::info!("{} muestras descartadas de la última ventana", summary.discarded);
    }

    let (source, _) = recorder.into_parts();
    let _spi = source.into_device().close().release();
    Ok(())
}
