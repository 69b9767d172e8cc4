//! Bucle de adquisición por ventanas
//!
//! Muestrea a una frecuencia nominal fija, acumula las lecturas en ventanas de
//! longitud `segment_seconds * sample_rate_hz` y entrega cada ventana llena al
//! sumidero como un segmento con metadatos de canal.
//!
//! El ritmo es cooperativo: tras cada muestra se espera hasta el siguiente
//! instante nominal `origen + k * periodo` medido con un reloj monotónico.

use std::mem;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use embedded_hal::delay::DelayNs;

use crate::base::{TimeSource, Timestamp};
use crate::config::{AcquisitionConfig, ConfigError, Measurement, PartialWindow};
use crate::device::{Mpu9250, Mpu9250Error};
use crate::interface::Interface;
use crate::sink::{SegmentSink, SinkError};
use crate::types::PhysicalSample;

#[derive(Debug, thiserror::Error)]
pub enum AcquisitionError {
    #[error("error del sensor: {0}")]
    Sensor(#[from] Mpu9250Error),
    #[error("error al guardar el segmento: {0}")]
    Sink(#[from] SinkError),
    #[error("configuración inválida: {0}")]
    Config(#[from] ConfigError),
}

/// Descriptor estático de un canal; sólo `starttime` cambia entre segmentos
#[derive(Debug, Clone, PartialEq)]
pub struct ChannelMetadata {
    pub network: String,
    pub station: String,
    pub channel: String,
    /// Número de muestras
    pub npts: usize,
    pub sampling_rate: f64,
    pub data_quality: char,
    pub starttime: Option<Timestamp>,
}

impl ChannelMetadata {
    /// Instante nominal de la muestra `index`
    pub fn sample_time(&self, index: usize) -> Option<Timestamp> {
        let offset = (index as f64 * 1_000_000.0 / self.sampling_rate).round() as u64;
        self.starttime.map(|start| start.offset_us(offset))
    }
}

/// Canales de una grabación: tres ejes y, opcionalmente, uno acompañante
#[derive(Debug, Clone, PartialEq)]
pub struct ChannelSet {
    pub x: ChannelMetadata,
    pub y: ChannelMetadata,
    pub z: ChannelMetadata,
    pub companion: Option<ChannelMetadata>,
}

impl ChannelSet {
    pub fn from_config(config: &AcquisitionConfig) -> Self {
        let channel = |name: String| ChannelMetadata {
            network: config.network.clone(),
            station: config.station.clone(),
            channel: name,
            npts: config.window_length(),
            sampling_rate: config.sample_rate_hz,
            data_quality: config.data_quality,
            starttime: None,
        };
        let prefix = config.measurement.channel_prefix();

        Self {
            x: channel(format!("{}_x", prefix)),
            y: channel(format!("{}_y", prefix)),
            z: channel(format!("{}_z", prefix)),
            companion: config
                .record_temperature
                .then(|| channel("TMP".to_string())),
        }
    }
}

/// Serie de un canal lista para persistir
#[derive(Debug, Clone, PartialEq)]
pub struct Trace {
    pub metadata: ChannelMetadata,
    pub data: Vec<f64>,
}

/// Ventana completada, con una traza por canal
#[derive(Debug, Clone, PartialEq)]
pub struct Segment {
    pub start: Timestamp,
    pub traces: Vec<Trace>,
}

impl Segment {
    /// Etiqueta legible del inicio, usada en nombres de fichero
    pub fn label(&self) -> String {
        self.start.label()
    }

    pub fn trace(&self, channel: &str) -> Option<&Trace> {
        self.traces.iter().find(|t| t.metadata.channel == channel)
    }

    /// Muestras por canal
    pub fn len(&self) -> usize {
        self.traces.first().map_or(0, |t| t.data.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Lectura de un tick
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Reading {
    pub sample: PhysicalSample,
    pub companion: Option<f64>,
}

/// Datos de una ventana retirada del bucle
#[derive(Debug, Clone, PartialEq)]
pub struct WindowData {
    pub start: Timestamp,
    pub x: Vec<f64>,
    pub y: Vec<f64>,
    pub z: Vec<f64>,
    pub companion: Option<Vec<f64>>,
}

impl WindowData {
    /// Adjunta los metadatos con `starttime` = inicio de la ventana
    pub fn into_segment(self, channels: &ChannelSet) -> Segment {
        let start = self.start;
        let trace = |meta: &ChannelMetadata, data: Vec<f64>| Trace {
            metadata: ChannelMetadata {
                npts: data.len(),
                starttime: Some(start),
                ..meta.clone()
            },
            data,
        };

        let mut traces = vec![
            trace(&channels.x, self.x),
            trace(&channels.y, self.y),
            trace(&channels.z, self.z),
        ];
        if let (Some(meta), Some(data)) = (&channels.companion, self.companion) {
            traces.push(trace(meta, data));
        }

        Segment { start, traces }
    }
}

/// Tres buffers de igual longitud que se llenan índice a índice
///
/// Invariante: `0 <= index < len`. Al alcanzar `len` la ventana se retira y se
/// sustituye por buffers a cero antes de escribir la siguiente muestra.
#[derive(Debug)]
pub struct Window {
    x: Vec<f64>,
    y: Vec<f64>,
    z: Vec<f64>,
    companion: Option<Vec<f64>>,
    len: usize,
    index: usize,
    start: Option<Timestamp>,
}

impl Window {
    pub fn new(len: usize, with_companion: bool) -> Self {
        debug_assert!(len > 0, "ventana sin muestras");
        Self {
            x: vec![0.0; len],
            y: vec![0.0; len],
            z: vec![0.0; len],
            companion: with_companion.then(|| vec![0.0; len]),
            len,
            index: 0,
            start: None,
        }
    }

    pub fn capacity(&self) -> usize {
        self.len
    }

    /// Muestras escritas en la ventana actual
    pub fn filled(&self) -> usize {
        self.index
    }

    pub fn is_empty(&self) -> bool {
        self.index == 0
    }

    pub fn start(&self) -> Option<Timestamp> {
        self.start
    }

    pub fn x(&self) -> &[f64] {
        &self.x
    }

    pub fn y(&self) -> &[f64] {
        &self.y
    }

    pub fn z(&self) -> &[f64] {
        &self.z
    }

    /// Escribe una lectura tomada en `at`; devuelve la ventana si se ha llenado
    pub fn push(&mut self, at: Timestamp, reading: &Reading) -> Option<WindowData> {
        if self.index == 0 {
            self.start = Some(at);
        }

        let j = self.index;
        self.x[j] = reading.sample.x;
        self.y[j] = reading.sample.y;
        self.z[j] = reading.sample.z;
        if let Some(companion) = self.companion.as_mut() {
            companion[j] = reading.companion.unwrap_or(f64::NAN);
        }
        self.index += 1;

        if self.index == self.len {
            Some(self.take(self.len))
        } else {
            None
        }
    }

    /// Retira la ventana incompleta truncada a las muestras escritas
    pub fn take_partial(&mut self) -> Option<WindowData> {
        if self.is_empty() {
            return None;
        }
        let filled = self.index;
        Some(self.take(filled))
    }

    fn take(&mut self, filled: usize) -> WindowData {
        let len = self.len;
        let fresh = || vec![0.0; len];

        let mut x = mem::replace(&mut self.x, fresh());
        let mut y = mem::replace(&mut self.y, fresh());
        let mut z = mem::replace(&mut self.z, fresh());
        let mut companion = self
            .companion
            .as_mut()
            .map(|buffer| mem::replace(buffer, fresh()));

        x.truncate(filled);
        y.truncate(filled);
        z.truncate(filled);
        if let Some(buffer) = companion.as_mut() {
            buffer.truncate(filled);
        }

        let start = self.start.take().unwrap_or(Timestamp::from_unix_us(0));
        self.index = 0;

        WindowData {
            start,
            x,
            y,
            z,
            companion,
        }
    }
}

/// Ritmo de muestreo por software con corrección de deriva
#[derive(Debug)]
pub struct Pacer {
    period_us: u64,
    origin_us: u64,
    ticks: u64,
    overruns: u64,
    max_lag_us: u64,
}

impl Pacer {
    pub fn new(period_us: u64, origin_us: u64) -> Self {
        Self {
            period_us,
            origin_us,
            ticks: 0,
            overruns: 0,
            max_lag_us: 0,
        }
    }

    /// Espera hasta el siguiente instante nominal
    ///
    /// Si el instante ya ha pasado no se espera. Con un retraso mayor que un
    /// periodo se reancla el origen en lugar de encadenar muestras seguidas.
    pub fn wait<T, D>(&mut self, clock: &T, delay: &mut D)
    where
        T: TimeSource + ?Sized,
        D: DelayNs,
    {
        self.ticks += 1;
        let deadline = self.origin_us + self.ticks * self.period_us;
        let now = clock.monotonic_us();

        if now < deadline {
            sleep_us(delay, deadline - now);
            return;
        }

        let lag = now - deadline;
        self.overruns += 1;
        self.max_lag_us = self.max_lag_us.max(lag);
        log::debug!("Muestra retrasada {} us respecto al instante nominal", lag);

        if lag > self.period_us {
            self.origin_us = now - self.ticks * self.period_us;
        }
    }

    pub fn overruns(&self) -> u64 {
        self.overruns
    }

    pub fn max_lag_us(&self) -> u64 {
        self.max_lag_us
    }
}

fn sleep_us<D: DelayNs>(delay: &mut D, mut us: u64) {
    while us > 0 {
        let chunk = us.min(u32::MAX as u64);
        delay.delay_us(chunk as u32);
        us -= chunk;
    }
}

/// Fuente de lecturas del bucle
pub trait SampleSource {
    fn read(&mut self) -> Result<Reading, Mpu9250Error>;
}

/// Fuente basada en el driver: se configura una vez y se reutiliza en cada tick
pub struct SensorSource<I> {
    device: Mpu9250<I>,
    measurement: Measurement,
    temperature: bool,
}

impl<I, E> SensorSource<I>
where
    I: Interface<Error = E>,
    Mpu9250Error: From<E>,
{
    /// Configura la escala del grupo registrado y toma posesión del driver
    pub fn configure(
        mut device: Mpu9250<I>,
        config: &AcquisitionConfig,
    ) -> Result<Self, Mpu9250Error> {
        match config.measurement {
            Measurement::Acceleration => {
                device.configure_accelerometer(config.accel_full_scale, config.accel_bandwidth)?
            }
            Measurement::AngularRate => {
                device.configure_gyroscope(config.gyro_full_scale, config.gyro_filter)?
            }
        }

        Ok(Self {
            device,
            measurement: config.measurement,
            temperature: config.record_temperature,
        })
    }

    pub fn device(&mut self) -> &mut Mpu9250<I> {
        &mut self.device
    }

    pub fn into_device(self) -> Mpu9250<I> {
        self.device
    }
}

impl<I, E> SampleSource for SensorSource<I>
where
    I: Interface<Error = E>,
    Mpu9250Error: From<E>,
{
    fn read(&mut self) -> Result<Reading, Mpu9250Error> {
        let sample = match self.measurement {
            Measurement::Acceleration => self.device.read_acceleration()?,
            Measurement::AngularRate => self.device.read_angular_rate()?,
        };
        let companion = if self.temperature {
            Some(self.device.read_temperature()?)
        } else {
            None
        };

        Ok(Reading { sample, companion })
    }
}

/// Resultado de una grabación
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    /// Muestras tomadas
    pub samples: u64,
    /// Segmentos entregados al sumidero (incluido uno parcial)
    pub segments: usize,
    /// Muestras descartadas de una ventana incompleta
    pub discarded: usize,
    pub cancelled: bool,
    pub retries: u64,
    pub overruns: u64,
    pub max_lag_us: u64,
}

/// Bucle de adquisición: tick → lectura → ventana → (quizá) segmento
pub struct Recorder<S, K, T, D> {
    source: S,
    sink: K,
    clock: T,
    delay: D,
    config: AcquisitionConfig,
    channels: ChannelSet,
    stop: Option<Arc<AtomicBool>>,
}

impl<S, K, T, D> Recorder<S, K, T, D>
where
    S: SampleSource,
    K: SegmentSink,
    T: TimeSource,
    D: DelayNs,
{
    pub fn new(
        source: S,
        sink: K,
        clock: T,
        delay: D,
        config: AcquisitionConfig,
    ) -> Result<Self, AcquisitionError> {
        config.check()?;
        let channels = ChannelSet::from_config(&config);

        Ok(Self {
            source,
            sink,
            clock,
            delay,
            config,
            channels,
            stop: None,
        })
    }

    /// Flag de parada; al ponerse a `true` el bucle termina en el siguiente tick
    ///
    /// Compatible con `signal_hook::flag::register`.
    pub fn with_stop_flag(mut self, stop: Arc<AtomicBool>) -> Self {
        self.stop = Some(stop);
        self
    }

    pub fn channels(&self) -> &ChannelSet {
        &self.channels
    }

    pub fn sink(&self) -> &K {
        &self.sink
    }

    pub fn into_parts(self) -> (S, K) {
        (self.source, self.sink)
    }

    pub fn run(&mut self) -> Result<RunSummary, AcquisitionError> {
        let total = self.config.total_samples();
        let mut window = Window::new(
            self.config.window_length(),
            self.channels.companion.is_some(),
        );
        let origin_us = self.clock.monotonic_us();
        let wall_origin = Timestamp::now(&self.clock);
        let mut pacer = Pacer::new(self.config.sample_period_us(), origin_us);
        let mut summary = RunSummary::default();

        log::info!(
            "Grabando {} muestras a {} Hz en segmentos de {} muestras",
            total,
            self.config.sample_rate_hz,
            window.capacity()
        );

        while summary.samples < total {
            if self.stop_requested() {
                log::info!("Grabación cancelada tras {} muestras", summary.samples);
                summary.cancelled = true;
                break;
            }

            // Hora de pared fijada al inicio; el avance sale del reloj monotónico
            let at = wall_origin.offset_us(self.clock.monotonic_us().saturating_sub(origin_us));
            let reading = self.read_with_retry(&mut summary)?;
            summary.samples += 1;

            if let Some(data) = window.push(at, &reading) {
                self.emit(data, &mut summary)?;
            }

            pacer.wait(&self.clock, &mut self.delay);
        }

        if let Some(data) = window.take_partial() {
            match self.config.partial_window {
                PartialWindow::Flush => {
                    log::info!("Guardando ventana incompleta de {} muestras", data.x.len());
                    self.emit(data, &mut summary)?;
                }
                PartialWindow::Discard => {
                    log::info!("Descartando ventana incompleta de {} muestras", data.x.len());
                    summary.discarded = data.x.len();
                }
            }
        }

        summary.overruns = pacer.overruns();
        summary.max_lag_us = pacer.max_lag_us();
        Ok(summary)
    }

    fn stop_requested(&self) -> bool {
        self.stop
            .as_ref()
            .map_or(false, |stop| stop.load(Ordering::SeqCst))
    }

    fn read_with_retry(&mut self, summary: &mut RunSummary) -> Result<Reading, AcquisitionError> {
        let mut attempts = 0;
        loop {
            match self.source.read() {
                Ok(reading) => return Ok(reading),
                Err(e) if e.is_transient() && attempts < self.config.retries => {
                    attempts += 1;
                    summary.retries += 1;
                    log::warn!(
                        "Error transitorio en la lectura ({}), reintento {}/{}",
                        e,
                        attempts,
                        self.config.retries
                    );
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    fn emit(&mut self, data: WindowData, summary: &mut RunSummary) -> Result<(), AcquisitionError> {
        let segment = data.into_segment(&self.channels);
        log::info!(
            "Segmento {} con {} muestras por canal",
            segment.label(),
            segment.len()
        );
        self.sink.write_segment(segment)?;
        summary.segments += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::base::ManualClock;
    use crate::interface::mock::MockSpi;
    use crate::interface::{InterfaceError, SpiInterface};
    use crate::register::registers;
    use crate::sink::MemorySink;
    use crate::types::SensorGroup;
    use embedded_hal::spi::ErrorKind;

    const T0: u64 = 1_550_000_000_000_000;

    fn reading(v: f64) -> Reading {
        Reading {
            sample: PhysicalSample::new(v, -v, v * 10.0),
            companion: None,
        }
    }

    /// Fuente con valores crecientes; opcionalmente falla en ciertas lecturas
    struct CountingSource {
        next: f64,
        failures: Vec<(u64, Mpu9250Error)>,
        calls: u64,
        clock: Option<ManualClock>,
        stop_after: Option<(u64, Arc<AtomicBool>)>,
    }

    impl CountingSource {
        fn new() -> Self {
            Self {
                next: 1.0,
                failures: Vec::new(),
                calls: 0,
                clock: None,
                stop_after: None,
            }
        }
    }

    impl SampleSource for CountingSource {
        fn read(&mut self) -> Result<Reading, Mpu9250Error> {
            self.calls += 1;
            if let Some(clock) = &self.clock {
                // Coste de la lectura
                clock.advance(1_000);
            }
            if let Some((n, stop)) = &self.stop_after {
                if *n == self.calls {
                    stop.store(true, Ordering::SeqCst);
                }
            }
            if let Some(pos) = self.failures.iter().position(|(n, _)| *n == self.calls) {
                return Err(self.failures.remove(pos).1);
            }
            let r = reading(self.next);
            self.next += 1.0;
            Ok(r)
        }
    }

    fn config(duration: f64, rate: f64, segment: f64) -> AcquisitionConfig {
        AcquisitionConfig {
            duration_seconds: duration,
            sample_rate_hz: rate,
            segment_seconds: segment,
            ..Default::default()
        }
    }

    fn spi_error() -> Mpu9250Error {
        Mpu9250Error::Interface(InterfaceError::Spi(ErrorKind::Other))
    }

    #[test]
    fn test_window_rollover() {
        let mut window = Window::new(4, false);
        let mut flushed = Vec::new();

        for i in 1..=9 {
            if let Some(data) = window.push(Timestamp::from_unix_us(i), &reading(i as f64)) {
                flushed.push((i, data));
            }
        }

        assert_eq!(flushed.len(), 2);
        assert_eq!(flushed[0].0, 4);
        assert_eq!(flushed[1].0, 8);
        assert_eq!(flushed[0].1.x, vec![1.0, 2.0, 3.0, 4.0]);
        assert_eq!(flushed[1].1.y, vec![-5.0, -6.0, -7.0, -8.0]);
        assert_eq!(flushed[1].1.start, Timestamp::from_unix_us(5));

        // La novena muestra cae en el índice 0 de una ventana nueva a cero
        assert_eq!(window.filled(), 1);
        assert_eq!(window.x(), &[9.0, 0.0, 0.0, 0.0]);
        assert_eq!(window.z(), &[90.0, 0.0, 0.0, 0.0]);
        assert_eq!(window.start(), Some(Timestamp::from_unix_us(9)));
    }

    #[test]
    fn test_partial_window_truncated() {
        let mut window = Window::new(4, true);
        assert!(window.take_partial().is_none());

        let mut r = reading(1.0);
        r.companion = Some(30.5);
        window.push(Timestamp::from_unix_us(7), &r);
        window.push(Timestamp::from_unix_us(8), &reading(2.0));

        let data = window.take_partial().unwrap();
        assert_eq!(data.x, vec![1.0, 2.0]);
        assert_eq!(data.start, Timestamp::from_unix_us(7));
        let companion = data.companion.unwrap();
        assert_eq!(companion[0], 30.5);
        assert!(companion[1].is_nan());
        assert!(window.is_empty());
        assert_eq!(window.x(), &[0.0; 4]);
    }

    #[test]
    fn test_segment_metadata() {
        let cfg = AcquisitionConfig {
            record_temperature: true,
            ..config(8.0, 2.0, 2.0)
        };
        let channels = ChannelSet::from_config(&cfg);
        let data = WindowData {
            start: Timestamp::from_unix_us(T0),
            x: vec![1.0; 4],
            y: vec![2.0; 4],
            z: vec![3.0; 4],
            companion: Some(vec![25.0; 4]),
        };

        let segment = data.into_segment(&channels);
        assert_eq!(segment.traces.len(), 4);
        let x = segment.trace("AC_x").unwrap();
        assert_eq!(x.metadata.network, "MBA_PI");
        assert_eq!(x.metadata.station, "08_MPU");
        assert_eq!(x.metadata.npts, 4);
        assert_eq!(x.metadata.sampling_rate, 2.0);
        assert_eq!(x.metadata.data_quality, 'D');
        assert_eq!(x.metadata.starttime, Some(Timestamp::from_unix_us(T0)));
        assert_eq!(
            x.metadata.sample_time(3),
            Some(Timestamp::from_unix_us(T0 + 1_500_000))
        );
        assert_eq!(segment.trace("TMP").unwrap().data, vec![25.0; 4]);
        assert_eq!(segment.label(), "2019_02_12_T19_33_20.000000");
        // Los metadatos estáticos no cambian
        assert_eq!(channels.x.starttime, None);
    }

    #[test]
    fn test_pacer_corrects_drift() {
        let clock = ManualClock::new(0);
        let mut delay = clock.clone();
        let mut pacer = Pacer::new(1_000, 0);

        // Trabajo de 300 us por muestra: la espera compensa
        for k in 1..=5 {
            clock.advance(300);
            pacer.wait(&clock, &mut delay);
            assert_eq!(clock.now_us(), k * 1_000);
        }
        assert_eq!(pacer.overruns(), 0);

        // Retraso menor que un periodo: sin espera, se mantiene la rejilla
        clock.advance(1_200);
        pacer.wait(&clock, &mut delay);
        assert_eq!(clock.now_us(), 6_200);
        assert_eq!(pacer.overruns(), 1);
        pacer.wait(&clock, &mut delay);
        assert_eq!(clock.now_us(), 7_000);

        // Retraso mayor que un periodo: se reancla
        clock.advance(5_000);
        pacer.wait(&clock, &mut delay);
        assert_eq!(pacer.max_lag_us(), 4_000);
        pacer.wait(&clock, &mut delay);
        assert_eq!(clock.now_us(), 13_000);
    }

    #[test]
    fn test_end_to_end_two_segments() {
        let clock = ManualClock::new(T0);
        let mut recorder = Recorder::new(
            CountingSource::new(),
            MemorySink::new(),
            clock.clone(),
            clock.clone(),
            config(8.0, 1.0, 4.0),
        )
        .unwrap();

        let summary = recorder.run().unwrap();
        assert_eq!(summary.samples, 8);
        assert_eq!(summary.segments, 2);
        assert!(!summary.cancelled);

        let (_, sink) = recorder.into_parts();
        assert_eq!(sink.segments.len(), 2);
        for segment in &sink.segments {
            assert_eq!(segment.traces.len(), 3);
            for trace in &segment.traces {
                assert_eq!(trace.data.len(), 4);
                assert_eq!(trace.metadata.npts, 4);
            }
        }
        assert!(sink.segments[1].start > sink.segments[0].start);
        assert_eq!(sink.segments[0].start, Timestamp::from_unix_us(T0));
        assert_eq!(
            sink.segments[1].start,
            Timestamp::from_unix_us(T0 + 4_000_000)
        );
        assert_eq!(
            sink.segments[1].trace("AC_x").unwrap().data,
            vec![5.0, 6.0, 7.0, 8.0]
        );
    }

    #[test]
    fn test_partial_final_window_policies() {
        for (policy, segments, discarded) in [
            (PartialWindow::Flush, 3, 0),
            (PartialWindow::Discard, 2, 2),
        ] {
            let clock = ManualClock::new(T0);
            let cfg = AcquisitionConfig {
                partial_window: policy,
                ..config(10.0, 1.0, 4.0)
            };
            let mut recorder =
                Recorder::new(CountingSource::new(), MemorySink::new(), clock.clone(), clock, cfg)
                    .unwrap();

            let summary = recorder.run().unwrap();
            assert_eq!(summary.segments, segments);
            assert_eq!(summary.discarded, discarded);

            let (_, sink) = recorder.into_parts();
            if policy == PartialWindow::Flush {
                let last = &sink.segments[2];
                assert_eq!(last.len(), 2);
                assert_eq!(last.traces[0].metadata.npts, 2);
            }
        }
    }

    #[test]
    fn test_cancellation_at_tick_boundary() {
        let stop = Arc::new(AtomicBool::new(true));
        let clock = ManualClock::new(T0);
        let mut recorder = Recorder::new(
            CountingSource::new(),
            MemorySink::new(),
            clock.clone(),
            clock,
            config(8.0, 1.0, 4.0),
        )
        .unwrap()
        .with_stop_flag(stop);

        let summary = recorder.run().unwrap();
        assert!(summary.cancelled);
        assert_eq!(summary.samples, 0);
        assert_eq!(summary.segments, 0);
    }

    #[test]
    fn test_cancellation_flushes_partial_window() {
        let stop = Arc::new(AtomicBool::new(false));
        let mut source = CountingSource::new();
        source.stop_after = Some((6, stop.clone()));
        let clock = ManualClock::new(T0);
        let mut recorder = Recorder::new(
            source,
            MemorySink::new(),
            clock.clone(),
            clock,
            config(8.0, 1.0, 4.0),
        )
        .unwrap()
        .with_stop_flag(stop);

        let summary = recorder.run().unwrap();
        assert!(summary.cancelled);
        assert_eq!(summary.samples, 6);
        assert_eq!(summary.segments, 2);
        let (_, sink) = recorder.into_parts();
        assert_eq!(sink.segments[1].trace("AC_x").unwrap().data, vec![5.0, 6.0]);
    }

    #[test]
    fn test_transient_errors_retried_within_budget() {
        let clock = ManualClock::new(T0);
        let mut source = CountingSource::new();
        source.failures = vec![(2, spi_error()), (3, spi_error())];
        let cfg = AcquisitionConfig {
            retries: 2,
            ..config(4.0, 1.0, 4.0)
        };

        let mut recorder =
            Recorder::new(source, MemorySink::new(), clock.clone(), clock, cfg).unwrap();
        let summary = recorder.run().unwrap();
        assert_eq!(summary.retries, 2);
        assert_eq!(summary.segments, 1);
        let (_, sink) = recorder.into_parts();
        assert_eq!(sink.segments[0].traces[0].data, vec![1.0, 2.0, 3.0, 4.0]);
    }

    #[test]
    fn test_errors_are_fatal_without_retry() {
        let clock = ManualClock::new(T0);
        let mut source = CountingSource::new();
        source.failures = vec![(2, spi_error())];
        let mut recorder =
            Recorder::new(source, MemorySink::new(), clock.clone(), clock, config(4.0, 1.0, 4.0))
                .unwrap();
        assert!(matches!(
            recorder.run(),
            Err(AcquisitionError::Sensor(Mpu9250Error::Interface(_)))
        ));

        // Los errores de configuración nunca se reintentan
        let clock = ManualClock::new(T0);
        let mut source = CountingSource::new();
        source.failures = vec![(1, Mpu9250Error::NotConfigured(SensorGroup::Accelerometer))];
        let cfg = AcquisitionConfig {
            retries: 5,
            ..config(4.0, 1.0, 4.0)
        };
        let mut recorder = Recorder::new(source, MemorySink::new(), clock.clone(), clock, cfg).unwrap();
        assert!(matches!(
            recorder.run(),
            Err(AcquisitionError::Sensor(Mpu9250Error::NotConfigured(_)))
        ));
    }

    #[test]
    fn test_invalid_config_rejected() {
        let clock = ManualClock::new(T0);
        let result = Recorder::new(
            CountingSource::new(),
            MemorySink::new(),
            clock.clone(),
            clock,
            config(8.0, 0.0, 4.0),
        );
        assert!(matches!(result, Err(AcquisitionError::Config(_))));
    }

    /// Reloj de pared que puede saltar hacia atrás sin afectar al monotónico
    struct SteppingClock {
        clock: ManualClock,
        wall_step_us: std::rc::Rc<std::cell::Cell<u64>>,
    }

    impl TimeSource for SteppingClock {
        fn get_timestamp_us(&self) -> u64 {
            self.clock.now_us() - self.wall_step_us.get()
        }

        fn monotonic_us(&self) -> u64 {
            self.clock.now_us()
        }
    }

    struct StepBackSource {
        inner: CountingSource,
        step_after: u64,
        wall_step_us: std::rc::Rc<std::cell::Cell<u64>>,
    }

    impl SampleSource for StepBackSource {
        fn read(&mut self) -> Result<Reading, Mpu9250Error> {
            let reading = self.inner.read()?;
            if self.inner.calls == self.step_after {
                self.wall_step_us.set(10_000_000);
            }
            Ok(reading)
        }
    }

    #[test]
    fn test_wall_clock_step_does_not_reorder_segments() {
        let clock = ManualClock::new(T0);
        let wall_step_us = std::rc::Rc::new(std::cell::Cell::new(0));
        let source = StepBackSource {
            inner: CountingSource::new(),
            step_after: 2,
            wall_step_us: wall_step_us.clone(),
        };
        let time = SteppingClock {
            clock: clock.clone(),
            wall_step_us,
        };

        let mut recorder =
            Recorder::new(source, MemorySink::new(), time, clock, config(8.0, 1.0, 4.0)).unwrap();
        recorder.run().unwrap();

        let (_, sink) = recorder.into_parts();
        assert_eq!(sink.segments.len(), 2);
        assert!(sink.segments[1].start > sink.segments[0].start);
        assert_eq!(
            sink.segments[1].start,
            Timestamp::from_unix_us(T0 + 4_000_000)
        );
        assert_ne!(sink.segments[0].label(), sink.segments[1].label());
    }

    #[test]
    fn test_read_cost_does_not_accumulate_drift() {
        let clock = ManualClock::new(T0);
        let mut source = CountingSource::new();
        source.clock = Some(clock.clone());
        let mut recorder = Recorder::new(
            source,
            MemorySink::new(),
            clock.clone(),
            clock.clone(),
            config(8.0, 1.0, 4.0),
        )
        .unwrap();

        recorder.run().unwrap();
        let (_, sink) = recorder.into_parts();
        assert_eq!(
            sink.segments[1].start,
            Timestamp::from_unix_us(T0 + 4_000_000)
        );
        assert_eq!(clock.now_us(), T0 + 8_000_000);
    }

    #[test]
    fn test_sensor_source_over_spi() {
        let spi = MockSpi::new();
        spi.set_registers(registers::ACCEL_XOUT_H, &[0x40, 0x00, 0x00, 0x00, 0xC0, 0x00]);
        spi.set_registers(registers::TEMP_OUT_H, &[0x00, 0x00]);
        let cfg = AcquisitionConfig {
            record_temperature: true,
            ..config(4.0, 1.0, 2.0)
        };

        let device = Mpu9250::new(SpiInterface::new(spi.clone()));
        let source = SensorSource::configure(device, &cfg).unwrap();
        assert_eq!(spi.register(registers::ACCEL_CONFIG), 0x18);

        let clock = ManualClock::new(T0);
        let mut recorder =
            Recorder::new(source, MemorySink::new(), clock.clone(), clock, cfg).unwrap();
        let summary = recorder.run().unwrap();
        assert_eq!(summary.segments, 2);

        let (source, sink) = recorder.into_parts();
        let segment = &sink.segments[0];
        assert_eq!(segment.trace("AC_x").unwrap().data, vec![8.0, 8.0]);
        assert_eq!(segment.trace("AC_z").unwrap().data, vec![-8.0, -8.0]);
        assert_eq!(segment.trace("TMP").unwrap().data, vec![21.0, 21.0]);

        // El transporte se abre una sola vez y se devuelve al final
        let _interface = source.into_device().close();
    }

    #[test]
    fn test_sensor_source_gyro_invalid_scale() {
        let cfg = AcquisitionConfig {
            measurement: Measurement::AngularRate,
            gyro_full_scale: 125,
            ..Default::default()
        };
        let device = Mpu9250::new(SpiInterface::new(MockSpi::new()));
        assert!(matches!(
            SensorSource::configure(device, &cfg),
            Err(Mpu9250Error::InvalidConfig { .. })
        ));
    }
}
