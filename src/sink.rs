//! Destinos de los segmentos completados

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::acquisition::{Segment, Trace};

#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    #[error("error de E/S: {0}")]
    Io(#[from] io::Error),
    #[error("error CSV: {0}")]
    Csv(#[from] csv::Error),
}

/// Recibe cada ventana completada como un segmento independiente
pub trait SegmentSink {
    fn write_segment(&mut self, segment: Segment) -> Result<(), SinkError>;
}

impl<S: SegmentSink + ?Sized> SegmentSink for &mut S {
    fn write_segment(&mut self, segment: Segment) -> Result<(), SinkError> {
        (**self).write_segment(segment)
    }
}

/// Acumula los segmentos en memoria
#[derive(Debug, Default)]
pub struct MemorySink {
    pub segments: Vec<Segment>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SegmentSink for MemorySink {
    fn write_segment(&mut self, segment: Segment) -> Result<(), SinkError> {
        self.segments.push(segment);
        Ok(())
    }
}

/// Un fichero CSV por canal y segmento: `<red>.<estación>.<canal>.<etiqueta>.csv`
///
/// Cada fichero se escribe primero con extensión `.partial` y se renombra al
/// terminar, de modo que un fichero `.csv` siempre está completo.
#[derive(Debug)]
pub struct CsvSegmentSink {
    dir: PathBuf,
    written: Vec<PathBuf>,
}

impl CsvSegmentSink {
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self, SinkError> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self {
            dir,
            written: Vec::new(),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Ficheros completados hasta ahora
    pub fn written(&self) -> &[PathBuf] {
        &self.written
    }

    fn trace_path(&self, segment: &Segment, trace: &Trace) -> PathBuf {
        let meta = &trace.metadata;
        self.dir.join(format!(
            "{}.{}.{}.{}.csv",
            meta.network,
            meta.station,
            meta.channel,
            segment.label()
        ))
    }

    fn write_trace(&self, path: &Path, trace: &Trace) -> Result<(), SinkError> {
        let partial = path.with_extension("csv.partial");
        let mut writer = csv::Writer::from_path(&partial)?;

        writer.write_record(["timestamp_us", "value"])?;
        for (i, value) in trace.data.iter().enumerate() {
            let timestamp = trace
                .metadata
                .sample_time(i)
                .map(|t| t.unix_us().to_string())
                .unwrap_or_default();
            writer.write_record([timestamp, value.to_string()])?;
        }
        writer.flush()?;
        drop(writer);

        fs::rename(&partial, path)?;
        Ok(())
    }
}

impl SegmentSink for CsvSegmentSink {
    fn write_segment(&mut self, segment: Segment) -> Result<(), SinkError> {
        for trace in &segment.traces {
            let path = self.trace_path(&segment, trace);
            self.write_trace(&path, trace)?;
            log::debug!("Escrito {}", path.display());
            self.written.push(path);
        }
        Ok(())
    }
}
