//! Cycle sinks.
//!
//! Sinks are write-only and have an explicit lifecycle: points can be written
//! until [`CycleSink::close`] is called; closing twice is a no-op.

use dc_common::{Error, Result};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use crate::events::CyclePoint;

/// Destination of cycle points.
pub trait CycleSink: Send {
    fn write_points(&mut self, points: &[CyclePoint]) -> Result<()>;

    /// Flush and release the destination.
    fn close(&mut self) -> Result<()>;
}

impl<S: CycleSink + ?Sized> CycleSink for Box<S> {
    fn write_points(&mut self, points: &[CyclePoint]) -> Result<()> {
        (**self).write_points(points)
    }

    fn close(&mut self) -> Result<()> {
        (**self).close()
    }
}

fn closed_error() -> Error {
    Error::Sink("sink is closed".to_string())
}

/// One JSON object per point, one point per line.
pub struct JsonlSink<W: Write + Send> {
    writer: BufWriter<W>,
    written: u64,
    closed: bool,
}

impl JsonlSink<File> {
    /// Create (or truncate) `path`.
    pub fn create(path: &Path) -> Result<Self> {
        let file = File::create(path)
            .map_err(|e| Error::Sink(format!("{}: {}", path.display(), e)))?;
        Ok(JsonlSink::new(file))
    }
}

impl<W: Write + Send> JsonlSink<W> {
    pub fn new(writer: W) -> Self {
        JsonlSink {
            writer: BufWriter::new(writer),
            written: 0,
            closed: false,
        }
    }

    /// Points written so far.
    pub fn written(&self) -> u64 {
        self.written
    }

    /// Flush and return the underlying writer.
    pub fn into_inner(self) -> Result<W> {
        self.writer
            .into_inner()
            .map_err(|e| Error::Sink(e.error().to_string()))
    }
}

impl<W: Write + Send> CycleSink for JsonlSink<W> {
    fn write_points(&mut self, points: &[CyclePoint]) -> Result<()> {
        if self.closed {
            return Err(closed_error());
        }
        for point in points {
            serde_json::to_writer(&mut self.writer, point)?;
            self.writer.write_all(b"\n")?;
            self.written += 1;
        }
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        if !self.closed {
            self.writer.flush()?;
            self.closed = true;
        }
        Ok(())
    }
}

/// Collects points in memory.
#[derive(Debug, Default)]
pub struct MemorySink {
    points: Vec<CyclePoint>,
    closed: bool,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn points(&self) -> &[CyclePoint] {
        &self.points
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    pub fn into_points(self) -> Vec<CyclePoint> {
        self.points
    }
}

impl CycleSink for MemorySink {
    fn write_points(&mut self, points: &[CyclePoint]) -> Result<()> {
        if self.closed {
            return Err(closed_error());
        }
        self.points.extend_from_slice(points);
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        self.closed = true;
        Ok(())
    }
}
