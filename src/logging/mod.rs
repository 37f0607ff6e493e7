//! Experiment data logging.
//!
//! Algorithms and evaluators write one header followed by one row per
//! generation or trial. Diagnostic messages go through the `log` facade instead.

use std::fmt::Display;
use std::fs::File;
use std::io;
use std::path::Path;

/// One named value in a header or row.
#[derive(Debug, Clone, PartialEq)]
pub struct LoggableElement {
    pub name: &'static str,
    pub value: String,
}

impl LoggableElement {
    pub fn new(name: &'static str, value: impl Display) -> Self {
        Self {
            name,
            value: value.to_string(),
        }
    }

    /// Element that only carries a column name.
    pub fn column(name: &'static str) -> Self {
        Self {
            name,
            value: String::new(),
        }
    }
}

/// Sink for tabular experiment data.
pub trait DataLogger: Send {
    /// Write the column names.
    fn log_header(&mut self, elements: &[LoggableElement]) -> io::Result<()>;

    /// Write one row of values.
    fn log_row(&mut self, elements: &[LoggableElement]) -> io::Result<()>;

    /// Flush and release the underlying resource. Further writes are ignored.
    fn close(&mut self) -> io::Result<()>;
}

/// Logger that discards everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullDataLogger;

impl DataLogger for NullDataLogger {
    fn log_header(&mut self, _elements: &[LoggableElement]) -> io::Result<()> {
        Ok(())
    }

    fn log_row(&mut self, _elements: &[LoggableElement]) -> io::Result<()> {
        Ok(())
    }

    fn close(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Delimiter-separated file logger.
///
/// Usage:
/// ```ignore
/// let mut logger = CsvDataLogger::create("agents.csv")?;
/// logger.log_header(&[LoggableElement::column("generation")])?;
/// logger.log_row(&[LoggableElement::new("generation", 1)])?;
/// logger.close()?;
/// ```
pub struct CsvDataLogger {
    writer: Option<csv::Writer<File>>,
    rows_written: u64,
}

impl CsvDataLogger {
    /// Create (truncating) a comma-separated log file.
    pub fn create<P: AsRef<Path>>(path: P) -> io::Result<Self> {
        Self::with_delimiter(path, b',')
    }

    /// Create a log file with a custom single-byte delimiter.
    pub fn with_delimiter<P: AsRef<Path>>(path: P, delimiter: u8) -> io::Result<Self> {
        let writer = csv::WriterBuilder::new()
            .delimiter(delimiter)
            .from_path(path)?;
        Ok(Self {
            writer: Some(writer),
            rows_written: 0,
        })
    }

    /// Number of data rows written so far.
    pub fn rows_written(&self) -> u64 {
        self.rows_written
    }
}

impl DataLogger for CsvDataLogger {
    fn log_header(&mut self, elements: &[LoggableElement]) -> io::Result<()> {
        if let Some(writer) = self.writer.as_mut() {
            writer.write_record(elements.iter().map(|e| e.name))?;
        }
        Ok(())
    }

    fn log_row(&mut self, elements: &[LoggableElement]) -> io::Result<()> {
        if let Some(writer) = self.writer.as_mut() {
            writer.write_record(elements.iter().map(|e| e.value.as_str()))?;
            self.rows_written += 1;
        }
        Ok(())
    }

    fn close(&mut self) -> io::Result<()> {
        if let Some(mut writer) = self.writer.take() {
            writer.flush()?;
        }
        Ok(())
    }
}

impl Drop for CsvDataLogger {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            log::warn!("Failed to flush data log: {e}");
        }
    }
}
