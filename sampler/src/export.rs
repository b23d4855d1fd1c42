//! Text export of buffered samples
//!
//! Writes the column schema header when the file is created, then every
//! buffered sample as one comma-and-space separated row at teardown.

use crate::error::{Result, SamplerError};
use crate::sampler::SamplerStats;
use smitrace_shared::{header_line, Sample};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Result of one export
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportSummary {
    /// File the samples were written to
    pub path: PathBuf,

    /// Data rows written (header excluded)
    pub rows: usize,

    /// Polling counters for the run
    pub stats: SamplerStats,
}

/// Output file writer, owned by the sampler for its whole lifetime
#[derive(Debug)]
pub struct Exporter {
    path: PathBuf,
    writer: BufWriter<File>,
}

impl Exporter {
    /// Create (or truncate) the output file and write the header
    pub fn create(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = File::create(&path).map_err(|source| SamplerError::Io {
            path: path.clone(),
            source,
        })?;

        let mut exporter = Self {
            path,
            writer: BufWriter::new(file),
        };
        exporter.write_header()?;

        debug!("Opened output file {}", exporter.path.display());
        Ok(exporter)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn write_header(&mut self) -> Result<()> {
        let header = header_line();
        writeln!(self.writer, "{}", header)
            .and_then(|_| self.writer.flush())
            .map_err(|source| self.io_error(source))
    }

    /// Write one row per sample, in buffer order
    pub fn write_body(&mut self, samples: &[Sample]) -> Result<usize> {
        debug!("Writing {} rows to {}", samples.len(), self.path.display());

        for sample in samples {
            writeln!(self.writer, "{}", sample.to_row()).map_err(|source| self.io_error(source))?;
        }

        Ok(samples.len())
    }

    /// Flush and close the file
    pub fn finish(mut self) -> Result<PathBuf> {
        self.writer.flush().map_err(|source| self.io_error(source))?;
        let file = self
            .writer
            .into_inner()
            .map_err(|e| SamplerError::Io {
                path: self.path.clone(),
                source: e.into_error(),
            })?;
        drop(file);
        Ok(self.path)
    }

    fn io_error(&self, source: std::io::Error) -> SamplerError {
        SamplerError::Io {
            path: self.path.clone(),
            source,
        }
    }
}
