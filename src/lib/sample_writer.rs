//! A small manager struct that lazily opens one FASTQ writer per sample and keeps them open until
//! demultiplexing finishes.

use std::{
    io::Write,
    path::{Path, PathBuf},
};

use ahash::AHashMap;
use anyhow::{Context, Result};
use log::debug;
use path_absolutize::Absolutize;
use seq_io::BaseRecord;

use crate::{sample_metadata::ResolvedSample, utils::output_writer};

/// A writer for a single sample's reads.
pub struct SampleWriter {
    /// The path being written to.
    pub path: PathBuf,
    writer: Box<dyn Write>,
}

impl SampleWriter {
    /// Create the file at `path`, compressing if it ends in `.gz`.
    pub fn new(path: PathBuf) -> Result<Self> {
        let writer = output_writer(&path)?;
        Ok(Self { path, writer })
    }

    /// Write a single FASTQ record.
    pub fn write_record<R: BaseRecord>(&mut self, record: &R) -> Result<()> {
        record
            .write(&mut self.writer)
            .with_context(|| format!("Failed to write read to {}", self.path.display()))
    }

    /// Consumes [`Self`], flushing the underlying writer.
    pub fn finish(mut self) -> Result<()> {
        self.writer.flush().with_context(|| format!("Failed to flush {}", self.path.display()))
    }
}

/// Holds onto the open [`SampleWriter`]s, keyed by the sample's index in the sample list.
///
/// A file is only created for a sample once its first read arrives, so the number of open
/// handles is bounded by the number of samples that actually received reads.  Writers that are
/// still open when this struct is dropped (e.g. on an error path) are closed by their own drop.
pub struct SampleWriters {
    output_dir: PathBuf,
    compress: bool,
    writers: AHashMap<usize, SampleWriter>,
}

impl SampleWriters {
    /// Create a new [`SampleWriters`] writing into `output_dir`.
    ///
    /// When `compress` is true the outputs are BGZF compressed (`.fastq.gz`).
    pub fn new<P: AsRef<Path>>(output_dir: P, compress: bool) -> Self {
        Self { output_dir: output_dir.as_ref().to_path_buf(), compress, writers: AHashMap::new() }
    }

    /// The path the given sample's reads are (or would be) written to.
    pub fn path_for(&self, sample: &ResolvedSample) -> PathBuf {
        let extension = if self.compress { "fastq.gz" } else { "fastq" };
        self.output_dir.join(format!("{}.{}", sample.file_stem(), extension))
    }

    /// Write the record to the writer for the sample at `sample_index`, creating the writer on
    /// first use.
    pub fn write_record<R: BaseRecord>(
        &mut self,
        sample_index: usize,
        sample: &ResolvedSample,
        record: &R,
    ) -> Result<()> {
        if !self.writers.contains_key(&sample_index) {
            let path = self.path_for(sample);
            let path = path
                .absolutize()
                .with_context(|| format!("Unable to resolve path: {}", path.display()))?
                .to_path_buf();
            debug!("Opening {} for sample {}", path.display(), sample.name());
            let writer = SampleWriter::new(path)?;
            self.writers.insert(sample_index, writer);
        }
        match self.writers.get_mut(&sample_index) {
            Some(writer) => writer.write_record(record),
            None => unreachable!(),
        }
    }

    /// The number of writers currently open.
    pub fn len(&self) -> usize {
        self.writers.len()
    }

    /// True if no writer has been opened.
    pub fn is_empty(&self) -> bool {
        self.writers.is_empty()
    }

    /// Consumes [`Self`], flushing and closing every writer.
    ///
    /// Returns the path written for each sample index that received at least one read.  Every
    /// writer is closed even if flushing an earlier one fails; the first failure is returned.
    pub fn finish(self) -> Result<AHashMap<usize, PathBuf>> {
        let mut paths = AHashMap::with_capacity(self.writers.len());
        let mut first_error = None;
        for (sample_index, writer) in self.writers {
            let path = writer.path.clone();
            if let Err(e) = writer.finish() {
                first_error.get_or_insert(e);
            }
            paths.insert(sample_index, path);
        }
        match first_error {
            Some(e) => Err(e),
            None => Ok(paths),
        }
    }
}
