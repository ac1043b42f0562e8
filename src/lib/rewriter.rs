//! Writing of the gated VCF and the QC reports.
//!
//! Gated records are staged to a hidden temporary file next to the final output while QC
//! statistics accumulate.  Once the verdicts are known the staged file is either renamed into
//! place or re-read with the failed samples' columns removed.  The staged file is deleted when the
//! [`RecordRewriter`] is dropped, whether or not [`RecordRewriter::finish`] succeeded.

use std::{
    fs::File,
    io::{BufReader, BufWriter, Write},
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use csv::{QuoteStyle, WriterBuilder};
use fgoxide::io::DelimFile;
use log::debug;
use noodles_vcf::Header;
use serde::{Deserialize, Serialize};
use tempfile::{Builder, NamedTempFile};

use crate::{
    qc::{FailureReason, QcReport},
    utils::{is_gzip_path, output_writer, BUFSIZE},
    vcf::{VariantRecord, VcfReader, VcfWriter},
};

/// The suffix appended to the output VCF path for the failed sample report.
pub const FAILED_SAMPLES_SUFFIX: &str = ".failed-samples.csv";
/// The suffix appended to the output VCF path for the per-sample QC table.
pub const SAMPLE_QC_SUFFIX: &str = ".sample-qc.tsv";

/// The header of the failed sample report.
const FAILED_SAMPLES_HEADER: [&str; 3] = ["sample", "failure reason", "failure value"];

/// Stages gated records and writes the final VCF.
pub struct RecordRewriter {
    output: PathBuf,
    staged: NamedTempFile,
    writer: VcfWriter<BufWriter<File>>,
    records: usize,
}

impl RecordRewriter {
    /// Create the staging file in the directory of `output` and write `header` to it.
    pub fn new<P: AsRef<Path>>(output: P, header: &Header) -> Result<Self> {
        let output = output.as_ref().to_path_buf();
        let dir = match output.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        let staged = Builder::new()
            .prefix(".tmp_")
            .suffix(".vcf")
            .tempfile_in(&dir)
            .with_context(|| format!("Unable to create temporary file in {}", dir.display()))?;
        debug!("Staging records to {}", staged.path().display());
        let file = staged.reopen().context("Unable to open temporary file for writing")?;
        let writer = VcfWriter::new(BufWriter::with_capacity(BUFSIZE, file), header, None)
            .context("Failed to write VCF header")?;
        Ok(Self { output, staged, writer, records: 0 })
    }

    /// The path of the staging file.
    pub fn staged_path(&self) -> &Path {
        self.staged.path()
    }

    /// Stage a single record.
    pub fn write(&mut self, record: &VariantRecord) -> Result<()> {
        self.writer.write(record).context("Failed to write VCF record")?;
        self.records += 1;
        Ok(())
    }

    /// The number of records staged so far.
    pub fn records(&self) -> usize {
        self.records
    }

    /// Write the final output, keeping only the samples whose entry in `keep` is true.
    ///
    /// With no mask and an uncompressed output the staged file is moved into place.
    pub fn finish(self, keep: Option<&[bool]>) -> Result<PathBuf> {
        let Self { output, staged, writer, .. } = self;
        writer.finish().context("Failed to flush temporary VCF")?;
        let keep = keep.filter(|mask| mask.iter().any(|k| !k));
        if keep.is_none() && !is_gzip_path(&output) {
            staged
                .persist(&output)
                .map_err(|e| e.error)
                .with_context(|| format!("Unable to move VCF into place: {}", output.display()))?;
            return Ok(output);
        }

        let file = File::open(staged.path()).context("Unable to re-open temporary VCF")?;
        let mut reader = VcfReader::new(BufReader::with_capacity(BUFSIZE, file))?;
        let mut writer = VcfWriter::new(output_writer(&output)?, reader.header(), keep)
            .context("Failed to write VCF header")?;
        for record in &mut reader {
            writer.write(&record?).context("Failed to write VCF record")?;
        }
        writer
            .finish()?
            .flush()
            .with_context(|| format!("Failed to flush {}", output.display()))?;
        Ok(output)
    }
}

/// Write the failed sample report: every field quoted, header always present.
pub fn write_failed_samples<P: AsRef<Path>>(path: P, report: &QcReport) -> Result<()> {
    let path = path.as_ref();
    let mut writer = WriterBuilder::new()
        .has_headers(false)
        .quote_style(QuoteStyle::Always)
        .from_path(path)
        .with_context(|| format!("Unable to create file: {}", path.display()))?;
    writer.write_record(FAILED_SAMPLES_HEADER)?;
    for outcome in report.failures() {
        if let Some(failure) = outcome.failure {
            writer.write_record([
                outcome.sample.as_str(),
                failure.reason.as_ref(),
                format_value(failure.value).as_str(),
            ])?;
        }
    }
    writer.flush()?;
    Ok(())
}

/// Format a failure value, keeping a trailing `.0` on integral values (`0.0`, not `0`).
fn format_value(value: f64) -> String {
    if value.is_finite() && value.fract() == 0.0 {
        format!("{:.1}", value)
    } else {
        value.to_string()
    }
}

/// One row of the per-sample QC table.
#[derive(Debug, Serialize, Deserialize, PartialEq)]
pub struct SampleQcRow {
    pub sample: String,
    pub sites: usize,
    pub called: usize,
    pub heterozygous: usize,
    pub blanked: usize,
    pub proportion_called: f64,
    pub heterozygosity: Option<f64>,
    pub status: String,
    pub failure_reason: Option<FailureReason>,
}

/// Write one row per retained sample, in header order.
pub fn write_sample_qc<P: AsRef<Path>>(path: P, report: &QcReport) -> Result<()> {
    let rows = report.outcomes.iter().map(|o| SampleQcRow {
        sample: o.sample.clone(),
        sites: o.tally.sites,
        called: o.tally.called,
        heterozygous: o.tally.heterozygous,
        blanked: o.tally.blanked,
        proportion_called: o.proportion_called,
        heterozygosity: o.heterozygosity,
        status: String::from(if o.passed() { "pass" } else { "fail" }),
        failure_reason: o.failure.map(|f| f.reason),
    });
    DelimFile::default().write_tsv(&path.as_ref().to_path_buf(), rows)?;
    Ok(())
}
