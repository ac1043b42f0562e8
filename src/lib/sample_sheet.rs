//! Loading of the GTseq sample sheet.
//!
//! The sample sheet is a CSV file with a header line.  Header names are compared after
//! normalization (trimmed, lower-cased, with spaces and hyphens replaced by underscores), and must
//! include `sample_name`, `plate_id`, `i7_name` and `i5_name`.  Other columns are ignored.

use std::path::Path;

use csv::{ReaderBuilder, StringRecord, Trim};
use fgoxide::io::Io;
use thiserror::Error;

use crate::{barcodes::BarcodeError, sample_metadata::Sample};

/// The columns that must be present in the sample sheet, after normalization.
pub const REQUIRED_COLUMNS: &[&str] = &["sample_name", "plate_id", "i7_name", "i5_name"];

/// The error that may occur when parsing or validating the sample sheet.
#[derive(Error, Debug)]
pub enum SampleSheetError {
    #[error("Io error occurred")]
    Io(#[from] std::io::Error),

    #[error("Io error occurred")]
    FgError(#[from] fgoxide::FgError),

    #[error(transparent)]
    Deserialize(#[from] csv::Error),

    #[error("The sample sheet was empty")]
    Empty,

    #[error("The sample sheet is missing the required column '{column}'")]
    MissingColumn { column: String },

    #[error("Line {line} has an empty value for '{column}'")]
    EmptyField { column: String, line: usize },

    #[error("Unable to parse the sample on line {line}: {source}")]
    SampleInvalidLine { source: csv::Error, line: usize },

    #[error("Duplicate sample name found: {name}")]
    DuplicateSampleName { name: String },

    #[error("Sample sheet must include at least one sample")]
    ZeroSamples,

    #[error("Invalid barcode for sample {sample}: {source}")]
    InvalidSampleBarcode { sample: String, source: BarcodeError },

    #[error("Samples {sample_a} and {sample_b} both resolve to the index pair {index_pair}")]
    IndexPairCollision { sample_a: String, sample_b: String, index_pair: String },
}

/// Normalize a sample sheet column name, e.g. ` Sample Name` becomes `sample_name`.
pub fn normalize_header(name: &str) -> String {
    name.trim().to_lowercase().replace([' ', '-'], "_")
}

/// Reads the samples from the sample sheet at the given path.
///
/// The file may be gzip compressed.  Blank lines are skipped.
///
/// # Errors
///
/// - [`SampleSheetError::Empty`] if the file has no header line
/// - [`SampleSheetError::MissingColumn`] if a required column is absent
/// - [`SampleSheetError::EmptyField`] if a required value is blank
/// - [`SampleSheetError::ZeroSamples`] if there are no samples
pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Vec<Sample>, SampleSheetError> {
    let io = Io::default();
    let reader = io.new_reader(&path)?;
    from_reader(reader)
}

/// Reads the samples from a sample sheet.
///
/// # Errors
///
/// See [`from_path`].
pub fn from_reader<R: std::io::Read>(reader: R) -> Result<Vec<Sample>, SampleSheetError> {
    let mut reader = ReaderBuilder::new()
        .delimiter(b',')
        .has_headers(false)
        .flexible(true)
        .trim(Trim::All)
        .from_reader(reader);

    let mut records = reader.records();
    let header = match records.next() {
        Some(header) => header?,
        None => return Err(SampleSheetError::Empty),
    };
    let header: StringRecord = header.iter().map(normalize_header).collect();
    for column in REQUIRED_COLUMNS {
        if !header.iter().any(|h| h == *column) {
            return Err(SampleSheetError::MissingColumn { column: (*column).to_string() });
        }
    }

    let mut samples = vec![];
    for record in records {
        let record = record?;
        // the csv reader reports 1-based line numbers
        let line = record.position().map_or(0, |p| p.line() as usize);
        if record.iter().all(str::is_empty) {
            continue;
        }

        let mut sample: Sample = record
            .deserialize(Some(&header))
            .map_err(|e| SampleSheetError::SampleInvalidLine { source: e, line })?;
        for (column, value) in REQUIRED_COLUMNS
            .iter()
            .zip([&sample.name, &sample.plate, &sample.i7_name, &sample.i5_name])
        {
            if value.is_empty() {
                return Err(SampleSheetError::EmptyField { column: (*column).to_string(), line });
            }
        }
        sample.line_number = Some(line);
        samples.push(sample);
    }

    if samples.is_empty() {
        return Err(SampleSheetError::ZeroSamples);
    }
    Ok(samples)
}
