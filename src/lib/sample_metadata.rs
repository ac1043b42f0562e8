#![forbid(unsafe_code)]
#![allow(clippy::must_use_candidate)]

use std::{collections::HashSet, path::Path};

use ahash::AHashMap;
use bstr::BString;
use serde::{Deserialize, Serialize};

use crate::{
    barcodes::{i7_numeral, normalize_i5, BarcodeTable},
    sample_sheet::SampleSheetError,
};

/// A sample as described by one row of the sample sheet.
///
/// Column names are matched after normalization (see [`crate::sample_sheet::normalize_header`]),
/// so `Sample Name`, `sample_name` and `SAMPLE-NAME` all populate [`Sample::name`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Hash, Eq)]
pub struct Sample {
    /// The unique name of the sample within the run.
    #[serde(rename = "sample_name")]
    pub name: String,

    /// The plate the sample was prepared on.
    #[serde(rename = "plate_id")]
    pub plate: String,

    /// The raw i7 label, e.g. `GTseq i7 003 10uM`.
    pub i7_name: String,

    /// The raw i5 plate coordinate, e.g. `A01`, `A1` or `1A`.
    pub i5_name: String,

    /// The line number in the sample sheet on which this sample was defined.
    #[serde(skip)]
    pub line_number: Option<usize>,
}

impl Sample {
    /// Create a new [`Sample`] without a line number.
    pub fn new(name: &str, plate: &str, i7_name: &str, i5_name: &str) -> Self {
        Self {
            name: name.to_string(),
            plate: plate.to_string(),
            i7_name: i7_name.to_string(),
            i5_name: i5_name.to_string(),
            line_number: None,
        }
    }
}

/// A [`Sample`] whose index identifiers have been resolved to sequences.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedSample {
    /// The sample as given in the sample sheet.
    pub sample: Sample,
    /// The three digit i7 numeral extracted from [`Sample::i7_name`].
    pub i7_numeral: String,
    /// The canonical form of [`Sample::i5_name`].
    pub i5_coordinate: String,
    /// The i7 index sequence.
    pub i7_sequence: BString,
    /// The i5 index sequence.
    pub i5_sequence: BString,
    /// The index pair as it appears in a read header: `<i7>+<i5>`.
    pub index_pair: BString,
}

impl ResolvedSample {
    /// Resolve the sample's barcodes against the given table.
    ///
    /// # Errors
    ///
    /// - [`SampleSheetError::InvalidSampleBarcode`] if either barcode cannot be resolved
    pub fn resolve(sample: &Sample, table: &BarcodeTable) -> Result<Self, SampleSheetError> {
        let with_sample = |source| SampleSheetError::InvalidSampleBarcode {
            sample: sample.name.clone(),
            source,
        };
        let i7_numeral = i7_numeral(&sample.i7_name).map_err(with_sample)?.to_string();
        let i5_coordinate = normalize_i5(&sample.i5_name).map_err(with_sample)?;
        let i7_sequence = BString::from(table.resolve_i7(&sample.i7_name).map_err(with_sample)?);
        let i5_sequence = BString::from(table.resolve_i5(&sample.i5_name).map_err(with_sample)?);
        let index_pair = BString::from(format!("{}+{}", i7_sequence, i5_sequence));
        Ok(Self {
            sample: sample.clone(),
            i7_numeral,
            i5_coordinate,
            i7_sequence,
            i5_sequence,
            index_pair,
        })
    }

    /// The name of the sample.
    pub fn name(&self) -> &str {
        &self.sample.name
    }

    /// The deterministic file stem for this sample's reads, independent of which i5 notation
    /// was used in the sample sheet: `GTSeq_<i7 numeral>_<i5 coordinate>_<plate>_<name>`.
    pub fn file_stem(&self) -> String {
        format!(
            "GTSeq_{}_{}_{}_{}",
            self.i7_numeral, self.i5_coordinate, self.sample.plate, self.sample.name
        )
    }
}

/// Validates a set of samples.
///
/// Sample names must be unique, and no two samples may resolve to the same index pair.
///
/// # Errors
///
/// - [`SampleSheetError::ZeroSamples`]
/// - [`SampleSheetError::DuplicateSampleName`]
/// - [`SampleSheetError::InvalidSampleBarcode`]
/// - [`SampleSheetError::IndexPairCollision`]
pub fn validate_samples(
    samples: &[Sample],
    table: &BarcodeTable,
) -> Result<Vec<ResolvedSample>, SampleSheetError> {
    if samples.is_empty() {
        return Err(SampleSheetError::ZeroSamples);
    }

    let mut names = HashSet::new();
    for sample in samples {
        if !names.insert(sample.name.as_str()) {
            return Err(SampleSheetError::DuplicateSampleName { name: sample.name.clone() });
        }
    }

    let resolved =
        samples.iter().map(|s| ResolvedSample::resolve(s, table)).collect::<Result<Vec<_>, _>>()?;

    let mut seen: AHashMap<&BString, &ResolvedSample> = AHashMap::new();
    for sample in &resolved {
        if let Some(other) = seen.insert(&sample.index_pair, sample) {
            return Err(SampleSheetError::IndexPairCollision {
                sample_a: other.name().to_string(),
                sample_b: sample.name().to_string(),
                index_pair: sample.index_pair.to_string(),
            });
        }
    }

    Ok(resolved)
}

/// Serialize a collection of [`Sample`]s into a sample sheet.
///
/// # Errors
///
/// - [`SampleSheetError::Deserialize`] if writing fails
pub fn to_path<P: AsRef<Path>, S: AsRef<Sample>, I: IntoIterator<Item = S>>(
    path: P,
    samples: I,
) -> Result<(), SampleSheetError> {
    let mut writer = csv::WriterBuilder::new().has_headers(true).delimiter(b',').from_path(path)?;
    for s in samples {
        writer.serialize(s.as_ref())?;
    }
    writer.flush()?;
    Ok(())
}

impl AsRef<Sample> for Sample {
    fn as_ref(&self) -> &Sample {
        self
    }
}
