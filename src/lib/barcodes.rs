#![forbid(unsafe_code)]
//! Resolution of the i7 and i5 index identifiers found in a GTseq sample sheet to the index
//! sequences that appear in the read headers.
//!
//! The i7 identifier is a free-text label (e.g. `GTseq i7 003 10uM`) from which a three digit
//! numeral is extracted.  The i5 identifier is a plate coordinate given either in canonical form
//! (`A01`, or `A1`) or in the alternate number-first form (`1A`).  Both notations normalize to the
//! canonical `<row><two digit column>` form, which is the key into the i5 table.

use std::fmt::Display;

use ahash::AHashMap;
use lazy_static::lazy_static;
use regex::Regex;
use thiserror::Error;

/// The i7 numeral to index sequence table for the GTseq panel.
pub const I7_BARCODES: &[(&str, &str)] = &[
    ("001", "ATCACG"),
    ("002", "CGATGT"),
    ("003", "TTAGGC"),
    ("004", "TGACCA"),
    ("006", "GCCAAT"),
    ("012", "CTTGTA"),
];

/// The i5 plate coordinate to index sequence table for the GTseq panel.
#[rustfmt::skip]
pub const I5_BARCODES: &[(&str, &str)] = &[
    ("A01", "AAACGG"), ("A02", "AACGTT"), ("A03", "AACTGA"), ("A04", "AAGACG"),
    ("A05", "AAGCTA"), ("A06", "AATATC"), ("A07", "AATGAG"), ("A08", "ACAAGA"),
    ("A09", "ACAGCG"), ("A10", "ACATAC"), ("A11", "ACCATG"), ("A12", "ACCCCC"),
    ("B01", "ACTCTT"), ("B02", "ACTGGC"), ("B03", "AGCCAT"), ("B04", "AGCGCA"),
    ("B05", "AGGGTC"), ("B06", "AGGTGT"), ("B07", "AGTAGG"), ("B08", "AGTTAA"),
    ("B09", "ATAGTA"), ("B10", "ATCAAA"), ("B11", "ATGCAC"), ("B12", "ATGTTG"),
    ("C01", "ATTCCG"), ("C02", "CAAAAA"), ("C03", "CAATCG"), ("C04", "CACCTC"),
    ("C05", "CAGGCA"), ("C06", "CATACT"), ("C07", "CCATTT"), ("C08", "CCCGGT"),
    ("C09", "CCCTAA"), ("C10", "CCGAGG"), ("C11", "CCGCAT"), ("C12", "CCTAAC"),
    ("D01", "CGAGGC"), ("D02", "CGCAGA"), ("D03", "CGCGTG"), ("D04", "CGGTCC"),
    ("D05", "CGTCTA"), ("D06", "CGTGAT"), ("D07", "CTACAG"), ("D08", "CTCGCC"),
    ("D09", "CTGCGA"), ("D10", "CTGGTT"), ("D11", "CTTATG"), ("D12", "CTTTGC"),
    ("E01", "GAAATG"), ("E02", "GAACCA"), ("E03", "GACGAC"), ("E04", "GACTCT"),
    ("E05", "GAGAGA"), ("E06", "AATCGT"), ("E07", "GCAGAT"), ("E08", "GCATGG"),
    ("E09", "GCCGTA"), ("E10", "GCGACC"), ("E11", "GCGCTG"), ("E12", "GCTCAA"),
    ("F01", "GGACTT"), ("F02", "GGCAAG"), ("F03", "GGGCGC"), ("F04", "GGGGCG"),
    ("F05", "GGTACA"), ("F06", "GGTTTG"), ("F07", "GTAAGT"), ("F08", "GTATCC"),
    ("F09", "GTCATC"), ("F10", "GTGCCT"), ("F11", "GTGTAA"), ("F12", "GTTGGA"),
    ("G01", "TAAGCT"), ("G02", "TAATTC"), ("G03", "TACACA"), ("G04", "TACGGG"),
    ("G05", "TAGTAT"), ("G06", "TATCAC"), ("G07", "TCAAAG"), ("G08", "TCCTGC"),
    ("G09", "TCGATT"), ("G10", "TCGCCA"), ("G11", "TCGGAC"), ("G12", "TCTCGG"),
    ("H01", "TCTTCT"), ("H02", "TGAACC"), ("H03", "TGACAA"), ("H04", "TGCCCG"),
    ("H05", "TGCTTA"), ("H06", "TGGGGA"), ("H07", "TTATGA"), ("H08", "TTCCGT"),
    ("H09", "TTCTAG"), ("H10", "TTGAGC"), ("H11", "TTTAAT"), ("H12", "TTTGTC"),
];

lazy_static! {
    /// A three digit i7 numeral somewhere in a free-text label, e.g. the `003` in `GTseq i7 003 10uM`.
    static ref I7_NUMERAL_REGEX: Regex = Regex::new(r"(0[01][1-6])").unwrap();
    /// Row first: `A01`, `A1`.
    static ref I5_CANONICAL_REGEX: Regex = Regex::new(r"^([A-H])(\d{1,2})$").unwrap();
    /// Column first: `1A`, `12H`.
    static ref I5_ALTERNATE_REGEX: Regex = Regex::new(r"^(\d{1,2})([A-H])$").unwrap();
}

/// The number of columns on a 96-well plate.
const PLATE_COLUMNS: u8 = 12;

/// Which of the two index reads a barcode belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexKind {
    I7,
    I5,
}

impl Display for IndexKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::I7 => write!(f, "i7"),
            Self::I5 => write!(f, "i5"),
        }
    }
}

/// The errors that may occur when resolving an index identifier.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum BarcodeError {
    #[error("Could not extract i7 barcode numeral from value: '{label}'")]
    InvalidBarcodeLabel { label: String },

    #[error("Invalid i5 plate coordinate: '{coordinate}'")]
    InvalidCoordinate { coordinate: String },

    #[error("No {kind} barcode sequence is known for '{key}'")]
    UnknownBarcode { kind: IndexKind, key: String },
}

/// The static i7 and i5 lookup tables.
#[derive(Debug, Clone)]
pub struct BarcodeTable {
    i7: AHashMap<String, String>,
    i5: AHashMap<String, String>,
}

impl Default for BarcodeTable {
    /// The GTseq panel tables ([`I7_BARCODES`] and [`I5_BARCODES`]).
    fn default() -> Self {
        Self::new(I7_BARCODES, I5_BARCODES)
    }
}

impl BarcodeTable {
    /// Build a table from `(numeral, sequence)` and `(canonical coordinate, sequence)` pairs.
    pub fn new(i7: &[(&str, &str)], i5: &[(&str, &str)]) -> Self {
        let to_map = |pairs: &[(&str, &str)]| {
            pairs.iter().map(|(k, v)| ((*k).to_string(), (*v).to_string())).collect()
        };
        Self { i7: to_map(i7), i5: to_map(i5) }
    }

    /// Resolve a free-text i7 label to its index sequence.
    ///
    /// # Errors
    ///
    /// - [`BarcodeError::InvalidBarcodeLabel`] if no numeral can be found in the label
    /// - [`BarcodeError::UnknownBarcode`] if the numeral is not in the table
    pub fn resolve_i7(&self, label: &str) -> Result<&str, BarcodeError> {
        let numeral = i7_numeral(label)?;
        self.i7.get(numeral).map(String::as_str).ok_or_else(|| BarcodeError::UnknownBarcode {
            kind: IndexKind::I7,
            key: numeral.to_string(),
        })
    }

    /// Resolve an i5 plate coordinate, in either notation, to its index sequence.
    ///
    /// # Errors
    ///
    /// - [`BarcodeError::InvalidCoordinate`] if the coordinate is in neither notation
    /// - [`BarcodeError::UnknownBarcode`] if the canonical coordinate is not in the table
    pub fn resolve_i5(&self, coordinate: &str) -> Result<&str, BarcodeError> {
        let canonical = normalize_i5(coordinate)?;
        self.i5
            .get(&canonical)
            .map(String::as_str)
            .ok_or(BarcodeError::UnknownBarcode { kind: IndexKind::I5, key: canonical })
    }
}

/// Extract the three digit i7 numeral from a free-text label.
///
/// # Errors
///
/// - [`BarcodeError::InvalidBarcodeLabel`] if no numeral of the expected shape is present
pub fn i7_numeral(label: &str) -> Result<&str, BarcodeError> {
    I7_NUMERAL_REGEX
        .find(label)
        .map(|m| m.as_str())
        .ok_or_else(|| BarcodeError::InvalidBarcodeLabel { label: label.to_string() })
}

/// Normalize an i5 plate coordinate to canonical form, e.g. `1A`, `A1` and `A01` all become `A01`.
///
/// # Errors
///
/// - [`BarcodeError::InvalidCoordinate`] if the value is in neither notation, or the column is
///   outside `1..=12`
pub fn normalize_i5(coordinate: &str) -> Result<String, BarcodeError> {
    let invalid = || BarcodeError::InvalidCoordinate { coordinate: coordinate.to_string() };
    let value = coordinate.trim().to_ascii_uppercase();

    let (row, column) = if let Some(captures) = I5_CANONICAL_REGEX.captures(&value) {
        (captures[1].to_string(), captures[2].to_string())
    } else if let Some(captures) = I5_ALTERNATE_REGEX.captures(&value) {
        (captures[2].to_string(), captures[1].to_string())
    } else {
        return Err(invalid());
    };

    let column: u8 = column.parse().map_err(|_| invalid())?;
    if column == 0 || column > PLATE_COLUMNS {
        return Err(invalid());
    }
    Ok(format!("{}{:02}", row, column))
}
