//! VCF reading and writing on top of `noodles-vcf`.
//!
//! Records are read into [`RecordBuf`]s so that gated genotypes can be rewritten before the record
//! is written back out.  A [`VcfWriter`] may be given a keep mask, in which case the header and
//! every record only carry the kept samples' columns.
//!
//! ```rust
//! use gtseq_lib::vcf::Genotype;
//! let gt = Genotype::new(vec![Some(0), Some(1)]);
//! assert!(gt.is_called() && gt.is_heterozygous());
//! assert!(!Genotype::new(vec![None, Some(1)]).first_allele_called());
//! ```

use std::{
    io::{self, BufRead, Write},
    path::Path,
};

use fgoxide::io::Io;
use itertools::Itertools;
use noodles_vcf::{
    self as vcf,
    variant::{
        io::Write as VariantRecordWrite,
        record::samples::keys::key,
        record_buf::samples::{
            sample::{value::Genotype as GenotypeBuf, Value},
            Samples,
        },
        RecordBuf,
    },
    Header,
};
use thiserror::Error;

/// The `FORMAT` key for the genotype.
pub const GT_KEY: &str = key::GENOTYPE;
/// The `FORMAT` key for read depth.
pub const DP_KEY: &str = "DP";
/// The `FORMAT` key for genotype quality.
pub const GQ_KEY: &str = "GQ";

/// The genotype written in place of a call that fails the gate.
const MISSING_GENOTYPE: &str = "./.";

/// The errors that may occur reading or writing a VCF.
#[derive(Error, Debug)]
pub enum VcfError {
    #[error("Io error occurred")]
    Io(#[from] io::Error),

    #[error("Io error occurred")]
    FgError(#[from] fgoxide::FgError),

    #[error("Invalid VCF header")]
    InvalidHeader(#[source] io::Error),

    #[error("Invalid VCF record {record}")]
    InvalidRecord {
        record: usize,
        #[source]
        source: io::Error,
    },

    #[error("Record {record} has {actual} sample columns, the header declares {expected}")]
    SampleCountMismatch { record: usize, expected: usize, actual: usize },

    #[error("Invalid genotype: {0}")]
    InvalidGenotype(String),
}

/// The allele indices of a genotype such as `0/1`, `1|1`, `./.` or the haploid `1`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Genotype {
    /// Allele indices, `None` for a missing allele.
    pub alleles: Vec<Option<usize>>,
}

impl Genotype {
    pub fn new(alleles: Vec<Option<usize>>) -> Self {
        Self { alleles }
    }

    /// True if there is at least one allele and no allele is missing.
    pub fn is_called(&self) -> bool {
        !self.alleles.is_empty() && self.alleles.iter().all(Option::is_some)
    }

    /// True if the genotype is called and carries at least two distinct alleles.
    pub fn is_heterozygous(&self) -> bool {
        self.is_called() && self.alleles.iter().unique().count() > 1
    }

    /// True if the first allele is not missing.
    pub fn first_allele_called(&self) -> bool {
        matches!(self.alleles.first(), Some(Some(_)))
    }
}

impl From<&GenotypeBuf> for Genotype {
    fn from(genotype: &GenotypeBuf) -> Self {
        Self::new(genotype.as_ref().iter().map(|allele| allele.position()).collect())
    }
}

/// A single VCF record.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VariantRecord {
    record: RecordBuf,
}

impl VariantRecord {
    pub fn new(record: RecordBuf) -> Self {
        Self { record }
    }

    /// The underlying `noodles` record.
    pub fn inner(&self) -> &RecordBuf {
        &self.record
    }

    /// The contig.
    pub fn chrom(&self) -> &str {
        self.record.reference_sequence_name()
    }

    /// The 1-based position, 0 if the record has none.
    pub fn pos(&self) -> u64 {
        self.record.variant_start().map_or(0, |pos| usize::from(pos) as u64)
    }

    /// The number of sample columns.
    pub fn num_samples(&self) -> usize {
        self.record.samples().values().count()
    }

    /// The value of `key` for a sample, `None` if the key is absent or the value missing.
    pub fn sample_value(&self, sample: usize, key: &str) -> Option<&Value> {
        let samples = self.record.samples();
        let i = samples.keys().as_ref().get_index_of(key)?;
        samples.values().nth(sample)?.values().get(i)?.as_ref()
    }

    /// The value of an integer field such as `DP` or `GQ`, `None` if absent or missing.
    pub fn sample_int(&self, sample: usize, key: &str) -> Option<i64> {
        match self.sample_value(sample, key) {
            Some(Value::Integer(n)) => Some(i64::from(*n)),
            _ => None,
        }
    }

    /// The sample's genotype, `None` if there is no `GT` or it is missing.
    pub fn genotype(&self, sample: usize) -> Option<Genotype> {
        match self.sample_value(sample, GT_KEY) {
            Some(Value::Genotype(genotype)) => Some(Genotype::from(genotype)),
            _ => None,
        }
    }

    /// Set the genotype of each listed sample to `./.`, filling omitted values before it.
    ///
    /// Returns false, changing nothing, if `GT` is not in `FORMAT`.
    pub fn blank_genotypes(&mut self, samples: &[usize]) -> Result<bool, VcfError> {
        let gt = match self.record.samples().keys().as_ref().get_index_of(GT_KEY) {
            Some(gt) => gt,
            None => return Ok(false),
        };
        if samples.is_empty() {
            return Ok(true);
        }
        let missing: GenotypeBuf = MISSING_GENOTYPE
            .parse()
            .map_err(|_| VcfError::InvalidGenotype(MISSING_GENOTYPE.to_string()))?;

        let keys = self.record.samples().keys().clone();
        let mut values = self.record.samples().values().map(|s| s.values().to_vec()).collect_vec();
        for &sample in samples {
            if let Some(column) = values.get_mut(sample) {
                if column.len() <= gt {
                    column.resize(gt + 1, None);
                }
                column[gt] = Some(Value::from(missing.clone()));
            }
        }
        *self.record.samples_mut() = Samples::new(keys, values);
        Ok(true)
    }

    /// A copy of this record holding only the samples whose entry in `keep` is true.
    ///
    /// `FORMAT` is dropped when no sample remains.
    pub fn retain_samples(&self, keep: &[bool]) -> Self {
        let samples = self.record.samples();
        let values = samples
            .values()
            .zip(keep)
            .filter(|(_, keep)| **keep)
            .map(|(column, _)| column.values().to_vec())
            .collect_vec();
        let mut record = self.record.clone();
        *record.samples_mut() = if values.is_empty() {
            Samples::default()
        } else {
            Samples::new(samples.keys().clone(), values)
        };
        Self { record }
    }
}

/// A copy of `header` naming only the samples whose entry in `keep` is true.
pub fn retain_samples(header: &Header, keep: &[bool]) -> Header {
    let names = header
        .sample_names()
        .iter()
        .zip(keep)
        .filter(|(_, keep)| **keep)
        .map(|(name, _)| name.clone())
        .collect_vec();
    let mut header = header.clone();
    *header.sample_names_mut() = names.into_iter().collect();
    header
}

/// Pulls [`VariantRecord`]s from a VCF one record at a time.
#[derive(Debug)]
pub struct VcfReader<R: BufRead> {
    reader: vcf::io::Reader<R>,
    header: Header,
    records: usize,
}

impl<R: BufRead> VcfReader<R> {
    /// Read the header from `inner`, leaving it positioned at the first record.
    pub fn new(inner: R) -> Result<Self, VcfError> {
        let mut reader = vcf::io::Reader::new(inner);
        let header = reader.read_header().map_err(VcfError::InvalidHeader)?;
        Ok(Self { reader, header, records: 0 })
    }

    /// The header of the VCF being read.
    pub fn header(&self) -> &Header {
        &self.header
    }
}

impl<R: BufRead> Iterator for VcfReader<R> {
    type Item = Result<VariantRecord, VcfError>;

    fn next(&mut self) -> Option<Self::Item> {
        let mut record = RecordBuf::default();
        match self.reader.read_record_buf(&self.header, &mut record) {
            Ok(0) => None,
            Ok(_) => {
                self.records += 1;
                let expected = self.header.sample_names().len();
                let actual = record.samples().values().count();
                if actual == expected {
                    Some(Ok(VariantRecord::new(record)))
                } else {
                    Some(Err(VcfError::SampleCountMismatch {
                        record: self.records,
                        expected,
                        actual,
                    }))
                }
            }
            Err(source) => Some(Err(VcfError::InvalidRecord { record: self.records + 1, source })),
        }
    }
}

/// Writes [`VariantRecord`]s, optionally keeping only some of the samples.
pub struct VcfWriter<W: Write> {
    writer: vcf::io::Writer<W>,
    header: Header,
    keep: Option<Vec<bool>>,
}

impl<W: Write> VcfWriter<W> {
    /// Write the header to `inner`, restricted to the samples whose entry in `keep` is true.
    pub fn new(inner: W, header: &Header, keep: Option<&[bool]>) -> Result<Self, VcfError> {
        let header = keep.map_or_else(|| header.clone(), |keep| retain_samples(header, keep));
        let mut writer = vcf::io::Writer::new(inner);
        writer.write_header(&header)?;
        Ok(Self { writer, header, keep: keep.map(<[bool]>::to_vec) })
    }

    /// Write a single record.
    pub fn write(&mut self, record: &VariantRecord) -> Result<(), VcfError> {
        match &self.keep {
            Some(keep) => {
                let record = record.retain_samples(keep);
                self.writer.write_variant_record(&self.header, record.inner())?;
            }
            None => self.writer.write_variant_record(&self.header, record.inner())?,
        }
        Ok(())
    }

    /// Flush and return the underlying writer.
    pub fn finish(mut self) -> Result<W, VcfError> {
        self.writer.get_mut().flush()?;
        Ok(self.writer.into_inner())
    }
}

/// Open a VCF, which may be gzip or BGZF compressed, and read its header.
pub fn open_vcf<P: AsRef<Path>>(
    path: P,
) -> Result<VcfReader<Box<dyn BufRead>>, VcfError> {
    let io = Io::default();
    let reader = io.new_reader(&path)?;
    VcfReader::new(Box::new(reader))
}

#[cfg(test)]
mod tests {
    use matches::assert_matches;
    use rstest::rstest;
    use tempfile::tempdir;

    use super::*;
    use crate::utils::test_commons::{vcf_text, write_vcf};

    fn read_all(text: &str) -> (Header, Vec<VariantRecord>) {
        let mut reader = VcfReader::new(text.as_bytes()).unwrap();
        let records = (&mut reader).map(Result::unwrap).collect();
        (reader.header().clone(), records)
    }

    fn write_all(header: &Header, records: &[VariantRecord], keep: Option<&[bool]>) -> String {
        let mut writer = VcfWriter::new(vec![], header, keep).unwrap();
        for record in records {
            writer.write(record).unwrap();
        }
        String::from_utf8(writer.finish().unwrap()).unwrap()
    }

    #[rstest]
    #[case("0/1", vec![Some(0), Some(1)], true, true)]
    #[case("1|1", vec![Some(1), Some(1)], true, false)]
    #[case("0/0", vec![Some(0), Some(0)], true, false)]
    #[case("./.", vec![None, None], false, false)]
    #[case("./1", vec![None, Some(1)], false, false)]
    #[case("1", vec![Some(1)], true, false)]
    #[case("1/2", vec![Some(1), Some(2)], true, true)]
    fn test_genotype(
        #[case] text: &str,
        #[case] alleles: Vec<Option<usize>>,
        #[case] called: bool,
        #[case] het: bool,
    ) {
        let gt = Genotype::from(&text.parse::<GenotypeBuf>().unwrap());
        assert_eq!(gt.alleles, alleles);
        assert_eq!(gt.is_called(), called);
        assert_eq!(gt.is_heterozygous(), het);
    }

    #[test]
    fn test_first_allele_called() {
        assert!(!Genotype::new(vec![None, Some(1)]).first_allele_called());
        assert!(Genotype::new(vec![Some(1), None]).first_allele_called());
        assert!(!Genotype::new(vec![]).first_allele_called());
        assert!(!Genotype::new(vec![]).is_called());
    }

    #[test]
    fn test_read_header_and_records() {
        let text = vcf_text(
            &["S1", "S2"],
            &[(100, vec!["0/1:10:30", "1/1:3:20"]), (200, vec!["./.:.:.", "0/0:8:40"])],
        );
        let mut reader = VcfReader::new(text.as_bytes()).unwrap();
        assert_eq!(reader.header().sample_names().iter().collect_vec(), vec!["S1", "S2"]);

        let first = reader.next().unwrap().unwrap();
        assert_eq!(first.chrom(), "chr1");
        assert_eq!(first.pos(), 100);
        assert_eq!(first.num_samples(), 2);
        assert_eq!(first.sample_int(0, DP_KEY), Some(10));
        assert_eq!(first.sample_int(1, GQ_KEY), Some(20));
        assert_eq!(first.genotype(0), Some(Genotype::new(vec![Some(0), Some(1)])));

        let second = reader.next().unwrap().unwrap();
        assert_eq!(second.sample_int(0, DP_KEY), None);
        assert_eq!(second.sample_int(0, "AD"), None);
        assert!(!second.genotype(0).map_or(false, |gt| gt.is_called()));
        assert!(reader.next().is_none());
    }

    #[test]
    fn test_write_then_read_preserves_records() {
        let text = vcf_text(
            &["S1", "S2"],
            &[(100, vec!["0/1:10:30", "1/1:3:20"]), (200, vec!["./.:1:1", "0|1:8:40"])],
        );
        let (header, records) = read_all(&text);
        let written = write_all(&header, &records, None);
        let (reread_header, reread) = read_all(&written);
        assert_eq!(reread_header.sample_names(), header.sample_names());
        assert_eq!(reread, records);
        // writing is deterministic
        assert_eq!(write_all(&reread_header, &reread, None), written);
    }

    #[test]
    fn test_subset_samples() {
        let text =
            vcf_text(&["S1", "S2", "S3"], &[(100, vec!["0/1:10:30", "1/1:3:20", "0/0:9:50"])]);
        let (header, records) = read_all(&text);
        let written = write_all(&header, &records, Some(&[true, false, true]));
        assert!(written
            .lines()
            .any(|l| l == "#CHROM\tPOS\tID\tREF\tALT\tQUAL\tFILTER\tINFO\tFORMAT\tS1\tS3"));

        let (subset_header, subset) = read_all(&written);
        assert_eq!(subset_header.sample_names().iter().collect_vec(), vec!["S1", "S3"]);
        assert_eq!(subset[0].num_samples(), 2);
        assert_eq!(subset[0].genotype(0), Some(Genotype::new(vec![Some(0), Some(1)])));
        assert_eq!(subset[0].genotype(1), Some(Genotype::new(vec![Some(0), Some(0)])));
        assert_eq!(subset[0].sample_int(1, GQ_KEY), Some(50));
    }

    #[test]
    fn test_subset_to_no_samples_drops_format() {
        let text = vcf_text(&["S1", "S2"], &[(100, vec!["0/1:10:30", "1/1:3:20"])]);
        let (header, records) = read_all(&text);
        let written = write_all(&header, &records, Some(&[false, false]));
        let data = written.lines().filter(|l| !l.starts_with('#')).collect_vec();
        assert_eq!(data.len(), 1);
        assert_eq!(data[0].split('\t').count(), 8);

        let (subset_header, subset) = read_all(&written);
        assert!(subset_header.sample_names().is_empty());
        assert_eq!(subset[0].num_samples(), 0);
    }

    #[test]
    fn test_blank_genotypes_pads_truncated() {
        let text = vcf_text(&["S1", "S2", "S3"], &[(5, vec!["1:3:40", ".", "0/1:10:30"])]);
        let (_, mut records) = read_all(&text);
        let record = &mut records[0];
        assert!(record.blank_genotypes(&[0, 1]).unwrap());

        let missing = Some(Genotype::new(vec![None, None]));
        assert_eq!(record.genotype(0), missing);
        assert_eq!(record.sample_int(0, DP_KEY), Some(3));
        assert_eq!(record.genotype(1), missing);
        assert_eq!(record.genotype(2), Some(Genotype::new(vec![Some(0), Some(1)])));
    }

    #[test]
    fn test_blank_genotypes_without_gt() {
        let text = "##fileformat=VCFv4.2\n\
                    ##FORMAT=<ID=DP,Number=1,Type=Integer,Description=\"Read Depth\">\n\
                    #CHROM\tPOS\tID\tREF\tALT\tQUAL\tFILTER\tINFO\tFORMAT\tS1\n\
                    chr1\t5\t.\tA\tG\t.\t.\t.\tDP\t4\n";
        let (_, mut records) = read_all(text);
        let before = records[0].clone();
        assert!(!records[0].blank_genotypes(&[0]).unwrap());
        assert_eq!(records[0], before);
        assert_eq!(records[0].genotype(0), None);
    }

    #[test]
    fn test_sites_only() {
        let text = vcf_text(&[], &[(100, vec![])]);
        let (header, records) = read_all(&text);
        assert!(header.sample_names().is_empty());
        assert_eq!(records[0].num_samples(), 0);
        assert!(records[0].genotype(0).is_none());
    }

    #[test]
    fn test_missing_header() {
        assert_matches!(VcfReader::new("".as_bytes()), Err(VcfError::InvalidHeader(_)));
        assert_matches!(
            VcfReader::new("##fileformat=VCFv4.2\nchr1\t1\t.\tA\tG\t.\t.\t.\n".as_bytes()),
            Err(VcfError::InvalidHeader(_))
        );
    }

    #[test]
    fn test_sample_count_mismatch() {
        let text = vcf_text(&["S1", "S2"], &[(100, vec!["0/1:10:30"])]);
        let mut reader = VcfReader::new(text.as_bytes()).unwrap();
        assert_matches!(reader.next(), Some(Err(_)));
    }

    #[test]
    fn test_malformed_position() {
        let mut text = vcf_text(&[], &[]);
        text.push_str("chr1\tX\t.\tA\tG\t.\t.\t.\n");
        let mut reader = VcfReader::new(text.as_bytes()).unwrap();
        assert_matches!(reader.next(), Some(Err(VcfError::InvalidRecord { record: 1, .. })));
    }

    #[test]
    fn test_open_vcf_from_path() {
        let dir = tempdir().unwrap();
        let path = write_vcf(dir.path(), "in.vcf", &["S1"], &[(1, vec!["0/0:10:30"])]);
        let reader = open_vcf(&path).unwrap();
        assert_eq!(reader.header().sample_names().len(), 1);
        assert_eq!(reader.count(), 1);
    }
}
