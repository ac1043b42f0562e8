//! Functionality directly related to demultiplexing a stream of FASTQ records.
//!
//! Each read is classified by the index pair in the comment of its header: reads whose index pair
//! exactly matches a sample's resolved `<i7>+<i5>` are written to that sample's FASTQ, all other
//! reads are counted and dropped.  Reads are pulled one at a time and never buffered.

use std::io::Read;

use ahash::AHashMap;
use anyhow::{Context, Result};
use bstr::ByteSlice;
use log::{debug, info, warn};
use seq_io::{fastq::Reader, BaseRecord};

use crate::{
    fastq_header::{index_pair, IndexPair},
    metrics::{DemuxMetrics, UnmatchedCounter},
    sample_metadata::ResolvedSample,
    sample_sheet::SampleSheetError,
    sample_writer::SampleWriters,
};

/// How often, in reads, progress is logged.
const LOG_PROGRESS_EVERY: usize = 1_000_000;

/// Where a single read should go.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum ReadAssignment<'a> {
    /// The read belongs to the sample at this index.
    Matched(usize),
    /// The read's header had no well-formed index pair.
    Unparseable,
    /// The read's index pair is well-formed but belongs to no sample.
    Unmatched(&'a [u8]),
}

/// Assigns reads to samples by exact lookup of the observed index pair.
#[derive(Debug)]
pub struct Demultiplexer<'a> {
    /// The samples being demultiplexed, in sample sheet order.
    samples: &'a [ResolvedSample],
    /// Index pair (`<i7>+<i5>`) to the index of the sample in `samples`.
    lookup: AHashMap<Vec<u8>, usize>,
}

impl<'a> Demultiplexer<'a> {
    /// Build the index pair lookup for the given samples.
    ///
    /// # Errors
    ///
    /// - [`SampleSheetError::ZeroSamples`] if no samples are given
    /// - [`SampleSheetError::IndexPairCollision`] if two samples share an index pair
    pub fn new(samples: &'a [ResolvedSample]) -> Result<Self, SampleSheetError> {
        if samples.is_empty() {
            return Err(SampleSheetError::ZeroSamples);
        }
        let mut lookup = AHashMap::with_capacity(samples.len());
        for (i, sample) in samples.iter().enumerate() {
            if let Some(other) = lookup.insert(sample.index_pair.to_vec(), i) {
                return Err(SampleSheetError::IndexPairCollision {
                    sample_a: samples[other].name().to_string(),
                    sample_b: sample.name().to_string(),
                    index_pair: sample.index_pair.to_string(),
                });
            }
        }
        Ok(Self { samples, lookup })
    }

    /// The samples being demultiplexed.
    pub fn samples(&self) -> &[ResolvedSample] {
        self.samples
    }

    /// Classify a read by its header.
    pub fn classify<'h>(&self, head: &'h [u8]) -> ReadAssignment<'h> {
        match index_pair(head) {
            IndexPair::Valid(pair) => match self.lookup.get(pair) {
                Some(i) => ReadAssignment::Matched(*i),
                None => ReadAssignment::Unmatched(pair),
            },
            IndexPair::Malformed(_) | IndexPair::Missing => ReadAssignment::Unparseable,
        }
    }

    /// Demultiplex every read from `reader` into `writers`.
    ///
    /// Well-formed index pairs that match no sample are tallied in `unmatched` when given.  Reads
    /// are written in input order.  The writers are not finished here; dropping them on the error
    /// path closes any open files.
    pub fn demultiplex<R: Read>(
        &self,
        reader: &mut Reader<R>,
        writers: &mut SampleWriters,
        mut unmatched: Option<&mut UnmatchedCounter>,
    ) -> Result<DemuxMetrics> {
        let mut metrics = DemuxMetrics::with_capacity(self.samples.len());
        while let Some(record) = reader.next() {
            let record = record.context("Failed to read FASTQ record")?;
            metrics.total_reads += 1;
            match self.classify(record.head()) {
                ReadAssignment::Matched(i) => {
                    writers.write_record(i, &self.samples[i], &record).with_context(|| {
                        format!("Failed to write reads for sample {}", self.samples[i].name())
                    })?;
                    metrics.per_sample_reads[i] += 1;
                }
                ReadAssignment::Unparseable => {
                    debug!("No usable index pair in read: {}", record.head().as_bstr());
                    metrics.unparseable_reads += 1;
                }
                ReadAssignment::Unmatched(pair) => {
                    debug!("Index pair {} matched no sample", pair.as_bstr());
                    if let Some(counter) = unmatched.as_deref_mut() {
                        counter.insert(pair);
                    }
                    metrics.unmatched_reads += 1;
                }
            }
            if metrics.total_reads % LOG_PROGRESS_EVERY == 0 {
                info!("Processed {} reads", metrics.total_reads);
            }
        }

        for i in metrics.samples_without_reads() {
            warn!(
                "Sample {} ({}) received no reads",
                self.samples[i].name(),
                self.samples[i].index_pair
            );
        }
        Ok(metrics)
    }
}

#[cfg(test)]
mod test {
    use std::fs;

    use matches::assert_matches;
    use rstest::rstest;
    use seq_io::fastq::{OwnedRecord, Reader};
    use tempfile::tempdir;

    use crate::{
        barcodes::BarcodeTable,
        metrics::UnmatchedCounter,
        sample_metadata::{validate_samples, ResolvedSample, Sample},
        sample_sheet::SampleSheetError,
        sample_writer::SampleWriters,
        utils::test_commons::Fq,
    };

    use super::{Demultiplexer, ReadAssignment};

    /// S1 is `ATCACG+AAACGG`, S2 is `ATCACG+AACGTT`, S3 is `CGATGT+AAACGG`.
    fn samples() -> Vec<ResolvedSample> {
        validate_samples(
            &[
                Sample::new("S1", "PL_1", "GTseq i7 001 10uM", "A01"),
                Sample::new("S2", "PL_1", "GTseq i7 001 10uM", "2A"),
                Sample::new("S3", "PL_1", "GTseq i7 002 10uM", "A1"),
            ],
            &BarcodeTable::default(),
        )
        .unwrap()
    }

    fn read(name: &str, index_pair: &str) -> OwnedRecord {
        Fq { name, bases: b"ACGTACGTAC", index_pair: Some(index_pair), ..Fq::default() }
            .to_owned_record()
    }

    fn reader_over(reads: &[OwnedRecord]) -> Reader<std::io::Cursor<Vec<u8>>> {
        let mut bytes = vec![];
        for r in reads {
            seq_io::BaseRecord::write(r, &mut bytes).unwrap();
        }
        Reader::new(std::io::Cursor::new(bytes))
    }

    fn slurp(path: &std::path::Path) -> Vec<OwnedRecord> {
        Reader::from_path(path).unwrap().records().map(Result::unwrap).collect()
    }

    #[rstest]
    #[case("1:N:0:ATCACG+AAACGG", ReadAssignment::Matched(0))]
    #[case("1:N:0:ATCACG+AACGTT", ReadAssignment::Matched(1))]
    #[case("1:N:0:CGATGT+AAACGG", ReadAssignment::Matched(2))]
    #[case("1:N:0:CGATGT+AACGTT", ReadAssignment::Unmatched(b"CGATGT+AACGTT"))]
    #[case("1:N:0:ATCACN+AAACGG", ReadAssignment::Unparseable)]
    #[case("1:N:0:1", ReadAssignment::Unparseable)]
    fn test_classify(#[case] comment: &str, #[case] expected: ReadAssignment) {
        let samples = samples();
        let demuxer = Demultiplexer::new(&samples).unwrap();
        let head = format!("M00123:45:000000000-ABCDE:1:1101:15589:1331 {}", comment);
        assert_eq!(demuxer.classify(head.as_bytes()), expected);
    }

    #[test]
    fn test_classify_no_comment() {
        let samples = samples();
        let demuxer = Demultiplexer::new(&samples).unwrap();
        assert_eq!(demuxer.classify(b"read1"), ReadAssignment::Unparseable);
    }

    #[test]
    fn test_demultiplex_is_a_partition() {
        let dir = tempdir().unwrap();
        let samples = samples();
        let demuxer = Demultiplexer::new(&samples).unwrap();
        let reads = vec![
            read("r1", "ATCACG+AAACGG"),
            read("r2", "CGATGT+AAACGG"),
            read("r3", "NNNNNN+AAACGG"),
            read("r4", "ATCACG+AAACGG"),
            read("r5", "GGGGGG+AAACGG"),
            read("r6", "CGATGT+AAACGG"),
            read("r7", "ATCACG+AAACGG"),
        ];
        let mut reader = reader_over(&reads);
        let mut writers = SampleWriters::new(dir.path(), false);
        let mut unmatched = UnmatchedCounter::default();
        let metrics = demuxer.demultiplex(&mut reader, &mut writers, Some(&mut unmatched)).unwrap();
        let paths = writers.finish().unwrap();

        assert_eq!(metrics.total_reads, 7);
        assert_eq!(metrics.per_sample_reads, vec![3, 0, 2]);
        assert_eq!(metrics.unparseable_reads, 1);
        assert_eq!(metrics.unmatched_reads, 1);
        assert_eq!(metrics.matched_reads() + metrics.dropped_reads(), metrics.total_reads);
        assert_eq!(unmatched.len(), 1);

        // input order is preserved within each sample
        assert_eq!(slurp(&paths[&0]), vec![reads[0].clone(), reads[3].clone(), reads[6].clone()]);
        assert_eq!(slurp(&paths[&2]), vec![reads[1].clone(), reads[5].clone()]);

        // the sample without reads gets no file
        assert!(!paths.contains_key(&1));
        assert_eq!(metrics.samples_without_reads(), vec![1]);
        assert!(!dir.path().join("GTSeq_001_A02_PL_1_S2.fastq").exists());
        assert!(dir.path().join("GTSeq_001_A01_PL_1_S1.fastq").exists());
    }

    #[test]
    fn test_demultiplex_empty_input() {
        let dir = tempdir().unwrap();
        let samples = samples();
        let demuxer = Demultiplexer::new(&samples).unwrap();
        let mut reader = reader_over(&[]);
        let mut writers = SampleWriters::new(dir.path(), false);
        let metrics = demuxer.demultiplex(&mut reader, &mut writers, None).unwrap();
        assert_eq!(metrics.total_reads, 0);
        assert_eq!(metrics.samples_without_reads(), vec![0, 1, 2]);
        assert!(writers.finish().unwrap().is_empty());
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_collision_fails_before_any_output() {
        let dir = tempdir().unwrap();
        let mut samples = samples();
        samples[2] = ResolvedSample {
            sample: Sample::new("S4", "PL_2", "GTseq i7 001 10uM", "A01"),
            ..samples[0].clone()
        };
        let result = Demultiplexer::new(&samples);
        assert_matches!(result, Err(SampleSheetError::IndexPairCollision { .. }));
        if let Err(SampleSheetError::IndexPairCollision { sample_a, sample_b, .. }) = result {
            assert_eq!(sample_a, "S1");
            assert_eq!(sample_b, "S4");
        }
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_no_samples() {
        assert_matches!(Demultiplexer::new(&[]), Err(SampleSheetError::ZeroSamples));
    }
}
