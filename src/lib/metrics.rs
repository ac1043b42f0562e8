//! Functionality pertaining to the collection of metrics during demultiplexing.
//!
//! A single [`DemuxMetrics`] is updated as each read is classified.  It counts the total reads
//! seen, the reads whose header carried no usable index pair, the reads whose index pair matched
//! no sample, and the reads assigned to each sample.
//!
//! Well-formed index pairs that match no sample are tallied by an [`UnmatchedCounter`].  Each time
//! the number of keys in that counter exceeds a set limit the unmatched index pairs are sorted by
//! most to least frequent, taking only the top N and dropping the rest.
//!
//! All metrics are writable to files.

use std::path::{Path, PathBuf};

use ahash::AHashMap;
use anyhow::Result;
use bstr::BString;
use fgoxide::io::DelimFile;
use itertools::Itertools;
use serde::{Deserialize, Serialize};

use crate::sample_metadata::ResolvedSample;

/// The max number of keys the hash can retain before re-sizing
pub const DEFAULT_UNMATCHED_MAX_COUNTER_SIZE: usize = 5_000_000;
/// The number of keys to downsize to
pub const DEFAULT_UNMATCHED_DOWNSIZE_TO: usize = 5_000;

/// The name of the run level metrics file.
pub const DEMUX_METRICS_FILE: &str = "demux_metrics.tsv";
/// The name of the per-sample metrics file.
pub const PER_SAMPLE_METRICS_FILE: &str = "per_sample_metrics.tsv";
/// The name of the file holding the most frequent unmatched index pairs.
pub const MOST_FREQUENT_UNMATCHED_FILE: &str = "most_frequent_unmatched.tsv";

/// Container for tracking the number of times each unmatched index pair has been seen.
///
/// This is done with a heuristic. Every time the inner hashmap grows over a set number of keys
/// the hashmap is sorted from most to least frequent and only the top N keys are kept, dropping the
/// remainder. This prevents the hashmap from growing infinitely large.
#[derive(Debug)]
pub struct UnmatchedCounter {
    /// The unmatched index pair counter.
    unmatched_counter: AHashMap<Vec<u8>, usize>,
    /// The max number of keys that can be held before downsizing.
    max_counter_size: usize,
    /// The number of keys to retain when downsizing.
    downsize_to: usize,
}

impl Default for UnmatchedCounter {
    fn default() -> Self {
        Self::new(DEFAULT_UNMATCHED_MAX_COUNTER_SIZE, DEFAULT_UNMATCHED_DOWNSIZE_TO)
    }
}

impl UnmatchedCounter {
    /// Create a new [`UnmatchedCounter`].
    ///
    /// # Argument
    /// - `max_counter_size` - the max number of keys the internal hashmap can contain before downsizing.
    /// - `downsize_to` - the number of keys to retain when downsizing.
    pub fn new(max_counter_size: usize, downsize_to: usize) -> Self {
        Self { unmatched_counter: AHashMap::new(), max_counter_size, downsize_to }
    }

    /// Count an index pair and check if the criteria has been met for downsizing.
    pub fn insert(&mut self, index_pair: &[u8]) {
        if let Some(count) = self.unmatched_counter.get_mut(index_pair) {
            *count += 1;
            return;
        }
        // If we have hit the max_counter_size, and we are about to add one more, downsize so as
        // to not hit max_counter_size + 1
        if self.unmatched_counter.len() >= self.max_counter_size {
            self.downsize();
        }
        self.unmatched_counter.insert(index_pair.to_vec(), 1);
    }

    /// Downsize the counter to `downsize_to` keys.
    ///
    /// Ties are broken on the index pair so the retained set does not depend on hash order.
    pub fn downsize(&mut self) {
        let new = AHashMap::with_capacity(self.downsize_to);
        let previous = std::mem::replace(&mut self.unmatched_counter, new);
        self.unmatched_counter.extend(
            previous
                .into_iter()
                .sorted_unstable_by(|(a, a_count), (b, b_count)| {
                    b_count.cmp(a_count).then_with(|| a.cmp(b))
                })
                .take(self.downsize_to),
        );
    }

    /// The number of distinct index pairs currently held.
    pub fn len(&self) -> usize {
        self.unmatched_counter.len()
    }

    /// True if no index pair has been counted.
    pub fn is_empty(&self) -> bool {
        self.unmatched_counter.is_empty()
    }

    /// The `n` most frequent index pairs, most frequent first.
    pub fn most_frequent(&self, n: usize) -> Vec<BarcodeCount> {
        self.unmatched_counter
            .iter()
            .sorted_unstable_by(|(a, a_count), (b, b_count)| {
                b_count.cmp(a_count).then_with(|| a.cmp(b))
            })
            .take(n)
            .map(|(pair, count)| BarcodeCount::new(BString::from(pair.as_slice()), *count))
            .collect()
    }

    /// Write the top `n` unmatched index pairs to a `most_frequent_unmatched.tsv` file in the
    /// specified directory.
    pub fn to_file<P: AsRef<Path>>(&self, output_dir: P, n: usize) -> Result<PathBuf> {
        let output_path = output_dir.as_ref().join(MOST_FREQUENT_UNMATCHED_FILE);
        let delim = DelimFile::default();
        delim.write_tsv(&output_path, self.most_frequent(n))?;
        Ok(output_path)
    }
}

/// Counts collected while demultiplexing a single read stream.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct DemuxMetrics {
    /// The total number of reads seen.
    pub total_reads: usize,
    /// Reads whose header had no well-formed index pair.
    pub unparseable_reads: usize,
    /// Reads with a well-formed index pair that matched no sample.
    pub unmatched_reads: usize,
    /// The reads assigned to each sample, in sample order.
    pub per_sample_reads: Vec<usize>,
}

impl DemuxMetrics {
    /// Create a [`DemuxMetrics`] tracking `num_samples` samples.
    pub fn with_capacity(num_samples: usize) -> Self {
        Self { per_sample_reads: vec![0; num_samples], ..Self::default() }
    }

    /// The number of reads that were assigned to a sample.
    pub fn matched_reads(&self) -> usize {
        self.per_sample_reads.iter().sum()
    }

    /// The reads that were not written to any sample.
    pub fn dropped_reads(&self) -> usize {
        self.unparseable_reads + self.unmatched_reads
    }

    /// The indices of samples that did not receive a single read.
    pub fn samples_without_reads(&self) -> Vec<usize> {
        self.per_sample_reads
            .iter()
            .enumerate()
            .filter(|(_, count)| **count == 0)
            .map(|(i, _)| i)
            .collect()
    }

    /// Write the metrics files associated with the [`DemuxMetrics`].
    ///
    /// This will create a `demux_metrics.tsv` and a `per_sample_metrics.tsv` file in the
    /// provided `output_dir`.  `output_paths` maps a sample index to the FASTQ written for it.
    pub fn write_metrics_files<P: AsRef<Path>>(
        &self,
        samples: &[ResolvedSample],
        output_paths: &AHashMap<usize, PathBuf>,
        output_dir: P,
    ) -> Result<()> {
        let run_metrics = RunMetrics {
            total_reads: self.total_reads,
            matched_reads: self.matched_reads(),
            unparseable_reads: self.unparseable_reads,
            unmatched_reads: self.unmatched_reads,
        };
        let delim = DelimFile::default();
        delim.write_tsv(
            &output_dir.as_ref().join(DEMUX_METRICS_FILE),
            std::iter::once(run_metrics),
        )?;

        let per_sample = samples.iter().zip(self.per_sample_reads.iter()).enumerate().map(
            |(i, (sample, reads))| SampleMetrics {
                sample_name: sample.name().to_string(),
                plate_id: sample.sample.plate.clone(),
                i7_numeral: sample.i7_numeral.clone(),
                i5_coordinate: sample.i5_coordinate.clone(),
                index_pair: sample.index_pair.to_string(),
                reads: *reads,
                fraction_of_total: if self.total_reads == 0 {
                    0.0
                } else {
                    *reads as f64 / self.total_reads as f64
                },
                fastq: output_paths
                    .get(&i)
                    .map_or_else(String::new, |p| p.to_string_lossy().to_string()),
            },
        );
        delim.write_tsv(&output_dir.as_ref().join(PER_SAMPLE_METRICS_FILE), per_sample)?;
        Ok(())
    }
}

/// The high level metrics for all reads that were demuxed.
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct RunMetrics {
    /// The total number of reads in the input.
    pub total_reads: usize,
    /// The number of reads written to a sample.
    pub matched_reads: usize,
    /// The number of reads without a well-formed index pair.
    pub unparseable_reads: usize,
    /// The number of reads whose index pair matched no sample.
    pub unmatched_reads: usize,
}

/// One row of the per-sample metrics file.
#[derive(Debug, Serialize, Deserialize, PartialEq)]
pub struct SampleMetrics {
    /// The name of the sample.
    pub sample_name: String,
    /// The plate the sample was prepared on.
    pub plate_id: String,
    /// The three digit i7 numeral.
    pub i7_numeral: String,
    /// The canonical i5 plate coordinate.
    pub i5_coordinate: String,
    /// The expected index pair, `<i7>+<i5>`.
    pub index_pair: String,
    /// The number of reads assigned to the sample.
    pub reads: usize,
    /// The fraction of all input reads assigned to the sample.
    pub fraction_of_total: f64,
    /// The absolute path of the sample's FASTQ, empty if no reads were assigned.
    pub fastq: String,
}

/// A helper struct for serializing and deserializing index pair counts.
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct BarcodeCount {
    /// The index pair.
    pub barcode: String,
    /// The count of the index pair.
    pub count: usize,
}

impl BarcodeCount {
    /// Create a new [`BarcodeCount`] instance.
    fn new(barcode: BString, count: usize) -> Self {
        Self { barcode: barcode.to_string(), count }
    }
}
