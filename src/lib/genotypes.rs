//! Gating of per-sample genotype calls and accumulation of per-sample call tallies.
//!
//! A call keeps its genotype only if its depth is present and at least the minimum depth, and its
//! genotype quality is present and strictly greater than the minimum quality.  Every other call
//! has its genotype rewritten to `./.` in the record.  Excluded samples (e.g. controls) are left
//! untouched and are not tallied.

use log::info;
use noodles_vcf::Header;
use thiserror::Error;

use crate::vcf::{Genotype, VariantRecord, VcfError, DP_KEY, GQ_KEY};

/// The errors that may occur during genotype QC.
#[derive(Error, Debug, PartialEq)]
pub enum QcError {
    #[error("No samples were found after excluding control samples")]
    NoSamplesFound,

    #[error("Invalid value for {name}: {value}")]
    InvalidThreshold { name: String, value: String },
}

/// The per-call depth and quality gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CallGate {
    /// Calls with a depth below this are blanked.
    pub min_depth: i64,
    /// Calls with a quality at or below this are blanked.
    pub min_quality: i64,
}

impl Default for CallGate {
    fn default() -> Self {
        Self { min_depth: 6, min_quality: 18 }
    }
}

impl CallGate {
    /// True if a call with the given depth and quality keeps its genotype.
    pub fn passes(&self, depth: Option<i64>, quality: Option<i64>) -> bool {
        match (depth, quality) {
            (Some(dp), Some(gq)) => dp >= self.min_depth && gq > self.min_quality,
            _ => false,
        }
    }
}

/// One sample's call at one site.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SampleCall {
    pub depth: Option<i64>,
    pub quality: Option<i64>,
    pub genotype: Option<Genotype>,
}

impl SampleCall {
    /// Extract the call for the sample at `sample` from a record.
    pub fn from_record(record: &VariantRecord, sample: usize) -> Self {
        Self {
            depth: record.sample_int(sample, DP_KEY),
            quality: record.sample_int(sample, GQ_KEY),
            genotype: record.genotype(sample),
        }
    }

    /// True if the call has a genotype with no missing allele.
    pub fn is_called(&self) -> bool {
        self.genotype.as_ref().map_or(false, Genotype::is_called)
    }

    /// True if the call is called and heterozygous.
    pub fn is_heterozygous(&self) -> bool {
        self.genotype.as_ref().map_or(false, Genotype::is_heterozygous)
    }
}

/// Running counts for a single sample across all sites.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SampleTally {
    /// Sites seen.
    pub sites: usize,
    /// Sites with a called genotype after gating.
    pub called: usize,
    /// Called sites that are heterozygous.
    pub heterozygous: usize,
    /// Sites whose genotype was blanked by the gate.
    pub blanked: usize,
}

impl SampleTally {
    /// The fraction of sites that are called, 0 when no sites were seen.
    pub fn proportion_called(&self) -> f64 {
        if self.sites == 0 {
            0.0
        } else {
            self.called as f64 / self.sites as f64
        }
    }

    /// The fraction of called sites that are heterozygous, `None` when nothing was called.
    pub fn heterozygosity(&self) -> Option<f64> {
        if self.called == 0 {
            None
        } else {
            Some(self.heterozygous as f64 / self.called as f64)
        }
    }
}

/// The per-sample tallies produced by a [`GenotypeLoader`].
#[derive(Debug, Clone, PartialEq)]
pub struct LoadedGenotypes {
    /// The names of the retained samples, in header order.
    pub samples: Vec<String>,
    /// The tally for each retained sample.
    pub tallies: Vec<SampleTally>,
    /// The names of the excluded samples, in header order.
    pub excluded: Vec<String>,
    /// The number of sites processed.
    pub sites: usize,
}

/// Gates the calls of each record in place and tallies the retained samples.
#[derive(Debug)]
pub struct GenotypeLoader {
    gate: CallGate,
    /// For each header sample, the index into `samples`/`tallies` if retained.
    retained: Vec<Option<usize>>,
    samples: Vec<String>,
    excluded: Vec<String>,
    tallies: Vec<SampleTally>,
    sites: usize,
}

impl GenotypeLoader {
    /// Create a loader for the samples in `header`, skipping those for which `is_excluded` is true.
    ///
    /// # Errors
    ///
    /// - [`QcError::NoSamplesFound`] if no sample remains
    pub fn new<F>(header: &Header, gate: CallGate, is_excluded: F) -> Result<Self, QcError>
    where
        F: Fn(&str) -> bool,
    {
        let mut retained = Vec::with_capacity(header.sample_names().len());
        let mut samples = vec![];
        let mut excluded = vec![];
        for name in header.sample_names() {
            if is_excluded(name) {
                info!("Skipping control sample: {}", name);
                excluded.push(name.clone());
                retained.push(None);
            } else {
                retained.push(Some(samples.len()));
                samples.push(name.clone());
            }
        }
        if samples.is_empty() {
            return Err(QcError::NoSamplesFound);
        }
        let tallies = vec![SampleTally::default(); samples.len()];
        Ok(Self { gate, retained, samples, excluded, tallies, sites: 0 })
    }

    /// The retained sample names.
    pub fn samples(&self) -> &[String] {
        &self.samples
    }

    /// Gate every retained sample's call in `record`, blanking failing genotypes to `./.`.
    pub fn process(&mut self, record: &mut VariantRecord) -> Result<(), VcfError> {
        self.sites += 1;
        let mut blanked = vec![];
        for (column, slot) in self.retained.iter().enumerate() {
            let slot = match slot {
                Some(slot) => *slot,
                None => continue,
            };
            let call = SampleCall::from_record(record, column);
            let tally = &mut self.tallies[slot];
            tally.sites += 1;
            if self.gate.passes(call.depth, call.quality) {
                if call.is_called() {
                    tally.called += 1;
                    if call.is_heterozygous() {
                        tally.heterozygous += 1;
                    }
                }
            } else {
                blanked.push(column);
                tally.blanked += 1;
            }
        }
        record.blank_genotypes(&blanked)?;
        Ok(())
    }

    /// Consume the loader, returning the tallies.
    pub fn finish(self) -> LoadedGenotypes {
        LoadedGenotypes {
            samples: self.samples,
            tallies: self.tallies,
            excluded: self.excluded,
            sites: self.sites,
        }
    }
}
