//! Whole-sample QC over the tallies collected by [`crate::genotypes::GenotypeLoader`].
//!
//! QC runs in two passes:
//!
//! 1. A sample fails with [`FailureReason::InsufficientProportionCalled`] if the proportion of
//!    sites it has called is below the minimum.
//! 2. The mean and population standard deviation of heterozygosity are computed over the samples
//!    that survived the first pass.  A survivor fails with [`FailureReason::HeterozygosityOutlier`]
//!    if its heterozygosity lies outside `mean ± k·σ`.  The bounds are fixed before any sample is
//!    flagged.

use log::{info, warn};
use noodles_vcf::Header;
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};

use crate::genotypes::{LoadedGenotypes, QcError, SampleTally};

/// The thresholds applied to whole samples.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QcThresholds {
    /// The minimum proportion of sites that must be called.
    pub min_prop_called: f64,
    /// The number of standard deviations from the mean heterozygosity that is tolerated.
    pub het_sigma: f64,
}

impl Default for QcThresholds {
    fn default() -> Self {
        Self { min_prop_called: 0.75, het_sigma: 2.0 }
    }
}

impl QcThresholds {
    /// Check that the thresholds are usable.
    ///
    /// # Errors
    ///
    /// - [`QcError::InvalidThreshold`] if the minimum proportion is outside `[0, 1]` or sigma is
    ///   negative or not finite
    pub fn validate(&self) -> Result<(), QcError> {
        if !(0.0..=1.0).contains(&self.min_prop_called) {
            return Err(QcError::InvalidThreshold {
                name: String::from("min-prop-called"),
                value: self.min_prop_called.to_string(),
            });
        }
        if !self.het_sigma.is_finite() || self.het_sigma < 0.0 {
            return Err(QcError::InvalidThreshold {
                name: String::from("het-sigma"),
                value: self.het_sigma.to_string(),
            });
        }
        Ok(())
    }
}

/// Why a sample failed QC.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, AsRefStr, Serialize, Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum FailureReason {
    InsufficientProportionCalled,
    HeterozygosityOutlier,
}

/// A sample's QC failure and the statistic that caused it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Failure {
    pub reason: FailureReason,
    pub value: f64,
}

/// The QC result for one sample.
#[derive(Debug, Clone, PartialEq)]
pub struct SampleQcOutcome {
    /// The name of the sample.
    pub sample: String,
    /// The sample's call tallies.
    pub tally: SampleTally,
    /// Called sites over all sites.
    pub proportion_called: f64,
    /// Heterozygous calls over called sites, if the sample reached the second pass with calls.
    pub heterozygosity: Option<f64>,
    /// The failure, if the sample failed.
    pub failure: Option<Failure>,
}

impl SampleQcOutcome {
    /// True if the sample passed both passes.
    pub fn passed(&self) -> bool {
        self.failure.is_none()
    }
}

/// The heterozygosity population statistics of the first-pass survivors.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HeterozygosityBounds {
    pub mean: f64,
    pub sd: f64,
    pub lower: f64,
    pub upper: f64,
}

impl HeterozygosityBounds {
    /// True if `value` lies within `[lower, upper]`.
    pub fn contains(&self, value: f64) -> bool {
        self.lower <= value && value <= self.upper
    }
}

/// The outcome of QC for all retained samples.
#[derive(Debug, Clone, PartialEq)]
pub struct QcReport {
    /// One outcome per retained sample, in header order.
    pub outcomes: Vec<SampleQcOutcome>,
    /// The heterozygosity bounds, `None` if no sample had calls after the first pass.
    pub heterozygosity: Option<HeterozygosityBounds>,
    /// The names of samples excluded from QC.
    pub excluded: Vec<String>,
    /// The number of sites examined.
    pub sites: usize,
}

impl QcReport {
    /// The failed samples: first-pass failures in header order, then second-pass failures in
    /// header order.
    pub fn failures(&self) -> Vec<&SampleQcOutcome> {
        let with_reason = |reason: FailureReason| {
            self.outcomes.iter().filter(move |o| o.failure.map_or(false, |f| f.reason == reason))
        };
        with_reason(FailureReason::InsufficientProportionCalled)
            .chain(with_reason(FailureReason::HeterozygosityOutlier))
            .collect()
    }

    /// The number of samples that passed.
    pub fn num_passed(&self) -> usize {
        self.outcomes.iter().filter(|o| o.passed()).count()
    }

    /// The number of samples that failed.
    pub fn num_failed(&self) -> usize {
        self.outcomes.len() - self.num_passed()
    }

    /// The fraction of retained samples that passed.
    pub fn success_rate(&self) -> f64 {
        if self.outcomes.is_empty() {
            0.0
        } else {
            self.num_passed() as f64 / self.outcomes.len() as f64
        }
    }

    /// For each sample in `header`, true unless it failed QC.  Excluded samples are kept.
    pub fn keep_mask(&self, header: &Header) -> Vec<bool> {
        header
            .sample_names()
            .iter()
            .map(|name| !self.outcomes.iter().any(|o| !o.passed() && o.sample == *name))
            .collect()
    }

    /// Log the summary of this report.
    pub fn log_summary(&self, thresholds: &QcThresholds) {
        let props: Vec<f64> = self.outcomes.iter().map(|o| o.proportion_called).collect();
        if let Some((mean, sd)) = mean_and_sd(&props) {
            let min = props.iter().copied().fold(f64::INFINITY, f64::min);
            let max = props.iter().copied().fold(f64::NEG_INFINITY, f64::max);
            info!(
                "Proportion called (fail: <{:.1}%): min={:.3}; mean={:.3}; stdev={:.3}; max={:.3}",
                thresholds.min_prop_called * 100.0,
                min,
                mean,
                sd,
                max
            );
        }
        match &self.heterozygosity {
            Some(h) => info!(
                "Heterozygosity (fail: <{:.3} | >{:.3}): mean={:.3}; stdev={:.3}",
                h.lower, h.upper, h.mean, h.sd
            ),
            None => warn!("No sample passed the proportion called filter with any calls"),
        }
        for outcome in self.failures() {
            if let Some(failure) = outcome.failure {
                warn!(
                    "Sample {} failed QC: {} = {}",
                    outcome.sample, failure.reason, failure.value
                );
            }
        }
        info!("# success = {}", self.num_passed());
        info!("# fails = {}", self.num_failed());
        info!("success rate: {:.1}%", self.success_rate() * 100.0);
    }
}

/// The mean and population standard deviation of `values`, `None` if empty.
///
/// The values are shifted by the first value before summing, so a population of identical values
/// has a mean exactly equal to that value and a deviation of exactly zero.
pub fn mean_and_sd(values: &[f64]) -> Option<(f64, f64)> {
    let shift = *values.first()?;
    let n = values.len() as f64;
    let mean_shifted = values.iter().map(|v| v - shift).sum::<f64>() / n;
    let variance = values.iter().map(|v| (v - shift - mean_shifted).powi(2)).sum::<f64>() / n;
    Some((shift + mean_shifted, variance.sqrt()))
}

/// Run both QC passes over the loaded tallies.
pub fn evaluate(loaded: &LoadedGenotypes, thresholds: &QcThresholds) -> QcReport {
    let mut outcomes: Vec<SampleQcOutcome> = loaded
        .samples
        .iter()
        .zip(loaded.tallies.iter())
        .map(|(sample, tally)| {
            let proportion_called = tally.proportion_called();
            let failure = if proportion_called < thresholds.min_prop_called {
                Some(Failure {
                    reason: FailureReason::InsufficientProportionCalled,
                    value: proportion_called,
                })
            } else {
                None
            };
            SampleQcOutcome {
                sample: sample.clone(),
                tally: *tally,
                proportion_called,
                heterozygosity: None,
                failure,
            }
        })
        .collect();

    // Survivors without any called site have no heterozygosity and stay out of the population.
    for outcome in outcomes.iter_mut().filter(|o| o.passed()) {
        outcome.heterozygosity = outcome.tally.heterozygosity();
    }
    let het_values: Vec<f64> = outcomes.iter().filter_map(|o| o.heterozygosity).collect();
    let heterozygosity = mean_and_sd(&het_values).map(|(mean, sd)| HeterozygosityBounds {
        mean,
        sd,
        lower: mean - thresholds.het_sigma * sd,
        upper: mean + thresholds.het_sigma * sd,
    });

    if let Some(bounds) = &heterozygosity {
        for outcome in &mut outcomes {
            if let (None, Some(het)) = (outcome.failure, outcome.heterozygosity) {
                if !bounds.contains(het) {
                    outcome.failure =
                        Some(Failure { reason: FailureReason::HeterozygosityOutlier, value: het });
                }
            }
        }
    }

    QcReport { outcomes, heterozygosity, excluded: loaded.excluded.clone(), sites: loaded.sites }
}
