//! Per-site genotyping success: the percentage of samples with a called first allele at each site.

use std::{io::BufRead, path::Path};

use anyhow::{ensure, Result};
use fgoxide::io::DelimFile;
use serde::{Deserialize, Serialize};

use crate::vcf::{VariantRecord, VcfReader};

/// The genotyping success of one site.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SiteSuccess {
    pub chrom: String,
    pub pos: u64,
    /// Percentage (0 to 100) of samples whose genotype has a called first allele.
    pub success_percent: f64,
}

impl SiteSuccess {
    /// Compute the success of a record with `num_samples` samples.
    pub fn from_record(record: &VariantRecord, num_samples: usize) -> Self {
        let called = (0..num_samples)
            .filter(|&i| record.genotype(i).map_or(false, |gt| gt.first_allele_called()))
            .count();
        let success_percent =
            if num_samples == 0 { 0.0 } else { called as f64 / num_samples as f64 * 100.0 };
        Self { chrom: record.chrom().to_string(), pos: record.pos(), success_percent }
    }
}

/// Compute the success of every site in the VCF.
///
/// # Errors
///
/// - if the VCF has no samples
/// - if any record cannot be parsed
pub fn summarize<R: BufRead>(reader: VcfReader<R>) -> Result<Vec<SiteSuccess>> {
    let num_samples = reader.header().sample_names().len();
    ensure!(num_samples > 0, "VCF has no samples, cannot compute per-site success");
    let mut sites = vec![];
    for record in reader {
        sites.push(SiteSuccess::from_record(&record?, num_samples));
    }
    Ok(sites)
}

/// The mean success over all sites, `None` if there are none.
pub fn mean_success(sites: &[SiteSuccess]) -> Option<f64> {
    if sites.is_empty() {
        None
    } else {
        Some(sites.iter().map(|s| s.success_percent).sum::<f64>() / sites.len() as f64)
    }
}

/// Write the per-site success table.
pub fn write_site_success<P: AsRef<Path>>(path: P, sites: &[SiteSuccess]) -> Result<()> {
    DelimFile::default().write_tsv(&path.as_ref().to_path_buf(), sites)?;
    Ok(())
}

#[cfg(test)]
mod test {
    use tempfile::tempdir;

    use super::*;
    use crate::utils::test_commons::vcf_text;

    #[test]
    fn test_summarize() {
        let text = vcf_text(
            &["S1", "S2", "S3", "S4"],
            &[
                (100, vec!["0/1:10:30", "1/1:10:30", "./.:0:0", "0/0:10:30"]),
                (200, vec!["./.:1:1", ".:1:1", "./1:1:1", "1:5:5"]),
            ],
        );
        let sites = summarize(VcfReader::new(text.as_bytes()).unwrap()).unwrap();
        assert_eq!(
            sites,
            vec![
                SiteSuccess { chrom: String::from("chr1"), pos: 100, success_percent: 75.0 },
                SiteSuccess { chrom: String::from("chr1"), pos: 200, success_percent: 25.0 },
            ]
        );
        assert_eq!(mean_success(&sites), Some(50.0));
        assert_eq!(mean_success(&[]), None);
    }

    #[test]
    fn test_sites_only_vcf_is_an_error() {
        let text = vcf_text(&[], &[(100, vec![])]);
        assert!(summarize(VcfReader::new(text.as_bytes()).unwrap()).is_err());
    }

    #[test]
    fn test_write_site_success() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("sites.tsv");
        let sites =
            vec![SiteSuccess { chrom: String::from("chr2"), pos: 7, success_percent: 12.5 }];
        write_site_success(&path, &sites).unwrap();
        let read: Vec<SiteSuccess> = DelimFile::default().read_tsv(&path).unwrap();
        assert_eq!(read, sites);
    }
}
