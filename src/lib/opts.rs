#![forbid(unsafe_code)]

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use env_logger::Env;
use regex::Regex;

use crate::{
    genotypes::CallGate,
    metrics::UnmatchedCounter,
    qc::QcThresholds,
    utils::{built_info, default_qc_output},
};

pub static TOOL_NAME: &str = "gtseq";

static SHORT_USAGE: &str = "Demultiplexes GTseq reads by index pair and QCs their genotype calls.";

static LONG_USAGE: &str = "
Demultiplexes GTseq reads by index pair and QCs their genotype calls.

`demux` splits the Undetermined FASTQ written by bcl2fastq into one FASTQ per sample.  Each
sample's i7 label (e.g. `GTseq i7 001 10uM`) and i5 plate coordinate (e.g. `A01`, `A1` or `1A`)
are resolved to barcode sequences and a read is assigned to the sample whose `<i7>+<i5>` equals
the index pair at the end of the read header.  Reads matching no sample are counted and dropped.

The sample sheet is a CSV with the columns `Sample Name`, `Plate ID`, `i7 Name` and `i5 Name`
(case and spacing are ignored).

`qc` blanks low depth and low quality genotype calls in a VCF, then fails samples with too few
called sites or with outlying heterozygosity.  Failed samples are listed in
`<output>.failed-samples.csv` and may optionally be removed from the output VCF.  Samples whose
names match `--control-pattern` are ignored by QC and always kept.

`snp-success` reports, for each site, the percentage of samples with a called genotype.

Example invocation:

gtseq demux \\
  --fastq bcl2fastq-out/ \\
  --sample-sheet samples.csv \\
  --output-dir demuxed-fastqs/

gtseq qc --vcf calls.vcf.gz --drop-failed-samples
";

#[derive(Parser, Debug, Clone)]
#[clap(name = TOOL_NAME, version = built_info::VERSION.as_str(), about=SHORT_USAGE, long_about=LONG_USAGE, term_width=0)]
pub struct Opts {
    #[clap(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Split a FASTQ into one FASTQ per sample by index pair.
    Demux(DemuxOpts),
    /// Gate genotype calls and fail outlying samples.
    Qc(QcOpts),
    /// Report the per-site genotyping success of a VCF.
    SnpSuccess(SnpSuccessOpts),
}

#[derive(Args, Debug, Clone)]
pub struct DemuxOpts {
    /// Path to the input FASTQ, or a directory holding a single `Undetermined_*_R1_*.fastq.gz`.
    #[clap(long, short = 'f', display_order = 1)]
    pub fastq: PathBuf,

    /// Path to the sample sheet.
    #[clap(long, short = 's', display_order = 2)]
    pub sample_sheet: PathBuf,

    /// The directory to write outputs, created if it does not exist.
    ///
    /// This tool will overwrite existing files.
    #[clap(long, short, display_order = 3)]
    pub output_dir: PathBuf,

    /// Write BGZF compressed `.fastq.gz` files instead of plain `.fastq`.
    #[clap(long, short = 'z', display_order = 11)]
    pub compress_output: bool,

    /// Output the most frequent "unmatched" index pairs up to this number.
    ///
    /// If set to 0 unmatched index pairs will not be collected.
    #[clap(long, short = 'U', default_value = "1000", display_order = 31)]
    pub most_unmatched_to_output: usize,

    /// Max number of keys the most unmatched hash map is allowed to contain.
    #[clap(long, default_value = "5000000", display_order = 31, hide = true)]
    pub most_unmatched_max_map_size: usize,

    /// Number of keys to shrink the most unmatched hash map down to when it hits the `most_unmatched_max_map_size`.
    #[clap(long, default_value = "5000", display_order = 31, hide = true)]
    pub most_unmatched_downsize_to: usize,
}

impl DemuxOpts {
    /// The counter for unmatched index pairs, `None` if they are not being collected.
    pub fn as_unmatched_counter(&self) -> Option<UnmatchedCounter> {
        if self.most_unmatched_to_output > 0 {
            Some(UnmatchedCounter::new(
                self.most_unmatched_max_map_size,
                self.most_unmatched_downsize_to,
            ))
        } else {
            None
        }
    }
}

#[derive(Args, Debug, Clone)]
pub struct QcOpts {
    /// Path to the input VCF, optionally gzip or BGZF compressed.
    #[clap(long, short = 'v', display_order = 1)]
    pub vcf: PathBuf,

    /// Path to the output VCF.  Written BGZF compressed if it ends in `.gz`.
    ///
    /// [default: <vcf stem>_QC_minDP_<dp>_minGQ_<gq>.vcf next to the input]
    #[clap(long, short = 'o', display_order = 2)]
    pub output: Option<PathBuf>,

    /// Calls with a depth (DP) below this are set to missing.
    #[clap(long, default_value = "6", display_order = 11)]
    pub min_depth: i64,

    /// Calls with a genotype quality (GQ) at or below this are set to missing.
    #[clap(long, default_value = "18", display_order = 11)]
    pub min_quality: i64,

    /// Samples with a lower proportion of called sites fail QC.
    #[clap(long, default_value = "0.75", display_order = 21)]
    pub min_prop_called: f64,

    /// Samples whose heterozygosity is more than this many standard deviations from the mean fail QC.
    #[clap(long, default_value = "2.0", display_order = 21)]
    pub het_sigma: f64,

    /// Remove the failed samples' columns from the output VCF.
    #[clap(long, display_order = 21)]
    pub drop_failed_samples: bool,

    /// Samples whose names match this regular expression are excluded from QC.
    #[clap(long, default_value = "(?i)control", display_order = 31)]
    pub control_pattern: String,
}

impl QcOpts {
    /// Extract a [`CallGate`] from the CLI opts.
    pub fn as_call_gate(&self) -> CallGate {
        CallGate { min_depth: self.min_depth, min_quality: self.min_quality }
    }

    /// Extract the [`QcThresholds`] from the CLI opts.
    pub fn as_qc_thresholds(&self) -> QcThresholds {
        QcThresholds { min_prop_called: self.min_prop_called, het_sigma: self.het_sigma }
    }

    /// Compile `--control-pattern`.
    pub fn control_regex(&self) -> Result<Regex> {
        Regex::new(&self.control_pattern)
            .with_context(|| format!("Invalid control pattern: {}", self.control_pattern))
    }

    /// The output VCF, defaulting to a name derived from the input and the call gate.
    pub fn output_path(&self) -> PathBuf {
        self.output
            .clone()
            .unwrap_or_else(|| default_qc_output(&self.vcf, self.min_depth, self.min_quality))
    }
}

#[derive(Args, Debug, Clone)]
pub struct SnpSuccessOpts {
    /// Path to the input VCF, optionally gzip or BGZF compressed.
    #[clap(long, short = 'v', display_order = 1)]
    pub vcf: PathBuf,

    /// Path to the output TSV.
    #[clap(long, short = 'o', display_order = 2)]
    pub output: PathBuf,
}

/// Implement defaults that match the CLI options to allow for easier testing.
///
/// Note that these defaults exist only within test code.
#[cfg(test)]
impl Default for DemuxOpts {
    fn default() -> Self {
        Self {
            fastq: PathBuf::default(),
            sample_sheet: PathBuf::default(),
            output_dir: PathBuf::default(),
            compress_output: false,
            most_unmatched_to_output: 1_000,
            most_unmatched_max_map_size: crate::metrics::DEFAULT_UNMATCHED_MAX_COUNTER_SIZE,
            most_unmatched_downsize_to: crate::metrics::DEFAULT_UNMATCHED_DOWNSIZE_TO,
        }
    }
}

#[cfg(test)]
impl Default for QcOpts {
    fn default() -> Self {
        let gate = CallGate::default();
        let thresholds = QcThresholds::default();
        Self {
            vcf: PathBuf::default(),
            output: None,
            min_depth: gate.min_depth,
            min_quality: gate.min_quality,
            min_prop_called: thresholds.min_prop_called,
            het_sigma: thresholds.het_sigma,
            drop_failed_samples: false,
            control_pattern: String::from("(?i)control"),
        }
    }
}

/// Parse args and set up logging / tracing
pub fn setup() -> Opts {
    if std::env::var("RUST_LOG").is_err() {
        std::env::set_var("RUST_LOG", "info");
    }
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();

    Opts::parse()
}

#[cfg(test)]
mod test {
    use std::path::PathBuf;

    use clap::Parser;
    use matches::assert_matches;

    use super::{Command, DemuxOpts, Opts, QcOpts};

    #[test]
    fn test_qc_defaults_match_cli() {
        let opts = Opts::parse_from(["gtseq", "qc", "--vcf", "/data/calls.vcf.gz"]);
        let qc = match opts.command {
            Command::Qc(qc) => qc,
            other => panic!("Expected qc, found {:?}", other),
        };
        let expected = QcOpts { vcf: PathBuf::from("/data/calls.vcf.gz"), ..QcOpts::default() };
        assert_eq!(qc.as_call_gate(), expected.as_call_gate());
        assert_eq!(qc.as_qc_thresholds(), expected.as_qc_thresholds());
        assert_eq!(qc.control_pattern, expected.control_pattern);
        assert!(!qc.drop_failed_samples);
        assert_eq!(qc.output_path(), PathBuf::from("/data/calls_QC_minDP_6_minGQ_18.vcf"));
    }

    #[test]
    fn test_demux_defaults_match_cli() {
        let opts = Opts::parse_from(["gtseq", "demux", "-f", "in/", "-s", "s.csv", "-o", "out/"]);
        assert_matches!(opts.command, Command::Demux(_));
        if let Command::Demux(demux) = opts.command {
            let expected = DemuxOpts::default();
            assert_eq!(demux.most_unmatched_to_output, expected.most_unmatched_to_output);
            assert_eq!(demux.most_unmatched_max_map_size, expected.most_unmatched_max_map_size);
            assert_eq!(demux.most_unmatched_downsize_to, expected.most_unmatched_downsize_to);
            assert!(!demux.compress_output);
            assert!(demux.as_unmatched_counter().is_some());
        }
    }

    #[test]
    fn test_unmatched_counter_disabled() {
        let opts = DemuxOpts { most_unmatched_to_output: 0, ..DemuxOpts::default() };
        assert!(opts.as_unmatched_counter().is_none());
    }

    #[test]
    fn test_control_regex() {
        let opts = QcOpts::default();
        let re = opts.control_regex().unwrap();
        assert!(re.is_match("NegControl_1"));
        assert!(re.is_match("CONTROL"));
        assert!(!re.is_match("Sample_7"));
        let bad = QcOpts { control_pattern: String::from("(unclosed"), ..QcOpts::default() };
        assert!(bad.control_regex().is_err());
    }

    #[test]
    fn test_explicit_output() {
        let opts = Opts::parse_from([
            "gtseq",
            "qc",
            "-v",
            "calls.vcf",
            "-o",
            "qc.vcf.gz",
            "--min-depth",
            "10",
            "--het-sigma",
            "3",
            "--drop-failed-samples",
        ]);
        if let Command::Qc(qc) = opts.command {
            assert_eq!(qc.output_path(), PathBuf::from("qc.vcf.gz"));
            assert_eq!(qc.min_depth, 10);
            assert_eq!(qc.het_sigma, 3.0);
            assert!(qc.drop_failed_samples);
        } else {
            panic!("Expected qc");
        }
    }
}
