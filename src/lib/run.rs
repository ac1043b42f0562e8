use std::fs::create_dir_all;

use anyhow::{ensure, Context, Result};
use fgoxide::io::Io;
use log::info;
use seq_io::fastq::Reader;

use crate::{
    barcodes::BarcodeTable,
    demux::Demultiplexer,
    genotypes::GenotypeLoader,
    metrics::DemuxMetrics,
    opts::{Command, DemuxOpts, Opts, QcOpts, SnpSuccessOpts},
    qc::{evaluate, QcReport},
    rewriter::{
        write_failed_samples, write_sample_qc, RecordRewriter, FAILED_SAMPLES_SUFFIX,
        SAMPLE_QC_SUFFIX,
    },
    sample_metadata::validate_samples,
    sample_sheet,
    sample_writer::SampleWriters,
    site_success::{mean_success, summarize, write_site_success, SiteSuccess},
    utils::{built_info, resolve_fastq_input, with_suffix},
    vcf::open_vcf,
};

/// Run the subcommand selected on the command line.
pub fn run(opts: Opts) -> Result<(), anyhow::Error> {
    info!("gtseq version {}", built_info::VERSION.as_str());
    match opts.command {
        Command::Demux(opts) => run_demux(&opts).map(|_| ()),
        Command::Qc(opts) => run_qc(&opts).map(|_| ()),
        Command::SnpSuccess(opts) => run_snp_success(&opts).map(|_| ()),
    }
}

/// Demultiplex a FASTQ into one FASTQ per sample, then write the metrics files.
pub fn run_demux(opts: &DemuxOpts) -> Result<DemuxMetrics> {
    let fastq = resolve_fastq_input(&opts.fastq)?;
    let samples = sample_sheet::from_path(&opts.sample_sheet).with_context(|| {
        format!("Failed to read sample sheet: {}", opts.sample_sheet.to_string_lossy())
    })?;
    info!("Read {} samples from {}", samples.len(), opts.sample_sheet.to_string_lossy());

    // Every configuration error surfaces here, before any output is created.
    let samples = validate_samples(&samples, &BarcodeTable::default())?;
    let demuxer = Demultiplexer::new(&samples)?;

    create_dir_all(&opts.output_dir).with_context(|| {
        format!("Unable to create output directory: {}", opts.output_dir.to_string_lossy())
    })?;

    info!("Demultiplexing {}", fastq.to_string_lossy());
    let mut reader = Reader::new(Io::default().new_reader(&fastq)?);
    let mut writers = SampleWriters::new(&opts.output_dir, opts.compress_output);
    let mut unmatched = opts.as_unmatched_counter();
    let metrics = demuxer.demultiplex(&mut reader, &mut writers, unmatched.as_mut())?;

    info!("Closing {} sample files", writers.len());
    let output_paths = writers.finish().context("Failed to flush and finish writing.")?;

    info!("Writing stats");
    metrics.write_metrics_files(&samples, &output_paths, &opts.output_dir)?;
    if let Some(unmatched) = unmatched {
        unmatched.to_file(&opts.output_dir, opts.most_unmatched_to_output)?;
    }
    info!(
        "Processed {} reads: {} matched, {} unparseable, {} unmatched",
        metrics.total_reads,
        metrics.matched_reads(),
        metrics.unparseable_reads,
        metrics.unmatched_reads
    );
    Ok(metrics)
}

/// Gate the calls of a VCF, QC its samples, then write the QC'd VCF and reports.
pub fn run_qc(opts: &QcOpts) -> Result<QcReport> {
    let thresholds = opts.as_qc_thresholds();
    thresholds.validate()?;
    let gate = opts.as_call_gate();
    let controls = opts.control_regex()?;
    ensure!(opts.vcf.is_file(), "Input VCF does not exist: {}", opts.vcf.to_string_lossy());
    let output = opts.output_path();

    let mut reader = open_vcf(&opts.vcf)
        .with_context(|| format!("Failed to read VCF: {}", opts.vcf.to_string_lossy()))?;
    let header = reader.header().clone();
    info!("Found {} samples in {}", header.sample_names().len(), opts.vcf.to_string_lossy());
    info!(
        "Parameters: min depth = {}; min quality = {}; min proportion called = {}; het sigma = {}",
        gate.min_depth, gate.min_quality, thresholds.min_prop_called, thresholds.het_sigma
    );

    let mut loader = GenotypeLoader::new(&header, gate, |name| controls.is_match(name))?;
    let mut rewriter = RecordRewriter::new(&output, &header)?;
    for record in &mut reader {
        let mut record = record
            .with_context(|| format!("Failed to read VCF: {}", opts.vcf.to_string_lossy()))?;
        loader.process(&mut record)?;
        rewriter.write(&record)?;
    }
    let loaded = loader.finish();
    info!("Gated the calls of {} samples at {} sites", loaded.samples.len(), loaded.sites);

    let report = evaluate(&loaded, &thresholds);
    report.log_summary(&thresholds);

    let keep = if opts.drop_failed_samples { Some(report.keep_mask(&header)) } else { None };
    let output = rewriter.finish(keep.as_deref())?;
    info!("Wrote {}", output.to_string_lossy());

    let failed = with_suffix(&output, FAILED_SAMPLES_SUFFIX);
    write_failed_samples(&failed, &report)?;
    info!("Wrote {} failed samples to {}", report.num_failed(), failed.to_string_lossy());
    write_sample_qc(with_suffix(&output, SAMPLE_QC_SUFFIX), &report)?;
    Ok(report)
}

/// Write the per-site genotyping success of a VCF.
pub fn run_snp_success(opts: &SnpSuccessOpts) -> Result<Vec<SiteSuccess>> {
    let reader = open_vcf(&opts.vcf)
        .with_context(|| format!("Failed to read VCF: {}", opts.vcf.to_string_lossy()))?;
    let sites = summarize(reader)?;
    write_site_success(&opts.output, &sites)?;
    match mean_success(&sites) {
        Some(mean) => info!("Mean SNP success over {} sites: {:.2}%", sites.len(), mean),
        None => info!("No sites found in {}", opts.vcf.to_string_lossy()),
    }
    Ok(sites)
}
