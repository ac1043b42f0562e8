//! A library of functionality for demultiplexing GTseq reads and QCing their genotype calls.
//!
//! # Overview
//!
//! Demultiplexing flows as follows:
//!
//! - [`sample_sheet::from_path`] reads the samples and [`sample_metadata::validate_samples`]
//!   resolves each sample's i7 label and i5 plate coordinate to barcode sequences using the
//!   [`barcodes::BarcodeTable`].
//! - The [`demux::Demultiplexer`] pulls reads one at a time, looks up the index pair in each read
//!   header (see [`fastq_header`]) and hands matched reads to the
//!   [`sample_writer::SampleWriters`], which open one output per sample on first use.
//! - [`metrics`] are collected as reads are classified and written once the input is exhausted.
//!
//! Genotype QC flows as follows:
//!
//! - The [`vcf::VcfReader`] pulls variant records one at a time through `noodles-vcf`.
//! - The [`genotypes::GenotypeLoader`] blanks calls failing the depth and quality gate and tallies
//!   the calls of every sample not excluded as a control.
//! - The [`rewriter::RecordRewriter`] stages the gated records to a temporary file.
//! - [`qc::evaluate`] fails samples with too few calls, then samples with outlying
//!   heterozygosity, after which the staged records are moved into place or subset.
#![deny(unsafe_code)]
#![allow(
    clippy::must_use_candidate,
    clippy::missing_panics_doc,
    clippy::missing_errors_doc,
    clippy::module_name_repetitions
)]
pub mod barcodes;
pub mod demux;
pub mod fastq_header;
pub mod genotypes;
pub mod metrics;
pub mod opts;
pub mod qc;
pub mod rewriter;
pub mod run;
pub mod sample_metadata;
pub mod sample_sheet;
pub mod sample_writer;
pub mod site_success;
pub mod utils;
pub mod vcf;
