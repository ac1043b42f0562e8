//! Utility functions.
use std::{
    fs::File,
    io::{BufWriter, Write},
    path::{Path, PathBuf},
};

use anyhow::{anyhow, bail, Context, Result};
use bgzf::CompressionLevel;
use lazy_static::lazy_static;
use regex::Regex;

/// The buffer size used for output files.
pub const BUFSIZE: usize = 64 * 1024;

/// The BGZF compression level used for output files.
pub const COMPRESSION_LEVEL: u8 = 3;

pub mod built_info {
    use lazy_static::lazy_static;
    include!(concat!(env!("OUT_DIR"), "/built.rs"));

    /// Get a software version string including
    ///   - Git commit hash
    ///   - Git dirty info (whether the repo had uncommitted changes)
    ///   - Cargo package version if no git info found
    fn get_software_version() -> String {
        let prefix = if let Some(s) = GIT_COMMIT_HASH {
            format!("{}-{}", PKG_VERSION, s[0..8].to_owned())
        } else {
            // This shouldn't happen
            PKG_VERSION.to_string()
        };
        let suffix = match GIT_DIRTY {
            Some(true) => "-dirty",
            _ => "",
        };
        format!("{}{}", prefix, suffix)
    }

    lazy_static! {
        /// Version of the software with git hash
        pub static ref VERSION: String = get_software_version();
    }
}

lazy_static! {
    /// bcl2fastq output for reads that could not be assigned on the instrument:
    /// `Undetermined_S0_L001_R1_001.fastq.gz`, `Undetermined_S0_R1_001.fastq.gz`, ...
    static ref UNDETERMINED_R1_REGEX: Regex =
        Regex::new(r"^Undetermined_.*_R1_.*\.fastq\.gz$").unwrap();
}

/// True if the path's extension is `gz`.
pub fn is_gzip_path<P: AsRef<Path>>(path: P) -> bool {
    path.as_ref().extension().map_or(false, |ext| ext == "gz")
}

/// Create a buffered writer to `path`.  If the path ends in `.gz` the output is BGZF compressed.
pub fn output_writer<P: AsRef<Path>>(path: P) -> Result<Box<dyn Write>> {
    let path = path.as_ref();
    let file = File::create(path)
        .with_context(|| format!("Unable to create file: {}", path.to_string_lossy()))?;
    let writer = BufWriter::with_capacity(BUFSIZE, file);
    if is_gzip_path(path) {
        let level = CompressionLevel::new(COMPRESSION_LEVEL)
            .map_err(|e| anyhow!("Invalid compression level {}: {:?}", COMPRESSION_LEVEL, e))?;
        Ok(Box::new(bgzf::Writer::new(writer, level)))
    } else {
        Ok(Box::new(writer))
    }
}

/// Locate the single `Undetermined_*_R1_*.fastq.gz` in a bcl2fastq output directory.
pub fn find_undetermined_fastq<P: AsRef<Path>>(dir: P) -> Result<PathBuf> {
    let dir = dir.as_ref();
    let mut found: Vec<PathBuf> = std::fs::read_dir(dir)
        .with_context(|| format!("Unable to read directory: {}", dir.to_string_lossy()))?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| {
            p.is_file()
                && p.file_name()
                    .map_or(false, |name| UNDETERMINED_R1_REGEX.is_match(&name.to_string_lossy()))
        })
        .collect();
    found.sort();
    match found.len() {
        0 => bail!("No Undetermined_*_R1_*.fastq.gz found in {}", dir.to_string_lossy()),
        1 => Ok(found.remove(0)),
        n => bail!(
            "Found {} Undetermined_*_R1_*.fastq.gz files in {}, expected one",
            n,
            dir.to_string_lossy()
        ),
    }
}

/// Resolve the `--fastq` argument: a file is used as is, a directory is searched with
/// [`find_undetermined_fastq`].
pub fn resolve_fastq_input<P: AsRef<Path>>(path: P) -> Result<PathBuf> {
    let path = path.as_ref();
    if path.is_dir() {
        find_undetermined_fastq(path)
    } else if path.is_file() {
        Ok(path.to_path_buf())
    } else {
        bail!("Input FASTQ does not exist: {}", path.to_string_lossy())
    }
}

/// The file name of `path` with any `.gz` and then `.vcf` suffix removed.
pub fn vcf_stem<P: AsRef<Path>>(path: P) -> String {
    let name =
        path.as_ref().file_name().map_or_else(String::new, |n| n.to_string_lossy().to_string());
    let name = name.strip_suffix(".gz").unwrap_or(&name);
    name.strip_suffix(".vcf").unwrap_or(name).to_string()
}

/// The QC output written next to the input when none is given:
/// `<stem>_QC_minDP_<dp>_minGQ_<gq>.vcf`.
pub fn default_qc_output<P: AsRef<Path>>(vcf: P, min_depth: i64, min_quality: i64) -> PathBuf {
    let vcf = vcf.as_ref();
    let name = format!("{}_QC_minDP_{}_minGQ_{}.vcf", vcf_stem(vcf), min_depth, min_quality);
    vcf.parent().map_or_else(|| PathBuf::from(&name), |parent| parent.join(&name))
}

/// Append `suffix` to the full file name of `path`, e.g. `out.vcf` becomes `out.vcf.failed-samples.csv`.
pub fn with_suffix<P: AsRef<Path>>(path: P, suffix: &str) -> PathBuf {
    let mut os = path.as_ref().as_os_str().to_owned();
    os.push(suffix);
    PathBuf::from(os)
}


#[cfg(test)]
mod test {
    use std::{
        fs,
        io::{BufReader, Read},
        path::PathBuf,
    };

    use rstest::rstest;
    use tempfile::tempdir;

    use super::*;

    #[rstest]
    #[case("/data/calls.vcf", "/data/calls_QC_minDP_6_minGQ_18.vcf")]
    #[case("/data/calls.vcf.gz", "/data/calls_QC_minDP_6_minGQ_18.vcf")]
    #[case("calls.bcf", "calls.bcf_QC_minDP_6_minGQ_18.vcf")]
    fn test_default_qc_output(#[case] input: &str, #[case] expected: &str) {
        assert_eq!(default_qc_output(input, 6, 18), PathBuf::from(expected));
    }

    #[test]
    fn test_with_suffix() {
        assert_eq!(
            with_suffix("/out/qc.vcf", ".failed-samples.csv"),
            PathBuf::from("/out/qc.vcf.failed-samples.csv")
        );
    }

    #[test]
    fn test_find_undetermined_fastq() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("Undetermined_S0_L001_R2_001.fastq.gz"), b"").unwrap();
        fs::write(dir.path().join("Sample_S1_L001_R1_001.fastq.gz"), b"").unwrap();
        assert!(find_undetermined_fastq(dir.path()).is_err());

        let r1 = dir.path().join("Undetermined_S0_L001_R1_001.fastq.gz");
        fs::write(&r1, b"").unwrap();
        assert_eq!(find_undetermined_fastq(dir.path()).unwrap(), r1);
        assert_eq!(resolve_fastq_input(dir.path()).unwrap(), r1);
        assert_eq!(resolve_fastq_input(&r1).unwrap(), r1);

        fs::write(dir.path().join("Undetermined_S0_L002_R1_001.fastq.gz"), b"").unwrap();
        assert!(find_undetermined_fastq(dir.path()).is_err());
    }

    #[test]
    fn test_resolve_fastq_input_missing() {
        let dir = tempdir().unwrap();
        assert!(resolve_fastq_input(dir.path().join("nope.fastq")).is_err());
    }

    #[test]
    fn test_output_writer_compresses_gz() {
        let dir = tempdir().unwrap();
        let plain = dir.path().join("out.txt");
        let gz = dir.path().join("out.txt.gz");
        for path in [&plain, &gz] {
            let mut w = output_writer(path).unwrap();
            w.write_all(b"hello\n").unwrap();
            w.flush().unwrap();
        }
        assert_eq!(fs::read(&plain).unwrap(), b"hello\n");

        let raw = fs::read(&gz).unwrap();
        assert_eq!(&raw[0..2], &[31, 139]);
        let mut decoded = String::new();
        bgzf::Reader::new(BufReader::new(fs::File::open(&gz).unwrap()))
            .read_to_string(&mut decoded)
            .unwrap();
        assert_eq!(decoded, "hello\n");
    }
}
