#![forbid(unsafe_code)]
#![allow(clippy::must_use_candidate)]
//! Extract the observed index pair from a bcl2fastq FASTQ header.
//!
//! **Note**: only the structure needed to locate the index pair is validated; the remaining
//! fields of the header are not inspected.
//!
//! # Grammar
//!
//! The FASTQ headers are expected to conform to the following grammar:
//!
//! ```text
//! <header>         ::= <read-name> | “<read-name> <comment>”
//! <read-name>      ::= [^ ]+
//! <comment>        ::= <field> | “<field>:<comment>”
//! <index-pair>     ::= the last <field> of the <comment>
//! ```
//!
//! A well-formed index pair is exactly six called bases for the i7 index, a `+`, and six called
//! bases for the i5 index, e.g. `1:N:0:ATCACG+AAACGG`.
//!
//! # Usage
//!
//! ```rust
//! use gtseq_lib::fastq_header::{IndexPair, index_pair};
//! let header = b"M00123:45:000000000-ABCDE:1:1101:15589:1331 1:N:0:ATCACG+AAACGG";
//! assert_eq!(index_pair(header), IndexPair::Valid(b"ATCACG+AAACGG"));
//! ```

use bstr::ByteSlice;
use lazy_static::lazy_static;
use regex::bytes::Regex;

lazy_static! {
    /// Six called bases, `+`, six called bases.
    static ref INDEX_PAIR_REGEX: Regex = Regex::new(r"^[ACGT]{6}\+[ACGT]{6}$").unwrap();
}

/// The result of looking for the index pair in a FASTQ header.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum IndexPair<'a> {
    /// The header carries a well-formed index pair.
    Valid(&'a [u8]),
    /// The last comment field is not a well-formed index pair (e.g. contains an `N`).
    Malformed(&'a [u8]),
    /// The header has no comment at all.
    Missing,
}

impl<'a> IndexPair<'a> {
    /// True if a well-formed index pair was found.
    pub fn is_valid(&self) -> bool {
        matches!(self, Self::Valid(_))
    }
}

/// The comment portion of a FASTQ header: everything after the first space.
pub fn comment(header: &[u8]) -> Option<&[u8]> {
    let header = header.trim_end();
    header.find_byte(b' ').map(|i| header[i + 1..].trim_start()).filter(|c| !c.is_empty())
}

/// Extract the index pair from the last colon-separated field of the header's comment.
pub fn index_pair(header: &[u8]) -> IndexPair<'_> {
    match comment(header) {
        None => IndexPair::Missing,
        Some(comment) => {
            let last = comment.rsplit(|c| *c == b':').next().unwrap_or(comment);
            if INDEX_PAIR_REGEX.is_match(last) {
                IndexPair::Valid(last)
            } else {
                IndexPair::Malformed(last)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::{comment, index_pair, IndexPair};

    const READ_NAME: &str = "M00123:45:000000000-ABCDE:1:1101:15589:1331";

    #[test]
    fn test_comment() {
        let header = format!("{} 1:N:0:ATCACG+AAACGG", READ_NAME);
        assert_eq!(comment(header.as_bytes()), Some(b"1:N:0:ATCACG+AAACGG".as_slice()));
        assert_eq!(comment(READ_NAME.as_bytes()), None);
        assert_eq!(comment(format!("{} ", READ_NAME).as_bytes()), None);
    }

    #[rstest]
    #[case("1:N:0:ATCACG+AAACGG", IndexPair::Valid(b"ATCACG+AAACGG"))]
    #[case("2:Y:0:TTAGGC+TTTGTC", IndexPair::Valid(b"TTAGGC+TTTGTC"))]
    #[case("ATCACG+AAACGG", IndexPair::Valid(b"ATCACG+AAACGG"))]
    #[case("1:N:0:ATCACN+AAACGG", IndexPair::Malformed(b"ATCACN+AAACGG"))]
    #[case("1:N:0:ATCACG", IndexPair::Malformed(b"ATCACG"))]
    #[case("1:N:0:ATCACGA+AAACGG", IndexPair::Malformed(b"ATCACGA+AAACGG"))]
    #[case("1:N:0:atcacg+aaacgg", IndexPair::Malformed(b"atcacg+aaacgg"))]
    #[case("1:N:0:ATCACG+AAACGG:", IndexPair::Malformed(b""))]
    #[case("1:N:0:3", IndexPair::Malformed(b"3"))]
    fn test_index_pair(#[case] comment: &str, #[case] expected: IndexPair) {
        let header = format!("{} {}", READ_NAME, comment);
        assert_eq!(index_pair(header.as_bytes()), expected);
    }

    #[test]
    fn test_index_pair_trailing_newline() {
        let header = format!("{} 1:N:0:ATCACG+AAACGG\r\n", READ_NAME);
        assert_eq!(index_pair(header.as_bytes()), IndexPair::Valid(b"ATCACG+AAACGG"));
    }

    #[test]
    fn test_index_pair_missing_comment() {
        assert_eq!(index_pair(READ_NAME.as_bytes()), IndexPair::Missing);
        assert!(!IndexPair::Missing.is_valid());
    }
}
