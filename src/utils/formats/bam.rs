//! Utilities related to opening and manipulating Binary Alignment Map (BAM)
//! files.

use std::ffi::OsString;
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use anyhow::Context;
use noodles::bam;
use noodles::bam::bai;
use noodles::bgzf;
use noodles::sam::header::ReferenceSequences;
use noodles::sam::Header;
use tracing::debug;

use crate::errors::Error;

//==================================//
// Binary Alignment Map (BAM) files //
//==================================//

/// The concrete reader type this tool uses for BAM files.
pub type BamReader = bam::Reader<bgzf::Reader<BufReader<File>>>;

/// Attempts to open a BAM file from a given source.
fn open<P>(src: P) -> Result<BamReader, Error>
where
    P: AsRef<Path>,
{
    let path = src.as_ref();
    let file = File::open(path).map_err(|source| Error::FileOpen {
        path: path.to_path_buf(),
        source,
    })?;

    Ok(bam::Reader::new(BufReader::new(file)))
}

/// Utility struct which contains both the raw header (before being parsed,
/// as a string), and the parsed header (as a `noodles::sam::Header`).
pub struct RawAndParsedHeaders {
    /// The raw, unprocessed (and uncorrected) header [`String`] from the file.
    pub raw: String,
    /// The parsed, processed (and corrected) header [`Header`] from the file.
    pub parsed: Header,
}

/// Contains the BAM file reader, the parsed header from the BAM file, the
/// reference sequences read from the BAM file, and the location of the BAI
/// index file.
pub struct ParsedBAMFile {
    /// A reader for the BAM file.
    pub reader: BamReader,

    /// The raw and processed headers from the file, packaged together for
    /// convenience.
    pub header: RawAndParsedHeaders,

    /// The reference sequences read from the BAM file.
    pub reference_sequences: ReferenceSequences,

    /// The path to the associated BAM index file.
    pub index_path: PathBuf,
}

/// Utility enum to formalize in types whether or not to check for an index.
#[derive(PartialEq, Eq)]
pub enum IndexCheck {
    /// Checks that an index file exists when opening the BAM file. Opening
    /// fails with [`Error::Indexing`] when it does not.
    CheckForIndex,

    /// _Does not_ check for an index file when opening the BAM file.
    DontCheckForIndex,
}

/// Computes the conventional path of a BAM file's index (`<src>.bai`).
pub fn index_path<P>(src: P) -> PathBuf
where
    P: AsRef<Path>,
{
    let mut path = OsString::from(src.as_ref().as_os_str());
    path.push(".bai");
    PathBuf::from(path)
}

/// Opens a BAM file and parses its header. Header parsing applies the
/// corrections from [`super::sam::correct_common_header_mistakes`].
pub fn open_and_parse<P>(src: P, ensure_index: IndexCheck) -> anyhow::Result<ParsedBAMFile>
where
    P: AsRef<Path>,
{
    let src = src.as_ref();

    // (1) Construct the reader.
    debug!("reading BAM file from disk");
    let mut reader = open(src)?;

    // (2) Random access is only needed when TSS enrichment was requested,
    // but when it is, fail before the first pass rather than after it.
    let index_path = index_path(src);
    if ensure_index == IndexCheck::CheckForIndex && bai::read(&index_path).is_err() {
        return Err(Error::Indexing {
            path: src.to_path_buf(),
        }
        .into());
    }

    // (3) Parse the header and reference sequences.
    debug!("parsing the header and reference sequences");
    let raw_header = reader.read_header().with_context(|| {
        Error::FileFormat {
            format: "BAM",
            path: src.display().to_string(),
            reason: String::from("could not read a valid header"),
        }
        .to_string()
    })?;
    let mut parsed_header = super::sam::parse_header(raw_header.clone())?;
    let reference_sequences = reader
        .read_reference_sequences()
        .with_context(|| "reading reference sequences")?;

    // Some writers omit @SQ lines from the header text; the binary
    // reference table is authoritative either way.
    if parsed_header.reference_sequences().is_empty() {
        *parsed_header.reference_sequences_mut() = reference_sequences.clone();
    }

    // (4) Return the result.
    Ok(ParsedBAMFile {
        reader,
        header: RawAndParsedHeaders {
            raw: raw_header,
            parsed: parsed_header,
        },
        reference_sequences,
        index_path,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_index_path_appends_bai() {
        assert_eq!(
            index_path("sample.bam"),
            PathBuf::from("sample.bam.bai")
        );
    }

    #[test]
    fn test_missing_file_is_a_file_open_error() {
        let result = open("/definitely/not/here.bam");
        assert!(matches!(result, Err(Error::FileOpen { .. })));
    }
}
