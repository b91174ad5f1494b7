//! Reading Browser Extensible Data (BED) files.
//!
//! Peaks, transcription start sites, and excluded regions all arrive as BED:
//! tab-separated `reference start end [name [score [strand]]]` with 0-based,
//! half-open coordinates. Blank lines are ignored. Files whose names end in
//! `.gz` are decompressed transparently.

use std::io::BufRead;
use std::path::Path;

use crate::errors::Error;
use crate::features::{Feature, Strand};
use crate::utils::io::open_reader;

/// Parses one BED line. Blank lines yield `None`. The error is the reason
/// only; callers add the path and line number.
pub(crate) fn parse_record(line: &str) -> Result<Option<Feature>, String> {
    if line.trim().is_empty() {
        return Ok(None);
    }

    let mut fields = line.split_whitespace();

    let reference = fields
        .next()
        .ok_or_else(|| String::from("missing reference field"))?;

    let start: u64 = fields
        .next()
        .ok_or_else(|| String::from("missing start field"))?
        .parse()
        .map_err(|e| format!("invalid start: {}", e))?;

    let end: u64 = fields
        .next()
        .ok_or_else(|| String::from("missing end field"))?
        .parse()
        .map_err(|e| format!("invalid end: {}", e))?;

    if start > end {
        return Err(format!("start {} is beyond end {}", start, end));
    }

    let name = fields.next().unwrap_or_default();

    let score = match fields.next() {
        Some(raw) => Some(
            raw.parse::<f64>()
                .map_err(|e| format!("invalid score: {}", e))?,
        ),
        None => None,
    };

    let strand = match fields.next() {
        Some("+") => Some(Strand::Forward),
        Some("-") => Some(Strand::Reverse),
        _ => None,
    };

    let mut feature = Feature::new(reference, start, end, name);
    feature.score = score;
    feature.strand = strand;

    Ok(Some(feature))
}

/// Reads every feature from a BED file, in file order.
pub fn read_features<P>(path: P) -> Result<Vec<Feature>, Error>
where
    P: AsRef<Path>,
{
    let path = path.as_ref();
    let reader = open_reader(path)?;

    let mut features = Vec::new();
    for (number, line) in reader.lines().enumerate() {
        let line = line.map_err(|e| Error::FileFormat {
            format: "BED",
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;

        if let Some(feature) = parse_record(&line).map_err(|reason| Error::FileFormat {
            format: "BED",
            path: path.display().to_string(),
            reason: format!("line {}: {}", number + 1, reason),
        })? {
            features.push(feature);
        }
    }

    Ok(features)
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    #[test]
    fn test_parse_minimal_record() {
        let feature = parse_record("chr1\t100\t500").unwrap().unwrap();
        assert_eq!(feature.reference, "chr1");
        assert_eq!(feature.start, 100);
        assert_eq!(feature.end, 500);
        assert_eq!(feature.name, "");
        assert!(feature.score.is_none());
        assert!(feature.strand.is_none());
    }

    #[test]
    fn test_parse_full_record() {
        let feature = parse_record("chr1\t100\t500\tpeak_1\t87.5\t-")
            .unwrap()
            .unwrap();
        assert_eq!(feature.name, "peak_1");
        assert_eq!(feature.score, Some(87.5));
        assert_eq!(feature.strand, Some(Strand::Reverse));
        assert!(feature.is_reverse());
    }

    #[test]
    fn test_blank_lines_are_skipped() {
        assert!(parse_record("").unwrap().is_none());
        assert!(parse_record("   ").unwrap().is_none());
    }

    #[test]
    fn test_malformed_records() {
        assert!(parse_record("chr1").is_err());
        assert!(parse_record("chr1\tone\t100").is_err());
        assert!(parse_record("chr1\t500\t100").is_err());
    }

    #[test]
    fn test_dot_strand_is_none() {
        let feature = parse_record("chr1\t0\t1\ttss_1\t0\t.").unwrap().unwrap();
        assert!(feature.strand.is_none());
    }

    #[test]
    fn test_read_features_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("peaks.bed");

        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(file, "chr1\t100\t500\tpeak_1\t10\t+").unwrap();
        writeln!(file).unwrap();
        writeln!(file, "chr2\t0\t50\tpeak_2").unwrap();
        drop(file);

        let features = read_features(&path).unwrap();
        assert_eq!(features.len(), 2);

        // Writing a feature back and re-reading it preserves the reference,
        // start, end, and name.
        let rewritten = dir.path().join("rewritten.bed");
        let mut file = std::fs::File::create(&rewritten).unwrap();
        for feature in &features {
            writeln!(file, "{}", feature).unwrap();
        }
        drop(file);

        let reread = read_features(&rewritten).unwrap();
        assert_eq!(features, reread);
    }

    #[test]
    fn test_read_gzipped_features() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("peaks.bed.gz");

        let mut writer = crate::utils::io::create_writer(&path).unwrap();
        writeln!(writer, "chr1\t100\t500\tpeak_1").unwrap();
        drop(writer);

        let features = read_features(&path).unwrap();
        assert_eq!(features.len(), 1);
        assert_eq!(features[0].name, "peak_1");
    }
}
