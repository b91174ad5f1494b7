//! Buffered readers and writers with transparent gzip support.
//!
//! Every text file this tool touches (BED inputs, the metrics file, problem
//! logs) may be gzip-compressed. Compression is keyed off the path: anything
//! ending in `.gz` is decompressed on read and compressed on write.

use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;

use flate2::read::MultiGzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;

use crate::errors::Error;

fn is_gzipped<P>(path: P) -> bool
where
    P: AsRef<Path>,
{
    path.as_ref()
        .extension()
        .map(|ext| ext == "gz")
        .unwrap_or(false)
}

/// Opens a buffered reader over `path`, decompressing when the path ends in
/// `.gz`.
pub fn open_reader<P>(path: P) -> Result<Box<dyn BufRead>, Error>
where
    P: AsRef<Path>,
{
    let path = path.as_ref();
    let file = File::open(path).map_err(|source| Error::FileOpen {
        path: path.to_path_buf(),
        source,
    })?;

    if is_gzipped(path) {
        Ok(Box::new(BufReader::new(MultiGzDecoder::new(file))))
    } else {
        Ok(Box::new(BufReader::new(file)))
    }
}

/// Creates a buffered writer at `path`, compressing when the path ends in
/// `.gz`.
pub fn create_writer<P>(path: P) -> Result<Box<dyn Write>, Error>
where
    P: AsRef<Path>,
{
    let path = path.as_ref();
    let file = File::create(path).map_err(|source| Error::FileOpen {
        path: path.to_path_buf(),
        source,
    })?;

    if is_gzipped(path) {
        Ok(Box::new(BufWriter::new(GzEncoder::new(
            file,
            Compression::default(),
        ))))
    } else {
        Ok(Box::new(BufWriter::new(file)))
    }
}

#[cfg(test)]
mod tests {
    use std::io::Read;

    use super::*;

    #[test]
    fn test_gzip_suffix_detection() {
        assert!(is_gzipped("sample.bed.gz"));
        assert!(!is_gzipped("sample.bed"));
        assert!(!is_gzipped("sample"));
    }

    #[test]
    fn test_plain_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("notes.txt");

        let mut writer = create_writer(&path).unwrap();
        writer.write_all(b"chr1\t0\t100\n").unwrap();
        drop(writer);

        let mut contents = String::new();
        open_reader(&path)
            .unwrap()
            .read_to_string(&mut contents)
            .unwrap();
        assert_eq!(contents, "chr1\t0\t100\n");
    }

    #[test]
    fn test_gzip_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("notes.txt.gz");

        let mut writer = create_writer(&path).unwrap();
        writer.write_all(b"chr1\t0\t100\n").unwrap();
        drop(writer);

        // The bytes on disk must actually be a gzip stream.
        let mut magic = [0u8; 2];
        File::open(&path).unwrap().read_exact(&mut magic).unwrap();
        assert_eq!(magic, [0x1f, 0x8b]);

        let mut contents = String::new();
        open_reader(&path)
            .unwrap()
            .read_to_string(&mut contents)
            .unwrap();
        assert_eq!(contents, "chr1\t0\t100\n");
    }

    #[test]
    fn test_missing_file_is_a_file_open_error() {
        let result = open_reader("/definitely/not/here.bed");
        assert!(matches!(result, Err(Error::FileOpen { .. })));
    }
}
