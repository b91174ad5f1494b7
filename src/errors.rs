//! Structured error kinds shared across the crate.
//!
//! Most command-level code works with [`anyhow::Result`]; these variants
//! exist for the failures the core needs to distinguish by kind rather than
//! by message.

use std::path::PathBuf;

use thiserror::Error;

/// Error kinds raised by the metrics core.
#[derive(Debug, Error)]
pub enum Error {
    /// A path could not be opened for reading or writing.
    #[error("could not open \"{}\": {source}", path.display())]
    FileOpen {
        /// The offending path.
        path: PathBuf,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// A BAM, BED, or header record could not be decoded.
    #[error("malformed {format} in \"{path}\": {reason}")]
    FileFormat {
        /// The format being decoded (e.g. "BAM", "BED", "SAM header").
        format: &'static str,
        /// The offending path, for the user's benefit.
        path: String,
        /// What went wrong.
        reason: String,
    },

    /// The invocation itself was invalid (unknown organism, bad option).
    #[error("{0}")]
    Config(String),

    /// An interval was added to a collection for a different reference.
    /// This is an internal bug trap: loaders group by reference first.
    #[error("reference \"{interval}\" does not match collection \"{collection}\"")]
    ReferenceMismatch {
        /// The reference carried by the interval being added.
        interval: String,
        /// The reference the collection was established with.
        collection: String,
    },

    /// A range query was requested but no index is available.
    #[error("alignment file \"{}\" has no index; TSS enrichment requires one (try \"samtools index\")", path.display())]
    Indexing {
        /// The alignment file that lacks an index.
        path: PathBuf,
    },
}
