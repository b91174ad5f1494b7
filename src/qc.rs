//! Quality-control metrics for ATAC-seq alignment files.
//!
//! The pipeline has two phases. Phase one streams every record of the BAM
//! file through the alignment classifier, which tallies per-read-group
//! counters and credits peak overlaps as it goes. Phase two, run only when a
//! TSS file was supplied, makes a parallel position-indexed pass to build
//! the TSS coverage curve. The serialiser then renders the collected state
//! as a text report plus a JSON or TSV metrics file.

pub mod collector;
pub mod command;
pub mod metrics;
pub mod report;
pub mod tss;
