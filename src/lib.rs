//! `ataqv` collects quality-control metrics from ATAC-seq alignment files.
//!
//! Given a sorted, duplicate-marked BAM file -- and optionally a set of
//! called peaks, a set of transcription start sites, and excluded-region
//! lists -- it classifies every alignment record, tabulates fragment-length
//! and mapping-quality distributions, counts peak overlaps, and calculates
//! a TSS enrichment score, all split by read group. The package is composed
//! of both a library crate and a binary crate; this documentation covers
//! the library.
#![recursion_limit = "256"]
#![warn(missing_docs)]
#![warn(rust_2018_idioms)]
#![warn(rust_2021_compatibility)]

pub mod errors;
pub mod features;
pub mod organisms;
pub mod peaks;
pub mod qc;
pub mod utils;
