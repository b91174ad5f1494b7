//! Utilities related to the file formats the tool reads.

pub mod bam;
pub mod bed;
pub mod sam;
