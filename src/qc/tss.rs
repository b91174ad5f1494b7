//! TSS enrichment: a second, position-indexed pass over the alignment file.
//!
//! For every transcription start site, per-base fragment coverage is summed
//! over a symmetric window around the site. References are processed in
//! parallel, busiest first; each worker opens its own cursor into the
//! alignment file and accumulates into task-local maps, which the driver
//! reduces serially. Workers run to completion even when one fails; the
//! first failure is reported afterwards, with its reference.

use std::collections::{HashMap, HashSet};
use std::path::Path;

use anyhow::Context;
use noodles::bam::bai;
use noodles::core::{Position, Region};
use rayon::prelude::*;
use tracing::debug;
use tracing::error;

use crate::errors::Error;
use crate::features::FeatureTree;
use crate::utils::formats::bam::{self, IndexCheck};
use crate::utils::read_groups::record_read_group;

use super::collector::{CollectorConfig, MetricsCollector};
use super::metrics::is_hqaa;

/// Coverage arrays per bucket id, as accumulated by one worker.
type CoverageByBucket = HashMap<String, Vec<u64>>;

/// Adds a fragment's footprint within the window to a coverage array.
///
/// The window is half-open `[window_start, window_end)`; the fragment's end
/// is treated inclusively, as the original coordinate conventions of this
/// calculation had it. For a reverse-strand TSS the offsets run from the
/// window's far edge backwards, so position 0 of every array is always the
/// upstream flank.
fn accumulate_fragment(
    coverage: &mut [u64],
    window_start: u64,
    window_end: u64,
    fragment_start: u64,
    fragment_end: u64,
    reverse: bool,
) {
    for p in window_start..window_end {
        if p >= fragment_start && p <= fragment_end {
            let base = if reverse {
                (window_end - 1 - p) as usize
            } else {
                (p - window_start) as usize
            };

            if base < coverage.len() {
                coverage[base] += 1;
            }
        }
    }
}

/// Collects TSS coverage for every TSS on one reference, from a private
/// cursor into the alignment file.
fn tss_coverage_for_reference(
    config: &CollectorConfig,
    tss_index: &FeatureTree,
    alignment_src: &Path,
    default_bucket_name: &str,
    reference: &str,
) -> anyhow::Result<CoverageByBucket> {
    let mut coverage_by_bucket = CoverageByBucket::new();

    let Some(collection) = tss_index.get(reference) else {
        return Ok(coverage_by_bucket);
    };

    let parsed = bam::open_and_parse(alignment_src, IndexCheck::DontCheckForIndex)?;
    let mut reader = parsed.reader;
    let header = parsed.header.parsed;
    let index = bai::read(&parsed.index_path).map_err(|_| Error::Indexing {
        path: alignment_src.to_path_buf(),
    })?;

    let extension = config.tss_extension as u64;
    let positions = 2 * config.tss_extension + 1;

    for tss in collection.items() {
        let window_start = tss.start.saturating_sub(extension);
        let window_end = tss.end + extension;

        // The BAM iterator yields records *starting* inside the queried
        // range, so ask for extra slack on both sides and filter the
        // fragments ourselves.
        let query_start = (window_start.saturating_sub(extension) + 1).max(1) as usize;
        let query_end = ((window_end + extension) as usize).max(1);

        let region = Region::new(
            reference,
            Position::new(query_start).unwrap_or(Position::MIN)
                ..=Position::new(query_end).unwrap_or(Position::MIN),
        );

        let query = match reader.query(&header, &index, &region) {
            Ok(query) => query,
            Err(e) => {
                error!(
                    "Could not find TSS region {:?} in your BAM file ({}). Check that \
                     your TSS file's chromosome naming scheme matches your reference.",
                    region, e
                );
                continue;
            }
        };

        // A fragment is counted once per TSS, whichever of its two reads
        // shows up first.
        let mut fragments_seen: HashSet<String> = HashSet::new();

        for result in query {
            let record = result?;

            if !is_hqaa(config, &header, &record) {
                continue;
            }

            let qname = record
                .read_name()
                .map(|name| name.to_string())
                .unwrap_or_default();
            if !fragments_seen.insert(qname) {
                continue;
            }

            let start = record
                .alignment_start()
                .map(|p| usize::from(p) as u64 - 1)
                .unwrap_or(0);
            let mate_start = record
                .mate_alignment_start()
                .map(|p| usize::from(p) as u64 - 1)
                .unwrap_or(0);

            let fragment_start = start.min(mate_start);
            let fragment_end =
                fragment_start + u64::from(record.template_length().unsigned_abs());

            if fragment_start <= window_end && window_start <= fragment_end {
                let bucket_id = if config.ignore_read_groups {
                    default_bucket_name.to_string()
                } else {
                    record_read_group(&record)
                        .unwrap_or_else(|| default_bucket_name.to_string())
                };

                let coverage = coverage_by_bucket
                    .entry(bucket_id)
                    .or_insert_with(|| vec![0; positions]);

                accumulate_fragment(
                    coverage,
                    window_start,
                    window_end,
                    fragment_start,
                    fragment_end,
                    tss.is_reverse(),
                );
            }
        }
    }

    Ok(coverage_by_bucket)
}

/// Runs the TSS coverage pass and folds the results into every bucket.
///
/// References are dispatched in descending TSS-count order onto a pool of
/// `threads` workers. The serial reduction is commutative per-position
/// addition, so the final state does not depend on completion order.
pub fn calculate_tss_coverage(
    collector: &mut MetricsCollector,
    alignment_src: &Path,
    default_bucket_name: &str,
    threads: usize,
) -> anyhow::Result<()> {
    if collector.config.tss_file.is_none() {
        return Ok(());
    }

    let tss_count = collector.tss_index.size() as u64;
    if tss_count == 0 {
        debug!("No usable TSS were loaded; skipping TSS enrichment.");
        return Ok(());
    }

    debug!("Calculating TSS coverage...");

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(threads.max(1))
        .build()
        .with_context(|| "building TSS worker pool")?;

    let references = collector.tss_index.references_by_count_descending();
    let config: &CollectorConfig = collector.config.as_ref();
    let tss_index = &collector.tss_index;

    let results: Vec<(String, anyhow::Result<CoverageByBucket>)> = pool.install(|| {
        references
            .par_iter()
            .map(|reference| {
                let result = tss_coverage_for_reference(
                    config,
                    tss_index,
                    alignment_src,
                    default_bucket_name,
                    reference,
                );
                (reference.clone(), result)
            })
            .collect()
    });

    // Fold every finished map in before surfacing any failure
    // (fail-after-drain): phase-1 metrics stay reportable either way.
    let mut failure: Option<anyhow::Error> = None;

    for (reference, result) in results {
        match result {
            Ok(coverage_by_bucket) => {
                for (bucket_id, coverage) in coverage_by_bucket {
                    if let Some(bucket) = collector.metrics.get_mut(&bucket_id) {
                        for (total, partial) in bucket.tss_coverage.iter_mut().zip(coverage) {
                            *total += partial;
                        }
                    }
                }
            }
            Err(e) if failure.is_none() => {
                failure = Some(e.context(format!(
                    "calculating TSS coverage for reference {}",
                    reference
                )));
            }
            Err(e) => {
                error!(
                    "TSS coverage also failed for reference {}: {:#}",
                    reference, e
                );
            }
        }
    }

    if let Some(e) = failure {
        return Err(e);
    }

    for bucket in collector.metrics.values_mut() {
        bucket.calculate_tss_metrics(tss_count);
    }

    debug!("Calculated TSS coverage.");

    Ok(())
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::super::metrics::Metrics;
    use super::*;

    #[test]
    fn test_forward_and_reverse_offsets_mirror() {
        // Window [100, 105), fragment covering [102, 103].
        let mut forward = vec![0u64; 5];
        accumulate_fragment(&mut forward, 100, 105, 102, 103, false);
        assert_eq!(forward, vec![0, 0, 1, 1, 0]);

        let mut reverse = vec![0u64; 5];
        accumulate_fragment(&mut reverse, 100, 105, 102, 103, true);
        assert_eq!(reverse, vec![0, 1, 1, 0, 0]);
    }

    #[test]
    fn test_fragment_clipped_to_window() {
        let mut coverage = vec![0u64; 5];
        accumulate_fragment(&mut coverage, 100, 105, 0, 1_000, false);
        assert_eq!(coverage, vec![1, 1, 1, 1, 1]);
    }

    fn tss_metrics(extension: usize) -> Metrics {
        let mut config = CollectorConfig::for_organism("human").unwrap();
        config.tss_file = Some("tss.bed".into());
        config.tss_extension = extension;
        Metrics::new(Arc::new(config), "rg1").unwrap()
    }

    #[test]
    fn test_flank_normalisation_scales_flanks_to_one() {
        // Two TSS, extension 100: a window of 201 positions. Coverage is
        // flat at 2 (1 per TSS) with a spike of 22 (11 per TSS) dead centre.
        let mut m = tss_metrics(100);
        assert_eq!(m.tss_coverage.len(), 201);

        m.tss_coverage = vec![2; 201];
        m.tss_coverage[100] = 22;

        m.calculate_tss_metrics(2);

        assert_eq!(m.tss_coverage_scaled.len(), 201);
        assert!((m.tss_enrichment - 11.0).abs() < 1e-9);

        let upstream: f64 = m.tss_coverage_scaled[..100].iter().sum::<f64>() / 100.0;
        let downstream: f64 = m.tss_coverage_scaled[101..].iter().sum::<f64>() / 100.0;
        assert!((upstream - 1.0).abs() < 1e-9);
        assert!((downstream - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_zero_tss_count_skips_normalisation() {
        let mut m = tss_metrics(100);
        m.tss_coverage = vec![5; 201];

        m.calculate_tss_metrics(0);

        assert!(m.tss_coverage_scaled.is_empty());
        assert_eq!(m.tss_enrichment, 0.0);
    }

    #[test]
    fn test_zero_flanks_preserve_nan() {
        let mut m = tss_metrics(100);
        m.tss_coverage = vec![0; 201];
        m.tss_coverage[100] = 10;

        m.calculate_tss_metrics(2);

        assert!(m.tss_coverage_scaled[0].is_nan());
        assert!(m.tss_enrichment.is_infinite() || m.tss_enrichment.is_nan());
    }
}
