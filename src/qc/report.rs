//! Report assembly: the peak ranker and the three output modes (text,
//! JSON, tabular) built from collected bucket state.

use std::collections::BTreeSet;
use std::io;
use std::io::Write;
use std::path::Path;

use serde_json::json;
use serde_json::Value;

use crate::peaks::PeakIndex;
use crate::utils::io::create_writer;

use super::collector::MetricsCollector;
use super::metrics::Metrics;

/// The crate version, stamped into reports.
const VERSION: &str = env!("CARGO_PKG_VERSION");

/// `numerator / denominator`, yielding NaN rather than panicking or
/// saturating when the denominator is zero. NaN is preserved all the way to
/// the JSON output, where it serialises as `null`.
pub fn fraction(numerator: f64, denominator: f64) -> f64 {
    if denominator == 0.0 {
        f64::NAN
    } else {
        numerator / denominator
    }
}

/// `fraction`, as a percentage.
pub fn percentage(numerator: f64, denominator: f64) -> f64 {
    100.0 * fraction(numerator, denominator)
}

fn pct(numerator: u64, denominator: u64) -> String {
    format!(
        " ({:.3}%)",
        percentage(numerator as f64, denominator as f64)
    )
}

//=============//
// Peak ranker //
//=============//

/// Cumulative HQAA overlap across the best peaks.
#[derive(Clone, Copy, Debug, Default)]
pub struct TopPeakCounts {
    /// HQAA overlapping the single best peak.
    pub top_1: u64,
    /// Cumulative HQAA across the top 10 peaks.
    pub top_10: u64,
    /// Cumulative HQAA across the top 100 peaks.
    pub top_100: u64,
    /// Cumulative HQAA across the top 1,000 peaks.
    pub top_1000: u64,
    /// Cumulative HQAA across the top 10,000 peaks.
    pub top_10000: u64,
}

/// Ranks peaks by overlapping HQAA and captures the cumulative counts at
/// the conventional rank cutoffs.
pub fn determine_top_peaks(peaks: &PeakIndex) -> TopPeakCounts {
    let mut counts = TopPeakCounts::default();
    let mut cumulative = 0;

    for (index, peak) in peaks
        .list_peaks_by_overlapping_hqaa_descending()
        .iter()
        .enumerate()
    {
        let rank = index as u64 + 1;
        if rank > 10_000 {
            break;
        }

        cumulative += peak.overlapping_hqaa;

        if rank == 1 {
            counts.top_1 = cumulative;
        }
        if rank <= 10 {
            counts.top_10 = cumulative;
        }
        if rank <= 100 {
            counts.top_100 = cumulative;
        }
        if rank <= 1_000 {
            counts.top_1000 = cumulative;
        }
        counts.top_10000 = cumulative;
    }

    counts
}

/// The percentile curves of the peak ranker.
#[derive(Clone, Debug, Default)]
pub struct PeakPercentiles {
    /// Cumulative fraction of HQAA, over peaks ranked by HQAA descending.
    pub cumulative_fraction_of_hqaa: Vec<f64>,
    /// Cumulative fraction of peak territory, over peaks ranked by size
    /// descending.
    pub cumulative_fraction_of_territory: Vec<f64>,
}

/// Samples the cumulative curves at 100 equally-spaced percentile ranks
/// (`ceil(peak_count * k / 100)` for k = 1..=100). With fewer than 100
/// peaks, duplicate ranks collapse and the curves are shorter. With zero
/// HQAA the fractions are NaN, preserved into the output.
pub fn peak_percentiles(peaks: &PeakIndex, hqaa: u64) -> PeakPercentiles {
    let peak_count = peaks.size() as u64;
    if peak_count == 0 {
        return PeakPercentiles::default();
    }

    let percentile_indices: BTreeSet<u64> = (1..=100u64)
        .map(|k| (peak_count * k + 99) / 100)
        .collect();

    let mut percentiles = PeakPercentiles::default();

    let mut count = 0;
    let mut cumulative = 0.0;
    for peak in peaks.list_peaks_by_overlapping_hqaa_descending() {
        count += 1;
        cumulative += fraction(peak.overlapping_hqaa as f64, hqaa as f64);
        if percentile_indices.contains(&count) {
            percentiles.cumulative_fraction_of_hqaa.push(cumulative);
        }
    }

    let mut count = 0;
    let mut cumulative = 0.0;
    for peak in peaks.list_peaks_by_size_descending() {
        count += 1;
        cumulative += fraction(peak.size() as f64, peaks.total_peak_territory as f64);
        if percentile_indices.contains(&count) {
            percentiles.cumulative_fraction_of_territory.push(cumulative);
        }
    }

    percentiles
}

//======//
// JSON //
//======//

fn library_to_json(bucket: &Metrics) -> Value {
    serde_json::to_value(&bucket.library).unwrap_or(Value::Null)
}

fn fragment_length_counts_to_json(bucket: &Metrics) -> Value {
    // The curve is emitted densely out to at least 1000 so downstream
    // tooling always sees the nucleosomal range.
    let observed_max = bucket
        .fragment_length_counts
        .keys()
        .next_back()
        .copied()
        .unwrap_or(0);
    let max_fragment_length = observed_max.max(1000);

    let rows: Vec<Value> = (0..=max_fragment_length)
        .map(|length| {
            let count = bucket
                .fragment_length_counts
                .get(&length)
                .copied()
                .unwrap_or(0);
            json!([
                length,
                count,
                fraction(count as f64, bucket.total_reads as f64)
            ])
        })
        .collect();

    Value::Array(rows)
}

fn mapq_counts_to_json(bucket: &Metrics) -> Value {
    let rows: Vec<Value> = bucket
        .mapq_counts
        .iter_nonzero()
        .map(|(mapq, count)| json!([mapq, count]))
        .collect();
    Value::Array(rows)
}

fn chromosome_counts_to_json(bucket: &Metrics) -> Value {
    let rows: Vec<Value> = bucket
        .chromosome_counts
        .iter()
        .map(|(reference, count)| json!([reference, count]))
        .collect();
    Value::Array(rows)
}

fn max_fraction_reads_from_single_autosome(bucket: &Metrics) -> f64 {
    let total: u64 = bucket.chromosome_counts.values().sum();
    let max = bucket.chromosome_counts.values().max().copied().unwrap_or(0);
    fraction(max as f64, total as f64)
}

fn tss_coverage_to_json(bucket: &Metrics) -> Value {
    let rows: Vec<Value> = bucket
        .tss_coverage_scaled
        .iter()
        .enumerate()
        .map(|(i, scaled)| json!([i + 1, scaled]))
        .collect();
    Value::Array(rows)
}

fn bucket_to_json(collector: &MetricsCollector, bucket: &Metrics) -> Value {
    let config = &collector.config;

    let peak_list: Vec<Value> = bucket
        .peaks
        .list_peaks()
        .iter()
        .map(|peak| json!([peak.feature.name, peak.overlapping_hqaa, peak.size()]))
        .collect();

    let hqaa_overlapping_peaks: u64 = bucket
        .peaks
        .list_peaks()
        .iter()
        .map(|peak| peak.overlapping_hqaa)
        .sum();

    let top_peaks = determine_top_peaks(&bucket.peaks);
    let percentiles = peak_percentiles(&bucket.peaks, bucket.hqaa);

    let duplicate_fraction_in_peaks = fraction(
        bucket.peaks.duplicates_in_peaks as f64,
        bucket.peaks.ppm_in_peaks as f64,
    );
    let duplicate_fraction_not_in_peaks = fraction(
        bucket.peaks.duplicates_not_in_peaks as f64,
        bucket.peaks.ppm_not_in_peaks as f64,
    );

    json!({
        "ataqv_version": VERSION,
        "metrics": {
            "name": bucket.name,
            "organism": config.organism,
            "description": config.description,
            "url": config.url,
            "library": library_to_json(bucket),
            "total_reads": bucket.total_reads,
            "hqaa": bucket.hqaa,
            "forward_reads": bucket.forward_reads,
            "reverse_reads": bucket.reverse_reads,
            "secondary_reads": bucket.secondary_reads,
            "supplementary_reads": bucket.supplementary_reads,
            "duplicate_reads": bucket.duplicate_reads,
            "paired_reads": bucket.paired_reads,
            "paired_and_mapped_reads": bucket.paired_and_mapped_reads,
            "properly_paired_and_mapped_reads": bucket.properly_paired_and_mapped_reads,
            "fr_reads": bucket.fr_reads,
            "ff_reads": bucket.ff_reads,
            "rf_reads": bucket.rf_reads,
            "rr_reads": bucket.rr_reads,
            "first_reads": bucket.first_reads,
            "second_reads": bucket.second_reads,
            "forward_mate_reads": bucket.forward_mate_reads,
            "reverse_mate_reads": bucket.reverse_mate_reads,
            "unmapped_reads": bucket.unmapped_reads,
            "unmapped_mate_reads": bucket.unmapped_mate_reads,
            "qcfailed_reads": bucket.qcfailed_reads,
            "unpaired_reads": bucket.unpaired_reads,
            "reads_with_mate_mapped_to_different_reference":
                bucket.reads_with_mate_mapped_to_different_reference,
            "reads_mapped_with_zero_quality": bucket.reads_mapped_with_zero_quality,
            "reads_mapped_and_paired_but_improperly":
                bucket.reads_mapped_and_paired_but_improperly,
            "unclassified_reads": bucket.unclassified_reads,
            "maximum_proper_pair_fragment_size": bucket.maximum_proper_pair_fragment_size,
            "reads_with_mate_too_distant": bucket.reads_with_mate_too_distant,
            "total_autosomal_reads": bucket.total_autosomal_reads,
            "total_mitochondrial_reads": bucket.total_mitochondrial_reads,
            "duplicate_autosomal_reads": bucket.duplicate_autosomal_reads,
            "duplicate_mitochondrial_reads": bucket.duplicate_mitochondrial_reads,
            "hqaa_short_count": bucket.hqaa_short_count,
            "hqaa_mononucleosomal_count": bucket.hqaa_mononucleosomal_count,
            "short_mononucleosomal_ratio": fraction(
                bucket.hqaa_short_count as f64,
                bucket.hqaa_mononucleosomal_count as f64,
            ),
            "hqaa_in_peaks": bucket.peaks.hqaa_in_peaks,
            "duplicates_in_peaks": bucket.peaks.duplicates_in_peaks,
            "duplicates_not_in_peaks": bucket.peaks.duplicates_not_in_peaks,
            "ppm_in_peaks": bucket.peaks.ppm_in_peaks,
            "ppm_not_in_peaks": bucket.peaks.ppm_not_in_peaks,
            "duplicate_fraction_in_peaks": duplicate_fraction_in_peaks,
            "duplicate_fraction_not_in_peaks": duplicate_fraction_not_in_peaks,
            "peak_duplicate_ratio": fraction(
                duplicate_fraction_not_in_peaks,
                duplicate_fraction_in_peaks,
            ),
            "fragment_length_counts_fields":
                ["fragment_length", "read_count", "fraction_of_all_reads"],
            "fragment_length_counts": fragment_length_counts_to_json(bucket),
            "mapq_counts_fields": ["mapq", "read_count"],
            "mapq_counts": mapq_counts_to_json(bucket),
            "mean_mapq": bucket.mean_mapq(),
            "median_mapq": bucket.median_mapq(),
            "peaks_fields": ["name", "overlapping_hqaa", "territory"],
            "peaks": peak_list,
            "peak_percentiles": {
                "cumulative_fraction_of_hqaa": percentiles.cumulative_fraction_of_hqaa,
                "cumulative_fraction_of_territory":
                    percentiles.cumulative_fraction_of_territory,
            },
            "total_peaks": bucket.peaks.size(),
            "total_peak_territory": bucket.peaks.total_peak_territory,
            "top_peak_hqaa_read_count": top_peaks.top_1,
            "top_10_peak_hqaa_read_count": top_peaks.top_10,
            "top_100_peak_hqaa_read_count": top_peaks.top_100,
            "top_1000_peak_hqaa_read_count": top_peaks.top_1000,
            "top_10000_peak_hqaa_read_count": top_peaks.top_10000,
            "hqaa_overlapping_peaks_percent":
                percentage(hqaa_overlapping_peaks as f64, bucket.hqaa as f64),
            "tss_coverage": tss_coverage_to_json(bucket),
            "tss_enrichment": bucket.tss_enrichment,
            "chromosome_counts": chromosome_counts_to_json(bucket),
            "max_fraction_reads_from_single_autosome":
                max_fraction_reads_from_single_autosome(bucket),
        }
    })
}

/// The full JSON report: one object per bucket, in natural bucket order.
pub fn to_json(collector: &MetricsCollector) -> Value {
    let buckets: Vec<Value> = collector
        .bucket_names()
        .iter()
        .filter_map(|name| collector.metrics.get(name))
        .map(|bucket| bucket_to_json(collector, bucket))
        .collect();
    Value::Array(buckets)
}

//======//
// Text //
//======//

fn write_configuration<W: Write>(
    w: &mut W,
    collector: &MetricsCollector,
    threads: usize,
) -> io::Result<()> {
    let config = &collector.config;

    writeln!(w, "ataqv {}", VERSION)?;
    writeln!(w)?;
    writeln!(w, "Operating parameters")?;
    writeln!(w, "====================")?;
    writeln!(w, "Thread limit: {}", threads)?;
    writeln!(
        w,
        "Ignoring read groups: {}",
        if config.ignore_read_groups { "yes" } else { "no" }
    )?;
    if config.tss_file.is_some() {
        writeln!(w, "TSS extension: {}", config.tss_extension)?;
    }
    writeln!(w)?;
    writeln!(w, "Experiment information")?;
    writeln!(w, "======================")?;
    writeln!(w, "Organism: {}", config.organism)?;
    writeln!(w, "Description: {}", config.description)?;
    writeln!(w, "URL: {}", config.url)?;
    writeln!(w)?;
    writeln!(w, "Reference genome configuration")?;
    writeln!(w, "==============================")?;
    writeln!(
        w,
        "Mitochondrial reference: {}",
        config.mitochondrial_reference_name
    )?;
    writeln!(w, "Autosomal references:")?;
    writeln!(w, "  {}", config.autosomal_reference_string())?;
    writeln!(w)
}

fn total_problems(m: &Metrics) -> u64 {
    m.unmapped_reads
        + m.unmapped_mate_reads
        + m.qcfailed_reads
        + m.unpaired_reads
        + m.reads_with_mate_mapped_to_different_reference
        + m.reads_mapped_with_zero_quality
        + m.reads_with_mate_too_distant
        + m.rf_reads
        + m.ff_reads
        + m.rr_reads
        + m.reads_mapped_and_paired_but_improperly
}

fn write_bucket_text<W: Write>(w: &mut W, m: &Metrics) -> io::Result<()> {
    let problems = total_problems(m);

    writeln!(w, "Read Group")?;
    writeln!(w, "==========")?;
    writeln!(w, "ID: {}", m.name)?;
    writeln!(w, "{}", m.library)?;

    writeln!(w, "Metrics")?;
    writeln!(w, "-------")?;
    writeln!(w)?;
    writeln!(w, "  Read Mapping Metrics")?;
    writeln!(w, "  --------------------")?;
    writeln!(w, "  Total reads: {}", m.total_reads)?;
    writeln!(
        w,
        "  Total problems: {}{}",
        problems,
        pct(problems, m.total_reads)
    )?;
    writeln!(
        w,
        "  Properly paired and mapped reads: {}{}",
        m.properly_paired_and_mapped_reads,
        pct(m.properly_paired_and_mapped_reads, m.total_reads)
    )?;
    writeln!(
        w,
        "  Secondary reads: {}{}",
        m.secondary_reads,
        pct(m.secondary_reads, m.total_reads)
    )?;
    writeln!(
        w,
        "  Supplementary reads: {}{}",
        m.supplementary_reads,
        pct(m.supplementary_reads, m.total_reads)
    )?;
    writeln!(
        w,
        "  Duplicate reads: {} ({:.3}% of all reads)",
        m.duplicate_reads,
        percentage(m.duplicate_reads as f64, m.total_reads as f64)
    )?;
    writeln!(w)?;

    writeln!(w, "  Quality Indicators")?;
    writeln!(w, "  ------------------")?;
    writeln!(
        w,
        "  Short to mononucleosomal ratio: {:.3}",
        fraction(m.hqaa_short_count as f64, m.hqaa_mononucleosomal_count as f64)
    )?;
    writeln!(
        w,
        "  High quality, nonduplicate, properly paired, uniquely mapped autosomal alignments: {}",
        m.hqaa
    )?;
    writeln!(
        w,
        "    as a percentage of autosomal reads: {:.3}%",
        percentage(m.hqaa as f64, m.total_autosomal_reads as f64)
    )?;
    writeln!(
        w,
        "    as a percentage of all reads: {:.3}%",
        percentage(m.hqaa as f64, m.total_reads as f64)
    )?;
    if m.tss_requested {
        writeln!(w, "  TSS enrichment: {:.3}", m.tss_enrichment)?;
    }
    writeln!(w)?;

    writeln!(w, "  Paired Read Metrics")?;
    writeln!(w, "  -------------------")?;
    writeln!(
        w,
        "  Paired reads: {}{}",
        m.paired_reads,
        pct(m.paired_reads, m.total_reads)
    )?;
    writeln!(
        w,
        "  Paired and mapped reads: {}{}",
        m.paired_and_mapped_reads,
        pct(m.paired_and_mapped_reads, m.total_reads)
    )?;
    writeln!(w, "  FR reads: {}{}", m.fr_reads, pct(m.fr_reads, m.total_reads))?;
    writeln!(
        w,
        "  First of pair: {}{}",
        m.first_reads,
        pct(m.first_reads, m.total_reads)
    )?;
    writeln!(
        w,
        "  Second of pair: {}{}",
        m.second_reads,
        pct(m.second_reads, m.total_reads)
    )?;
    writeln!(
        w,
        "  Forward reads: {}{}",
        m.forward_reads,
        pct(m.forward_reads, m.total_reads)
    )?;
    writeln!(
        w,
        "  Reverse reads: {}{}",
        m.reverse_reads,
        pct(m.reverse_reads, m.total_reads)
    )?;
    writeln!(
        w,
        "  Forward mate reads: {}{}",
        m.forward_mate_reads,
        pct(m.forward_mate_reads, m.total_reads)
    )?;
    writeln!(
        w,
        "  Reverse mate reads: {}{}",
        m.reverse_mate_reads,
        pct(m.reverse_mate_reads, m.total_reads)
    )?;
    writeln!(w)?;

    writeln!(w, "  Unmapped Read Metrics")?;
    writeln!(w, "  ---------------------")?;
    writeln!(
        w,
        "  Unmapped reads: {}{}",
        m.unmapped_reads,
        pct(m.unmapped_reads, m.total_reads)
    )?;
    writeln!(
        w,
        "  Unmapped mate reads: {}{}",
        m.unmapped_mate_reads,
        pct(m.unmapped_mate_reads, m.total_reads)
    )?;
    writeln!(
        w,
        "  Reads not passing quality controls: {}{}",
        m.qcfailed_reads,
        pct(m.qcfailed_reads, m.total_reads)
    )?;
    writeln!(
        w,
        "  Unpaired reads: {}{}",
        m.unpaired_reads,
        pct(m.unpaired_reads, m.total_reads)
    )?;
    writeln!(
        w,
        "  Reads with zero mapping quality: {}{}",
        m.reads_mapped_with_zero_quality,
        pct(m.reads_mapped_with_zero_quality, m.total_reads)
    )?;
    writeln!(w)?;

    writeln!(w, "  Aberrant Mapping Metrics")?;
    writeln!(w, "  ------------------------")?;
    writeln!(w, "  RF reads: {}{}", m.rf_reads, pct(m.rf_reads, m.total_reads))?;
    writeln!(w, "  FF reads: {}{}", m.ff_reads, pct(m.ff_reads, m.total_reads))?;
    writeln!(w, "  RR reads: {}{}", m.rr_reads, pct(m.rr_reads, m.total_reads))?;
    writeln!(w, "  Reads that paired and mapped but...")?;
    writeln!(
        w,
        "    on different chromosomes: {}{}",
        m.reads_with_mate_mapped_to_different_reference,
        pct(m.reads_with_mate_mapped_to_different_reference, m.total_reads)
    )?;
    writeln!(
        w,
        "    probably too far from their mates: {}{} (longest proper fragment seems to be {})",
        m.reads_with_mate_too_distant,
        pct(m.reads_with_mate_too_distant, m.total_reads),
        m.maximum_proper_pair_fragment_size
    )?;
    writeln!(
        w,
        "    just not properly: {}{}",
        m.reads_mapped_and_paired_but_improperly,
        pct(m.reads_mapped_and_paired_but_improperly, m.total_reads)
    )?;
    writeln!(w)?;

    writeln!(w, "  Autosomal/Mitochondrial Metrics")?;
    writeln!(w, "  -------------------------------")?;
    writeln!(
        w,
        "  Total autosomal reads: {} ({:.3}% of all reads)",
        m.total_autosomal_reads,
        percentage(m.total_autosomal_reads as f64, m.total_reads as f64)
    )?;
    writeln!(
        w,
        "  Total mitochondrial reads: {} ({:.3}% of all reads)",
        m.total_mitochondrial_reads,
        percentage(m.total_mitochondrial_reads as f64, m.total_reads as f64)
    )?;
    writeln!(
        w,
        "  Duplicate autosomal reads: {} ({:.3}% of all autosomal reads)",
        m.duplicate_autosomal_reads,
        percentage(m.duplicate_autosomal_reads as f64, m.total_autosomal_reads as f64)
    )?;
    writeln!(
        w,
        "  Duplicate mitochondrial reads: {} ({:.3}% of all mitochondrial reads)",
        m.duplicate_mitochondrial_reads,
        percentage(
            m.duplicate_mitochondrial_reads as f64,
            m.total_mitochondrial_reads as f64
        )
    )?;
    writeln!(w)?;

    writeln!(w, "  Mapping Quality")?;
    writeln!(w, "  ---------------")?;
    writeln!(w, "  Mean MAPQ: {:.3}", m.mean_mapq())?;
    writeln!(w, "  Median MAPQ: {:.3}", m.median_mapq())?;
    writeln!(w, "  Reads with MAPQ >=...")?;
    for threshold in (5..=30).step_by(5) {
        let count = m.mapq_counts.count_ge(threshold);
        writeln!(
            w,
            "{:>20}: {}{}",
            threshold,
            count,
            pct(count, m.total_reads)
        )?;
    }

    if m.peaks_requested {
        let top_peaks = determine_top_peaks(&m.peaks);

        writeln!(w)?;
        writeln!(w, "  Peak Metrics")?;
        writeln!(w, "  ------------")?;
        writeln!(w, "  Peak count: {}", m.peaks.size())?;
        writeln!(w)?;
        writeln!(
            w,
            "  High quality autosomal alignments that overlapped peaks: {} ({:.3}% of all high quality autosomal alignments)",
            m.peaks.hqaa_in_peaks,
            percentage(m.peaks.hqaa_in_peaks as f64, m.hqaa as f64)
        )?;
        writeln!(
            w,
            "  Number of high quality autosomal alignments overlapping the top 10,000 peaks:"
        )?;
        for (label, count) in [
            ("Top peak:", top_peaks.top_1),
            ("Top 10 peaks:", top_peaks.top_10),
            ("Top 100 peaks:", top_peaks.top_100),
            ("Top 1000 peaks:", top_peaks.top_1000),
            ("Top 10,000 peaks:", top_peaks.top_10000),
        ] {
            writeln!(
                w,
                "{:>20} {} ({:.3}% of all high quality autosomal alignments)",
                label,
                count,
                percentage(count as f64, m.hqaa as f64)
            )?;
        }
    }

    let problems = total_problems(m);
    if !(m.unclassified_reads == 0
        && problems + m.properly_paired_and_mapped_reads == m.total_reads)
    {
        let mysteries = m.total_reads
            - m.unclassified_reads
            - m.properly_paired_and_mapped_reads
            - problems;
        writeln!(
            w,
            "  Some reads slipped through our taxonomy: {}{}",
            mysteries,
            pct(mysteries, m.total_reads)
        )?;
    }

    writeln!(w)
}

/// Writes the plain-text report for every bucket.
pub fn write_text<W: Write>(
    w: &mut W,
    collector: &MetricsCollector,
    threads: usize,
) -> io::Result<()> {
    write_configuration(w, collector, threads)?;

    for name in collector.bucket_names() {
        if let Some(bucket) = collector.metrics.get(&name) {
            write_bucket_text(w, bucket)?;
        }
    }

    Ok(())
}

//=========//
// Tabular //
//=========//

/// The column schema of the tabular report. One row per bucket; histograms
/// and curves are omitted, which keeps the output manageable for runs with
/// very many buckets.
const TABULAR_COLUMNS: [&str; 54] = [
    "name",
    "organism",
    "library",
    "sample",
    "total_reads",
    "forward_reads",
    "reverse_reads",
    "secondary_reads",
    "supplementary_reads",
    "duplicate_reads",
    "paired_reads",
    "paired_and_mapped_reads",
    "properly_paired_and_mapped_reads",
    "first_reads",
    "second_reads",
    "forward_mate_reads",
    "reverse_mate_reads",
    "fr_reads",
    "ff_reads",
    "rf_reads",
    "rr_reads",
    "unmapped_reads",
    "unmapped_mate_reads",
    "qcfailed_reads",
    "unpaired_reads",
    "reads_with_mate_mapped_to_different_reference",
    "reads_mapped_with_zero_quality",
    "reads_mapped_and_paired_but_improperly",
    "reads_with_mate_too_distant",
    "unclassified_reads",
    "maximum_proper_pair_fragment_size",
    "total_autosomal_reads",
    "total_mitochondrial_reads",
    "duplicate_autosomal_reads",
    "duplicate_mitochondrial_reads",
    "hqaa",
    "hqaa_short_count",
    "hqaa_mononucleosomal_count",
    "short_mononucleosomal_ratio",
    "mean_mapq",
    "median_mapq",
    "total_peaks",
    "total_peak_territory",
    "hqaa_in_peaks",
    "ppm_in_peaks",
    "ppm_not_in_peaks",
    "duplicates_in_peaks",
    "duplicates_not_in_peaks",
    "top_peak_hqaa_read_count",
    "top_10_peak_hqaa_read_count",
    "top_100_peak_hqaa_read_count",
    "top_1000_peak_hqaa_read_count",
    "top_10000_peak_hqaa_read_count",
    "tss_enrichment",
];

/// Writes the tabular (TSV) report: a header row, then one row per bucket.
pub fn write_tabular<W: Write>(w: &mut W, collector: &MetricsCollector) -> io::Result<()> {
    writeln!(w, "{}", TABULAR_COLUMNS.join("\t"))?;

    for name in collector.bucket_names() {
        let Some(m) = collector.metrics.get(&name) else {
            continue;
        };

        let top_peaks = determine_top_peaks(&m.peaks);

        let row = [
            m.name.clone(),
            collector.config.organism.clone(),
            m.library.library.clone(),
            m.library.sample.clone(),
            m.total_reads.to_string(),
            m.forward_reads.to_string(),
            m.reverse_reads.to_string(),
            m.secondary_reads.to_string(),
            m.supplementary_reads.to_string(),
            m.duplicate_reads.to_string(),
            m.paired_reads.to_string(),
            m.paired_and_mapped_reads.to_string(),
            m.properly_paired_and_mapped_reads.to_string(),
            m.first_reads.to_string(),
            m.second_reads.to_string(),
            m.forward_mate_reads.to_string(),
            m.reverse_mate_reads.to_string(),
            m.fr_reads.to_string(),
            m.ff_reads.to_string(),
            m.rf_reads.to_string(),
            m.rr_reads.to_string(),
            m.unmapped_reads.to_string(),
            m.unmapped_mate_reads.to_string(),
            m.qcfailed_reads.to_string(),
            m.unpaired_reads.to_string(),
            m.reads_with_mate_mapped_to_different_reference.to_string(),
            m.reads_mapped_with_zero_quality.to_string(),
            m.reads_mapped_and_paired_but_improperly.to_string(),
            m.reads_with_mate_too_distant.to_string(),
            m.unclassified_reads.to_string(),
            m.maximum_proper_pair_fragment_size.to_string(),
            m.total_autosomal_reads.to_string(),
            m.total_mitochondrial_reads.to_string(),
            m.duplicate_autosomal_reads.to_string(),
            m.duplicate_mitochondrial_reads.to_string(),
            m.hqaa.to_string(),
            m.hqaa_short_count.to_string(),
            m.hqaa_mononucleosomal_count.to_string(),
            fraction(m.hqaa_short_count as f64, m.hqaa_mononucleosomal_count as f64)
                .to_string(),
            m.mean_mapq().to_string(),
            m.median_mapq().to_string(),
            m.peaks.size().to_string(),
            m.peaks.total_peak_territory.to_string(),
            m.peaks.hqaa_in_peaks.to_string(),
            m.peaks.ppm_in_peaks.to_string(),
            m.peaks.ppm_not_in_peaks.to_string(),
            m.peaks.duplicates_in_peaks.to_string(),
            m.peaks.duplicates_not_in_peaks.to_string(),
            top_peaks.top_1.to_string(),
            top_peaks.top_10.to_string(),
            top_peaks.top_100.to_string(),
            top_peaks.top_1000.to_string(),
            top_peaks.top_10000.to_string(),
            m.tss_enrichment.to_string(),
        ];

        writeln!(w, "{}", row.join("\t"))?;
    }

    Ok(())
}

/// Writes the metrics file at `path`, as JSON by default or TSV when
/// `tabular` is set. A `.gz` suffix compresses the output transparently.
pub fn write_metrics_file<P>(
    collector: &MetricsCollector,
    path: P,
    tabular: bool,
) -> anyhow::Result<()>
where
    P: AsRef<Path>,
{
    let mut writer = create_writer(path.as_ref())?;

    if tabular {
        write_tabular(&mut writer, collector)?;
    } else {
        let output = serde_json::to_string_pretty(&to_json(collector))?;
        writer.write_all(output.as_bytes())?;
        writer.write_all(b"\n")?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use crate::features::Feature;
    use crate::peaks::Peak;

    use super::super::collector::CollectorConfig;
    use super::*;

    fn peak(start: u64, end: u64, name: &str, overlapping_hqaa: u64) -> Peak {
        let mut peak = Peak::from(Feature::new("chr1", start, end, name));
        peak.overlapping_hqaa = overlapping_hqaa;
        peak
    }

    fn collector_with_one_bucket() -> MetricsCollector {
        let config = CollectorConfig::for_organism("human").unwrap();
        let mut collector = MetricsCollector::new(config, String::from("sample"));
        collector.initialize_buckets("@HD\tVN:1.6\n").unwrap();
        collector
    }

    #[test]
    fn test_fraction_of_zero_denominator_is_nan() {
        assert!(fraction(1.0, 0.0).is_nan());
        assert_eq!(fraction(1.0, 4.0), 0.25);
        assert_eq!(percentage(1.0, 4.0), 25.0);
    }

    #[test]
    fn test_top_peaks() {
        let mut peaks = PeakIndex::default();
        for i in 0..20 {
            peaks
                .add(peak(i * 100, i * 100 + 50, &format!("peak_{}", i), i as u64))
                .unwrap();
        }
        peaks.sort();

        let top = determine_top_peaks(&peaks);

        // Counts are 0..=19; the ranked list leads with 19, 18, ...
        assert_eq!(top.top_1, 19);
        assert_eq!(top.top_10, (10..=19).sum::<u64>());
        assert_eq!(top.top_100, (0..=19).sum::<u64>());
        assert_eq!(top.top_10000, (0..=19).sum::<u64>());
    }

    #[test]
    fn test_percentile_curves_collapse_duplicate_ranks() {
        let mut peaks = PeakIndex::default();
        for i in 0..4u64 {
            peaks.add(peak(i * 100, i * 100 + 50, &format!("p{}", i), i)).unwrap();
        }
        peaks.sort();

        let percentiles = peak_percentiles(&peaks, 6);

        // Four peaks: the 100 percentile ranks collapse to {1, 2, 3, 4}.
        assert_eq!(percentiles.cumulative_fraction_of_hqaa.len(), 4);
        assert_eq!(percentiles.cumulative_fraction_of_territory.len(), 4);

        let last = *percentiles.cumulative_fraction_of_hqaa.last().unwrap();
        assert!((last - 1.0).abs() < 1e-9);
        let last = *percentiles.cumulative_fraction_of_territory.last().unwrap();
        assert!((last - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_percentiles_with_zero_hqaa_are_nan() {
        let mut peaks = PeakIndex::default();
        peaks.add(peak(0, 100, "p0", 0)).unwrap();
        peaks.sort();

        let percentiles = peak_percentiles(&peaks, 0);
        assert!(percentiles.cumulative_fraction_of_hqaa[0].is_nan());
    }

    #[test]
    fn test_empty_bucket_json() {
        let collector = collector_with_one_bucket();
        let json = to_json(&collector);

        let buckets = json.as_array().unwrap();
        assert_eq!(buckets.len(), 1);

        let metrics = &buckets[0]["metrics"];
        assert_eq!(metrics["name"], "sample");
        assert_eq!(metrics["organism"], "human");
        assert_eq!(metrics["total_reads"], 0);
        assert_eq!(metrics["mean_mapq"], 0.0);
        assert_eq!(metrics["median_mapq"], 0.0);

        // NaN must be emitted as JSON null.
        assert!(metrics["short_mononucleosomal_ratio"].is_null());
        assert!(metrics["max_fraction_reads_from_single_autosome"].is_null());

        // The fragment length curve is padded out to 1000 even when empty.
        assert_eq!(metrics["fragment_length_counts"].as_array().unwrap().len(), 1001);
        let row = &metrics["fragment_length_counts"][0];
        assert_eq!(row[0], 0);
        assert_eq!(row[1], 0);
        assert!(row[2].is_null());
    }

    #[test]
    fn test_populated_bucket_json() {
        let mut collector = collector_with_one_bucket();
        {
            let bucket = collector.metrics.get_mut("sample").unwrap();
            bucket.total_reads = 4;
            bucket.hqaa = 2;
            bucket.hqaa_short_count = 1;
            bucket.hqaa_mononucleosomal_count = 2;
            bucket.fragment_length_counts.insert(200, 2);
            bucket.chromosome_counts.insert(String::from("chr1"), 2);
            bucket.mapq_counts.increment_by(30, 4).unwrap();
        }

        let json = to_json(&collector);
        let metrics = &json[0]["metrics"];

        assert_eq!(metrics["total_reads"], 4);
        assert_eq!(metrics["hqaa"], 2);
        assert_eq!(metrics["short_mononucleosomal_ratio"], 0.5);
        assert_eq!(metrics["mapq_counts"][0][0], 30);
        assert_eq!(metrics["mapq_counts"][0][1], 4);
        assert_eq!(metrics["chromosome_counts"][0][0], "chr1");
        assert_eq!(metrics["max_fraction_reads_from_single_autosome"], 1.0);

        let row = &metrics["fragment_length_counts"][200];
        assert_eq!(row[0], 200);
        assert_eq!(row[1], 2);
        assert_eq!(row[2], 0.5);
    }

    #[test]
    fn test_text_report_smoke() {
        let collector = collector_with_one_bucket();
        let mut out = Vec::new();
        write_text(&mut out, &collector, 1).unwrap();

        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("Operating parameters"));
        assert!(text.contains("Organism: human"));
        assert!(text.contains("ID: sample"));
        assert!(text.contains("Total reads: 0"));
        assert!(text.contains("Mean MAPQ"));
    }

    #[test]
    fn test_tabular_report_shape() {
        let collector = collector_with_one_bucket();
        let mut out = Vec::new();
        write_tabular(&mut out, &collector).unwrap();

        let text = String::from_utf8(out).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 2);

        let header_fields: Vec<&str> = lines[0].split('\t').collect();
        let row_fields: Vec<&str> = lines[1].split('\t').collect();
        assert_eq!(header_fields.len(), TABULAR_COLUMNS.len());
        assert_eq!(row_fields.len(), TABULAR_COLUMNS.len());
        assert_eq!(header_fields[0], "name");
        assert_eq!(row_fields[0], "sample");
    }

    #[test]
    fn test_metrics_file_round_trips_through_gzip() {
        let collector = collector_with_one_bucket();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sample.ataqv.json.gz");

        write_metrics_file(&collector, &path, false).unwrap();

        let mut reader = crate::utils::io::open_reader(&path).unwrap();
        let mut contents = String::new();
        std::io::Read::read_to_string(&mut reader, &mut contents).unwrap();
        let value: Value = serde_json::from_str(&contents).unwrap();
        assert_eq!(value[0]["metrics"]["name"], "sample");
    }
}
