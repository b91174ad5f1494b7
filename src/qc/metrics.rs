//! The per-read-group metrics bucket and the alignment classifier that
//! fills it.
//!
//! Every record in the alignment file lands in exactly one bucket (selected
//! by its read group) and exactly one category of the classifier's taxonomy.
//! The taxonomy is evaluated in a fixed order and the first match wins, so
//! the categories partition `total_reads`.

use std::collections::BTreeMap;
use std::collections::HashMap;
use std::fmt;
use std::io::Write;
use std::sync::Arc;

use noodles::sam::alignment::Record;
use noodles::sam::record::Flags;
use noodles::sam::Header;
use serde::Serialize;
use tracing::debug;

use crate::features::Feature;
use crate::peaks::{Peak, PeakIndex};
use crate::utils::formats::bed;
use crate::utils::histogram::SimpleHistogram;
use crate::utils::io::create_writer;

use super::collector::CollectorConfig;

/// The flag byte recorded when a record carries no mapping quality.
const MAPQ_UNAVAILABLE: u8 = 255;

/// A record is HQAA when it could only have come from a well-behaved
/// fragment: mapped with its mate, properly paired, primary, non-duplicate,
/// confidently placed (`mapq >= 30`), and autosomal.
pub fn is_hqaa(config: &CollectorConfig, header: &Header, record: &Record) -> bool {
    let flags = record.flags();

    if flags.is_unmapped()
        || flags.is_mate_unmapped()
        || flags.is_duplicate()
        || !flags.is_segmented()
        || !flags.is_properly_aligned()
        || flags.is_secondary()
        || flags.is_supplementary()
    {
        return false;
    }

    // A missing mapping quality is the raw byte 255, which passes the
    // threshold, as it always has in this calculation.
    if record
        .mapping_quality()
        .map(u8::from)
        .unwrap_or(MAPQ_UNAVAILABLE)
        < 30
    {
        return false;
    }

    match record.reference_sequence_id() {
        Some(id) => header
            .reference_sequences()
            .get_index(id)
            .map(|(name, _)| config.is_autosomal(name.as_str()))
            .unwrap_or(false),
        None => false,
    }
}

//=========//
// Library //
//=========//

/// Sequenced library metadata, with the SAM read-group tag each field comes
/// from in comments.
#[derive(Clone, Debug, Default, Serialize)]
pub struct Library {
    /// LB
    pub library: String,
    /// SM
    pub sample: String,
    /// DS
    pub description: String,
    /// CN
    #[serde(rename = "sequencingcenter")]
    pub center: String,
    /// DT
    #[serde(rename = "sequencingdate")]
    pub date: String,
    /// PL
    #[serde(rename = "sequencingplatform")]
    pub platform: String,
    /// PM
    #[serde(rename = "platformmodel")]
    pub platform_model: String,
    /// PU
    #[serde(rename = "platformunit")]
    pub platform_unit: String,
    /// FO
    #[serde(rename = "floworder")]
    pub flow_order: String,
    /// KS
    #[serde(rename = "keysequence")]
    pub key_sequence: String,
    /// PI
    pub predicted_median_insert_size: String,
    /// PG
    pub programs: String,
}

impl Library {
    /// Builds library metadata from one `@RG` line's fields. A
    /// caller-supplied library description overrides the `DS` field.
    pub fn from_read_group(
        fields: &HashMap<String, String>,
        library_description: &str,
    ) -> Self {
        let get = |key: &str| fields.get(key).cloned().unwrap_or_default();

        Self {
            library: get("LB"),
            sample: get("SM"),
            description: if library_description.is_empty() {
                get("DS")
            } else {
                library_description.to_string()
            },
            center: get("CN"),
            date: get("DT"),
            platform: get("PL"),
            platform_model: get("PM"),
            platform_unit: get("PU"),
            flow_order: get("FO"),
            key_sequence: get("KS"),
            predicted_median_insert_size: get("PI"),
            programs: get("PG"),
        }
    }

    /// Placeholder metadata for a bucket fabricated without an `@RG` line.
    pub fn fallback(name: &str, library_description: &str) -> Self {
        Self {
            library: name.to_string(),
            sample: name.to_string(),
            description: library_description.to_string(),
            ..Default::default()
        }
    }
}

impl fmt::Display for Library {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Library: {}", self.library)?;
        writeln!(f, "Sample: {}", self.sample)?;
        writeln!(f, "Description: {}", self.description)?;
        writeln!(f)?;
        writeln!(f, "Sequencing center: {}", self.center)?;
        writeln!(f, "Sequencing date: {}", self.date)?;
        writeln!(f, "Sequencing platform: {}", self.platform)?;
        writeln!(f, "Platform model: {}", self.platform_model)?;
        writeln!(f, "Platform unit: {}", self.platform_unit)?;
        writeln!(f, "Flow order: {}", self.flow_order)?;
        writeln!(f, "Key sequence: {}", self.key_sequence)?;
        writeln!(
            f,
            "Predicted median insert size: {}",
            self.predicted_median_insert_size
        )?;
        writeln!(f, "Programs: {}", self.programs)
    }
}

//=========//
// Metrics //
//=========//

/// All quality-control state for one read group.
pub struct Metrics {
    config: Arc<CollectorConfig>,

    /// The bucket's name: the read group ID, or the fabricated default.
    pub name: String,

    /// Library metadata from the matching `@RG` header line.
    pub library: Library,

    /// The per-group peak index, when peak metrics were requested.
    pub peaks: PeakIndex,

    /// Whether a peak file was requested for this run.
    pub peaks_requested: bool,

    /// Whether TSS enrichment was requested for this run.
    pub tss_requested: bool,

    /// Every record seen for this read group.
    pub total_reads: u64,
    /// Records without the reverse-complement flag.
    pub forward_reads: u64,
    /// Records with the reverse-complement flag.
    pub reverse_reads: u64,
    /// Records flagged secondary.
    pub secondary_reads: u64,
    /// Records flagged supplementary.
    pub supplementary_reads: u64,
    /// Records flagged duplicate.
    pub duplicate_reads: u64,

    /// Records flagged paired.
    pub paired_reads: u64,
    /// Paired records with both ends mapped.
    pub paired_and_mapped_reads: u64,
    /// Paired-and-mapped records the aligner called proper.
    pub properly_paired_and_mapped_reads: u64,
    /// Records flagged first-of-pair.
    pub first_reads: u64,
    /// Records flagged second-of-pair.
    pub second_reads: u64,
    /// Records whose mate lacks the reverse-complement flag.
    pub forward_mate_reads: u64,
    /// Records whose mate carries the reverse-complement flag.
    pub reverse_mate_reads: u64,
    /// Proper pairs in the expected forward/reverse orientation.
    pub fr_reads: u64,

    /// Records flagged unmapped.
    pub unmapped_reads: u64,
    /// Mapped records whose mate is unmapped.
    pub unmapped_mate_reads: u64,
    /// Records that failed platform quality checks.
    pub qcfailed_reads: u64,
    /// Records that are not paired at all.
    pub unpaired_reads: u64,
    /// Pairs in forward/forward orientation.
    pub ff_reads: u64,
    /// Pairs in reverse/forward orientation.
    pub rf_reads: u64,
    /// Pairs in reverse/reverse orientation.
    pub rr_reads: u64,
    /// Pairs whose mate mapped to a different reference.
    pub reads_with_mate_mapped_to_different_reference: u64,
    /// Mapped records with zero mapping quality.
    pub reads_mapped_with_zero_quality: u64,
    /// Paired, mapped, same-reference records that were simply improper.
    pub reads_mapped_and_paired_but_improperly: u64,

    /// Records that matched none of the categories above.
    pub unclassified_reads: u64,

    /// The longest fragment seen in a primary proper pair; the empirical
    /// bound used to diagnose "mate too distant".
    pub maximum_proper_pair_fragment_size: u64,
    /// Improper pairs whose fragment exceeded the bound above.
    pub reads_with_mate_too_distant: u64,

    /// Fragment sizes of improper same-reference pairs, deferred until the
    /// whole file has been read (keyed by read name). Cleared by
    /// [`Metrics::make_aggregate_diagnoses`].
    pub unlikely_fragment_sizes: HashMap<String, Vec<u64>>,

    /// Properly-paired records on autosomal references.
    pub total_autosomal_reads: u64,
    /// Properly-paired records on the mitochondrial reference.
    pub total_mitochondrial_reads: u64,
    /// Duplicates among the autosomal records.
    pub duplicate_autosomal_reads: u64,
    /// Duplicates among the mitochondrial records.
    pub duplicate_mitochondrial_reads: u64,

    /// High-quality autosomal alignments.
    pub hqaa: u64,

    /// Fragment length distribution of HQAA records.
    pub fragment_length_counts: BTreeMap<u64, u64>,

    /// HQAA counts per reference.
    pub chromosome_counts: BTreeMap<String, u64>,

    /// HQAA records with fragment length in [50, 100].
    pub hqaa_short_count: u64,
    /// HQAA records with fragment length in [150, 200].
    pub hqaa_mononucleosomal_count: u64,

    /// Mapping quality distribution of every record.
    pub mapq_counts: SimpleHistogram,

    /// Per-base fragment coverage around TSS, length `2E + 1`.
    pub tss_coverage: Vec<u64>,
    /// The coverage above, flank-normalised.
    pub tss_coverage_scaled: Vec<f64>,
    /// The scaled coverage at the TSS itself.
    pub tss_enrichment: f64,

    problematic_read_stream: Option<Box<dyn Write>>,
}

impl Metrics {
    /// Creates a bucket, loading its peak file and opening its problem log
    /// when the configuration asks for them.
    pub fn new(config: Arc<CollectorConfig>, name: &str) -> anyhow::Result<Self> {
        let tss_requested = config.tss_file.is_some();
        let tss_positions = if tss_requested {
            2 * config.tss_extension + 1
        } else {
            0
        };

        let problematic_read_stream = if config.log_problematic_reads {
            let filename = format!("{}.problems.gz", name);
            debug!("Logging problematic reads to {}.", filename);
            Some(create_writer(&filename)?)
        } else {
            None
        };

        let mut metrics = Self {
            config,
            name: name.to_string(),
            library: Library::default(),
            peaks: PeakIndex::default(),
            peaks_requested: false,
            tss_requested,
            total_reads: 0,
            forward_reads: 0,
            reverse_reads: 0,
            secondary_reads: 0,
            supplementary_reads: 0,
            duplicate_reads: 0,
            paired_reads: 0,
            paired_and_mapped_reads: 0,
            properly_paired_and_mapped_reads: 0,
            first_reads: 0,
            second_reads: 0,
            forward_mate_reads: 0,
            reverse_mate_reads: 0,
            fr_reads: 0,
            unmapped_reads: 0,
            unmapped_mate_reads: 0,
            qcfailed_reads: 0,
            unpaired_reads: 0,
            ff_reads: 0,
            rf_reads: 0,
            rr_reads: 0,
            reads_with_mate_mapped_to_different_reference: 0,
            reads_mapped_with_zero_quality: 0,
            reads_mapped_and_paired_but_improperly: 0,
            unclassified_reads: 0,
            maximum_proper_pair_fragment_size: 0,
            reads_with_mate_too_distant: 0,
            unlikely_fragment_sizes: HashMap::new(),
            total_autosomal_reads: 0,
            total_mitochondrial_reads: 0,
            duplicate_autosomal_reads: 0,
            duplicate_mitochondrial_reads: 0,
            hqaa: 0,
            fragment_length_counts: BTreeMap::new(),
            chromosome_counts: BTreeMap::new(),
            hqaa_short_count: 0,
            hqaa_mononucleosomal_count: 0,
            mapq_counts: SimpleHistogram::zero_based_with_capacity(usize::from(
                MAPQ_UNAVAILABLE,
            )),
            tss_coverage: vec![0; tss_positions],
            tss_coverage_scaled: Vec::new(),
            tss_enrichment: 0.0,
            problematic_read_stream,
        };

        if metrics.config.peak_file.is_some() {
            metrics.peaks_requested = true;
            metrics.load_peaks()?;
        }

        Ok(metrics)
    }

    /// Loads this bucket's peaks, dropping non-autosomal peaks silently and
    /// excluded-region overlaps with a log line.
    fn load_peaks(&mut self) -> anyhow::Result<()> {
        let config = Arc::clone(&self.config);

        let peak_file = match config.peak_file.as_deref() {
            Some("auto") => format!("{}.peaks", self.name),
            Some(path) => path.to_string(),
            None => return Ok(()),
        };

        debug!(
            "Loading peaks for read group {} from {}.",
            self.name, peak_file
        );

        for feature in bed::read_features(&peak_file)? {
            if !config.is_autosomal(&feature.reference) {
                continue;
            }

            if let Some(excluded) = config
                .excluded_regions
                .iter()
                .find(|region| feature.overlaps(region))
            {
                debug!(
                    "Excluding peak [{}] which overlaps excluded region [{}]",
                    feature, excluded
                );
                continue;
            }

            self.peaks.add(Peak::from(feature))?;
        }

        self.peaks.sort();

        for (reference, count) in self.peaks.reference_counts() {
            debug!("{} peak count: {}", reference, count);
        }
        debug!(
            "Loaded {} peaks for read group {}.",
            self.peaks.size(),
            self.name
        );

        Ok(())
    }

    fn is_paired_and_mapped(flags: Flags) -> bool {
        flags.is_segmented() && !flags.is_unmapped() && !flags.is_mate_unmapped()
    }

    fn is_primary(flags: Flags) -> bool {
        !flags.is_secondary() && !flags.is_supplementary()
    }

    /// 0-based positions of the record and its mate. Defaults keep the
    /// orientation predicates conservative when a position is absent.
    fn zero_based_positions(record: &Record) -> (usize, usize) {
        let pos = record
            .alignment_start()
            .map(|p| usize::from(p) - 1)
            .unwrap_or(0);
        let mpos = record
            .mate_alignment_start()
            .map(|p| usize::from(p) - 1)
            .unwrap_or(0);
        (pos, mpos)
    }

    // What is "FR orientation"? "The end mapped to smaller coordinate is on
    // the forward strand and the other end on the reverse strand."
    // -- https://sourceforge.net/p/samtools/mailman/message/27693741/
    //
    // The zero-position guard drops pairs whose member sits at the very
    // start of a reference; it is kept for compatibility with reports
    // produced by earlier versions of this tool.
    fn is_fr(record: &Record) -> bool {
        let flags = record.flags();
        let (pos, mpos) = Self::zero_based_positions(record);
        let isize = record.template_length();

        !flags.is_unmapped()
            && !flags.is_mate_unmapped()
            && record.reference_sequence_id() == record.mate_reference_sequence_id()
            && pos != 0
            && mpos != 0
            && ((!flags.is_reverse_complemented()
                && flags.is_mate_reverse_complemented()
                && isize > 0)
                || (flags.is_reverse_complemented()
                    && !flags.is_mate_reverse_complemented()
                    && isize < 0))
    }

    fn is_rf(record: &Record) -> bool {
        let flags = record.flags();
        let (pos, mpos) = Self::zero_based_positions(record);
        let isize = record.template_length();

        !flags.is_unmapped()
            && !flags.is_mate_unmapped()
            && record.reference_sequence_id() == record.mate_reference_sequence_id()
            && pos != 0
            && mpos != 0
            && ((flags.is_reverse_complemented()
                && !flags.is_mate_reverse_complemented()
                && isize > 0)
                || (!flags.is_reverse_complemented()
                    && flags.is_mate_reverse_complemented()
                    && isize < 0))
    }

    fn is_ff(record: &Record) -> bool {
        let flags = record.flags();
        !flags.is_reverse_complemented() && !flags.is_mate_reverse_complemented()
    }

    fn is_rr(record: &Record) -> bool {
        let flags = record.flags();
        flags.is_reverse_complemented() && flags.is_mate_reverse_complemented()
    }

    /// Whether the record is a high-quality autosomal alignment.
    pub fn is_hqaa(&self, header: &Header, record: &Record) -> bool {
        is_hqaa(&self.config, header, record)
    }

    /// Measures and records a single read.
    pub fn add_alignment(&mut self, header: &Header, record: &Record) {
        let flags = record.flags();
        let fragment_length = u64::from(record.template_length().unsigned_abs());

        self.total_reads += 1;

        // Record the read's quality. The histogram spans every possible
        // byte, so the increment cannot fail.
        let mapq = record
            .mapping_quality()
            .map(u8::from)
            .unwrap_or(MAPQ_UNAVAILABLE);
        self.mapq_counts.increment(usize::from(mapq)).ok();

        if flags.is_reverse_complemented() {
            self.reverse_reads += 1;
        } else {
            self.forward_reads += 1;
        }

        if flags.is_secondary() {
            self.secondary_reads += 1;
        }

        if flags.is_supplementary() {
            self.supplementary_reads += 1;
        }

        if flags.is_duplicate() {
            self.duplicate_reads += 1;
        }

        if flags.is_first_segment() {
            self.first_reads += 1;
        }

        if flags.is_last_segment() {
            self.second_reads += 1;
        }

        if flags.is_mate_reverse_complemented() {
            self.reverse_mate_reads += 1;
        } else {
            self.forward_mate_reads += 1;
        }

        if flags.is_segmented() {
            self.paired_reads += 1;
        }

        if flags.is_qc_fail() {
            self.qcfailed_reads += 1;
            self.log_problematic_read("QC failed", header, record);
        } else if !flags.is_segmented() {
            self.unpaired_reads += 1;
            self.log_problematic_read("Unpaired", header, record);
        } else if flags.is_unmapped() {
            self.unmapped_reads += 1;
            self.log_problematic_read("Unmapped", header, record);
        } else if flags.is_mate_unmapped() {
            self.unmapped_mate_reads += 1;
            self.log_problematic_read("Unmapped mate", header, record);
        } else if Self::is_rf(record) {
            self.rf_reads += 1;
            self.log_problematic_read("RF", header, record);
        } else if Self::is_ff(record) {
            self.ff_reads += 1;
            self.log_problematic_read("FF", header, record);
        } else if Self::is_rr(record) {
            self.rr_reads += 1;
            self.log_problematic_read("RR", header, record);
        } else if mapq == 0 {
            self.reads_mapped_with_zero_quality += 1;
            self.log_problematic_read("Mapped with zero quality", header, record);
        } else if Self::is_paired_and_mapped(flags) {
            self.paired_and_mapped_reads += 1;

            if flags.is_properly_aligned() {
                self.properly_paired_and_mapped_reads += 1;

                if Self::is_fr(record) {
                    self.fr_reads += 1;
                }

                // We'll only assert that a read is autosomal or
                // mitochondrial if it's properly paired and mapped and (of
                // course) has a valid reference name.
                let reference = record.reference_sequence_id().and_then(|id| {
                    header
                        .reference_sequences()
                        .get_index(id)
                        .map(|(name, _)| name.to_string())
                });

                if let Some(reference) = reference {
                    if self.config.is_mitochondrial(&reference) {
                        self.total_mitochondrial_reads += 1;
                        if flags.is_duplicate() {
                            self.duplicate_mitochondrial_reads += 1;
                        }
                    } else if self.config.is_autosomal(&reference) {
                        self.total_autosomal_reads += 1;

                        if self.peaks_requested {
                            if let Some(alignment) = Feature::from_alignment(header, record) {
                                let hqaa = self.is_hqaa(header, record);
                                self.peaks.record_alignment(
                                    &alignment,
                                    hqaa,
                                    flags.is_duplicate(),
                                );
                            }
                        }

                        if flags.is_duplicate() {
                            self.duplicate_autosomal_reads += 1;
                        } else if self.is_hqaa(header, record) {
                            // Nonduplicate, properly paired and uniquely
                            // mapped autosomal reads are the basis of our
                            // fragment size and peak statistics.
                            self.hqaa += 1;
                            *self.chromosome_counts.entry(reference).or_default() += 1;

                            *self
                                .fragment_length_counts
                                .entry(fragment_length)
                                .or_default() += 1;

                            if (50..=100).contains(&fragment_length) {
                                self.hqaa_short_count += 1;
                            }

                            if (150..=200).contains(&fragment_length) {
                                self.hqaa_mononucleosomal_count += 1;
                            }
                        }
                    }
                }

                // Keep track of the longest fragment seen in a primary
                // proper pair. Aligners each have their own idea of the
                // maximum reasonable fragment size a proper pair can have;
                // going with the observed result works with all of them.
                // Once every read has been added, this bound identifies the
                // reads that mapped too far from their mates.
                if Self::is_primary(flags)
                    && self.maximum_proper_pair_fragment_size < fragment_length
                {
                    self.maximum_proper_pair_fragment_size = fragment_length;
                    debug!(
                        "New maximum proper pair fragment length: {} from [{}]",
                        fragment_length,
                        record_to_string(header, record),
                    );
                }
            } else if record.reference_sequence_id() != record.mate_reference_sequence_id() {
                self.reads_with_mate_mapped_to_different_reference += 1;
                self.log_problematic_read("Mate mapped to different reference", header, record);
            } else {
                // The read was paired and mapped, but not in a proper pair,
                // for a reason we don't yet know. Its mate may have mapped
                // too far away, but we can't check until we've seen all the
                // reads.
                let record_name = record
                    .read_name()
                    .map(|name| name.to_string())
                    .unwrap_or_default();
                self.unlikely_fragment_sizes
                    .entry(record_name)
                    .or_default()
                    .push(fragment_length);
                self.log_problematic_read("Improper", header, record);
            }
        } else {
            // Most cases should have been caught by now, so make a special
            // note of any unexpected oddballs.
            self.unclassified_reads += 1;
            self.log_problematic_read("Unclassified", header, record);
        }
    }

    /// Last-minute classification of undiagnosed reads: now that the
    /// longest proper-pair fragment is known, deferred improper pairs can
    /// be split into "mate too distant" and "simply improper".
    pub fn make_aggregate_diagnoses(&mut self) {
        self.reads_with_mate_too_distant = 0;
        self.reads_mapped_and_paired_but_improperly = 0;

        let suspects = std::mem::take(&mut self.unlikely_fragment_sizes);
        for (record_name, sizes) in suspects {
            for unlikely_fragment_size in sizes {
                if self.maximum_proper_pair_fragment_size < unlikely_fragment_size {
                    self.reads_with_mate_too_distant += 1;
                    self.log_problem_line("Mate too distant", &record_name);
                } else {
                    self.reads_mapped_and_paired_but_improperly += 1;
                    self.log_problem_line("Undiagnosed", &record_name);
                }
            }
        }
    }

    /// Flank-normalises the accumulated TSS coverage and extracts the
    /// enrichment score.
    pub fn calculate_tss_metrics(&mut self, tss_count: u64) {
        if !self.tss_requested || tss_count == 0 || self.tss_coverage.is_empty() {
            return;
        }

        let n = tss_count as f64;
        let positions = self.tss_coverage.len();
        let flank = positions.min(100);

        // Average read depth in each 100bp flank, then scale the whole
        // curve so the flank average sits at 1.
        let upstream_flank: f64 = self.tss_coverage[..flank]
            .iter()
            .map(|&c| c as f64 / n)
            .sum::<f64>()
            / flank as f64;

        let downstream_flank: f64 = self.tss_coverage[positions - flank..]
            .iter()
            .map(|&c| c as f64 / n)
            .sum::<f64>()
            / flank as f64;

        let mean_flank = (upstream_flank + downstream_flank) / 2.0;

        self.tss_coverage_scaled = self
            .tss_coverage
            .iter()
            .map(|&c| (c as f64 / n) / mean_flank)
            .collect();

        // The value at the TSS itself is the canonical enrichment score.
        self.tss_enrichment = self.tss_coverage_scaled[positions / 2];
    }

    /// Mean mapping quality over every record, 0 for an empty bucket.
    pub fn mean_mapq(&self) -> f64 {
        if self.total_reads == 0 {
            0.0
        } else {
            self.mapq_counts.mean()
        }
    }

    /// Median mapping quality over every record, 0 for an empty bucket.
    pub fn median_mapq(&self) -> f64 {
        self.mapq_counts.median().unwrap_or(0.0)
    }

    fn log_problematic_read(&mut self, problem: &str, header: &Header, record: &Record) {
        if self.problematic_read_stream.is_some() {
            let text = record_to_string(header, record);
            self.log_problem_line(problem, &text);
        }
    }

    fn log_problem_line(&mut self, problem: &str, record_text: &str) {
        if let Some(stream) = self.problematic_read_stream.as_mut() {
            if record_text.is_empty() {
                writeln!(stream, "{}", problem).ok();
            } else {
                writeln!(stream, "{}\t{}", problem, record_text).ok();
            }
        }
    }
}

/// A compact, SAM-like rendering of a record for problem logs.
pub fn record_to_string(header: &Header, record: &Record) -> String {
    let reference = record
        .reference_sequence_id()
        .and_then(|id| header.reference_sequences().get_index(id))
        .map(|(name, _)| name.to_string())
        .unwrap_or_else(|| String::from("*"));

    let mate_reference = record
        .mate_reference_sequence_id()
        .and_then(|id| header.reference_sequences().get_index(id))
        .map(|(name, _)| name.to_string())
        .unwrap_or_else(|| String::from("*"));

    format!(
        "{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}",
        record
            .read_name()
            .map(|name| name.to_string())
            .unwrap_or_else(|| String::from("*")),
        u16::from(record.flags()),
        reference,
        record
            .alignment_start()
            .map(usize::from)
            .unwrap_or_default(),
        record
            .mapping_quality()
            .map(u8::from)
            .unwrap_or(MAPQ_UNAVAILABLE),
        mate_reference,
        record
            .mate_alignment_start()
            .map(usize::from)
            .unwrap_or_default(),
        record.template_length(),
    )
}
