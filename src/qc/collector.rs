//! The metrics collector: run configuration, the read-group bucket
//! registry, and the streaming pass that classifies every record.

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;

use indexmap::IndexMap;
use noodles::sam::alignment::Record;
use noodles::sam::Header;
use tracing::debug;
use tracing::info;

use crate::errors::Error;
use crate::features::FeatureTree;
use crate::features::Feature;
use crate::organisms;
use crate::utils::formats::bed;
use crate::utils::natural_sort::sort_strings_numerically;
use crate::utils::read_groups::{header_read_groups, record_read_group};

use super::metrics::{Library, Metrics};

//===============//
// Configuration //
//===============//

/// Everything a metrics bucket needs to know about the run. Built once from
/// the command line, then shared immutably.
pub struct CollectorConfig {
    /// The organism whose autosome list is in effect.
    pub organism: String,

    /// A short description of the experiment, for the report.
    pub description: String,

    /// A URL with more detail on the experiment, for the report.
    pub url: String,

    /// When non-empty, overrides each read group's `DS` field.
    pub library_description: String,

    /// The reference names that count as autosomal.
    pub autosomal_references: HashSet<String>,

    /// The reference name that counts as mitochondrial.
    pub mitochondrial_reference_name: String,

    /// Regions whose peaks and TSS are ignored.
    pub excluded_regions: Vec<Feature>,

    /// The peak BED path, or `"auto"` for one file per read group.
    pub peak_file: Option<String>,

    /// The TSS BED path; enrichment is only calculated when present.
    pub tss_file: Option<PathBuf>,

    /// Bases of TSS flank examined on each side.
    pub tss_extension: usize,

    /// Accumulate every record into a single bucket.
    pub ignore_read_groups: bool,

    /// Write a per-bucket log of problematic reads.
    pub log_problematic_reads: bool,
}

impl CollectorConfig {
    /// A configuration with the built-in autosome list for `organism` and
    /// defaults for everything else.
    pub fn for_organism(organism: &str) -> Result<Self, Error> {
        let autosomal_references = organisms::autosomal_references(organism).ok_or_else(|| {
            Error::Config(format!(
                "we don't have a list of autosomal references for \"{}\" \
                 (built-in organisms: {}); you can name its autosomes with \
                 --autosomal-reference-file",
                organism,
                organisms::ORGANISMS.join(", ")
            ))
        })?;

        Ok(Self::with_autosomal_references(organism, autosomal_references))
    }

    /// A configuration with a caller-supplied autosome list, replacing any
    /// built-in list for the organism.
    pub fn with_autosomal_references(
        organism: &str,
        autosomal_references: HashSet<String>,
    ) -> Self {
        Self {
            organism: organism.to_string(),
            description: String::new(),
            url: String::new(),
            library_description: String::new(),
            autosomal_references,
            mitochondrial_reference_name: String::from("chrM"),
            excluded_regions: Vec::new(),
            peak_file: None,
            tss_file: None,
            tss_extension: 1000,
            ignore_read_groups: false,
            log_problematic_reads: false,
        }
    }

    /// Whether a reference name is in the autosome list.
    pub fn is_autosomal(&self, reference: &str) -> bool {
        self.autosomal_references.contains(reference)
    }

    /// Whether a reference name is the mitochondrial reference.
    pub fn is_mitochondrial(&self, reference: &str) -> bool {
        self.mitochondrial_reference_name == reference
    }

    /// The autosome list rendered for display.
    pub fn autosomal_reference_string(&self) -> String {
        organisms::display_list(&self.autosomal_references).join(", ")
    }
}

/// Loads every excluded-region BED file into one flat list.
pub fn load_excluded_regions(paths: &[PathBuf]) -> Result<Vec<Feature>, Error> {
    let mut regions = Vec::new();

    for path in paths {
        let features = bed::read_features(path)?;
        debug!(
            "Read {} excluded regions from {}.",
            features.len(),
            path.display()
        );
        regions.extend(features);
    }

    Ok(regions)
}

//===========//
// Collector //
//===========//

/// Examines a BAM file and collects metrics for each read group found. If
/// the BAM file has no read groups defined, one bucket is fabricated for it,
/// named by the caller.
pub struct MetricsCollector {
    /// The shared run configuration.
    pub config: Arc<CollectorConfig>,

    /// One metrics bucket per read group, keyed by read group ID.
    pub metrics: IndexMap<String, Metrics>,

    /// The TSS index, populated by [`MetricsCollector::load_tss`].
    pub tss_index: FeatureTree,

    default_bucket_name: String,
}

impl MetricsCollector {
    /// Creates a collector. `default_bucket_name` names the bucket used for
    /// records without a read group (conventionally `--name` or the
    /// alignment file's basename).
    pub fn new(config: CollectorConfig, default_bucket_name: String) -> Self {
        Self {
            config: Arc::new(config),
            metrics: IndexMap::new(),
            tss_index: FeatureTree::default(),
            default_bucket_name,
        }
    }

    /// Loads the TSS file named by the configuration, dropping TSS on
    /// excluded regions and on non-autosomal references.
    pub fn load_tss(&mut self) -> anyhow::Result<()> {
        let Some(tss_file) = self.config.tss_file.clone() else {
            return Ok(());
        };

        debug!("Loading TSS file '{}'.", tss_file.display());

        for tss in bed::read_features(&tss_file)? {
            if let Some(excluded) = self
                .config
                .excluded_regions
                .iter()
                .find(|region| tss.overlaps(region))
            {
                debug!(
                    "Excluding TSS [{}] which overlaps excluded region [{}]",
                    tss, excluded
                );
                continue;
            }

            if self.config.is_autosomal(&tss.reference) {
                self.tss_index.add(tss)?;
            }
        }

        self.tss_index.sort();

        for (reference, count) in self.tss_index.reference_counts() {
            debug!("{} TSS count: {}", reference, count);
        }
        debug!("Loaded {} TSS.", self.tss_index.size());

        Ok(())
    }

    /// Creates the buckets the header declares: one per `@RG` line, or the
    /// single fabricated bucket when there are none (or when read groups
    /// are being ignored).
    pub fn initialize_buckets(&mut self, raw_header: &str) -> anyhow::Result<()> {
        let read_groups = header_read_groups(raw_header);

        if !self.config.ignore_read_groups && !read_groups.is_empty() {
            for fields in &read_groups {
                // header_read_groups only returns lines with an ID
                let Some(id) = fields.get("ID").cloned() else {
                    continue;
                };

                let mut bucket = Metrics::new(Arc::clone(&self.config), &id)?;
                bucket.library =
                    Library::from_read_group(fields, &self.config.library_description);
                self.metrics.insert(id, bucket);
            }
        } else {
            let name = self.default_bucket_name.clone();
            let mut bucket = Metrics::new(Arc::clone(&self.config), &name)?;
            bucket.library = Library::fallback(&name, &self.config.library_description);
            self.metrics.insert(name, bucket);
        }

        Ok(())
    }

    /// The bucket a record belongs to.
    pub fn bucket_id_for(&self, record: &Record) -> String {
        if self.config.ignore_read_groups {
            return self.default_bucket_name.clone();
        }

        record_read_group(record).unwrap_or_else(|| self.default_bucket_name.clone())
    }

    /// Routes one record to its bucket, creating the bucket when the
    /// record's read-group tag names one the header didn't declare.
    pub fn add_record(&mut self, header: &Header, record: &Record) -> anyhow::Result<()> {
        let id = self.bucket_id_for(record);

        if let Some(bucket) = self.metrics.get_mut(&id) {
            bucket.add_alignment(header, record);
            return Ok(());
        }

        info!("Adding metrics for read group missing from file header: {}", id);
        let mut bucket = Metrics::new(Arc::clone(&self.config), &id)?;
        bucket.library = Library::fallback(&id, &self.config.library_description);
        bucket.add_alignment(header, record);
        self.metrics.insert(id, bucket);

        Ok(())
    }

    /// Post-stream bookkeeping: drops buckets that saw no reads and runs
    /// the aggregate diagnosis for the rest. When the file itself was empty
    /// every bucket is kept, so an all-zero report still comes out.
    pub fn finish_stream(&mut self) {
        let any_reads = self.metrics.values().any(|bucket| bucket.total_reads > 0);

        let empty: Vec<String> = if any_reads {
            self.metrics
                .iter()
                .filter(|(_, bucket)| bucket.total_reads == 0)
                .map(|(name, _)| name.clone())
                .collect()
        } else {
            Vec::new()
        };

        for name in empty {
            info!("Dropping metrics {} which has no reads.", name);
            self.metrics.shift_remove(&name);
        }

        for bucket in self.metrics.values_mut() {
            bucket.make_aggregate_diagnoses();
        }
    }

    /// Bucket names in natural order, for deterministic reporting.
    pub fn bucket_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.metrics.keys().cloned().collect();
        names.sort_by(|a, b| sort_strings_numerically(a, b));
        names
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;
    use std::num::NonZeroUsize;

    use noodles::sam::header::record::value::map::{Map, ReferenceSequence};
    use noodles::sam::record::data::field::{Tag, Value};
    use noodles::sam::record::{Flags, MappingQuality};

    use super::*;

    const HQAA_FLAGS: u16 = 0x1 | 0x2 | 0x20 | 0x40;

    fn header() -> Header {
        Header::builder()
            .add_reference_sequence(
                "chr1".parse().unwrap(),
                Map::<ReferenceSequence>::new(NonZeroUsize::try_from(248_956_422).unwrap()),
            )
            .build()
    }

    fn hqaa_record(start: usize, read_group: Option<&str>) -> Record {
        let mut record = Record::default();
        *record.flags_mut() = Flags::from(HQAA_FLAGS);
        *record.reference_sequence_id_mut() = Some(0);
        *record.alignment_start_mut() = noodles::core::Position::new(start);
        *record.mate_reference_sequence_id_mut() = Some(0);
        *record.mate_alignment_start_mut() = noodles::core::Position::new(start + 100);
        *record.template_length_mut() = 200;
        *record.mapping_quality_mut() = MappingQuality::new(30);
        *record.cigar_mut() = "100M".parse().unwrap();
        *record.read_name_mut() = Some("read_1".parse().unwrap());

        if let Some(rg) = read_group {
            record
                .data_mut()
                .insert(Tag::ReadGroup, Value::String(rg.to_string()));
        }

        record
    }

    fn write_peaks(dir: &tempfile::TempDir, lines: &[&str]) -> PathBuf {
        let path = dir.path().join("sample.peaks");
        let mut file = std::fs::File::create(&path).unwrap();
        for line in lines {
            writeln!(file, "{}", line).unwrap();
        }
        path
    }

    #[test]
    fn test_unknown_organism_is_a_config_error() {
        let result = CollectorConfig::for_organism("axolotl");
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_buckets_from_header_read_groups() {
        let config = CollectorConfig::for_organism("human").unwrap();
        let mut collector = MetricsCollector::new(config, String::from("sample"));

        let raw = "@HD\tVN:1.6\n@RG\tID:rg1\tLB:lib1\tSM:s1\n@RG\tID:rg2\tSM:s2\n";
        collector.initialize_buckets(raw).unwrap();

        assert_eq!(collector.bucket_names(), vec!["rg1", "rg2"]);
        assert_eq!(collector.metrics.get("rg1").unwrap().library.library, "lib1");
        assert_eq!(collector.metrics.get("rg2").unwrap().library.sample, "s2");
    }

    #[test]
    fn test_single_bucket_without_read_groups() {
        let config = CollectorConfig::for_organism("human").unwrap();
        let mut collector = MetricsCollector::new(config, String::from("sample"));

        collector.initialize_buckets("@HD\tVN:1.6\n").unwrap();

        assert_eq!(collector.bucket_names(), vec!["sample"]);
        assert_eq!(
            collector.metrics.get("sample").unwrap().library.sample,
            "sample"
        );
    }

    #[test]
    fn test_ignore_read_groups_routes_everything_to_one_bucket() {
        let mut config = CollectorConfig::for_organism("human").unwrap();
        config.ignore_read_groups = true;
        let mut collector = MetricsCollector::new(config, String::from("sample"));

        collector
            .initialize_buckets("@RG\tID:rg1\n@RG\tID:rg2\n")
            .unwrap();
        assert_eq!(collector.bucket_names(), vec!["sample"]);

        let header = header();
        collector
            .add_record(&header, &hqaa_record(351, Some("rg1")))
            .unwrap();
        collector
            .add_record(&header, &hqaa_record(351, Some("rg2")))
            .unwrap();

        assert_eq!(collector.metrics.get("sample").unwrap().total_reads, 2);
    }

    #[test]
    fn test_unknown_read_group_creates_bucket_lazily() {
        let config = CollectorConfig::for_organism("human").unwrap();
        let mut collector = MetricsCollector::new(config, String::from("sample"));
        collector.initialize_buckets("@RG\tID:rg1\n").unwrap();

        let header = header();
        collector
            .add_record(&header, &hqaa_record(351, Some("mystery")))
            .unwrap();

        assert_eq!(collector.bucket_names(), vec!["mystery", "rg1"]);
        assert_eq!(collector.metrics.get("mystery").unwrap().total_reads, 1);
    }

    #[test]
    fn test_empty_buckets_are_dropped() {
        let config = CollectorConfig::for_organism("human").unwrap();
        let mut collector = MetricsCollector::new(config, String::from("sample"));
        collector
            .initialize_buckets("@RG\tID:rg1\n@RG\tID:rg2\n")
            .unwrap();

        let header = header();
        collector
            .add_record(&header, &hqaa_record(351, Some("rg1")))
            .unwrap();

        collector.finish_stream();
        assert_eq!(collector.bucket_names(), vec!["rg1"]);
    }

    #[test]
    fn test_empty_file_keeps_the_only_bucket() {
        let config = CollectorConfig::for_organism("human").unwrap();
        let mut collector = MetricsCollector::new(config, String::from("sample"));
        collector.initialize_buckets("@HD\tVN:1.6\n").unwrap();

        collector.finish_stream();

        assert_eq!(collector.bucket_names(), vec!["sample"]);
        assert_eq!(collector.metrics.get("sample").unwrap().total_reads, 0);
    }

    #[test]
    fn test_record_overlapping_two_peaks() {
        let dir = tempfile::tempdir().unwrap();
        let peaks = write_peaks(
            &dir,
            &["chr1\t100\t500\tpeak_1", "chr1\t400\t800\tpeak_2"],
        );

        let mut config = CollectorConfig::for_organism("human").unwrap();
        config.peak_file = Some(peaks.display().to_string());
        let mut collector = MetricsCollector::new(config, String::from("sample"));
        collector.initialize_buckets("@HD\tVN:1.6\n").unwrap();

        let header = header();
        // [350, 450) with a 100M CIGAR.
        collector
            .add_record(&header, &hqaa_record(351, None))
            .unwrap();

        let bucket = collector.metrics.get("sample").unwrap();
        assert!(bucket
            .peaks
            .list_peaks()
            .iter()
            .all(|p| p.overlapping_hqaa == 1));
        assert_eq!(bucket.peaks.hqaa_in_peaks, 1);
        assert_eq!(bucket.peaks.ppm_in_peaks, 1);
        assert_eq!(bucket.peaks.ppm_not_in_peaks, 0);
    }

    #[test]
    fn test_peak_on_excluded_region_is_dropped_at_load() {
        let dir = tempfile::tempdir().unwrap();
        let peaks = write_peaks(&dir, &["chr1\t100\t500\tpeak_1"]);

        let mut config = CollectorConfig::for_organism("human").unwrap();
        config.peak_file = Some(peaks.display().to_string());
        config.excluded_regions = vec![Feature::new("chr1", 200, 300, "blacklist_1")];
        let mut collector = MetricsCollector::new(config, String::from("sample"));
        collector.initialize_buckets("@HD\tVN:1.6\n").unwrap();

        let header = header();
        collector
            .add_record(&header, &hqaa_record(351, None))
            .unwrap();

        let bucket = collector.metrics.get("sample").unwrap();
        assert_eq!(bucket.peaks.size(), 0);
        assert_eq!(bucket.peaks.hqaa_in_peaks, 0);
        assert_eq!(bucket.peaks.ppm_not_in_peaks, 1);
    }

    #[test]
    fn test_non_autosomal_peaks_are_dropped_silently() {
        let dir = tempfile::tempdir().unwrap();
        let peaks = write_peaks(
            &dir,
            &["chrX\t100\t500\tpeak_x", "chr1\t100\t500\tpeak_1"],
        );

        let mut config = CollectorConfig::for_organism("human").unwrap();
        config.peak_file = Some(peaks.display().to_string());
        let mut collector = MetricsCollector::new(config, String::from("sample"));
        collector.initialize_buckets("@HD\tVN:1.6\n").unwrap();

        let bucket = collector.metrics.get("sample").unwrap();
        assert_eq!(bucket.peaks.size(), 1);
    }

    #[test]
    fn test_tss_loading_respects_exclusions() {
        let dir = tempfile::tempdir().unwrap();
        let tss = dir.path().join("tss.bed");
        let mut file = std::fs::File::create(&tss).unwrap();
        writeln!(file, "chr1\t1000\t1001\ttss_1\t0\t+").unwrap();
        writeln!(file, "chr1\t2000\t2001\ttss_2\t0\t-").unwrap();
        writeln!(file, "chrX\t3000\t3001\ttss_x\t0\t+").unwrap();
        drop(file);

        let mut config = CollectorConfig::for_organism("human").unwrap();
        config.tss_file = Some(tss);
        config.excluded_regions = vec![Feature::new("chr1", 1990, 2010, "blacklist_1")];
        let mut collector = MetricsCollector::new(config, String::from("sample"));

        collector.load_tss().unwrap();
        assert_eq!(collector.tss_index.size(), 1);
    }
}
