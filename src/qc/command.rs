//! The command-line surface and the driver that ties both phases together.

use std::io::Write;
use std::path::PathBuf;

use clap::Parser;
use tracing::debug;
use tracing::error;
use tracing::info;

use crate::errors::Error;
use crate::organisms;
use crate::utils::display::RecordCounter;
use crate::utils::formats::bam::{open_and_parse, IndexCheck, ParsedBAMFile};

use super::collector::{load_excluded_regions, CollectorConfig, MetricsCollector};
use super::report;
use super::tss;

/// Renders the built-in autosome lists for the long help text.
fn organism_reference_help() -> String {
    let mut help = String::from("Built-in organism autosome lists:\n");

    for organism in organisms::ORGANISMS {
        if let Some(references) = organisms::autosomal_references(organism) {
            help.push_str(&format!(
                "  {:>8}  {}\n",
                organism,
                organisms::display_list(&references).join(" ")
            ));
        }
    }

    help.push_str(
        "\nThe built-in lists contain names with \"chr\" prefixes (\"chr1\") and \
         without (\"1\"). If you need a different set of autosomes, supply a list \
         with --autosomal-reference-file.",
    );
    help
}

/// QC metrics for ATAC-seq data.
#[derive(Parser)]
#[command(
    name = "ataqv",
    version,
    about = "QC metrics for ATAC-seq data",
    after_long_help = organism_reference_help()
)]
pub struct Args {
    /// The organism the experiment's libraries were sequenced from, which
    /// determines the list of autosomes (see --autosomal-reference-file to
    /// supply your own).
    #[arg(value_name = "ORGANISM")]
    pub organism: String,

    /// A BAM file of alignments with duplicate reads marked.
    #[arg(value_name = "ALIGNMENT_FILE")]
    pub alignment_file: PathBuf,

    /// A BED file of peaks called for the alignments. Specify "auto" to use
    /// one peak file per read group, named "<read group ID>.peaks".
    #[arg(long, value_name = "FILE")]
    pub peak_file: Option<String>,

    /// A BED file of transcription start sites. When supplied, a TSS
    /// enrichment score is calculated; this requires the BAM file to be
    /// indexed.
    #[arg(long, value_name = "FILE")]
    pub tss_file: Option<PathBuf>,

    /// Bases examined on each side of a transcription start site.
    #[arg(long, value_name = "BASES", default_value_t = 1000)]
    pub tss_extension: usize,

    /// A BED file of regions whose peaks and TSS are ignored. May be given
    /// multiple times.
    #[arg(long = "excluded-region-file", value_name = "FILE")]
    pub excluded_region_files: Vec<PathBuf>,

    /// A file of autosomal reference names, one per line, replacing the
    /// built-in list for the organism. The names must match the reference
    /// names in the alignment file exactly.
    #[arg(long, value_name = "FILE")]
    pub autosomal_reference_file: Option<PathBuf>,

    /// The name of the mitochondrial reference in the alignment file.
    #[arg(long, value_name = "NAME", default_value = "chrM")]
    pub mitochondrial_reference_name: String,

    /// Combine metrics for all records under a single bucket named with
    /// --name, even if the file declares read groups.
    #[arg(long)]
    pub ignore_read_groups: bool,

    /// A label for the metrics when there are no read groups. With read
    /// groups present, each is named by its ID field instead.
    #[arg(long, value_name = "NAME")]
    pub name: Option<String>,

    /// A short description of the experiment.
    #[arg(long, value_name = "TEXT", default_value = "")]
    pub description: String,

    /// A URL with more detail on the experiment.
    #[arg(long, value_name = "URL", default_value = "")]
    pub url: String,

    /// Use this description for every library, instead of each read
    /// group's DS field.
    #[arg(long, value_name = "TEXT", default_value = "")]
    pub library_description: String,

    /// The maximum number of worker threads for the TSS coverage pass.
    #[arg(long, value_name = "N", default_value_t = 1)]
    pub threads: usize,

    /// Where to write the metrics. Defaults to the alignment file's name
    /// with ".ataqv.json" appended; a ".gz" suffix compresses the output.
    #[arg(long, value_name = "FILE")]
    pub metrics_file: Option<PathBuf>,

    /// Write the metrics file as tabular (TSV) text instead of JSON,
    /// omitting the full distributions. Useful with very many read groups.
    #[arg(long)]
    pub tabular_output: bool,

    /// Log problematic reads to a gzip-compressed file per read group,
    /// named "<read group ID>.problems.gz".
    #[arg(long)]
    pub log_problematic_reads: bool,

    /// Show more details and progress updates.
    #[arg(short, long)]
    pub verbose: bool,

    /// Only print errors.
    #[arg(short, long, conflicts_with = "verbose")]
    pub quiet: bool,
}

/// Runs the whole QC pipeline for one invocation.
pub fn qc(args: Args) -> anyhow::Result<()> {
    info!("Starting qc run...");

    //===============//
    // Configuration //
    //===============//

    let mut config = match &args.autosomal_reference_file {
        Some(path) => {
            let autosomal_references = organisms::load_autosomal_references(path)?;
            debug!(
                "Read {} {} autosomal references from {}.",
                autosomal_references.len(),
                args.organism,
                path.display()
            );

            CollectorConfig::with_autosomal_references(&args.organism, autosomal_references)
        }
        None => CollectorConfig::for_organism(&args.organism)?,
    };

    config.description = args.description.clone();
    config.url = args.url.clone();
    config.library_description = args.library_description.clone();
    config.mitochondrial_reference_name = args.mitochondrial_reference_name.clone();
    config.peak_file = args.peak_file.clone();
    config.tss_file = args.tss_file.clone();
    config.tss_extension = args.tss_extension;
    config.ignore_read_groups = args.ignore_read_groups;
    config.log_problematic_reads = args.log_problematic_reads;
    config.excluded_regions = load_excluded_regions(&args.excluded_region_files)?;

    let alignment_basename = args
        .alignment_file
        .file_name()
        .map(|name| name.to_string_lossy().to_string())
        .unwrap_or_else(|| String::from("metrics"));

    let default_bucket_name = args
        .name
        .clone()
        .unwrap_or_else(|| alignment_basename.clone());

    let metrics_file = args
        .metrics_file
        .clone()
        .unwrap_or_else(|| PathBuf::from(format!("{}.ataqv.json", alignment_basename)));

    let tss_requested = config.tss_file.is_some();
    let mut collector = MetricsCollector::new(config, default_bucket_name.clone());

    //===========================//
    // Phase 1: stream and count //
    //===========================//

    let index_check = if tss_requested {
        IndexCheck::CheckForIndex
    } else {
        IndexCheck::DontCheckForIndex
    };

    let ParsedBAMFile {
        mut reader, header, ..
    } = open_and_parse(&args.alignment_file, index_check)?;

    if tss_requested {
        collector.load_tss()?;
    }

    collector.initialize_buckets(&header.raw)?;

    debug!(
        "Collecting metrics from {}.",
        args.alignment_file.display()
    );

    let mut counter = RecordCounter::new();
    for result in reader.records(&header.parsed) {
        let record = match result {
            Ok(record) => record,
            Err(e) => {
                // A record that cannot be decoded ends the streaming phase,
                // but the report is still produced over the valid records
                // seen so far.
                error!(
                    "{:#}",
                    Error::FileFormat {
                        format: "BAM",
                        path: args.alignment_file.display().to_string(),
                        reason: format!(
                            "could not decode alignment record {}: {}",
                            counter.get() + 1,
                            e
                        ),
                    }
                );
                break;
            }
        };

        collector.add_record(&header.parsed, &record)?;
        counter.inc();
    }
    counter.report();

    collector.finish_stream();

    //=======================//
    // Phase 2: TSS coverage //
    //=======================//

    // A TSS worker failure aborts only this phase; phase-1 metrics are
    // still reported below, and the error is surfaced at exit.
    let tss_result = tss::calculate_tss_coverage(
        &mut collector,
        &args.alignment_file,
        &default_bucket_name,
        args.threads,
    );

    if let Err(e) = &tss_result {
        error!("TSS enrichment failed: {:#}", e);
    }

    //========//
    // Output //
    //========//

    {
        let stdout = std::io::stdout();
        let mut out = stdout.lock();
        report::write_text(&mut out, &collector, args.threads)?;
        out.flush()?;
    }

    info!(
        "Writing {} metrics to {}",
        if args.tabular_output { "tabular" } else { "JSON" },
        metrics_file.display()
    );
    report::write_metrics_file(&collector, &metrics_file, args.tabular_output)?;
    info!("Metrics written to \"{}\"", metrics_file.display());

    tss_result
}
