//! # Genomatrix: Genotype Dataset Normalizer
//!
//! Loads a vendor genotype dataset into one sorted matrix container.
//!
//! ## Usage
//! ```bash
//! # PLINK binary fileset (BIM/FAM found next to the BED)
//! genomatrix load --format plink-binary --genotypes study.bed --out matrices
//!
//! # Affymetrix: annotation plus a directory of birdseed call files
//! genomatrix load --format affymetrix --annotation GenomeWideSNP_6.na35.annot.csv \
//!     --genotypes calls/ --probe-blacklist duplicates.txt --out matrices
//!
//! # Print dimensions, encoding and chromosomes of a finished container
//! genomatrix inspect matrices/plink-binary_matrix.gtm --chromosomes
//! ```

use std::time::Instant;

use anyhow::Context;
use tracing_subscriber::filter::LevelFilter;

use genomatrix::config::{Cli, Command, InspectArgs, LoadArgs};
use genomatrix::io::container::MatrixReader;
use genomatrix::pipelines::{CatalogRegistry, LoadPipeline};
use genomatrix::utils::progress::{HeartbeatConfig, HeartbeatHandle, LoadProgress};

/// Default catalog file name inside the output directory
const CATALOG_FILE: &str = "catalog.jsonl";

fn main() {
    if let Err(e) = run() {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

/// Initialize the tracing subscriber with a verbosity-selected level
fn init_logging(verbose: u8, quiet: bool) {
    use tracing_subscriber::fmt;

    let level = match (quiet, verbose) {
        (true, _) => LevelFilter::WARN,
        (false, 0) => LevelFilter::INFO,
        (false, 1) => LevelFilter::DEBUG,
        (false, _) => LevelFilter::TRACE,
    };
    fmt()
        .with_max_level(level)
        .with_target(false)
        .with_timer(fmt::time::uptime())
        .with_writer(std::io::stderr)
        .init();
}

fn run() -> anyhow::Result<()> {
    let cli = Cli::parse_and_validate()?;
    init_logging(cli.verbose, cli.quiet);

    match &cli.command {
        Command::Load(args) => load(args),
        Command::Inspect(args) => inspect(args),
    }
}

fn load(args: &LoadArgs) -> anyhow::Result<()> {
    let start = Instant::now();
    let config = args.to_config()?;
    eprintln!("Genomatrix v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("Format: {}", config.format);
    eprintln!("Genotypes: {} file(s)", config.genotypes.len());

    let progress = LoadProgress::new();
    let heartbeat = if args.heartbeat_secs > 0 {
        let hb_config = HeartbeatConfig {
            interval_secs: args.heartbeat_secs,
            ..HeartbeatConfig::default()
        };
        Some(HeartbeatHandle::spawn(progress.clone(), hb_config).context("starting heartbeat thread")?)
    } else {
        None
    };

    let catalog_path = args
        .catalog
        .clone()
        .unwrap_or_else(|| config.output_dir.join(CATALOG_FILE));
    let mut pipeline = LoadPipeline::new(config, Some(progress));
    let result = if args.dry_run {
        pipeline.dry_run()
    } else {
        let mut catalog = CatalogRegistry::new(&catalog_path);
        pipeline.run(&mut catalog)
    };

    if let Some(heartbeat) = heartbeat {
        heartbeat.shutdown();
    }
    let outcome = result.with_context(|| format!("loading {} dataset", pipeline.config().format))?;

    match outcome.id {
        Some(id) => {
            println!("Matrix id: {}", id);
            println!("Path: {}", outcome.artifact.path.display());
            println!("Catalog: {}", catalog_path.display());
        }
        None => println!("Dry run: nothing written"),
    }
    println!(
        "Samples: {}  Markers: {}  Encoding: {}",
        outcome.artifact.n_samples, outcome.artifact.n_markers, outcome.artifact.encoding
    );
    if !outcome.artifact.skipped.is_empty() {
        println!("Skipped samples ({}):", outcome.artifact.skipped.len());
        for skip in &outcome.artifact.skipped {
            println!("  {}\t{}", skip.sample_id, skip.reason);
        }
    }
    eprintln!("Completed in {:.2}s", start.elapsed().as_secs_f64());
    Ok(())
}

fn inspect(args: &InspectArgs) -> anyhow::Result<()> {
    let reader = MatrixReader::open(&args.matrix)
        .with_context(|| format!("opening {}", args.matrix.display()))?;
    let attrs = reader.attributes();
    let chromosomes = reader.chromosome_summary()?;

    println!("Name: {}", attrs.name);
    if !attrs.description.is_empty() {
        println!("Description: {}", attrs.description);
    }
    println!("Source format: {}", attrs.source_format);
    println!("Study: {}", attrs.study_id);
    println!("Strand: {}", attrs.strand_policy);
    println!("Samples: {}", reader.n_samples());
    println!("Markers: {}", reader.n_markers());
    println!("Chromosomes: {}", chromosomes.len());
    println!("Encoding: {}", reader.encoding()?);
    println!("Allele dictionary: {}", if reader.bases().is_some() { "yes" } else { "no" });

    if args.chromosomes {
        println!("chr\tmarkers\tmin_pos\tmax_pos\tfirst_index");
        for (label, info) in chromosomes.iter() {
            println!(
                "{}\t{}\t{}\t{}\t{}",
                label, info.marker_count, info.min_position, info.max_position, info.first_marker
            );
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use genomatrix::{config, data, error, io, pipelines, sink, utils};

    #[test]
    fn test_module_imports() {
        // Verify all modules are accessible
        let _ = config::Cli::parse_and_validate;
        let _ = error::LoadError::format("test");
        let _ = data::marker::MarkerIdx::new;
        let _ = io::container::MatrixReader::open;
        let _ = pipelines::LoadPipeline::new;
        let _ = sink::NullSink::new;
        let _ = utils::progress::LoadProgress::new;
    }
}
