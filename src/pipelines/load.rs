//! # Load Pipeline
//!
//! Drives one load session:
//! 1. Parse markers into canonical order and summarise chromosomes
//! 2. Discover samples, optionally enriched from a sample-info file
//! 3. Create the container and write every dictionary
//! 4. Stream genotypes through the sink, inferring the encoding on the way
//! 5. Write the encoding tag, seal, and register the artifact
//!
//! Each step is attributed a `LoadStage` so a failure reports where it
//! happened. Any failure (including cancellation) leaves the container
//! unsealed and unregistered.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use tracing::{info, info_span, warn};

use super::registry::{MatrixArtifact, MatrixId, MatrixRegistry};
use crate::config::{LoadConfig, StrandPolicy};
use crate::data::chromosome::ChromosomeSummary;
use crate::data::genotype::{AlleleMode, GenotypeEncoding};
use crate::data::marker::MarkerSet;
use crate::data::sample::Samples;
use crate::error::{LoadError, LoadStage, Result, StageExt};
use crate::io::container::MatrixAttributes;
use crate::io::formats::sample_info::{align_sample_infos, read_sample_infos};
use crate::io::formats::{Loader, SkippedSample, SourceFormat, StreamContext};
use crate::sink::{DataSetDestination, ExtractedKeys, KeyExtractingSink, MatrixSink, MatrixSinkOptions, NullSink};
use crate::utils::progress::{LoadProgress, Phase};

/// File extension of matrix containers
pub const MATRIX_EXTENSION: &str = "gtm";

/// What one pass over the inputs produced
#[derive(Clone, Debug)]
pub struct LoadSummary {
    pub n_samples: usize,
    pub n_markers: usize,
    pub mode: AlleleMode,
    pub encoding: GenotypeEncoding,
    pub skipped: Vec<SkippedSample>,
}

/// Result of `LoadPipeline::run` / `LoadPipeline::dry_run`
#[derive(Clone, Debug)]
pub struct LoadOutcome {
    /// Registry id; `None` for dry runs
    pub id: Option<MatrixId>,
    pub artifact: MatrixArtifact,
    pub keys: ExtractedKeys,
}

/// Replace characters that do not belong in a file name
pub fn sanitize_name(name: &str) -> String {
    let cleaned: String = name
        .trim()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.' { c } else { '_' })
        .collect();
    let cleaned = cleaned.trim_matches('.');
    if cleaned.is_empty() {
        "matrix".to_string()
    } else {
        cleaned.to_string()
    }
}

/// `<dir>/<name>.gtm`, or the first free `<name>_N.gtm`
pub fn unique_output_path(dir: &Path, name: &str) -> PathBuf {
    let stem = sanitize_name(name);
    let first = dir.join(format!("{}.{}", stem, MATRIX_EXTENSION));
    if !first.exists() {
        return first;
    }
    (2u32..)
        .map(|n| dir.join(format!("{}_{}.{}", stem, n, MATRIX_EXTENSION)))
        .find(|p| !p.exists())
        .unwrap_or(first)
}

fn now_unix() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// One load session
pub struct LoadPipeline {
    config: LoadConfig,
    progress: Option<Arc<LoadProgress>>,
}

impl LoadPipeline {
    pub fn new(config: LoadConfig, progress: Option<Arc<LoadProgress>>) -> Self {
        Self { config, progress }
    }

    pub fn config(&self) -> &LoadConfig {
        &self.config
    }

    fn set_phase(&self, phase: Phase) {
        if let Some(p) = &self.progress {
            p.set_phase(phase);
        }
    }

    fn attributes(&self) -> MatrixAttributes {
        MatrixAttributes {
            name: self.config.matrix_name(),
            description: self.config.description.clone(),
            source_format: self.config.format.as_str().to_string(),
            study_id: self.config.study_id,
            strand_policy: self.config.strand.label(),
            created_unix: now_unix(),
        }
    }

    fn artifact(&self, path: PathBuf, summary: LoadSummary) -> MatrixArtifact {
        MatrixArtifact {
            path,
            name: self.config.matrix_name(),
            description: self.config.description.clone(),
            study_id: self.config.study_id,
            source_format: self.config.format.as_str().to_string(),
            n_samples: summary.n_samples,
            n_markers: summary.n_markers,
            encoding: summary.encoding,
            skipped: summary.skipped,
        }
    }

    /// Load into a new container and register it
    pub fn run(&mut self, registry: &mut dyn MatrixRegistry) -> Result<LoadOutcome> {
        self.config.validate()?;
        let path = unique_output_path(&self.config.output_dir, &self.config.matrix_name());
        let _span = info_span!("load", format = %self.config.format, path = %path.display()).entered();

        let mut options = MatrixSinkOptions::new(&path, self.attributes());
        options.strand = self.config.strand;
        options.memory_budget_bytes = self.config.memory_budget_bytes;
        let mut sink = KeyExtractingSink::new(MatrixSink::new(options));

        let summary = self.load_into(&mut sink)?;
        let (sink, keys) = sink.into_parts();
        let sealed = sink
            .sealed_path()
            .map(Path::to_path_buf)
            .ok_or_else(|| LoadError::protocol("sink finished without sealing its container"))
            .stage(LoadStage::Finalize)?;

        let artifact = self.artifact(sealed, summary);
        let id = registry.register(&artifact).stage(LoadStage::Register)?;
        self.set_phase(Phase::Complete);
        info!(
            id = %id,
            samples = artifact.n_samples,
            markers = artifact.n_markers,
            encoding = %artifact.encoding,
            skipped = artifact.skipped.len(),
            "matrix registered"
        );
        Ok(LoadOutcome {
            id: Some(id),
            artifact,
            keys,
        })
    }

    /// Parse and stream everything into a discarding sink
    pub fn dry_run(&mut self) -> Result<LoadOutcome> {
        self.config.validate()?;
        let path = unique_output_path(&self.config.output_dir, &self.config.matrix_name());
        let _span = info_span!("dry_run", format = %self.config.format).entered();
        let mut sink = KeyExtractingSink::new(NullSink::new());
        let summary = self.load_into(&mut sink)?;
        let (_, keys) = sink.into_parts();
        self.set_phase(Phase::Complete);
        Ok(LoadOutcome {
            id: None,
            artifact: self.artifact(path, summary),
            keys,
        })
    }

    /// Drive `sink` through a full session
    pub fn load_into(&self, sink: &mut dyn DataSetDestination) -> Result<LoadSummary> {
        let config = &self.config;
        let progress = self.progress.as_deref();

        // Metadata
        self.set_phase(Phase::ReadingMetadata);
        let mut loader = Loader::for_config(config).stage(LoadStage::MetadataParse)?;
        let markers = read_markers(&mut loader).stage(LoadStage::MetadataParse)?;
        let chromosomes = ChromosomeSummary::from_markers(&markers);
        let discovered = loader
            .genotypes()
            .discover_samples()
            .stage(LoadStage::MetadataParse)?;
        if discovered.infos.is_empty() {
            return Err(LoadError::invalid_data("genotype input declares no samples").at_stage(LoadStage::MetadataParse));
        }
        info!(
            markers = markers.len(),
            chromosomes = chromosomes.len(),
            samples = discovered.infos.len(),
            "metadata parsed"
        );
        if config.format == SourceFormat::Hapmap && config.strand == StrandPolicy::FromFile {
            warn!("hapmap strand flags are stored as found; treat them as best effort");
        }

        // Samples
        let (infos, dummies) = match &config.sample_info {
            Some(path) => {
                let file_infos = read_sample_infos(path).stage(LoadStage::SampleInfo)?;
                (align_sample_infos(&discovered.infos, file_infos), false)
            }
            None => (discovered.infos, !discovered.pedigree),
        };
        let samples = Samples::new(infos);

        // Container and dictionaries
        sink.init().stage(LoadStage::ContainerCreate)?;
        self.set_phase(Phase::WritingHeader);
        write_header(sink, &samples, dummies, &markers, &chromosomes).stage(LoadStage::ContainerCreate)?;

        // Genotypes
        self.set_phase(Phase::StreamingGenotypes);
        let adapter = loader.genotypes();
        let mode = adapter.mode();
        if let Some(p) = progress {
            let rows = match mode {
                AlleleMode::BySample => samples.len(),
                AlleleMode::ByMarker => markers.len(),
            };
            p.set_total_rows(rows as u64);
        }
        sink.load_alleles(mode).stage(LoadStage::GenotypeStream)?;
        let outcome = {
            let _span = info_span!("stream", %mode).entered();
            let mut ctx = StreamContext::new(&markers, &samples, sink, progress);
            adapter.stream(&mut ctx).stage(LoadStage::GenotypeStream)?;
            ctx.into_outcome()
        };

        // Finalize
        self.set_phase(Phase::Finalizing);
        let mut encoding = outcome.detector.classify();
        if encoding == GenotypeEncoding::Unknown {
            if let Some(hint) = config.encoding_hint {
                info!(%hint, "no alleles observed, using the configured encoding");
                encoding = hint;
            }
        }
        sink.finished_loading_alleles(encoding).stage(LoadStage::Finalize)?;
        sink.done().stage(LoadStage::Finalize)?;

        if !outcome.skipped.is_empty() {
            let ids: Vec<&str> = outcome.skipped.iter().map(|s| s.sample_id.as_str()).collect();
            warn!(count = ids.len(), samples = ?ids, "samples loaded as missing");
        }
        Ok(LoadSummary {
            n_samples: samples.len(),
            n_markers: markers.len(),
            mode,
            encoding,
            skipped: outcome.skipped,
        })
    }
}

fn read_markers(loader: &mut Loader) -> Result<MarkerSet> {
    let markers = loader.metadata().read_markers()?;
    if markers.is_empty() {
        return Err(LoadError::invalid_data("no markers found in the annotation"));
    }
    if markers.dropped_duplicates() > 0 {
        warn!(dropped = markers.dropped_duplicates(), "repeated marker ids dropped");
    }
    Ok(markers)
}

fn write_header(
    sink: &mut dyn DataSetDestination,
    samples: &Samples,
    dummies: bool,
    markers: &MarkerSet,
    chromosomes: &ChromosomeSummary,
) -> Result<()> {
    if dummies {
        for id in samples.ids() {
            sink.add_dummy_sample_info(id)?;
        }
        sink.load_sample_infos(&[])?;
    } else {
        sink.load_sample_infos(samples.infos())?;
    }
    sink.load_marker_metadata(markers)?;
    sink.load_chromosome_metadata(chromosomes)
}
