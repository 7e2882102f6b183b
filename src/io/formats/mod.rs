//! # Source Format Adapters
//!
//! Each supported format provides a metadata adapter (annotation/map file to a
//! sorted `MarkerSet`) and a genotype adapter (raw genotype files to rows on
//! a sink). `Loader` is the format-keyed registry: one enum variant per
//! format, built from a `LoadConfig`.
//!
//! ## Design
//! - Adapters never touch the sink directly. Rows go through `StreamContext`,
//!   which observes every allele for encoding inference, reports progress and
//!   turns a failed sample into a sentinel row plus a skip-log entry.
//! - Per-sample adapters implement `SampleRowReader` and share one driver loop
//!   (`stream_by_sample`) that polls the interruption flag between samples.

pub mod affymetrix;
pub mod beagle;
pub mod hapmap;
pub mod hgdp1;
pub mod illumina;
pub mod native;
pub mod plink;
pub mod sample_info;
pub mod sequenom;

use std::fmt;

use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::LoadConfig;
use crate::data::genotype::{AlleleMode, EncodingDetector, Genotype, GenotypeEncoding, MISSING};
use crate::data::marker::{MarkerIdx, MarkerSet};
use crate::data::sample::{SampleIdx, SampleInfo, Samples};
use crate::error::{LoadError, Result};
use crate::sink::DataSetDestination;
use crate::utils::progress::LoadProgress;

/// Declared source format
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, ValueEnum, Serialize, Deserialize)]
pub enum SourceFormat {
    /// PLINK MAP + PED
    #[value(name = "plink")]
    PlinkFlat,
    /// PLINK BIM + BED (+ FAM)
    #[value(name = "plink-binary")]
    PlinkBinary,
    /// Affymetrix annotation CSV + per-sample birdseed call files
    #[value(name = "affymetrix")]
    Affymetrix,
    #[value(name = "hapmap")]
    Hapmap,
    #[value(name = "beagle")]
    Beagle,
    #[value(name = "hgdp1")]
    Hgdp1,
    #[value(name = "illumina-lgen")]
    IlluminaLgen,
    #[value(name = "sequenom")]
    Sequenom,
    /// A previously written matrix container
    #[value(name = "native")]
    Native,
}

impl SourceFormat {
    pub fn as_str(self) -> &'static str {
        match self {
            SourceFormat::PlinkFlat => "plink",
            SourceFormat::PlinkBinary => "plink-binary",
            SourceFormat::Affymetrix => "affymetrix",
            SourceFormat::Hapmap => "hapmap",
            SourceFormat::Beagle => "beagle",
            SourceFormat::Hgdp1 => "hgdp1",
            SourceFormat::IlluminaLgen => "illumina-lgen",
            SourceFormat::Sequenom => "sequenom",
            SourceFormat::Native => "native",
        }
    }

    /// Whether markers come from a separate annotation file
    pub fn requires_annotation(self) -> bool {
        !matches!(self, SourceFormat::Hapmap | SourceFormat::Native)
    }

    /// Whether the annotation defaults to a sibling of the genotype file
    pub fn has_sibling_annotation(self) -> bool {
        matches!(self, SourceFormat::PlinkFlat | SourceFormat::PlinkBinary)
    }

    pub fn accepts_multiple_genotype_files(self) -> bool {
        matches!(self, SourceFormat::Affymetrix | SourceFormat::Hapmap)
    }

    /// One genotype file per sample; missing files are skipped samples, not setup errors
    pub fn per_sample_files(self) -> bool {
        self == SourceFormat::Affymetrix
    }
}

impl fmt::Display for SourceFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Samples found in the genotype input
#[derive(Clone, Debug, Default)]
pub struct DiscoveredSamples {
    pub infos: Vec<SampleInfo>,
    /// Infos carry real pedigree columns (PED/FAM) rather than bare ids
    pub pedigree: bool,
}

impl DiscoveredSamples {
    pub fn from_ids<I: IntoIterator<Item = String>>(ids: I) -> Self {
        Self {
            infos: ids.into_iter().map(SampleInfo::dummy).collect(),
            pedigree: false,
        }
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.infos.iter().map(|i| i.sample_id.as_str())
    }
}

/// Annotation/map parsing
pub trait MetadataAdapter {
    /// Parse markers and return them in canonical order
    fn read_markers(&mut self) -> Result<MarkerSet>;
}

/// Raw genotype streaming
pub trait GenotypeAdapter {
    fn mode(&self) -> AlleleMode;

    /// Samples in declaration order
    fn discover_samples(&mut self) -> Result<DiscoveredSamples>;

    /// Emit every row of the chosen axis, in index order, through `ctx`
    fn stream(&mut self, ctx: &mut StreamContext<'_>) -> Result<()>;
}

/// A sample whose genotypes could not be read
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkippedSample {
    pub sample_id: String,
    pub reason: String,
}

/// What a finished stream hands back to the dispatcher
#[derive(Clone, Debug, Default)]
pub struct StreamOutcome {
    pub detector: EncodingDetector,
    pub skipped: Vec<SkippedSample>,
    pub rows: usize,
}

/// Errors a single sample may absorb without failing the load
fn recoverable_for_sample(err: &LoadError) -> bool {
    matches!(
        err.root(),
        LoadError::Io(_)
            | LoadError::FileNotFound { .. }
            | LoadError::Parse { .. }
            | LoadError::InvalidData { .. }
            | LoadError::Format { .. }
    )
}

/// Row channel between a genotype adapter and the sink
pub struct StreamContext<'a> {
    markers: &'a MarkerSet,
    samples: &'a Samples,
    sink: &'a mut dyn DataSetDestination,
    progress: Option<&'a LoadProgress>,
    detector: EncodingDetector,
    last_encoding: GenotypeEncoding,
    skipped: Vec<SkippedSample>,
    rows: usize,
}

impl<'a> StreamContext<'a> {
    pub fn new(
        markers: &'a MarkerSet,
        samples: &'a Samples,
        sink: &'a mut dyn DataSetDestination,
        progress: Option<&'a LoadProgress>,
    ) -> Self {
        Self {
            markers,
            samples,
            sink,
            progress,
            detector: EncodingDetector::new(),
            last_encoding: GenotypeEncoding::Unknown,
            skipped: Vec::new(),
            rows: 0,
        }
    }

    pub fn markers(&self) -> &'a MarkerSet {
        self.markers
    }

    pub fn samples(&self) -> &'a Samples {
        self.samples
    }

    /// Fail with `Cancelled` once an interruption was requested
    pub fn check_interrupt(&self) -> Result<()> {
        match self.progress {
            Some(p) if p.is_interrupted() => Err(LoadError::Cancelled),
            _ => Ok(()),
        }
    }

    fn observe(&mut self, row: &[Genotype]) {
        self.detector.observe_all(row);
        let encoding = self.detector.classify();
        if encoding != self.last_encoding {
            debug!(from = %self.last_encoding, to = %encoding, row = self.rows, "encoding refined");
            self.last_encoding = encoding;
        }
        self.rows += 1;
        if let Some(p) = self.progress {
            p.row_done();
        }
    }

    pub fn emit_sample(&mut self, sample: SampleIdx, row: &[Genotype]) -> Result<()> {
        self.sink.add_sample_alleles(sample, row)?;
        self.observe(row);
        Ok(())
    }

    pub fn emit_marker(&mut self, marker: MarkerIdx, row: &[Genotype]) -> Result<()> {
        self.sink.add_marker_alleles(marker, row)?;
        self.observe(row);
        Ok(())
    }

    /// Record a skipped sample and emit its all-sentinel row
    pub fn skip_sample(&mut self, sample: SampleIdx, reason: impl Into<String>) -> Result<()> {
        let sample_id = self.samples[sample].sample_id.clone();
        let reason = reason.into();
        warn!(sample = %sample_id, %reason, "sample skipped, genotypes set to missing");
        self.skipped.push(SkippedSample { sample_id, reason });
        if let Some(p) = self.progress {
            p.sample_skipped();
        }
        let row = vec![MISSING; self.markers.len()];
        self.sink.add_sample_alleles(sample, &row)?;
        self.rows += 1;
        if let Some(p) = self.progress {
            p.row_done();
        }
        Ok(())
    }

    /// Emit a per-sample read result, absorbing recoverable failures
    pub fn sample_result(&mut self, sample: SampleIdx, result: Result<Vec<Genotype>>) -> Result<()> {
        match result {
            Ok(row) => self.emit_sample(sample, &row),
            Err(err) if recoverable_for_sample(&err) => self.skip_sample(sample, err.to_string()),
            Err(err) => Err(err),
        }
    }

    pub fn encoding(&self) -> GenotypeEncoding {
        self.detector.classify()
    }

    pub fn skipped(&self) -> &[SkippedSample] {
        &self.skipped
    }

    pub fn into_outcome(self) -> StreamOutcome {
        StreamOutcome {
            detector: self.detector,
            skipped: self.skipped,
            rows: self.rows,
        }
    }
}

/// Reads one sample's full row (canonical marker order) at a time
pub trait SampleRowReader {
    fn read_sample(&mut self, sample: SampleIdx, sample_id: &str, markers: &MarkerSet) -> Result<Vec<Genotype>>;
}

/// Drive a per-sample reader over every sample, polling for interruption
pub fn stream_by_sample<R: SampleRowReader + ?Sized>(reader: &mut R, ctx: &mut StreamContext<'_>) -> Result<()> {
    let samples = ctx.samples();
    let markers = ctx.markers();
    for (i, info) in samples.infos().iter().enumerate() {
        ctx.check_interrupt()?;
        let idx = SampleIdx::from(i);
        let row = reader.read_sample(idx, &info.sample_id, markers);
        ctx.sample_result(idx, row)?;
    }
    Ok(())
}

/// Format-keyed adapter registry
pub enum Loader {
    PlinkFlat(plink::PlinkFlatLoader),
    PlinkBinary(plink::PlinkBinaryLoader),
    Affymetrix(affymetrix::AffymetrixLoader),
    Hapmap(hapmap::HapmapLoader),
    Beagle(beagle::BeagleLoader),
    Hgdp1(hgdp1::Hgdp1Loader),
    IlluminaLgen(illumina::LgenLoader),
    Sequenom(sequenom::SequenomLoader),
    Native(native::NativeLoader),
}

impl Loader {
    /// Select the adapter pair for the configured format
    pub fn for_config(config: &LoadConfig) -> Result<Self> {
        Ok(match config.format {
            SourceFormat::PlinkFlat => Loader::PlinkFlat(plink::PlinkFlatLoader::new(config)?),
            SourceFormat::PlinkBinary => Loader::PlinkBinary(plink::PlinkBinaryLoader::new(config)?),
            SourceFormat::Affymetrix => Loader::Affymetrix(affymetrix::AffymetrixLoader::new(config)?),
            SourceFormat::Hapmap => Loader::Hapmap(hapmap::HapmapLoader::new(config)?),
            SourceFormat::Beagle => Loader::Beagle(beagle::BeagleLoader::new(config)?),
            SourceFormat::Hgdp1 => Loader::Hgdp1(hgdp1::Hgdp1Loader::new(config)?),
            SourceFormat::IlluminaLgen => Loader::IlluminaLgen(illumina::LgenLoader::new(config)?),
            SourceFormat::Sequenom => Loader::Sequenom(sequenom::SequenomLoader::new(config)?),
            SourceFormat::Native => Loader::Native(native::NativeLoader::new(config)?),
        })
    }

    pub fn format(&self) -> SourceFormat {
        match self {
            Loader::PlinkFlat(_) => SourceFormat::PlinkFlat,
            Loader::PlinkBinary(_) => SourceFormat::PlinkBinary,
            Loader::Affymetrix(_) => SourceFormat::Affymetrix,
            Loader::Hapmap(_) => SourceFormat::Hapmap,
            Loader::Beagle(_) => SourceFormat::Beagle,
            Loader::Hgdp1(_) => SourceFormat::Hgdp1,
            Loader::IlluminaLgen(_) => SourceFormat::IlluminaLgen,
            Loader::Sequenom(_) => SourceFormat::Sequenom,
            Loader::Native(_) => SourceFormat::Native,
        }
    }

    pub fn metadata(&mut self) -> &mut dyn MetadataAdapter {
        match self {
            Loader::PlinkFlat(l) => l,
            Loader::PlinkBinary(l) => l,
            Loader::Affymetrix(l) => l,
            Loader::Hapmap(l) => l,
            Loader::Beagle(l) => l,
            Loader::Hgdp1(l) => l,
            Loader::IlluminaLgen(l) => l,
            Loader::Sequenom(l) => l,
            Loader::Native(l) => l,
        }
    }

    pub fn genotypes(&mut self) -> &mut dyn GenotypeAdapter {
        match self {
            Loader::PlinkFlat(l) => l,
            Loader::PlinkBinary(l) => l,
            Loader::Affymetrix(l) => l,
            Loader::Hapmap(l) => l,
            Loader::Beagle(l) => l,
            Loader::Hgdp1(l) => l,
            Loader::IlluminaLgen(l) => l,
            Loader::Sequenom(l) => l,
            Loader::Native(l) => l,
        }
    }
}
