//! # Matrix Sink
//!
//! Persists a load session into a matrix container under a fixed memory
//! budget.
//!
//! - `init` creates the container file, so an unwritable destination fails
//!   before any input is parsed.
//! - Sample and marker dictionaries are encoded as soon as they arrive (long
//!   ids fail early) and written once the chromosome summary completes the
//!   layout.
//! - Genotype rows go through a `HyperslabBuffer`; the encoding tag is written
//!   after the last block, and `done` seals the file.

use std::path::{Path, PathBuf};

use tracing::{debug, info};

use super::{DataSetDestination, HyperslabBuffer, LifecycleGuard};
use crate::config::StrandPolicy;
use crate::data::chromosome::ChromosomeSummary;
use crate::data::genotype::{AlleleMode, Genotype, GenotypeEncoding, MISSING};
use crate::data::marker::{MarkerIdx, MarkerSet, Strand};
use crate::data::sample::{SampleIdx, SampleInfo};
use crate::error::{LoadError, Result};
use crate::io::container::{
    encode_fixed, ContainerHeader, Dimensions, MatrixAttributes, MatrixWriter, Strides,
    VAR_CHR_INFO, VAR_CHR_IN_MATRIX, VAR_GT_STRAND, VAR_MARKERSET, VAR_MARKERS_BASES_DICT,
    VAR_MARKERS_CHR, VAR_MARKERS_POS, VAR_MARKERS_RSID, VAR_SAMPLESET,
};

/// Construction options for a `MatrixSink`
#[derive(Clone, Debug)]
pub struct MatrixSinkOptions {
    pub path: PathBuf,
    pub attributes: MatrixAttributes,
    pub strand: StrandPolicy,
    pub memory_budget_bytes: usize,
    pub strides: Strides,
}

impl MatrixSinkOptions {
    pub fn new(path: impl Into<PathBuf>, attributes: MatrixAttributes) -> Self {
        Self {
            path: path.into(),
            attributes,
            strand: StrandPolicy::FromFile,
            memory_budget_bytes: crate::config::DEFAULT_MEMORY_BUDGET,
            strides: Strides::default(),
        }
    }
}

/// Pre-encoded marker dictionaries
#[derive(Default)]
struct MarkerDictionaries {
    ids: Vec<u8>,
    rs_ids: Vec<u8>,
    chromosomes: Vec<u8>,
    positions: Vec<i32>,
    bases: Option<Vec<u8>>,
    strands: Vec<u8>,
    n_strands: u64,
}

pub struct MatrixSink {
    options: MatrixSinkOptions,
    guard: LifecycleGuard,
    writer: Option<MatrixWriter>,
    samples: Vec<SampleInfo>,
    sample_dict: Vec<u8>,
    n_markers: usize,
    markers: Option<MarkerDictionaries>,
    buffer: Option<HyperslabBuffer>,
    sealed: Option<PathBuf>,
}

impl MatrixSink {
    pub fn new(options: MatrixSinkOptions) -> Self {
        Self {
            options,
            guard: LifecycleGuard::new(),
            writer: None,
            samples: Vec::new(),
            sample_dict: Vec::new(),
            n_markers: 0,
            markers: None,
            buffer: None,
            sealed: None,
        }
    }

    pub fn path(&self) -> &Path {
        &self.options.path
    }

    /// Path of the sealed container, once `done` has succeeded
    pub fn sealed_path(&self) -> Option<&Path> {
        self.sealed.as_deref()
    }

    pub fn samples(&self) -> &[SampleInfo] {
        &self.samples
    }

    /// Rows per flushed block, once streaming has started
    pub fn rows_per_slab(&self) -> Option<usize> {
        self.buffer.as_ref().map(HyperslabBuffer::rows_per_slab)
    }

    /// Largest number of rows buffered at once
    pub fn peak_buffered_rows(&self) -> usize {
        self.buffer
            .as_ref()
            .map(HyperslabBuffer::peak_buffered_rows)
            .unwrap_or(0)
    }

    fn writer(&mut self) -> Result<&mut MatrixWriter> {
        self.writer
            .as_mut()
            .ok_or_else(|| LoadError::protocol("matrix sink has no open container"))
    }

    fn encode_markers(&self, markers: &MarkerSet) -> Result<MarkerDictionaries> {
        let s = self.options.strides;
        let records = markers.records();
        let ids = encode_fixed(records.iter().map(|r| r.marker_id.as_str()), s.marker_name, "marker id")?;
        let rs_ids = encode_fixed(records.iter().map(|r| r.rs_id.as_str()), s.marker_name, "rs id")?;
        let chromosomes = encode_fixed(records.iter().map(|r| r.chromosome.as_str()), s.chromosome, "chromosome")?;
        let positions = records.iter().map(|r| r.position).collect();
        let bases = markers.has_alleles().then(|| {
            records
                .iter()
                .flat_map(|r| r.alleles.unwrap_or(MISSING))
                .collect()
        });

        let (strands, n_strands) = match self.options.strand {
            StrandPolicy::FromFile if markers.has_strand() => (
                encode_fixed(
                    records.iter().map(|r| r.strand.unwrap_or_default().as_str()),
                    s.strand,
                    "strand",
                )?,
                records.len() as u64,
            ),
            StrandPolicy::FromFile => (encode_fixed([Strand::Unknown.as_str()], s.strand, "strand")?, 1),
            StrandPolicy::MatrixWide(strand) => (encode_fixed([strand.as_str()], s.strand, "strand")?, 1),
        };

        Ok(MarkerDictionaries {
            ids,
            rs_ids,
            chromosomes,
            positions,
            bases,
            strands,
            n_strands,
        })
    }
}

impl DataSetDestination for MatrixSink {
    fn init(&mut self) -> Result<()> {
        self.guard.init()?;
        if let Some(parent) = self.options.path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent)?;
            }
        }
        self.writer = Some(MatrixWriter::create(&self.options.path)?);
        debug!(path = %self.options.path.display(), "matrix container created");
        Ok(())
    }

    fn add_dummy_sample_info(&mut self, sample_id: &str) -> Result<()> {
        self.guard.dummy_sample()?;
        self.samples.push(SampleInfo::dummy(sample_id));
        Ok(())
    }

    fn load_sample_infos(&mut self, infos: &[SampleInfo]) -> Result<()> {
        self.guard.samples(self.samples.len() + infos.len())?;
        self.samples.extend_from_slice(infos);
        self.sample_dict = encode_fixed(
            self.samples.iter().map(|s| s.sample_id.as_str()),
            self.options.strides.sample_name,
            "sample id",
        )?;
        Ok(())
    }

    fn load_marker_metadata(&mut self, markers: &MarkerSet) -> Result<()> {
        self.guard.markers(markers.len())?;
        self.markers = Some(self.encode_markers(markers)?);
        self.n_markers = markers.len();
        Ok(())
    }

    fn load_chromosome_metadata(&mut self, chromosomes: &ChromosomeSummary) -> Result<()> {
        self.guard.chromosomes(chromosomes.total_markers())?;
        let dicts = self
            .markers
            .take()
            .ok_or_else(|| LoadError::protocol("marker metadata missing"))?;

        let dimensions = Dimensions {
            samples: self.samples.len() as u64,
            markers: self.n_markers as u64,
            chromosomes: chromosomes.len() as u64,
            strands: dicts.n_strands,
            has_bases: dicts.bases.is_some(),
        };
        let header = ContainerHeader::layout(dimensions, self.options.strides, self.options.attributes.clone())?;

        let labels: Vec<&str> = chromosomes.labels().collect();
        let chr_labels = encode_fixed(labels, self.options.strides.chromosome, "chromosome")?;
        let chr_info: Vec<i32> = chromosomes
            .iter()
            .flat_map(|(_, info)| {
                [
                    info.marker_count as i32,
                    info.min_position,
                    info.max_position,
                    info.first_marker as i32,
                ]
            })
            .collect();

        let sample_dict = std::mem::take(&mut self.sample_dict);
        let writer = self.writer()?;
        writer.define(header)?;
        writer.write_bytes(VAR_SAMPLESET, &sample_dict)?;
        writer.write_bytes(VAR_MARKERSET, &dicts.ids)?;
        writer.write_bytes(VAR_MARKERS_RSID, &dicts.rs_ids)?;
        writer.write_bytes(VAR_MARKERS_CHR, &dicts.chromosomes)?;
        writer.write_i32s(VAR_MARKERS_POS, &dicts.positions)?;
        if let Some(bases) = &dicts.bases {
            writer.write_bytes(VAR_MARKERS_BASES_DICT, bases)?;
        }
        writer.write_bytes(VAR_GT_STRAND, &dicts.strands)?;
        writer.write_bytes(VAR_CHR_IN_MATRIX, &chr_labels)?;
        writer.write_i32s(VAR_CHR_INFO, &chr_info)?;
        debug!(
            samples = dimensions.samples,
            markers = dimensions.markers,
            chromosomes = dimensions.chromosomes,
            "dictionaries written"
        );
        Ok(())
    }

    fn load_alleles(&mut self, mode: AlleleMode) -> Result<()> {
        self.guard.alleles(mode)?;
        let (other, total) = match mode {
            AlleleMode::BySample => (self.n_markers, self.samples.len()),
            AlleleMode::ByMarker => (self.samples.len(), self.n_markers),
        };
        self.buffer = Some(HyperslabBuffer::new(other, total, self.options.memory_budget_bytes));
        Ok(())
    }

    fn add_sample_alleles(&mut self, sample: SampleIdx, alleles: &[Genotype]) -> Result<()> {
        self.guard
            .row(AlleleMode::BySample, sample.as_usize(), alleles.len())?;
        let pushed = push_row(&mut self.buffer, &mut self.writer, AlleleMode::BySample, alleles);
        self.guard.fail_on_error(pushed)
    }

    fn add_marker_alleles(&mut self, marker: MarkerIdx, alleles: &[Genotype]) -> Result<()> {
        self.guard
            .row(AlleleMode::ByMarker, marker.as_usize(), alleles.len())?;
        let pushed = push_row(&mut self.buffer, &mut self.writer, AlleleMode::ByMarker, alleles);
        self.guard.fail_on_error(pushed)
    }

    fn finished_loading_alleles(&mut self, encoding: GenotypeEncoding) -> Result<()> {
        let mode = self
            .guard
            .mode()
            .ok_or_else(|| LoadError::protocol("finished_loading_alleles before load_alleles"))?;
        self.guard.finish()?;
        let written = match (self.buffer.as_mut(), self.writer.as_mut()) {
            (Some(buffer), Some(writer)) => buffer
                .finish(|first, data| writer.write_genotype_rows(mode, first, data))
                .and_then(|rows| {
                    writer.write_encoding(encoding)?;
                    Ok((rows, buffer.flush_count()))
                }),
            _ => Err(LoadError::protocol("matrix sink is not streaming")),
        };
        let (rows, flushes) = self.guard.fail_on_error(written)?;
        debug!(rows, flushes, %encoding, "genotypes complete");
        Ok(())
    }

    fn done(&mut self) -> Result<()> {
        self.guard.done()?;
        let writer = self
            .writer
            .take()
            .ok_or_else(|| LoadError::protocol("matrix sink has no open container"))?;
        let path = writer.seal()?;
        info!(path = %path.display(), samples = self.samples.len(), markers = self.n_markers, "matrix sealed");
        self.sealed = Some(path);
        Ok(())
    }
}

fn push_row(
    buffer: &mut Option<HyperslabBuffer>,
    writer: &mut Option<MatrixWriter>,
    mode: AlleleMode,
    alleles: &[Genotype],
) -> Result<()> {
    let (Some(buffer), Some(writer)) = (buffer.as_mut(), writer.as_mut()) else {
        return Err(LoadError::protocol("matrix sink is not streaming"));
    };
    buffer.push_row(alleles, |first, data| writer.write_genotype_rows(mode, first, data))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::marker::MarkerRecord;
    use crate::io::container::{reader, MatrixReader};

    fn markers() -> MarkerSet {
        MarkerSet::from_records(vec![
            MarkerRecord::new("m3", None, "X", 5).with_strand(Strand::Minus),
            MarkerRecord::new("m1", Some("rs1"), "1", 100).with_alleles("A", "G"),
            MarkerRecord::new("m2", None, "1", 150),
        ])
    }

    fn prepared(dir: &Path, budget: usize, strand: StrandPolicy) -> MatrixSink {
        let mut options = MatrixSinkOptions::new(dir.join("out.gtm"), MatrixAttributes::default());
        options.memory_budget_bytes = budget;
        options.strand = strand;
        let mut sink = MatrixSink::new(options);
        let markers = markers();
        sink.init().unwrap();
        sink.add_dummy_sample_info("s1").unwrap();
        sink.add_dummy_sample_info("s2").unwrap();
        sink.load_sample_infos(&[]).unwrap();
        sink.load_marker_metadata(&markers).unwrap();
        sink.load_chromosome_metadata(&ChromosomeSummary::from_markers(&markers))
            .unwrap();
        sink
    }

    #[test]
    fn test_by_marker_round_trip_with_small_budget() {
        let dir = tempfile::tempdir().unwrap();
        let mut sink = prepared(dir.path(), 1, StrandPolicy::FromFile);
        sink.load_alleles(AlleleMode::ByMarker).unwrap();
        assert_eq!(sink.rows_per_slab(), Some(1));
        sink.add_marker_alleles(MarkerIdx::new(0), &[*b"AA", *b"AG"]).unwrap();
        sink.add_marker_alleles(MarkerIdx::new(1), &[MISSING, *b"CC"]).unwrap();
        sink.add_marker_alleles(MarkerIdx::new(2), &[*b"TT", *b"GG"]).unwrap();
        sink.finished_loading_alleles(GenotypeEncoding::Acgt0).unwrap();
        assert!(!reader::is_sealed(sink.path()).unwrap());
        sink.done().unwrap();
        assert_eq!(sink.peak_buffered_rows(), 1);

        let r = MatrixReader::open(sink.sealed_path().unwrap()).unwrap();
        assert_eq!(r.sample_ids().unwrap(), vec!["s1", "s2"]);
        assert_eq!(r.marker_ids().unwrap(), vec!["m1", "m2", "m3"]);
        assert_eq!(r.rs_ids().unwrap(), vec!["rs1", "m2", "m3"]);
        assert_eq!(r.sample_row(SampleIdx::new(0)).unwrap(), b"AA00TT");
        assert_eq!(r.sample_row(SampleIdx::new(1)).unwrap(), b"AGCCGG");
        assert_eq!(r.bases(), Some(vec![*b"AG", MISSING, MISSING]));
        assert_eq!(
            r.strands().unwrap(),
            vec![Strand::Unknown, Strand::Unknown, Strand::Minus]
        );
        assert_eq!(r.encoding().unwrap(), GenotypeEncoding::Acgt0);
    }

    #[test]
    fn test_matrix_wide_strand_is_broadcast() {
        let dir = tempfile::tempdir().unwrap();
        let mut sink = prepared(dir.path(), 1 << 20, StrandPolicy::MatrixWide(Strand::Fwd));
        sink.load_alleles(AlleleMode::BySample).unwrap();
        sink.add_sample_alleles(SampleIdx::new(0), &[*b"AA"; 3]).unwrap();
        sink.add_sample_alleles(SampleIdx::new(1), &[*b"GG"; 3]).unwrap();
        sink.finished_loading_alleles(GenotypeEncoding::Acgt0).unwrap();
        sink.done().unwrap();

        let r = MatrixReader::open(sink.sealed_path().unwrap()).unwrap();
        assert!(r.strand_is_matrix_wide());
        assert_eq!(r.strands().unwrap(), vec![Strand::Fwd; 3]);
        assert_eq!(r.genotype(SampleIdx::new(1), MarkerIdx::new(2)).unwrap(), *b"GG");
    }

    #[test]
    fn test_long_sample_id_rejected_before_streaming() {
        let dir = tempfile::tempdir().unwrap();
        let mut sink = MatrixSink::new(MatrixSinkOptions::new(
            dir.path().join("long.gtm"),
            MatrixAttributes::default(),
        ));
        sink.init().unwrap();
        let long = "s".repeat(65);
        let err = sink.load_sample_infos(&[SampleInfo::dummy(long)]).unwrap_err();
        assert!(matches!(err, LoadError::InvalidData { .. }));
    }

    #[test]
    fn test_wrong_mode_is_protocol_error() {
        let dir = tempfile::tempdir().unwrap();
        let mut sink = prepared(dir.path(), 1 << 20, StrandPolicy::FromFile);
        sink.load_alleles(AlleleMode::BySample).unwrap();
        let err = sink
            .add_marker_alleles(MarkerIdx::new(0), &[*b"AA", *b"AG"])
            .unwrap_err();
        assert!(err.is_protocol());
    }

    #[test]
    fn test_unfinished_session_stays_unsealed() {
        let dir = tempfile::tempdir().unwrap();
        let mut sink = prepared(dir.path(), 1 << 20, StrandPolicy::FromFile);
        sink.load_alleles(AlleleMode::BySample).unwrap();
        sink.add_sample_alleles(SampleIdx::new(0), &[*b"AA"; 3]).unwrap();
        assert!(sink.finished_loading_alleles(GenotypeEncoding::Acgt0).is_err());
        assert!(sink.done().is_err());
        assert!(sink.sealed_path().is_none());
        assert!(MatrixReader::open(sink.path()).is_err());
    }

    #[test]
    fn test_failed_final_flush_never_seals() {
        let dir = tempfile::tempdir().unwrap();
        let mut sink = prepared(dir.path(), 1 << 20, StrandPolicy::FromFile);
        sink.load_alleles(AlleleMode::BySample).unwrap();
        sink.add_sample_alleles(SampleIdx::new(0), &[*b"AA"; 3]).unwrap();
        sink.add_sample_alleles(SampleIdx::new(1), &[*b"GG"; 3]).unwrap();

        // A container laid out for one sample rejects the buffered two-row block
        let narrow = dir.path().join("narrow.gtm");
        let mut writer = MatrixWriter::create(&narrow).unwrap();
        let dimensions = Dimensions {
            samples: 1,
            markers: 3,
            chromosomes: 1,
            strands: 1,
            has_bases: false,
        };
        writer
            .define(ContainerHeader::layout(dimensions, Strides::default(), MatrixAttributes::default()).unwrap())
            .unwrap();
        sink.writer = Some(writer);

        assert!(sink.finished_loading_alleles(GenotypeEncoding::Acgt0).is_err());
        assert!(sink.done().unwrap_err().is_protocol());
        assert!(sink.sealed_path().is_none());
        assert!(!reader::is_sealed(&narrow).unwrap());
        assert!(!reader::is_sealed(sink.path()).unwrap());
    }
}
