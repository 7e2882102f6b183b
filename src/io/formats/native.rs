//! # Native Adapter
//!
//! Re-loads a sealed matrix container, for instance to rebuild it with a
//! different strand policy or after a format upgrade. The reader rejects
//! unsealed containers and unsupported major versions.

use std::path::PathBuf;

use tracing::{debug, info_span};

use super::{stream_by_sample, DiscoveredSamples, GenotypeAdapter, MetadataAdapter, SampleRowReader, StreamContext};
use crate::config::LoadConfig;
use crate::data::genotype::{AlleleMode, Genotype, MISSING};
use crate::data::marker::{MarkerIdx, MarkerSet};
use crate::data::sample::SampleIdx;
use crate::error::{LoadError, Result};
use crate::io::container::MatrixReader;

pub struct NativeLoader {
    path: PathBuf,
    reader: Option<MatrixReader>,
    /// Target index of each stored marker column
    remap: Vec<Option<MarkerIdx>>,
}

impl NativeLoader {
    pub fn new(config: &LoadConfig) -> Result<Self> {
        Ok(Self {
            path: config.primary_genotypes()?.to_path_buf(),
            reader: None,
            remap: Vec::new(),
        })
    }

    fn reader(&mut self) -> Result<&MatrixReader> {
        if self.reader.is_none() {
            let reader = MatrixReader::open(&self.path)?;
            debug!(
                samples = reader.n_samples(),
                markers = reader.n_markers(),
                source = %reader.attributes().source_format,
                "opened container"
            );
            self.reader = Some(reader);
        }
        self.reader
            .as_ref()
            .ok_or_else(|| LoadError::protocol("container reader missing after open"))
    }
}

impl MetadataAdapter for NativeLoader {
    fn read_markers(&mut self) -> Result<MarkerSet> {
        let _span = info_span!("read_container_markers", path = %self.path.display()).entered();
        let reader = self.reader()?;
        let stored = reader.marker_ids()?;
        let markers = reader.markers()?;
        self.remap = stored.iter().map(|id| markers.index_of(id)).collect();
        Ok(markers)
    }
}

impl SampleRowReader for NativeLoader {
    fn read_sample(&mut self, sample: SampleIdx, _sample_id: &str, markers: &MarkerSet) -> Result<Vec<Genotype>> {
        if self.remap.is_empty() && !markers.is_empty() {
            let stored = self.reader()?.marker_ids()?;
            self.remap = stored.iter().map(|id| markers.index_of(id)).collect();
        }
        let Some(reader) = &self.reader else {
            return Err(LoadError::protocol("container read before its markers"));
        };
        let bytes = reader.sample_row(sample)?;
        let mut row = vec![MISSING; markers.len()];
        for (stored, target) in self.remap.iter().enumerate() {
            if let Some(target) = target {
                row[target.as_usize()] = [bytes[stored * 2], bytes[stored * 2 + 1]];
            }
        }
        Ok(row)
    }
}

impl GenotypeAdapter for NativeLoader {
    fn mode(&self) -> AlleleMode {
        AlleleMode::BySample
    }

    fn discover_samples(&mut self) -> Result<DiscoveredSamples> {
        Ok(DiscoveredSamples::from_ids(self.reader()?.sample_ids()?))
    }

    fn stream(&mut self, ctx: &mut StreamContext<'_>) -> Result<()> {
        let _span = info_span!("stream_container", path = %self.path.display()).entered();
        stream_by_sample(self, ctx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::container::MatrixAttributes;
    use crate::sink::{DataSetDestination, MatrixSink, MatrixSinkOptions};
    use crate::data::chromosome::ChromosomeSummary;
    use crate::data::genotype::GenotypeEncoding;
    use crate::data::marker::MarkerRecord;
    use crate::data::sample::Samples;

    fn write_matrix(path: &std::path::Path) {
        let markers = MarkerSet::from_records(vec![
            MarkerRecord::new("m1", None, "1", 10).with_alleles("A", "G"),
            MarkerRecord::new("m2", None, "2", 5).with_alleles("C", "T"),
        ]);
        let samples = Samples::from_ids(["s1", "s2"]);
        let mut sink = MatrixSink::new(MatrixSinkOptions::new(path, MatrixAttributes::default()));
        sink.init().unwrap();
        sink.load_sample_infos(samples.infos()).unwrap();
        sink.load_marker_metadata(&markers).unwrap();
        sink.load_chromosome_metadata(&ChromosomeSummary::from_markers(&markers)).unwrap();
        sink.load_alleles(AlleleMode::BySample).unwrap();
        sink.add_sample_alleles(SampleIdx::new(0), &[*b"AG", *b"CC"]).unwrap();
        sink.add_sample_alleles(SampleIdx::new(1), &[MISSING, *b"TT"]).unwrap();
        sink.finished_loading_alleles(GenotypeEncoding::Acgt0).unwrap();
        sink.done().unwrap();
    }

    #[test]
    fn test_reload_container() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("m.gtm");
        write_matrix(&path);

        let mut l = NativeLoader {
            path,
            reader: None,
            remap: Vec::new(),
        };
        let markers = l.read_markers().unwrap();
        assert_eq!(markers.len(), 2);
        assert_eq!(markers[MarkerIdx::new(1)].alleles, Some(*b"CT"));
        assert_eq!(l.discover_samples().unwrap().ids().collect::<Vec<_>>(), vec!["s1", "s2"]);
        assert_eq!(l.read_sample(SampleIdx::new(1), "s2", &markers).unwrap(), vec![MISSING, *b"TT"]);
    }

    #[test]
    fn test_missing_container() {
        let mut l = NativeLoader {
            path: PathBuf::from("/no/such/matrix.gtm"),
            reader: None,
            remap: Vec::new(),
        };
        assert!(matches!(l.read_markers(), Err(LoadError::FileNotFound { .. })));
    }
}
