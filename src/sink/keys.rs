//! Decorator that records sample and marker keys while forwarding every call.

use super::DataSetDestination;
use crate::data::chromosome::ChromosomeSummary;
use crate::data::genotype::{AlleleMode, Genotype, GenotypeEncoding};
use crate::data::marker::{MarkerIdx, MarkerKey, MarkerSet};
use crate::data::sample::{SampleIdx, SampleInfo};
use crate::error::Result;

/// Keys collected by a `KeyExtractingSink`
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ExtractedKeys {
    /// Sample ids in declaration order
    pub samples: Vec<String>,
    /// Marker keys in canonical order
    pub markers: Vec<MarkerKey>,
}

/// Wraps a sink, keeping an in-memory index of the keys that pass through it
#[derive(Debug)]
pub struct KeyExtractingSink<S> {
    inner: S,
    keys: ExtractedKeys,
}

impl<S: DataSetDestination> KeyExtractingSink<S> {
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            keys: ExtractedKeys::default(),
        }
    }

    pub fn keys(&self) -> &ExtractedKeys {
        &self.keys
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }

    pub fn into_parts(self) -> (S, ExtractedKeys) {
        (self.inner, self.keys)
    }
}

impl<S: DataSetDestination> DataSetDestination for KeyExtractingSink<S> {
    fn init(&mut self) -> Result<()> {
        self.inner.init()
    }

    fn add_dummy_sample_info(&mut self, sample_id: &str) -> Result<()> {
        self.inner.add_dummy_sample_info(sample_id)?;
        self.keys.samples.push(sample_id.to_string());
        Ok(())
    }

    fn load_sample_infos(&mut self, infos: &[SampleInfo]) -> Result<()> {
        self.inner.load_sample_infos(infos)?;
        self.keys
            .samples
            .extend(infos.iter().map(|i| i.sample_id.clone()));
        Ok(())
    }

    fn load_marker_metadata(&mut self, markers: &MarkerSet) -> Result<()> {
        self.inner.load_marker_metadata(markers)?;
        self.keys.markers = markers.iter().map(|m| m.key()).collect();
        Ok(())
    }

    fn load_chromosome_metadata(&mut self, chromosomes: &ChromosomeSummary) -> Result<()> {
        self.inner.load_chromosome_metadata(chromosomes)
    }

    fn load_alleles(&mut self, mode: AlleleMode) -> Result<()> {
        self.inner.load_alleles(mode)
    }

    fn add_sample_alleles(&mut self, sample: SampleIdx, alleles: &[Genotype]) -> Result<()> {
        self.inner.add_sample_alleles(sample, alleles)
    }

    fn add_marker_alleles(&mut self, marker: MarkerIdx, alleles: &[Genotype]) -> Result<()> {
        self.inner.add_marker_alleles(marker, alleles)
    }

    fn finished_loading_alleles(&mut self, encoding: GenotypeEncoding) -> Result<()> {
        self.inner.finished_loading_alleles(encoding)
    }

    fn done(&mut self) -> Result<()> {
        self.inner.done()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::marker::MarkerRecord;
    use crate::sink::NullSink;

    #[test]
    fn test_keys_collected_and_calls_forwarded() {
        let markers = MarkerSet::from_records(vec![
            MarkerRecord::new("m2", None, "2", 10),
            MarkerRecord::new("m1", None, "1", 10),
        ]);
        let chromosomes = ChromosomeSummary::from_markers(&markers);

        let mut sink = KeyExtractingSink::new(NullSink::new());
        sink.init().unwrap();
        sink.add_dummy_sample_info("s1").unwrap();
        sink.load_sample_infos(&[SampleInfo::dummy("s2")]).unwrap();
        sink.load_marker_metadata(&markers).unwrap();
        sink.load_chromosome_metadata(&chromosomes).unwrap();
        sink.load_alleles(AlleleMode::ByMarker).unwrap();
        sink.add_marker_alleles(MarkerIdx::new(0), &[*b"AA", *b"AG"]).unwrap();
        // Inner guard rejects the wrong mode through the decorator
        assert!(sink
            .add_sample_alleles(SampleIdx::new(0), &[*b"AA", *b"AG"])
            .unwrap_err()
            .is_protocol());
        sink.add_marker_alleles(MarkerIdx::new(1), &[*b"GG", *b"AG"]).unwrap();
        sink.finished_loading_alleles(GenotypeEncoding::Acgt0).unwrap();
        sink.done().unwrap();

        let (inner, keys) = sink.into_parts();
        assert_eq!(inner.rows_seen(), 2);
        assert_eq!(inner.encoding(), Some(GenotypeEncoding::Acgt0));
        assert_eq!(keys.samples, vec!["s1", "s2"]);
        assert_eq!(keys.markers[0].marker_id, "m1");
        assert_eq!(keys.markers[1].marker_id, "m2");
    }
}
