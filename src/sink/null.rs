//! Sink that validates the protocol and discards all data (dry runs).

use super::{DataSetDestination, LifecycleGuard};
use crate::data::chromosome::ChromosomeSummary;
use crate::data::genotype::{AlleleMode, Genotype, GenotypeEncoding};
use crate::data::marker::{MarkerIdx, MarkerSet};
use crate::data::sample::{SampleIdx, SampleInfo};
use crate::error::Result;

#[derive(Debug, Default)]
pub struct NullSink {
    guard: LifecycleGuard,
    dummies: usize,
    rows: usize,
    encoding: Option<GenotypeEncoding>,
}

impl NullSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Genotype rows accepted so far
    pub fn rows_seen(&self) -> usize {
        self.rows
    }

    /// Encoding reported at `finished_loading_alleles`
    pub fn encoding(&self) -> Option<GenotypeEncoding> {
        self.encoding
    }
}

impl DataSetDestination for NullSink {
    fn init(&mut self) -> Result<()> {
        self.guard.init()
    }

    fn add_dummy_sample_info(&mut self, _sample_id: &str) -> Result<()> {
        self.guard.dummy_sample()?;
        self.dummies += 1;
        Ok(())
    }

    fn load_sample_infos(&mut self, infos: &[SampleInfo]) -> Result<()> {
        self.guard.samples(self.dummies + infos.len())
    }

    fn load_marker_metadata(&mut self, markers: &MarkerSet) -> Result<()> {
        self.guard.markers(markers.len())
    }

    fn load_chromosome_metadata(&mut self, chromosomes: &ChromosomeSummary) -> Result<()> {
        self.guard.chromosomes(chromosomes.total_markers())
    }

    fn load_alleles(&mut self, mode: AlleleMode) -> Result<()> {
        self.guard.alleles(mode)
    }

    fn add_sample_alleles(&mut self, sample: SampleIdx, alleles: &[Genotype]) -> Result<()> {
        self.guard
            .row(AlleleMode::BySample, sample.as_usize(), alleles.len())?;
        self.rows += 1;
        Ok(())
    }

    fn add_marker_alleles(&mut self, marker: MarkerIdx, alleles: &[Genotype]) -> Result<()> {
        self.guard
            .row(AlleleMode::ByMarker, marker.as_usize(), alleles.len())?;
        self.rows += 1;
        Ok(())
    }

    fn finished_loading_alleles(&mut self, encoding: GenotypeEncoding) -> Result<()> {
        self.guard.finish()?;
        self.encoding = Some(encoding);
        Ok(())
    }

    fn done(&mut self) -> Result<()> {
        self.guard.done()
    }
}
