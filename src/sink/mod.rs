//! # Destination Protocol
//!
//! Every storage backend implements `DataSetDestination`, a fixed sequence of
//! lifecycle callbacks:
//!
//! ```text
//! init -> add_dummy_sample_info* -> load_sample_infos -> load_marker_metadata
//!      -> load_chromosome_metadata -> load_alleles(mode)
//!      -> (add_sample_alleles | add_marker_alleles)* -> finished_loading_alleles -> done
//! ```
//!
//! ## Design
//! - `LifecycleGuard` is the shared state machine; each sink owns one and
//!   consults it before touching data, so order violations surface as
//!   `LoadError::Protocol` no matter which backend is in use.
//! - `load_alleles` fixes the addressing mode. Rows must then arrive with
//!   strictly increasing indices starting at 0, one per sample (by-sample) or
//!   per marker (by-marker), each covering the whole other axis.
//! - Sinks compose by decoration: `KeyExtractingSink` owns the sink it wraps.

pub mod buffer;
pub mod keys;
pub mod matrix;
pub mod null;

pub use buffer::HyperslabBuffer;
pub use keys::{ExtractedKeys, KeyExtractingSink};
pub use matrix::{MatrixSink, MatrixSinkOptions};
pub use null::NullSink;

use crate::data::chromosome::ChromosomeSummary;
use crate::data::genotype::{AlleleMode, Genotype, GenotypeEncoding};
use crate::data::marker::{MarkerIdx, MarkerSet};
use crate::data::sample::{SampleIdx, SampleInfo};
use crate::error::{LoadError, Result};

/// Storage backend driven by the load dispatcher
pub trait DataSetDestination {
    fn init(&mut self) -> Result<()>;

    /// Declare a sample known only by id
    fn add_dummy_sample_info(&mut self, sample_id: &str) -> Result<()>;

    /// Finalize the sample axis: dummy samples first, then `infos`
    fn load_sample_infos(&mut self, infos: &[SampleInfo]) -> Result<()>;

    fn load_marker_metadata(&mut self, markers: &MarkerSet) -> Result<()>;

    fn load_chromosome_metadata(&mut self, chromosomes: &ChromosomeSummary) -> Result<()>;

    /// Fix the addressing mode for the rest of the session
    fn load_alleles(&mut self, mode: AlleleMode) -> Result<()>;

    /// One sample's genotypes for every marker, in marker order
    fn add_sample_alleles(&mut self, sample: SampleIdx, alleles: &[Genotype]) -> Result<()>;

    /// One marker's genotypes for every sample, in sample order
    fn add_marker_alleles(&mut self, marker: MarkerIdx, alleles: &[Genotype]) -> Result<()>;

    fn finished_loading_alleles(&mut self, encoding: GenotypeEncoding) -> Result<()>;

    /// Terminal call; the sink is unusable afterwards
    fn done(&mut self) -> Result<()>;
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum State {
    Created,
    Initialized,
    AddingDummies,
    SamplesLoaded,
    MarkersLoaded,
    ChromosomesLoaded,
    Streaming(AlleleMode),
    AllelesFinished,
    Done,
    /// A storage write failed; nothing further is accepted
    Failed,
}

/// Lifecycle state machine shared by all sinks
#[derive(Clone, Debug)]
pub struct LifecycleGuard {
    state: State,
    n_samples: usize,
    n_markers: usize,
    next_row: usize,
}

impl Default for LifecycleGuard {
    fn default() -> Self {
        Self::new()
    }
}

impl LifecycleGuard {
    pub fn new() -> Self {
        Self {
            state: State::Created,
            n_samples: 0,
            n_markers: 0,
            next_row: 0,
        }
    }

    fn advance(&mut self, call: &str, allowed: &[State], next: State) -> Result<()> {
        if allowed.contains(&self.state) {
            self.state = next;
            Ok(())
        } else {
            Err(LoadError::protocol(format!(
                "{} called in state {:?}",
                call, self.state
            )))
        }
    }

    pub fn init(&mut self) -> Result<()> {
        self.advance("init", &[State::Created], State::Initialized)
    }

    pub fn dummy_sample(&mut self) -> Result<()> {
        self.advance(
            "add_dummy_sample_info",
            &[State::Initialized, State::AddingDummies],
            State::AddingDummies,
        )
    }

    pub fn samples(&mut self, n_samples: usize) -> Result<()> {
        self.advance(
            "load_sample_infos",
            &[State::Initialized, State::AddingDummies],
            State::SamplesLoaded,
        )?;
        self.n_samples = n_samples;
        Ok(())
    }

    pub fn markers(&mut self, n_markers: usize) -> Result<()> {
        self.advance("load_marker_metadata", &[State::SamplesLoaded], State::MarkersLoaded)?;
        self.n_markers = n_markers;
        Ok(())
    }

    pub fn chromosomes(&mut self, total_markers: usize) -> Result<()> {
        if self.state == State::MarkersLoaded && total_markers != self.n_markers {
            return Err(LoadError::protocol(format!(
                "chromosome summary covers {} markers, marker set has {}",
                total_markers, self.n_markers
            )));
        }
        self.advance(
            "load_chromosome_metadata",
            &[State::MarkersLoaded],
            State::ChromosomesLoaded,
        )
    }

    pub fn alleles(&mut self, mode: AlleleMode) -> Result<()> {
        self.advance("load_alleles", &[State::ChromosomesLoaded], State::Streaming(mode))?;
        self.next_row = 0;
        Ok(())
    }

    /// Validate one incoming row; returns the row index
    pub fn row(&mut self, mode: AlleleMode, index: usize, len: usize) -> Result<usize> {
        match self.state {
            State::Streaming(active) if active == mode => {}
            State::Streaming(active) => {
                return Err(LoadError::protocol(format!(
                    "{} row added while the session streams {}",
                    mode, active
                )))
            }
            other => {
                return Err(LoadError::protocol(format!(
                    "{} row added in state {:?}",
                    mode, other
                )))
            }
        }
        let (total, expected_len) = self.axes(mode);
        if index != self.next_row || index >= total {
            return Err(LoadError::protocol(format!(
                "{} row {} out of sequence (expected {} of {})",
                mode, index, self.next_row, total
            )));
        }
        if len != expected_len {
            return Err(LoadError::protocol(format!(
                "{} row {} has {} genotypes, expected {}",
                mode, index, len, expected_len
            )));
        }
        self.next_row += 1;
        Ok(index)
    }

    pub fn finish(&mut self) -> Result<()> {
        let State::Streaming(mode) = self.state else {
            return self.advance("finished_loading_alleles", &[], State::AllelesFinished);
        };
        let (total, _) = self.axes(mode);
        if self.next_row != total {
            return Err(LoadError::protocol(format!(
                "finished_loading_alleles after {} of {} {} rows",
                self.next_row, total, mode
            )));
        }
        self.state = State::AllelesFinished;
        Ok(())
    }

    pub fn done(&mut self) -> Result<()> {
        self.advance("done", &[State::AllelesFinished], State::Done)
    }

    /// Move to the failed state when `result` is an error, so a session whose
    /// storage is incomplete can never reach `done`.
    pub fn fail_on_error<T>(&mut self, result: Result<T>) -> Result<T> {
        if result.is_err() {
            self.state = State::Failed;
        }
        result
    }

    pub fn is_failed(&self) -> bool {
        self.state == State::Failed
    }

    /// (rows along the streamed axis, genotypes per row)
    fn axes(&self, mode: AlleleMode) -> (usize, usize) {
        match mode {
            AlleleMode::BySample => (self.n_samples, self.n_markers),
            AlleleMode::ByMarker => (self.n_markers, self.n_samples),
        }
    }

    pub fn mode(&self) -> Option<AlleleMode> {
        match self.state {
            State::Streaming(mode) => Some(mode),
            _ => None,
        }
    }

    pub fn rows_done(&self) -> usize {
        self.next_row
    }

    pub fn is_done(&self) -> bool {
        self.state == State::Done
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn streaming(mode: AlleleMode) -> LifecycleGuard {
        let mut g = LifecycleGuard::new();
        g.init().unwrap();
        g.samples(2).unwrap();
        g.markers(3).unwrap();
        g.chromosomes(3).unwrap();
        g.alleles(mode).unwrap();
        g
    }

    #[test]
    fn test_full_sequence() {
        let mut g = LifecycleGuard::new();
        g.init().unwrap();
        g.dummy_sample().unwrap();
        g.dummy_sample().unwrap();
        g.samples(2).unwrap();
        g.markers(3).unwrap();
        g.chromosomes(3).unwrap();
        g.alleles(AlleleMode::BySample).unwrap();
        assert_eq!(g.mode(), Some(AlleleMode::BySample));
        g.row(AlleleMode::BySample, 0, 3).unwrap();
        g.row(AlleleMode::BySample, 1, 3).unwrap();
        g.finish().unwrap();
        g.done().unwrap();
        assert!(g.is_done());
    }

    #[test]
    fn test_out_of_order_calls() {
        let mut g = LifecycleGuard::new();
        assert!(g.samples(1).unwrap_err().is_protocol());
        g.init().unwrap();
        assert!(g.init().unwrap_err().is_protocol());
        assert!(g.markers(1).unwrap_err().is_protocol());
        g.samples(1).unwrap();
        assert!(g.dummy_sample().unwrap_err().is_protocol());
    }

    #[test]
    fn test_wrong_mode_rejected() {
        let mut g = streaming(AlleleMode::ByMarker);
        let err = g.row(AlleleMode::BySample, 0, 3).unwrap_err();
        assert!(err.is_protocol());
        assert!(err.to_string().contains("by-marker"));
    }

    #[test]
    fn test_rows_must_be_sequential_and_complete() {
        let mut g = streaming(AlleleMode::ByMarker);
        assert!(g.row(AlleleMode::ByMarker, 1, 2).is_err());
        g.row(AlleleMode::ByMarker, 0, 2).unwrap();
        assert!(g.row(AlleleMode::ByMarker, 1, 3).is_err());
        g.row(AlleleMode::ByMarker, 1, 2).unwrap();
        assert!(g.finish().unwrap_err().is_protocol());
        g.row(AlleleMode::ByMarker, 2, 2).unwrap();
        assert!(g.row(AlleleMode::ByMarker, 3, 2).is_err());
        g.finish().unwrap();
    }

    #[test]
    fn test_unusable_after_done() {
        let mut g = streaming(AlleleMode::BySample);
        g.row(AlleleMode::BySample, 0, 3).unwrap();
        g.row(AlleleMode::BySample, 1, 3).unwrap();
        g.finish().unwrap();
        g.done().unwrap();
        assert!(g.done().is_err());
        assert!(g.row(AlleleMode::BySample, 0, 3).is_err());
        assert!(g.init().is_err());
    }

    #[test]
    fn test_failed_write_blocks_done() {
        let mut g = streaming(AlleleMode::BySample);
        g.row(AlleleMode::BySample, 0, 3).unwrap();
        g.row(AlleleMode::BySample, 1, 3).unwrap();
        g.finish().unwrap();
        let failed: Result<()> = Err(LoadError::invalid_data("short write"));
        assert!(g.fail_on_error(failed).is_err());
        assert!(g.is_failed());
        assert!(g.done().unwrap_err().is_protocol());

        let mut g = streaming(AlleleMode::BySample);
        assert_eq!(g.fail_on_error(Ok(7)).unwrap(), 7);
        g.row(AlleleMode::BySample, 0, 3).unwrap();
        assert!(g.fail_on_error::<()>(Err(LoadError::invalid_data("x"))).is_err());
        assert!(g.row(AlleleMode::BySample, 1, 3).is_err());
        assert!(g.finish().is_err());
    }

    #[test]
    fn test_chromosome_total_must_match() {
        let mut g = LifecycleGuard::new();
        g.init().unwrap();
        g.samples(1).unwrap();
        g.markers(3).unwrap();
        assert!(g.chromosomes(2).unwrap_err().is_protocol());
    }
}
