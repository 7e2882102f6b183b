//! # Data Module
//!
//! In-memory representations shared by every format: markers and their
//! canonical order, samples, chromosome summaries and genotype cells.
//!
//! - **Zero-cost newtypes:** `MarkerIdx` and `SampleIdx` keep the two matrix
//!   axes apart at compile time.
//! - **Sorted once:** `MarkerSet` is the only way adapters hand markers on, so
//!   every downstream consumer sees canonical order.

pub mod chromosome;
pub mod genotype;
pub mod marker;
pub mod sample;

pub use chromosome::{ChromosomeInfo, ChromosomeSummary};
pub use genotype::{AlleleMode, EncodingDetector, Genotype, GenotypeEncoding, MISSING};
pub use marker::{MarkerIdx, MarkerKey, MarkerRecord, MarkerSet, Strand};
pub use sample::{Affection, SampleIdx, SampleInfo, Samples, Sex};
