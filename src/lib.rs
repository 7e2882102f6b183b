//! # Genomatrix Library
//!
//! Normalizes vendor genotype datasets into one sorted, randomly readable
//! genotype matrix file.
//!
//! ## Modules
//! - `config`: load configuration and CLI parsing
//! - `data`: markers, samples, chromosome summaries, genotype cells
//! - `error`: error types and result aliases
//! - `io`: matrix container and source format adapters
//! - `pipelines`: the load dispatcher and artifact registry
//! - `sink`: destination protocol and its backends
//! - `utils`: progress reporting and text input helpers

pub mod config;
pub mod data;
pub mod error;
pub mod io;
pub mod pipelines;
pub mod sink;
pub mod utils;

// Re-export commonly used types
pub use config::{LoadConfig, StrandPolicy};
pub use data::{
    AlleleMode, ChromosomeSummary, Genotype, GenotypeEncoding, MarkerIdx, MarkerRecord, MarkerSet,
    SampleIdx, SampleInfo, Samples, MISSING,
};
pub use error::{LoadError, LoadStage, Result};
pub use io::container::MatrixReader;
pub use io::formats::{SkippedSample, SourceFormat};
pub use pipelines::{CatalogRegistry, InMemoryRegistry, LoadOutcome, LoadPipeline, MatrixId, MatrixRegistry};
pub use sink::DataSetDestination;
