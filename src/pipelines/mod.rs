//! # Pipeline Module
//!
//! High-level orchestration of a load session: adapter selection, the sink
//! lifecycle and artifact registration.

pub mod load;
pub mod registry;

pub use load::{LoadOutcome, LoadPipeline, LoadSummary};
pub use registry::{CatalogRegistry, InMemoryRegistry, MatrixArtifact, MatrixId, MatrixRegistry};
