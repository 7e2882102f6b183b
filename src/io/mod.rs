//! # I/O Module
//!
//! - `container`: the binary matrix container (writer, memory-mapped reader)
//! - `formats`: source format adapters

pub mod container;
pub mod formats;
