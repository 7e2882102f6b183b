//! # Artifact Registry
//!
//! A finished load hands its sealed container to a `MatrixRegistry`, which
//! assigns the matrix id. Unsealed or failed loads are never registered.
//!
//! - `InMemoryRegistry` keeps artifacts in a `Vec` (tests, dry runs).
//! - `CatalogRegistry` appends one JSON object per line to a catalog file;
//!   ids continue from the highest id already in the file.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::data::genotype::GenotypeEncoding;
use crate::error::{LoadError, Result};
use crate::io::container::is_sealed;
use crate::io::formats::SkippedSample;
use crate::utils::text::for_each_line;

/// Identifier assigned by a registry
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct MatrixId(pub u64);

impl std::fmt::Display for MatrixId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A sealed matrix container and what went into it
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatrixArtifact {
    pub path: PathBuf,
    pub name: String,
    pub description: String,
    pub study_id: u32,
    pub source_format: String,
    pub n_samples: usize,
    pub n_markers: usize,
    pub encoding: GenotypeEncoding,
    pub skipped: Vec<SkippedSample>,
}

pub trait MatrixRegistry {
    fn register(&mut self, artifact: &MatrixArtifact) -> Result<MatrixId>;
}

fn require_sealed(artifact: &MatrixArtifact) -> Result<()> {
    if is_sealed(&artifact.path)? {
        Ok(())
    } else {
        Err(LoadError::invalid_data(format!(
            "{} is not sealed and cannot be registered",
            artifact.path.display()
        )))
    }
}

#[derive(Debug, Default)]
pub struct InMemoryRegistry {
    entries: Vec<(MatrixId, MatrixArtifact)>,
}

impl InMemoryRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> &[(MatrixId, MatrixArtifact)] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl MatrixRegistry for InMemoryRegistry {
    fn register(&mut self, artifact: &MatrixArtifact) -> Result<MatrixId> {
        require_sealed(artifact)?;
        let id = MatrixId(self.entries.len() as u64 + 1);
        self.entries.push((id, artifact.clone()));
        Ok(id)
    }
}

#[derive(Serialize, Deserialize)]
struct CatalogEntry {
    id: MatrixId,
    #[serde(flatten)]
    artifact: MatrixArtifact,
}

/// JSON-lines catalog on disk
#[derive(Debug, Clone)]
pub struct CatalogRegistry {
    path: PathBuf,
}

impl CatalogRegistry {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Every registered artifact, in registration order
    pub fn entries(&self) -> Result<Vec<(MatrixId, MatrixArtifact)>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let mut entries = Vec::new();
        for_each_line(&self.path, |line_num, line| {
            let entry: CatalogEntry = serde_json::from_str(line).map_err(|e| {
                LoadError::parse(self.path.display().to_string(), line_num, e.to_string())
            })?;
            entries.push((entry.id, entry.artifact));
            Ok(())
        })?;
        Ok(entries)
    }
}

impl MatrixRegistry for CatalogRegistry {
    fn register(&mut self, artifact: &MatrixArtifact) -> Result<MatrixId> {
        require_sealed(artifact)?;
        let next = self
            .entries()?
            .iter()
            .map(|(id, _)| id.0)
            .max()
            .unwrap_or(0)
            + 1;
        let entry = CatalogEntry {
            id: MatrixId(next),
            artifact: artifact.clone(),
        };
        let mut line = serde_json::to_string(&entry)?;
        line.push('\n');

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let mut file = OpenOptions::new().create(true).append(true).open(&self.path)?;
        file.write_all(line.as_bytes())?;
        file.sync_all()?;
        debug!(id = next, catalog = %self.path.display(), "matrix registered");
        Ok(entry.id)
    }
}
