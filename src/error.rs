//! # Load Errors
//!
//! One `thiserror` enum for every failure a load session can report.
//!
//! Errors fall into the classes a load session distinguishes:
//! - setup failures (`Io`, `FileNotFound`, `Format`) abort before genotypes are written
//! - data problems (`Parse`, `InvalidData`) in shared files are fatal; per-sample ones are
//!   absorbed by the adapters and never surface here
//! - `Protocol` is a caller bug against the sink lifecycle
//! - `Cancelled` is an interruption request
//! - `Stage` wraps any of the above with the load stage that produced it

use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Main error type for genomatrix operations
#[derive(Error, Debug)]
pub enum LoadError {
    /// I/O errors (permission denied, read/write failures)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A required input file does not exist
    #[error("File not found: {path}")]
    FileNotFound { path: PathBuf },

    /// Line-level parse errors in a shared input file
    #[error("Parse error in {path}:{line}: {message}")]
    Parse {
        path: String,
        line: usize,
        message: String,
    },

    /// Structurally invalid input (wrong magic, unsupported mode, bad version)
    #[error("Format error: {message}")]
    Format { message: String },

    /// Data that is well-formed but unusable (too long ids, mismatched counts)
    #[error("Invalid data: {message}")]
    InvalidData { message: String },

    /// Configuration errors (missing inputs, invalid options)
    #[error("Configuration error: {message}")]
    Config { message: String },

    /// Sink lifecycle or addressing-mode violation
    #[error("Protocol violation: {message}")]
    Protocol { message: String },

    /// The load was interrupted between samples
    #[error("Load cancelled")]
    Cancelled,

    /// Failure attributed to a dispatcher stage
    #[error("{stage} failed: {source}")]
    Stage {
        stage: LoadStage,
        #[source]
        source: Box<LoadError>,
    },
}

/// Type alias for Results using LoadError
pub type Result<T> = std::result::Result<T, LoadError>;

/// Dispatcher stage, reported when a load fails
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadStage {
    MetadataParse,
    SampleInfo,
    ContainerCreate,
    GenotypeStream,
    Finalize,
    Register,
}

impl LoadStage {
    pub fn as_str(self) -> &'static str {
        match self {
            LoadStage::MetadataParse => "metadata parse",
            LoadStage::SampleInfo => "sample info",
            LoadStage::ContainerCreate => "container create",
            LoadStage::GenotypeStream => "genotype stream",
            LoadStage::Finalize => "finalize",
            LoadStage::Register => "register",
        }
    }
}

impl fmt::Display for LoadStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl LoadError {
    /// Create a parse error at a given line of a file
    pub fn parse(path: impl Into<String>, line: usize, message: impl Into<String>) -> Self {
        Self::Parse {
            path: path.into(),
            line,
            message: message.into(),
        }
    }

    /// Create a format error
    pub fn format(message: impl Into<String>) -> Self {
        Self::Format {
            message: message.into(),
        }
    }

    /// Create an invalid data error
    pub fn invalid_data(message: impl Into<String>) -> Self {
        Self::InvalidData {
            message: message.into(),
        }
    }

    /// Create a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Create a protocol violation error
    pub fn protocol(message: impl Into<String>) -> Self {
        Self::Protocol {
            message: message.into(),
        }
    }

    /// Create a file-not-found error
    pub fn file_not_found(path: impl Into<PathBuf>) -> Self {
        Self::FileNotFound { path: path.into() }
    }

    /// Attach the dispatcher stage to an error (idempotent)
    pub fn at_stage(self, stage: LoadStage) -> Self {
        match self {
            err @ LoadError::Stage { .. } => err,
            other => LoadError::Stage {
                stage,
                source: Box::new(other),
            },
        }
    }

    /// Stage that produced this error, if known
    pub fn stage(&self) -> Option<LoadStage> {
        match self {
            LoadError::Stage { stage, .. } => Some(*stage),
            _ => None,
        }
    }

    /// Innermost error, with any stage wrapper removed
    pub fn root(&self) -> &LoadError {
        match self {
            LoadError::Stage { source, .. } => source.root(),
            other => other,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self.root(), LoadError::Cancelled)
    }

    pub fn is_protocol(&self) -> bool {
        matches!(self.root(), LoadError::Protocol { .. })
    }
}

impl From<csv::Error> for LoadError {
    fn from(err: csv::Error) -> Self {
        let line = err.position().map(|p| p.line() as usize).unwrap_or(0);
        Self::Parse {
            path: String::from("<csv>"),
            line,
            message: err.to_string(),
        }
    }
}

impl From<serde_json::Error> for LoadError {
    fn from(err: serde_json::Error) -> Self {
        Self::Format {
            message: format!("container header: {}", err),
        }
    }
}

/// Extension for attaching a stage to results in the dispatcher
pub trait StageExt<T> {
    fn stage(self, stage: LoadStage) -> Result<T>;
}

impl<T> StageExt<T> for Result<T> {
    fn stage(self, stage: LoadStage) -> Result<T> {
        self.map_err(|e| e.at_stage(stage))
    }
}
