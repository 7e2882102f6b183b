//! # Configuration Logic
//!
//! ## Role
//! CLI argument parsing and validation, plus the `LoadConfig` bundle threaded
//! into the dispatcher and the matrix writer. Nothing here is global: the
//! memory budget used to size hyperslabs travels inside `LoadConfig`.
//!
//! ## Example CLI
//! ```bash
//! genomatrix load --format plink-binary --genotypes study.bed --out matrices/
//! genomatrix load --format affymetrix --annotation GenomeWideSNP_6.na32.csv \
//!     --genotypes calls/ --strand fwd --out matrices/
//! genomatrix inspect matrices/study.gtm
//! ```

use std::path::{Path, PathBuf};

use clap::{ArgAction, Args, Parser, Subcommand};

use crate::data::genotype::GenotypeEncoding;
use crate::data::marker::Strand;
use crate::error::{LoadError, Result};
use crate::io::formats::SourceFormat;

/// Default hyperslab memory budget (64 MiB)
pub const DEFAULT_MEMORY_BUDGET: usize = 64 * 1024 * 1024;

/// Where marker strand flags come from
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum StrandPolicy {
    /// Per-marker strand from the annotation file, when it has one
    #[default]
    FromFile,
    /// One strand for the whole matrix
    MatrixWide(Strand),
}

impl StrandPolicy {
    pub fn parse(s: &str) -> std::result::Result<Self, String> {
        match s.trim().to_ascii_lowercase().as_str() {
            "file" | "from-file" => Ok(StrandPolicy::FromFile),
            other => match Strand::parse(other) {
                Strand::Unknown if !matches!(other, "unk" | "unknown") => {
                    Err(format!("unknown strand '{}' (from-file, +, -, fwd, rev, unk)", s))
                }
                strand => Ok(StrandPolicy::MatrixWide(strand)),
            },
        }
    }

    /// Label stored in the container attributes
    pub fn label(self) -> String {
        match self {
            StrandPolicy::FromFile => "per-marker".to_string(),
            StrandPolicy::MatrixWide(strand) => strand.as_str().to_string(),
        }
    }
}

fn parse_encoding(s: &str) -> std::result::Result<GenotypeEncoding, String> {
    GenotypeEncoding::from_tag(s).ok_or_else(|| format!("unknown genotype encoding '{}'", s))
}

/// Everything one load session needs
#[derive(Clone, Debug)]
pub struct LoadConfig {
    pub format: SourceFormat,
    /// Genotype input(s); one file per sample for Affymetrix, several files for Hapmap
    pub genotypes: Vec<PathBuf>,
    /// Marker annotation / map file
    pub annotation: Option<PathBuf>,
    pub sample_info: Option<PathBuf>,
    pub output_dir: PathBuf,
    pub study_id: u32,
    pub name: String,
    pub description: String,
    pub strand: StrandPolicy,
    /// Used only when inference cannot classify the alleles
    pub encoding_hint: Option<GenotypeEncoding>,
    pub memory_budget_bytes: usize,
    /// Chromosome for formats whose marker files omit it (Beagle)
    pub chromosome: Option<String>,
    /// Probe ids to drop before sorting (Affymetrix)
    pub probe_blacklist: Option<PathBuf>,
}

impl LoadConfig {
    pub fn new(format: SourceFormat, genotypes: Vec<PathBuf>, output_dir: impl Into<PathBuf>) -> Self {
        Self {
            format,
            genotypes,
            annotation: None,
            sample_info: None,
            output_dir: output_dir.into(),
            study_id: 0,
            name: String::new(),
            description: String::new(),
            strand: StrandPolicy::default(),
            encoding_hint: None,
            memory_budget_bytes: DEFAULT_MEMORY_BUDGET,
            chromosome: None,
            probe_blacklist: None,
        }
    }

    pub fn with_annotation(mut self, path: impl Into<PathBuf>) -> Self {
        self.annotation = Some(path.into());
        self
    }

    pub fn with_sample_info(mut self, path: impl Into<PathBuf>) -> Self {
        self.sample_info = Some(path.into());
        self
    }

    pub fn with_strand(mut self, strand: StrandPolicy) -> Self {
        self.strand = strand;
        self
    }

    pub fn with_memory_budget(mut self, bytes: usize) -> Self {
        self.memory_budget_bytes = bytes;
        self
    }

    /// Matrix name, falling back to the format name
    pub fn matrix_name(&self) -> String {
        if self.name.trim().is_empty() {
            format!("{}_matrix", self.format.as_str())
        } else {
            self.name.trim().to_string()
        }
    }

    /// Annotation path, or a sibling of the first genotype file with `ext`
    pub fn annotation_or_sibling(&self, ext: &str) -> Result<PathBuf> {
        if let Some(path) = &self.annotation {
            return Ok(path.clone());
        }
        self.primary_genotypes()
            .map(|p| p.with_extension(ext))
            .map_err(|_| {
                LoadError::config(format!(
                    "{} needs an annotation file (--annotation)",
                    self.format.as_str()
                ))
            })
    }

    pub fn primary_genotypes(&self) -> Result<&Path> {
        self.genotypes.first().map(PathBuf::as_path).ok_or_else(|| {
            LoadError::config(format!(
                "{} needs at least one genotype file (--genotypes)",
                self.format.as_str()
            ))
        })
    }

    /// Fail fast on configuration that cannot possibly load
    pub fn validate(&self) -> Result<()> {
        self.primary_genotypes()?;
        if self.memory_budget_bytes == 0 {
            return Err(LoadError::config("memory budget must be greater than zero"));
        }
        if self.format.requires_annotation() && self.annotation.is_none() && !self.format.has_sibling_annotation() {
            return Err(LoadError::config(format!(
                "{} needs an annotation file (--annotation)",
                self.format.as_str()
            )));
        }
        if self.format == SourceFormat::Beagle && self.chromosome.is_none() {
            return Err(LoadError::config("beagle needs --chromosome"));
        }
        if !self.format.accepts_multiple_genotype_files() && self.genotypes.len() > 1 {
            return Err(LoadError::config(format!(
                "{} takes a single genotype file, got {}",
                self.format.as_str(),
                self.genotypes.len()
            )));
        }
        // Per-sample call files may go missing; those samples are skipped at stream time
        let genotypes: &[PathBuf] = if self.format.per_sample_files() { &[] } else { &self.genotypes };
        for path in genotypes.iter().chain(self.annotation.iter()).chain(self.sample_info.iter()) {
            if !path.exists() {
                return Err(LoadError::file_not_found(path));
            }
        }
        Ok(())
    }
}

#[derive(Parser, Debug)]
#[command(
    name = "genomatrix",
    version,
    about = "Normalize vendor genotype datasets into a sorted genotype matrix file",
    long_about = r#"
Loads PLINK (PED/MAP, BED/BIM/FAM), Affymetrix, Hapmap, Beagle, HGDP1,
Illumina LGEN, Sequenom and previously written matrices into one container:
markers sorted by chromosome/position/id, samples in declaration order and a
dense 2-byte-per-genotype matrix.
"#
)]
pub struct Cli {
    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short = 'v', long = "verbose", action = ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Only log warnings and errors
    #[arg(short = 'q', long = "quiet", global = true)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Load a dataset into a new matrix container
    Load(LoadArgs),
    /// Print the dimensions, encoding and chromosomes of a container
    Inspect(InspectArgs),
}

#[derive(Args, Debug)]
pub struct LoadArgs {
    /// Source format
    #[arg(short = 'f', long = "format", value_enum)]
    pub format: SourceFormat,

    /// Genotype file(s); a directory expands to the files it contains
    #[arg(short = 'g', long = "genotypes", value_name = "PATH", num_args = 1.., required = true)]
    pub genotypes: Vec<PathBuf>,

    /// Marker annotation / map file
    #[arg(short = 'a', long = "annotation", value_name = "FILE")]
    pub annotation: Option<PathBuf>,

    /// Sample information file
    #[arg(short = 's', long = "sample-info", value_name = "FILE")]
    pub sample_info: Option<PathBuf>,

    /// Output directory for the matrix container
    #[arg(short = 'o', long = "out", value_name = "DIR", default_value = ".")]
    pub out: PathBuf,

    #[arg(long = "study", value_name = "ID", default_value_t = 0)]
    pub study_id: u32,

    /// Friendly matrix name
    #[arg(long = "name", default_value = "")]
    pub name: String,

    #[arg(long = "description", default_value = "")]
    pub description: String,

    /// Strand policy: from-file, or a matrix-wide +, -, fwd, rev, unk
    #[arg(long = "strand", value_parser = StrandPolicy::parse, default_value = "from-file")]
    pub strand: StrandPolicy,

    /// Encoding used when it cannot be inferred (AB0, ACGT0, O1234, O12)
    #[arg(long = "encoding", value_parser = parse_encoding)]
    pub encoding_hint: Option<GenotypeEncoding>,

    /// Memory budget for buffered genotype writes, in MiB
    #[arg(long = "memory-mb", value_name = "MIB", default_value_t = 64)]
    pub memory_mb: usize,

    /// Chromosome of all markers (Beagle)
    #[arg(long = "chromosome", value_name = "CHR")]
    pub chromosome: Option<String>,

    /// Probe ids to drop before sorting (Affymetrix)
    #[arg(long = "probe-blacklist", value_name = "FILE")]
    pub probe_blacklist: Option<PathBuf>,

    /// JSON-lines catalog the finished matrix is registered in
    #[arg(long = "catalog", value_name = "FILE")]
    pub catalog: Option<PathBuf>,

    /// Parse and validate without writing a container
    #[arg(long = "dry-run")]
    pub dry_run: bool,

    /// Seconds between progress lines (0 disables)
    #[arg(long = "heartbeat", value_name = "SECS", default_value_t = 10)]
    pub heartbeat_secs: u64,
}

#[derive(Args, Debug)]
pub struct InspectArgs {
    /// Matrix container to inspect
    pub matrix: PathBuf,

    /// Also print every chromosome's marker range
    #[arg(long = "chromosomes")]
    pub chromosomes: bool,
}

impl Cli {
    /// Parse command-line arguments and validate them
    pub fn parse_and_validate() -> Result<Self> {
        let cli = Self::parse();
        if let Command::Load(args) = &cli.command {
            args.to_config()?.validate()?;
        }
        Ok(cli)
    }
}

/// Expand directories into the regular files they contain, sorted by name
fn expand_inputs(paths: &[PathBuf]) -> Result<Vec<PathBuf>> {
    let mut out = Vec::new();
    for path in paths {
        if path.is_dir() {
            let mut files: Vec<PathBuf> = std::fs::read_dir(path)?
                .filter_map(|entry| entry.ok().map(|e| e.path()))
                .filter(|p| p.is_file())
                .collect();
            files.sort();
            out.extend(files);
        } else {
            out.push(path.clone());
        }
    }
    Ok(out)
}

impl LoadArgs {
    pub fn to_config(&self) -> Result<LoadConfig> {
        Ok(LoadConfig {
            format: self.format,
            genotypes: expand_inputs(&self.genotypes)?,
            annotation: self.annotation.clone(),
            sample_info: self.sample_info.clone(),
            output_dir: self.out.clone(),
            study_id: self.study_id,
            name: self.name.clone(),
            description: self.description.clone(),
            strand: self.strand,
            encoding_hint: self.encoding_hint,
            memory_budget_bytes: self.memory_mb.saturating_mul(1024 * 1024),
            chromosome: self.chromosome.clone(),
            probe_blacklist: self.probe_blacklist.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strand_policy_parse() {
        assert_eq!(StrandPolicy::parse("from-file"), Ok(StrandPolicy::FromFile));
        assert_eq!(StrandPolicy::parse("FWD"), Ok(StrandPolicy::MatrixWide(Strand::Fwd)));
        assert_eq!(StrandPolicy::parse("+"), Ok(StrandPolicy::MatrixWide(Strand::Plus)));
        assert_eq!(StrandPolicy::parse("unk"), Ok(StrandPolicy::MatrixWide(Strand::Unknown)));
        assert!(StrandPolicy::parse("sideways").is_err());
    }

    #[test]
    fn test_cli_load_args() {
        let dir = tempfile::tempdir().unwrap();
        let ped = dir.path().join("x.ped");
        std::fs::write(&ped, "").unwrap();
        std::fs::write(dir.path().join("x.map"), "").unwrap();

        let cli = Cli::try_parse_from([
            "genomatrix",
            "load",
            "--format",
            "plink",
            "--genotypes",
            ped.to_str().unwrap(),
            "--strand",
            "rev",
            "--memory-mb",
            "2",
        ])
        .unwrap();
        let Command::Load(args) = cli.command else {
            panic!("expected load");
        };
        let config = args.to_config().unwrap();
        assert_eq!(config.format, SourceFormat::PlinkFlat);
        assert_eq!(config.strand, StrandPolicy::MatrixWide(Strand::Rev));
        assert_eq!(config.memory_budget_bytes, 2 * 1024 * 1024);
        assert_eq!(config.annotation_or_sibling("map").unwrap(), dir.path().join("x.map"));
        config.validate().unwrap();
    }

    #[test]
    fn test_validate_missing_inputs() {
        let config = LoadConfig::new(SourceFormat::Hapmap, vec![PathBuf::from("/no/such/file")], "/tmp");
        assert!(matches!(config.validate(), Err(LoadError::FileNotFound { .. })));

        let config = LoadConfig::new(SourceFormat::Hapmap, vec![], "/tmp");
        assert!(matches!(config.validate(), Err(LoadError::Config { .. })));
    }

    #[test]
    fn test_missing_call_file_is_not_a_setup_error() {
        let dir = tempfile::tempdir().unwrap();
        let annotation = dir.path().join("annot.csv");
        std::fs::write(&annotation, "").unwrap();
        let config = LoadConfig::new(
            SourceFormat::Affymetrix,
            vec![dir.path().join("gone.birdseed.txt")],
            dir.path(),
        )
        .with_annotation(&annotation);
        config.validate().unwrap();
    }

    #[test]
    fn test_beagle_needs_chromosome() {
        let dir = tempfile::tempdir().unwrap();
        let bgl = dir.path().join("x.bgl");
        std::fs::write(&bgl, "").unwrap();
        let config = LoadConfig::new(SourceFormat::Beagle, vec![bgl], dir.path())
            .with_annotation(dir.path().join("x.markers"));
        assert!(matches!(config.validate(), Err(LoadError::Config { .. })));
    }

    #[test]
    fn test_directory_inputs_expand_sorted() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("b.txt"), "").unwrap();
        std::fs::write(dir.path().join("a.txt"), "").unwrap();
        let files = expand_inputs(&[dir.path().to_path_buf()]).unwrap();
        assert_eq!(files, vec![dir.path().join("a.txt"), dir.path().join("b.txt")]);
    }
}
