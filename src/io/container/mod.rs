//! # Matrix Container Format
//!
//! One self-describing binary file per genotype matrix.
//!
//! Format:
//! - [Magic 8 bytes] "GTMATRX1"
//! - [Version] major u16, minor u16
//! - [Sealed flag u8] + 3 bytes padding; set to 1 only after a complete load
//! - [Header length u64]
//! - [Header JSON] dimensions, string strides, variable table, attributes
//! - [Variables] fixed-layout, 8-byte aligned, at the offsets named in the header
//!
//! Variables:
//! - `SAMPLESET`, `MARKERSET`, `MARKERS_RSID`, `MARKERS_CHR`: fixed-width NUL-padded strings
//! - `MARKERS_POS`: little-endian i32
//! - `MARKERS_BASES_DICT`: optional 2-byte allele pairs
//! - `GT_STRAND`: one strand label per marker, or a single broadcast label
//! - `CHR_IN_MATRIX` + `CHR_INFO`: chromosome labels and `[count, min, max, first]` i32 rows
//! - `GENOTYPES`: sample-major `samples x markers x 2` bytes
//! - `GTENCODING`: single 8-byte tag written after all genotypes

pub mod reader;
pub mod writer;

pub use reader::{is_sealed, MatrixReader};
pub use writer::MatrixWriter;

use serde::{Deserialize, Serialize};

use crate::error::{LoadError, Result};

pub const MAGIC: &[u8; 8] = b"GTMATRX1";
pub const FORMAT_MAJOR: u16 = 1;
pub const FORMAT_MINOR: u16 = 0;

/// Byte length of the fixed preamble (magic, version, sealed flag, header length)
pub const PREAMBLE_LEN: u64 = 24;
pub(crate) const SEALED_FLAG_OFFSET: u64 = 12;

pub const VAR_SAMPLESET: &str = "SAMPLESET";
pub const VAR_MARKERSET: &str = "MARKERSET";
pub const VAR_MARKERS_RSID: &str = "MARKERS_RSID";
pub const VAR_MARKERS_CHR: &str = "MARKERS_CHR";
pub const VAR_MARKERS_POS: &str = "MARKERS_POS";
pub const VAR_MARKERS_BASES_DICT: &str = "MARKERS_BASES_DICT";
pub const VAR_GT_STRAND: &str = "GT_STRAND";
pub const VAR_CHR_IN_MATRIX: &str = "CHR_IN_MATRIX";
pub const VAR_CHR_INFO: &str = "CHR_INFO";
pub const VAR_GENOTYPES: &str = "GENOTYPES";
pub const VAR_GTENCODING: &str = "GTENCODING";

/// i32 columns per `CHR_INFO` row
pub const CHR_INFO_FIELDS: u64 = 4;

/// Fixed string widths per field category
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Strides {
    pub sample_name: u32,
    pub marker_name: u32,
    pub chromosome: u32,
    pub strand: u32,
    pub genotype: u32,
    pub encoding: u32,
}

impl Default for Strides {
    fn default() -> Self {
        Self {
            sample_name: 64,
            marker_name: 64,
            chromosome: 8,
            strand: 3,
            genotype: 2,
            encoding: 8,
        }
    }
}

/// Axis lengths of a matrix
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dimensions {
    pub samples: u64,
    pub markers: u64,
    pub chromosomes: u64,
    /// 1 for a matrix-wide strand, `markers` for per-marker strands
    pub strands: u64,
    pub has_bases: bool,
}

/// Element type of a variable
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum VarKind {
    /// Fixed-width byte strings of the given stride
    Chars { stride: u32 },
    /// Little-endian i32
    Int32,
}

impl VarKind {
    pub fn element_size(self) -> u64 {
        match self {
            VarKind::Chars { stride } => stride as u64,
            VarKind::Int32 => 4,
        }
    }
}

/// One entry of the variable table
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Variable {
    pub name: String,
    pub kind: VarKind,
    /// Logical shape, last axis innermost (excluding the string stride)
    pub shape: Vec<u64>,
    /// Absolute byte offset in the file
    pub offset: u64,
}

impl Variable {
    pub fn n_elements(&self) -> u64 {
        self.shape.iter().product()
    }

    pub fn byte_len(&self) -> u64 {
        self.n_elements() * self.kind.element_size()
    }
}

/// Descriptive attributes of a matrix
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatrixAttributes {
    pub name: String,
    pub description: String,
    pub source_format: String,
    pub study_id: u32,
    /// `per-marker` or the matrix-wide strand label
    pub strand_policy: String,
    pub created_unix: u64,
}

/// The JSON header
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerHeader {
    pub dimensions: Dimensions,
    pub strides: Strides,
    pub variables: Vec<Variable>,
    pub attributes: MatrixAttributes,
}

fn align8(x: u64) -> u64 {
    (x + 7) & !7
}

impl ContainerHeader {
    /// Lay out every variable after a header of `header_len_hint` bytes.
    ///
    /// Offsets depend on the header length, so the header is serialized once
    /// with provisional offsets and laid out again until the length is stable.
    pub fn layout(dimensions: Dimensions, strides: Strides, attributes: MatrixAttributes) -> Result<Self> {
        let mut header = Self {
            dimensions,
            strides,
            variables: Vec::new(),
            attributes,
        };
        let mut header_len = 0u64;
        for _ in 0..8 {
            header.assign_offsets(PREAMBLE_LEN + header_len);
            let len = serde_json::to_vec(&header)?.len() as u64;
            if len == header_len {
                return Ok(header);
            }
            header_len = len;
        }
        Err(LoadError::format("container header layout did not converge"))
    }

    fn assign_offsets(&mut self, header_end: u64) {
        let d = self.dimensions;
        let s = self.strides;
        let mut specs: Vec<(&str, VarKind, Vec<u64>)> = vec![
            (VAR_SAMPLESET, VarKind::Chars { stride: s.sample_name }, vec![d.samples]),
            (VAR_MARKERSET, VarKind::Chars { stride: s.marker_name }, vec![d.markers]),
            (VAR_MARKERS_RSID, VarKind::Chars { stride: s.marker_name }, vec![d.markers]),
            (VAR_MARKERS_CHR, VarKind::Chars { stride: s.chromosome }, vec![d.markers]),
            (VAR_MARKERS_POS, VarKind::Int32, vec![d.markers]),
        ];
        if d.has_bases {
            specs.push((VAR_MARKERS_BASES_DICT, VarKind::Chars { stride: 2 }, vec![d.markers]));
        }
        specs.extend([
            (VAR_GT_STRAND, VarKind::Chars { stride: s.strand }, vec![d.strands]),
            (VAR_CHR_IN_MATRIX, VarKind::Chars { stride: s.chromosome }, vec![d.chromosomes]),
            (VAR_CHR_INFO, VarKind::Int32, vec![d.chromosomes, CHR_INFO_FIELDS]),
            (VAR_GTENCODING, VarKind::Chars { stride: s.encoding }, vec![1]),
            (VAR_GENOTYPES, VarKind::Chars { stride: s.genotype }, vec![d.samples, d.markers]),
        ]);

        let mut offset = align8(header_end);
        self.variables = specs
            .into_iter()
            .map(|(name, kind, shape)| {
                let var = Variable {
                    name: name.to_string(),
                    kind,
                    shape,
                    offset,
                };
                offset = align8(offset + var.byte_len());
                var
            })
            .collect();
    }

    pub fn variable(&self, name: &str) -> Option<&Variable> {
        self.variables.iter().find(|v| v.name == name)
    }

    pub fn require(&self, name: &str) -> Result<&Variable> {
        self.variable(name)
            .ok_or_else(|| LoadError::format(format!("container has no {} variable", name)))
    }

    /// Total file size implied by the layout
    pub fn file_len(&self) -> u64 {
        self.variables
            .iter()
            .map(|v| v.offset + v.byte_len())
            .max()
            .unwrap_or(PREAMBLE_LEN)
    }
}

/// Check a stored version against the runtime's
pub fn check_version(major: u16, minor: u16) -> Result<()> {
    if major != FORMAT_MAJOR || minor > FORMAT_MINOR {
        return Err(LoadError::format(format!(
            "container version {}.{} is not compatible with runtime version {}.{}",
            major, minor, FORMAT_MAJOR, FORMAT_MINOR
        )));
    }
    Ok(())
}

/// Encode strings into a fixed-stride, NUL-padded buffer
pub fn encode_fixed<'a, I>(values: I, stride: u32, what: &str) -> Result<Vec<u8>>
where
    I: IntoIterator<Item = &'a str>,
{
    let stride = stride as usize;
    let mut out = Vec::new();
    for value in values {
        let bytes = value.as_bytes();
        if bytes.len() > stride {
            return Err(LoadError::invalid_data(format!(
                "{} '{}' exceeds the {}-byte field width",
                what, value, stride
            )));
        }
        out.extend_from_slice(bytes);
        out.resize(out.len() + (stride - bytes.len()), 0);
    }
    Ok(out)
}

/// Decode one fixed-stride field, dropping NUL padding
pub fn decode_fixed(field: &[u8]) -> String {
    let end = field.iter().position(|&b| b == 0).unwrap_or(field.len());
    String::from_utf8_lossy(&field[..end]).into_owned()
}
