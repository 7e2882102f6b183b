//! Memory-mapped reader for sealed matrix containers.

use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};

use memmap2::Mmap;

use super::{
    check_version, decode_fixed, ContainerHeader, MatrixAttributes, VarKind, Variable, CHR_INFO_FIELDS,
    MAGIC, PREAMBLE_LEN, SEALED_FLAG_OFFSET, VAR_CHR_INFO, VAR_CHR_IN_MATRIX, VAR_GENOTYPES,
    VAR_GTENCODING, VAR_GT_STRAND, VAR_MARKERSET, VAR_MARKERS_BASES_DICT, VAR_MARKERS_CHR,
    VAR_MARKERS_POS, VAR_MARKERS_RSID, VAR_SAMPLESET,
};
use crate::data::chromosome::{ChromosomeInfo, ChromosomeSummary};
use crate::data::genotype::{Genotype, GenotypeEncoding};
use crate::data::marker::{MarkerIdx, MarkerRecord, MarkerSet, Strand};
use crate::data::sample::{SampleIdx, Samples};
use crate::error::{LoadError, Result};

/// Whether the container at `path` carries the sealed flag
pub fn is_sealed(path: &Path) -> Result<bool> {
    if !path.exists() {
        return Err(LoadError::file_not_found(path));
    }
    let mut preamble = [0u8; PREAMBLE_LEN as usize];
    let mut file = File::open(path)?;
    file.read_exact(&mut preamble)?;
    if &preamble[0..8] != MAGIC {
        return Err(LoadError::format(format!("{} is not a matrix container", path.display())));
    }
    Ok(preamble[SEALED_FLAG_OFFSET as usize] == 1)
}

/// Read-only view of a sealed container
pub struct MatrixReader {
    mmap: Mmap,
    header: ContainerHeader,
    path: PathBuf,
}

impl MatrixReader {
    /// Open and validate a sealed container
    pub fn open(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(LoadError::file_not_found(path));
        }
        let file = File::open(path)?;
        // Safety: the file is opened read-only and containers are never
        // modified after sealing.
        let mmap = unsafe { Mmap::map(&file)? };

        if mmap.len() < PREAMBLE_LEN as usize || &mmap[0..8] != MAGIC {
            return Err(LoadError::format(format!("{} is not a matrix container", path.display())));
        }
        let major = u16::from_le_bytes([mmap[8], mmap[9]]);
        let minor = u16::from_le_bytes([mmap[10], mmap[11]]);
        check_version(major, minor)?;

        if mmap[SEALED_FLAG_OFFSET as usize] != 1 {
            return Err(LoadError::format(format!(
                "{} is incomplete (container was never sealed)",
                path.display()
            )));
        }

        let mut len_bytes = [0u8; 8];
        len_bytes.copy_from_slice(&mmap[16..24]);
        let header_len = u64::from_le_bytes(len_bytes);
        let header_end = PREAMBLE_LEN
            .checked_add(header_len)
            .filter(|&end| end <= mmap.len() as u64)
            .ok_or_else(|| LoadError::format("container header runs past end of file"))?;
        let header: ContainerHeader =
            serde_json::from_slice(&mmap[PREAMBLE_LEN as usize..header_end as usize])?;

        if header.file_len() > mmap.len() as u64 {
            return Err(LoadError::format(format!(
                "{} is truncated: layout needs {} bytes, file has {}",
                path.display(),
                header.file_len(),
                mmap.len()
            )));
        }

        Ok(Self {
            mmap,
            header,
            path: path.to_path_buf(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn header(&self) -> &ContainerHeader {
        &self.header
    }

    pub fn attributes(&self) -> &MatrixAttributes {
        &self.header.attributes
    }

    pub fn n_samples(&self) -> usize {
        self.header.dimensions.samples as usize
    }

    pub fn n_markers(&self) -> usize {
        self.header.dimensions.markers as usize
    }

    fn bytes(&self, var: &Variable) -> &[u8] {
        let start = var.offset as usize;
        &self.mmap[start..start + var.byte_len() as usize]
    }

    fn strings(&self, name: &str) -> Result<Vec<String>> {
        let var = self.header.require(name)?;
        let VarKind::Chars { stride } = var.kind else {
            return Err(LoadError::format(format!("{} is not a string variable", name)));
        };
        if stride == 0 {
            return Ok(vec![String::new(); var.n_elements() as usize]);
        }
        Ok(self
            .bytes(var)
            .chunks_exact(stride as usize)
            .map(decode_fixed)
            .collect())
    }

    fn i32s(&self, name: &str) -> Result<Vec<i32>> {
        let var = self.header.require(name)?;
        if var.kind != VarKind::Int32 {
            return Err(LoadError::format(format!("{} is not an i32 variable", name)));
        }
        Ok(self
            .bytes(var)
            .chunks_exact(4)
            .map(|c| i32::from_le_bytes([c[0], c[1], c[2], c[3]]))
            .collect())
    }

    pub fn sample_ids(&self) -> Result<Vec<String>> {
        self.strings(VAR_SAMPLESET)
    }

    pub fn marker_ids(&self) -> Result<Vec<String>> {
        self.strings(VAR_MARKERSET)
    }

    pub fn rs_ids(&self) -> Result<Vec<String>> {
        self.strings(VAR_MARKERS_RSID)
    }

    pub fn chromosomes(&self) -> Result<Vec<String>> {
        self.strings(VAR_MARKERS_CHR)
    }

    pub fn positions(&self) -> Result<Vec<i32>> {
        self.i32s(VAR_MARKERS_POS)
    }

    /// Allele dictionary, when the source provided one
    pub fn bases(&self) -> Option<Vec<[u8; 2]>> {
        let var = self.header.variable(VAR_MARKERS_BASES_DICT)?;
        Some(
            self.bytes(var)
                .chunks_exact(2)
                .map(|c| [c[0], c[1]])
                .collect(),
        )
    }

    /// One strand per marker; a matrix-wide strand is broadcast
    pub fn strands(&self) -> Result<Vec<Strand>> {
        let stored: Vec<Strand> = self
            .strings(VAR_GT_STRAND)?
            .iter()
            .map(|s| Strand::parse(s))
            .collect();
        if stored.len() == 1 && self.n_markers() != 1 {
            Ok(vec![stored[0]; self.n_markers()])
        } else {
            Ok(stored)
        }
    }

    /// Whether `GT_STRAND` holds a single matrix-wide value
    pub fn strand_is_matrix_wide(&self) -> bool {
        self.header.dimensions.strands == 1
    }

    pub fn chromosome_summary(&self) -> Result<ChromosomeSummary> {
        let labels = self.strings(VAR_CHR_IN_MATRIX)?;
        let info = self.i32s(VAR_CHR_INFO)?;
        let entries = labels
            .into_iter()
            .zip(info.chunks_exact(CHR_INFO_FIELDS as usize))
            .map(|(label, row)| {
                (
                    label,
                    ChromosomeInfo {
                        marker_count: row[0] as u32,
                        min_position: row[1],
                        max_position: row[2],
                        first_marker: row[3] as u32,
                    },
                )
            })
            .collect();
        Ok(ChromosomeSummary::from_entries(entries))
    }

    pub fn encoding(&self) -> Result<GenotypeEncoding> {
        let tag = self
            .strings(VAR_GTENCODING)?
            .into_iter()
            .next()
            .unwrap_or_default();
        GenotypeEncoding::from_tag(&tag)
            .ok_or_else(|| LoadError::format(format!("unknown genotype encoding tag '{}'", tag)))
    }

    /// All markers of one sample, as `n_markers * 2` bytes
    pub fn sample_row(&self, sample: SampleIdx) -> Result<&[u8]> {
        if sample.as_usize() >= self.n_samples() {
            return Err(LoadError::invalid_data(format!(
                "sample index {} out of range ({} samples)",
                sample.as_usize(),
                self.n_samples()
            )));
        }
        let var = self.header.require(VAR_GENOTYPES)?;
        let row = self.n_markers() * 2;
        let start = sample.as_usize() * row;
        Ok(&self.bytes(var)[start..start + row])
    }

    pub fn genotype(&self, sample: SampleIdx, marker: MarkerIdx) -> Result<Genotype> {
        let row = self.sample_row(sample)?;
        let m = marker.as_usize();
        if m >= self.n_markers() {
            return Err(LoadError::invalid_data(format!(
                "marker index {} out of range ({} markers)",
                m,
                self.n_markers()
            )));
        }
        Ok([row[m * 2], row[m * 2 + 1]])
    }

    /// All samples of one marker
    pub fn marker_column(&self, marker: MarkerIdx) -> Result<Vec<Genotype>> {
        (0..self.n_samples())
            .map(|s| self.genotype(SampleIdx::from(s), marker))
            .collect()
    }

    /// Rebuild the marker set from the stored dictionaries
    pub fn markers(&self) -> Result<MarkerSet> {
        let ids = self.marker_ids()?;
        let rs = self.rs_ids()?;
        let chrs = self.chromosomes()?;
        let pos = self.positions()?;
        let bases = self.bases();
        let strands = if self.strand_is_matrix_wide() {
            None
        } else {
            Some(self.strands()?)
        };

        let records = ids
            .iter()
            .enumerate()
            .map(|(i, id)| {
                let mut record = MarkerRecord::new(id.as_str(), Some(rs[i].as_str()), &chrs[i], pos[i]);
                if let Some(bases) = &bases {
                    record.alleles = Some(bases[i]);
                }
                if let Some(strands) = &strands {
                    record.strand = Some(strands[i]);
                }
                record
            })
            .collect();
        Ok(MarkerSet::from_records(records))
    }

    pub fn samples(&self) -> Result<Samples> {
        Ok(Samples::from_ids(self.sample_ids()?))
    }
}
