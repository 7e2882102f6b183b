//! # PLINK Adapters
//!
//! Flat (MAP + PED) and binary (BIM + BED + FAM) filesets.
//!
//! - MAP/BIM rows are kept in file order so genotype columns (PED) and packed
//!   records (BED) can be mapped onto canonical marker indices.
//! - PED is streamed by sample: one line per sample, allele pairs in MAP order.
//! - BED must be SNP-major (mode byte 1). It is memory-mapped and streamed by
//!   marker in canonical order, seeking to each marker's packed record.

use std::collections::HashMap;
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};

use memmap2::Mmap;
use tracing::{debug, info_span};

use super::{DiscoveredSamples, GenotypeAdapter, MetadataAdapter, StreamContext};
use crate::config::LoadConfig;
use crate::data::genotype::{genotype_from_tokens, AlleleMode, Genotype, MISSING, MISSING_ALLELE};
use crate::data::marker::{parse_position, MarkerIdx, MarkerRecord, MarkerSet};
use crate::data::sample::{SampleIdx, SampleInfo};
use crate::error::{LoadError, Result};
use crate::utils::text::{display, for_each_line, split_ws};

/// BED magic bytes
pub const BED_MAGIC: [u8; 2] = [0x6c, 0x1b];
/// BED mode byte for SNP-major files
pub const BED_SNP_MAJOR: u8 = 0x01;

/// Parse a MAP (`chr id [cm] pos`) or BIM (`chr id cm pos a1 a2`) file in file order
fn read_marker_table(path: &Path, with_alleles: bool) -> Result<Vec<MarkerRecord>> {
    let mut records = Vec::new();
    let min_fields = if with_alleles { 6 } else { 3 };
    for_each_line(path, |line_num, line| {
        let fields = split_ws(line);
        if fields.len() < min_fields {
            return Err(LoadError::parse(
                display(path),
                line_num,
                format!("expected at least {} columns, found {}", min_fields, fields.len()),
            ));
        }
        let pos_field = if fields.len() == 3 { fields[2] } else { fields[3] };
        let mut record = MarkerRecord::new(fields[1], Some(fields[1]), fields[0], parse_position(pos_field));
        if with_alleles {
            record = record.with_alleles(fields[4], fields[5]);
        }
        records.push(record);
        Ok(())
    })?;
    Ok(records)
}

/// Read FAM / PED pedigree columns
fn read_pedigrees(path: &Path) -> Result<Vec<SampleInfo>> {
    let mut infos = Vec::new();
    for_each_line(path, |line_num, line| {
        let mut fields = line.split_whitespace();
        let head: Vec<&str> = fields.by_ref().take(6).collect();
        let info = SampleInfo::from_pedigree(&head).ok_or_else(|| {
            LoadError::parse(display(path), line_num, "expected the six pedigree columns")
        })?;
        infos.push(info);
        Ok(())
    })?;
    Ok(infos)
}

/// Canonical index of each file-order marker (None for dropped duplicates)
fn file_to_sorted(file_order: &[String], markers: &MarkerSet) -> Vec<Option<MarkerIdx>> {
    let mut seen = std::collections::HashSet::with_capacity(file_order.len());
    file_order
        .iter()
        .map(|id| {
            if seen.insert(id.as_str()) {
                markers.index_of(id)
            } else {
                None
            }
        })
        .collect()
}

/// PLINK MAP + PED
pub struct PlinkFlatLoader {
    map: PathBuf,
    ped: PathBuf,
    map_order: Vec<String>,
}

impl PlinkFlatLoader {
    pub fn new(config: &LoadConfig) -> Result<Self> {
        Ok(Self {
            map: config.annotation_or_sibling("map")?,
            ped: config.primary_genotypes()?.to_path_buf(),
            map_order: Vec::new(),
        })
    }
}

impl MetadataAdapter for PlinkFlatLoader {
    fn read_markers(&mut self) -> Result<MarkerSet> {
        let _span = info_span!("read_map", path = %self.map.display()).entered();
        let records = read_marker_table(&self.map, false)?;
        self.map_order = records.iter().map(|r| r.marker_id.clone()).collect();
        Ok(MarkerSet::from_records(records))
    }
}

impl GenotypeAdapter for PlinkFlatLoader {
    fn mode(&self) -> AlleleMode {
        AlleleMode::BySample
    }

    fn discover_samples(&mut self) -> Result<DiscoveredSamples> {
        Ok(DiscoveredSamples {
            infos: read_pedigrees(&self.ped)?,
            pedigree: true,
        })
    }

    fn stream(&mut self, ctx: &mut StreamContext<'_>) -> Result<()> {
        let _span = info_span!("stream_ped", path = %self.ped.display()).entered();
        let markers = ctx.markers();
        if self.map_order.is_empty() && !markers.is_empty() {
            self.map_order = read_marker_table(&self.map, false)?
                .into_iter()
                .map(|r| r.marker_id)
                .collect();
        }
        let mapping = file_to_sorted(&self.map_order, markers);
        let expected = 6 + 2 * mapping.len();
        let ped = display(&self.ped);
        let mut sample = 0usize;

        for_each_line(&self.ped, |line_num, line| {
            ctx.check_interrupt()?;
            let fields = split_ws(line);
            let row = if fields.len() != expected {
                Err(LoadError::parse(
                    ped.as_str(),
                    line_num,
                    format!("expected {} columns, found {}", expected, fields.len()),
                ))
            } else {
                let mut row = vec![MISSING; markers.len()];
                for (j, idx) in mapping.iter().enumerate() {
                    if let Some(idx) = idx {
                        row[idx.as_usize()] = genotype_from_tokens(fields[6 + 2 * j], fields[7 + 2 * j]);
                    }
                }
                Ok(row)
            };
            ctx.sample_result(SampleIdx::from(sample), row)?;
            sample += 1;
            Ok(())
        })
    }
}

/// Decode one packed SNP-major record.
///
/// Codes are read low bits first: `0` hom allele 1, `1` missing, `2` het,
/// `3` hom allele 2. A `0` allele makes the call missing.
pub fn decode_bed_row(packed: &[u8], a1: u8, a2: u8, out: &mut [Genotype]) {
    for (s, gt) in out.iter_mut().enumerate() {
        let code = (packed[s >> 2] >> ((s & 3) << 1)) & 0b11;
        let g = match code {
            0b00 => [a1, a1],
            0b01 => MISSING,
            0b10 => [a1, a2],
            _ => [a2, a2],
        };
        *gt = if g[0] == MISSING_ALLELE || g[1] == MISSING_ALLELE {
            MISSING
        } else {
            g
        };
    }
}

/// Bytes per packed marker record
#[inline]
pub fn bed_record_len(n_samples: usize) -> usize {
    (n_samples + 3) / 4
}

/// Validate the 3-byte BED header
pub fn check_bed_header(bytes: &[u8], path: &Path) -> Result<()> {
    if bytes.len() < 3 || bytes[0..2] != BED_MAGIC {
        return Err(LoadError::format(format!(
            "{} is not a PLINK BED file (missing magic 0x6c 0x1b)",
            path.display()
        )));
    }
    if bytes[2] != BED_SNP_MAJOR {
        return Err(LoadError::format(format!(
            "{} is not in SNP-major mode (mode byte {:#04x})",
            path.display(),
            bytes[2]
        )));
    }
    Ok(())
}

/// PLINK BIM + BED + FAM
pub struct PlinkBinaryLoader {
    bim: PathBuf,
    bed: PathBuf,
    fam: PathBuf,
    bim_order: Vec<String>,
}

impl PlinkBinaryLoader {
    pub fn new(config: &LoadConfig) -> Result<Self> {
        let bed = config.primary_genotypes()?.to_path_buf();
        let fam = bed.with_extension("fam");
        Ok(Self {
            bim: config.annotation_or_sibling("bim")?,
            bed,
            fam,
            bim_order: Vec::new(),
        })
    }
}

impl MetadataAdapter for PlinkBinaryLoader {
    fn read_markers(&mut self) -> Result<MarkerSet> {
        let _span = info_span!("read_bim", path = %self.bim.display()).entered();
        let records = read_marker_table(&self.bim, true)?;
        self.bim_order = records.iter().map(|r| r.marker_id.clone()).collect();
        Ok(MarkerSet::from_records(records))
    }
}

impl GenotypeAdapter for PlinkBinaryLoader {
    fn mode(&self) -> AlleleMode {
        AlleleMode::ByMarker
    }

    fn discover_samples(&mut self) -> Result<DiscoveredSamples> {
        // Reject a sample-major or foreign BED before any output exists
        if !self.bed.exists() {
            return Err(LoadError::file_not_found(&self.bed));
        }
        let mut header = Vec::with_capacity(3);
        File::open(&self.bed)?.take(3).read_to_end(&mut header)?;
        check_bed_header(&header, &self.bed)?;
        Ok(DiscoveredSamples {
            infos: read_pedigrees(&self.fam)?,
            pedigree: true,
        })
    }

    fn stream(&mut self, ctx: &mut StreamContext<'_>) -> Result<()> {
        let _span = info_span!("stream_bed", path = %self.bed.display()).entered();
        if !self.bed.exists() {
            return Err(LoadError::file_not_found(&self.bed));
        }
        let file = File::open(&self.bed)?;
        // Safety: read-only mapping of an input file for the duration of the stream.
        let mmap = unsafe { Mmap::map(&file)? };
        check_bed_header(&mmap, &self.bed)?;

        let markers = ctx.markers();
        if self.bim_order.is_empty() && !markers.is_empty() {
            self.bim_order = read_marker_table(&self.bim, true)?
                .into_iter()
                .map(|r| r.marker_id)
                .collect();
        }
        let n_samples = ctx.samples().len();
        let record_len = bed_record_len(n_samples);
        let needed = 3 + record_len * self.bim_order.len();
        if mmap.len() < needed {
            return Err(LoadError::format(format!(
                "{} is truncated: {} markers x {} samples need {} bytes, found {}",
                self.bed.display(),
                self.bim_order.len(),
                n_samples,
                needed,
                mmap.len()
            )));
        }

        let mut bim_index: HashMap<&str, usize> = HashMap::with_capacity(self.bim_order.len());
        for (i, id) in self.bim_order.iter().enumerate() {
            bim_index.entry(id.as_str()).or_insert(i);
        }
        debug!(markers = markers.len(), samples = n_samples, record_len, "decoding BED");

        let mut row = vec![MISSING; n_samples];
        for (m, record) in markers.iter().enumerate() {
            ctx.check_interrupt()?;
            let Some(&file_idx) = bim_index.get(record.marker_id.as_str()) else {
                return Err(LoadError::invalid_data(format!(
                    "marker {} is not in {}",
                    record.marker_id,
                    self.bim.display()
                )));
            };
            let [a1, a2] = record.alleles.unwrap_or(MISSING);
            let start = 3 + file_idx * record_len;
            decode_bed_row(&mmap[start..start + record_len], a1, a2, &mut row);
            ctx.emit_marker(MarkerIdx::from(m), &row)?;
        }
        Ok(())
    }
}
