//! # Hapmap Adapter
//!
//! Self-describing marker-major text: a header row of 11 metadata columns
//! (`rs# alleles chrom pos strand assembly# center protLSID assayLSID
//! panelLSID QCcode`) followed by sample ids, then one row per marker with
//! two-letter calls (`NN` missing). Several files (typically one per
//! chromosome) merge into the union of their markers and samples.
//!
//! Rows are emitted by sample so markers can be written in canonical order
//! without holding the whole file; each sample rescans the files that carry
//! its column.

use std::collections::HashMap;
use std::io::BufRead;
use std::path::{Path, PathBuf};

use tracing::info_span;

use super::{stream_by_sample, DiscoveredSamples, GenotypeAdapter, MetadataAdapter, SampleRowReader, StreamContext};
use crate::config::LoadConfig;
use crate::data::genotype::{genotype_from_call, AlleleMode, Genotype, MISSING};
use crate::data::marker::{parse_position, MarkerRecord, MarkerSet, Strand};
use crate::data::sample::SampleIdx;
use crate::error::{LoadError, Result};
use crate::utils::text::{display, for_each_line, open_text};

/// Leading metadata columns before the first sample
pub const META_COLUMNS: usize = 11;
pub const MISSING_CALL: &str = "NN";

const COL_ID: usize = 0;
const COL_ALLELES: usize = 1;
const COL_CHR: usize = 2;
const COL_POS: usize = 3;
const COL_STRAND: usize = 4;

/// Sample ids from the first line of a Hapmap file
fn read_header(path: &Path) -> Result<Vec<String>> {
    let mut reader = open_text(path)?;
    let mut line = String::new();
    while line.trim().is_empty() {
        line.clear();
        if reader.read_line(&mut line)? == 0 {
            return Err(LoadError::format(format!("{} is empty", display(path))));
        }
    }
    let fields: Vec<&str> = line.split_whitespace().collect();
    if fields.len() <= META_COLUMNS {
        return Err(LoadError::format(format!(
            "{}: header has {} columns, expected {} metadata columns plus samples",
            display(path),
            fields.len(),
            META_COLUMNS
        )));
    }
    Ok(fields[META_COLUMNS..].iter().map(|s| s.to_string()).collect())
}

pub struct HapmapLoader {
    files: Vec<PathBuf>,
    /// Per file: sample id to column index
    columns: Vec<HashMap<String, usize>>,
}

impl HapmapLoader {
    pub fn new(config: &LoadConfig) -> Result<Self> {
        config.primary_genotypes()?;
        Ok(Self {
            files: config.genotypes.clone(),
            columns: Vec::new(),
        })
    }

    fn load_headers(&mut self) -> Result<()> {
        if self.columns.len() == self.files.len() {
            return Ok(());
        }
        self.columns = self
            .files
            .iter()
            .map(|path| {
                let ids = read_header(path)?;
                Ok(ids
                    .into_iter()
                    .enumerate()
                    .map(|(i, id)| (id, META_COLUMNS + i))
                    .collect())
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(())
    }
}

impl MetadataAdapter for HapmapLoader {
    fn read_markers(&mut self) -> Result<MarkerSet> {
        let _span = info_span!("read_hapmap_markers", files = self.files.len()).entered();
        let mut records = Vec::new();
        for path in &self.files {
            let name = display(path);
            let mut header_seen = false;
            for_each_line(path, |line_num, line| {
                if !header_seen {
                    header_seen = true;
                    return Ok(());
                }
                let fields: Vec<&str> = line.split_whitespace().take(META_COLUMNS).collect();
                if fields.len() < META_COLUMNS {
                    return Err(LoadError::parse(
                        name.as_str(),
                        line_num,
                        format!("expected {} metadata columns, found {}", META_COLUMNS, fields.len()),
                    ));
                }
                let (a1, a2) = fields[COL_ALLELES].split_once('/').unwrap_or((fields[COL_ALLELES], ""));
                let record = MarkerRecord::new(
                    fields[COL_ID],
                    Some(fields[COL_ID]),
                    fields[COL_CHR],
                    parse_position(fields[COL_POS]),
                )
                .with_alleles(a1, a2)
                .with_strand(Strand::parse(fields[COL_STRAND]));
                records.push(record);
                Ok(())
            })?;
        }
        Ok(MarkerSet::from_records(records))
    }
}

impl SampleRowReader for HapmapLoader {
    fn read_sample(&mut self, _sample: SampleIdx, sample_id: &str, markers: &MarkerSet) -> Result<Vec<Genotype>> {
        let mut row = vec![MISSING; markers.len()];
        for (path, columns) in self.files.iter().zip(&self.columns) {
            let Some(&col) = columns.get(sample_id) else {
                continue;
            };
            let name = display(path);
            let mut header_seen = false;
            for_each_line(path, |line_num, line| {
                if !header_seen {
                    header_seen = true;
                    return Ok(());
                }
                let mut fields = line.split_whitespace();
                let id = fields.next().unwrap_or("");
                let call = fields.nth(col - 1).ok_or_else(|| {
                    LoadError::parse(name.as_str(), line_num, format!("row has no column {}", col + 1))
                })?;
                if let Some(idx) = markers.index_of(id) {
                    let slot = &mut row[idx.as_usize()];
                    if *slot == MISSING {
                        *slot = genotype_from_call(call, MISSING_CALL);
                    }
                }
                Ok(())
            })?;
        }
        Ok(row)
    }
}

impl GenotypeAdapter for HapmapLoader {
    fn mode(&self) -> AlleleMode {
        AlleleMode::BySample
    }

    fn discover_samples(&mut self) -> Result<DiscoveredSamples> {
        self.load_headers()?;
        let mut ids: Vec<String> = Vec::new();
        let mut seen = std::collections::HashSet::new();
        for path in &self.files {
            for id in read_header(path)? {
                if seen.insert(id.clone()) {
                    ids.push(id);
                }
            }
        }
        Ok(DiscoveredSamples::from_ids(ids))
    }

    fn stream(&mut self, ctx: &mut StreamContext<'_>) -> Result<()> {
        let _span = info_span!("stream_hapmap", files = self.files.len()).entered();
        self.load_headers()?;
        stream_by_sample(self, ctx)
    }
}
