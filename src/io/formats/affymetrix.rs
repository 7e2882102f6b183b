//! # Affymetrix Adapter
//!
//! Markers come from the vendor annotation CSV (quoted, `#` comment lines,
//! columns located by header name). Rows outside the final probe list and
//! blacklisted probe ids are dropped before sorting.
//!
//! Genotypes come from one birdseed call file per sample. The sample id is
//! the file name up to its first `.`. Calls are `AA`/`AB`/`BB`/`NoCall` or
//! the numeric `0`/`1`/`2`/`-1`.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use tracing::{debug, info_span, warn};

use super::{stream_by_sample, DiscoveredSamples, GenotypeAdapter, MetadataAdapter, SampleRowReader, StreamContext};
use crate::config::LoadConfig;
use crate::data::genotype::{AlleleMode, Genotype, MISSING};
use crate::data::marker::{parse_position, MarkerRecord, MarkerSet, Strand};
use crate::data::sample::SampleIdx;
use crate::error::{LoadError, Result};
use crate::utils::text::{display, for_each_line, open_text};

const COL_PROBE: &str = "Probe Set ID";
const COL_RS: &str = "dbSNP RS ID";
const COL_CHR: &str = "Chromosome";
const COL_POS: &str = "Physical Position";
const COL_STRAND: &str = "Strand";
const COL_PAR1: &str = "ChrX pseudo-autosomal region 1";
const COL_PAR2: &str = "ChrX pseudo-autosomal region 2";
const COL_ALLELE_A: &str = "Allele A";
const COL_ALLELE_B: &str = "Allele B";
const COL_FINAL_LIST: &str = "In Final List";

/// Probe ids to drop, one per line (first token), `#` comments allowed
pub fn read_probe_blacklist(path: &Path) -> Result<HashSet<String>> {
    let mut ids = HashSet::new();
    for_each_line(path, |_, line| {
        let line = line.trim();
        if !line.starts_with('#') {
            if let Some(id) = line.split_whitespace().next() {
                ids.insert(id.trim_matches('"').to_string());
            }
        }
        Ok(())
    })?;
    Ok(ids)
}

/// Sample id of a call file: file name up to the first `.`
pub fn sample_id_from_path(path: &Path) -> String {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    match name.split_once('.') {
        Some((stem, _)) if !stem.is_empty() => stem.to_string(),
        _ => name,
    }
}

/// Translate one birdseed call
pub fn parse_call(call: &str) -> Option<Genotype> {
    match call.trim() {
        "AA" | "0" => Some(*b"AA"),
        "AB" | "1" => Some(*b"AB"),
        "BB" | "2" => Some(*b"BB"),
        "NoCall" | "-1" | "NC" => Some(MISSING),
        _ => None,
    }
}

pub struct AffymetrixLoader {
    annotation: PathBuf,
    blacklist: Option<PathBuf>,
    files: Vec<PathBuf>,
}

impl AffymetrixLoader {
    pub fn new(config: &LoadConfig) -> Result<Self> {
        let annotation = config
            .annotation
            .clone()
            .ok_or_else(|| LoadError::config("affymetrix needs an annotation file (--annotation)"))?;
        config.primary_genotypes()?;
        Ok(Self {
            annotation,
            blacklist: config.probe_blacklist.clone(),
            files: config.genotypes.clone(),
        })
    }
}

impl MetadataAdapter for AffymetrixLoader {
    fn read_markers(&mut self) -> Result<MarkerSet> {
        let _span = info_span!("read_affy_annotation", path = %self.annotation.display()).entered();
        let blacklist = match &self.blacklist {
            Some(path) => read_probe_blacklist(path)?,
            None => HashSet::new(),
        };

        let path = display(&self.annotation);
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .comment(Some(b'#'))
            .flexible(true)
            .from_reader(open_text(&self.annotation)?);
        let headers = reader
            .headers()
            .map_err(|e| LoadError::parse(path.as_str(), 1, e.to_string()))?
            .clone();
        let col = |name: &str| headers.iter().position(|h| h.trim() == name);
        let require = |name: &str| {
            col(name).ok_or_else(|| LoadError::format(format!("{} has no '{}' column", path, name)))
        };
        let probe_col = require(COL_PROBE)?;
        let chr_col = require(COL_CHR)?;
        let pos_col = require(COL_POS)?;
        let rs_col = col(COL_RS);
        let strand_col = col(COL_STRAND);
        let par_cols = col(COL_PAR1).zip(col(COL_PAR2));
        let allele_cols = col(COL_ALLELE_A).zip(col(COL_ALLELE_B));
        let final_col = col(COL_FINAL_LIST);

        let mut records = Vec::new();
        let (mut not_final, mut blacklisted) = (0usize, 0usize);
        for (i, row) in reader.records().enumerate() {
            let row = row.map_err(|e| LoadError::parse(path.as_str(), i + 2, e.to_string()))?;
            let get = |c: usize| row.get(c).map(str::trim).unwrap_or("");
            let probe = get(probe_col);
            if probe.is_empty() {
                continue;
            }
            if let Some(c) = final_col {
                if !get(c).eq_ignore_ascii_case("YES") {
                    not_final += 1;
                    continue;
                }
            }
            if blacklist.contains(probe) {
                blacklisted += 1;
                continue;
            }

            let mut record = MarkerRecord::new(
                probe,
                rs_col.map(|c| get(c)),
                get(chr_col),
                parse_position(get(pos_col)),
            );
            if let Some(c) = strand_col {
                record = record.with_strand(Strand::parse(get(c)));
            }
            if let Some((a, b)) = par_cols {
                record = record.with_pseudo_autosomal(get(a), get(b));
            }
            if let Some((a, b)) = allele_cols {
                record = record.with_alleles(get(a), get(b));
            }
            records.push(record);
        }
        if not_final > 0 || blacklisted > 0 {
            debug!(not_final, blacklisted, "annotation rows filtered");
        }
        Ok(MarkerSet::from_records(records))
    }
}

impl SampleRowReader for AffymetrixLoader {
    fn read_sample(&mut self, sample: SampleIdx, _sample_id: &str, markers: &MarkerSet) -> Result<Vec<Genotype>> {
        let path = &self.files[sample.as_usize()];
        let name = display(path);
        let mut row = vec![MISSING; markers.len()];
        let mut calls = 0usize;
        let mut unknown = 0usize;

        for_each_line(path, |line_num, line| {
            if line.starts_with('#') {
                return Ok(());
            }
            let mut fields = line.split('\t');
            let probe = fields.next().unwrap_or("").trim().trim_matches('"');
            if probe.eq_ignore_ascii_case("probeset_id") || probe.eq_ignore_ascii_case(COL_PROBE) {
                return Ok(());
            }
            let call = fields.next().ok_or_else(|| {
                LoadError::parse(name.as_str(), line_num, "missing call column")
            })?;
            let gt = parse_call(call).ok_or_else(|| {
                LoadError::parse(name.as_str(), line_num, format!("unrecognised call '{}'", call.trim()))
            })?;
            calls += 1;
            match markers.index_of(probe) {
                Some(idx) => row[idx.as_usize()] = gt,
                None => unknown += 1,
            }
            Ok(())
        })?;

        if calls == 0 {
            return Err(LoadError::invalid_data(format!("{} contains no genotype calls", name)));
        }
        if unknown > 0 {
            warn!(file = %name, unknown, "calls for probes not in the annotation ignored");
        }
        Ok(row)
    }
}

impl GenotypeAdapter for AffymetrixLoader {
    fn mode(&self) -> AlleleMode {
        AlleleMode::BySample
    }

    fn discover_samples(&mut self) -> Result<DiscoveredSamples> {
        Ok(DiscoveredSamples::from_ids(
            self.files.iter().map(|p| sample_id_from_path(p)),
        ))
    }

    fn stream(&mut self, ctx: &mut StreamContext<'_>) -> Result<()> {
        let _span = info_span!("stream_birdseed", files = self.files.len()).entered();
        stream_by_sample(self, ctx)
    }
}
