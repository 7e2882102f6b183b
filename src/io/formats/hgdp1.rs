//! # HGDP1 Adapter
//!
//! Whitespace-separated marker-major matrix: the first row names the samples
//! (its leading cell is ignored, and may be empty), then one row per marker
//! `id call call ...` with two-letter calls and `--` for missing. Markers come
//! from a map file of `id chromosome position` rows.

use std::path::{Path, PathBuf};

use tracing::info_span;

use super::{stream_by_sample, DiscoveredSamples, GenotypeAdapter, MetadataAdapter, SampleRowReader, StreamContext};
use crate::config::LoadConfig;
use crate::data::genotype::{genotype_from_call, AlleleMode, Genotype, MISSING};
use crate::data::marker::{parse_position, MarkerRecord, MarkerSet};
use crate::data::sample::SampleIdx;
use crate::error::{LoadError, Result};
use crate::utils::text::{display, for_each_line, split_ws};

pub const MISSING_CALL: &str = "--";

fn read_header(path: &Path) -> Result<Vec<String>> {
    let mut header: Option<Vec<String>> = None;
    for_each_line(path, |_, line| {
        if header.is_none() {
            // An empty leading cell leaves nothing to skip
            let skip = usize::from(!line.starts_with(char::is_whitespace));
            header = Some(line.split_whitespace().skip(skip).map(str::to_string).collect());
        }
        Ok(())
    })?;
    match header {
        Some(ids) if !ids.is_empty() => Ok(ids),
        _ => Err(LoadError::format(format!("{} has no sample header row", display(path)))),
    }
}

pub struct Hgdp1Loader {
    map: PathBuf,
    genotypes: PathBuf,
}

impl Hgdp1Loader {
    pub fn new(config: &LoadConfig) -> Result<Self> {
        Ok(Self {
            map: config
                .annotation
                .clone()
                .ok_or_else(|| LoadError::config("hgdp1 needs a map file (--annotation)"))?,
            genotypes: config.primary_genotypes()?.to_path_buf(),
        })
    }
}

impl MetadataAdapter for Hgdp1Loader {
    fn read_markers(&mut self) -> Result<MarkerSet> {
        let _span = info_span!("read_hgdp1_map", path = %self.map.display()).entered();
        let name = display(&self.map);
        let mut records = Vec::new();
        for_each_line(&self.map, |line_num, line| {
            let fields = split_ws(line);
            if fields.len() < 3 {
                return Err(LoadError::parse(name.as_str(), line_num, "expected 'id chromosome position'"));
            }
            records.push(MarkerRecord::new(fields[0], None, fields[1], parse_position(fields[2])));
            Ok(())
        })?;
        Ok(MarkerSet::from_records(records))
    }
}

impl SampleRowReader for Hgdp1Loader {
    fn read_sample(&mut self, sample: SampleIdx, _sample_id: &str, markers: &MarkerSet) -> Result<Vec<Genotype>> {
        let name = display(&self.genotypes);
        let col = 1 + sample.as_usize();
        let mut row = vec![MISSING; markers.len()];
        let mut header_seen = false;
        for_each_line(&self.genotypes, |line_num, line| {
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
                row[idx.as_usize()] = genotype_from_call(call, MISSING_CALL);
            }
            Ok(())
        })?;
        Ok(row)
    }
}

impl GenotypeAdapter for Hgdp1Loader {
    fn mode(&self) -> AlleleMode {
        AlleleMode::BySample
    }

    fn discover_samples(&mut self) -> Result<DiscoveredSamples> {
        Ok(DiscoveredSamples::from_ids(read_header(&self.genotypes)?))
    }

    fn stream(&mut self, ctx: &mut StreamContext<'_>) -> Result<()> {
        let _span = info_span!("stream_hgdp1", path = %self.genotypes.display()).entered();
        stream_by_sample(self, ctx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_rows() {
        let dir = tempfile::tempdir().unwrap();
        let map = dir.path().join("hgdp.map");
        std::fs::write(&map, "rs2\t1\t200\nrs1\t1\t100\nrs3\tX\t5\n").unwrap();
        let genotypes = dir.path().join("hgdp.txt");
        std::fs::write(
            &genotypes,
            "\tHGDP00001\tHGDP00002\nrs1\tAG\t--\nrs2\tCC\tCT\nrs3\tAA\tAA\n",
        )
        .unwrap();
        let mut l = Hgdp1Loader { map, genotypes };
        let markers = l.read_markers().unwrap();
        assert_eq!(markers.iter().map(|r| r.rs_id.as_str()).collect::<Vec<_>>(), vec!["rs1", "rs2", "rs3"]);
        let samples = l.discover_samples().unwrap();
        assert_eq!(samples.ids().collect::<Vec<_>>(), vec!["HGDP00001", "HGDP00002"]);
        assert_eq!(
            l.read_sample(SampleIdx::new(1), "HGDP00002", &markers).unwrap(),
            vec![MISSING, *b"CT", *b"AA"]
        );
    }

    #[test]
    fn test_space_separated_rows() {
        let dir = tempfile::tempdir().unwrap();
        let map = dir.path().join("hgdp.map");
        std::fs::write(&map, "rs1 1 100\nrs2 1 200\n").unwrap();
        let genotypes = dir.path().join("hgdp.txt");
        std::fs::write(&genotypes, "snp HGDP00001  HGDP00002\nrs1 AG --\nrs2   CC CT\n").unwrap();
        let mut l = Hgdp1Loader { map, genotypes };
        let markers = l.read_markers().unwrap();
        let samples = l.discover_samples().unwrap();
        assert_eq!(samples.ids().collect::<Vec<_>>(), vec!["HGDP00001", "HGDP00002"]);
        assert_eq!(l.read_sample(SampleIdx::new(0), "HGDP00001", &markers).unwrap(), vec![*b"AG", *b"CC"]);
        assert_eq!(l.read_sample(SampleIdx::new(1), "HGDP00002", &markers).unwrap(), vec![MISSING, *b"CT"]);
    }

    #[test]
    fn test_short_row_fails_sample() {
        let dir = tempfile::tempdir().unwrap();
        let map = dir.path().join("hgdp.map");
        std::fs::write(&map, "rs1\t1\t100\n").unwrap();
        let genotypes = dir.path().join("hgdp.txt");
        std::fs::write(&genotypes, "\tA\tB\nrs1\tAG\n").unwrap();
        let mut l = Hgdp1Loader { map, genotypes };
        let markers = l.read_markers().unwrap();
        assert!(l.read_sample(SampleIdx::new(1), "B", &markers).is_err());
    }
}
