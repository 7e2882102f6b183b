//! # Illumina LGEN Adapter
//!
//! Long-format Illumina report: an optional `[Header]` block, then `[Data]`
//! followed by a column header naming `SNP Name`, `Sample ID`, `Allele1 - *`
//! and `Allele2 - *`. Each data row is one call; `-` is a missing allele.
//! Markers come from a PLINK MAP file.
//!
//! The report is indexed once by sample id so each sample's calls are read
//! back with seeks instead of a full rescan.

use std::path::{Path, PathBuf};

use tracing::{debug, info_span};

use super::{stream_by_sample, DiscoveredSamples, GenotypeAdapter, MetadataAdapter, SampleRowReader, StreamContext};
use crate::config::LoadConfig;
use crate::data::genotype::{genotype_from_tokens, AlleleMode, Genotype, MISSING};
use crate::data::marker::{parse_position, MarkerRecord, MarkerSet};
use crate::data::sample::SampleIdx;
use crate::error::{LoadError, Result};
use crate::utils::text::{display, for_each_line, split_ws, LineIndex};

pub const DATA_SECTION: &str = "[Data]";

/// Column positions resolved from the report's column header
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ReportColumns {
    pub delimiter: char,
    pub snp: usize,
    pub sample: usize,
    pub allele1: usize,
    pub allele2: usize,
    /// The column header sits right after a `[Data]` line
    pub sectioned: bool,
}

impl ReportColumns {
    fn from_header(line: &str, sectioned: bool) -> Option<Self> {
        let delimiter = if line.contains('\t') { '\t' } else { ',' };
        let names: Vec<&str> = line.split(delimiter).map(str::trim).collect();
        let find = |pred: &dyn Fn(&str) -> bool| names.iter().position(|n| pred(n));
        Some(Self {
            delimiter,
            snp: find(&|n| n.eq_ignore_ascii_case("SNP Name"))?,
            sample: find(&|n| n.eq_ignore_ascii_case("Sample ID"))?,
            allele1: find(&|n| n.starts_with("Allele1"))?,
            allele2: find(&|n| n.starts_with("Allele2"))?,
            sectioned,
        })
    }

    fn split<'a>(&self, line: &'a str) -> Vec<&'a str> {
        line.split(self.delimiter).map(str::trim).collect()
    }

    fn width(&self) -> usize {
        1 + self.snp.max(self.sample).max(self.allele1).max(self.allele2)
    }
}

/// Locate the column header: the line after `[Data]`, or the first line
pub fn read_report_columns(path: &Path) -> Result<ReportColumns> {
    let mut columns = None;
    let mut after_data = false;
    let mut first = true;
    for_each_line(path, |_, line| {
        if columns.is_some() {
            return Ok(());
        }
        if line.trim() == DATA_SECTION {
            after_data = true;
            return Ok(());
        }
        if first || after_data {
            columns = ReportColumns::from_header(line, after_data);
        }
        first = false;
        Ok(())
    })?;
    columns.ok_or_else(|| {
        LoadError::format(format!(
            "{}: no column header with SNP Name, Sample ID, Allele1 and Allele2",
            display(path)
        ))
    })
}

pub struct LgenLoader {
    map: PathBuf,
    report: PathBuf,
    columns: Option<ReportColumns>,
    index: Option<LineIndex>,
}

impl LgenLoader {
    pub fn new(config: &LoadConfig) -> Result<Self> {
        Ok(Self {
            map: config
                .annotation
                .clone()
                .ok_or_else(|| LoadError::config("illumina-lgen needs a MAP file (--annotation)"))?,
            report: config.primary_genotypes()?.to_path_buf(),
            columns: None,
            index: None,
        })
    }

    fn ensure_index(&mut self) -> Result<(ReportColumns, &LineIndex)> {
        let columns = match self.columns {
            Some(c) => c,
            None => {
                let c = read_report_columns(&self.report)?;
                self.columns = Some(c);
                c
            }
        };
        if self.index.is_none() {
            let _span = info_span!("index_report", path = %self.report.display()).entered();
            let is_data = |l: &str| l.trim() == DATA_SECTION;
            let start = columns.sectioned.then_some(&is_data as &dyn Fn(&str) -> bool);
            let index = LineIndex::build(&self.report, start, |line| {
                let fields = columns.split(line);
                let key = fields.get(columns.sample)?;
                if key.eq_ignore_ascii_case("Sample ID") {
                    return None;
                }
                Some(key.to_string())
            })?;
            debug!(samples = index.keys().len(), "report indexed");
            self.index = Some(index);
        }
        match &self.index {
            Some(index) => Ok((columns, index)),
            None => Err(LoadError::protocol("report index missing after build")),
        }
    }
}

impl MetadataAdapter for LgenLoader {
    fn read_markers(&mut self) -> Result<MarkerSet> {
        let _span = info_span!("read_lgen_map", path = %self.map.display()).entered();
        let name = display(&self.map);
        let mut records = Vec::new();
        for_each_line(&self.map, |line_num, line| {
            let fields = split_ws(line);
            if fields.len() < 3 {
                return Err(LoadError::parse(name.as_str(), line_num, "expected 'chr id [cm] pos'"));
            }
            let pos = if fields.len() == 3 { fields[2] } else { fields[3] };
            records.push(MarkerRecord::new(fields[1], Some(fields[1]), fields[0], parse_position(pos)));
            Ok(())
        })?;
        Ok(MarkerSet::from_records(records))
    }
}

impl SampleRowReader for LgenLoader {
    fn read_sample(&mut self, _sample: SampleIdx, sample_id: &str, markers: &MarkerSet) -> Result<Vec<Genotype>> {
        let name = display(&self.report);
        let (columns, index) = self.ensure_index()?;
        let mut row = vec![MISSING; markers.len()];
        for line in index.read_lines(sample_id)? {
            let fields = columns.split(&line);
            if fields.len() < columns.width() {
                return Err(LoadError::invalid_data(format!(
                    "{}: short row for sample {}: '{}'",
                    name, sample_id, line
                )));
            }
            if let Some(idx) = markers.index_of(fields[columns.snp]) {
                row[idx.as_usize()] = genotype_from_tokens(fields[columns.allele1], fields[columns.allele2]);
            }
        }
        Ok(row)
    }
}

impl GenotypeAdapter for LgenLoader {
    fn mode(&self) -> AlleleMode {
        AlleleMode::BySample
    }

    fn discover_samples(&mut self) -> Result<DiscoveredSamples> {
        let (_, index) = self.ensure_index()?;
        Ok(DiscoveredSamples::from_ids(index.keys().iter().cloned()))
    }

    fn stream(&mut self, ctx: &mut StreamContext<'_>) -> Result<()> {
        let _span = info_span!("stream_lgen", path = %self.report.display()).entered();
        self.ensure_index()?;
        stream_by_sample(self, ctx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const REPORT: &str = "\
[Header]
GSGT Version\t1.9
[Data]
SNP Name\tSample ID\tAllele1 - Forward\tAllele2 - Forward
rs1\tS1\tA\tG
rs1\tS2\t-\t-
rs2\tS1\tC\tC
rs2\tS2\tC\tT
rs9\tS2\tA\tA
";

    fn loader(dir: &Path, report: &str) -> LgenLoader {
        let map = dir.join("x.map");
        std::fs::write(&map, "1 rs2 0 200\n1 rs1 0 100\n").unwrap();
        let path = dir.join("report.txt");
        std::fs::write(&path, report).unwrap();
        LgenLoader {
            map,
            report: path,
            columns: None,
            index: None,
        }
    }

    #[test]
    fn test_sectioned_report() {
        let dir = tempfile::tempdir().unwrap();
        let mut l = loader(dir.path(), REPORT);
        let markers = l.read_markers().unwrap();
        let samples = l.discover_samples().unwrap();
        assert_eq!(samples.ids().collect::<Vec<_>>(), vec!["S1", "S2"]);
        assert_eq!(
            l.read_sample(SampleIdx::new(0), "S1", &markers).unwrap(),
            vec![*b"AG", *b"CC"]
        );
        assert_eq!(
            l.read_sample(SampleIdx::new(1), "S2", &markers).unwrap(),
            vec![MISSING, *b"CT"]
        );
    }

    #[test]
    fn test_bare_csv_report() {
        let dir = tempfile::tempdir().unwrap();
        let mut l = loader(
            dir.path(),
            "SNP Name,Sample ID,Allele1 - Top,Allele2 - Top\nrs2,S9,A,C\n",
        );
        let columns = read_report_columns(&l.report).unwrap();
        assert_eq!(columns.delimiter, ',');
        assert!(!columns.sectioned);
        let markers = l.read_markers().unwrap();
        assert_eq!(l.discover_samples().unwrap().ids().collect::<Vec<_>>(), vec!["S9"]);
        assert_eq!(
            l.read_sample(SampleIdx::new(0), "S9", &markers).unwrap(),
            vec![MISSING, *b"AC"]
        );
    }

    #[test]
    fn test_missing_columns() {
        let dir = tempfile::tempdir().unwrap();
        let l = loader(dir.path(), "[Data]\nSNP Name\tGType\n");
        assert!(matches!(read_report_columns(&l.report), Err(LoadError::Format { .. })));
    }
}
