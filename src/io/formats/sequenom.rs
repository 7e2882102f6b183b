//! # Sequenom Adapter
//!
//! Long-format calls: tab-separated `SAMPLE_ID ASSAY_ID GENOTYPE` rows with an
//! optional header. A single-letter call is homozygous. Purely numeric assay
//! ids are dbSNP numbers and become `rs<id>`, in both the calls and the
//! annotation (`id chromosome position`).

use std::path::PathBuf;

use tracing::info_span;

use super::{stream_by_sample, DiscoveredSamples, GenotypeAdapter, MetadataAdapter, SampleRowReader, StreamContext};
use crate::config::LoadConfig;
use crate::data::genotype::{genotype_from_call, AlleleMode, Genotype, MISSING};
use crate::data::marker::{parse_position, MarkerRecord, MarkerSet};
use crate::data::sample::SampleIdx;
use crate::error::{LoadError, Result};
use crate::utils::text::{display, for_each_line, split_tab, split_ws, LineIndex};

const HEADER_SAMPLE: &str = "SAMPLE_ID";

/// `rs`-prefix purely numeric assay ids
pub fn normalize_assay_id(id: &str) -> String {
    let id = id.trim();
    if !id.is_empty() && id.bytes().all(|b| b.is_ascii_digit()) {
        format!("rs{}", id)
    } else {
        id.to_string()
    }
}

pub struct SequenomLoader {
    annotation: PathBuf,
    calls: PathBuf,
    index: Option<LineIndex>,
}

impl SequenomLoader {
    pub fn new(config: &LoadConfig) -> Result<Self> {
        Ok(Self {
            annotation: config
                .annotation
                .clone()
                .ok_or_else(|| LoadError::config("sequenom needs an annotation file (--annotation)"))?,
            calls: config.primary_genotypes()?.to_path_buf(),
            index: None,
        })
    }

    fn index(&mut self) -> Result<&LineIndex> {
        if self.index.is_none() {
            let _span = info_span!("index_calls", path = %self.calls.display()).entered();
            let index = LineIndex::build(&self.calls, None, |line| {
                let sample = line.split('\t').next()?.trim();
                if sample.is_empty() || sample.eq_ignore_ascii_case(HEADER_SAMPLE) {
                    None
                } else {
                    Some(sample.to_string())
                }
            })?;
            self.index = Some(index);
        }
        self.index
            .as_ref()
            .ok_or_else(|| LoadError::protocol("call index missing after build"))
    }
}

impl MetadataAdapter for SequenomLoader {
    fn read_markers(&mut self) -> Result<MarkerSet> {
        let _span = info_span!("read_sequenom_annotation", path = %self.annotation.display()).entered();
        let name = display(&self.annotation);
        let mut records = Vec::new();
        for_each_line(&self.annotation, |line_num, line| {
            let fields = split_ws(line);
            if fields.len() < 3 {
                return Err(LoadError::parse(name.as_str(), line_num, "expected 'id chromosome position'"));
            }
            let id = normalize_assay_id(fields[0]);
            records.push(MarkerRecord::new(id, None, fields[1], parse_position(fields[2])));
            Ok(())
        })?;
        Ok(MarkerSet::from_records(records))
    }
}

impl SampleRowReader for SequenomLoader {
    fn read_sample(&mut self, _sample: SampleIdx, sample_id: &str, markers: &MarkerSet) -> Result<Vec<Genotype>> {
        let name = display(&self.calls);
        let mut row = vec![MISSING; markers.len()];
        for line in self.index()?.read_lines(sample_id)? {
            let fields = split_tab(&line);
            if fields.len() < 3 {
                return Err(LoadError::invalid_data(format!(
                    "{}: expected SAMPLE_ID, ASSAY_ID and GENOTYPE in '{}'",
                    name, line
                )));
            }
            if let Some(idx) = markers.index_of(&normalize_assay_id(fields[1])) {
                row[idx.as_usize()] = genotype_from_call(fields[2], "");
            }
        }
        Ok(row)
    }
}

impl GenotypeAdapter for SequenomLoader {
    fn mode(&self) -> AlleleMode {
        AlleleMode::BySample
    }

    fn discover_samples(&mut self) -> Result<DiscoveredSamples> {
        Ok(DiscoveredSamples::from_ids(self.index()?.keys().iter().cloned()))
    }

    fn stream(&mut self, ctx: &mut StreamContext<'_>) -> Result<()> {
        let _span = info_span!("stream_sequenom", path = %self.calls.display()).entered();
        self.index()?;
        stream_by_sample(self, ctx)
    }
}
