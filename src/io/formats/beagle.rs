//! # Beagle Adapter
//!
//! Markers file: `[M] id position allele1 allele2` per line, no chromosome; the
//! chromosome comes from the load configuration. Genotype file: an `I id`
//! header listing each sample twice (one column per allele), optional `A`
//! lines, then `M id a a a a ...` marker rows. `0`, `?` and `.` are missing
//! alleles.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use tracing::info_span;

use super::{stream_by_sample, DiscoveredSamples, GenotypeAdapter, MetadataAdapter, SampleRowReader, StreamContext};
use crate::config::LoadConfig;
use crate::data::genotype::{genotype_from_tokens, AlleleMode, Genotype, MISSING};
use crate::data::marker::{parse_position, MarkerRecord, MarkerSet};
use crate::data::sample::SampleIdx;
use crate::error::{LoadError, Result};
use crate::utils::text::{display, for_each_line, split_ws};

/// Sample ids from the `I` header; each id spans two allele columns
fn read_sample_ids(path: &Path) -> Result<Vec<String>> {
    let mut ids: Option<Vec<String>> = None;
    let name = display(path);
    for_each_line(path, |line_num, line| {
        if ids.is_some() {
            return Ok(());
        }
        let fields = split_ws(line);
        if fields.first() != Some(&"I") {
            return Ok(());
        }
        let columns = &fields[2.min(fields.len())..];
        if columns.len() % 2 != 0 {
            return Err(LoadError::parse(
                name.as_str(),
                line_num,
                "sample header must list every sample twice",
            ));
        }
        ids = Some(columns.chunks(2).map(|pair| pair[0].to_string()).collect());
        Ok(())
    })?;
    ids.ok_or_else(|| LoadError::format(format!("{} has no 'I' sample header line", name)))
}

pub struct BeagleLoader {
    markers_file: PathBuf,
    genotypes: PathBuf,
    chromosome: String,
}

impl BeagleLoader {
    pub fn new(config: &LoadConfig) -> Result<Self> {
        let markers_file = config
            .annotation
            .clone()
            .ok_or_else(|| LoadError::config("beagle needs a markers file (--annotation)"))?;
        let chromosome = config
            .chromosome
            .clone()
            .ok_or_else(|| LoadError::config("beagle needs --chromosome"))?;
        Ok(Self {
            markers_file,
            genotypes: config.primary_genotypes()?.to_path_buf(),
            chromosome,
        })
    }
}

impl MetadataAdapter for BeagleLoader {
    fn read_markers(&mut self) -> Result<MarkerSet> {
        let _span = info_span!("read_beagle_markers", path = %self.markers_file.display()).entered();
        let name = display(&self.markers_file);
        let mut records = Vec::new();
        for_each_line(&self.markers_file, |line_num, line| {
            let mut fields = split_ws(line);
            if fields.first() == Some(&"M") {
                fields.remove(0);
            }
            if fields.len() < 2 {
                return Err(LoadError::parse(name.as_str(), line_num, "expected '[M] id position [allele1 allele2]'"));
            }
            let mut record =
                MarkerRecord::new(fields[0], Some(fields[0]), &self.chromosome, parse_position(fields[1]));
            if fields.len() >= 4 {
                record = record.with_alleles(fields[2], fields[3]);
            }
            records.push(record);
            Ok(())
        })?;
        Ok(MarkerSet::from_records(records))
    }
}

impl SampleRowReader for BeagleLoader {
    fn read_sample(&mut self, sample: SampleIdx, _sample_id: &str, markers: &MarkerSet) -> Result<Vec<Genotype>> {
        let name = display(&self.genotypes);
        let first = 2 + 2 * sample.as_usize();
        let mut row = vec![MISSING; markers.len()];
        let mut seen = HashSet::new();
        for_each_line(&self.genotypes, |line_num, line| {
            let fields = split_ws(line);
            if fields.first() != Some(&"M") || fields.len() < 2 {
                return Ok(());
            }
            if fields.len() < first + 2 {
                return Err(LoadError::parse(
                    name.as_str(),
                    line_num,
                    format!("marker row has {} columns, sample needs {}", fields.len(), first + 2),
                ));
            }
            if let Some(idx) = markers.index_of(fields[1]) {
                if seen.insert(idx) {
                    row[idx.as_usize()] = genotype_from_tokens(fields[first], fields[first + 1]);
                }
            }
            Ok(())
        })?;
        Ok(row)
    }
}

impl GenotypeAdapter for BeagleLoader {
    fn mode(&self) -> AlleleMode {
        AlleleMode::BySample
    }

    fn discover_samples(&mut self) -> Result<DiscoveredSamples> {
        Ok(DiscoveredSamples::from_ids(read_sample_ids(&self.genotypes)?))
    }

    fn stream(&mut self, ctx: &mut StreamContext<'_>) -> Result<()> {
        let _span = info_span!("stream_beagle", path = %self.genotypes.display()).entered();
        stream_by_sample(self, ctx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::marker::MarkerIdx;

    fn loader(dir: &Path) -> BeagleLoader {
        let markers_file = dir.join("x.markers");
        std::fs::write(&markers_file, "rs2 2000 C T\nM rs1 1000 A G\nrs3 3000\n").unwrap();
        let genotypes = dir.join("x.bgl");
        std::fs::write(
            &genotypes,
            "I id S1 S1 S2 S2\nA disease 1 1 2 2\nM rs1 A G G G\nM rs2 C C ? T\nM rs9 A A A A\n",
        )
        .unwrap();
        BeagleLoader {
            markers_file,
            genotypes,
            chromosome: "chr7".to_string(),
        }
    }

    #[test]
    fn test_markers_take_configured_chromosome() {
        let dir = tempfile::tempdir().unwrap();
        let markers = loader(dir.path()).read_markers().unwrap();
        let ids: Vec<&str> = markers.iter().map(|r| r.marker_id.as_str()).collect();
        assert_eq!(ids, vec!["rs1", "rs2", "rs3"]);
        assert!(markers.iter().all(|r| r.chromosome == "7"));
        assert_eq!(markers[MarkerIdx::new(1)].alleles, Some(*b"CT"));
        assert_eq!(markers[MarkerIdx::new(2)].alleles, None);
    }

    #[test]
    fn test_sample_rows() {
        let dir = tempfile::tempdir().unwrap();
        let mut l = loader(dir.path());
        let markers = l.read_markers().unwrap();
        let samples = l.discover_samples().unwrap();
        assert_eq!(samples.ids().collect::<Vec<_>>(), vec!["S1", "S2"]);
        let s1 = l.read_sample(SampleIdx::new(0), "S1", &markers).unwrap();
        assert_eq!(s1, vec![*b"AG", *b"CC", MISSING]);
        let s2 = l.read_sample(SampleIdx::new(1), "S2", &markers).unwrap();
        assert_eq!(s2, vec![*b"GG", MISSING, MISSING]);
    }

    #[test]
    fn test_missing_header() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("x.bgl");
        std::fs::write(&path, "M rs1 A A\n").unwrap();
        assert!(matches!(read_sample_ids(&path), Err(LoadError::Format { .. })));
    }
}
