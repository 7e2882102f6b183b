//! Sample information files.
//!
//! Tab separated, `#` comments, optional header row whose first field is
//! `FamilyID`. Columns: family, sample, father, mother, sex, affection,
//! category, disease, population, age. Only the first two are required.

use std::collections::HashMap;
use std::path::Path;

use tracing::warn;

use crate::data::sample::{Affection, SampleInfo, Sex};
use crate::error::{LoadError, Result};
use crate::utils::text::{display, open_text};

pub fn read_sample_infos(path: &Path) -> Result<Vec<SampleInfo>> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .delimiter(b'\t')
        .comment(Some(b'#'))
        .flexible(true)
        .from_reader(open_text(path)?);

    let mut infos = Vec::new();
    for (i, record) in reader.records().enumerate() {
        let record = record.map_err(|e| LoadError::parse(display(path), i + 1, e.to_string()))?;
        let field = |n: usize| record.get(n).map(str::trim).unwrap_or("");
        if field(0).eq_ignore_ascii_case("FamilyID") {
            continue;
        }
        if record.len() == 1 && field(0).is_empty() {
            continue;
        }
        if record.len() < 2 || field(1).is_empty() {
            return Err(LoadError::parse(
                display(path),
                i + 1,
                "expected at least family and sample id columns",
            ));
        }
        let or_zero = |s: &str| if s.is_empty() { "0".to_string() } else { s.to_string() };
        infos.push(SampleInfo {
            family_id: or_zero(field(0)),
            sample_id: field(1).to_string(),
            father_id: or_zero(field(2)),
            mother_id: or_zero(field(3)),
            sex: Sex::parse(field(4)),
            affection: Affection::parse(field(5)),
            category: field(6).to_string(),
            disease: field(7).to_string(),
            population: field(8).to_string(),
            age: field(9).parse().unwrap_or(0),
        });
    }
    Ok(infos)
}

/// Align sample infos to the samples discovered in the genotype input.
///
/// Genotype order wins; discovered samples without an info row keep their
/// discovered info, and info rows for unknown samples are ignored.
pub fn align_sample_infos(discovered: &[SampleInfo], infos: Vec<SampleInfo>) -> Vec<SampleInfo> {
    let mut by_id: HashMap<String, SampleInfo> = HashMap::with_capacity(infos.len());
    for info in infos {
        by_id.entry(info.sample_id.clone()).or_insert(info);
    }
    let mut missing = 0usize;
    let aligned = discovered
        .iter()
        .map(|d| match by_id.remove(&d.sample_id) {
            Some(info) => info,
            None => {
                missing += 1;
                d.clone()
            }
        })
        .collect();
    if missing > 0 {
        warn!(missing, "samples without a sample-info row");
    }
    if !by_id.is_empty() {
        warn!(unused = by_id.len(), "sample-info rows without genotypes ignored");
    }
    aligned
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_with_header_and_comments() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("samples.txt");
        std::fs::write(
            &path,
            "# exported\nFamilyID\tSampleID\tFatherID\tMotherID\tSex\tAffection\tCategory\tDisease\tPopulation\tAge\n\
             F1\tS1\t0\t0\t1\t2\tcase\tT2D\tCEU\t54\n\
             F2\tS2\n",
        )
        .unwrap();
        let infos = read_sample_infos(&path).unwrap();
        assert_eq!(infos.len(), 2);
        assert_eq!(infos[0].sex, Sex::Male);
        assert_eq!(infos[0].affection, Affection::parse("2"));
        assert_eq!(infos[0].population, "CEU");
        assert_eq!(infos[0].age, 54);
        assert_eq!(infos[1].sample_id, "S2");
        assert_eq!(infos[1].father_id, "0");
    }

    #[test]
    fn test_single_column_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.txt");
        std::fs::write(&path, "F1\n").unwrap();
        assert!(matches!(read_sample_infos(&path), Err(LoadError::Parse { .. })));
    }

    #[test]
    fn test_align_keeps_genotype_order() {
        let discovered = vec![SampleInfo::dummy("b"), SampleInfo::dummy("a"), SampleInfo::dummy("c")];
        let mut a = SampleInfo::dummy("a");
        a.population = "YRI".to_string();
        let aligned = align_sample_infos(&discovered, vec![a, SampleInfo::dummy("z")]);
        let ids: Vec<&str> = aligned.iter().map(|i| i.sample_id.as_str()).collect();
        assert_eq!(ids, vec!["b", "a", "c"]);
        assert_eq!(aligned[1].population, "YRI");
    }
}
