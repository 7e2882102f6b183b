//! End-to-end loads for every supported source format.
//!
//! Each test writes a small dataset into a temp directory, runs the full
//! pipeline into an in-memory registry, and reads the sealed container back.

use std::fs;
use std::path::{Path, PathBuf};

use genomatrix::data::marker::Strand;
use genomatrix::{
    GenotypeEncoding, InMemoryRegistry, LoadConfig, LoadOutcome, LoadPipeline, MarkerIdx, MatrixReader,
    SampleIdx, SourceFormat, StrandPolicy, MISSING,
};

// =============================================================================
// Helpers
// =============================================================================

fn write(dir: &Path, name: &str, text: &str) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, text).unwrap();
    path
}

fn run(config: LoadConfig) -> (LoadOutcome, InMemoryRegistry) {
    let mut registry = InMemoryRegistry::new();
    let outcome = LoadPipeline::new(config, None)
        .run(&mut registry)
        .expect("load should succeed");
    (outcome, registry)
}

fn open(outcome: &LoadOutcome) -> MatrixReader {
    MatrixReader::open(&outcome.artifact.path).expect("container should be sealed")
}

fn row(reader: &MatrixReader, sample: u32) -> Vec<[u8; 2]> {
    (0..reader.n_markers())
        .map(|m| reader.genotype(SampleIdx::new(sample), MarkerIdx::new(m as u32)).unwrap())
        .collect()
}

fn marker_ids(reader: &MatrixReader) -> Vec<String> {
    reader.marker_ids().unwrap()
}

// =============================================================================
// PLINK
// =============================================================================

#[test]
fn test_plink_flat_sorted_and_registered() {
    let dir = tempfile::tempdir().unwrap();
    let ped = write(
        dir.path(),
        "study.ped",
        "F1 S1 0 0 1 1 A G C C T T\nF2 S2 0 0 2 2 0 0 C T T T\n",
    );
    write(dir.path(), "study.map", "1 rs2 0 200\n1 rs1 0 100\nX rs3 0 5\n");
    let out = dir.path().join("out");
    let config = LoadConfig::new(SourceFormat::PlinkFlat, vec![ped], &out);

    let (outcome, registry) = run(config);
    assert_eq!(registry.len(), 1);
    assert_eq!(registry.entries()[0].0, outcome.id.unwrap());
    assert_eq!(outcome.artifact.path, out.join("plink_matrix.gtm"));
    assert!(outcome.artifact.skipped.is_empty());

    let reader = open(&outcome);
    assert_eq!(reader.sample_ids().unwrap(), vec!["S1", "S2"]);
    assert_eq!(marker_ids(&reader), vec!["rs1", "rs2", "rs3"]);
    assert_eq!(reader.positions().unwrap(), vec![100, 200, 5]);
    assert_eq!(row(&reader, 0), vec![*b"CC", *b"AG", *b"TT"]);
    assert_eq!(row(&reader, 1), vec![*b"CT", MISSING, *b"TT"]);
    assert_eq!(reader.encoding().unwrap(), GenotypeEncoding::Acgt0);

    let chromosomes = reader.chromosome_summary().unwrap();
    assert_eq!(chromosomes.labels().collect::<Vec<_>>(), vec!["1", "X"]);
    let chr1 = chromosomes.get("1").unwrap();
    assert_eq!((chr1.marker_count, chr1.min_position, chr1.max_position, chr1.first_marker), (2, 100, 200, 0));
    let chr_x = chromosomes.get("X").unwrap();
    assert_eq!((chr_x.marker_count, chr_x.first_marker), (1, 2));

    assert_eq!(outcome.keys.samples, vec!["S1", "S2"]);
    let key_ids: Vec<&str> = outcome.keys.markers.iter().map(|k| k.marker_id.as_str()).collect();
    assert_eq!(key_ids, vec!["rs1", "rs2", "rs3"]);
}

#[test]
fn test_plink_binary_reference_byte() {
    let dir = tempfile::tempdir().unwrap();
    // File order rs1, rs0; canonical order rs0, rs1
    write(dir.path(), "study.bim", "1\trs1\t0\t100\tA\tG\n1\trs0\t0\t50\tC\tT\n");
    write(
        dir.path(),
        "study.fam",
        "F S1 0 0 1 2\nF S2 0 0 2 1\nF S3 0 0 1 1\nF S4 0 0 2 2\n",
    );
    let bed = dir.path().join("study.bed");
    fs::write(&bed, [0x6c_u8, 0x1b, 0x01, 0b0110_1100, 0b1111_1111]).unwrap();

    // Budget of one marker row forces a flush per marker
    let config = LoadConfig::new(SourceFormat::PlinkBinary, vec![bed], dir.path().join("out")).with_memory_budget(8);
    let (outcome, _) = run(config);

    let reader = open(&outcome);
    assert_eq!(reader.n_samples(), 4);
    assert_eq!(marker_ids(&reader), vec!["rs0", "rs1"]);
    assert_eq!(reader.marker_column(MarkerIdx::new(0)).unwrap(), vec![*b"TT"; 4]);
    assert_eq!(
        reader.marker_column(MarkerIdx::new(1)).unwrap(),
        vec![*b"AA", *b"GG", *b"AG", MISSING]
    );
    assert_eq!(reader.bases().unwrap(), vec![*b"CT", *b"AG"]);
    assert_eq!(reader.encoding().unwrap(), GenotypeEncoding::Acgt0);
}

#[test]
fn test_memory_budget_does_not_change_output() {
    let dir = tempfile::tempdir().unwrap();
    let mut ped = String::new();
    for s in 0..9 {
        ped.push_str(&format!("F S{} 0 0 1 1", s));
        for m in 0..7 {
            let gt = if (s + m) % 3 == 0 { "A A" } else if (s + m) % 3 == 1 { "A G" } else { "0 0" };
            ped.push(' ');
            ped.push_str(gt);
        }
        ped.push('\n');
    }
    let ped = write(dir.path(), "big.ped", &ped);
    let map: String = (0..7).map(|m| format!("{} rs{} 0 {}\n", 1 + m % 2, m, 1000 - m)).collect();
    write(dir.path(), "big.map", &map);

    let (wide, _) = run(LoadConfig::new(SourceFormat::PlinkFlat, vec![ped.clone()], dir.path().join("a")));
    let (narrow, _) =
        run(LoadConfig::new(SourceFormat::PlinkFlat, vec![ped], dir.path().join("b")).with_memory_budget(1));

    let (wide, narrow) = (open(&wide), open(&narrow));
    assert_eq!(marker_ids(&wide), marker_ids(&narrow));
    for s in 0..9 {
        assert_eq!(row(&wide, s), row(&narrow, s));
    }
}

// =============================================================================
// Affymetrix
// =============================================================================

const AFFY_ANNOTATION: &str = "\
#%chip_type=GenomeWideSNP_6
\"Probe Set ID\",\"dbSNP RS ID\",\"Chromosome\",\"Physical Position\",\"Strand\",\"ChrX pseudo-autosomal region 1\",\"ChrX pseudo-autosomal region 2\",\"Allele A\",\"Allele B\",\"In Final List\"
\"SNP_A-2\",\"rs2\",\"2\",\"20\",\"+\",\"0\",\"0\",\"C\",\"T\",\"YES\"
\"SNP_A-1\",\"rs1\",\"1\",\"10\",\"-\",\"0\",\"0\",\"A\",\"G\",\"YES\"
\"SNP_A-3\",\"rs3\",\"1\",\"30\",\"+\",\"0\",\"0\",\"A\",\"C\",\"YES\"
";

#[test]
fn test_affymetrix_missing_call_file_is_skipped() {
    let dir = tempfile::tempdir().unwrap();
    let annotation = write(dir.path(), "annot.csv", AFFY_ANNOTATION);
    let na1 = write(
        dir.path(),
        "NA001.birdseed.txt",
        "probeset_id\tNA001\nSNP_A-1\tAA\nSNP_A-2\tAB\nSNP_A-3\tBB\n",
    );
    let na2 = dir.path().join("NA002.birdseed.txt");
    let na3 = write(
        dir.path(),
        "NA003.birdseed.txt",
        "probeset_id\tNA003\nSNP_A-1\t1\nSNP_A-2\t-1\nSNP_A-3\t0\n",
    );

    let config = LoadConfig::new(SourceFormat::Affymetrix, vec![na1, na2, na3], dir.path().join("out"))
        .with_annotation(annotation);
    let (outcome, registry) = run(config);
    assert_eq!(registry.len(), 1);
    assert_eq!(outcome.artifact.n_samples, 3);
    assert_eq!(outcome.artifact.skipped.len(), 1);
    assert_eq!(outcome.artifact.skipped[0].sample_id, "NA002");

    let reader = open(&outcome);
    assert_eq!(reader.sample_ids().unwrap(), vec!["NA001", "NA002", "NA003"]);
    assert_eq!(marker_ids(&reader), vec!["SNP_A-1", "SNP_A-3", "SNP_A-2"]);
    assert_eq!(row(&reader, 0), vec![*b"AA", *b"BB", *b"AB"]);
    assert_eq!(row(&reader, 1), vec![MISSING; 3]);
    assert_eq!(row(&reader, 2), vec![*b"AB", *b"AA", MISSING]);
    assert_eq!(reader.encoding().unwrap(), GenotypeEncoding::Ab0);
    assert_eq!(reader.strands().unwrap()[0], Strand::Minus);
}

// =============================================================================
// Hapmap
// =============================================================================

const HAPMAP_META: &str = "rs# alleles chrom pos strand assembly# center protLSID assayLSID panelLSID QCcode";

#[test]
fn test_hapmap_files_are_merged() {
    let dir = tempfile::tempdir().unwrap();
    let chr2 = write(
        dir.path(),
        "chr2.txt",
        &format!("{} NA1 NA2\nrs20 A/G chr2 500 + ncbi_b36 x x x x QC+ AG GG\n", HAPMAP_META),
    );
    let chr1 = write(
        dir.path(),
        "chr1.txt",
        &format!(
            "{} NA2 NA3\nrs11 C/T chr1 900 - ncbi_b36 x x x x QC+ CC NN\nrs10 A/C chr1 100 + ncbi_b36 x x x x QC+ AC AA\n",
            HAPMAP_META
        ),
    );
    let sample_info = write(
        dir.path(),
        "samples.tsv",
        "FamilyID\tSampleID\n1\tNA3\t0\t0\t2\t1\t\t\tYRI\n",
    );

    let config = LoadConfig::new(SourceFormat::Hapmap, vec![chr2, chr1], dir.path().join("out"))
        .with_sample_info(sample_info);
    let (outcome, _) = run(config);

    let reader = open(&outcome);
    assert_eq!(reader.sample_ids().unwrap(), vec!["NA1", "NA2", "NA3"]);
    assert_eq!(marker_ids(&reader), vec!["rs10", "rs11", "rs20"]);
    assert_eq!(reader.chromosomes().unwrap(), vec!["1", "1", "2"]);
    assert_eq!(row(&reader, 0), vec![MISSING, MISSING, *b"AG"]);
    assert_eq!(row(&reader, 1), vec![*b"AC", *b"CC", *b"GG"]);
    assert_eq!(row(&reader, 2), vec![*b"AA", MISSING, MISSING]);
    assert_eq!(
        reader.strands().unwrap(),
        vec![Strand::Plus, Strand::Minus, Strand::Plus]
    );
}

// =============================================================================
// Beagle, HGDP1, Illumina, Sequenom
// =============================================================================

#[test]
fn test_beagle_uses_configured_chromosome() {
    let dir = tempfile::tempdir().unwrap();
    let markers = write(dir.path(), "x.markers", "rs2 2000 C T\nrs1 1000 A G\n");
    let bgl = write(
        dir.path(),
        "x.bgl",
        "I id S1 S1 S2 S2\nA disease 1 1 2 2\nM rs1 A G G G\nM rs2 C C ? T\n",
    );
    let mut config = LoadConfig::new(SourceFormat::Beagle, vec![bgl], dir.path().join("out")).with_annotation(markers);
    config.chromosome = Some("chr7".to_string());
    let (outcome, _) = run(config);

    let reader = open(&outcome);
    assert_eq!(reader.chromosomes().unwrap(), vec!["7", "7"]);
    assert_eq!(row(&reader, 0), vec![*b"AG", *b"CC"]);
    assert_eq!(row(&reader, 1), vec![*b"GG", MISSING]);
}

#[test]
fn test_hgdp1_matrix() {
    let dir = tempfile::tempdir().unwrap();
    let map = write(dir.path(), "hgdp.map", "rs2\t1\t200\nrs1\t1\t100\nrs3\tX\t5\n");
    let genotypes = write(
        dir.path(),
        "hgdp.txt",
        "\tHGDP00001\tHGDP00002\nrs1\tAG\t--\nrs2\tCC\tCT\nrs3\tAA\tAA\n",
    );
    let config = LoadConfig::new(SourceFormat::Hgdp1, vec![genotypes], dir.path().join("out")).with_annotation(map);
    let (outcome, _) = run(config);

    let reader = open(&outcome);
    assert_eq!(reader.sample_ids().unwrap(), vec!["HGDP00001", "HGDP00002"]);
    assert_eq!(row(&reader, 0), vec![*b"AG", *b"CC", *b"AA"]);
    assert_eq!(row(&reader, 1), vec![MISSING, *b"CT", *b"AA"]);
}

#[test]
fn test_hgdp1_space_separated() {
    let dir = tempfile::tempdir().unwrap();
    let map = write(dir.path(), "hgdp.map", "rs2 1 200\nrs1 1 100\n");
    let genotypes = write(dir.path(), "hgdp.txt", "snp HGDP00001 HGDP00002\nrs1 AG --\nrs2 CC  CT\n");
    let config = LoadConfig::new(SourceFormat::Hgdp1, vec![genotypes], dir.path().join("out")).with_annotation(map);
    let (outcome, _) = run(config);
    assert!(outcome.artifact.skipped.is_empty());

    let reader = open(&outcome);
    assert_eq!(reader.sample_ids().unwrap(), vec!["HGDP00001", "HGDP00002"]);
    assert_eq!(row(&reader, 0), vec![*b"AG", *b"CC"]);
    assert_eq!(row(&reader, 1), vec![MISSING, *b"CT"]);
}

#[test]
fn test_illumina_report() {
    let dir = tempfile::tempdir().unwrap();
    let map = write(dir.path(), "x.map", "1 rs2 0 200\n1 rs1 0 100\n");
    let report = write(
        dir.path(),
        "report.txt",
        "[Header]\nGSGT Version\t1.9\n[Data]\nSNP Name\tSample ID\tAllele1 - Forward\tAllele2 - Forward\n\
         rs1\tS1\tA\tG\nrs1\tS2\t-\t-\nrs2\tS1\tC\tC\nrs2\tS2\tC\tT\n",
    );
    let config =
        LoadConfig::new(SourceFormat::IlluminaLgen, vec![report], dir.path().join("out")).with_annotation(map);
    let (outcome, _) = run(config);

    let reader = open(&outcome);
    assert_eq!(reader.sample_ids().unwrap(), vec!["S1", "S2"]);
    assert_eq!(row(&reader, 0), vec![*b"AG", *b"CC"]);
    assert_eq!(row(&reader, 1), vec![MISSING, *b"CT"]);
}

#[test]
fn test_sequenom_calls() {
    let dir = tempfile::tempdir().unwrap();
    let annotation = write(dir.path(), "assays.txt", "200\t2\t50\n100\t1\t10\n");
    let calls = write(
        dir.path(),
        "calls.txt",
        "SAMPLE_ID\tASSAY_ID\tGENOTYPE\nP1\t100\tA\nP2\t100\tAG\nP1\t200\tCT\n",
    );
    let config =
        LoadConfig::new(SourceFormat::Sequenom, vec![calls], dir.path().join("out")).with_annotation(annotation);
    let (outcome, _) = run(config);

    let reader = open(&outcome);
    assert_eq!(marker_ids(&reader), vec!["rs100", "rs200"]);
    assert_eq!(row(&reader, 0), vec![*b"AA", *b"CT"]);
    assert_eq!(row(&reader, 1), vec![*b"AG", MISSING]);
}

// =============================================================================
// Native re-load
// =============================================================================

#[test]
fn test_native_reload_with_matrix_wide_strand() {
    let dir = tempfile::tempdir().unwrap();
    let ped = write(dir.path(), "s.ped", "F A 0 0 1 1 A G C C\nF B 0 0 2 2 G G 0 0\n");
    write(dir.path(), "s.map", "2 m2 0 10\n1 m1 0 10\n");
    let out = dir.path().join("out");
    let (first, _) = run(LoadConfig::new(SourceFormat::PlinkFlat, vec![ped], &out));

    let mut config = LoadConfig::new(SourceFormat::Native, vec![first.artifact.path.clone()], &out)
        .with_strand(StrandPolicy::MatrixWide(Strand::Fwd));
    config.name = "plink_matrix".to_string();
    let (second, _) = run(config);
    assert_eq!(second.artifact.path, out.join("plink_matrix_2.gtm"));

    let (a, b) = (open(&first), open(&second));
    assert_eq!(marker_ids(&a), marker_ids(&b));
    assert_eq!(a.sample_ids().unwrap(), b.sample_ids().unwrap());
    for s in 0..2 {
        assert_eq!(row(&a, s), row(&b, s));
    }
    assert!(b.strand_is_matrix_wide());
    assert_eq!(b.strands().unwrap(), vec![Strand::Fwd; 2]);
    assert_eq!(b.encoding().unwrap(), GenotypeEncoding::Acgt0);
}

// =============================================================================
// Dry run and encoding hint
// =============================================================================

#[test]
fn test_dry_run_writes_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let ped = write(dir.path(), "d.ped", "F S1 0 0 1 1 1 2\n");
    write(dir.path(), "d.map", "1 rs1 0 100\n");
    let out = dir.path().join("out");

    let outcome = LoadPipeline::new(LoadConfig::new(SourceFormat::PlinkFlat, vec![ped], &out), None)
        .dry_run()
        .unwrap();
    assert!(outcome.id.is_none());
    assert_eq!(outcome.artifact.encoding, GenotypeEncoding::O12);
    assert_eq!(outcome.keys.samples, vec!["S1"]);
    assert!(!outcome.artifact.path.exists());
}

#[test]
fn test_encoding_hint_used_when_nothing_observed() {
    let dir = tempfile::tempdir().unwrap();
    let ped = write(dir.path(), "h.ped", "F S1 0 0 1 1 0 0\nF S2 0 0 1 1 0 0\n");
    write(dir.path(), "h.map", "1 rs1 0 100\n");
    let mut config = LoadConfig::new(SourceFormat::PlinkFlat, vec![ped], dir.path().join("out"));
    config.encoding_hint = Some(GenotypeEncoding::O1234);
    let (outcome, _) = run(config);

    assert_eq!(outcome.artifact.encoding, GenotypeEncoding::O1234);
    assert_eq!(open(&outcome).encoding().unwrap(), GenotypeEncoding::O1234);
}
