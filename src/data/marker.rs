//! # Marker Definitions
//!
//! Marker records, their canonical ordering, and the sorted marker set every
//! format adapter produces.
//!
//! ## Canonical Order
//! Markers sort by `(chromosome, pseudo-autosomal flags, position, marker id)`:
//! - numeric chromosome labels compare numerically and come before all
//!   non-numeric labels, which compare lexically
//! - pseudo-autosomal flags compare lexically as a concatenated pair
//! - positions compare numerically, marker ids lexically
//!
//! The order is strict and total as long as marker ids are unique, which
//! `MarkerSet` enforces by dropping repeated ids before sorting.

use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};
use std::fmt;

use serde::{Deserialize, Serialize};

/// Separator of the delimited key form `chr;[pseudoA;pseudoB;]pos;markerId`
pub const KEY_SEPARATOR: char = ';';

/// Zero-cost newtype for marker indices into a sorted `MarkerSet`
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub struct MarkerIdx(pub u32);

impl MarkerIdx {
    pub fn new(idx: u32) -> Self {
        Self(idx)
    }

    pub fn as_usize(self) -> usize {
        self.0 as usize
    }
}

impl From<usize> for MarkerIdx {
    fn from(idx: usize) -> Self {
        Self(idx as u32)
    }
}

impl From<MarkerIdx> for usize {
    fn from(idx: MarkerIdx) -> usize {
        idx.0 as usize
    }
}

/// Strand orientation of a marker's alleles
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Strand {
    Plus,
    Minus,
    Fwd,
    Rev,
    #[default]
    Unknown,
}

impl Strand {
    /// Fixed-width label stored in the container (at most 3 bytes)
    pub fn as_str(self) -> &'static str {
        match self {
            Strand::Plus => "+",
            Strand::Minus => "-",
            Strand::Fwd => "FWD",
            Strand::Rev => "REV",
            Strand::Unknown => "UNK",
        }
    }

    /// Lenient parse; anything unrecognised is `Unknown`
    pub fn parse(s: &str) -> Self {
        match s.trim().to_ascii_uppercase().as_str() {
            "+" | "PLUS" => Strand::Plus,
            "-" | "MINUS" => Strand::Minus,
            "FWD" | "FORWARD" | "F" => Strand::Fwd,
            "REV" | "REVERSE" | "R" => Strand::Rev,
            _ => Strand::Unknown,
        }
    }
}

impl fmt::Display for Strand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Canonicalise a chromosome label.
///
/// Strips a `chr` prefix, maps PLINK codes 23-26 to X/Y/XY/MT, `M` to `MT`,
/// and drops leading zeros from numeric labels. Empty or `---` becomes `0`.
pub fn canonical_chromosome(raw: &str) -> String {
    let trimmed = raw.trim().trim_matches('"');
    let stripped = match (trimmed.get(..3), trimmed.get(3..)) {
        (Some(prefix), Some(rest)) if !rest.is_empty() && prefix.eq_ignore_ascii_case("chr") => rest,
        _ => trimmed,
    };

    if stripped.is_empty() || stripped == "---" {
        return "0".to_string();
    }

    if let Ok(n) = stripped.parse::<u32>() {
        return match n {
            23 => "X".to_string(),
            24 => "Y".to_string(),
            25 => "XY".to_string(),
            26 => "MT".to_string(),
            _ => n.to_string(),
        };
    }

    let upper = stripped.to_ascii_uppercase();
    match upper.as_str() {
        "M" => "MT".to_string(),
        _ => upper,
    }
}

/// Parse a position field, defaulting to 0 when unparsable
pub fn parse_position(raw: &str) -> i32 {
    raw.trim().trim_matches('"').parse::<i32>().unwrap_or(0)
}

/// Borrowed view of the ordering fields of a marker
#[derive(Clone, Copy, Debug)]
pub struct KeyParts<'a> {
    pub chromosome: &'a str,
    pub pseudo_autosomal: Option<(&'a str, &'a str)>,
    pub position: i32,
    pub marker_id: &'a str,
}

fn compare_chromosomes(a: &str, b: &str) -> Ordering {
    match (a.parse::<u64>(), b.parse::<u64>()) {
        (Ok(x), Ok(y)) => x.cmp(&y).then_with(|| a.cmp(b)),
        (Ok(_), Err(_)) => Ordering::Less,
        (Err(_), Ok(_)) => Ordering::Greater,
        (Err(_), Err(_)) => a.cmp(b),
    }
}

fn compare_pseudo(a: Option<(&str, &str)>, b: Option<(&str, &str)>) -> Ordering {
    match (a, b) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Less,
        (Some(_), None) => Ordering::Greater,
        (Some((a1, a2)), Some((b1, b2))) => a1
            .bytes()
            .chain(a2.bytes())
            .cmp(b1.bytes().chain(b2.bytes()))
            .then_with(|| (a1, a2).cmp(&(b1, b2))),
    }
}

/// The canonical marker comparator
pub fn canonical_cmp(a: KeyParts<'_>, b: KeyParts<'_>) -> Ordering {
    compare_chromosomes(a.chromosome, b.chromosome)
        .then_with(|| compare_pseudo(a.pseudo_autosomal, b.pseudo_autosomal))
        .then_with(|| a.position.cmp(&b.position))
        .then_with(|| a.marker_id.cmp(b.marker_id))
}

/// Owned composite sort key
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MarkerKey {
    pub chromosome: String,
    pub pseudo_autosomal: Option<(String, String)>,
    pub position: i32,
    pub marker_id: String,
}

impl MarkerKey {
    pub fn new(chromosome: impl Into<String>, position: i32, marker_id: impl Into<String>) -> Self {
        Self {
            chromosome: chromosome.into(),
            pseudo_autosomal: None,
            position,
            marker_id: marker_id.into(),
        }
    }

    pub fn parts(&self) -> KeyParts<'_> {
        KeyParts {
            chromosome: &self.chromosome,
            pseudo_autosomal: self
                .pseudo_autosomal
                .as_ref()
                .map(|(a, b)| (a.as_str(), b.as_str())),
            position: self.position,
            marker_id: &self.marker_id,
        }
    }

    /// Parse the delimited form `chr;[pseudoA;pseudoB;]pos;markerId`.
    ///
    /// The marker id is the remainder after the position field, so ids may
    /// themselves contain the separator. An unparsable position becomes 0.
    ///
    /// Five or more fields are read as the pseudo-autosomal form whenever the
    /// fourth field is an integer. A key without flags whose id holds two or
    /// more separators followed by a numeric segment is therefore ambiguous and
    /// reads back with flags.
    pub fn parse_delimited(s: &str) -> Option<Self> {
        let fields: Vec<&str> = s.split(KEY_SEPARATOR).collect();
        let sep = KEY_SEPARATOR.to_string();
        match fields.len() {
            0..=2 => None,
            3 => Some(Self::new(fields[0], parse_position(fields[1]), fields[2])),
            4 => Some(Self::new(fields[0], parse_position(fields[1]), fields[2..].join(&sep))),
            _ if fields[3].trim().parse::<i32>().is_err() => {
                Some(Self::new(fields[0], parse_position(fields[1]), fields[2..].join(&sep)))
            }
            _ => {
                let id = fields[4..].join(&sep);
                Some(Self {
                    chromosome: fields[0].to_string(),
                    pseudo_autosomal: Some((fields[1].to_string(), fields[2].to_string())),
                    position: parse_position(fields[3]),
                    marker_id: id,
                })
            }
        }
    }

    pub fn to_delimited(&self) -> String {
        match &self.pseudo_autosomal {
            Some((a, b)) => format!(
                "{chr}{s}{a}{s}{b}{s}{pos}{s}{id}",
                chr = self.chromosome,
                s = KEY_SEPARATOR,
                pos = self.position,
                id = self.marker_id
            ),
            None => format!(
                "{chr}{s}{pos}{s}{id}",
                chr = self.chromosome,
                s = KEY_SEPARATOR,
                pos = self.position,
                id = self.marker_id
            ),
        }
    }
}

impl Ord for MarkerKey {
    fn cmp(&self, other: &Self) -> Ordering {
        canonical_cmp(self.parts(), other.parts())
    }
}

impl PartialOrd for MarkerKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Compare two delimited keys with standard comparator semantics.
///
/// Keys that fail to parse sort after all parsable keys, lexically among themselves.
pub fn compare_delimited(a: &str, b: &str) -> Ordering {
    match (MarkerKey::parse_delimited(a), MarkerKey::parse_delimited(b)) {
        (Some(x), Some(y)) => x.cmp(&y),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => a.cmp(b),
    }
}

/// A single marker's metadata
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarkerRecord {
    /// Format-native identifier (e.g. an Affymetrix probe id)
    pub marker_id: String,
    /// dbSNP id, or the marker id when the source has none
    pub rs_id: String,
    /// Canonical chromosome label
    pub chromosome: String,
    /// 1-based position, 0 when unknown
    pub position: i32,
    /// Per-marker strand, when the source provides one
    pub strand: Option<Strand>,
    /// Forward-strand allele pair (allele 1, allele 2)
    pub alleles: Option<[u8; 2]>,
    /// Pseudo-autosomal region flags (region 1, region 2)
    pub pseudo_autosomal: Option<(String, String)>,
}

impl MarkerRecord {
    /// Build a record, canonicalising the chromosome and backfilling a missing rsId
    pub fn new(marker_id: impl Into<String>, rs_id: Option<&str>, chromosome: &str, position: i32) -> Self {
        let marker_id = marker_id.into();
        let rs_id = match rs_id.map(str::trim) {
            Some(rs) if !rs.is_empty() && rs != "---" && rs != "." => rs.to_string(),
            _ => marker_id.clone(),
        };
        Self {
            marker_id,
            rs_id,
            chromosome: canonical_chromosome(chromosome),
            position,
            strand: None,
            alleles: None,
            pseudo_autosomal: None,
        }
    }

    pub fn with_strand(mut self, strand: Strand) -> Self {
        self.strand = Some(strand);
        self
    }

    /// Set the allele dictionary from two allele tokens; missing tokens become `0`
    pub fn with_alleles(mut self, allele1: &str, allele2: &str) -> Self {
        self.alleles = Some([allele_byte(allele1), allele_byte(allele2)]);
        self
    }

    pub fn with_pseudo_autosomal(mut self, region1: &str, region2: &str) -> Self {
        self.pseudo_autosomal = Some((region1.trim().to_string(), region2.trim().to_string()));
        self
    }

    pub fn key_parts(&self) -> KeyParts<'_> {
        KeyParts {
            chromosome: &self.chromosome,
            pseudo_autosomal: self
                .pseudo_autosomal
                .as_ref()
                .map(|(a, b)| (a.as_str(), b.as_str())),
            position: self.position,
            marker_id: &self.marker_id,
        }
    }

    pub fn key(&self) -> MarkerKey {
        MarkerKey {
            chromosome: self.chromosome.clone(),
            pseudo_autosomal: self.pseudo_autosomal.clone(),
            position: self.position,
            marker_id: self.marker_id.clone(),
        }
    }
}

/// First byte of an allele token, `0` for empty or missing tokens
pub fn allele_byte(token: &str) -> u8 {
    let token = token.trim().trim_matches('"');
    match token.as_bytes().first() {
        None => b'0',
        Some(b'-') | Some(b'.') | Some(b'?') => b'0',
        Some(&b) => b.to_ascii_uppercase(),
    }
}

/// Sorted, id-unique marker collection
#[derive(Clone, Debug, Default)]
pub struct MarkerSet {
    records: Vec<MarkerRecord>,
    index: HashMap<String, MarkerIdx>,
    dropped_duplicates: usize,
}

impl MarkerSet {
    /// Sort records into canonical order, dropping repeated marker ids.
    ///
    /// The first occurrence of an id (in input order) is kept.
    pub fn from_records(records: Vec<MarkerRecord>) -> Self {
        let mut seen: HashSet<String> = HashSet::with_capacity(records.len());
        let mut unique = Vec::with_capacity(records.len());
        let mut dropped = 0usize;
        for record in records {
            if seen.insert(record.marker_id.clone()) {
                unique.push(record);
            } else {
                dropped += 1;
                tracing::warn!(marker = %record.marker_id, "duplicate marker id dropped");
            }
        }

        unique.sort_by(|a, b| canonical_cmp(a.key_parts(), b.key_parts()));

        let index = unique
            .iter()
            .enumerate()
            .map(|(i, r)| (r.marker_id.clone(), MarkerIdx::from(i)))
            .collect();

        Self {
            records: unique,
            index,
            dropped_duplicates: dropped,
        }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn get(&self, idx: MarkerIdx) -> Option<&MarkerRecord> {
        self.records.get(idx.as_usize())
    }

    pub fn records(&self) -> &[MarkerRecord] {
        &self.records
    }

    pub fn iter(&self) -> std::slice::Iter<'_, MarkerRecord> {
        self.records.iter()
    }

    /// Sorted position of a marker id
    pub fn index_of(&self, marker_id: &str) -> Option<MarkerIdx> {
        self.index.get(marker_id).copied()
    }

    /// Number of records removed because their id repeated
    pub fn dropped_duplicates(&self) -> usize {
        self.dropped_duplicates
    }

    /// Whether any record carries an allele dictionary
    pub fn has_alleles(&self) -> bool {
        self.records.iter().any(|r| r.alleles.is_some())
    }

    /// Whether any record carries a per-marker strand
    pub fn has_strand(&self) -> bool {
        self.records.iter().any(|r| r.strand.is_some())
    }

    /// Check the canonical-order invariant
    pub fn is_sorted(&self) -> bool {
        self.records
            .windows(2)
            .all(|w| canonical_cmp(w[0].key_parts(), w[1].key_parts()) == Ordering::Less)
    }
}

impl std::ops::Index<MarkerIdx> for MarkerSet {
    type Output = MarkerRecord;

    fn index(&self, idx: MarkerIdx) -> &Self::Output {
        &self.records[idx.as_usize()]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rec(id: &str, chr: &str, pos: i32) -> MarkerRecord {
        MarkerRecord::new(id, None, chr, pos)
    }

    #[test]
    fn test_canonical_chromosome() {
        assert_eq!(canonical_chromosome("23"), "X");
        assert_eq!(canonical_chromosome("24"), "Y");
        assert_eq!(canonical_chromosome("25"), "XY");
        assert_eq!(canonical_chromosome("26"), "MT");
        assert_eq!(canonical_chromosome("chr7"), "7");
        assert_eq!(canonical_chromosome("chrX"), "X");
        assert_eq!(canonical_chromosome("07"), "7");
        assert_eq!(canonical_chromosome("M"), "MT");
        assert_eq!(canonical_chromosome("---"), "0");
        assert_eq!(canonical_chromosome("xy"), "XY");
    }

    #[test]
    fn test_canonical_chromosome_non_ascii() {
        // Third byte sits inside a multi-byte character
        assert_eq!(canonical_chromosome("ab€x"), "AB€X");
        assert_eq!(canonical_chromosome("ch€"), "CH€");
        assert_eq!(canonical_chromosome("chr€"), "€");
        assert_eq!(canonical_chromosome("é"), "é");
        assert_eq!(MarkerRecord::new("m1", None, "ab€x", 10).chromosome, "AB€X");
    }

    #[test]
    fn test_numeric_chromosomes_sort_numerically() {
        let a = MarkerKey::new("2", 500, "m1");
        let b = MarkerKey::new("10", 100, "m2");
        assert!(a < b);
    }

    #[test]
    fn test_numeric_before_labels() {
        let labels = ["X", "10", "MT", "9", "1A", "Y", "1"];
        let mut keys: Vec<MarkerKey> = labels
            .iter()
            .enumerate()
            .map(|(i, c)| MarkerKey::new(*c, 1, format!("m{}", i)))
            .collect();
        keys.sort();
        let order: Vec<&str> = keys.iter().map(|k| k.chromosome.as_str()).collect();
        assert_eq!(order, vec!["1", "9", "10", "1A", "MT", "X", "Y"]);
    }

    #[test]
    fn test_tie_breaks_position_then_id() {
        let a = MarkerKey::new("1", 100, "b");
        let b = MarkerKey::new("1", 100, "c");
        let c = MarkerKey::new("1", 99, "z");
        assert!(c < a);
        assert!(a < b);
        assert_ne!(a.cmp(&b), Ordering::Equal);
    }

    #[test]
    fn test_pseudo_autosomal_tie_break() {
        let mut a = MarkerKey::new("X", 100, "a");
        let mut b = MarkerKey::new("X", 50, "b");
        a.pseudo_autosomal = Some(("0".into(), "0".into()));
        b.pseudo_autosomal = Some(("1".into(), "0".into()));
        // Flags outrank position
        assert!(a < b);
    }

    #[test]
    fn test_delimited_round_trip_and_compare() {
        let key = MarkerKey::parse_delimited("X;1;0;2700000;SNP_A-1").unwrap();
        assert_eq!(key.chromosome, "X");
        assert_eq!(key.pseudo_autosomal, Some(("1".into(), "0".into())));
        assert_eq!(key.position, 2_700_000);
        assert_eq!(key.to_delimited(), "X;1;0;2700000;SNP_A-1");

        assert_eq!(compare_delimited("2;500;rs1", "10;1;rs2"), Ordering::Less);
        assert_eq!(compare_delimited("1;abc;rs1", "1;0;rs0"), Ordering::Greater);
        assert_eq!(compare_delimited("1;5;rs1", "1;5;rs1"), Ordering::Equal);
    }

    #[test]
    fn test_delimited_ids_with_separator() {
        let key = MarkerKey::parse_delimited("1;100;AFFX;SNP;7").unwrap();
        assert_eq!(key.pseudo_autosomal, None);
        assert_eq!(key.position, 100);
        assert_eq!(key.marker_id, "AFFX;SNP;7");

        let key = MarkerKey::parse_delimited("1;100;a;b").unwrap();
        assert_eq!(key.marker_id, "a;b");

        // Numeric fourth field reads as the flagged form
        let key = MarkerKey::parse_delimited("1;100;a;7;b").unwrap();
        assert_eq!(key.pseudo_autosomal, Some(("100".into(), "a".into())));
        assert_eq!(key.position, 7);
    }

    #[test]
    fn test_rs_id_backfill() {
        let r = MarkerRecord::new("SNP_A-42", Some("---"), "1", 5);
        assert_eq!(r.rs_id, "SNP_A-42");
        let r = MarkerRecord::new("SNP_A-43", Some("rs99"), "1", 5);
        assert_eq!(r.rs_id, "rs99");
    }

    #[test]
    fn test_parse_position_defaults_to_zero() {
        assert_eq!(parse_position("12345"), 12345);
        assert_eq!(parse_position("---"), 0);
        assert_eq!(parse_position(""), 0);
    }

    #[test]
    fn test_marker_set_sorted_and_idempotent() {
        let records = vec![
            rec("rs5", "X", 5),
            rec("rs3", "10", 1),
            rec("rs1", "2", 300),
            rec("rs2", "2", 100),
            rec("rs4", "MT", 1),
        ];
        let set = MarkerSet::from_records(records);
        assert!(set.is_sorted());
        let ids: Vec<&str> = set.iter().map(|r| r.marker_id.as_str()).collect();
        assert_eq!(ids, vec!["rs2", "rs1", "rs3", "rs4", "rs5"]);

        let again = MarkerSet::from_records(set.records().to_vec());
        assert_eq!(again.records(), set.records());
        assert_eq!(set.index_of("rs3"), Some(MarkerIdx::new(2)));
    }

    #[test]
    fn test_marker_set_drops_duplicates() {
        let records = vec![rec("rs1", "1", 10), rec("rs1", "1", 20), rec("rs2", "1", 5)];
        let set = MarkerSet::from_records(records);
        assert_eq!(set.len(), 2);
        assert_eq!(set.dropped_duplicates(), 1);
        assert_eq!(set[set.index_of("rs1").unwrap()].position, 10);
    }

    #[test]
    fn test_allele_byte() {
        assert_eq!(allele_byte("a"), b'A');
        assert_eq!(allele_byte("-"), b'0');
        assert_eq!(allele_byte(""), b'0');
        assert_eq!(allele_byte("GT"), b'G');
    }
}
