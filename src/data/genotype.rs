//! # Genotypes and Encoding Inference
//!
//! A genotype cell is two allele bytes. `MISSING` (`"00"`) marks cells that
//! were never observed or failed to parse.
//!
//! `EncodingDetector` classifies the allele alphabet from the set of distinct
//! byte values seen so far. Classification depends only on that set, so it is
//! order-independent and can be re-run at any time.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Two allele bytes
pub type Genotype = [u8; 2];

/// Missing / not-observed genotype sentinel
pub const MISSING: Genotype = *b"00";

/// The missing allele byte
pub const MISSING_ALLELE: u8 = b'0';

/// Genotype alphabet of a matrix
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum GenotypeEncoding {
    /// A/B calls (Affymetrix style)
    Ab0,
    /// Nucleotide letters
    Acgt0,
    /// Numeric 1-4 nucleotide codes
    O1234,
    /// Numeric 1/2 minor/major codes
    O12,
    #[default]
    Unknown,
}

impl GenotypeEncoding {
    /// Tag stored in the container (at most 8 bytes)
    pub fn as_tag(self) -> &'static str {
        match self {
            GenotypeEncoding::Ab0 => "AB0",
            GenotypeEncoding::Acgt0 => "ACGT0",
            GenotypeEncoding::O1234 => "O1234",
            GenotypeEncoding::O12 => "O12",
            GenotypeEncoding::Unknown => "UNKNOWN",
        }
    }

    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag.trim().to_ascii_uppercase().as_str() {
            "AB0" | "AB" => Some(GenotypeEncoding::Ab0),
            "ACGT0" | "ACGT" => Some(GenotypeEncoding::Acgt0),
            "O1234" | "1234" => Some(GenotypeEncoding::O1234),
            "O12" | "12" => Some(GenotypeEncoding::O12),
            "UNKNOWN" => Some(GenotypeEncoding::Unknown),
            _ => None,
        }
    }
}

impl fmt::Display for GenotypeEncoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_tag())
    }
}

/// Addressing mode for streamed genotype rows
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AlleleMode {
    /// One row per sample, covering every marker
    BySample,
    /// One row per marker, covering every sample
    ByMarker,
}

impl fmt::Display for AlleleMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AlleleMode::BySample => f.write_str("by-sample"),
            AlleleMode::ByMarker => f.write_str("by-marker"),
        }
    }
}

/// Online classifier over the distinct allele bytes observed
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct EncodingDetector {
    seen: [u64; 4],
}

impl EncodingDetector {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn observe(&mut self, allele: u8) {
        self.seen[(allele >> 6) as usize] |= 1u64 << (allele & 63);
    }

    #[inline]
    pub fn observe_genotype(&mut self, gt: Genotype) {
        self.observe(gt[0]);
        self.observe(gt[1]);
    }

    pub fn observe_all(&mut self, genotypes: &[Genotype]) {
        for &gt in genotypes {
            self.observe_genotype(gt);
        }
    }

    #[inline]
    pub fn has_seen(&self, allele: u8) -> bool {
        self.seen[(allele >> 6) as usize] & (1u64 << (allele & 63)) != 0
    }

    /// Fold another detector's observations into this one
    pub fn merge(&mut self, other: &EncodingDetector) {
        for (a, b) in self.seen.iter_mut().zip(other.seen.iter()) {
            *a |= *b;
        }
    }

    /// Classify everything observed so far.
    ///
    /// `B` wins over nucleotides, which win over `3`/`4`, which win over `1`/`2`.
    /// With no informative allele the result is `Unknown`.
    pub fn classify(&self) -> GenotypeEncoding {
        if self.has_seen(b'B') {
            GenotypeEncoding::Ab0
        } else if [b'C', b'G', b'T'].iter().any(|&b| self.has_seen(b)) {
            GenotypeEncoding::Acgt0
        } else if self.has_seen(b'3') || self.has_seen(b'4') {
            GenotypeEncoding::O1234
        } else if self.has_seen(b'1') || self.has_seen(b'2') {
            GenotypeEncoding::O12
        } else {
            GenotypeEncoding::Unknown
        }
    }
}

/// Build a genotype from two allele tokens; empty or missing tokens become `0`
pub fn genotype_from_tokens(a1: &str, a2: &str) -> Genotype {
    let g = [
        crate::data::marker::allele_byte(a1),
        crate::data::marker::allele_byte(a2),
    ];
    // A half-missing call is treated as fully missing
    if g[0] == MISSING_ALLELE || g[1] == MISSING_ALLELE {
        MISSING
    } else {
        g
    }
}

/// Build a genotype from a two-character call such as `AG`; `missing` and
/// anything that is not two characters map to `MISSING`.
pub fn genotype_from_call(call: &str, missing: &str) -> Genotype {
    let call = call.trim();
    if call == missing || !call.is_ascii() {
        return MISSING;
    }
    let bytes = call.as_bytes();
    match bytes.len() {
        2 => genotype_from_tokens(&call[..1], &call[1..]),
        1 => genotype_from_tokens(call, call),
        _ => MISSING,
    }
}
