//! # Sample Definitions
//!
//! Sample index type and the per-sample information carried through a load.
//! Genotype rows are addressed by sample index, so declaration order is
//! preserved everywhere.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Zero-cost newtype for sample indices
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub struct SampleIdx(pub u32);

impl SampleIdx {
    pub fn new(idx: u32) -> Self {
        Self(idx)
    }

    pub fn as_usize(self) -> usize {
        self.0 as usize
    }
}

impl From<usize> for SampleIdx {
    fn from(idx: usize) -> Self {
        Self(idx as u32)
    }
}

impl From<SampleIdx> for usize {
    fn from(idx: SampleIdx) -> usize {
        idx.0 as usize
    }
}

/// Sex code as used by PLINK and sample-info files
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Sex {
    #[default]
    Unknown,
    Male,
    Female,
}

impl Sex {
    pub fn parse(s: &str) -> Self {
        match s.trim().to_ascii_uppercase().as_str() {
            "1" | "M" | "MALE" => Sex::Male,
            "2" | "F" | "FEMALE" => Sex::Female,
            _ => Sex::Unknown,
        }
    }

    pub fn code(self) -> u8 {
        match self {
            Sex::Unknown => 0,
            Sex::Male => 1,
            Sex::Female => 2,
        }
    }
}

/// Affection status (PLINK phenotype coding)
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Affection {
    #[default]
    Unknown,
    Unaffected,
    Affected,
}

impl Affection {
    pub fn parse(s: &str) -> Self {
        match s.trim() {
            "1" => Affection::Unaffected,
            "2" => Affection::Affected,
            _ => Affection::Unknown,
        }
    }

    pub fn code(self) -> u8 {
        match self {
            Affection::Unknown => 0,
            Affection::Unaffected => 1,
            Affection::Affected => 2,
        }
    }
}

/// Descriptive information about one sample
#[derive(Clone, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SampleInfo {
    pub family_id: String,
    pub sample_id: String,
    pub father_id: String,
    pub mother_id: String,
    pub sex: Sex,
    pub affection: Affection,
    pub category: String,
    pub disease: String,
    pub population: String,
    pub age: i32,
}

impl SampleInfo {
    /// Placeholder info carrying only an id
    pub fn dummy(sample_id: impl Into<String>) -> Self {
        Self {
            family_id: "0".to_string(),
            sample_id: sample_id.into(),
            father_id: "0".to_string(),
            mother_id: "0".to_string(),
            ..Default::default()
        }
    }

    /// Build from the six leading PED/FAM columns
    pub fn from_pedigree(fields: &[&str]) -> Option<Self> {
        if fields.len() < 6 {
            return None;
        }
        Some(Self {
            family_id: fields[0].to_string(),
            sample_id: fields[1].to_string(),
            father_id: fields[2].to_string(),
            mother_id: fields[3].to_string(),
            sex: Sex::parse(fields[4]),
            affection: Affection::parse(fields[5]),
            ..Default::default()
        })
    }
}

impl fmt::Display for SampleInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.sample_id)
    }
}

/// Samples in declaration order with id lookup
#[derive(Clone, Debug, Default)]
pub struct Samples {
    infos: Vec<SampleInfo>,
    id_to_idx: HashMap<String, SampleIdx>,
}

impl Samples {
    /// Create from infos; a repeated sample id keeps its first index for lookup
    pub fn new(infos: Vec<SampleInfo>) -> Self {
        let mut id_to_idx = HashMap::with_capacity(infos.len());
        for (i, info) in infos.iter().enumerate() {
            if id_to_idx.contains_key(&info.sample_id) {
                tracing::warn!(sample = %info.sample_id, "repeated sample id");
                continue;
            }
            id_to_idx.insert(info.sample_id.clone(), SampleIdx::from(i));
        }
        Self { infos, id_to_idx }
    }

    pub fn from_ids<I, S>(ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(ids.into_iter().map(SampleInfo::dummy).collect())
    }

    /// Number of samples
    pub fn len(&self) -> usize {
        self.infos.len()
    }

    pub fn is_empty(&self) -> bool {
        self.infos.is_empty()
    }

    pub fn infos(&self) -> &[SampleInfo] {
        &self.infos
    }

    pub fn index_of(&self, sample_id: &str) -> Option<SampleIdx> {
        self.id_to_idx.get(sample_id).copied()
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.infos.iter().map(|s| s.sample_id.as_str())
    }
}

impl std::ops::Index<SampleIdx> for Samples {
    type Output = SampleInfo;

    fn index(&self, idx: SampleIdx) -> &Self::Output {
        &self.infos[idx.as_usize()]
    }
}
