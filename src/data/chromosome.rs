//! # Chromosome Summary
//!
//! Per-chromosome marker counts and position ranges, built by one pass over a
//! sorted `MarkerSet`. Entries follow canonical chromosome order.

use serde::{Deserialize, Serialize};

use crate::data::marker::MarkerSet;

/// Aggregate for one chromosome
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChromosomeInfo {
    pub marker_count: u32,
    pub min_position: i32,
    pub max_position: i32,
    /// Index of the chromosome's first marker in the sorted set
    pub first_marker: u32,
}

/// Immutable chromosome summary
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ChromosomeSummary {
    entries: Vec<(String, ChromosomeInfo)>,
}

impl ChromosomeSummary {
    pub fn from_markers(markers: &MarkerSet) -> Self {
        let mut entries: Vec<(String, ChromosomeInfo)> = Vec::new();

        for (i, record) in markers.iter().enumerate() {
            match entries.last_mut() {
                Some((label, info)) if *label == record.chromosome => {
                    info.marker_count += 1;
                    info.min_position = info.min_position.min(record.position);
                    info.max_position = info.max_position.max(record.position);
                }
                _ => entries.push((
                    record.chromosome.clone(),
                    ChromosomeInfo {
                        marker_count: 1,
                        min_position: record.position,
                        max_position: record.position,
                        first_marker: i as u32,
                    },
                )),
            }
        }

        Self { entries }
    }

    /// Rebuild from stored entries (container reader)
    pub fn from_entries(entries: Vec<(String, ChromosomeInfo)>) -> Self {
        Self { entries }
    }

    pub fn get(&self, chromosome: &str) -> Option<&ChromosomeInfo> {
        self.entries
            .iter()
            .find(|(label, _)| label == chromosome)
            .map(|(_, info)| info)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn labels(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(label, _)| label.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &ChromosomeInfo)> {
        self.entries.iter().map(|(label, info)| (label.as_str(), info))
    }

    /// Total markers across chromosomes
    pub fn total_markers(&self) -> usize {
        self.entries.iter().map(|(_, i)| i.marker_count as usize).sum()
    }
}
