//! # Hyperslab Buffer
//!
//! Accumulates genotype rows along the streamed axis and hands them to a flush
//! callback in blocks of at most `rows_per_slab` rows.
//!
//! `rows_per_slab = max(1, memory_budget / (other_axis_len * 2))`, so peak
//! buffered memory is bounded by the budget (or one row when a single row is
//! already larger). Blocks are flushed at strictly increasing offsets and the
//! final partial block is sized `total_rows - flushed_rows`.

use tracing::debug;

use crate::data::genotype::Genotype;
use crate::error::{LoadError, Result};

/// Bytes per genotype cell
pub const BYTES_PER_GENOTYPE: usize = 2;

#[derive(Debug)]
pub struct HyperslabBuffer {
    row_bytes: usize,
    rows_per_slab: usize,
    total_rows: usize,
    buf: Vec<u8>,
    buffered_rows: usize,
    flushed_rows: usize,
    peak_rows: usize,
    flushes: usize,
}

impl HyperslabBuffer {
    /// Rows that fit in `memory_budget` bytes when each row spans `other_axis_len` genotypes
    pub fn rows_for_budget(memory_budget: usize, other_axis_len: usize) -> usize {
        let row_bytes = other_axis_len.max(1) * BYTES_PER_GENOTYPE;
        (memory_budget / row_bytes).max(1)
    }

    pub fn new(other_axis_len: usize, total_rows: usize, memory_budget: usize) -> Self {
        let rows_per_slab = Self::rows_for_budget(memory_budget, other_axis_len);
        let row_bytes = other_axis_len * BYTES_PER_GENOTYPE;
        let capacity_rows = rows_per_slab.min(total_rows.max(1));
        debug!(rows_per_slab, row_bytes, total_rows, "hyperslab buffer sized");
        Self {
            row_bytes,
            rows_per_slab,
            total_rows,
            buf: Vec::with_capacity(capacity_rows * row_bytes),
            buffered_rows: 0,
            flushed_rows: 0,
            peak_rows: 0,
            flushes: 0,
        }
    }

    pub fn rows_per_slab(&self) -> usize {
        self.rows_per_slab
    }

    pub fn flushed_rows(&self) -> usize {
        self.flushed_rows
    }

    /// Largest number of rows ever held at once
    pub fn peak_buffered_rows(&self) -> usize {
        self.peak_rows
    }

    pub fn flush_count(&self) -> usize {
        self.flushes
    }

    /// Append one row; flushes through `flush(first_row, bytes)` once the slab is full
    pub fn push_row<F>(&mut self, row: &[Genotype], flush: F) -> Result<()>
    where
        F: FnMut(usize, &[u8]) -> Result<()>,
    {
        if row.len() * BYTES_PER_GENOTYPE != self.row_bytes {
            return Err(LoadError::invalid_data(format!(
                "row of {} genotypes does not match buffer width {}",
                row.len(),
                self.row_bytes / BYTES_PER_GENOTYPE
            )));
        }
        if self.flushed_rows + self.buffered_rows >= self.total_rows {
            return Err(LoadError::invalid_data(format!(
                "more than {} rows pushed",
                self.total_rows
            )));
        }
        for gt in row {
            self.buf.extend_from_slice(gt);
        }
        self.buffered_rows += 1;
        self.peak_rows = self.peak_rows.max(self.buffered_rows);
        if self.buffered_rows == self.rows_per_slab {
            self.flush(flush)?;
        }
        Ok(())
    }

    fn flush<F>(&mut self, mut flush: F) -> Result<()>
    where
        F: FnMut(usize, &[u8]) -> Result<()>,
    {
        if self.buffered_rows == 0 {
            return Ok(());
        }
        flush(self.flushed_rows, &self.buf)?;
        debug!(
            first_row = self.flushed_rows,
            rows = self.buffered_rows,
            "hyperslab flushed"
        );
        self.flushed_rows += self.buffered_rows;
        self.buffered_rows = 0;
        self.flushes += 1;
        self.buf.clear();
        Ok(())
    }

    /// Flush the final partial block; every row must have been pushed
    pub fn finish<F>(&mut self, flush: F) -> Result<usize>
    where
        F: FnMut(usize, &[u8]) -> Result<()>,
    {
        let remaining = self.total_rows - self.flushed_rows;
        if self.buffered_rows != remaining {
            return Err(LoadError::invalid_data(format!(
                "{} rows buffered but {} remain unwritten",
                self.buffered_rows, remaining
            )));
        }
        self.flush(flush)?;
        Ok(self.flushed_rows)
    }
}
