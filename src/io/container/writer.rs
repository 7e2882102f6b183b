//! Positioned writer for matrix containers.
//!
//! The file is created empty, laid out once the header is known, and sealed
//! only after every genotype row and the encoding tag are on disk.

use std::fs::{File, OpenOptions};
use std::io::{Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use tracing::debug;

use super::{
    encode_fixed, ContainerHeader, FORMAT_MAJOR, FORMAT_MINOR, MAGIC, SEALED_FLAG_OFFSET,
    VAR_GENOTYPES, VAR_GTENCODING,
};
use crate::data::genotype::{AlleleMode, GenotypeEncoding};
use crate::error::{LoadError, Result};

/// Matrix container writer
pub struct MatrixWriter {
    file: File,
    path: PathBuf,
    header: Option<ContainerHeader>,
    scratch: Vec<u8>,
}

impl MatrixWriter {
    /// Create (or truncate) the container file
    pub fn create(path: &Path) -> Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)?;
        let mut writer = Self {
            file,
            path: path.to_path_buf(),
            header: None,
            scratch: Vec::new(),
        };
        writer.write_preamble(0)?;
        Ok(writer)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn write_preamble(&mut self, header_len: u64) -> Result<()> {
        self.file.seek(SeekFrom::Start(0))?;
        self.file.write_all(MAGIC)?;
        self.file.write_all(&FORMAT_MAJOR.to_le_bytes())?;
        self.file.write_all(&FORMAT_MINOR.to_le_bytes())?;
        // Sealed flag (0) + padding
        self.file.write_all(&[0u8; 4])?;
        self.file.write_all(&header_len.to_le_bytes())?;
        Ok(())
    }

    /// Write the header and reserve space for every variable.
    ///
    /// Reserved regions read back as zeros until written.
    pub fn define(&mut self, header: ContainerHeader) -> Result<()> {
        if self.header.is_some() {
            return Err(LoadError::protocol("container layout is already defined"));
        }
        let json = serde_json::to_vec(&header)?;
        self.write_preamble(json.len() as u64)?;
        self.file.write_all(&json)?;
        self.file.set_len(header.file_len())?;
        debug!(
            path = %self.path.display(),
            bytes = header.file_len(),
            samples = header.dimensions.samples,
            markers = header.dimensions.markers,
            "container layout defined"
        );
        self.header = Some(header);
        Ok(())
    }

    pub fn header(&self) -> Result<&ContainerHeader> {
        self.header
            .as_ref()
            .ok_or_else(|| LoadError::protocol("container layout is not defined yet"))
    }

    fn write_variable(&mut self, name: &str, bytes: &[u8]) -> Result<()> {
        let var = self.header()?.require(name)?;
        if bytes.len() as u64 != var.byte_len() {
            return Err(LoadError::invalid_data(format!(
                "{} expects {} bytes, got {}",
                name,
                var.byte_len(),
                bytes.len()
            )));
        }
        let offset = var.offset;
        self.file.seek(SeekFrom::Start(offset))?;
        self.file.write_all(bytes)?;
        Ok(())
    }

    /// Write a whole fixed-width string variable
    pub fn write_strings<'a, I>(&mut self, name: &str, values: I) -> Result<()>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let stride = match self.header()?.require(name)?.kind {
            super::VarKind::Chars { stride } => stride,
            super::VarKind::Int32 => {
                return Err(LoadError::protocol(format!("{} is not a string variable", name)))
            }
        };
        let bytes = encode_fixed(values, stride, name)?;
        self.write_variable(name, &bytes)
    }

    /// Write a whole i32 variable
    pub fn write_i32s(&mut self, name: &str, values: &[i32]) -> Result<()> {
        let bytes: Vec<u8> = values.iter().flat_map(|v| v.to_le_bytes()).collect();
        self.write_variable(name, &bytes)
    }

    /// Write a whole variable of raw bytes
    pub fn write_bytes(&mut self, name: &str, bytes: &[u8]) -> Result<()> {
        self.write_variable(name, bytes)
    }

    /// Write a contiguous block of genotype rows.
    ///
    /// `data` holds `rows` consecutive rows starting at `first_row` along
    /// `mode`'s axis, each row `other_axis_len * 2` bytes. Sample rows land as
    /// one contiguous write; marker rows are scattered into every sample's
    /// run.
    pub fn write_genotype_rows(&mut self, mode: AlleleMode, first_row: usize, data: &[u8]) -> Result<()> {
        let header = self.header()?;
        let var = header.require(VAR_GENOTYPES)?;
        let n_samples = header.dimensions.samples as usize;
        let n_markers = header.dimensions.markers as usize;
        let base = var.offset;

        let (axis_len, row_bytes) = match mode {
            AlleleMode::BySample => (n_samples, n_markers * 2),
            AlleleMode::ByMarker => (n_markers, n_samples * 2),
        };
        if row_bytes == 0 || data.is_empty() {
            return Ok(());
        }
        if data.len() % row_bytes != 0 {
            return Err(LoadError::invalid_data(format!(
                "genotype block of {} bytes is not a whole number of {}-byte rows",
                data.len(),
                row_bytes
            )));
        }
        let rows = data.len() / row_bytes;
        if first_row + rows > axis_len {
            return Err(LoadError::invalid_data(format!(
                "genotype rows {}..{} exceed the {} axis of length {}",
                first_row,
                first_row + rows,
                mode,
                axis_len
            )));
        }

        match mode {
            AlleleMode::BySample => {
                let offset = base + (first_row * row_bytes) as u64;
                self.file.seek(SeekFrom::Start(offset))?;
                self.file.write_all(data)?;
            }
            AlleleMode::ByMarker => {
                let mut scratch = std::mem::take(&mut self.scratch);
                for s in 0..n_samples {
                    scratch.clear();
                    for r in 0..rows {
                        let at = r * row_bytes + s * 2;
                        scratch.extend_from_slice(&data[at..at + 2]);
                    }
                    let offset = base + ((s * n_markers + first_row) * 2) as u64;
                    self.file.seek(SeekFrom::Start(offset))?;
                    self.file.write_all(&scratch)?;
                }
                self.scratch = scratch;
            }
        }
        Ok(())
    }

    /// Record the matrix encoding
    pub fn write_encoding(&mut self, encoding: GenotypeEncoding) -> Result<()> {
        self.write_strings(VAR_GTENCODING, [encoding.as_tag()])
    }

    /// Flush everything and mark the file complete
    pub fn seal(mut self) -> Result<PathBuf> {
        self.header()?;
        self.file.flush()?;
        self.file.sync_data()?;
        self.file.seek(SeekFrom::Start(SEALED_FLAG_OFFSET))?;
        self.file.write_all(&[1u8])?;
        self.file.flush()?;
        self.file.sync_all()?;
        debug!(path = %self.path.display(), "container sealed");
        Ok(self.path)
    }
}
