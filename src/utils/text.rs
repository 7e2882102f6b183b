//! Line-oriented input helpers shared by the format adapters.

use std::collections::HashMap;
use std::fs::File;
use std::io::{BufRead, BufReader, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use flate2::read::MultiGzDecoder;

use crate::error::{LoadError, Result};

/// Fail with `FileNotFound` unless `path` exists
pub fn ensure_exists(path: &Path) -> Result<()> {
    if path.exists() {
        Ok(())
    } else {
        Err(LoadError::file_not_found(path))
    }
}

fn is_gzipped(path: &Path) -> bool {
    path.extension()
        .map(|e| e == "gz" || e == "bgz")
        .unwrap_or(false)
}

/// Open a text input, transparently decompressing `.gz`
pub fn open_text(path: &Path) -> Result<Box<dyn BufRead + Send>> {
    ensure_exists(path)?;
    let file = File::open(path)?;
    let reader: Box<dyn BufRead + Send> = if is_gzipped(path) {
        Box::new(BufReader::new(MultiGzDecoder::new(file)))
    } else {
        Box::new(BufReader::with_capacity(256 * 1024, file))
    };
    Ok(reader)
}

/// Iterate `(1-based line number, line)` over a text input, skipping blank lines
pub fn for_each_line<F>(path: &Path, mut f: F) -> Result<()>
where
    F: FnMut(usize, &str) -> Result<()>,
{
    let mut reader = open_text(path)?;
    let mut line = String::new();
    let mut line_num = 0usize;
    loop {
        line.clear();
        if reader.read_line(&mut line)? == 0 {
            break;
        }
        line_num += 1;
        let trimmed = line.trim_end_matches(&['\n', '\r'][..]);
        if trimmed.trim().is_empty() {
            continue;
        }
        f(line_num, trimmed)?;
    }
    Ok(())
}

/// Whitespace split into borrowed fields
#[inline]
pub fn split_ws(line: &str) -> Vec<&str> {
    line.split_whitespace().collect()
}

/// Tab split into borrowed, trimmed fields
#[inline]
pub fn split_tab(line: &str) -> Vec<&str> {
    line.split('\t').map(str::trim).collect()
}

pub fn display(path: &Path) -> String {
    path.display().to_string()
}

/// Byte offsets of lines grouped by a key column.
///
/// Built in one pass over an uncompressed file so per-sample readers can seek
/// straight to their lines instead of rescanning the whole file.
#[derive(Debug, Clone)]
pub struct LineIndex {
    path: PathBuf,
    offsets: HashMap<String, Vec<u64>>,
    order: Vec<String>,
}

impl LineIndex {
    /// Index `path`, starting after the first line for which `start` returns true
    /// (or from the top when `start` is `None`). `key` extracts the grouping key;
    /// lines where it returns `None` are not indexed.
    pub fn build<K>(path: &Path, start: Option<&dyn Fn(&str) -> bool>, key: K) -> Result<Self>
    where
        K: Fn(&str) -> Option<String>,
    {
        ensure_exists(path)?;
        if is_gzipped(path) {
            return Err(LoadError::config(format!(
                "{} must be uncompressed for indexed per-sample reading",
                path.display()
            )));
        }

        let mut reader = BufReader::with_capacity(256 * 1024, File::open(path)?);
        let mut offsets: HashMap<String, Vec<u64>> = HashMap::new();
        let mut order = Vec::new();
        let mut line = String::new();
        let mut pos = 0u64;
        let mut started = start.is_none();

        loop {
            line.clear();
            let n = reader.read_line(&mut line)?;
            if n == 0 {
                break;
            }
            let line_start = pos;
            pos += n as u64;
            let trimmed = line.trim_end_matches(&['\n', '\r'][..]);

            if !started {
                if let Some(start) = start {
                    started = start(trimmed);
                }
                continue;
            }
            if trimmed.trim().is_empty() {
                continue;
            }
            if let Some(k) = key(trimmed) {
                let entry = offsets.entry(k.clone()).or_insert_with(|| {
                    order.push(k);
                    Vec::new()
                });
                entry.push(line_start);
            }
        }

        Ok(Self {
            path: path.to_path_buf(),
            offsets,
            order,
        })
    }

    /// Keys in order of first appearance
    pub fn keys(&self) -> &[String] {
        &self.order
    }

    pub fn contains(&self, key: &str) -> bool {
        self.offsets.contains_key(key)
    }

    /// Read back every line indexed under `key` (empty when the key is absent)
    pub fn read_lines(&self, key: &str) -> Result<Vec<String>> {
        let Some(offsets) = self.offsets.get(key) else {
            return Ok(Vec::new());
        };
        let mut reader = BufReader::new(File::open(&self.path)?);
        let mut lines = Vec::with_capacity(offsets.len());
        for &offset in offsets {
            reader.seek(SeekFrom::Start(offset))?;
            let mut line = String::new();
            reader.read_line(&mut line)?;
            lines.push(line.trim_end_matches(&['\n', '\r'][..]).to_string());
        }
        Ok(lines)
    }
}
