//! Ordinal → source identifier map, stored as a one-column CSV.
//!
//! Row `i` (after the `image_path` header) names the image behind index ordinal `i`.
//! Any reordering or row loss silently corrupts every lookup, so the map carries a
//! checksum that the index header records at build time.

use anyhow::{Context, Result};
use std::path::Path;

const HEADER: &str = "image_path";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IdMap {
    identifiers: Vec<String>,
}

impl IdMap {
    pub fn new(identifiers: Vec<String>) -> Self {
        Self { identifiers }
    }

    pub fn len(&self) -> usize {
        self.identifiers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.identifiers.is_empty()
    }

    pub fn get(&self, ordinal: usize) -> Option<&str> {
        self.identifiers.get(ordinal).map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.identifiers.iter().map(String::as_str)
    }

    /// CRC32 over every identifier in order, each terminated by `\n`.
    pub fn checksum(&self) -> u32 {
        let mut hasher = crc32fast::Hasher::new();
        for id in &self.identifiers {
            hasher.update(id.as_bytes());
            hasher.update(b"\n");
        }
        hasher.finalize()
    }

    pub fn read(path: &Path) -> Result<Self> {
        let mut reader = csv::Reader::from_path(path)
            .with_context(|| format!("failed to open id map {}", path.display()))?;

        let headers = reader.headers().context("id map has no header row")?;
        anyhow::ensure!(
            headers.get(0) == Some(HEADER),
            "id map {} has header {:?}, expected {HEADER:?}",
            path.display(),
            headers.get(0).unwrap_or_default()
        );

        let mut identifiers = Vec::new();
        for (line, record) in reader.records().enumerate() {
            let record = record.with_context(|| format!("bad id map row {}", line + 2))?;
            let id = record
                .get(0)
                .with_context(|| format!("id map row {} is empty", line + 2))?;
            identifiers.push(id.to_string());
        }

        Ok(Self { identifiers })
    }

    pub fn write(&self, path: &Path) -> Result<()> {
        let mut writer = csv::Writer::from_path(path)
            .with_context(|| format!("failed to create id map {}", path.display()))?;
        writer.write_record([HEADER])?;
        for id in &self.identifiers {
            writer.write_record([id])?;
        }
        writer.flush()?;
        Ok(())
    }
}
