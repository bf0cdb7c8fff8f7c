//! Binary storage for the catalog index.
//!
//! File format: catalog.index
//!
//! Header (33 bytes):
//! - magic: [u8; 8] (`LSTRIDX\0`)
//! - version: u8 (1)
//! - dimensions: u32 (little-endian)
//! - entry_count: u64 (little-endian)
//! - id_map_checksum: u32 (CRC32 of the identifier map, see [`IdMap::checksum`])
//! - payload_checksum: u32 (CRC32 of the vector payload bytes)
//! - header_checksum: u32 (CRC32 of all header fields before it)
//!
//! Payload: entry_count × dimensions little-endian f32, row-major by ordinal.
//!
//! The identifier map is a sibling CSV. Both files are written to temp paths and
//! renamed into place, map first, so a reader either sees the old pair, the new
//! pair, or a mismatched pair that the checksum refuses.

use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use super::id_map::IdMap;
use super::{FlatIndex, NearestNeighbors};

const MAGIC: &[u8; 8] = b"LSTRIDX\0";

/// Current file format version
const FORMAT_VERSION: u8 = 1;

/// Header size in bytes, including the trailing header checksum.
const HEADER_SIZE: usize = 8 + 1 + 4 + 8 + 4 + 4 + 4;

#[derive(Debug, thiserror::Error)]
pub enum IndexStorageError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid file format: {0}")]
    InvalidFormat(String),

    #[error("Version mismatch: file version {0}, supported version {1}")]
    VersionMismatch(u8, u8),

    #[error("Checksum mismatch: {0} may be corrupted")]
    ChecksumMismatch(&'static str),

    #[error("Identifier map out of lockstep with index: {0}")]
    IdMapMismatch(String),

    #[error("Id map error: {0:#}")]
    IdMap(anyhow::Error),
}

struct Header {
    dimensions: u32,
    entry_count: u64,
    id_map_checksum: u32,
    payload_checksum: u32,
}

impl Header {
    fn encode(&self) -> [u8; HEADER_SIZE] {
        let mut buf = [0u8; HEADER_SIZE];
        buf[0..8].copy_from_slice(MAGIC);
        buf[8] = FORMAT_VERSION;
        buf[9..13].copy_from_slice(&self.dimensions.to_le_bytes());
        buf[13..21].copy_from_slice(&self.entry_count.to_le_bytes());
        buf[21..25].copy_from_slice(&self.id_map_checksum.to_le_bytes());
        buf[25..29].copy_from_slice(&self.payload_checksum.to_le_bytes());
        let header_checksum = crc32fast::hash(&buf[..29]);
        buf[29..33].copy_from_slice(&header_checksum.to_le_bytes());
        buf
    }

    fn decode(buf: &[u8; HEADER_SIZE]) -> Result<Self, IndexStorageError> {
        if &buf[0..8] != MAGIC {
            return Err(IndexStorageError::InvalidFormat("bad magic bytes".into()));
        }
        if buf[8] != FORMAT_VERSION {
            return Err(IndexStorageError::VersionMismatch(buf[8], FORMAT_VERSION));
        }
        let stored = u32::from_le_bytes(le_array(&buf[29..33]));
        if crc32fast::hash(&buf[..29]) != stored {
            return Err(IndexStorageError::ChecksumMismatch("index header"));
        }
        Ok(Self {
            dimensions: u32::from_le_bytes(le_array(&buf[9..13])),
            entry_count: u64::from_le_bytes(le_array(&buf[13..21])),
            id_map_checksum: u32::from_le_bytes(le_array(&buf[21..25])),
            payload_checksum: u32::from_le_bytes(le_array(&buf[25..29])),
        })
    }
}

fn le_array<const N: usize>(bytes: &[u8]) -> [u8; N] {
    let mut out = [0u8; N];
    out.copy_from_slice(bytes);
    out
}

/// Sibling temp file: `.tmp` appended to the full file name, so files that
/// share a stem never share a temp path.
fn temp_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".tmp");
    PathBuf::from(name)
}

/// The index file and its identifier map, managed as one unit.
pub struct IndexStorage {
    index_path: PathBuf,
    id_map_path: PathBuf,
}

impl IndexStorage {
    pub fn new(index_path: PathBuf, id_map_path: PathBuf) -> Self {
        Self {
            index_path,
            id_map_path,
        }
    }

    pub fn index_path(&self) -> &Path {
        &self.index_path
    }

    pub fn id_map_path(&self) -> &Path {
        &self.id_map_path
    }

    pub fn exists(&self) -> bool {
        self.index_path.exists() && self.id_map_path.exists()
    }

    /// Load and cross-check the index and its identifier map.
    pub fn load(&self) -> Result<(FlatIndex, IdMap), IndexStorageError> {
        let mut reader = BufReader::new(File::open(&self.index_path)?);

        let mut header_buf = [0u8; HEADER_SIZE];
        reader.read_exact(&mut header_buf)?;
        let header = Header::decode(&header_buf)?;

        let dims = header.dimensions as usize;
        let rows = usize::try_from(header.entry_count)
            .map_err(|_| IndexStorageError::InvalidFormat("entry count overflows usize".into()))?;
        let payload_len = rows
            .checked_mul(dims)
            .and_then(|n| n.checked_mul(4))
            .ok_or_else(|| IndexStorageError::InvalidFormat("payload size overflows".into()))?;

        let mut payload = vec![0u8; payload_len];
        reader.read_exact(&mut payload)?;
        if crc32fast::hash(&payload) != header.payload_checksum {
            return Err(IndexStorageError::ChecksumMismatch("vector payload"));
        }
        let mut trailing = [0u8; 1];
        if reader.read(&mut trailing)? != 0 {
            return Err(IndexStorageError::InvalidFormat("trailing bytes after payload".into()));
        }

        let data: Vec<f32> = payload
            .chunks_exact(4)
            .map(|b| f32::from_le_bytes(le_array(b)))
            .collect();
        let index = FlatIndex::from_raw(rows, dims, data)
            .map_err(|e| IndexStorageError::InvalidFormat(format!("{e:#}")))?;

        let id_map = IdMap::read(&self.id_map_path).map_err(IndexStorageError::IdMap)?;
        if id_map.len() != rows {
            return Err(IndexStorageError::IdMapMismatch(format!(
                "index has {rows} vectors, id map has {} rows",
                id_map.len()
            )));
        }
        if id_map.checksum() != header.id_map_checksum {
            return Err(IndexStorageError::IdMapMismatch(
                "id map contents differ from the ones the index was built with".into(),
            ));
        }

        tracing::debug!(
            vectors = rows,
            dimensions = dims,
            path = %self.index_path.display(),
            "index loaded"
        );
        Ok((index, id_map))
    }

    /// Persist an index and its identifier map.
    ///
    /// Uses atomic write: temp file -> fsync -> rename
    pub fn save(&self, index: &FlatIndex, id_map: &IdMap) -> Result<(), IndexStorageError> {
        if index.len() != id_map.len() {
            return Err(IndexStorageError::IdMapMismatch(format!(
                "refusing to save {} vectors with {} identifiers",
                index.len(),
                id_map.len()
            )));
        }

        for path in [&self.index_path, &self.id_map_path] {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
        }

        if self.index_path == self.id_map_path {
            return Err(IndexStorageError::InvalidFormat(
                "index and id map must be different files".into(),
            ));
        }
        let index_tmp = temp_path(&self.index_path);
        let map_tmp = temp_path(&self.id_map_path);

        let result = self
            .write_index(&index_tmp, index, id_map.checksum())
            .and_then(|()| {
                id_map
                    .write(&map_tmp)
                    .map_err(IndexStorageError::IdMap)?;
                File::open(&map_tmp)?.sync_all()?;
                Ok(())
            });

        if let Err(e) = result {
            let _ = std::fs::remove_file(&index_tmp);
            let _ = std::fs::remove_file(&map_tmp);
            return Err(e);
        }

        std::fs::rename(&map_tmp, &self.id_map_path)?;
        std::fs::rename(&index_tmp, &self.index_path)?;

        tracing::info!(
            vectors = index.len(),
            path = %self.index_path.display(),
            "index saved"
        );
        Ok(())
    }

    fn write_index(
        &self,
        path: &Path,
        index: &FlatIndex,
        id_map_checksum: u32,
    ) -> Result<(), IndexStorageError> {
        let mut payload = Vec::with_capacity(index.len() * index.dimensions() * 4);
        for x in index.raw_data() {
            payload.extend_from_slice(&x.to_le_bytes());
        }

        let header = Header {
            dimensions: index.dimensions() as u32,
            entry_count: index.len() as u64,
            id_map_checksum,
            payload_checksum: crc32fast::hash(&payload),
        };

        let file = File::create(path)?;
        let mut writer = BufWriter::new(file);
        writer.write_all(&header.encode())?;
        writer.write_all(&payload)?;
        writer.flush()?;
        writer.get_ref().sync_all()?;
        Ok(())
    }
}
