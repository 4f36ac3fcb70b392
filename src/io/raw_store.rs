//! Directory-backed chunk store.
//!
//! Each magnification directory holds a `header.json` and one raw file per
//! written buffer. Block files are named after their global offset and shape
//! (`<x>_<y>_<z>.<c>x<w>x<h>x<d>.raw`) and contain little-endian samples with
//! the channel varying fastest, then x, y and z.

use std::fs;
use std::path::{Path, PathBuf};

use bytes::BytesMut;
use ndarray::ArrayView4;
use tracing::debug;

use crate::error::StorageError;

use super::{ChunkStore, ChunkWriter, Sample, StoreHeader};

/// Name of the header file inside a magnification directory.
pub const HEADER_FILE_NAME: &str = "header.json";

/// Local filesystem implementation of [`ChunkStore`].
#[derive(Debug, Clone, Copy, Default)]
pub struct RawCubeStore;

impl RawCubeStore {
    pub fn new() -> Self {
        Self
    }
}

impl ChunkStore for RawCubeStore {
    type Writer = RawCubeWriter;

    fn ensure(&self, path: &Path, header: &StoreHeader) -> Result<(), StorageError> {
        let header_path = path.join(HEADER_FILE_NAME);
        if header_path.is_file() {
            let existing = self.read_header(path)?;
            if existing.element_class != header.element_class
                || existing.num_channels != header.num_channels
            {
                return Err(StorageError::HeaderMismatch {
                    path: path.to_path_buf(),
                    message: format!(
                        "existing {} x {} channels, requested {} x {} channels",
                        existing.element_class,
                        existing.num_channels,
                        header.element_class,
                        header.num_channels
                    ),
                });
            }
            return Ok(());
        }

        fs::create_dir_all(path)?;
        let json = serde_json::to_vec_pretty(header).map_err(|e| StorageError::CorruptHeader {
            path: header_path.clone(),
            message: e.to_string(),
        })?;
        fs::write(&header_path, json)?;
        debug!("Created storage at {}", path.display());
        Ok(())
    }

    fn open(&self, path: &Path) -> Result<Self::Writer, StorageError> {
        let header = self.read_header(path)?;
        Ok(RawCubeWriter {
            root: path.to_path_buf(),
            header,
        })
    }

    fn read_header(&self, path: &Path) -> Result<StoreHeader, StorageError> {
        let header_path = path.join(HEADER_FILE_NAME);
        if !header_path.is_file() {
            return Err(StorageError::MissingHeader {
                path: path.to_path_buf(),
            });
        }
        let data = fs::read(&header_path)?;
        serde_json::from_slice(&data).map_err(|e| StorageError::CorruptHeader {
            path: header_path,
            message: e.to_string(),
        })
    }
}

/// Open handle to one magnification directory.
#[derive(Debug, Clone)]
pub struct RawCubeWriter {
    root: PathBuf,
    header: StoreHeader,
}

impl RawCubeWriter {
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn block_path(&self, offset: [i64; 3], shape: &[usize]) -> PathBuf {
        self.root.join(format!(
            "{}_{}_{}.{}x{}x{}x{}.raw",
            offset[0], offset[1], offset[2], shape[0], shape[1], shape[2], shape[3]
        ))
    }
}

impl ChunkWriter for RawCubeWriter {
    fn header(&self) -> &StoreHeader {
        &self.header
    }

    fn write<T: Sample>(
        &self,
        offset: [i64; 3],
        buffer: ArrayView4<'_, T>,
    ) -> Result<(), StorageError> {
        self.header.check_buffer(&buffer)?;

        let sample_size = self.header.element_class.byte_size();
        let mut bytes = BytesMut::with_capacity(buffer.len() * sample_size);
        // reversed axes iterate (z, y, x, channel) with the channel fastest
        for sample in buffer.t().iter() {
            sample.put_le(&mut bytes);
        }

        fs::write(self.block_path(offset, buffer.shape()), &bytes)?;
        Ok(())
    }
}

// =============================================================================
// Tests
// =============================================================================
