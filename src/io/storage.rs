//! Chunk storage engine interface.
//!
//! The storage engine persists fixed-size voxel chunks for one magnification
//! of one layer. The cubing pipeline consumes it only through `ensure`,
//! `open`, the header, and `write` at a global offset.

use std::path::Path;

use ndarray::ArrayView4;
use serde::{Deserialize, Serialize};

use crate::dataset::ElementClass;
use crate::error::StorageError;

use super::Sample;

/// Default edge length of a storage cube in voxels.
pub const DEFAULT_CUBE_LENGTH: u32 = 32;

/// Per-magnification storage header.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreHeader {
    #[serde(rename = "elementClass")]
    pub element_class: ElementClass,

    #[serde(rename = "numChannels")]
    pub num_channels: usize,

    #[serde(rename = "cubeLength", default = "default_cube_length")]
    pub cube_length: u32,
}

fn default_cube_length() -> u32 {
    DEFAULT_CUBE_LENGTH
}

impl StoreHeader {
    pub fn new(element_class: ElementClass, num_channels: usize) -> Self {
        Self {
            element_class,
            num_channels,
            cube_length: DEFAULT_CUBE_LENGTH,
        }
    }

    /// Check that a `(channel, x, y, z)` buffer can be written under this header.
    pub fn check_buffer<T: Sample>(&self, buffer: &ArrayView4<'_, T>) -> Result<(), StorageError> {
        if T::ELEMENT_CLASS != self.element_class {
            return Err(StorageError::InvalidBuffer {
                message: format!(
                    "buffer holds {} samples, storage expects {}",
                    T::ELEMENT_CLASS,
                    self.element_class
                ),
            });
        }
        let channels = buffer.shape()[0];
        if channels != self.num_channels {
            return Err(StorageError::InvalidBuffer {
                message: format!(
                    "buffer has {} channels, storage expects {}",
                    channels, self.num_channels
                ),
            });
        }
        Ok(())
    }
}

/// An open handle to one magnification's storage.
///
/// Shared across worker jobs; implementations must accept concurrent writes
/// to disjoint offsets.
pub trait ChunkWriter: Send + Sync {
    fn header(&self) -> &StoreHeader;

    /// Write a `(channel, x, y, z)` buffer at a global voxel offset.
    fn write<T: Sample>(&self, offset: [i64; 3], buffer: ArrayView4<'_, T>)
        -> Result<(), StorageError>;
}

/// Factory for storage handles, keyed by magnification directory.
pub trait ChunkStore: Send + Sync {
    type Writer: ChunkWriter + 'static;

    /// Create the storage at `path` if absent, or check that the existing
    /// header agrees with `header`.
    fn ensure(&self, path: &Path, header: &StoreHeader) -> Result<(), StorageError>;

    /// Open existing storage for writing.
    fn open(&self, path: &Path) -> Result<Self::Writer, StorageError>;

    /// Read the header of existing storage.
    fn read_header(&self, path: &Path) -> Result<StoreHeader, StorageError>;
}
