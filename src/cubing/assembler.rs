//! Column buffer assembly.
//!
//! A column is the stack of tiles at one `(x, y)` position for the z-slices
//! of a batch. Slices are decoded in ascending z, absent tiles become zero
//! slices, and the stack is reordered to the `(channel, x, y, z)` layout the
//! storage engine expects.

use std::path::Path;
use std::sync::Arc;

use ndarray::{Array3, Array4, ArrayView3, Axis};

use crate::error::{AssembleError, DecodeError};
use crate::io::{ChunkWriter, Sample, TileDecoder};
use crate::pattern::{TileCoordinate, TileExtent, TileLocator};

/// Shape shared by every tile of a source stack.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TileGeometry {
    pub width: u32,
    pub height: u32,
    pub channels: u8,
}

impl TileGeometry {
    pub fn new(width: u32, height: u32, channels: u8) -> Self {
        Self {
            width,
            height,
            channels,
        }
    }

    /// Read the geometry of one representative tile.
    pub fn probe<D: TileDecoder + ?Sized>(decoder: &D, file: &Path) -> Result<Self, DecodeError> {
        let (width, height) = decoder.read_dimensions(file)?;
        let channels = decoder.read_channel_count(file)?;
        Ok(Self::new(width, height, channels))
    }

    fn slice_shape(&self) -> (usize, usize, usize) {
        (
            self.height as usize,
            self.width as usize,
            self.channels as usize,
        )
    }
}

/// Outcome of one column write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnWrite {
    Written,

    /// Every sample was zero; nothing was sent to storage
    Skipped,
}

/// Builds and writes column buffers for the discovered tile interval.
#[derive(Debug)]
pub struct BufferAssembler<D> {
    locator: TileLocator,
    extent: TileExtent,
    geometry: TileGeometry,
    decoder: Arc<D>,
}

impl<D: TileDecoder> BufferAssembler<D> {
    pub fn new(
        locator: TileLocator,
        extent: TileExtent,
        geometry: TileGeometry,
        decoder: Arc<D>,
    ) -> Self {
        Self {
            locator,
            extent,
            geometry,
            decoder,
        }
    }

    pub fn geometry(&self) -> TileGeometry {
        self.geometry
    }

    pub fn extent(&self) -> &TileExtent {
        &self.extent
    }

    /// Every `(x, y)` tile column of the discovered interval, x-major.
    pub fn columns(&self) -> impl Iterator<Item = (i64, i64)> + '_ {
        let (min, max) = (self.extent.min, self.extent.max);
        (min.x..=max.x).flat_map(move |x| (min.y..=max.y).map(move |y| (x, y)))
    }

    /// Global voxel offset of a column's buffer.
    pub fn write_offset(&self, x: i64, y: i64, z_start: i64) -> [i64; 3] {
        [
            x * i64::from(self.geometry.width),
            y * i64::from(self.geometry.height),
            z_start,
        ]
    }

    /// Stack the tiles of one column into a `(channel, x, y, z)` buffer.
    ///
    /// `z_slices` must be ascending and non-empty. Missing tiles are zero
    /// filled; a tile whose shape differs from the probed geometry fails.
    pub fn assemble_column<T: Sample>(
        &self,
        x: i64,
        y: i64,
        z_slices: &[i64],
    ) -> Result<Array4<T>, AssembleError> {
        let mut slices: Vec<Array3<T>> = Vec::with_capacity(z_slices.len());
        for &z in z_slices {
            let slice = match self.locator.locate(TileCoordinate::new(x, y, z)) {
                Some(path) => self.read_slice(&path)?,
                None => Array3::from_elem(self.geometry.slice_shape(), T::default()),
            };
            slices.push(slice);
        }

        let views: Vec<ArrayView3<'_, T>> = slices.iter().map(|s| s.view()).collect();
        // (height, width, depth, channel)
        let stacked = ndarray::stack(Axis(2), &views)?;
        let reordered = stacked.permuted_axes([3, 1, 0, 2]);
        Ok(reordered.as_standard_layout().into_owned())
    }

    /// Assemble one column and write it unless it is entirely zero.
    pub fn write_column<T: Sample, W: ChunkWriter>(
        &self,
        writer: &W,
        x: i64,
        y: i64,
        z_slices: &[i64],
    ) -> Result<ColumnWrite, AssembleError> {
        let buffer = self.assemble_column::<T>(x, y, z_slices)?;
        if is_blank(&buffer) {
            return Ok(ColumnWrite::Skipped);
        }

        let z_start = z_slices.first().copied().unwrap_or_default();
        writer.write(self.write_offset(x, y, z_start), buffer.view())?;
        Ok(ColumnWrite::Written)
    }

    fn read_slice<T: Sample>(&self, path: &Path) -> Result<Array3<T>, AssembleError> {
        let tile = self.decoder.decode::<T>(path)?;
        let actual = (tile.width, tile.height, tile.channels);
        let expected = (
            self.geometry.width,
            self.geometry.height,
            self.geometry.channels,
        );
        if actual != expected {
            return Err(AssembleError::ShapeMismatch {
                path: path.to_path_buf(),
                expected,
                actual,
            });
        }
        Ok(Array3::from_shape_vec(
            self.geometry.slice_shape(),
            tile.samples,
        )?)
    }
}

/// True when every sample of the buffer is zero.
pub fn is_blank<T: Sample>(buffer: &Array4<T>) -> bool {
    let zero = T::default();
    buffer.iter().all(|v| *v == zero)
}

// =============================================================================
// Tests
// =============================================================================
