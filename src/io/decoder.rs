use std::path::Path;

use crate::error::DecodeError;

use super::Sample;

/// One decoded source tile.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedTile<T> {
    pub width: u32,
    pub height: u32,
    pub channels: u8,

    /// Interleaved samples in `(y, x, channel)` order
    pub samples: Vec<T>,
}

/// Image decoder collaborator.
///
/// Decoding is format specific; the pipeline only needs dimensions, the
/// channel count and raw samples.
pub trait TileDecoder: Send + Sync {
    /// `(width, height)` of the image in pixels.
    fn read_dimensions(&self, path: &Path) -> Result<(u32, u32), DecodeError>;

    fn read_channel_count(&self, path: &Path) -> Result<u8, DecodeError>;

    fn decode<T: Sample>(&self, path: &Path) -> Result<DecodedTile<T>, DecodeError>;
}
