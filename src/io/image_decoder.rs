//! Tile decoder backed by the `image` crate.
//!
//! Supports any format the crate is built with (JPEG, PNG, TIFF) and images
//! with 1 to 4 channels. The format is guessed from the file contents, not
//! the extension.

use std::path::Path;

use image::{ImageDecoder, ImageReader};

use crate::error::DecodeError;

use super::{DecodedTile, Sample, TileDecoder};

/// Largest channel count a decoded tile may have.
pub const MAX_CHANNELS: u8 = 4;

/// Decoder for 2D tile images on the local filesystem.
#[derive(Debug, Clone, Default)]
pub struct ImageTileDecoder {}

impl ImageTileDecoder {
    pub fn new() -> Self {
        Self {}
    }

    fn reader(path: &Path) -> Result<ImageReader<std::io::BufReader<std::fs::File>>, DecodeError> {
        Ok(ImageReader::open(path)?.with_guessed_format()?)
    }

    fn image_error(path: &Path, error: image::ImageError) -> DecodeError {
        DecodeError::Image {
            path: path.to_path_buf(),
            message: error.to_string(),
        }
    }
}

impl TileDecoder for ImageTileDecoder {
    fn read_dimensions(&self, path: &Path) -> Result<(u32, u32), DecodeError> {
        Self::reader(path)?
            .into_dimensions()
            .map_err(|e| Self::image_error(path, e))
    }

    fn read_channel_count(&self, path: &Path) -> Result<u8, DecodeError> {
        let decoder = Self::reader(path)?
            .into_decoder()
            .map_err(|e| Self::image_error(path, e))?;
        Ok(decoder.color_type().channel_count())
    }

    fn decode<T: Sample>(&self, path: &Path) -> Result<DecodedTile<T>, DecodeError> {
        let image = Self::reader(path)?
            .decode()
            .map_err(|e| Self::image_error(path, e))?;

        let channels = image.color().channel_count();
        if channels == 0 || channels > MAX_CHANNELS {
            return Err(DecodeError::UnsupportedChannels {
                path: path.to_path_buf(),
                channels,
            });
        }

        let (width, height) = (image.width(), image.height());
        let samples = T::from_image(image, channels);

        Ok(DecodedTile {
            width,
            height,
            channels,
            samples,
        })
    }
}

// =============================================================================
// Tests
// =============================================================================
