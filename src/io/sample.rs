use std::fmt::Debug;

use bytes::BufMut;
use image::DynamicImage;

use crate::dataset::ElementClass;

/// Voxel sample type that can be decoded from images and written to storage.
///
/// Implemented for the element classes the image decoder can produce.
pub trait Sample: Copy + Default + PartialEq + Debug + Send + Sync + 'static {
    /// Element class recorded in layer metadata and storage headers.
    const ELEMENT_CLASS: ElementClass;

    /// Append the little-endian encoding of this sample.
    fn put_le<B: BufMut>(self, buf: &mut B);

    /// Convert a decoded image into interleaved `(y, x, channel)` samples.
    ///
    /// Integer samples keep their value when widened, so an 8-bit 255 stays
    /// 255 in a `u16` or `f32` layer. Narrowing conversions rescale to the
    /// target range. `channels` must be between 1 and 4.
    fn from_image(image: DynamicImage, channels: u8) -> Vec<Self>;
}

/// Bits per channel of the decoded image.
fn sample_depth(image: &DynamicImage) -> u16 {
    let color = image.color();
    color.bits_per_pixel() / u16::from(color.channel_count().max(1))
}

impl Sample for u8 {
    const ELEMENT_CLASS: ElementClass = ElementClass::UInt8;

    fn put_le<B: BufMut>(self, buf: &mut B) {
        buf.put_u8(self);
    }

    fn from_image(image: DynamicImage, channels: u8) -> Vec<Self> {
        match channels {
            1 => image.into_luma8().into_raw(),
            2 => image.into_luma_alpha8().into_raw(),
            3 => image.into_rgb8().into_raw(),
            _ => image.into_rgba8().into_raw(),
        }
    }
}

impl Sample for u16 {
    const ELEMENT_CLASS: ElementClass = ElementClass::UInt16;

    fn put_le<B: BufMut>(self, buf: &mut B) {
        buf.put_u16_le(self);
    }

    fn from_image(image: DynamicImage, channels: u8) -> Vec<Self> {
        if sample_depth(&image) == 8 {
            return u8::from_image(image, channels)
                .into_iter()
                .map(u16::from)
                .collect();
        }
        match channels {
            1 => image.into_luma16().into_raw(),
            2 => image.into_luma_alpha16().into_raw(),
            3 => image.into_rgb16().into_raw(),
            _ => image.into_rgba16().into_raw(),
        }
    }
}

impl Sample for f32 {
    const ELEMENT_CLASS: ElementClass = ElementClass::Float32;

    fn put_le<B: BufMut>(self, buf: &mut B) {
        buf.put_f32_le(self);
    }

    fn from_image(image: DynamicImage, channels: u8) -> Vec<Self> {
        match sample_depth(&image) {
            8 => u8::from_image(image, channels)
                .into_iter()
                .map(f32::from)
                .collect(),
            16 => u16::from_image(image, channels)
                .into_iter()
                .map(f32::from)
                .collect(),
            _ => match channels {
                1 => image.to_luma32f().into_raw(),
                2 => image.to_luma_alpha32f().into_raw(),
                3 => image.into_rgb32f().into_raw(),
                _ => image.into_rgba32f().into_raw(),
            },
        }
    }
}
