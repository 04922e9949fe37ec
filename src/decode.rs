use kornia_image::{ImageError, ImageSize, allocator::CpuAllocator};

use crate::model::RgbImage;

#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("cannot identify image: {0}")]
    Format(#[from] image::ImageError),
    #[error("cannot build image buffer: {0}")]
    Buffer(#[from] ImageError),
}

/// Decodes an uploaded file into an RGB image, whatever its encoding.
pub fn decode_rgb8(bytes: &[u8]) -> Result<RgbImage, DecodeError> {
    let rgb = image::load_from_memory(bytes)?.into_rgb8();
    let size = ImageSize {
        width: rgb.width() as usize,
        height: rgb.height() as usize,
    };
    Ok(RgbImage::new(size, rgb.into_raw(), CpuAllocator)?)
}
