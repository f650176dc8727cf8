//! Image decoding for texture upload
//!
//! All images are expanded to RGBA8 regardless of the source format so the
//! upload path can assume 4 bytes per pixel.

use std::path::Path;

use crate::assets::AssetError;

/// Decoded image data ready for GPU upload
#[derive(Debug, Clone)]
pub struct ImageData {
    /// Raw RGBA pixel data, `4 * width * height` bytes
    pub data: Vec<u8>,
    /// Image width in pixels
    pub width: u32,
    /// Image height in pixels
    pub height: u32,
    /// Number of color channels, always 4 after decoding
    pub channels: u8,
}

impl ImageData {
    /// Decode an image file, expanding to RGBA8
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, AssetError> {
        let path = path.as_ref();
        log::debug!("Loading image from {:?}", path);

        let decoded = image::open(path)
            .map_err(|e| AssetError::Decode(format!("failed to decode {:?}: {}", path, e)))?;

        let rgba = decoded.to_rgba8();
        let (width, height) = rgba.dimensions();
        log::info!("Loaded image {}x{} from {:?}", width, height, path);

        Ok(Self {
            data: rgba.into_raw(),
            width,
            height,
            channels: 4,
        })
    }

    /// Decode an image from an in-memory byte slice, expanding to RGBA8
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, AssetError> {
        let decoded = image::load_from_memory(bytes)
            .map_err(|e| AssetError::Decode(format!("failed to decode image bytes: {}", e)))?;

        let rgba = decoded.to_rgba8();
        let (width, height) = rgba.dimensions();

        Ok(Self {
            data: rgba.into_raw(),
            width,
            height,
            channels: 4,
        })
    }

    /// Create a solid-color image, used as a fallback when no texture file
    /// is available
    pub fn solid_color(width: u32, height: u32, color: [u8; 4]) -> Self {
        let pixel_count = (width * height) as usize;
        let mut data = Vec::with_capacity(pixel_count * 4);
        for _ in 0..pixel_count {
            data.extend_from_slice(&color);
        }

        Self {
            data,
            width,
            height,
            channels: 4,
        }
    }

    /// Size of the pixel data in bytes
    pub fn size_bytes(&self) -> usize {
        self.data.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn solid_color_fills_every_pixel() {
        let image = ImageData::solid_color(4, 2, [10, 20, 30, 255]);

        assert_eq!(image.width, 4);
        assert_eq!(image.height, 2);
        assert_eq!(image.channels, 4);
        assert_eq!(image.size_bytes(), 4 * 4 * 2);
        for pixel in image.data.chunks_exact(4) {
            assert_eq!(pixel, [10, 20, 30, 255]);
        }
    }

    #[test]
    fn size_matches_four_bytes_per_pixel() {
        let image = ImageData::solid_color(300, 200, [0, 0, 0, 0]);
        assert_eq!(image.size_bytes(), 4 * 300 * 200);
    }
}
