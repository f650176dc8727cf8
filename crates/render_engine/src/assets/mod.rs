//! Asset decoding
//!
//! Decoders that turn files into the flat arrays the GPU layer uploads:
//! images become RGBA8 pixel buffers, models become deduplicated
//! vertex/index arrays. The renderer never touches file formats directly.

pub mod image_loader;
pub mod obj_loader;

pub use image_loader::ImageData;
pub use obj_loader::MeshData;

/// Asset loading errors
#[derive(thiserror::Error, Debug)]
pub enum AssetError {
    /// File could not be read
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// File contents could not be decoded
    #[error("decode error: {0}")]
    Decode(String),

    /// Decoded data violates an expected invariant
    #[error("invalid asset data: {0}")]
    InvalidData(String),
}
