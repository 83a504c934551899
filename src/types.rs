//! Shared identifiers and the source image handed over by the host.

use crate::digest::hash_bytes;
use image::ImageReader;
use std::io::Cursor;

/// Host entity owning a source image (e.g. a product).
pub type EntityId = u64;
/// Asset identifier assigned by the host's asset store.
pub type AssetId = u64;
pub type VariantId = String;
pub type CategoryId = String;

/// Raster asset read from the host. The core never writes it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceImage {
    pub asset_id: AssetId,
    pub width: u32,
    pub height: u32,
    pub bytes: Vec<u8>,
    /// Lowercase hex SHA-256 of `bytes`.
    pub content_hash: String,
}

impl SourceImage {
    /// Build from encoded bytes, probing the dimensions from the image
    /// header. Unreadable headers yield `0x0`, which the orchestrator rejects
    /// as invalid metadata.
    pub fn from_bytes(asset_id: AssetId, bytes: Vec<u8>) -> Self {
        let (width, height) = ImageReader::new(Cursor::new(&bytes))
            .with_guessed_format()
            .ok()
            .and_then(|reader| reader.into_dimensions().ok())
            .unwrap_or((0, 0));
        let content_hash = hash_bytes(&bytes);
        Self {
            asset_id,
            width,
            height,
            bytes,
            content_hash,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::solid_png;

    #[test]
    fn from_bytes_probes_dimensions() {
        let img = SourceImage::from_bytes(7, solid_png(31, 17, [0, 0, 0, 255]));
        assert_eq!((img.width, img.height), (31, 17));
        assert_eq!(img.content_hash.len(), 64);
    }

    #[test]
    fn from_bytes_unreadable_is_zero_sized() {
        let img = SourceImage::from_bytes(1, b"nope".to_vec());
        assert_eq!((img.width, img.height), (0, 0));
    }
}
