//! Image codec backend trait and shared types.
//!
//! The [`ImageBackend`] trait is the capability set every backend must
//! support: decode, resize, composite and JPEG encode. Two implementations
//! ship with the crate:
//!
//! | Backend | Decodes | Resampling | Compositing |
//! |---|---|---|---|
//! | [`RustBackend`](super::rust_backend::RustBackend) | JPEG, PNG, TIFF, WebP, any colour model | Lanczos3 | alpha-aware, in the template's colour model |
//! | [`BasicBackend`](super::basic_backend::BasicBackend) | JPEG, PNG | Catmull-Rom | opaque RGB |
//!
//! The backend is chosen once at startup by
//! [`select_backend`](super::operations::select_backend); callers only ever
//! see `dyn ImageBackend`.

use super::params::{CompositeParams, Quality};
use image::DynamicImage;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BackendError {
    #[error("decode failed: {0}")]
    Decode(String),
    #[error("encode failed: {0}")]
    Encode(String),
    #[error("invalid image dimensions {width}x{height}")]
    InvalidDimensions { width: u32, height: u32 },
    #[error("backend '{0}' is not available in this build")]
    Unavailable(&'static str),
}

/// Decoded raster image. Both backends share the `image` crate's buffer type.
pub type RasterImage = DynamicImage;

/// Trait for image codec backends.
///
/// Implementations must be interchangeable: same inputs, same error kinds,
/// output canvas always the size of the template passed to `composite`.
pub trait ImageBackend: Send + Sync {
    /// Short identifier used in logs ("full", "basic").
    fn name(&self) -> &'static str;

    /// Decode an encoded image. Malformed or unsupported input is
    /// [`BackendError::Decode`], never a panic.
    fn decode(&self, bytes: &[u8]) -> Result<RasterImage, BackendError>;

    /// Resize to exactly `width` x `height` with a high-quality filter.
    fn resize(
        &self,
        image: &RasterImage,
        width: u32,
        height: u32,
    ) -> Result<RasterImage, BackendError>;

    /// Draw `source` onto `template` at the given position and blend.
    /// Pixels falling outside the template are clipped.
    fn composite(
        &self,
        template: RasterImage,
        source: &RasterImage,
        params: &CompositeParams,
    ) -> Result<RasterImage, BackendError>;

    /// Encode as baseline JPEG.
    fn encode_jpeg(&self, image: &RasterImage, quality: Quality) -> Result<Vec<u8>, BackendError>;
}
