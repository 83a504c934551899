//! Minimal raster backend.
//!
//! Used when the full backend's decoder set is not available. Decodes JPEG
//! and PNG only and normalizes every image to opaque RGB8, so alpha in
//! either the template or the photo is discarded. Resampling is Catmull-Rom.

use super::backend::{BackendError, ImageBackend, RasterImage};
use super::compose;
use super::params::{CompositeParams, Quality};
use super::rust_backend::{check_target, decode_formats, encode_jpeg_bytes};
use image::imageops::FilterType;
use image::{DynamicImage, ImageFormat};

const BASIC_FORMATS: &[ImageFormat] = &[ImageFormat::Jpeg, ImageFormat::Png];

#[derive(Debug, Default)]
pub struct BasicBackend;

impl BasicBackend {
    pub fn new() -> Self {
        Self
    }

    pub fn is_supported() -> bool {
        BASIC_FORMATS.iter().all(|fmt| fmt.reading_enabled()) && ImageFormat::Jpeg.writing_enabled()
    }
}

impl ImageBackend for BasicBackend {
    fn name(&self) -> &'static str {
        "basic"
    }

    fn decode(&self, bytes: &[u8]) -> Result<RasterImage, BackendError> {
        let image = decode_formats(bytes, BASIC_FORMATS)?;
        Ok(DynamicImage::ImageRgb8(image.into_rgb8()))
    }

    fn resize(&self, image: &RasterImage, width: u32, height: u32) -> Result<RasterImage, BackendError> {
        check_target(width, height)?;
        let resized = image.resize_exact(width, height, FilterType::CatmullRom);
        Ok(DynamicImage::ImageRgb8(resized.into_rgb8()))
    }

    fn composite(
        &self,
        template: RasterImage,
        source: &RasterImage,
        params: &CompositeParams,
    ) -> Result<RasterImage, BackendError> {
        let mut canvas = template.into_rgb8();
        let photo = source.to_rgb8();
        compose::composite_rgb(&mut canvas, &photo, params.x, params.y, params.blend);
        Ok(DynamicImage::ImageRgb8(canvas))
    }

    fn encode_jpeg(&self, image: &RasterImage, quality: Quality) -> Result<Vec<u8>, BackendError> {
        encode_jpeg_bytes(&DynamicImage::ImageRgb8(image.to_rgb8()), quality)
    }
}
