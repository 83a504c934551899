//! Full-featured backend built on the `image` crate.
//!
//! ## Crate mapping
//!
//! | Operation | Crate / function |
//! |---|---|
//! | Decode (JPEG, PNG, TIFF, WebP) | `image::ImageReader` with guessed format |
//! | Resize | `DynamicImage::resize_exact` with `Lanczos3` |
//! | Composite | [`compose::composite_rgba`](super::compose::composite_rgba), source coerced to the template's colour model |
//! | Encode → JPEG | `image::codecs::jpeg::JpegEncoder` |
//!
//! Grey templates stay grey: the photo is converted to luma before blending
//! and the result is converted back to the template's colour type.

use super::backend::{BackendError, ImageBackend, RasterImage};
use super::compose;
use super::params::{CompositeParams, Quality};
use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::{ColorType, DynamicImage, ExtendedColorType, ImageEncoder, ImageFormat, ImageReader, RgbaImage};
use std::io::Cursor;

/// Formats the full backend accepts.
const FULL_FORMATS: &[ImageFormat] = &[
    ImageFormat::Jpeg,
    ImageFormat::Png,
    ImageFormat::Tiff,
    ImageFormat::WebP,
];

/// Full backend. See the [module docs](self).
#[derive(Debug, Default)]
pub struct RustBackend;

impl RustBackend {
    pub fn new() -> Self {
        Self
    }

    /// True when every decoder this backend promises, plus the JPEG
    /// encoder, is compiled in.
    pub fn is_supported() -> bool {
        FULL_FORMATS.iter().all(|fmt| fmt.reading_enabled()) && ImageFormat::Jpeg.writing_enabled()
    }
}

/// Decode `bytes`, accepting only the listed formats.
pub(super) fn decode_formats(bytes: &[u8], allowed: &[ImageFormat]) -> Result<DynamicImage, BackendError> {
    let reader = ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()
        .map_err(|e| BackendError::Decode(e.to_string()))?;
    match reader.format() {
        Some(fmt) if allowed.contains(&fmt) => {}
        Some(fmt) => return Err(BackendError::Decode(format!("unsupported format {fmt:?}"))),
        None => return Err(BackendError::Decode("unrecognized image format".into())),
    }
    let image = reader
        .decode()
        .map_err(|e| BackendError::Decode(e.to_string()))?;
    if image.width() == 0 || image.height() == 0 {
        return Err(BackendError::InvalidDimensions {
            width: image.width(),
            height: image.height(),
        });
    }
    Ok(image)
}

/// Encode as baseline JPEG. Grey images are written as single-channel JPEG,
/// everything else as RGB; alpha is dropped.
pub(super) fn encode_jpeg_bytes(image: &DynamicImage, quality: Quality) -> Result<Vec<u8>, BackendError> {
    let mut buf = Vec::new();
    let encoder = JpegEncoder::new_with_quality(&mut buf, quality.value());
    let (width, height) = (image.width(), image.height());
    let result = if image.color().has_color() {
        let rgb = image.to_rgb8();
        encoder.write_image(rgb.as_raw(), width, height, ExtendedColorType::Rgb8)
    } else {
        let luma = image.to_luma8();
        encoder.write_image(luma.as_raw(), width, height, ExtendedColorType::L8)
    };
    result.map_err(|e| BackendError::Encode(e.to_string()))?;
    Ok(buf)
}

pub(super) fn check_target(width: u32, height: u32) -> Result<(), BackendError> {
    if width == 0 || height == 0 {
        return Err(BackendError::InvalidDimensions { width, height });
    }
    Ok(())
}

/// Convert the photo to the template's colour model.
fn coerce_to(source: &DynamicImage, color: ColorType) -> DynamicImage {
    if color.has_color() {
        source.clone()
    } else {
        DynamicImage::ImageLumaA8(source.to_luma_alpha8())
    }
}

/// Bring an RGBA8 working canvas back to `color`.
fn restore_colour_model(canvas: RgbaImage, color: ColorType) -> DynamicImage {
    let rgba = DynamicImage::ImageRgba8(canvas);
    match color {
        ColorType::L8 => DynamicImage::ImageLuma8(rgba.to_luma8()),
        ColorType::La8 => DynamicImage::ImageLumaA8(rgba.to_luma_alpha8()),
        ColorType::Rgb8 => DynamicImage::ImageRgb8(rgba.to_rgb8()),
        ColorType::L16 => DynamicImage::ImageLuma16(rgba.to_luma16()),
        ColorType::La16 => DynamicImage::ImageLumaA16(rgba.to_luma_alpha16()),
        ColorType::Rgb16 => DynamicImage::ImageRgb16(rgba.to_rgb16()),
        ColorType::Rgba16 => DynamicImage::ImageRgba16(rgba.to_rgba16()),
        ColorType::Rgb32F => DynamicImage::ImageRgb32F(rgba.to_rgb32f()),
        ColorType::Rgba32F => DynamicImage::ImageRgba32F(rgba.to_rgba32f()),
        _ => rgba,
    }
}

impl ImageBackend for RustBackend {
    fn name(&self) -> &'static str {
        "full"
    }

    fn decode(&self, bytes: &[u8]) -> Result<RasterImage, BackendError> {
        decode_formats(bytes, FULL_FORMATS)
    }

    fn resize(&self, image: &RasterImage, width: u32, height: u32) -> Result<RasterImage, BackendError> {
        check_target(width, height)?;
        Ok(image.resize_exact(width, height, FilterType::Lanczos3))
    }

    fn composite(
        &self,
        template: RasterImage,
        source: &RasterImage,
        params: &CompositeParams,
    ) -> Result<RasterImage, BackendError> {
        let color = template.color();
        let photo = coerce_to(source, color).to_rgba8();
        let mut canvas = template.into_rgba8();
        compose::composite_rgba(&mut canvas, &photo, params.x, params.y, params.blend);
        Ok(restore_colour_model(canvas, color))
    }

    fn encode_jpeg(&self, image: &RasterImage, quality: Quality) -> Result<Vec<u8>, BackendError> {
        encode_jpeg_bytes(image, quality)
    }
}
