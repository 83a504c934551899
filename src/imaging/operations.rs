//! High-level image operations.
//!
//! These functions combine calculations with backend execution: compute the
//! placement, then ask the backend to do the pixel work.

use super::backend::{BackendError, ImageBackend, RasterImage};
use super::basic_backend::BasicBackend;
use super::calculations::{Placement, compute_placement};
use super::params::{CompositeParams, MockupParams};
use super::rust_backend::RustBackend;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Result type for image operations.
pub type Result<T> = std::result::Result<T, BackendError>;

/// Encoded mockup ready to persist.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MockupOutput {
    pub bytes: Vec<u8>,
    pub width: u32,
    pub height: u32,
}

/// Plan where the photo goes without touching pixels.
pub fn plan_mockup(params: &MockupParams, source: (u32, u32)) -> Result<Placement> {
    compute_placement(
        source,
        params.max_size,
        (params.canvas_width, params.canvas_height),
        params.alignment,
        params.offset,
    )
    .map_err(|_| BackendError::InvalidDimensions {
        width: params.canvas_width,
        height: params.canvas_height,
    })
}

/// Render one mockup.
///
/// The template is decoded and resized to the configured canvas; the photo
/// (already decoded, shared across variants) is resized so its long edge is
/// `max_size`, composited at the computed placement and the result encoded
/// as JPEG.
pub fn create_mockup(
    backend: &dyn ImageBackend,
    params: &MockupParams,
    source: &RasterImage,
    template_bytes: &[u8],
) -> Result<MockupOutput> {
    let template = backend.decode(template_bytes)?;
    let template = backend.resize(&template, params.canvas_width, params.canvas_height)?;

    let placement = plan_mockup(params, (source.width(), source.height()))?;
    let photo = backend.resize(source, placement.width, placement.height)?;

    let canvas = backend.composite(
        template,
        &photo,
        &CompositeParams {
            x: placement.x,
            y: placement.y,
            blend: params.blend,
        },
    )?;

    let bytes = backend.encode_jpeg(&canvas, params.quality)?;
    Ok(MockupOutput {
        bytes,
        width: canvas.width(),
        height: canvas.height(),
    })
}

/// Which backend to run with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendChoice {
    #[default]
    Auto,
    Full,
    Basic,
}

/// Pick the backend once at startup.
///
/// `Auto` prefers the full backend and falls back to the basic one when the
/// full decoder set is not compiled in.
pub fn select_backend(choice: BackendChoice) -> Result<Arc<dyn ImageBackend>> {
    match choice {
        BackendChoice::Full if RustBackend::is_supported() => Ok(Arc::new(RustBackend::new())),
        BackendChoice::Full => Err(BackendError::Unavailable("full")),
        BackendChoice::Basic if BasicBackend::is_supported() => Ok(Arc::new(BasicBackend::new())),
        BackendChoice::Basic => Err(BackendError::Unavailable("basic")),
        BackendChoice::Auto if RustBackend::is_supported() => Ok(Arc::new(RustBackend::new())),
        BackendChoice::Auto if BasicBackend::is_supported() => Ok(Arc::new(BasicBackend::new())),
        BackendChoice::Auto => Err(BackendError::Unavailable("auto")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::imaging::backend::tests::{MockBackend, RecordedOp, mock_image_bytes};
    use crate::imaging::{Alignment, BlendMode, Offset, Quality};
    use image::{DynamicImage, RgbImage};

    fn params() -> MockupParams {
        MockupParams {
            canvas_width: 1000,
            canvas_height: 800,
            max_size: 500,
            alignment: Alignment::Center,
            offset: Offset { x: 5, y: -5 },
            blend: BlendMode::Multiply,
            quality: Quality::new(85),
        }
    }

    fn photo(w: u32, h: u32) -> RasterImage {
        DynamicImage::ImageRgb8(RgbImage::new(w, h))
    }

    #[test]
    fn create_mockup_runs_pipeline_in_order() {
        let backend = MockBackend::new();
        let out = create_mockup(&backend, &params(), &photo(2000, 1000), &mock_image_bytes(300, 300)).unwrap();

        assert_eq!((out.width, out.height), (1000, 800));
        assert_eq!(
            backend.get_operations(),
            vec![
                RecordedOp::Decode(8),
                RecordedOp::Resize { width: 1000, height: 800 },
                RecordedOp::Resize { width: 500, height: 250 },
                RecordedOp::Composite {
                    x: 5 + 250,
                    y: -5 + 275,
                    blend: "multiply".into()
                },
                RecordedOp::Encode { quality: 85 },
            ]
        );
    }

    #[test]
    fn plan_uses_configured_canvas_not_template_size() {
        let p = plan_mockup(&params(), (1000, 2000)).unwrap();
        assert_eq!((p.width, p.height), (250, 500));
        assert_eq!((p.x, p.y), (5 + 375, -5 + 150));
    }

    #[test]
    fn plan_rejects_zero_canvas() {
        let mut p = params();
        p.canvas_height = 0;
        assert!(matches!(
            plan_mockup(&p, (10, 10)),
            Err(BackendError::InvalidDimensions { width: 1000, height: 0 })
        ));
    }

    #[test]
    fn template_decode_failure_stops_before_compositing() {
        let backend = MockBackend::new();
        let result = create_mockup(&backend, &params(), &photo(10, 10), b"!corrupt");
        assert!(matches!(result, Err(BackendError::Decode(_))));
        assert_eq!(backend.get_operations().len(), 1);
    }

    #[test]
    fn encode_failure_is_reported() {
        let backend = MockBackend::failing_encode();
        let result = create_mockup(&backend, &params(), &photo(10, 10), &mock_image_bytes(10, 10));
        assert!(matches!(result, Err(BackendError::Encode(_))));
    }

    #[test]
    fn select_backend_honours_choice() {
        assert_eq!(select_backend(BackendChoice::Full).unwrap().name(), "full");
        assert_eq!(select_backend(BackendChoice::Basic).unwrap().name(), "basic");
        assert_eq!(select_backend(BackendChoice::Auto).unwrap().name(), "full");
    }

    #[test]
    fn backend_choice_parses_lowercase() {
        #[derive(Deserialize)]
        struct Wrapper {
            backend: BackendChoice,
        }
        let w: Wrapper = toml::from_str("backend = \"basic\"").unwrap();
        assert_eq!(w.backend, BackendChoice::Basic);
        assert!(toml::from_str::<Wrapper>("backend = \"magick\"").is_err());
    }
}
