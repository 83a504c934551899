//! Image processing: placement math, pixel blending and codec backends.
//!
//! | Operation | Crate / function |
//! |---|---|
//! | **Decode** | `image::ImageReader` (guessed format) |
//! | **Resize** | `resize_exact` (Lanczos3 full / Catmull-Rom basic) |
//! | **Composite** | [`compose`] alpha-over / multiply with clipping |
//! | **Encode → JPEG** | `image::codecs::jpeg::JpegEncoder` |
//!
//! The module is split into:
//! - **Calculations**: pure placement math (unit testable)
//! - **Compose**: per-pixel blend math shared by both backends
//! - **Parameters**: data structures describing a render
//! - **Backend**: [`ImageBackend`] trait + [`RustBackend`] and [`BasicBackend`]
//! - **Operations**: [`create_mockup`] and [`select_backend`]

pub mod backend;
pub mod basic_backend;
mod calculations;
pub mod compose;
pub mod operations;
mod params;
pub mod rust_backend;

pub use backend::{BackendError, ImageBackend, RasterImage};
pub use basic_backend::BasicBackend;
pub use calculations::{Alignment, Offset, Placement, PlacementError, compute_placement, scaled_dimensions};
pub use operations::{BackendChoice, MockupOutput, create_mockup, plan_mockup, select_backend};
pub use params::{BlendMode, CompositeParams, MockupParams, Quality};
pub use rust_backend::RustBackend;
