//! Parameter types for image operations.
//!
//! These structs describe *what* to do, not *how* to do it. They are the
//! interface between [`operations`](super::operations) (which decides what
//! to render) and the [`backend`](super::backend) (which does the pixel
//! work), so backends can be swapped, or mocked, without touching the
//! orchestration.
//!
//! ## Types
//!
//! - [`Quality`]: JPEG quality (1–100, default 90). Clamped on construction.
//! - [`BlendMode`]: how the photo is blended onto the template.
//! - [`CompositeParams`]: position and blend for one composite call.
//! - [`MockupParams`]: everything a variant contributes to one render.

use super::calculations::{Alignment, Offset};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Quality setting for lossy image encoding (1-100).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Quality(pub u8);

impl Quality {
    pub fn new(value: u32) -> Self {
        Self(value.clamp(1, 100) as u8)
    }

    pub fn value(self) -> u8 {
        self.0
    }
}

impl Default for Quality {
    fn default() -> Self {
        Self(90)
    }
}

/// Blend applied when the photo is drawn onto the template.
///
/// Deserialization is lenient: `"multiply"` (any case) selects
/// [`BlendMode::Multiply`], every other value falls back to
/// [`BlendMode::Normal`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum BlendMode {
    #[default]
    Normal,
    Multiply,
}

impl BlendMode {
    pub fn as_str(self) -> &'static str {
        match self {
            BlendMode::Normal => "normal",
            BlendMode::Multiply => "multiply",
        }
    }
}

impl From<String> for BlendMode {
    fn from(value: String) -> Self {
        if value.trim().eq_ignore_ascii_case("multiply") {
            BlendMode::Multiply
        } else {
            BlendMode::Normal
        }
    }
}

impl From<BlendMode> for String {
    fn from(value: BlendMode) -> Self {
        value.as_str().to_string()
    }
}

impl fmt::Display for BlendMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Parameters for a single composite call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompositeParams {
    /// Top-left corner of the photo on the canvas. May be negative.
    pub x: i64,
    pub y: i64,
    pub blend: BlendMode,
}

/// Geometry and encoding settings for one mockup render.
#[derive(Debug, Clone, PartialEq)]
pub struct MockupParams {
    /// Configured canvas size; the template is resized to exactly this.
    pub canvas_width: u32,
    pub canvas_height: u32,
    /// Long edge of the resized photo.
    pub max_size: u32,
    pub alignment: Alignment,
    pub offset: Offset,
    pub blend: BlendMode,
    pub quality: Quality,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quality_clamps_to_valid_range() {
        assert_eq!(Quality::new(0).value(), 1);
        assert_eq!(Quality::new(50).value(), 50);
        assert_eq!(Quality::new(150).value(), 100);
    }

    #[test]
    fn quality_default_is_90() {
        assert_eq!(Quality::default().value(), 90);
    }

    #[test]
    fn blend_mode_multiply_is_case_insensitive() {
        assert_eq!(BlendMode::from("Multiply".to_string()), BlendMode::Multiply);
    }

    #[test]
    fn blend_mode_unknown_falls_back_to_normal() {
        let mode: BlendMode = serde_json::from_str("\"screen\"").unwrap();
        assert_eq!(mode, BlendMode::Normal);
    }
}
