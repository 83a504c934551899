//! Orientation classification.
//!
//! A photo is landscape when `width / height > 1.05`, portrait when the
//! ratio is below `0.95`, and square inside that band, so near-square photos
//! are not forced into either bucket.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

const LANDSCAPE_ABOVE: f64 = 1.05;
const PORTRAIT_BELOW: f64 = 0.95;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum OrientationError {
    #[error("invalid image metadata: {width}x{height}")]
    InvalidImageMetadata { width: u32, height: u32 },
    #[error("unknown orientation '{0}' (expected landscape, portrait or square)")]
    Unknown(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Orientation {
    Landscape,
    Portrait,
    Square,
}

impl Orientation {
    pub fn as_str(self) -> &'static str {
        match self {
            Orientation::Landscape => "landscape",
            Orientation::Portrait => "portrait",
            Orientation::Square => "square",
        }
    }
}

impl fmt::Display for Orientation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Orientation {
    type Err = OrientationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "landscape" => Ok(Orientation::Landscape),
            "portrait" => Ok(Orientation::Portrait),
            "square" => Ok(Orientation::Square),
            _ => Err(OrientationError::Unknown(s.to_string())),
        }
    }
}

/// Classify a photo by aspect ratio.
///
/// A zero dimension is [`OrientationError::InvalidImageMetadata`].
pub fn classify(width: u32, height: u32) -> Result<Orientation, OrientationError> {
    if width == 0 || height == 0 {
        return Err(OrientationError::InvalidImageMetadata { width, height });
    }
    let ratio = width as f64 / height as f64;
    Ok(if ratio > LANDSCAPE_ABOVE {
        Orientation::Landscape
    } else if ratio < PORTRAIT_BELOW {
        Orientation::Portrait
    } else {
        Orientation::Square
    })
}
