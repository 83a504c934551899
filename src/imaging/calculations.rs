//! Pure placement math for compositing a photo onto a template.
//!
//! All functions here are pure and testable without any I/O or images.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PlacementError {
    #[error("degenerate dimensions: source {source_w}x{source_h}, template {template_w}x{template_h}, max size {max_size}")]
    InvalidDimensions {
        source_w: u32,
        source_h: u32,
        template_w: u32,
        template_h: u32,
        max_size: u32,
    },
    #[error("unknown alignment '{0}' (expected one of: {names})", names = Alignment::NAMES.join(", "))]
    UnknownAlignment(String),
}

/// Where the resized photo is anchored on the template canvas.
///
/// Nine positions: top/center/bottom × left/center/right. The middle one is
/// spelled `center` rather than `center-center`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Alignment {
    TopLeft,
    TopCenter,
    TopRight,
    CenterLeft,
    #[default]
    Center,
    CenterRight,
    BottomLeft,
    BottomCenter,
    BottomRight,
}

/// Anchor along one axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Anchor {
    Start,
    Middle,
    End,
}

impl Anchor {
    /// Correction added to the offset for this anchor.
    fn correction(self, template: u32, scaled: u32) -> f64 {
        let free = template as f64 - scaled as f64;
        match self {
            Anchor::Start => 0.0,
            Anchor::Middle => free / 2.0,
            Anchor::End => free,
        }
    }
}

impl Alignment {
    pub const NAMES: [&'static str; 9] = [
        "top-left",
        "top-center",
        "top-right",
        "center-left",
        "center",
        "center-right",
        "bottom-left",
        "bottom-center",
        "bottom-right",
    ];

    const ALL: [Alignment; 9] = [
        Alignment::TopLeft,
        Alignment::TopCenter,
        Alignment::TopRight,
        Alignment::CenterLeft,
        Alignment::Center,
        Alignment::CenterRight,
        Alignment::BottomLeft,
        Alignment::BottomCenter,
        Alignment::BottomRight,
    ];

    pub fn as_str(self) -> &'static str {
        Self::NAMES[self as usize]
    }

    /// (horizontal, vertical) anchors.
    fn anchors(self) -> (Anchor, Anchor) {
        use Anchor::*;
        match self {
            Alignment::TopLeft => (Start, Start),
            Alignment::TopCenter => (Middle, Start),
            Alignment::TopRight => (End, Start),
            Alignment::CenterLeft => (Start, Middle),
            Alignment::Center => (Middle, Middle),
            Alignment::CenterRight => (End, Middle),
            Alignment::BottomLeft => (Start, End),
            Alignment::BottomCenter => (Middle, End),
            Alignment::BottomRight => (End, End),
        }
    }
}

impl FromStr for Alignment {
    type Err = PlacementError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::NAMES
            .iter()
            .position(|name| name.eq_ignore_ascii_case(s.trim()))
            .map(|i| Self::ALL[i])
            .ok_or_else(|| PlacementError::UnknownAlignment(s.to_string()))
    }
}

impl TryFrom<String> for Alignment {
    type Error = PlacementError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Alignment> for String {
    fn from(value: Alignment) -> Self {
        value.as_str().to_string()
    }
}

impl fmt::Display for Alignment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Additive pixel fine-tune applied before the alignment correction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Offset {
    pub x: i64,
    pub y: i64,
}

/// Size and top-left position of the resized photo on the canvas.
///
/// `x`/`y` may be negative or exceed the canvas; compositing clips.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Placement {
    pub width: u32,
    pub height: u32,
    pub x: i64,
    pub y: i64,
}

/// Compute the scaled photo size and its placement on the template.
///
/// The photo is scaled so its longer edge equals `max_size`, preserving the
/// aspect ratio. There is no clamp to `scale <= 1`: a photo smaller than
/// `max_size` is scaled up.
///
/// Position starts at `offset` and the alignment adds `0`, `(T - S) / 2` or
/// `T - S` on each axis. Both coordinates are computed in `f64` and rounded
/// half away from zero.
///
/// # Examples
/// ```
/// # use mockup_forge::imaging::{Alignment, Offset, compute_placement};
/// // 2000x1000 photo, long edge 500, centered on a 1000x800 template
/// let p = compute_placement((2000, 1000), 500, (1000, 800), Alignment::Center, Offset::default()).unwrap();
/// assert_eq!((p.width, p.height, p.x, p.y), (500, 250, 250, 275));
/// ```
pub fn compute_placement(
    source: (u32, u32),
    max_size: u32,
    template: (u32, u32),
    alignment: Alignment,
    offset: Offset,
) -> Result<Placement, PlacementError> {
    let (src_w, src_h) = source;
    let (tpl_w, tpl_h) = template;

    if src_w == 0 || src_h == 0 || tpl_w == 0 || tpl_h == 0 || max_size == 0 {
        return Err(PlacementError::InvalidDimensions {
            source_w: src_w,
            source_h: src_h,
            template_w: tpl_w,
            template_h: tpl_h,
            max_size,
        });
    }

    let (width, height) = scaled_dimensions(source, max_size);
    let (horizontal, vertical) = alignment.anchors();

    let x = offset.x as f64 + horizontal.correction(tpl_w, width);
    let y = offset.y as f64 + vertical.correction(tpl_h, height);

    Ok(Placement {
        width,
        height,
        x: x.round() as i64,
        y: y.round() as i64,
    })
}

/// Scale `source` so its longer edge becomes `max_size`.
///
/// Never returns a zero dimension; a 1px sliver stays 1px.
pub fn scaled_dimensions(source: (u32, u32), max_size: u32) -> (u32, u32) {
    let (src_w, src_h) = source;
    let scale = f64::min(
        max_size as f64 / src_w as f64,
        max_size as f64 / src_h as f64,
    );
    let w = (src_w as f64 * scale).round().max(1.0) as u32;
    let h = (src_h as f64 * scale).round().max(1.0) as u32;
    (w, h)
}
