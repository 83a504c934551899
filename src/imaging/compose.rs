//! Pixel blending shared by both backends.
//!
//! Straight (non-premultiplied) 8-bit channels. Normal mode is source-over;
//! multiply follows the separable blend formula
//! `Cs' = (1 - ab)·Cs + ab·(Cb·Cs)` and is then composited source-over, so
//! an opaque template gets a plain multiply weighted by the photo's alpha.
//!
//! Placement outside the canvas is clipped silently: only the intersection
//! of the photo rectangle with the canvas is touched.

use super::params::BlendMode;
use image::{Pixel, RgbImage, Rgba, RgbaImage};

/// Intersection of a placed photo with the canvas.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VisibleRegion {
    pub src_x: u32,
    pub src_y: u32,
    pub dst_x: u32,
    pub dst_y: u32,
    pub width: u32,
    pub height: u32,
}

/// Clip a `source`-sized rectangle at `(x, y)` against a `canvas`-sized one.
///
/// Returns `None` when nothing of the photo lands on the canvas.
pub fn visible_region(canvas: (u32, u32), source: (u32, u32), x: i64, y: i64) -> Option<VisibleRegion> {
    let (dst_x0, src_x0, width) = clip_axis(canvas.0, source.0, x)?;
    let (dst_y0, src_y0, height) = clip_axis(canvas.1, source.1, y)?;
    Some(VisibleRegion {
        src_x: src_x0,
        src_y: src_y0,
        dst_x: dst_x0,
        dst_y: dst_y0,
        width,
        height,
    })
}

fn clip_axis(canvas: u32, source: u32, pos: i64) -> Option<(u32, u32, u32)> {
    let start = pos.max(0);
    let end = pos.saturating_add(i64::from(source)).min(i64::from(canvas));
    if end <= start {
        return None;
    }
    Some((start as u32, (start - pos) as u32, (end - start) as u32))
}

/// Composite `source` onto `canvas` in RGBA.
pub fn composite_rgba(canvas: &mut RgbaImage, source: &RgbaImage, x: i64, y: i64, blend: BlendMode) {
    let Some(region) = visible_region(canvas.dimensions(), source.dimensions(), x, y) else {
        return;
    };
    for row in 0..region.height {
        for col in 0..region.width {
            let src = source.get_pixel(region.src_x + col, region.src_y + row);
            let dst = canvas.get_pixel_mut(region.dst_x + col, region.dst_y + row);
            *dst = Rgba(blend_rgba(dst.0, src.0, blend));
        }
    }
}

/// Composite `source` onto `canvas` treating both as opaque.
pub fn composite_rgb(canvas: &mut RgbImage, source: &RgbImage, x: i64, y: i64, blend: BlendMode) {
    let Some(region) = visible_region(canvas.dimensions(), source.dimensions(), x, y) else {
        return;
    };
    for row in 0..region.height {
        for col in 0..region.width {
            let src = source.get_pixel(region.src_x + col, region.src_y + row);
            let dst = canvas.get_pixel_mut(region.dst_x + col, region.dst_y + row);
            *dst = match blend {
                BlendMode::Normal => *src,
                BlendMode::Multiply => dst.map2(src, mul_div255),
            };
        }
    }
}

/// Blend one straight-alpha source pixel onto a destination pixel.
pub fn blend_rgba(dst: [u8; 4], src: [u8; 4], blend: BlendMode) -> [u8; 4] {
    match blend {
        BlendMode::Normal => over(dst, src),
        BlendMode::Multiply => {
            let da = u32::from(dst[3]);
            let mut mixed = src;
            for i in 0..3 {
                let product = u32::from(mul_div255(dst[i], src[i]));
                let s = u32::from(src[i]);
                mixed[i] = ((s * (255 - da) + product * da + 127) / 255) as u8;
            }
            over(dst, mixed)
        }
    }
}

/// Straight-alpha source-over.
pub fn over(dst: [u8; 4], src: [u8; 4]) -> [u8; 4] {
    let sa = u32::from(src[3]);
    if sa == 0 {
        return dst;
    }
    if sa == 255 {
        return src;
    }
    let da = u32::from(dst[3]);
    let inv = 255 - sa;
    // out_a * 255 = sa * 255 + da * inv
    let out_a_255 = sa * 255 + da * inv;
    if out_a_255 == 0 {
        return [0, 0, 0, 0];
    }

    let mut out = [0u8; 4];
    for i in 0..3 {
        let num = u32::from(src[i]) * sa * 255 + u32::from(dst[i]) * da * inv;
        out[i] = ((num + out_a_255 / 2) / out_a_255) as u8;
    }
    out[3] = ((out_a_255 + 127) / 255) as u8;
    out
}

fn mul_div255(x: u8, y: u8) -> u8 {
    ((u32::from(x) * u32::from(y) + 127) / 255) as u8
}
