use image::{imageops, Rgb, RgbImage};
use serde::{Deserialize, Serialize};

use crate::types::Point;

/// Post-processing applied to the canvas before it is blended.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Effects {
    pub blur: bool,
    pub glow: bool,
    pub shadow: bool,
}

impl Effects {
    pub fn is_empty(&self) -> bool {
        !(self.blur || self.glow || self.shadow)
    }
}

/// Stamp a filled disc of `radius` pixels centred on `center`.
pub fn draw_filled_disc(img: &mut RgbImage, center: Point, radius: u32, color: Rgb<u8>) {
    let r = radius as i64;
    let r_sq = r * r;
    let (cx, cy) = (center.x as i64, center.y as i64);

    // 1. Clamp the bounding box to the image
    let (width, height) = (img.width() as i64, img.height() as i64);
    let start_x = (cx - r).max(0);
    let start_y = (cy - r).max(0);
    let end_x = (cx + r + 1).min(width);
    let end_y = (cy + r + 1).min(height);

    // 2. Fill pixels inside the circle
    for y in start_y..end_y {
        for x in start_x..end_x {
            let dx = x - cx;
            let dy = y - cy;
            if dx * dx + dy * dy <= r_sq {
                img.put_pixel(x as u32, y as u32, color);
            }
        }
    }
}

/// Draw a ring (circle outline) of the given stroke width.
pub fn draw_ring(img: &mut RgbImage, center: Point, radius: u32, stroke: u32, color: Rgb<u8>) {
    let outer = (radius + stroke / 2) as f32;
    let inner = radius.saturating_sub(stroke.div_ceil(2)) as f32;
    let (cx, cy) = (center.x as f32, center.y as f32);

    let (width, height) = (img.width() as i64, img.height() as i64);
    let reach = outer.ceil() as i64;
    let start_x = (center.x as i64 - reach).max(0);
    let start_y = (center.y as i64 - reach).max(0);
    let end_x = (center.x as i64 + reach + 1).min(width);
    let end_y = (center.y as i64 + reach + 1).min(height);

    for y in start_y..end_y {
        for x in start_x..end_x {
            let d = ((x as f32 - cx).powi(2) + (y as f32 - cy).powi(2)).sqrt();
            if d <= outer && d >= inner {
                img.put_pixel(x as u32, y as u32, color);
            }
        }
    }
}

/// Draw a straight segment `thickness` pixels wide with round caps.
///
/// A pixel is painted when its distance to the segment is at most half the
/// thickness, which keeps joints between consecutive segments closed.
pub fn draw_thick_line(img: &mut RgbImage, from: Point, to: Point, thickness: u32, color: Rgb<u8>) {
    let half = (thickness.max(1) as f32) / 2.0;
    let (ax, ay) = (from.x as f32, from.y as f32);
    let (bx, by) = (to.x as f32, to.y as f32);
    let (abx, aby) = (bx - ax, by - ay);
    let len_sq = abx * abx + aby * aby;

    // 1. Bounding box of the capsule, clamped to the image
    let reach = half.ceil() as i64;
    let (width, height) = (img.width() as i64, img.height() as i64);
    let start_x = (from.x.min(to.x) as i64 - reach).max(0);
    let start_y = (from.y.min(to.y) as i64 - reach).max(0);
    let end_x = (from.x.max(to.x) as i64 + reach + 1).min(width);
    let end_y = (from.y.max(to.y) as i64 + reach + 1).min(height);

    // 2. Distance test per pixel
    for y in start_y..end_y {
        for x in start_x..end_x {
            let (px, py) = (x as f32, y as f32);
            let t = if len_sq < f32::EPSILON {
                0.0
            } else {
                (((px - ax) * abx + (py - ay) * aby) / len_sq).clamp(0.0, 1.0)
            };
            let dx = px - (ax + t * abx);
            let dy = py - (ay + t * aby);
            if dx * dx + dy * dy <= half * half {
                img.put_pixel(x as u32, y as u32, color);
            }
        }
    }
}

#[inline(always)]
fn weighted(bg: u8, fg: u8, bg_weight: f32, fg_weight: f32) -> u8 {
    (bg as f32 * bg_weight + fg as f32 * fg_weight)
        .round()
        .clamp(0.0, 255.0) as u8
}

/// Weighted sum `frame * frame_alpha + canvas * canvas_alpha` per channel.
///
/// Both images must have the same dimensions; the caller resizes first.
pub fn blend_weighted(
    frame: &RgbImage,
    canvas: &RgbImage,
    frame_alpha: f32,
    canvas_alpha: f32,
) -> RgbImage {
    debug_assert_eq!(frame.dimensions(), canvas.dimensions());

    let mut out = frame.clone();
    for (dst, src) in out.pixels_mut().zip(canvas.pixels()) {
        for c in 0..3 {
            dst[c] = weighted(dst[c], src[c], frame_alpha, canvas_alpha);
        }
    }
    out
}

/// Stretch `img` to `width` x `height`. Strokes are scaled, not re-drawn.
pub fn resize_to(img: &RgbImage, width: u32, height: u32) -> RgbImage {
    imageops::resize(img, width, height, imageops::FilterType::Triangle)
}

/// Brush preview in the top-right corner: a filled disc with a white ring.
pub fn draw_brush_swatch(img: &mut RgbImage, color: Rgb<u8>) {
    if img.width() < 50 || img.height() < 30 {
        return;
    }
    let center = Point::new(img.width() as i32 - 50, 30);
    draw_filled_disc(img, center, 20, color);
    draw_ring(img, center, 20, 2, Rgb([255, 255, 255]));
}

/// Apply the enabled effects in order blur, glow, shadow.
pub fn apply_effects(canvas: &RgbImage, effects: &Effects) -> RgbImage {
    let mut out = canvas.clone();

    if effects.blur {
        out = imageops::blur(&out, 1.0);
    }

    if effects.glow {
        // Brightened wide blur underneath the sharp strokes
        let mut glow = imageops::blur(&out, 3.0);
        for p in glow.pixels_mut() {
            for c in 0..3 {
                p[c] = (p[c] as f32 * 1.5).min(255.0) as u8;
            }
        }
        for (dst, g) in out.pixels_mut().zip(glow.pixels()) {
            for c in 0..3 {
                dst[c] = dst[c].max(g[c]);
            }
        }
    }

    if effects.shadow {
        out = drop_shadow(&out, 3);
    }

    out
}

/// Copy of the strokes offset by `offset` pixels, masked by luminance and
/// mixed 20/80 with the input.
fn drop_shadow(img: &RgbImage, offset: u32) -> RgbImage {
    let (width, height) = img.dimensions();
    let mut shadow = RgbImage::new(width, height);

    for (x, y, p) in img.enumerate_pixels() {
        let (sx, sy) = (x + offset, y + offset);
        if sx >= width || sy >= height {
            continue;
        }
        let mask = luma(p) / 255.0;
        if mask > 0.0 {
            let dst = shadow.get_pixel_mut(sx, sy);
            for c in 0..3 {
                dst[c] = weighted(dst[c], p[c], 1.0 - mask, mask);
            }
        }
    }

    let mut out = img.clone();
    for (dst, s) in out.pixels_mut().zip(shadow.pixels()) {
        for c in 0..3 {
            dst[c] = weighted(s[c], dst[c], 0.2, 0.8);
        }
    }
    out
}

#[inline]
pub(crate) fn luma(p: &Rgb<u8>) -> f32 {
    0.299 * p[0] as f32 + 0.587 * p[1] as f32 + 0.114 * p[2] as f32
}
