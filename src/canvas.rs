use std::collections::VecDeque;
use std::io::Cursor;
use std::path::{Path, PathBuf};

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use image::{ImageFormat, Rgb, RgbImage};
use serde::Serialize;

use crate::constants::{
    DEFAULT_BRUSH_THICKNESS, DEFAULT_CANVAS_ALPHA, MAX_UNDO_STEPS, UTILIZATION_HIGH_PERCENT,
    UTILIZATION_MEDIUM_PERCENT,
};
use crate::error::{Result, SketchError};
use crate::renderer::{self, Effects};
use crate::types::Point;
use crate::utils;

/// Magenta, the default brush.
pub const DEFAULT_BRUSH: Rgb<u8> = Rgb([255, 0, 255]);

/// One entry of the drawing log.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "action", rename_all = "lowercase")]
pub enum DrawAction {
    Draw {
        from: Option<Point>,
        to: Point,
        color: [u8; 3],
        thickness: u32,
    },
    Clear,
}

/// Summary numbers about what is on the canvas.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct DrawingStatistics {
    pub total_points: u64,
    pub drawn_pixels: u64,
    /// Percentage of non-black pixels, two decimals
    pub canvas_coverage: f64,
    pub drawing_actions: usize,
    pub canvas_size: String,
    /// Number of separate 8-connected stroke groups
    pub num_objects: usize,
    /// Area of the bounding box around all strokes
    pub drawing_area: u64,
    /// Drawn pixels per bounding-box pixel, four decimals
    pub drawing_density: f64,
    pub canvas_utilization: &'static str,
}

/// Persistent drawing surface plus pen state and undo history.
#[derive(Debug, Clone)]
pub struct CanvasSurface {
    pixels: RgbImage,
    previous_point: Option<Point>,
    brush_color: Rgb<u8>,
    brush_thickness: u32,
    canvas_alpha: f32,
    total_stroke_count: u64,
    undo_history: VecDeque<RgbImage>,
    drawing_history: Vec<DrawAction>,
}

impl CanvasSurface {
    /// Allocate a black canvas. Zero-sized canvases are rejected.
    pub fn new(width: u32, height: u32) -> Result<Self> {
        if width == 0 || height == 0 {
            return Err(SketchError::InvalidDimensions { width, height });
        }
        Ok(Self {
            pixels: RgbImage::new(width, height),
            previous_point: None,
            brush_color: DEFAULT_BRUSH,
            brush_thickness: DEFAULT_BRUSH_THICKNESS,
            canvas_alpha: DEFAULT_CANVAS_ALPHA,
            total_stroke_count: 0,
            undo_history: VecDeque::with_capacity(MAX_UNDO_STEPS),
            drawing_history: Vec::new(),
        })
    }

    /// Change brush and blend settings. `canvas_alpha` is clamped to [0, 1].
    pub fn update_settings(&mut self, brush_color: Rgb<u8>, brush_thickness: u32, canvas_alpha: f32) {
        self.brush_color = brush_color;
        self.brush_thickness = brush_thickness.max(1);
        self.canvas_alpha = canvas_alpha.clamp(0.0, 1.0);
    }

    /// Extend the current stroke to `point`.
    ///
    /// Without a previous point (first contact after a gap) a dot is drawn
    /// instead of a line.
    pub fn draw_to(&mut self, point: Point) {
        match self.previous_point {
            Some(prev) => renderer::draw_thick_line(
                &mut self.pixels,
                prev,
                point,
                self.brush_thickness,
                self.brush_color,
            ),
            None => renderer::draw_filled_disc(
                &mut self.pixels,
                point,
                self.brush_thickness / 2,
                self.brush_color,
            ),
        }

        self.drawing_history.push(DrawAction::Draw {
            from: self.previous_point,
            to: point,
            color: self.brush_color.0,
            thickness: self.brush_thickness,
        });
        self.total_stroke_count += 1;
        self.previous_point = Some(point);
    }

    /// End the current stroke so the next `draw_to` starts a new one.
    pub fn lift_pen(&mut self) {
        self.previous_point = None;
    }

    /// Blank the canvas, keeping the old contents for `undo`.
    pub fn clear(&mut self) {
        self.push_undo_snapshot();
        self.pixels = RgbImage::new(self.pixels.width(), self.pixels.height());
        self.previous_point = None;
        self.total_stroke_count = 0;
        self.drawing_history.push(DrawAction::Clear);
    }

    fn push_undo_snapshot(&mut self) {
        if self.undo_history.len() == MAX_UNDO_STEPS {
            self.undo_history.pop_front();
        }
        self.undo_history.push_back(self.pixels.clone());
    }

    /// Restore the most recent snapshot. Returns `false` when there is none.
    pub fn undo(&mut self) -> bool {
        match self.undo_history.pop_back() {
            Some(snapshot) => {
                self.pixels = snapshot;
                self.previous_point = None;
                true
            }
            None => false,
        }
    }

    /// Blend the canvas over `frame` using the configured weights.
    ///
    /// If the frame size differs, the canvas is stretched to it first and
    /// keeps the new size.
    pub fn composite_onto(&mut self, frame: &RgbImage) -> RgbImage {
        self.composite_with(frame, &Effects::default())
    }

    pub fn composite_with(&mut self, frame: &RgbImage, effects: &Effects) -> RgbImage {
        if self.pixels.dimensions() != frame.dimensions() {
            log::warn!(
                "Frame size changed {:?} -> {:?}; stretching canvas",
                self.pixels.dimensions(),
                frame.dimensions()
            );
            self.pixels = renderer::resize_to(&self.pixels, frame.width(), frame.height());
        }

        let canvas_alpha = self.canvas_alpha;
        let frame_alpha = 1.0 - canvas_alpha;
        if effects.is_empty() {
            renderer::blend_weighted(frame, &self.pixels, frame_alpha, canvas_alpha)
        } else {
            let styled = renderer::apply_effects(&self.pixels, effects);
            renderer::blend_weighted(frame, &styled, frame_alpha, canvas_alpha)
        }
    }

    /// Copy of the pixel buffer, e.g. for recognition.
    pub fn snapshot(&self) -> RgbImage {
        self.pixels.clone()
    }

    pub fn pixels(&self) -> &RgbImage {
        &self.pixels
    }

    pub fn dimensions(&self) -> (u32, u32) {
        self.pixels.dimensions()
    }

    pub fn is_blank(&self) -> bool {
        self.pixels.as_raw().iter().all(|&b| b == 0)
    }

    pub fn previous_point(&self) -> Option<Point> {
        self.previous_point
    }

    pub fn total_stroke_count(&self) -> u64 {
        self.total_stroke_count
    }

    pub fn undo_depth(&self) -> usize {
        self.undo_history.len()
    }

    pub fn brush_color(&self) -> Rgb<u8> {
        self.brush_color
    }

    pub fn brush_thickness(&self) -> u32 {
        self.brush_thickness
    }

    pub fn canvas_alpha(&self) -> f32 {
        self.canvas_alpha
    }

    pub fn drawing_history(&self) -> &[DrawAction] {
        &self.drawing_history
    }

    /// Encode the canvas as PNG.
    pub fn png_bytes(&self) -> Result<Vec<u8>> {
        encode_png(&self.pixels)
    }

    /// PNG encoded as standard base64.
    pub fn export_png_base64(&self) -> Result<String> {
        Ok(BASE64.encode(self.png_bytes()?))
    }

    /// Write the canvas to `dir`, named `drawing_YYYYMMDD_HHMMSS.png` unless
    /// `filename` is given. A blank canvas is not saved.
    pub fn save_png(&self, dir: &Path, filename: Option<&str>) -> Result<PathBuf> {
        if self.is_blank() {
            return Err(SketchError::NothingToSave);
        }
        std::fs::create_dir_all(dir)?;

        let name = match filename {
            Some(name) => name.to_string(),
            None => utils::timestamped_filename("drawing", "png"),
        };
        let path = dir.join(name);
        self.pixels.save_with_format(&path, ImageFormat::Png)?;

        log::info!("Saved drawing to {}", path.display());
        Ok(path)
    }

    /// Replace the canvas with an image from disk.
    ///
    /// The stroke count becomes the number of non-black pixels since the
    /// individual strokes are unknown.
    pub fn load_png(&mut self, path: &Path) -> Result<()> {
        if !path.exists() {
            return Err(SketchError::NotFound(path.to_path_buf()));
        }
        let loaded = image::open(path)?.to_rgb8();
        self.total_stroke_count = loaded.pixels().filter(|p| renderer::luma(p) > 0.0).count() as u64;
        self.pixels = loaded;
        self.previous_point = None;

        log::info!(
            "Loaded drawing {} ({}x{})",
            path.display(),
            self.pixels.width(),
            self.pixels.height()
        );
        Ok(())
    }

    pub fn statistics(&self) -> DrawingStatistics {
        let (width, height) = self.pixels.dimensions();
        let total_pixels = width as u64 * height as u64;

        let mask: Vec<bool> = self.pixels.pixels().map(|p| renderer::luma(p) > 0.0).collect();
        let drawn_pixels = mask.iter().filter(|&&m| m).count() as u64;
        let coverage = drawn_pixels as f64 / total_pixels as f64 * 100.0;

        let (num_objects, bbox) = connected_components(&mask, width as usize, height as usize);
        let drawing_area = bbox
            .map(|(min_x, min_y, max_x, max_y)| {
                (max_x - min_x + 1) as u64 * (max_y - min_y + 1) as u64
            })
            .unwrap_or(0);
        let drawing_density = if drawing_area > 0 {
            drawn_pixels as f64 / drawing_area as f64
        } else {
            0.0
        };

        let canvas_utilization = if coverage > UTILIZATION_HIGH_PERCENT {
            "High"
        } else if coverage > UTILIZATION_MEDIUM_PERCENT {
            "Medium"
        } else {
            "Low"
        };

        DrawingStatistics {
            total_points: self.total_stroke_count,
            drawn_pixels,
            canvas_coverage: utils::round_to(coverage, 2),
            drawing_actions: self.drawing_history.len(),
            canvas_size: format!("{}x{}", width, height),
            num_objects,
            drawing_area,
            drawing_density: utils::round_to(drawing_density, 4),
            canvas_utilization,
        }
    }
}

pub(crate) fn encode_png(img: &RgbImage) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    img.write_to(&mut Cursor::new(&mut buf), ImageFormat::Png)?;
    Ok(buf)
}

/// Count 8-connected groups of set cells and return their joint bounding box
/// as `(min_x, min_y, max_x, max_y)`.
fn connected_components(
    mask: &[bool],
    width: usize,
    height: usize,
) -> (usize, Option<(usize, usize, usize, usize)>) {
    let mut visited = vec![false; mask.len()];
    let mut count = 0;
    let mut bbox: Option<(usize, usize, usize, usize)> = None;
    let mut stack = Vec::new();

    for start in 0..mask.len() {
        if !mask[start] || visited[start] {
            continue;
        }
        count += 1;
        visited[start] = true;
        stack.push(start);

        while let Some(idx) = stack.pop() {
            let (x, y) = (idx % width, idx / width);
            bbox = Some(match bbox {
                None => (x, y, x, y),
                Some((a, b, c, d)) => (a.min(x), b.min(y), c.max(x), d.max(y)),
            });

            for ny in y.saturating_sub(1)..=(y + 1).min(height - 1) {
                for nx in x.saturating_sub(1)..=(x + 1).min(width - 1) {
                    let n = ny * width + nx;
                    if mask[n] && !visited[n] {
                        visited[n] = true;
                        stack.push(n);
                    }
                }
            }
        }
    }

    (count, bbox)
}
