use std::io::Cursor;

use image::{ImageFormat, ImageResult, Rgba, RgbaImage};

use crate::models::Attachment;

pub const DEFAULT_WIDTH: u32 = 600;
pub const DEFAULT_HEIGHT: u32 = 200;
pub const SIGNATURE_FILENAME: &str = "signature.png";

const PEN: Rgba<u8> = Rgba([17, 24, 39, 255]);
const PEN_RADIUS: i64 = 1;

/// Freehand signature raster. A fresh or cleared pad has every channel of every
/// pixel at zero, and that is the only state treated as unsigned.
#[derive(Debug, Clone)]
pub struct SignaturePad {
    canvas: RgbaImage,
    cursor: Option<(f32, f32)>,
}

impl Default for SignaturePad {
    fn default() -> Self {
        Self::new(DEFAULT_WIDTH, DEFAULT_HEIGHT)
    }
}

impl SignaturePad {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            canvas: RgbaImage::new(width, height),
            cursor: None,
        }
    }

    pub fn from_image(canvas: RgbaImage) -> Self {
        Self {
            canvas,
            cursor: None,
        }
    }

    pub fn width(&self) -> u32 {
        self.canvas.width()
    }

    pub fn height(&self) -> u32 {
        self.canvas.height()
    }

    /// Starts a stroke. Non-finite coordinates are ignored.
    pub fn begin_stroke(&mut self, x: f32, y: f32) {
        if !(x.is_finite() && y.is_finite()) {
            return;
        }
        self.draw_segment((x, y), (x, y));
        self.cursor = Some((x, y));
    }

    /// Extends the current stroke. Segments are clipped to the canvas before
    /// rasterizing; non-finite coordinates leave the stroke untouched.
    pub fn line_to(&mut self, x: f32, y: f32) {
        if !(x.is_finite() && y.is_finite()) {
            return;
        }
        let from = self.cursor.unwrap_or((x, y));
        self.draw_segment(from, (x, y));
        self.cursor = Some((x, y));
    }

    pub fn end_stroke(&mut self) {
        self.cursor = None;
    }

    pub fn clear(&mut self) {
        self.canvas.iter_mut().for_each(|channel| *channel = 0);
        self.cursor = None;
    }

    pub fn is_empty(&self) -> bool {
        self.canvas.iter().all(|channel| *channel == 0)
    }

    pub fn to_png(&self) -> ImageResult<Vec<u8>> {
        let mut cursor = Cursor::new(Vec::new());
        self.canvas.write_to(&mut cursor, ImageFormat::Png)?;
        Ok(cursor.into_inner())
    }

    pub fn to_attachment(&self) -> ImageResult<Attachment> {
        Ok(Attachment::new(SIGNATURE_FILENAME, "image/png", self.to_png()?))
    }

    fn draw_segment(&mut self, from: (f32, f32), to: (f32, f32)) {
        let margin = PEN_RADIUS as f64;
        let bounds = (
            -margin,
            -margin,
            f64::from(self.canvas.width()) - 1.0 + margin,
            f64::from(self.canvas.height()) - 1.0 + margin,
        );
        let from = (f64::from(from.0), f64::from(from.1));
        let to = (f64::from(to.0), f64::from(to.1));
        if let Some((start, end)) = clip_segment(from, to, bounds) {
            self.draw_line(to_point(start), to_point(end));
        }
    }

    fn draw_line(&mut self, (x0, y0): (i64, i64), (x1, y1): (i64, i64)) {
        let dx = (x1 - x0).abs();
        let dy = -(y1 - y0).abs();
        let sx = if x0 < x1 { 1 } else { -1 };
        let sy = if y0 < y1 { 1 } else { -1 };
        let mut err = dx + dy;
        let (mut x, mut y) = (x0, y0);

        loop {
            self.stamp((x, y));
            if x == x1 && y == y1 {
                break;
            }
            let e2 = 2 * err;
            if e2 >= dy {
                err += dy;
                x += sx;
            }
            if e2 <= dx {
                err += dx;
                y += sy;
            }
        }
    }

    fn stamp(&mut self, (cx, cy): (i64, i64)) {
        let width = i64::from(self.canvas.width());
        let height = i64::from(self.canvas.height());
        for y in (cy - PEN_RADIUS)..=(cy + PEN_RADIUS) {
            for x in (cx - PEN_RADIUS)..=(cx + PEN_RADIUS) {
                if (0..width).contains(&x) && (0..height).contains(&y) {
                    self.canvas.put_pixel(x as u32, y as u32, PEN);
                }
            }
        }
    }
}

fn to_point((x, y): (f64, f64)) -> (i64, i64) {
    (x.round() as i64, y.round() as i64)
}

/// Liang-Barsky clip of a segment against `(min_x, min_y, max_x, max_y)`.
fn clip_segment(
    (x0, y0): (f64, f64),
    (x1, y1): (f64, f64),
    (min_x, min_y, max_x, max_y): (f64, f64, f64, f64),
) -> Option<((f64, f64), (f64, f64))> {
    let (dx, dy) = (x1 - x0, y1 - y0);
    let mut t0 = 0.0_f64;
    let mut t1 = 1.0_f64;

    for (p, q) in [
        (-dx, x0 - min_x),
        (dx, max_x - x0),
        (-dy, y0 - min_y),
        (dy, max_y - y0),
    ] {
        if p == 0.0 {
            if q < 0.0 {
                return None;
            }
            continue;
        }
        let t = q / p;
        if p < 0.0 {
            if t > t1 {
                return None;
            }
            t0 = t0.max(t);
        } else {
            if t < t0 {
                return None;
            }
            t1 = t1.min(t);
        }
    }

    Some((
        (x0 + t0 * dx, y0 + t0 * dy),
        (x0 + t1 * dx, y0 + t1 * dy),
    ))
}
