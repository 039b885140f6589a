//! Drawing surfaces the engine composites onto.

use std::path::Path;

use anyhow::{anyhow, Context, Result};
use tiny_skia::{Paint, Pixmap, PremultipliedColorU8, Transform};

use crate::color::ColorRgba;
use crate::painter::GlyphPainter;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rect {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl Rect {
    pub fn from_size(width: u32, height: u32) -> Self {
        Self {
            x: 0.0,
            y: 0.0,
            width: width as f32,
            height: height as f32,
        }
    }
}

/// Persistent raster plus the primitives the compositor needs.
///
/// Coordinates are pixels with the origin at the top-left corner and `y`
/// growing downward.
pub trait Surface {
    fn size(&self) -> (u32, u32);

    /// Drop the current raster and allocate a fresh one of the new size.
    fn resize(&mut self, width: u32, height: u32);

    /// Source-over fill of `rect` with `color` at `alpha`.
    fn fill_rect(&mut self, rect: Rect, color: ColorRgba, alpha: f32);

    /// Draw `glyph` inside the `cell × cell` box whose top-left is `(x, y)`.
    fn draw_glyph(&mut self, glyph: char, x: i32, y: i32, color: ColorRgba, cell: u32);

    /// Hand the accumulated raster to the host. Called once per drawn tick.
    fn present(&mut self);
}

/// CPU raster backed by a tiny-skia pixmap.
pub struct PixmapSurface {
    width: u32,
    height: u32,
    pixmap: Option<Pixmap>,
    painter: GlyphPainter,
}

impl PixmapSurface {
    pub fn new(width: u32, height: u32, painter: GlyphPainter) -> Self {
        Self {
            width,
            height,
            pixmap: Pixmap::new(width, height),
            painter,
        }
    }

    pub fn set_painter(&mut self, painter: GlyphPainter) {
        self.painter = painter;
    }

    /// Straight-alpha RGBA bytes, row-major. Empty for a zero-sized surface.
    pub fn to_rgba8(&self) -> Vec<u8> {
        let Some(pixmap) = &self.pixmap else {
            return Vec::new();
        };

        let mut out = Vec::with_capacity(pixmap.data().len());
        for pixel in pixmap.pixels() {
            let color = pixel.demultiply();
            out.extend_from_slice(&[color.red(), color.green(), color.blue(), color.alpha()]);
        }
        out
    }

    pub fn save_png(&self, path: &Path) -> Result<()> {
        let image = image::RgbaImage::from_raw(self.width, self.height, self.to_rgba8())
            .ok_or_else(|| {
                anyhow!(
                    "cannot encode a {}x{} surface as png",
                    self.width,
                    self.height
                )
            })?;
        image
            .save_with_format(path, image::ImageFormat::Png)
            .with_context(|| format!("failed to write png {}", path.display()))
    }
}

impl Surface for PixmapSurface {
    fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    fn resize(&mut self, width: u32, height: u32) {
        self.width = width;
        self.height = height;
        self.pixmap = Pixmap::new(width, height);
    }

    fn fill_rect(&mut self, rect: Rect, color: ColorRgba, alpha: f32) {
        let Some(pixmap) = self.pixmap.as_mut() else {
            return;
        };
        let Some(rect) = tiny_skia::Rect::from_xywh(rect.x, rect.y, rect.width, rect.height)
        else {
            return;
        };

        let mut color = color.to_skia();
        color.apply_opacity(alpha.clamp(0.0, 1.0));
        let mut paint = Paint::default();
        paint.set_color(color);
        paint.anti_alias = false;
        pixmap.fill_rect(rect, &paint, Transform::identity(), None);
    }

    fn draw_glyph(&mut self, glyph: char, x: i32, y: i32, color: ColorRgba, cell: u32) {
        let Some(pixmap) = self.pixmap.as_mut() else {
            return;
        };
        let mask = self.painter.mask(glyph, cell);

        for row in 0..mask.size {
            let py = y + row as i32;
            if py < 0 || py >= self.height as i32 {
                continue;
            }
            for col in 0..mask.size {
                let px = x + col as i32;
                if px < 0 || px >= self.width as i32 {
                    continue;
                }
                let coverage = mask.coverage_at(col, row);
                if coverage == 0 {
                    continue;
                }
                let alpha = color.a.clamp(0.0, 1.0) * f32::from(coverage) / 255.0;
                blend_pixel(pixmap, px as u32, py as u32, color, alpha);
            }
        }
    }

    /// The pixmap already holds the finished frame.
    fn present(&mut self) {}
}

fn blend_pixel(pixmap: &mut Pixmap, x: u32, y: u32, color: ColorRgba, alpha: f32) {
    if alpha <= 0.0 {
        return;
    }

    let src_r = color.r.clamp(0.0, 1.0) * alpha * 255.0;
    let src_g = color.g.clamp(0.0, 1.0) * alpha * 255.0;
    let src_b = color.b.clamp(0.0, 1.0) * alpha * 255.0;
    let src_a = alpha * 255.0;

    let index = (y * pixmap.width() + x) as usize;
    if let Some(pixel) = pixmap.pixels_mut().get_mut(index) {
        let keep = 1.0 - alpha;
        let out = |src: f32, dst: u8| (src + f32::from(dst) * keep).clamp(0.0, 255.0).round() as u8;
        let out_a = out(src_a, pixel.alpha());
        let out_r = out(src_r, pixel.red()).min(out_a);
        let out_g = out(src_g, pixel.green()).min(out_a);
        let out_b = out(src_b, pixel.blue()).min(out_a);

        if let Some(blended) = PremultipliedColorU8::from_rgba(out_r, out_g, out_b, out_a) {
            *pixel = blended;
        }
    }
}

/// One primitive call captured by [`RecordingSurface`].
#[derive(Debug, Clone, PartialEq)]
pub enum DrawCall {
    Fill {
        rect: Rect,
        color: ColorRgba,
        alpha: f32,
    },
    Glyph {
        glyph: char,
        x: i32,
        y: i32,
        color: ColorRgba,
        cell: u32,
    },
    Present,
}

/// Surface that rasterizes nothing and records every call in order.
#[derive(Debug, Clone, Default)]
pub struct RecordingSurface {
    width: u32,
    height: u32,
    calls: Vec<DrawCall>,
}

impl RecordingSurface {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            calls: Vec::new(),
        }
    }

    pub fn calls(&self) -> &[DrawCall] {
        &self.calls
    }

    pub fn take_calls(&mut self) -> Vec<DrawCall> {
        std::mem::take(&mut self.calls)
    }

    pub fn clear(&mut self) {
        self.calls.clear();
    }

    /// Fills and glyph draws, excluding presents.
    pub fn draw_count(&self) -> usize {
        self.calls
            .iter()
            .filter(|call| !matches!(call, DrawCall::Present))
            .count()
    }

    pub fn glyph_calls(&self) -> impl Iterator<Item = (char, i32, i32, ColorRgba)> + '_ {
        self.calls.iter().filter_map(|call| match call {
            DrawCall::Glyph {
                glyph, x, y, color, ..
            } => Some((*glyph, *x, *y, *color)),
            _ => None,
        })
    }
}

impl Surface for RecordingSurface {
    fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    fn resize(&mut self, width: u32, height: u32) {
        self.width = width;
        self.height = height;
    }

    fn fill_rect(&mut self, rect: Rect, color: ColorRgba, alpha: f32) {
        self.calls.push(DrawCall::Fill { rect, color, alpha });
    }

    fn draw_glyph(&mut self, glyph: char, x: i32, y: i32, color: ColorRgba, cell: u32) {
        self.calls.push(DrawCall::Glyph {
            glyph,
            x,
            y,
            color,
            cell,
        });
    }

    fn present(&mut self) {
        self.calls.push(DrawCall::Present);
    }
}
