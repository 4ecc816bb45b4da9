//! Detection overlay rendering.
//!
//! Pure drawing: a fresh transparent canvas at the frame's native
//! resolution every tick, one rectangle + label per detection with a
//! class-specific color, and a rectangle + name for the recognized face.
//! Nothing persists across frames.

use crate::font;
use image::{Rgb, RgbImage, Rgba, RgbaImage};
use serde::{Deserialize, Serialize};

/// Axis-aligned box in pixel coordinates, `(x1, y1)` top-left.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BBox {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
}

impl BBox {
    /// Clamp to a `width` x `height` canvas, returning integer
    /// `(x, y, w, h)`. `None` when the box is degenerate or fully
    /// outside the canvas.
    fn clamped(&self, width: u32, height: u32) -> Option<(u32, u32, u32, u32)> {
        let x1 = self.x1.min(self.x2).max(0.0) as u32;
        let y1 = self.y1.min(self.y2).max(0.0) as u32;
        let x2 = (self.x1.max(self.x2) as u32).min(width);
        let y2 = (self.y1.max(self.y2) as u32).min(height);
        if x1 >= x2 || y1 >= y2 {
            return None;
        }
        Some((x1, y1, x2 - x1, y2 - y1))
    }
}

/// One detection produced for a single frame.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Detection {
    pub label: String,
    pub confidence: f32,
    pub bbox: BBox,
}

const BORDER: u32 = 2;
const TEXT_SCALE: u32 = 2;
const WHITE: Rgba<u8> = Rgba([255, 255, 255, 255]);
const FACE_COLOR: Rgba<u8> = Rgba([34, 197, 94, 255]);

/// Fallback colors for classes without a fixed assignment.
const PALETTE: [[u8; 3]; 5] = [
    [239, 68, 68],
    [249, 115, 22],
    [168, 85, 247],
    [20, 184, 166],
    [236, 72, 153],
];

/// Color for a detection class. Uniform classes have fixed colors;
/// anything else gets a stable palette color from a label hash.
pub fn class_color(label: &str) -> Rgba<u8> {
    let key = label.trim().to_lowercase();
    let rgb = match key.as_str() {
        "blue_polo" | "polo" => [37, 99, 235],
        "black_pants" | "pants" => [55, 65, 81],
        "id_card" | "id" => [251, 191, 36],
        _ => {
            let hash = key
                .bytes()
                .fold(0usize, |acc, b| acc.wrapping_mul(31).wrapping_add(b as usize));
            PALETTE[hash % PALETTE.len()]
        }
    };
    Rgba([rgb[0], rgb[1], rgb[2], 255])
}

fn fill_rect(canvas: &mut RgbaImage, x: u32, y: u32, w: u32, h: u32, color: Rgba<u8>) {
    let x_end = (x + w).min(canvas.width());
    let y_end = (y + h).min(canvas.height());
    for py in y..y_end {
        for px in x..x_end {
            canvas.put_pixel(px, py, color);
        }
    }
}

fn draw_rect_outline(canvas: &mut RgbaImage, x: u32, y: u32, w: u32, h: u32, color: Rgba<u8>) {
    let b = BORDER.min(w).min(h);
    fill_rect(canvas, x, y, w, b, color);
    fill_rect(canvas, x, y + h - b, w, b, color);
    fill_rect(canvas, x, y, b, h, color);
    fill_rect(canvas, x + w - b, y, b, h, color);
}

fn text_width(text: &str) -> u32 {
    text.chars().count() as u32 * (font::GLYPH_W + 1) * TEXT_SCALE
}

fn draw_text(canvas: &mut RgbaImage, x: u32, y: u32, text: &str, color: Rgba<u8>) {
    let mut cursor = x;
    for c in text.chars() {
        if let Some(rows) = font::glyph(c) {
            for (row_idx, row) in rows.iter().enumerate() {
                for col in 0..font::GLYPH_W {
                    if row >> (font::GLYPH_W - 1 - col) & 1 == 1 {
                        let px = cursor + col * TEXT_SCALE;
                        let py = y + row_idx as u32 * TEXT_SCALE;
                        fill_rect(canvas, px, py, TEXT_SCALE, TEXT_SCALE, color);
                    }
                }
            }
        }
        cursor += (font::GLYPH_W + 1) * TEXT_SCALE;
    }
}

/// Filled bar with the label text, placed just above the box (or inside
/// its top edge when there is no room above).
fn draw_label(canvas: &mut RgbaImage, x: u32, y: u32, text: &str, color: Rgba<u8>) {
    let pad = 2 * TEXT_SCALE;
    let bar_h = font::GLYPH_H * TEXT_SCALE + 2 * pad;
    let bar_w = text_width(text) + 2 * pad;
    let bar_y = y.saturating_sub(bar_h);
    fill_rect(canvas, x, bar_y, bar_w, bar_h, color);
    draw_text(canvas, x + pad, bar_y + pad, text, WHITE);
}

/// Render the overlay for one frame.
///
/// Returns a fresh RGBA canvas; transparent everywhere nothing was
/// drawn. Boxes are clamped to the canvas; degenerate boxes are skipped.
pub fn render_overlay(
    width: u32,
    height: u32,
    detections: &[Detection],
    face: Option<(&BBox, &str)>,
) -> RgbaImage {
    let mut canvas = RgbaImage::new(width, height);

    for det in detections {
        let Some((x, y, w, h)) = det.bbox.clamped(width, height) else {
            continue;
        };
        let color = class_color(&det.label);
        draw_rect_outline(&mut canvas, x, y, w, h, color);
        let pct = (det.confidence.clamp(0.0, 1.0) * 100.0).round() as u32;
        draw_label(&mut canvas, x, y, &format!("{} {pct}%", det.label), color);
    }

    if let Some((bbox, name)) = face {
        if let Some((x, y, w, h)) = bbox.clamped(width, height) {
            draw_rect_outline(&mut canvas, x, y, w, h, FACE_COLOR);
            if !name.trim().is_empty() {
                draw_label(&mut canvas, x, y, name.trim(), FACE_COLOR);
            }
        }
    }

    canvas
}

/// Alpha-blend the overlay onto an RGB frame of the same size.
pub fn composite(frame: &mut RgbImage, overlay: &RgbaImage) {
    let w = frame.width().min(overlay.width());
    let h = frame.height().min(overlay.height());
    for y in 0..h {
        for x in 0..w {
            let Rgba([r, g, b, a]) = *overlay.get_pixel(x, y);
            if a == 0 {
                continue;
            }
            let Rgb(bg) = *frame.get_pixel(x, y);
            let a = a as u16;
            let blend = |fg: u8, bg: u8| -> u8 {
                ((fg as u16 * a + bg as u16 * (255 - a)) / 255) as u8
            };
            frame.put_pixel(
                x,
                y,
                Rgb([blend(r, bg[0]), blend(g, bg[1]), blend(b, bg[2])]),
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn det(label: &str, x1: f32, y1: f32, x2: f32, y2: f32) -> Detection {
        Detection {
            label: label.into(),
            confidence: 0.9,
            bbox: BBox { x1, y1, x2, y2 },
        }
    }

    #[test]
    fn test_detection_border_is_drawn() {
        let canvas = render_overlay(100, 100, &[det("blue_polo", 10.0, 40.0, 60.0, 90.0)], None);
        let expected = class_color("blue_polo");
        assert_eq!(*canvas.get_pixel(10, 40), expected);
        assert_eq!(*canvas.get_pixel(59, 89), expected);
        // Interior stays transparent.
        assert_eq!(canvas.get_pixel(35, 65)[3], 0);
    }

    #[test]
    fn test_canvas_is_fresh_each_call() {
        let first = render_overlay(50, 50, &[det("id_card", 5.0, 20.0, 30.0, 45.0)], None);
        assert_ne!(first.get_pixel(5, 20)[3], 0);
        let second = render_overlay(50, 50, &[], None);
        assert!(second.pixels().all(|p| p[3] == 0));
    }

    #[test]
    fn test_out_of_bounds_box_is_clamped() {
        let canvas = render_overlay(40, 40, &[det("x", -10.0, -10.0, 500.0, 500.0)], None);
        assert_ne!(canvas.get_pixel(0, 0)[3], 0);
        assert_ne!(canvas.get_pixel(39, 39)[3], 0);
    }

    #[test]
    fn test_degenerate_and_outside_boxes_skipped() {
        let canvas = render_overlay(
            40,
            40,
            &[det("a", 10.0, 10.0, 10.0, 10.0), det("b", 100.0, 100.0, 120.0, 120.0)],
            None,
        );
        assert!(canvas.pixels().all(|p| p[3] == 0));
    }

    #[test]
    fn test_face_box_and_label() {
        let bbox = BBox {
            x1: 10.0,
            y1: 30.0,
            x2: 35.0,
            y2: 39.0,
        };
        let canvas = render_overlay(64, 64, &[], Some((&bbox, "Juan Santos")));
        assert_eq!(*canvas.get_pixel(10, 30), FACE_COLOR);
    }

    #[test]
    fn test_class_color_is_stable() {
        assert_eq!(class_color("blue_polo"), class_color("  BLUE_POLO "));
        assert_eq!(class_color("mystery"), class_color("mystery"));
    }

    #[test]
    fn test_composite_blends_opaque_pixels() {
        let mut frame = RgbImage::from_pixel(10, 10, Rgb([0, 0, 0]));
        let mut overlay = RgbaImage::new(10, 10);
        overlay.put_pixel(3, 3, Rgba([255, 255, 255, 255]));
        composite(&mut frame, &overlay);
        assert_eq!(*frame.get_pixel(3, 3), Rgb([255, 255, 255]));
        assert_eq!(*frame.get_pixel(4, 4), Rgb([0, 0, 0]));
    }
}
