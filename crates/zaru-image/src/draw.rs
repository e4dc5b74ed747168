//! Overlay drawing primitives used by post-processors to render detections, segmentation masks
//! and informational text onto the output image.

use ab_glyph::{Font, PxScale};
use image::RgbaImage;
use imageproc::drawing::{draw_hollow_rect_mut, draw_line_segment_mut, draw_text_mut};
use imageproc::rect::Rect as ImgRect;

use crate::{Color, Rect};

fn to_img_rect(rect: Rect) -> ImgRect {
    ImgRect::at(rect.x(), rect.y()).of_size(rect.width().max(1), rect.height().max(1))
}

/// Draws the outline of `rect` onto `buf` in `color`.
pub fn rect(buf: &mut RgbaImage, rect: Rect, color: Color) {
    if rect.is_empty() {
        return;
    }
    draw_hollow_rect_mut(buf, to_img_rect(rect), color.to_image_rgba());
}

/// Alpha-blends a filled `rect` onto `buf` using `color`'s alpha channel.
pub fn filled_rect(buf: &mut RgbaImage, rect: Rect, color: Color) {
    let Some(clamped) = rect.intersection(&Rect::from_top_left(0, 0, buf.width(), buf.height()))
    else {
        return;
    };
    for y in clamped.y()..clamped.bottom() {
        for x in clamped.x()..clamped.right() {
            blend_pixel(buf, x as u32, y as u32, color);
        }
    }
}

/// Alpha-blends a single pixel, used by [`filled_rect`] and segmentation overlay rendering.
pub fn blend_pixel(buf: &mut RgbaImage, x: u32, y: u32, color: Color) {
    if x >= buf.width() || y >= buf.height() {
        return;
    }
    if color.a() == 0 {
        return;
    }
    let dst = buf.get_pixel_mut(x, y);
    let a = color.a() as f32 / 255.0;
    for c in 0..3 {
        dst.0[c] = (color.0[c] as f32 * a + dst.0[c] as f32 * (1.0 - a)).round() as u8;
    }
    dst.0[3] = dst.0[3].max(color.a());
}

/// Draws a straight line from `(x0, y0)` to `(x1, y1)`.
pub fn line(buf: &mut RgbaImage, x0: i32, y0: i32, x1: i32, y1: i32, color: Color) {
    draw_line_segment_mut(
        buf,
        (x0 as f32, y0 as f32),
        (x1 as f32, y1 as f32),
        color.to_image_rgba(),
    );
}

/// Draws `text` with its top-left corner at `(x, y)`, using `font` at the given pixel height.
///
/// Callers own font loading (e.g. via [`ab_glyph::FontRef::try_from_slice`]) so this crate
/// carries no embedded font data or filesystem lookups.
pub fn text(buf: &mut RgbaImage, x: i32, y: i32, text: &str, color: Color, font: &impl Font, scale: f32) {
    draw_text_mut(
        buf,
        color.to_image_rgba(),
        x,
        y,
        PxScale::from(scale),
        font,
        text,
    );
}
