//! Alpha-compositing of one image view onto another.

use crate::{ImageView, ImageViewMut};

/// How source and destination pixels are combined when blending.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlendMode {
    /// Standard non-premultiplied "over" alpha blending.
    Alpha,
    /// Source pixels overwrite the destination outright, ignoring alpha.
    Overwrite,
}

/// A pending blend operation, returned by `blend_from` and configured before running.
///
/// Scales the source view to the destination's size using nearest-neighbor sampling if the two
/// don't match, which is what upsampling a segmentation mask onto a full-size frame needs.
pub struct Blend<'a> {
    dst: ImageViewMut<'a>,
    src: ImageView<'a>,
    mode: BlendMode,
    opacity: f32,
}

impl<'a> Blend<'a> {
    pub(crate) fn new(dst: ImageViewMut<'a>, src: ImageView<'a>) -> Self {
        Self {
            dst,
            src,
            mode: BlendMode::Alpha,
            opacity: 1.0,
        }
    }

    /// Sets the blend mode. Defaults to [`BlendMode::Alpha`].
    pub fn mode(mut self, mode: BlendMode) -> Self {
        self.mode = mode;
        self
    }

    /// Scales every source alpha value by `opacity` (clamped to `[0, 1]`). Defaults to `1.0`.
    pub fn opacity(mut self, opacity: f32) -> Self {
        self.opacity = opacity.clamp(0.0, 1.0);
        self
    }

    /// Runs the blend, consuming `self`.
    pub fn apply(mut self) {
        let (dw, dh) = (self.dst.width(), self.dst.height());
        if dw == 0 || dh == 0 {
            return;
        }
        let (sw, sh) = (self.src.width(), self.src.height());
        if sw == 0 || sh == 0 {
            return;
        }

        for dy in 0..dh {
            for dx in 0..dw {
                let sx = (dx as u64 * sw as u64 / dw as u64) as u32;
                let sy = (dy as u64 * sh as u64 / dh as u64) as u32;
                let src_px = self.src.get(sx.min(sw - 1), sy.min(sh - 1));

                match self.mode {
                    BlendMode::Overwrite => {
                        let a = (src_px.a() as f32 * self.opacity).round() as u8;
                        self.dst.set(dx, dy, src_px.with_alpha(a));
                    }
                    BlendMode::Alpha => {
                        let src_a = src_px.a() as f32 / 255.0 * self.opacity;
                        if src_a <= 0.0 {
                            continue;
                        }
                        let dst_px = self.dst.get(dx, dy);
                        let mut out = [0u8; 4];
                        for c in 0..3 {
                            out[c] = (src_px.0[c] as f32 * src_a
                                + dst_px.0[c] as f32 * (1.0 - src_a))
                                .round() as u8;
                        }
                        out[3] = (src_a * 255.0 + dst_px.a() as f32 * (1.0 - src_a)).round() as u8;
                        self.dst.set(dx, dy, crate::Color(out));
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::{AsImageViewMut, Color, Image, Rect};

    #[test]
    fn overwrite_replaces_destination() {
        let mut dst = Image::new(4, 4);
        dst.clear(Color::BLACK);
        let mut src = Image::new(4, 4);
        src.clear(Color::WHITE);

        dst.as_view_mut()
            .blend_from(&src)
            .mode(super::BlendMode::Overwrite)
            .apply();

        assert_eq!(dst.get(0, 0), Color::WHITE);
    }

    #[test]
    fn alpha_blend_mixes_colors() {
        let mut dst = Image::new(2, 2);
        dst.clear(Color::BLACK);
        let mut src = Image::new(2, 2);
        src.clear(Color::from_rgba8(255, 255, 255, 128));

        dst.as_view_mut().blend_from(&src).apply();

        let px = dst.get(0, 0);
        assert!(px.r() > 100 && px.r() < 160);
    }

    #[test]
    fn scales_source_to_destination_size() {
        let mut dst = Image::new(4, 4);
        let mut src = Image::new(2, 2);
        src.clear(Color::RED);

        dst.view_mut(&Rect::from_top_left(0, 0, 4, 4))
            .blend_from(&src)
            .mode(super::BlendMode::Overwrite)
            .apply();

        assert_eq!(dst.get(3, 3), Color::RED);
    }
}
