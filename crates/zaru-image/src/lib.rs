//! Image, rectangle, color and drawing primitives shared by preprocessing, inference and
//! post-processing.
//!
//! [`Image`] owns a buffer; [`ImageView`] and [`ImageViewMut`] borrow a rectangular region of one
//! without copying, which is how preprocessing crops a detection's bounding box and how
//! post-processing draws an overlay directly onto the frame that was run through the network.

mod blend;
pub mod draw;
mod color;
mod rect;
mod resolution;

use std::{fmt, path::Path};

use anyhow::Context;
use image::{GenericImage, GenericImageView, ImageBuffer, Rgba, RgbaImage};

pub use blend::{Blend, BlendMode};
pub use color::Color;
pub use rect::{clamp, Rect};
pub use resolution::{AspectRatio, Resolution};

/// An 8-bit sRGB image with a non-premultiplied alpha channel.
#[derive(Clone)]
pub struct Image {
    buf: RgbaImage,
}

impl Image {
    /// Creates an empty image of the given size, starting out black and fully transparent.
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            buf: ImageBuffer::new(width, height),
        }
    }

    /// Loads an image from the filesystem. The path must end in `.jpg`, `.jpeg` or `.png`.
    pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let data = std::fs::read(path)
            .with_context(|| format!("failed to read image file '{}'", path.display()))?;
        let format = image::ImageFormat::from_path(path)
            .with_context(|| format!("unsupported image extension in '{}'", path.display()))?;
        let buf = image::load_from_memory_with_format(&data, format)
            .with_context(|| format!("failed to decode image '{}'", path.display()))?
            .to_rgba8();
        Ok(Self { buf })
    }

    /// Saves this image to the filesystem, inferring the format from the path's extension.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> anyhow::Result<()> {
        let path = path.as_ref();
        self.buf
            .save(path)
            .with_context(|| format!("failed to write image file '{}'", path.display()))
    }

    #[inline]
    pub fn width(&self) -> u32 {
        self.buf.width()
    }

    #[inline]
    pub fn height(&self) -> u32 {
        self.buf.height()
    }

    #[inline]
    pub fn resolution(&self) -> Resolution {
        Resolution::new(self.width(), self.height())
    }

    /// A [`Rect`] covering the full extent of this image, positioned at the origin.
    #[inline]
    pub fn rect(&self) -> Rect {
        Rect::from_top_left(0, 0, self.width(), self.height())
    }

    /// Resizes this image to `new_res`, preserving aspect ratio and letterboxing/pillarboxing
    /// the remainder with transparent black.
    ///
    /// Uses nearest-neighbor sampling; this is meant for feeding a network input tensor, not for
    /// producing a display-quality resize.
    pub fn aspect_aware_resize(&self, new_res: Resolution) -> Image {
        self.as_view().aspect_aware_resize(new_res)
    }

    pub(crate) fn get(&self, x: u32, y: u32) -> Color {
        Color(self.buf.get_pixel(x, y).0)
    }

    pub(crate) fn set(&mut self, x: u32, y: u32, color: Color) {
        self.buf.put_pixel(x, y, Rgba(color.0));
    }

    /// An immutable view into `rect`, clipped to the bounds of `self`.
    pub fn view(&self, rect: &Rect) -> ImageView<'_> {
        match self.rect().intersection(rect) {
            Some(rect) => ImageView {
                sub_image: self
                    .buf
                    .view(rect.x() as u32, rect.y() as u32, rect.width(), rect.height()),
            },
            None => ImageView {
                sub_image: self.buf.view(0, 0, 0, 0),
            },
        }
    }

    /// A mutable view into `rect`, clipped to the bounds of `self`.
    pub fn view_mut(&mut self, rect: &Rect) -> ImageViewMut<'_> {
        match self.rect().intersection(rect) {
            Some(rect) => ImageViewMut {
                sub_image: self.buf.sub_image(
                    rect.x() as u32,
                    rect.y() as u32,
                    rect.width(),
                    rect.height(),
                ),
            },
            None => ImageViewMut {
                sub_image: self.buf.sub_image(0, 0, 0, 0),
            },
        }
    }

    /// Overwrites `self` by alpha-compositing `src` onto it, scaling `src` to match if needed.
    pub fn blend_from<'b, V: AsImageView>(&'b mut self, src: &'b V) -> Blend<'b> {
        Blend::new(self.as_view_mut(), src.as_view())
    }

    /// Sets every pixel to `color`.
    pub fn clear(&mut self, color: Color) {
        self.buf.pixels_mut().for_each(|pix| pix.0 = color.0);
    }

    /// Draws an outlined rectangle onto this image.
    pub fn draw_rect(&mut self, rect: Rect, color: Color) {
        draw::rect(&mut self.buf, rect, color);
    }

    /// Alpha-blends a filled rectangle onto this image.
    pub fn fill_rect(&mut self, rect: Rect, color: Color) {
        draw::filled_rect(&mut self.buf, rect, color);
    }

    /// Direct access to the underlying `image` crate buffer, for interop with `imageproc` and
    /// inference backends that accept raw RGBA8 planes.
    pub fn as_raw(&self) -> &RgbaImage {
        &self.buf
    }

    pub fn as_raw_mut(&mut self) -> &mut RgbaImage {
        &mut self.buf
    }
}

impl fmt::Debug for Image {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{} Image", self.width(), self.height())
    }
}

/// An immutable view of a rectangular region of an [`Image`].
pub struct ImageView<'a> {
    sub_image: image::SubImage<&'a RgbaImage>,
}

impl<'a> ImageView<'a> {
    pub fn width(&self) -> u32 {
        self.sub_image.width()
    }

    pub fn height(&self) -> u32 {
        self.sub_image.height()
    }

    pub fn resolution(&self) -> Resolution {
        Resolution::new(self.width(), self.height())
    }

    pub fn rect(&self) -> Rect {
        Rect::from_top_left(0, 0, self.width(), self.height())
    }

    pub(crate) fn get(&self, x: u32, y: u32) -> Color {
        Color(self.sub_image.get_pixel(x, y).0)
    }

    /// Borrows an equivalent [`ImageView`] with a possibly shorter lifetime.
    pub fn reborrow(&self) -> ImageView<'_> {
        ImageView {
            sub_image: self.sub_image.view(0, 0, self.width(), self.height()),
        }
    }

    /// An immutable subview into `rect`, clipped to the bounds of `self`.
    pub fn view(&self, rect: &Rect) -> ImageView<'_> {
        match self.rect().intersection(rect) {
            Some(rect) => ImageView {
                sub_image: self.sub_image.view(
                    rect.x() as u32,
                    rect.y() as u32,
                    rect.width(),
                    rect.height(),
                ),
            },
            None => ImageView {
                sub_image: self.sub_image.view(0, 0, 0, 0),
            },
        }
    }

    /// Copies the contents of this view into a freshly allocated [`Image`].
    pub fn to_image(&self) -> Image {
        Image {
            buf: self.sub_image.to_image(),
        }
    }

    /// Resizes this view to `new_res`, preserving aspect ratio and letterboxing/pillarboxing
    /// the remainder with transparent black.
    pub fn aspect_aware_resize(&self, new_res: Resolution) -> Image {
        let mut out = Image::new(new_res.width(), new_res.height());
        let target_rect = new_res.fit_aspect_ratio(self.resolution().aspect_ratio());
        let mut target_view = out.view_mut(&target_rect);

        for dest_y in 0..target_rect.height() {
            for dest_x in 0..target_rect.width() {
                let src_x =
                    ((dest_x as f32 + 0.5) / target_rect.width() as f32 * self.width() as f32) as u32;
                let src_y = ((dest_y as f32 + 0.5) / target_rect.height() as f32
                    * self.height() as f32) as u32;
                let pixel = self.get(src_x.min(self.width() - 1), src_y.min(self.height() - 1));
                target_view.set(dest_x, dest_y, pixel);
            }
        }

        out
    }
}

impl fmt::Debug for ImageView<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{} ImageView", self.width(), self.height())
    }
}

/// A mutable view of a rectangular region of an [`Image`].
pub struct ImageViewMut<'a> {
    sub_image: image::SubImage<&'a mut RgbaImage>,
}

impl<'a> ImageViewMut<'a> {
    pub fn width(&self) -> u32 {
        self.sub_image.width()
    }

    pub fn height(&self) -> u32 {
        self.sub_image.height()
    }

    pub fn resolution(&self) -> Resolution {
        Resolution::new(self.width(), self.height())
    }

    pub fn rect(&self) -> Rect {
        Rect::from_top_left(0, 0, self.width(), self.height())
    }

    pub(crate) fn get(&self, x: u32, y: u32) -> Color {
        Color(self.sub_image.get_pixel(x, y).0)
    }

    pub(crate) fn set(&mut self, x: u32, y: u32, color: Color) {
        self.sub_image.put_pixel(x, y, Rgba(color.0));
    }

    /// Borrows an equivalent [`ImageViewMut`] with a possibly shorter lifetime.
    pub fn reborrow(&mut self) -> ImageViewMut<'_> {
        ImageViewMut {
            sub_image: self.sub_image.sub_image(0, 0, self.width(), self.height()),
        }
    }

    pub fn view(&self, rect: &Rect) -> ImageView<'_> {
        match self.rect().intersection(rect) {
            Some(rect) => ImageView {
                sub_image: self.sub_image.view(
                    rect.x() as u32,
                    rect.y() as u32,
                    rect.width(),
                    rect.height(),
                ),
            },
            None => ImageView {
                sub_image: self.sub_image.view(0, 0, 0, 0),
            },
        }
    }

    pub fn view_mut(&mut self, rect: &Rect) -> ImageViewMut<'_> {
        match self.rect().intersection(rect) {
            Some(rect) => ImageViewMut {
                sub_image: self.sub_image.sub_image(
                    rect.x() as u32,
                    rect.y() as u32,
                    rect.width(),
                    rect.height(),
                ),
            },
            None => ImageViewMut {
                sub_image: self.sub_image.sub_image(0, 0, 0, 0),
            },
        }
    }

    pub fn to_image(&self) -> Image {
        Image {
            buf: self.sub_image.to_image(),
        }
    }

    /// Overwrites `self` by alpha-compositing `src` onto it, scaling `src` to match if needed.
    pub fn blend_from<'b, V: AsImageView>(&'b mut self, src: &'b V) -> Blend<'b> {
        Blend::new(self.reborrow(), src.as_view())
    }
}

impl fmt::Debug for ImageViewMut<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{} ImageViewMut", self.width(), self.height())
    }
}

/// Types that can be treated as a read-only view of image data, abstracting over [`Image`] and
/// [`ImageView`].
pub trait AsImageView {
    fn as_view(&self) -> ImageView<'_>;
}

/// Types that can be treated as a mutable view of image data, abstracting over [`Image`] and
/// [`ImageViewMut`].
pub trait AsImageViewMut: AsImageView {
    fn as_view_mut(&mut self) -> ImageViewMut<'_>;
}

impl AsImageView for Image {
    fn as_view(&self) -> ImageView<'_> {
        self.view(&self.rect())
    }
}

impl AsImageView for ImageView<'_> {
    fn as_view(&self) -> ImageView<'_> {
        self.reborrow()
    }
}

impl AsImageView for ImageViewMut<'_> {
    fn as_view(&self) -> ImageView<'_> {
        ImageView {
            sub_image: self.sub_image.view(0, 0, self.width(), self.height()),
        }
    }
}

impl AsImageViewMut for Image {
    fn as_view_mut(&mut self) -> ImageViewMut<'_> {
        let rect = self.rect();
        self.view_mut(&rect)
    }
}

impl AsImageViewMut for ImageViewMut<'_> {
    fn as_view_mut(&mut self) -> ImageViewMut<'_> {
        self.reborrow()
    }
}

impl<V: AsImageView> AsImageView for &V {
    fn as_view(&self) -> ImageView<'_> {
        (*self).as_view()
    }
}

impl<V: AsImageView> AsImageView for &mut V {
    fn as_view(&self) -> ImageView<'_> {
        (**self).as_view()
    }
}

impl<V: AsImageViewMut> AsImageViewMut for &mut V {
    fn as_view_mut(&mut self) -> ImageViewMut<'_> {
        (*self).as_view_mut()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_image_is_transparent_black() {
        let img = Image::new(4, 4);
        assert_eq!(img.get(0, 0), Color::TRANSPARENT);
    }

    #[test]
    fn view_clips_to_image_bounds() {
        let img = Image::new(4, 4);
        let view = img.view(&Rect::from_top_left(2, 2, 10, 10));
        assert_eq!(view.width(), 2);
        assert_eq!(view.height(), 2);
    }

    #[test]
    fn view_fully_outside_is_empty() {
        let img = Image::new(4, 4);
        let view = img.view(&Rect::from_top_left(100, 100, 10, 10));
        assert_eq!(view.width(), 0);
        assert_eq!(view.height(), 0);
    }

    #[test]
    fn aspect_aware_resize_preserves_ratio_with_bars() {
        let mut img = Image::new(10, 10);
        img.clear(Color::WHITE);
        let out = img.aspect_aware_resize(Resolution::new(20, 10));
        assert_eq!(out.resolution(), Resolution::new(20, 10));
        // letterboxed left/right bars stay transparent
        assert_eq!(out.get(0, 5), Color::TRANSPARENT);
    }

    #[test]
    fn set_and_get_roundtrip() {
        let mut img = Image::new(2, 2);
        img.set(1, 1, Color::RED);
        assert_eq!(img.get(1, 1), Color::RED);
    }
}
