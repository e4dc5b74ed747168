use crate::Resolution;

/// An axis-aligned pixel rectangle, positioned by its top-left corner.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rect {
    x: i32,
    y: i32,
    width: u32,
    height: u32,
}

impl Rect {
    pub const fn from_top_left(x: i32, y: i32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    #[inline]
    pub fn x(&self) -> i32 {
        self.x
    }

    #[inline]
    pub fn y(&self) -> i32 {
        self.y
    }

    #[inline]
    pub fn width(&self) -> u32 {
        self.width
    }

    #[inline]
    pub fn height(&self) -> u32 {
        self.height
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    pub fn right(&self) -> i32 {
        self.x + self.width as i32
    }

    pub fn bottom(&self) -> i32 {
        self.y + self.height as i32
    }

    pub fn area(&self) -> u64 {
        self.width as u64 * self.height as u64
    }

    /// Returns the intersection of `self` and `other`, or `None` if they don't overlap.
    pub fn intersection(&self, other: &Rect) -> Option<Rect> {
        let x0 = self.x.max(other.x);
        let y0 = self.y.max(other.y);
        let x1 = self.right().min(other.right());
        let y1 = self.bottom().min(other.bottom());
        if x1 <= x0 || y1 <= y0 {
            None
        } else {
            Some(Rect::from_top_left(
                x0,
                y0,
                (x1 - x0) as u32,
                (y1 - y0) as u32,
            ))
        }
    }

    /// Intersection-over-union with another rectangle.
    pub fn iou(&self, other: &Rect) -> f32 {
        let inter = match self.intersection(other) {
            Some(r) => r.area(),
            None => 0,
        };
        if inter == 0 {
            return 0.0;
        }
        let union = self.area() + other.area() - inter;
        inter as f32 / union as f32
    }
}

/// Clamps `rect` to the bounds `[0, width) x [0, height)` of an image, collapsing to a
/// zero-area rectangle at the origin if `rect` lies entirely outside those bounds.
///
/// Idempotent: `clamp(clamp(r, w, h), w, h) == clamp(r, w, h)`.
pub fn clamp(rect: Rect, width: u32, height: u32) -> Rect {
    let bounds = Rect::from_top_left(0, 0, width, height);
    rect.intersection(&bounds)
        .unwrap_or(Rect::from_top_left(0, 0, 0, 0))
}

impl Resolution {
    pub fn rect(&self) -> Rect {
        Rect::from_top_left(0, 0, self.width(), self.height())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn intersection_disjoint() {
        let a = Rect::from_top_left(0, 0, 10, 10);
        let b = Rect::from_top_left(20, 20, 10, 10);
        assert_eq!(a.intersection(&b), None);
    }

    #[test]
    fn intersection_overlap() {
        let a = Rect::from_top_left(0, 0, 10, 10);
        let b = Rect::from_top_left(5, 5, 10, 10);
        let i = a.intersection(&b).unwrap();
        assert_eq!(i, Rect::from_top_left(5, 5, 5, 5));
    }

    #[test]
    fn clamp_is_idempotent() {
        let r = Rect::from_top_left(-5, -5, 20, 20);
        let once = clamp(r, 10, 10);
        let twice = clamp(once, 10, 10);
        assert_eq!(once, twice);
        assert_eq!(once, Rect::from_top_left(0, 0, 10, 10));
    }

    #[test]
    fn clamp_disjoint_collapses_to_zero_area() {
        let r = Rect::from_top_left(100, 100, 10, 10);
        let clamped = clamp(r, 10, 10);
        assert!(clamped.is_empty());
    }

    #[test]
    fn iou_matches_known_value() {
        let a = Rect::from_top_left(0, 0, 10, 10);
        let b = Rect::from_top_left(1, 1, 10, 10);
        // intersection = 9x9=81, union = 100+100-81=119
        let expected = 81.0 / 119.0;
        assert!((a.iou(&b) - expected).abs() < 1e-6);
    }
}
