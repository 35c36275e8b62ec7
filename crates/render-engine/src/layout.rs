//! Fixed inset geometry.
//!
//! The camera inset is a circle in the bottom-left corner whose diameter is
//! a fifth of the smaller surface dimension, kept 20 px from both edges.

/// Inset diameter as a fraction of the smaller surface dimension.
pub const INSET_FRACTION: f64 = 0.2;

/// Distance of the inset from the left and bottom edges, in pixels.
pub const INSET_MARGIN: f64 = 20.0;

/// Width of the white ring stroked around the inset.
pub const BORDER_WIDTH: f64 = 3.0;

/// Camera size assumed when a frame reports no dimensions.
pub const FALLBACK_CAMERA_SIZE: (u32, u32) = (320, 240);

/// Placement of the circular inset on a surface.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct InsetLayout {
    /// Left edge of the inset's bounding square.
    pub x: f64,
    /// Top edge of the inset's bounding square.
    pub y: f64,
    /// Side of the bounding square (the circle's diameter).
    pub size: f64,
}

impl InsetLayout {
    /// Layout for a surface of the given size.
    pub fn for_surface(width: u32, height: u32) -> Self {
        let size = width.min(height) as f64 * INSET_FRACTION;
        Self {
            x: INSET_MARGIN,
            y: height as f64 - size - INSET_MARGIN,
            size,
        }
    }

    pub fn radius(&self) -> f64 {
        self.size / 2.0
    }

    pub fn center(&self) -> (f64, f64) {
        (self.x + self.radius(), self.y + self.radius())
    }

    /// Distance of a point from the inset centre.
    pub fn distance(&self, px: f64, py: f64) -> f64 {
        let (cx, cy) = self.center();
        ((px - cx).powi(2) + (py - cy).powi(2)).sqrt()
    }

    /// Whether a point lies inside the clip circle.
    pub fn contains(&self, px: f64, py: f64) -> bool {
        self.distance(px, py) <= self.radius()
    }

    /// Whether a point lies on the border ring, which straddles the circle
    /// edge.
    pub fn on_border(&self, px: f64, py: f64) -> bool {
        (self.distance(px, py) - self.radius()).abs() <= BORDER_WIDTH / 2.0
    }

    /// Pixel bounds touched by the inset and its border, clamped to the
    /// surface: `(x0, y0, x1, y1)` with exclusive upper bounds.
    pub fn pixel_bounds(&self, width: u32, height: u32) -> (u32, u32, u32, u32) {
        let pad = BORDER_WIDTH;
        let clamp = |v: f64, max: u32| v.max(0.0).min(max as f64) as u32;
        (
            clamp((self.x - pad).floor(), width),
            clamp((self.y - pad).floor(), height),
            clamp((self.x + self.size + pad).ceil(), width),
            clamp((self.y + self.size + pad).ceil(), height),
        )
    }
}

/// How a camera frame is scaled to cover the inset square while keeping its
/// aspect ratio. Offsets are relative to the inset's top-left corner and are
/// never positive: the overflow is cropped evenly on both sides.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CoverFit {
    pub draw_width: f64,
    pub draw_height: f64,
    pub offset_x: f64,
    pub offset_y: f64,
}

impl CoverFit {
    /// Fit a `camera_width`×`camera_height` frame over a `size` square.
    /// Zero dimensions fall back to 320×240.
    pub fn compute(size: f64, camera_width: u32, camera_height: u32) -> Self {
        let (w, h) = if camera_width == 0 || camera_height == 0 {
            FALLBACK_CAMERA_SIZE
        } else {
            (camera_width, camera_height)
        };
        let aspect = w as f64 / h as f64;

        if aspect > 1.0 {
            let draw_width = size * aspect;
            Self {
                draw_width,
                draw_height: size,
                offset_x: -(draw_width - size) / 2.0,
                offset_y: 0.0,
            }
        } else {
            let draw_height = size / aspect;
            Self {
                draw_width: size,
                draw_height,
                offset_x: 0.0,
                offset_y: -(draw_height - size) / 2.0,
            }
        }
    }

    /// Map a point relative to the inset's top-left corner to a source
    /// pixel of a `camera_width`×`camera_height` frame.
    pub fn source_pixel(
        &self,
        local_x: f64,
        local_y: f64,
        camera_width: u32,
        camera_height: u32,
    ) -> (u32, u32) {
        let u = (local_x - self.offset_x) / self.draw_width;
        let v = (local_y - self.offset_y) / self.draw_height;
        let sx = (u * camera_width as f64).floor().clamp(0.0, camera_width.saturating_sub(1) as f64);
        let sy = (v * camera_height as f64).floor().clamp(0.0, camera_height.saturating_sub(1) as f64);
        (sx as u32, sy as u32)
    }
}
