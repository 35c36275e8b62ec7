//! The render surface the composite is drawn on.

use image::{Rgba, RgbaImage};

use crate::layout::{CoverFit, InsetLayout};

const BORDER_COLOR: Rgba<u8> = Rgba([255, 255, 255, 255]);

/// An RGBA canvas sized to the screen capture, with the inset geometry
/// fixed at creation.
#[derive(Debug, Clone)]
pub struct Surface {
    canvas: RgbaImage,
    layout: InsetLayout,
}

impl Surface {
    /// Allocate a surface. Returns `None` when no drawing context can be
    /// obtained: a zero dimension or a pixel buffer too large to address.
    pub fn new(width: u32, height: u32) -> Option<Self> {
        if width == 0 || height == 0 {
            return None;
        }
        let bytes = (width as usize)
            .checked_mul(height as usize)?
            .checked_mul(4)?;
        if bytes > isize::MAX as usize {
            return None;
        }
        Some(Self {
            canvas: RgbaImage::new(width, height),
            layout: InsetLayout::for_surface(width, height),
        })
    }

    pub fn width(&self) -> u32 {
        self.canvas.width()
    }

    pub fn height(&self) -> u32 {
        self.canvas.height()
    }

    pub fn layout(&self) -> InsetLayout {
        self.layout
    }

    /// Current surface contents.
    pub fn canvas(&self) -> &RgbaImage {
        &self.canvas
    }

    /// Draw one composite frame. A missing source leaves its region as it
    /// was, like drawing a video element that has no data yet.
    pub fn compose(&mut self, screen: Option<&RgbaImage>, camera: Option<&RgbaImage>) {
        if let Some(screen) = screen {
            self.draw_background(screen);
        }
        if let Some(camera) = camera {
            self.draw_inset(camera);
        }
        self.draw_border();
    }

    /// Fill the whole surface with the screen frame, scaled with nearest
    /// neighbour sampling when sizes differ.
    pub fn draw_background(&mut self, screen: &RgbaImage) {
        let (w, h) = self.canvas.dimensions();
        let (sw, sh) = screen.dimensions();
        if sw == 0 || sh == 0 {
            return;
        }
        if (sw, sh) == (w, h) {
            self.canvas.copy_from_slice(screen.as_raw());
            return;
        }
        for y in 0..h {
            let sy = (y as u64 * sh as u64 / h as u64) as u32;
            for x in 0..w {
                let sx = (x as u64 * sw as u64 / w as u64) as u32;
                self.canvas.put_pixel(x, y, *screen.get_pixel(sx, sy));
            }
        }
    }

    /// Draw the camera frame clipped to the inset circle, scaled to cover
    /// it with the overflow cropped evenly.
    pub fn draw_inset(&mut self, camera: &RgbaImage) {
        let (cw, ch) = camera.dimensions();
        if cw == 0 || ch == 0 {
            return;
        }
        let layout = self.layout;
        let fit = CoverFit::compute(layout.size, cw, ch);
        let (x0, y0, x1, y1) = layout.pixel_bounds(self.width(), self.height());

        for y in y0..y1 {
            for x in x0..x1 {
                let (px, py) = (x as f64 + 0.5, y as f64 + 0.5);
                if !layout.contains(px, py) {
                    continue;
                }
                let (sx, sy) = fit.source_pixel(px - layout.x, py - layout.y, cw, ch);
                self.canvas.put_pixel(x, y, *camera.get_pixel(sx, sy));
            }
        }
    }

    /// Stroke the white ring around the inset.
    pub fn draw_border(&mut self) {
        let layout = self.layout;
        let (x0, y0, x1, y1) = layout.pixel_bounds(self.width(), self.height());
        for y in y0..y1 {
            for x in x0..x1 {
                if layout.on_border(x as f64 + 0.5, y as f64 + 0.5) {
                    self.canvas.put_pixel(x, y, BORDER_COLOR);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const BLUE: Rgba<u8> = Rgba([0, 0, 255, 255]);
    const RED: Rgba<u8> = Rgba([255, 0, 0, 255]);

    /// A screen frame whose pixels encode their own coordinates.
    fn gradient(width: u32, height: u32) -> RgbaImage {
        RgbaImage::from_fn(width, height, |x, y| {
            Rgba([(x % 251) as u8, (y % 241) as u8, 7, 255])
        })
    }

    #[test]
    fn unobtainable_surfaces() {
        assert!(Surface::new(0, 1080).is_none());
        assert!(Surface::new(1920, 0).is_none());
        assert!(Surface::new(640, 480).is_some());
    }

    #[test]
    fn inset_centre_is_camera_and_corner_is_screen() {
        let mut surface = Surface::new(400, 300).unwrap();
        let screen = RgbaImage::from_pixel(400, 300, BLUE);
        let camera = RgbaImage::from_pixel(320, 240, RED);
        surface.compose(Some(&screen), Some(&camera));

        let (cx, cy) = surface.layout().center();
        assert_eq!(*surface.canvas().get_pixel(cx as u32, cy as u32), RED);
        assert_eq!(*surface.canvas().get_pixel(399, 0), BLUE);
        assert_eq!(*surface.canvas().get_pixel(0, 299), BLUE);
    }

    #[test]
    fn border_is_white_on_the_circle_edge() {
        let mut surface = Surface::new(500, 500).unwrap();
        let screen = RgbaImage::from_pixel(500, 500, BLUE);
        let camera = RgbaImage::from_pixel(320, 240, RED);
        surface.compose(Some(&screen), Some(&camera));

        let layout = surface.layout();
        let (cx, cy) = layout.center();
        let edge_x = (cx + layout.radius()) as u32;
        assert_eq!(*surface.canvas().get_pixel(edge_x, cy as u32), BORDER_COLOR);
    }

    #[test]
    fn background_is_scaled_to_surface() {
        let mut surface = Surface::new(200, 100).unwrap();
        let screen = RgbaImage::from_fn(100, 50, |x, _| {
            if x < 50 {
                BLUE
            } else {
                RED
            }
        });
        surface.draw_background(&screen);
        assert_eq!(*surface.canvas().get_pixel(10, 10), BLUE);
        assert_eq!(*surface.canvas().get_pixel(190, 10), RED);
    }

    #[test]
    fn missing_camera_keeps_background_inside_circle() {
        let mut surface = Surface::new(400, 300).unwrap();
        let screen = RgbaImage::from_pixel(400, 300, BLUE);
        surface.compose(Some(&screen), None);
        let (cx, cy) = surface.layout().center();
        assert_eq!(*surface.canvas().get_pixel(cx as u32, cy as u32), BLUE);
    }

    proptest! {
        #[test]
        fn pixels_outside_the_inset_come_from_the_screen(
            width in 64u32..320,
            height in 64u32..320,
            cam_w in 1u32..64,
            cam_h in 1u32..64,
        ) {
            let mut surface = Surface::new(width, height).unwrap();
            let screen = gradient(width, height);
            let camera = RgbaImage::from_pixel(cam_w, cam_h, RED);
            surface.compose(Some(&screen), Some(&camera));

            let layout = surface.layout();
            for y in 0..height {
                for x in 0..width {
                    let (px, py) = (x as f64 + 0.5, y as f64 + 0.5);
                    if layout.distance(px, py) > layout.radius() + 2.0 {
                        prop_assert_eq!(surface.canvas().get_pixel(x, y), screen.get_pixel(x, y));
                    } else if layout.distance(px, py) < layout.radius() - 2.0 {
                        prop_assert_eq!(*surface.canvas().get_pixel(x, y), RED);
                    }
                }
            }
        }
    }
}
