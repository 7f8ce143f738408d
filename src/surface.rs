use crate::assets::PreparedImage;
use crate::composite::{fill_rgba8, src_over};
use crate::core::{Affine, Canvas, Point, Rgba8Premul, Vec2};
use crate::error::DeepfryResult;

/// Fixed-size premultiplied RGBA8 render target.
pub struct Surface {
    canvas: Canvas,
    data: Vec<u8>,
}

impl Surface {
    pub fn new(canvas: Canvas) -> DeepfryResult<Self> {
        let canvas = Canvas::new(canvas.width, canvas.height)?;
        let len = canvas.rgba8_len()?;
        Ok(Self {
            canvas,
            data: vec![0u8; len],
        })
    }

    pub fn canvas(&self) -> Canvas {
        self.canvas
    }

    pub fn width(&self) -> u32 {
        self.canvas.width
    }

    pub fn height(&self) -> u32 {
        self.canvas.height
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    pub fn fill(&mut self, color: Rgba8Premul) {
        fill_rgba8(&mut self.data, color);
    }

    pub fn clear_transparent(&mut self) {
        self.data.fill(0);
    }

    /// Copy pixels from a same-sized surface.
    pub fn copy_from(&mut self, other: &Surface) {
        debug_assert_eq!(self.canvas, other.canvas);
        self.data.copy_from_slice(&other.data);
    }

    pub fn pixel(&self, x: u32, y: u32) -> [u8; 4] {
        let i = ((y * self.canvas.width + x) * 4) as usize;
        [self.data[i], self.data[i + 1], self.data[i + 2], self.data[i + 3]]
    }

    fn blend_px(&mut self, x: i64, y: i64, src: [u8; 4], opacity: f32) {
        if x < 0 || y < 0 || x >= i64::from(self.canvas.width) || y >= i64::from(self.canvas.height)
        {
            return;
        }
        let i = ((y as u32 * self.canvas.width + x as u32) * 4) as usize;
        let dst = [self.data[i], self.data[i + 1], self.data[i + 2], self.data[i + 3]];
        let out = src_over(dst, src, opacity);
        self.data[i..i + 4].copy_from_slice(&out);
    }

    /// Draw a bitmap centered at `center` with uniform `scale` and `rotation`,
    /// source-over blended at `opacity`.
    ///
    /// Destination pixels are inverse-mapped into the source frame and sampled
    /// bilinearly; pixels whose center falls outside the source are skipped.
    pub fn draw_image(
        &mut self,
        image: &PreparedImage,
        center: Point,
        scale: f64,
        rotation: f64,
        opacity: f32,
    ) {
        if image.width == 0 || image.height == 0 || scale <= 0.0 || opacity <= 0.0 {
            return;
        }
        let w = f64::from(image.width);
        let h = f64::from(image.height);

        let fwd = Affine::translate(center.to_vec2())
            * Affine::rotate(rotation)
            * Affine::scale(scale)
            * Affine::translate(Vec2::new(-w / 2.0, -h / 2.0));
        let inv = fwd.inverse();

        let corners = [
            fwd * Point::new(0.0, 0.0),
            fwd * Point::new(w, 0.0),
            fwd * Point::new(w, h),
            fwd * Point::new(0.0, h),
        ];
        let min_x = corners.iter().map(|p| p.x).fold(f64::INFINITY, f64::min);
        let max_x = corners.iter().map(|p| p.x).fold(f64::NEG_INFINITY, f64::max);
        let min_y = corners.iter().map(|p| p.y).fold(f64::INFINITY, f64::min);
        let max_y = corners.iter().map(|p| p.y).fold(f64::NEG_INFINITY, f64::max);

        let x0 = (min_x.floor().max(0.0)) as u32;
        let y0 = (min_y.floor().max(0.0)) as u32;
        let x1 = (max_x.ceil().min(f64::from(self.canvas.width))) as u32;
        let y1 = (max_y.ceil().min(f64::from(self.canvas.height))) as u32;

        for y in y0..y1 {
            for x in x0..x1 {
                let src_pt = inv * Point::new(f64::from(x) + 0.5, f64::from(y) + 0.5);
                if src_pt.x < 0.0 || src_pt.x >= w || src_pt.y < 0.0 || src_pt.y >= h {
                    continue;
                }
                let sample = sample_bilinear(image, src_pt.x, src_pt.y);
                self.blend_px(i64::from(x), i64::from(y), sample, opacity);
            }
        }
    }

    /// Clip the surface to a centered circle, filling the outside with
    /// `background`. Radius is half the shorter dimension minus `margin`;
    /// the rim gets a one-pixel coverage feather.
    pub fn mask_circle(&mut self, background: Rgba8Premul, margin: f64) {
        let w = self.canvas.width;
        let h = self.canvas.height;
        let cx = f64::from(w) / 2.0;
        let cy = f64::from(h) / 2.0;
        let radius = f64::from(w.min(h) / 2) - margin;
        if radius <= 0.0 {
            self.fill(background);
            return;
        }
        let bg = background.to_bytes();

        for y in 0..h {
            for x in 0..w {
                let dx = f64::from(x) + 0.5 - cx;
                let dy = f64::from(y) + 0.5 - cy;
                let dist = (dx * dx + dy * dy).sqrt();
                let coverage = (radius + 0.5 - dist).clamp(0.0, 1.0);
                if coverage >= 1.0 {
                    continue;
                }
                let i = ((y * w + x) * 4) as usize;
                for c in 0..4 {
                    let inside = f64::from(self.data[i + c]);
                    let outside = f64::from(bg[c]);
                    self.data[i + c] =
                        (outside + (inside - outside) * coverage).round() as u8;
                }
            }
        }
    }

    /// One-pixel line from `a` to `b`.
    pub fn draw_line(&mut self, a: Point, b: Point, color: Rgba8Premul) {
        let d = b - a;
        let steps = d.x.abs().max(d.y.abs()).ceil().max(1.0);
        let src = color.to_bytes();
        let n = steps as usize;
        for i in 0..=n {
            let t = i as f64 / steps;
            let p = a + d * t;
            self.blend_px(p.x.round() as i64, p.y.round() as i64, src, 1.0);
        }
    }

    /// Axis-aligned filled square centered on `center` (`half` = half side).
    pub fn fill_rect_centered(&mut self, center: Point, half: f64, color: Rgba8Premul) {
        let src = color.to_bytes();
        let x0 = (center.x - half).round() as i64;
        let x1 = (center.x + half).round() as i64;
        let y0 = (center.y - half).round() as i64;
        let y1 = (center.y + half).round() as i64;
        for y in y0..y1 {
            for x in x0..x1 {
                self.blend_px(x, y, src, 1.0);
            }
        }
    }

    /// Axis-aligned square outline centered on `center`.
    pub fn stroke_rect_centered(&mut self, center: Point, half: f64, color: Rgba8Premul) {
        let src = color.to_bytes();
        let x0 = (center.x - half).round() as i64;
        let x1 = (center.x + half).round() as i64;
        let y0 = (center.y - half).round() as i64;
        let y1 = (center.y + half).round() as i64;
        for x in x0..x1 {
            self.blend_px(x, y0, src, 1.0);
            self.blend_px(x, y1 - 1, src, 1.0);
        }
        for y in y0..y1 {
            self.blend_px(x0, y, src, 1.0);
            self.blend_px(x1 - 1, y, src, 1.0);
        }
    }

    pub fn fill_circle(&mut self, center: Point, radius: f64, color: Rgba8Premul) {
        let src = color.to_bytes();
        let r = radius.ceil() as i64;
        let cx = center.x.round() as i64;
        let cy = center.y.round() as i64;
        for dy in -r..=r {
            for dx in -r..=r {
                let d = ((dx * dx + dy * dy) as f64).sqrt();
                if d <= radius {
                    self.blend_px(cx + dx, cy + dy, src, 1.0);
                }
            }
        }
    }

    pub fn stroke_circle(&mut self, center: Point, radius: f64, color: Rgba8Premul) {
        let src = color.to_bytes();
        let r = radius.ceil() as i64 + 1;
        let cx = center.x.round() as i64;
        let cy = center.y.round() as i64;
        for dy in -r..=r {
            for dx in -r..=r {
                let d = ((dx * dx + dy * dy) as f64).sqrt();
                if (d - radius).abs() <= 0.5 {
                    self.blend_px(cx + dx, cy + dy, src, 1.0);
                }
            }
        }
    }
}

fn sample_bilinear(image: &PreparedImage, sx: f64, sy: f64) -> [u8; 4] {
    let w = image.width as i64;
    let h = image.height as i64;
    let data = image.rgba8_premul.as_slice();

    let fx = sx - 0.5;
    let fy = sy - 0.5;
    let x0f = fx.floor();
    let y0f = fy.floor();
    let tx = fx - x0f;
    let ty = fy - y0f;

    let x0 = (x0f as i64).clamp(0, w - 1);
    let y0 = (y0f as i64).clamp(0, h - 1);
    let x1 = (x0f as i64 + 1).clamp(0, w - 1);
    let y1 = (y0f as i64 + 1).clamp(0, h - 1);

    let fetch = |x: i64, y: i64| -> [u8; 4] {
        let i = ((y * w + x) * 4) as usize;
        [data[i], data[i + 1], data[i + 2], data[i + 3]]
    };

    let p00 = fetch(x0, y0);
    let p10 = fetch(x1, y0);
    let p01 = fetch(x0, y1);
    let p11 = fetch(x1, y1);

    let mut out = [0u8; 4];
    for c in 0..4 {
        let top = f64::from(p00[c]) + (f64::from(p10[c]) - f64::from(p00[c])) * tx;
        let bot = f64::from(p01[c]) + (f64::from(p11[c]) - f64::from(p01[c])) * tx;
        out[c] = (top + (bot - top) * ty).round().clamp(0.0, 255.0) as u8;
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assets::PreparedImage;

    fn solid_image(w: u32, h: u32, px: [u8; 4]) -> PreparedImage {
        let data: Vec<u8> = px.repeat((w * h) as usize);
        PreparedImage::from_rgba8_premul(w, h, data).unwrap()
    }

    fn canvas(w: u32, h: u32) -> Canvas {
        Canvas::new(w, h).unwrap()
    }

    #[test]
    fn draw_image_identity_placement_is_exact() {
        let mut s = Surface::new(canvas(4, 4)).unwrap();
        let img = solid_image(2, 2, [10, 20, 30, 255]);
        s.draw_image(&img, Point::new(2.0, 2.0), 1.0, 0.0, 1.0);

        assert_eq!(s.pixel(1, 1), [10, 20, 30, 255]);
        assert_eq!(s.pixel(2, 2), [10, 20, 30, 255]);
        assert_eq!(s.pixel(0, 0), [0, 0, 0, 0]);
        assert_eq!(s.pixel(3, 3), [0, 0, 0, 0]);
    }

    #[test]
    fn draw_image_quarter_turn_keeps_square_coverage() {
        let mut s = Surface::new(canvas(6, 6)).unwrap();
        let img = solid_image(2, 2, [200, 0, 0, 255]);
        s.draw_image(
            &img,
            Point::new(3.0, 3.0),
            1.0,
            std::f64::consts::FRAC_PI_2,
            1.0,
        );
        assert_eq!(s.pixel(2, 2), [200, 0, 0, 255]);
        assert_eq!(s.pixel(3, 3), [200, 0, 0, 255]);
        assert_eq!(s.pixel(0, 0), [0, 0, 0, 0]);
    }

    #[test]
    fn draw_image_scale_2_covers_double_extent() {
        let mut s = Surface::new(canvas(8, 8)).unwrap();
        let img = solid_image(2, 2, [0, 99, 0, 255]);
        s.draw_image(&img, Point::new(4.0, 4.0), 2.0, 0.0, 1.0);
        assert_eq!(s.pixel(2, 2), [0, 99, 0, 255]);
        assert_eq!(s.pixel(5, 5), [0, 99, 0, 255]);
        assert_eq!(s.pixel(1, 1), [0, 0, 0, 0]);
    }

    #[test]
    fn draw_image_opacity_scales_coverage() {
        let mut s = Surface::new(canvas(2, 2)).unwrap();
        let img = solid_image(2, 2, [255, 255, 255, 255]);
        s.draw_image(&img, Point::new(1.0, 1.0), 1.0, 0.0, 0.5);
        assert_eq!(s.pixel(0, 0)[3], 128);
    }

    #[test]
    fn mask_circle_clears_corners_keeps_center() {
        let mut s = Surface::new(canvas(16, 16)).unwrap();
        s.fill(Rgba8Premul {
            r: 9,
            g: 9,
            b: 9,
            a: 255,
        });
        s.mask_circle(Rgba8Premul::WHITE, 2.0);
        assert_eq!(s.pixel(0, 0), [255, 255, 255, 255]);
        assert_eq!(s.pixel(15, 15), [255, 255, 255, 255]);
        assert_eq!(s.pixel(8, 8), [9, 9, 9, 255]);
    }

    #[test]
    fn line_hits_endpoints() {
        let mut s = Surface::new(canvas(8, 8)).unwrap();
        let red = Rgba8Premul {
            r: 255,
            g: 0,
            b: 0,
            a: 255,
        };
        s.draw_line(Point::new(1.0, 1.0), Point::new(6.0, 4.0), red);
        assert_eq!(s.pixel(1, 1), [255, 0, 0, 255]);
        assert_eq!(s.pixel(6, 4), [255, 0, 0, 255]);
    }

    #[test]
    fn primitives_stay_in_bounds() {
        // Nothing to assert beyond "no panic" for out-of-bounds geometry.
        let mut s = Surface::new(canvas(4, 4)).unwrap();
        let c = Rgba8Premul::WHITE;
        s.draw_line(Point::new(-10.0, -10.0), Point::new(20.0, 3.0), c);
        s.fill_rect_centered(Point::new(-2.0, 2.0), 4.0, c);
        s.stroke_rect_centered(Point::new(6.0, 6.0), 4.0, c);
        s.fill_circle(Point::new(3.5, -1.0), 5.0, c);
        s.stroke_circle(Point::new(0.0, 0.0), 9.0, c);
    }
}
