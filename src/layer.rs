use std::sync::Arc;

use crate::assets::PreparedImage;
use crate::core::{LayerId, Point, Vec2};

/// Smallest permitted layer scale.
pub const MIN_SCALE: f64 = 0.05;
/// Largest permitted layer scale.
pub const MAX_SCALE: f64 = 20.0;

/// Screen-space pick radius around a handle, in canvas pixels.
pub const HANDLE_HIT_RADIUS: f64 = 8.0;
/// Distance of the rotate knob beyond the layer's scaled top edge.
pub const ROTATE_HANDLE_OFFSET: f64 = 24.0;

/// One positioned, transformable bitmap in the composited scene.
#[derive(Clone, Debug)]
pub struct Layer {
    pub id: LayerId,
    /// Category slot this layer occupies; one non-locked layer per category.
    pub category: String,
    pub name: String,
    /// Manifest source reference; `None` for uploads and direct bitmaps.
    pub source: Option<String>,
    pub image: Arc<PreparedImage>,
    /// Center position in canvas pixel space.
    pub x: f64,
    pub y: f64,
    /// Uniform scale, clamped to [`MIN_SCALE`, `MAX_SCALE`].
    pub scale: f64,
    /// Rotation in radians.
    pub rotation: f64,
    /// 0.0..=1.0.
    pub opacity: f32,
    /// Locked layers draw above everything and refuse delete/reorder.
    pub locked: bool,
    /// Intrinsic bitmap width in pixels.
    pub width: f64,
    /// Intrinsic bitmap height in pixels.
    pub height: f64,
}

/// Which transform a handle grab initiates.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HandleKind {
    Scale,
    Rotate,
}

/// Canvas-space handle anchor points for the selected layer.
#[derive(Clone, Copy, Debug)]
pub struct Corners {
    pub tl: Point,
    pub tr: Point,
    pub br: Point,
    pub bl: Point,
    /// Midpoint of the top edge, where the rotate stem starts.
    pub top: Point,
    /// Rotate knob, offset beyond the top edge along the layer's up axis.
    pub rotate: Point,
}

pub fn clamp_scale(scale: f64) -> f64 {
    scale.clamp(MIN_SCALE, MAX_SCALE)
}

impl Layer {
    pub fn center(&self) -> Point {
        Point::new(self.x, self.y)
    }

    /// Rotated corner and handle positions in canvas space.
    pub fn corners(&self) -> Corners {
        let hw = (self.width / 2.0) * self.scale;
        let hh = (self.height / 2.0) * self.scale;
        let (sin, cos) = self.rotation.sin_cos();

        let rot = |dx: f64, dy: f64| {
            Point::new(
                self.x + dx * cos - dy * sin,
                self.y + dx * sin + dy * cos,
            )
        };

        Corners {
            tl: rot(-hw, -hh),
            tr: rot(hw, -hh),
            br: rot(hw, hh),
            bl: rot(-hw, hh),
            top: rot(0.0, -hh),
            rotate: rot(0.0, -hh - ROTATE_HANDLE_OFFSET),
        }
    }

    /// True when `p` falls inside the layer's transformed bounds.
    ///
    /// Maps the point into the layer's local unrotated frame (inverse rotate,
    /// inverse scale) and tests against the half extents.
    pub fn hit_body(&self, p: Point) -> bool {
        let d = p - self.center();
        let (sin, cos) = (-self.rotation).sin_cos();
        let lx = (d.x * cos - d.y * sin) / self.scale;
        let ly = (d.x * sin + d.y * cos) / self.scale;
        lx.abs() <= self.width / 2.0 && ly.abs() <= self.height / 2.0
    }

    /// Handle under `p`, if any. Corner handles win over the rotate knob.
    pub fn hit_handle(&self, p: Point) -> Option<HandleKind> {
        let c = self.corners();
        let probes = [
            (HandleKind::Scale, c.tl),
            (HandleKind::Scale, c.tr),
            (HandleKind::Scale, c.br),
            (HandleKind::Scale, c.bl),
            (HandleKind::Rotate, c.rotate),
        ];
        probes
            .into_iter()
            .find(|(_, anchor)| dist(*anchor, p) <= HANDLE_HIT_RADIUS)
            .map(|(kind, _)| kind)
    }
}

fn dist(a: Point, b: Point) -> f64 {
    let d: Vec2 = a - b;
    d.hypot()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assets::PreparedImage;

    fn test_layer(w: u32, h: u32) -> Layer {
        let image =
            PreparedImage::from_rgba8_premul(w, h, vec![0u8; (w * h * 4) as usize]).unwrap();
        Layer {
            id: LayerId(1),
            category: "base".to_string(),
            name: "test".to_string(),
            source: None,
            image: Arc::new(image),
            x: 100.0,
            y: 100.0,
            scale: 1.0,
            rotation: 0.0,
            opacity: 1.0,
            locked: false,
            width: w as f64,
            height: h as f64,
        }
    }

    #[test]
    fn body_hit_unrotated() {
        let layer = test_layer(40, 20);
        assert!(layer.hit_body(Point::new(100.0, 100.0)));
        assert!(layer.hit_body(Point::new(119.0, 109.0)));
        assert!(!layer.hit_body(Point::new(121.0, 100.0)));
        assert!(!layer.hit_body(Point::new(100.0, 111.0)));
    }

    #[test]
    fn body_hit_respects_scale() {
        let mut layer = test_layer(40, 20);
        layer.scale = 2.0;
        assert!(layer.hit_body(Point::new(139.0, 100.0)));
        assert!(!layer.hit_body(Point::new(141.0, 100.0)));
    }

    #[test]
    fn body_hit_respects_rotation() {
        let mut layer = test_layer(40, 20);
        layer.rotation = std::f64::consts::FRAC_PI_2;
        // Width now extends along the y axis.
        assert!(layer.hit_body(Point::new(100.0, 119.0)));
        assert!(!layer.hit_body(Point::new(119.0, 100.0)));
    }

    #[test]
    fn corners_unrotated() {
        let layer = test_layer(40, 20);
        let c = layer.corners();
        assert!((c.tl.x - 80.0).abs() < 1e-9);
        assert!((c.tl.y - 90.0).abs() < 1e-9);
        assert!((c.br.x - 120.0).abs() < 1e-9);
        assert!((c.br.y - 110.0).abs() < 1e-9);
        assert!((c.rotate.y - (90.0 - ROTATE_HANDLE_OFFSET)).abs() < 1e-9);
    }

    #[test]
    fn handle_hit_prefers_corners_and_respects_radius() {
        let layer = test_layer(40, 20);
        let c = layer.corners();
        assert_eq!(layer.hit_handle(c.tl), Some(HandleKind::Scale));
        assert_eq!(
            layer.hit_handle(Point::new(c.br.x + 7.0, c.br.y)),
            Some(HandleKind::Scale)
        );
        assert_eq!(layer.hit_handle(c.rotate), Some(HandleKind::Rotate));
        assert_eq!(layer.hit_handle(Point::new(c.tl.x - 9.0, c.tl.y)), None);
    }

    #[test]
    fn rotate_handle_follows_rotation() {
        let mut layer = test_layer(40, 20);
        layer.rotation = std::f64::consts::FRAC_PI_2;
        let c = layer.corners();
        // Up axis now points along +x.
        assert!((c.rotate.x - (100.0 + 10.0 + ROTATE_HANDLE_OFFSET)).abs() < 1e-9);
        assert!((c.rotate.y - 100.0).abs() < 1e-9);
    }

    #[test]
    fn scale_clamps_to_bounds() {
        assert_eq!(clamp_scale(0.0), MIN_SCALE);
        assert_eq!(clamp_scale(500.0), MAX_SCALE);
        assert_eq!(clamp_scale(1.5), 1.5);
    }
}
