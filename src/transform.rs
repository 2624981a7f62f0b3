use tiny_skia::Transform;

use crate::action::Point;

/// Floor for the viewport scale so degenerate pinch/wheel input can never
/// collapse or invert the mapping.
pub const MIN_SCALE: f32 = 0.001;

pub const WHEEL_ZOOM_IN: f32 = 1.1;
pub const WHEEL_ZOOM_OUT: f32 = 0.9;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Viewport {
    pub scale: f32,
    pub origin_x: f32,
    pub origin_y: f32,
}

impl Default for Viewport {
    fn default() -> Self {
        Self::identity()
    }
}

impl Viewport {
    pub fn identity() -> Self {
        Self {
            scale: 1.0,
            origin_x: 0.0,
            origin_y: 0.0,
        }
    }

    /// Scale the image to fit inside the container and center it.
    pub fn fit_to_container(image: (f32, f32), container: (f32, f32)) -> Self {
        let (image_w, image_h) = image;
        let (container_w, container_h) = container;
        if image_w <= 0.0 || image_h <= 0.0 {
            return Self::identity();
        }
        let scale = (container_w / image_w)
            .min(container_h / image_h)
            .max(MIN_SCALE);
        Self {
            scale,
            origin_x: (container_w - image_w * scale) / 2.0,
            origin_y: (container_h - image_h * scale) / 2.0,
        }
    }

    pub fn to_screen(&self, point: Point) -> Point {
        Point::new(
            point.x * self.scale + self.origin_x,
            point.y * self.scale + self.origin_y,
        )
    }

    pub fn to_image(&self, point: Point) -> Point {
        Point::new(
            (point.x - self.origin_x) / self.scale,
            (point.y - self.origin_y) / self.scale,
        )
    }

    pub fn pan(&mut self, dx: f32, dy: f32) {
        self.origin_x += dx;
        self.origin_y += dy;
    }

    /// Rescale while keeping `screen` fixed in image space.
    pub fn zoom_at(&mut self, screen: Point, factor: f32) {
        if !factor.is_finite() || factor <= 0.0 {
            return;
        }
        let target = (self.scale * factor).max(MIN_SCALE);
        let factor = target / self.scale;
        self.origin_x = screen.x - (screen.x - self.origin_x) * factor;
        self.origin_y = screen.y - (screen.y - self.origin_y) * factor;
        self.scale = target;
    }

    pub fn to_skia(&self) -> Transform {
        Transform::from_row(
            self.scale,
            0.0,
            0.0,
            self.scale,
            self.origin_x,
            self.origin_y,
        )
    }
}

pub(crate) fn map_point(transform: Transform, point: Point) -> Point {
    let mut mapped = [tiny_skia::Point::from_xy(point.x, point.y)];
    transform.map_points(&mut mapped);
    Point::new(mapped[0].x, mapped[0].y)
}
