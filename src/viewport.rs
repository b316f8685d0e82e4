//! Viewport transform
//!
//! Screen space is the host's drawing surface in pixels. Image space is base
//! image pixels. The mapping is `screen = (image + offset) * zoom`.

use serde::{Deserialize, Serialize};

use crate::core::geometry::Point;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Viewport {
    pub zoom: f64,
    pub offset_x: f64,
    pub offset_y: f64,
    pub view_width: u32,
    pub view_height: u32,
    pub min_zoom: f64,
    pub max_zoom: f64,
}

impl Viewport {
    pub fn new(view_width: u32, view_height: u32) -> Self {
        Self {
            zoom: 1.0,
            offset_x: 0.0,
            offset_y: 0.0,
            view_width,
            view_height,
            min_zoom: 0.1,
            max_zoom: 8.0,
        }
    }

    pub fn with_zoom_bounds(mut self, min_zoom: f64, max_zoom: f64) -> Self {
        self.min_zoom = min_zoom;
        self.max_zoom = max_zoom;
        self
    }

    pub fn resize(&mut self, view_width: u32, view_height: u32) {
        self.view_width = view_width;
        self.view_height = view_height;
    }

    pub fn screen_to_image(&self, p: Point) -> Point {
        Point::new(p.x / self.zoom - self.offset_x, p.y / self.zoom - self.offset_y)
    }

    pub fn image_to_screen(&self, p: Point) -> Point {
        Point::new((p.x + self.offset_x) * self.zoom, (p.y + self.offset_y) * self.zoom)
    }

    /// Fit a `width` x `height` image fully inside the view, centred on the
    /// axis with slack.
    pub fn reset_view(&mut self, width: u32, height: u32) {
        if width == 0 || height == 0 || self.view_width == 0 || self.view_height == 0 {
            self.zoom = 1.0;
            self.offset_x = 0.0;
            self.offset_y = 0.0;
            return;
        }
        let (w, h) = (width as f64, height as f64);
        let (vw, vh) = (self.view_width as f64, self.view_height as f64);
        if w / h > vw / vh {
            self.zoom = vw / w;
            self.offset_x = 0.0;
            self.offset_y = (vh / self.zoom - h) / 2.0;
        } else {
            self.zoom = vh / h;
            self.offset_x = (vw / self.zoom - w) / 2.0;
            self.offset_y = 0.0;
        }
        tracing::debug!(
            "Viewport reset: zoom {:.3}, offset ({:.1}, {:.1})",
            self.zoom,
            self.offset_x,
            self.offset_y
        );
    }

    /// Pan by a screen-space movement
    pub fn pan(&mut self, movement_x: f64, movement_y: f64) {
        self.offset_x += movement_x / self.zoom;
        self.offset_y += movement_y / self.zoom;
    }

    /// Set zoom keeping the image point under `anchor` (screen space) fixed.
    pub fn zoom_at(&mut self, anchor: Point, zoom: f64) {
        let zoom = zoom.clamp(self.min_zoom, self.max_zoom);
        let fixed = self.screen_to_image(anchor);
        self.zoom = zoom;
        self.offset_x = anchor.x / zoom - fixed.x;
        self.offset_y = anchor.y / zoom - fixed.y;
    }

    /// Wheel step: 10% in or out around the cursor
    pub fn wheel(&mut self, anchor: Point, delta_y: f64) {
        if delta_y == 0.0 {
            return;
        }
        let factor = if delta_y < 0.0 { 1.1 } else { 0.9 };
        self.zoom_at(anchor, self.zoom * factor);
    }

    /// Two-finger gesture: scale by the change in finger distance around the
    /// midpoint and follow the midpoint's movement.
    pub fn pinch(&mut self, previous: [Point; 2], current: [Point; 2]) {
        let before = previous[0].distance(&previous[1]);
        let after = current[0].distance(&current[1]);
        let mid_before = Point::new((previous[0].x + previous[1].x) / 2.0, (previous[0].y + previous[1].y) / 2.0);
        let mid_after = Point::new((current[0].x + current[1].x) / 2.0, (current[0].y + current[1].y) / 2.0);

        if before > 0.0 && after > 0.0 {
            self.zoom_at(mid_before, self.zoom * after / before);
        }
        self.pan(mid_after.x - mid_before.x, mid_after.y - mid_before.y);
    }
}

impl Default for Viewport {
    fn default() -> Self {
        Self::new(0, 0)
    }
}
