use serde::{Deserialize, Serialize};

use crate::model::ViewportState;

pub const MIN_SCALE: f32 = 0.3;
pub const MAX_SCALE: f32 = 3.0;
/// Factor applied by the zoom-in / zoom-out controls.
pub const ZOOM_STEP: f32 = 1.2;
/// Factor applied per mouse-wheel notch.
pub const WHEEL_ZOOM_STEP: f32 = 1.05;

/// Pan/zoom transform: `screen = document * scale + offset`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Viewport {
    pub scale: f32,
    pub offset: (f32, f32),
    /// Size of the host drawing surface in screen pixels.
    pub size: (f32, f32),
}

impl Default for Viewport {
    fn default() -> Self {
        Self::new(1200.0, 800.0)
    }
}

impl Viewport {
    pub fn new(width: f32, height: f32) -> Self {
        Self {
            scale: 1.0,
            offset: (0.0, 0.0),
            size: (width, height),
        }
    }

    pub fn to_document(&self, screen: (f32, f32)) -> (f32, f32) {
        (
            (screen.0 - self.offset.0) / self.scale,
            (screen.1 - self.offset.1) / self.scale,
        )
    }

    pub fn to_screen(&self, document: (f32, f32)) -> (f32, f32) {
        (
            document.0 * self.scale + self.offset.0,
            document.1 * self.scale + self.offset.1,
        )
    }

    /// Converts a screen-space distance to document units.
    pub fn to_document_delta(&self, delta: (f32, f32)) -> (f32, f32) {
        (delta.0 / self.scale, delta.1 / self.scale)
    }

    /// Scales by `factor` keeping the document point under `anchor` fixed.
    pub fn zoom(&mut self, factor: f32, anchor: (f32, f32)) {
        if !factor.is_finite() || factor <= 0.0 {
            return;
        }
        let pinned = self.to_document(anchor);
        self.scale = (self.scale * factor).clamp(MIN_SCALE, MAX_SCALE);
        self.offset = (
            anchor.0 - pinned.0 * self.scale,
            anchor.1 - pinned.1 * self.scale,
        );
    }

    pub fn center(&self) -> (f32, f32) {
        (self.size.0 / 2.0, self.size.1 / 2.0)
    }

    pub fn zoom_in(&mut self) {
        self.zoom(ZOOM_STEP, self.center());
    }

    pub fn zoom_out(&mut self) {
        self.zoom(1.0 / ZOOM_STEP, self.center());
    }

    /// Wheel zoom at the pointer; positive `delta_y` (scrolling down) zooms out.
    pub fn wheel(&mut self, delta_y: f32, pointer: (f32, f32)) {
        if delta_y == 0.0 {
            return;
        }
        let factor = if delta_y > 0.0 {
            1.0 / WHEEL_ZOOM_STEP
        } else {
            WHEEL_ZOOM_STEP
        };
        self.zoom(factor, pointer);
    }

    pub fn reset(&mut self) {
        self.scale = 1.0;
        self.offset = (0.0, 0.0);
    }

    pub fn pan(&mut self, delta: (f32, f32)) {
        self.offset.0 += delta.0;
        self.offset.1 += delta.1;
    }

    pub fn resize(&mut self, width: f32, height: f32) {
        self.size = (width.max(1.0), height.max(1.0));
    }

    /// Document-space rectangle currently visible: `(x, y, width, height)`.
    pub fn visible_document_rect(&self) -> (f32, f32, f32, f32) {
        let (x, y) = self.to_document((0.0, 0.0));
        (x, y, self.size.0 / self.scale, self.size.1 / self.scale)
    }

    pub fn state(&self) -> ViewportState {
        ViewportState {
            zoom: self.scale,
            pan_x: self.offset.0,
            pan_y: self.offset.1,
        }
    }

    /// Restores a persisted viewport, clamping the zoom into range.
    pub fn restore(&mut self, state: &ViewportState) {
        self.scale = if state.zoom.is_finite() {
            state.zoom.clamp(MIN_SCALE, MAX_SCALE)
        } else {
            1.0
        };
        self.offset = (
            finite_or_zero(state.pan_x),
            finite_or_zero(state.pan_y),
        );
    }
}

fn finite_or_zero(value: f32) -> f32 {
    if value.is_finite() { value } else { 0.0 }
}
