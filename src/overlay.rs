//! Detection overlay drawn on top of the live camera view.
//!
//! The overlay is written by exactly one live session at a time. `DrawList`
//! records shapes instead of rasterising them; the rendering layer reads it.

use std::sync::{Arc, Mutex, MutexGuard};

use crate::detect::BoundingBox;

pub const STROKE_COLOR: &str = "red";
pub const LINE_WIDTH: f32 = 2.0;
pub const FONT: &str = "16px sans-serif";

pub trait OverlaySurface: Send {
    /// Match the surface to the frame dimensions.
    fn resize(&mut self, width: u32, height: u32);

    fn clear(&mut self);

    fn stroke_rect(&mut self, rect: BoundingBox);

    fn fill_text(&mut self, text: &str, x: f32, y: f32);

    /// Called when the owning session closes.
    fn release(&mut self) {
        self.clear();
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum Shape {
    Rect {
        rect: BoundingBox,
        color: &'static str,
        line_width: f32,
    },
    Text {
        text: String,
        x: f32,
        y: f32,
        color: &'static str,
        font: &'static str,
    },
}

#[derive(Debug, Default)]
struct DrawListState {
    width: u32,
    height: u32,
    shapes: Vec<Shape>,
    draw_calls: u64,
    clears: u64,
    releases: u64,
}

/// In-memory overlay. Clones share the same surface.
#[derive(Clone, Debug, Default)]
pub struct DrawList {
    state: Arc<Mutex<DrawListState>>,
}

impl DrawList {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, DrawListState> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Shapes currently on the surface.
    pub fn shapes(&self) -> Vec<Shape> {
        self.lock().shapes.clone()
    }

    pub fn size(&self) -> (u32, u32) {
        let state = self.lock();
        (state.width, state.height)
    }

    /// Total shapes ever drawn, across clears.
    pub fn draw_calls(&self) -> u64 {
        self.lock().draw_calls
    }

    pub fn clears(&self) -> u64 {
        self.lock().clears
    }

    pub fn releases(&self) -> u64 {
        self.lock().releases
    }
}

impl OverlaySurface for DrawList {
    fn resize(&mut self, width: u32, height: u32) {
        let mut state = self.lock();
        state.width = width;
        state.height = height;
    }

    fn clear(&mut self) {
        let mut state = self.lock();
        state.shapes.clear();
        state.clears += 1;
    }

    fn stroke_rect(&mut self, rect: BoundingBox) {
        let mut state = self.lock();
        state.shapes.push(Shape::Rect {
            rect,
            color: STROKE_COLOR,
            line_width: LINE_WIDTH,
        });
        state.draw_calls += 1;
    }

    fn fill_text(&mut self, text: &str, x: f32, y: f32) {
        let mut state = self.lock();
        state.shapes.push(Shape::Text {
            text: text.to_string(),
            x,
            y,
            color: STROKE_COLOR,
            font: FONT,
        });
        state.draw_calls += 1;
    }

    fn release(&mut self) {
        let mut state = self.lock();
        state.shapes.clear();
        state.releases += 1;
    }
}

/// Caption baseline for a box whose top edge is at `y`.
pub fn caption_y(y: f32) -> f32 {
    if y > 10.0 {
        y - 5.0
    } else {
        10.0
    }
}
