/// Axis-aligned box in frame pixel space, origin at the top-left corner.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BoundingBox {
    pub x: f32,
    pub y: f32,
    pub w: f32,
    pub h: f32,
}

impl BoundingBox {
    pub fn new(x: f32, y: f32, w: f32, h: f32) -> Self {
        Self { x, y, w, h }
    }
}

/// One object found by the model in one frame. Never persisted.
#[derive(Clone, Debug, PartialEq)]
pub struct Prediction {
    pub class_label: String,
    pub bounding_box: BoundingBox,
    /// Score in `0.0..=1.0`.
    pub confidence: f32,
}

impl Prediction {
    pub fn new(class_label: impl Into<String>, bounding_box: BoundingBox, confidence: f32) -> Self {
        Self {
            class_label: class_label.into(),
            bounding_box,
            confidence: confidence.clamp(0.0, 1.0),
        }
    }

    /// Overlay caption, e.g. `bottle (87.5%)`.
    pub fn caption(&self) -> String {
        format!("{} ({:.1}%)", self.class_label, self.confidence * 100.0)
    }
}
