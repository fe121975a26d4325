#![cfg(feature = "backend-tract")]

use std::path::Path;

use anyhow::{anyhow, Context, Result};
use tract_onnx::prelude::*;

use crate::detect::backend::DetectorBackend;
use crate::detect::labels::coco_label;
use crate::detect::result::{BoundingBox, Prediction};
use crate::frame::{rgb_len, Frame};

/// Tract-based backend for SSD-style ONNX object detectors.
///
/// Expects a uint8 NHWC RGB input and the four standard SSD outputs, in
/// order: boxes `[1,N,4]` (ymin, xmin, ymax, xmax, normalized), classes
/// `[1,N]` (COCO ids), scores `[1,N]`, count `[1]`.
pub struct TractBackend {
    model: TypedRunnableModel<TypedModel>,
    width: u32,
    height: u32,
    confidence_threshold: f32,
}

impl TractBackend {
    /// Load an ONNX model from disk and prepare it for inference.
    pub fn new<P: AsRef<Path>>(model_path: P, width: u32, height: u32) -> Result<Self> {
        let model_path = model_path.as_ref();
        let model = tract_onnx::onnx()
            .model_for_path(model_path)
            .with_context(|| format!("failed to load ONNX model from {}", model_path.display()))?
            .with_input_fact(
                0,
                InferenceFact::dt_shape(
                    u8::datum_type(),
                    tvec!(1, height as usize, width as usize, 3),
                ),
            )
            .context("failed to set input fact")?
            .into_optimized()
            .context("failed to optimize ONNX model")?
            .into_runnable()
            .context("failed to build runnable ONNX model")?;

        Ok(Self {
            model,
            width,
            height,
            confidence_threshold: 0.5,
        })
    }

    /// Override the default confidence threshold.
    pub fn with_threshold(mut self, threshold: f32) -> Self {
        self.confidence_threshold = threshold;
        self
    }

    fn build_input(&self, frame: &Frame) -> Result<Tensor> {
        if frame.width != self.width || frame.height != self.height {
            return Err(anyhow!(
                "frame size {}x{} does not match model input {}x{}",
                frame.width,
                frame.height,
                self.width,
                self.height
            ));
        }
        let expected_len = rgb_len(frame.width, frame.height)?;
        let pixels = frame.pixels();
        if pixels.len() != expected_len {
            return Err(anyhow!(
                "expected {} RGB bytes, received {}",
                expected_len,
                pixels.len()
            ));
        }

        let width = frame.width as usize;
        let input = tract_ndarray::Array4::from_shape_fn(
            (1, frame.height as usize, width, 3),
            |(_, y, x, channel)| pixels[(y * width + x) * 3 + channel],
        );
        Ok(input.into_tensor())
    }

    fn extract_predictions(&self, outputs: TVec<TValue>) -> Result<Vec<Prediction>> {
        if outputs.len() < 4 {
            return Err(anyhow!(
                "expected 4 SSD outputs, model produced {}",
                outputs.len()
            ));
        }
        let boxes = outputs[0]
            .to_array_view::<f32>()
            .context("box tensor was not f32")?;
        let classes = outputs[1]
            .to_array_view::<f32>()
            .context("class tensor was not f32")?;
        let scores = outputs[2]
            .to_array_view::<f32>()
            .context("score tensor was not f32")?;
        let count = outputs[3]
            .to_array_view::<f32>()
            .context("count tensor was not f32")?
            .iter()
            .next()
            .copied()
            .unwrap_or(0.0)
            .max(0.0) as usize;

        let boxes: Vec<f32> = boxes.iter().copied().collect();
        let classes: Vec<f32> = classes.iter().copied().collect();
        let scores: Vec<f32> = scores.iter().copied().collect();
        let count = count.min(scores.len()).min(classes.len()).min(boxes.len() / 4);

        let width = self.width as f32;
        let height = self.height as f32;
        let mut predictions = Vec::new();
        for i in 0..count {
            let score = scores[i];
            if !score.is_finite() || score < self.confidence_threshold {
                continue;
            }
            let Some(label) = coco_label(classes[i].round() as u32) else {
                continue;
            };
            let (ymin, xmin, ymax, xmax) = (
                boxes[i * 4].clamp(0.0, 1.0),
                boxes[i * 4 + 1].clamp(0.0, 1.0),
                boxes[i * 4 + 2].clamp(0.0, 1.0),
                boxes[i * 4 + 3].clamp(0.0, 1.0),
            );
            predictions.push(Prediction::new(
                label,
                BoundingBox::new(
                    xmin * width,
                    ymin * height,
                    (xmax - xmin).max(0.0) * width,
                    (ymax - ymin).max(0.0) * height,
                ),
                score,
            ));
        }
        Ok(predictions)
    }
}

impl DetectorBackend for TractBackend {
    fn name(&self) -> &'static str {
        "tract"
    }

    fn detect(&mut self, frame: &Frame) -> Result<Vec<Prediction>> {
        let input = self.build_input(frame)?;
        let outputs = self
            .model
            .run(tvec!(input.into()))
            .context("ONNX inference failed")?;
        self.extract_predictions(outputs)
    }

    fn warm_up(&mut self) -> Result<()> {
        let blank = Frame::from_rgb(
            vec![0u8; rgb_len(self.width, self.height)?],
            self.width,
            self.height,
            0,
        )?;
        self.detect(&blank).map(|_| ())
    }
}
