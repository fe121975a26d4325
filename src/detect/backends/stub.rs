use anyhow::Result;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::detect::backend::DetectorBackend;
use crate::detect::result::{BoundingBox, Prediction};
use crate::frame::Frame;

const RANDOM_CLASSES: &[&str] = &["bottle", "bottle", "bottle", "cup", "person"];
const MAX_RANDOM_OBJECTS: usize = 8;

/// Stub backend for demos and tests.
///
/// Either replays a fixed script of per-frame predictions (cycling), or
/// scatters seeded random objects over the frame.
pub struct StubBackend {
    mode: StubMode,
}

enum StubMode {
    Scripted { frames: Vec<Vec<Prediction>>, cursor: usize },
    Random(StdRng),
}

impl StubBackend {
    pub fn scripted(frames: Vec<Vec<Prediction>>) -> Self {
        Self {
            mode: StubMode::Scripted { frames, cursor: 0 },
        }
    }

    pub fn random(seed: u64) -> Self {
        Self {
            mode: StubMode::Random(StdRng::seed_from_u64(seed)),
        }
    }
}

impl Default for StubBackend {
    fn default() -> Self {
        Self::scripted(Vec::new())
    }
}

impl DetectorBackend for StubBackend {
    fn name(&self) -> &'static str {
        "stub"
    }

    fn detect(&mut self, frame: &Frame) -> Result<Vec<Prediction>> {
        match &mut self.mode {
            StubMode::Scripted { frames, cursor } => {
                if frames.is_empty() {
                    return Ok(Vec::new());
                }
                let predictions = frames[*cursor % frames.len()].clone();
                *cursor += 1;
                Ok(predictions)
            }
            StubMode::Random(rng) => {
                let count = rng.gen_range(0..=MAX_RANDOM_OBJECTS);
                let width = frame.width.max(1) as f32;
                let height = frame.height.max(1) as f32;
                let predictions = (0..count)
                    .map(|_| {
                        let class = RANDOM_CLASSES[rng.gen_range(0..RANDOM_CLASSES.len())];
                        let w = width * rng.gen_range(0.05..0.2);
                        let h = height * rng.gen_range(0.1..0.3);
                        let x = rng.gen_range(0.0..(width - w).max(1.0));
                        let y = rng.gen_range(0.0..(height - h).max(1.0));
                        let score = rng.gen_range(0.5..0.99);
                        Prediction::new(class, BoundingBox::new(x, y, w, h), score)
                    })
                    .collect();
                Ok(predictions)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame() -> Frame {
        Frame::from_rgb(vec![0u8; 640 * 480 * 3], 640, 480, 1).unwrap()
    }

    #[test]
    fn scripted_backend_cycles() {
        let bottle = Prediction::new("bottle", BoundingBox::new(1.0, 2.0, 3.0, 4.0), 0.9);
        let mut backend = StubBackend::scripted(vec![vec![bottle.clone()], vec![]]);
        let frame = frame();

        assert_eq!(backend.detect(&frame).unwrap(), vec![bottle.clone()]);
        assert!(backend.detect(&frame).unwrap().is_empty());
        assert_eq!(backend.detect(&frame).unwrap(), vec![bottle]);
    }

    #[test]
    fn random_backend_is_seeded_and_in_bounds() {
        let frame = frame();
        let mut a = StubBackend::random(7);
        let mut b = StubBackend::random(7);
        for _ in 0..20 {
            let pa = a.detect(&frame).unwrap();
            let pb = b.detect(&frame).unwrap();
            assert_eq!(pa, pb);
            assert!(pa.len() <= MAX_RANDOM_OBJECTS);
            for p in pa {
                assert!(p.bounding_box.x >= 0.0);
                assert!(p.bounding_box.x + p.bounding_box.w <= 640.0 + 1.0);
                assert!((0.0..=1.0).contains(&p.confidence));
            }
        }
    }

    #[test]
    fn empty_script_yields_nothing() {
        let mut backend = StubBackend::default();
        assert!(backend.detect(&frame()).unwrap().is_empty());
    }
}
