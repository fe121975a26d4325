//! Process-wide detection model.
//!
//! The model is loaded at most once per process, in the background, and then
//! shared read-only by every live session. A failed load is permanent: callers
//! observe `ModelStatus::Failed` for the rest of the process lifetime.

use anyhow::{anyhow, Result};
use std::path::PathBuf;
use std::sync::{Arc, Condvar, Mutex};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use crate::detect::backend::DetectorBackend;
use crate::detect::backends::StubBackend;
use crate::detect::result::Prediction;
use crate::frame::Frame;
use crate::notify::{Notification, Notifier, Severity};

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ModelStatus {
    Unloaded,
    Loading,
    Ready,
    Failed(String),
}

struct ModelInner {
    status: Mutex<ModelStatus>,
    settled: Condvar,
    backend: Mutex<Option<Box<dyn DetectorBackend>>>,
}

/// Cheaply clonable handle to the single model instance.
#[derive(Clone)]
pub struct SharedModel {
    inner: Arc<ModelInner>,
}

impl SharedModel {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(ModelInner {
                status: Mutex::new(ModelStatus::Unloaded),
                settled: Condvar::new(),
                backend: Mutex::new(None),
            }),
        }
    }

    /// A model that is already loaded. Used by tests and tools.
    pub fn ready<B: DetectorBackend + 'static>(backend: B) -> Self {
        let model = Self::new();
        model.install(Ok(Box::new(backend)));
        model
    }

    pub fn status(&self) -> ModelStatus {
        match self.inner.status.lock() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn is_ready(&self) -> bool {
        self.status() == ModelStatus::Ready
    }

    /// Start loading in the background. Only the first call per handle family
    /// does anything; later calls fail without retrying.
    ///
    /// On failure an error notification is raised once, here.
    pub fn load_in_background<F>(
        &self,
        loader: F,
        notifier: Arc<dyn Notifier>,
    ) -> Result<JoinHandle<()>>
    where
        F: FnOnce() -> Result<Box<dyn DetectorBackend>> + Send + 'static,
    {
        {
            let mut status = self
                .inner
                .status
                .lock()
                .map_err(|_| anyhow!("model status lock poisoned"))?;
            if *status != ModelStatus::Unloaded {
                return Err(anyhow!("detection model load already attempted"));
            }
            *status = ModelStatus::Loading;
        }

        let model = self.clone();
        std::thread::Builder::new()
            .name("model-load".to_string())
            .spawn(move || {
                let started = Instant::now();
                let loaded = loader().and_then(|mut backend| {
                    backend.warm_up()?;
                    Ok(backend)
                });
                match &loaded {
                    Ok(backend) => log::info!(
                        "detection model '{}' ready in {}ms",
                        backend.name(),
                        started.elapsed().as_millis()
                    ),
                    Err(e) => {
                        log::error!("failed to load detection model: {:#}", e);
                        notifier.notify(Notification::new(
                            Severity::Error,
                            "Error",
                            "Failed to load the object detection model",
                        ));
                    }
                }
                model.install(loaded);
            })
            .map_err(|e| anyhow!("failed to spawn model loader: {}", e))
    }

    /// Block until the model is ready or failed, or `timeout` passes.
    pub fn wait_settled(&self, timeout: Duration) -> ModelStatus {
        let deadline = Instant::now() + timeout;
        let mut guard = match self.inner.status.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        while matches!(*guard, ModelStatus::Loading | ModelStatus::Unloaded) {
            let now = Instant::now();
            if now >= deadline {
                break;
            }
            guard = match self.inner.settled.wait_timeout(guard, deadline - now) {
                Ok((guard, _)) => guard,
                Err(poisoned) => poisoned.into_inner().0,
            };
        }
        guard.clone()
    }

    /// Run inference on `frame`. Returns `Ok(None)` while the model is not ready.
    pub fn detect(&self, frame: &Frame) -> Result<Option<Vec<Prediction>>> {
        if !self.is_ready() {
            return Ok(None);
        }
        let mut backend = self
            .inner
            .backend
            .lock()
            .map_err(|_| anyhow!("model backend lock poisoned"))?;
        match backend.as_mut() {
            Some(backend) => backend.detect(frame).map(Some),
            None => Ok(None),
        }
    }

    fn install(&self, loaded: Result<Box<dyn DetectorBackend>>) {
        let next = match loaded {
            Ok(backend) => {
                match self.inner.backend.lock() {
                    Ok(mut guard) => *guard = Some(backend),
                    Err(poisoned) => *poisoned.into_inner() = Some(backend),
                }
                ModelStatus::Ready
            }
            Err(e) => ModelStatus::Failed(format!("{:#}", e)),
        };
        let mut status = match self.inner.status.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        *status = next;
        self.inner.settled.notify_all();
    }
}

impl Default for SharedModel {
    fn default() -> Self {
        Self::new()
    }
}

/// Where the detection model comes from.
#[derive(Clone, Debug, PartialEq)]
pub enum ModelSource {
    /// Seeded random stub predictions.
    Stub { seed: u64 },
    /// SSD-style ONNX model on disk (feature: backend-tract).
    Onnx {
        path: PathBuf,
        width: u32,
        height: u32,
        min_confidence: f32,
    },
}

impl ModelSource {
    /// True when predictions are synthetic rather than from a real model.
    pub fn is_simulated(&self) -> bool {
        matches!(self, ModelSource::Stub { .. })
    }

    /// Build the backend. Runs on the loader thread.
    pub fn load(self) -> Result<Box<dyn DetectorBackend>> {
        match self {
            ModelSource::Stub { seed } => {
                log::warn!(
                    "using the random stub detector (seed {}); predictions are synthetic",
                    seed
                );
                Ok(Box::new(StubBackend::random(seed)))
            }
            #[cfg(feature = "backend-tract")]
            ModelSource::Onnx {
                path,
                width,
                height,
                min_confidence,
            } => Ok(Box::new(
                crate::detect::backends::TractBackend::new(path, width, height)?
                    .with_threshold(min_confidence),
            )),
            #[cfg(not(feature = "backend-tract"))]
            ModelSource::Onnx { path, .. } => Err(anyhow!(
                "model {} requires the backend-tract feature",
                path.display()
            )),
        }
    }
}
