mod backend;
mod backends;
mod labels;
mod model;
mod result;

pub use backend::DetectorBackend;
pub use backends::StubBackend;
#[cfg(feature = "backend-tract")]
pub use backends::TractBackend;
pub use labels::{coco_label, is_coco_label};
pub use model::{ModelSource, ModelStatus, SharedModel};
pub use result::{BoundingBox, Prediction};
