#![recursion_limit = "256"]

pub mod error;
pub mod factory;
pub mod postprocess;
pub mod predict;
pub mod source;

#[cfg(feature = "backend-wgpu")]
pub type InferenceBackend = burn_wgpu::Wgpu<f32>;
#[cfg(not(feature = "backend-wgpu"))]
pub type InferenceBackend = burn_ndarray::NdArray<f32>;

pub use error::{InferenceError, Result};
pub use factory::{BurnDetector, PredictorFactory};
pub use predict::{run_predict, PredictArgs, PredictOutcome, PredictRun};
pub use source::ImageSource;

pub mod prelude {
    pub use crate::factory::{BurnDetector, PredictorFactory};
    pub use crate::predict::{run_predict, PredictArgs, PredictRun};
    pub use crate::source::ImageSource;
    pub use crate::InferenceBackend;
    pub use vision_core::interfaces::{Detection, DetectionResult, Detector, Frame};
}
