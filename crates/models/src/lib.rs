//! Burn detection model for the seaqueue train/predict tools.
//!
//! - `Detector`: conv backbone + MLP with a fixed set of box/class query slots.
//! - `ModelRef`: preset shorthand (`det-n`, `det-s`, `det-m`) or checkpoint path.
//! - `checkpoint`: `.bin` weights with a `.meta.json` sidecar.
//!
//! These are pure Burn modules with no awareness of the `vision_core::Detector`
//! trait. The `inference` crate wraps them for runtime use.

pub mod checkpoint;
pub mod detector;
pub mod error;
pub mod model_ref;
pub mod postprocess;

pub use checkpoint::{
    checkpoint_exists, load_checkpoint, load_meta, meta_path_for, save_checkpoint, CheckpointMeta,
};
pub use detector::{Detector, DetectorConfig, DetectorScale};
pub use error::{ModelError, Result};
pub use model_ref::ModelRef;
pub use postprocess::{decode_queries, QueryDetection};

pub mod prelude {
    pub use super::{CheckpointMeta, Detector, DetectorConfig, DetectorScale, ModelRef};
}
