//! vision_core: shared detector, preprocessing, and overlay interfaces.

pub mod interfaces;
pub mod overlay;
pub mod preprocess;

pub mod prelude {
    pub use crate::interfaces::*;
    pub use crate::overlay::*;
    pub use crate::preprocess::*;
}
