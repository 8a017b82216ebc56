//! Shared data contracts for datasets, labels, and boxes.

pub mod boxes;
pub mod dataset;
pub mod error;
pub mod labels;

pub use boxes::{cxcywh_to_xyxy, giou_xyxy, iou_xyxy, xyxy_to_cxcywh};
pub use dataset::{ClassNames, DatasetDescriptor, Split, SplitIndex, SplitPaths, SplitSample};
pub use error::{DatasetError, DatasetResult, LabelError};
pub use labels::{label_path_for_image, read_label_file, YoloLabel};
