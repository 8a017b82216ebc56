//! Shared CLI plumbing for the `train` and `predict` binaries.

pub mod common;
pub mod config;
pub mod runs;

pub use common::{init_tracing, ThresholdOpts};
pub use config::{expand_path, ConfigError, ConfigResult, ToolConfig};
pub use runs::{increment_run_dir, next_run_dir};
