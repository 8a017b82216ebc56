use tracing_subscriber::EnvFilter;

/// Shared thresholds used by inference-related tools.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ThresholdOpts {
    /// Minimum class confidence kept.
    pub conf_thresh: f32,
    /// NMS IoU above which the lower-scoring box is dropped.
    pub iou_thresh: f32,
}

impl ThresholdOpts {
    pub fn new(conf_thresh: f32, iou_thresh: f32) -> Self {
        Self {
            conf_thresh,
            iou_thresh,
        }
    }
}

impl Default for ThresholdOpts {
    fn default() -> Self {
        Self::new(0.25, 0.7)
    }
}

/// Install the fmt subscriber. `RUST_LOG` wins; otherwise `info`.
///
/// Safe to call more than once (later calls are no-ops).
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .try_init();
}
