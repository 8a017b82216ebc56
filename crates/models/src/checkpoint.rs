//! Checkpoint persistence: burn binary weights plus a JSON sidecar.
//!
//! `weights/best.bin` is paired with `weights/best.meta.json`, which carries
//! everything needed to rebuild the module before loading the record.

use std::path::{Path, PathBuf};

use burn::module::Module;
use burn::record::{BinFileRecorder, FullPrecisionSettings};
use burn::tensor::backend::Backend;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::detector::{Detector, DetectorConfig};
use crate::error::{ModelError, Result};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckpointMeta {
    pub config: DetectorConfig,
    /// Class names ordered by class id.
    pub names: Vec<String>,
    /// Square input size the weights were trained at.
    pub imgsz: u32,
    pub epoch: usize,
}

/// `<dir>/<stem>.meta.json` for `<dir>/<stem>.bin`.
pub fn meta_path_for(weights: &Path) -> PathBuf {
    let stem = weights
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("model");
    weights.with_file_name(format!("{stem}.meta.json"))
}

/// Both the weights and the sidecar exist.
pub fn checkpoint_exists(weights: &Path) -> bool {
    weights.is_file() && meta_path_for(weights).is_file()
}

pub fn save_checkpoint<B: Backend>(
    model: &Detector<B>,
    meta: &CheckpointMeta,
    weights: &Path,
) -> Result<()> {
    if let Some(parent) = weights.parent() {
        std::fs::create_dir_all(parent).map_err(|e| ModelError::io(parent, e))?;
    }
    let recorder = BinFileRecorder::<FullPrecisionSettings>::new();
    model
        .clone()
        .save_file(weights, &recorder)
        .map_err(|e| ModelError::save_checkpoint(weights, e.to_string()))?;

    let meta_path = meta_path_for(weights);
    let json = serde_json::to_string_pretty(meta).map_err(|source| ModelError::Metadata {
        path: meta_path.clone(),
        source,
    })?;
    std::fs::write(&meta_path, json).map_err(|e| ModelError::io(&meta_path, e))?;
    debug!(path = %weights.display(), epoch = meta.epoch, "saved checkpoint");
    Ok(())
}

pub fn load_meta(weights: &Path) -> Result<CheckpointMeta> {
    let meta_path = meta_path_for(weights);
    if !meta_path.is_file() {
        return Err(ModelError::CheckpointNotFound(meta_path));
    }
    let text = std::fs::read_to_string(&meta_path).map_err(|e| ModelError::io(&meta_path, e))?;
    serde_json::from_str(&text).map_err(|source| ModelError::Metadata {
        path: meta_path,
        source,
    })
}

/// Rebuild the module from the sidecar config, then load the weights into it.
pub fn load_checkpoint<B: Backend>(
    weights: &Path,
    device: &B::Device,
) -> Result<(Detector<B>, CheckpointMeta)> {
    if !weights.is_file() {
        return Err(ModelError::CheckpointNotFound(weights.to_path_buf()));
    }
    let meta = load_meta(weights)?;
    meta.config.validate()?;
    let recorder = BinFileRecorder::<FullPrecisionSettings>::new();
    let model = Detector::<B>::new(meta.config, device)
        .load_file(weights, &recorder, device)
        .map_err(|e| ModelError::load_checkpoint(weights, e.to_string()))?;
    debug!(path = %weights.display(), epoch = meta.epoch, "loaded checkpoint");
    Ok((model, meta))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn meta_path_sits_next_to_weights() {
        assert_eq!(
            meta_path_for(Path::new("runs/train/weights/best.bin")),
            PathBuf::from("runs/train/weights/best.meta.json")
        );
    }
}
