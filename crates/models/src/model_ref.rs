use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::detector::DetectorScale;

/// Which weights to start from: a named preset (fresh init) or a checkpoint on disk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ModelRef {
    Preset(DetectorScale),
    Checkpoint(PathBuf),
}

impl ModelRef {
    /// Known preset names map to presets; anything else is a checkpoint path.
    pub fn parse(raw: &str) -> Self {
        match raw.parse::<DetectorScale>() {
            Ok(scale) => ModelRef::Preset(scale),
            Err(_) => ModelRef::Checkpoint(PathBuf::from(raw)),
        }
    }

    pub fn checkpoint_path(&self) -> Option<&Path> {
        match self {
            ModelRef::Checkpoint(p) => Some(p),
            ModelRef::Preset(_) => None,
        }
    }
}

impl fmt::Display for ModelRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModelRef::Preset(scale) => write!(f, "{scale}"),
            ModelRef::Checkpoint(path) => write!(f, "{}", path.display()),
        }
    }
}

impl From<String> for ModelRef {
    fn from(raw: String) -> Self {
        ModelRef::parse(&raw)
    }
}

impl From<&str> for ModelRef {
    fn from(raw: &str) -> Self {
        ModelRef::parse(raw)
    }
}

impl From<ModelRef> for String {
    fn from(model: ModelRef) -> Self {
        model.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shorthand_is_preset() {
        assert_eq!(ModelRef::parse("det-n"), ModelRef::Preset(DetectorScale::Nano));
        assert_eq!(
            ModelRef::parse("runs/train3/weights/best.bin"),
            ModelRef::Checkpoint(PathBuf::from("runs/train3/weights/best.bin"))
        );
    }

    #[test]
    fn serializes_as_plain_string() {
        let json = serde_json::to_string(&ModelRef::Preset(DetectorScale::Medium)).unwrap();
        assert_eq!(json, "\"det-m\"");
        let back: ModelRef = serde_json::from_str("\"/tmp/w.bin\"").unwrap();
        assert_eq!(back.checkpoint_path(), Some(Path::new("/tmp/w.bin")));
    }
}
