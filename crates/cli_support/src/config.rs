use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;
use tracing::warn;

pub const CONFIG_ENV: &str = "SEAQUEUE_CONFIG";
const DEFAULT_CONFIG_NAME: &str = "seaqueue.toml";

pub const DEFAULT_RUNS_ROOT: &str = "/work/NASASPaceResearch/seaqueue/yolo/util/runs";
pub const DEFAULT_DATASET: &str =
    "/work/NASASPaceResearch/hyperspectral_imges/blueberry_labeled_1/data.yaml";
pub const DEFAULT_BASE_MODEL: &str = "det-n";
pub const DEFAULT_PREDICT_MODEL: &str =
    "/work/NASASPaceResearch/seaqueue/yolo/util/runs/train3/weights/best.bin";
pub const DEFAULT_PREDICT_SOURCE: &str = "https://ultralytics.com/images/bus.jpg";

/// Site-level path overrides shared by `train` and `predict`.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolConfig {
    pub runs_root: PathBuf,
    pub dataset: PathBuf,
    pub base_model: String,
    pub predict_model: String,
    pub predict_source: String,
}

impl Default for ToolConfig {
    fn default() -> Self {
        Self {
            runs_root: PathBuf::from(DEFAULT_RUNS_ROOT),
            dataset: PathBuf::from(DEFAULT_DATASET),
            base_model: DEFAULT_BASE_MODEL.to_string(),
            predict_model: DEFAULT_PREDICT_MODEL.to_string(),
            predict_source: DEFAULT_PREDICT_SOURCE.to_string(),
        }
    }
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct ToolConfigFile {
    runs_root: Option<String>,
    dataset: Option<String>,
    base_model: Option<String>,
    predict: Option<PredictSection>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct PredictSection {
    model: Option<String>,
    source: Option<String>,
}

/// Why a site config file could not be loaded.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config file not found: {0}")]
    NotFound(PathBuf),
    #[error("cannot read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

pub type ConfigResult<T> = Result<T, ConfigError>;

impl ToolConfig {
    /// `$SEAQUEUE_CONFIG` if set (it must exist), else `./seaqueue.toml` if
    /// present, else defaults.
    pub fn load() -> ConfigResult<Self> {
        let explicit = std::env::var_os(CONFIG_ENV)
            .filter(|v| !v.is_empty())
            .map(PathBuf::from);
        Self::resolve(explicit, Path::new(DEFAULT_CONFIG_NAME))
    }

    /// An `explicit` path must load; a missing `fallback` yields defaults.
    pub fn resolve(explicit: Option<PathBuf>, fallback: &Path) -> ConfigResult<Self> {
        match explicit {
            Some(path) => Self::from_path(&path),
            None if fallback.exists() => Self::from_path(fallback),
            None => Ok(Self::default()),
        }
    }

    pub fn from_path(path: &Path) -> ConfigResult<Self> {
        let raw = std::fs::read_to_string(path).map_err(|source| {
            if source.kind() == std::io::ErrorKind::NotFound {
                ConfigError::NotFound(path.to_path_buf())
            } else {
                ConfigError::Read {
                    path: path.to_path_buf(),
                    source,
                }
            }
        })?;
        let file = toml::from_str::<ToolConfigFile>(&raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(Self::from_file(file))
    }

    fn from_file(file: ToolConfigFile) -> Self {
        let defaults = Self::default();
        let predict = file.predict.unwrap_or_default();
        let cfg = ToolConfig {
            runs_root: file
                .runs_root
                .map(|v| expand_path(&v))
                .unwrap_or(defaults.runs_root),
            dataset: file
                .dataset
                .map(|v| expand_path(&v))
                .unwrap_or(defaults.dataset),
            base_model: file.base_model.unwrap_or(defaults.base_model),
            predict_model: predict
                .model
                .map(|v| expand_path(&v).to_string_lossy().into_owned())
                .unwrap_or(defaults.predict_model),
            predict_source: predict.source.unwrap_or(defaults.predict_source),
        };
        cfg.warn_if_invalid();
        cfg
    }

    fn warn_if_invalid(&self) {
        if self.runs_root.as_os_str().is_empty() {
            warn!("tool config: runs_root is empty; runs will land in the working directory");
        }
        if self.base_model.trim().is_empty() {
            warn!("tool config: base_model is empty");
        }
        if self.predict_source.trim().is_empty() {
            warn!("tool config: predict.source is empty");
        }
    }
}

/// `~` and `${VAR}` expansion.
pub fn expand_path(raw: &str) -> PathBuf {
    let mut out = raw.to_string();
    if let Some(stripped) = out.strip_prefix('~') {
        if let Ok(home) = std::env::var("HOME") {
            out = format!("{home}{stripped}");
        }
    }
    PathBuf::from(expand_env(&out))
}

fn expand_env(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut rest = input;
    while let Some(start) = rest.find("${") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        match after.find('}') {
            Some(end) => {
                let key = &after[..end];
                match std::env::var(key) {
                    Ok(val) => out.push_str(&val),
                    // Unknown variables stay verbatim.
                    Err(_) => out.push_str(&rest[start..start + 2 + end + 1]),
                }
                rest = &after[end + 1..];
            }
            None => {
                out.push_str(&rest[start..]);
                rest = "";
            }
        }
    }
    out.push_str(rest);
    out
}
