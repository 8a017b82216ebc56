use std::path::PathBuf;
use thiserror::Error;

pub type DatasetResult<T> = Result<T, DatasetError>;

/// Problems with a single label line.
#[derive(Debug, Error, PartialEq)]
pub enum LabelError {
    #[error("empty label line")]
    Empty,
    #[error("unparsable value {0:?}")]
    NotANumber(String),
    #[error("class id {0} is not a non-negative integer")]
    BadClassId(String),
    #[error("class id {class_id} out of range (nc = {nc})")]
    UnknownClass { class_id: usize, nc: usize },
    #[error("expected 4 box values or an even polygon list of >= 6, got {0}")]
    BadArity(usize),
    #[error("coordinate out of [0, 1]: {0}")]
    OutOfRange(f32),
}

#[derive(Debug, Error)]
pub enum DatasetError {
    #[error("dataset descriptor not found: {0}")]
    DescriptorNotFound(PathBuf),
    #[error("io error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse {path}: {source}")]
    Yaml {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },
    #[error("invalid dataset descriptor {path}: {reason}")]
    Invalid { path: PathBuf, reason: String },
    #[error("split directory not found: {0}")]
    SplitNotFound(PathBuf),
    #[error("{path}:{line}: {source}")]
    Label {
        path: PathBuf,
        line: usize,
        #[source]
        source: LabelError,
    },
}

impl DatasetError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        DatasetError::Io {
            path: path.into(),
            source,
        }
    }
}
