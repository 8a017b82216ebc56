use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{DatasetError, DatasetResult};
use crate::labels::label_path_for_image;

const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "bmp", "webp"];

/// Class names as written in `data.yaml`: either a list or an index map.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum ClassNames {
    List(Vec<String>),
    Map(BTreeMap<usize, String>),
}

impl ClassNames {
    pub fn len(&self) -> usize {
        match self {
            ClassNames::List(v) => v.len(),
            ClassNames::Map(m) => m.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Names ordered by class index.
    pub fn to_vec(&self) -> Vec<String> {
        match self {
            ClassNames::List(v) => v.clone(),
            ClassNames::Map(m) => m.values().cloned().collect(),
        }
    }
}

/// A split entry: one directory/list file, or several.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum SplitPaths {
    One(String),
    Many(Vec<String>),
}

impl SplitPaths {
    fn entries(&self) -> Vec<&str> {
        match self {
            SplitPaths::One(p) => vec![p.as_str()],
            SplitPaths::Many(v) => v.iter().map(String::as_str).collect(),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Split {
    Train,
    Val,
    Test,
}

impl fmt::Display for Split {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Split::Train => "train",
            Split::Val => "val",
            Split::Test => "test",
        };
        f.write_str(s)
    }
}

/// YOLO-style dataset descriptor (`data.yaml`).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DatasetDescriptor {
    #[serde(default)]
    pub path: Option<PathBuf>,
    #[serde(default)]
    pub train: Option<SplitPaths>,
    #[serde(default)]
    pub val: Option<SplitPaths>,
    #[serde(default)]
    pub test: Option<SplitPaths>,
    #[serde(default)]
    pub nc: Option<usize>,
    pub names: ClassNames,
    /// Location of the YAML file this was loaded from.
    #[serde(skip)]
    pub source: PathBuf,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SplitSample {
    pub image: PathBuf,
    pub label: PathBuf,
}

#[derive(Debug, Clone)]
pub struct SplitIndex {
    pub split: Split,
    pub samples: Vec<SplitSample>,
}

impl SplitIndex {
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

impl DatasetDescriptor {
    /// Read, parse, and validate a descriptor.
    pub fn load(path: &Path) -> DatasetResult<Self> {
        if !path.is_file() {
            return Err(DatasetError::DescriptorNotFound(path.to_path_buf()));
        }
        let text = std::fs::read_to_string(path).map_err(|e| DatasetError::io(path, e))?;
        let mut desc: DatasetDescriptor =
            serde_yaml::from_str(&text).map_err(|source| DatasetError::Yaml {
                path: path.to_path_buf(),
                source,
            })?;
        desc.source = path.to_path_buf();
        desc.validate()?;
        debug!(
            path = %path.display(),
            classes = desc.num_classes(),
            "loaded dataset descriptor"
        );
        Ok(desc)
    }

    pub fn validate(&self) -> DatasetResult<()> {
        let invalid = |reason: String| DatasetError::Invalid {
            path: self.source.clone(),
            reason,
        };
        if self.names.is_empty() {
            return Err(invalid("`names` is empty".into()));
        }
        if let ClassNames::Map(m) = &self.names {
            if m.keys().copied().ne(0..m.len()) {
                return Err(invalid("`names` map keys must be 0..n".into()));
            }
        }
        if let Some(nc) = self.nc {
            if nc != self.names.len() {
                return Err(invalid(format!(
                    "`nc` is {nc} but {} names are listed",
                    self.names.len()
                )));
            }
        }
        if self.train.is_none() {
            return Err(invalid("`train` split is missing".into()));
        }
        Ok(())
    }

    pub fn num_classes(&self) -> usize {
        self.names.len()
    }

    pub fn class_names(&self) -> Vec<String> {
        self.names.to_vec()
    }

    /// Directory that split paths are relative to.
    pub fn root(&self) -> PathBuf {
        let yaml_dir = self
            .source
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default();
        match &self.path {
            Some(p) if p.is_absolute() => p.clone(),
            Some(p) => yaml_dir.join(p),
            None => yaml_dir,
        }
    }

    fn split_paths(&self, split: Split) -> Option<&SplitPaths> {
        match split {
            Split::Train => self.train.as_ref(),
            Split::Val => self.val.as_ref(),
            Split::Test => self.test.as_ref(),
        }
    }

    /// Resolve one split entry, retrying without a leading `../`.
    pub fn resolve_entry(&self, entry: &str) -> PathBuf {
        let root = self.root();
        let direct = if Path::new(entry).is_absolute() {
            PathBuf::from(entry)
        } else {
            root.join(entry)
        };
        if direct.exists() {
            return direct;
        }
        if let Some(stripped) = entry.strip_prefix("../") {
            let retry = root.join(stripped);
            if retry.exists() {
                debug!(entry, resolved = %retry.display(), "resolved split path without ../");
                return retry;
            }
        }
        direct
    }

    /// Resolved locations for a split, or `None` when the descriptor omits it.
    pub fn resolve_split(&self, split: Split) -> Option<Vec<PathBuf>> {
        self.split_paths(split)
            .map(|paths| paths.entries().into_iter().map(|e| self.resolve_entry(e)).collect())
    }

    /// Enumerate the images of a split and pair each with its label file.
    pub fn index_split(&self, split: Split) -> DatasetResult<Option<SplitIndex>> {
        let Some(locations) = self.resolve_split(split) else {
            return Ok(None);
        };
        let mut images = Vec::new();
        for loc in locations {
            if loc.is_dir() {
                collect_images(&loc, &mut images)?;
            } else if loc.is_file() && loc.extension().and_then(|e| e.to_str()) == Some("txt") {
                images.extend(read_image_list(&loc)?);
            } else {
                return Err(DatasetError::SplitNotFound(loc));
            }
        }
        images.sort();
        images.dedup();
        if images.is_empty() {
            warn!(%split, "split contains no images");
        }
        let samples = images
            .into_iter()
            .map(|image| SplitSample {
                label: label_path_for_image(&image),
                image,
            })
            .collect();
        Ok(Some(SplitIndex { split, samples }))
    }
}

fn is_image(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| IMAGE_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

fn collect_images(dir: &Path, out: &mut Vec<PathBuf>) -> DatasetResult<()> {
    let entries = std::fs::read_dir(dir).map_err(|e| DatasetError::io(dir, e))?;
    for entry in entries {
        let entry = entry.map_err(|e| DatasetError::io(dir, e))?;
        let path = entry.path();
        if path.is_dir() {
            collect_images(&path, out)?;
        } else if is_image(&path) {
            out.push(path);
        }
    }
    Ok(())
}

fn read_image_list(list: &Path) -> DatasetResult<Vec<PathBuf>> {
    let text = std::fs::read_to_string(list).map_err(|e| DatasetError::io(list, e))?;
    let base = list.parent().map(Path::to_path_buf).unwrap_or_default();
    Ok(text
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(|l| {
            let p = Path::new(l);
            if p.is_absolute() {
                p.to_path_buf()
            } else {
                base.join(l.trim_start_matches("./"))
            }
        })
        .filter(|p| is_image(p))
        .collect())
}
