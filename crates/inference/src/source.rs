//! Where the predictor reads its image from: a local file or an HTTP(S) URL.

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use image::RgbImage;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{InferenceError, Result};

const FETCH_TIMEOUT_SECS: u64 = 30;
const MAX_FETCH_BYTES: u64 = 64 * 1024 * 1024;
const FALLBACK_FILE_NAME: &str = "image.jpg";
const SAVE_EXTENSIONS: [&str; 6] = ["jpg", "jpeg", "png", "bmp", "tif", "tiff"];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ImageSource {
    Path(PathBuf),
    Url(String),
}

impl ImageSource {
    /// `http://` and `https://` are URLs; anything else is a path.
    pub fn parse(raw: &str) -> Self {
        let lower = raw.to_ascii_lowercase();
        if lower.starts_with("http://") || lower.starts_with("https://") {
            Self::Url(raw.to_string())
        } else {
            Self::Path(PathBuf::from(raw))
        }
    }

    pub fn is_url(&self) -> bool {
        matches!(self, Self::Url(_))
    }

    pub fn local_path(&self) -> Option<&Path> {
        match self {
            Self::Path(p) => Some(p),
            Self::Url(_) => None,
        }
    }

    /// File name used for the annotated copy; always carries an image extension.
    pub fn file_name(&self) -> String {
        let raw = match self {
            Self::Path(p) => p
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default(),
            Self::Url(u) => {
                let no_query = u.split(['?', '#']).next().unwrap_or_default();
                let after_scheme = no_query.split_once("://").map_or(no_query, |(_, rest)| rest);
                match after_scheme.split_once('/') {
                    Some((_, path)) => path.rsplit('/').next().unwrap_or_default().to_string(),
                    None => String::new(),
                }
            }
        };
        if raw.is_empty() {
            return FALLBACK_FILE_NAME.to_string();
        }
        let known = Path::new(&raw)
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| SAVE_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()));
        if known {
            raw
        } else {
            format!("{raw}.jpg")
        }
    }

    pub fn load(&self) -> Result<RgbImage> {
        match self {
            Self::Path(path) => {
                if !path.is_file() {
                    return Err(InferenceError::SourceNotFound(path.clone()));
                }
                let img = image::open(path).map_err(|source| InferenceError::Decode {
                    name: path.display().to_string(),
                    source,
                })?;
                Ok(img.to_rgb8())
            }
            Self::Url(url) => {
                let bytes = fetch(url)?;
                let img =
                    image::load_from_memory(&bytes).map_err(|source| InferenceError::Decode {
                        name: url.clone(),
                        source,
                    })?;
                Ok(img.to_rgb8())
            }
        }
    }
}

fn fetch(url: &str) -> Result<Vec<u8>> {
    let http_err = |source| InferenceError::Http {
        url: url.to_string(),
        source,
    };
    let client = reqwest::blocking::Client::builder()
        .timeout(Duration::from_secs(FETCH_TIMEOUT_SECS))
        .build()
        .map_err(http_err)?;
    let response = client.get(url).send().map_err(http_err)?;
    let status = response.status();
    if !status.is_success() {
        return Err(InferenceError::HttpStatus {
            url: url.to_string(),
            status: status.as_u16(),
        });
    }
    if let Some(len) = response.content_length() {
        if len > MAX_FETCH_BYTES {
            return Err(InferenceError::TooLarge {
                url: url.to_string(),
                bytes: len,
                limit: MAX_FETCH_BYTES,
            });
        }
    }
    let bytes = response.bytes().map_err(http_err)?;
    if bytes.len() as u64 > MAX_FETCH_BYTES {
        return Err(InferenceError::TooLarge {
            url: url.to_string(),
            bytes: bytes.len() as u64,
            limit: MAX_FETCH_BYTES,
        });
    }
    debug!(url, bytes = bytes.len(), "fetched image");
    Ok(bytes.to_vec())
}

impl fmt::Display for ImageSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Path(p) => write!(f, "{}", p.display()),
            Self::Url(u) => f.write_str(u),
        }
    }
}

impl From<String> for ImageSource {
    fn from(raw: String) -> Self {
        Self::parse(&raw)
    }
}

impl From<ImageSource> for String {
    fn from(src: ImageSource) -> Self {
        src.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn urls_and_paths_are_told_apart() {
        assert!(ImageSource::parse("https://ultralytics.com/images/bus.jpg").is_url());
        assert!(ImageSource::parse("HTTP://host/a.png").is_url());
        assert!(!ImageSource::parse("images/bus.jpg").is_url());
        assert!(!ImageSource::parse("httpdocs/a.png").is_url());
    }

    #[test]
    fn file_names_from_urls() {
        let src = ImageSource::parse("https://ultralytics.com/images/bus.jpg");
        assert_eq!(src.file_name(), "bus.jpg");
        let src = ImageSource::parse("https://host/img/cat.png?size=large#top");
        assert_eq!(src.file_name(), "cat.png");
        assert_eq!(ImageSource::parse("https://host/").file_name(), "image.jpg");
        assert_eq!(ImageSource::parse("https://host").file_name(), "image.jpg");
        assert_eq!(ImageSource::parse("https://host/render").file_name(), "render.jpg");
    }

    #[test]
    fn missing_local_file_is_reported() {
        let err = ImageSource::parse("/definitely/not/here.png").load().unwrap_err();
        assert!(matches!(err, InferenceError::SourceNotFound(_)));
    }

    #[test]
    fn serde_uses_plain_string() {
        let json = serde_json::to_string(&ImageSource::parse("a/b.jpg")).unwrap();
        assert_eq!(json, "\"a/b.jpg\"");
    }
}
