//! Local media files: type detection and integrity digests.

use std::fmt;
use std::path::{Path, PathBuf};

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use md5::{Digest, Md5};

use crate::errors::{AnyMotionError, Result};

pub const MOVIE_SUFFIXES: [&str; 2] = ["mp4", "mov"];
pub const IMAGE_SUFFIXES: [&str; 3] = ["jpg", "jpeg", "png"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MediaType {
    Image,
    Movie,
}

impl MediaType {
    /// Classify a path by its extension, ignoring case.
    pub fn from_path(path: &Path) -> Result<Self> {
        let suffix = path
            .extension()
            .map(|ext| ext.to_string_lossy().to_lowercase())
            .unwrap_or_default();

        if MOVIE_SUFFIXES.contains(&suffix.as_str()) {
            Ok(Self::Movie)
        } else if IMAGE_SUFFIXES.contains(&suffix.as_str()) {
            Ok(Self::Image)
        } else {
            let allowed: Vec<String> = MOVIE_SUFFIXES
                .iter()
                .chain(IMAGE_SUFFIXES.iter())
                .map(|s| format!(".{s}"))
                .collect();
            Err(AnyMotionError::UnsupportedFileType {
                message: format!(
                    "the extension of the file {} must be {}",
                    path.display(),
                    allowed.join(", ")
                ),
            })
        }
    }

    /// Resource collection that stores this kind of media.
    pub fn endpoint(self) -> &'static str {
        match self {
            Self::Image => "images",
            Self::Movie => "movies",
        }
    }
}

impl fmt::Display for MediaType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Image => "image",
            Self::Movie => "movie",
        })
    }
}

/// Base64 of the MD5 digest, as used in a `Content-MD5` header.
pub fn content_md5(data: &[u8]) -> String {
    STANDARD.encode(Md5::digest(data))
}

/// Replace a leading `~` with the home directory.
pub(crate) fn expand_home(path: &Path) -> PathBuf {
    match path.strip_prefix("~") {
        Ok(rest) => dirs::home_dir()
            .map(|home| home.join(rest))
            .unwrap_or_else(|| path.to_path_buf()),
        Err(_) => path.to_path_buf(),
    }
}
