use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use serde::Serialize;
use serde_json::Value;

use crate::errors::{AnyMotionError, Result};

/// Page size requested on the first page of a list call.
pub const PAGE_SIZE: u32 = 1000;

/// The resource collections the API exposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Endpoint {
    Images,
    Movies,
    Keypoints,
    Drawings,
    Analyses,
    Comparisons,
}

impl Endpoint {
    pub const ALL: [Endpoint; 6] = [
        Self::Images,
        Self::Movies,
        Self::Keypoints,
        Self::Drawings,
        Self::Analyses,
        Self::Comparisons,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Images => "images",
            Self::Movies => "movies",
            Self::Keypoints => "keypoints",
            Self::Drawings => "drawings",
            Self::Analyses => "analyses",
            Self::Comparisons => "comparisons",
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Endpoint {
    type Err = AnyMotionError;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|endpoint| endpoint.as_str() == s)
            .ok_or_else(|| {
                AnyMotionError::argument(format!(
                    "unknown endpoint `{s}`, expected one of images, movies, keypoints, \
                     drawings, analyses or comparisons"
                ))
            })
    }
}

/// Returned by `upload`: exactly one of the two ids is set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UploadResult {
    pub image_id: Option<u64>,
    pub movie_id: Option<u64>,
}

/// What to extract keypoints from. Exactly one field must be set.
#[derive(Debug, Clone, Default)]
pub struct ExtractionRequest {
    pub image_id: Option<u64>,
    pub movie_id: Option<u64>,
    /// A raw body such as `{"image_id": 1}`, passed through untouched.
    pub data: Option<Value>,
}

impl ExtractionRequest {
    pub fn image(image_id: u64) -> Self {
        Self {
            image_id: Some(image_id),
            ..Self::default()
        }
    }

    pub fn movie(movie_id: u64) -> Self {
        Self {
            movie_id: Some(movie_id),
            ..Self::default()
        }
    }

    pub fn raw(data: Value) -> Self {
        Self {
            data: Some(data),
            ..Self::default()
        }
    }

    pub(crate) fn into_body(self) -> Result<Value> {
        match (self.image_id, self.movie_id, self.data) {
            (Some(image_id), None, None) => Ok(serde_json::json!({ "image_id": image_id })),
            (None, Some(movie_id), None) => Ok(serde_json::json!({ "movie_id": movie_id })),
            (None, None, Some(data)) => Ok(data),
            _ => Err(AnyMotionError::argument(
                "one of movie_id, image_id or data is required",
            )),
        }
    }
}

/// What to draw and how. Exactly one of `keypoint_id` or `comparison_id`.
#[derive(Debug, Clone, Default, Serialize)]
pub struct DrawingRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub keypoint_id: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub comparison_id: Option<u64>,
    /// e.g. `{"drawingType": "stickPicture", "pattern": "all", "color": "red"}`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rule: Option<Value>,
    /// e.g. `{"skeletonOnly": true}`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub background_rule: Option<Value>,
}

impl DrawingRequest {
    pub fn keypoint(keypoint_id: u64) -> Self {
        Self {
            keypoint_id: Some(keypoint_id),
            ..Self::default()
        }
    }

    pub fn comparison(comparison_id: u64) -> Self {
        Self {
            comparison_id: Some(comparison_id),
            ..Self::default()
        }
    }

    pub fn rule(mut self, rule: Value) -> Self {
        self.rule = Some(rule);
        self
    }

    pub fn background_rule(mut self, rule: Value) -> Self {
        self.background_rule = Some(rule);
        self
    }

    pub(crate) fn validate(&self) -> Result<()> {
        if self.keypoint_id.is_some() == self.comparison_id.is_some() {
            return Err(AnyMotionError::argument(
                "either keypoint_id or comparison_id is required",
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize)]
pub(crate) struct AnalysisRequest {
    pub keypoint_id: u64,
    pub rule: Value,
}

#[derive(Debug, Clone, Serialize)]
pub(crate) struct ComparisonRequest {
    pub source_id: u64,
    pub target_id: u64,
}

/// POST body registering a media file before its bytes are uploaded.
#[derive(Debug, Clone, Serialize)]
pub(crate) struct MediaRegistration<'a> {
    pub content_md5: &'a str,
    pub name: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<&'a str>,
}

/// Where and how `download` writes a drawing.
#[derive(Debug, Clone, Default)]
pub struct DownloadOptions {
    /// Output file or directory. Defaults to the file name in the drawing URL,
    /// relative to the working directory.
    pub path: Option<PathBuf>,
    /// Overwrite an existing file instead of failing.
    pub exist_ok: bool,
    /// Replace the path's extension with the one in the drawing URL.
    pub fix_suffix: bool,
}

impl DownloadOptions {
    pub fn to(path: impl Into<PathBuf>) -> Self {
        Self {
            path: Some(path.into()),
            ..Self::default()
        }
    }

    pub fn exist_ok(mut self, exist_ok: bool) -> Self {
        self.exist_ok = exist_ok;
        self
    }

    pub fn fix_suffix(mut self, fix_suffix: bool) -> Self {
        self.fix_suffix = fix_suffix;
        self
    }
}
