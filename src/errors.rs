use std::path::PathBuf;

use thiserror::Error;

/// Longest response body excerpt carried into an error message.
const MAX_BODY_EXCERPT: usize = 500;

/// All errors that can occur when using the AnyMotion SDK.
#[derive(Error, Debug)]
pub enum AnyMotionError {
    /// Missing credentials or a malformed API URL, detected at construction.
    #[error("{message}")]
    Config { message: String },

    /// The file to upload is neither a supported image nor a supported movie.
    #[error("unsupported file type: {message}")]
    UnsupportedFileType { message: String },

    /// A wrong combination of mutually exclusive arguments.
    #[error("invalid arguments: {message}")]
    Argument { message: String },

    /// Only GET, POST, PUT and DELETE are accepted.
    #[error("HTTP method is invalid: {method}")]
    InvalidMethod { method: String },

    /// Connection failure, or transient server errors that outlasted every retry.
    #[error("{method} {url} failed: {message}")]
    Transport {
        method: String,
        url: String,
        message: String,
    },

    /// The final response carried a non-2xx status code.
    #[error("{method} {url} failed.\nstatus code: {status_code}\ncontent: {}", excerpt(.body))]
    Http {
        status_code: u16,
        url: String,
        method: String,
        body: String,
    },

    /// An expected field is missing from a JSON response or has the wrong shape.
    #[error("invalid response: {message}")]
    ResponseFormat { message: String },

    /// The access token could not be obtained.
    #[error("authentication failed: {message}")]
    Auth { message: String },

    /// The download target exists and overwriting was not allowed.
    #[error("File exists: {}", .path.display())]
    FileExists { path: PathBuf },

    /// The server has nothing to download for the requested job.
    #[error("no content: {message}")]
    NoContent { message: String },

    /// An I/O error, typically from reading or writing a local file.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl AnyMotionError {
    pub(crate) fn response_format(message: impl Into<String>) -> Self {
        Self::ResponseFormat {
            message: message.into(),
        }
    }

    pub(crate) fn argument(message: impl Into<String>) -> Self {
        Self::Argument {
            message: message.into(),
        }
    }

    /// HTTP status code of an [`Http`](Self::Http) error.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            Self::Http { status_code, .. } => Some(*status_code),
            _ => None,
        }
    }
}

fn excerpt(body: &str) -> String {
    match body.char_indices().nth(MAX_BODY_EXCERPT) {
        Some((idx, _)) => format!("{}...", &body[..idx]),
        None => body.to_string(),
    }
}

/// A convenience alias for `Result<T, AnyMotionError>`.
pub type Result<T> = std::result::Result<T, AnyMotionError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn http_error_message_truncates_long_bodies() {
        let err = AnyMotionError::Http {
            status_code: 400,
            url: "http://api.example.com/anymotion/v1/images/".into(),
            method: "POST".into(),
            body: "x".repeat(2000),
        };

        let message = err.to_string();
        assert!(message.starts_with("POST http://api.example.com/anymotion/v1/images/ failed."));
        assert!(message.contains("status code: 400"));
        assert!(message.ends_with("..."));
        assert!(message.len() < 700);
        assert_eq!(err.status_code(), Some(400));
    }

    #[test]
    fn short_bodies_are_kept_whole() {
        assert_eq!(excerpt("{\"detail\":\"bad\"}"), "{\"detail\":\"bad\"}");
    }
}
