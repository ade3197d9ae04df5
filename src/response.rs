use std::fmt;
use std::sync::OnceLock;

use bytes::Bytes;
use reqwest::header::HeaderMap;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

use crate::errors::{AnyMotionError, Result};
use crate::transport::HttpResponse;

/// A successful API response.
///
/// The body is parsed as JSON on first access and kept.
#[derive(Debug, Clone)]
pub struct Response {
    status: StatusCode,
    headers: HeaderMap,
    body: Bytes,
    json: OnceLock<Option<Value>>,
}

impl Response {
    pub(crate) fn new(raw: HttpResponse) -> Self {
        Self {
            status: raw.status,
            headers: raw.headers,
            body: raw.body,
            json: OnceLock::new(),
        }
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn bytes(&self) -> &Bytes {
        &self.body
    }

    /// The parsed body.
    pub fn json(&self) -> Result<&Value> {
        self.json
            .get_or_init(|| serde_json::from_slice(&self.body).ok())
            .as_ref()
            .ok_or_else(|| AnyMotionError::response_format("response body is not valid JSON"))
    }

    /// One top-level field, `None` when absent.
    pub fn get(&self, key: &str) -> Result<Option<&Value>> {
        Ok(self.object()?.get(key))
    }

    /// One top-level field that must be present.
    pub fn require(&self, key: &str) -> Result<&Value> {
        self.get(key)?
            .ok_or_else(|| AnyMotionError::response_format(format!("missing field `{key}`")))
    }

    /// Several top-level fields, in the order asked for; all must be present.
    pub fn require_all(&self, keys: &[&str]) -> Result<Vec<&Value>> {
        keys.iter().map(|key| self.require(key)).collect()
    }

    /// A required field holding a non-negative integer id.
    pub fn require_id(&self, key: &str) -> Result<u64> {
        self.require(key)?.as_u64().ok_or_else(|| {
            AnyMotionError::response_format(format!("field `{key}` is not an integer id"))
        })
    }

    fn object(&self) -> Result<&serde_json::Map<String, Value>> {
        self.json()?
            .as_object()
            .ok_or_else(|| AnyMotionError::response_format("response body is not a JSON object"))
    }
}

/// Lifecycle of a server-side job.
///
/// `Timeout` is never sent by the server; it marks a wait that ran out of budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobStatus {
    Processing,
    Success,
    Failure,
    Timeout,
}

impl JobStatus {
    /// SUCCESS, FAILURE or TIMEOUT.
    pub fn is_terminal(self) -> bool {
        !matches!(self, Self::Processing)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Processing => "PROCESSING",
            Self::Success => "SUCCESS",
            Self::Failure => "FAILURE",
            Self::Timeout => "TIMEOUT",
        }
    }

    /// Map a server `execStatus`. Anything unrecognised still counts as in progress.
    pub(crate) fn from_exec_status(raw: Option<&str>) -> Self {
        match raw {
            Some("SUCCESS") => Self::Success,
            Some("FAILURE") => Self::Failure,
            Some("PROCESSING") => Self::Processing,
            other => {
                warn!(exec_status = ?other, "unexpected execStatus, treating job as still processing");
                Self::Processing
            }
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of waiting on an extraction, drawing, analysis or comparison job.
#[derive(Debug, Clone)]
pub struct JobResult {
    response: Response,
    status: OnceLock<JobStatus>,
}

impl JobResult {
    pub(crate) fn new(response: Response) -> Self {
        Self {
            response,
            status: OnceLock::new(),
        }
    }

    /// Derived from `execStatus` on first read, then fixed.
    pub fn status(&self) -> JobStatus {
        *self.status.get_or_init(|| {
            let exec_status = self
                .response
                .get("execStatus")
                .ok()
                .flatten()
                .and_then(Value::as_str);
            JobStatus::from_exec_status(exec_status)
        })
    }

    /// Override the status without consulting the body again.
    pub fn set_status(&mut self, status: JobStatus) {
        self.status = OnceLock::from(status);
    }

    /// The server's explanation, only for failed jobs.
    pub fn failure_detail(&self) -> Option<&str> {
        if self.status() != JobStatus::Failure {
            return None;
        }
        self.str_field("failureDetail")
    }

    /// Where the rendered output of a drawing job can be fetched.
    pub fn drawing_url(&self) -> Option<&str> {
        self.str_field("drawingUrl")
    }

    /// The raw job representation.
    pub fn json(&self) -> Result<&Value> {
        self.response.json()
    }

    pub fn response(&self) -> &Response {
        &self.response
    }

    fn str_field(&self, key: &str) -> Option<&str> {
        self.response.get(key).ok().flatten().and_then(Value::as_str)
    }
}

impl fmt::Display for JobResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<Result [{}]>", self.status())
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn response(body: Value) -> Response {
        Response::new(HttpResponse {
            status: StatusCode::OK,
            headers: HeaderMap::new(),
            body: Bytes::from(body.to_string()),
        })
    }

    #[test]
    fn get_and_require_fields() {
        let resp = response(json!({"id": 5, "uploadUrl": "http://upload", "next": null}));

        assert_eq!(resp.get("id").unwrap(), Some(&json!(5)));
        assert_eq!(resp.get("missing").unwrap(), None);
        assert_eq!(resp.require_id("id").unwrap(), 5);

        let fields = resp.require_all(&["id", "uploadUrl"]).unwrap();
        assert_eq!(fields, vec![&json!(5), &json!("http://upload")]);

        let err = resp.require_all(&["id", "nope"]).unwrap_err();
        assert!(matches!(err, AnyMotionError::ResponseFormat { .. }));
    }

    #[test]
    fn non_object_body_is_a_format_error() {
        let resp = response(json!([1, 2, 3]));
        assert!(resp.json().is_ok());
        assert!(matches!(
            resp.get("id"),
            Err(AnyMotionError::ResponseFormat { .. })
        ));
    }

    #[test]
    fn status_is_read_from_exec_status() {
        let result = JobResult::new(response(json!({"execStatus": "SUCCESS"})));
        assert_eq!(result.status(), JobStatus::Success);
        assert_eq!(result.to_string(), "<Result [SUCCESS]>");
    }

    #[test]
    fn set_status_overrides_body() {
        let mut result = JobResult::new(response(json!({"execStatus": "PROCESSING"})));
        assert_eq!(result.status(), JobStatus::Processing);

        result.set_status(JobStatus::Timeout);
        assert_eq!(result.status(), JobStatus::Timeout);
        assert!(result.status().is_terminal());
    }

    #[test]
    fn failure_detail_only_for_failures() {
        let failed = JobResult::new(response(
            json!({"execStatus": "FAILURE", "failureDetail": "no person found"}),
        ));
        assert_eq!(failed.failure_detail(), Some("no person found"));

        let ok = JobResult::new(response(
            json!({"execStatus": "SUCCESS", "failureDetail": "stale"}),
        ));
        assert_eq!(ok.failure_detail(), None);
    }

    #[test]
    fn unknown_exec_status_counts_as_processing() {
        let result = JobResult::new(response(json!({"execStatus": "QUEUED"})));
        assert_eq!(result.status(), JobStatus::Processing);
    }
}
