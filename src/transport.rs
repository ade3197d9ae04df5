//! The single-request HTTP capability underneath [`ApiSession`](crate::ApiSession).

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::header::HeaderMap;
use reqwest::{Method, StatusCode};
use tokio::io::AsyncWriteExt;
use tracing::debug;

use crate::errors::{AnyMotionError, Result};

const DEFAULT_RETRY_TOTAL: u32 = 5;
const DEFAULT_RETRY_BACKOFF: Duration = Duration::from_millis(100);
const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Statuses retried transparently before a response is handed back.
const RETRY_STATUSES: [StatusCode; 4] = [
    StatusCode::INTERNAL_SERVER_ERROR,
    StatusCode::BAD_GATEWAY,
    StatusCode::SERVICE_UNAVAILABLE,
    StatusCode::GATEWAY_TIMEOUT,
];

/// An outgoing request, fully prepared.
#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub method: Method,
    pub url: String,
    pub query: Vec<(String, String)>,
    pub headers: HeaderMap,
    pub body: Option<Bytes>,
}

/// A received response with its body buffered.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

/// Issues one HTTP request and reports what came back.
///
/// Implementations own retries for transient failures. A non-2xx status is
/// not an error at this layer; connection failures and exhausted retries are
/// reported as [`AnyMotionError::Transport`].
#[async_trait]
pub trait HttpTransport: Send + Sync {
    async fn send(&self, request: &HttpRequest) -> Result<HttpResponse>;

    /// Send `request` and, on a 2xx status, write the body to `dest`.
    ///
    /// `dest` is only created once a successful status is known. The returned
    /// response has an empty body on success and the buffered error body
    /// otherwise.
    async fn download(&self, request: &HttpRequest, dest: &Path) -> Result<HttpResponse> {
        let response = self.send(request).await?;
        if !response.status.is_success() {
            return Ok(response);
        }
        tokio::fs::write(dest, &response.body).await?;
        Ok(HttpResponse {
            body: Bytes::new(),
            ..response
        })
    }
}

/// [`HttpTransport`] backed by `reqwest`, retrying connection errors with
/// exponential backoff. GET, PUT and DELETE are also retried on timeouts and
/// 500/502/503/504 responses; a POST gets its first response back as-is.
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: reqwest::Client,
    retry_total: u32,
    backoff: Duration,
}

impl ReqwestTransport {
    pub fn builder() -> ReqwestTransportBuilder {
        ReqwestTransportBuilder::default()
    }

    pub fn new() -> Result<Self> {
        Self::builder().build()
    }

    fn backoff_delay(&self, retry_number: u32) -> Duration {
        let shift = retry_number.saturating_sub(1).min(8);
        self.backoff.saturating_mul(1u32 << shift)
    }

    fn transport_error(request: &HttpRequest, message: impl Into<String>) -> AnyMotionError {
        AnyMotionError::Transport {
            method: request.method.to_string(),
            url: request.url.clone(),
            message: message.into(),
        }
    }

    fn build(&self, request: &HttpRequest) -> reqwest::RequestBuilder {
        let mut builder = self
            .client
            .request(request.method.clone(), &request.url)
            .headers(request.headers.clone());
        if !request.query.is_empty() {
            builder = builder.query(&request.query);
        }
        if let Some(body) = &request.body {
            builder = builder.body(body.clone());
        }
        builder
    }

    /// Run the retry loop and hand back the live response for the caller to
    /// consume. The body of a retried response is discarded.
    async fn execute(&self, request: &HttpRequest) -> Result<reqwest::Response> {
        let attempts = self.retry_total + 1;
        let idempotent = is_idempotent(&request.method);

        for attempt in 1..=attempts {
            let last = attempt == attempts;
            debug!(attempt, method = %request.method, url = %request.url, "sending HTTP request");

            match self.build(request).send().await {
                Ok(response) => {
                    let status = response.status();
                    debug!(attempt, method = %request.method, url = %request.url, %status, "received HTTP response");

                    if idempotent && RETRY_STATUSES.contains(&status) {
                        if last {
                            return Err(Self::transport_error(
                                request,
                                format!("gave up after {attempts} attempts, last status {status}"),
                            ));
                        }
                        tokio::time::sleep(self.backoff_delay(attempt)).await;
                        continue;
                    }

                    return Ok(response);
                }
                Err(err) => {
                    debug!(attempt, method = %request.method, url = %request.url, error = %err, "HTTP request failed");

                    if !last && should_retry_error(&err, idempotent) {
                        tokio::time::sleep(self.backoff_delay(attempt)).await;
                        continue;
                    }
                    return Err(Self::transport_error(request, err.to_string()));
                }
            }
        }

        Err(Self::transport_error(request, "no attempt was made"))
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn send(&self, request: &HttpRequest) -> Result<HttpResponse> {
        let response = self.execute(request).await?;
        let status = response.status();
        let headers = response.headers().clone();
        let body = response
            .bytes()
            .await
            .map_err(|e| Self::transport_error(request, e.to_string()))?;

        Ok(HttpResponse {
            status,
            headers,
            body,
        })
    }

    async fn download(&self, request: &HttpRequest, dest: &Path) -> Result<HttpResponse> {
        let mut response = self.execute(request).await?;
        let status = response.status();
        let headers = response.headers().clone();

        if !status.is_success() {
            let body = response
                .bytes()
                .await
                .map_err(|e| Self::transport_error(request, e.to_string()))?;
            return Ok(HttpResponse {
                status,
                headers,
                body,
            });
        }

        let mut file = tokio::fs::File::create(dest).await?;
        while let Some(chunk) = response
            .chunk()
            .await
            .map_err(|e| Self::transport_error(request, e.to_string()))?
        {
            file.write_all(&chunk).await?;
        }
        file.flush().await?;

        Ok(HttpResponse {
            status,
            headers,
            body: Bytes::new(),
        })
    }
}

/// Builder for [`ReqwestTransport`].
#[derive(Debug)]
pub struct ReqwestTransportBuilder {
    retry_total: u32,
    backoff: Duration,
    timeout: Duration,
}

impl Default for ReqwestTransportBuilder {
    fn default() -> Self {
        Self {
            retry_total: DEFAULT_RETRY_TOTAL,
            backoff: DEFAULT_RETRY_BACKOFF,
            timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }
}

impl ReqwestTransportBuilder {
    /// Retries after the first attempt (defaults to 5).
    pub fn retry_total(mut self, n: u32) -> Self {
        self.retry_total = n;
        self
    }

    /// Delay before the first retry, doubled for each further one (defaults to 100ms).
    pub fn backoff(mut self, backoff: Duration) -> Self {
        self.backoff = backoff;
        self
    }

    /// Per-request timeout (defaults to 60 seconds).
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn build(self) -> Result<ReqwestTransport> {
        let client = reqwest::Client::builder()
            .timeout(self.timeout)
            .build()
            .map_err(|e| AnyMotionError::Config {
                message: format!("failed to build HTTP client: {e}"),
            })?;

        Ok(ReqwestTransport {
            client,
            retry_total: self.retry_total,
            backoff: self.backoff,
        })
    }
}

/// POST creates records and jobs, so a resend may duplicate server-side work.
fn is_idempotent(method: &Method) -> bool {
    matches!(*method, Method::GET | Method::PUT | Method::DELETE)
}

/// A connect failure never reached the server and is safe to resend for any
/// method; a timeout may have, so only idempotent requests retry it.
fn should_retry_error(err: &reqwest::Error, idempotent: bool) -> bool {
    err.is_connect() || (idempotent && err.is_timeout())
}
