//! Authenticated JSON requests over an [`HttpTransport`], with a bounded
//! record of recent traffic and observation hooks.

use std::collections::VecDeque;
use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use bytes::Bytes;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, AUTHORIZATION, CONTENT_TYPE, USER_AGENT};
use reqwest::Method;
use serde_json::Value;
use tracing::debug;

use crate::errors::{AnyMotionError, Result};
use crate::response::Response;
use crate::transport::{HttpRequest, HttpResponse, HttpTransport};

pub const DEFAULT_HISTORY_SIZE: usize = 10_000;

const SDK_USER_AGENT: &str = concat!("anymotion-sdk-rust/", env!("CARGO_PKG_VERSION"));

pub type RequestCallback = Arc<dyn Fn(&HttpRequest) + Send + Sync>;
pub type ResponseCallback = Arc<dyn Fn(&HttpResponse) + Send + Sync>;

/// Optional parts of a request.
#[derive(Debug, Clone, Default)]
pub struct RequestOptions {
    params: Vec<(String, String)>,
    json: Option<Value>,
    body: Option<Bytes>,
    headers: Vec<(String, String)>,
    token: Option<String>,
}

impl RequestOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a query parameter.
    pub fn param(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.params.push((key.into(), value.to_string()));
        self
    }

    pub fn params<I, K, V>(mut self, params: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: ToString,
    {
        self.params
            .extend(params.into_iter().map(|(k, v)| (k.into(), v.to_string())));
        self
    }

    /// JSON body; also sets `Content-Type: application/json`.
    pub fn json(mut self, body: Value) -> Self {
        self.json = Some(body);
        self
    }

    /// Raw body sent as-is. Ignored when a JSON body is set.
    pub fn body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = Some(body.into());
        self
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Bearer token for the `Authorization` header.
    pub fn token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }
}

/// Wraps an [`HttpTransport`] with header injection, JSON encoding and error
/// mapping. Every request and response passes through the history buffers and
/// the registered callbacks.
pub struct ApiSession {
    transport: Arc<dyn HttpTransport>,
    history_size: usize,
    request_history: Mutex<VecDeque<HttpRequest>>,
    response_history: Mutex<VecDeque<HttpResponse>>,
    request_callbacks: RwLock<Vec<RequestCallback>>,
    response_callbacks: RwLock<Vec<ResponseCallback>>,
}

impl ApiSession {
    pub fn new(transport: Arc<dyn HttpTransport>) -> Self {
        Self::with_history_size(transport, DEFAULT_HISTORY_SIZE)
    }

    pub fn with_history_size(transport: Arc<dyn HttpTransport>, history_size: usize) -> Self {
        Self {
            transport,
            history_size,
            request_history: Mutex::new(VecDeque::new()),
            response_history: Mutex::new(VecDeque::new()),
            request_callbacks: RwLock::new(Vec::new()),
            response_callbacks: RwLock::new(Vec::new()),
        }
    }

    /// Send a request and return the parsed response.
    ///
    /// # Errors
    ///
    /// - [`AnyMotionError::InvalidMethod`] for anything but GET/POST/PUT/DELETE.
    /// - [`AnyMotionError::Transport`] when the transport gives up.
    /// - [`AnyMotionError::Http`] for a non-2xx final status.
    pub async fn request(&self, method: &str, url: &str, opts: RequestOptions) -> Result<Response> {
        let request = prepare(method, url, opts)?;
        let raw = self.dispatch(&request, None).await?;
        Ok(Response::new(raw))
    }

    /// GET `url` and stream a successful body into `dest`.
    pub async fn download(&self, url: &str, dest: &Path, opts: RequestOptions) -> Result<()> {
        let request = prepare("GET", url, opts)?;
        self.dispatch(&request, Some(dest)).await?;
        Ok(())
    }

    pub fn add_request_callback<F>(&self, callback: F)
    where
        F: Fn(&HttpRequest) + Send + Sync + 'static,
    {
        self.request_callbacks
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Arc::new(callback));
    }

    pub fn add_response_callback<F>(&self, callback: F)
    where
        F: Fn(&HttpResponse) + Send + Sync + 'static,
    {
        self.response_callbacks
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Arc::new(callback));
    }

    /// Requests sent so far, oldest first, capped at the history size.
    pub fn request_history(&self) -> Vec<HttpRequest> {
        lock(&self.request_history).iter().cloned().collect()
    }

    /// Responses received so far, oldest first, capped at the history size.
    pub fn response_history(&self) -> Vec<HttpResponse> {
        lock(&self.response_history).iter().cloned().collect()
    }

    async fn dispatch(&self, request: &HttpRequest, dest: Option<&Path>) -> Result<HttpResponse> {
        debug!(method = %request.method, url = %request.url, query = ?request.query, "sending request");

        let callbacks = self
            .request_callbacks
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        for callback in &callbacks {
            callback(request);
        }

        let sent = match dest {
            Some(dest) => self.transport.download(request, dest).await,
            None => self.transport.send(request).await,
        };
        // Requests that never got an answer stay out of the history.
        if !matches!(sent, Err(AnyMotionError::Transport { .. })) {
            push_bounded(&self.request_history, request.clone(), self.history_size);
        }
        let response = sent?;

        debug!(status = %response.status, bytes = response.body.len(), "received response");

        push_bounded(&self.response_history, response.clone(), self.history_size);
        let callbacks = self
            .response_callbacks
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        for callback in &callbacks {
            callback(&response);
        }

        if !response.status.is_success() {
            return Err(AnyMotionError::Http {
                status_code: response.status.as_u16(),
                url: request.url.clone(),
                method: request.method.to_string(),
                body: String::from_utf8_lossy(&response.body).into_owned(),
            });
        }

        Ok(response)
    }
}

fn prepare(method: &str, url: &str, opts: RequestOptions) -> Result<HttpRequest> {
    let method = match method.to_ascii_uppercase().as_str() {
        "GET" => Method::GET,
        "POST" => Method::POST,
        "PUT" => Method::PUT,
        "DELETE" => Method::DELETE,
        _ => {
            return Err(AnyMotionError::InvalidMethod {
                method: method.to_string(),
            })
        }
    };

    let mut headers = HeaderMap::new();
    for (name, value) in &opts.headers {
        let name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|_| AnyMotionError::argument(format!("invalid header name: {name}")))?;
        let value = HeaderValue::from_str(value)
            .map_err(|_| AnyMotionError::argument(format!("invalid value for header {name}")))?;
        headers.insert(name, value);
    }
    headers.insert(USER_AGENT, HeaderValue::from_static(SDK_USER_AGENT));

    let body = match opts.json {
        Some(json) => {
            headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
            let encoded = serde_json::to_vec(&json)
                .map_err(|e| AnyMotionError::argument(format!("cannot encode JSON body: {e}")))?;
            Some(Bytes::from(encoded))
        }
        None => opts.body,
    };

    if let Some(token) = &opts.token {
        let value = HeaderValue::from_str(&format!("Bearer {token}"))
            .map_err(|_| AnyMotionError::Auth {
                message: "access token contains invalid header characters".into(),
            })?;
        headers.insert(AUTHORIZATION, value);
    }

    Ok(HttpRequest {
        method,
        url: url.to_string(),
        query: opts.params,
        headers,
        body,
    })
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn push_bounded<T>(history: &Mutex<VecDeque<T>>, item: T, capacity: usize) {
    if capacity == 0 {
        return;
    }
    let mut history = lock(history);
    while history.len() >= capacity {
        history.pop_front();
    }
    history.push_back(item);
}
