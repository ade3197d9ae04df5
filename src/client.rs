use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tracing::{debug, info, warn};
use url::Url;

use crate::auth::TokenProvider;
use crate::config::{ApiUrl, ClientConfig};
use crate::errors::{AnyMotionError, Result};
use crate::media::{content_md5, expand_home, MediaType};
use crate::models::{
    AnalysisRequest, ComparisonRequest, DownloadOptions, DrawingRequest, Endpoint,
    ExtractionRequest, MediaRegistration, UploadResult, PAGE_SIZE,
};
use crate::response::{JobResult, Response};
use crate::session::{ApiSession, RequestOptions, DEFAULT_HISTORY_SIZE};
use crate::transport::{HttpTransport, ReqwestTransport};
use crate::waiter::PollingWaiter;

/// Builder for constructing a [`Client`] with custom configuration.
///
/// Anything not set explicitly comes from [`ClientConfig::from_env`].
///
/// # Example
///
/// ```no_run
/// use anymotion::ClientBuilder;
/// use std::time::Duration;
///
/// # fn example() -> anymotion::Result<()> {
/// let client = ClientBuilder::new()
///     .client_id("my-client-id")
///     .client_secret("my-client-secret")
///     .api_url("https://api.customer.jp/anymotion/v1/")
///     .interval(Duration::from_secs(2))
///     .timeout(Duration::from_secs(300))
///     .build()?;
/// # Ok(())
/// # }
/// ```
pub struct ClientBuilder {
    client_id: Option<String>,
    client_secret: Option<String>,
    api_url: Option<String>,
    interval: Option<Duration>,
    timeout: Option<Duration>,
    retry_total: Option<u32>,
    retry_backoff: Option<Duration>,
    request_timeout: Option<Duration>,
    history_size: usize,
    transport: Option<Arc<dyn HttpTransport>>,
}

impl ClientBuilder {
    /// Create a new builder with default settings.
    pub fn new() -> Self {
        Self {
            client_id: None,
            client_secret: None,
            api_url: None,
            interval: None,
            timeout: None,
            retry_total: None,
            retry_backoff: None,
            request_timeout: None,
            history_size: DEFAULT_HISTORY_SIZE,
            transport: None,
        }
    }

    /// Start from an explicit configuration instead of the environment.
    pub fn from_config(config: ClientConfig) -> Self {
        Self {
            client_id: Some(config.client_id),
            client_secret: Some(config.client_secret),
            api_url: Some(config.api_url),
            interval: Some(config.interval),
            timeout: Some(config.timeout),
            ..Self::new()
        }
    }

    pub fn client_id(mut self, id: impl Into<String>) -> Self {
        self.client_id = Some(id.into());
        self
    }

    pub fn client_secret(mut self, secret: impl Into<String>) -> Self {
        self.client_secret = Some(secret.into());
        self
    }

    /// Override the API URL (defaults to `https://api.customer.jp/anymotion/v1/`).
    pub fn api_url(mut self, url: impl Into<String>) -> Self {
        self.api_url = Some(url.into());
        self
    }

    /// Pause between polls while waiting for a job (defaults to 5 seconds, at least 100ms).
    pub fn interval(mut self, d: Duration) -> Self {
        self.interval = Some(d);
        self
    }

    /// Polling budget for each wait (defaults to 600 seconds).
    pub fn timeout(mut self, d: Duration) -> Self {
        self.timeout = Some(d);
        self
    }

    /// Retries for 5xx responses and connection errors (defaults to 5).
    pub fn retry_total(mut self, n: u32) -> Self {
        self.retry_total = Some(n);
        self
    }

    /// First retry delay, doubled on each further retry (defaults to 100ms).
    pub fn retry_backoff(mut self, d: Duration) -> Self {
        self.retry_backoff = Some(d);
        self
    }

    /// Per-request HTTP timeout (defaults to 60 seconds).
    pub fn request_timeout(mut self, d: Duration) -> Self {
        self.request_timeout = Some(d);
        self
    }

    /// Number of requests and responses remembered (defaults to 10000).
    pub fn history_size(mut self, n: usize) -> Self {
        self.history_size = n;
        self
    }

    /// Use a custom transport instead of the built-in reqwest one. Retry and
    /// request timeout settings are then the transport's business.
    pub fn transport(mut self, transport: Arc<dyn HttpTransport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Build the [`Client`].
    ///
    /// Returns [`AnyMotionError::Config`] for empty credentials or an API URL
    /// whose path does not contain `anymotion`.
    pub fn build(self) -> Result<Client> {
        let env = ClientConfig::from_env();
        let config = ClientConfig {
            client_id: self.client_id.unwrap_or(env.client_id),
            client_secret: self.client_secret.unwrap_or(env.client_secret),
            api_url: self.api_url.unwrap_or(env.api_url),
            interval: self.interval.unwrap_or(env.interval),
            timeout: self.timeout.unwrap_or(env.timeout),
        };
        debug!(api_url = %config.api_url, "initializing client");

        let credentials = config.credentials()?;
        let api_url = config.parsed_api_url()?;

        let transport = match self.transport {
            Some(transport) => transport,
            None => {
                let mut builder = ReqwestTransport::builder();
                if let Some(n) = self.retry_total {
                    builder = builder.retry_total(n);
                }
                if let Some(d) = self.retry_backoff {
                    builder = builder.backoff(d);
                }
                if let Some(d) = self.request_timeout {
                    builder = builder.timeout(d);
                }
                Arc::new(builder.build()?)
            }
        };

        let session = Arc::new(ApiSession::with_history_size(transport, self.history_size));
        let auth = TokenProvider::new(credentials, api_url.token_endpoint()?, session.clone());

        Ok(Client {
            api_url,
            session,
            auth,
            waiter: PollingWaiter::new(config.interval, config.timeout),
        })
    }
}

impl Default for ClientBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// The AnyMotion API client.
///
/// # Example
///
/// ```no_run
/// use anymotion::{Client, ExtractionRequest, JobStatus};
///
/// # async fn example() -> anymotion::Result<()> {
/// let client = Client::from_env()?;
///
/// let upload = client.upload("squat.mp4", None).await?;
/// let keypoint_id = client
///     .extract_keypoint(ExtractionRequest {
///         movie_id: upload.movie_id,
///         ..Default::default()
///     })
///     .await?;
/// let result = client.wait_for_extraction(keypoint_id).await?;
/// assert_eq!(result.status(), JobStatus::Success);
/// # Ok(())
/// # }
/// ```
pub struct Client {
    api_url: ApiUrl,
    session: Arc<ApiSession>,
    auth: TokenProvider,
    waiter: PollingWaiter,
}

impl Client {
    /// Build a client from `ANYMOTION_CLIENT_ID`, `ANYMOTION_CLIENT_SECRET`
    /// and `ANYMOTION_API_URL`.
    pub fn from_env() -> Result<Self> {
        ClientBuilder::new().build()
    }

    pub fn new(config: ClientConfig) -> Result<Self> {
        ClientBuilder::from_config(config).build()
    }

    /// The underlying session, for request/response history and callbacks.
    pub fn session(&self) -> &ApiSession {
        &self.session
    }

    pub fn auth(&self) -> &TokenProvider {
        &self.auth
    }

    /// The validated API root, always ending in `/`.
    pub fn api_url(&self) -> &Url {
        self.api_url.api_url()
    }

    /// Fetch a single record: `GET {api}/{endpoint}/{id}/`.
    pub async fn get_one_data(&self, endpoint: Endpoint, id: u64) -> Result<Value> {
        let url = self.api_url.resource(&format!("{endpoint}/{id}/"))?;
        let response = self.authed("GET", url.as_str(), RequestOptions::new()).await?;
        Ok(response.json()?.clone())
    }

    pub async fn get_image(&self, image_id: u64) -> Result<Value> {
        self.get_one_data(Endpoint::Images, image_id).await
    }

    pub async fn get_movie(&self, movie_id: u64) -> Result<Value> {
        self.get_one_data(Endpoint::Movies, movie_id).await
    }

    /// With `join_data`, the `image` and `movie` ids are replaced by the records.
    pub async fn get_keypoint(&self, keypoint_id: u64, join_data: bool) -> Result<Value> {
        let mut keypoint = self.get_one_data(Endpoint::Keypoints, keypoint_id).await?;
        if join_data {
            if let Some(image_id) = related_id(&keypoint, "image") {
                keypoint["image"] = self.get_image(image_id).await?;
            }
            if let Some(movie_id) = related_id(&keypoint, "movie") {
                keypoint["movie"] = self.get_movie(movie_id).await?;
            }
        }
        Ok(keypoint)
    }

    /// With `join_data`, `keypoint` is replaced by the joined keypoint record.
    pub async fn get_drawing(&self, drawing_id: u64, join_data: bool) -> Result<Value> {
        let drawing = self.get_one_data(Endpoint::Drawings, drawing_id).await?;
        self.join_keypoints(drawing, join_data, &["keypoint"]).await
    }

    /// With `join_data`, `keypoint` is replaced by the joined keypoint record.
    pub async fn get_analysis(&self, analysis_id: u64, join_data: bool) -> Result<Value> {
        let analysis = self.get_one_data(Endpoint::Analyses, analysis_id).await?;
        self.join_keypoints(analysis, join_data, &["keypoint"]).await
    }

    /// With `join_data`, `source` and `target` are replaced by the joined keypoint records.
    pub async fn get_comparison(&self, comparison_id: u64, join_data: bool) -> Result<Value> {
        let comparison = self.get_one_data(Endpoint::Comparisons, comparison_id).await?;
        self.join_keypoints(comparison, join_data, &["source", "target"])
            .await
    }

    /// Fetch every record of a collection, following `next` links until they run out.
    ///
    /// `params` are sent with the first request only, together with
    /// `size=1000`; later pages are requested via their `next` URL verbatim.
    pub async fn get_list_data(
        &self,
        endpoint: Endpoint,
        params: &[(&str, &str)],
    ) -> Result<Vec<Value>> {
        let first = self.api_url.resource(&format!("{endpoint}/"))?;
        let mut next = Some(first.to_string());
        let mut opts = RequestOptions::new()
            .params(params.iter().copied())
            .param("size", PAGE_SIZE);
        let mut data = Vec::new();

        while let Some(url) = next {
            let response = self.authed("GET", &url, std::mem::take(&mut opts)).await?;
            let page = response.require("data")?.as_array().ok_or_else(|| {
                AnyMotionError::response_format(format!("`data` of {url} is not a list"))
            })?;
            data.extend(page.iter().cloned());

            // The last page may leave `next` out entirely.
            next = match response.get("next")? {
                None | Some(Value::Null) => None,
                Some(Value::String(s)) => Some(s.clone()),
                _ => {
                    return Err(AnyMotionError::response_format(format!(
                        "`next` of {url} is neither a URL nor null"
                    )))
                }
            };
        }

        debug!(%endpoint, count = data.len(), "fetched list");
        Ok(data)
    }

    pub async fn get_images(&self, params: &[(&str, &str)]) -> Result<Vec<Value>> {
        self.get_list_data(Endpoint::Images, params).await
    }

    pub async fn get_movies(&self, params: &[(&str, &str)]) -> Result<Vec<Value>> {
        self.get_list_data(Endpoint::Movies, params).await
    }

    pub async fn get_keypoints(&self, params: &[(&str, &str)]) -> Result<Vec<Value>> {
        self.get_list_data(Endpoint::Keypoints, params).await
    }

    pub async fn get_drawings(&self, params: &[(&str, &str)]) -> Result<Vec<Value>> {
        self.get_list_data(Endpoint::Drawings, params).await
    }

    pub async fn get_analyses(&self, params: &[(&str, &str)]) -> Result<Vec<Value>> {
        self.get_list_data(Endpoint::Analyses, params).await
    }

    pub async fn get_comparisons(&self, params: &[(&str, &str)]) -> Result<Vec<Value>> {
        self.get_list_data(Endpoint::Comparisons, params).await
    }

    /// Upload an image or movie to the cloud storage.
    ///
    /// This performs two HTTP calls:
    /// 1. `POST /images/` or `POST /movies/` with the file's MD5 and name.
    /// 2. `PUT` the file bytes to the returned signed URL.
    ///
    /// # Errors
    ///
    /// - [`AnyMotionError::UnsupportedFileType`] unless the extension is
    ///   `.mp4`, `.mov`, `.jpg`, `.jpeg` or `.png`; nothing is sent.
    /// - [`AnyMotionError::Io`] if the file cannot be read.
    pub async fn upload(&self, path: impl AsRef<Path>, text: Option<&str>) -> Result<UploadResult> {
        let path = expand_home(path.as_ref());
        let media_type = MediaType::from_path(&path)?;

        let bytes = tokio::fs::read(&path).await?;
        let md5 = content_md5(&bytes);
        let name = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();

        let registration = MediaRegistration {
            content_md5: &md5,
            name: &name,
            text,
        };
        let url = self.api_url.resource(&format!("{}/", media_type.endpoint()))?;
        let response = self
            .authed("POST", url.as_str(), RequestOptions::new().json(to_body(&registration)?))
            .await?;
        let media_id = response.require_id("id")?;
        let upload_url = response
            .require("uploadUrl")?
            .as_str()
            .ok_or_else(|| AnyMotionError::response_format("`uploadUrl` is not a string"))?
            .to_string();

        self.session
            .request(
                "PUT",
                &upload_url,
                RequestOptions::new().body(bytes).header("Content-MD5", md5),
            )
            .await?;
        info!(%media_type, media_id, path = %path.display(), "uploaded file");

        Ok(match media_type {
            MediaType::Image => UploadResult {
                image_id: Some(media_id),
                movie_id: None,
            },
            MediaType::Movie => UploadResult {
                image_id: None,
                movie_id: Some(media_id),
            },
        })
    }

    /// Download the rendered output of a drawing job and return where it was written.
    ///
    /// # Errors
    ///
    /// - [`AnyMotionError::NoContent`] if the drawing has no `drawingUrl` yet.
    /// - [`AnyMotionError::FileExists`] if the target exists and
    ///   [`DownloadOptions::exist_ok`] is off; the file is left untouched.
    pub async fn download(&self, drawing_id: u64, opts: DownloadOptions) -> Result<PathBuf> {
        let drawing = self.get_one_data(Endpoint::Drawings, drawing_id).await?;
        let url = drawing
            .get("drawingUrl")
            .and_then(Value::as_str)
            .ok_or_else(|| AnyMotionError::NoContent {
                message: format!(
                    "can't download drawing {drawing_id} because it doesn't have a drawing url"
                ),
            })?;
        let parsed = Url::parse(url).map_err(|e| {
            AnyMotionError::response_format(format!("invalid drawing url {url}: {e}"))
        })?;
        let url_path = Path::new(parsed.path());
        let file_name = url_path.file_name().map(PathBuf::from).ok_or_else(|| {
            AnyMotionError::response_format(format!("drawing url {url} has no file name"))
        })?;

        let mut path = match opts.path {
            Some(path) => expand_home(&path),
            None => file_name.clone(),
        };
        if path.is_dir() {
            path.push(&file_name);
        }

        if opts.fix_suffix && path.extension() != url_path.extension() {
            match url_path.extension() {
                Some(suffix) => path.set_extension(suffix),
                None => path.set_extension(""),
            };
            warn!(path = %path.display(), "changed download path to match the drawing's file type");
        }

        if !opts.exist_ok && tokio::fs::try_exists(&path).await? {
            return Err(AnyMotionError::FileExists { path });
        }

        self.session.download(url, &path, RequestOptions::new()).await?;
        info!(path = %path.display(), "downloaded file");

        Ok(path)
    }

    /// Start keypoint extraction and return the keypoint id.
    ///
    /// Returns [`AnyMotionError::Argument`] unless exactly one of `image_id`,
    /// `movie_id` or `data` is set.
    pub async fn extract_keypoint(&self, request: ExtractionRequest) -> Result<u64> {
        let body = request.into_body()?;
        self.start(Endpoint::Keypoints, body).await
    }

    /// Start drawing a keypoint or comparison and return the drawing id.
    pub async fn draw_keypoint(&self, request: DrawingRequest) -> Result<u64> {
        request.validate()?;
        self.start(Endpoint::Drawings, to_body(&request)?).await
    }

    /// Start analysing a keypoint and return the analysis id.
    pub async fn analyze_keypoint(&self, keypoint_id: u64, rule: Value) -> Result<u64> {
        let body = to_body(&AnalysisRequest { keypoint_id, rule })?;
        self.start(Endpoint::Analyses, body).await
    }

    /// Start comparing two keypoints and return the comparison id.
    pub async fn compare_keypoint(&self, source_id: u64, target_id: u64) -> Result<u64> {
        let body = to_body(&ComparisonRequest {
            source_id,
            target_id,
        })?;
        self.start(Endpoint::Comparisons, body).await
    }

    pub async fn wait_for_extraction(&self, keypoint_id: u64) -> Result<JobResult> {
        self.wait_for(Endpoint::Keypoints, keypoint_id).await
    }

    pub async fn wait_for_drawing(&self, drawing_id: u64) -> Result<JobResult> {
        self.wait_for(Endpoint::Drawings, drawing_id).await
    }

    pub async fn wait_for_analysis(&self, analysis_id: u64) -> Result<JobResult> {
        self.wait_for(Endpoint::Analyses, analysis_id).await
    }

    pub async fn wait_for_comparison(&self, comparison_id: u64) -> Result<JobResult> {
        self.wait_for(Endpoint::Comparisons, comparison_id).await
    }

    /// Name of the image or movie a drawing was made from.
    pub async fn get_name_from_drawing_id(&self, drawing_id: u64) -> Result<String> {
        let drawing = self.get_drawing(drawing_id, true).await?;
        let keypoint = drawing
            .get("keypoint")
            .filter(|k| k.is_object())
            .ok_or_else(|| {
                AnyMotionError::response_format(format!("drawing {drawing_id} has no keypoint"))
            })?;

        ["image", "movie"]
            .iter()
            .filter_map(|key| keypoint.get(*key))
            .find_map(|media| media.get("name").and_then(Value::as_str))
            .map(str::to_string)
            .ok_or_else(|| {
                AnyMotionError::response_format(format!(
                    "drawing {drawing_id} has no image or movie name"
                ))
            })
    }

    // -----------------------------------------------------------------------
    // Private helpers
    // -----------------------------------------------------------------------

    async fn authed(&self, method: &str, url: &str, opts: RequestOptions) -> Result<Response> {
        let token = self.auth.get_token().await?;
        self.session.request(method, url, opts.token(token)).await
    }

    async fn start(&self, endpoint: Endpoint, body: Value) -> Result<u64> {
        let url = self.api_url.resource(&format!("{endpoint}/"))?;
        let response = self
            .authed("POST", url.as_str(), RequestOptions::new().json(body))
            .await?;
        let id = response.require_id("id")?;
        info!(%endpoint, id, "started job");
        Ok(id)
    }

    async fn wait_for(&self, endpoint: Endpoint, id: u64) -> Result<JobResult> {
        let url = self.api_url.resource(&format!("{endpoint}/{id}/"))?;
        self.waiter.wait(&self.session, &self.auth, url.as_str()).await
    }

    async fn join_keypoints(
        &self,
        mut record: Value,
        join_data: bool,
        keys: &[&str],
    ) -> Result<Value> {
        if join_data {
            for key in keys {
                if let Some(keypoint_id) = related_id(&record, key) {
                    record[*key] = self.get_keypoint(keypoint_id, true).await?;
                }
            }
        }
        Ok(record)
    }
}

/// A relation field holding a non-zero id.
fn related_id(record: &Value, key: &str) -> Option<u64> {
    record.get(key).and_then(Value::as_u64).filter(|id| *id != 0)
}

fn to_body<T: serde::Serialize>(body: &T) -> Result<Value> {
    serde_json::to_value(body)
        .map_err(|e| AnyMotionError::argument(format!("cannot encode request body: {e}")))
}
