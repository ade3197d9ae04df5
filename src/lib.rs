//! # AnyMotion SDK for Rust
//!
//! Client for the AnyMotion motion analysis API. Upload images and movies,
//! start keypoint extraction, drawing, analysis and comparison jobs, wait for
//! them to finish, and download the rendered results -- all with async Rust.
//!
//! ## Quick start
//!
//! ```no_run
//! use anymotion::{Client, DownloadOptions, DrawingRequest, ExtractionRequest};
//!
//! #[tokio::main]
//! async fn main() -> anymotion::Result<()> {
//!     // Reads ANYMOTION_CLIENT_ID, ANYMOTION_CLIENT_SECRET and ANYMOTION_API_URL.
//!     let client = Client::from_env()?;
//!
//!     let upload = client.upload("pose.jpg", Some("front view")).await?;
//!     let keypoint_id = client
//!         .extract_keypoint(ExtractionRequest {
//!             image_id: upload.image_id,
//!             ..Default::default()
//!         })
//!         .await?;
//!     let extraction = client.wait_for_extraction(keypoint_id).await?;
//!     println!("extraction: {}", extraction.status());
//!
//!     let drawing_id = client.draw_keypoint(DrawingRequest::keypoint(keypoint_id)).await?;
//!     client.wait_for_drawing(drawing_id).await?;
//!     let path = client.download(drawing_id, DownloadOptions::default()).await?;
//!     println!("saved to {}", path.display());
//!
//!     Ok(())
//! }
//! ```
//!
//! ## Builder pattern
//!
//! ```no_run
//! use anymotion::ClientBuilder;
//! use std::time::Duration;
//!
//! # fn example() -> anymotion::Result<()> {
//! let client = ClientBuilder::new()
//!     .client_id("my-client-id")
//!     .client_secret("my-client-secret")
//!     .api_url("https://api.customer.jp/anymotion/v1/")
//!     .interval(Duration::from_secs(1))
//!     .timeout(Duration::from_secs(120))
//!     .retry_total(3)
//!     .build()?;
//! # Ok(())
//! # }
//! ```
//!
//! The crate logs through `tracing` and never installs a subscriber itself.

mod auth;
mod client;
mod config;
mod errors;
mod media;
mod models;
mod response;
mod session;
mod transport;
mod waiter;

pub use auth::{Token, TokenProvider, DEFAULT_EXPIRY_BUFFER};
pub use client::{Client, ClientBuilder};
pub use config::{
    ApiUrl, ClientConfig, Credentials, API_URL_ENV, CLIENT_ID_ENV, CLIENT_SECRET_ENV,
    DEFAULT_API_URL,
};
pub use errors::{AnyMotionError, Result};
pub use media::{content_md5, MediaType};
pub use models::{DownloadOptions, DrawingRequest, Endpoint, ExtractionRequest, UploadResult};
pub use response::{JobResult, JobStatus, Response};
pub use session::{ApiSession, RequestOptions};
pub use transport::{HttpRequest, HttpResponse, HttpTransport, ReqwestTransport};
pub use waiter::PollingWaiter;
