//! Client configuration: credentials, API location and polling cadence.

use std::fmt;
use std::time::Duration;

use url::Url;

use crate::errors::{AnyMotionError, Result};

pub const CLIENT_ID_ENV: &str = "ANYMOTION_CLIENT_ID";
pub const CLIENT_SECRET_ENV: &str = "ANYMOTION_CLIENT_SECRET";
pub const API_URL_ENV: &str = "ANYMOTION_API_URL";

pub const DEFAULT_API_URL: &str = "https://api.customer.jp/anymotion/v1/";
pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(5);
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(600);

/// OAuth client credentials. Both halves are non-empty.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    client_id: String,
    client_secret: String,
}

impl Credentials {
    pub fn new(client_id: impl Into<String>, client_secret: impl Into<String>) -> Result<Self> {
        let client_id = client_id.into();
        let client_secret = client_secret.into();

        if client_id.is_empty() {
            return Err(AnyMotionError::Config {
                message: format!("Invalid Client ID: {client_id}"),
            });
        }
        if client_secret.is_empty() {
            return Err(AnyMotionError::Config {
                message: format!("Invalid Client Secret: {client_secret}"),
            });
        }

        Ok(Self {
            client_id,
            client_secret,
        })
    }

    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    pub fn client_secret(&self) -> &str {
        &self.client_secret
    }
}

// Keep the secret out of logs.
impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("client_id", &self.client_id)
            .field("client_secret", &"***")
            .finish()
    }
}

/// A validated AnyMotion API URL.
///
/// The path must mention `anymotion` and always ends with `/`, so resource
/// paths can be joined onto it. The OAuth endpoints live at the root of the
/// same host, exposed as [`base_url`](Self::base_url).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiUrl {
    base: Url,
    api: Url,
}

impl ApiUrl {
    pub fn parse(raw: &str) -> Result<Self> {
        let invalid = || AnyMotionError::Config {
            message: format!("Invalid API URL: {raw}"),
        };

        let mut api = Url::parse(raw).map_err(|_| invalid())?;
        if api.cannot_be_a_base() || !api.path().contains("anymotion") {
            return Err(invalid());
        }
        if !api.path().ends_with('/') {
            let path = format!("{}/", api.path());
            api.set_path(&path);
        }
        api.set_query(None);
        api.set_fragment(None);

        let mut base = api.clone();
        base.set_path("/");

        Ok(Self { base, api })
    }

    /// Scheme and authority only, e.g. `https://api.customer.jp/`.
    pub fn base_url(&self) -> &Url {
        &self.base
    }

    /// The full API root, e.g. `https://api.customer.jp/anymotion/v1/`.
    pub fn api_url(&self) -> &Url {
        &self.api
    }

    pub(crate) fn resource(&self, path: &str) -> Result<Url> {
        self.api
            .join(path)
            .map_err(|e| AnyMotionError::argument(format!("cannot build URL for {path}: {e}")))
    }

    pub(crate) fn token_endpoint(&self) -> Result<Url> {
        self.base
            .join("v1/oauth/accesstokens")
            .map_err(|e| AnyMotionError::Config {
                message: format!("cannot build token URL: {e}"),
            })
    }
}

/// Everything needed to talk to the API, assembled once at the application
/// boundary and handed to [`ClientBuilder`](crate::ClientBuilder).
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub client_id: String,
    pub client_secret: String,
    pub api_url: String,
    /// Pause between polls while waiting for a job.
    pub interval: Duration,
    /// Total polling budget for a single wait.
    pub timeout: Duration,
}

impl ClientConfig {
    /// Read credentials and API URL from `ANYMOTION_CLIENT_ID`,
    /// `ANYMOTION_CLIENT_SECRET` and `ANYMOTION_API_URL`.
    ///
    /// Missing variables become empty strings (rejected later by
    /// [`Credentials::new`]); a missing API URL falls back to
    /// [`DEFAULT_API_URL`].
    pub fn from_env() -> Self {
        Self {
            client_id: std::env::var(CLIENT_ID_ENV).unwrap_or_default(),
            client_secret: std::env::var(CLIENT_SECRET_ENV).unwrap_or_default(),
            api_url: std::env::var(API_URL_ENV).unwrap_or_else(|_| DEFAULT_API_URL.to_string()),
            interval: DEFAULT_INTERVAL,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub(crate) fn credentials(&self) -> Result<Credentials> {
        Credentials::new(self.client_id.clone(), self.client_secret.clone())
    }

    pub(crate) fn parsed_api_url(&self) -> Result<ApiUrl> {
        ApiUrl::parse(&self.api_url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn api_url_gets_trailing_slash_and_base() {
        let url = ApiUrl::parse("http://api.example.com/anymotion/v1").unwrap();

        assert_eq!(url.api_url().as_str(), "http://api.example.com/anymotion/v1/");
        assert_eq!(url.base_url().as_str(), "http://api.example.com/");
        assert_eq!(
            url.token_endpoint().unwrap().as_str(),
            "http://api.example.com/v1/oauth/accesstokens"
        );
        assert_eq!(
            url.resource("images/3/").unwrap().as_str(),
            "http://api.example.com/anymotion/v1/images/3/"
        );
    }

    #[test]
    fn api_url_keeps_port() {
        let url = ApiUrl::parse("http://127.0.0.1:8080/anymotion/v1/").unwrap();
        assert_eq!(url.base_url().as_str(), "http://127.0.0.1:8080/");
    }

    #[test]
    fn api_url_without_anymotion_path_is_rejected() {
        for raw in ["", "http://api.example.com/", "not a url"] {
            let err = ApiUrl::parse(raw).unwrap_err();
            assert_eq!(err.to_string(), format!("Invalid API URL: {raw}"));
        }
    }

    #[test]
    fn empty_credentials_are_rejected() {
        let err = Credentials::new("", "").unwrap_err();
        assert_eq!(err.to_string(), "Invalid Client ID: ");

        let err = Credentials::new("client_id", "").unwrap_err();
        assert_eq!(err.to_string(), "Invalid Client Secret: ");
    }

    #[test]
    fn credentials_debug_hides_secret() {
        let creds = Credentials::new("id", "very-secret").unwrap();
        let printed = format!("{creds:?}");
        assert!(printed.contains("id"));
        assert!(!printed.contains("very-secret"));
    }
}
