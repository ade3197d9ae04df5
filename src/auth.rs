//! Client-credentials access tokens, cached until shortly before they expire.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use serde_json::{json, Value};
use tokio::sync::Mutex;
use tracing::info;
use url::Url;

use crate::config::Credentials;
use crate::errors::{AnyMotionError, Result};
use crate::session::{ApiSession, RequestOptions};

/// How long before the real expiry a token is already treated as stale.
pub const DEFAULT_EXPIRY_BUFFER: Duration = Duration::from_secs(300);

/// A bearer token and the moment it stops being valid.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub value: String,
    pub expires_at: DateTime<Utc>,
}

impl Token {
    /// Whether `now` is already inside the `buffer` before expiry.
    pub fn is_expired_at(&self, now: DateTime<Utc>, buffer: Duration) -> bool {
        let buffer = TimeDelta::from_std(buffer).unwrap_or(TimeDelta::zero());
        self.expires_at - buffer < now
    }

    /// Build a token from the `{accessToken, issuedAt, expiresIn}` payload of
    /// the token endpoint. `issuedAt` is in milliseconds, `expiresIn` in
    /// seconds; both may be numeric strings or plain numbers.
    pub fn from_response(body: &Value) -> Result<Self> {
        let value = body
            .get("accessToken")
            .and_then(Value::as_str)
            .filter(|token| !token.is_empty())
            .ok_or_else(|| AnyMotionError::response_format("token response has no `accessToken`"))?;
        let issued_at_ms = numeric_field(body, "issuedAt")?;
        let expires_in = numeric_field(body, "expiresIn")?;

        let issued_at = DateTime::from_timestamp_millis(issued_at_ms).ok_or_else(|| {
            AnyMotionError::response_format(format!("`issuedAt` is out of range: {issued_at_ms}"))
        })?;
        let expires_at = TimeDelta::try_seconds(expires_in)
            .and_then(|lifetime| issued_at.checked_add_signed(lifetime))
            .ok_or_else(|| {
                AnyMotionError::response_format(format!("`expiresIn` is out of range: {expires_in}"))
            })?;

        Ok(Self {
            value: value.to_string(),
            expires_at,
        })
    }
}

fn numeric_field(body: &Value, key: &str) -> Result<i64> {
    let parsed = match body.get(key) {
        Some(Value::String(s)) => s.trim().parse::<i64>().ok(),
        Some(Value::Number(n)) => n.as_i64(),
        None | Some(Value::Null) => {
            return Err(AnyMotionError::response_format(format!(
                "token response has no `{key}`"
            )))
        }
        Some(_) => None,
    };
    parsed.ok_or_else(|| AnyMotionError::response_format(format!("`{key}` is not numeric")))
}

/// Fetches and caches the access token for one set of credentials.
///
/// The cache is held under an async mutex across check-then-fetch, so
/// concurrent callers never fetch twice.
pub struct TokenProvider {
    credentials: Credentials,
    endpoint: Url,
    session: Arc<ApiSession>,
    buffer: Duration,
    cached: Mutex<Option<Token>>,
}

impl TokenProvider {
    pub fn new(credentials: Credentials, endpoint: Url, session: Arc<ApiSession>) -> Self {
        Self {
            credentials,
            endpoint,
            session,
            buffer: DEFAULT_EXPIRY_BUFFER,
            cached: Mutex::new(None),
        }
    }

    /// Treat tokens as expired this long before their real expiry (defaults to 5 minutes).
    pub fn with_expiry_buffer(mut self, buffer: Duration) -> Self {
        self.buffer = buffer;
        self
    }

    /// A valid access token, fetching a new one when none is cached or the
    /// cached one is about to expire.
    pub async fn get_token(&self) -> Result<String> {
        let mut cached = self.cached.lock().await;

        let refresh = match cached.as_ref() {
            None => Some("got access token"),
            Some(token) if token.is_expired_at(Utc::now(), self.buffer) => {
                Some("refreshed access token as it has expired")
            }
            Some(_) => None,
        };
        if let Some(reason) = refresh {
            *cached = Some(self.fetch().await?);
            info!("{reason}");
        }

        cached
            .as_ref()
            .map(|token| token.value.clone())
            .ok_or_else(|| AnyMotionError::Auth {
                message: "the token could not be obtained".into(),
            })
    }

    /// The currently cached token, if any.
    pub async fn cached_token(&self) -> Option<Token> {
        self.cached.lock().await.clone()
    }

    async fn fetch(&self) -> Result<Token> {
        let body = json!({
            "grantType": "client_credentials",
            "clientId": self.credentials.client_id(),
            "clientSecret": self.credentials.client_secret(),
        });

        let response = self
            .session
            .request("POST", self.endpoint.as_str(), RequestOptions::new().json(body))
            .await
            .map_err(|e| match e {
                AnyMotionError::Http { .. } | AnyMotionError::Transport { .. } => {
                    AnyMotionError::Auth {
                        message: e.to_string(),
                    }
                }
                other => other,
            })?;

        Token::from_response(response.json()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expiry_is_issued_at_plus_lifetime() {
        let token = Token::from_response(&json!({
            "accessToken": "abc",
            "issuedAt": "1600000000000",
            "expiresIn": "3600",
        }))
        .unwrap();

        assert_eq!(token.value, "abc");
        assert_eq!(token.expires_at.timestamp(), 1_600_000_000 + 3600);
    }

    #[test]
    fn numeric_json_values_are_accepted() {
        let token = Token::from_response(&json!({
            "accessToken": "abc",
            "issuedAt": 1600000000000_i64,
            "expiresIn": 60,
        }))
        .unwrap();
        assert_eq!(token.expires_at.timestamp(), 1_600_000_060);
    }

    #[test]
    fn partial_or_malformed_payloads_are_rejected() {
        let cases = [
            json!({"issuedAt": "1600000000000", "expiresIn": "3600"}),
            json!({"accessToken": "abc", "expiresIn": "3600"}),
            json!({"accessToken": "abc", "issuedAt": "1600000000000"}),
            json!({"accessToken": "abc", "issuedAt": "yesterday", "expiresIn": "3600"}),
            json!({"accessToken": "abc", "issuedAt": "1600000000000", "expiresIn": "1h"}),
            json!({"accessToken": "abc", "issuedAt": true, "expiresIn": "3600"}),
        ];

        for body in cases {
            let err = Token::from_response(&body).unwrap_err();
            assert!(
                matches!(err, AnyMotionError::ResponseFormat { .. }),
                "{body} gave {err:?}"
            );
        }
    }

    #[test]
    fn expiry_honours_buffer() {
        let now = Utc::now();
        let token = Token {
            value: "abc".into(),
            expires_at: now + TimeDelta::seconds(600),
        };

        assert!(!token.is_expired_at(now, DEFAULT_EXPIRY_BUFFER));
        assert!(token.is_expired_at(now + TimeDelta::seconds(301), DEFAULT_EXPIRY_BUFFER));
    }
}
