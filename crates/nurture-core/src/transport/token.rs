//! OAuth token lifecycle management
//!
//! Tracks expiry of stored access tokens and refreshes them through the
//! provider's token endpoint before use, persisting renewed tokens through an
//! injected sink. Refresh failure is an authentication error: the connection
//! is effectively unconnected until the user re-authorizes.

use crate::error::{OutreachError, Result};
use crate::vault::SecretBag;
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use reqwest::Client as HttpClient;
use serde_json::{json, Value};
use std::sync::Arc;
use std::sync::Mutex;

/// A stored OAuth credential as kept inside the encrypted secret bag
#[derive(Debug, Clone, PartialEq)]
pub struct OAuthToken {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub token_uri: String,
    pub scopes: Vec<String>,
    pub expiry: Option<DateTime<Utc>>,
}

impl OAuthToken {
    /// Parse a token from a decrypted secret bag
    pub fn from_secret_bag(bag: &SecretBag) -> Result<Self> {
        let access_token = bag
            .get("access_token")
            .and_then(Value::as_str)
            .ok_or_else(|| OutreachError::Auth("no access_token in credential".to_string()))?
            .to_string();

        let refresh_token = bag
            .get("refresh_token")
            .and_then(Value::as_str)
            .map(|s| s.to_string());

        let token_uri = bag
            .get("token_uri")
            .and_then(Value::as_str)
            .unwrap_or("https://oauth2.googleapis.com/token")
            .to_string();

        let scopes = bag
            .get("scopes")
            .and_then(Value::as_array)
            .map(|arr| {
                arr.iter()
                    .filter_map(Value::as_str)
                    .map(|s| s.to_string())
                    .collect()
            })
            .unwrap_or_default();

        let expiry = bag
            .get("expiry")
            .and_then(Value::as_str)
            .map(|s| {
                DateTime::parse_from_rfc3339(s)
                    .map(|dt| dt.with_timezone(&Utc))
                    .map_err(|e| OutreachError::Auth(format!("invalid token expiry format: {}", e)))
            })
            .transpose()?;

        Ok(Self {
            access_token,
            refresh_token,
            token_uri,
            scopes,
            expiry,
        })
    }

    /// Serialize back into the secret-bag shape used at rest
    pub fn to_secret_bag(&self) -> SecretBag {
        let mut bag = SecretBag::new();
        bag.insert("access_token".to_string(), json!(self.access_token));
        if let Some(ref refresh) = self.refresh_token {
            bag.insert("refresh_token".to_string(), json!(refresh));
        }
        bag.insert("token_uri".to_string(), json!(self.token_uri));
        bag.insert("scopes".to_string(), json!(self.scopes));
        if let Some(expiry) = self.expiry {
            bag.insert("expiry".to_string(), json!(expiry.to_rfc3339()));
        }
        bag
    }

    /// Whether the token is expired (or expires within the buffer window)
    pub fn is_expired(&self, now: DateTime<Utc>, buffer: Duration) -> bool {
        match self.expiry {
            Some(expiry) => now >= expiry - buffer,
            // No recorded expiry: assume valid and let the provider answer
            None => false,
        }
    }
}

/// Exchanges a refresh token for a new access token.
/// Tests inject a fake; production uses [`HttpTokenRefresher`].
#[async_trait]
pub trait TokenRefresher: Send + Sync {
    async fn refresh(&self, token: &OAuthToken) -> Result<OAuthToken>;
}

/// Persists a renewed token so the refreshed credential survives the process
#[async_trait]
pub trait TokenSink: Send + Sync {
    async fn persist(&self, token: &OAuthToken) -> Result<()>;
}

/// Live refresher speaking the OAuth2 refresh-token grant
pub struct HttpTokenRefresher {
    client_id: String,
    client_secret: String,
    http_client: HttpClient,
}

impl HttpTokenRefresher {
    pub fn new(client_id: String, client_secret: String) -> Self {
        let http_client = HttpClient::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .expect("Failed to create HTTP client");

        Self {
            client_id,
            client_secret,
            http_client,
        }
    }
}

#[async_trait]
impl TokenRefresher for HttpTokenRefresher {
    async fn refresh(&self, token: &OAuthToken) -> Result<OAuthToken> {
        let refresh_token = token
            .refresh_token
            .as_deref()
            .ok_or_else(|| OutreachError::Auth("no refresh token stored".to_string()))?;

        let params = [
            ("client_id", self.client_id.as_str()),
            ("client_secret", self.client_secret.as_str()),
            ("refresh_token", refresh_token),
            ("grant_type", "refresh_token"),
        ];

        // Both network failures and provider rejections mean the stored
        // credential can no longer be used without re-authorization.
        let response = self
            .http_client
            .post(&token.token_uri)
            .form(&params)
            .send()
            .await
            .map_err(|e| OutreachError::Auth(format!("token refresh request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(OutreachError::Auth(format!(
                "token endpoint rejected refresh (status {}): {}",
                status, body
            )));
        }

        let data: Value = response
            .json()
            .await
            .map_err(|e| OutreachError::Auth(format!("invalid token endpoint response: {}", e)))?;

        let access_token = data["access_token"]
            .as_str()
            .ok_or_else(|| {
                OutreachError::Auth("no access_token in token endpoint response".to_string())
            })?
            .to_string();

        let expiry = data["expires_in"]
            .as_i64()
            .map(|secs| Utc::now() + Duration::seconds(secs));

        Ok(OAuthToken {
            access_token,
            // Providers may omit the refresh token; the manager retains the
            // previous one in that case.
            refresh_token: data["refresh_token"].as_str().map(|s| s.to_string()),
            token_uri: token.token_uri.clone(),
            scopes: token.scopes.clone(),
            expiry,
        })
    }
}

/// Guards an OAuth credential: hands out access tokens, refreshing through
/// the token endpoint when the stored one expires within the buffer window
pub struct TokenManager {
    state: tokio::sync::Mutex<OAuthToken>,
    refresher: Arc<dyn TokenRefresher>,
    sink: Arc<dyn TokenSink>,
    expiry_buffer: Duration,
    /// Diagnostic marker only, never behavioral
    last_used_at: Mutex<Option<DateTime<Utc>>>,
}

impl TokenManager {
    pub fn new(
        token: OAuthToken,
        refresher: Arc<dyn TokenRefresher>,
        sink: Arc<dyn TokenSink>,
    ) -> Self {
        Self::with_expiry_buffer(token, refresher, sink, 60)
    }

    /// Create a manager with a custom expiry buffer (mainly for testing)
    pub fn with_expiry_buffer(
        token: OAuthToken,
        refresher: Arc<dyn TokenRefresher>,
        sink: Arc<dyn TokenSink>,
        expiry_buffer_seconds: i64,
    ) -> Self {
        Self {
            state: tokio::sync::Mutex::new(token),
            refresher,
            sink,
            expiry_buffer: Duration::seconds(expiry_buffer_seconds),
            last_used_at: Mutex::new(None),
        }
    }

    /// Return a usable access token, refreshing and persisting first if the
    /// stored one is expired. Refresh failure surfaces as `Auth`: the caller
    /// needs the user to re-authorize, retrying will not help.
    pub async fn ensure_fresh(&self) -> Result<String> {
        let mut state = self.state.lock().await;

        if state.is_expired(Utc::now(), self.expiry_buffer) {
            if state.refresh_token.is_none() {
                return Err(OutreachError::Auth(
                    "access token expired and no refresh token stored; re-authorization required"
                        .to_string(),
                ));
            }

            log::info!(
                "access token expired (expiry {:?}), refreshing via {}",
                state.expiry,
                state.token_uri
            );

            let refreshed = self.refresher.refresh(&state).await.map_err(|e| {
                OutreachError::Auth(format!(
                    "token refresh failed, re-authorization required: {}",
                    e
                ))
            })?;

            let mut merged = refreshed;
            if merged.refresh_token.is_none() {
                merged.refresh_token = state.refresh_token.clone();
            }

            self.sink.persist(&merged).await?;
            log::info!("persisted refreshed token (new expiry {:?})", merged.expiry);
            *state = merged;
        }

        Ok(state.access_token.clone())
    }

    /// Record that the token was successfully used
    pub fn mark_used(&self) {
        *self.last_used_at.lock().unwrap() = Some(Utc::now());
    }

    pub fn last_used_at(&self) -> Option<DateTime<Utc>> {
        *self.last_used_at.lock().unwrap()
    }
}
