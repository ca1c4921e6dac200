//! Gmail transport
//!
//! Sends mail through the Gmail REST API on behalf of the connected user.
//! Access tokens are obtained through the token lifecycle manager, which
//! refreshes and persists them before use. Gmail is a mail transport only:
//! contact operations report `NotSupported`.

use crate::error::{OutreachError, Result};
use crate::transport::token::{OAuthToken, TokenManager, TokenRefresher, TokenSink};
use crate::transport::{classify_status, Transport};
use async_trait::async_trait;
use base64::{engine::general_purpose::URL_SAFE, Engine as _};
use nurture_types::{ContactFilter, Lead, LeadRecord, SendReceipt};
use reqwest::Client as HttpClient;
use serde_json::{json, Value};
use std::sync::Arc;

pub struct GmailTransport {
    tokens: TokenManager,
    base_url: String,
    http_client: HttpClient,
}

impl GmailTransport {
    pub fn new(
        token: OAuthToken,
        refresher: Arc<dyn TokenRefresher>,
        sink: Arc<dyn TokenSink>,
        base_url: &str,
        timeout_secs: u64,
        expiry_buffer_secs: i64,
    ) -> Result<Self> {
        let http_client = HttpClient::builder()
            .timeout(std::time::Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| OutreachError::Config(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            tokens: TokenManager::with_expiry_buffer(token, refresher, sink, expiry_buffer_secs),
            base_url: base_url.trim_end_matches('/').to_string(),
            http_client,
        })
    }

    /// Build the RFC 2822 message and encode it the way the Gmail API wants
    /// it: base64url over the raw bytes.
    fn encode_raw_message(to: &str, subject: &str, body: &str) -> String {
        let message = format!(
            "To: {}\r\nSubject: {}\r\nMIME-Version: 1.0\r\nContent-Type: text/plain; charset=\"UTF-8\"\r\n\r\n{}",
            to, subject, body
        );
        URL_SAFE.encode(message.as_bytes())
    }

    fn not_supported(&self, capability: &str) -> OutreachError {
        OutreachError::NotSupported(format!("gmail does not support {}", capability))
    }
}

#[async_trait]
impl Transport for GmailTransport {
    fn provider(&self) -> &'static str {
        "gmail"
    }

    async fn validate_connection(&self) -> Result<bool> {
        // Live profile read; an expired credential that cannot be refreshed
        // is rejected here rather than accepted on shape alone.
        let access_token = match self.tokens.ensure_fresh().await {
            Ok(token) => token,
            Err(e) => {
                log::warn!("Gmail connection validation failed to obtain token: {}", e);
                return Ok(false);
            }
        };

        let url = format!("{}/users/me/profile", self.base_url);
        let response = self
            .http_client
            .get(&url)
            .bearer_auth(&access_token)
            .timeout(std::time::Duration::from_secs(10))
            .send()
            .await;

        match response {
            Ok(response) if response.status().is_success() => {
                self.tokens.mark_used();
                Ok(true)
            }
            Ok(response) => {
                log::warn!(
                    "Gmail connection validation rejected (status {})",
                    response.status()
                );
                Ok(false)
            }
            Err(e) => {
                log::warn!("Gmail connection validation failed: {}", e);
                Ok(false)
            }
        }
    }

    async fn fetch_contacts(&self, _filter: &ContactFilter) -> Result<Vec<LeadRecord>> {
        Err(self.not_supported("contact fetching"))
    }

    async fn send_email(
        &self,
        contact_ref: &str,
        subject: &str,
        body: &str,
    ) -> Result<SendReceipt> {
        let access_token = self.tokens.ensure_fresh().await?;

        let url = format!("{}/users/me/messages/send", self.base_url);
        let payload = json!({
            "raw": Self::encode_raw_message(contact_ref, subject, body)
        });

        let response = self
            .http_client
            .post(&url)
            .bearer_auth(&access_token)
            .json(&payload)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(classify_status("gmail", status, &body));
        }

        self.tokens.mark_used();

        let data: Value = response.json().await?;
        Ok(SendReceipt {
            message_id: data["id"].as_str().unwrap_or_default().to_string(),
        })
    }

    async fn send_sms(&self, _contact_ref: &str, _body: &str) -> Result<SendReceipt> {
        Err(self.not_supported("SMS delivery"))
    }

    async fn annotate(&self, _contact_ref: &str, _note: &str) -> Result<bool> {
        Err(self.not_supported("contact notes"))
    }

    async fn update_status(&self, _contact_ref: &str, _status: &str) -> Result<bool> {
        Err(self.not_supported("contact status updates"))
    }

    async fn add_tag(&self, _contact_ref: &str, _tag: &str) -> Result<bool> {
        Err(self.not_supported("contact tags"))
    }

    /// Gmail addresses leads by email, not CRM id
    fn contact_ref(&self, lead: &Lead) -> Result<String> {
        lead.email.clone().ok_or_else(|| {
            OutreachError::Validation(format!("lead {} has no email address", lead.id))
        })
    }
}
