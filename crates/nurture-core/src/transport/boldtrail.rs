//! BoldTrail CRM transport
//!
//! Authentication: API key sent as a bearer token. Messages and notes are
//! written through the activities endpoint; contact creation is supported.

use crate::error::{OutreachError, Result};
use crate::transport::{classify_status, Transport};
use crate::vault::SecretBag;
use async_trait::async_trait;
use nurture_types::{ContactFilter, LeadRecord, SendReceipt};
use reqwest::Client as HttpClient;
use serde_json::{json, Value};

pub struct BoldTrailTransport {
    api_key: String,
    base_url: String,
    http_client: HttpClient,
}

impl BoldTrailTransport {
    pub fn from_secrets(secrets: &SecretBag, base_url: &str, timeout_secs: u64) -> Result<Self> {
        let api_key = secrets
            .get("api_key")
            .and_then(Value::as_str)
            .ok_or_else(|| {
                OutreachError::Validation("BoldTrail requires 'api_key' in credentials".to_string())
            })?
            .to_string();

        let http_client = HttpClient::builder()
            .timeout(std::time::Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| OutreachError::Config(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            api_key,
            base_url: base_url.trim_end_matches('/').to_string(),
            http_client,
        })
    }

    fn bearer(&self) -> &str {
        &self.api_key
    }

    /// Write one activity (email, sms or note) against a contact
    async fn post_activity(&self, payload: Value) -> Result<String> {
        let url = format!("{}/activities", self.base_url);

        let response = self
            .http_client
            .post(&url)
            .bearer_auth(self.bearer())
            .json(&payload)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(classify_status("boldtrail", status, &body));
        }

        let data: Value = response.json().await?;
        Ok(data["id"]
            .as_str()
            .map(|s| s.to_string())
            .unwrap_or_else(|| data["id"].to_string()))
    }

    async fn get_contact(&self, contact_ref: &str) -> Result<Option<Value>> {
        let url = format!("{}/contacts/{}", self.base_url, contact_ref);

        let response = self
            .http_client
            .get(&url)
            .bearer_auth(self.bearer())
            .send()
            .await?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(classify_status("boldtrail", status, &body));
        }

        Ok(Some(response.json().await?))
    }

    fn map_contact(contact: &Value) -> LeadRecord {
        let location = contact["address"].as_object().and_then(|addr| {
            let city = addr.get("city").and_then(Value::as_str).unwrap_or("");
            let state = addr.get("state").and_then(Value::as_str).unwrap_or("");
            let joined = format!("{}, {}", city, state);
            let trimmed = joined.trim_matches(|c: char| c == ',' || c.is_whitespace());
            if trimmed.is_empty() {
                None
            } else {
                Some(trimmed.to_string())
            }
        });

        LeadRecord {
            provider_lead_id: contact["id"]
                .as_str()
                .map(|s| s.to_string())
                .unwrap_or_else(|| contact["id"].to_string()),
            first_name: contact["first_name"].as_str().map(|s| s.to_string()),
            last_name: contact["last_name"].as_str().map(|s| s.to_string()),
            email: contact["email"].as_str().map(|s| s.to_string()),
            phone: contact["phone"].as_str().map(|s| s.to_string()),
            status: contact["status"]
                .as_str()
                .or_else(|| contact["lead_status"].as_str())
                .map(|s| s.to_string()),
            tags: contact["tags"]
                .as_array()
                .map(|arr| {
                    arr.iter()
                        .filter_map(Value::as_str)
                        .map(|s| s.to_string())
                        .collect()
                })
                .unwrap_or_default(),
            location,
        }
    }
}

#[async_trait]
impl Transport for BoldTrailTransport {
    fn provider(&self) -> &'static str {
        "boldtrail"
    }

    async fn validate_connection(&self) -> Result<bool> {
        let url = format!("{}/account", self.base_url);

        let response = self
            .http_client
            .get(&url)
            .bearer_auth(self.bearer())
            .timeout(std::time::Duration::from_secs(10))
            .send()
            .await;

        match response {
            Ok(response) if response.status().is_success() => Ok(true),
            Ok(response) => {
                log::warn!(
                    "BoldTrail connection validation rejected (status {})",
                    response.status()
                );
                Ok(false)
            }
            Err(e) => {
                log::warn!("BoldTrail connection validation failed: {}", e);
                Ok(false)
            }
        }
    }

    async fn fetch_contacts(&self, filter: &ContactFilter) -> Result<Vec<LeadRecord>> {
        let url = format!("{}/contacts", self.base_url);

        let mut params = vec![
            ("limit".to_string(), filter.limit_or_default().to_string()),
            ("sort".to_string(), "-created_at".to_string()),
        ];
        if !filter.statuses.is_empty() {
            params.push(("status".to_string(), filter.statuses.join(",")));
        }
        if !filter.tags.is_empty() {
            params.push(("tags".to_string(), filter.tags.join(",")));
        }

        let response = self
            .http_client
            .get(&url)
            .bearer_auth(self.bearer())
            .query(&params)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(classify_status("boldtrail", status, &body));
        }

        let data: Value = response.json().await?;
        let contacts = data["contacts"]
            .as_array()
            .map(|arr| arr.iter().map(Self::map_contact).collect())
            .unwrap_or_default();

        Ok(contacts)
    }

    async fn send_email(
        &self,
        contact_ref: &str,
        subject: &str,
        body: &str,
    ) -> Result<SendReceipt> {
        let message_id = self
            .post_activity(json!({
                "contact_id": contact_ref,
                "subject": subject,
                "body": body,
                "type": "email"
            }))
            .await?;

        Ok(SendReceipt { message_id })
    }

    async fn send_sms(&self, contact_ref: &str, body: &str) -> Result<SendReceipt> {
        let message_id = self
            .post_activity(json!({
                "contact_id": contact_ref,
                "body": body,
                "type": "sms"
            }))
            .await?;

        Ok(SendReceipt { message_id })
    }

    async fn annotate(&self, contact_ref: &str, note: &str) -> Result<bool> {
        match self
            .post_activity(json!({
                "contact_id": contact_ref,
                "body": note,
                "type": "note"
            }))
            .await
        {
            Ok(_) => Ok(true),
            Err(OutreachError::Http(e)) => Err(OutreachError::Http(e)),
            Err(e) => {
                log::warn!("BoldTrail note creation failed: {}", e);
                Ok(false)
            }
        }
    }

    async fn update_status(&self, contact_ref: &str, status: &str) -> Result<bool> {
        let url = format!("{}/contacts/{}", self.base_url, contact_ref);

        let response = self
            .http_client
            .patch(&url)
            .bearer_auth(self.bearer())
            .json(&json!({ "status": status }))
            .send()
            .await?;

        Ok(response.status().is_success())
    }

    async fn add_tag(&self, contact_ref: &str, tag: &str) -> Result<bool> {
        // BoldTrail replaces the tag list wholesale, so merge with the
        // contact's existing tags first.
        let contact = match self.get_contact(contact_ref).await? {
            Some(contact) => contact,
            None => return Ok(false),
        };

        let mut tags: Vec<String> = Self::map_contact(&contact).tags;
        if !tags.iter().any(|t| t == tag) {
            tags.push(tag.to_string());
        }

        let url = format!("{}/contacts/{}", self.base_url, contact_ref);
        let response = self
            .http_client
            .patch(&url)
            .bearer_auth(self.bearer())
            .json(&json!({ "tags": tags }))
            .send()
            .await?;

        Ok(response.status().is_success())
    }

    async fn create_contact(&self, fields: &LeadRecord) -> Result<Option<String>> {
        let url = format!("{}/contacts", self.base_url);

        let payload = json!({
            "first_name": fields.first_name,
            "last_name": fields.last_name,
            "email": fields.email,
            "phone": fields.phone,
            "tags": fields.tags,
            "status": fields.status.as_deref().unwrap_or("New"),
            "source": "Nurture Engine"
        });

        let response = self
            .http_client
            .post(&url)
            .bearer_auth(self.bearer())
            .json(&payload)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(classify_status("boldtrail", status, &body));
        }

        let data: Value = response.json().await?;
        Ok(data["id"].as_str().map(|s| s.to_string()))
    }
}
