//! Follow Up Boss CRM transport
//!
//! Authentication: HTTP Basic with the API key as username and an empty
//! password. Leads are "people" in the FUB API; emails and texts are logged
//! through the events endpoint. FUB has no contact-creation API surface, so
//! `create_contact` reports `NotSupported` via the trait default.

use crate::error::{OutreachError, Result};
use crate::transport::{classify_status, Transport};
use crate::vault::SecretBag;
use async_trait::async_trait;
use nurture_types::{ContactFilter, LeadRecord, SendReceipt};
use reqwest::Client as HttpClient;
use serde_json::{json, Value};

pub struct FollowUpBossTransport {
    api_key: String,
    base_url: String,
    http_client: HttpClient,
}

impl FollowUpBossTransport {
    pub fn from_secrets(secrets: &SecretBag, base_url: &str, timeout_secs: u64) -> Result<Self> {
        let api_key = secrets
            .get("api_key")
            .and_then(Value::as_str)
            .ok_or_else(|| {
                OutreachError::Validation(
                    "Follow Up Boss requires 'api_key' in credentials".to_string(),
                )
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

    fn request(&self, method: reqwest::Method, url: &str) -> reqwest::RequestBuilder {
        // API key as username, empty password
        self.http_client
            .request(method, url)
            .basic_auth(&self.api_key, Some(""))
    }

    async fn post_event(&self, payload: Value) -> Result<String> {
        let url = format!("{}/events", self.base_url);

        let response = self
            .request(reqwest::Method::POST, &url)
            .json(&payload)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(classify_status("followupboss", status, &body));
        }

        let data: Value = response.json().await?;
        Ok(data["id"]
            .as_str()
            .map(|s| s.to_string())
            .unwrap_or_else(|| data["id"].to_string()))
    }

    fn map_person(person: &Value) -> LeadRecord {
        let email = person["emails"]
            .as_array()
            .and_then(|arr| arr.first())
            .and_then(|entry| entry.as_str().or_else(|| entry["value"].as_str()))
            .map(|s| s.to_string());

        let phone = person["phones"]
            .as_array()
            .and_then(|arr| arr.first())
            .and_then(|entry| entry["value"].as_str())
            .map(|s| s.to_string());

        let location = person["addresses"]
            .as_array()
            .and_then(|arr| arr.first())
            .and_then(|addr| {
                let city = addr["city"].as_str().unwrap_or("");
                let state = addr["state"].as_str().unwrap_or("");
                let joined = format!("{}, {}", city, state);
                let trimmed = joined.trim_matches(|c: char| c == ',' || c.is_whitespace());
                if trimmed.is_empty() {
                    None
                } else {
                    Some(trimmed.to_string())
                }
            });

        LeadRecord {
            provider_lead_id: person["id"]
                .as_str()
                .map(|s| s.to_string())
                .unwrap_or_else(|| person["id"].to_string()),
            first_name: person["firstName"].as_str().map(|s| s.to_string()),
            last_name: person["lastName"].as_str().map(|s| s.to_string()),
            email,
            phone,
            // FUB calls the pipeline status a "stage"
            status: person["stage"].as_str().map(|s| s.to_string()),
            tags: person["tags"]
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

    async fn update_person(&self, contact_ref: &str, payload: Value) -> Result<bool> {
        let url = format!("{}/people/{}", self.base_url, contact_ref);

        let response = self
            .request(reqwest::Method::PUT, &url)
            .json(&payload)
            .send()
            .await?;

        Ok(response.status().is_success())
    }

    async fn get_person(&self, contact_ref: &str) -> Result<Option<Value>> {
        let url = format!("{}/people/{}", self.base_url, contact_ref);

        let response = self.request(reqwest::Method::GET, &url).send().await?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(classify_status("followupboss", status, &body));
        }

        Ok(Some(response.json().await?))
    }
}

#[async_trait]
impl Transport for FollowUpBossTransport {
    fn provider(&self) -> &'static str {
        "followupboss"
    }

    async fn validate_connection(&self) -> Result<bool> {
        let url = format!("{}/users", self.base_url);

        let response = self
            .request(reqwest::Method::GET, &url)
            .timeout(std::time::Duration::from_secs(10))
            .send()
            .await;

        match response {
            Ok(response) if response.status().is_success() => Ok(true),
            Ok(response) => {
                log::warn!(
                    "Follow Up Boss connection validation rejected (status {})",
                    response.status()
                );
                Ok(false)
            }
            Err(e) => {
                log::warn!("Follow Up Boss connection validation failed: {}", e);
                Ok(false)
            }
        }
    }

    async fn fetch_contacts(&self, filter: &ContactFilter) -> Result<Vec<LeadRecord>> {
        let url = format!("{}/people", self.base_url);

        let mut params = vec![
            ("limit".to_string(), filter.limit_or_default().to_string()),
            ("sort".to_string(), "-created".to_string()),
        ];
        if !filter.tags.is_empty() {
            params.push(("tags".to_string(), filter.tags.join(",")));
        }

        let response = self
            .request(reqwest::Method::GET, &url)
            .query(&params)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(classify_status("followupboss", status, &body));
        }

        let data: Value = response.json().await?;
        let mut leads: Vec<LeadRecord> = data["people"]
            .as_array()
            .map(|arr| arr.iter().map(Self::map_person).collect())
            .unwrap_or_default();

        // FUB cannot filter stage server-side; apply the status filter here
        if !filter.statuses.is_empty() {
            let wanted: Vec<String> = filter.statuses.iter().map(|s| s.to_lowercase()).collect();
            leads.retain(|lead| {
                lead.status
                    .as_ref()
                    .map(|s| wanted.contains(&s.to_lowercase()))
                    .unwrap_or(false)
            });
        }

        Ok(leads)
    }

    async fn send_email(
        &self,
        contact_ref: &str,
        subject: &str,
        body: &str,
    ) -> Result<SendReceipt> {
        let message_id = self
            .post_event(json!({
                "personId": contact_ref,
                "subject": subject,
                "body": body,
                "type": "Email"
            }))
            .await?;

        Ok(SendReceipt { message_id })
    }

    async fn send_sms(&self, contact_ref: &str, body: &str) -> Result<SendReceipt> {
        let message_id = self
            .post_event(json!({
                "personId": contact_ref,
                "body": body,
                "type": "Text"
            }))
            .await?;

        Ok(SendReceipt { message_id })
    }

    async fn annotate(&self, contact_ref: &str, note: &str) -> Result<bool> {
        match self
            .post_event(json!({
                "personId": contact_ref,
                "body": note,
                "type": "Note"
            }))
            .await
        {
            Ok(_) => Ok(true),
            Err(OutreachError::Http(e)) => Err(OutreachError::Http(e)),
            Err(e) => {
                log::warn!("Follow Up Boss note creation failed: {}", e);
                Ok(false)
            }
        }
    }

    async fn update_status(&self, contact_ref: &str, status: &str) -> Result<bool> {
        self.update_person(contact_ref, json!({ "stage": status }))
            .await
    }

    async fn add_tag(&self, contact_ref: &str, tag: &str) -> Result<bool> {
        let person = match self.get_person(contact_ref).await? {
            Some(person) => person,
            None => return Ok(false),
        };

        let mut tags = Self::map_person(&person).tags;
        if !tags.iter().any(|t| t == tag) {
            tags.push(tag.to_string());
        }

        self.update_person(contact_ref, json!({ "tags": tags }))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nurture_types::{Lead, LeadId, UserId};
    use serde_json::json;

    #[test]
    fn test_requires_api_key() {
        let bag = SecretBag::new();
        let err =
            FollowUpBossTransport::from_secrets(&bag, "https://api.example.com", 30).unwrap_err();
        assert!(matches!(err, OutreachError::Validation(_)));
    }

    #[test]
    fn test_map_person_extracts_first_entries() {
        let person = json!({
            "id": 9001,
            "firstName": "Leo",
            "lastName": "Park",
            "emails": [{"value": "leo@example.com"}],
            "phones": [{"value": "+15125550100"}],
            "stage": "Lead",
            "tags": ["FSBO"],
            "addresses": [{"city": "Austin", "state": "TX"}]
        });

        let record = FollowUpBossTransport::map_person(&person);
        assert_eq!(record.provider_lead_id, "9001");
        assert_eq!(record.email.as_deref(), Some("leo@example.com"));
        assert_eq!(record.phone.as_deref(), Some("+15125550100"));
        assert_eq!(record.status.as_deref(), Some("Lead"));
        assert_eq!(record.location.as_deref(), Some("Austin, TX"));
    }

    #[test]
    fn test_map_person_plain_string_email() {
        let person = json!({
            "id": "p-3",
            "emails": ["plain@example.com"]
        });

        let record = FollowUpBossTransport::map_person(&person);
        assert_eq!(record.email.as_deref(), Some("plain@example.com"));
    }

    #[tokio::test]
    async fn test_create_contact_not_supported() {
        let mut bag = SecretBag::new();
        bag.insert("api_key".to_string(), json!("fub-key"));
        let transport =
            FollowUpBossTransport::from_secrets(&bag, "https://api.example.com", 30).unwrap();

        let record = LeadRecord {
            provider_lead_id: String::new(),
            first_name: Some("New".to_string()),
            last_name: None,
            email: None,
            phone: None,
            status: None,
            tags: vec![],
            location: None,
        };

        let err = transport.create_contact(&record).await.unwrap_err();
        assert!(matches!(err, OutreachError::NotSupported(_)));
    }

    #[test]
    fn test_contact_ref_uses_crm_lead_id() {
        let mut bag = SecretBag::new();
        bag.insert("api_key".to_string(), json!("fub-key"));
        let transport =
            FollowUpBossTransport::from_secrets(&bag, "https://api.example.com", 30).unwrap();

        let lead = Lead {
            id: LeadId::new(4),
            user_id: UserId::new(1),
            crm_lead_id: Some("p-88".to_string()),
            first_name: None,
            last_name: None,
            email: Some("x@example.com".to_string()),
            phone: None,
            location: None,
            address: None,
            status: None,
            tags: vec![],
        };

        assert_eq!(transport.contact_ref(&lead).unwrap(), "p-88");

        let unsynced = Lead {
            crm_lead_id: None,
            ..lead
        };
        assert!(transport.contact_ref(&unsynced).is_err());
    }
}
