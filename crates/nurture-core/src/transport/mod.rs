//! Outbound transports for CRM providers and Gmail

pub mod boldtrail;
pub mod followupboss;
pub mod gmail;
pub mod registry;
pub mod token;

use crate::error::{OutreachError, Result};
use async_trait::async_trait;
use nurture_types::{ContactFilter, Lead, LeadRecord, SendReceipt};

// Re-export all transport types
pub use boldtrail::BoldTrailTransport;
pub use followupboss::FollowUpBossTransport;
pub use gmail::GmailTransport;
pub use registry::{CredentialWriter, TransportRegistry, TransportResolver, SUPPORTED_PROVIDERS};
pub use token::{HttpTokenRefresher, OAuthToken, TokenManager, TokenRefresher, TokenSink};

/// Uniform capability set every outbound provider implements.
///
/// Instances are constructed from a decrypted secret bag by the registry;
/// no other component branches on provider identity.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Stable provider identifier, e.g. "boldtrail"
    fn provider(&self) -> &'static str;

    /// Perform a live, minimal read against the provider to confirm the
    /// credential actually works. Fails closed: any error or non-2xx answer
    /// means the credential is rejected, regardless of how plausible it looks.
    async fn validate_connection(&self) -> Result<bool>;

    /// Fetch contacts filtered by status/tag, bounded by the filter's limit
    async fn fetch_contacts(&self, filter: &ContactFilter) -> Result<Vec<LeadRecord>>;

    /// Send an email; returns the provider message id on success
    async fn send_email(&self, contact_ref: &str, subject: &str, body: &str)
        -> Result<SendReceipt>;

    /// Send an SMS; returns the provider message id on success
    async fn send_sms(&self, contact_ref: &str, body: &str) -> Result<SendReceipt>;

    /// Write an audit note/activity against the contact
    async fn annotate(&self, contact_ref: &str, note: &str) -> Result<bool>;

    /// Update the contact's pipeline status
    async fn update_status(&self, contact_ref: &str, status: &str) -> Result<bool>;

    /// Add a tag to the contact
    async fn add_tag(&self, contact_ref: &str, tag: &str) -> Result<bool>;

    /// Create a new contact. Optional capability: providers without API
    /// support report `NotSupported` rather than silently doing nothing.
    async fn create_contact(&self, _fields: &LeadRecord) -> Result<Option<String>> {
        Err(OutreachError::NotSupported(format!(
            "{} does not support contact creation via API",
            self.provider()
        )))
    }

    /// The transport-specific identifier used to address this lead
    fn contact_ref(&self, lead: &Lead) -> Result<String> {
        lead.crm_lead_id.clone().ok_or_else(|| {
            OutreachError::Validation(format!("lead {} has no CRM lead id", lead.id))
        })
    }
}

/// Map a non-success HTTP status into the error taxonomy: 401/403 are
/// credential failures, other 4xx are permanent provider rejections, and
/// everything else is a retryable transport failure.
pub(crate) fn classify_status(
    provider: &str,
    status: reqwest::StatusCode,
    body: &str,
) -> OutreachError {
    match status.as_u16() {
        401 | 403 => OutreachError::Auth(format!("{} rejected the credential: {}", provider, body)),
        code if (400..500).contains(&code) => OutreachError::Provider {
            status: code,
            message: format!("{}: {}", provider, body),
        },
        code => OutreachError::Transport(format!("{} returned status {}: {}", provider, code, body)),
    }
}
