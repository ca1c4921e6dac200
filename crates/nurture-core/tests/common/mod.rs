//! Shared test harness: fake transport, fixed resolver, seeded stores

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use nurture_core::config::SendConfig;
use nurture_core::credentials::CredentialService;
use nurture_core::error::{OutreachError, Result};
use nurture_core::store::InMemoryStore;
use nurture_core::transport::registry::{CredentialWriter, TransportResolver};
use nurture_core::transport::Transport;
use nurture_core::vault::{CredentialVault, SecretBag};
use nurture_core::SendOrchestrator;
use nurture_types::{
    Campaign, CampaignId, CampaignMedium, CampaignStatus, CampaignStep, ContactFilter, Lead,
    LeadId, LeadRecord, SendReceipt, StepId, StepKind, UserId,
};
use serde_json::json;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// Scripted failure behavior per contact reference
#[derive(Debug, Clone)]
pub enum FailMode {
    AuthAlways,
    ProviderAlways,
    /// Fail the first N attempts with a transient transport error
    TransportTimes(u32),
}

#[derive(Debug, Clone)]
pub struct SentMessage {
    pub contact_ref: String,
    pub subject: String,
    pub body: String,
}

pub struct FakeTransport {
    validate_ok: bool,
    failures: Mutex<HashMap<String, FailMode>>,
    pub attempts: Mutex<HashMap<String, u32>>,
    pub sent: Mutex<Vec<SentMessage>>,
    pub notes: Mutex<Vec<(String, String)>>,
}

impl FakeTransport {
    pub fn new() -> Self {
        Self {
            validate_ok: true,
            failures: Mutex::new(HashMap::new()),
            attempts: Mutex::new(HashMap::new()),
            sent: Mutex::new(Vec::new()),
            notes: Mutex::new(Vec::new()),
        }
    }

    pub fn rejecting_validation() -> Self {
        Self {
            validate_ok: false,
            ..Self::new()
        }
    }

    pub fn fail_for(&self, contact_ref: &str, mode: FailMode) {
        self.failures
            .lock()
            .unwrap()
            .insert(contact_ref.to_string(), mode);
    }

    pub fn attempts_for(&self, contact_ref: &str) -> u32 {
        self.attempts
            .lock()
            .unwrap()
            .get(contact_ref)
            .copied()
            .unwrap_or(0)
    }

    pub fn sent_messages(&self) -> Vec<SentMessage> {
        self.sent.lock().unwrap().clone()
    }

    fn deliver(&self, contact_ref: &str, subject: &str, body: &str) -> Result<SendReceipt> {
        let attempt = {
            let mut attempts = self.attempts.lock().unwrap();
            let counter = attempts.entry(contact_ref.to_string()).or_insert(0);
            *counter += 1;
            *counter
        };

        match self.failures.lock().unwrap().get(contact_ref) {
            Some(FailMode::AuthAlways) => {
                return Err(OutreachError::Auth("credential rejected".to_string()))
            }
            Some(FailMode::ProviderAlways) => {
                return Err(OutreachError::Provider {
                    status: 422,
                    message: "invalid recipient".to_string(),
                })
            }
            Some(FailMode::TransportTimes(n)) if attempt <= *n => {
                return Err(OutreachError::Transport("connection reset".to_string()))
            }
            _ => {}
        }

        self.sent.lock().unwrap().push(SentMessage {
            contact_ref: contact_ref.to_string(),
            subject: subject.to_string(),
            body: body.to_string(),
        });

        Ok(SendReceipt {
            message_id: format!("msg-{}-{}", contact_ref, attempt),
        })
    }
}

#[async_trait]
impl Transport for FakeTransport {
    fn provider(&self) -> &'static str {
        "fake-crm"
    }

    async fn validate_connection(&self) -> Result<bool> {
        Ok(self.validate_ok)
    }

    async fn fetch_contacts(&self, _filter: &ContactFilter) -> Result<Vec<LeadRecord>> {
        Ok(Vec::new())
    }

    async fn send_email(
        &self,
        contact_ref: &str,
        subject: &str,
        body: &str,
    ) -> Result<SendReceipt> {
        self.deliver(contact_ref, subject, body)
    }

    async fn send_sms(&self, contact_ref: &str, body: &str) -> Result<SendReceipt> {
        self.deliver(contact_ref, "", body)
    }

    async fn annotate(&self, contact_ref: &str, note: &str) -> Result<bool> {
        self.notes
            .lock()
            .unwrap()
            .push((contact_ref.to_string(), note.to_string()));
        Ok(true)
    }

    async fn update_status(&self, _contact_ref: &str, _status: &str) -> Result<bool> {
        Ok(true)
    }

    async fn add_tag(&self, _contact_ref: &str, _tag: &str) -> Result<bool> {
        Ok(true)
    }
}

/// Resolver that hands back one fixed transport regardless of provider
pub struct FixedResolver {
    pub transport: Arc<FakeTransport>,
}

impl TransportResolver for FixedResolver {
    fn resolve(
        &self,
        _user_id: UserId,
        _provider: &str,
        _secrets: SecretBag,
    ) -> Result<Arc<dyn Transport>> {
        Ok(self.transport.clone())
    }
}

pub struct TestHarness {
    pub store: Arc<InMemoryStore>,
    pub credentials: Arc<CredentialService>,
    pub transport: Arc<FakeTransport>,
    pub orchestrator: SendOrchestrator,
}

pub const OWNER: UserId = UserId::new(1);

pub fn harness() -> TestHarness {
    harness_with_transport(Arc::new(FakeTransport::new()))
}

pub fn harness_with_transport(transport: Arc<FakeTransport>) -> TestHarness {
    let store = Arc::new(InMemoryStore::new());
    let vault = CredentialVault::new(&[9u8; 32]).unwrap();
    let credentials = Arc::new(CredentialService::new(vault, store.clone()));
    let resolver = Arc::new(FixedResolver {
        transport: transport.clone(),
    });

    let send = SendConfig {
        backoff_ms: 1,
        ..SendConfig::default()
    };

    let orchestrator = SendOrchestrator::new(
        store.clone(),
        store.clone(),
        credentials.clone(),
        resolver,
        send,
    );

    TestHarness {
        store,
        credentials,
        transport,
        orchestrator,
    }
}

/// Store an encrypted CRM credential so the orchestrator can resolve one
pub async fn seed_crm_credential(harness: &TestHarness, user: UserId) {
    let mut bag = SecretBag::new();
    bag.insert("api_key".to_string(), json!("crm-key-1"));
    harness
        .credentials
        .save_secrets(user, "boldtrail", &bag)
        .await
        .unwrap();
}

pub fn campaign(id: i64, user: UserId, status: CampaignStatus, now: DateTime<Utc>) -> Campaign {
    Campaign {
        id: CampaignId::new(id),
        user_id: user,
        name: "Spring buyers".to_string(),
        medium: CampaignMedium::Both,
        status,
        target_tags: vec![],
        target_status: vec![],
        leads_count: 0,
        sent_count: 0,
        gmail_enabled: false,
        created_at: now,
        updated_at: now,
        started_at: Some(now),
    }
}

pub fn step(
    campaign_id: i64,
    order: u32,
    delay_days: u32,
    kind: StepKind,
    now: DateTime<Utc>,
) -> CampaignStep {
    CampaignStep {
        id: StepId::new(0),
        campaign_id: CampaignId::new(campaign_id),
        step_order: order,
        delay_days,
        kind,
        subject: match kind {
            StepKind::Email => Some(format!("Step {} for {{{{first_name}}}}", order)),
            StepKind::Sms => None,
        },
        body: "Hi {{first_name}}, new homes in {{location}}!".to_string(),
        sent_count: 0,
        created_at: now,
    }
}

pub fn lead(id: i64, user: UserId) -> Lead {
    Lead {
        id: LeadId::new(id),
        user_id: user,
        crm_lead_id: Some(format!("crm-{}", id)),
        first_name: Some("Maria".to_string()),
        last_name: Some("Santos".to_string()),
        email: Some(format!("lead{}@example.com", id)),
        phone: None,
        location: Some("Austin, TX".to_string()),
        address: None,
        status: Some("New".to_string()),
        tags: vec!["Zillow Lead".to_string()],
    }
}
