//! Shared types for the drip-campaign outreach engine

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Strongly typed campaign identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CampaignId(i64);

impl CampaignId {
    pub const fn new(id: i64) -> Self {
        Self(id)
    }

    pub fn value(&self) -> i64 {
        self.0
    }
}

impl fmt::Display for CampaignId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Strongly typed lead identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LeadId(i64);

impl LeadId {
    pub const fn new(id: i64) -> Self {
        Self(id)
    }

    pub fn value(&self) -> i64 {
        self.0
    }
}

impl fmt::Display for LeadId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Strongly typed user (credential owner) identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UserId(i64);

impl UserId {
    pub const fn new(id: i64) -> Self {
        Self(id)
    }

    pub fn value(&self) -> i64 {
        self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Strongly typed campaign step identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StepId(i64);

impl StepId {
    pub const fn new(id: i64) -> Self {
        Self(id)
    }

    pub fn value(&self) -> i64 {
        self.0
    }
}

impl fmt::Display for StepId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Which channels a campaign is allowed to use
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CampaignMedium {
    Email,
    Sms,
    Both,
}

impl CampaignMedium {
    /// Whether a step of the given kind may belong to a campaign of this medium
    pub fn allows(&self, kind: StepKind) -> bool {
        match self {
            CampaignMedium::Email => kind == StepKind::Email,
            CampaignMedium::Sms => kind == StepKind::Sms,
            CampaignMedium::Both => true,
        }
    }
}

/// Campaign lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CampaignStatus {
    Draft,
    Active,
    Paused,
    Completed,
}

/// Message channel of a single step
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepKind {
    Email,
    Sms,
}

/// Lifecycle of a lead's participation in one campaign
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EnrollmentStatus {
    Active,
    Completed,
    Unsubscribed,
}

impl EnrollmentStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            EnrollmentStatus::Completed | EnrollmentStatus::Unsubscribed
        )
    }
}

/// Rejected enrollment state transition
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransitionError {
    #[error("enrollment is {0:?} and can no longer change")]
    Terminal(EnrollmentStatus),

    #[error("step order {attempted} does not advance current step {current}")]
    StepOrderRegression { current: u32, attempted: u32 },
}

/// A drip campaign owned by one user
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Campaign {
    pub id: CampaignId,
    pub user_id: UserId,
    pub name: String,
    pub medium: CampaignMedium,
    pub status: CampaignStatus,
    pub target_tags: Vec<String>,
    pub target_status: Vec<String>,
    /// Derived counter, recomputed from enrollments
    pub leads_count: u32,
    /// Derived counter, incremented per successful send
    pub sent_count: u64,
    /// Route sends through the owner's Gmail connection instead of the CRM
    pub gmail_enabled: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
}

impl Campaign {
    /// Transition the campaign to active, stamping `started_at` exactly once
    pub fn activate(&mut self, now: DateTime<Utc>) {
        self.status = CampaignStatus::Active;
        if self.started_at.is_none() {
            self.started_at = Some(now);
        }
        self.updated_at = now;
    }
}

/// One ordered message in a campaign's sequence
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CampaignStep {
    pub id: StepId,
    pub campaign_id: CampaignId,
    /// 1-based position in the sequence; unique per campaign
    pub step_order: u32,
    /// Days after the previous send before this step is due (0 = immediate)
    pub delay_days: u32,
    pub kind: StepKind,
    /// Email subject; SMS steps carry none
    pub subject: Option<String>,
    pub body: String,
    pub sent_count: u64,
    pub created_at: DateTime<Utc>,
}

/// A lead's tracked participation in one campaign
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CampaignEnrollment {
    pub id: i64,
    pub campaign_id: CampaignId,
    pub lead_id: LeadId,
    pub status: EnrollmentStatus,
    /// Order of the last step successfully sent; 0 = none sent yet
    pub current_step: u32,
    pub last_sent_at: Option<DateTime<Utc>>,
    pub enrolled_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl CampaignEnrollment {
    pub fn new(id: i64, campaign_id: CampaignId, lead_id: LeadId, now: DateTime<Utc>) -> Self {
        Self {
            id,
            campaign_id,
            lead_id,
            status: EnrollmentStatus::Active,
            current_step: 0,
            last_sent_at: None,
            enrolled_at: now,
            completed_at: None,
        }
    }

    /// Commit a successful send of the step with the given order.
    ///
    /// `current_step` only ever advances and `last_sent_at` is never cleared;
    /// terminal enrollments reject the transition.
    pub fn record_send(
        &mut self,
        step_order: u32,
        now: DateTime<Utc>,
    ) -> Result<(), TransitionError> {
        if self.status.is_terminal() {
            return Err(TransitionError::Terminal(self.status));
        }
        if step_order <= self.current_step {
            return Err(TransitionError::StepOrderRegression {
                current: self.current_step,
                attempted: step_order,
            });
        }
        self.current_step = step_order;
        self.last_sent_at = Some(now);
        Ok(())
    }

    /// Mark the enrollment completed once the campaign sequence is exhausted
    pub fn complete(&mut self, now: DateTime<Utc>) -> Result<(), TransitionError> {
        if self.status.is_terminal() {
            return Err(TransitionError::Terminal(self.status));
        }
        self.status = EnrollmentStatus::Completed;
        self.completed_at = Some(now);
        Ok(())
    }

    /// Externally triggered opt-out; suppresses all future sends
    pub fn unsubscribe(&mut self, now: DateTime<Utc>) -> Result<(), TransitionError> {
        if self.status.is_terminal() {
            return Err(TransitionError::Terminal(self.status));
        }
        self.status = EnrollmentStatus::Unsubscribed;
        self.completed_at = Some(now);
        Ok(())
    }
}

/// A lead as stored locally; read-only from the engine's perspective
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Lead {
    pub id: LeadId,
    pub user_id: UserId,
    /// Identifier of this lead inside the connected CRM, when synced
    pub crm_lead_id: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub location: Option<String>,
    pub address: Option<String>,
    pub status: Option<String>,
    pub tags: Vec<String>,
}

/// A contact as returned by a provider fetch
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LeadRecord {
    pub provider_lead_id: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub status: Option<String>,
    pub tags: Vec<String>,
    pub location: Option<String>,
}

/// Filter for provider contact fetches
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ContactFilter {
    pub statuses: Vec<String>,
    pub tags: Vec<String>,
    pub limit: Option<usize>,
}

impl ContactFilter {
    pub fn limit_or_default(&self) -> usize {
        self.limit.unwrap_or(100)
    }
}

/// Provider acknowledgement of one delivered message
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SendReceipt {
    pub message_id: String,
}

/// Encrypted provider secret at rest; opaque outside the vault
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderCredential {
    pub user_id: UserId,
    pub provider: String,
    pub ciphertext: String,
    pub nonce: String,
    pub connected_at: DateTime<Utc>,
    pub last_used_at: Option<DateTime<Utc>>,
}

/// Outcome for one lead within a processing pass
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LeadSendResult {
    pub lead_id: LeadId,
    pub step_order: Option<u32>,
    pub success: bool,
    pub message_id: Option<String>,
    pub error: Option<String>,
    pub processed_at: DateTime<Utc>,
}

impl LeadSendResult {
    pub fn sent(lead_id: LeadId, step_order: u32, message_id: String, at: DateTime<Utc>) -> Self {
        Self {
            lead_id,
            step_order: Some(step_order),
            success: true,
            message_id: Some(message_id),
            error: None,
            processed_at: at,
        }
    }

    pub fn failed(
        lead_id: LeadId,
        step_order: Option<u32>,
        error: String,
        at: DateTime<Utc>,
    ) -> Self {
        Self {
            lead_id,
            step_order,
            success: false,
            message_id: None,
            error: Some(error),
            processed_at: at,
        }
    }
}

/// Structured summary of one `process_campaign` pass
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessSummary {
    pub run_id: String,
    pub campaign_id: CampaignId,
    pub sent: u32,
    pub completed: u32,
    pub waiting: u32,
    pub failed: u32,
    pub results: Vec<LeadSendResult>,
    /// Campaign-level errors (e.g. credential problems) that did not abort the pass
    pub errors: Vec<String>,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl ProcessSummary {
    pub fn new(campaign_id: CampaignId, started_at: DateTime<Utc>) -> Self {
        Self {
            run_id: Uuid::new_v4().to_string(),
            campaign_id,
            sent: 0,
            completed: 0,
            waiting: 0,
            failed: 0,
            results: Vec::new(),
            errors: Vec::new(),
            started_at,
            finished_at: None,
        }
    }

    pub fn record(&mut self, result: LeadSendResult) {
        if result.success {
            self.sent += 1;
        } else {
            self.failed += 1;
        }
        self.results.push(result);
    }
}

/// Outcome of a bulk enroll request
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EnrollOutcome {
    pub enrolled: Vec<LeadId>,
    pub already_enrolled: Vec<LeadId>,
    pub not_found: Vec<LeadId>,
}
