//! Storage traits and the in-memory implementation
//!
//! The engine never talks to a database directly; it consumes these traits.
//! `InMemoryStore` backs tests and the CLI driver and is constructed per
//! process or per test, never held as a hidden module-level singleton.
//! Uniqueness invariants — one step per (campaign, step_order), one
//! enrollment per (campaign, lead) — are enforced here at the storage
//! boundary.

use crate::error::{OutreachError, Result};
use async_trait::async_trait;
use nurture_types::{
    Campaign, CampaignEnrollment, CampaignId, CampaignStep, EnrollmentStatus, Lead, LeadId,
    ProviderCredential, StepId, UserId,
};
use std::collections::HashMap;
use tokio::sync::RwLock;

/// Campaign, step and enrollment persistence
#[async_trait]
pub trait CampaignStore: Send + Sync {
    async fn campaign(&self, id: CampaignId) -> Result<Option<Campaign>>;

    async fn update_campaign(&self, campaign: &Campaign) -> Result<()>;

    /// Steps of a campaign ordered by `step_order` ascending
    async fn steps(&self, campaign_id: CampaignId) -> Result<Vec<CampaignStep>>;

    async fn increment_step_sent(&self, step_id: StepId) -> Result<()>;

    async fn active_enrollments(&self, campaign_id: CampaignId) -> Result<Vec<CampaignEnrollment>>;

    async fn enrollment(
        &self,
        campaign_id: CampaignId,
        lead_id: LeadId,
    ) -> Result<Option<CampaignEnrollment>>;

    /// Insert a new enrollment; rejects a duplicate (campaign, lead) pair
    async fn insert_enrollment(
        &self,
        campaign_id: CampaignId,
        lead_id: LeadId,
    ) -> Result<CampaignEnrollment>;

    async fn update_enrollment(&self, enrollment: &CampaignEnrollment) -> Result<()>;

    async fn enrollment_count(&self, campaign_id: CampaignId) -> Result<u32>;
}

/// Read-only access to leads; lead CRUD lives outside this engine
#[async_trait]
pub trait LeadReader: Send + Sync {
    async fn lead(&self, id: LeadId) -> Result<Option<Lead>>;
}

/// Encrypted provider credential persistence
#[async_trait]
pub trait CredentialStore: Send + Sync {
    async fn load(&self, user_id: UserId, provider: &str) -> Result<Option<ProviderCredential>>;

    async fn save(&self, credential: ProviderCredential) -> Result<()>;

    async fn delete(&self, user_id: UserId, provider: &str) -> Result<()>;

    /// The user's connected CRM, if any (Gmail is not a CRM connection)
    async fn active_crm_connection(&self, user_id: UserId) -> Result<Option<ProviderCredential>>;
}

#[derive(Default)]
struct Inner {
    campaigns: HashMap<i64, Campaign>,
    steps: HashMap<i64, CampaignStep>,
    enrollments: HashMap<i64, CampaignEnrollment>,
    leads: HashMap<i64, Lead>,
    credentials: HashMap<(i64, String), ProviderCredential>,
    next_enrollment_id: i64,
    next_step_id: i64,
}

/// In-memory store backing tests and the CLI driver
#[derive(Default)]
pub struct InMemoryStore {
    inner: RwLock<Inner>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert_campaign(&self, campaign: Campaign) {
        let mut inner = self.inner.write().await;
        inner.campaigns.insert(campaign.id.value(), campaign);
    }

    /// Attach a step, enforcing step-order uniqueness within the campaign
    pub async fn insert_step(&self, step: CampaignStep) -> Result<CampaignStep> {
        let mut inner = self.inner.write().await;

        let duplicate = inner.steps.values().any(|existing| {
            existing.campaign_id == step.campaign_id && existing.step_order == step.step_order
        });
        if duplicate {
            return Err(OutreachError::Validation(format!(
                "campaign {} already has a step with order {}",
                step.campaign_id, step.step_order
            )));
        }

        inner.next_step_id += 1;
        let step = CampaignStep {
            id: StepId::new(inner.next_step_id),
            ..step
        };
        inner.steps.insert(step.id.value(), step.clone());
        Ok(step)
    }

    pub async fn insert_lead(&self, lead: Lead) {
        let mut inner = self.inner.write().await;
        inner.leads.insert(lead.id.value(), lead);
    }
}

#[async_trait]
impl CampaignStore for InMemoryStore {
    async fn campaign(&self, id: CampaignId) -> Result<Option<Campaign>> {
        let inner = self.inner.read().await;
        Ok(inner.campaigns.get(&id.value()).cloned())
    }

    async fn update_campaign(&self, campaign: &Campaign) -> Result<()> {
        let mut inner = self.inner.write().await;
        if !inner.campaigns.contains_key(&campaign.id.value()) {
            return Err(OutreachError::NotFound(format!(
                "campaign {}",
                campaign.id
            )));
        }
        inner.campaigns.insert(campaign.id.value(), campaign.clone());
        Ok(())
    }

    async fn steps(&self, campaign_id: CampaignId) -> Result<Vec<CampaignStep>> {
        let inner = self.inner.read().await;
        let mut steps: Vec<CampaignStep> = inner
            .steps
            .values()
            .filter(|s| s.campaign_id == campaign_id)
            .cloned()
            .collect();
        steps.sort_by_key(|s| s.step_order);
        Ok(steps)
    }

    async fn increment_step_sent(&self, step_id: StepId) -> Result<()> {
        let mut inner = self.inner.write().await;
        let step = inner
            .steps
            .get_mut(&step_id.value())
            .ok_or_else(|| OutreachError::NotFound(format!("step {}", step_id)))?;
        step.sent_count += 1;
        Ok(())
    }

    async fn active_enrollments(&self, campaign_id: CampaignId) -> Result<Vec<CampaignEnrollment>> {
        let inner = self.inner.read().await;
        let mut enrollments: Vec<CampaignEnrollment> = inner
            .enrollments
            .values()
            .filter(|e| e.campaign_id == campaign_id && e.status == EnrollmentStatus::Active)
            .cloned()
            .collect();
        enrollments.sort_by_key(|e| e.id);
        Ok(enrollments)
    }

    async fn enrollment(
        &self,
        campaign_id: CampaignId,
        lead_id: LeadId,
    ) -> Result<Option<CampaignEnrollment>> {
        let inner = self.inner.read().await;
        Ok(inner
            .enrollments
            .values()
            .find(|e| e.campaign_id == campaign_id && e.lead_id == lead_id)
            .cloned())
    }

    async fn insert_enrollment(
        &self,
        campaign_id: CampaignId,
        lead_id: LeadId,
    ) -> Result<CampaignEnrollment> {
        let mut inner = self.inner.write().await;

        let duplicate = inner
            .enrollments
            .values()
            .any(|e| e.campaign_id == campaign_id && e.lead_id == lead_id);
        if duplicate {
            return Err(OutreachError::Validation(format!(
                "lead {} is already enrolled in campaign {}",
                lead_id, campaign_id
            )));
        }

        inner.next_enrollment_id += 1;
        let enrollment = CampaignEnrollment::new(
            inner.next_enrollment_id,
            campaign_id,
            lead_id,
            chrono::Utc::now(),
        );
        inner.enrollments.insert(enrollment.id, enrollment.clone());
        Ok(enrollment)
    }

    async fn update_enrollment(&self, enrollment: &CampaignEnrollment) -> Result<()> {
        let mut inner = self.inner.write().await;
        if !inner.enrollments.contains_key(&enrollment.id) {
            return Err(OutreachError::NotFound(format!(
                "enrollment {}",
                enrollment.id
            )));
        }
        inner.enrollments.insert(enrollment.id, enrollment.clone());
        Ok(())
    }

    async fn enrollment_count(&self, campaign_id: CampaignId) -> Result<u32> {
        let inner = self.inner.read().await;
        Ok(inner
            .enrollments
            .values()
            .filter(|e| e.campaign_id == campaign_id)
            .count() as u32)
    }
}

#[async_trait]
impl LeadReader for InMemoryStore {
    async fn lead(&self, id: LeadId) -> Result<Option<Lead>> {
        let inner = self.inner.read().await;
        Ok(inner.leads.get(&id.value()).cloned())
    }
}

#[async_trait]
impl CredentialStore for InMemoryStore {
    async fn load(&self, user_id: UserId, provider: &str) -> Result<Option<ProviderCredential>> {
        let inner = self.inner.read().await;
        Ok(inner
            .credentials
            .get(&(user_id.value(), provider.to_string()))
            .cloned())
    }

    async fn save(&self, credential: ProviderCredential) -> Result<()> {
        let mut inner = self.inner.write().await;
        inner.credentials.insert(
            (credential.user_id.value(), credential.provider.clone()),
            credential,
        );
        Ok(())
    }

    async fn delete(&self, user_id: UserId, provider: &str) -> Result<()> {
        let mut inner = self.inner.write().await;
        inner
            .credentials
            .remove(&(user_id.value(), provider.to_string()));
        Ok(())
    }

    async fn active_crm_connection(&self, user_id: UserId) -> Result<Option<ProviderCredential>> {
        let inner = self.inner.read().await;
        let mut connections: Vec<&ProviderCredential> = inner
            .credentials
            .values()
            .filter(|c| c.user_id == user_id && c.provider != "gmail")
            .collect();
        connections.sort_by_key(|c| c.connected_at);
        Ok(connections.last().cloned().cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use nurture_types::StepKind;

    fn step(campaign_id: i64, order: u32) -> CampaignStep {
        CampaignStep {
            id: StepId::new(0),
            campaign_id: CampaignId::new(campaign_id),
            step_order: order,
            delay_days: 0,
            kind: StepKind::Email,
            subject: Some("Hello".to_string()),
            body: "Hi {{first_name}}".to_string(),
            sent_count: 0,
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_step_order_unique_per_campaign() {
        let store = InMemoryStore::new();
        store.insert_step(step(1, 1)).await.unwrap();

        let err = store.insert_step(step(1, 1)).await.unwrap_err();
        assert!(matches!(err, OutreachError::Validation(_)));

        // Same order in a different campaign is fine
        store.insert_step(step(2, 1)).await.unwrap();
    }

    #[tokio::test]
    async fn test_steps_returned_in_order() {
        let store = InMemoryStore::new();
        store.insert_step(step(1, 3)).await.unwrap();
        store.insert_step(step(1, 1)).await.unwrap();
        store.insert_step(step(1, 2)).await.unwrap();

        let steps = store.steps(CampaignId::new(1)).await.unwrap();
        let orders: Vec<u32> = steps.iter().map(|s| s.step_order).collect();
        assert_eq!(orders, vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn test_enrollment_unique_per_campaign_lead() {
        let store = InMemoryStore::new();
        let campaign = CampaignId::new(1);
        let lead = LeadId::new(7);

        store.insert_enrollment(campaign, lead).await.unwrap();
        let err = store.insert_enrollment(campaign, lead).await.unwrap_err();
        assert!(matches!(err, OutreachError::Validation(_)));

        assert_eq!(store.enrollment_count(campaign).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_active_crm_connection_skips_gmail() {
        let store = InMemoryStore::new();
        let user = UserId::new(1);
        let now = Utc::now();

        store
            .save(ProviderCredential {
                user_id: user,
                provider: "gmail".to_string(),
                ciphertext: "ct".to_string(),
                nonce: "n".to_string(),
                connected_at: now,
                last_used_at: None,
            })
            .await
            .unwrap();

        assert!(store.active_crm_connection(user).await.unwrap().is_none());

        store
            .save(ProviderCredential {
                user_id: user,
                provider: "boldtrail".to_string(),
                ciphertext: "ct".to_string(),
                nonce: "n".to_string(),
                connected_at: now,
                last_used_at: None,
            })
            .await
            .unwrap();

        let connection = store.active_crm_connection(user).await.unwrap().unwrap();
        assert_eq!(connection.provider, "boldtrail");
    }
}
