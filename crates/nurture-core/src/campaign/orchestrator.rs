//! Send orchestrator: drives one "process campaign" pass
//!
//! Enumerates due enrollments, renders each step, dispatches through the
//! resolved transport and commits enrollment state only after the provider
//! confirms the send. Failures for one lead never abort processing of the
//! others. Passes for the same campaign are serialized by an advisory lock
//! so two concurrent invocations cannot double-send a step.

use crate::campaign::scheduler::{next_action, NextAction};
use crate::config::SendConfig;
use crate::credentials::CredentialService;
use crate::error::{OutreachError, Result};
use crate::store::{CampaignStore, LeadReader};
use crate::template::{render, LeadFields};
use crate::transport::registry::TransportResolver;
use crate::transport::Transport;
use chrono::{DateTime, Utc};
use nurture_types::{
    Campaign, CampaignEnrollment, CampaignId, CampaignStatus, CampaignStep, EnrollOutcome,
    LeadId, LeadSendResult, ProcessSummary, SendReceipt, StepKind, UserId,
};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

pub struct SendOrchestrator {
    store: Arc<dyn CampaignStore>,
    leads: Arc<dyn LeadReader>,
    credentials: Arc<CredentialService>,
    resolver: Arc<dyn TransportResolver>,
    send: SendConfig,
    /// Advisory locks keyed by campaign id; held for one full pass
    locks: Mutex<HashMap<i64, Arc<tokio::sync::Mutex<()>>>>,
}

impl SendOrchestrator {
    pub fn new(
        store: Arc<dyn CampaignStore>,
        leads: Arc<dyn LeadReader>,
        credentials: Arc<CredentialService>,
        resolver: Arc<dyn TransportResolver>,
        send: SendConfig,
    ) -> Self {
        Self {
            store,
            leads,
            credentials,
            resolver,
            send,
            locks: Mutex::new(HashMap::new()),
        }
    }

    fn campaign_lock(&self, campaign_id: CampaignId) -> Arc<tokio::sync::Mutex<()>> {
        self.locks
            .lock()
            .unwrap()
            .entry(campaign_id.value())
            .or_default()
            .clone()
    }

    /// Process a campaign now
    pub async fn process_campaign(
        &self,
        campaign_id: CampaignId,
        caller: UserId,
    ) -> Result<ProcessSummary> {
        self.process_campaign_at(campaign_id, caller, Utc::now())
            .await
    }

    /// Process a campaign as of the given instant (tests drive time through
    /// this entry point)
    pub async fn process_campaign_at(
        &self,
        campaign_id: CampaignId,
        caller: UserId,
        now: DateTime<Utc>,
    ) -> Result<ProcessSummary> {
        let lock = self.campaign_lock(campaign_id);
        let _guard = lock.lock().await;

        let campaign = self
            .store
            .campaign(campaign_id)
            .await?
            .ok_or_else(|| {
                OutreachError::Validation(format!("campaign {} not found", campaign_id))
            })?;

        if campaign.user_id != caller {
            return Err(OutreachError::Validation(format!(
                "campaign {} is not owned by user {}",
                campaign_id, caller
            )));
        }

        if campaign.status != CampaignStatus::Active {
            return Err(OutreachError::Validation(format!(
                "campaign {} is not active",
                campaign_id
            )));
        }

        let steps = self.store.steps(campaign_id).await?;
        if steps.is_empty() {
            return Err(OutreachError::Validation(format!(
                "campaign {} has no steps",
                campaign_id
            )));
        }

        let mut summary = ProcessSummary::new(campaign_id, now);

        // A missing or rejected credential is surfaced in the summary; the
        // pass still runs so completions are committed. Vault and
        // configuration failures abort outright.
        let transport = match self.resolve_transport(&campaign).await {
            Ok(transport) => Some(transport),
            Err(e @ OutreachError::Encryption(_)) => return Err(e),
            Err(e @ OutreachError::Validation(_)) => return Err(e),
            Err(e @ OutreachError::Config(_)) => return Err(e),
            Err(e) => {
                log::error!("campaign {}: credential unavailable: {}", campaign_id, e);
                summary.errors.push(e.to_string());
                None
            }
        };

        let enrollments = self.store.active_enrollments(campaign_id).await?;
        log::info!(
            "processing campaign {} ({} active enrollments, {} steps)",
            campaign_id,
            enrollments.len(),
            steps.len()
        );

        for enrollment in enrollments {
            match next_action(&steps, &enrollment, now) {
                NextAction::Wait { due_at } => {
                    log::debug!(
                        "lead {} waiting for step {} (due {})",
                        enrollment.lead_id,
                        enrollment.current_step + 1,
                        due_at
                    );
                    summary.waiting += 1;
                }
                NextAction::Complete => {
                    let mut updated = enrollment.clone();
                    updated.complete(now)?;
                    self.store.update_enrollment(&updated).await?;
                    log::info!(
                        "lead {} finished campaign {} sequence",
                        enrollment.lead_id,
                        campaign_id
                    );
                    summary.completed += 1;
                }
                NextAction::Send(step) => {
                    let transport = match transport.as_deref() {
                        Some(transport) => transport,
                        None => {
                            summary.record(LeadSendResult::failed(
                                enrollment.lead_id,
                                Some(step.step_order),
                                "no usable provider credential".to_string(),
                                now,
                            ));
                            continue;
                        }
                    };

                    match self
                        .execute_send(transport, &campaign, step, &enrollment, now)
                        .await
                    {
                        Ok(receipt) => {
                            let mut updated = enrollment.clone();
                            updated.record_send(step.step_order, now)?;
                            self.store.update_enrollment(&updated).await?;
                            self.store.increment_step_sent(step.id).await?;
                            summary.record(LeadSendResult::sent(
                                enrollment.lead_id,
                                step.step_order,
                                receipt.message_id,
                                now,
                            ));
                        }
                        Err(e @ OutreachError::Encryption(_)) => return Err(e),
                        Err(e) => {
                            // Enrollment untouched: the lead stays eligible
                            // for retry on the next pass.
                            log::error!(
                                "send to lead {} in campaign {} failed: {}",
                                enrollment.lead_id,
                                campaign_id,
                                e
                            );
                            summary.record(LeadSendResult::failed(
                                enrollment.lead_id,
                                Some(step.step_order),
                                e.to_string(),
                                now,
                            ));
                        }
                    }
                }
            }
        }

        if summary.sent > 0 {
            let mut updated = campaign.clone();
            updated.sent_count += summary.sent as u64;
            updated.updated_at = now;
            self.store.update_campaign(&updated).await?;
        }

        summary.finished_at = Some(Utc::now());
        log::info!(
            "campaign {} pass {}: {} sent, {} waiting, {} completed, {} failed",
            campaign_id,
            summary.run_id,
            summary.sent,
            summary.waiting,
            summary.completed,
            summary.failed
        );
        Ok(summary)
    }

    /// Enroll leads into a campaign. Idempotent: a lead already enrolled is
    /// reported, not duplicated.
    pub async fn enroll(
        &self,
        campaign_id: CampaignId,
        caller: UserId,
        lead_ids: &[LeadId],
    ) -> Result<EnrollOutcome> {
        let campaign = self
            .store
            .campaign(campaign_id)
            .await?
            .ok_or_else(|| {
                OutreachError::Validation(format!("campaign {} not found", campaign_id))
            })?;

        if campaign.user_id != caller {
            return Err(OutreachError::Validation(format!(
                "campaign {} is not owned by user {}",
                campaign_id, caller
            )));
        }

        let mut outcome = EnrollOutcome::default();
        for &lead_id in lead_ids {
            if self.leads.lead(lead_id).await?.is_none() {
                outcome.not_found.push(lead_id);
                continue;
            }
            if self.store.enrollment(campaign_id, lead_id).await?.is_some() {
                outcome.already_enrolled.push(lead_id);
                continue;
            }
            self.store.insert_enrollment(campaign_id, lead_id).await?;
            outcome.enrolled.push(lead_id);
        }

        // leads_count is derived from storage, never trusted incrementally
        let mut updated = campaign;
        updated.leads_count = self.store.enrollment_count(campaign_id).await?;
        updated.updated_at = Utc::now();
        self.store.update_campaign(&updated).await?;

        log::info!(
            "enroll into campaign {}: {} new, {} already enrolled, {} not found",
            campaign_id,
            outcome.enrolled.len(),
            outcome.already_enrolled.len(),
            outcome.not_found.len()
        );
        Ok(outcome)
    }

    /// Externally triggered opt-out; once applied, the enrollment never
    /// receives another send
    pub async fn unsubscribe(&self, campaign_id: CampaignId, lead_id: LeadId) -> Result<()> {
        let enrollment = self
            .store
            .enrollment(campaign_id, lead_id)
            .await?
            .ok_or_else(|| {
                OutreachError::NotFound(format!(
                    "no enrollment for campaign {} lead {}",
                    campaign_id, lead_id
                ))
            })?;

        let mut updated = enrollment;
        updated.unsubscribe(Utc::now())?;
        self.store.update_enrollment(&updated).await
    }

    async fn resolve_transport(&self, campaign: &Campaign) -> Result<Arc<dyn Transport>> {
        let provider = if campaign.gmail_enabled {
            "gmail".to_string()
        } else {
            self.credentials
                .active_crm_provider(campaign.user_id)
                .await?
                .ok_or_else(|| {
                    OutreachError::Auth(format!(
                        "user {} has no connected CRM provider",
                        campaign.user_id
                    ))
                })?
        };

        let secrets = self
            .credentials
            .load_secrets(campaign.user_id, &provider)
            .await?;
        self.resolver
            .resolve(campaign.user_id, &provider, secrets)
    }

    async fn execute_send(
        &self,
        transport: &dyn Transport,
        campaign: &Campaign,
        step: &CampaignStep,
        enrollment: &CampaignEnrollment,
        now: DateTime<Utc>,
    ) -> Result<SendReceipt> {
        let lead = self
            .leads
            .lead(enrollment.lead_id)
            .await?
            .ok_or_else(|| OutreachError::NotFound(format!("lead {}", enrollment.lead_id)))?;

        let fields = LeadFields::from_lead(&lead);
        let contact_ref = transport.contact_ref(&lead)?;
        let body = render(&step.body, &fields);

        let subject = step
            .subject
            .as_deref()
            .map(|s| render(s, &fields))
            .unwrap_or_default();

        let receipt = self
            .send_with_retry(transport, step.kind, &contact_ref, &subject, &body)
            .await?;

        log::info!(
            "sent step {} of campaign {} to lead {} via {} (message {})",
            step.step_order,
            campaign.id,
            lead.id,
            transport.provider(),
            receipt.message_id
        );

        // Audit trail in the provider; best effort only
        let note = format!(
            "Drip campaign '{}': step {} sent at {}",
            campaign.name,
            step.step_order,
            now.to_rfc3339()
        );
        match transport.annotate(&contact_ref, &note).await {
            Ok(_) => {}
            Err(OutreachError::NotSupported(_)) => {}
            Err(e) => log::warn!("failed to write audit note for lead {}: {}", lead.id, e),
        }

        Ok(receipt)
    }

    /// Dispatch with bounded retry: transient transport failures back off and
    /// retry, credential and provider rejections do not
    async fn send_with_retry(
        &self,
        transport: &dyn Transport,
        kind: StepKind,
        contact_ref: &str,
        subject: &str,
        body: &str,
    ) -> Result<SendReceipt> {
        let mut attempt = 0u32;
        loop {
            let result = match kind {
                StepKind::Email => transport.send_email(contact_ref, subject, body).await,
                StepKind::Sms => transport.send_sms(contact_ref, body).await,
            };

            match result {
                Ok(receipt) => return Ok(receipt),
                Err(e) if e.is_retryable() && attempt < self.send.max_retries => {
                    let backoff = self.send.backoff_ms * 2u64.pow(attempt);
                    attempt += 1;
                    log::warn!(
                        "transient send failure (attempt {}): {}; retrying in {} ms",
                        attempt,
                        e,
                        backoff
                    );
                    tokio::time::sleep(std::time::Duration::from_millis(backoff)).await;
                }
                Err(e) => return Err(e),
            }
        }
    }
}
