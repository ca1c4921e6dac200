//! Campaign step scheduler
//!
//! A pure decision function: given a campaign's ordered steps and an
//! enrollment's progress, decide whether a send is due now. The orchestrator
//! executes the decision and persists results; nothing here has side effects.

use chrono::{DateTime, Duration, Utc};
use nurture_types::{CampaignEnrollment, CampaignStep};

/// What the orchestrator should do for one enrollment right now
#[derive(Debug, Clone, PartialEq)]
pub enum NextAction<'a> {
    /// This step is due; send it
    Send(&'a CampaignStep),
    /// The sequence is exhausted for this enrollment
    Complete,
    /// The next step exists but is not due yet
    Wait { due_at: DateTime<Utc> },
}

/// Decide the next action for an enrollment.
///
/// The candidate is the step with `step_order == current_step + 1`. With no
/// candidate the campaign is exhausted. A candidate with a positive delay is
/// due `delay_days` after `last_sent_at`; the first send (no `last_sent_at`)
/// and zero-delay steps are due immediately.
///
/// Duplicate step orders are a data-integrity violation prevented by the
/// storage uniqueness invariant, not handled here.
pub fn next_action<'a>(
    steps: &'a [CampaignStep],
    enrollment: &CampaignEnrollment,
    now: DateTime<Utc>,
) -> NextAction<'a> {
    let candidate_order = enrollment.current_step + 1;

    let candidate = match steps.iter().find(|s| s.step_order == candidate_order) {
        Some(step) => step,
        None => return NextAction::Complete,
    };

    if candidate.delay_days > 0 {
        if let Some(last_sent_at) = enrollment.last_sent_at {
            let due_at = last_sent_at + Duration::days(candidate.delay_days as i64);
            if now < due_at {
                return NextAction::Wait { due_at };
            }
        }
    }

    NextAction::Send(candidate)
}

#[cfg(test)]
mod tests {
    use super::*;
    use nurture_types::{CampaignId, LeadId, StepId, StepKind};

    fn step(order: u32, delay_days: u32) -> CampaignStep {
        CampaignStep {
            id: StepId::new(order as i64),
            campaign_id: CampaignId::new(1),
            step_order: order,
            delay_days,
            kind: StepKind::Email,
            subject: Some("Subject".to_string()),
            body: "Body".to_string(),
            sent_count: 0,
            created_at: Utc::now(),
        }
    }

    fn enrollment(current_step: u32, last_sent_at: Option<DateTime<Utc>>) -> CampaignEnrollment {
        let mut e = CampaignEnrollment::new(1, CampaignId::new(1), LeadId::new(1), Utc::now());
        e.current_step = current_step;
        e.last_sent_at = last_sent_at;
        e
    }

    #[test]
    fn test_first_step_due_immediately() {
        let steps = vec![step(1, 0), step(2, 2)];
        let action = next_action(&steps, &enrollment(0, None), Utc::now());
        assert!(matches!(action, NextAction::Send(s) if s.step_order == 1));
    }

    #[test]
    fn test_delay_enforced() {
        let t0 = Utc::now();
        let steps = vec![step(1, 0), step(2, 3)];
        let e = enrollment(1, Some(t0));

        // Two days in: still waiting
        let action = next_action(&steps, &e, t0 + Duration::days(2));
        match action {
            NextAction::Wait { due_at } => assert_eq!(due_at, t0 + Duration::days(3)),
            other => panic!("expected Wait, got {:?}", other),
        }

        // Exactly three days: due
        let action = next_action(&steps, &e, t0 + Duration::days(3));
        assert!(matches!(action, NextAction::Send(s) if s.step_order == 2));
    }

    #[test]
    fn test_exhausted_sequence_completes() {
        let steps = vec![step(1, 0), step(2, 2)];
        let action = next_action(&steps, &enrollment(2, Some(Utc::now())), Utc::now());
        assert_eq!(action, NextAction::Complete);
    }

    #[test]
    fn test_no_steps_completes() {
        let action = next_action(&[], &enrollment(0, None), Utc::now());
        assert_eq!(action, NextAction::Complete);
    }

    #[test]
    fn test_delayed_step_without_prior_send_is_due() {
        // First step with a delay but no last_sent_at to anchor it: due now
        let steps = vec![step(1, 5)];
        let action = next_action(&steps, &enrollment(0, None), Utc::now());
        assert!(matches!(action, NextAction::Send(s) if s.step_order == 1));
    }

    #[test]
    fn test_gap_in_orders_completes() {
        // current_step 1 but next defined order is 3: sequence is exhausted
        let steps = vec![step(1, 0), step(3, 0)];
        let action = next_action(&steps, &enrollment(1, Some(Utc::now())), Utc::now());
        assert_eq!(action, NextAction::Complete);
    }
}
