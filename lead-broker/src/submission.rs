//! Lead submission (§6.1): persists a PENDING lead and enqueues it, choosing
//! queue priority from the computed lead quality score.

use std::sync::Arc;

use chrono::Utc;
use lead_core::domain::{ComplianceAuditLog, ComplianceData, Lead, LeadStatus, Timeframe};
use lead_core::value::Value;
use lead_core::Error as CoreError;
use lead_store::PersistenceGateway;
use uuid::Uuid;

use crate::queue::{WorkQueue, PRIORITY_HIGH, PRIORITY_NORMAL};

pub struct SubmissionInput {
    pub service_type_id: Uuid,
    pub zip_code: String,
    pub owns_home: bool,
    pub timeframe: Timeframe,
    pub form_data: Value,
    pub compliance: ComplianceData,
}

pub struct SubmissionOutput {
    pub lead_id: Uuid,
    pub status: LeadStatus,
}

/// Base 50, plus banded TrustedForm score, plus bonuses for cert-without-score,
/// Jornaya presence, and TCPA consent (§6.1).
pub fn lead_quality_score(compliance: &ComplianceData) -> i32 {
    let mut score = 50;

    match compliance.trusted_form_compliance_score {
        Some(s) if s >= 80 => score += 25,
        Some(s) if s >= 60 => score += 15,
        Some(_) => score += 5,
        None => {
            if compliance.trusted_form_cert_url.is_some() || compliance.trusted_form_cert_id.is_some() {
                score += 10;
            }
        }
    }

    if compliance.jornaya_lead_id.is_some() {
        score += 20;
    }
    if compliance.tcpa_consent {
        score += 5;
    }

    score.min(100)
}

pub struct SubmissionService<G: PersistenceGateway> {
    gateway: Arc<G>,
    queue: Arc<WorkQueue<G>>,
}

impl<G: PersistenceGateway> SubmissionService<G> {
    pub fn new(gateway: Arc<G>, queue: Arc<WorkQueue<G>>) -> Self {
        Self { gateway, queue }
    }

    pub async fn submit_lead(&self, input: SubmissionInput) -> Result<SubmissionOutput, CoreError> {
        let score = lead_quality_score(&input.compliance);
        let lead = Lead {
            id: Uuid::new_v4(),
            service_type_id: input.service_type_id,
            zip_code: input.zip_code,
            owns_home: input.owns_home,
            timeframe: input.timeframe,
            form_data: input.form_data,
            compliance: input.compliance,
            lead_quality_score: score,
            status: LeadStatus::Pending,
            winning_buyer_id: None,
            winning_bid: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };

        self.gateway.insert_lead(&lead).await?;
        self.gateway
            .insert_audit_log(&ComplianceAuditLog {
                id: Uuid::new_v4(),
                lead_id: lead.id,
                event_type: "LEAD_SUBMITTED".into(),
                event_data: Value::from(serde_json::json!({ "leadQualityScore": score })),
                ip_address: None,
                user_agent: None,
                created_at: Utc::now(),
            })
            .await?;

        let priority = if score >= 80 { PRIORITY_HIGH } else { PRIORITY_NORMAL };
        self.queue.enqueue(lead.id, priority).await?;

        Ok(SubmissionOutput { lead_id: lead.id, status: lead.status })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lead_store::FakeGateway;

    fn compliance(
        trusted_form_score: Option<u8>,
        cert_without_score: bool,
        jornaya: bool,
        tcpa: bool,
    ) -> ComplianceData {
        ComplianceData {
            trusted_form_cert_url: cert_without_score.then(|| "https://cert".to_string()),
            trusted_form_cert_id: None,
            jornaya_lead_id: jornaya.then(|| "jornaya-1".to_string()),
            tcpa_consent: tcpa,
            attribution: Value::map(),
            trusted_form_compliance_score: trusted_form_score,
        }
    }

    #[test]
    fn scores_high_confidence_trusted_form_plus_jornaya_and_tcpa() {
        let score = lead_quality_score(&compliance(Some(85), false, true, true));
        assert_eq!(score, 50 + 25 + 20 + 5);
    }

    #[test]
    fn scores_cert_without_validated_score() {
        let score = lead_quality_score(&compliance(None, true, false, false));
        assert_eq!(score, 50 + 10);
    }

    #[test]
    fn scores_bare_minimum_with_no_compliance_signals() {
        let score = lead_quality_score(&compliance(None, false, false, false));
        assert_eq!(score, 50);
    }

    #[tokio::test]
    async fn high_score_leads_enqueue_at_high_priority() {
        let gateway = Arc::new(FakeGateway::new());
        let queue = Arc::new(WorkQueue::new(gateway.clone()));
        let service = SubmissionService::new(gateway.clone(), queue.clone());

        let input = SubmissionInput {
            service_type_id: Uuid::new_v4(),
            zip_code: "90210".into(),
            owns_home: true,
            timeframe: Timeframe::Immediately,
            form_data: Value::map(),
            compliance: compliance(Some(90), false, true, true),
        };

        let output = service.submit_lead(input).await.unwrap();
        assert_eq!(output.status, LeadStatus::Pending);
        assert_eq!(queue.depth().await.unwrap(), 1);
    }
}
