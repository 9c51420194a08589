//! An in-memory `PersistenceGateway` double, mirroring the teacher's
//! `test_utils.rs` fixture-constructor convention. Used by `lead-broker`'s
//! integration tests so the S1-S6 scenarios run without a live Postgres
//! instance.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use lead_core::domain::{
    Buyer, ComplianceAuditLog, Lead, LeadStatus, Transaction, TransactionStatus, WebhookAudit,
};
use lead_core::money::Money;
use lead_core::Error as CoreError;
use parking_lot::Mutex;
use uuid::Uuid;

use crate::gateway::{EligibilityCandidate, PersistenceGateway, QueuedJob};

#[derive(Default)]
struct State {
    leads: HashMap<Uuid, Lead>,
    buyers: HashMap<Uuid, Buyer>,
    buyers_by_name: HashMap<String, Uuid>,
    candidates: HashMap<(Uuid, String), Vec<EligibilityCandidate>>,
    transactions: Vec<Transaction>,
    audit_logs: Vec<ComplianceAuditLog>,
    webhook_audits: Vec<WebhookAudit>,
    jobs: Vec<JobRow>,
}

#[derive(Clone)]
struct JobRow {
    lead_id: Uuid,
    priority: String,
    status: String,
    attempts: i32,
}

/// Drives every method through a `parking_lot::Mutex<State>`, the teacher's
/// pattern in `mev-boost-rs/src/relay.rs` for guarding shared in-process state.
pub struct FakeGateway {
    state: Mutex<State>,
}

impl FakeGateway {
    pub fn new() -> Self {
        Self { state: Mutex::new(State::default()) }
    }

    pub fn seed_buyer(&self, buyer: Buyer) {
        let mut state = self.state.lock();
        state.buyers_by_name.insert(buyer.name.clone(), buyer.id);
        state.buyers.insert(buyer.id, buyer);
    }

    pub fn seed_candidates(&self, service_type_id: Uuid, zip_code: &str, candidates: Vec<EligibilityCandidate>) {
        self.state.lock().candidates.insert((service_type_id, zip_code.to_string()), candidates);
    }

    pub fn transactions(&self) -> Vec<Transaction> {
        self.state.lock().transactions.clone()
    }

    pub fn webhook_audits(&self) -> Vec<WebhookAudit> {
        self.state.lock().webhook_audits.clone()
    }
}

impl Default for FakeGateway {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PersistenceGateway for FakeGateway {
    async fn insert_lead(&self, lead: &Lead) -> Result<(), CoreError> {
        self.state.lock().leads.insert(lead.id, lead.clone());
        Ok(())
    }

    async fn get_lead(&self, lead_id: Uuid) -> Result<Lead, CoreError> {
        self.state
            .lock()
            .leads
            .get(&lead_id)
            .cloned()
            .ok_or_else(|| CoreError::NotFound(format!("lead {lead_id}")))
    }

    async fn claim_lead(&self, lead_id: Uuid) -> Result<Lead, CoreError> {
        let mut state = self.state.lock();
        let lead = state
            .leads
            .get_mut(&lead_id)
            .ok_or_else(|| CoreError::NotFound(format!("lead {lead_id}")))?;
        if lead.status != LeadStatus::Pending {
            return Err(CoreError::AlreadyProcessing);
        }
        lead.status = LeadStatus::Processing;
        lead.updated_at = Utc::now();
        Ok(lead.clone())
    }

    async fn mark_sold(
        &self,
        lead_id: Uuid,
        winning_buyer_id: Uuid,
        winning_bid: Money,
    ) -> Result<(), CoreError> {
        let mut state = self.state.lock();
        let lead = state
            .leads
            .get_mut(&lead_id)
            .ok_or_else(|| CoreError::NotFound(format!("lead {lead_id}")))?;
        lead.status = LeadStatus::Sold;
        lead.winning_buyer_id = Some(winning_buyer_id);
        lead.winning_bid = Some(winning_bid);
        lead.updated_at = Utc::now();
        Ok(())
    }

    async fn mark_rejected(&self, lead_id: Uuid, _reason: &str) -> Result<(), CoreError> {
        let mut state = self.state.lock();
        let lead = state
            .leads
            .get_mut(&lead_id)
            .ok_or_else(|| CoreError::NotFound(format!("lead {lead_id}")))?;
        lead.status = LeadStatus::Rejected;
        lead.updated_at = Utc::now();
        Ok(())
    }

    async fn mark_failed(&self, lead_id: Uuid, _reason: &str) -> Result<(), CoreError> {
        let mut state = self.state.lock();
        let lead = state
            .leads
            .get_mut(&lead_id)
            .ok_or_else(|| CoreError::NotFound(format!("lead {lead_id}")))?;
        lead.status = LeadStatus::Failed;
        lead.updated_at = Utc::now();
        Ok(())
    }

    async fn reverse_sold_to_rejected(&self, lead_id: Uuid, _reason: &str) -> Result<(), CoreError> {
        let mut state = self.state.lock();
        let lead = state
            .leads
            .get_mut(&lead_id)
            .ok_or_else(|| CoreError::NotFound(format!("lead {lead_id}")))?;
        lead.status = LeadStatus::Rejected;
        lead.updated_at = Utc::now();
        Ok(())
    }

    async fn get_buyer(&self, buyer_id: Uuid) -> Result<Buyer, CoreError> {
        self.state
            .lock()
            .buyers
            .get(&buyer_id)
            .cloned()
            .ok_or_else(|| CoreError::NotFound(format!("buyer {buyer_id}")))
    }

    async fn get_buyer_by_name(&self, name: &str) -> Result<Buyer, CoreError> {
        let state = self.state.lock();
        let id = state
            .buyers_by_name
            .get(name)
            .ok_or_else(|| CoreError::NotFound(format!("buyer {name}")))?;
        Ok(state.buyers.get(id).cloned().unwrap())
    }

    async fn get_eligibility_candidates(
        &self,
        service_type_id: Uuid,
        zip_code: &str,
    ) -> Result<Vec<EligibilityCandidate>, CoreError> {
        Ok(self
            .state
            .lock()
            .candidates
            .get(&(service_type_id, zip_code.to_string()))
            .cloned()
            .unwrap_or_default())
    }

    async fn count_buyer_daily_posts(
        &self,
        buyer_id: Uuid,
        since: DateTime<Utc>,
    ) -> Result<u32, CoreError> {
        let state = self.state.lock();
        let count = state
            .transactions
            .iter()
            .filter(|t| {
                t.buyer_id == buyer_id
                    && t.action_type == lead_core::domain::ActionType::Post
                    && t.status == TransactionStatus::Success
                    && t.created_at >= since
            })
            .count();
        Ok(count as u32)
    }

    async fn get_highest_ping_bid(&self, lead_id: Uuid) -> Result<Option<Money>, CoreError> {
        let state = self.state.lock();
        Ok(state
            .transactions
            .iter()
            .filter(|t| {
                t.lead_id == lead_id
                    && t.action_type == lead_core::domain::ActionType::Ping
                    && t.status == TransactionStatus::Success
            })
            .filter_map(|t| t.bid_amount)
            .fold(None, |acc: Option<Money>, bid| Some(acc.map_or(bid, |a| a.max(bid)))))
    }

    async fn insert_transaction(&self, txn: &Transaction) -> Result<(), CoreError> {
        self.state.lock().transactions.push(txn.clone());
        Ok(())
    }

    async fn insert_audit_log(&self, log: &ComplianceAuditLog) -> Result<(), CoreError> {
        self.state.lock().audit_logs.push(log.clone());
        Ok(())
    }

    async fn insert_webhook_audit(&self, audit: &WebhookAudit) -> Result<(), CoreError> {
        self.state.lock().webhook_audits.push(audit.clone());
        Ok(())
    }

    async fn find_webhook_audit_by_dedup(
        &self,
        buyer_id: Uuid,
        transaction_id: &str,
    ) -> Result<Option<WebhookAudit>, CoreError> {
        Ok(self
            .state
            .lock()
            .webhook_audits
            .iter()
            .find(|a| a.buyer_id == buyer_id && a.transaction_id.as_deref() == Some(transaction_id))
            .cloned())
    }

    async fn enqueue_job(&self, lead_id: Uuid, priority: &str) -> Result<(), CoreError> {
        let mut state = self.state.lock();
        if state.jobs.iter().any(|j| j.lead_id == lead_id) {
            return Ok(());
        }
        state.jobs.push(JobRow { lead_id, priority: priority.to_string(), status: "queued".into(), attempts: 0 });
        Ok(())
    }

    async fn dequeue_job(&self, _lease_for: chrono::Duration) -> Result<Option<QueuedJob>, CoreError> {
        let mut state = self.state.lock();
        let job = state.jobs.iter_mut().find(|j| j.status == "queued");
        match job {
            Some(j) => {
                j.status = "leased".into();
                j.attempts += 1;
                Ok(Some(QueuedJob { lead_id: j.lead_id, priority: j.priority.clone(), attempts: j.attempts }))
            }
            None => Ok(None),
        }
    }

    async fn mark_job_done(&self, lead_id: Uuid) -> Result<(), CoreError> {
        let mut state = self.state.lock();
        if let Some(j) = state.jobs.iter_mut().find(|j| j.lead_id == lead_id) {
            j.status = "done".into();
        }
        Ok(())
    }

    async fn mark_job_dead(&self, lead_id: Uuid) -> Result<(), CoreError> {
        let mut state = self.state.lock();
        if let Some(j) = state.jobs.iter_mut().find(|j| j.lead_id == lead_id) {
            j.status = "dead".into();
        }
        Ok(())
    }

    async fn queue_depth(&self) -> Result<u64, CoreError> {
        Ok(self.state.lock().jobs.iter().filter(|j| j.status == "queued").count() as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lead_core::test_utils::{test_buyer, test_lead, test_service_type_id};

    #[tokio::test]
    async fn claim_lead_rejects_double_claim() {
        let gateway = FakeGateway::new();
        let lead = test_lead(test_service_type_id(), "90210");
        let lead_id = lead.id;
        gateway.insert_lead(&lead).await.unwrap();

        gateway.claim_lead(lead_id).await.unwrap();
        let err = gateway.claim_lead(lead_id).await.unwrap_err();
        assert!(matches!(err, CoreError::AlreadyProcessing));
    }

    #[tokio::test]
    async fn buyer_lookup_by_name() {
        let gateway = FakeGateway::new();
        let buyer = test_buyer("acme-roofing");
        gateway.seed_buyer(buyer.clone());
        let found = gateway.get_buyer_by_name("acme-roofing").await.unwrap();
        assert_eq!(found.id, buyer.id);
    }
}
