//! The buyer webhook receiver (§4.8, §6.3): authenticated inbound callbacks
//! that reconcile auction state asynchronously.

use std::sync::Arc;

use chrono::Utc;
use hex::FromHexError;
use hmac::{Hmac, Mac};
use lead_core::domain::{ComplianceAuditLog, LeadStatus, TransactionStatus, WebhookAudit};
use lead_core::value::Value;
use lead_core::Error as CoreError;
use lead_store::PersistenceGateway;
use serde::Deserialize;
use sha2::Sha256;
use uuid::Uuid;

use crate::metrics;

type HmacSha256 = Hmac<Sha256>;

#[derive(Debug, Deserialize)]
pub struct WebhookEnvelope {
    #[serde(rename = "leadId")]
    pub lead_id: Uuid,
    pub action: String,
    pub status: String,
    pub bid: Option<String>,
    pub reason: Option<String>,
    #[serde(rename = "transactionId")]
    pub transaction_id: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WebhookStatus {
    Accepted,
    MalformedSignature,
    MalformedBody,
    UnknownOrInactiveBuyer,
    ForbiddenBuyer,
    UnknownLead,
}

pub struct WebhookReceiver<G: PersistenceGateway> {
    gateway: Arc<G>,
}

/// Constant-time signature check via `Mac::verify_slice`, which never
/// short-circuits on the first mismatched byte.
fn verify_signature(secret: &str, raw_body: &[u8], signature_hex: &str) -> bool {
    let Ok(signature) = hex_decode(signature_hex) else { return false };
    let Ok(mut mac) = HmacSha256::new_from_slice(secret.as_bytes()) else { return false };
    mac.update(raw_body);
    mac.verify_slice(&signature).is_ok()
}

fn hex_decode(input: &str) -> Result<Vec<u8>, FromHexError> {
    hex::decode(input)
}

impl<G: PersistenceGateway> WebhookReceiver<G> {
    pub fn new(gateway: Arc<G>) -> Self {
        Self { gateway }
    }

    /// Handles one delivery end to end. Returns the outcome status; the audit
    /// row (when one is written) is persisted as a side effect.
    pub async fn handle(
        &self,
        buyer_name: &str,
        raw_body: &[u8],
        signature_hex: &str,
    ) -> Result<WebhookStatus, CoreError> {
        let buyer = match self.gateway.get_buyer_by_name(buyer_name).await {
            Ok(b) => b,
            Err(CoreError::NotFound(_)) => {
                metrics::WEBHOOKS_REJECTED.inc();
                return Ok(WebhookStatus::UnknownOrInactiveBuyer);
            }
            Err(err) => return Err(err),
        };

        let Some(secret) = buyer.webhook_secret.as_deref() else {
            metrics::WEBHOOKS_REJECTED.inc();
            return Ok(WebhookStatus::MalformedSignature);
        };
        if !verify_signature(secret, raw_body, signature_hex) {
            metrics::WEBHOOKS_REJECTED.inc();
            return Ok(WebhookStatus::MalformedSignature);
        }

        if !buyer.active {
            metrics::WEBHOOKS_REJECTED.inc();
            return Ok(WebhookStatus::ForbiddenBuyer);
        }

        let Ok(envelope) = serde_json::from_slice::<WebhookEnvelope>(raw_body) else {
            metrics::WEBHOOKS_REJECTED.inc();
            return Ok(WebhookStatus::MalformedBody);
        };

        // Idempotency: a replayed transactionId produces no further side
        // effects and no further WebhookAudit row — at most one row exists
        // per unique transactionId (§8 law).
        if let Some(transaction_id) = envelope.transaction_id.as_deref() {
            if self
                .gateway
                .find_webhook_audit_by_dedup(buyer.id, transaction_id)
                .await?
                .is_some()
            {
                return Ok(WebhookStatus::Accepted);
            }
        }

        let lead = match self.gateway.get_lead(envelope.lead_id).await {
            Ok(lead) => lead,
            Err(CoreError::NotFound(_)) => {
                metrics::WEBHOOKS_REJECTED.inc();
                return Ok(WebhookStatus::UnknownLead);
            }
            Err(err) => return Err(err),
        };

        metrics::WEBHOOKS_RECEIVED.with_label_values(&[buyer_name, &envelope.action]).inc();

        match envelope.action.as_str() {
            "ping_response" => self.handle_ping_response(&buyer, &lead, &envelope).await?,
            "post_response" => self.handle_post_response(&buyer, &lead, &envelope).await?,
            "status_update" => {
                self.audit(lead.id, "WEBHOOK_STATUS_UPDATE", &envelope).await;
            }
            _ => {
                self.audit(lead.id, "WEBHOOK_UNKNOWN_ACTION", &envelope).await;
            }
        }

        self.persist_audit(&buyer, &envelope, raw_body, true, 200).await;
        Ok(WebhookStatus::Accepted)
    }

    async fn handle_ping_response(
        &self,
        buyer: &lead_core::domain::Buyer,
        lead: &lead_core::domain::Lead,
        envelope: &WebhookEnvelope,
    ) -> Result<(), CoreError> {
        if lead.status != LeadStatus::Processing {
            self.audit(lead.id, "WEBHOOK_LATE_PING", envelope).await;
            return Ok(());
        }

        let bid_amount = envelope
            .bid
            .as_deref()
            .and_then(|s| lead_core::Money::from_str_opt(Some(s)).ok());
        let txn = lead_core::domain::Transaction {
            id: Uuid::new_v4(),
            lead_id: lead.id,
            buyer_id: buyer.id,
            action_type: lead_core::domain::ActionType::Ping,
            status: if envelope.status == "accepted" {
                TransactionStatus::Success
            } else {
                TransactionStatus::Failed
            },
            bid_amount,
            response_time_ms: 0,
            payload: Value::map(),
            response: Value::from(serde_json::to_value(envelope.status.clone()).unwrap_or_default()),
            compliance_included: true,
            created_at: Utc::now(),
        };
        self.gateway.insert_transaction(&txn).await
    }

    async fn handle_post_response(
        &self,
        _buyer: &lead_core::domain::Buyer,
        lead: &lead_core::domain::Lead,
        envelope: &WebhookEnvelope,
    ) -> Result<(), CoreError> {
        match envelope.status.as_str() {
            "delivered" => {
                // Confirms the SOLD state already set by the Auction Engine;
                // revenue accumulators derive from SUCCESS POST transactions,
                // already incremented by the Auction Engine's own POST row.
                self.audit(lead.id, "WEBHOOK_POST_DELIVERED", envelope).await;
                Ok(())
            }
            "failed" | "duplicate" | "invalid" if lead.status == LeadStatus::Sold => {
                let reason =
                    envelope.reason.clone().unwrap_or_else(|| format!("WEBHOOK_{}", envelope.status.to_uppercase()));
                self.gateway.reverse_sold_to_rejected(lead.id, &reason).await?;
                self.audit(lead.id, "WEBHOOK_POST_REVERSAL", envelope).await;
                Ok(())
            }
            _ => {
                self.audit(lead.id, "WEBHOOK_POST_RESPONSE", envelope).await;
                Ok(())
            }
        }
    }

    async fn audit(&self, lead_id: Uuid, event_type: &str, envelope: &WebhookEnvelope) {
        let data = Value::from(serde_json::json!({
            "action": envelope.action,
            "status": envelope.status,
            "reason": envelope.reason,
            "transactionId": envelope.transaction_id,
        }));
        let _ = self
            .gateway
            .insert_audit_log(&ComplianceAuditLog {
                id: Uuid::new_v4(),
                lead_id,
                event_type: event_type.to_string(),
                event_data: data,
                ip_address: None,
                user_agent: None,
                created_at: Utc::now(),
            })
            .await;
    }

    async fn persist_audit(
        &self,
        buyer: &lead_core::domain::Buyer,
        envelope: &WebhookEnvelope,
        raw_body: &[u8],
        signature_valid: bool,
        http_status: u16,
    ) {
        let audit = WebhookAudit {
            id: Uuid::new_v4(),
            buyer_id: buyer.id,
            lead_id: Some(envelope.lead_id),
            action: envelope.action.clone(),
            raw_body: String::from_utf8_lossy(raw_body).into_owned(),
            transaction_id: envelope.transaction_id.clone(),
            signature_valid,
            http_status,
            created_at: Utc::now(),
        };
        let _ = self.gateway.insert_webhook_audit(&audit).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lead_core::test_utils;
    use lead_store::FakeGateway;

    fn sign(secret: &str, body: &[u8]) -> String {
        let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).unwrap();
        mac.update(body);
        hex::encode(mac.finalize().into_bytes())
    }

    #[tokio::test]
    async fn rejects_bad_signature() {
        let gateway = Arc::new(FakeGateway::new());
        let buyer = test_utils::test_buyer("acme");
        gateway.seed_buyer(buyer.clone());
        let receiver = WebhookReceiver::new(gateway);

        let body = br#"{"leadId":"00000000-0000-0000-0000-000000000000","action":"status_update","status":"ok"}"#;
        let status = receiver.handle("acme", body, "deadbeef").await.unwrap();
        assert_eq!(status, WebhookStatus::MalformedSignature);
    }

    #[tokio::test]
    async fn post_response_duplicate_reverses_a_sold_lead() {
        let gateway = Arc::new(FakeGateway::new());
        let buyer = test_utils::test_buyer("acme");
        let secret = buyer.webhook_secret.clone().unwrap();
        gateway.seed_buyer(buyer.clone());

        let lead = test_utils::test_lead(test_utils::test_service_type_id(), "90210");
        let lead_id = lead.id;
        gateway.insert_lead(&lead).await.unwrap();
        gateway.claim_lead(lead_id).await.unwrap();
        gateway.mark_sold(lead_id, buyer.id, lead_core::Money::from_i64(20000)).await.unwrap();

        let body = serde_json::to_vec(&serde_json::json!({
            "leadId": lead_id,
            "action": "post_response",
            "status": "duplicate",
            "transactionId": "tx-1",
        }))
        .unwrap();
        let signature = sign(&secret, &body);

        let receiver = WebhookReceiver::new(gateway.clone());
        let status = receiver.handle("acme", &body, &signature).await.unwrap();
        assert_eq!(status, WebhookStatus::Accepted);

        let reloaded = gateway.get_lead(lead_id).await.unwrap();
        assert_eq!(reloaded.status, LeadStatus::Rejected);
        // winning_buyer_id/winning_bid are retained for audit even after reversal.
        assert_eq!(reloaded.winning_buyer_id, Some(buyer.id));
    }

    #[tokio::test]
    async fn replaying_the_same_transaction_id_is_idempotent() {
        let gateway = Arc::new(FakeGateway::new());
        let buyer = test_utils::test_buyer("acme");
        let secret = buyer.webhook_secret.clone().unwrap();
        gateway.seed_buyer(buyer.clone());

        let lead = test_utils::test_lead(test_utils::test_service_type_id(), "90210");
        let lead_id = lead.id;
        gateway.insert_lead(&lead).await.unwrap();

        let body = serde_json::to_vec(&serde_json::json!({
            "leadId": lead_id,
            "action": "status_update",
            "status": "noted",
            "transactionId": "tx-dup",
        }))
        .unwrap();
        let signature = sign(&secret, &body);

        let receiver = WebhookReceiver::new(gateway.clone());
        receiver.handle("acme", &body, &signature).await.unwrap();
        receiver.handle("acme", &body, &signature).await.unwrap();

        assert_eq!(gateway.webhook_audits().len(), 1);
    }
}
